use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::{env, process};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use batchrag_core::config::{Config, Settings};
use batchrag_core::data_processor::{ChunkingConfig, DataProcessor};
use batchrag_core::types::Modality;
use batchrag_embed::default_provider;
use batchrag_index::{build_indexes, embed_articles, EmbeddingSet};
use batchrag_rag::eval::{evaluate, generate_test_queries};
use batchrag_rag::{open_retriever, OpenAiChatModel, RetrievalService};

const USAGE: &str = "Usage: batchrag <command> [args...]

Commands:
  preprocess                 clean and chunk the raw articles
  embed                      compute text and image embeddings
  build                      build both indexes and the catalog
  search <query> [--top-k N] retrieve without calling the chat model
  ask <query> [--top-k N]    retrieve and compose a grounded answer
  gen-queries                generate evaluation queries with the chat model
  evaluate [--top-k N]       score retrieval on the generated queries

search and ask print JSON with --json.";

struct QueryArgs {
    query: String,
    top_k: Option<usize>,
    json: bool,
}

fn parse_query_args(args: &[String]) -> QueryArgs {
    let mut words = Vec::new();
    let mut top_k = None;
    let mut json = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--top-k" | "-k" => {
                match args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) {
                    Some(k) => top_k = Some(k),
                    None => fail("--top-k requires a number"),
                }
                i += 1;
            }
            "--json" => json = true,
            other => words.push(other.to_string()),
        }
        i += 1;
    }
    QueryArgs { query: words.join(" "), top_k, json }
}

fn fail(msg: &str) -> ! {
    eprintln!("Error: {}\n\n{}", msg, USAGE);
    process::exit(1);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
    fs::write(path, serde_json::to_string_pretty(value)?).with_context(|| format!("writing {}", path.display()))
}

fn preprocess(settings: &Settings) -> anyhow::Result<()> {
    let paths = &settings.paths;
    let processor = DataProcessor::with_chunking(ChunkingConfig {
        chunk_size: settings.chunking.chunk_size,
        overlap: settings.chunking.overlap,
    });
    let raw = processor.load_raw(&paths.resolve(&paths.raw_articles))?;
    let processed = processor.process_articles(&raw, &paths.resolve(&paths.raw_images_dir));
    let out = paths.resolve(&paths.processed_articles);
    processor.save_processed(&processed, &out)?;
    let chunks: usize = processed.iter().map(|a| a.chunks.len()).sum();
    let images = processed.iter().filter(|a| a.image_path.is_some()).count();
    println!("Processed {} articles ({} chunks, {} images) -> {}", processed.len(), chunks, images, out.display());
    Ok(())
}

fn embed(settings: &Settings) -> anyhow::Result<()> {
    let paths = &settings.paths;
    let articles = DataProcessor::new().load_processed(&paths.resolve(&paths.processed_articles))?;
    let text_out = paths.resolve(&paths.text_embeddings);
    let image_out = paths.resolve(&paths.image_embeddings);
    let previous = EmbeddingSet::load_or_default(&text_out, &image_out)?;
    let provider = default_provider(settings)?;
    let set = embed_articles(&provider, &articles, &previous)?;
    set.save(&text_out, &image_out)?;
    println!("Embedded {} chunks and {} images", set.text.len(), set.image.len());
    Ok(())
}

fn build(settings: &Settings) -> anyhow::Result<()> {
    let paths = &settings.paths;
    let set = EmbeddingSet::load(&paths.resolve(&paths.text_embeddings), &paths.resolve(&paths.image_embeddings))?;
    let built = build_indexes(&set)?;
    built.save(
        &paths.resolve(&paths.text_index),
        &paths.resolve(&paths.image_index),
        &paths.resolve(&paths.catalog),
    )?;
    println!("Built text index ({} vectors) and image index ({} vectors)", built.text_index.len(), built.image_index.len());
    Ok(())
}

fn search(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let q = parse_query_args(args);
    if q.query.is_empty() { fail("search needs a query"); }
    let retriever = open_retriever(settings)?;
    let result = retriever.search_multimodal(&q.query, q.top_k.unwrap_or(settings.retrieval.top_k).max(1))?;
    if q.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    println!("Query: {}\n", result.query);
    for hit in &result.text {
        println!("{:>2}. [{:.4}] {} / {} ({})", hit.rank, hit.score, hit.issue, hit.title, hit.id);
    }
    match &result.main_image {
        Some(path) => println!("\nMain image: {}", path),
        None => println!("\nNo image for the top article"),
    }
    Ok(())
}

fn ask(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let q = parse_query_args(args);
    if q.query.is_empty() { fail("ask needs a query"); }
    let service = RetrievalService::open(settings)?;
    let payload = service.answer(&q.query, q.top_k)?;
    if q.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    println!("{}\n", payload.answer_text);
    println!("Sources: {} text, {} images", payload.text_count, payload.image_count);
    for hit in &payload.results.text {
        println!("  - {} ({:.4})", hit.id, hit.score);
    }
    Ok(())
}

fn gen_queries(settings: &Settings) -> anyhow::Result<()> {
    let paths = &settings.paths;
    let catalog = batchrag_index::Catalog::load(&paths.resolve(&paths.catalog))?;
    let generator = OpenAiChatModel::from_settings(settings)?;
    let queries = generate_test_queries(&generator, catalog.ids(Modality::Text), settings.generation.query_temperature);
    let out = paths.resolve(&paths.test_queries);
    write_json(&out, &queries)?;
    println!("Wrote {} test queries to {}", queries.len(), out.display());
    Ok(())
}

fn run_evaluation(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let k = parse_query_args(args).top_k.unwrap_or(settings.retrieval.top_k).max(1);
    let paths = &settings.paths;
    let queries_path = paths.resolve(&paths.test_queries);
    let raw = fs::read_to_string(&queries_path)
        .with_context(|| format!("reading {} (run gen-queries first)", queries_path.display()))?;
    let queries: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw)?;
    let retriever = open_retriever(settings)?;
    let report = evaluate(&retriever, &queries, k)?;
    write_json(&paths.resolve(&paths.evaluation_report), &report)?;
    let m = &report.average_metrics;
    println!("Evaluated {} queries at k={}", report.per_query.len(), k);
    println!("  precision@k {:.4}", m.mean_precision);
    println!("  recall@k    {:.4}", m.mean_recall);
    println!("  MRR         {:.4}", m.mean_mrr);
    println!("  nDCG@k      {:.4}", m.mean_ndcg);
    println!("  MAP         {:.4}", m.map);
    println!("  top-1       {:.4}", m.mean_top1_accuracy);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { fail("missing command"); }
    let cmd = args.remove(0);
    let settings = Config::load()
        .and_then(|c| c.settings())
        .map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    info!(command = %cmd, data_dir = %settings.paths.data_dir, "starting");

    match cmd.as_str() {
        "preprocess" => preprocess(&settings),
        "embed" => embed(&settings),
        "build" => build(&settings),
        "search" => search(&settings, &args),
        "ask" => ask(&settings, &args),
        "gen-queries" => gen_queries(&settings),
        "evaluate" => run_evaluation(&settings, &args),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => fail(&format!("unknown command '{}'", other)),
    }
}
