//! Retrieval evaluation: ranking metrics over chunk IDs and synthetic query
//! generation from catalog article slugs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use tracing::{info, warn};

use batchrag_core::traits::Generator;
use batchrag_core::Result;

use crate::prompt::render_query_prompt;
use crate::retriever::MultimodalRetriever;

fn hits(retrieved: &[String], relevant: &HashSet<&str>) -> usize {
    retrieved.iter().filter(|id| relevant.contains(id.as_str())).collect::<HashSet<_>>().len()
}

fn as_set(ids: &[String]) -> HashSet<&str> { ids.iter().map(String::as_str).collect() }

pub fn precision_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    let top = &retrieved[..retrieved.len().min(k)];
    if top.is_empty() { return 0.0; }
    let unique: HashSet<&str> = as_set(top);
    hits(top, &as_set(relevant)) as f64 / unique.len() as f64
}

pub fn recall_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    let relevant_set = as_set(relevant);
    if relevant_set.is_empty() { return 0.0; }
    let top = &retrieved[..retrieved.len().min(k)];
    hits(top, &relevant_set) as f64 / relevant_set.len() as f64
}

pub fn reciprocal_rank(retrieved: &[String], relevant: &[String]) -> f64 {
    let relevant = as_set(relevant);
    retrieved
        .iter()
        .position(|id| relevant.contains(id.as_str()))
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

pub fn ndcg_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    let relevant_set = as_set(relevant);
    let dcg: f64 = retrieved
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, id)| relevant_set.contains(id.as_str()))
        .map(|(i, _)| 1.0 / ((i + 2) as f64).log2())
        .sum();
    let ideal = relevant.len().min(k);
    let idcg: f64 = (0..ideal).map(|i| 1.0 / ((i + 2) as f64).log2()).sum();
    if idcg > 0.0 { dcg / idcg } else { 0.0 }
}

pub fn average_precision(retrieved: &[String], relevant: &[String]) -> f64 {
    if relevant.is_empty() { return 0.0; }
    let relevant_set = as_set(relevant);
    let mut found = 0usize;
    let mut score = 0.0;
    for (i, id) in retrieved.iter().enumerate() {
        if relevant_set.contains(id.as_str()) {
            found += 1;
            score += found as f64 / (i + 1) as f64;
        }
    }
    score / relevant.len() as f64
}

pub fn top1_accuracy(retrieved: &[String], relevant: &[String]) -> f64 {
    match retrieved.first() {
        Some(id) if relevant.contains(id) => 1.0,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub retrieved_ids: Vec<String>,
    pub relevant_ids: Vec<String>,
    pub precision: f64,
    pub recall: f64,
    pub mrr: f64,
    pub ndcg: f64,
    pub ap: f64,
    pub top1_accuracy: f64,
}

impl QueryMetrics {
    pub fn compute(retrieved: Vec<String>, relevant: Vec<String>, k: usize) -> Self {
        Self {
            precision: precision_at_k(&retrieved, &relevant, k),
            recall: recall_at_k(&retrieved, &relevant, k),
            mrr: reciprocal_rank(&retrieved, &relevant),
            ndcg: ndcg_at_k(&retrieved, &relevant, k),
            ap: average_precision(&retrieved, &relevant),
            top1_accuracy: top1_accuracy(&retrieved, &relevant),
            retrieved_ids: retrieved,
            relevant_ids: relevant,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub mean_precision: f64,
    pub mean_recall: f64,
    pub mean_mrr: f64,
    pub mean_ndcg: f64,
    pub map: f64,
    pub mean_top1_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub k: usize,
    pub per_query: BTreeMap<String, QueryMetrics>,
    pub average_metrics: AverageMetrics,
}

fn mean<'a>(per_query: impl Iterator<Item = &'a QueryMetrics>, f: impl Fn(&QueryMetrics) -> f64) -> f64 {
    let (sum, n) = per_query.fold((0.0, 0usize), |(s, n), m| (s + f(m), n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Run every query through text retrieval and score the returned chunk IDs.
pub fn evaluate(retriever: &MultimodalRetriever, queries: &BTreeMap<String, Vec<String>>, k: usize) -> Result<EvaluationReport> {
    let mut per_query = BTreeMap::new();
    for (query, relevant) in queries {
        let result = retriever.search_multimodal(query, k)?;
        let retrieved = result.text.into_iter().map(|hit| hit.id).collect();
        per_query.insert(query.clone(), QueryMetrics::compute(retrieved, relevant.clone(), k));
    }
    let m = per_query.values();
    let average_metrics = AverageMetrics {
        mean_precision: mean(m.clone(), |q| q.precision),
        mean_recall: mean(m.clone(), |q| q.recall),
        mean_mrr: mean(m.clone(), |q| q.mrr),
        mean_ndcg: mean(m.clone(), |q| q.ndcg),
        map: mean(m.clone(), |q| q.ap),
        mean_top1_accuracy: mean(m, |q| q.top1_accuracy),
    };
    info!(queries = per_query.len(), k, "evaluation finished");
    Ok(EvaluationReport { k, per_query, average_metrics })
}

/// Group chunk IDs (`{issue}_{slug}_chunk_{n}`) by article slug.
pub fn chunk_ids_by_article(text_ids: &[String]) -> BTreeMap<String, Vec<String>> {
    static ISSUE_PREFIX: OnceLock<Regex> = OnceLock::new();
    let issue_prefix = ISSUE_PREFIX.get_or_init(|| Regex::new(r"^\d+_").expect("static regex"));
    let mut articles: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for id in text_ids {
        let stem = id.rsplit_once("_chunk_").map_or(id.as_str(), |(stem, _)| stem);
        let slug = issue_prefix.replace(stem, "").to_string();
        articles.entry(slug).or_default().push(id.clone());
    }
    articles
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQueries {
    pub direct: String,
    pub paraphrased: String,
    pub noisy: String,
}

impl GeneratedQueries {
    fn fallback(readable_title: &str) -> Self {
        let lower = readable_title.to_lowercase();
        Self {
            direct: readable_title.to_string(),
            paraphrased: format!("About {}", lower),
            noisy: format!("Something related to {}", lower),
        }
    }

    fn dehyphenate(self) -> Self {
        Self {
            direct: self.direct.replace('-', " "),
            paraphrased: self.paraphrased.replace('-', " "),
            noisy: self.noisy.replace('-', " "),
        }
    }
}

/// Parse a model reply, tolerating a surrounding Markdown code fence.
pub fn parse_generated_queries(raw: &str) -> Option<GeneratedQueries> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?m)^```(?:json)?\s*|\s*```$").expect("static regex"));
    let cleaned = fence.replace_all(raw.trim(), "");
    serde_json::from_str(cleaned.trim()).ok()
}

/// Ask the generator for three test queries per article; each query maps to
/// the article's chunk IDs. A failed or unparsable reply falls back to
/// templated queries so one bad article does not abort the run.
pub fn generate_test_queries(
    generator: &dyn Generator,
    text_ids: &[String],
    temperature: f32,
) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    for (slug, chunk_ids) in chunk_ids_by_article(text_ids) {
        let readable = slug.replace('-', " ");
        let prompt = render_query_prompt(&readable);
        let queries = match generator.generate("", &prompt, temperature) {
            Ok(reply) => parse_generated_queries(&reply).unwrap_or_else(|| {
                warn!(article = %slug, "unparsable query reply, using fallback");
                GeneratedQueries::fallback(&readable)
            }),
            Err(e) => {
                warn!(article = %slug, error = %e, "query generation failed, using fallback");
                GeneratedQueries::fallback(&readable)
            }
        }
        .dehyphenate();
        for q in [queries.direct, queries.paraphrased, queries.noisy] {
            out.insert(q, chunk_ids.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn ranking_metrics() {
        let retrieved = ids(&["a", "x", "b"]);
        let relevant = ids(&["a", "b"]);
        assert!((precision_at_k(&retrieved, &relevant, 3) - 2.0 / 3.0).abs() < 1e-9);
        assert!((recall_at_k(&retrieved, &relevant, 1) - 0.5).abs() < 1e-9);
        assert_eq!(reciprocal_rank(&retrieved, &relevant), 1.0);
        assert!((average_precision(&retrieved, &relevant) - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
        assert_eq!(top1_accuracy(&retrieved, &relevant), 1.0);
        let expected_ndcg = (1.0 + 1.0 / 4f64.log2()) / (1.0 + 1.0 / 3f64.log2());
        assert!((ndcg_at_k(&retrieved, &relevant, 3) - expected_ndcg).abs() < 1e-9);
    }

    #[test]
    fn metrics_on_empty_inputs() {
        assert_eq!(precision_at_k(&[], &ids(&["a"]), 5), 0.0);
        assert_eq!(recall_at_k(&ids(&["a"]), &[], 5), 0.0);
        assert_eq!(reciprocal_rank(&ids(&["x"]), &ids(&["a"])), 0.0);
        assert_eq!(top1_accuracy(&[], &ids(&["a"])), 0.0);
    }

    #[test]
    fn groups_chunk_ids_by_slug() {
        let grouped = chunk_ids_by_article(&ids(&["12_big-news_chunk_0", "12_big-news_chunk_1", "13_other_chunk_0"]));
        assert_eq!(grouped["big-news"].len(), 2);
        assert_eq!(grouped["other"], ids(&["13_other_chunk_0"]));
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"direct\": \"a\", \"paraphrased\": \"b\", \"noisy\": \"c\"}\n```";
        let q = parse_generated_queries(raw).expect("parse");
        assert_eq!(q.direct, "a");
        assert_eq!(q.noisy, "c");
        assert!(parse_generated_queries("not json").is_none());
    }
}
