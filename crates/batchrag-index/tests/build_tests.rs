use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batchrag_core::data_processor::ProcessedArticle;
use batchrag_core::traits::Embedder;
use batchrag_core::types::{EmbeddingSpace, Modality};
use batchrag_embed::{EmbeddingProvider, FakeEmbedder};
use batchrag_index::{build_indexes, embed_articles, Catalog, EmbeddingSet, FlatIndex};
use tempfile::TempDir;

/// Fake embedder that counts how many texts it was asked to embed.
struct CountingEmbedder {
    inner: FakeEmbedder,
    calls: Arc<AtomicUsize>,
}

impl Embedder for CountingEmbedder {
    fn id(&self) -> &str { self.inner.id() }
    fn space(&self) -> EmbeddingSpace { self.inner.space() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }
}

fn provider(calls: Arc<AtomicUsize>) -> EmbeddingProvider {
    EmbeddingProvider::new(
        Box::new(CountingEmbedder { inner: FakeEmbedder::new(EmbeddingSpace::Text, 32), calls }),
        Box::new(FakeEmbedder::new(EmbeddingSpace::Joint, 16)),
    )
    .expect("provider")
}

fn articles() -> Vec<ProcessedArticle> {
    vec![
        ProcessedArticle {
            issue: "250".into(),
            title: "Robots Learn to Cook".into(),
            url: Some("https://example.org/robots".into()),
            chunks: vec!["robots chop onions".into(), "robots boil pasta".into()],
            image_url: None,
            image_path: Some("/data/raw/images/robots.jpg".into()),
        },
        ProcessedArticle {
            issue: "251".into(),
            title: "Chips, Chips, Chips!".into(),
            url: None,
            chunks: vec!["foundries expand capacity".into()],
            image_url: None,
            image_path: None,
        },
    ]
}

#[test]
fn build_assigns_deterministic_ids_and_groups_by_article() {
    let calls = Arc::new(AtomicUsize::new(0));
    let set = embed_articles(&provider(calls), &articles(), &EmbeddingSet::default()).expect("embed");
    assert_eq!(set.text.len(), 3);
    assert_eq!(set.image.len(), 1);
    assert_eq!(set.image[0].metadata.image_path.as_deref(), Some("robots.jpg"));

    let built = build_indexes(&set).expect("build");
    assert_eq!(
        built.catalog.ids(Modality::Text),
        &["250_robots-learn-to-cook_chunk_0", "250_robots-learn-to-cook_chunk_1", "251_chips-chips-chips_chunk_0"]
    );
    assert_eq!(built.catalog.ids(Modality::Image), &["250_robots-learn-to-cook_image_0"]);
    assert_eq!(built.text_index.len(), 3);
    assert_eq!(built.image_index.len(), 1);

    let article = built.catalog.article("250", "Robots Learn to Cook").expect("article");
    assert_eq!(article.text.len(), 2);
    assert_eq!(article.image.len(), 1);
    assert!(built.catalog.article("251", "Chips, Chips, Chips!").expect("article").image.is_empty());

    let again = build_indexes(&set).expect("rebuild");
    assert_eq!(again.catalog.ids(Modality::Text), built.catalog.ids(Modality::Text));
    assert_eq!(again.text_index, built.text_index);
}

#[test]
fn embedding_reuses_cached_records() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = provider(calls.clone());
    let first = embed_articles(&provider, &articles(), &EmbeddingSet::default()).expect("embed");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let second = embed_articles(&provider, &articles(), &first).expect("embed again");
    assert_eq!(calls.load(Ordering::SeqCst), 3, "unchanged chunks are not re-embedded");
    assert_eq!(second, first);
}

#[test]
fn artefacts_round_trip_through_disk() {
    let tmp = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let set = embed_articles(&provider(calls), &articles(), &EmbeddingSet::default()).expect("embed");

    let (text_rec, image_rec) = (tmp.path().join("emb/text.json"), tmp.path().join("emb/image.json"));
    set.save(&text_rec, &image_rec).unwrap();
    assert_eq!(EmbeddingSet::load(&text_rec, &image_rec).unwrap(), set);

    let built = build_indexes(&set).expect("build");
    let (ti, ii, cat) = (tmp.path().join("idx/text.index"), tmp.path().join("idx/image.index"), tmp.path().join("idx/meta.json"));
    built.save(&ti, &ii, &cat).unwrap();

    let text_index = FlatIndex::load(&ti).unwrap();
    let image_index = FlatIndex::load(&ii).unwrap();
    let catalog = Catalog::load(&cat).unwrap();
    assert_eq!(text_index, built.text_index);
    assert_eq!(image_index.space(), EmbeddingSpace::Joint);
    catalog.validate(text_index.len(), image_index.len()).unwrap();
    assert_eq!(catalog.resolve_text(2).unwrap().chunk.text, "foundries expand capacity");
}

#[test]
fn empty_corpus_builds_empty_indexes() {
    let built = build_indexes(&EmbeddingSet::default()).expect("build");
    assert!(built.text_index.is_empty());
    assert!(built.image_index.is_empty());
}

#[test]
fn corrupt_index_file_is_malformed() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.index");
    std::fs::write(&path, b"not an index").unwrap();
    assert!(matches!(FlatIndex::load(&path), Err(batchrag_core::Error::MalformedState(_))));
    assert!(matches!(FlatIndex::load(&tmp.path().join("none")), Err(batchrag_core::Error::NotFound(_))));
}
