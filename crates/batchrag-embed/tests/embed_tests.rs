use batchrag_core::traits::Embedder;
use batchrag_core::types::EmbeddingSpace;
use batchrag_core::Error;
use batchrag_embed::{EmbeddingProvider, FakeEmbedder};

struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn id(&self) -> &str { "broken" }
    fn space(&self) -> EmbeddingSpace { EmbeddingSpace::Text }
    fn dim(&self) -> usize { 8 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

struct EmptyEmbedder;

impl Embedder for EmptyEmbedder {
    fn id(&self) -> &str { "empty" }
    fn space(&self) -> EmbeddingSpace { EmbeddingSpace::Text }
    fn dim(&self) -> usize { 8 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| Vec::new()).collect())
    }
}

struct NanEmbedder;

impl Embedder for NanEmbedder {
    fn id(&self) -> &str { "nan" }
    fn space(&self) -> EmbeddingSpace { EmbeddingSpace::Text }
    fn dim(&self) -> usize { 3 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![f32::NAN, 0.0, f32::INFINITY]).collect())
    }
}

fn fake_provider() -> EmbeddingProvider {
    EmbeddingProvider::new(
        Box::new(FakeEmbedder::new(EmbeddingSpace::Text, 64)),
        Box::new(FakeEmbedder::new(EmbeddingSpace::Joint, 32)),
    )
    .expect("provider")
}

#[test]
fn fake_embedder_shapes_and_determinism() {
    let provider = fake_provider();
    let v1 = provider.embed_text_general("hello world").expect("embed");
    let v2 = provider.embed_text_general("hello world").expect("embed");

    assert_eq!(v1.dim(), 64);
    assert_eq!(v1.space(), EmbeddingSpace::Text);
    let norm: f32 = v1.as_slice().iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(v1, v2, "deterministic for same input");

    let joint = provider.embed_text_joint("hello world").expect("embed");
    assert_eq!(joint.space(), EmbeddingSpace::Joint);
    assert_eq!(joint.dim(), 32);
}

#[test]
fn provider_rejects_swapped_spaces() {
    let err = EmbeddingProvider::new(
        Box::new(FakeEmbedder::new(EmbeddingSpace::Joint, 8)),
        Box::new(FakeEmbedder::new(EmbeddingSpace::Joint, 8)),
    )
    .err()
    .expect("swapped spaces must fail");
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn embedder_failure_is_upstream_error() {
    let provider = EmbeddingProvider::new(
        Box::new(BrokenEmbedder),
        Box::new(FakeEmbedder::new(EmbeddingSpace::Joint, 8)),
    )
    .expect("provider");
    let err = provider.embed_text_general("query").unwrap_err();
    match err {
        Error::Upstream(msg) => assert!(msg.contains("connection refused")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn empty_vector_is_not_silently_accepted() {
    let provider = EmbeddingProvider::new(
        Box::new(EmptyEmbedder),
        Box::new(FakeEmbedder::new(EmbeddingSpace::Joint, 8)),
    )
    .expect("provider");
    assert!(matches!(provider.embed_text_general("query"), Err(Error::Upstream(_))));
}

#[test]
fn batch_preserves_input_order() {
    let provider = fake_provider();
    let texts = vec!["alpha".to_string(), "beta".to_string()];
    let batch = provider.embed_general_batch(&texts).expect("batch");
    assert_eq!(batch[0], provider.embed_text_general("alpha").unwrap());
    assert_eq!(batch[1], provider.embed_text_general("beta").unwrap());
}

#[test]
fn non_finite_vector_is_upstream_error() {
    let provider = EmbeddingProvider::new(
        Box::new(NanEmbedder),
        Box::new(FakeEmbedder::new(EmbeddingSpace::Joint, 8)),
    )
    .expect("provider");
    match provider.embed_text_general("query") {
        Err(Error::Upstream(msg)) => assert!(msg.contains("non-finite")),
        other => panic!("unexpected result: {other:?}"),
    }
}
