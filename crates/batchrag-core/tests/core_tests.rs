use std::fs;
use tempfile::TempDir;

use batchrag_core::data_processor::{ChunkingConfig, DataProcessor, RawArticle};

fn article(issue: &str, title: &str, content: &str, image: Option<&str>) -> RawArticle {
    RawArticle {
        issue: issue.to_string(),
        title: title.to_string(),
        url: Some(format!("https://example.org/{issue}")),
        content: content.to_string(),
        image_filename: image.map(str::to_string),
        image_url: None,
    }
}

#[test]
fn process_articles_keeps_only_existing_images() {
    let tmp = TempDir::new().unwrap();
    let images = tmp.path().join("images");
    fs::create_dir_all(&images).unwrap();
    fs::write(images.join("present.jpg"), b"jpg").unwrap();

    let raw = vec![
        article("1", "  First  ", "<p>alpha bravo</p>", Some("present.jpg")),
        article("2", "Second", "charlie", Some("missing.jpg")),
    ];
    let processed = DataProcessor::new().process_articles(&raw, &images);

    assert_eq!(processed.len(), 2);
    assert_eq!(processed[0].title, "First");
    assert_eq!(processed[0].chunks, vec!["alpha bravo"]);
    assert_eq!(processed[0].image_path.as_deref(), Some("present.jpg"));
    assert_eq!(processed[1].image_path, None, "missing raw image is dropped");
}

#[test]
fn processed_articles_round_trip_through_disk() {
    let tmp = TempDir::new().unwrap();
    let processor = DataProcessor::with_chunking(ChunkingConfig { chunk_size: 2, overlap: 0 });
    let raw = vec![article("7", "Title", "one two three", None)];
    let processed = processor.process_articles(&raw, tmp.path());
    assert_eq!(processed[0].chunks, vec!["one two", "three"]);

    let path = tmp.path().join("processed/out.json");
    processor.save_processed(&processed, &path).unwrap();
    let loaded = processor.load_processed(&path).unwrap();
    assert_eq!(loaded, processed);

    let chunks = loaded[0].to_chunks();
    assert_eq!(chunks[1].index, 1);
    assert_eq!(chunks[1].issue, "7");
}

#[test]
fn missing_raw_file_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = DataProcessor::new().load_raw(&tmp.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, batchrag_core::Error::NotFound(_)));
}
