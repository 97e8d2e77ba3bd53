//! Integration tests for shardsift-filters.
//!
//! Tests end-to-end filtering workflows with real file I/O.

use shardsift_core::pipeline::stream_from;
use shardsift_core::{Document, JsonlReader, JsonlWriter, LocalExecutor, Pipeline, Shard};
use shardsift_filters::{
    DocumentFilter, FilterPipelineConfig, FilterStage, FilterVerdict, GopherQualityConfig,
    GopherQualityFilter, Language,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const GOOD_DOC: &str = "Rust is a systems programming language focused on safety and speed. \
It achieves memory safety without a garbage collector by using a borrow checker that validates \
references at compile time. Many developers appreciate the helpful compiler messages and the \
strong type system. The language has grown steadily since its first stable release in 2015, and \
today it powers browsers, operating systems, databases, and command line tools. Its package \
manager makes it easy to share libraries with the community and to build projects reproducibly.";

const SHORT_DOC: &str = "Alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima \
mike november oscar papa quebec romeo sierra tango uniform victor whiskey xray yankee zulu.";

fn spam_doc() -> String {
    "buy now ".repeat(40)
}

fn write_jsonl(path: &Path, docs: &[Document]) {
    let lines: Vec<String> = docs
        .iter()
        .map(|d| serde_json::to_string(d).unwrap())
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn read_jsonl(path: &Path) -> Vec<Document> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn build_pipeline(input: &Path, output: &Path, config: &FilterPipelineConfig) -> Pipeline {
    let mut pipeline = Pipeline::new().with_stage(JsonlReader::new(input));
    for stage in config.build_stages().unwrap() {
        pipeline = pipeline.with_boxed_stage(stage);
    }
    pipeline.with_stage(JsonlWriter::new(output))
}

#[test]
fn test_ten_word_document_is_too_short() {
    let filter = GopherQualityFilter::new(
        GopherQualityConfig::default().with_doc_words(Some(50), Some(100_000)),
        Language::English,
    )
    .unwrap();
    let doc = Document::new("short", "The cat and the dog sat with me all day");

    assert_eq!(
        filter.filter(&doc),
        FilterVerdict::drop("gopher_short_doc")
    );
}

#[test]
fn test_good_document_passes_every_filter() {
    let stages = FilterPipelineConfig::default().build_stages().unwrap();
    let mut stream = Some(stream_from(vec![Document::new("good", GOOD_DOC)]));
    for stage in &stages {
        stream = Some(stage.process(stream.take(), Shard::single()).unwrap());
    }

    let out: Vec<Document> = stream
        .into_iter()
        .flatten()
        .collect::<shardsift_core::Result<_>>()
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].text, GOOD_DOC);
}

#[test]
fn test_pipeline_with_exclusions() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input");
    let output = temp.path().join("output");
    let removed = temp.path().join("removed");
    fs::create_dir_all(&input).unwrap();

    write_jsonl(
        &input.join("part-0.jsonl"),
        &[
            Document::new("good-1", GOOD_DOC).with_metadata("url", "https://a.example"),
            Document::new("short", SHORT_DOC),
            Document::new("spam", spam_doc()),
            Document::new("good-2", GOOD_DOC),
        ],
    );

    let config = FilterPipelineConfig::default().with_exclusion_dir(&removed);
    let pipeline = build_pipeline(&input, &output, &config);
    pipeline.run(Shard::single()).unwrap();

    let kept = read_jsonl(&output.join("00000.jsonl"));
    let ids: Vec<&str> = kept.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["good-1", "good-2"]);
    assert_eq!(kept[0].metadata["url"], "https://a.example");

    let repetition = read_jsonl(&removed.join("gopher_repetition").join("00000.jsonl"));
    assert_eq!(repetition.len(), 1);
    assert_eq!(repetition[0].id, "spam");
    assert_eq!(repetition[0].filter_reason(), Some("top_2_gram"));

    let quality = read_jsonl(&removed.join("gopher_quality").join("00000.jsonl"));
    assert_eq!(quality.len(), 1);
    assert_eq!(quality[0].filter_reason(), Some("gopher_short_doc"));

    assert!(!removed.join("fineweb_quality").join("00000.jsonl").exists());

    let stats = pipeline.stats();
    let quality_stats = stats.iter().find(|s| s.stage == "gopher_quality").unwrap();
    assert_eq!(quality_stats.total, 3);
    assert_eq!(quality_stats.dropped_by_reason["gopher_short_doc"], 1);
}

#[test]
fn test_sharded_local_run() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input");
    let output = temp.path().join("output");
    fs::create_dir_all(&input).unwrap();

    for i in 0..4 {
        write_jsonl(
            &input.join(format!("part-{i}.jsonl")),
            &[
                Document::new(format!("good-{i}"), GOOD_DOC),
                Document::new(format!("short-{i}"), "Nope."),
            ],
        );
    }

    let pipeline = build_pipeline(&input, &output, &FilterPipelineConfig::default());
    let shards = LocalExecutor::new(2)
        .with_workers(2)
        .run(|shard| pipeline.run(shard).map(|_| shard.index))
        .unwrap();
    assert_eq!(shards, vec![0, 1]);

    for shard in 0..2 {
        let docs = read_jsonl(&output.join(format!("{shard:05}.jsonl")));
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.id.starts_with("good")));
    }

    let writer_stats = pipeline
        .stats()
        .into_iter()
        .find(|s| s.stage == "jsonl_writer")
        .unwrap();
    assert_eq!(writer_stats.forwarded, 4);
}

#[test]
fn test_custom_filter_in_pipeline() {
    struct NoDigits;

    impl DocumentFilter for NoDigits {
        fn name(&self) -> &str {
            "no_digits"
        }

        fn filter(&self, doc: &Document) -> FilterVerdict {
            if doc.text.chars().any(|c| c.is_ascii_digit()) {
                FilterVerdict::drop("has_digits")
            } else {
                FilterVerdict::Keep
            }
        }
    }

    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input");
    let output = temp.path().join("output");
    fs::create_dir_all(&input).unwrap();
    write_jsonl(
        &input.join("a.jsonl"),
        &[Document::new("1", "plain words"), Document::new("2", "room 101")],
    );

    let pipeline = Pipeline::new()
        .with_stage(JsonlReader::new(&input))
        .with_stage(FilterStage::new(NoDigits))
        .with_stage(JsonlWriter::new(&output));
    pipeline.run(Shard::single()).unwrap();

    let kept = read_jsonl(&output.join("00000.jsonl"));
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, "1");
}
