//! End-to-end tests of the three dedup stages on real files.

use shardsift_core::{Document, JsonlReader, Pipeline, Shard};
use shardsift_dedup::records::{duplicate_path, read_duplicates, signature_path, RecordReader};
use shardsift_dedup::{
    DedupJob, DropPolicy, DuplicateFilterConfig, DuplicateFinder, DuplicateRecord, HashSignature,
    SignatureConfig, SignatureStage,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SHARD_A: &str = "The cat sat. It was warm. The sun set.";
const SHARD_B: &str = "The cat sat. It was warm. The sun set. Then it rained.";

fn write_jsonl(path: &Path, docs: &[(&str, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let lines: Vec<String> = docs
        .iter()
        .map(|(id, text)| serde_json::json!({"id": id, "text": text}).to_string())
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn read_output(path: &Path) -> Vec<Document> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn keep_short_docs() -> DuplicateFilterConfig {
    DuplicateFilterConfig::default().with_min_doc_words(0)
}

#[test]
fn test_shared_window_removed_from_later_shard() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    write_jsonl(&input.join("a.jsonl"), &[("a0", SHARD_A)]);
    write_jsonl(&input.join("b.jsonl"), &[("b0", SHARD_B)]);
    let output = dir.path().join("output");

    let job = DedupJob::new(&input, &output, dir.path().join("work"))
        .with_filter_config(keep_short_docs())
        .with_tasks(2);
    let report = job.run().unwrap();

    assert_eq!(report.signatures.len(), 2);
    assert_eq!(report.signatures[0].signatures, 1);
    assert_eq!(report.signatures[1].signatures, 2);
    assert_eq!(report.finder.duplicates, 1);

    assert!(read_duplicates(duplicate_path(&job.duplicates_dir(), 0))
        .unwrap()
        .is_empty());
    assert_eq!(
        read_duplicates(duplicate_path(&job.duplicates_dir(), 1)).unwrap(),
        vec![DuplicateRecord::new(0, 0)]
    );

    let a = read_output(&output.join("00000.jsonl"));
    let b = read_output(&output.join("00001.jsonl"));
    assert_eq!(a[0].text, SHARD_A);
    assert_eq!(b[0].text, "Then it rained.");
    assert_eq!(report.filter.documents_written, 2);
}

#[test]
fn test_distinct_windows_are_not_flagged() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    write_jsonl(&input.join("a.jsonl"), &[("a0", SHARD_A)]);
    write_jsonl(
        &input.join("b.jsonl"),
        &[("b0", "A dog ran. It was warm. The sun set. Then it rained.")],
    );

    let job = DedupJob::new(&input, dir.path().join("output"), dir.path().join("work"))
        .with_filter_config(keep_short_docs())
        .with_tasks(2);
    let report = job.run().unwrap();

    assert_eq!(report.finder.signatures_read, 3);
    assert_eq!(report.finder.duplicates, 0);
}

#[test]
fn test_window_start_policy_keeps_rest_of_window() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    write_jsonl(&input.join("a.jsonl"), &[("a0", SHARD_A)]);
    write_jsonl(&input.join("b.jsonl"), &[("b0", SHARD_B)]);
    let output = dir.path().join("output");

    DedupJob::new(&input, &output, dir.path().join("work"))
        .with_filter_config(keep_short_docs().with_drop_policy(DropPolicy::WindowStart))
        .with_tasks(2)
        .run()
        .unwrap();

    let b = read_output(&output.join("00001.jsonl"));
    assert_eq!(b[0].text, "It was warm. The sun set. Then it rained.");
}

#[test]
fn test_repeat_inside_one_shard_keeps_first_document() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    write_jsonl(
        &input.join("part.jsonl"),
        &[("first", SHARD_A), ("second", SHARD_B)],
    );
    let output = dir.path().join("output");

    DedupJob::new(&input, &output, dir.path().join("work"))
        .with_filter_config(keep_short_docs())
        .run()
        .unwrap();

    let docs = read_output(&output.join("00000.jsonl"));
    assert_eq!(docs[0].text, SHARD_A);
    assert_eq!(docs[1].text, "Then it rained.");
}

#[test]
fn test_merge_independent_of_file_order() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    write_jsonl(&input.join("a.jsonl"), &[("a0", SHARD_A)]);
    write_jsonl(&input.join("b.jsonl"), &[("b0", SHARD_B)]);
    let job = DedupJob::new(&input, dir.path().join("output"), dir.path().join("work"))
        .with_tasks(2);
    job.run_signatures().unwrap();

    let files = vec![
        signature_path(&job.signatures_dir(), 0),
        signature_path(&job.signatures_dir(), 1),
    ];
    let reversed: Vec<_> = files.iter().rev().cloned().collect();

    let fwd = dir.path().join("fwd");
    let rev = dir.path().join("rev");
    DuplicateFinder::new(job.signatures_dir(), &fwd)
        .run_files(&files)
        .unwrap();
    DuplicateFinder::new(job.signatures_dir(), &rev)
        .run_files(&reversed)
        .unwrap();

    for shard in 0..2 {
        assert_eq!(
            fs::read(duplicate_path(&fwd, shard)).unwrap(),
            fs::read(duplicate_path(&rev, shard)).unwrap()
        );
    }
}

#[test]
fn test_second_pass_is_identity() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    write_jsonl(&input.join("a.jsonl"), &[("a0", SHARD_A)]);
    write_jsonl(&input.join("b.jsonl"), &[("b0", SHARD_B)]);
    let first = dir.path().join("first");
    let second = dir.path().join("second");

    DedupJob::new(&input, &first, dir.path().join("work1"))
        .with_filter_config(keep_short_docs())
        .with_tasks(2)
        .run()
        .unwrap();
    let report = DedupJob::new(&first, &second, dir.path().join("work2"))
        .with_filter_config(keep_short_docs())
        .with_tasks(2)
        .run()
        .unwrap();

    assert_eq!(report.finder.duplicates, 0);
    for name in ["00000.jsonl", "00001.jsonl"] {
        assert_eq!(
            fs::read_to_string(first.join(name)).unwrap(),
            fs::read_to_string(second.join(name)).unwrap()
        );
    }
}

#[test]
fn test_short_documents_have_no_windows_and_survive() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    let text = "Only two sentences here. Nothing to hash.";
    write_jsonl(&input.join("a.jsonl"), &[("a0", text), ("a1", text)]);
    let output = dir.path().join("output");

    let report = DedupJob::new(&input, &output, dir.path().join("work"))
        .with_filter_config(keep_short_docs())
        .run()
        .unwrap();

    assert_eq!(report.signatures[0].signatures, 0);
    assert_eq!(report.signatures[0].documents_without_windows, 2);
    let docs = read_output(&output.join("00000.jsonl"));
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.text == text));
}

#[test]
fn test_min_doc_words_default_drops_short_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    write_jsonl(&input.join("a.jsonl"), &[("a0", SHARD_A)]);
    let output = dir.path().join("output");
    let removed = dir.path().join("removed");

    let report = DedupJob::new(&input, &output, dir.path().join("work"))
        .with_exclusion_dir(&removed)
        .run()
        .unwrap();

    assert_eq!(report.filter.documents_written, 0);
    let excluded = read_output(&removed.join("00000.jsonl"));
    assert_eq!(excluded[0].filter_reason(), Some("min_doc_words"));
}

#[test]
fn test_signature_stage_in_pipeline() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    write_jsonl(&input.join("a.jsonl"), &[("a0", SHARD_B)]);
    let sigs = dir.path().join("sigs");

    let pipeline = Pipeline::new()
        .with_stage(JsonlReader::new(&input))
        .with_stage(SignatureStage::new(&sigs, &SignatureConfig::default()).unwrap());
    assert_eq!(pipeline.run(Shard::single()).unwrap(), 0);

    let records: Vec<HashSignature> = RecordReader::open(signature_path(&sigs, 0))
        .unwrap()
        .collect::<std::io::Result<_>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(pipeline.stats()[0].total, 1);
}
