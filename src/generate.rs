use anyhow::{Result, anyhow};
use futures_util::future::join_all;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::GenError;
use crate::metadata::{METADATA_FILE, MetadataRecord, append_metadata};
use crate::note::{Note, NoteSample};
use crate::sample::seeded_rng;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub count: usize,
    pub output_dir: PathBuf,
    /// Defaults to the number of CPUs.
    pub workers: Option<usize>,
    pub seed: Option<u64>,
}

/// Generates `count` notes on blocking workers, each owning its own corpus
/// reader, and appends their ground truth in index order.
pub async fn generate_notes(settings: &Settings, options: BatchOptions) -> Result<usize> {
    if options.count == 0 {
        return Ok(0);
    }
    let workers = options
        .workers
        .unwrap_or_else(num_cpus::get)
        .clamp(1, options.count);
    info!("generating {} note(s) with {} worker(s)", options.count, workers);

    let handles = (0..workers).map(|worker| {
        let settings = settings.clone();
        let output_dir = options.output_dir.clone();
        let count = options.count;
        let seed = options.seed;
        tokio::task::spawn_blocking(move || match Note::new(&settings) {
            Ok(mut note) => {
                let mut rng = seeded_rng(seed, worker as u64);
                run_worker(&mut note, &mut rng, worker, workers, count, &output_dir)
            }
            Err(err) => WorkerReport::failed(err),
        })
    });

    let mut reports = Vec::with_capacity(workers);
    for result in join_all(handles).await {
        let report = result
            .unwrap_or_else(|err| WorkerReport::failed(anyhow!("worker task failed: {}", err)));
        reports.push(report);
    }
    write_batch_metadata(&options.output_dir, reports)
}

/// Notes a worker saved, plus the error that stopped it early, if any.
#[derive(Debug, Default)]
pub struct WorkerReport {
    pub records: Vec<(usize, MetadataRecord)>,
    pub error: Option<anyhow::Error>,
}

impl WorkerReport {
    fn failed(error: anyhow::Error) -> Self {
        Self {
            records: Vec::new(),
            error: Some(error),
        }
    }
}

/// Generates indices `worker, worker + workers, ...` below `count` and saves
/// their images under `root`. Stops at the first failure, keeping the records
/// of the images already on disk.
pub fn run_worker<R: Rng>(
    note: &mut Note,
    rng: &mut R,
    worker: usize,
    workers: usize,
    count: usize,
    root: &Path,
) -> WorkerReport {
    let mut report = WorkerReport::default();
    for idx in (worker..count).step_by(workers.max(1)) {
        let saved = generate_with_retries(note, rng)
            .and_then(|sample| note.save_image(root, &sample, idx));
        match saved {
            Ok(record) => {
                debug!("worker {} wrote {}", worker, record.file_name);
                report.records.push((idx, record));
            }
            Err(err) => {
                report.error = Some(err.context(format!("worker {} failed on note {}", worker, idx)));
                break;
            }
        }
    }
    report
}

/// Appends every saved record to `metadata.jsonl` in index order, then
/// returns the first worker error, if any.
pub fn write_batch_metadata(root: &Path, reports: Vec<WorkerReport>) -> Result<usize> {
    let mut records = Vec::new();
    let mut first_error = None;
    for report in reports {
        records.extend(report.records);
        if let Some(err) = report.error {
            if first_error.is_none() {
                first_error = Some(err);
            } else {
                warn!("{:#}", err);
            }
        }
    }
    records.sort_by_key(|(idx, _)| *idx);
    let records: Vec<MetadataRecord> = records.into_iter().map(|(_, record)| record).collect();
    append_metadata(&root.join(METADATA_FILE), &records)?;

    match first_error {
        Some(err) => Err(err.context(format!(
            "batch stopped early; {} note(s) were saved to {}",
            records.len(),
            root.display()
        ))),
        None => {
            info!("wrote {} note(s) to {}", records.len(), root.display());
            Ok(records.len())
        }
    }
}

/// Draws again when a note fails for reasons tied to the random draw.
pub fn generate_with_retries<R: Rng>(note: &mut Note, rng: &mut R) -> Result<NoteSample> {
    let max_attempts = note.config().max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match note.generate(rng) {
            Ok(sample) => return Ok(sample),
            Err(err) => {
                let retryable = err
                    .downcast_ref::<GenError>()
                    .is_some_and(GenError::is_retryable);
                if !retryable || attempt >= max_attempts {
                    return Err(err.context(format!("note generation failed after {} attempt(s)", attempt)));
                }
                warn!("attempt {} failed: {}", attempt, err);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, ContentConfig};
    use crate::document::{Document, DocumentConfig};
    use crate::font::FontPool;
    use crate::metadata::{format_metadata, read_metadata};
    use crate::note::NoteConfig;
    use crate::render::Renderer;
    use crate::test_util::open_corpus;
    use serde_json::json;

    fn record(idx: usize) -> (usize, MetadataRecord) {
        let record = format_metadata(
            &format!("note_ko_{}.jpg", idx),
            &["text_sequence"],
            vec![json!(idx.to_string())],
        )
        .expect("format");
        (idx, record)
    }

    #[test]
    fn worker_keeps_records_saved_before_a_failure() {
        let (_file, reader) = open_corpus(&"가나다라 마바사 아자차카 타파하 ".repeat(20));
        let content = Content::with_parts(ContentConfig::default(), reader, FontPool::estimated());
        let document = Document::with_content(DocumentConfig::default(), content);
        let renderer = Renderer::with_fontdb(usvg::fontdb::Database::new());
        let mut note = Note::with_parts(NoteConfig::default(), document, renderer);

        let root = tempfile::tempdir().expect("tempdir");
        // a directory in the way makes saving the second image fail
        std::fs::create_dir_all(root.path().join("note_ko_1.jpg")).expect("mkdir");

        let mut rng = seeded_rng(Some(4), 0);
        let report = run_worker(&mut note, &mut rng, 0, 1, 3, root.path());
        let indices: Vec<usize> = report.records.iter().map(|(idx, _)| *idx).collect();
        assert_eq!(indices, vec![0]);
        assert!(root.path().join("note_ko_0.jpg").is_file());
        let err = report.error.expect("error");
        assert!(format!("{:#}", err).contains("worker 0 failed on note 1"));
    }

    #[test]
    fn failed_batch_still_writes_saved_records_in_order() {
        let root = tempfile::tempdir().expect("tempdir");
        let reports = vec![
            WorkerReport {
                records: vec![record(2), record(0)],
                error: None,
            },
            WorkerReport {
                records: vec![record(1)],
                error: Some(anyhow!("corpus went away")),
            },
            WorkerReport::failed(anyhow!("second failure")),
        ];

        let err = write_batch_metadata(root.path(), reports).expect_err("worker failed");
        assert!(format!("{:#}", err).contains("corpus went away"));
        assert!(err.to_string().contains("3 note(s) were saved"));

        let written = read_metadata(&root.path().join(METADATA_FILE)).expect("read");
        let names: Vec<&str> = written.iter().map(|record| record.file_name.as_str()).collect();
        assert_eq!(names, vec!["note_ko_0.jpg", "note_ko_1.jpg", "note_ko_2.jpg"]);
    }

    #[test]
    fn successful_batch_reports_its_count() {
        let root = tempfile::tempdir().expect("tempdir");
        let reports = vec![WorkerReport {
            records: vec![record(1), record(0)],
            error: None,
        }];
        assert_eq!(write_batch_metadata(root.path(), reports).expect("write"), 2);
    }
}
