/// Batch orchestration
///
/// Drives the per-record pipeline over a metadata table. A record's failure is
/// logged and counted, never propagated; the batch always finishes with
/// `processed + failed == records considered`.
///
/// Three ways to run a batch:
/// - `process_and_save` - sequential, in table order
/// - `process_parallel` - rayon map over records, then a reduction (no shared counters)
/// - `process_with_timeout` - sequential on the tokio blocking pool, with a per-record timeout

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{FailureKind, PreprocessError};
use crate::processor::{CancelFlag, Preprocessor};
use crate::state::data::{ImageRecord, ImageSource};
use crate::writer::{self, WrittenPaths};

/// Result of one record
#[derive(Debug)]
pub enum ProcessingOutcome {
    Success(WrittenPaths),
    Failure(PreprocessError),
}

impl From<Result<WrittenPaths, PreprocessError>> for ProcessingOutcome {
    fn from(result: Result<WrittenPaths, PreprocessError>) -> Self {
        match result {
            Ok(paths) => ProcessingOutcome::Success(paths),
            Err(e) => ProcessingOutcome::Failure(e),
        }
    }
}

/// Enough context to find a failed record again
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub index: usize,
    pub patient_id: String,
    pub image_id: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Aggregate of a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    pub failures: Vec<RecordFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchSummary {
    /// `(processed_count, failed_count)`
    pub fn counts(&self) -> (usize, usize) {
        (self.processed, self.failed)
    }

    pub fn total(&self) -> usize {
        self.processed + self.failed
    }

    /// Nothing succeeded but something was attempted: wrong base path, unreadable tree, ...
    pub fn is_systemic_failure(&self) -> bool {
        self.processed == 0 && self.failed > 0
    }

    /// Fold one record's outcome into the summary
    pub fn record(&mut self, index: usize, record: &ImageRecord, outcome: &ProcessingOutcome) {
        match outcome {
            ProcessingOutcome::Success(_) => self.processed += 1,
            ProcessingOutcome::Failure(err) => {
                self.failed += 1;
                *self.failures_by_kind.entry(err.kind()).or_insert(0) += 1;
                self.failures.push(RecordFailure {
                    index,
                    patient_id: record.patient_id.clone(),
                    image_id: record.image_id.clone(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }

    /// Combine two partial summaries (parallel reduction)
    pub fn merge(mut self, other: BatchSummary) -> BatchSummary {
        self.processed += other.processed;
        self.failed += other.failed;
        for (kind, count) in other.failures_by_kind {
            *self.failures_by_kind.entry(kind).or_insert(0) += count;
        }
        self.failures.extend(other.failures);
        self
    }

    /// Serialize for the batch report file
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn finish(mut self, started_at: DateTime<Utc>) -> Self {
        self.failures.sort_by_key(|f| f.index);
        self.started_at = Some(started_at);
        self.finished_at = Some(Utc::now());

        info!(
            "✅ Batch complete. Processed: {}, Failed: {}",
            self.processed, self.failed
        );
        if self.is_systemic_failure() {
            error!(
                "❌ No record was processed ({} failed); check base_path and the source tree",
                self.failed
            );
        }
        self
    }
}

/// Runs the pipeline over many records
#[derive(Debug, Clone, Copy)]
pub struct BatchProcessor<'a> {
    preprocessor: &'a Preprocessor,
    source: ImageSource,
    show_progress: bool,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(preprocessor: &'a Preprocessor) -> Self {
        Self {
            preprocessor,
            source: ImageSource::Train,
            show_progress: false,
        }
    }

    pub fn with_source(mut self, source: ImageSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Process records one after another, in table order
    ///
    /// # Arguments
    /// * `records` - the metadata table
    /// * `output_root` - root of the `<view>/<laterality>` tree
    /// * `num_samples` - only process the first `n` records
    ///
    /// # Returns
    /// * `Ok(BatchSummary)` whenever the output tree could be created, even if every record failed
    /// * `Err(Write)` if the output tree itself cannot be created
    pub fn process_and_save(
        &self,
        records: &[ImageRecord],
        output_root: &Path,
        num_samples: Option<usize>,
    ) -> Result<BatchSummary, PreprocessError> {
        let records = limit(records, num_samples);
        let started_at = self.start(records.len(), output_root)?;
        let progress = self.progress_bar(records.len());

        let mut summary = BatchSummary::default();
        for (index, record) in records.iter().enumerate() {
            let outcome = self.run_one(index, record, output_root);
            summary.record(index, record, &outcome);
            progress.inc(1);
        }
        progress.finish_and_clear();

        Ok(summary.finish(started_at))
    }

    /// Process records on a rayon pool of `threads` workers (0 = rayon default)
    ///
    /// Records write to disjoint paths, so completion order does not matter.
    /// Partial summaries are reduced at the end instead of sharing counters.
    pub fn process_parallel(
        &self,
        records: &[ImageRecord],
        output_root: &Path,
        num_samples: Option<usize>,
        threads: usize,
    ) -> Result<BatchSummary, PreprocessError> {
        let records = limit(records, num_samples);
        let started_at = self.start(records.len(), output_root)?;
        let progress = self.progress_bar(records.len());

        let run = || {
            records
                .par_iter()
                .enumerate()
                .map(|(index, record)| {
                    let outcome = self.run_one(index, record, output_root);
                    let mut partial = BatchSummary::default();
                    partial.record(index, record, &outcome);
                    progress.inc(1);
                    partial
                })
                .reduce(BatchSummary::default, BatchSummary::merge)
        };

        let summary = match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!("⚠️  Could not build a {}-thread pool ({}), using the global pool", threads, e);
                run()
            }
        };
        progress.finish_and_clear();

        Ok(summary.finish(started_at))
    }

    fn start(&self, count: usize, output_root: &Path) -> Result<DateTime<Utc>, PreprocessError> {
        writer::create_directory_structure(output_root)?;
        info!(
            "🔍 Processing {} {} records into {}",
            count,
            self.source.dir_name(),
            output_root.display()
        );
        Ok(Utc::now())
    }

    fn run_one(&self, index: usize, record: &ImageRecord, output_root: &Path) -> ProcessingOutcome {
        let result = isolate(|| self.preprocessor.process_record(record, self.source, output_root));
        if let Err(e) = &result {
            log_failure(index, record, e);
        }
        result.into()
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

/// Process records sequentially on the blocking pool, failing any record that
/// runs longer than `timeout`
///
/// A timed-out record is cancelled and counted as `Timeout` right away. The
/// batch then waits for its blocking task to settle before moving on: the task
/// stops at its next stage boundary, and if it had already renamed its files
/// into place they are removed, so a timed-out record never leaves output.
pub async fn process_with_timeout(
    preprocessor: Arc<Preprocessor>,
    source: ImageSource,
    records: Vec<ImageRecord>,
    output_root: PathBuf,
    num_samples: Option<usize>,
    timeout: Duration,
) -> Result<BatchSummary, PreprocessError> {
    let records = limit(&records, num_samples).to_vec();
    writer::create_directory_structure(&output_root)?;
    info!(
        "🔍 Processing {} {} records into {} ({:?} per-record timeout)",
        records.len(),
        source.dir_name(),
        output_root.display(),
        timeout
    );
    let started_at = Utc::now();

    let mut summary = BatchSummary::default();
    for (index, record) in records.into_iter().enumerate() {
        let cancel = CancelFlag::new();
        let mut task = {
            let preprocessor = Arc::clone(&preprocessor);
            let record = record.clone();
            let output_root = output_root.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                preprocessor.process_record_cancellable(&record, source, &output_root, &cancel)
            })
        };

        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => flatten_join(joined),
            Err(_) => {
                cancel.cancel();
                // Committed just before the flag was seen
                if let Ok(paths) = flatten_join(task.await) {
                    writer::discard(&paths);
                }
                Err(PreprocessError::Timeout {
                    millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };

        if let Err(e) = &result {
            log_failure(index, &record, e);
        }
        summary.record(index, &record, &result.into());
    }

    Ok(summary.finish(started_at))
}

/// Run one record, turning a panic into a per-record failure
fn isolate<F>(run: F) -> Result<WrittenPaths, PreprocessError>
where
    F: FnOnce() -> Result<WrittenPaths, PreprocessError>,
{
    // Preprocessor is immutable while records run
    panic::catch_unwind(AssertUnwindSafe(run))
        .unwrap_or_else(|payload| Err(PreprocessError::from_panic(payload)))
}

fn flatten_join(
    joined: Result<Result<WrittenPaths, PreprocessError>, tokio::task::JoinError>,
) -> Result<WrittenPaths, PreprocessError> {
    match joined {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => {
            Err(PreprocessError::from_panic(join_error.into_panic()))
        }
        Err(join_error) => Err(PreprocessError::Panicked(join_error.to_string())),
    }
}

fn limit(records: &[ImageRecord], num_samples: Option<usize>) -> &[ImageRecord] {
    match num_samples {
        Some(n) if n < records.len() => &records[..n],
        _ => records,
    }
}

fn log_failure(index: usize, record: &ImageRecord, err: &PreprocessError) {
    warn!(
        "❌ Error processing row {} (patient {}, image {}): {}",
        index, record.patient_id, record.image_id, err
    );
}
