use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::WorkItem;
use crate::error::HarvestError;
use crate::fetcher::{FetchResult, Fetcher, throughput};
use crate::organizer::{ArchiveOrganizer, ArchiveReport, OrganizeResult};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::queue::WorkQueue;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub dest_dir: PathBuf,
    pub target_root: PathBuf,
    pub organize: bool,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub identifier: String,
    pub outcome: String,
    pub bytes_written: Option<u64>,
    pub elapsed_ms: Option<u64>,
    pub bytes_per_sec: Option<f64>,
    pub destination: Option<String>,
    pub reason: Option<String>,
    pub error: Option<String>,
    pub organize: Option<ArchiveReport>,
}

impl ItemReport {
    fn new(item: &WorkItem, result: &FetchResult) -> Self {
        let mut report = Self {
            identifier: item.identifier().to_string(),
            outcome: result.outcome().to_string(),
            bytes_written: None,
            elapsed_ms: None,
            bytes_per_sec: None,
            destination: None,
            reason: None,
            error: None,
            organize: None,
        };
        match result {
            FetchResult::Skipped { reason } => report.reason = Some(reason.clone()),
            FetchResult::Succeeded {
                bytes_written,
                elapsed,
                destination,
            } => {
                report.bytes_written = Some(*bytes_written);
                report.elapsed_ms = Some(elapsed.as_millis() as u64);
                report.bytes_per_sec = throughput(*bytes_written, *elapsed);
                report.destination = Some(destination.display().to_string());
            }
            FetchResult::Failed(err) => report.error = Some(err.to_string()),
        }
        report
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub organized: usize,
    pub organize_failed: usize,
    pub bytes_written: u64,
    pub cancelled: bool,
    pub started_at: String,
    pub finished_at: String,
    pub items: Vec<ItemReport>,
}

pub struct Pipeline<T: Transport> {
    fetcher: Fetcher<T>,
    organizer: ArchiveOrganizer,
    options: PipelineOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(fetcher: Fetcher<T>, options: PipelineOptions) -> Self {
        Self {
            fetcher,
            organizer: ArchiveOrganizer,
            options,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn fetcher(&self) -> &Fetcher<T> {
        &self.fetcher
    }

    pub fn run(
        &self,
        queue: &mut WorkQueue,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, HarvestError> {
        let items = queue.items().to_vec();
        let mut summary = RunSummary {
            total: items.len(),
            started_at: iso_timestamp(),
            ..RunSummary::default()
        };
        sink.event(ProgressEvent::phase(format!(
            "phase=Queue; {} items pending",
            items.len()
        )));

        if self.options.workers <= 1 {
            for item in items {
                if self.cancelled() {
                    summary.cancelled = true;
                    break;
                }
                let result = self.fetcher.fetch(&item, &self.options.dest_dir, sink);
                self.record(queue, &item, result, &mut summary);
            }
        } else {
            self.run_pool(queue, items, sink, &mut summary);
        }

        summary.finished_at = iso_timestamp();
        info!(
            total = summary.total,
            fetched = summary.fetched,
            skipped = summary.skipped,
            failed = summary.failed,
            "run finished"
        );
        sink.event(ProgressEvent::phase(format!(
            "phase=Summary; fetched={} skipped={} failed={}",
            summary.fetched, summary.skipped, summary.failed
        )));
        Ok(summary)
    }

    /// Workers only fetch; results come back over a channel so the queue
    /// file and the organizer stay on this thread. At most `workers` items
    /// are in flight.
    fn run_pool(
        &self,
        queue: &mut WorkQueue,
        items: Vec<WorkItem>,
        sink: &dyn ProgressSink,
        summary: &mut RunSummary,
    ) {
        let workers = self.options.workers;
        let (job_tx, job_rx) = mpsc::channel::<WorkItem>();
        let job_rx = Mutex::new(job_rx);
        let (result_tx, result_rx) = mpsc::channel::<(WorkItem, FetchResult)>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = &job_rx;
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    loop {
                        let next = match job_rx.lock() {
                            Ok(rx) => rx.recv().ok(),
                            Err(_) => None,
                        };
                        let Some(item) = next else { break };
                        let result = self.fetcher.fetch(&item, &self.options.dest_dir, sink);
                        if result_tx.send((item, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut pending = items.into_iter();
            let mut in_flight = 0usize;
            while in_flight < workers {
                if self.cancelled() {
                    summary.cancelled = pending.len() > 0;
                    break;
                }
                let Some(item) = pending.next() else { break };
                if job_tx.send(item).is_err() {
                    break;
                }
                in_flight += 1;
            }

            while in_flight > 0 {
                let Ok((item, result)) = result_rx.recv() else {
                    break;
                };
                in_flight -= 1;
                self.record(queue, &item, result, summary);

                if self.cancelled() {
                    summary.cancelled |= pending.len() > 0;
                    continue;
                }
                if let Some(next) = pending.next() {
                    if job_tx.send(next).is_ok() {
                        in_flight += 1;
                    }
                }
            }
            drop(job_tx);
        });
    }

    fn record(
        &self,
        queue: &mut WorkQueue,
        item: &WorkItem,
        result: FetchResult,
        summary: &mut RunSummary,
    ) {
        let mut report = ItemReport::new(item, &result);
        match result {
            FetchResult::Skipped { .. } => summary.skipped += 1,
            FetchResult::Failed(_) => summary.failed += 1,
            FetchResult::Succeeded {
                bytes_written,
                destination,
                ..
            } => {
                summary.fetched += 1;
                summary.bytes_written += bytes_written;
                let recorded = match queue.remove(item.identifier()) {
                    Ok(_) => true,
                    Err(err) => {
                        warn!(identifier = item.identifier(), error = %err, "queue not updated");
                        report.error = Some(err.to_string());
                        false
                    }
                };
                if recorded && self.options.organize {
                    let organized = self
                        .organizer
                        .organize(&destination, &self.options.target_root);
                    match organized {
                        OrganizeResult::Organized(_) => summary.organized += 1,
                        OrganizeResult::Failed(_) => summary.organize_failed += 1,
                    }
                    report.organize = Some(ArchiveReport::from_result(
                        item.destination_name(),
                        &organized,
                    ));
                }
            }
        }
        summary.items.push(report);
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
