use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::Builder;
use tracing::{debug, info, warn};

use crate::domain::WorkItem;
use crate::error::HarvestError;
use crate::fs_util;
use crate::progress::{ProgressEvent, ProgressSink, TransferProgress};
use crate::transport::Transport;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const ALREADY_PRESENT: &str = "already present";

#[derive(Debug)]
pub enum FetchResult {
    Skipped {
        reason: String,
    },
    Succeeded {
        bytes_written: u64,
        elapsed: Duration,
        destination: PathBuf,
    },
    Failed(HarvestError),
}

impl FetchResult {
    pub fn outcome(&self) -> &'static str {
        match self {
            FetchResult::Skipped { .. } => "skipped",
            FetchResult::Succeeded { .. } => "fetched",
            FetchResult::Failed(_) => "failed",
        }
    }
}

pub fn throughput(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    (secs > 0.0).then(|| bytes as f64 / secs)
}

pub struct Fetcher<T: Transport> {
    transport: T,
    chunk_size: usize,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Downloads `item` into `dest_dir/destination_name`; existing files are skipped.
    pub fn fetch(&self, item: &WorkItem, dest_dir: &Path, sink: &dyn ProgressSink) -> FetchResult {
        match self.try_fetch(item, dest_dir, sink) {
            Ok(result) => result,
            Err(err) => {
                warn!(identifier = item.identifier(), error = %err, "fetch failed");
                FetchResult::Failed(err)
            }
        }
    }

    fn try_fetch(
        &self,
        item: &WorkItem,
        dest_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, HarvestError> {
        fs_util::ensure_dir(dest_dir)?;
        let destination = dest_dir.join(item.destination_name());
        if destination.exists() {
            debug!(identifier = item.identifier(), "destination exists, skipping");
            return Ok(FetchResult::Skipped {
                reason: ALREADY_PRESENT.to_string(),
            });
        }

        sink.event(ProgressEvent::phase(format!(
            "phase=Fetch; {}",
            item.identifier()
        )));
        let start = Instant::now();
        let response = self.transport.open_stream(item.location())?;
        if !response.is_success() {
            return Err(HarvestError::TransportStatus {
                location: item.location().to_string(),
                status: response.status,
            });
        }
        let declared = response.content_length;
        let mut body = response.body;

        let mut staged = Builder::new()
            .prefix(&format!(".{}.", item.destination_name()))
            .suffix(".part")
            .tempfile_in(dest_dir)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut received = 0u64;
        loop {
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(HarvestError::Transport(format!(
                        "{} after {received} bytes: {err}",
                        item.location()
                    )));
                }
            };
            staged
                .write_all(&buffer[..read])
                .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
            received += read as u64;
            sink.event(ProgressEvent::transfer(
                item.identifier(),
                TransferProgress { received, declared },
                start.elapsed(),
            ));
        }

        if let Some(expected) = declared {
            if received < expected {
                return Err(HarvestError::Truncated {
                    location: item.location().to_string(),
                    expected,
                    received,
                });
            }
        }

        staged
            .as_file()
            .sync_all()
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        staged.persist(&destination).map_err(|err| {
            HarvestError::Filesystem(format!("rename into {}: {}", destination.display(), err.error))
        })?;

        let elapsed = start.elapsed();
        info!(
            identifier = item.identifier(),
            bytes = received,
            elapsed_ms = elapsed.as_millis() as u64,
            "fetched"
        );
        Ok(FetchResult::Succeeded {
            bytes_written: received,
            elapsed,
            destination,
        })
    }
}
