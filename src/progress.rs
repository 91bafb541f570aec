use std::time::Duration;

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub received: u64,
    pub declared: Option<u64>,
}

impl TransferProgress {
    pub fn fraction(&self) -> Option<f64> {
        match self.declared {
            Some(0) | None => None,
            Some(total) => Some(self.received as f64 / total as f64),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    pub transfer: Option<TransferProgress>,
}

impl ProgressEvent {
    pub fn phase(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
            transfer: None,
        }
    }

    pub fn transfer(identifier: &str, progress: TransferProgress, elapsed: Duration) -> Self {
        Self {
            message: format!("fetch.progress {identifier}"),
            elapsed: Some(elapsed),
            transfer: Some(progress),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.transfer {
            Some(transfer) => debug!(
                message = %event.message,
                received = transfer.received,
                declared = ?transfer.declared,
                percent = ?transfer.fraction().map(|f| (f * 100.0).round())
            ),
            None => info!(message = %event.message, elapsed_ms = ?event.elapsed.map(|e| e.as_millis())),
        }
    }
}
