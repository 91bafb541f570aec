use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("request for {location} returned status {status}")]
    TransportStatus { location: String, status: u16 },

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("stream for {location} ended after {received} of {expected} bytes")]
    Truncated {
        location: String,
        expected: u64,
        received: u64,
    },

    #[error("queue source {path} could not be read: {reason}")]
    #[diagnostic(help("check that the queue file exists and is readable"))]
    MalformedQueue { path: PathBuf, reason: String },

    #[error("archive name does not split into category and partition: {0}")]
    InvalidName(String),

    #[error("archive {archive} is corrupt: {message}")]
    CorruptArchive { archive: String, message: String },

    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("timed out waiting for {expected} files in {dir} (saw {observed})")]
    PollTimeout {
        dir: PathBuf,
        expected: usize,
        observed: usize,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("unknown subset: {subset}")]
    UnknownSubset {
        subset: String,
        #[help]
        known: String,
    },

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl HarvestError {
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HarvestError::TransportStatus { .. }
                | HarvestError::Transport(_)
                | HarvestError::Truncated { .. }
        )
    }
}
