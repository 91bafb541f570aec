use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::HarvestError;
use crate::fs_util;

pub fn snapshot(dir: &Path) -> Result<BTreeSet<String>, HarvestError> {
    if !dir.is_dir() {
        return Err(HarvestError::DirectoryNotFound(dir.to_path_buf()));
    }
    let entries = fs::read_dir(dir)
        .map_err(|err| HarvestError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let file_type = entry
            .file_type()
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        if file_type.is_file() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Option<Duration>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl PollOptions {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            cancel: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

/// Re-snapshots `dir` until it holds at least `expected_count` files.
/// `on_new` sees every name once, the first time it shows up.
pub fn poll_until<F>(
    dir: &Path,
    expected_count: usize,
    options: &PollOptions,
    mut on_new: F,
) -> Result<BTreeSet<String>, HarvestError>
where
    F: FnMut(&str),
{
    poll_loop(dir, expected_count, options, |_, added| {
        for name in added {
            on_new(name);
        }
        Ok(())
    })
}

pub fn watch(
    dir: &Path,
    manifest: &Path,
    expected_count: usize,
    options: &PollOptions,
) -> Result<BTreeSet<String>, HarvestError> {
    poll_loop(dir, expected_count, options, |current, added| {
        if added.is_empty() {
            return Ok(());
        }
        for name in added {
            info!(name = name.as_str(), total = current.len(), "new file observed");
        }
        write_manifest(manifest, current)
    })
}

pub fn write_manifest(path: &Path, names: &BTreeSet<String>) -> Result<(), HarvestError> {
    fs_util::write_atomic(path, &fs_util::lines_to_bytes(names))
}

fn poll_loop<F>(
    dir: &Path,
    expected_count: usize,
    options: &PollOptions,
    mut on_update: F,
) -> Result<BTreeSet<String>, HarvestError>
where
    F: FnMut(&BTreeSet<String>, &[String]) -> Result<(), HarvestError>,
{
    let started = Instant::now();
    let mut previous = BTreeSet::new();
    loop {
        let current = snapshot(dir)?;
        let added = current.difference(&previous).cloned().collect::<Vec<_>>();
        on_update(&current, &added)?;
        if current.len() >= expected_count {
            return Ok(current);
        }
        if options.cancelled() {
            return Err(HarvestError::Cancelled);
        }

        let mut pause = options.interval;
        if let Some(timeout) = options.timeout {
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(HarvestError::PollTimeout {
                    dir: dir.to_path_buf(),
                    expected: expected_count,
                    observed: current.len(),
                });
            }
            pause = pause.min(timeout - waited);
        }
        debug!(observed = current.len(), expected = expected_count, "waiting");
        previous = current;
        thread::sleep(pause);
    }
}
