use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::domain::WorkItem;
use crate::error::HarvestError;
use crate::fs_util;

#[derive(Debug, Clone)]
enum QueueLine {
    Item { identifier: String, raw: String },
    Unparsed(String),
}

impl QueueLine {
    fn raw(&self) -> &str {
        match self {
            QueueLine::Item { raw, .. } => raw,
            QueueLine::Unparsed(raw) => raw,
        }
    }

    fn is_item(&self, identifier: &str) -> bool {
        matches!(self, QueueLine::Item { identifier: id, .. } if id == identifier)
    }
}

#[derive(Debug, Clone)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
    lines: Vec<QueueLine>,
    backing: Option<PathBuf>,
}

impl WorkQueue {
    pub fn load(path: &Path, base_url: Option<&str>) -> Result<Self, HarvestError> {
        let content = fs::read_to_string(path).map_err(|err| HarvestError::MalformedQueue {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let mut items = Vec::new();
        let mut lines = Vec::new();
        let mut seen = HashSet::new();
        let mut destinations = HashSet::new();
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_line(trimmed, base_url) {
                Ok(item) => {
                    let identifier = item.identifier().to_string();
                    if seen.contains(&identifier) {
                        warn!(line = index + 1, %identifier, "duplicate queue entry ignored");
                        lines.push(QueueLine::Item {
                            identifier,
                            raw: trimmed.to_string(),
                        });
                    } else if destinations.contains(item.destination_name()) {
                        warn!(
                            line = index + 1,
                            %identifier,
                            destination = item.destination_name(),
                            "queue entry shares a destination with an earlier one, ignored"
                        );
                        lines.push(QueueLine::Unparsed(trimmed.to_string()));
                    } else {
                        seen.insert(identifier.clone());
                        destinations.insert(item.destination_name().to_string());
                        items.push(item);
                        lines.push(QueueLine::Item {
                            identifier,
                            raw: trimmed.to_string(),
                        });
                    }
                }
                Err(err) => {
                    warn!(line = index + 1, entry = trimmed, error = %err, "dropping queue entry");
                    lines.push(QueueLine::Unparsed(trimmed.to_string()));
                }
            }
        }

        debug!(path = %path.display(), items = items.len(), "queue loaded");
        Ok(Self {
            items,
            lines,
            backing: Some(path.to_path_buf()),
        })
    }

    pub fn from_items(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let mut seen = HashSet::new();
        let mut destinations = HashSet::new();
        let mut kept = Vec::new();
        let mut lines = Vec::new();
        for item in items {
            if seen.contains(item.identifier()) || destinations.contains(item.destination_name()) {
                warn!(identifier = item.identifier(), "duplicate work item ignored");
                continue;
            }
            seen.insert(item.identifier().to_string());
            destinations.insert(item.destination_name().to_string());
            lines.push(QueueLine::Item {
                identifier: item.identifier().to_string(),
                raw: item.location().to_string(),
            });
            kept.push(item);
        }
        Self {
            items: kept,
            lines,
            backing: None,
        }
    }

    pub fn write_file(path: &Path, entries: &[String]) -> Result<(), HarvestError> {
        fs_util::write_atomic(path, &fs_util::lines_to_bytes(entries))
    }

    pub fn path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.items.iter().any(|item| item.identifier() == identifier)
    }

    pub fn remove(&mut self, identifier: &str) -> Result<bool, HarvestError> {
        match self.stage_removal(identifier)? {
            Some(staged) => {
                staged.commit()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// First half of [`WorkQueue::remove`]: the replacement file is written
    /// and synced but the original is untouched until
    /// [`StagedQueue::commit`].
    pub fn stage_removal(
        &mut self,
        identifier: &str,
    ) -> Result<Option<StagedQueue<'_>>, HarvestError> {
        if !self.contains(identifier) {
            return Ok(None);
        }
        let temp = match &self.backing {
            Some(path) => {
                let remaining = self
                    .lines
                    .iter()
                    .filter(|line| !line.is_item(identifier))
                    .map(QueueLine::raw);
                Some(fs_util::stage_bytes(path, &fs_util::lines_to_bytes(remaining))?)
            }
            None => None,
        };
        Ok(Some(StagedQueue {
            queue: self,
            identifier: identifier.to_string(),
            temp,
        }))
    }
}

pub struct StagedQueue<'a> {
    queue: &'a mut WorkQueue,
    identifier: String,
    temp: Option<NamedTempFile>,
}

impl StagedQueue<'_> {
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp.as_ref().map(|temp| temp.path())
    }

    pub fn commit(self) -> Result<(), HarvestError> {
        if let (Some(temp), Some(path)) = (self.temp, &self.queue.backing) {
            fs_util::persist(temp, path)?;
        }
        let identifier = self.identifier.as_str();
        self.queue.items.retain(|item| item.identifier() != identifier);
        self.queue.lines.retain(|line| !line.is_item(identifier));
        debug!(identifier, "removed from queue");
        Ok(())
    }
}

fn parse_line(line: &str, base_url: Option<&str>) -> Result<WorkItem, HarvestError> {
    if let Some((name, location)) = line.split_once(": ") {
        if !name.contains("://") {
            return WorkItem::with_destination(location.trim(), name);
        }
    }
    if line.contains("://") {
        return WorkItem::from_location(line);
    }
    match base_url {
        Some(base) => WorkItem::from_location(&format!("{}/{line}", base.trim_end_matches('/'))),
        None => Err(HarvestError::InvalidLocation(format!(
            "bare entry `{line}` needs a base URL"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn write_queue(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("queue.txt");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_skips_blank_and_bad_lines() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_queue(
            temp.path(),
            "https://x/en_2019.tar\n\n   \nen_2020.tar\nfr_2019.tar: https://y/fr_2019.tar\n",
        );
        let queue = WorkQueue::load(&path, None).unwrap();
        let ids = queue
            .items()
            .iter()
            .map(WorkItem::identifier)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["en_2019.tar", "fr_2019.tar"]);
    }

    #[test]
    fn bare_names_resolve_against_base_url() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_queue(temp.path(), "en_2019.tar\n");
        let queue = WorkQueue::load(&path, Some("https://x/audios/")).unwrap();
        assert_eq!(queue.items()[0].location(), "https://x/audios/en_2019.tar");
    }

    #[test]
    fn named_entries_keep_destination_name() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_queue(temp.path(), "local.tar: https://x/remote.tar\n");
        let queue = WorkQueue::load(&path, None).unwrap();
        assert_eq!(queue.items()[0].identifier(), "remote.tar");
        assert_eq!(queue.items()[0].destination_name(), "local.tar");
    }

    #[test]
    fn duplicates_keep_first() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_queue(temp.path(), "https://x/a_1.tar\nhttps://y/a_1.tar\n");
        let queue = WorkQueue::load(&path, None).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.items()[0].location(), "https://x/a_1.tar");
    }

    #[test]
    fn missing_file_is_malformed_queue() {
        let temp = tempfile::tempdir().unwrap();
        let err = WorkQueue::load(&temp.path().join("absent.txt"), None).unwrap_err();
        assert_matches!(err, HarvestError::MalformedQueue { .. });
    }

    #[test]
    fn remove_rewrites_file_and_preserves_unparsed_lines() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_queue(
            temp.path(),
            "https://x/en_2019.tar\nnot-a-url\nhttps://x/fr_2019.tar\n",
        );
        let mut queue = WorkQueue::load(&path, None).unwrap();
        assert!(queue.remove("en_2019.tar").unwrap());
        assert!(!queue.remove("en_2019.tar").unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "not-a-url\nhttps://x/fr_2019.tar\n"
        );
        assert!(!queue.contains("en_2019.tar"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn uncommitted_stage_leaves_original_parseable() {
        let temp = tempfile::tempdir().unwrap();
        let original = "https://x/en_2019.tar\nhttps://x/fr_2019.tar\n";
        let path = write_queue(temp.path(), original);
        let mut queue = WorkQueue::load(&path, None).unwrap();

        let staged = queue.stage_removal("en_2019.tar").unwrap().unwrap();
        let temp_path = staged.temp_path().unwrap().to_path_buf();
        assert_eq!(
            fs::read_to_string(&temp_path).unwrap(),
            "https://x/fr_2019.tar\n"
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        let reread = WorkQueue::load(&path, None).unwrap();
        assert!(reread.contains("en_2019.tar"));
        drop(staged);

        assert!(queue.contains("en_2019.tar"));
        assert!(!temp_path.exists());
    }

    #[test]
    fn in_memory_queue_removal() {
        let mut queue = WorkQueue::from_items(vec![
            WorkItem::from_location("https://x/a_1.tar").unwrap(),
            WorkItem::from_location("https://x/a_1.tar").unwrap(),
        ]);
        assert_eq!(queue.len(), 1);
        assert!(queue.remove("a_1.tar").unwrap());
        assert!(queue.is_empty());
        assert!(queue.path().is_none());
    }

    #[test]
    fn shared_destination_keeps_first_and_preserves_line() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_queue(
            temp.path(),
            "a.tar: https://x/one.tar\nhttps://y/a.tar\nhttps://x/two.tar\n",
        );
        let mut queue = WorkQueue::load(&path, None).unwrap();
        let ids = queue
            .items()
            .iter()
            .map(WorkItem::identifier)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["one.tar", "two.tar"]);
        assert!(!queue.contains("a.tar"));

        assert!(queue.remove("one.tar").unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "https://y/a.tar\nhttps://x/two.tar\n"
        );
    }

    #[test]
    fn in_memory_queue_drops_shared_destination() {
        let queue = WorkQueue::from_items(vec![
            WorkItem::with_destination("https://x/one.tar", "a.tar").unwrap(),
            WorkItem::from_location("https://y/a.tar").unwrap(),
        ]);
        assert_eq!(queue.len(), 1);
        assert!(queue.contains("one.tar"));
    }

    #[test]
    fn dot_destinations_are_not_loaded() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_queue(
            temp.path(),
            "..: https://x/one.tar\n.: https://x/two.tar\nhttps://x/three.tar\n",
        );
        let queue = WorkQueue::load(&path, None).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(queue.contains("three.tar"));
    }
}
