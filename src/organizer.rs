use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{ARCHIVE_EXTENSION, PartitionKey};
use crate::error::HarvestError;
use crate::fs_util;
use crate::inventory;

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub archive_name: String,
    pub partition_key: PartitionKey,
    pub member_names: std::collections::BTreeSet<String>,
    pub destination: PathBuf,
}

#[derive(Debug)]
pub enum OrganizeResult {
    Organized(ArchiveEntry),
    Failed(HarvestError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub archive: String,
    pub outcome: String,
    pub partition: Option<String>,
    pub members: usize,
    pub error: Option<String>,
}

impl ArchiveReport {
    pub fn from_result(archive: &str, result: &OrganizeResult) -> Self {
        match result {
            OrganizeResult::Organized(entry) => Self {
                archive: archive.to_string(),
                outcome: "organized".to_string(),
                partition: Some(entry.partition_key.to_string()),
                members: entry.member_names.len(),
                error: None,
            },
            OrganizeResult::Failed(err) => Self {
                archive: archive.to_string(),
                outcome: "failed".to_string(),
                partition: None,
                members: 0,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganizeReport {
    pub organized: usize,
    pub failed: usize,
    pub archives: Vec<ArchiveReport>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveOrganizer;

impl ArchiveOrganizer {
    pub fn organize(&self, archive_path: &Path, target_root: &Path) -> OrganizeResult {
        match self.try_organize(archive_path, target_root) {
            Ok(entry) => {
                info!(
                    archive = %entry.archive_name,
                    partition = %entry.partition_key,
                    members = entry.member_names.len(),
                    "archive organized"
                );
                OrganizeResult::Organized(entry)
            }
            Err(err) => {
                warn!(archive = %archive_path.display(), error = %err, "archive not organized");
                OrganizeResult::Failed(err)
            }
        }
    }

    pub fn organize_dir(
        &self,
        source_dir: &Path,
        target_root: &Path,
    ) -> Result<OrganizeReport, HarvestError> {
        let archives = inventory::snapshot(source_dir)?
            .into_iter()
            .filter(|name| {
                Path::new(name)
                    .extension()
                    .map(|ext| ext == ARCHIVE_EXTENSION)
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        if archives.is_empty() {
            info!(dir = %source_dir.display(), "no archives to organize");
        }
        fs_util::ensure_dir(target_root)?;

        let mut report = OrganizeReport::default();
        for name in archives {
            let result = self.organize(&source_dir.join(&name), target_root);
            match result {
                OrganizeResult::Organized(_) => report.organized += 1,
                OrganizeResult::Failed(_) => report.failed += 1,
            }
            report.archives.push(ArchiveReport::from_result(&name, &result));
        }
        Ok(report)
    }

    fn try_organize(
        &self,
        archive_path: &Path,
        target_root: &Path,
    ) -> Result<ArchiveEntry, HarvestError> {
        let archive_name = archive_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| HarvestError::InvalidName(archive_path.display().to_string()))?
            .to_string();
        let partition_key = PartitionKey::from_archive_name(&archive_name)?;
        let corrupt = |message: String| HarvestError::CorruptArchive {
            archive: archive_name.clone(),
            message,
        };

        let file = File::open(archive_path).map_err(|err| corrupt(err.to_string()))?;
        let destination = target_root
            .join(&partition_key.category)
            .join(&partition_key.subpartition);
        fs_util::ensure_dir(&destination)?;

        let mut archive = tar::Archive::new(file);
        let entries = archive.entries().map_err(|err| corrupt(err.to_string()))?;

        let mut member_names = std::collections::BTreeSet::new();
        for entry in entries {
            let mut entry = entry.map_err(|err| corrupt(err.to_string()))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let stored = entry
                .path()
                .map_err(|err| corrupt(err.to_string()))?
                .into_owned();
            let Some(base_name) = stored.file_name().map(|name| name.to_os_string()) else {
                debug!(member = %stored.display(), "member without a file name skipped");
                continue;
            };

            let target = destination.join(&base_name);
            let mut output = File::create(&target).map_err(|err| {
                HarvestError::Filesystem(format!("create {}: {err}", target.display()))
            })?;
            io::copy(&mut entry, &mut output).map_err(|err| corrupt(err.to_string()))?;
            member_names.insert(base_name.to_string_lossy().into_owned());
        }

        Ok(ArchiveEntry {
            archive_name: archive_name.clone(),
            partition_key,
            member_names,
            destination,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;

    use super::*;

    fn build_tar(members: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, path, data.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn flattens_member_paths() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("en_2019.tar");
        fs::write(
            &archive,
            build_tar(&[("a/b/file1", "one"), ("x/file2", "two")]),
        )
        .unwrap();
        let target = temp.path().join("organized");

        let result = ArchiveOrganizer.organize(&archive, &target);

        let entry = assert_matches!(result, OrganizeResult::Organized(entry) => entry);
        assert_eq!(entry.partition_key, PartitionKey::new("en", "2019"));
        let partition = target.join("en").join("2019");
        assert_eq!(fs::read(partition.join("file1")).unwrap(), b"one");
        assert_eq!(fs::read(partition.join("file2")).unwrap(), b"two");
        assert!(!partition.join("a").exists());
        assert!(!partition.join("x").exists());
        assert!(archive.exists());
    }

    #[test]
    fn invalid_name_creates_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("onlyoneword.tar");
        fs::write(&archive, build_tar(&[("f", "x")])).unwrap();
        let target = temp.path().join("organized");

        let result = ArchiveOrganizer.organize(&archive, &target);

        assert_matches!(result, OrganizeResult::Failed(HarvestError::InvalidName(_)));
        assert!(!target.exists());
    }

    #[test]
    fn missing_archive_creates_no_partition_dir() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("organized");

        let result = ArchiveOrganizer.organize(&temp.path().join("en_2019.tar"), &target);

        assert_matches!(
            result,
            OrganizeResult::Failed(HarvestError::CorruptArchive { .. })
        );
        assert!(!target.join("en").exists());
    }

    #[test]
    fn corrupt_archive_keeps_members_already_written() {
        let temp = tempfile::tempdir().unwrap();
        let mut bytes = build_tar(&[("dir/good.wav", "pcm")]);
        bytes.truncate(bytes.len() - 1024);
        bytes.extend(std::iter::repeat_n(0xFFu8, 512));
        let archive = temp.path().join("fr_2020.tar");
        fs::write(&archive, &bytes).unwrap();
        let target = temp.path().join("organized");

        let result = ArchiveOrganizer.organize(&archive, &target);

        assert_matches!(
            result,
            OrganizeResult::Failed(HarvestError::CorruptArchive { .. })
        );
        assert!(target.join("fr").join("2020").join("good.wav").exists());
        assert!(archive.exists());
    }

    #[test]
    fn rerun_overwrites_without_duplicates() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("de_2010.tar");
        fs::write(&archive, build_tar(&[("n/one.wav", "1")])).unwrap();
        let target = temp.path().join("organized");

        ArchiveOrganizer.organize(&archive, &target);
        let result = ArchiveOrganizer.organize(&archive, &target);

        assert_matches!(result, OrganizeResult::Organized(_));
        let names = inventory::snapshot(&target.join("de").join("2010")).unwrap();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn organize_dir_reports_and_skips_bad_archives() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("downloads");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("en_2019.tar"), build_tar(&[("a.wav", "a")])).unwrap();
        fs::write(source.join("broken.tar"), build_tar(&[("b.wav", "b")])).unwrap();
        fs::write(source.join("notes.txt"), b"ignored").unwrap();
        let target = temp.path().join("organized");

        let report = ArchiveOrganizer.organize_dir(&source, &target).unwrap();

        assert_eq!(report.organized, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.archives.len(), 2);
        assert_eq!(report.archives[0].archive, "broken.tar");
        assert!(target.join("en").join("2019").join("a.wav").exists());
    }
}
