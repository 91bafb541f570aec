use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::{Builder, NamedTempFile};

use crate::error::HarvestError;

pub fn ensure_dir(path: &Path) -> Result<(), HarvestError> {
    fs::create_dir_all(path)
        .map_err(|err| HarvestError::Filesystem(format!("create {}: {err}", path.display())))
}

pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

pub fn stage_bytes(path: &Path, content: &[u8]) -> Result<NamedTempFile, HarvestError> {
    let parent = parent_dir(path);
    ensure_dir(parent)?;
    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let mut temp = Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(temp)
}

pub fn persist(temp: NamedTempFile, path: &Path) -> Result<(), HarvestError> {
    temp.persist(path)
        .map(|_| ())
        .map_err(|err| HarvestError::Filesystem(format!("replace {}: {}", path.display(), err.error)))
}

pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), HarvestError> {
    let temp = stage_bytes(path, content)?;
    persist(temp, path)
}

pub fn lines_to_bytes<I, S>(lines: I) -> Vec<u8>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("list.txt");
        write_atomic(&path, b"one\n").unwrap();
        write_atomic(&path, b"two\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two\n");
        let leftovers = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn dropped_stage_leaves_original() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("list.txt");
        fs::write(&path, "keep\n").unwrap();
        let staged = stage_bytes(&path, b"replace\n").unwrap();
        assert!(staged.path().exists());
        drop(staged);
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep\n");
    }

    #[test]
    fn lines_are_newline_terminated() {
        assert_eq!(lines_to_bytes(["a", "b"]), b"a\nb\n".to_vec());
        assert!(lines_to_bytes(Vec::<String>::new()).is_empty());
    }
}
