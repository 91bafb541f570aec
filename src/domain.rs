use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::HarvestError;

pub const ARCHIVE_EXTENSION: &str = "tar";
pub const PARTITION_SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    identifier: String,
    location: String,
    destination_name: String,
}

impl WorkItem {
    pub fn from_location(location: &str) -> Result<Self, HarvestError> {
        let identifier = final_segment(location)?;
        Ok(Self {
            destination_name: identifier.clone(),
            identifier,
            location: location.trim().to_string(),
        })
    }

    pub fn with_destination(location: &str, destination_name: &str) -> Result<Self, HarvestError> {
        let destination_name = destination_name.trim();
        if destination_name.is_empty()
            || destination_name == "."
            || destination_name == ".."
            || destination_name.contains('/')
            || destination_name.contains('\\')
        {
            return Err(HarvestError::InvalidLocation(format!(
                "destination name `{destination_name}` is not a plain file name"
            )));
        }
        let mut item = Self::from_location(location)?;
        item.destination_name = destination_name.to_string();
        Ok(item)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier)
    }
}

fn final_segment(location: &str) -> Result<String, HarvestError> {
    let parsed = Url::parse(location.trim())
        .map_err(|err| HarvestError::InvalidLocation(format!("{location}: {err}")))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .ok_or_else(|| HarvestError::InvalidLocation(format!("{location}: no file name")))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub category: String,
    pub subpartition: String,
}

impl PartitionKey {
    pub fn new(category: impl Into<String>, subpartition: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subpartition: subpartition.into(),
        }
    }

    pub fn archive_name(&self) -> String {
        format!(
            "{}{PARTITION_SEPARATOR}{}.{ARCHIVE_EXTENSION}",
            self.category, self.subpartition
        )
    }

    pub fn from_archive_name(name: &str) -> Result<Self, HarvestError> {
        let stem = match name.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem,
            _ => name,
        };
        stem.parse()
            .map_err(|_| HarvestError::InvalidName(name.to_string()))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{PARTITION_SEPARATOR}{}",
            self.category, self.subpartition
        )
    }
}

impl FromStr for PartitionKey {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value.split(PARTITION_SEPARATOR).collect::<Vec<_>>();
        match parts.as_slice() {
            [category, subpartition] if !category.is_empty() && !subpartition.is_empty() => {
                Ok(Self::new(*category, *subpartition))
            }
            _ => Err(HarvestError::InvalidName(value.to_string())),
        }
    }
}
