use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{PartitionKey, WorkItem};
use crate::error::HarvestError;

pub const DEFAULT_BASE_URL: &str = "https://dl.fbaipublicfiles.com/voxpopuli/audios";

const LANGUAGES: &[&str] = &[
    "en", "de", "fr", "es", "pl", "it", "ro", "hu", "cs", "nl", "fi", "hr", "sk", "sl", "et", "lt",
    "pt", "bg", "el", "lv", "mt", "sv", "da",
];
const FIRST_YEAR: u16 = 2009;
const LAST_YEAR: u16 = 2020;

pub trait Catalog: Send + Sync {
    fn base_url(&self) -> &str;
    fn list_partitions(&self, subset: &str) -> Result<Vec<PartitionKey>, HarvestError>;

    fn location(&self, partition: &PartitionKey) -> String {
        format!(
            "{}/{}",
            self.base_url().trim_end_matches('/'),
            partition.archive_name()
        )
    }

    fn work_items(&self, subset: &str) -> Result<Vec<WorkItem>, HarvestError> {
        self.list_partitions(subset)?
            .iter()
            .map(|partition| WorkItem::from_location(&self.location(partition)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetDef {
    pub categories: Vec<String>,
    pub subpartitions: Vec<String>,
}

impl SubsetDef {
    fn partitions(&self) -> Vec<PartitionKey> {
        self.categories
            .iter()
            .flat_map(|category| {
                self.subpartitions
                    .iter()
                    .map(move |sub| PartitionKey::new(category.clone(), sub.clone()))
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct StaticCatalog {
    base_url: String,
    subsets: BTreeMap<String, SubsetDef>,
}

impl StaticCatalog {
    pub fn new(base_url: impl Into<String>, subsets: BTreeMap<String, SubsetDef>) -> Self {
        Self {
            base_url: base_url.into(),
            subsets,
        }
    }

    pub fn builtin() -> Self {
        let languages = to_strings(LANGUAGES);
        let years = (FIRST_YEAR..=LAST_YEAR)
            .map(|year| year.to_string())
            .collect::<Vec<_>>();
        let years_with_second_half = years
            .iter()
            .cloned()
            .chain(years.iter().map(|year| format!("{year}_2")))
            .collect::<Vec<_>>();

        let mut subsets = BTreeMap::new();
        subsets.insert(
            "400k".to_string(),
            SubsetDef {
                categories: languages.clone(),
                subpartitions: years_with_second_half.clone(),
            },
        );
        subsets.insert(
            "100k".to_string(),
            SubsetDef {
                categories: languages.clone(),
                subpartitions: years.clone(),
            },
        );
        subsets.insert(
            "10k".to_string(),
            SubsetDef {
                categories: languages.clone(),
                subpartitions: to_strings(&["2019", "2020"]),
            },
        );
        subsets.insert(
            "asr".to_string(),
            SubsetDef {
                categories: to_strings(&["original"]),
                subpartitions: years.clone(),
            },
        );
        for language in &languages {
            subsets.insert(
                language.clone(),
                SubsetDef {
                    categories: vec![language.clone()],
                    subpartitions: years.clone(),
                },
            );
            subsets.insert(
                format!("{language}_v2"),
                SubsetDef {
                    categories: vec![language.clone()],
                    subpartitions: years_with_second_half.clone(),
                },
            );
        }

        Self::new(DEFAULT_BASE_URL, subsets)
    }

    pub fn rebased(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            subsets: self.subsets,
        }
    }

    pub fn subset_names(&self) -> impl Iterator<Item = &str> {
        self.subsets.keys().map(String::as_str)
    }
}

impl Catalog for StaticCatalog {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn list_partitions(&self, subset: &str) -> Result<Vec<PartitionKey>, HarvestError> {
        self.subsets
            .get(subset)
            .map(SubsetDef::partitions)
            .ok_or_else(|| HarvestError::UnknownSubset {
                subset: subset.to_string(),
                known: format!(
                    "known subsets: {}",
                    self.subset_names().collect::<Vec<_>>().join(", ")
                ),
            })
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
