use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::catalog::{DEFAULT_BASE_URL, StaticCatalog, SubsetDef};
use crate::error::HarvestError;
use crate::fetcher::DEFAULT_CHUNK_SIZE;
use crate::transport::TransportOptions;

pub const DEFAULT_CONFIG_FILE: &str = "harvest.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub download_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub target_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub queue_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub organize: Option<bool>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub poll_timeout_ms: Option<u64>,
    #[serde(default)]
    pub transport: Option<TransportConfig>,
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub subsets: BTreeMap<String, SubsetDef>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub download_dir: Utf8PathBuf,
    pub target_dir: Utf8PathBuf,
    pub queue_file: Option<Utf8PathBuf>,
    pub chunk_size: usize,
    pub workers: usize,
    pub organize: bool,
    pub poll_interval: Duration,
    pub poll_timeout: Option<Duration>,
    pub transport: TransportOptions,
    pub catalog: StaticCatalog,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// A missing default file means defaults; a missing explicit file is an
    /// error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(HarvestError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let transport_config = config.transport.unwrap_or_default();
        let defaults = TransportOptions::default();
        let transport = TransportOptions {
            timeout: transport_config.timeout_secs.map(Duration::from_secs),
            connect_timeout: transport_config
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            max_retries: transport_config
                .max_retries
                .unwrap_or(defaults.max_retries),
        };

        let catalog = match config.catalog {
            None => StaticCatalog::builtin(),
            Some(catalog) if catalog.subsets.is_empty() => {
                let builtin = StaticCatalog::builtin();
                let base_url = catalog
                    .base_url
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
                builtin.rebased(base_url)
            }
            Some(catalog) => StaticCatalog::new(
                catalog
                    .base_url
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                catalog.subsets,
            ),
        };

        Ok(ResolvedConfig {
            schema_version,
            download_dir: config
                .download_dir
                .unwrap_or_else(|| Utf8PathBuf::from("downloads")),
            target_dir: config
                .target_dir
                .unwrap_or_else(|| Utf8PathBuf::from("raw_audios")),
            queue_file: config.queue_file,
            chunk_size: config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1),
            workers: config.workers.unwrap_or(1).max(1),
            organize: config.organize.unwrap_or(false),
            poll_interval: Duration::from_millis(config.poll_interval_ms.unwrap_or(1000)),
            poll_timeout: config.poll_timeout_ms.map(Duration::from_millis),
            transport,
            catalog,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.download_dir, Utf8PathBuf::from("downloads"));
        assert_eq!(resolved.workers, 1);
        assert!(!resolved.organize);
        assert_eq!(resolved.poll_timeout, None);
        assert_eq!(resolved.transport.max_retries, 3);
        assert_eq!(resolved.catalog.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn base_url_override_keeps_builtin_subsets() {
        let config: Config =
            serde_json::from_str(r#"{"catalog": {"base_url": "https://mirror/audios"}}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.catalog.base_url(), "https://mirror/audios");
        assert!(resolved.catalog.list_partitions("10k").is_ok());
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let config = Config {
            schema_version: Some(7),
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(HarvestError::ConfigParse(_))
        );
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("missing.json");
        let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
        assert_matches!(err, HarvestError::ConfigRead(_));
    }
}
