use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use partition_harvest::catalog::{Catalog, SubsetDef};
use partition_harvest::config::{CatalogConfig, Config, ConfigLoader, TransportConfig};
use partition_harvest::domain::PartitionKey;
use partition_harvest::error::HarvestError;

#[test]
fn resolve_full_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("harvest.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "download_dir": "data/tars",
            "target_dir": "data/audio",
            "queue_file": "urls.txt",
            "chunk_size": 4096,
            "workers": 4,
            "organize": true,
            "poll_interval_ms": 250,
            "poll_timeout_ms": 60000,
            "transport": {"timeout_secs": 600, "max_retries": 5}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.download_dir, Utf8PathBuf::from("data/tars"));
    assert_eq!(resolved.target_dir, Utf8PathBuf::from("data/audio"));
    assert_eq!(resolved.queue_file, Some(Utf8PathBuf::from("urls.txt")));
    assert_eq!(resolved.chunk_size, 4096);
    assert_eq!(resolved.workers, 4);
    assert!(resolved.organize);
    assert_eq!(resolved.poll_interval, Duration::from_millis(250));
    assert_eq!(resolved.poll_timeout, Some(Duration::from_secs(60)));
    assert_eq!(resolved.transport.timeout, Some(Duration::from_secs(600)));
    assert_eq!(resolved.transport.max_retries, 5);
}

#[test]
fn custom_subsets_replace_builtin_tables() {
    let mut subsets = BTreeMap::new();
    subsets.insert(
        "tiny".to_string(),
        SubsetDef {
            categories: vec!["en".to_string(), "de".to_string()],
            subpartitions: vec!["2020".to_string()],
        },
    );
    let config = Config {
        catalog: Some(CatalogConfig {
            base_url: Some("https://mirror.example/audio".to_string()),
            subsets,
        }),
        ..Config::default()
    };

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    let partitions = resolved.catalog.list_partitions("tiny").unwrap();
    assert_eq!(
        partitions,
        vec![PartitionKey::new("en", "2020"), PartitionKey::new("de", "2020")]
    );
    assert_eq!(
        resolved.catalog.location(&partitions[0]),
        "https://mirror.example/audio/en_2020.tar"
    );
    assert_matches!(
        resolved.catalog.list_partitions("10k"),
        Err(HarvestError::UnknownSubset { known, .. }) if known == "known subsets: tiny"
    );
}

#[test]
fn zero_workers_and_chunk_size_are_clamped() {
    let config = Config {
        workers: Some(0),
        chunk_size: Some(0),
        transport: Some(TransportConfig::default()),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.workers, 1);
    assert_eq!(resolved.chunk_size, 1);
    assert_eq!(resolved.transport.timeout, None);
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("harvest.json");
    fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(HarvestError::ConfigParse(_))
    );
}
