use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Validated configuration for every scenesync component.
///
/// Every recognized option is enumerated here; unknown or missing required
/// fields fail at load, not mid-cycle.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SyncConfig {
    pub provider: ProviderSection,
    pub storage: StorageSection,
    pub catalog: CatalogSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub relay: RelaySection,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProviderSection {
    pub endpoint: String,
    pub username: String,
    pub token: String,
    pub datasets: Vec<String>,
    /// Optional path to a GeoJSON file restricting scene searches.
    #[serde(default)]
    pub region_geojson: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StorageSection {
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_true")]
    pub path_style: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CatalogSection {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Base URL of the relay; published as the asset href host.
    pub download_host: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineSection {
    pub ledger_path: PathBuf,
    pub working_dir: PathBuf,
    pub window_days: u32,
    pub max_scene_failures: u32,
    pub parallel_transfers: usize,
    /// Daily wall-clock run time, "HH:MM" in UTC.
    pub run_at: String,
    /// Wait after a failed cycle before retrying.
    pub retry_wait_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        EngineSection {
            ledger_path: PathBuf::from("scene-ledger.json"),
            working_dir: PathBuf::from("workdir"),
            window_days: 30,
            max_scene_failures: 5,
            parallel_transfers: 10,
            run_at: "09:00".to_string(),
            retry_wait_secs: 3600,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RelaySection {
    pub bind: String,
    pub url_ttl_secs: u32,
}

impl Default for RelaySection {
    fn default() -> Self {
        RelaySection {
            bind: "0.0.0.0:8080".to_string(),
            url_ttl_secs: 300,
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> usize {
    5
}

fn default_region() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

impl EngineSection {
    pub fn run_at(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at, "%H:%M")
            .with_context(|| format!("invalid engine.run_at '{}', expected HH:MM", self.run_at))
    }
}

impl RelaySection {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid relay.bind '{}'", self.bind))
    }
}

/// Load configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let config: SyncConfig =
        serde_yaml_ng::from_str(&content).with_context(|| "Failed to parse YAML configuration")?;

    validate_config(&config)?;
    Ok(config)
}

pub(crate) fn validate_config(config: &SyncConfig) -> Result<()> {
    for (name, value) in [
        ("provider.endpoint", &config.provider.endpoint),
        ("storage.endpoint", &config.storage.endpoint),
        ("catalog.endpoint", &config.catalog.endpoint),
        ("catalog.download_host", &config.catalog.download_host),
    ] {
        url::Url::parse(value).with_context(|| format!("{name} is not a valid URL: '{value}'"))?;
    }

    if config.provider.datasets.is_empty() {
        bail!("At least one provider dataset must be configured");
    }

    for dataset in &config.provider.datasets {
        if dataset.is_empty() {
            bail!("Dataset names cannot be empty");
        }
    }

    if config.storage.bucket.is_empty() {
        bail!("storage.bucket cannot be empty");
    }

    if config.engine.window_days == 0 {
        bail!("engine.window_days must be greater than 0");
    }

    if config.engine.parallel_transfers == 0 {
        bail!("engine.parallel_transfers must be greater than 0");
    }

    if config.relay.url_ttl_secs == 0 {
        bail!("relay.url_ttl_secs must be greater than 0");
    }

    config.engine.run_at()?;
    config.relay.bind_addr()?;

    Ok(())
}

const EXAMPLE_CONFIG: &str = r#"# scenesync configuration

provider:
  # Machine API of the imagery provider
  endpoint: "https://m2m.provider.example/api"
  username: "your-username"
  token: "your-api-token"
  datasets:
    - landsat_ot_c2_l1
  # Optional GeoJSON file restricting scene searches to a region:
  # region_geojson: geojson/region.json

storage:
  # S3-compatible object store holding transferred assets
  endpoint: "https://s3.storage.example"
  region: "default"
  bucket: "landsat"
  access_key: "your-access-key"
  secret_key: "your-secret-key"

catalog:
  # Spatiotemporal catalog API where items are registered
  endpoint: "https://catalog.example"
  username: "publisher"
  password: "your-password"
  # Base URL of the relay; published as the asset href host
  download_host: "http://relay.example:8080"

engine:
  ledger_path: "scene-ledger.json"
  working_dir: "workdir"
  window_days: 30
  max_scene_failures: 5
  parallel_transfers: 10
  # Daily run time, UTC
  run_at: "09:00"
  retry_wait_secs: 3600

relay:
  bind: "0.0.0.0:8080"
  url_ttl_secs: 300
"#;

/// Write the example configuration file; refuses to overwrite.
pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        bail!("Configuration file already exists: {}", path.display());
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> String {
        r#"
provider:
  endpoint: "https://m2m.provider.example/api"
  username: "tester"
  token: "secret"
  datasets: [landsat_ot_c2_l1]
storage:
  endpoint: "https://s3.storage.example"
  bucket: "landsat"
  access_key: "ak"
  secret_key: "sk"
catalog:
  endpoint: "https://catalog.example"
  username: "publisher"
  password: "pw"
  download_host: "http://relay.example:8080"
"#
        .to_string()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config: SyncConfig = serde_yaml_ng::from_str(&minimal_yaml()).unwrap();
        validate_config(&config).unwrap();

        assert_eq!(config.engine.window_days, 30);
        assert_eq!(config.engine.parallel_transfers, 10);
        assert_eq!(config.relay.url_ttl_secs, 300);
        assert_eq!(config.engine.run_at().unwrap().format("%H:%M").to_string(), "09:00");
        assert!(config.storage.path_style);
    }

    #[test]
    fn example_config_parses_and_validates() {
        let config: SyncConfig = serde_yaml_ng::from_str(EXAMPLE_CONFIG).unwrap();
        validate_config(&config).unwrap();
    }

    #[test]
    fn empty_dataset_list_is_rejected() {
        let yaml = minimal_yaml().replace("datasets: [landsat_ot_c2_l1]", "datasets: []");
        let config: SyncConfig = serde_yaml_ng::from_str(&yaml).unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn bad_run_at_is_rejected() {
        let mut config: SyncConfig = serde_yaml_ng::from_str(&minimal_yaml()).unwrap();
        config.engine.run_at = "nine".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn bad_bind_is_rejected() {
        let mut config: SyncConfig = serde_yaml_ng::from_str(&minimal_yaml()).unwrap();
        config.relay.bind = "localhost".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn create_example_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenesync.yaml");
        create_example_config(&path).unwrap();
        assert!(create_example_config(&path).is_err());
    }
}
