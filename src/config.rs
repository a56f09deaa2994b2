use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::dashboard::DEFAULT_DASHBOARD_URL;
use crate::error::HarvestError;
use crate::executor::{Backoff, RetryBudget};
use crate::webdriver::WebDriverSettings;

pub const CONFIG_FILE_NAME: &str = "vahan-harvest.json";

/// States and union territories listed by the dashboard's state selector.
pub const DEFAULT_STATES: [&str; 35] = [
    "Andaman & Nicobar Island",
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chhattisgarh",
    "Chandigarh",
    "UT of DNH and DD",
    "Delhi",
    "Goa",
    "Gujarat",
    "Himachal Pradesh",
    "Haryana",
    "Jharkhand",
    "Jammu and Kashmir",
    "Karnataka",
    "Kerala",
    "Ladakh",
    "Lakshadweep",
    "Maharashtra",
    "Meghalaya",
    "Manipur",
    "Madhya Pradesh",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Punjab",
    "Puducherry",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Tripura",
    "Uttarakhand",
    "Uttar Pradesh",
    "West Bengal",
];

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub artifact_root: Option<String>,
    #[serde(default)]
    pub manifest_dir: Option<String>,
    #[serde(default)]
    pub states: Option<Vec<String>>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,
    #[serde(default)]
    pub backoff: Option<Backoff>,
    #[serde(default)]
    pub max_passes: Option<u32>,
    #[serde(default)]
    pub webdriver_url: Option<String>,
    #[serde(default)]
    pub dashboard_url: Option<String>,
    #[serde(default)]
    pub element_timeout_secs: Option<u64>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default)]
    pub headless: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub artifact_root: Utf8PathBuf,
    pub manifest_dir: Utf8PathBuf,
    pub states: Vec<String>,
    pub workers: usize,
    pub retry: RetryBudget,
    pub max_passes: u32,
    pub webdriver: WebDriverSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, else `./vahan-harvest.json`, else the user config file,
    /// else built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::default_locations().into_iter().find(|p| p.exists()),
        };

        let config = match config_path {
            Some(config_path) => {
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
                serde_json::from_str(&content)
                    .map_err(|err| HarvestError::ConfigParse(err.to_string()))?
            }
            None => {
                tracing::debug!("no config file found; using defaults");
                Config::default()
            }
        };

        Self::resolve_config(config)
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = BaseDirs::new() {
            locations.push(dirs.config_dir().join("vahan-harvest").join(CONFIG_FILE_NAME));
        }
        locations
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(HarvestError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let states = match config.states {
            Some(states) => states
                .into_iter()
                .map(|state| state.trim().to_string())
                .filter(|state| !state.is_empty())
                .collect::<Vec<_>>(),
            None => DEFAULT_STATES.iter().map(|state| state.to_string()).collect(),
        };
        if states.is_empty() {
            return Err(HarvestError::InvalidConfig("states must not be empty".to_string()));
        }

        let workers = config.workers.unwrap_or(10);
        if workers == 0 {
            return Err(HarvestError::InvalidConfig("workers must be at least 1".to_string()));
        }
        let max_attempts = config.max_attempts.unwrap_or(5);
        if max_attempts == 0 {
            return Err(HarvestError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let artifact_root = Utf8PathBuf::from(
            config
                .artifact_root
                .unwrap_or_else(|| "vahan_data".to_string()),
        );
        let manifest_dir = config
            .manifest_dir
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| artifact_root.join("manifests"));

        Ok(ResolvedConfig {
            schema_version,
            artifact_root,
            manifest_dir,
            states,
            workers,
            retry: RetryBudget::new(
                max_attempts,
                Duration::from_secs(config.retry_delay_secs.unwrap_or(15)),
                config.backoff.unwrap_or(Backoff::Fixed),
            ),
            max_passes: config.max_passes.unwrap_or(10).max(1),
            webdriver: WebDriverSettings {
                driver_url: config
                    .webdriver_url
                    .unwrap_or_else(|| "http://localhost:9515".to_string()),
                dashboard_url: config
                    .dashboard_url
                    .unwrap_or_else(|| DEFAULT_DASHBOARD_URL.to_string()),
                headless: config.headless.unwrap_or(true),
                element_timeout: Duration::from_secs(config.element_timeout_secs.unwrap_or(10)),
                download_timeout: Duration::from_secs(config.download_timeout_secs.unwrap_or(30)),
            },
        })
    }
}
