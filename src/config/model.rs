use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, rename = "registryDir")]
    pub registry_dir: Option<String>,
    #[serde(default, rename = "logDir")]
    pub log_dir: Option<String>,
    #[serde(default, rename = "logKeep")]
    pub log_keep: Option<usize>,
    #[serde(default, rename = "logGroup")]
    pub log_group: Option<String>,
    #[serde(default, rename = "mapperDir")]
    pub mapper_dir: Option<String>,
    #[serde(default, rename = "mountOptions")]
    pub mount_options: Option<String>,
    #[serde(default, rename = "settleSeconds")]
    pub settle_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub registry_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_keep: usize,
    pub log_group: String,
    pub mapper_dir: PathBuf,
    pub mount_options: String,
    pub settle: Duration,
}
