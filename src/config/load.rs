use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{Config, RuntimeConfig};
use crate::error::{ConfigError, Result};

pub const CONFIG_FILE: &str = "/etc/cryptbak.yaml";
const DEFAULT_REGISTRY_DIR: &str = "/etc/cryptbak";
const DEFAULT_LOG_DIR: &str = "/var/log/cryptbak";
const DEFAULT_LOG_KEEP: usize = 20;
const DEFAULT_LOG_GROUP: &str = "adm";
const DEFAULT_MAPPER_DIR: &str = "/dev/mapper";
const DEFAULT_MOUNT_OPTIONS: &str = "noatime";
const DEFAULT_SETTLE_SECONDS: u64 = 2;

/// Load the configuration file; a missing file means all defaults.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return parse_runtime(Config::default()),
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source: err,
            }
            .into())
        }
    };
    let cfg: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?
    };
    parse_runtime(cfg)
}

fn parse_runtime(cfg: Config) -> Result<RuntimeConfig> {
    let log_keep = cfg.log_keep.unwrap_or(DEFAULT_LOG_KEEP);
    if log_keep == 0 {
        return Err(ConfigError::Invalid("logKeep must be at least 1".to_string()).into());
    }
    let mount_options = cfg
        .mount_options
        .unwrap_or_else(|| DEFAULT_MOUNT_OPTIONS.to_string());
    if mount_options.trim().is_empty() || mount_options.contains(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!(
            "mountOptions {:?} must be a comma separated list without spaces",
            mount_options
        ))
        .into());
    }
    let registry_dir = absolute("registryDir", cfg.registry_dir, DEFAULT_REGISTRY_DIR)?;
    let log_dir = absolute("logDir", cfg.log_dir, DEFAULT_LOG_DIR)?;
    let mapper_dir = absolute("mapperDir", cfg.mapper_dir, DEFAULT_MAPPER_DIR)?;
    Ok(RuntimeConfig {
        registry_dir,
        log_dir,
        log_keep,
        log_group: cfg
            .log_group
            .unwrap_or_else(|| DEFAULT_LOG_GROUP.to_string()),
        mapper_dir,
        mount_options,
        settle: Duration::from_secs(cfg.settle_seconds.unwrap_or(DEFAULT_SETTLE_SECONDS)),
    })
}

fn absolute(key: &str, value: Option<String>, default: &str) -> Result<PathBuf> {
    let path = PathBuf::from(value.unwrap_or_else(|| default.to_string()));
    if !path.is_absolute() {
        return Err(ConfigError::Invalid(format!("{} {} must be absolute", key, path.display())).into());
    }
    Ok(path)
}
