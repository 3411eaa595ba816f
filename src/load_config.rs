use anyhow::Result;
use cms_sync_core::contract::ResourceKind;
use cms_sync_core::synchronise::validate_filter;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Optional settings file. Every field may be overridden by the matching flag or environment
/// variable; secrets are best left to the environment.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub otp: Option<String>,
    pub only: Option<Vec<ResourceKind>>,
    pub except: Option<Vec<ResourceKind>>,
    pub src: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub roles_filter: Option<Value>,
    pub folders_filter: Option<Value>,
}

/// Loads a YAML settings file and validates its filters.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: FileConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.only.is_some() && config.except.is_some() {
        error!(config_path = ?path_ref, "Config sets both only and except");
        anyhow::bail!("Config file cannot set both 'only' and 'except'");
    }

    config.roles_filter = config.roles_filter.map(validate_filter).transpose()?;
    config.folders_filter = config.folders_filter.map(validate_filter).transpose()?;

    info!(
        config_path = ?path_ref,
        host = ?config.host,
        has_token = config.token.is_some(),
        "Config loaded successfully"
    );
    Ok(config)
}
