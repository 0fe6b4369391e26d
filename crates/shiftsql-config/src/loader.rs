use std::path::{Path, PathBuf};

use shiftsql_common::{Error, Result};
use tracing::info;

use crate::model::AppConfig;

const YAML_FILE: &str = "shiftsql.yml";
const TOML_FILE: &str = "shiftsql.toml";

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Loader rooted at the current working directory.
    pub fn new() -> Self {
        Self::with_dir(".")
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn load(&self) -> Result<AppConfig> {
        let yaml_path = self.config_dir.join(YAML_FILE);
        let toml_path = self.config_dir.join(TOML_FILE);

        if yaml_path.exists() {
            Self::load_file(&yaml_path)
        } else if toml_path.exists() {
            Self::load_file(&toml_path)
        } else {
            info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// Load an explicit config file, picking the format from its extension.
    pub fn load_file(path: &Path) -> Result<AppConfig> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let config = match ext.as_deref() {
            Some("yml") | Some("yaml") => {
                info!("loading config from {}", path.display());
                let contents = std::fs::read_to_string(path)?;
                serde_yaml::from_str(&contents)
                    .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))?
            }
            Some("toml") => {
                info!("loading config from {}", path.display());
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)
                    .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))?
            }
            _ => {
                return Err(Error::Config(format!(
                    "unsupported config file extension: {}",
                    path.display()
                )));
            }
        };

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
