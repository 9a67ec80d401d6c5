use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "neutrino_tau.toml";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory handed to the native engine on creation.
    pub engine_path: PathBuf,
    pub default_voice: Option<String>,
    /// `tracing` filter directive, e.g. `info` or `neutrino_tau_bridge=debug`.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::new(),
            default_voice: None,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))
    }

    /// Reads `neutrino_tau.toml` from `dir` when present. A missing
    /// `engine_path` (or a missing file) falls back to `dir` itself.
    pub fn for_engine_dir(dir: &Path) -> anyhow::Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            Self::default()
        };
        if config.engine_path.as_os_str().is_empty() {
            config.engine_path = dir.to_path_buf();
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
        std::fs::write(path, text)
            .map_err(|e| anyhow::anyhow!("Failed to write config file {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_defaults_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::for_engine_dir(dir.path()).unwrap();
        assert_eq!(config.engine_path, dir.path());
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.default_voice, None);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "engine_path = \"/opt/NEUTRINO\"\ndefault_voice = \"yoko\"\n",
        )
        .unwrap();

        let config = EngineConfig::for_engine_dir(dir.path()).unwrap();
        assert_eq!(config.engine_path, PathBuf::from("/opt/NEUTRINO"));
        assert_eq!(config.default_voice.as_deref(), Some("yoko"));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = EngineConfig {
            engine_path: PathBuf::from("/opt/NEUTRINO"),
            default_voice: Some("kiritan".into()),
            log_filter: "debug".into(),
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "engine_path = [").unwrap();
        let err = EngineConfig::for_engine_dir(dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }
}
