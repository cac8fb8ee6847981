use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PlantcareConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub models: ModelConfig,
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Upper bound on request bodies, which carry the uploaded photos.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Where identification uploads are kept after a successful plant match.
    pub images_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// Root of the local model cache. Holds `disease/` and `plant/` subdirectories.
    pub cache_dir: String,
    pub disease_model: String,
    pub plant_model: String,
    pub intra_threads: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    /// Bearer credential for the completions endpoint. Never defaulted.
    pub api_key: Option<String>,
    pub referer: Option<String>,
    pub title: Option<String>,
    pub plant_timeout_secs: u64,
    pub disease_timeout_secs: u64,
    /// Attach LLM disease details to diagnoses that matched a catalog record.
    pub attach_disease_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = default_plantcare_dir();
        Self {
            db_path: root.join("catalog.db").to_string_lossy().into_owned(),
            images_dir: root.join("images").to_string_lossy().into_owned(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let cache_dir = default_plantcare_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            cache_dir,
            disease_model: "resnet-50-plant-disease".into(),
            plant_model: "bioclip".into(),
            intra_threads: 4,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "tngtech/deepseek-r1t2-chimera:free".into(),
            api_key: None,
            referer: None,
            title: Some("Plant Care App".into()),
            plant_timeout_secs: 50,
            disease_timeout_secs: 60,
            attach_disease_details: true,
        }
    }
}

/// Returns `~/.plantcare/`
pub fn default_plantcare_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".plantcare")
}

/// Returns the default config file path: `~/.plantcare/config.toml`
pub fn default_config_path() -> PathBuf {
    default_plantcare_dir().join("config.toml")
}

impl PlantcareConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            PlantcareConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// `PLANTCARE_LLM_API_KEY` wins over `OPENROUTER_API_KEY`; both win over the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PLANTCARE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("PLANTCARE_IMAGES_DIR") {
            self.storage.images_dir = val;
        }
        if let Ok(val) = std::env::var("PLANTCARE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("PLANTCARE_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid PLANTCARE_PORT"),
            }
        }
        if let Ok(val) = std::env::var("PLANTCARE_MODELS_DIR") {
            self.models.cache_dir = val;
        }
        if let Ok(val) = std::env::var("PLANTCARE_LLM_BASE_URL") {
            self.enrichment.base_url = val;
        }
        if let Some(key) = std::env::var("PLANTCARE_LLM_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
        {
            self.enrichment.api_key = Some(key);
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn resolved_images_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.images_dir)
    }
}

impl ModelConfig {
    pub fn disease_dir(&self) -> PathBuf {
        expand_tilde(&self.cache_dir).join("disease")
    }

    pub fn plant_dir(&self) -> PathBuf {
        expand_tilde(&self.cache_dir).join("plant")
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PlantcareConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.log_level, "info");
        assert!(config.storage.db_path.ends_with("catalog.db"));
        assert!(config.resolved_images_dir().ends_with("images"));
        assert_eq!(config.enrichment.plant_timeout_secs, 50);
        assert_eq!(config.enrichment.disease_timeout_secs, 60);
        assert!(config.enrichment.api_key.is_none());
        assert!(config.models.plant_dir().ends_with("plant"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 9090

[storage]
db_path = "/tmp/test.db"

[enrichment]
model = "some/other-model"
attach_disease_details = false
"#;
        let config: PlantcareConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.enrichment.model, "some/other-model");
        assert!(!config.enrichment.attach_disease_details);
        // defaults still apply for unset fields
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.enrichment.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = PlantcareConfig::default();
        std::env::set_var("PLANTCARE_DB", "/tmp/override.db");
        std::env::set_var("PLANTCARE_LOG_LEVEL", "trace");
        std::env::set_var("PLANTCARE_PORT", "7070");
        std::env::set_var("PLANTCARE_LLM_API_KEY", "test-key");
        std::env::set_var("PLANTCARE_IMAGES_DIR", "/tmp/uploads");

        config.apply_env_overrides();

        assert_eq!(config.storage.images_dir, "/tmp/uploads");
        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.enrichment.api_key.as_deref(), Some("test-key"));

        // Clean up
        std::env::remove_var("PLANTCARE_DB");
        std::env::remove_var("PLANTCARE_LOG_LEVEL");
        std::env::remove_var("PLANTCARE_PORT");
        std::env::remove_var("PLANTCARE_LLM_API_KEY");
        std::env::remove_var("PLANTCARE_IMAGES_DIR");
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/lib/x.db"), PathBuf::from("/var/lib/x.db"));
    }
}
