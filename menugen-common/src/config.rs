//! Configuration loading and root folder resolution
//!
//! Configuration is layered: command line → environment → TOML file →
//! compiled defaults. A missing TOML file is never fatal; the service logs a
//! warning and starts with defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Name of the TOML file looked up inside the root folder
pub const CONFIG_FILE_NAME: &str = "menugen.toml";

/// Name of the SQLite database inside the root folder
pub const DATABASE_FILE_NAME: &str = "menugen.db";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the database (overridable by CLI / environment)
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub providers: ProviderConfig,
    /// API key for the vision and text generation service
    pub openai_api_key: Option<String>,
    /// API key for the image generation service
    pub replicate_api_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// Processing pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of dishes enriched concurrently per menu
    pub enrichment_width: usize,
    /// Upload size ceiling in bytes
    pub max_upload_bytes: usize,
    /// ISO currency code stamped on every dish
    pub base_currency: String,
    /// Wall-clock bound on the enrichment fan-out of one menu
    pub enrichment_timeout_secs: u64,
    /// Attempts per external call (1 = no retry)
    pub service_retry_attempts: u32,
    pub service_retry_initial_ms: u64,
    pub service_retry_max_ms: u64,
    /// Poll attempts for an asynchronous image prediction
    pub image_poll_attempts: u32,
    pub image_poll_initial_ms: u64,
    pub image_poll_max_ms: u64,
    /// Hard timeout for one image generation including all polls
    pub image_poll_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrichment_width: 3,
            max_upload_bytes: 8 * 1024 * 1024,
            base_currency: "USD".to_string(),
            enrichment_timeout_secs: 600,
            service_retry_attempts: 3,
            service_retry_initial_ms: 500,
            service_retry_max_ms: 4_000,
            image_poll_attempts: 10,
            image_poll_initial_ms: 1_000,
            image_poll_max_ms: 8_000,
            image_poll_timeout_secs: 60,
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.enrichment_width == 0 {
            return Err(Error::Config(
                "pipeline.enrichment_width must be at least 1".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config(
                "pipeline.max_upload_bytes must be greater than 0".to_string(),
            ));
        }
        if self.service_retry_attempts == 0 || self.image_poll_attempts == 0 {
            return Err(Error::Config(
                "retry and poll attempt counts must be at least 1".to_string(),
            ));
        }
        let currency = self.base_currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::Config(format!(
                "pipeline.base_currency must be a 3-letter ISO code, got '{}'",
                self.base_currency
            )));
        }
        Ok(())
    }
}

/// External model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub openai_base_url: String,
    pub replicate_base_url: String,
    pub vision_model: String,
    pub text_model: String,
    pub image_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openai_base_url: "https://api.openai.com/v1".to_string(),
            replicate_base_url: "https://api.replicate.com/v1".to_string(),
            vision_model: "gpt-4o".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            image_model: "black-forest-labs/flux-dev".to_string(),
        }
    }
}

impl TomlConfig {
    /// Apply `MENUGEN_*` environment overrides on top of the file values
    ///
    /// Unparsable values are ignored with a warning rather than aborting startup.
    pub fn apply_env_overrides(&mut self) {
        if let Some(level) = env_string("MENUGEN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(host) = env_string("MENUGEN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("MENUGEN_PORT") {
            self.server.port = port;
        }
        if let Some(width) = env_parse("MENUGEN_ENRICHMENT_WIDTH") {
            self.pipeline.enrichment_width = width;
        }
        if let Some(limit) = env_parse("MENUGEN_MAX_UPLOAD_BYTES") {
            self.pipeline.max_upload_bytes = limit;
        }
        if let Some(currency) = env_string("MENUGEN_BASE_CURRENCY") {
            self.pipeline.base_currency = currency;
        }
        if let Some(timeout) = env_parse("MENUGEN_ENRICHMENT_TIMEOUT_SECS") {
            self.pipeline.enrichment_timeout_secs = timeout;
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

/// Load TOML configuration from `path`
///
/// A missing file yields defaults with a warning. A file that exists but does
/// not parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using compiled defaults"
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Some(path) = env_string(env_var_name) {
        return PathBuf::from(path);
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("menugen"))
        .unwrap_or_else(|| PathBuf::from("./menugen_data"))
}

/// Create the root folder if missing and return the database path inside it
pub fn ensure_root_folder(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
        info!(path = %root.display(), "Created root folder");
    }
    Ok(root.join(DATABASE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = TomlConfig::default();
        assert_eq!(config.pipeline.enrichment_width, 3);
        assert_eq!(config.pipeline.max_upload_bytes, 8 * 1024 * 1024);
        assert_eq!(config.pipeline.base_currency, "USD");
        assert!(config.pipeline.validate().is_ok());
    }

    #[test]
    fn test_zero_width_rejected() {
        let pipeline = PipelineConfig {
            enrichment_width: 0,
            ..Default::default()
        };
        assert!(matches!(pipeline.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_currency_rejected() {
        let pipeline = PipelineConfig {
            base_currency: "DOLLARS".to_string(),
            ..Default::default()
        };
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [pipeline]
            enrichment_width = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.enrichment_width, 5);
        assert_eq!(config.pipeline.image_poll_attempts, 10);
        assert_eq!(config.server.port, 5780);
        assert_eq!(config.providers.vision_model, "gpt-4o");
    }

    #[test]
    fn test_cli_arg_wins_root_folder() {
        let toml_config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let resolved = resolve_root_folder(
            Some(Path::new("/from/cli")),
            "MENUGEN_TEST_UNSET_ROOT",
            &toml_config,
        );
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }
}
