//! Configuration resolution for menugen-ai
//!
//! Provider API keys resolve with ENV → TOML priority. A missing key is not
//! fatal: the service starts, warns, and the affected calls fail per dish (or
//! per menu, for extraction) with a non-transient `NotConfigured` error.

use menugen_common::config::TomlConfig;
use menugen_common::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::services::{AiServices, OpenAiClient, ReplicateClient};

/// Environment variable holding the OpenAI key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the Replicate key
pub const REPLICATE_API_KEY_ENV: &str = "REPLICATE_API_KEY";

/// Resolve an API key from the environment, then TOML
///
/// Warns when both sources carry a key, since only the environment one is used.
pub fn resolve_api_key(label: &str, env_var: &str, toml_key: Option<&str>) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "{} API key found in both environment ({}) and TOML. Using environment (highest priority).",
            label, env_var
        );
    }

    if let Some(key) = env_key {
        info!("{} API key loaded from environment variable", label);
        return Some(key);
    }

    if let Some(key) = toml_key {
        info!("{} API key loaded from TOML config", label);
        return Some(key.to_string());
    }

    warn!(
        "{} API key not configured. Set {} or add it to menugen.toml; calls to {} will fail.",
        label, env_var, label
    );
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Build the production vision/text/image clients
pub fn build_ai_services(config: &TomlConfig) -> Result<AiServices> {
    let openai_key = resolve_api_key(
        "OpenAI",
        OPENAI_API_KEY_ENV,
        config.openai_api_key.as_deref(),
    );
    let replicate_key = resolve_api_key(
        "Replicate",
        REPLICATE_API_KEY_ENV,
        config.replicate_api_key.as_deref(),
    );

    let openai = Arc::new(
        OpenAiClient::new(openai_key, &config.providers)
            .map_err(|e| Error::Config(format!("Failed to build OpenAI client: {}", e)))?,
    );
    let replicate = Arc::new(
        ReplicateClient::new(replicate_key, &config.providers)
            .map_err(|e| Error::Config(format!("Failed to build Replicate client: {}", e)))?,
    );

    Ok(AiServices {
        vision: openai.clone(),
        text: openai,
        image: replicate,
    })
}
