//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GalleryConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_USERNAME: &str = "GALLERY_USERNAME";
pub const ENV_PASSWORD: &str = "GALLERY_PASSWORD";
pub const ENV_TOKEN_SECRET: &str = "GALLERY_TOKEN_SECRET";
pub const ENV_REDIS_URL: &str = "GALLERY_REDIS_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, with environment overrides.
pub fn load_config(path: &Path) -> Result<GalleryConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GalleryConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overwrite credential and store settings from the environment.
///
/// Empty values are ignored so an exported-but-blank variable never wipes a
/// configured secret.
pub fn apply_env_overrides<F>(config: &mut GalleryConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(username) = get(ENV_USERNAME) {
        config.auth.username = username;
    }
    if let Some(password) = get(ENV_PASSWORD) {
        config.auth.password = password;
    }
    if let Some(secret) = get(ENV_TOKEN_SECRET) {
        config.auth.token_secret = secret;
    }
    if let Some(url) = get(ENV_REDIS_URL) {
        config.rate_limit.redis_url = Some(url);
    }
}
