use config::{Config, File};
use sealstate_encryption::{Diagnostics, EncryptionConfig};
use std::borrow::Cow;
use std::path::Path;
use tracing::info;

#[sealstate_derive::encryption_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },

    #[error("Invalid encryption configuration in {path}:\n{diagnostics}")]
    Invalid { path: String, diagnostics: Diagnostics },
}

/// Loads the base encryption configuration from a file.
///
/// The format is inferred from the file extension (`.json`, `.toml`). Without a path an
/// empty configuration is returned, so `TF_ENCRYPTION` alone can configure encryption.
///
/// Warnings are returned alongside the configuration.
///
/// # Errors
/// * [`ConfigError::Config`] if the file is missing or unreadable.
/// * [`ConfigError::Invalid`] if the content is not a valid encryption configuration.
pub fn load_config(
    path: Option<&Path>,
) -> Result<(EncryptionConfig, Diagnostics), ConfigError> {
    let Some(path) = path else {
        return Ok((EncryptionConfig::default(), Diagnostics::new()));
    };

    info!("Loading encryption configuration from {}", path.display());

    let value = Config::builder()
        .add_source(File::from(path).required(true))
        .build()
        .context(format!("Failed to read {}", path.display()))?
        .try_deserialize::<serde_json::Value>()
        .context("Failed to deserialize encryption configuration")?;

    let source = path.display().to_string();
    match EncryptionConfig::from_value(&source, value) {
        (Some(config), diagnostics) => Ok((config, diagnostics)),
        (None, diagnostics) => Err(ConfigError::Invalid { path: source, diagnostics }),
    }
}
