use log::{ info, warn };
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key is not configured: set OPENAI_API_KEY or mount {0}")]
    MissingCredential(String),

    #[error("Failed to read API key file {path}: {source}")]
    SecretFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Resolves the upstream API key, preferring the environment value over the
/// mounted secret file. Both sources are trimmed; blank values count as absent.
pub fn resolve_api_key(
    env_value: Option<&str>,
    secret_file: impl AsRef<Path>
) -> Result<String, ConfigError> {
    if let Some(key) = env_value.map(str::trim).filter(|k| !k.is_empty()) {
        info!("API key loaded from environment");
        return Ok(key.to_string());
    }

    let path = secret_file.as_ref();
    match fs::read_to_string(path) {
        Ok(contents) => {
            let key = contents.trim();
            if key.is_empty() {
                warn!("API key file {} is empty", path.display());
                return Err(ConfigError::MissingCredential(path.display().to_string()));
            }
            info!("API key loaded from {}", path.display());
            Ok(key.to_string())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ConfigError::MissingCredential(path.display().to_string()))
        }
        Err(e) =>
            Err(ConfigError::SecretFile {
                path: path.display().to_string(),
                source: e,
            }),
    }
}
