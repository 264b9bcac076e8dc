use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if !config.backend_base_url.starts_with("http://")
        && !config.backend_base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation {
            message: format!(
                "backendBaseUrl must be an http(s) URL, got '{}'",
                config.backend_base_url
            ),
        });
    }

    if config.jpeg_quality == 0 || config.jpeg_quality > 100 {
        return Err(ConfigError::Validation {
            message: format!("jpegQuality must be in 1..=100, got {}", config.jpeg_quality),
        });
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "requestTimeoutSecs must be greater than zero".to_string(),
        });
    }

    Ok(())
}
