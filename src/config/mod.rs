// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Prefix for environment overrides, e.g. `RELAY__RELAY__TIMEOUT_SECS=10`.
pub const ENV_PREFIX: &str = "RELAY";

/// Load configuration from a file (YAML or JSON), then apply environment overrides.
///
/// A missing file is not an error: the defaults are used instead.
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let config = if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let contents = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        parse_config(path, &contents)?
    } else {
        tracing::warn!("Config file {} not found, using defaults", path.display());
        Config::default()
    };

    let config = apply_env_overrides(config)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(path: &Path, contents: &str) -> Result<Config> {
    let extension = path.extension().and_then(|s| s.to_str());
    if extension == Some("yaml") || extension == Some("yml") {
        serde_yaml::from_str(contents).context("Failed to parse YAML config")
    } else {
        serde_json::from_str(contents).context("Failed to parse JSON config")
    }
}

fn apply_env_overrides(config: Config) -> Result<Config> {
    let base = ::config::Config::try_from(&config).context("Failed to stage config")?;

    ::config::Config::builder()
        .add_source(base)
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to merge environment overrides")?
        .try_deserialize()
        .context("Invalid configuration after environment overrides")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(extension: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("token-relay-{}.{}", uuid::Uuid::new_v4(), extension))
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let path = temp_path("yaml");
        tokio::fs::write(
            &path,
            "server:\n  port: 8181\nrelay:\n  timeout_secs: 5\n  redirect_mode: rewrite\n",
        )
        .await
        .unwrap();

        let config = load_config(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(config.server.port, 8181);
        assert_eq!(config.relay.timeout_secs, 5);
        assert_eq!(config.relay.redirect_mode, RedirectMode::Rewrite);
        assert_eq!(config.relay.route_prefix, "/api/proxy");
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let path = temp_path("json");
        tokio::fs::write(
            &path,
            r#"{"relay": {"allowed_origins": ["https://api.example.com"]}, "metrics": {"enabled": false}}"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(config.relay.allowed_origins, vec!["https://api.example.com"]);
        assert!(!config.metrics.enabled);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let config = load_config(temp_path("yaml")).await.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.relay.user_id_header, "new-api-user");
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let path = temp_path("yaml");
        tokio::fs::write(&path, "relay:\n  route_prefix: \"/api/\"\n")
            .await
            .unwrap();

        let result = load_config(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(result.is_err());
    }
}
