//! Shared configuration for the pillwatch panel.
//!
//! TOML config file + environment overlay, credential resolution
//! (env-var indirection + plaintext fallback), and translation to
//! `pillwatch_core::ControllerConfig`.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pillwatch_core::{ControllerConfig, TlsVerification};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured (set `token` or `token_env`)")]
    NoCredentials,

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config struct ──────────────────────────────────────────────

/// Top-level TOML configuration.
///
/// A single-instance config: the panel talks to exactly one
/// home-automation instance, so there is no profile table.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Instance base URL (e.g., "http://homeassistant.local:8123").
    pub url: Option<String>,

    /// Long-lived access token (plaintext — prefer `token_env`).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification (self-signed local installs).
    pub insecure: Option<bool>,

    /// Request timeout in seconds.
    pub timeout: Option<u64>,

    /// CSV dose-log location, shown in the panel header badge.
    /// Display-only: the backend integration owns the file.
    pub log_path: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "pillwatch", "pillwatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pillwatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load a Config from an explicit file path + environment.
///
/// Environment variables use the `PILLWATCH_` prefix
/// (e.g. `PILLWATCH_URL`, `PILLWATCH_TOKEN`).
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PILLWATCH_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the access token: `token_env` indirection first, plaintext
/// `token` second.
pub fn resolve_token(config: &Config) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = config.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref token) = config.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials)
}

// ── Translation to ControllerConfig ─────────────────────────────────

/// Build a `ControllerConfig` from the loaded config.
pub fn to_controller_config(config: &Config) -> Result<ControllerConfig, ConfigError> {
    let raw_url = config.url.as_deref().ok_or_else(|| ConfigError::Validation {
        field: "url".into(),
        reason: "no instance URL configured".into(),
    })?;
    let url: url::Url = raw_url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw_url}"),
    })?;

    let token = resolve_token(config)?;

    let tls = if config.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = config.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(ControllerConfig {
        url,
        token,
        tls,
        timeout: Duration::from_secs(config.timeout.unwrap_or(30)),
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
                url = "http://homeassistant.local:8123"
                token = "abc"
                log_path = "/config/pill_assistant_history.log"
            "#,
        );

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.url.as_deref(), Some("http://homeassistant.local:8123"));
        assert_eq!(
            config.log_path.as_deref(),
            Some("/config/pill_assistant_history.log")
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert!(config.url.is_none());
        assert!(config.log_path.is_none());
    }

    #[test]
    fn unset_token_env_falls_back_to_plaintext() {
        // Env var name chosen to be guaranteed absent.
        let config = Config {
            token: Some("plaintext".into()),
            token_env: Some("PILLWATCH_TEST_TOKEN_DOES_NOT_EXIST_9301".into()),
            ..Config::default()
        };

        use secrecy::ExposeSecret;
        let token = resolve_token(&config).unwrap();
        assert_eq!(token.expose_secret(), "plaintext");
    }

    #[test]
    fn missing_credentials_is_an_error() {
        let config = Config::default();
        assert!(matches!(resolve_token(&config), Err(ConfigError::NoCredentials)));
    }

    #[test]
    fn controller_config_requires_a_url() {
        let config = Config {
            token: Some("abc".into()),
            ..Config::default()
        };
        assert!(matches!(
            to_controller_config(&config),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn controller_config_translation() {
        let config = Config {
            url: Some("http://homeassistant.local:8123".into()),
            token: Some("abc".into()),
            insecure: Some(true),
            timeout: Some(5),
            ..Config::default()
        };

        let cc = to_controller_config(&config).unwrap();
        assert_eq!(cc.url.as_str(), "http://homeassistant.local:8123/");
        assert_eq!(cc.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(cc.timeout, Duration::from_secs(5));
    }
}
