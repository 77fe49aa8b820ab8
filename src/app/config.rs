use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::types::Cli;

pub(crate) const DEFAULT_API_URL: &str = "http://localhost:8080/";
pub(crate) const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub(crate) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const MAX_POLL_INTERVAL_SECS: u64 = 3600;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) api_url: Option<String>,
    pub(crate) poll_interval_secs: Option<u64>,
    pub(crate) request_timeout_secs: Option<u64>,
    pub(crate) log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) api_url: String,
    pub(crate) poll_interval: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) log_file: Option<PathBuf>,
}

impl Settings {
    /// Resolves settings with precedence CLI/env > config file > defaults.
    pub(crate) fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => load_file_config(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => load_file_config(&path)?,
                _ => FileConfig::default(),
            },
        };
        Ok(Self::merge(cli, file))
    }

    pub(crate) fn merge(cli: &Cli, file: FileConfig) -> Self {
        let api_url = cli
            .api_url
            .clone()
            .or(file.api_url)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let poll_secs = cli
            .poll_interval_secs
            .or(file.poll_interval_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        let timeout_secs = cli
            .request_timeout_secs
            .or(file.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        Self {
            api_url,
            poll_interval: sanitize_poll_interval(poll_secs),
            request_timeout: Duration::from_secs(timeout_secs.clamp(1, MAX_REQUEST_TIMEOUT_SECS)),
            log_file: cli.log_file.clone().or(file.log_file),
        }
    }
}

pub(crate) fn sanitize_poll_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(1, MAX_POLL_INTERVAL_SECS))
}

pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reviewdeck").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_without_env(args).expect("valid args")
    }

    #[test]
    fn cli_values_win_over_file_values() {
        let file = FileConfig {
            api_url: Some("http://file.example/api".to_string()),
            poll_interval_secs: Some(90),
            request_timeout_secs: Some(5),
            log_file: Some(PathBuf::from("/tmp/file.log")),
        };
        let settings = Settings::merge(
            &cli(&["--api-url", "http://cli.example/", "--poll-interval", "10"]),
            file,
        );
        assert_eq!(settings.api_url, "http://cli.example/");
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.log_file, Some(PathBuf::from("/tmp/file.log")));
    }

    #[test]
    fn defaults_apply_and_intervals_are_clamped() {
        let settings = Settings::merge(&cli(&[]), FileConfig::default());
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(
            settings.poll_interval,
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
        );

        let settings = Settings::merge(
            &cli(&["--poll-interval", "0", "--request-timeout", "100000"]),
            FileConfig::default(),
        );
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(
            settings.request_timeout,
            Duration::from_secs(MAX_REQUEST_TIMEOUT_SECS)
        );
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "api_url = \"http://toml.example/\"\npoll_interval_secs = 45")
            .expect("write config");
        let path = file.path().to_string_lossy().to_string();

        let settings = Settings::resolve(&cli(&["--config", &path])).expect("settings");
        assert_eq!(settings.api_url, "http://toml.example/");
        assert_eq!(settings.poll_interval, Duration::from_secs(45));
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.toml").to_string_lossy().to_string();
        let err = Settings::resolve(&cli(&["--config", &path]))
            .expect_err("must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "api_ur1 = \"typo\"").expect("write config");
        let err = load_file_config(file.path()).expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("invalid config file"));
    }
}
