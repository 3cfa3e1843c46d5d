//! Launcher configuration.
//!
//! Precedence: built-in defaults, then an optional TOML file, then
//! `QUICKLAUNCH_*` environment variables (a `.env` file is honoured).

use crate::engine::surface::scrape::ScrapeConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "QUICKLAUNCH_";

/// Desktop Chrome; several upstreams serve degraded pages to unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Base URLs of the upstream services. Overridable for mirrors and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub github_api: String,
    pub linuxdo: String,
    pub x: String,
    pub stackexchange_api: String,
    pub reddit: String,
    pub hackernews_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            github_api: "https://api.github.com".to_string(),
            linuxdo: "https://linux.do".to_string(),
            x: "https://x.com".to_string(),
            stackexchange_api: "https://api.stackexchange.com".to_string(),
            reddit: "https://www.reddit.com".to_string(),
            hackernews_api: "https://hn.algolia.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Abort for one HTTP request, body included.
    pub request_timeout_ms: u64,
    /// Upper bound on one source's settlement in an aggregate call.
    pub settle_deadline_ms: u64,
    pub user_agent: String,
    /// Where credential files live. Defaults to the platform data directory.
    pub profile_dir: Option<PathBuf>,
    /// Keep cookies across runs.
    pub persist_credentials: bool,
    pub endpoints: Endpoints,
    pub scrape: ScrapeConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 15_000,
            settle_deadline_ms: 20_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            profile_dir: None,
            persist_credentials: true,
            endpoints: Endpoints::default(),
            scrape: ScrapeConfig::default(),
        }
    }
}

impl LauncherConfig {
    /// Defaults, overlaid with `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_toml(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `QUICKLAUNCH_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_var("REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("SETTLE_DEADLINE_MS") {
            self.settle_deadline_ms = parse_var("SETTLE_DEADLINE_MS", &v)?;
        }
        if let Some(v) = var("USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = var("PROFILE_DIR") {
            self.profile_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("PERSIST_CREDENTIALS") {
            self.persist_credentials = parse_var("PERSIST_CREDENTIALS", &v)?;
        }
        if let Some(v) = var("SCRAPE_DEADLINE_MS") {
            self.scrape.deadline_ms = parse_var("SCRAPE_DEADLINE_MS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        let slowest = self.request_timeout_ms.max(self.scrape.deadline_ms);
        if self.settle_deadline_ms <= slowest {
            return Err(ConfigError::Invalid(format!(
                "settle_deadline_ms ({}) must exceed the request and scrape timeouts ({})",
                self.settle_deadline_ms, slowest
            )));
        }
        if self.scrape.max_attempts == 0 || self.scrape.max_results == 0 {
            return Err(ConfigError::Invalid(
                "scrape.max_attempts and scrape.max_results must be positive".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent is empty".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn settle_deadline(&self) -> Duration {
        Duration::from_millis(self.settle_deadline_ms)
    }

    pub fn profile_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.profile_dir {
            return Ok(dir.clone());
        }
        let dirs = ProjectDirs::from("com", "quicklaunch", "QuickLaunch")
            .ok_or_else(|| ConfigError::Invalid("Could not get project directories".into()))?;
        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn credentials_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.profile_dir()?.join("credentials"))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}{} has an invalid value: {:?}", ENV_PREFIX, name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn defaults_are_valid() {
        let config = LauncherConfig::default();
        config.validate().unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.settle_deadline(), Duration::from_secs(20));
        assert_eq!(config.scrape, ScrapeConfig::default());
    }

    #[test]
    fn toml_overrides_are_partial() {
        let config = LauncherConfig::from_toml(
            r#"
            request_timeout_ms = 5000
            persist_credentials = false

            [endpoints]
            github_api = "http://localhost:9000"

            [scrape]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.request_timeout_ms, 5000);
        assert!(!config.persist_credentials);
        assert_eq!(config.endpoints.github_api, "http://localhost:9000");
        assert_eq!(config.endpoints.reddit, "https://www.reddit.com");
        assert_eq!(config.scrape.max_attempts, 3);
        assert_eq!(config.scrape.poll_interval_ms, 1_500);
        assert_eq!(config.settle_deadline_ms, 20_000);
    }

    #[test]
    fn bad_toml_is_reported() {
        assert!(matches!(
            LauncherConfig::from_toml("request_timeout_ms = \"soon\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("QUICKLAUNCH_REQUEST_TIMEOUT_MS", "8000"),
            ("QUICKLAUNCH_PROFILE_DIR", "/tmp/ql-profile"),
            ("QUICKLAUNCH_PERSIST_CREDENTIALS", "false"),
            ("UNRELATED", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = LauncherConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.request_timeout_ms, 8000);
        assert!(!config.persist_credentials);
        assert_eq!(
            config.credentials_dir().unwrap(),
            PathBuf::from("/tmp/ql-profile/credentials")
        );
    }

    #[test]
    fn unparsable_env_value_is_invalid() {
        let mut config = LauncherConfig::default();
        let err = config
            .apply_env(|key| (key == "QUICKLAUNCH_SETTLE_DEADLINE_MS").then(|| "twenty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn settle_deadline_must_cover_source_timeouts() {
        let config = LauncherConfig {
            settle_deadline_ms: 15_000,
            ..LauncherConfig::default()
        };
        let err = assert_err!(config.validate());
        assert!(err.to_string().contains("settle_deadline_ms (15000)"));
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quicklaunch.toml");
        fs::write(&path, "user_agent = \"ql-test\"\n").unwrap();

        let config = assert_ok!(LauncherConfig::load(Some(&path)));
        assert_eq!(config.user_agent, "ql-test");

        assert!(matches!(
            LauncherConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Io(_))
        ));
    }
}
