//! Node configuration.
//!
//! A [`Config`] describes how to reach and authenticate against one node.
//! It is usually read from a TOML file:
//!
//! ```toml
//! host = "localhost"
//! port = 2333
//! password = "youshallnotpass"
//! user_id = 123456789012345678
//! shard_count = 1
//! resume_key = "my-bot"
//! resume_timeout = 60
//! ```

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;
use veil::Redact;

use crate::error::{Error, Result};

/// Connection settings for one node.
#[derive(Clone, Redact, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Sent as the `Authorization` header on the control channel and on
    /// every REST request.
    #[redact]
    pub password: String,

    /// The bot's own user id, sent as the `User-Id` header.
    pub user_id: u64,

    pub shard_count: u32,

    /// Sent as the `Client-Name` header.
    pub client_name: String,

    /// When set, the node keeps player state for `resume_timeout` after an
    /// unexpected disconnect of the control channel.
    pub resume_key: Option<String>,

    /// Resume window in seconds.
    pub resume_timeout: u64,

    /// Use `wss`/`https` instead of `ws`/`http`.
    pub secure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 2333,
            password: "youshallnotpass".to_owned(),
            user_id: 0,
            shard_count: 1,
            client_name: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            resume_key: None,
            resume_timeout: 60,
            secure: false,
        }
    }
}

impl Config {
    /// Configuration files are small. Refuse anything larger to prevent
    /// reading arbitrary files into memory.
    const MAX_FILE_SIZE: u64 = 16 * 1024;

    /// Loads a configuration from a TOML file.
    ///
    /// Missing keys take their [`Default`] values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is too large or is not
    /// valid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        contents.parse()
    }

    /// The resume window as a [`Duration`].
    #[must_use]
    pub fn resume_timeout(&self) -> Duration {
        Duration::from_secs(self.resume_timeout)
    }

    /// The control channel URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` and `port` do not form a valid URL.
    pub fn websocket_url(&self) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        Url::parse(&format!("{scheme}://{}:{}", self.host, self.port)).map_err(Into::into)
    }

    /// The REST base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` and `port` do not form a valid URL.
    pub fn rest_url(&self) -> Result<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}:{}", self.host, self.port)).map_err(Into::into)
    }

    /// A short name for log lines.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        if config.shard_count == 0 {
            return Err(Error::invalid_argument("shard count must be at least 1"));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file_with_defaults() {
        let config: Config = r#"
            host = "node.example.com"
            password = "hunter2"
            user_id = 42
            resume_key = "bot"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.host, "node.example.com");
        assert_eq!(config.port, 2333);
        assert_eq!(config.user_id, 42);
        assert_eq!(config.resume_key.as_deref(), Some("bot"));
        assert_eq!(config.resume_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn rejects_zero_shards() {
        let result = "shard_count = 0".parse::<Config>();
        assert!(result.is_err());
    }

    #[test]
    fn urls_follow_secure_flag() {
        let mut config = Config::default();
        assert_eq!(config.websocket_url().unwrap().as_str(), "ws://localhost:2333/");

        config.secure = true;
        assert_eq!(config.rest_url().unwrap().as_str(), "https://localhost:2333/");
    }

    #[test]
    fn debug_redacts_password() {
        let config = Config {
            password: "hunter2".to_owned(),
            ..Config::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
