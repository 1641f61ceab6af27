//! Configuration file for invitrack
//!
//! All keys are optional; command-line flags override file values.
//!
//! ```toml
//! ledger_path = "data/invite-ledger.json"
//! fetch_timeout_ms = 5000
//!
//! [notice]
//! known = "{member} joined, invited by {inviter} ({total} invites)"
//! unknown = "{member} joined, inviter unknown"
//! ```

use crate::notice::NoticeTemplates;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default ledger location, relative to the working directory
pub const DEFAULT_LEDGER_PATH: &str = "invite-ledger.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the inviter ledger is persisted
    pub ledger_path: PathBuf,

    /// Upper bound on one live invite fetch, in milliseconds
    pub fetch_timeout_ms: u64,

    /// Join notice templates
    pub notice: NoticeTemplates,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            fetch_timeout_ms: 5_000,
            notice: NoticeTemplates::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.ledger_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("ledger_path must not be empty".to_string()));
        }

        if self.notice.known.trim().is_empty() || self.notice.unknown.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notice templates must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
