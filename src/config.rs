//! Optional `config.toml` settings.
//!
//! Every key is optional; a missing file means all defaults. Unknown keys
//! are rejected.

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    record_store,
    search_index::{self, WriterOptions},
};

/// Password of the admin account created on first start when
/// `admin_password` is not set.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Keep the search index in memory and rebuild it on every open.
    pub index_in_memory: bool,
    pub store_open_timeout_secs: u64,
    pub index_lock_timeout_secs: u64,
    /// Index writer heap budget, in bytes.
    pub writer_memory_budget: usize,
    /// Credentials for the admin account created when the store has no
    /// users.
    pub admin_username: String,
    pub admin_password: Option<String>,
    /// Directory of `<slug>.md` files for `import`, `export` and `sync`.
    pub wiki_dir: Option<std::path::PathBuf>,
    pub sync_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_in_memory: false,
            store_open_timeout_secs: record_store::DEFAULT_OPEN_TIMEOUT
                .as_secs(),
            index_lock_timeout_secs: search_index::DEFAULT_LOCK_TIMEOUT
                .as_secs(),
            writer_memory_budget: search_index::DEFAULT_WRITER_MEMORY,
            admin_username: "admin".to_string(),
            admin_password: None,
            wiki_dir: None,
            sync_interval_secs: 2,
        }
    }
}

impl Config {
    /// Load `path`, or return defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file");
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::Config(e.message().to_string()))?;
        if config.sync_interval_secs == 0 {
            return Err(Error::Config(
                "sync_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn store_open_timeout(&self) -> Duration {
        Duration::from_secs(self.store_open_timeout_secs)
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            memory_budget: self.writer_memory_budget,
            lock_timeout: Duration::from_secs(self.index_lock_timeout_secs),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
