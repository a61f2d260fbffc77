use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "WIKIPAD_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The WIKIPAD_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/wikipad/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        Self::resolve_with(explicit, from_env)
    }

    fn resolve_with(
        explicit: Option<&Path>,
        from_env: Option<PathBuf>,
    ) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Some(path) = from_env.filter(|p| !p.as_os_str().is_empty())
        {
            path
        } else {
            xdg::BaseDirectories::with_prefix("wikipad")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The record store file.
    pub fn records_db(&self) -> PathBuf {
        self.root.join("records.redb")
    }

    /// Default location of the optional configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// The search index directory, created on demand.
    pub fn index_dir(&self) -> Result<PathBuf> {
        let path = self.root.join("index");
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }
}
