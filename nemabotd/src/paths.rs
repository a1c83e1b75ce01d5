//! Cross-platform application paths

use std::fs;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("could not determine data directory")]
    NoDataDir,

    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, PathsError> {
        let base = dirs::data_dir().ok_or(PathsError::NoDataDir)?;
        Self::at(base.join("nemabot"))
    }

    /// Rooted at an explicit directory, created if missing.
    pub fn at(data_dir: PathBuf) -> Result<Self, PathsError> {
        let logs = data_dir.join("logs");
        fs::create_dir_all(&logs).map_err(|source| PathsError::Create {
            path: logs.clone(),
            source,
        })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// CSV step log for the run started at `stamp` (unix seconds).
    pub fn run_log(&self, stamp: u64, run: u32) -> PathBuf {
        self.data_dir
            .join("logs")
            .join(format!("run-{stamp}-{run:03}.csv"))
    }
}
