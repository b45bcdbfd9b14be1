//! Data Directory Layout
//!
//! Everything the service persists lives under one data directory
//! (`~/.analytics-agent/` unless configured otherwise).

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

pub const DATA_DIR_NAME: &str = ".analytics-agent";
pub const HISTORY_DB_FILE: &str = "chat_history.db";
pub const ARTIFACTS_DIR: &str = "temp_data";
pub const SANDBOX_DIR: &str = "sandbox";

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Default data directory (~/.analytics-agent/)
pub fn default_data_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(DATA_DIR_NAME))
}

/// Conversation history database inside `data_dir`
pub fn history_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(HISTORY_DB_FILE)
}

/// Parquet artifacts inside `data_dir`
pub fn artifacts_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(ARTIFACTS_DIR)
}

/// Per-run sandbox scratch space inside `data_dir`
pub fn sandbox_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(SANDBOX_DIR)
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Create the data directory and its subdirectories.
pub fn ensure_layout(data_dir: &Path) -> AppResult<()> {
    ensure_dir(data_dir)?;
    ensure_dir(&artifacts_dir(data_dir))?;
    ensure_dir(&sandbox_dir(data_dir))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let root = Path::new("/srv/agent");
        assert_eq!(history_db_path(root), PathBuf::from("/srv/agent/chat_history.db"));
        assert_eq!(artifacts_dir(root), PathBuf::from("/srv/agent/temp_data"));
        assert_eq!(sandbox_dir(root), PathBuf::from("/srv/agent/sandbox"));
    }

    #[test]
    fn test_ensure_layout_creates_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("data");
        ensure_layout(&root).unwrap();
        assert!(artifacts_dir(&root).is_dir());
        assert!(sandbox_dir(&root).is_dir());
        // Idempotent
        ensure_layout(&root).unwrap();
    }

    #[test]
    fn test_default_data_dir_under_home() {
        if let Ok(dir) = default_data_dir() {
            assert!(dir.ends_with(DATA_DIR_NAME));
        }
    }
}
