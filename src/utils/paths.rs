//! Cross-Platform Path Utilities
//!
//! Resolves the application directory (~/.nlsql/) and the files in it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the application directory (~/.nlsql/)
pub fn nlsql_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".nlsql"))
}

/// Get the config file path (~/.nlsql/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(nlsql_dir()?.join("config.json"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the application directory, creating it if it doesn't exist
pub fn ensure_nlsql_dir() -> AppResult<PathBuf> {
    let path = nlsql_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
