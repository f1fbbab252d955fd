use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use walkdir::WalkDir;

pub const PROGRAMMER_NAME: &str = "STM32_Programmer_CLI";

/// Resolves the programmer to use for the `prog` target. An explicit path must
/// exist; without one the home directory is searched.
pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("Programmer {path:?} does not exist.");
        }
        return Ok(Some(path.to_path_buf()));
    }

    let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
        log::warn!("HOME is not set, cannot search for {PROGRAMMER_NAME}.");
        return Ok(None);
    };

    log::info!("Searching {home:?} for {PROGRAMMER_NAME}");
    Ok(search(&home, PROGRAMMER_NAME))
}

/// Depth first search for a file called `name`. Symbolic links to files match,
/// linked directories are not entered and unreadable directories are skipped.
pub fn search(directory: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .find(|entry| entry.file_name() == name && entry.path().is_file())
        .map(|entry| entry.into_path())
}
