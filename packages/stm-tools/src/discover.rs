use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

/// How deep below the given directory to look for a linker script.
pub const LINKER_SCRIPT_DEPTH: usize = 1;

/// How deep below the given directory to look for the ELF image.
/// CubeMX projects put it in `build/`, sometimes one level further down.
pub const ELF_DEPTH: usize = 2;

pub fn linker_script(path: &Path) -> Result<PathBuf> {
    find_file(path, "ld", LINKER_SCRIPT_DEPTH)
}

pub fn elf(path: &Path) -> Result<PathBuf> {
    find_file(path, "elf", ELF_DEPTH)
}

/// Returns `path` if it is a file with the given extension, otherwise the first
/// such file found below it. Entries are visited in name order.
pub fn find_file(path: &Path, extension: &str, max_depth: usize) -> Result<PathBuf> {
    if path.is_dir() {
        let walker = WalkDir::new(path)
            .max_depth(max_depth.saturating_add(1))
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to search {path:?}."))?;
            if has_extension(entry.path(), extension) {
                log::info!("Found {:?}", entry.path());
                return Ok(entry.into_path());
            }
        }
    } else if has_extension(path, extension) {
        return Ok(path.to_path_buf());
    }

    bail!("{} is not exists!", path.display())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.is_file() && path.extension().is_some_and(|e| e == extension)
}
