use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "stm-tools.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Directory holding the `arm-none-eabi-*` binaries, with a trailing slash.
    pub toolchain_bin_path: String,

    /// Program used to measure section sizes of the ELF image.
    pub size_tool: String,

    /// Location of `STM32_Programmer_CLI`. Searched for in the home directory when unset.
    pub programmer: Option<PathBuf>,

    /// Address the firmware binary is written to.
    pub flash_address: String,

    /// Value for the Makefile's `OPT` variable.
    pub optimization: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            toolchain_bin_path: "/opt/gcc-arm-none-eabi/bin/".into(),
            size_tool: "arm-none-eabi-size".into(),
            programmer: None,
            flash_address: "0x08000000".into(),
            optimization: "-Os".into(),
        }
    }
}

impl ToolConfig {
    /// Loads the explicitly requested file, or the default file if it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_file(path)
                } else {
                    log::debug!("No {DEFAULT_CONFIG_FILE}, using built in defaults.");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        log::info!("Loading configuration from {path:?}");

        let content = std::fs::read(path).with_context(|| format!("Failed to read {path:?}."))?;
        serde_json::from_slice(&content).with_context(|| format!("Failed to decode {path:?}."))
    }
}
