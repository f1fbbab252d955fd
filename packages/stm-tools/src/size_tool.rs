use std::{collections::HashMap, path::Path, process::Command};

use anyhow::{bail, Context, Result};

use crate::byte::Byte;

/// Section sizes reported by `size` in Berkeley format.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SizeTable {
    sections: HashMap<String, Byte>,
}

impl SizeTable {
    pub fn run(size_tool: &str, elf: &Path) -> Result<Self> {
        log::info!("Running `{size_tool}` on {elf:?}");

        let output = Command::new(size_tool)
            .arg(elf)
            .output()
            .with_context(|| format!("Failed to run `{size_tool}`."))?;

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("{size_tool}: {}", stderr.trim_end());
        }

        if !output.status.success() {
            bail!("`{size_tool}` returned with an error.");
        }

        let stdout =
            String::from_utf8(output.stdout).context("Output of size tool is not valid UTF8.")?;
        Self::parse(&stdout)
    }

    pub fn parse(output: &str) -> Result<Self> {
        let mut lines = output.trim().lines();
        let (Some(head), Some(data)) = (lines.next(), lines.next()) else {
            bail!("Expected a header and a data line from the size tool.");
        };

        // The last two columns are `hex` and `filename`.
        fn columns(line: &str) -> Vec<&str> {
            let mut columns: Vec<&str> = line.split_whitespace().collect();
            columns.truncate(columns.len().saturating_sub(2));
            columns
        }

        let sections = columns(head)
            .into_iter()
            .zip(columns(data))
            .map(|(name, value)| -> Result<(String, Byte)> {
                let size = value
                    .parse()
                    .with_context(|| format!("Invalid size for section {name}: `{value}`"))?;
                Ok((name.to_string(), size))
            })
            .collect::<Result<HashMap<String, Byte>>>()?;

        Ok(Self { sections })
    }

    pub fn section(&self, name: &str) -> Result<Byte> {
        self.sections
            .get(name)
            .copied()
            .with_context(|| format!("Size tool did not report a `{name}` column."))
    }

    /// Initialized data plus zero-initialized data.
    pub fn ram_usage(&self) -> Result<Byte> {
        Ok(self.section("data")?.checked_add(self.section("bss")?)?)
    }

    /// Code plus the load image of initialized data.
    pub fn flash_usage(&self) -> Result<Byte> {
        Ok(self.section("text")?.checked_add(self.section("data")?)?)
    }
}
