use std::{path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use regex::Regex;

use crate::byte::Byte;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub name: String,

    /// Start address, when the script gives it as a plain number.
    pub origin: Option<u64>,

    pub length: Byte,
}

/// Memory regions in the order the linker script declares them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
}

impl MemoryMap {
    pub fn load(path: &Path) -> Result<Self> {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read linker script {path:?}."))?;

        Self::parse(&script).with_context(|| format!("Failed to parse linker script {path:?}."))
    }

    pub fn parse(script: &str) -> Result<Self> {
        let mut regions = Vec::new();
        let mut in_memory_block = false;

        for (index, line) in script.lines().enumerate() {
            if !in_memory_block {
                in_memory_block = line.contains("MEMORY");
                continue;
            }

            if line.contains('}') {
                break;
            }

            if line.contains("LENGTH") {
                match parse_region(line)
                    .with_context(|| format!("Invalid memory region on line {}.", index + 1))?
                {
                    Some(region) => regions.push(region),
                    None => log::warn!("Skipping unrecognized MEMORY line {}: {line}", index + 1),
                }
            }
        }

        Ok(Self { regions })
    }

    pub fn get(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|region| region.name == name)
    }

    /// Length of a region that must be present.
    pub fn length_of(&self, name: &str) -> Result<Byte> {
        self.get(name).map(|region| region.length).with_context(|| {
            let names: Vec<&str> = self.regions.iter().map(|r| r.name.as_str()).collect();
            format!("Linker script has no {name} region (found: {names:?}).")
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn region_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<name>[^\s(:]+)\s*(?:\([^)]*\))?\s*:\s*ORIGIN\s*=\s*(?P<origin>[^,]+?)\s*,\s*LENGTH\s*=\s*(?P<length>[^/;]+)",
        )
        .expect("Memory region regex is valid")
    })
}

fn parse_region(line: &str) -> Result<Option<MemoryRegion>> {
    let Some(captures) = region_regex().captures(line) else {
        return Ok(None);
    };

    let length = captures["length"].trim();
    let length: Byte = length
        .parse()
        .with_context(|| format!("Failed to parse region length `{length}`."))?;

    Ok(Some(MemoryRegion {
        name: captures["name"].to_string(),
        origin: parse_address(&captures["origin"]),
        length,
    }))
}

fn parse_address(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
