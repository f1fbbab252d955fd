use anyhow::{Context, Result};

use crate::{
    arguments, config::ToolConfig, discover, linker_script::MemoryMap, report, report::RegionUsage,
    size_tool::SizeTable,
};

pub fn size(config: &ToolConfig, args: arguments::Size) -> Result<()> {
    let linker_script = discover::linker_script(&args.linker_script)
        .context("Failed to find the linker script")?;
    let elf = discover::elf(&args.elf).context("Failed to find the elf file")?;

    let memory = MemoryMap::load(&linker_script)?;
    if memory.is_empty() {
        log::warn!("No MEMORY regions in {linker_script:?}.");
    }
    for region in memory.iter() {
        match region.origin {
            Some(origin) => log::info!("{} at {origin:#010x}: {}", region.name, region.length),
            None => log::info!("{}: {}", region.name, region.length),
        }
    }

    let size_tool = args.size_tool.as_deref().unwrap_or(&config.size_tool);
    let sizes = SizeTable::run(size_tool, &elf).context("Failed to measure the elf file")?;

    let (ram, flash) = usage(&memory, &sizes)?;

    if args.color {
        colored::control::set_override(true);
    }

    for line in render(ram, flash, &args)? {
        println!("{line}");
    }

    Ok(())
}

/// Output lines for the chosen layout: a JSON document, the tables stacked,
/// or the tables next to each other.
pub fn render(
    ram: RegionUsage,
    flash: RegionUsage,
    args: &arguments::Size,
) -> Result<Vec<String>> {
    if args.json {
        let report = report::UsageReport {
            regions: vec![ram, flash],
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to encode report.")?;
        return Ok(json.lines().map(String::from).collect());
    }

    let ram = ram.render(args.color);
    let flash = flash.render(args.color);

    Ok(if args.vertical {
        ram.into_iter().chain(flash).collect()
    } else {
        report::side_by_side(&ram, &flash)
    })
}

/// RAM holds initialized and zeroed data, FLASH holds code and the data load image.
pub fn usage(memory: &MemoryMap, sizes: &SizeTable) -> Result<(RegionUsage, RegionUsage)> {
    let ram = RegionUsage::new("RAM", sizes.ram_usage()?, memory.length_of("RAM")?)
        .context("Failed to compute RAM usage")?;
    let flash = RegionUsage::new("FLASH", sizes.flash_usage()?, memory.length_of("FLASH")?)
        .context("Failed to compute FLASH usage")?;

    Ok((ram, flash))
}
