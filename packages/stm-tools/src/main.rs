use anyhow::{bail, Context, Result};

use crate::{byte::Byte, config::ToolConfig};

mod arguments;
mod byte;
mod config;
mod discover;
mod linker_script;
mod makefile;
mod patch;
mod programmer;
mod report;
mod size;
mod size_tool;

fn main() {
    let args = argh::from_env();

    colog::init();

    if let Err(error) = application(args) {
        log::error!("Fatal error: {:?}", error);
        std::process::exit(1);
    }
}

fn application(args: arguments::StmTools) -> Result<()> {
    log::debug!("STM tools v{}", std::env!("CARGO_PKG_VERSION"));

    let config = ToolConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.subcommand {
        arguments::SubCommand::Size(size_args) => {
            size::size(&config, size_args).context("Failed to report memory usage")
        }
        arguments::SubCommand::Makefile(makefile_args) => {
            patch::makefile(&config, makefile_args).context("Failed to modify Makefile")
        }
        arguments::SubCommand::Bytes(bytes_args) => bytes(bytes_args),
    }
}

fn bytes(args: arguments::Bytes) -> Result<()> {
    for line in byte_lines(&args.quantities)? {
        println!("{line}");
    }

    Ok(())
}

/// One `input, bytes, readable` line per quantity, plus a total for several.
fn byte_lines(quantities: &[String]) -> Result<Vec<String>> {
    if quantities.is_empty() {
        bail!("No quantities given.");
    }

    let quantities = quantities
        .iter()
        .map(|quantity| {
            quantity
                .parse::<Byte>()
                .map(|bytes| (quantity, bytes))
                .with_context(|| format!("Failed to parse `{quantity}`"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut lines: Vec<String> = quantities
        .iter()
        .map(|(quantity, bytes)| format!("{quantity}\t{}\t{bytes}", bytes.value()))
        .collect();

    if quantities.len() > 1 {
        let total = Byte::checked_sum(quantities.iter().map(|(_, bytes)| *bytes))
            .context("Failed to add up the quantities")?;
        lines.push(format!("total\t{}\t{total}", total.value()));
    }

    Ok(lines)
}
