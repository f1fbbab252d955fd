use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{
    arguments,
    config::ToolConfig,
    makefile::{Makefile, PatchError, PatchOptions},
    programmer,
};

pub fn makefile(config: &ToolConfig, args: arguments::MakefileCommand) -> Result<()> {
    let explicit_programmer = args.programmer.as_ref().or(config.programmer.as_ref());
    let programmer = programmer::locate(explicit_programmer.map(PathBuf::as_path))
        .context("Failed to locate STM32_Programmer_CLI")?;

    let options = PatchOptions {
        toolchain_bin_path: args
            .toolchain
            .unwrap_or_else(|| config.toolchain_bin_path.clone()),
        optimization: args
            .optimization
            .unwrap_or_else(|| config.optimization.clone()),
        programmer,
        flash_address: args
            .flash_address
            .unwrap_or_else(|| config.flash_address.clone()),
        hide_commands: !args.show_commands,
    };

    if patch_file(&args.makefile, &options)? {
        log::info!("Modified {:?}", args.makefile);
    }

    Ok(())
}

/// The generated Makefile as CubeMX wrote it, kept next to the patched one.
pub fn pristine_path(makefile: &Path) -> PathBuf {
    let mut name = makefile.as_os_str().to_owned();
    name.push("_");
    PathBuf::from(name)
}

/// Patches `makefile` from its pristine copy, creating the copy on the first
/// run. Returns false when the input was already modified.
pub fn patch_file(makefile: &Path, options: &PatchOptions) -> Result<bool> {
    let pristine = pristine_path(makefile);

    if !pristine.exists() {
        log::info!("Saving generated Makefile as {pristine:?}");
        std::fs::copy(makefile, &pristine)
            .with_context(|| format!("Failed to copy {makefile:?} to {pristine:?}."))?;
    }

    let text = std::fs::read_to_string(&pristine)
        .with_context(|| format!("Failed to read {pristine:?}."))?;

    let mut patched = Makefile::new(text);
    match patched.patch(options) {
        Ok(()) => {}
        Err(PatchError::AlreadyModified) => {
            log::warn!("This Makefile was already modified");
            return Ok(false);
        }
        Err(error) => return Err(error).with_context(|| format!("Failed to modify {pristine:?}.")),
    }

    std::fs::write(makefile, patched.as_str())
        .with_context(|| format!("Failed to write {makefile:?}."))?;

    Ok(true)
}

#[cfg(test)]
mod test {
    use super::*;

    const CUBEMX: &str = include_str!("../test_data/cubemx.mk");

    fn options() -> PatchOptions {
        PatchOptions {
            toolchain_bin_path: "/opt/gcc-arm-none-eabi/bin/".into(),
            optimization: "-O2".into(),
            programmer: None,
            flash_address: "0x08000000".into(),
            hide_commands: true,
        }
    }

    #[test]
    fn pristine_name() {
        assert_eq!(
            pristine_path(Path::new("project/Makefile")),
            PathBuf::from("project/Makefile_")
        );
    }

    #[test]
    fn first_run_keeps_generated_file() {
        let directory = tempfile::tempdir().unwrap();
        let makefile = directory.path().join("Makefile");
        std::fs::write(&makefile, CUBEMX).unwrap();

        assert!(patch_file(&makefile, &options()).unwrap());

        assert_eq!(
            std::fs::read_to_string(directory.path().join("Makefile_")).unwrap(),
            CUBEMX
        );
        let patched = std::fs::read_to_string(&makefile).unwrap();
        assert!(patched.contains("OPT = -O2\n"));
    }

    #[test]
    fn rerun_starts_from_generated_file() {
        let directory = tempfile::tempdir().unwrap();
        let makefile = directory.path().join("Makefile");
        std::fs::write(&makefile, CUBEMX).unwrap();

        patch_file(&makefile, &options()).unwrap();
        let first = std::fs::read_to_string(&makefile).unwrap();

        assert!(patch_file(&makefile, &options()).unwrap());
        assert_eq!(std::fs::read_to_string(&makefile).unwrap(), first);
    }

    #[test]
    fn modified_input_is_left_alone() {
        let directory = tempfile::tempdir().unwrap();
        let makefile = directory.path().join("Makefile");
        let modified = CUBEMX.replace(
            "# Generic Makefile (based on gcc)\n",
            "# Generic Makefile (based on gcc)\n# Modified for C++\n",
        );
        std::fs::write(directory.path().join("Makefile_"), &modified).unwrap();
        std::fs::write(&makefile, "untouched").unwrap();

        assert!(!patch_file(&makefile, &options()).unwrap());
        assert_eq!(std::fs::read_to_string(&makefile).unwrap(), "untouched");
    }

    #[test]
    fn missing_makefile() {
        let directory = tempfile::tempdir().unwrap();

        assert!(patch_file(&directory.path().join("Makefile"), &options()).is_err());
    }
}
