use std::path::PathBuf;

use argh::FromArgs;

#[derive(FromArgs, PartialEq, Debug)]
/// Helpers for STM32CubeMX firmware projects: memory usage reports, Makefile patching and byte units.
pub struct StmTools {
    #[argh(option)]
    /// read settings from this JSON file instead of `stm-tools.json` in the current directory
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub subcommand: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum SubCommand {
    Size(Size),
    Makefile(MakefileCommand),
    Bytes(Bytes),
}

#[derive(FromArgs, PartialEq, Debug)]
/// Parses the memory layout from the linker script and the output of the size program,
/// and then displays RAM and FLASH usage in a more readable form.
#[argh(subcommand, name = "size")]
pub struct Size {
    #[argh(option, short = 'l', default = "PathBuf::from(\".\")")]
    /// linker script, or a directory to search for one
    pub linker_script: PathBuf,

    #[argh(option, short = 'e', default = "PathBuf::from(\".\")")]
    /// elf file, or a directory to search for one
    pub elf: PathBuf,

    #[argh(switch, short = 'c')]
    /// activate color output
    pub color: bool,

    #[argh(switch, short = 'v')]
    /// print the tables underneath each other
    pub vertical: bool,

    #[argh(switch)]
    /// print the usage as JSON instead of tables
    pub json: bool,

    #[argh(option)]
    /// override the size program (defaults to `arm-none-eabi-size`)
    pub size_tool: Option<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Modifies a Makefile generated by STM32CubeMX for C++ sources, quiet recipes and a `prog` flash target.
/// The generated file is kept as `<makefile>_` and is the input of every run.
#[argh(subcommand, name = "makefile")]
pub struct MakefileCommand {
    #[argh(option, short = 'm', default = "PathBuf::from(\"Makefile\")")]
    /// the Makefile to modify
    pub makefile: PathBuf,

    #[argh(option)]
    /// directory of the arm-none-eabi toolchain binaries
    pub toolchain: Option<String>,

    #[argh(option)]
    /// path to STM32_Programmer_CLI (searched for in the home directory by default)
    pub programmer: Option<PathBuf>,

    #[argh(option)]
    /// address the firmware is flashed to
    pub flash_address: Option<String>,

    #[argh(option)]
    /// optimization flags for the OPT variable
    pub optimization: Option<String>,

    #[argh(switch)]
    /// keep compiler and tool invocations visible in the build output
    pub show_commands: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Converts quantities such as `20K`, `1.5MiB` or `0x8000` into bytes.
#[argh(subcommand, name = "bytes")]
pub struct Bytes {
    #[argh(positional)]
    pub quantities: Vec<String>,
}
