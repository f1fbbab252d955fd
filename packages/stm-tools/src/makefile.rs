use std::{collections::BTreeSet, path::PathBuf, sync::OnceLock};

use regex::Regex;
use thiserror::Error;

pub const TAG_GENERIC: &str = "# Generic Makefile (based on gcc)";
pub const TAG_MODIFIED_CPP: &str = "# Modified for C++";
pub const TAG_SOURCES_PATH: &str = "# source path";
pub const TAG_SOURCES_C: &str = "# C sources";
pub const TAG_INCLUDES_C: &str = "# C includes";
pub const TAG_LIST_OF_CPP_OBJECTS: &str = "# list of C++ objects";
pub const TAG_LIST_OF_ASM_OBJECTS: &str = "# list of ASM program objects";
pub const TAG_EOF: &str = "# *** EOF ***";

const ASM_RULE: &str = "$(BUILD_DIR)/%.o: %.s Makefile | $(BUILD_DIR)";

const CPP_OBJECTS: &str = "
OBJECTS += $(addprefix $(BUILD_DIR)/,$(notdir $(CPP_SOURCES:.cpp=.o)))
vpath %.cpp $(sort $(dir $(CPP_SOURCES)))
";

const CPP_RULE: &str = "
$(BUILD_DIR)/%.o: %.cpp Makefile | $(BUILD_DIR)
\t$(CC) -c $(CFLAGS) -Wa,-a,-ad,-alms=$(BUILD_DIR)/$(notdir $(<:.cpp=.lst)) $< -o $@
";

pub const CPP_CFLAGS: &[&str] = &[
    "$(MCU)",
    "-std=c++11",
    "-Wno-write-strings",
    "-specs=nano.specs",
    "-specs=nosys.specs",
    "$(C_DEFS)",
    "$(C_INCLUDES)",
    "$(OPT)",
    "-Wall",
    "-fdata-sections",
    "-ffunction-sections",
];

pub const CPP_LDFLAGS: &[&str] = &[
    "$(MCU)",
    "-Wl,--no-wchar-size-warning",
    "-specs=nosys.specs",
    "-specs=nano.specs",
    "-T$(LDSCRIPT)",
    "$(LIBDIR)",
    "$(LIBS)",
];

/// Recipe commands silenced with `@` so only warnings and errors are printed.
pub const QUIET_COMMANDS: &[&str] = &[
    "$(CC)", "$(AS)", "$(CP)", "$(AR)", "$(SZ)", "$(HEX)", "$(BIN)",
];

#[derive(Error, Debug, PartialEq)]
pub enum PatchError {
    #[error("This Makefile was already modified.")]
    AlreadyModified,

    #[error("Makefile does not contain `{0}`. Is it generated by STM32CubeMX?")]
    MissingTag(String),

    #[error("Makefile does not assign the variable {0}.")]
    MissingVariable(String),
}

#[derive(Debug, Clone)]
pub struct PatchOptions {
    pub toolchain_bin_path: String,
    pub optimization: String,
    pub programmer: Option<PathBuf>,
    pub flash_address: String,
    pub hide_commands: bool,
}

/// Text of a generated Makefile, edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Makefile {
    text: String,
}

impl Makefile {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Applies every modification for C++ support and flashing.
    pub fn patch(&mut self, options: &PatchOptions) -> Result<(), PatchError> {
        self.unix_line_endings();
        self.mark_modified()?;

        for tag in [TAG_SOURCES_PATH, TAG_SOURCES_C, TAG_INCLUDES_C] {
            if !self.repair_multiple_definition(tag) {
                log::warn!("Makefile has no `{tag}` section, not deduplicating it.");
            }
        }

        self.update_toolchain(&options.toolchain_bin_path)?;
        self.support_cpp()?;
        self.set_variable("OPT", &options.optimization)?;

        for command in QUIET_COMMANDS {
            if options.hide_commands {
                self.hide_command(command);
            } else {
                self.show_command(command);
            }
        }

        match &options.programmer {
            Some(programmer) => {
                self.add_programmer(&programmer.to_string_lossy(), &options.flash_address)?
            }
            None => log::warn!("Install STM32 Programmer CLI for Flash firmware"),
        }

        Ok(())
    }

    pub fn replace(&mut self, old: &str, new: &str) {
        self.text = self.text.replace(old, new);
    }

    pub fn unix_line_endings(&mut self) {
        self.replace("\r\n", "\n");
    }

    pub fn is_modified(&self) -> bool {
        self.text.contains(TAG_MODIFIED_CPP)
    }

    /// Tags the Makefile as modified, right below the generic header.
    pub fn mark_modified(&mut self) -> Result<(), PatchError> {
        if self.is_modified() {
            return Err(PatchError::AlreadyModified);
        }

        let position = self
            .line_after(TAG_GENERIC)
            .ok_or_else(|| PatchError::MissingTag(TAG_GENERIC.into()))?;
        self.insert(position, &format!("{TAG_MODIFIED_CPP}\n"));

        Ok(())
    }

    /// Sorts and deduplicates the entries of the list assigned right after `tag`.
    /// CubeMX repeats entries when a project is regenerated. Returns false when
    /// the tag is missing.
    pub fn repair_multiple_definition(&mut self, tag: &str) -> bool {
        let Some(start) = self.line_after(tag) else {
            return false;
        };

        let rest = &self.text[start..];
        if rest.is_empty() || rest.starts_with('\n') {
            log::warn!("`{tag}` is not followed by an assignment, not deduplicating it.");
            return true;
        }

        let end = start
            + [rest.find("\n\n"), rest.find("\n#")]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(rest.len());

        let block = &self.text[start..end];
        let mut lines = block.split('\n');
        let Some(variable) = lines.next() else {
            return true;
        };

        let entries: BTreeSet<String> = lines
            .map(|line| line.replace('\\', "").trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        if entries.is_empty() {
            return true;
        }

        let entries: Vec<String> = entries.into_iter().collect();
        let repaired = format!("{variable}\n{}", entries.join(" \\\n"));
        self.text.replace_range(start..end, &repaired);

        true
    }

    /// Points the toolchain at `bin_path`. `BINPATH` then carries the trailing slash.
    pub fn update_toolchain(&mut self, bin_path: &str) -> Result<(), PatchError> {
        if self.assignment_value_range("BINPATH").is_none() {
            log::warn!("Makefile has no BINPATH, the toolchain is taken from GCC_PATH or PATH.");
            return Ok(());
        }

        self.replace("$(BINPATH)/", "$(BINPATH)");
        self.set_variable("BINPATH", bin_path)
    }

    /// Compiles with g++ and adds objects and a pattern rule for `CPP_SOURCES`.
    pub fn support_cpp(&mut self) -> Result<(), PatchError> {
        if self.assignment_value_range("BINPATH").is_some() {
            self.set_variable("CC", "$(BINPATH)$(PREFIX)g++")?;
        } else {
            self.compile_with_gpp()?;
        }
        self.set_variable("CFLAGS", &CPP_CFLAGS.join(" "))?;
        self.set_variable("LDFLAGS", &CPP_LDFLAGS.join(" "))?;

        let position = self
            .text
            .find(TAG_LIST_OF_ASM_OBJECTS)
            .ok_or_else(|| PatchError::MissingTag(TAG_LIST_OF_ASM_OBJECTS.into()))?;
        self.insert(position, &format!("{TAG_LIST_OF_CPP_OBJECTS}{CPP_OBJECTS}"));

        let position = self
            .line_before(ASM_RULE)
            .ok_or_else(|| PatchError::MissingTag(ASM_RULE.into()))?;
        self.insert(position, CPP_RULE);

        Ok(())
    }

    /// Swaps `gcc` for `g++` at the end of every `CC` assignment, keeping
    /// whatever path and prefix precede it. Makefiles without `BINPATH` assign
    /// `CC` once per branch of `ifdef GCC_PATH`.
    fn compile_with_gpp(&mut self) -> Result<(), PatchError> {
        let values: Vec<&str> = cc_regex()
            .captures_iter(&self.text)
            .filter_map(|captures| captures.name("value"))
            .map(|value| value.as_str().trim_end())
            .collect();
        let compiles_with_gcc =
            !values.is_empty() && values.iter().all(|value| value.ends_with("gcc"));

        if !compiles_with_gcc {
            return Err(PatchError::MissingVariable("BINPATH".into()));
        }

        self.text = cc_regex()
            .replace_all(&self.text, |captures: &regex::Captures| {
                let value = captures["value"].trim_end();
                let prefix = value.strip_suffix("gcc").unwrap_or(value);
                format!("{}{prefix}g++", &captures["assignment"])
            })
            .into_owned();

        Ok(())
    }

    /// Replaces the value of the first assignment to `name`.
    pub fn set_variable(&mut self, name: &str, value: &str) -> Result<(), PatchError> {
        let range = self
            .assignment_value_range(name)
            .ok_or_else(|| PatchError::MissingVariable(name.into()))?;

        self.text.replace_range(range, &format!(" {value}"));
        Ok(())
    }

    pub fn hide_command(&mut self, command: &str) {
        self.replace(&format!("\t{command}"), &format!("\t@{command}"));
    }

    pub fn show_command(&mut self, command: &str) {
        self.replace(&format!("\t@{command}"), &format!("\t{command}"));
    }

    /// Adds a `prog` target that writes the binary over SWD.
    pub fn add_programmer(
        &mut self,
        programmer: &str,
        flash_address: &str,
    ) -> Result<(), PatchError> {
        let position = self
            .line_before(TAG_EOF)
            .ok_or_else(|| PatchError::MissingTag(TAG_EOF.into()))?;

        let target = format!(
            "
#######################################
# flash
#######################################
prog: $(BUILD_DIR)/$(TARGET).bin
\t\"{programmer}\" -c port=SWD reset=HWrst -w $(BUILD_DIR)/$(TARGET).bin {flash_address} -v -rst
"
        );
        self.insert(position, &target);

        Ok(())
    }

    fn insert(&mut self, position: usize, fragment: &str) {
        self.text.insert_str(position, fragment);
    }

    /// Start of the line following the first occurrence of `expression`.
    fn line_after(&self, expression: &str) -> Option<usize> {
        let end = self.text.find(expression)? + expression.len();
        Some(
            self.text[end..]
                .find('\n')
                .map(|newline| end + newline + 1)
                .unwrap_or(self.text.len()),
        )
    }

    /// Position of the line break before the first occurrence of `expression`.
    fn line_before(&self, expression: &str) -> Option<usize> {
        let position = self.text.find(expression)?;
        Some(position.saturating_sub(1))
    }

    /// Byte range after the `=` of the first line starting an assignment to
    /// `name`, up to the end of the line and any backslash continuations.
    fn assignment_value_range(&self, name: &str) -> Option<std::ops::Range<usize>> {
        let pattern = format!(r"(?m)^{}[ \t]*[:?]?=", regex::escape(name));
        let assignment = Regex::new(&pattern).ok()?.find(&self.text)?;

        let start = assignment.end();
        let mut end = start;
        loop {
            let line_end = self.text[end..]
                .find('\n')
                .map(|newline| end + newline)
                .unwrap_or(self.text.len());

            if self.text[end..line_end].trim_end().ends_with('\\') && line_end < self.text.len() {
                end = line_end + 1;
            } else {
                end = line_end;
                break;
            }
        }

        Some(start..end)
    }
}

fn cc_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?m)^(?P<assignment>CC[ \t]*[:?]?=)(?P<value>[^\n]*)$")
            .expect("CC assignment regex is valid")
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const CUBEMX: &str = include_str!("../test_data/cubemx.mk");

    fn options() -> PatchOptions {
        PatchOptions {
            toolchain_bin_path: "/opt/gcc-arm-none-eabi/bin/".into(),
            optimization: "-Os".into(),
            programmer: Some("/home/dev/STM32CubeProgrammer/bin/STM32_Programmer_CLI".into()),
            flash_address: "0x08000000".into(),
            hide_commands: true,
        }
    }

    fn patched() -> String {
        let mut makefile = Makefile::new(CUBEMX);
        makefile.patch(&options()).unwrap();
        makefile.as_str().to_string()
    }

    #[test]
    fn marked_as_modified() {
        let text = patched();

        assert!(text.contains(
            "# Generic Makefile (based on gcc)\n# Modified for C++\n#\n# ChangeLog :"
        ));
    }

    #[test]
    fn patch_twice() {
        let mut makefile = Makefile::new(patched());

        assert_eq!(makefile.patch(&options()), Err(PatchError::AlreadyModified));
    }

    #[test]
    fn not_generated() {
        let mut makefile = Makefile::new("all:\n\techo hello\n");

        assert_eq!(
            makefile.patch(&options()),
            Err(PatchError::MissingTag(TAG_GENERIC.into()))
        );
    }

    #[test]
    fn duplicates_removed() {
        let text = patched();

        assert!(text.contains("SOURCES_DIR =  \\\nDrivers \\\nInc \\\nSrc\n\n# firmware library path"));
        assert!(text.contains("C_SOURCES =  \\\nSrc/main.c \\\nSrc/stm32f1xx_it.c\n\n# ASM sources"));
        assert!(text.contains(
            "C_INCLUDES =  \\\n-IDrivers/CMSIS/Include \\\n-IInc\n\n# compile gcc flags"
        ));
    }

    #[test]
    fn repair_without_entries() {
        let mut makefile = Makefile::new("# C sources\nC_SOURCES =\n\n");

        assert!(makefile.repair_multiple_definition(TAG_SOURCES_C));
        assert_eq!(makefile.as_str(), "# C sources\nC_SOURCES =\n\n");
        assert!(!makefile.repair_multiple_definition(TAG_SOURCES_PATH));
    }

    #[test]
    fn toolchain() {
        let text = patched();

        assert!(text.contains("BINPATH = /opt/gcc-arm-none-eabi/bin/\n"));
        assert!(text.contains("CC = $(BINPATH)$(PREFIX)g++\n"));
        assert!(text.contains("AS = $(BINPATH)$(PREFIX)gcc -x assembler-with-cpp\n"));
        assert!(!text.contains("$(BINPATH)/"));
    }

    #[test]
    fn compiler_flags() {
        let text = patched();

        assert!(text.contains(&format!("\nCFLAGS = {}\n", CPP_CFLAGS.join(" "))));
        assert!(text.contains(&format!("\nLDFLAGS = {}\n", CPP_LDFLAGS.join(" "))));
        assert!(text.contains("CFLAGS += -g -gdwarf-2\n"));
        assert!(text.contains("OPT = -Os\n"));
    }

    #[test]
    fn cpp_objects_and_rule() {
        let text = patched();

        assert!(text.contains(
            "vpath %.c $(sort $(dir $(C_SOURCES)))\n# list of C++ objects\nOBJECTS += $(addprefix $(BUILD_DIR)/,$(notdir $(CPP_SOURCES:.cpp=.o)))\nvpath %.cpp $(sort $(dir $(CPP_SOURCES)))\n# list of ASM program objects\n"
        ));

        let cpp_rule = text.find("$(BUILD_DIR)/%.o: %.cpp Makefile").unwrap();
        let asm_rule = text.find(ASM_RULE).unwrap();
        assert!(cpp_rule < asm_rule);
        assert!(text.contains("$< -o $@\n\n$(BUILD_DIR)/%.o: %.s Makefile"));
    }

    #[test]
    fn quiet_recipes() {
        let text = patched();

        for command in QUIET_COMMANDS {
            assert!(!text.contains(&format!("\t{command}")), "{command} is not hidden");
        }
        assert!(text.contains("\t@$(CC) -c $(CFLAGS)"));
        assert!(text.contains("\t@$(SZ) $@"));
    }

    #[test]
    fn verbose_recipes() {
        let mut makefile = Makefile::new(CUBEMX.replace("\t$(SZ)", "\t@$(SZ)"));
        makefile
            .patch(&PatchOptions {
                hide_commands: false,
                ..options()
            })
            .unwrap();

        assert!(makefile.as_str().contains("\t$(SZ) $@"));
        assert!(!makefile.as_str().contains("\t@"));
    }

    #[test]
    fn programmer_target() {
        let text = patched();

        assert!(text.contains(
            "prog: $(BUILD_DIR)/$(TARGET).bin\n\t\"/home/dev/STM32CubeProgrammer/bin/STM32_Programmer_CLI\" -c port=SWD reset=HWrst -w $(BUILD_DIR)/$(TARGET).bin 0x08000000 -v -rst\n"
        ));
        assert!(text.ends_with("-v -rst\n\n# *** EOF ***\n"));
    }

    #[test]
    fn without_programmer() {
        let mut makefile = Makefile::new(CUBEMX);
        makefile
            .patch(&PatchOptions {
                programmer: None,
                ..options()
            })
            .unwrap();

        assert!(!makefile.as_str().contains("prog:"));
    }

    #[test]
    fn windows_line_endings() {
        let mut makefile = Makefile::new(CUBEMX.replace('\n', "\r\n"));
        makefile.patch(&options()).unwrap();

        assert!(!makefile.as_str().contains('\r'));
        assert_eq!(makefile.as_str(), patched());
    }

    #[test]
    fn continued_assignment() {
        let mut makefile = Makefile::new("LIBS = -lc \\\n  -lm\nLIBDIR =\n");
        makefile.set_variable("LIBS", "-lnosys").unwrap();

        assert_eq!(makefile.as_str(), "LIBS = -lnosys\nLIBDIR =\n");
        assert_eq!(
            makefile.set_variable("PREFIX", "arm-none-eabi-"),
            Err(PatchError::MissingVariable("PREFIX".into()))
        );
    }

    #[test]
    fn repair_stops_at_blank_line() {
        let text = "# C sources\n\nC_SOURCES = \\\nb.c \\\na.c\nOPT = -Og\n# next";
        let mut makefile = Makefile::new(text);

        assert!(makefile.repair_multiple_definition(TAG_SOURCES_C));
        assert_eq!(makefile.as_str(), text);

        let mut makefile = Makefile::new("# C sources");
        assert!(makefile.repair_multiple_definition(TAG_SOURCES_C));
        assert_eq!(makefile.as_str(), "# C sources");
    }

    #[test]
    fn gcc_path_toolchain() {
        let mut makefile = Makefile::new(include_str!("../test_data/cubemx_gcc_path.mk"));
        makefile.patch(&options()).unwrap();
        let text = makefile.as_str();

        assert!(text.contains("ifdef GCC_PATH\nCC = $(GCC_PATH)/$(PREFIX)g++\n"));
        assert!(text.contains("else\nCC = $(PREFIX)g++\n"));
        assert!(text.contains("AS = $(GCC_PATH)/$(PREFIX)gcc -x assembler-with-cpp\n"));
        assert!(text.contains("AS = $(PREFIX)gcc -x assembler-with-cpp\n"));
        assert!(!text.contains("BINPATH"));
        assert!(text.contains(&format!("\nCFLAGS = {}\n", CPP_CFLAGS.join(" "))));
        assert!(text.contains("$(BUILD_DIR)/%.o: %.cpp Makefile"));
    }

    #[test]
    fn unknown_compiler_without_binpath() {
        let mut makefile = Makefile::new("PREFIX = arm-none-eabi-\nCC = clang\n");

        assert_eq!(
            makefile.support_cpp(),
            Err(PatchError::MissingVariable("BINPATH".into()))
        );
        assert_eq!(makefile.as_str(), "PREFIX = arm-none-eabi-\nCC = clang\n");

        let mut makefile = Makefile::new("PREFIX = arm-none-eabi-\n");
        assert_eq!(
            makefile.support_cpp(),
            Err(PatchError::MissingVariable("BINPATH".into()))
        );
    }

    #[test]
    fn no_binpath() {
        let mut makefile = Makefile::new("PREFIX = arm-none-eabi-\nCC = $(PREFIX)gcc\n");
        makefile.update_toolchain("/opt/bin/").unwrap();

        assert_eq!(makefile.as_str(), "PREFIX = arm-none-eabi-\nCC = $(PREFIX)gcc\n");
    }
}
