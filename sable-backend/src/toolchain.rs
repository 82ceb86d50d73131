//! Native toolchain boundary
//!
//! Turning listings into a binary belongs to an external assembler and
//! linker. This module only fixes the contract: a `Build` of checked
//! assemblies goes in, the tool's exit code comes out.

use crate::lower::lower_assembly;
use crate::naming::sanitize;
use crate::BackendOptions;
use log::{debug, info, warn};
use sable_codegen::emit_assembly;
use sable_common::{CompilerError, Result};
use sable_ir::Assembly;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    #[default]
    Executable,
    SharedLibrary,
    Object,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Executable => write!(f, "executable"),
            OutputKind::SharedLibrary => write!(f, "shared-library"),
            OutputKind::Object => write!(f, "object"),
        }
    }
}

/// One native build. Holding `Assembly` values means every input is checked.
#[derive(Debug, Clone)]
pub struct Build {
    pub intermediates_directory: PathBuf,
    pub output_kind: OutputKind,
    pub output_path: PathBuf,
    pub assemblies: Vec<Assembly>,
}

pub trait Toolchain {
    /// Produce `build.output_path`, returning the tool's exit code
    fn compile(&self, build: &Build) -> Result<i32>;
}

/// Writes one `<name>.asm` listing per assembly and hands them to an
/// external command as `<program> <args>... <listings>... -o <output>`.
///
/// The requested output kind is passed in `SABLE_OUTPUT_KIND`.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    pub program: String,
    pub args: Vec<String>,
    pub options: BackendOptions,
}

impl CommandToolchain {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            options: BackendOptions::default(),
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Lower and write every listing, returning their paths
    pub fn write_listings(&self, build: &Build) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&build.intermediates_directory)?;
        let mut paths = Vec::with_capacity(build.assemblies.len());
        for assembly in &build.assemblies {
            let lowered = lower_assembly(assembly, &self.options)?;
            let path = listing_path(&build.intermediates_directory, assembly.name());
            fs::write(&path, emit_assembly(&lowered))?;
            debug!("Wrote {}", path.display());
            paths.push(path);
        }
        Ok(paths)
    }
}

fn listing_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.asm", sanitize(name)))
}

impl Toolchain for CommandToolchain {
    fn compile(&self, build: &Build) -> Result<i32> {
        if build.assemblies.is_empty() {
            return Err(CompilerError::build("nothing to compile"));
        }
        let listings = self.write_listings(build)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(&listings)
            .arg("-o")
            .arg(&build.output_path)
            .env("SABLE_OUTPUT_KIND", build.output_kind.to_string());

        info!("Running {:?}", cmd);
        let status = cmd.status()?;
        let code = status
            .code()
            .ok_or_else(|| CompilerError::build(format!("{} was terminated by a signal", self.program)))?;
        if code != 0 {
            warn!("{} exited with {}", self.program, code);
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sable_ir::{Builder, Type, Value};

    fn answer() -> Assembly {
        let mut b = Builder::new("answer");
        b.define_proc("answer");
        b.set_return_type(Type::i32()).unwrap();
        b.ret(Some(Value::i32(42))).unwrap();
        b.check().unwrap()
    }

    fn build_in(dir: &Path) -> Build {
        Build {
            intermediates_directory: dir.join("obj"),
            output_kind: OutputKind::Executable,
            output_path: dir.join("answer"),
            assemblies: vec![answer()],
        }
    }

    #[test]
    fn test_listings_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = CommandToolchain::new("true");
        let paths = toolchain.write_listings(&build_in(dir.path())).unwrap();

        assert_eq!(paths, vec![dir.path().join("obj").join("answer.asm")]);
        let listing = fs::read_to_string(&paths[0]).unwrap();
        assert!(listing.starts_with("; assembly answer\n.intel_syntax noprefix\n"));
        assert!(listing.contains("    mov eax, 42\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_in(dir.path());

        assert_eq!(CommandToolchain::new("true").compile(&build).unwrap(), 0);
        assert_eq!(CommandToolchain::new("false").compile(&build).unwrap(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_sees_listing_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_in(dir.path());
        let script = format!(
            "test -f {} && test \"$SABLE_OUTPUT_KIND\" = executable && test \"$2\" = -o",
            dir.path().join("obj").join("answer.asm").display()
        );
        let toolchain = CommandToolchain::new("sh").arg("-c").arg(&script).arg("check");

        assert_eq!(toolchain.compile(&build).unwrap(), 0);
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CommandToolchain::new("sable-no-such-assembler").compile(&build_in(dir.path()));
        assert!(matches!(result, Err(CompilerError::Io { .. })));
    }

    #[test]
    fn test_empty_build_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut build = build_in(dir.path());
        build.assemblies.clear();
        assert!(matches!(
            CommandToolchain::new("true").compile(&build),
            Err(CompilerError::Build { .. })
        ));
    }
}
