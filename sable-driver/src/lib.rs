//! Sable - Driver
//!
//! Glue between the command line and the toolkit crates: looks up sample
//! programs, validates them, runs them on the virtual machine and lowers
//! them to x86.

pub mod samples;

use anyhow::{bail, Context, Result};
use log::info;
use samples::Sample;
use sable_backend::{lower_assembly, BackendOptions, Build, CommandToolchain, OutputKind, Toolchain};
use sable_codegen::X86Assembly;
use sable_ir::{Assembly, Value};
use sable_vm::{SymbolTable, VirtualMachine, VmOptions};
use serde::Serialize;
use std::path::PathBuf;

/// Result of running a sample on the virtual machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub sample: String,
    pub args: Vec<i32>,
    /// Display form of the returned value, `None` for void procs
    pub result: Option<String>,
    pub cycles: u64,
}

pub fn find_sample(name: &str) -> Result<&'static Sample> {
    match samples::find(name) {
        Some(sample) => Ok(sample),
        None => {
            let known: Vec<&str> = samples::SAMPLES.iter().map(|s| s.name).collect();
            bail!("unknown sample '{}' (expected one of: {})", name, known.join(", "))
        }
    }
}

/// Build and validate a sample
pub fn check_sample(sample: &Sample) -> Result<Assembly> {
    let unchecked = (sample.build)().with_context(|| format!("failed to build sample {}", sample.name))?;
    let assembly = unchecked
        .check()
        .with_context(|| format!("sample {} failed validation", sample.name))?;
    info!("Sample {} is valid", sample.name);
    Ok(assembly)
}

/// Execute the sample's entry procedure
pub fn run_sample(sample: &Sample, args: &[i32], options: VmOptions) -> Result<(Option<Value>, RunReport)> {
    if args.len() != sample.arity {
        bail!(
            "{} takes {} argument(s), got {}",
            sample.entry,
            sample.arity,
            args.len()
        );
    }
    let assembly = check_sample(sample)?;
    let mut vm = VirtualMachine::with_options(&assembly, options, &SymbolTable::new())?;

    let values: Vec<Value> = args.iter().map(|a| Value::i32(*a)).collect();
    let result = vm
        .execute(sample.entry, &values)
        .with_context(|| format!("{} failed after {} cycles", sample.entry, vm.cycles()))?;

    let report = RunReport {
        sample: sample.name.to_string(),
        args: args.to_vec(),
        result: result.as_ref().map(ToString::to_string),
        cycles: vm.cycles(),
    };
    Ok((result, report))
}

pub fn lower_sample(sample: &Sample, options: &BackendOptions) -> Result<X86Assembly> {
    let assembly = check_sample(sample)?;
    let lowered = lower_assembly(&assembly, options).with_context(|| format!("failed to lower {}", sample.name))?;
    Ok(lowered)
}

/// Where and how `build_sample` invokes the native toolchain
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub intermediates: PathBuf,
    pub output: PathBuf,
    pub output_kind: OutputKind,
    pub command: String,
    pub command_args: Vec<String>,
    pub backend: BackendOptions,
}

/// Hand a sample to an external toolchain, returning its exit code
pub fn build_sample(sample: &Sample, request: &BuildRequest) -> Result<i32> {
    let assembly = check_sample(sample)?;
    let build = Build {
        intermediates_directory: request.intermediates.clone(),
        output_kind: request.output_kind,
        output_path: request.output.clone(),
        assemblies: vec![assembly],
    };
    let toolchain = CommandToolchain {
        program: request.command.clone(),
        args: request.command_args.clone(),
        options: request.backend.clone(),
    };
    let code = toolchain
        .compile(&build)
        .with_context(|| format!("toolchain '{}' failed", request.command))?;
    Ok(code)
}
