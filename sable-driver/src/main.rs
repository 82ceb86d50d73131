//! Sable command line driver

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sable_backend::{BackendOptions, OutputKind};
use sable_codegen::emit_assembly;
use sable_driver::samples::SAMPLES;
use sable_driver::{build_sample, check_sample, find_sample, lower_sample, run_sample, BuildRequest};
use sable_vm::VmOptions;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "sable")]
#[command(about = "Sable IR toolkit: validate, interpret and lower sample programs")]
#[command(version = "0.1.0")]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in samples
    List,

    /// Print a sample's IR
    Ir { sample: String },

    /// Validate a sample and report every error
    Check { sample: String },

    /// Run a sample on the virtual machine
    Run {
        sample: String,

        /// Argument for the entry procedure (repeatable)
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<i32>,

        /// Abort after this many instructions (0 = unlimited)
        #[arg(long, default_value_t = 10_000_000)]
        max_cycles: u64,

        /// Log every executed instruction at debug level
        #[arg(long)]
        trace: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Lower a sample to x86 assembly
    Asm {
        sample: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dump the lowered program as JSON instead of a listing
        #[arg(long)]
        json: bool,

        /// Annotate instructions with the IR they came from
        #[arg(long)]
        comments: bool,
    },

    /// Lower a sample and hand it to an external assembler/linker
    Build {
        sample: String,

        /// Directory for the generated listings
        #[arg(long)]
        intermediates: PathBuf,

        /// Final output path
        #[arg(short, long)]
        output: PathBuf,

        /// Toolchain program to run
        #[arg(long)]
        command: String,

        /// Extra argument for the toolchain (repeatable)
        #[arg(long = "arg", allow_hyphen_values = true)]
        command_args: Vec<String>,

        #[arg(long, value_enum, default_value_t = Kind::Executable)]
        kind: Kind,

        #[arg(long)]
        comments: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Executable,
    SharedLibrary,
    Object,
}

impl From<Kind> for OutputKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Executable => OutputKind::Executable,
            Kind::SharedLibrary => OutputKind::SharedLibrary,
            Kind::Object => OutputKind::Object,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli.command) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(command: Commands) -> Result<i32> {
    match command {
        Commands::List => {
            for sample in SAMPLES {
                println!("{:<16} {}({}) - {}", sample.name, sample.entry, sample.arity, sample.description);
            }
        }

        Commands::Ir { sample } => {
            let sample = find_sample(&sample)?;
            let unchecked = (sample.build)()?;
            print!("{}", unchecked);
        }

        Commands::Check { sample } => {
            let sample = find_sample(&sample)?;
            let unchecked = (sample.build)()?;
            let report = unchecked.validate();
            if report.has_errors() {
                for error in report.errors() {
                    println!("{}", error);
                }
                println!("{}", report.summary());
                return Ok(1);
            }
            println!("{}: ok", sample.name);
        }

        Commands::Run { sample, args, max_cycles, trace, json } => {
            let sample = find_sample(&sample)?;
            let options = VmOptions {
                max_cycles: (max_cycles > 0).then_some(max_cycles),
                trace,
            };
            let (_, report) = run_sample(sample, &args, options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                match &report.result {
                    Some(value) => println!("{}", value),
                    None => println!("void"),
                }
            }
        }

        Commands::Asm { sample, output, json, comments } => {
            let sample = find_sample(&sample)?;
            let lowered = lower_sample(sample, &BackendOptions { emit_comments: comments })?;
            let text = if json {
                serde_json::to_string_pretty(&lowered)?
            } else {
                emit_assembly(&lowered)
            };
            match output {
                Some(path) => {
                    fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Assembly written to {}", path.display());
                }
                None => print!("{}", text),
            }
        }

        Commands::Build { sample, intermediates, output, command, command_args, kind, comments } => {
            let sample = find_sample(&sample)?;
            // Surface validation errors before anything touches the disk
            check_sample(sample)?;
            let request = BuildRequest {
                intermediates,
                output,
                output_kind: kind.into(),
                command,
                command_args,
                backend: BackendOptions { emit_comments: comments },
            };
            return build_sample(sample, &request);
        }
    }
    Ok(0)
}
