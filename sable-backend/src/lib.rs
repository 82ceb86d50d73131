//! Sable - x86 Backend
//!
//! Lowers a checked `Assembly` into an `X86Assembly` for 32-bit x86 and
//! defines the boundary to the native toolchain that assembles and links
//! the emitted listings.

pub mod lower;
pub mod naming;
pub mod toolchain;

pub use lower::lower_assembly;
pub use toolchain::{Build, CommandToolchain, OutputKind, Toolchain};

/// Options for lowering
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Annotate the first x86 instruction of each IR instruction with its IR text
    pub emit_comments: bool,
}
