//! Sable - Common Error Types and Diagnostics
//!
//! This crate contains the error taxonomy and validation report types
//! shared by the IR, the virtual machine and the x86 backend.

pub mod error;

pub use error::{CompilerError, Location, ValidationCategory, ValidationError, ValidationReport};

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, CompilerError>;
