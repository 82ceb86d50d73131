//! Error handling for the Sable toolkit
//!
//! This module defines the error taxonomy shared by every phase: validation
//! diagnostics collected in batch, plus the fatal conditions raised by the
//! virtual machine and the x86 backend once an assembly has been checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type that encompasses all phases of the toolkit
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilerError {
    /// The unchecked assembly violates one or more invariants
    #[error("validation failed: {}", .0.summary())]
    Validation(ValidationReport),

    /// Valid program, but this component does not implement the feature
    #[error("unsupported: {feature}")]
    Unsupported { feature: String },

    /// A checked assembly broke an invariant the consumer relies on
    #[error("invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("runtime error: {message}")]
    Runtime { message: String },

    #[error("resource exhausted: {message}")]
    ResourceExhausted { message: String },

    /// Misuse of the builder API (no current proc, bad operand shape, ...)
    #[error("builder error: {message}")]
    Build { message: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl CompilerError {
    pub fn unsupported(feature: impl Into<String>) -> Self {
        CompilerError::Unsupported { feature: feature.into() }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        CompilerError::InvariantViolation { message: message.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        CompilerError::Runtime { message: message.into() }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        CompilerError::ResourceExhausted { message: message.into() }
    }

    pub fn build(message: impl Into<String>) -> Self {
        CompilerError::Build { message: message.into() }
    }

    /// True for "this backend doesn't implement that yet"
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CompilerError::Unsupported { .. })
    }

    /// The validation report, if this is a validation failure
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            CompilerError::Validation(report) => Some(report),
            _ => None,
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::Io {
            message: err.to_string(),
        }
    }
}

/// Where in the IR graph a validation error was found
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Assembly { name: String },
    Symbol { name: String },
    Proc { proc: String },
    Block { proc: String, block: String },
    Instr { proc: String, block: String, index: usize },
}

impl Location {
    pub fn symbol(name: &str) -> Self {
        Location::Symbol { name: name.to_string() }
    }

    pub fn proc(proc: &str) -> Self {
        Location::Proc { proc: proc.to_string() }
    }

    pub fn block(proc: &str, block: &str) -> Self {
        Location::Block {
            proc: proc.to_string(),
            block: block.to_string(),
        }
    }

    pub fn instr(proc: &str, block: &str, index: usize) -> Self {
        Location::Instr {
            proc: proc.to_string(),
            block: block.to_string(),
            index,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Assembly { name } => write!(f, "assembly `{}`", name),
            Location::Symbol { name } => write!(f, "@{}", name),
            Location::Proc { proc } => write!(f, "@{}", proc),
            Location::Block { proc, block } => write!(f, "@{}:{}", proc, block),
            Location::Instr { proc, block, index } => write!(f, "@{}:{}#{}", proc, block, index),
        }
    }
}

/// Classification of validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationCategory {
    // Structural
    DuplicateSymbol,
    EmptyProc,
    EmptyBlock,
    MisplacedBranch,
    MissingBranch,
    DanglingReference,
    DuplicateBlock,
    InvalidParameter,

    // Type-level
    TypeMismatch,
    IllegalCast,
    OutOfRange,
    InvalidComparison,
    ArgumentMismatch,
    NotCallable,
    InvalidConstant,
}

impl ValidationCategory {
    /// Structural errors are about graph shape, the rest about typing
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ValidationCategory::DuplicateSymbol
                | ValidationCategory::EmptyProc
                | ValidationCategory::EmptyBlock
                | ValidationCategory::MisplacedBranch
                | ValidationCategory::MissingBranch
                | ValidationCategory::DanglingReference
                | ValidationCategory::DuplicateBlock
                | ValidationCategory::InvalidParameter
        )
    }
}

impl fmt::Display for ValidationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationCategory::DuplicateSymbol => "duplicate-symbol",
            ValidationCategory::EmptyProc => "empty-proc",
            ValidationCategory::EmptyBlock => "empty-block",
            ValidationCategory::MisplacedBranch => "misplaced-branch",
            ValidationCategory::MissingBranch => "missing-branch",
            ValidationCategory::DanglingReference => "dangling-reference",
            ValidationCategory::DuplicateBlock => "duplicate-block",
            ValidationCategory::InvalidParameter => "invalid-parameter",
            ValidationCategory::TypeMismatch => "type-mismatch",
            ValidationCategory::IllegalCast => "illegal-cast",
            ValidationCategory::OutOfRange => "out-of-range",
            ValidationCategory::InvalidComparison => "invalid-comparison",
            ValidationCategory::ArgumentMismatch => "argument-mismatch",
            ValidationCategory::NotCallable => "not-callable",
            ValidationCategory::InvalidConstant => "invalid-constant",
        };
        write!(f, "{}", name)
    }
}

/// A single validation failure with its location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub location: Location,
    pub category: ValidationCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(location: Location, category: ValidationCategory, message: impl Into<String>) -> Self {
        Self {
            location,
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}] at {}: {}", self.category, self.location, self.message)
    }
}

/// Batch collector for validation errors
///
/// Validation never stops at the first problem; everything found during the
/// pass ends up here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Report an error
    pub fn error(&mut self, location: Location, category: ValidationCategory, message: impl Into<String>) {
        self.errors.push(ValidationError::new(location, category, message));
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if any errors have been reported
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn first(&self) -> Option<&ValidationError> {
        self.errors.first()
    }

    /// Any error of the given category?
    pub fn contains(&self, category: ValidationCategory) -> bool {
        self.errors.iter().any(|e| e.category == category)
    }

    /// Create a summary string
    pub fn summary(&self) -> String {
        match self.errors.len() {
            0 => "no errors".to_string(),
            1 => format!("1 error: {}", self.errors[0]),
            n => format!("{} errors, first: {}", n, self.errors[0]),
        }
    }

    /// `Ok(())` when clean, otherwise the whole report as an error
    pub fn into_result(self) -> Result<(), CompilerError> {
        if self.has_errors() {
            Err(CompilerError::Validation(self))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_collects_everything() {
        let mut report = ValidationReport::new();
        assert!(!report.has_errors());

        report.error(Location::symbol("main"), ValidationCategory::DuplicateSymbol, "duplicate symbol `main`");
        report.error(Location::block("main", "begin"), ValidationCategory::EmptyBlock, "block is empty");

        assert_eq!(report.error_count(), 2);
        assert!(report.contains(ValidationCategory::EmptyBlock));
        assert!(!report.contains(ValidationCategory::IllegalCast));
        assert_eq!(report.first().unwrap().location, Location::symbol("main"));
    }

    #[test]
    fn test_summary() {
        let mut report = ValidationReport::new();
        assert_eq!(report.summary(), "no errors");

        report.error(Location::instr("f", "begin", 2), ValidationCategory::TypeMismatch, "bad");
        assert_eq!(report.summary(), "1 error: error[type-mismatch] at @f:begin#2: bad");

        report.error(Location::proc("f"), ValidationCategory::EmptyProc, "no blocks");
        assert!(report.summary().starts_with("2 errors"));
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationReport::new().into_result().is_ok());

        let mut report = ValidationReport::new();
        report.error(Location::symbol("x"), ValidationCategory::InvalidConstant, "register in constant");
        let err = report.into_result().unwrap_err();
        assert_eq!(err.validation_report().map(|r| r.error_count()), Some(1));
        assert!(!err.is_unsupported());
    }

    #[test]
    fn test_category_classification() {
        assert!(ValidationCategory::EmptyBlock.is_structural());
        assert!(ValidationCategory::DuplicateSymbol.is_structural());
        assert!(!ValidationCategory::OutOfRange.is_structural());
        assert!(!ValidationCategory::InvalidComparison.is_structural());
    }

    #[test]
    fn test_error_display() {
        let err = CompilerError::unsupported("stdcall calling convention");
        assert_eq!(err.to_string(), "unsupported: stdcall calling convention");
        assert!(err.is_unsupported());
    }
}
