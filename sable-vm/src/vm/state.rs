use std::fmt;

/// VM execution states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VMState {
    /// No call in progress
    Setup,
    Running,
    /// The entry procedure returned
    Halted,
    Error(String),
}

impl fmt::Display for VMState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VMState::Setup => write!(f, "setup"),
            VMState::Running => write!(f, "running"),
            VMState::Halted => write!(f, "halted"),
            VMState::Error(e) => write!(f, "error: {}", e),
        }
    }
}

/// Interpreter configuration
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Abort with a resource error after this many cycles
    pub max_cycles: Option<u64>,
    /// Log every executed instruction at debug level
    pub trace: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_cycles: Some(10_000_000),
            trace: false,
        }
    }
}
