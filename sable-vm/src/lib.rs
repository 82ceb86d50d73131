//! Sable - Virtual Machine
//!
//! Interprets a checked `Assembly` directly: procedures and blocks are
//! flattened into one instruction stream, calls run on an explicit frame
//! stack and pointers are handles into an emulated memory arena.

pub mod vm;

// Re-export commonly used types
pub use vm::{ExternResolver, Memory, NativeSymbol, SymbolTable, VMState, VirtualMachine, VmOptions};
