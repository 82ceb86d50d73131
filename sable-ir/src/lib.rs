//! Sable - Intermediate Representation
//!
//! This crate defines the typed IR shared by the virtual machine and the
//! x86 backend: the type and value model, the instruction graph, the
//! `Builder` used by front-ends, and the validator that turns an
//! `UncheckedAssembly` into a checked `Assembly`.

pub mod assembly;
pub mod builder;
pub mod high_level;
pub mod instr;
pub mod types;
pub mod validate;
pub mod value;


pub use assembly::{
    Assembly, BasicBlock, ConstDef, ExternDef, GlobalDef, Proc, StructDef, UncheckedAssembly, Visibility,
};
pub use builder::{Builder, BuilderState, ENTRY_BLOCK};
pub use high_level::HighLevelBuilderExt;
pub use instr::{BinaryOp, BitwiseOp, BlockId, BlockRef, CmpOp, Instr, InstrNode, ProcId, ShiftOp};
pub use types::{CallConv, ProcType, StructType, Type, POINTER_SIZE};
pub use value::{IntValue, PtrValue, Register, SymbolRef, UserData, UserValue, Value};
