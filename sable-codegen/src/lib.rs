//! Sable - x86 Machine Model
//!
//! Everything the backend needs to describe 32-bit x86 code without
//! encoding it: the register table, a small register pool, operands,
//! instructions grouped into procs and basic blocks, and Intel-syntax
//! listing emission for an external assembler.

pub mod asm;
pub mod emit;
pub mod operand;
pub mod pool;
pub mod regs;

pub use asm::{DataItem, Opcode, X86Assembly, X86BasicBlock, X86Instr, X86Proc};
pub use emit::emit_assembly;
pub use operand::{Memory, Operand};
pub use pool::RegisterPool;
pub use regs::{Register, Width, REGISTERS};
