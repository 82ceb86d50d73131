//! IR instructions
//!
//! The instruction set is a closed enum. Value instructions (everything but
//! `Ret`, `Jmp`, `JmpIf` and `Store`) write their result into a fresh register.

use crate::value::{Register, Value};
use std::fmt;

/// Index of a procedure within its assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcId(pub u32);

/// Index of a basic block within its procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Fully-qualified basic block reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub proc: ProcId,
    pub block: BlockId,
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Integer arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Shl,
    Shr,
}

/// Comparison predicates (`Gr` = greater than, `Le` = less than)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Gr,
    Le,
    GrEq,
    LeEq,
}

impl CmpOp {
    /// Predicates that only need equality, valid for any comparable type
    pub fn is_equality(&self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    pub fn evaluate<T: PartialOrd>(&self, left: T, right: T) -> bool {
        match self {
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
            CmpOp::Gr => left > right,
            CmpOp::Le => left < right,
            CmpOp::GrEq => left >= right,
            CmpOp::LeEq => left <= right,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
        };
        write!(f, "{}", op_str)
    }
}

impl fmt::Display for BitwiseOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            BitwiseOp::And => "and",
            BitwiseOp::Or => "or",
            BitwiseOp::Xor => "xor",
        };
        write!(f, "{}", op_str)
    }
}

impl fmt::Display for ShiftOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftOp::Shl => write!(f, "shl"),
            ShiftOp::Shr => write!(f, "shr"),
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Gr => "gr",
            CmpOp::Le => "le",
            CmpOp::GrEq => "gr_eq",
            CmpOp::LeEq => "le_eq",
        };
        write!(f, "{}", op_str)
    }
}

/// IR Instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Return: ret value or ret void
    Ret { value: Option<Value> },

    /// Procedure call: result = call callee(args...)
    Call {
        result: Register,
        callee: Value,
        args: Vec<Value>,
    },

    /// Unconditional branch
    Jmp { target: BlockId },

    /// Conditional branch on a non-zero integer
    JmpIf {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },

    /// Reserve storage; `ty` is the pointer type of the result
    Alloc { result: Register, ty: crate::types::Type },

    /// result = *src
    Load { result: Register, src: Value },

    /// *target = value
    Store { target: Value, value: Value },

    /// result = left op right (integer 0/1)
    Cmp {
        result: Register,
        op: CmpOp,
        left: Value,
        right: Value,
    },

    /// Reinterpret value as the result register's type
    Cast { result: Register, value: Value },

    /// result = &(*value).fields[index]
    ElementPtr {
        result: Register,
        value: Value,
        index: u32,
    },

    Binary {
        result: Register,
        op: BinaryOp,
        left: Value,
        right: Value,
    },

    Bitwise {
        result: Register,
        op: BitwiseOp,
        left: Value,
        right: Value,
    },

    Shift {
        result: Register,
        op: ShiftOp,
        value: Value,
        amount: Value,
    },
}

impl Instr {
    /// Ret, Jmp and JmpIf end a basic block
    pub fn is_branch(&self) -> bool {
        matches!(self, Instr::Ret { .. } | Instr::Jmp { .. } | Instr::JmpIf { .. })
    }

    /// The register this instruction writes, if any
    pub fn result(&self) -> Option<&Register> {
        match self {
            Instr::Call { result, .. }
            | Instr::Alloc { result, .. }
            | Instr::Load { result, .. }
            | Instr::Cmp { result, .. }
            | Instr::Cast { result, .. }
            | Instr::ElementPtr { result, .. }
            | Instr::Binary { result, .. }
            | Instr::Bitwise { result, .. }
            | Instr::Shift { result, .. } => Some(result),
            Instr::Ret { .. } | Instr::Jmp { .. } | Instr::JmpIf { .. } | Instr::Store { .. } => None,
        }
    }

    /// Every value this instruction reads, in operand order
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instr::Ret { value } => value.iter().collect(),
            Instr::Call { callee, args, .. } => std::iter::once(callee).chain(args.iter()).collect(),
            Instr::Jmp { .. } | Instr::Alloc { .. } => Vec::new(),
            Instr::JmpIf { cond, .. } => vec![cond],
            Instr::Load { src, .. } => vec![src],
            Instr::Store { target, value } => vec![target, value],
            Instr::Cmp { left, right, .. }
            | Instr::Binary { left, right, .. }
            | Instr::Bitwise { left, right, .. } => vec![left, right],
            Instr::Cast { value, .. } | Instr::ElementPtr { value, .. } => vec![value],
            Instr::Shift { value, amount, .. } => vec![value, amount],
        }
    }

    /// Blocks this instruction may transfer control to
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Instr::Jmp { target } => vec![*target],
            Instr::JmpIf { then_block, else_block, .. } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Ret { value: Some(value) } => write!(f, "ret {}", value),
            Instr::Ret { value: None } => write!(f, "ret void"),
            Instr::Call { result, callee, args } => {
                write!(f, "%{} = call {}(", result.index, callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Instr::Jmp { target } => write!(f, "jmp {}", target),
            Instr::JmpIf { cond, then_block, else_block } => {
                write!(f, "jmp_if {}, {}, {}", cond, then_block, else_block)
            }
            Instr::Alloc { result, ty } => write!(f, "%{} = alloc {}", result.index, ty),
            Instr::Load { result, src } => write!(f, "%{} = load {} {}", result.index, result.ty, src),
            Instr::Store { target, value } => write!(f, "store {}, {}", target, value),
            Instr::Cmp { result, op, left, right } => {
                write!(f, "%{} = cmp {} {}, {}", result.index, op, left, right)
            }
            Instr::Cast { result, value } => write!(f, "%{} = cast {} to {}", result.index, value, result.ty),
            Instr::ElementPtr { result, value, index } => {
                write!(f, "%{} = element_ptr {}, {}", result.index, value, index)
            }
            Instr::Binary { result, op, left, right } => {
                write!(f, "%{} = {} {} {}, {}", result.index, op, result.ty, left, right)
            }
            Instr::Bitwise { result, op, left, right } => {
                write!(f, "%{} = {} {} {}, {}", result.index, op, result.ty, left, right)
            }
            Instr::Shift { result, op, value, amount } => {
                write!(f, "%{} = {} {} {}, {}", result.index, op, result.ty, value, amount)
            }
        }
    }
}

/// An instruction plus the block it believes it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct InstrNode {
    pub parent: BlockRef,
    pub instr: Instr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use pretty_assertions::assert_eq;

    fn reg(index: u32) -> Register {
        Register { index, ty: Type::i32() }
    }

    #[test]
    fn test_branch_classification() {
        assert!(Instr::Ret { value: None }.is_branch());
        assert!(Instr::Jmp { target: BlockId(1) }.is_branch());
        assert!(Instr::JmpIf {
            cond: Value::i32(1),
            then_block: BlockId(1),
            else_block: BlockId(2),
        }
        .is_branch());
        assert!(!Instr::Store {
            target: Value::Register(reg(0)),
            value: Value::i32(1),
        }
        .is_branch());
    }

    #[test]
    fn test_results_and_operands() {
        let add = Instr::Binary {
            result: reg(2),
            op: BinaryOp::Add,
            left: Value::Register(reg(0)),
            right: Value::i32(1),
        };
        assert_eq!(add.result(), Some(&reg(2)));
        assert_eq!(add.operands().len(), 2);

        let store = Instr::Store {
            target: Value::Register(reg(0)),
            value: Value::i32(1),
        };
        assert_eq!(store.result(), None);

        let jmp_if = Instr::JmpIf {
            cond: Value::Register(reg(1)),
            then_block: BlockId(3),
            else_block: BlockId(4),
        };
        assert_eq!(jmp_if.successors(), vec![BlockId(3), BlockId(4)]);
    }

    #[test]
    fn test_cmp_evaluate() {
        assert!(CmpOp::Gr.evaluate(3, 2));
        assert!(CmpOp::Le.evaluate(2, 3));
        assert!(CmpOp::LeEq.evaluate(3, 3));
        assert!(!CmpOp::Ne.evaluate(3, 3));
        assert!(CmpOp::Eq.is_equality());
        assert!(!CmpOp::GrEq.is_equality());
    }

    #[test]
    fn test_instruction_display() {
        let cmp = Instr::Cmp {
            result: reg(3),
            op: CmpOp::LeEq,
            left: Value::Register(reg(0)),
            right: Value::i32(1),
        };
        assert_eq!(cmp.to_string(), "%3 = cmp le_eq %0, i32 1");
        assert_eq!(Instr::Ret { value: Some(Value::i32(263)) }.to_string(), "ret i32 263");
        assert_eq!(Instr::Jmp { target: BlockId(2) }.to_string(), "jmp bb2");
    }
}
