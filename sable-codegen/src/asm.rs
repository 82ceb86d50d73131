//! x86 Instruction Definitions
//!
//! Lowered programs are procs of labelled basic blocks, each a list of
//! `X86Instr` over `Operand`s. Everything serializes to JSON for dumps.

use crate::operand::Operand;
use crate::regs::Width;
use serde::Serialize;
use std::fmt;

/// x86 mnemonics used by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    // Data movement
    Mov,
    Movsx,
    Movzx,
    Push,
    Pop,

    // Arithmetic
    Add,
    Sub,
    Imul,
    Idiv,
    Div,
    Cdq,

    // Logical
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,

    // Flags
    Cmp,
    Test,

    // Control flow
    Jmp,
    Je,
    Jne,
    Jg,
    Jl,
    Jge,
    Jle,
    Ja,
    Jb,
    Jae,
    Jbe,
    Call,
    Ret,
}

impl Opcode {
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Opcode::Jmp
                | Opcode::Je
                | Opcode::Jne
                | Opcode::Jg
                | Opcode::Jl
                | Opcode::Jge
                | Opcode::Jle
                | Opcode::Ja
                | Opcode::Jb
                | Opcode::Jae
                | Opcode::Jbe
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Mov => "mov",
            Opcode::Movsx => "movsx",
            Opcode::Movzx => "movzx",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Imul => "imul",
            Opcode::Idiv => "idiv",
            Opcode::Div => "div",
            Opcode::Cdq => "cdq",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Sar => "sar",
            Opcode::Cmp => "cmp",
            Opcode::Test => "test",
            Opcode::Jmp => "jmp",
            Opcode::Je => "je",
            Opcode::Jne => "jne",
            Opcode::Jg => "jg",
            Opcode::Jl => "jl",
            Opcode::Jge => "jge",
            Opcode::Jle => "jle",
            Opcode::Ja => "ja",
            Opcode::Jb => "jb",
            Opcode::Jae => "jae",
            Opcode::Jbe => "jbe",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct X86Instr {
    pub op: Opcode,
    pub operands: Vec<Operand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl X86Instr {
    pub fn new(op: Opcode, operands: Vec<Operand>) -> Self {
        Self {
            op,
            operands,
            comment: None,
        }
    }

    pub fn op0(op: Opcode) -> Self {
        Self::new(op, Vec::new())
    }

    pub fn op1(op: Opcode, a: impl Into<Operand>) -> Self {
        Self::new(op, vec![a.into()])
    }

    pub fn op2(op: Opcode, a: impl Into<Operand>, b: impl Into<Operand>) -> Self {
        Self::new(op, vec![a.into(), b.into()])
    }

    pub fn jump(op: Opcode, label: &str) -> Self {
        Self::new(op, vec![Operand::Label(label.to_string())])
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// `"<op> a, b"`
    pub fn to_intel_syntax(&self) -> String {
        if self.operands.is_empty() {
            return self.op.to_string();
        }
        let operands: Vec<String> = self.operands.iter().map(Operand::to_intel_syntax).collect();
        format!("{} {}", self.op, operands.join(", "))
    }
}

impl fmt::Display for X86Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_intel_syntax())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct X86BasicBlock {
    pub label: String,
    pub instrs: Vec<X86Instr>,
}

impl X86BasicBlock {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            instrs: Vec::new(),
        }
    }

    pub fn push(&mut self, instr: X86Instr) {
        self.instrs.push(instr);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct X86Proc {
    pub name: String,
    pub public: bool,
    pub blocks: Vec<X86BasicBlock>,
}

impl X86Proc {
    pub fn new(name: &str, public: bool) -> Self {
        Self {
            name: name.to_string(),
            public,
            blocks: Vec::new(),
        }
    }

    pub fn block_index(&self, label: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }

    /// Splice `blocks` in directly after the block at `index`
    pub fn insert_blocks_after(&mut self, index: usize, blocks: Vec<X86BasicBlock>) {
        let at = (index + 1).min(self.blocks.len());
        self.blocks.splice(at..at, blocks);
    }

    pub fn instructions(&self) -> impl Iterator<Item = &X86Instr> {
        self.blocks.iter().flat_map(|b| b.instrs.iter())
    }
}

/// Statically allocated data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataItem {
    pub label: String,
    pub width: Width,
    /// Zero-filled when absent
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct X86Assembly {
    pub name: String,
    pub procs: Vec<X86Proc>,
    pub data: Vec<DataItem>,
    pub externs: Vec<String>,
}

impl X86Assembly {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            procs: Vec::new(),
            data: Vec::new(),
            externs: Vec::new(),
        }
    }

    pub fn proc(&self, name: &str) -> Option<&X86Proc> {
        self.procs.iter().find(|p| p.name == name)
    }
}
