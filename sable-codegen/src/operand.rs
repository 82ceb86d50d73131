//! x86 operands and their Intel-syntax rendering

use crate::regs::{Register, Width};
use serde::Serialize;
use std::fmt;

/// Memory reference `[symbol + base + index * scale +/- disp]`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Memory {
    /// Access size, rendered as a `dword ptr` style prefix
    pub width: Option<Width>,
    pub base: Option<Register>,
    pub index: Option<(Register, u8)>,
    pub disp: i32,
    pub symbol: Option<String>,
}

impl Memory {
    pub fn base(base: Register) -> Self {
        Self {
            base: Some(base),
            ..Self::default()
        }
    }

    pub fn base_disp(base: Register, disp: i32) -> Self {
        Self {
            base: Some(base),
            disp,
            ..Self::default()
        }
    }

    pub fn absolute(disp: i32) -> Self {
        Self {
            disp,
            ..Self::default()
        }
    }

    pub fn symbol(name: &str) -> Self {
        Self {
            symbol: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_index(mut self, index: Register, scale: u8) -> Self {
        self.index = Some((index, scale));
        self
    }

    pub fn sized(mut self, width: Width) -> Self {
        self.width = Some(width);
        self
    }

    pub fn to_intel_syntax(&self) -> String {
        let mut terms: Vec<String> = Vec::new();
        if let Some(symbol) = &self.symbol {
            terms.push(symbol.clone());
        }
        if let Some(base) = &self.base {
            terms.push(base.name.to_string());
        }
        if let Some((index, scale)) = &self.index {
            terms.push(format!("{} * {}", index, scale));
        }

        let mut inner = terms.join(" + ");
        if inner.is_empty() {
            inner = self.disp.to_string();
        } else if self.disp > 0 {
            inner.push_str(&format!(" + {}", self.disp));
        } else if self.disp < 0 {
            inner.push_str(&format!(" - {}", self.disp.unsigned_abs()));
        }

        match self.width {
            Some(width) => format!("{} ptr [{}]", width.keyword(), inner),
            None => format!("[{}]", inner),
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Operand {
    Reg(Register),
    Imm(i64),
    Mem(Memory),
    /// Jump or call target
    Label(String),
    /// Address of a symbol as an immediate
    Offset(String),
}

impl Operand {
    pub fn to_intel_syntax(&self) -> String {
        match self {
            Operand::Reg(reg) => reg.name.to_string(),
            Operand::Imm(value) => value.to_string(),
            Operand::Mem(mem) => mem.to_intel_syntax(),
            Operand::Label(label) => label.clone(),
            Operand::Offset(symbol) => format!("offset {}", symbol),
        }
    }
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Reg(reg)
    }
}

impl From<Memory> for Operand {
    fn from(mem: Memory) -> Self {
        Operand::Mem(mem)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Imm(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_intel_syntax())
    }
}
