//! x86 Register Set
//!
//! Registers are flat values out of a static table. Each one names an
//! architectural slot (0-15, in encoding order), an access width and, for the
//! legacy byte registers `ah/ch/dh/bh`, the high half of the low word.

use serde::{Serialize, Serializer};
use std::fmt;

/// Operand access width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Width {
    Byte,
    Word,
    Dword,
    Qword,
}

impl Width {
    pub fn bits(&self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
            Width::Dword => 32,
            Width::Qword => 64,
        }
    }

    pub fn bytes(&self) -> u32 {
        self.bits() / 8
    }

    /// Smallest width holding `bytes` bytes
    pub fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(Width::Byte),
            2 => Some(Width::Word),
            3 | 4 => Some(Width::Dword),
            5..=8 => Some(Width::Qword),
            _ => None,
        }
    }

    /// Size keyword for memory operands
    pub fn keyword(&self) -> &'static str {
        match self {
            Width::Byte => "byte",
            Width::Word => "word",
            Width::Dword => "dword",
            Width::Qword => "qword",
        }
    }
}

/// Physical x86 register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub slot: u8,
    pub width: Width,
    pub high_byte: bool,
    pub name: &'static str,
}

impl Register {
    /// Whether two registers share any bits
    pub fn overlaps(&self, other: &Register) -> bool {
        if self.slot != other.slot {
            return false;
        }
        // al and ah live in the same slot but never alias each other
        !(self.width == Width::Byte && other.width == Width::Byte && self.high_byte != other.high_byte)
    }

    /// Same slot at another width (low byte for `Byte`)
    pub fn with_width(&self, width: Width) -> Option<Register> {
        lookup(self.slot, width, false)
    }

    pub fn by_name(name: &str) -> Option<Register> {
        REGISTERS.iter().copied().find(|r| r.name == name)
    }

    /// eax/ecx/edx/ebx family
    pub fn is_general(&self) -> bool {
        self.slot < GENERAL_SLOTS
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Serialize for Register {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

/// Slots 0-3 are the only ones handed out by `RegisterPool::allocate`
pub const GENERAL_SLOTS: u8 = 4;

/// Look a register up by slot and width
pub fn lookup(slot: u8, width: Width, high_byte: bool) -> Option<Register> {
    REGISTERS
        .iter()
        .copied()
        .find(|r| r.slot == slot && r.width == width && r.high_byte == high_byte)
}

macro_rules! registers {
    ($($ident:ident = ($slot:expr, $width:ident, $high:expr, $name:expr);)*) => {
        $(pub const $ident: Register = Register {
            slot: $slot,
            width: Width::$width,
            high_byte: $high,
            name: $name,
        };)*

        /// Every register of the 64-bit register file
        pub static REGISTERS: &[Register] = &[$($ident),*];
    };
}

registers! {
    AL = (0, Byte, false, "al");
    CL = (1, Byte, false, "cl");
    DL = (2, Byte, false, "dl");
    BL = (3, Byte, false, "bl");
    SPL = (4, Byte, false, "spl");
    BPL = (5, Byte, false, "bpl");
    SIL = (6, Byte, false, "sil");
    DIL = (7, Byte, false, "dil");
    R8B = (8, Byte, false, "r8b");
    R9B = (9, Byte, false, "r9b");
    R10B = (10, Byte, false, "r10b");
    R11B = (11, Byte, false, "r11b");
    R12B = (12, Byte, false, "r12b");
    R13B = (13, Byte, false, "r13b");
    R14B = (14, Byte, false, "r14b");
    R15B = (15, Byte, false, "r15b");

    AH = (0, Byte, true, "ah");
    CH = (1, Byte, true, "ch");
    DH = (2, Byte, true, "dh");
    BH = (3, Byte, true, "bh");

    AX = (0, Word, false, "ax");
    CX = (1, Word, false, "cx");
    DX = (2, Word, false, "dx");
    BX = (3, Word, false, "bx");
    SP = (4, Word, false, "sp");
    BP = (5, Word, false, "bp");
    SI = (6, Word, false, "si");
    DI = (7, Word, false, "di");
    R8W = (8, Word, false, "r8w");
    R9W = (9, Word, false, "r9w");
    R10W = (10, Word, false, "r10w");
    R11W = (11, Word, false, "r11w");
    R12W = (12, Word, false, "r12w");
    R13W = (13, Word, false, "r13w");
    R14W = (14, Word, false, "r14w");
    R15W = (15, Word, false, "r15w");

    EAX = (0, Dword, false, "eax");
    ECX = (1, Dword, false, "ecx");
    EDX = (2, Dword, false, "edx");
    EBX = (3, Dword, false, "ebx");
    ESP = (4, Dword, false, "esp");
    EBP = (5, Dword, false, "ebp");
    ESI = (6, Dword, false, "esi");
    EDI = (7, Dword, false, "edi");
    R8D = (8, Dword, false, "r8d");
    R9D = (9, Dword, false, "r9d");
    R10D = (10, Dword, false, "r10d");
    R11D = (11, Dword, false, "r11d");
    R12D = (12, Dword, false, "r12d");
    R13D = (13, Dword, false, "r13d");
    R14D = (14, Dword, false, "r14d");
    R15D = (15, Dword, false, "r15d");

    RAX = (0, Qword, false, "rax");
    RCX = (1, Qword, false, "rcx");
    RDX = (2, Qword, false, "rdx");
    RBX = (3, Qword, false, "rbx");
    RSP = (4, Qword, false, "rsp");
    RBP = (5, Qword, false, "rbp");
    RSI = (6, Qword, false, "rsi");
    RDI = (7, Qword, false, "rdi");
    R8 = (8, Qword, false, "r8");
    R9 = (9, Qword, false, "r9");
    R10 = (10, Qword, false, "r10");
    R11 = (11, Qword, false, "r11");
    R12 = (12, Qword, false, "r12");
    R13 = (13, Qword, false, "r13");
    R14 = (14, Qword, false, "r14");
    R15 = (15, Qword, false, "r15");
}
