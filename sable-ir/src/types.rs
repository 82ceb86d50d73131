//! IR type algebra
//!
//! Types compare structurally. Struct types carry an optional name for
//! display purposes only; two structs with the same field sequence are the
//! same type regardless of what they are called.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Size of a pointer on the 32-bit target
pub const POINTER_SIZE: u32 = 4;

/// Argument/return-value passing protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallConv {
    #[default]
    Cdecl,
    Stdcall,
    Fastcall,
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallConv::Cdecl => write!(f, "cdecl"),
            CallConv::Stdcall => write!(f, "stdcall"),
            CallConv::Fastcall => write!(f, "fastcall"),
        }
    }
}

/// IR Type system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,

    /// Integer of arbitrary bit width
    Int { bits: u32, signed: bool },

    /// Pointer to a value of the subtype
    Ptr(Box<Type>),

    /// Procedure signature
    Proc(ProcType),

    /// Aggregate with ordered fields
    Struct(StructType),

    /// Opaque host-defined datatype, identified by name
    User(String),
}

/// Procedure signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcType {
    pub callconv: CallConv,
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

/// Struct layout. Equality and hashing ignore `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructType {
    pub name: Option<String>,
    pub fields: Vec<Type>,
}

impl PartialEq for StructType {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for StructType {}

impl Hash for StructType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields.hash(state);
    }
}

impl StructType {
    /// Byte offset of a field (fields are packed, no padding)
    pub fn field_offset(&self, index: usize) -> Option<u32> {
        if index >= self.fields.len() {
            return None;
        }
        let mut offset = 0;
        for field in &self.fields[..index] {
            offset += field.size_in_bytes()?;
        }
        Some(offset)
    }
}

impl Type {
    pub fn int(bits: u32, signed: bool) -> Self {
        Type::Int { bits, signed }
    }

    pub fn i8() -> Self {
        Type::int(8, true)
    }

    pub fn i16() -> Self {
        Type::int(16, true)
    }

    pub fn i32() -> Self {
        Type::int(32, true)
    }

    pub fn i64() -> Self {
        Type::int(64, true)
    }

    pub fn u8() -> Self {
        Type::int(8, false)
    }

    pub fn u32() -> Self {
        Type::int(32, false)
    }

    pub fn ptr(pointee: Type) -> Self {
        Type::Ptr(Box::new(pointee))
    }

    pub fn proc(callconv: CallConv, params: Vec<Type>, ret: Type) -> Self {
        Type::Proc(ProcType {
            callconv,
            params,
            ret: Box::new(ret),
        })
    }

    pub fn structure(name: Option<&str>, fields: Vec<Type>) -> Self {
        Type::Struct(StructType {
            name: name.map(str::to_string),
            fields,
        })
    }

    pub fn user(name: &str) -> Self {
        Type::User(name.to_string())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Type::User(_))
    }

    /// Get the pointee for pointer types
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn as_proc(&self) -> Option<&ProcType> {
        match self {
            Type::Proc(proc) => Some(proc),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Type::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Get the size of this type in bytes on the 32-bit target
    ///
    /// `User` types have no native layout.
    pub fn size_in_bytes(&self) -> Option<u32> {
        match self {
            Type::Void => Some(0),
            Type::Int { bits, .. } => Some(bits.div_ceil(8)),
            Type::Ptr(_) | Type::Proc(_) => Some(POINTER_SIZE),
            Type::Struct(s) => {
                let mut total = 0;
                for field in &s.fields {
                    total += field.size_in_bytes()?;
                }
                Some(total)
            }
            Type::User(_) => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int { bits, signed: true } => write!(f, "i{}", bits),
            Type::Int { bits, signed: false } => write!(f, "u{}", bits),
            Type::Ptr(inner) => write!(f, "*{}", inner),
            Type::Proc(proc) => {
                write!(f, "proc {}(", proc.callconv)?;
                for (i, param) in proc.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", proc.ret)
            }
            Type::Struct(s) => {
                match &s.name {
                    Some(name) => write!(f, "struct {} {{ ", name)?,
                    None => write!(f, "struct {{ ")?,
                }
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")
            }
            Type::User(name) => write!(f, "user {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_type_sizes() {
        assert_eq!(Type::Void.size_in_bytes(), Some(0));
        assert_eq!(Type::i8().size_in_bytes(), Some(1));
        assert_eq!(Type::i16().size_in_bytes(), Some(2));
        assert_eq!(Type::i32().size_in_bytes(), Some(4));
        assert_eq!(Type::int(1, false).size_in_bytes(), Some(1));
        assert_eq!(Type::ptr(Type::i64()).size_in_bytes(), Some(4));
        assert_eq!(Type::user("Handle").size_in_bytes(), None);

        let pair = Type::structure(Some("pair"), vec![Type::i32(), Type::i16()]);
        assert_eq!(pair.size_in_bytes(), Some(6));
    }

    #[test]
    fn test_struct_equality_ignores_name() {
        let a = Type::structure(Some("point"), vec![Type::i32(), Type::i32()]);
        let b = Type::structure(Some("vec2"), vec![Type::i32(), Type::i32()]);
        let c = Type::structure(None, vec![Type::i32(), Type::i32()]);
        let d = Type::structure(Some("point"), vec![Type::i32(), Type::i16()]);

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, d);
        assert_eq!(Type::ptr(a.clone()), Type::ptr(b));
    }

    #[test]
    fn test_struct_hash_ignores_name() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Type::structure(Some("a"), vec![Type::i8()]));
        assert!(set.contains(&Type::structure(Some("b"), vec![Type::i8()])));
    }

    #[test]
    fn test_field_offsets() {
        let s = StructType {
            name: None,
            fields: vec![Type::i8(), Type::i32(), Type::i16()],
        };
        assert_eq!(s.field_offset(0), Some(0));
        assert_eq!(s.field_offset(1), Some(1));
        assert_eq!(s.field_offset(2), Some(5));
        assert_eq!(s.field_offset(3), None);
    }

    #[test]
    fn test_type_display() {
        assert_eq!(Type::i32().to_string(), "i32");
        assert_eq!(Type::u8().to_string(), "u8");
        assert_eq!(Type::ptr(Type::i32()).to_string(), "*i32");
        assert_eq!(
            Type::proc(CallConv::Cdecl, vec![Type::i32(), Type::ptr(Type::i8())], Type::Void).to_string(),
            "proc cdecl(i32, *i8) -> void"
        );
        assert_eq!(
            Type::structure(Some("point"), vec![Type::i32(), Type::i32()]).to_string(),
            "struct point { i32, i32 }"
        );
        assert_eq!(Type::user("Color").to_string(), "user Color");
    }
}
