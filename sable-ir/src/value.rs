//! IR values
//!
//! A `Value` is either an immediate datum (integer, opaque user payload), a
//! symbolic reference (register, constant, global, extern, procedure) or a
//! run-time pointer handle that only the virtual machine produces.

use crate::types::Type;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Opaque host-defined payload carried by `Value::User`
///
/// Implemented for every `'static + Debug + PartialEq + Hash + Clone + Send + Sync`
/// type, so hosts never implement it by hand. Equality and hashing go through
/// the host type's own impls.
pub trait UserData: Any + fmt::Debug + Send + Sync {
    fn dyn_eq(&self, other: &dyn UserData) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn clone_data(&self) -> Arc<dyn UserData>;
    fn as_any(&self) -> &dyn Any;
}

impl<T> UserData for T
where
    T: Any + fmt::Debug + PartialEq + Hash + Clone + Send + Sync,
{
    fn dyn_eq(&self, other: &dyn UserData) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }

    fn clone_data(&self) -> Arc<dyn UserData> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A user payload tagged with the name of its `Type::User`
#[derive(Clone)]
pub struct UserValue {
    type_name: String,
    data: Arc<dyn UserData>,
}

impl UserValue {
    pub fn new<T: UserData>(type_name: &str, data: T) -> Self {
        Self {
            type_name: type_name.to_string(),
            data: Arc::new(data),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn data(&self) -> &dyn UserData {
        self.data.as_ref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.as_any().downcast_ref::<T>()
    }

    /// Copy the payload instead of sharing it
    pub fn deep_clone(&self) -> Self {
        Self {
            type_name: self.type_name.clone(),
            data: self.data.clone_data(),
        }
    }
}

impl PartialEq for UserValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.data.dyn_eq(other.data.as_ref())
    }
}

impl Eq for UserValue {}

impl Hash for UserValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        self.data.dyn_hash(state);
    }
}

impl fmt::Debug for UserValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User({}: {:?})", self.type_name, self.data)
    }
}

/// Integer immediate, always normalized to its width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntValue {
    pub bits: u32,
    pub signed: bool,
    pub value: i64,
}

impl IntValue {
    pub fn new(bits: u32, signed: bool, value: i64) -> Self {
        Self {
            bits,
            signed,
            value: normalize(bits, signed, value),
        }
    }

    pub fn ty(&self) -> Type {
        Type::Int {
            bits: self.bits,
            signed: self.signed,
        }
    }

    /// Same width and signedness, new payload
    pub fn with_value(&self, value: i64) -> Self {
        Self::new(self.bits, self.signed, value)
    }

    /// The raw bit pattern, zero-extended
    pub fn as_u64(&self) -> u64 {
        if self.bits >= 64 {
            self.value as u64
        } else {
            (self.value as u64) & ((1u64 << self.bits) - 1)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }
}

/// Wrap `value` into a `bits`-wide integer (sign- or zero-extended back to i64)
pub fn normalize(bits: u32, signed: bool, value: i64) -> i64 {
    if bits == 0 {
        return 0;
    }
    if bits >= 64 {
        return value;
    }
    let shift = 64 - bits;
    if signed {
        (value << shift) >> shift
    } else {
        (((value as u64) << shift) >> shift) as i64
    }
}

/// Symbolic storage slot, scoped to one procedure
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    pub index: u32,
    pub ty: Type,
}

/// Reference to a named assembly-level symbol with its recorded type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    pub name: String,
    pub ty: Type,
}

impl SymbolRef {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// VM address: a memory arena handle plus a byte offset into the cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PtrValue {
    pub handle: u32,
    pub offset: u32,
    pub pointee: Type,
}

/// IR Value - represents operands in IR instructions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(IntValue),
    User(UserValue),
    Register(Register),
    Const(SymbolRef),
    Global(SymbolRef),
    Extern(SymbolRef),
    Proc(SymbolRef),

    /// Only ever produced by the virtual machine
    Ptr(PtrValue),
}

impl Value {
    pub fn int(bits: u32, signed: bool, value: i64) -> Self {
        Value::Int(IntValue::new(bits, signed, value))
    }

    pub fn i8(value: i8) -> Self {
        Value::int(8, true, value as i64)
    }

    pub fn i32(value: i32) -> Self {
        Value::int(32, true, value as i64)
    }

    pub fn i64(value: i64) -> Self {
        Value::int(64, true, value)
    }

    pub fn u32(value: u32) -> Self {
        Value::int(32, false, value as i64)
    }

    pub fn user<T: UserData>(type_name: &str, data: T) -> Self {
        Value::User(UserValue::new(type_name, data))
    }

    /// The static type recorded on this value
    pub fn ty(&self) -> Type {
        match self {
            Value::Int(int) => int.ty(),
            Value::User(user) => Type::User(user.type_name.clone()),
            Value::Register(reg) => reg.ty.clone(),
            Value::Const(sym) | Value::Global(sym) | Value::Extern(sym) | Value::Proc(sym) => sym.ty.clone(),
            Value::Ptr(ptr) => Type::Ptr(Box::new(ptr.pointee.clone())),
        }
    }

    pub fn as_int(&self) -> Option<&IntValue> {
        match self {
            Value::Int(int) => Some(int),
            _ => None,
        }
    }

    pub fn as_register(&self) -> Option<&Register> {
        match self {
            Value::Register(reg) => Some(reg),
            _ => None,
        }
    }

    /// Named symbol this value refers to, if any
    pub fn symbol(&self) -> Option<&SymbolRef> {
        match self {
            Value::Const(sym) | Value::Global(sym) | Value::Extern(sym) | Value::Proc(sym) => Some(sym),
            _ => None,
        }
    }

    /// Resolvable without a run-time frame
    pub fn is_constant(&self) -> bool {
        !matches!(self, Value::Register(_) | Value::Ptr(_))
    }

    /// Deep copy for payloads, identity for symbols
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::User(user) => Value::User(user.deep_clone()),
            other => other.clone(),
        }
    }
}

impl From<IntValue> for Value {
    fn from(int: IntValue) -> Self {
        Value::Int(int)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(int) => write!(f, "{} {}", int.ty(), int.value),
            Value::User(user) => write!(f, "user {}({:?})", user.type_name, user.data),
            Value::Register(reg) => write!(f, "%{}", reg.index),
            Value::Const(sym) => write!(f, "${}", sym.name),
            Value::Global(sym) | Value::Extern(sym) | Value::Proc(sym) => write!(f, "@{}", sym.name),
            Value::Ptr(ptr) => write!(f, "ptr(#{}+{})", ptr.handle, ptr.offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Hash)]
    struct Color {
        r: u8,
        g: u8,
        b: u8,
    }

    #[test]
    fn test_int_normalization() {
        assert_eq!(Value::int(8, true, 200).as_int().unwrap().value, -56);
        assert_eq!(Value::int(8, false, -1).as_int().unwrap().value, 255);
        assert_eq!(Value::int(32, true, 1 << 31).as_int().unwrap().value, i32::MIN as i64);
        assert_eq!(Value::i64(i64::MAX).as_int().unwrap().value, i64::MAX);
        assert_eq!(IntValue::new(16, false, -1).as_u64(), 0xFFFF);
    }

    #[test]
    fn test_value_types() {
        assert_eq!(Value::i32(263).ty(), Type::i32());
        assert_eq!(Value::u32(7).ty(), Type::u32());
        assert_eq!(Value::user("Color", Color { r: 1, g: 2, b: 3 }).ty(), Type::user("Color"));
        let reg = Value::Register(Register { index: 3, ty: Type::i8() });
        assert_eq!(reg.ty(), Type::i8());
        let global = Value::Global(SymbolRef::new("counter", Type::ptr(Type::i32())));
        assert_eq!(global.ty(), Type::ptr(Type::i32()));
    }

    #[test]
    fn test_user_equality_delegates_to_host() {
        let a = Value::user("Color", Color { r: 1, g: 2, b: 3 });
        let b = Value::user("Color", Color { r: 1, g: 2, b: 3 });
        let c = Value::user("Color", Color { r: 9, g: 2, b: 3 });
        let d = Value::user("Other", Color { r: 1, g: 2, b: 3 });

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, Value::user("Color", 42u32));
    }

    #[test]
    fn test_user_hash_matches_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Value::user("Color", Color { r: 1, g: 2, b: 3 }));
        assert!(set.contains(&Value::user("Color", Color { r: 1, g: 2, b: 3 })));
        assert!(!set.contains(&Value::user("Color", Color { r: 0, g: 0, b: 0 })));
    }

    #[test]
    fn test_deep_clone() {
        let original = Value::user("Color", Color { r: 1, g: 2, b: 3 });
        let copy = original.deep_clone();
        assert_eq!(original, copy);

        let (Value::User(a), Value::User(b)) = (&original, &copy) else {
            panic!("expected user values");
        };
        assert!(!std::ptr::addr_eq(a.data() as *const dyn UserData, b.data() as *const dyn UserData));
        assert_eq!(b.downcast_ref::<Color>(), Some(&Color { r: 1, g: 2, b: 3 }));

        let sym = Value::Proc(SymbolRef::new("main", Type::i32()));
        assert_eq!(sym.deep_clone(), sym);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::i32(-4).to_string(), "i32 -4");
        assert_eq!(Value::Register(Register { index: 2, ty: Type::i32() }).to_string(), "%2");
        assert_eq!(Value::Const(SymbolRef::new("limit", Type::i32())).to_string(), "$limit");
        assert_eq!(Value::Proc(SymbolRef::new("fact", Type::Void)).to_string(), "@fact");
    }
}
