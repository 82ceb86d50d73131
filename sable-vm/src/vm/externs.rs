//! Native data imported through `extern` symbols
//!
//! The host binds each extern name to an address before execution. Reads go
//! straight to that memory, so binding an address is `unsafe`.

use sable_common::{CompilerError, Result};
use sable_ir::{ExternDef, Type, Value};
use std::collections::HashMap;

/// Address of a native symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSymbol {
    address: *const u8,
}

// Only ever read through, never written
unsafe impl Send for NativeSymbol {}
unsafe impl Sync for NativeSymbol {}

impl NativeSymbol {
    /// # Safety
    ///
    /// `address` must stay valid for reads of the extern's type for as long as
    /// any virtual machine uses this symbol.
    pub unsafe fn from_address(address: *const u8) -> Self {
        Self { address }
    }

    /// Bind to a host static
    pub fn from_static<T>(value: &'static T) -> Self {
        Self {
            address: (value as *const T).cast(),
        }
    }

    pub fn address(&self) -> *const u8 {
        self.address
    }

    /// Decode the native bytes as a value of type `ty`
    pub fn read(&self, ty: &Type) -> Result<Value> {
        match ty {
            Type::Int { bits: 32, signed: true } => {
                // SAFETY: guaranteed by the constructors
                let raw = unsafe { std::ptr::read_unaligned(self.address.cast::<i32>()) };
                Ok(Value::i32(raw))
            }
            other => Err(CompilerError::unsupported(format!("reading extern data of type {}", other))),
        }
    }
}

/// Resolves extern definitions to native addresses
pub trait ExternResolver {
    fn resolve(&self, def: &ExternDef) -> Option<NativeSymbol>;
}

/// Name-keyed resolver
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, NativeSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, symbol: NativeSymbol) {
        self.symbols.insert(name.to_string(), symbol);
    }

    pub fn with(mut self, name: &str, symbol: NativeSymbol) -> Self {
        self.bind(name, symbol);
        self
    }
}

impl ExternResolver for SymbolTable {
    fn resolve(&self, def: &ExternDef) -> Option<NativeSymbol> {
        self.symbols.get(&def.name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    static ANSWER: i32 = -42;
    static WIDE: i64 = 7;

    #[test]
    fn test_read_i32() {
        let sym = NativeSymbol::from_static(&ANSWER);
        assert_eq!(sym.read(&Type::i32()).unwrap(), Value::i32(-42));
    }

    #[test]
    fn test_other_encodings_unsupported() {
        let sym = NativeSymbol::from_static(&WIDE);
        assert!(sym.read(&Type::i64()).unwrap_err().is_unsupported());
        assert!(sym.read(&Type::u32()).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_symbol_table_lookup() {
        let table = SymbolTable::new().with("answer", NativeSymbol::from_static(&ANSWER));
        let def = ExternDef {
            name: "answer".to_string(),
            ty: Type::i32(),
            path: "host".to_string(),
        };
        assert!(table.resolve(&def).is_some());

        let missing = ExternDef {
            name: "other".to_string(),
            ..def
        };
        assert!(table.resolve(&missing).is_none());
    }
}
