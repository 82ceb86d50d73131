//! Emulated address space
//!
//! Every allocation is one cell in an arena. A pointer is the cell's handle
//! plus a byte offset; only offset zero can be read or written. Cells taken
//! by a call are released when it returns; handles are never reused.

use sable_common::{CompilerError, Result};
use sable_ir::{PtrValue, Type, Value};

#[derive(Debug, Clone)]
struct Cell {
    value: Option<Value>,
    released: bool,
}

#[derive(Debug, Default)]
pub struct Memory {
    cells: Vec<Cell>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cells handed out so far
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Reserve an uninitialized cell for a value of type `pointee`
    pub fn alloc(&mut self, pointee: Type) -> PtrValue {
        let handle = self.cells.len() as u32;
        self.cells.push(Cell {
            value: None,
            released: false,
        });
        PtrValue {
            handle,
            offset: 0,
            pointee,
        }
    }

    pub fn store(&mut self, ptr: &PtrValue, value: &Value) -> Result<()> {
        let cell = self.cell_mut(ptr)?;
        cell.value = Some(value.deep_clone());
        Ok(())
    }

    pub fn load(&self, ptr: &PtrValue, ty: &Type) -> Result<Value> {
        let cell = self.cell(ptr)?;
        let value = cell
            .value
            .as_ref()
            .ok_or_else(|| CompilerError::runtime(format!("load from uninitialized {}", Value::Ptr(ptr.clone()))))?;
        if value.ty() != *ty {
            return Err(CompilerError::runtime(format!(
                "load of {} from a cell holding {}",
                ty,
                value.ty()
            )));
        }
        Ok(value.clone())
    }

    /// Release every cell allocated at or after `mark`
    pub fn release_from(&mut self, mark: usize) {
        for cell in self.cells.iter_mut().skip(mark) {
            cell.value = None;
            cell.released = true;
        }
    }

    fn cell(&self, ptr: &PtrValue) -> Result<&Cell> {
        check_offset(ptr)?;
        let cell = self
            .cells
            .get(ptr.handle as usize)
            .ok_or_else(|| CompilerError::invariant(format!("dangling pointer handle #{}", ptr.handle)))?;
        check_live(cell, ptr)?;
        Ok(cell)
    }

    fn cell_mut(&mut self, ptr: &PtrValue) -> Result<&mut Cell> {
        check_offset(ptr)?;
        let cell = self
            .cells
            .get_mut(ptr.handle as usize)
            .ok_or_else(|| CompilerError::invariant(format!("dangling pointer handle #{}", ptr.handle)))?;
        check_live(cell, ptr)?;
        Ok(cell)
    }
}

fn check_live(cell: &Cell, ptr: &PtrValue) -> Result<()> {
    if cell.released {
        return Err(CompilerError::runtime(format!(
            "access to {} after its frame returned",
            Value::Ptr(ptr.clone())
        )));
    }
    Ok(())
}

fn check_offset(ptr: &PtrValue) -> Result<()> {
    if ptr.offset != 0 {
        return Err(CompilerError::unsupported(format!(
            "memory access at non-zero pointer offset {}",
            ptr.offset
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_store_then_load() {
        let mut mem = Memory::new();
        let p = mem.alloc(Type::i32());
        mem.store(&p, &Value::i32(42)).unwrap();
        assert_eq!(mem.load(&p, &Type::i32()).unwrap(), Value::i32(42));
        assert_eq!(mem.len(), 1);
    }

    #[test]
    fn test_uninitialized_load_fails() {
        let mut mem = Memory::new();
        let p = mem.alloc(Type::i32());
        let err = mem.load(&p, &Type::i32()).unwrap_err();
        assert!(matches!(err, CompilerError::Runtime { .. }));
    }

    #[test]
    fn test_load_type_disagreement() {
        let mut mem = Memory::new();
        let p = mem.alloc(Type::i32());
        mem.store(&p, &Value::i8(1)).unwrap();
        assert!(mem.load(&p, &Type::i32()).is_err());
    }

    #[test]
    fn test_released_cells_are_dead() {
        let mut mem = Memory::new();
        let kept = mem.alloc(Type::i32());
        let mark = mem.len();
        let p = mem.alloc(Type::i32());
        mem.store(&p, &Value::i32(1)).unwrap();
        mem.store(&kept, &Value::i32(2)).unwrap();

        mem.release_from(mark);
        assert!(matches!(mem.load(&p, &Type::i32()), Err(CompilerError::Runtime { .. })));
        assert!(mem.store(&p, &Value::i32(3)).is_err());
        assert_eq!(mem.load(&kept, &Type::i32()).unwrap(), Value::i32(2));

        // Handles stay unique after a release
        let q = mem.alloc(Type::i32());
        assert_eq!(q.handle, 2);
    }

    #[test]
    fn test_non_zero_offset_is_unsupported() {
        let mut mem = Memory::new();
        let mut p = mem.alloc(Type::i32());
        p.offset = 4;
        assert!(mem.store(&p, &Value::i32(1)).unwrap_err().is_unsupported());
        assert!(mem.load(&p, &Type::i32()).unwrap_err().is_unsupported());
    }
}
