//! IR Builder
//!
//! Stateful construction API over an `UncheckedAssembly`. The builder keeps a
//! cursor (current proc, current block) and appends instructions at the end
//! of the current block. Shape checks that are cheap happen here; everything
//! else is left to the validator.

use crate::assembly::{
    Assembly, BasicBlock, ConstDef, ExternDef, GlobalDef, Proc, StructDef, UncheckedAssembly, Visibility,
};
use crate::instr::{BinaryOp, BitwiseOp, BlockId, BlockRef, CmpOp, Instr, ProcId, ShiftOp};
use crate::types::{CallConv, Type};
use crate::value::{Register, SymbolRef, Value};
use log::debug;
use sable_common::{CompilerError, Result};

/// Name of the block `define_proc` opens
pub const ENTRY_BLOCK: &str = "begin";

/// Builder cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderState {
    pub current_proc: Option<ProcId>,
    pub current_block: Option<BlockId>,
}

/// IR Builder - helper for constructing IR
#[derive(Debug)]
pub struct Builder {
    assembly: UncheckedAssembly,
    state: BuilderState,
}

impl Builder {
    pub fn new(name: &str) -> Self {
        Self {
            assembly: UncheckedAssembly::new(name),
            state: BuilderState::default(),
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn assembly(&self) -> &UncheckedAssembly {
        &self.assembly
    }

    /// Direct access to the graph, bypassing the builder's checks
    pub fn assembly_mut(&mut self) -> &mut UncheckedAssembly {
        &mut self.assembly
    }

    pub fn finish(self) -> UncheckedAssembly {
        self.assembly
    }

    pub fn check(self) -> Result<Assembly> {
        self.finish().check()
    }

    // ---- symbols ----

    pub fn define_extern(&mut self, name: &str, ty: Type, path: &str) -> Value {
        self.assembly.externs.push(ExternDef {
            name: name.to_string(),
            ty: ty.clone(),
            path: path.to_string(),
        });
        Value::Extern(SymbolRef::new(name, ty))
    }

    /// Define a global; the returned value is a pointer to its storage
    pub fn define_global(&mut self, name: &str, ty: Type, init: Option<Value>) -> Value {
        self.assembly.globals.push(GlobalDef {
            name: name.to_string(),
            ty: ty.clone(),
            init,
        });
        Value::Global(SymbolRef::new(name, Type::ptr(ty)))
    }

    pub fn define_const(&mut self, name: &str, value: Value) -> Value {
        let ty = value.ty();
        self.assembly.consts.push(ConstDef {
            name: name.to_string(),
            value,
        });
        Value::Const(SymbolRef::new(name, ty))
    }

    pub fn define_struct(&mut self, name: &str, fields: Vec<Type>) -> Type {
        let ty = Type::structure(Some(name), fields);
        self.assembly.structs.push(StructDef {
            name: name.to_string(),
            ty: ty.clone(),
        });
        ty
    }

    // ---- procedures ----

    /// Create a proc, make it current and open its entry block
    pub fn define_proc(&mut self, name: &str) -> ProcId {
        let id = ProcId(self.assembly.procs.len() as u32);
        let mut proc = Proc::new(name);
        proc.blocks.push(BasicBlock::new(ENTRY_BLOCK, id));
        self.assembly.procs.push(proc);

        debug!("Defined proc {} as {:?}", name, id);
        self.state = BuilderState {
            current_proc: Some(id),
            current_block: Some(BlockId(0)),
        };
        id
    }

    pub fn set_return_type(&mut self, ty: Type) -> Result<()> {
        self.current_proc_mut()?.ret = ty;
        Ok(())
    }

    pub fn set_callconv(&mut self, callconv: CallConv) -> Result<()> {
        self.current_proc_mut()?.callconv = callconv;
        Ok(())
    }

    pub fn set_visibility(&mut self, visibility: Visibility) -> Result<()> {
        self.current_proc_mut()?.visibility = visibility;
        Ok(())
    }

    /// Reference to a proc, typed with its signature as defined so far
    pub fn proc_value(&self, id: ProcId) -> Result<Value> {
        let proc = self
            .assembly
            .proc(id)
            .ok_or_else(|| CompilerError::build(format!("unknown proc {:?}", id)))?;
        Ok(Value::Proc(SymbolRef::new(&proc.name, proc.ty())))
    }

    /// Append a parameter register
    ///
    /// Parameters must be declared before any other register of the proc.
    pub fn define_parameter(&mut self, ty: Type) -> Result<Value> {
        let proc = self.current_proc_mut()?;
        let reg = Register {
            index: proc.registers.len() as u32,
            ty: ty.clone(),
        };
        proc.registers.push(ty);
        proc.params.push(reg.clone());
        Ok(Value::Register(reg))
    }

    // ---- basic blocks ----

    /// Create a block and make it current
    pub fn define_basic_block(&mut self, name: &str) -> Result<BlockId> {
        let id = self.append_basic_block(name)?;
        self.state.current_block = Some(id);
        Ok(id)
    }

    /// Create a block without moving the cursor
    pub fn append_basic_block(&mut self, name: &str) -> Result<BlockId> {
        let proc_id = self.current_proc_id()?;
        let proc = self.current_proc_mut()?;
        let unique = unique_block_name(proc, name);
        let id = BlockId(proc.blocks.len() as u32);
        proc.blocks.push(BasicBlock::new(&unique, proc_id));
        Ok(id)
    }

    pub fn position_at_end(&mut self, block: BlockId) -> Result<()> {
        let proc = self.current_proc()?;
        if proc.block(block).is_none() {
            return Err(CompilerError::build(format!("no block {} in proc {}", block, proc.name)));
        }
        self.state.current_block = Some(block);
        Ok(())
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.state.current_block
    }

    /// Whether the current block already ends in a branch
    pub fn current_block_terminated(&self) -> bool {
        let (Some(proc), Some(block)) = (self.state.current_proc, self.state.current_block) else {
            return false;
        };
        self.assembly
            .proc(proc)
            .and_then(|p| p.block(block))
            .is_some_and(BasicBlock::has_terminator)
    }

    // ---- terminators ----

    pub fn ret(&mut self, value: Option<Value>) -> Result<()> {
        self.emit(Instr::Ret { value })
    }

    pub fn jmp(&mut self, target: BlockId) -> Result<()> {
        self.emit(Instr::Jmp { target })
    }

    pub fn jmp_if(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) -> Result<()> {
        self.emit(Instr::JmpIf {
            cond,
            then_block,
            else_block,
        })
    }

    // ---- value instructions ----

    pub fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value> {
        let callee_ty = callee.ty();
        let Some(proc_ty) = callee_ty.as_proc() else {
            return Err(CompilerError::build(format!(
                "call target {} has non-procedure type {}",
                callee, callee_ty
            )));
        };
        let result = self.fresh_register(proc_ty.ret.as_ref().clone())?;
        self.emit(Instr::Call {
            result: result.clone(),
            callee,
            args,
        })?;
        Ok(Value::Register(result))
    }

    /// Reserve storage; `ty` is the pointer type of the result
    pub fn alloc(&mut self, ty: Type) -> Result<Value> {
        if !ty.is_ptr() {
            return Err(CompilerError::build(format!("alloc requires a pointer type, got {}", ty)));
        }
        let result = self.fresh_register(ty.clone())?;
        self.emit(Instr::Alloc {
            result: result.clone(),
            ty,
        })?;
        Ok(Value::Register(result))
    }

    pub fn load(&mut self, src: Value) -> Result<Value> {
        let src_ty = src.ty();
        let Some(pointee) = src_ty.pointee() else {
            return Err(CompilerError::build(format!("load from non-pointer {}: {}", src, src_ty)));
        };
        let result = self.fresh_register(pointee.clone())?;
        self.emit(Instr::Load {
            result: result.clone(),
            src,
        })?;
        Ok(Value::Register(result))
    }

    pub fn store(&mut self, target: Value, value: Value) -> Result<()> {
        if !target.ty().is_ptr() {
            return Err(CompilerError::build(format!("store to non-pointer {}", target)));
        }
        self.emit(Instr::Store { target, value })
    }

    /// Compare two values; the result is an `i32` 0 or 1
    pub fn cmp(&mut self, op: CmpOp, left: Value, right: Value) -> Result<Value> {
        let result = self.fresh_register(Type::i32())?;
        self.emit(Instr::Cmp {
            result: result.clone(),
            op,
            left,
            right,
        })?;
        Ok(Value::Register(result))
    }

    pub fn cmp_eq(&mut self, left: Value, right: Value) -> Result<Value> {
        self.cmp(CmpOp::Eq, left, right)
    }

    pub fn cmp_ne(&mut self, left: Value, right: Value) -> Result<Value> {
        self.cmp(CmpOp::Ne, left, right)
    }

    pub fn cmp_gr(&mut self, left: Value, right: Value) -> Result<Value> {
        self.cmp(CmpOp::Gr, left, right)
    }

    pub fn cmp_le(&mut self, left: Value, right: Value) -> Result<Value> {
        self.cmp(CmpOp::Le, left, right)
    }

    pub fn cmp_gr_eq(&mut self, left: Value, right: Value) -> Result<Value> {
        self.cmp(CmpOp::GrEq, left, right)
    }

    pub fn cmp_le_eq(&mut self, left: Value, right: Value) -> Result<Value> {
        self.cmp(CmpOp::LeEq, left, right)
    }

    pub fn cast(&mut self, value: Value, ty: Type) -> Result<Value> {
        let result = self.fresh_register(ty)?;
        self.emit(Instr::Cast {
            result: result.clone(),
            value,
        })?;
        Ok(Value::Register(result))
    }

    /// Address of field `index` of the struct `value` points to
    pub fn element_ptr(&mut self, value: Value, index: u32) -> Result<Value> {
        let ty = value.ty();
        let Some(st) = ty.pointee().and_then(Type::as_struct) else {
            return Err(CompilerError::build(format!(
                "element_ptr requires a pointer to a struct, got {}",
                ty
            )));
        };
        let Some(field) = st.fields.get(index as usize) else {
            return Err(CompilerError::build(format!(
                "field index {} out of range for {} ({} fields)",
                index,
                ty,
                st.fields.len()
            )));
        };
        let result = self.fresh_register(Type::ptr(field.clone()))?;
        self.emit(Instr::ElementPtr {
            result: result.clone(),
            value,
            index,
        })?;
        Ok(Value::Register(result))
    }

    pub fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value> {
        let result = self.fresh_register(left.ty())?;
        self.emit(Instr::Binary {
            result: result.clone(),
            op,
            left,
            right,
        })?;
        Ok(Value::Register(result))
    }

    pub fn add(&mut self, left: Value, right: Value) -> Result<Value> {
        self.binary(BinaryOp::Add, left, right)
    }

    pub fn sub(&mut self, left: Value, right: Value) -> Result<Value> {
        self.binary(BinaryOp::Sub, left, right)
    }

    pub fn mul(&mut self, left: Value, right: Value) -> Result<Value> {
        self.binary(BinaryOp::Mul, left, right)
    }

    pub fn div(&mut self, left: Value, right: Value) -> Result<Value> {
        self.binary(BinaryOp::Div, left, right)
    }

    pub fn modulo(&mut self, left: Value, right: Value) -> Result<Value> {
        self.binary(BinaryOp::Mod, left, right)
    }

    pub fn bitwise(&mut self, op: BitwiseOp, left: Value, right: Value) -> Result<Value> {
        let result = self.fresh_register(left.ty())?;
        self.emit(Instr::Bitwise {
            result: result.clone(),
            op,
            left,
            right,
        })?;
        Ok(Value::Register(result))
    }

    pub fn bit_and(&mut self, left: Value, right: Value) -> Result<Value> {
        self.bitwise(BitwiseOp::And, left, right)
    }

    pub fn bit_or(&mut self, left: Value, right: Value) -> Result<Value> {
        self.bitwise(BitwiseOp::Or, left, right)
    }

    pub fn bit_xor(&mut self, left: Value, right: Value) -> Result<Value> {
        self.bitwise(BitwiseOp::Xor, left, right)
    }

    pub fn shift(&mut self, op: ShiftOp, value: Value, amount: Value) -> Result<Value> {
        let result = self.fresh_register(value.ty())?;
        self.emit(Instr::Shift {
            result: result.clone(),
            op,
            value,
            amount,
        })?;
        Ok(Value::Register(result))
    }

    pub fn shl(&mut self, value: Value, amount: Value) -> Result<Value> {
        self.shift(ShiftOp::Shl, value, amount)
    }

    pub fn shr(&mut self, value: Value, amount: Value) -> Result<Value> {
        self.shift(ShiftOp::Shr, value, amount)
    }

    // ---- internals ----

    /// Append an instruction at the cursor
    pub fn emit(&mut self, instr: Instr) -> Result<()> {
        let at = self.cursor()?;
        if self.assembly.push_instr(at, instr) {
            Ok(())
        } else {
            Err(CompilerError::build(format!("cursor points at missing block {}", at.block)))
        }
    }

    fn cursor(&self) -> Result<BlockRef> {
        match (self.state.current_proc, self.state.current_block) {
            (Some(proc), Some(block)) => Ok(BlockRef { proc, block }),
            _ => Err(CompilerError::build("no current basic block")),
        }
    }

    fn fresh_register(&mut self, ty: Type) -> Result<Register> {
        let proc = self.current_proc_mut()?;
        let index = proc.registers.len() as u32;
        proc.registers.push(ty.clone());
        Ok(Register { index, ty })
    }

    fn current_proc_id(&self) -> Result<ProcId> {
        self.state
            .current_proc
            .ok_or_else(|| CompilerError::build("no current proc"))
    }

    fn current_proc(&self) -> Result<&Proc> {
        let id = self.current_proc_id()?;
        self.assembly
            .proc(id)
            .ok_or_else(|| CompilerError::build(format!("current proc {:?} does not exist", id)))
    }

    fn current_proc_mut(&mut self) -> Result<&mut Proc> {
        let id = self.current_proc_id()?;
        self.assembly
            .proc_mut(id)
            .ok_or_else(|| CompilerError::build(format!("current proc {:?} does not exist", id)))
    }
}

/// `name`, or `name.N` for the first N that is not taken yet
fn unique_block_name(proc: &Proc, name: &str) -> String {
    if proc.block_by_name(name).is_none() {
        return name.to_string();
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}.{}", name, n);
        if proc.block_by_name(&candidate).is_none() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_define_proc_opens_begin() {
        let mut b = Builder::new("unit");
        let id = b.define_proc("main");
        assert_eq!(id, ProcId(0));
        assert_eq!(
            b.state(),
            BuilderState {
                current_proc: Some(ProcId(0)),
                current_block: Some(BlockId(0)),
            }
        );
        assert_eq!(b.assembly().procs[0].blocks[0].name, "begin");
    }

    #[test]
    fn test_registers_are_sequential() {
        let mut b = Builder::new("unit");
        b.define_proc("add3");
        b.set_return_type(Type::i32()).unwrap();
        let x = b.define_parameter(Type::i32()).unwrap();
        let y = b.define_parameter(Type::i32()).unwrap();
        let sum = b.add(x.clone(), y).unwrap();
        let sum = b.add(sum, Value::i32(3)).unwrap();
        b.ret(Some(sum.clone())).unwrap();

        assert_eq!(x.as_register().unwrap().index, 0);
        assert_eq!(sum.as_register().unwrap().index, 3);
        let proc = &b.assembly().procs[0];
        assert_eq!(proc.params.len(), 2);
        assert_eq!(proc.register_count(), 4);
        assert!(b.current_block_terminated());
    }

    #[test]
    fn test_block_names_are_unique() {
        let mut b = Builder::new("unit");
        b.define_proc("main");
        let first = b.append_basic_block("then").unwrap();
        let second = b.append_basic_block("then").unwrap();
        let third = b.define_basic_block("then").unwrap();

        let proc = &b.assembly().procs[0];
        assert_eq!(proc.block(first).unwrap().name, "then");
        assert_eq!(proc.block(second).unwrap().name, "then.1");
        assert_eq!(proc.block(third).unwrap().name, "then.2");
        assert_eq!(b.current_block(), Some(third));
    }

    #[test]
    fn test_call_rejects_non_procedure() {
        let mut b = Builder::new("unit");
        b.define_proc("main");
        let err = b.call(Value::i32(1), vec![]).unwrap_err();
        assert!(matches!(err, CompilerError::Build { .. }));
    }

    #[test]
    fn test_call_result_has_return_type() {
        let mut b = Builder::new("unit");
        let id = b.define_proc("seven");
        b.set_return_type(Type::i8()).unwrap();
        b.ret(Some(Value::i8(7))).unwrap();
        let callee = b.proc_value(id).unwrap();

        b.define_proc("main");
        let r = b.call(callee, vec![]).unwrap();
        assert_eq!(r.ty(), Type::i8());
    }

    #[test]
    fn test_pointer_checks() {
        let mut b = Builder::new("unit");
        b.define_proc("main");
        assert!(b.alloc(Type::i32()).is_err());
        assert!(b.load(Value::i32(0)).is_err());
        assert!(b.store(Value::i32(0), Value::i32(1)).is_err());

        let slot = b.alloc(Type::ptr(Type::i16())).unwrap();
        let loaded = b.load(slot).unwrap();
        assert_eq!(loaded.ty(), Type::i16());
    }

    #[test]
    fn test_element_ptr_bounds() {
        let mut b = Builder::new("unit");
        let pair = b.define_struct("pair", vec![Type::i32(), Type::i8()]);
        b.define_proc("main");
        let p = b.alloc(Type::ptr(pair)).unwrap();

        assert_eq!(b.element_ptr(p.clone(), 1).unwrap().ty(), Type::ptr(Type::i8()));
        assert!(b.element_ptr(p, 2).is_err());
    }

    #[test]
    fn test_cmp_yields_i32() {
        let mut b = Builder::new("unit");
        b.define_proc("main");
        let c = b.cmp_gr(Value::int(8, false, 1), Value::int(8, false, 2)).unwrap();
        assert_eq!(c.ty(), Type::i32());
    }

    #[test]
    fn test_symbol_values() {
        let mut b = Builder::new("unit");
        let g = b.define_global("counter", Type::i32(), Some(Value::i32(0)));
        let c = b.define_const("limit", Value::i32(10));
        let e = b.define_extern("errno", Type::i32(), "libc.so.6");

        assert_eq!(g.ty(), Type::ptr(Type::i32()));
        assert_eq!(c.ty(), Type::i32());
        assert_eq!(e.ty(), Type::i32());
        assert_eq!(b.assembly().symbol_names(), vec!["errno", "counter", "limit"]);
    }

    #[test]
    fn test_emit_without_proc_fails() {
        let mut b = Builder::new("unit");
        assert!(b.ret(None).is_err());
        assert!(b.define_parameter(Type::i32()).is_err());
    }
}
