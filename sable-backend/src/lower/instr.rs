//! Per-instruction lowering
//!
//! Operands are materialized in `eax` (and a second scratch register where
//! needed), the operation runs on 32-bit registers, and the result is
//! written back to the result register's stack slot at its own width.

use super::{is_signed, value_width, ProcLowering};
use log::trace;
use sable_codegen::regs::{CL, EAX, EBP, ECX, EDX, ESP};
use sable_codegen::{Memory, Opcode, Operand, Register as MachineReg, Width, X86Instr};
use sable_common::{CompilerError, Result};
use sable_ir::{BinaryOp, BitwiseOp, CallConv, Instr, Register, ShiftOp, Type, Value, POINTER_SIZE};

impl ProcLowering<'_> {
    pub(super) fn lower_instr(&mut self, instr: &Instr) -> Result<()> {
        trace!("lower: {}", instr);
        match instr {
            Instr::Ret { value } => self.lower_ret(value.as_ref()),
            Instr::Call { result, callee, args } => self.lower_call(result, callee, args),
            Instr::Jmp { target } => {
                let label = self.label_of(*target)?;
                self.emit(X86Instr::jump(Opcode::Jmp, &label));
                Ok(())
            }
            Instr::JmpIf { cond, then_block, else_block } => {
                let (then_label, else_label) = (self.label_of(*then_block)?, self.label_of(*else_block)?);
                let acc = self.pool.allocate_register(EAX)?;
                self.load_value(cond, acc)?;
                self.emit(X86Instr::op2(Opcode::Test, acc, acc));
                self.emit(X86Instr::jump(Opcode::Jne, &then_label));
                self.emit(X86Instr::jump(Opcode::Jmp, &else_label));
                self.pool.free(acc)
            }
            Instr::Alloc { result, ty } => self.lower_alloc(result, ty),
            Instr::Load { result, src } => self.lower_load(result, src),
            Instr::Store { target, value } => self.lower_store(target, value),
            Instr::Cmp { result, op, left, right } => self.lower_cmp(result, *op, left, right),
            Instr::Cast { result, value } => self.lower_cast(result, value),
            Instr::ElementPtr { result, value, index } => self.lower_element_ptr(result, value, *index),
            Instr::Binary { result, op, left, right } => self.lower_binary(result, *op, left, right),
            Instr::Bitwise { result, op, left, right } => {
                let opcode = match op {
                    BitwiseOp::And => Opcode::And,
                    BitwiseOp::Or => Opcode::Or,
                    BitwiseOp::Xor => Opcode::Xor,
                };
                let (acc, rhs) = self.load_pair(left, right)?;
                self.emit(X86Instr::op2(opcode, acc, rhs));
                self.finish_pair(result, acc, rhs)
            }
            Instr::Shift { result, op, value, amount } => self.lower_shift(result, *op, value, amount),
        }
    }

    fn lower_ret(&mut self, value: Option<&Value>) -> Result<()> {
        if let Some(value) = value {
            let acc = self.pool.allocate_register(EAX)?;
            self.load_value(value, acc)?;
            self.pool.free(acc)?;
        }
        self.emit(X86Instr::op2(Opcode::Mov, ESP, EBP));
        self.emit(X86Instr::op1(Opcode::Pop, EBP));
        self.emit(X86Instr::op0(Opcode::Ret));
        Ok(())
    }

    fn lower_call(&mut self, result: &Register, callee: &Value, args: &[Value]) -> Result<()> {
        let signature = callee
            .ty()
            .as_proc()
            .cloned()
            .ok_or_else(|| CompilerError::invariant(format!("call through non-procedure {}", callee)))?;
        if signature.callconv != CallConv::Cdecl {
            return Err(CompilerError::unsupported(format!(
                "calls using the {} convention",
                signature.callconv
            )));
        }

        let acc = self.pool.allocate_register(EAX)?;
        // cdecl: right to left, caller cleans up
        for arg in args.iter().rev() {
            self.load_value(arg, acc)?;
            self.emit(X86Instr::op1(Opcode::Push, acc));
        }

        match callee {
            Value::Proc(sym) | Value::Extern(sym) => {
                self.emit(X86Instr::new(Opcode::Call, vec![Operand::Label(sym.name.clone())]));
            }
            other => {
                self.load_value(other, acc)?;
                self.emit(X86Instr::op1(Opcode::Call, acc));
            }
        }

        if !args.is_empty() {
            self.emit(X86Instr::op2(Opcode::Add, ESP, (args.len() as u32 * POINTER_SIZE) as i64));
        }
        if !result.ty.is_void() {
            self.store_result(result.index, &result.ty, acc)?;
        }
        self.pool.free(acc)
    }

    fn lower_alloc(&mut self, result: &Register, ty: &Type) -> Result<()> {
        let pointee = ty
            .pointee()
            .ok_or_else(|| CompilerError::invariant(format!("alloc of non-pointer {}", ty)))?;
        let size = pointee
            .size_in_bytes()
            .ok_or_else(|| CompilerError::unsupported(format!("stack storage for {}", pointee)))?;

        self.emit(X86Instr::op2(Opcode::Sub, ESP, size.max(1).next_multiple_of(4) as i64));
        let slot = self.slot(result.index, Width::Dword)?;
        self.emit(X86Instr::op2(Opcode::Mov, slot, ESP));
        Ok(())
    }

    fn lower_load(&mut self, result: &Register, src: &Value) -> Result<()> {
        let width = value_width(&result.ty)?;
        let acc = self.pool.allocate_register(EAX)?;
        let addr = self.pool.allocate(Width::Dword)?;

        self.load_value(src, addr)?;
        self.load_sized(acc, Memory::base(addr).sized(width), width, is_signed(&result.ty));
        self.store_result(result.index, &result.ty, acc)?;

        self.pool.free(addr)?;
        self.pool.free(acc)
    }

    fn lower_store(&mut self, target: &Value, value: &Value) -> Result<()> {
        let width = value_width(&value.ty())?;
        let acc = self.pool.allocate_register(EAX)?;
        let addr = self.pool.allocate(Width::Dword)?;

        self.load_value(target, addr)?;
        self.load_value(value, acc)?;
        self.store_sized(Memory::base(addr), acc, width)?;

        self.pool.free(addr)?;
        self.pool.free(acc)
    }

    fn lower_cast(&mut self, result: &Register, value: &Value) -> Result<()> {
        let from = value.ty();
        let reinterpretable = from == result.ty || (from.is_ptr() && result.ty.is_ptr());
        if !reinterpretable {
            return Err(CompilerError::unsupported(format!("cast from {} to {}", from, result.ty)));
        }
        let acc = self.pool.allocate_register(EAX)?;
        self.load_value(value, acc)?;
        self.store_result(result.index, &result.ty, acc)?;
        self.pool.free(acc)
    }

    fn lower_element_ptr(&mut self, result: &Register, value: &Value, index: u32) -> Result<()> {
        let ty = value.ty();
        let st = ty
            .pointee()
            .and_then(Type::as_struct)
            .ok_or_else(|| CompilerError::invariant(format!("element_ptr on {}", ty)))?;
        let offset = st
            .field_offset(index as usize)
            .ok_or_else(|| CompilerError::unsupported(format!("field {} of {}", index, ty)))?;

        let acc = self.pool.allocate_register(EAX)?;
        self.load_value(value, acc)?;
        if offset > 0 {
            self.emit(X86Instr::op2(Opcode::Add, acc, offset as i64));
        }
        self.store_result(result.index, &result.ty, acc)?;
        self.pool.free(acc)
    }

    fn lower_binary(&mut self, result: &Register, op: BinaryOp, left: &Value, right: &Value) -> Result<()> {
        let (acc, rhs) = self.load_pair(left, right)?;

        // Pointer offsets count in elements
        if let Some(pointee) = left.ty().pointee() {
            let size = pointee
                .size_in_bytes()
                .ok_or_else(|| CompilerError::unsupported(format!("pointer arithmetic on {}", pointee)))?;
            if size != 1 {
                self.emit(X86Instr::new(
                    Opcode::Imul,
                    vec![rhs.into(), rhs.into(), Operand::Imm(size as i64)],
                ));
            }
        }

        match op {
            BinaryOp::Add => self.emit(X86Instr::op2(Opcode::Add, acc, rhs)),
            BinaryOp::Sub => self.emit(X86Instr::op2(Opcode::Sub, acc, rhs)),
            BinaryOp::Mul => self.emit(X86Instr::op2(Opcode::Imul, acc, rhs)),
            BinaryOp::Div | BinaryOp::Mod => {
                let high = self.pool.allocate_register(EDX)?;
                if is_signed(&left.ty()) {
                    self.emit(X86Instr::op0(Opcode::Cdq));
                    self.emit(X86Instr::op1(Opcode::Idiv, rhs));
                } else {
                    self.emit(X86Instr::op2(Opcode::Xor, high, high));
                    self.emit(X86Instr::op1(Opcode::Div, rhs));
                }
                if op == BinaryOp::Mod {
                    self.emit(X86Instr::op2(Opcode::Mov, acc, high));
                }
                self.pool.free(high)?;
            }
        }
        self.finish_pair(result, acc, rhs)
    }

    fn lower_shift(&mut self, result: &Register, op: ShiftOp, value: &Value, amount: &Value) -> Result<()> {
        let acc = self.pool.allocate_register(EAX)?;
        let count = self.pool.allocate_register(ECX)?;
        self.load_value(value, acc)?;
        self.load_value(amount, count)?;

        let opcode = match op {
            ShiftOp::Shl => Opcode::Shl,
            ShiftOp::Shr if is_signed(&value.ty()) => Opcode::Sar,
            ShiftOp::Shr => Opcode::Shr,
        };
        self.emit(X86Instr::op2(opcode, acc, CL));
        self.finish_pair(result, acc, count)
    }

    /// Left operand in `eax`, right operand in a pool register
    pub(super) fn load_pair(&mut self, left: &Value, right: &Value) -> Result<(MachineReg, MachineReg)> {
        let acc = self.pool.allocate_register(EAX)?;
        let rhs = self.pool.allocate(Width::Dword)?;
        self.load_value(left, acc)?;
        self.load_value(right, rhs)?;
        Ok((acc, rhs))
    }

    /// Store `eax` into the result slot and release both scratch registers
    fn finish_pair(&mut self, result: &Register, acc: MachineReg, rhs: MachineReg) -> Result<()> {
        self.store_result(result.index, &result.ty, acc)?;
        self.pool.free(rhs)?;
        self.pool.free(acc)
    }
}
