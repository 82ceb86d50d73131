use super::{VMState, VirtualMachine};
use log::debug;
use sable_common::{CompilerError, Result};
use sable_ir::{
    BinaryOp, BitwiseOp, CmpOp, Instr, IntValue, PtrValue, Register, ShiftOp, Type, UserValue, Value,
};

impl<'a> VirtualMachine<'a> {
    pub(super) fn execute_cycle(&mut self) -> Result<()> {
        let slot = self
            .program
            .fetch(self.ip)
            .ok_or_else(|| CompilerError::invariant(format!("instruction pointer {} out of bounds", self.ip)))?;
        if self.options.trace {
            debug!("{:>6}  {}", self.ip, slot.instr);
        }

        let next = self.ip + 1;
        match slot.instr {
            Instr::Ret { value } => {
                let value = value.as_ref().map(|v| self.eval(v)).transpose()?;
                return self.ret(value);
            }
            Instr::Call { callee, args, .. } => {
                let callee = self.eval(callee)?;
                let args = args.iter().map(|a| self.eval(a)).collect::<Result<Vec<_>>>()?;
                return self.call(callee, args, next);
            }
            Instr::Jmp { target } => {
                self.ip = self.block_addr(slot.proc, *target)?;
                return Ok(());
            }
            Instr::JmpIf { cond, then_block, else_block } => {
                let cond = self.eval_int(cond)?;
                let target = if cond.is_zero() { *else_block } else { *then_block };
                self.ip = self.block_addr(slot.proc, target)?;
                return Ok(());
            }
            Instr::Alloc { result, ty } => {
                let pointee = ty
                    .pointee()
                    .ok_or_else(|| CompilerError::invariant(format!("alloc of non-pointer {}", ty)))?;
                let ptr = self.memory.alloc(pointee.clone());
                self.write(result, Value::Ptr(ptr))?;
            }
            Instr::Load { result, src } => {
                let ptr = self.eval_ptr(src)?;
                let value = self.memory.load(&ptr, &result.ty)?;
                self.write(result, value)?;
            }
            Instr::Store { target, value } => {
                let ptr = self.eval_ptr(target)?;
                let value = self.eval(value)?;
                self.memory.store(&ptr, &value)?;
            }
            Instr::Cmp { result, op, left, right } => {
                let (left, right) = (self.eval(left)?, self.eval(right)?);
                let holds = compare(*op, &left, &right)?;
                self.write(result, Value::i32(holds as i32))?;
            }
            Instr::Cast { result, value } => {
                let value = self.eval(value)?;
                self.write(result, cast(value, &result.ty)?)?;
            }
            Instr::ElementPtr { result, value, index } => {
                let ptr = self.eval_ptr(value)?;
                self.write(result, element_ptr(ptr, *index)?)?;
            }
            Instr::Binary { result, op, left, right } => {
                let (left, right) = (self.eval(left)?, self.eval(right)?);
                self.write(result, binary(*op, left, right)?)?;
            }
            Instr::Bitwise { result, op, left, right } => {
                let (left, right) = (self.eval_int(left)?, self.eval_int(right)?);
                let raw = match op {
                    BitwiseOp::And => left.value & right.value,
                    BitwiseOp::Or => left.value | right.value,
                    BitwiseOp::Xor => left.value ^ right.value,
                };
                self.write(result, Value::Int(left.with_value(raw)))?;
            }
            Instr::Shift { result, op, value, amount } => {
                let (value, amount) = (self.eval_int(value)?, self.eval_int(amount)?);
                self.write(result, Value::Int(shift(*op, value, amount)))?;
            }
        }

        self.ip = next;
        Ok(())
    }

    fn call(&mut self, callee: Value, args: Vec<Value>, return_addr: usize) -> Result<()> {
        match callee {
            Value::Proc(sym) => {
                let proc = self
                    .assembly
                    .proc_by_name(&sym.name)
                    .ok_or_else(|| CompilerError::invariant(format!("call to undefined proc {}", sym.name)))?;
                self.enter(proc, args, Some(return_addr))
            }
            Value::Extern(sym) => Err(CompilerError::unsupported(format!(
                "calling extern procedure {}",
                sym.name
            ))),
            other => Err(CompilerError::invariant(format!("call through non-procedure {}", other))),
        }
    }

    fn ret(&mut self, value: Option<Value>) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| CompilerError::invariant("return with an empty call stack"))?;
        self.memory.release_from(frame.alloc_mark);

        let Some(resume) = frame.return_addr else {
            debug!("Entry procedure returned after {} cycles", self.cycles);
            self.result = value;
            self.state = VMState::Halted;
            return Ok(());
        };

        // The call we are returning from sits right before the resume address
        let call_site = resume
            .checked_sub(1)
            .and_then(|addr| self.program.fetch(addr))
            .ok_or_else(|| CompilerError::invariant(format!("no call site before {}", resume)))?;
        let Instr::Call { result, .. } = call_site.instr else {
            return Err(CompilerError::invariant(format!(
                "resume address {} does not follow a call",
                resume
            )));
        };

        match value {
            Some(value) => self.write(result, value)?,
            None => debug!("Void call returned to {}", resume),
        }
        self.ip = resume;
        Ok(())
    }

    fn block_addr(&self, proc: sable_ir::ProcId, block: sable_ir::BlockId) -> Result<usize> {
        self.program
            .block_addr(proc, block)
            .ok_or_else(|| CompilerError::invariant(format!("jump to missing block {}", block)))
    }

    fn write(&mut self, reg: &Register, value: Value) -> Result<()> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| CompilerError::invariant("register write with no frame"))?;
        let slot = frame
            .registers
            .get_mut(reg.index as usize)
            .ok_or_else(|| CompilerError::invariant(format!("register %{} out of range", reg.index)))?;
        *slot = Some(value);
        Ok(())
    }

    /// Resolve an operand to a concrete value
    pub(super) fn eval(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Int(_) | Value::User(_) | Value::Ptr(_) | Value::Proc(_) => Ok(value.clone()),
            Value::Register(reg) => {
                let frame = self
                    .frames
                    .last()
                    .ok_or_else(|| CompilerError::invariant("register read with no frame"))?;
                frame
                    .registers
                    .get(reg.index as usize)
                    .and_then(Option::as_ref)
                    .cloned()
                    .ok_or_else(|| CompilerError::runtime(format!("read of unset register %{}", reg.index)))
            }
            Value::Const(sym) => {
                let resolved = self
                    .assembly
                    .resolve_const(sym)
                    .ok_or_else(|| CompilerError::invariant(format!("unresolvable constant ${}", sym.name)))?;
                self.eval(resolved)
            }
            Value::Global(sym) => self
                .globals
                .get(&sym.name)
                .cloned()
                .map(Value::Ptr)
                .ok_or_else(|| CompilerError::invariant(format!("global @{} has no storage", sym.name))),
            Value::Extern(sym) => {
                if sym.ty.as_proc().is_some() {
                    return Ok(value.clone());
                }
                let native = self
                    .externs
                    .get(&sym.name)
                    .ok_or_else(|| CompilerError::runtime(format!("extern @{} is not bound", sym.name)))?;
                native.read(&sym.ty)
            }
        }
    }

    fn eval_int(&self, value: &Value) -> Result<IntValue> {
        match self.eval(value)? {
            Value::Int(int) => Ok(int),
            other => Err(CompilerError::invariant(format!("expected an integer, got {}", other))),
        }
    }

    fn eval_ptr(&self, value: &Value) -> Result<PtrValue> {
        match self.eval(value)? {
            Value::Ptr(ptr) => Ok(ptr),
            other => Err(CompilerError::invariant(format!("expected a pointer, got {}", other))),
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => int_binary(op, l, r).map(Value::Int),
        (Value::Ptr(ptr), Value::Int(r)) => {
            let size = ptr.pointee.size_in_bytes().ok_or_else(|| {
                CompilerError::unsupported(format!("pointer arithmetic on {}", ptr.pointee))
            })? as i64;
            let delta = match op {
                BinaryOp::Add => r.value.wrapping_mul(size),
                BinaryOp::Sub => r.value.wrapping_mul(size).wrapping_neg(),
                other => {
                    return Err(CompilerError::invariant(format!("{} on a pointer", other)));
                }
            };
            let offset = (ptr.offset as i64).wrapping_add(delta) as u32;
            Ok(Value::Ptr(PtrValue { offset, ..ptr }))
        }
        (l, r) => Err(CompilerError::invariant(format!("{} on {} and {}", op, l, r))),
    }
}

fn int_binary(op: BinaryOp, l: IntValue, r: IntValue) -> Result<IntValue> {
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && r.is_zero() {
        return Err(CompilerError::runtime("division by zero"));
    }
    let raw = match op {
        BinaryOp::Add => l.value.wrapping_add(r.value),
        BinaryOp::Sub => l.value.wrapping_sub(r.value),
        BinaryOp::Mul => l.value.wrapping_mul(r.value),
        BinaryOp::Div if l.signed => l.value.wrapping_div(r.value),
        BinaryOp::Mod if l.signed => l.value.wrapping_rem(r.value),
        BinaryOp::Div => (l.as_u64() / r.as_u64()) as i64,
        BinaryOp::Mod => (l.as_u64() % r.as_u64()) as i64,
    };
    Ok(l.with_value(raw))
}

/// Shift counts are masked to the operand size the way x86 masks `cl`
fn shift(op: ShiftOp, value: IntValue, amount: IntValue) -> IntValue {
    let mask = if value.bits <= 32 { 31 } else { 63 };
    let amount = (amount.as_u64() & mask) as u32;
    let raw = match op {
        ShiftOp::Shl => value.value.wrapping_shl(amount),
        ShiftOp::Shr if value.signed => value.value >> amount,
        ShiftOp::Shr => (value.as_u64() >> amount) as i64,
    };
    value.with_value(raw)
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) if l.signed => Ok(op.evaluate(l.value, r.value)),
        (Value::Int(l), Value::Int(r)) => Ok(op.evaluate(l.as_u64(), r.as_u64())),
        (l, r) if op.is_equality() => Ok((l == r) == (op == CmpOp::Eq)),
        (l, r) => Err(CompilerError::invariant(format!("cmp {} on {} and {}", op, l, r))),
    }
}

fn cast(value: Value, to: &Type) -> Result<Value> {
    if value.ty() == *to {
        return Ok(value);
    }
    match (value, to) {
        (Value::Ptr(ptr), Type::Ptr(pointee)) => Ok(Value::Ptr(PtrValue {
            pointee: (**pointee).clone(),
            ..ptr
        })),
        // Any value can travel as an opaque payload
        (value, Type::User(name)) => Ok(Value::User(UserValue::new(name, value))),
        (value, to) => Err(CompilerError::invariant(format!("cast of {} to {}", value, to))),
    }
}

fn element_ptr(ptr: PtrValue, index: u32) -> Result<Value> {
    let st = ptr
        .pointee
        .as_struct()
        .ok_or_else(|| CompilerError::invariant(format!("element_ptr on pointer to {}", ptr.pointee)))?;
    let field = st
        .fields
        .get(index as usize)
        .cloned()
        .ok_or_else(|| CompilerError::invariant(format!("field {} out of range", index)))?;
    let offset = st
        .field_offset(index as usize)
        .ok_or_else(|| CompilerError::unsupported(format!("field offsets in {}", ptr.pointee)))?;
    Ok(Value::Ptr(PtrValue {
        handle: ptr.handle,
        offset: ptr.offset.wrapping_add(offset),
        pointee: field,
    }))
}
