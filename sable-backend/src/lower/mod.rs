//! Assembly Lowering - checked IR to x86
//!
//! Lowering runs in two passes. The first declares every proc and every
//! block label so forward jumps and calls resolve. The second walks each
//! proc's blocks in order and expands every IR instruction into x86 code
//! that reads its operands from stack slots and writes its result back to
//! a stack slot.

mod compare;
mod frame;
mod instr;

pub use frame::{slot_size, FrameLayout};

use crate::naming::NameGenerator;
use crate::BackendOptions;
use log::{debug, info};
use sable_codegen::regs::{EBP, ESP};
use sable_codegen::{
    DataItem, Memory, Opcode, Operand, Register, RegisterPool, Width, X86Assembly, X86BasicBlock, X86Instr,
    X86Proc,
};
use sable_common::{CompilerError, Result};
use sable_ir::{Assembly, BlockId, CallConv, Proc, Type, Value, Visibility};

/// Lower a checked assembly into an x86 program
pub fn lower_assembly(assembly: &Assembly, options: &BackendOptions) -> Result<X86Assembly> {
    info!("Lowering assembly {} ({} procs)", assembly.name(), assembly.procs().len());
    let mut out = X86Assembly::new(assembly.name());

    out.externs = assembly.externs().iter().map(|e| e.name.clone()).collect();
    for def in assembly.globals() {
        out.data.push(lower_global(assembly, &def.name, &def.ty, def.init.as_ref())?);
    }

    // Pass 1: declare every proc and block label
    let mut declared = Vec::with_capacity(assembly.procs().len());
    for proc in assembly.procs() {
        declared.push(declare_proc(proc));
    }

    // Pass 2: fill in the code
    for (proc, declared) in assembly.procs().iter().zip(declared) {
        let lowered = ProcLowering::new(assembly, proc, declared, options)?.run()?;
        out.procs.push(lowered);
    }

    debug!(
        "Lowered {}: {} procs, {} data items, {} externs",
        out.name,
        out.procs.len(),
        out.data.len(),
        out.externs.len()
    );
    Ok(out)
}

fn declare_proc(proc: &Proc) -> DeclaredProc {
    let mut naming = NameGenerator::new(&proc.name);
    let mut out = X86Proc::new(&proc.name, proc.visibility == Visibility::Public);
    out.blocks.push(X86BasicBlock::new(&naming.prologue_label()));

    let mut labels = Vec::with_capacity(proc.blocks.len());
    for block in &proc.blocks {
        let label = naming.block_label(&block.name);
        out.blocks.push(X86BasicBlock::new(&label));
        labels.push(label);
    }
    DeclaredProc { out, naming, labels }
}

/// A proc after pass 1: empty blocks with their final labels
struct DeclaredProc {
    out: X86Proc,
    naming: NameGenerator,
    labels: Vec<String>,
}

fn lower_global(assembly: &Assembly, name: &str, ty: &Type, init: Option<&Value>) -> Result<DataItem> {
    let width = value_width(ty)?;
    let value = match init.map(|v| resolve(assembly, v)).transpose()? {
        None => None,
        Some(Value::Int(int)) => Some(int.value),
        Some(other) => {
            return Err(CompilerError::unsupported(format!(
                "global @{} initialized with {}",
                name, other
            )))
        }
    };
    Ok(DataItem {
        label: name.to_string(),
        width,
        value,
    })
}

/// Follow constant symbols to the value they stand for
fn resolve<'v>(assembly: &'v Assembly, value: &'v Value) -> Result<&'v Value> {
    match value {
        Value::Const(sym) => assembly
            .resolve_const(sym)
            .ok_or_else(|| CompilerError::invariant(format!("unresolvable constant ${}", sym.name))),
        other => Ok(other),
    }
}

/// Machine width of a scalar IR type
pub fn value_width(ty: &Type) -> Result<Width> {
    match ty {
        Type::Int { bits, .. } if *bits > 32 => {
            Err(CompilerError::unsupported(format!("{}-bit integers on x86", bits)))
        }
        Type::Int { bits, .. } => Width::from_bytes(bits.div_ceil(8))
            .ok_or_else(|| CompilerError::unsupported(format!("{}-bit integers on x86", bits))),
        Type::Ptr(_) | Type::Proc(_) => Ok(Width::Dword),
        Type::User(name) => Err(CompilerError::unsupported(format!("user values of type {}", name))),
        other => Err(CompilerError::unsupported(format!("{} in a register", other))),
    }
}

fn is_signed(ty: &Type) -> bool {
    matches!(ty, Type::Int { signed: true, .. })
}

/// Per-proc lowering state
pub(crate) struct ProcLowering<'a> {
    assembly: &'a Assembly,
    proc: &'a Proc,
    frame: FrameLayout,
    naming: NameGenerator,
    pool: RegisterPool,
    out: X86Proc,
    /// x86 label of each IR block, by block index
    labels: Vec<String>,
    /// Index of the x86 block receiving code
    current: usize,
    options: &'a BackendOptions,
}

impl<'a> ProcLowering<'a> {
    fn new(
        assembly: &'a Assembly,
        proc: &'a Proc,
        declared: DeclaredProc,
        options: &'a BackendOptions,
    ) -> Result<Self> {
        if proc.callconv != CallConv::Cdecl {
            return Err(CompilerError::unsupported(format!(
                "{} calling convention in {}",
                proc.callconv, proc.name
            )));
        }
        Ok(Self {
            assembly,
            proc,
            frame: FrameLayout::compute(proc)?,
            naming: declared.naming,
            pool: RegisterPool::new(),
            out: declared.out,
            labels: declared.labels,
            current: 0,
            options,
        })
    }

    fn run(mut self) -> Result<X86Proc> {
        debug!("Lowering proc {} ({} blocks)", self.proc.name, self.proc.blocks.len());

        // Prologue falls through into the entry block
        self.emit(X86Instr::op1(Opcode::Push, EBP));
        self.emit(X86Instr::op2(Opcode::Mov, EBP, ESP));
        let locals = self.frame.locals_size();
        if locals > 0 {
            self.emit(X86Instr::op2(Opcode::Sub, ESP, locals as i64));
        }

        let proc = self.proc;
        for (id, block) in proc.iter_blocks() {
            // Diamonds shift block positions, so look the label up each time
            let label = self.label_of(id)?;
            self.current = self
                .out
                .block_index(&label)
                .ok_or_else(|| CompilerError::invariant(format!("block {} was never declared", label)))?;

            for node in &block.instrs {
                let (start_block, start_len) = (self.current, self.out.blocks[self.current].instrs.len());
                self.lower_instr(&node.instr)?;
                if self.options.emit_comments {
                    if let Some(first) = self.out.blocks[start_block].instrs.get_mut(start_len) {
                        first.comment = Some(node.instr.to_string());
                    }
                }
                if !self.pool.allocated().is_empty() {
                    return Err(CompilerError::invariant(format!(
                        "scratch registers leaked by `{}`",
                        node.instr
                    )));
                }
            }
        }
        Ok(self.out)
    }

    /// Label of IR block `id`
    pub(crate) fn label_of(&self, id: BlockId) -> Result<String> {
        self.labels
            .get(id.0 as usize)
            .cloned()
            .ok_or_else(|| CompilerError::invariant(format!("jump to missing block {}", id)))
    }

    pub(crate) fn emit(&mut self, instr: X86Instr) {
        self.out.blocks[self.current].push(instr);
    }

    /// Stack slot of a virtual register
    pub(crate) fn slot(&self, register: u32, width: Width) -> Result<Memory> {
        let offset = self.frame.offset(register).ok_or_else(|| {
            CompilerError::invariant(format!("register %{} has no stack slot in {}", register, self.proc.name))
        })?;
        Ok(Memory::base_disp(EBP, offset).sized(width))
    }

    /// Materialize `value` in the 32-bit register `dst`, extending narrow integers
    pub(crate) fn load_value(&mut self, value: &Value, dst: Register) -> Result<()> {
        match resolve(self.assembly, value)? {
            Value::Int(int) => {
                value_width(&int.ty())?;
                self.emit(X86Instr::op2(Opcode::Mov, dst, int.value));
            }
            Value::Register(reg) => {
                let width = value_width(&reg.ty)?;
                let slot = self.slot(reg.index, width)?;
                self.load_sized(dst, slot, width, is_signed(&reg.ty));
            }
            Value::Global(sym) | Value::Proc(sym) => {
                self.emit(X86Instr::op2(Opcode::Mov, dst, Operand::Offset(sym.name.clone())));
            }
            Value::Extern(sym) if sym.ty.as_proc().is_some() => {
                self.emit(X86Instr::op2(Opcode::Mov, dst, Operand::Offset(sym.name.clone())));
            }
            Value::Extern(sym) => {
                let width = value_width(&sym.ty)?;
                let mem = Memory::symbol(&sym.name).sized(width);
                self.load_sized(dst, mem, width, is_signed(&sym.ty));
            }
            Value::User(user) => {
                return Err(CompilerError::unsupported(format!(
                    "user values of type {}",
                    user.type_name()
                )))
            }
            Value::Const(sym) => {
                return Err(CompilerError::invariant(format!("constant ${} did not resolve", sym.name)))
            }
            Value::Ptr(_) => return Err(CompilerError::invariant("run-time pointer in lowered code")),
        }
        Ok(())
    }

    /// `mov`/`movsx`/`movzx` from memory into a 32-bit register
    pub(crate) fn load_sized(&mut self, dst: Register, src: Memory, width: Width, signed: bool) {
        let op = match (width, signed) {
            (Width::Dword | Width::Qword, _) => Opcode::Mov,
            (_, true) => Opcode::Movsx,
            (_, false) => Opcode::Movzx,
        };
        self.emit(X86Instr::op2(op, dst, src));
    }

    /// Write the low `width` bits of `src` to memory
    pub(crate) fn store_sized(&mut self, dst: Memory, src: Register, width: Width) -> Result<()> {
        let src = src
            .with_width(width)
            .ok_or_else(|| CompilerError::invariant(format!("{} has no {}-bit form", src, width.bits())))?;
        self.emit(X86Instr::op2(Opcode::Mov, dst.sized(width), src));
        Ok(())
    }

    /// Write `src` into the stack slot of IR register `index`
    pub(crate) fn store_result(&mut self, index: u32, ty: &Type, src: Register) -> Result<()> {
        let width = value_width(ty)?;
        let slot = self.slot(index, width)?;
        self.store_sized(slot, src, width)
    }
}
