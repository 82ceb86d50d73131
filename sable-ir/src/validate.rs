//! IR validation
//!
//! Walks a whole `UncheckedAssembly` and collects every structural and type
//! error into a `ValidationReport`. The pass never stops early; `check` turns a
//! clean report into a checked `Assembly`.

use crate::assembly::{Assembly, Proc, UncheckedAssembly};
use crate::instr::{BinaryOp, BlockId, BlockRef, CmpOp, Instr, ProcId};
use crate::types::Type;
use crate::value::{Register, Value};
use log::{debug, info};
use sable_common::{Location, Result, ValidationCategory as Cat, ValidationReport};
use std::collections::HashSet;

impl UncheckedAssembly {
    /// Run the full validation pass
    pub fn validate(&self) -> ValidationReport {
        let mut validator = Validator {
            asm: self,
            report: ValidationReport::new(),
        };
        validator.run();
        info!("Validated assembly {}: {}", self.name, validator.report.summary());
        validator.report
    }

    /// Validate and, if clean, freeze into a checked `Assembly`
    pub fn check(self) -> Result<Assembly> {
        self.validate().into_result()?;
        Ok(Assembly::from_checked(self))
    }
}

struct Validator<'a> {
    asm: &'a UncheckedAssembly,
    report: ValidationReport,
}

/// Per-instruction context
struct Site<'a> {
    proc_id: ProcId,
    proc: &'a Proc,
    loc: Location,
}

impl<'a> Validator<'a> {
    fn run(&mut self) {
        let asm = self.asm;
        self.check_symbols();
        self.check_constants();
        for (i, proc) in asm.procs.iter().enumerate() {
            self.check_proc(ProcId(i as u32), proc);
        }
    }

    fn check_symbols(&mut self) {
        let asm = self.asm;
        let mut seen = HashSet::new();
        for name in asm.symbol_names() {
            if !seen.insert(name) {
                self.report.error(
                    Location::symbol(name),
                    Cat::DuplicateSymbol,
                    format!("symbol '{}' is defined more than once", name),
                );
            }
        }

        let mut types = HashSet::new();
        for def in &asm.structs {
            if !types.insert(def.name.as_str()) {
                self.report.error(
                    Location::symbol(&def.name),
                    Cat::DuplicateSymbol,
                    format!("struct '{}' is defined more than once", def.name),
                );
            }
        }
    }

    fn check_constants(&mut self) {
        let asm = self.asm;
        for def in &asm.consts {
            let loc = Location::symbol(&def.name);
            self.check_constant_value(&def.value, &loc);
            if self.const_cycles(&def.name) {
                self.report.error(
                    loc,
                    Cat::InvalidConstant,
                    format!("constant ${} never resolves to a value", def.name),
                );
            }
        }

        for def in &asm.globals {
            let Some(init) = &def.init else { continue };
            let loc = Location::symbol(&def.name);
            self.check_constant_value(init, &loc);
            if init.ty() != def.ty {
                self.report.error(
                    loc,
                    Cat::TypeMismatch,
                    format!("initializer {} does not match global type {}", init.ty(), def.ty),
                );
            }
        }
    }

    /// Follow `$a = $b = ...` from `name`; true when the chain revisits a constant
    fn const_cycles(&self, name: &str) -> bool {
        let mut visited = HashSet::new();
        let mut current = name;
        while visited.insert(current) {
            match self.asm.const_def(current).map(|c| &c.value) {
                Some(Value::Const(next)) => current = &next.name,
                _ => return false,
            }
        }
        true
    }

    fn check_constant_value(&mut self, value: &Value, loc: &Location) {
        match value {
            Value::Register(_) | Value::Ptr(_) => self.report.error(
                loc.clone(),
                Cat::InvalidConstant,
                format!("constant {} needs a run-time frame", value),
            ),
            _ => self.check_symbol_ref(value, loc),
        }
    }

    fn check_proc(&mut self, proc_id: ProcId, proc: &'a Proc) {
        if proc.blocks.is_empty() {
            self.report.error(
                Location::proc(&proc.name),
                Cat::EmptyProc,
                format!("proc '{}' has no basic blocks", proc.name),
            );
        }

        for (i, param) in proc.params.iter().enumerate() {
            let in_table = proc.registers.get(param.index as usize);
            if param.index as usize != i || in_table != Some(&param.ty) {
                self.report.error(
                    Location::proc(&proc.name),
                    Cat::InvalidParameter,
                    format!("parameter {} is register %{}: {}", i, param.index, param.ty),
                );
            }
        }

        let mut names = HashSet::new();
        for (block_id, block) in proc.iter_blocks() {
            if !names.insert(block.name.as_str()) {
                self.report.error(
                    Location::block(&proc.name, &block.name),
                    Cat::DuplicateBlock,
                    format!("block name '{}' is not unique", block.name),
                );
            }
            self.check_block(proc_id, proc, block_id);
        }
    }

    fn check_block(&mut self, proc_id: ProcId, proc: &'a Proc, block_id: BlockId) {
        let Some(block) = proc.block(block_id) else { return };
        let block_loc = Location::block(&proc.name, &block.name);

        if block.parent != proc_id {
            self.report.error(
                block_loc.clone(),
                Cat::DanglingReference,
                format!("block claims to belong to {:?}", block.parent),
            );
        }

        if block.is_empty() {
            self.report
                .error(block_loc, Cat::EmptyBlock, "basic block has no instructions");
            return;
        }

        let last = block.instrs.len() - 1;
        let here = BlockRef {
            proc: proc_id,
            block: block_id,
        };
        for (index, node) in block.instrs.iter().enumerate() {
            let loc = Location::instr(&proc.name, &block.name, index);

            if node.instr.is_branch() && index != last {
                self.report.error(
                    loc.clone(),
                    Cat::MisplacedBranch,
                    format!("branch '{}' is not the last instruction", node.instr),
                );
            }
            if index == last && !node.instr.is_branch() {
                self.report.error(
                    loc.clone(),
                    Cat::MissingBranch,
                    "basic block does not end in a branch",
                );
            }
            if node.parent != here {
                self.report.error(
                    loc.clone(),
                    Cat::DanglingReference,
                    "instruction back-reference points at another block",
                );
            }

            let site = Site { proc_id, proc, loc };
            self.check_instr(&site, &node.instr);
        }
    }

    fn check_instr(&mut self, site: &Site<'a>, instr: &Instr) {
        for operand in instr.operands() {
            self.check_operand(site, operand);
        }
        if let Some(result) = instr.result() {
            self.check_register(site, result);
        }
        for target in instr.successors() {
            if site.proc.block(target).is_none() {
                self.report.error(
                    site.loc.clone(),
                    Cat::DanglingReference,
                    format!("jump target {} does not exist", target),
                );
            }
        }

        match instr {
            Instr::Ret { value } => {
                let ty = value.as_ref().map_or(Type::Void, Value::ty);
                if ty != site.proc.ret {
                    self.mismatch(site, format!("returns {} from a proc returning {}", ty, site.proc.ret));
                }
            }
            Instr::Jmp { .. } => {}
            Instr::JmpIf { cond, .. } => {
                if !cond.ty().is_int() {
                    self.mismatch(site, format!("branch condition has type {}", cond.ty()));
                }
            }
            Instr::Call { result, callee, args } => self.check_call(site, result, callee, args),
            Instr::Alloc { result, ty } => {
                if !ty.is_ptr() || *ty != result.ty {
                    self.mismatch(site, format!("alloc of {} into register of type {}", ty, result.ty));
                }
            }
            Instr::Load { result, src } => match src.ty().pointee() {
                Some(pointee) if *pointee == result.ty => {}
                Some(pointee) => self.mismatch(site, format!("load of {} into {}", pointee, result.ty)),
                None => self.mismatch(site, format!("load from non-pointer {}", src.ty())),
            },
            Instr::Store { target, value } => match target.ty().pointee() {
                Some(pointee) if *pointee == value.ty() => {}
                Some(pointee) => self.mismatch(site, format!("store of {} through *{}", value.ty(), pointee)),
                None => self.mismatch(site, format!("store to non-pointer {}", target.ty())),
            },
            Instr::Cmp { result, op, left, right } => self.check_cmp(site, result, *op, left, right),
            Instr::Cast { result, value } => {
                let from = value.ty();
                let to = &result.ty;
                let allowed = from == *to || (from.is_ptr() && to.is_ptr()) || to.is_user();
                if !allowed {
                    self.report.error(
                        site.loc.clone(),
                        Cat::IllegalCast,
                        format!("cannot cast {} to {}", from, to),
                    );
                }
            }
            Instr::ElementPtr { result, value, index } => self.check_element_ptr(site, result, value, *index),
            Instr::Binary { result, op, left, right } => {
                let (lt, rt) = (left.ty(), right.ty());
                let pointer_offset = matches!(op, BinaryOp::Add | BinaryOp::Sub) && lt.is_ptr() && rt.is_int();
                if !pointer_offset && (lt != rt || !lt.is_int()) {
                    self.mismatch(site, format!("{} on {} and {}", op, lt, rt));
                } else if result.ty != lt {
                    self.mismatch(site, format!("{} result {} differs from operand type {}", op, result.ty, lt));
                }
            }
            Instr::Bitwise { result, op, left, right } => {
                let (lt, rt) = (left.ty(), right.ty());
                if !lt.is_int() || lt != rt || result.ty != lt {
                    self.mismatch(site, format!("{} needs one integer type, got {}, {} -> {}", op, lt, rt, result.ty));
                }
            }
            Instr::Shift { result, op, value, amount } => {
                let (vt, at) = (value.ty(), amount.ty());
                if !vt.is_int() || !at.is_int() {
                    self.mismatch(site, format!("{} on {} by {}", op, vt, at));
                } else if result.ty != vt {
                    self.mismatch(site, format!("{} result {} differs from {}", op, result.ty, vt));
                }
            }
        }
    }

    fn check_call(&mut self, site: &Site<'a>, result: &Register, callee: &Value, args: &[Value]) {
        let callee_ty = callee.ty();
        let Some(sig) = callee_ty.as_proc() else {
            self.report.error(
                site.loc.clone(),
                Cat::NotCallable,
                format!("{} has non-procedure type {}", callee, callee_ty),
            );
            return;
        };

        if *sig.ret != result.ty {
            self.mismatch(site, format!("call returns {} into register of type {}", sig.ret, result.ty));
        }
        if sig.params.len() != args.len() {
            self.report.error(
                site.loc.clone(),
                Cat::ArgumentMismatch,
                format!("{} expects {} arguments, got {}", callee, sig.params.len(), args.len()),
            );
            return;
        }
        for (i, (param, arg)) in sig.params.iter().zip(args).enumerate() {
            if *param != arg.ty() {
                self.report.error(
                    site.loc.clone(),
                    Cat::ArgumentMismatch,
                    format!("argument {} has type {}, expected {}", i, arg.ty(), param),
                );
            }
        }
    }

    fn check_cmp(&mut self, site: &Site<'a>, result: &Register, op: CmpOp, left: &Value, right: &Value) {
        if !result.ty.is_int() {
            self.mismatch(site, format!("cmp result must be an integer, got {}", result.ty));
        }
        let (lt, rt) = (left.ty(), right.ty());
        if lt != rt {
            self.mismatch(site, format!("cmp {} on {} and {}", op, lt, rt));
            return;
        }
        let allowed = lt.is_int() || ((lt.is_ptr() || lt.is_user()) && op.is_equality());
        if !allowed {
            self.report.error(
                site.loc.clone(),
                Cat::InvalidComparison,
                format!("cmp {} is not defined on {}", op, lt),
            );
        }
    }

    fn check_element_ptr(&mut self, site: &Site<'a>, result: &Register, value: &Value, index: u32) {
        let ty = value.ty();
        let Some(st) = ty.pointee().and_then(Type::as_struct) else {
            self.mismatch(site, format!("element_ptr on {}, expected a struct pointer", ty));
            return;
        };
        let Some(field) = st.fields.get(index as usize) else {
            self.report.error(
                site.loc.clone(),
                Cat::OutOfRange,
                format!("field {} out of range for {} fields", index, st.fields.len()),
            );
            return;
        };
        let expected = Type::ptr(field.clone());
        if result.ty != expected {
            self.mismatch(site, format!("element_ptr yields {}, register is {}", expected, result.ty));
        }
    }

    fn check_operand(&mut self, site: &Site<'a>, value: &Value) {
        match value {
            Value::Register(reg) => self.check_register(site, reg),
            Value::Ptr(_) => self.report.error(
                site.loc.clone(),
                Cat::InvalidConstant,
                format!("run-time pointer {} cannot appear in IR", value),
            ),
            _ => self.check_symbol_ref(value, &site.loc),
        }
    }

    fn check_register(&mut self, site: &Site<'a>, reg: &Register) {
        match site.proc.registers.get(reg.index as usize) {
            None => self.report.error(
                site.loc.clone(),
                Cat::DanglingReference,
                format!("register %{} does not exist in {:?}", reg.index, site.proc_id),
            ),
            Some(ty) if *ty != reg.ty => self.mismatch(
                site,
                format!("register %{} used as {}, declared {}", reg.index, reg.ty, ty),
            ),
            Some(_) => {}
        }
    }

    /// Symbols must exist and carry the type of their definition
    fn check_symbol_ref(&mut self, value: &Value, loc: &Location) {
        let Some(sym) = value.symbol() else { return };
        let actual = match value {
            Value::Const(_) => self.asm.const_def(&sym.name).map(|c| c.value.ty()),
            Value::Global(_) => self.asm.global_def(&sym.name).map(|g| Type::ptr(g.ty.clone())),
            Value::Extern(_) => self.asm.extern_def(&sym.name).map(|e| e.ty.clone()),
            Value::Proc(_) => self
                .asm
                .proc_by_name(&sym.name)
                .and_then(|id| self.asm.proc(id))
                .map(Proc::ty),
            _ => return,
        };

        match actual {
            None => self.report.error(
                loc.clone(),
                Cat::DanglingReference,
                format!("{} refers to an undefined symbol", value),
            ),
            Some(ty) if ty != sym.ty => self.report.error(
                loc.clone(),
                Cat::TypeMismatch,
                format!("{} recorded as {}, defined as {}", value, sym.ty, ty),
            ),
            Some(_) => {}
        }
    }

    fn mismatch(&mut self, site: &Site<'a>, message: String) {
        debug!("{}: {}", site.loc, message);
        self.report.error(site.loc.clone(), Cat::TypeMismatch, message);
    }
}
