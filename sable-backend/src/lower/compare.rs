//! Comparison diamonds
//!
//! `cmp` leaves its answer in the flags, so a comparison result is written
//! through three fresh blocks inserted right after the current one:
//!
//! ```text
//!     cmp eax, ecx
//!     jcc f.cmp0_T
//!     jmp f.cmp0_F
//! f.cmp0_T:  mov dword ptr [dst], 1 ; jmp f.cmp0_C
//! f.cmp0_F:  mov dword ptr [dst], 0 ; jmp f.cmp0_C
//! f.cmp0_C:  rest of the IR block
//! ```

use super::ProcLowering;
use sable_codegen::{Opcode, Width, X86BasicBlock, X86Instr};
use sable_common::Result;
use sable_ir::{CmpOp, Register, Type, Value};

/// Conditional jump taken when `op` holds
pub fn condition_jump(op: CmpOp, signed: bool) -> Opcode {
    match (op, signed) {
        (CmpOp::Eq, _) => Opcode::Je,
        (CmpOp::Ne, _) => Opcode::Jne,
        (CmpOp::Gr, true) => Opcode::Jg,
        (CmpOp::Le, true) => Opcode::Jl,
        (CmpOp::GrEq, true) => Opcode::Jge,
        (CmpOp::LeEq, true) => Opcode::Jle,
        (CmpOp::Gr, false) => Opcode::Ja,
        (CmpOp::Le, false) => Opcode::Jb,
        (CmpOp::GrEq, false) => Opcode::Jae,
        (CmpOp::LeEq, false) => Opcode::Jbe,
    }
}

impl ProcLowering<'_> {
    pub(super) fn lower_cmp(&mut self, result: &Register, op: CmpOp, left: &Value, right: &Value) -> Result<()> {
        let signed = matches!(left.ty(), Type::Int { signed: true, .. });
        let (acc, rhs) = self.load_pair(left, right)?;
        self.emit(X86Instr::op2(Opcode::Cmp, acc, rhs));
        self.pool.free(rhs)?;
        self.pool.free(acc)?;

        let labels = self.naming.diamond();
        self.emit(X86Instr::jump(condition_jump(op, signed), &labels.on_true));
        self.emit(X86Instr::jump(Opcode::Jmp, &labels.on_false));

        let slot = self.slot(result.index, Width::Dword)?;
        let mut on_true = X86BasicBlock::new(&labels.on_true);
        on_true.push(X86Instr::op2(Opcode::Mov, slot.clone(), 1i64));
        on_true.push(X86Instr::jump(Opcode::Jmp, &labels.join));
        let mut on_false = X86BasicBlock::new(&labels.on_false);
        on_false.push(X86Instr::op2(Opcode::Mov, slot, 0i64));
        on_false.push(X86Instr::jump(Opcode::Jmp, &labels.join));
        let join = X86BasicBlock::new(&labels.join);

        self.out.insert_blocks_after(self.current, vec![on_true, on_false, join]);
        self.current += 3;
        Ok(())
    }
}
