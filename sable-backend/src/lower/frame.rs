//! Stack frame layout
//!
//! Every virtual register gets its own stack slot. Parameters live above
//! the saved frame pointer, everything else below it:
//!
//! ```text
//! [ebp + 12]  second parameter
//! [ebp + 8]   first parameter
//! [ebp + 4]   return address
//! [ebp]       saved ebp
//! [ebp - 4]   first local slot
//! ```

use log::trace;
use sable_common::{CompilerError, Result};
use sable_ir::{Proc, Type, POINTER_SIZE};

/// Slot size of a type, rounded up to the 4-byte stack granularity
pub fn slot_size(ty: &Type) -> u32 {
    ty.size_in_bytes().unwrap_or(POINTER_SIZE).max(1).next_multiple_of(4)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    /// `ebp`-relative offset per register index; `None` for void registers
    offsets: Vec<Option<i32>>,
    locals_size: u32,
}

impl FrameLayout {
    pub fn compute(proc: &Proc) -> Result<Self> {
        let mut offsets = vec![None; proc.registers.len()];

        // Counter starts past the return address
        let mut param_offset: u32 = 4;
        for param in &proc.params {
            let slot = offsets.get_mut(param.index as usize).ok_or_else(|| {
                CompilerError::invariant(format!("parameter %{} has no register in {}", param.index, proc.name))
            })?;
            param_offset += slot_size(&param.ty);
            *slot = Some(param_offset as i32);
        }

        let mut locals_size: u32 = 0;
        for (index, ty) in proc.registers.iter().enumerate() {
            if ty.is_void() || offsets[index].is_some() {
                continue;
            }
            locals_size += slot_size(ty);
            offsets[index] = Some(-(locals_size as i32));
        }

        trace!(
            "frame {}: {} bytes of params, {} bytes of locals",
            proc.name,
            param_offset - 4,
            locals_size
        );
        Ok(Self { offsets, locals_size })
    }

    pub fn offset(&self, register: u32) -> Option<i32> {
        self.offsets.get(register as usize).copied().flatten()
    }

    pub fn locals_size(&self) -> u32 {
        self.locals_size
    }
}
