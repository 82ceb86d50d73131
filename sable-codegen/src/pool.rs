//! Scratch register pool
//!
//! Tracks which physical registers the lowering currently holds. Conflicts
//! are detected by overlap, so holding `eax` also blocks `al`, `ah` and `ax`.

use crate::regs::{lookup, Register, Width, GENERAL_SLOTS};
use log::trace;
use sable_common::{CompilerError, Result};

#[derive(Debug, Clone, Default)]
pub struct RegisterPool {
    allocated: Vec<Register>,
}

impl RegisterPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_free(&self, reg: Register) -> bool {
        !self.allocated.iter().any(|held| held.overlaps(&reg))
    }

    /// Claim a specific register
    pub fn allocate_register(&mut self, reg: Register) -> Result<Register> {
        if !self.is_free(reg) {
            return Err(CompilerError::resource(format!("register {} is already in use", reg)));
        }
        trace!("pool: allocate {}", reg);
        self.allocated.push(reg);
        Ok(reg)
    }

    /// Claim any free general-purpose register of the given width
    pub fn allocate(&mut self, width: Width) -> Result<Register> {
        let candidate = (0..GENERAL_SLOTS)
            .filter_map(|slot| lookup(slot, width, false))
            .find(|reg| self.is_free(*reg));
        match candidate {
            Some(reg) => self.allocate_register(reg),
            None => Err(CompilerError::resource(format!(
                "no free {}-bit general purpose register",
                width.bits()
            ))),
        }
    }

    pub fn free(&mut self, reg: Register) -> Result<()> {
        let Some(pos) = self.allocated.iter().position(|held| *held == reg) else {
            return Err(CompilerError::invariant(format!("register {} was not allocated", reg)));
        };
        trace!("pool: free {}", reg);
        self.allocated.swap_remove(pos);
        Ok(())
    }

    pub fn allocated(&self) -> &[Register] {
        &self.allocated
    }

    pub fn clear(&mut self) {
        self.allocated.clear();
    }
}
