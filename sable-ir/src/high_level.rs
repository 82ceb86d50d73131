//! Structured control flow on top of `Builder`
//!
//! Each construct lowers to basic blocks and jumps. A jump to the
//! continuation is only added when an arm did not already end in a branch, so
//! a `ret` inside an arm is never followed by dead code.

use crate::builder::Builder;
use crate::instr::BlockId;
use crate::value::Value;
use sable_common::Result;

pub trait HighLevelBuilderExt {
    /// `if cond { then }`
    fn if_then<C, T>(&mut self, cond: C, then: T) -> Result<()>
    where
        C: FnOnce(&mut Builder) -> Result<Value>,
        T: FnOnce(&mut Builder) -> Result<()>;

    /// `if cond { then } else { otherwise }`
    ///
    /// No continuation block is created when both arms end in a branch.
    fn if_then_else<C, T, E>(&mut self, cond: C, then: T, otherwise: E) -> Result<()>
    where
        C: FnOnce(&mut Builder) -> Result<Value>,
        T: FnOnce(&mut Builder) -> Result<()>,
        E: FnOnce(&mut Builder) -> Result<()>;

    /// `while cond { body }`; the condition is re-evaluated in its own block
    fn while_loop<C, B>(&mut self, cond: C, body: B) -> Result<()>
    where
        C: FnOnce(&mut Builder) -> Result<Value>,
        B: FnOnce(&mut Builder) -> Result<()>;
}

impl HighLevelBuilderExt for Builder {
    fn if_then<C, T>(&mut self, cond: C, then: T) -> Result<()>
    where
        C: FnOnce(&mut Builder) -> Result<Value>,
        T: FnOnce(&mut Builder) -> Result<()>,
    {
        let cond = cond(self)?;
        let then_block = self.append_basic_block("then")?;
        let cont_block = self.append_basic_block("continue")?;
        self.jmp_if(cond, then_block, cont_block)?;

        self.position_at_end(then_block)?;
        then(self)?;
        if !self.current_block_terminated() {
            self.jmp(cont_block)?;
        }

        self.position_at_end(cont_block)
    }

    fn if_then_else<C, T, E>(&mut self, cond: C, then: T, otherwise: E) -> Result<()>
    where
        C: FnOnce(&mut Builder) -> Result<Value>,
        T: FnOnce(&mut Builder) -> Result<()>,
        E: FnOnce(&mut Builder) -> Result<()>,
    {
        let cond = cond(self)?;
        let then_block = self.append_basic_block("then")?;
        let else_block = self.append_basic_block("else")?;
        self.jmp_if(cond, then_block, else_block)?;

        // Arms may open nested blocks, so remember where each one ended
        let mut open_ends: Vec<BlockId> = Vec::new();

        self.position_at_end(then_block)?;
        then(self)?;
        open_ends.extend(open_end(self));

        self.position_at_end(else_block)?;
        otherwise(self)?;
        open_ends.extend(open_end(self));

        if open_ends.is_empty() {
            return Ok(());
        }

        let cont_block = self.append_basic_block("continue")?;
        for end in open_ends {
            self.position_at_end(end)?;
            self.jmp(cont_block)?;
        }
        self.position_at_end(cont_block)
    }

    fn while_loop<C, B>(&mut self, cond: C, body: B) -> Result<()>
    where
        C: FnOnce(&mut Builder) -> Result<Value>,
        B: FnOnce(&mut Builder) -> Result<()>,
    {
        let cond_block = self.append_basic_block("condition")?;
        let body_block = self.append_basic_block("body")?;
        let cont_block = self.append_basic_block("continue")?;
        self.jmp(cond_block)?;

        self.position_at_end(cond_block)?;
        let cond = cond(self)?;
        self.jmp_if(cond, body_block, cont_block)?;

        self.position_at_end(body_block)?;
        body(self)?;
        if !self.current_block_terminated() {
            self.jmp(cond_block)?;
        }

        self.position_at_end(cont_block)
    }
}

/// The block the cursor is in, unless it already ends in a branch
fn open_end(builder: &Builder) -> Option<BlockId> {
    if builder.current_block_terminated() {
        None
    } else {
        builder.current_block()
    }
}
