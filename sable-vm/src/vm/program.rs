//! Flattened instruction stream

use sable_ir::{Assembly, BlockId, Instr, ProcId};

/// One instruction plus the procedure it belongs to
#[derive(Debug, Clone, Copy)]
pub struct Slot<'a> {
    pub proc: ProcId,
    pub instr: &'a Instr,
}

/// Every block of every proc laid out back to back, with address maps
#[derive(Debug)]
pub struct Program<'a> {
    pub code: Vec<Slot<'a>>,
    /// Start address of each proc, indexed by `ProcId`
    proc_addr: Vec<usize>,
    /// Start address of each block, indexed by `ProcId` then `BlockId`
    block_addr: Vec<Vec<usize>>,
}

impl<'a> Program<'a> {
    pub fn flatten(assembly: &'a Assembly) -> Self {
        let mut code = Vec::new();
        let mut proc_addr = Vec::with_capacity(assembly.procs().len());
        let mut block_addr = Vec::with_capacity(assembly.procs().len());

        for (i, proc) in assembly.procs().iter().enumerate() {
            let id = ProcId(i as u32);
            proc_addr.push(code.len());
            let mut blocks = Vec::with_capacity(proc.blocks.len());
            for block in &proc.blocks {
                blocks.push(code.len());
                code.extend(block.instructions().map(|instr| Slot { proc: id, instr }));
            }
            block_addr.push(blocks);
        }

        Self {
            code,
            proc_addr,
            block_addr,
        }
    }

    pub fn proc_addr(&self, proc: ProcId) -> Option<usize> {
        self.proc_addr.get(proc.0 as usize).copied()
    }

    pub fn block_addr(&self, proc: ProcId, block: BlockId) -> Option<usize> {
        self.block_addr.get(proc.0 as usize)?.get(block.0 as usize).copied()
    }

    pub fn fetch(&self, addr: usize) -> Option<Slot<'a>> {
        self.code.get(addr).copied()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}
