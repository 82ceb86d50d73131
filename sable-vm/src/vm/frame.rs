use sable_ir::{ProcId, Value};

/// Activation record of one procedure call
#[derive(Debug, Clone)]
pub struct Frame {
    pub proc: ProcId,
    /// Address to resume at in the caller; `None` for the entry call
    pub return_addr: Option<usize>,
    pub registers: Vec<Option<Value>>,
    /// Arena size when the frame was pushed
    pub alloc_mark: usize,
}

impl Frame {
    pub fn new(proc: ProcId, return_addr: Option<usize>, register_count: usize, alloc_mark: usize) -> Self {
        Self {
            proc,
            return_addr,
            registers: vec![None; register_count],
            alloc_mark,
        }
    }
}
