/// VM module - interpreter for checked Sable IR

mod execution;
mod externs;
mod frame;
mod memory;
mod program;
mod state;

#[cfg(test)]
mod tests;

pub use externs::{ExternResolver, NativeSymbol, SymbolTable};
pub use frame::Frame;
pub use memory::Memory;
pub use state::{VMState, VmOptions};

use log::{debug, info};
use program::Program;
use sable_common::{CompilerError, Result};
use sable_ir::{Assembly, ProcId, PtrValue, Value};
use std::collections::HashMap;

/// The Sable Virtual Machine
pub struct VirtualMachine<'a> {
    assembly: &'a Assembly,
    program: Program<'a>,
    options: VmOptions,

    // Call stack; the top frame is the running procedure
    frames: Vec<Frame>,
    ip: usize,

    memory: Memory,
    // Storage cell of each global, by name
    globals: HashMap<String, PtrValue>,
    externs: HashMap<String, NativeSymbol>,

    state: VMState,
    cycles: u64,
    result: Option<Value>,
}

impl<'a> VirtualMachine<'a> {
    pub fn new(assembly: &'a Assembly) -> Result<Self> {
        Self::with_options(assembly, VmOptions::default(), &SymbolTable::new())
    }

    pub fn with_options(assembly: &'a Assembly, options: VmOptions, resolver: &dyn ExternResolver) -> Result<Self> {
        let program = Program::flatten(assembly);
        info!(
            "Loaded assembly {}: {} procs, {} instructions",
            assembly.name(),
            assembly.procs().len(),
            program.len()
        );

        let mut externs = HashMap::new();
        for def in assembly.externs() {
            match resolver.resolve(def) {
                Some(symbol) => {
                    externs.insert(def.name.clone(), symbol);
                }
                None => debug!("Extern {} is unresolved", def.name),
            }
        }

        let mut vm = Self {
            assembly,
            program,
            options,
            frames: Vec::new(),
            ip: 0,
            memory: Memory::new(),
            globals: HashMap::new(),
            externs,
            state: VMState::Setup,
            cycles: 0,
            result: None,
        };
        vm.load_globals()?;
        Ok(vm)
    }

    /// One arena cell per global, initialized from its constant initializer.
    /// Initializers may name any global, so all cells exist before the first store.
    fn load_globals(&mut self) -> Result<()> {
        let assembly = self.assembly;
        for def in assembly.globals() {
            let ptr = self.memory.alloc(def.ty.clone());
            self.globals.insert(def.name.clone(), ptr);
        }

        for def in assembly.globals() {
            let Some(init) = &def.init else { continue };
            let value = self.eval(init)?;
            let ptr = self
                .globals
                .get(&def.name)
                .cloned()
                .ok_or_else(|| CompilerError::invariant(format!("global @{} has no storage", def.name)))?;
            self.memory.store(&ptr, &value)?;
        }
        Ok(())
    }

    /// Call the named procedure and run it to completion
    pub fn execute(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>> {
        let proc = self
            .assembly
            .proc_by_name(name)
            .ok_or_else(|| CompilerError::runtime(format!("no procedure named '{}'", name)))?;
        self.execute_proc(proc, args)
    }

    pub fn execute_proc(&mut self, proc: ProcId, args: &[Value]) -> Result<Option<Value>> {
        self.start(proc, args)?;
        self.run()?;
        Ok(self.result.take())
    }

    /// Push the entry frame without running anything
    pub fn start(&mut self, proc: ProcId, args: &[Value]) -> Result<()> {
        let assembly = self.assembly;
        let def = assembly
            .proc(proc)
            .ok_or_else(|| CompilerError::runtime(format!("no procedure {:?}", proc)))?;
        if def.params.len() != args.len() {
            return Err(CompilerError::runtime(format!(
                "{} expects {} arguments, got {}",
                def.name,
                def.params.len(),
                args.len()
            )));
        }
        for (param, arg) in def.params.iter().zip(args) {
            if param.ty != arg.ty() {
                return Err(CompilerError::runtime(format!(
                    "argument {} has type {}, expected {}",
                    arg,
                    arg.ty(),
                    param.ty
                )));
            }
        }

        info!("Executing {}", def.name);
        self.frames.clear();
        self.result = None;
        self.cycles = 0;
        self.state = VMState::Running;
        self.enter(proc, args.to_vec(), None)
    }

    /// Execute cycles until the call stack empties
    pub fn run(&mut self) -> Result<()> {
        while matches!(self.state, VMState::Running) {
            self.step()?;
        }
        Ok(())
    }

    /// Execute exactly one instruction
    pub fn step(&mut self) -> Result<()> {
        match self.state {
            VMState::Running => {}
            VMState::Halted => return Ok(()),
            VMState::Error(ref e) => return Err(CompilerError::runtime(e.clone())),
            VMState::Setup => return Err(CompilerError::invariant("VM has no active call")),
        }

        self.cycles += 1;
        if let Some(max) = self.options.max_cycles {
            if self.cycles > max {
                let err = CompilerError::resource(format!("cycle limit of {} exceeded", max));
                self.state = VMState::Error(err.to_string());
                return Err(err);
            }
        }

        match self.execute_cycle() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = VMState::Error(e.to_string());
                Err(e)
            }
        }
    }

    pub fn state(&self) -> &VMState {
        &self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Return value of the last completed call
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Push a frame for `proc` and jump to its first instruction
    fn enter(&mut self, proc: ProcId, args: Vec<Value>, return_addr: Option<usize>) -> Result<()> {
        let assembly = self.assembly;
        let def = assembly
            .proc(proc)
            .ok_or_else(|| CompilerError::invariant(format!("call to missing {:?}", proc)))?;
        let addr = self
            .program
            .proc_addr(proc)
            .ok_or_else(|| CompilerError::invariant(format!("{} has no code address", def.name)))?;

        let mut frame = Frame::new(proc, return_addr, def.register_count(), self.memory.len());
        for (param, arg) in def.params.iter().zip(args) {
            if let Some(slot) = frame.registers.get_mut(param.index as usize) {
                *slot = Some(arg);
            }
        }
        debug!("Entering {} (depth {})", def.name, self.frames.len() + 1);

        self.frames.push(frame);
        self.ip = addr;
        Ok(())
    }
}
