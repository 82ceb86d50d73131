//! IR graph: assemblies, procedures and basic blocks
//!
//! `UncheckedAssembly` is the mutable graph the builder produces; it may
//! violate any invariant. `Assembly` is only obtained through validation and
//! exposes the graph read-only.

use crate::instr::{BlockId, BlockRef, Instr, InstrNode, ProcId};
use crate::types::{CallConv, Type};
use crate::value::{Register, SymbolRef, Value};
use std::fmt;

/// Symbol visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Basic Block - a sequence of instructions with a single entry and exit
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub name: String,
    /// Back-reference to the owning procedure
    pub parent: ProcId,
    pub instrs: Vec<InstrNode>,
}

impl BasicBlock {
    pub fn new(name: &str, parent: ProcId) -> Self {
        Self {
            name: name.to_string(),
            parent,
            instrs: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn has_terminator(&self) -> bool {
        self.instrs.last().is_some_and(|node| node.instr.is_branch())
    }

    pub fn terminator(&self) -> Option<&Instr> {
        self.instrs.last().map(|node| &node.instr).filter(|instr| instr.is_branch())
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instr> {
        self.instrs.iter().map(|node| &node.instr)
    }
}

/// Procedure in IR
#[derive(Debug, Clone, PartialEq)]
pub struct Proc {
    pub name: String,
    pub visibility: Visibility,
    pub ret: Type,
    pub callconv: CallConv,
    /// Parameter registers, indices `0..params.len()`
    pub params: Vec<Register>,
    /// Type of every register, indexed by register number
    pub registers: Vec<Type>,
    pub blocks: Vec<BasicBlock>,
}

impl Proc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            visibility: Visibility::Public,
            ret: Type::Void,
            callconv: CallConv::Cdecl,
            params: Vec::new(),
            registers: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// The procedure's signature, derived from params and return type
    pub fn ty(&self) -> Type {
        Type::proc(
            self.callconv,
            self.params.iter().map(|p| p.ty.clone()).collect(),
            self.ret.clone(),
        )
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0 as usize)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.0 as usize)
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.name == name)
            .map(|i| BlockId(i as u32))
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    /// Iterate over `(BlockId, &BasicBlock)`
    pub fn iter_blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks.iter().enumerate().map(|(i, b)| (BlockId(i as u32), b))
    }
}

/// Native symbol imported from a host library
#[derive(Debug, Clone, PartialEq)]
pub struct ExternDef {
    pub name: String,
    pub ty: Type,
    pub path: String,
}

/// Global variable definition; `ty` is the stored type
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDef {
    pub name: String,
    pub ty: Type,
    pub init: Option<Value>,
}

/// Named compile-time constant
#[derive(Debug, Clone, PartialEq)]
pub struct ConstDef {
    pub name: String,
    pub value: Value,
}

/// Named struct layout
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub ty: Type,
}

/// Mutable compilation unit; may violate invariants until validated
#[derive(Debug, Clone, PartialEq)]
pub struct UncheckedAssembly {
    pub name: String,
    pub externs: Vec<ExternDef>,
    pub globals: Vec<GlobalDef>,
    pub consts: Vec<ConstDef>,
    pub structs: Vec<StructDef>,
    pub procs: Vec<Proc>,
}

impl UncheckedAssembly {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            externs: Vec::new(),
            globals: Vec::new(),
            consts: Vec::new(),
            structs: Vec::new(),
            procs: Vec::new(),
        }
    }

    pub fn proc(&self, id: ProcId) -> Option<&Proc> {
        self.procs.get(id.0 as usize)
    }

    pub fn proc_mut(&mut self, id: ProcId) -> Option<&mut Proc> {
        self.procs.get_mut(id.0 as usize)
    }

    pub fn proc_by_name(&self, name: &str) -> Option<ProcId> {
        self.procs
            .iter()
            .position(|p| p.name == name)
            .map(|i| ProcId(i as u32))
    }

    pub fn extern_def(&self, name: &str) -> Option<&ExternDef> {
        self.externs.iter().find(|e| e.name == name)
    }

    pub fn global_def(&self, name: &str) -> Option<&GlobalDef> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn const_def(&self, name: &str) -> Option<&ConstDef> {
        self.consts.iter().find(|c| c.name == name)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    /// All symbol names in declaration order: externs, globals, consts, procs
    pub fn symbol_names(&self) -> Vec<&str> {
        self.externs
            .iter()
            .map(|e| e.name.as_str())
            .chain(self.globals.iter().map(|g| g.name.as_str()))
            .chain(self.consts.iter().map(|c| c.name.as_str()))
            .chain(self.procs.iter().map(|p| p.name.as_str()))
            .collect()
    }

    /// Append an instruction to a block, recording the back-reference
    pub fn push_instr(&mut self, at: BlockRef, instr: Instr) -> bool {
        match self.proc_mut(at.proc).and_then(|p| p.block_mut(at.block)) {
            Some(block) => {
                block.instrs.push(InstrNode { parent: at, instr });
                true
            }
            None => false,
        }
    }
}

/// Checked, immutable compilation unit
///
/// Only `UncheckedAssembly::check` creates one. The VM and the x86 backend
/// accept nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    inner: UncheckedAssembly,
}

impl Assembly {
    pub(crate) fn from_checked(inner: UncheckedAssembly) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn procs(&self) -> &[Proc] {
        &self.inner.procs
    }

    pub fn externs(&self) -> &[ExternDef] {
        &self.inner.externs
    }

    pub fn globals(&self) -> &[GlobalDef] {
        &self.inner.globals
    }

    pub fn consts(&self) -> &[ConstDef] {
        &self.inner.consts
    }

    pub fn structs(&self) -> &[StructDef] {
        &self.inner.structs
    }

    pub fn proc(&self, id: ProcId) -> Option<&Proc> {
        self.inner.proc(id)
    }

    pub fn proc_by_name(&self, name: &str) -> Option<ProcId> {
        self.inner.proc_by_name(name)
    }

    pub fn const_def(&self, name: &str) -> Option<&ConstDef> {
        self.inner.const_def(name)
    }

    pub fn global_def(&self, name: &str) -> Option<&GlobalDef> {
        self.inner.global_def(name)
    }

    pub fn extern_def(&self, name: &str) -> Option<&ExternDef> {
        self.inner.extern_def(name)
    }

    /// The graph this assembly was checked from
    pub fn as_unchecked(&self) -> &UncheckedAssembly {
        &self.inner
    }

    /// Give the graph back for further mutation (it must be re-checked)
    pub fn into_unchecked(self) -> UncheckedAssembly {
        self.inner
    }

    /// Follow a constant chain to its final value
    pub fn resolve_const(&self, sym: &SymbolRef) -> Option<&Value> {
        let mut value = &self.const_def(&sym.name)?.value;
        // Bounded by the number of constants, so cycles cannot hang
        for _ in 0..=self.inner.consts.len() {
            match value {
                Value::Const(next) => value = &self.const_def(&next.name)?.value,
                other => return Some(other),
            }
        }
        None
    }
}

impl fmt::Display for Proc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vis = match self.visibility {
            Visibility::Public => "public",
            Visibility::Private => "private",
        };
        write!(f, "{} proc {} @{}(", vis, self.callconv, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{}: {}", param.index, param.ty)?;
        }
        writeln!(f, ") -> {} {{", self.ret)?;
        for (id, block) in self.iter_blocks() {
            writeln!(f, "{} {}:", id, block.name)?;
            for instr in block.instructions() {
                writeln!(f, "    {}", instr)?;
            }
        }
        write!(f, "}}")
    }
}

impl fmt::Display for UncheckedAssembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; assembly {}", self.name)?;
        for def in &self.structs {
            writeln!(f, "type %{} = {}", def.name, def.ty)?;
        }
        for def in &self.externs {
            writeln!(f, "extern @{}: {} from \"{}\"", def.name, def.ty, def.path)?;
        }
        for def in &self.globals {
            match &def.init {
                Some(init) => writeln!(f, "global @{}: {} = {}", def.name, def.ty, init)?,
                None => writeln!(f, "global @{}: {}", def.name, def.ty)?,
            }
        }
        for def in &self.consts {
            writeln!(f, "const ${} = {}", def.name, def.value)?;
        }
        for proc in &self.procs {
            writeln!(f)?;
            writeln!(f, "{}", proc)?;
        }
        Ok(())
    }
}

impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_proc_type_is_derived() {
        let mut proc = Proc::new("add");
        proc.ret = Type::i32();
        proc.params.push(Register { index: 0, ty: Type::i32() });
        proc.params.push(Register { index: 1, ty: Type::i8() });

        assert_eq!(
            proc.ty(),
            Type::proc(CallConv::Cdecl, vec![Type::i32(), Type::i8()], Type::i32())
        );
    }

    #[test]
    fn test_basic_block_terminator() {
        let at = BlockRef { proc: ProcId(0), block: BlockId(0) };
        let mut block = BasicBlock::new("begin", ProcId(0));
        assert!(block.is_empty());
        assert!(!block.has_terminator());

        block.instrs.push(InstrNode {
            parent: at,
            instr: Instr::Ret { value: Some(Value::i32(0)) },
        });
        assert!(block.has_terminator());
        assert_eq!(block.terminator(), Some(&Instr::Ret { value: Some(Value::i32(0)) }));
    }

    #[test]
    fn test_symbol_names_order() {
        let mut asm = UncheckedAssembly::new("unit");
        asm.procs.push(Proc::new("main"));
        asm.externs.push(ExternDef {
            name: "errno".to_string(),
            ty: Type::i32(),
            path: "libc.so".to_string(),
        });
        asm.consts.push(ConstDef {
            name: "limit".to_string(),
            value: Value::i32(10),
        });
        assert_eq!(asm.symbol_names(), vec!["errno", "limit", "main"]);
        assert_eq!(asm.proc_by_name("main"), Some(ProcId(0)));
        assert_eq!(asm.proc_by_name("missing"), None);
    }

    #[test]
    fn test_push_instr_records_parent() {
        let mut asm = UncheckedAssembly::new("unit");
        let mut proc = Proc::new("main");
        proc.blocks.push(BasicBlock::new("begin", ProcId(0)));
        asm.procs.push(proc);

        let at = BlockRef { proc: ProcId(0), block: BlockId(0) };
        assert!(asm.push_instr(at, Instr::Ret { value: None }));
        assert_eq!(asm.procs[0].blocks[0].instrs[0].parent, at);

        let missing = BlockRef { proc: ProcId(0), block: BlockId(5) };
        assert!(!asm.push_instr(missing, Instr::Ret { value: None }));
    }
}
