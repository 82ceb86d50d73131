//! Intel-syntax listing emission

use crate::asm::{DataItem, X86Assembly, X86Instr, X86Proc};
use crate::regs::Width;
use log::debug;
use std::fmt::Write;

/// Render a complete assembler listing for `asm`
pub fn emit_assembly(asm: &X86Assembly) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; assembly {}", asm.name);
    out.push_str(".intel_syntax noprefix\n");

    for name in &asm.externs {
        let _ = writeln!(out, ".extern {}", name);
    }

    if !asm.data.is_empty() {
        out.push_str("\n.data\n");
        for item in &asm.data {
            emit_data(&mut out, item);
        }
    }

    out.push_str("\n.text\n");
    for proc in &asm.procs {
        emit_proc(&mut out, proc);
    }

    debug!(
        "Emitted {} procs, {} data items for {}",
        asm.procs.len(),
        asm.data.len(),
        asm.name
    );
    out
}

fn data_directive(width: Width) -> &'static str {
    match width {
        Width::Byte => ".byte",
        Width::Word => ".short",
        Width::Dword => ".long",
        Width::Qword => ".quad",
    }
}

fn emit_data(out: &mut String, item: &DataItem) {
    let _ = writeln!(out, "{}:", item.label);
    match item.value {
        Some(value) => {
            let _ = writeln!(out, "    {} {}", data_directive(item.width), value);
        }
        None => {
            let _ = writeln!(out, "    .zero {}", item.width.bytes());
        }
    }
}

fn emit_proc(out: &mut String, proc: &X86Proc) {
    out.push('\n');
    if proc.public {
        let _ = writeln!(out, ".globl {}", proc.name);
    }
    let _ = writeln!(out, "{}:", proc.name);
    for block in &proc.blocks {
        let _ = writeln!(out, "{}:", block.label);
        for instr in &block.instrs {
            emit_instr(out, instr);
        }
    }
}

fn emit_instr(out: &mut String, instr: &X86Instr) {
    match &instr.comment {
        Some(comment) => {
            let _ = writeln!(out, "    {:<32} ; {}", instr.to_intel_syntax(), comment);
        }
        None => {
            let _ = writeln!(out, "    {}", instr.to_intel_syntax());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{Opcode, X86BasicBlock};
    use crate::regs::{EAX, EBP, ESP};
    use pretty_assertions::assert_eq;

    fn answer() -> X86Assembly {
        let mut block = X86BasicBlock::new("answer.begin");
        block.push(X86Instr::op1(Opcode::Push, EBP));
        block.push(X86Instr::op2(Opcode::Mov, EBP, ESP));
        block.push(X86Instr::op2(Opcode::Mov, EAX, 42i64).with_comment("ret 42"));
        block.push(X86Instr::op2(Opcode::Mov, ESP, EBP));
        block.push(X86Instr::op1(Opcode::Pop, EBP));
        block.push(X86Instr::op0(Opcode::Ret));

        let mut proc = X86Proc::new("answer", true);
        proc.blocks.push(block);

        let mut asm = X86Assembly::new("unit");
        asm.procs.push(proc);
        asm
    }

    #[test]
    fn test_emit_text_only() {
        let expected = "\
; assembly unit
.intel_syntax noprefix

.text

.globl answer
answer:
answer.begin:
    push ebp
    mov ebp, esp
    mov eax, 42                      ; ret 42
    mov esp, ebp
    pop ebp
    ret
";
        assert_eq!(emit_assembly(&answer()), expected);
    }

    #[test]
    fn test_emit_data_and_externs() {
        let mut asm = answer();
        asm.procs[0].public = false;
        asm.externs.push("host_counter".to_string());
        asm.data.push(DataItem {
            label: "counter".to_string(),
            width: Width::Dword,
            value: Some(5),
        });
        asm.data.push(DataItem {
            label: "flag".to_string(),
            width: Width::Byte,
            value: None,
        });

        let listing = emit_assembly(&asm);
        assert!(listing.contains(".extern host_counter\n"));
        assert!(listing.contains(".data\ncounter:\n    .long 5\nflag:\n    .zero 1\n"));
        assert!(!listing.contains(".globl"));
        assert!(listing.find(".data").unwrap() < listing.find(".text").unwrap());
    }
}
