//! A developer-facing bytecode disassembler, mirroring the original's
//! `debug.c`. Not part of the language's observable behavior — it is wired
//! up only behind the CLI's `--trace` flag (SPEC §6) and always writes to
//! stderr, so it never perturbs a script's own `print` output.

use loxide_core::{Chunk, OpCode};

/// Disassembles every instruction in `chunk`, prefixed with `name`, into a
/// human-readable multi-line string.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.code.len() {
        let (text, next) = disassemble_instruction(chunk, offset);
        out.push_str(&text);
        out.push('\n');
        offset = next;
    }
    out
}

/// Disassembles one instruction starting at `offset`, returning its text
/// and the offset of the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let line = chunk.line_at(offset);
    let line_marker = if offset > 0 && chunk.line_at(offset - 1) == line {
        "   |".to_string()
    } else {
        format!("{line:4}")
    };

    let Some(op) = OpCode::from_u8(chunk.code[offset]) else {
        return (format!("{offset:04} {line_marker} Unknown opcode {}", chunk.code[offset]), offset + 1);
    };

    match op {
        OpCode::Constant | OpCode::DefineGlobal | OpCode::GetGlobal | OpCode::SetGlobal => {
            constant_instruction(op, chunk, offset, &line_marker)
        }
        OpCode::GetLocal | OpCode::SetLocal | OpCode::Call => {
            byte_instruction(op, chunk, offset, &line_marker)
        }
        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(op, 1, chunk, offset, &line_marker),
        OpCode::Loop => jump_instruction(op, -1, chunk, offset, &line_marker),
        simple => (format!("{offset:04} {line_marker} {simple:?}"), offset + 1),
    }
}

fn constant_instruction(
    op: OpCode,
    chunk: &Chunk,
    offset: usize,
    line_marker: &str,
) -> (String, usize) {
    let index = chunk.code[offset + 1];
    let value = chunk.constants.get(index as usize);
    let rendered = match value {
        Some(v) => format!("{v:?}"),
        None => "<out of range>".to_string(),
    };
    (format!("{offset:04} {line_marker} {op:?} {index:4} '{rendered}'"), offset + 2)
}

fn byte_instruction(op: OpCode, chunk: &Chunk, offset: usize, line_marker: &str) -> (String, usize) {
    let slot = chunk.code[offset + 1];
    (format!("{offset:04} {line_marker} {op:?} {slot:4}"), offset + 2)
}

fn jump_instruction(
    op: OpCode,
    sign: i32,
    chunk: &Chunk,
    offset: usize,
    line_marker: &str,
) -> (String, usize) {
    let hi = chunk.code[offset + 1] as u16;
    let lo = chunk.code[offset + 2] as u16;
    let jump = (hi << 8) | lo;
    let target = (offset as i64) + 3 + (sign as i64) * (jump as i64);
    (format!("{offset:04} {line_marker} {op:?} {offset:4} -> {target}"), offset + 3)
}
