//! Disassembler
//!
//! Decodifica um trecho de código em linhas. Um `LC32 d` seguido de
//! `JMP`/`JT`/`JF`/`CALL` tem o destino resolvido na linha do desvio.

use std::fmt;

use crate::error::{VmError, VmResult};
use crate::opcode::{Opcode, Operand};

/// Uma instrução decodificada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub offset: u32,
    pub opcode: Opcode,
    pub operand: Option<i64>,
    /// Destino absoluto de um desvio
    pub target: Option<u32>,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:  {:8}", self.offset, self.opcode.mnemonic())?;
        if let Some(value) = self.operand {
            write!(f, " {}", value)?;
        }
        if let Some(target) = self.target {
            write!(f, " -> {:04X}", target)?;
        }
        Ok(())
    }
}

/// Decodifica `bytes[start..end]`; offsets são absolutos em `bytes`
pub fn disassemble(bytes: &[u8], start: u32, end: u32) -> VmResult<Vec<Line>> {
    let end = end.min(bytes.len() as u32);
    let mut lines: Vec<Line> = Vec::new();
    let mut offset = start;

    while offset < end {
        let byte = bytes[offset as usize];
        let opcode = Opcode::from_byte(byte).ok_or(VmError::InvalidOpcode {
            opcode: byte,
            offset,
        })?;
        let operand = read_operand(bytes, offset + 1, opcode.operand())?;

        let target = match lines.last() {
            Some(prev) if opcode.is_transfer() && prev.opcode == Opcode::Lc32 => prev
                .operand
                .map(|disp| (prev.offset as i64 + disp) as u32),
            _ => None,
        };

        lines.push(Line {
            offset,
            opcode,
            operand,
            target,
        });
        offset += opcode.size() as u32;
    }
    Ok(lines)
}

/// Texto de `disassemble`, uma instrução por linha
pub fn listing(bytes: &[u8], start: u32, end: u32) -> VmResult<String> {
    let mut out = String::new();
    for line in disassemble(bytes, start, end)? {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    Ok(out)
}

fn read_operand(bytes: &[u8], at: u32, operand: Operand) -> VmResult<Option<i64>> {
    let size = operand.size();
    let raw = bytes
        .get(at as usize..at as usize + size)
        .ok_or(VmError::UnexpectedEnd { offset: at })?;
    let value = match operand {
        Operand::None => return Ok(None),
        Operand::U8 => raw[0] as i64,
        Operand::I16 => i16::from_le_bytes([raw[0], raw[1]]) as i64,
        Operand::U16 => u16::from_le_bytes([raw[0], raw[1]]) as i64,
        Operand::I32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64,
        Operand::U32 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64,
        Operand::I64 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            i64::from_le_bytes(buf)
        }
    };
    Ok(Some(value))
}
