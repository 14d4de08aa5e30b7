//! Implicit and explicit conversions
//!
//! `can_coerce` decides whether a conversion is allowed, `emit_cast` writes
//! the opcodes that perform it. Sub-int values live in 32-bit cells, so a
//! widening between them costs nothing while a narrowing truncates with
//! `I2B`, `I2S` or `I2C`.

use ipe_core::{Assembler, Opcode};

use crate::error::{Error, Result};
use crate::lexer::Span;
use crate::types::{Type, WidthClass};

/// Implicit widening between primitives
fn widens(from: &Type, to: &Type) -> bool {
    use Type::*;

    match from {
        Bool => matches!(to, Bool),
        Char => matches!(to, Char),
        Byte => matches!(to, Byte | Short | Int | Long | Float | Double),
        Short => matches!(to, Short | Int | Long | Float | Double),
        Int => matches!(to, Int | Long | Float | Double),
        Long => matches!(to, Long | Float | Double),
        Float => matches!(to, Float | Double),
        Double => matches!(to, Double),
        _ => false,
    }
}

/// Whether a value of type `from` may be converted to `to`
pub fn can_coerce(from: &Type, to: &Type, explicit: bool) -> bool {
    let from = from.unaliased();
    let to = to.unaliased();

    if from.is_void() || to.is_void() {
        return false;
    }
    if from == to {
        return true;
    }

    match (&from, &to) {
        (a, b) if a.is_numeric() && b.is_numeric() => explicit || widens(a, b),
        (Type::Pointer { .. }, Type::Pointer { .. }) => {
            explicit || from.is_null() || matches!(to.pointee(), Some(Type::Void))
        }
        (Type::Int | Type::Long, Type::Pointer { .. }) | (Type::Pointer { .. }, Type::Int | Type::Long) => {
            explicit
        }
        // dimensions are not compared
        (Type::Array { element: a, .. }, Type::Array { element: b, .. }) => a == b,
        _ => false,
    }
}

/// Emit the conversion of the value on top of the stack
pub fn emit_cast(asm: &mut Assembler, from: &Type, to: &Type, explicit: bool, span: Span) -> Result<()> {
    if !can_coerce(from, to, explicit) {
        let message = if explicit {
            format!("invalid cast from '{}' to '{}'", from, to)
        } else {
            format!("cannot convert '{}' to '{}'", from, to)
        };
        return Err(Error::semantic(message, span));
    }

    let from = from.unaliased();
    let to = to.unaliased();

    if from.is_aggregate() || to.is_aggregate() {
        return Ok(());
    }

    if to.is_bool() {
        match from.width_class() {
            Some(WidthClass::I32) if !from.is_bool() => asm.op(Opcode::I2Z),
            Some(WidthClass::I64) => {
                asm.op_i64(Opcode::Lc64, 0);
                asm.op(Opcode::Ne64);
            }
            Some(WidthClass::F32) => {
                asm.op_i32(Opcode::Lc32, 0.0f32.to_bits() as i32);
                asm.op(Opcode::NeF);
            }
            Some(WidthClass::F64) => {
                asm.op_i64(Opcode::Lc64, 0.0f64.to_bits() as i64);
                asm.op(Opcode::NeD);
            }
            _ => {}
        }
        return Ok(());
    }

    if let (Some(source), Some(target)) = (from.width_class(), to.width_class()) {
        if let Some(op) = class_conversion(source, target) {
            asm.op(op);
        }
    }

    let narrowing = match to {
        Type::Byte => (!matches!(from, Type::Byte | Type::Bool)).then_some(Opcode::I2B),
        Type::Short => (!matches!(from, Type::Byte | Type::Bool | Type::Short)).then_some(Opcode::I2S),
        Type::Char => (!matches!(from, Type::Byte | Type::Bool | Type::Char)).then_some(Opcode::I2C),
        _ => None,
    };
    if let Some(op) = narrowing {
        asm.op(op);
    }
    Ok(())
}

fn class_conversion(from: WidthClass, to: WidthClass) -> Option<Opcode> {
    use WidthClass::*;

    let op = match (from, to) {
        (I32, I64) => Opcode::I2L,
        (I32, F32) => Opcode::I2F,
        (I32, F64) => Opcode::I2D,
        (I64, I32) => Opcode::L2I,
        (I64, F32) => Opcode::L2F,
        (I64, F64) => Opcode::L2D,
        (F32, I32) => Opcode::F2I,
        (F32, I64) => Opcode::F2L,
        (F32, F64) => Opcode::F2D,
        (F64, I32) => Opcode::D2I,
        (F64, I64) => Opcode::D2L,
        (F64, F32) => Opcode::D2F,
        _ => return None,
    };
    Some(op)
}
