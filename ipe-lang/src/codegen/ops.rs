//! Opcode selection tables
//!
//! Every operator maps to one opcode per stack family; loads and stores map
//! per (addressing mode, memory width).

use ipe_core::{Assembler, Opcode};

use crate::ast::BinOp;
use crate::types::{Type, WidthClass};

/// Arithmetic, bitwise and shift opcode for `op` in family `class`
pub fn arith_op(op: BinOp, class: WidthClass) -> Option<Opcode> {
    use Opcode::*;
    use WidthClass::*;

    let opcode = match (op, class) {
        (BinOp::Add, I32) => Add32,
        (BinOp::Add, I64) => Add64,
        (BinOp::Add, F32) => AddF,
        (BinOp::Add, F64) => AddD,
        (BinOp::Sub, I32) => Sub32,
        (BinOp::Sub, I64) => Sub64,
        (BinOp::Sub, F32) => SubF,
        (BinOp::Sub, F64) => SubD,
        (BinOp::Mul, I32) => Mul32,
        (BinOp::Mul, I64) => Mul64,
        (BinOp::Mul, F32) => MulF,
        (BinOp::Mul, F64) => MulD,
        (BinOp::Div, I32) => Div32,
        (BinOp::Div, I64) => Div64,
        (BinOp::Div, F32) => DivF,
        (BinOp::Div, F64) => DivD,
        (BinOp::Mod, I32) => Mod32,
        (BinOp::Mod, I64) => Mod64,
        (BinOp::Mod, F32) => ModF,
        (BinOp::Mod, F64) => ModD,
        (BinOp::BitAnd, I32) => And32,
        (BinOp::BitAnd, I64) => And64,
        (BinOp::BitOr, I32) => Or32,
        (BinOp::BitOr, I64) => Or64,
        (BinOp::BitXor, I32) => Xor32,
        (BinOp::BitXor, I64) => Xor64,
        (BinOp::Shl, I32) => Shl32,
        (BinOp::Shl, I64) => Shl64,
        (BinOp::Shr, I32) => Shr32,
        (BinOp::Shr, I64) => Shr64,
        (BinOp::Ushr, I32) => Ushr32,
        (BinOp::Ushr, I64) => Ushr64,
        _ => return None,
    };
    Some(opcode)
}

/// Comparison opcode; every comparison pushes a 0/1 cell
pub fn compare_op(op: BinOp, class: WidthClass) -> Option<Opcode> {
    use Opcode::*;
    use WidthClass::*;

    let opcode = match (op, class) {
        (BinOp::Eq, I32) => Eq32,
        (BinOp::Eq, I64) => Eq64,
        (BinOp::Eq, F32) => EqF,
        (BinOp::Eq, F64) => EqD,
        (BinOp::Ne, I32) => Ne32,
        (BinOp::Ne, I64) => Ne64,
        (BinOp::Ne, F32) => NeF,
        (BinOp::Ne, F64) => NeD,
        (BinOp::Gt, I32) => Gt32,
        (BinOp::Gt, I64) => Gt64,
        (BinOp::Gt, F32) => GtF,
        (BinOp::Gt, F64) => GtD,
        (BinOp::Ge, I32) => Ge32,
        (BinOp::Ge, I64) => Ge64,
        (BinOp::Ge, F32) => GeF,
        (BinOp::Ge, F64) => GeD,
        (BinOp::Lt, I32) => Lt32,
        (BinOp::Lt, I64) => Lt64,
        (BinOp::Lt, F32) => LtF,
        (BinOp::Lt, F64) => LtD,
        (BinOp::Le, I32) => Le32,
        (BinOp::Le, I64) => Le64,
        (BinOp::Le, F32) => LeF,
        (BinOp::Le, F64) => LeD,
        _ => return None,
    };
    Some(opcode)
}

pub fn neg_op(class: WidthClass) -> Opcode {
    match class {
        WidthClass::I32 => Opcode::Neg32,
        WidthClass::I64 => Opcode::Neg64,
        WidthClass::F32 => Opcode::NegF,
        WidthClass::F64 => Opcode::NegD,
    }
}

/// Where a load or store finds its address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Absolute address immediate
    Global,
    /// `bp`-relative immediate
    Local,
    /// Address popped from the stack
    Stack,
}

/// Bytes moved and how a load extends them into a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemWidth {
    U8,
    I16,
    U16,
    W32,
    W64,
}

pub fn mem_width(ty: &Type) -> Option<MemWidth> {
    match ty.unaliased() {
        Type::Bool | Type::Byte => Some(MemWidth::U8),
        Type::Short => Some(MemWidth::I16),
        Type::Char => Some(MemWidth::U16),
        Type::Int | Type::Float | Type::Pointer { .. } => Some(MemWidth::W32),
        Type::Long | Type::Double => Some(MemWidth::W64),
        _ => None,
    }
}

pub fn load_op(access: Access, width: MemWidth) -> Opcode {
    use Opcode::*;

    match (access, width) {
        (Access::Global, MemWidth::U8) => Ldg8,
        (Access::Global, MemWidth::I16) => Ldg16s,
        (Access::Global, MemWidth::U16) => Ldg16u,
        (Access::Global, MemWidth::W32) => Ldg32,
        (Access::Global, MemWidth::W64) => Ldg64,
        (Access::Local, MemWidth::U8) => Ldl8,
        (Access::Local, MemWidth::I16) => Ldl16s,
        (Access::Local, MemWidth::U16) => Ldl16u,
        (Access::Local, MemWidth::W32) => Ldl32,
        (Access::Local, MemWidth::W64) => Ldl64,
        (Access::Stack, MemWidth::U8) => Lds8,
        (Access::Stack, MemWidth::I16) => Lds16s,
        (Access::Stack, MemWidth::U16) => Lds16u,
        (Access::Stack, MemWidth::W32) => Lds32,
        (Access::Stack, MemWidth::W64) => Lds64,
    }
}

pub fn store_op(access: Access, width: MemWidth) -> Opcode {
    use Opcode::*;

    match (access, width) {
        (Access::Global, MemWidth::U8) => Stg8,
        (Access::Global, MemWidth::I16 | MemWidth::U16) => Stg16,
        (Access::Global, MemWidth::W32) => Stg32,
        (Access::Global, MemWidth::W64) => Stg64,
        (Access::Local, MemWidth::U8) => Stl8,
        (Access::Local, MemWidth::I16 | MemWidth::U16) => Stl16,
        (Access::Local, MemWidth::W32) => Stl32,
        (Access::Local, MemWidth::W64) => Stl64,
        (Access::Stack, MemWidth::U8) => Sts8,
        (Access::Stack, MemWidth::I16 | MemWidth::U16) => Sts16,
        (Access::Stack, MemWidth::W32) => Sts32,
        (Access::Stack, MemWidth::W64) => Sts64,
    }
}

pub fn print_op(ty: &Type) -> Option<Opcode> {
    let opcode = match ty.unaliased() {
        Type::Bool => Opcode::PrintZ,
        Type::Byte => Opcode::Print8,
        Type::Char => Opcode::PrintC,
        Type::Short => Opcode::Print16,
        Type::Int => Opcode::Print32,
        Type::Long => Opcode::Print64,
        Type::Float => Opcode::PrintF,
        Type::Double => Opcode::PrintD,
        _ => return None,
    };
    Some(opcode)
}

pub fn scan_op(ty: &Type) -> Option<Opcode> {
    let opcode = match ty.unaliased() {
        Type::Bool => Opcode::ScanZ,
        Type::Byte => Opcode::Scan8,
        Type::Char => Opcode::ScanC,
        Type::Short => Opcode::Scan16,
        Type::Int => Opcode::Scan32,
        Type::Long => Opcode::Scan64,
        Type::Float => Opcode::ScanF,
        Type::Double => Opcode::ScanD,
        _ => return None,
    };
    Some(opcode)
}

/// Shortest constant load for a 32-bit value
pub fn emit_int_const(asm: &mut Assembler, value: i32) {
    if (0..=255).contains(&value) {
        asm.op_u8(Opcode::Lcb, value as u8);
    } else if let Ok(short) = i16::try_from(value) {
        asm.op_i16(Opcode::Lcs, short);
    } else {
        asm.op_i32(Opcode::Lc32, value);
    }
}

/// Discard `cells` stack cells
pub fn emit_pop(asm: &mut Assembler, cells: u32) {
    match cells {
        0 => {}
        1 => asm.op(Opcode::Pop),
        2 => asm.op(Opcode::Pop2),
        n => asm.op_u16(Opcode::Popn, n as u16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipe_core::{LabelTable, disassemble};

    #[test]
    fn test_every_arithmetic_op_has_integer_variants() {
        for op in [BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Mod, BinOp::Shl, BinOp::Ushr] {
            assert!(arith_op(op, WidthClass::I32).is_some(), "{}", op);
            assert!(arith_op(op, WidthClass::I64).is_some(), "{}", op);
        }
        assert_eq!(arith_op(BinOp::BitAnd, WidthClass::F64), None);
        assert_eq!(arith_op(BinOp::Shr, WidthClass::F32), None);
        assert_eq!(arith_op(BinOp::Mod, WidthClass::F32), Some(Opcode::ModF));
    }

    #[test]
    fn test_compare_families() {
        assert_eq!(compare_op(BinOp::Lt, WidthClass::I64), Some(Opcode::Lt64));
        assert_eq!(compare_op(BinOp::Eq, WidthClass::F64), Some(Opcode::EqD));
        assert_eq!(compare_op(BinOp::Add, WidthClass::I32), None);
    }

    #[test]
    fn test_memory_widths() {
        assert_eq!(mem_width(&Type::Bool), Some(MemWidth::U8));
        assert_eq!(mem_width(&Type::Short), Some(MemWidth::I16));
        assert_eq!(mem_width(&Type::Char), Some(MemWidth::U16));
        assert_eq!(mem_width(&Type::string()), Some(MemWidth::W32));
        assert_eq!(load_op(Access::Local, MemWidth::I16), Opcode::Ldl16s);
        assert_eq!(store_op(Access::Stack, MemWidth::U16), Opcode::Sts16);
    }

    #[test]
    fn test_minimal_constants() {
        let mut labels = LabelTable::new();
        let mut asm = labels.assembler();
        for value in [7, 255, 256, -1, 40000, i32::MIN] {
            emit_int_const(&mut asm, value);
        }
        let code = asm.into_bytes();
        let lines = disassemble(&code, 0, code.len() as u32).unwrap();
        let ops: Vec<_> = lines.iter().map(|l| (l.opcode, l.operand)).collect();
        assert_eq!(
            ops,
            vec![
                (Opcode::Lcb, Some(7)),
                (Opcode::Lcb, Some(255)),
                (Opcode::Lcs, Some(256)),
                (Opcode::Lcs, Some(-1)),
                (Opcode::Lc32, Some(40000)),
                (Opcode::Lc32, Some(i32::MIN as i64)),
            ]
        );
    }
}
