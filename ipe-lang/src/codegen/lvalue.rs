//! Assignable locations
//!
//! Resolving an l-value emits whatever code computes its address and
//! reports where the value now lives. Direct slots are addressed by an
//! immediate; every other location leaves its address on the stack.

use ipe_core::{Assembler, Opcode};

use super::Codegen;
use super::ops::{self, Access, emit_int_const};
use crate::ast::{Expr, ExprKind, UnaryOp};
use crate::error::{Error, Result};
use crate::lexer::Span;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Slot {
    /// `bp`-relative
    Local(i32),
    /// Absolute data address
    Global(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Storage {
    Direct(Slot),
    /// Address produced by a pointer value
    PointerDereference,
    /// Address of an element or field of an aggregate
    ComputedStackAddress,
}

#[derive(Debug, Clone)]
pub(super) struct LValue {
    pub ty: Type,
    pub storage: Storage,
}

/// An l-value whose address no longer sits on the stack
#[derive(Debug, Clone, Copy)]
pub(super) enum Place {
    Slot(Slot),
    /// Address spilled into a hidden local
    Spilled(i32),
}

/// Expressions that denote a memory location
pub(super) fn is_lvalue_shaped(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Ident(_)
            | ExprKind::Index { .. }
            | ExprKind::Field { .. }
            | ExprKind::Unary {
                op: UnaryOp::Deref,
                ..
            }
    )
}

impl<'c, 'a> Codegen<'c, 'a> {
    pub(super) fn resolve_lvalue(&mut self, asm: &mut Assembler, expr: &Expr) -> Result<LValue> {
        match &expr.kind {
            ExprKind::Ident(name) => {
                let Some((var, slot)) = self.lookup_var(name) else {
                    if self.lookup_function(name).is_some() {
                        return Err(Error::semantic(
                            format!("function '{}' used as a value", name),
                            expr.span,
                        ));
                    }
                    return Err(Error::semantic(format!("undeclared identifier '{}'", name), expr.span));
                };
                if var.is_by_ref() {
                    asm.op_i32(Opcode::Ldl32, var.offset);
                    return Ok(LValue {
                        ty: var.ty,
                        storage: Storage::PointerDereference,
                    });
                }
                Ok(LValue {
                    ty: var.ty,
                    storage: Storage::Direct(slot),
                })
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                expr: inner,
            } => {
                let ty = self.compile_expr(asm, inner)?;
                let pointee = self.dereferenced(&ty, inner.span)?;
                Ok(LValue {
                    ty: pointee,
                    storage: Storage::PointerDereference,
                })
            }
            ExprKind::Field { base, name } => self.resolve_field(asm, base, name, expr.span),
            ExprKind::Index { base, indices } => self.resolve_index(asm, base, indices),
            _ => Err(Error::semantic("expression is not assignable", expr.span)),
        }
    }

    /// Type behind a pointer that may be dereferenced
    fn dereferenced(&self, ty: &Type, span: Span) -> Result<Type> {
        if !ty.is_pointer() {
            return Err(Error::semantic(format!("cannot dereference '{}'", ty), span));
        }
        match ty.pointee() {
            None => Err(Error::semantic("cannot dereference 'nulo'", span)),
            Some(Type::Void) => Err(Error::semantic("cannot dereference 'void*'", span)),
            Some(pointee) => Ok(pointee),
        }
    }

    /// Push what an access chain starts from: the address of an aggregate
    /// or the value of a pointer
    fn compile_base(&mut self, asm: &mut Assembler, expr: &Expr) -> Result<Type> {
        if is_lvalue_shaped(expr) {
            let lv = self.resolve_lvalue(asm, expr)?;
            if lv.ty.is_aggregate() {
                self.push_address(asm, &lv);
            } else {
                self.load_lvalue(asm, &lv)?;
            }
            return Ok(lv.ty);
        }

        let ty = self.compile_expr(asm, expr)?;
        if ty.is_aggregate() {
            self.materialize(asm, &ty);
        }
        Ok(ty)
    }

    /// Move an aggregate value from the stack into a hidden local and push its address
    fn materialize(&mut self, asm: &mut Assembler, ty: &Type) {
        let temp = self.func.alloc_temp(ty.size());
        asm.op_i32(Opcode::Leal, temp);
        asm.op_u32(Opcode::Popmem, ty.size());
        asm.op_i32(Opcode::Leal, temp);
    }

    fn resolve_field(&mut self, asm: &mut Assembler, base: &Expr, name: &str, span: Span) -> Result<LValue> {
        let base_ty = self.compile_base(asm, base)?;
        let (def, storage) = match base_ty.unaliased() {
            Type::Struct(def) => (def, Storage::ComputedStackAddress),
            ty @ Type::Pointer { .. } => match ty.pointee() {
                Some(Type::Struct(def)) => (def, Storage::PointerDereference),
                _ => return Err(Error::semantic(format!("type '{}' has no fields", base_ty), span)),
            },
            _ => return Err(Error::semantic(format!("type '{}' has no fields", base_ty), span)),
        };

        let field = def
            .field(name)
            .ok_or_else(|| Error::semantic(format!("structure '{}' has no field '{}'", def.name, name), span))?;
        if field.offset != 0 {
            emit_int_const(asm, field.offset);
            asm.op(Opcode::Add32);
        }
        Ok(LValue { ty: field.ty, storage })
    }

    fn resolve_index(&mut self, asm: &mut Assembler, base: &Expr, indices: &[Expr]) -> Result<LValue> {
        let mut ty = self.compile_base(asm, base)?;
        let mut storage = Storage::ComputedStackAddress;
        let mut remaining = indices;
        let mut at_address = false;

        while !remaining.is_empty() {
            // a pointer reached through the chain is still in memory
            if at_address && ty.is_pointer() {
                asm.op(Opcode::Lds32);
            }
            at_address = true;

            match ty.unaliased() {
                Type::Array { element, dims } => {
                    if remaining.len() < dims.len() {
                        return Err(Error::semantic(
                            format!(
                                "array '{}' needs {} indices, got {}",
                                ty,
                                dims.len(),
                                remaining.len()
                            ),
                            remaining[0].span,
                        ));
                    }
                    let (used, rest) = remaining.split_at(dims.len());
                    for (k, index) in used.iter().enumerate() {
                        let stride = element.size() * dims[k + 1..].iter().product::<u32>();
                        self.compile_offset(asm, index, stride)?;
                    }
                    ty = *element;
                    storage = Storage::ComputedStackAddress;
                    remaining = rest;
                }
                Type::Pointer { .. } => {
                    let pointee = self.dereferenced(&ty, remaining[0].span)?;
                    self.compile_offset(asm, &remaining[0], pointee.size())?;
                    ty = pointee;
                    storage = Storage::PointerDereference;
                    remaining = &remaining[1..];
                }
                _ => {
                    return Err(Error::semantic(
                        format!("type '{}' cannot be indexed", ty),
                        remaining[0].span,
                    ));
                }
            }
        }

        Ok(LValue { ty, storage })
    }

    /// Add `index * stride` to the address on top of the stack
    fn compile_offset(&mut self, asm: &mut Assembler, index: &Expr, stride: u32) -> Result<()> {
        let ty = self.compile_expr(asm, index)?;
        if !(ty.is_integer() || matches!(ty.unaliased(), Type::Char)) {
            return Err(Error::semantic(
                format!("array index must be an integer, found '{}'", ty),
                index.span,
            ));
        }
        if ty.unaliased() == Type::Long {
            asm.op(Opcode::L2I);
        }
        if stride != 1 {
            emit_int_const(asm, stride as i32);
            asm.op(Opcode::Mul32);
        }
        asm.op(Opcode::Add32);
        Ok(())
    }

    // ===== Access =====

    pub(super) fn push_address(&mut self, asm: &mut Assembler, lv: &LValue) {
        match lv.storage {
            Storage::Direct(slot) => self.push_slot_address(asm, slot),
            Storage::PointerDereference | Storage::ComputedStackAddress => {}
        }
    }

    fn push_slot_address(&mut self, asm: &mut Assembler, slot: Slot) {
        match slot {
            Slot::Local(offset) => asm.op_i32(Opcode::Leal, offset),
            Slot::Global(addr) => asm.op_i32(Opcode::Lc32, addr as i32),
        }
    }

    pub(super) fn load_lvalue(&mut self, asm: &mut Assembler, lv: &LValue) -> Result<()> {
        match lv.storage {
            Storage::Direct(slot) => self.load_slot(asm, &lv.ty, slot),
            _ if lv.ty.is_aggregate() => asm.op_u32(Opcode::Pushmem, lv.ty.size()),
            _ => {
                let width = ops::mem_width(&lv.ty)
                    .ok_or_else(|| Error::internal(format!("no load for '{}'", lv.ty)))?;
                asm.op(ops::load_op(Access::Stack, width));
            }
        }
        Ok(())
    }

    pub(super) fn load_slot(&mut self, asm: &mut Assembler, ty: &Type, slot: Slot) {
        if ty.is_aggregate() {
            self.push_slot_address(asm, slot);
            asm.op_u32(Opcode::Pushmem, ty.size());
            return;
        }
        let Some(width) = ops::mem_width(ty) else {
            return;
        };
        match slot {
            Slot::Local(offset) => asm.op_i32(ops::load_op(Access::Local, width), offset),
            Slot::Global(addr) => asm.op_u32(ops::load_op(Access::Global, width), addr),
        }
    }

    pub(super) fn store_slot(&mut self, asm: &mut Assembler, ty: &Type, slot: Slot) {
        if ty.is_aggregate() {
            self.push_slot_address(asm, slot);
            asm.op_u32(Opcode::Popmem, ty.size());
            return;
        }
        let Some(width) = ops::mem_width(ty) else {
            return;
        };
        match slot {
            Slot::Local(offset) => asm.op_i32(ops::store_op(Access::Local, width), offset),
            Slot::Global(addr) => asm.op_u32(ops::store_op(Access::Global, width), addr),
        }
    }

    // ===== Places =====

    /// Pin down an l-value so its value can be computed before it is stored
    pub(super) fn place(&mut self, asm: &mut Assembler, lv: &LValue) -> Place {
        match lv.storage {
            Storage::Direct(slot) => Place::Slot(slot),
            _ => {
                let temp = self.func.alloc_temp(4);
                asm.op_i32(Opcode::Stl32, temp);
                Place::Spilled(temp)
            }
        }
    }

    pub(super) fn load_place(&mut self, asm: &mut Assembler, ty: &Type, place: Place) -> Result<()> {
        match place {
            Place::Slot(slot) => self.load_slot(asm, ty, slot),
            Place::Spilled(temp) => {
                asm.op_i32(Opcode::Ldl32, temp);
                self.load_lvalue(
                    asm,
                    &LValue {
                        ty: ty.clone(),
                        storage: Storage::PointerDereference,
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Store the value on top of the stack
    pub(super) fn store_place(&mut self, asm: &mut Assembler, ty: &Type, place: Place) -> Result<()> {
        match place {
            Place::Slot(slot) => self.store_slot(asm, ty, slot),
            Place::Spilled(temp) => {
                asm.op_i32(Opcode::Ldl32, temp);
                if ty.is_aggregate() {
                    asm.op_u32(Opcode::Popmem, ty.size());
                } else {
                    let width = ops::mem_width(ty)
                        .ok_or_else(|| Error::internal(format!("no store for '{}'", ty)))?;
                    asm.op(ops::store_op(Access::Stack, width));
                }
            }
        }
        Ok(())
    }

    /// Address of an l-value, with arrays decaying to a pointer to their element
    pub(super) fn compile_address(&mut self, asm: &mut Assembler, expr: &Expr) -> Result<Type> {
        if !is_lvalue_shaped(expr) {
            return Err(Error::semantic("cannot take the address of this expression", expr.span));
        }
        let lv = self.resolve_lvalue(asm, expr)?;
        self.push_address(asm, &lv);
        Ok(match lv.ty.unaliased() {
            Type::Array { element, .. } => Type::decayed(*element),
            _ => Type::pointer_to(lv.ty),
        })
    }
}
