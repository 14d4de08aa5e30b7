//! Expression compilation
//!
//! Each expression leaves exactly its value on the stack, `cells(type)`
//! cells wide, and reports the type. Sub-int values occupy a full cell.

use ipe_core::{Assembler, Opcode};

use super::Codegen;
use super::cast::{self, can_coerce};
use super::lvalue::is_lvalue_shaped;
use super::ops::{self, emit_int_const};
use crate::ast::{BinOp, Expr, ExprKind, TypeExpr, UnaryOp};
use crate::error::{Error, Result};
use crate::lexer::Span;
use crate::types::{Type, WidthClass};

/// Type an arithmetic result is computed in
fn promote(ty: &Type) -> Type {
    match ty.unaliased() {
        Type::Bool | Type::Byte | Type::Char | Type::Short => Type::Int,
        other => other,
    }
}

/// Type both operands of a binary operator convert to
fn common_type(left: &Type, right: &Type) -> Option<Type> {
    if can_coerce(left, right, false) {
        Some(right.unaliased())
    } else if can_coerce(right, left, false) {
        Some(left.unaliased())
    } else {
        None
    }
}

/// Integer constants may initialise narrower integer and char storage
fn literal_fits(value: i64, target: &Type) -> bool {
    match target {
        Type::Byte => (0..=255).contains(&value),
        Type::Short => i16::try_from(value).is_ok(),
        Type::Char => u16::try_from(value).is_ok(),
        Type::Int => i32::try_from(value).is_ok(),
        _ => false,
    }
}

fn class_of(ty: &Type, span: Span) -> Result<WidthClass> {
    ty.width_class()
        .ok_or_else(|| Error::internal(format!("'{}' has no stack family at {}:{}", ty, span.line, span.col)))
}

impl<'c, 'a> Codegen<'c, 'a> {
    pub(super) fn compile_expr(&mut self, asm: &mut Assembler, expr: &Expr) -> Result<Type> {
        match &expr.kind {
            ExprKind::Int { value, long } => Ok(self.compile_int(asm, *value, *long)),
            ExprKind::Float { value, single: true } => {
                asm.op_i32(Opcode::Lc32, (*value as f32).to_bits() as i32);
                Ok(Type::Float)
            }
            ExprKind::Float { value, single: false } => {
                asm.op_i64(Opcode::Lc64, value.to_bits() as i64);
                Ok(Type::Double)
            }
            ExprKind::Char(unit) => {
                asm.op_u16(Opcode::Lcc, *unit);
                Ok(Type::Char)
            }
            ExprKind::Str(text) => {
                let addr = self.unit.strings.intern(text);
                asm.op_i32(Opcode::Lc32, addr as i32);
                Ok(Type::string())
            }
            ExprKind::Bool(value) => {
                asm.op_u8(Opcode::Lcb, *value as u8);
                Ok(Type::Bool)
            }
            ExprKind::Null => {
                asm.op_u8(Opcode::Lcb, 0);
                Ok(Type::null())
            }
            ExprKind::Ident(_)
            | ExprKind::Index { .. }
            | ExprKind::Field { .. }
            | ExprKind::Unary {
                op: UnaryOp::Deref,
                ..
            } => {
                let lv = self.resolve_lvalue(asm, expr)?;
                self.load_lvalue(asm, &lv)?;
                Ok(lv.ty)
            }
            ExprKind::Unary { op, expr: inner } => self.compile_unary(asm, *op, inner, expr.span),
            ExprKind::IncDec {
                increment,
                prefix,
                expr: target,
            } => self.compile_incdec(asm, *increment, *prefix, target, expr.span),
            ExprKind::Binary { left, op, right } if op.is_logical() => {
                self.compile_logical(asm, *op, left, right)
            }
            ExprKind::Binary { left, op, right } => {
                let left_ty = self.compile_expr(asm, left)?;
                self.binary_tail(asm, *op, left_ty, right, expr.span)
            }
            ExprKind::Assign { op, target, value } => self.compile_assign(asm, *op, target, value, expr.span),
            ExprKind::Call { name, args } => self.compile_call(asm, name, args, expr.span),
            ExprKind::Cast { ty, expr: inner } => self.compile_cast(asm, ty, inner, expr.span),
        }
    }

    /// Like `compile_expr`, but an array l-value yields a pointer to its first element
    pub(super) fn compile_operand(&mut self, asm: &mut Assembler, expr: &Expr, decay: bool) -> Result<Type> {
        if decay && is_lvalue_shaped(expr) {
            let lv = self.resolve_lvalue(asm, expr)?;
            if let Type::Array { element, .. } = lv.ty.unaliased() {
                self.push_address(asm, &lv);
                return Ok(Type::decayed(*element));
            }
            self.load_lvalue(asm, &lv)?;
            return Ok(lv.ty);
        }
        self.compile_expr(asm, expr)
    }

    /// Compile a value headed for storage of type `target`; constants that fit
    /// a narrower target are stored without a cast
    pub(super) fn compile_assigned(&mut self, asm: &mut Assembler, value: &Expr, target: &Type) -> Result<()> {
        match (&value.kind, target.unaliased()) {
            (ExprKind::Int { value: n, long: false }, ty) if literal_fits(*n, &ty) => {
                emit_int_const(asm, *n as i32);
                Ok(())
            }
            (ExprKind::Float { value: x, .. }, Type::Float) => {
                asm.op_i32(Opcode::Lc32, (*x as f32).to_bits() as i32);
                Ok(())
            }
            _ => {
                let ty = self.compile_operand(asm, value, target.is_pointer())?;
                self.assign_cast(asm, &ty, target, value.span)
            }
        }
    }

    fn compile_int(&mut self, asm: &mut Assembler, value: i64, long: bool) -> Type {
        match i32::try_from(value) {
            Ok(small) if !long => {
                emit_int_const(asm, small);
                Type::Int
            }
            _ => {
                asm.op_i64(Opcode::Lc64, value);
                Type::Long
            }
        }
    }

    // ===== Operators =====

    fn compile_unary(&mut self, asm: &mut Assembler, op: UnaryOp, inner: &Expr, span: Span) -> Result<Type> {
        if op == UnaryOp::AddrOf {
            return self.compile_address(asm, inner);
        }

        let ty = self.compile_expr(asm, inner)?;
        let invalid = || Error::semantic(format!("operator '{}' cannot be applied to '{}'", op, ty), span);
        match op {
            UnaryOp::Neg => {
                if !ty.is_arithmetic() {
                    return Err(invalid());
                }
                let result = promote(&ty);
                asm.op(ops::neg_op(class_of(&result, span)?));
                Ok(result)
            }
            UnaryOp::BitNot => {
                if !ty.is_integer() {
                    return Err(invalid());
                }
                let result = promote(&ty);
                if result == Type::Long {
                    asm.op(Opcode::Not64);
                } else {
                    asm.op(Opcode::Not32);
                }
                Ok(result)
            }
            UnaryOp::Not => {
                if !ty.is_bool() {
                    return Err(invalid());
                }
                asm.op(Opcode::Lnot);
                Ok(Type::Bool)
            }
            UnaryOp::AddrOf | UnaryOp::Deref => Err(Error::internal("address operators are l-values")),
        }
    }

    /// `&&` and `||`: the right operand runs only when the left doesn't decide
    fn compile_logical(&mut self, asm: &mut Assembler, op: BinOp, left: &Expr, right: &Expr) -> Result<Type> {
        let end = self.new_label();

        let left_ty = self.compile_expr(asm, left)?;
        if !left_ty.is_bool() {
            return Err(Error::semantic(
                format!("operator '{}' requires bool operands, found '{}'", op, left_ty),
                left.span,
            ));
        }
        asm.op(Opcode::Dup);
        let exit = if op == BinOp::And { Opcode::Jf } else { Opcode::Jt };
        self.jump(asm, exit, end);
        asm.op(Opcode::Pop);

        let right_ty = self.compile_expr(asm, right)?;
        if !right_ty.is_bool() {
            return Err(Error::semantic(
                format!("operator '{}' requires bool operands, found '{}'", op, right_ty),
                right.span,
            ));
        }
        self.bind(asm, end)?;
        Ok(Type::Bool)
    }

    /// Compile `right` on its own, then combine it with the left value already on the stack
    fn binary_tail(&mut self, asm: &mut Assembler, op: BinOp, left_ty: Type, right: &Expr, span: Span) -> Result<Type> {
        let mut right_asm = self.new_asm();
        let right_ty = self.compile_expr(&mut right_asm, right)?;
        self.emit_binary(asm, op, &left_ty, right_asm, &right_ty, span)
    }

    fn emit_binary(
        &mut self,
        asm: &mut Assembler,
        op: BinOp,
        lt: &Type,
        right: Assembler,
        rt: &Type,
        span: Span,
    ) -> Result<Type> {
        let mismatch = || {
            Error::semantic(
                format!("operator '{}' cannot be applied to '{}' and '{}'", op, lt, rt),
                span,
            )
        };

        if lt.is_pointer() || rt.is_pointer() {
            return self.emit_pointer_binary(asm, op, lt, right, rt, span);
        }

        if op.is_shift() {
            if !lt.is_integer() || !rt.is_integer() {
                return Err(mismatch());
            }
            let result = promote(lt);
            self.splice(asm, right);
            if rt.unaliased() == Type::Long {
                asm.op(Opcode::L2I);
            }
            let opcode = ops::arith_op(op, class_of(&result, span)?).ok_or_else(mismatch)?;
            asm.op(opcode);
            return Ok(result);
        }

        let common = common_type(lt, rt).ok_or_else(mismatch)?;
        let valid = if op.is_comparison() {
            common.is_numeric()
        } else if op.is_bitwise() {
            common.is_bool() || common.is_integer()
        } else {
            common.is_arithmetic()
        };
        if !valid {
            return Err(mismatch());
        }

        cast::emit_cast(asm, lt, &common, false, span)?;
        self.splice(asm, right);
        cast::emit_cast(asm, rt, &common, false, span)?;

        let class = class_of(&common, span)?;
        if op.is_comparison() {
            asm.op(ops::compare_op(op, class).ok_or_else(mismatch)?);
            return Ok(Type::Bool);
        }
        asm.op(ops::arith_op(op, class).ok_or_else(mismatch)?);
        Ok(if common.is_bool() { Type::Bool } else { promote(&common) })
    }

    fn emit_pointer_binary(
        &mut self,
        asm: &mut Assembler,
        op: BinOp,
        lt: &Type,
        right: Assembler,
        rt: &Type,
        span: Span,
    ) -> Result<Type> {
        let mismatch = || {
            Error::semantic(
                format!("operator '{}' cannot be applied to '{}' and '{}'", op, lt, rt),
                span,
            )
        };

        match op {
            BinOp::Add | BinOp::Sub if lt.is_pointer() && rt.is_integer() => {
                let size = self.pointee_size(lt, span)?;
                self.splice(asm, right);
                self.scale_index(asm, rt, size);
                asm.op(if op == BinOp::Add { Opcode::Add32 } else { Opcode::Sub32 });
                Ok(lt.unaliased())
            }
            BinOp::Add if lt.is_integer() && rt.is_pointer() => {
                let size = self.pointee_size(rt, span)?;
                self.scale_index(asm, lt, size);
                self.splice(asm, right);
                asm.op(Opcode::Add32);
                Ok(rt.unaliased())
            }
            BinOp::Sub if lt.is_pointer() && rt.is_pointer() => {
                if lt.pointee() != rt.pointee() {
                    return Err(mismatch());
                }
                let size = self.pointee_size(lt, span)?;
                self.splice(asm, right);
                asm.op(Opcode::Sub32);
                if size != 1 {
                    emit_int_const(asm, size as i32);
                    asm.op(Opcode::Div32);
                }
                Ok(Type::Int)
            }
            _ if op.is_comparison() && lt.is_pointer() && rt.is_pointer() => {
                let compatible = lt == rt
                    || lt.is_null()
                    || rt.is_null()
                    || lt.pointee() == Some(Type::Void)
                    || rt.pointee() == Some(Type::Void);
                if !compatible {
                    return Err(mismatch());
                }
                self.splice(asm, right);
                asm.op(ops::compare_op(op, WidthClass::I32).ok_or_else(mismatch)?);
                Ok(Type::Bool)
            }
            _ => Err(mismatch()),
        }
    }

    /// Element size behind a pointer used in arithmetic
    fn pointee_size(&self, ty: &Type, span: Span) -> Result<u32> {
        match ty.pointee() {
            Some(Type::Void) | None => Err(Error::semantic(
                format!("pointer arithmetic on '{}'", ty),
                span,
            )),
            Some(pointee) => Ok(pointee.size()),
        }
    }

    /// Turn the integer on top of the stack into a byte offset
    fn scale_index(&mut self, asm: &mut Assembler, ty: &Type, size: u32) {
        if ty.unaliased() == Type::Long {
            asm.op(Opcode::L2I);
        }
        if size != 1 {
            emit_int_const(asm, size as i32);
            asm.op(Opcode::Mul32);
        }
    }

    // ===== Side effects =====

    fn compile_incdec(
        &mut self,
        asm: &mut Assembler,
        increment: bool,
        prefix: bool,
        target: &Expr,
        span: Span,
    ) -> Result<Type> {
        let lv = self.resolve_lvalue(asm, target)?;
        let ty = lv.ty.clone();
        let symbol = if increment { "++" } else { "--" };
        if !ty.is_arithmetic() && !ty.is_pointer() {
            return Err(Error::semantic(
                format!("operator '{}' cannot be applied to '{}'", symbol, ty),
                span,
            ));
        }
        let op = if increment { BinOp::Add } else { BinOp::Sub };

        let place = self.place(asm, &lv);
        self.load_place(asm, &ty, place)?;
        if !prefix {
            self.dup(asm, &ty);
        }

        if ty.is_pointer() {
            let size = self.pointee_size(&ty, span)?;
            emit_int_const(asm, size as i32);
            asm.op(if increment { Opcode::Add32 } else { Opcode::Sub32 });
        } else {
            let promoted = promote(&ty);
            let class = class_of(&promoted, span)?;
            match class {
                WidthClass::I32 => asm.op_u8(Opcode::Lcb, 1),
                WidthClass::I64 => asm.op_i64(Opcode::Lc64, 1),
                WidthClass::F32 => asm.op_i32(Opcode::Lc32, 1.0f32.to_bits() as i32),
                WidthClass::F64 => asm.op_i64(Opcode::Lc64, 1.0f64.to_bits() as i64),
            }
            let opcode = ops::arith_op(op, class)
                .ok_or_else(|| Error::internal(format!("no '{}' for '{}'", symbol, ty)))?;
            asm.op(opcode);
            cast::emit_cast(asm, &promoted, &ty, true, span)?;
        }

        self.store_place(asm, &ty, place)?;
        if prefix {
            self.load_place(asm, &ty, place)?;
        }
        Ok(ty)
    }

    fn compile_assign(
        &mut self,
        asm: &mut Assembler,
        op: Option<BinOp>,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> Result<Type> {
        let lv = self.resolve_lvalue(asm, target)?;
        let ty = lv.ty.clone();
        let place = self.place(asm, &lv);

        match op {
            None => self.compile_assigned(asm, value, &ty)?,
            Some(op) => {
                if ty.is_aggregate() {
                    return Err(Error::semantic(
                        format!("operator '{}=' cannot be applied to '{}'", op, ty),
                        span,
                    ));
                }
                self.load_place(asm, &ty, place)?;
                let result = self.binary_tail(asm, op, ty.clone(), value, span)?;
                cast::emit_cast(asm, &result, &ty, true, span)?;
            }
        }

        self.store_place(asm, &ty, place)?;
        Ok(Type::Void)
    }

    // ===== Calls and casts =====

    fn compile_call(&mut self, asm: &mut Assembler, name: &str, args: &[Expr], span: Span) -> Result<Type> {
        let Some(function) = self.lookup_function(name) else {
            let message = if self.lookup_var(name).is_some() {
                format!("'{}' is not a function", name)
            } else {
                format!("undeclared function '{}'", name)
            };
            return Err(Error::semantic(message, span));
        };
        if args.len() != function.params.len() {
            return Err(Error::semantic(
                format!(
                    "function '{}' expects {} arguments, got {}",
                    name,
                    function.params.len(),
                    args.len()
                ),
                span,
            ));
        }

        let ret_cells = function.ret.cells();
        if ret_cells > 0 {
            asm.op_i32(Opcode::Stack, (ret_cells * 4) as i32);
        }

        for (arg, param) in args.iter().zip(&function.params) {
            if param.is_by_ref() {
                if !is_lvalue_shaped(arg) {
                    return Err(Error::semantic(
                        format!("argument for 'ref {}' must be assignable", param.name),
                        arg.span,
                    ));
                }
                let lv = self.resolve_lvalue(asm, arg)?;
                let matches = if lv.ty.is_array() && param.ty.is_array() {
                    can_coerce(&lv.ty, &param.ty, false)
                } else {
                    lv.ty == param.ty
                };
                if !matches {
                    return Err(Error::semantic(
                        format!(
                            "argument for 'ref {}' must have type '{}', found '{}'",
                            param.name, param.ty, lv.ty
                        ),
                        arg.span,
                    ));
                }
                self.push_address(asm, &lv);
            } else {
                self.compile_assigned(asm, arg, &param.ty)?;
            }
        }

        if function.is_extern {
            let index = self.unit.externs.intern(name, function.param_size)?;
            asm.op_u16(Opcode::Ecall, index);
        } else {
            self.jump(asm, Opcode::Call, function.entry);
        }
        Ok(function.ret.clone())
    }

    fn compile_cast(&mut self, asm: &mut Assembler, ty: &TypeExpr, inner: &Expr, span: Span) -> Result<Type> {
        let target = self.resolve_type(ty)?;
        let from = self.compile_expr(asm, inner)?;
        if from.is_aggregate() || target.is_aggregate() {
            return Err(Error::semantic(
                format!("invalid cast from '{}' to '{}'", from, target),
                span,
            ));
        }
        cast::emit_cast(asm, &from, &target, true, span)?;
        Ok(target)
    }
}
