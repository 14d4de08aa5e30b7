//! Statement templates

use ipe_core::{Assembler, Label, Opcode};

use super::Codegen;
use super::lvalue::{Slot, is_lvalue_shaped};
use super::ops::{self, emit_pop};
use crate::ast::{Expr, ForInit, Stmt, StmtKind, VarDecl};
use crate::error::{Error, Result};
use crate::types::Type;

impl<'c, 'a> Codegen<'c, 'a> {
    pub(super) fn compile_stmt(&mut self, asm: &mut Assembler, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                self.func.push_scope(None);
                let result = stmts.iter().try_for_each(|s| self.compile_stmt(asm, s));
                self.func.pop_scope();
                result
            }
            StmtKind::Var(decl) => self.compile_local(asm, decl),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_label = self.new_label();
                let end = self.new_label();

                self.compile_condition(asm, condition)?;
                self.jump(asm, Opcode::Jf, else_label);
                self.compile_scoped(asm, then_branch, None)?;
                if let Some(else_branch) = else_branch {
                    self.jump(asm, Opcode::Jmp, end);
                    self.bind(asm, else_label)?;
                    self.compile_scoped(asm, else_branch, None)?;
                } else {
                    self.bind(asm, else_label)?;
                }
                self.bind(asm, end)
            }
            StmtKind::While { condition, body } => {
                let top = self.new_label();
                let end = self.new_label();

                self.bind(asm, top)?;
                self.compile_condition(asm, condition)?;
                self.jump(asm, Opcode::Jf, end);
                self.compile_scoped(asm, body, Some(end))?;
                self.jump(asm, Opcode::Jmp, top);
                self.bind(asm, end)
            }
            StmtKind::DoWhile { body, condition } => {
                let top = self.new_label();
                let end = self.new_label();

                self.bind(asm, top)?;
                self.compile_scoped(asm, body, Some(end))?;
                self.compile_condition(asm, condition)?;
                self.jump(asm, Opcode::Jt, top);
                self.bind(asm, end)
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let end = self.new_label();
                self.func.push_scope(Some(end));
                let result = self.compile_for(asm, init, condition.as_ref(), update, body, end);
                self.func.pop_scope();
                result
            }
            StmtKind::Break => {
                let label = self
                    .func
                    .break_label()
                    .ok_or_else(|| Error::semantic("'pare' outside of a loop", stmt.span))?;
                self.jump(asm, Opcode::Jmp, label);
                Ok(())
            }
            StmtKind::Return(value) => self.compile_return(asm, value.as_ref(), stmt),
            StmtKind::Read(targets) => targets.iter().try_for_each(|t| self.compile_read(asm, t)),
            StmtKind::Print { args, newline } => {
                for arg in args {
                    self.compile_print(asm, arg)?;
                }
                if *newline {
                    let addr = self.unit.strings.intern("\n");
                    asm.op_i32(Opcode::Lc32, addr as i32);
                    asm.op(Opcode::PrintS);
                }
                Ok(())
            }
            StmtKind::Expr(expr) => self.compile_discarded(asm, expr),
            StmtKind::Empty => Ok(()),
        }
    }

    fn compile_for(
        &mut self,
        asm: &mut Assembler,
        init: &[ForInit],
        condition: Option<&Expr>,
        update: &[Expr],
        body: &Stmt,
        end: Label,
    ) -> Result<()> {
        for item in init {
            match item {
                ForInit::Var(decl) => self.compile_local(asm, decl)?,
                ForInit::Expr(expr) => self.compile_discarded(asm, expr)?,
            }
        }

        let top = self.new_label();
        self.bind(asm, top)?;
        if let Some(condition) = condition {
            self.compile_condition(asm, condition)?;
            self.jump(asm, Opcode::Jf, end);
        }
        self.compile_scoped(asm, body, None)?;
        for expr in update {
            self.compile_discarded(asm, expr)?;
        }
        self.jump(asm, Opcode::Jmp, top);
        self.bind(asm, end)
    }

    /// A branch or loop body gets a scope of its own
    fn compile_scoped(&mut self, asm: &mut Assembler, stmt: &Stmt, break_label: Option<Label>) -> Result<()> {
        self.func.push_scope(break_label);
        let result = self.compile_stmt(asm, stmt);
        self.func.pop_scope();
        result
    }

    fn compile_condition(&mut self, asm: &mut Assembler, condition: &Expr) -> Result<()> {
        let ty = self.compile_expr(asm, condition)?;
        if !ty.is_bool() {
            return Err(Error::semantic(
                format!("condition must be 'bool', found '{}'", ty),
                condition.span,
            ));
        }
        Ok(())
    }

    /// Evaluate for side effects only
    fn compile_discarded(&mut self, asm: &mut Assembler, expr: &Expr) -> Result<()> {
        let ty = self.compile_expr(asm, expr)?;
        emit_pop(asm, ty.cells());
        Ok(())
    }

    fn compile_local(&mut self, asm: &mut Assembler, decl: &VarDecl) -> Result<()> {
        let ty = self.resolve_type(&decl.ty)?;
        if ty.is_void() {
            return Err(Error::semantic("variables cannot be 'void'", decl.ty.span));
        }
        for (name, span) in &decl.names {
            let var = self.func.declare_local(name, ty.clone(), *span, true)?;
            if let Some(init) = &decl.init {
                self.compile_assigned(asm, init, &ty)?;
                self.store_slot(asm, &ty, Slot::Local(var.offset));
            }
        }
        Ok(())
    }

    fn compile_return(&mut self, asm: &mut Assembler, value: Option<&Expr>, stmt: &Stmt) -> Result<()> {
        let ret = self.func.ret.clone();
        match (value, ret.is_void()) {
            (Some(value), true) => {
                return Err(Error::semantic("a void function cannot return a value", value.span));
            }
            (None, false) => {
                return Err(Error::semantic(
                    format!("missing return value of type '{}'", ret),
                    stmt.span,
                ));
            }
            (Some(value), false) => {
                self.compile_assigned(asm, value, &ret)?;
                self.store_slot(asm, &ret, Slot::Local(self.func.ret_offset));
            }
            (None, true) => {}
        }
        let label = self.func.ret_label;
        self.jump(asm, Opcode::Jmp, label);
        Ok(())
    }

    fn compile_read(&mut self, asm: &mut Assembler, target: &Expr) -> Result<()> {
        if !is_lvalue_shaped(target) {
            return Err(Error::semantic("'leia' needs an assignable operand", target.span));
        }
        let lv = self.resolve_lvalue(asm, target)?;

        if let Type::Array { element, dims } = lv.ty.unaliased() {
            if element.unaliased() == Type::Char && dims.len() == 1 {
                self.push_address(asm, &lv);
                asm.op_u32(Opcode::ScanS, dims[0]);
                return Ok(());
            }
        }

        let op = ops::scan_op(&lv.ty).ok_or_else(|| {
            Error::semantic(format!("cannot read a value of type '{}'", lv.ty), target.span)
        })?;
        self.push_address(asm, &lv);
        asm.op(op);
        Ok(())
    }

    fn compile_print(&mut self, asm: &mut Assembler, arg: &Expr) -> Result<()> {
        let ty = self.compile_operand(asm, arg, true)?;
        if ty.is_string() {
            asm.op(Opcode::PrintS);
            return Ok(());
        }
        let op = ops::print_op(&ty)
            .ok_or_else(|| Error::semantic(format!("cannot print a value of type '{}'", ty), arg.span))?;
        asm.op(op);
        Ok(())
    }
}
