//! Code generation
//!
//! Every function body is compiled into its own [`Assembler`]. Expressions
//! push their value on the operand stack and report its [`Type`]; the
//! statement templates, the l-value machinery and the cast engine live in
//! the submodules.

pub mod cast;
mod expr;
mod lvalue;
pub mod ops;
mod stmt;

use ipe_core::{Assembler, Label, Opcode};
use tracing::trace;

use crate::ast::{PrimitiveType, Stmt, TypeBase, TypeExpr, TypeSuffix, VarDecl};
use crate::error::{Error, Result};
use crate::lexer::Span;
use crate::scope::FnContext;
use crate::symbols::{ExternTable, Function, StringPool, Unit, Variable};
use crate::types::Type;

use lvalue::Slot;

/// Build a [`Type`] from its syntax; names `lookup` doesn't know stay `Unresolved`
pub fn build_type(expr: &TypeExpr, lookup: &dyn Fn(&str) -> Option<Type>) -> Result<Type> {
    let mut ty = match &expr.base {
        TypeBase::Primitive(p) => match p {
            PrimitiveType::Void => Type::Void,
            PrimitiveType::Bool => Type::Bool,
            PrimitiveType::Byte => Type::Byte,
            PrimitiveType::Char => Type::Char,
            PrimitiveType::Short => Type::Short,
            PrimitiveType::Int => Type::Int,
            PrimitiveType::Long => Type::Long,
            PrimitiveType::Float => Type::Float,
            PrimitiveType::Double => Type::Double,
        },
        TypeBase::Named(name) => lookup(name).unwrap_or_else(|| Type::Unresolved { name: name.clone() }),
    };

    for suffix in &expr.suffixes {
        ty = match suffix {
            TypeSuffix::Pointer => Type::pointer_to(ty),
            TypeSuffix::Array(dims) => {
                if ty.is_void() {
                    return Err(Error::semantic("array of void", expr.span));
                }
                if dims.contains(&0) {
                    return Err(Error::semantic("array dimension must be positive", expr.span));
                }
                Type::Array {
                    element: Box::new(ty),
                    dims: dims.clone(),
                }
            }
        };
    }
    Ok(ty)
}

/// Code outside any function, run by the unit's entry point in source order
#[derive(Debug, Clone, Copy)]
pub enum TopLevel<'p> {
    /// Initializer of a global declaration
    Init(&'p VarDecl),
    Stmt(&'p Stmt),
}

/// Everything a unit's code may reach
pub struct UnitContext<'a> {
    pub unit: &'a Unit,
    /// Direct imports, in declaration order
    pub imports: Vec<&'a Unit>,
    pub strings: &'a mut StringPool,
    pub externs: &'a mut ExternTable,
    pub labels: &'a mut ipe_core::LabelTable,
}

/// Compile one function: prologue, body, epilogue
pub fn compile_function(ctx: &mut UnitContext<'_>, function: &Function, body: &[Stmt]) -> Result<Assembler> {
    trace!(function = %function.name, "compiling function");

    let mut codegen = Codegen::new(ctx, function.ret.clone(), function.ret_label, function.ret_offset());
    for param in &function.params {
        codegen.func.declare_param(param.clone())?;
    }

    let mut body_asm = codegen.new_asm();
    for stmt in body {
        codegen.compile_stmt(&mut body_asm, stmt)?;
    }

    let frame = codegen.func.frame_size();
    function.frame_size.set(frame);
    codegen.wrap_body(function.entry, function.ret_label, frame, function.param_size / 4, body_asm)
}

/// Compile the module-level code of a unit as a parameterless void function
pub fn compile_entry(ctx: &mut UnitContext<'_>, entry: Label, code: &[TopLevel<'_>]) -> Result<Assembler> {
    trace!(unit = %ctx.unit.name, items = code.len(), "compiling unit entry");

    let ret_label = ctx.labels.create();
    let mut codegen = Codegen::new(ctx, Type::Void, ret_label, -8);

    let mut body_asm = codegen.new_asm();
    for item in code {
        match item {
            TopLevel::Init(decl) => codegen.compile_global_init(&mut body_asm, decl)?,
            TopLevel::Stmt(stmt) => codegen.compile_stmt(&mut body_asm, stmt)?,
        }
    }

    let frame = codegen.func.frame_size();
    codegen.wrap_body(entry, ret_label, frame, 0, body_asm)
}

pub(crate) struct Codegen<'c, 'a> {
    unit: &'c mut UnitContext<'a>,
    func: FnContext,
}

impl<'c, 'a> Codegen<'c, 'a> {
    fn new(unit: &'c mut UnitContext<'a>, ret: Type, ret_label: Label, ret_offset: i32) -> Self {
        Self {
            unit,
            func: FnContext::new(ret, ret_label, ret_offset),
        }
    }

    fn wrap_body(&mut self, entry: Label, ret_label: Label, frame: u32, param_cells: u32, body: Assembler) -> Result<Assembler> {
        let mut asm = self.new_asm();
        self.bind(&mut asm, entry)?;
        asm.op_i32(Opcode::Stack, frame as i32);
        self.splice(&mut asm, body);
        self.bind(&mut asm, ret_label)?;
        asm.op_i32(Opcode::Stack, -(frame as i32));
        asm.op_u16(Opcode::Retn, param_cells as u16);
        Ok(asm)
    }

    fn compile_global_init(&mut self, asm: &mut Assembler, decl: &VarDecl) -> Result<()> {
        let Some(init) = &decl.init else {
            return Ok(());
        };
        for (name, _) in &decl.names {
            let var = self
                .unit
                .unit
                .global(name)
                .ok_or_else(|| Error::internal(format!("global '{}' was not declared", name)))?;
            let slot = Slot::Global(self.unit.unit.global_start + var.offset as u32);
            let ty = var.ty.clone();
            self.compile_assigned(asm, init, &ty)?;
            self.store_slot(asm, &ty, slot);
        }
        Ok(())
    }

    // ===== Labels =====

    fn new_asm(&mut self) -> Assembler {
        self.unit.labels.assembler()
    }

    fn new_label(&mut self) -> Label {
        self.unit.labels.create()
    }

    fn bind(&mut self, asm: &mut Assembler, label: Label) -> Result<()> {
        asm.bind(self.unit.labels, label)?;
        Ok(())
    }

    fn jump(&mut self, asm: &mut Assembler, op: Opcode, label: Label) {
        asm.emit_jump(self.unit.labels, op, label);
    }

    fn splice(&mut self, asm: &mut Assembler, other: Assembler) {
        asm.splice(self.unit.labels, other);
    }

    // ===== Names =====

    /// Variable visible under `name` and where it lives
    fn lookup_var(&self, name: &str) -> Option<(Variable, Slot)> {
        if let Some(var) = self.func.lookup(name) {
            return Some((var.clone(), Slot::Local(var.offset)));
        }
        let unit: &'a Unit = self.unit.unit;
        std::iter::once(unit)
            .chain(self.unit.imports.iter().copied())
            .find_map(|u| {
                u.global(name)
                    .map(|var| (var.clone(), Slot::Global(u.global_start + var.offset as u32)))
            })
    }

    fn lookup_function(&self, name: &str) -> Option<&'a Function> {
        let unit: &'a Unit = self.unit.unit;
        std::iter::once(unit)
            .chain(self.unit.imports.iter().copied())
            .find_map(|u| u.function(name))
    }

    fn lookup_type(&self, name: &str) -> Option<Type> {
        let unit: &'a Unit = self.unit.unit;
        std::iter::once(unit)
            .chain(self.unit.imports.iter().copied())
            .find_map(|u| u.named_type(name))
    }

    fn resolve_type(&self, expr: &TypeExpr) -> Result<Type> {
        let ty = build_type(expr, &|name: &str| self.lookup_type(name))?;
        ty.resolve_with(&|_: &str| None)
            .map_err(|name| Error::semantic(format!("undeclared type '{}'", name), expr.span))
    }

    // ===== Values =====

    /// Implicit conversion for assignment, argument passing and return
    fn assign_cast(&mut self, asm: &mut Assembler, from: &Type, to: &Type, span: Span) -> Result<()> {
        if from.is_aggregate() && to.is_aggregate() && from.size() != to.size() {
            return Err(Error::semantic(
                format!("cannot assign '{}' to '{}': sizes differ", from, to),
                span,
            ));
        }
        cast::emit_cast(asm, from, to, false, span)
    }

    fn dup(&mut self, asm: &mut Assembler, ty: &Type) {
        match ty.cells() {
            1 => asm.op(Opcode::Dup),
            2 => asm.op(Opcode::Dup64),
            _ => {}
        }
    }
}
