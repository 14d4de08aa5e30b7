//! Lexical scopes of a function being compiled
//!
//! The root scope holds the parameters and the top-level locals of the
//! body. Locals get bump-allocated, cell-aligned `bp` offsets; leaving a
//! scope gives its bytes back while `max_frame` remembers the high-water
//! mark that sizes the prologue.

use std::collections::HashMap;

use ipe_core::Label;

use crate::error::{Error, Result};
use crate::lexer::Span;
use crate::symbols::{VarKind, Variable};
use crate::types::Type;

#[derive(Debug, Default)]
struct Scope {
    vars: HashMap<String, Variable>,
    break_label: Option<Label>,
    /// Frame cursor when the scope was opened
    base: u32,
}

#[derive(Debug)]
pub struct FnContext {
    scopes: Vec<Scope>,
    cursor: u32,
    max_frame: u32,
    pub ret: Type,
    pub ret_label: Label,
    /// `bp` offset of the return slot
    pub ret_offset: i32,
}

impl FnContext {
    pub fn new(ret: Type, ret_label: Label, ret_offset: i32) -> Self {
        Self {
            scopes: vec![Scope::default()],
            cursor: 0,
            max_frame: 0,
            ret,
            ret_label,
            ret_offset,
        }
    }

    /// Open a child scope; `break_label` marks a loop body
    pub fn push_scope(&mut self, break_label: Option<Label>) {
        self.scopes.push(Scope {
            vars: HashMap::new(),
            break_label,
            base: self.cursor,
        });
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            if let Some(scope) = self.scopes.pop() {
                self.cursor = scope.base;
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn declare_param(&mut self, param: Variable) -> Result<()> {
        let root = &mut self.scopes[0];
        if root.vars.contains_key(&param.name) {
            return Err(Error::semantic(
                format!("parameter '{}' is declared twice", param.name),
                param.span,
            ));
        }
        root.vars.insert(param.name.clone(), param);
        Ok(())
    }

    /// Allocate a local in the innermost scope
    pub fn declare_local(&mut self, name: &str, ty: Type, span: Span, allow_shadow: bool) -> Result<Variable> {
        let innermost = self.scopes.len() - 1;
        if self.scopes[innermost].vars.contains_key(name) {
            return Err(Error::semantic(
                format!("'{}' is already declared in this scope", name),
                span,
            ));
        }
        if !allow_shadow && self.lookup(name).is_some() {
            return Err(Error::semantic(
                format!("'{}' shadows a declaration of an enclosing scope", name),
                span,
            ));
        }

        let offset = self.alloc(ty.size());
        let var = Variable::new(name, ty, span, VarKind::Local, offset);
        self.scopes[innermost].vars.insert(name.to_string(), var.clone());
        Ok(var)
    }

    /// Hidden slot for a spilled value
    pub fn alloc_temp(&mut self, size: u32) -> i32 {
        self.alloc(size)
    }

    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|scope| scope.vars.get(name))
    }

    /// Innermost enclosing loop exit
    pub fn break_label(&self) -> Option<Label> {
        self.scopes.iter().rev().find_map(|scope| scope.break_label)
    }

    /// Bytes the prologue must reserve
    pub fn frame_size(&self) -> u32 {
        self.max_frame
    }

    fn alloc(&mut self, size: u32) -> i32 {
        let offset = self.cursor;
        self.cursor += size.next_multiple_of(4);
        self.max_frame = self.max_frame.max(self.cursor);
        offset as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipe_core::LabelTable;

    fn context() -> (LabelTable, FnContext) {
        let mut labels = LabelTable::new();
        let ret = labels.create();
        (labels, FnContext::new(Type::Void, ret, -8))
    }

    #[test]
    fn test_bump_allocation_and_high_water_mark() {
        let (_, mut ctx) = context();
        let a = ctx.declare_local("a", Type::Byte, Span::dummy(), true).unwrap();
        assert_eq!(a.offset, 0);

        ctx.push_scope(None);
        let b = ctx.declare_local("b", Type::Long, Span::dummy(), true).unwrap();
        assert_eq!(b.offset, 4);
        ctx.pop_scope();

        // the inner scope's bytes are reused
        let c = ctx.declare_local("c", Type::Int, Span::dummy(), true).unwrap();
        assert_eq!(c.offset, 4);
        assert_eq!(ctx.frame_size(), 12);
        assert!(ctx.lookup("b").is_none());
    }

    #[test]
    fn test_redeclaration_and_shadowing() {
        let (_, mut ctx) = context();
        ctx.declare_local("x", Type::Int, Span::dummy(), true).unwrap();
        assert!(ctx.declare_local("x", Type::Int, Span::dummy(), true).is_err());

        ctx.push_scope(None);
        assert!(ctx.declare_local("x", Type::Long, Span::dummy(), false).is_err());
        let inner = ctx.declare_local("x", Type::Long, Span::dummy(), true).unwrap();
        assert_eq!(ctx.lookup("x").map(|v| v.offset), Some(inner.offset));
        ctx.pop_scope();
        assert_eq!(ctx.lookup("x").map(|v| v.ty.clone()), Some(Type::Int));
    }

    #[test]
    fn test_param_conflicts_with_body_local() {
        let (_, mut ctx) = context();
        let param = Variable::new("n", Type::Int, Span::dummy(), VarKind::Parameter { by_ref: false }, -12);
        ctx.declare_param(param).unwrap();
        assert!(ctx.declare_local("n", Type::Int, Span::dummy(), true).is_err());
    }

    #[test]
    fn test_break_label_walks_outward() {
        let (mut labels, mut ctx) = context();
        assert_eq!(ctx.break_label(), None);
        let end = labels.create();
        ctx.push_scope(Some(end));
        ctx.push_scope(None);
        assert_eq!(ctx.break_label(), Some(end));
        ctx.pop_scope();
        ctx.pop_scope();
        assert_eq!(ctx.break_label(), None);
    }

    #[test]
    fn test_temps_share_the_frame() {
        let (_, mut ctx) = context();
        ctx.declare_local("a", Type::Short, Span::dummy(), true).unwrap();
        assert_eq!(ctx.alloc_temp(4), 4);
        assert_eq!(ctx.frame_size(), 8);
    }
}
