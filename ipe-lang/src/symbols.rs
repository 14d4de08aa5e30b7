//! Symbol model
//!
//! Variables, functions and units as seen by the code generator, plus the
//! per-session tables that end up in the image (string pools, externs).

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use ipe_core::{ExternDecl, Label, encode_string};

use crate::ast::UnitKind;
use crate::error::{Error, Result};
use crate::lexer::Span;
use crate::types::{StructDef, Type, TypeSetDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Offset relative to the owning unit's `global_start`
    Global,
    /// Non-negative `bp` offset
    Local,
    /// Negative `bp` offset
    Parameter { by_ref: bool },
    /// Byte offset inside the structure
    Field,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub span: Span,
    pub kind: VarKind,
    pub offset: i32,
}

impl Variable {
    pub fn new(name: &str, ty: Type, span: Span, kind: VarKind, offset: i32) -> Self {
        Self {
            name: name.to_string(),
            ty,
            span,
            kind,
            offset,
        }
    }

    pub fn is_by_ref(&self) -> bool {
        matches!(self.kind, VarKind::Parameter { by_ref: true })
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Variable>,
    pub ret: Type,
    pub entry: Label,
    pub ret_label: Label,
    /// Bytes of arguments dropped by `RETN`
    pub param_size: u32,
    /// Local frame, known once the body is compiled
    pub frame_size: Cell<u32>,
    pub is_extern: bool,
    pub span: Span,
}

impl Function {
    /// `bp` offset of the return slot
    pub fn ret_offset(&self) -> i32 {
        -8 - self.param_size as i32 - (self.ret.cells() * 4) as i32
    }

    /// Assign parameter offsets back to front from the saved registers
    pub fn layout_params(&mut self) {
        let mut offset = -8i32;
        for param in self.params.iter_mut().rev() {
            let cells = if param.is_by_ref() { 1 } else { param.ty.cells() };
            offset -= (cells * 4) as i32;
            param.offset = offset;
        }
        self.param_size = (-8 - offset) as u32;
    }

    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.is_by_ref() {
                    format!("ref {}: {}", p.name, p.ty)
                } else {
                    format!("{}: {}", p.name, p.ty)
                }
            })
            .collect();
        format!("{}({}): {}", self.name, params.join(", "), self.ret)
    }
}

/// A compilation unit: the program or an importable `unidade`
#[derive(Debug)]
pub struct Unit {
    pub name: String,
    pub kind: UnitKind,
    /// Direct imports, as indices into the session's unit table
    pub imports: Vec<usize>,
    pub structs: HashMap<String, Rc<StructDef>>,
    pub typesets: HashMap<String, Rc<TypeSetDef>>,
    pub globals: Vec<Variable>,
    global_index: HashMap<String, usize>,
    pub functions: Vec<Function>,
    function_index: HashMap<String, usize>,
    /// Absolute address of the first global
    pub global_start: u32,
    pub globals_size: u32,
    /// Module-level entry point, when the unit has top-level code
    pub entry: Option<Label>,
}

impl Unit {
    pub fn new(name: &str, kind: UnitKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            imports: Vec::new(),
            structs: HashMap::new(),
            typesets: HashMap::new(),
            globals: Vec::new(),
            global_index: HashMap::new(),
            functions: Vec::new(),
            function_index: HashMap::new(),
            global_start: 0,
            globals_size: 0,
            entry: None,
        }
    }

    pub fn declare_struct(&mut self, def: Rc<StructDef>) -> Result<()> {
        self.check_type_name(&def.name, def.span)?;
        self.structs.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn declare_typeset(&mut self, def: Rc<TypeSetDef>, span: Span) -> Result<()> {
        self.check_type_name(&def.name, span)?;
        self.typesets.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn declare_global(&mut self, var: Variable) -> Result<()> {
        if self.global_index.contains_key(&var.name) || self.function_index.contains_key(&var.name) {
            return Err(Error::semantic(
                format!("'{}' is already declared in unit '{}'", var.name, self.name),
                var.span,
            ));
        }
        self.global_index.insert(var.name.clone(), self.globals.len());
        self.globals.push(var);
        Ok(())
    }

    pub fn declare_function(&mut self, function: Function) -> Result<()> {
        if self.function_index.contains_key(&function.name)
            || self.global_index.contains_key(&function.name)
        {
            return Err(Error::semantic(
                format!("'{}' is already declared in unit '{}'", function.name, self.name),
                function.span,
            ));
        }
        self.function_index.insert(function.name.clone(), self.functions.len());
        self.functions.push(function);
        Ok(())
    }

    pub fn global(&self, name: &str) -> Option<&Variable> {
        self.global_index.get(name).map(|&i| &self.globals[i])
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.function_index.get(name).map(|&i| &self.functions[i])
    }

    /// Named type declared in this unit
    pub fn named_type(&self, name: &str) -> Option<Type> {
        if let Some(def) = self.structs.get(name) {
            return Some(Type::Struct(def.clone()));
        }
        self.typesets.get(name).map(|def| Type::TypeSet(def.clone()))
    }

    /// Assign 4-aligned offsets to globals in declaration order
    pub fn layout_globals(&mut self) {
        let mut offset = 0u32;
        for var in &mut self.globals {
            var.offset = offset as i32;
            offset += var.ty.size().next_multiple_of(4);
        }
        self.globals_size = offset;
    }

    fn check_type_name(&self, name: &str, span: Span) -> Result<()> {
        if self.structs.contains_key(name) || self.typesets.contains_key(name) {
            return Err(Error::semantic(
                format!("type '{}' is already declared in unit '{}'", name, self.name),
                span,
            ));
        }
        Ok(())
    }
}

/// Interned string literals of one unit, stored after its globals
#[derive(Debug, Default)]
pub struct StringPool {
    base: u32,
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringPool {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    /// Absolute address of `text`, adding it on first use
    pub fn intern(&mut self, text: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(text) {
            return self.base + offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend(encode_string(text));
        self.offsets.insert(text.to_string(), offset);
        self.base + offset
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Extern functions in order of first call
#[derive(Debug, Default)]
pub struct ExternTable {
    entries: Vec<ExternDecl>,
    index: HashMap<String, u16>,
}

impl ExternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ECALL` index of `name`
    pub fn intern(&mut self, name: &str, param_bytes: u32) -> Result<u16> {
        if let Some(&index) = self.index.get(name) {
            return Ok(index);
        }
        let index = u16::try_from(self.entries.len())
            .map_err(|_| Error::internal("too many extern functions"))?;
        self.entries.push(ExternDecl {
            name: name.to_string(),
            param_bytes,
        });
        self.index.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn entries(&self) -> &[ExternDecl] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ExternDecl> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipe_core::LabelTable;

    fn function(params: Vec<(Type, bool)>, ret: Type) -> Function {
        let mut labels = LabelTable::new();
        let mut f = Function {
            name: "f".into(),
            params: params
                .into_iter()
                .enumerate()
                .map(|(i, (ty, by_ref))| {
                    Variable::new(&format!("p{}", i), ty, Span::dummy(), VarKind::Parameter { by_ref }, 0)
                })
                .collect(),
            ret,
            entry: labels.create(),
            ret_label: labels.create(),
            param_size: 0,
            frame_size: Cell::new(0),
            is_extern: false,
            span: Span::dummy(),
        };
        f.layout_params();
        f
    }

    #[test]
    fn test_param_offsets_back_to_front() {
        let f = function(vec![(Type::Int, false), (Type::Long, false), (Type::Byte, false)], Type::Int);
        let offsets: Vec<i32> = f.params.iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![-24, -20, -12]);
        assert_eq!(f.param_size, 16);
        assert_eq!(f.ret_offset(), -28);
    }

    #[test]
    fn test_by_ref_param_is_one_cell() {
        let array = Type::Array {
            element: Box::new(Type::Int),
            dims: vec![10],
        };
        let f = function(vec![(array, true)], Type::Void);
        assert_eq!(f.params[0].offset, -12);
        assert_eq!(f.param_size, 4);
        assert_eq!(f.ret_offset(), -12);
    }

    #[test]
    fn test_duplicate_declarations() {
        let mut unit = Unit::new("main", UnitKind::Program);
        let x = Variable::new("x", Type::Int, Span::dummy(), VarKind::Global, 0);
        unit.declare_global(x.clone()).unwrap();
        assert!(unit.declare_global(x).is_err());
        assert!(unit.declare_function(function(vec![], Type::Void)).is_ok());
        let clash = Variable::new("f", Type::Int, Span::dummy(), VarKind::Global, 0);
        assert!(unit.declare_global(clash).is_err());
    }

    #[test]
    fn test_global_layout_is_cell_aligned() {
        let mut unit = Unit::new("main", UnitKind::Program);
        for (name, ty) in [("a", Type::Byte), ("b", Type::Long), ("c", Type::Char)] {
            unit.declare_global(Variable::new(name, ty, Span::dummy(), VarKind::Global, 0))
                .unwrap();
        }
        unit.layout_globals();
        assert_eq!(unit.global("b").map(|v| v.offset), Some(4));
        assert_eq!(unit.global("c").map(|v| v.offset), Some(12));
        assert_eq!(unit.globals_size, 16);
    }

    #[test]
    fn test_string_pool_interns() {
        let mut pool = StringPool::new(100);
        let a = pool.intern("ab");
        let b = pool.intern("\n");
        assert_eq!(a, 100);
        assert_eq!(b, 106);
        assert_eq!(pool.intern("ab"), 100);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.bytes().len(), 10);
    }

    #[test]
    fn test_extern_table_orders_by_first_use() {
        let mut table = ExternTable::new();
        assert_eq!(table.intern("copie", 8).unwrap(), 0);
        assert_eq!(table.intern("tamanho", 4).unwrap(), 1);
        assert_eq!(table.intern("copie", 8).unwrap(), 0);
        assert_eq!(table.entries().len(), 2);
    }
}
