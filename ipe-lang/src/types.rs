//! Type model
//!
//! Types are plain values. Structures and type aliases are shared through
//! `Rc` so that every use of a name sees the layout computed by the resolve
//! pass.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::lexer::Span;
use crate::symbols::Variable;

/// Stack family of a primitive value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidthClass {
    /// bool, byte, char, short, int and pointers: one cell
    I32,
    I64,
    F32,
    F64,
}

#[derive(Debug, Clone)]
pub enum Type {
    Void,
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// `pointee == None` is the type of `nulo`
    Pointer {
        pointee: Option<Box<Type>>,
        is_array_decay: bool,
    },
    Array {
        element: Box<Type>,
        dims: Vec<u32>,
    },
    Struct(Rc<StructDef>),
    TypeSet(Rc<TypeSetDef>),
    /// Named type referenced before its declaration
    Unresolved { name: String },
}

/// `estrutura` definition; fields and size are filled by the resolve pass
#[derive(Debug)]
pub struct StructDef {
    pub name: String,
    /// `unit.Name`
    pub qualified: String,
    pub span: Span,
    pub fields: RefCell<Vec<Variable>>,
    pub size: Cell<Option<u32>>,
}

impl StructDef {
    pub fn new(name: &str, unit: &str, span: Span) -> Self {
        Self {
            name: name.to_string(),
            qualified: format!("{}.{}", unit, name),
            span,
            fields: RefCell::new(Vec::new()),
            size: Cell::new(None),
        }
    }

    pub fn field(&self, name: &str) -> Option<Variable> {
        self.fields.borrow().iter().find(|f| f.name == name).cloned()
    }
}

/// `tipo Nome = ...` alias
#[derive(Debug)]
pub struct TypeSetDef {
    pub name: String,
    pub qualified: String,
    pub aliased: RefCell<Type>,
}

impl TypeSetDef {
    pub fn new(name: &str, unit: &str, aliased: Type) -> Self {
        Self {
            name: name.to_string(),
            qualified: format!("{}.{}", unit, name),
            aliased: RefCell::new(aliased),
        }
    }
}

impl Type {
    pub fn pointer_to(pointee: Type) -> Type {
        Type::Pointer {
            pointee: Some(Box::new(pointee)),
            is_array_decay: false,
        }
    }

    /// Pointer to the first element of an array
    pub fn decayed(element: Type) -> Type {
        Type::Pointer {
            pointee: Some(Box::new(element)),
            is_array_decay: true,
        }
    }

    /// Type of the `nulo` literal
    pub fn null() -> Type {
        Type::Pointer {
            pointee: None,
            is_array_decay: false,
        }
    }

    /// `char*`, the type of string literals
    pub fn string() -> Type {
        Type::pointer_to(Type::Char)
    }

    /// Follow type aliases down to a concrete type
    pub fn unaliased(&self) -> Type {
        let mut ty = self.clone();
        // alias cycles are rejected by the resolve pass; the bound keeps this total
        for _ in 0..64 {
            match ty {
                Type::TypeSet(def) => ty = def.aliased.borrow().clone(),
                other => return other,
            }
        }
        ty
    }

    /// Size in bytes
    pub fn size(&self) -> u32 {
        match self.unaliased() {
            Type::Void | Type::Unresolved { .. } | Type::TypeSet(_) => 0,
            Type::Bool | Type::Byte => 1,
            Type::Char | Type::Short => 2,
            Type::Int | Type::Float | Type::Pointer { .. } => 4,
            Type::Long | Type::Double => 8,
            Type::Array { element, dims } => element.size() * dims.iter().product::<u32>(),
            Type::Struct(def) => def.size.get().unwrap_or(0),
        }
    }

    /// Stack cells a value of this type occupies
    pub fn cells(&self) -> u32 {
        self.size().div_ceil(4)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.unaliased(), Type::Void)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.unaliased(), Type::Bool)
    }

    /// byte, short, int, long
    pub fn is_integer(&self) -> bool {
        matches!(self.unaliased(), Type::Byte | Type::Short | Type::Int | Type::Long)
    }

    /// Integers and floating point; char and bool are excluded
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self.unaliased(),
            Type::Byte | Type::Short | Type::Int | Type::Long | Type::Float | Type::Double
        )
    }

    /// Every primitive scalar, including bool and char
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.unaliased(),
            Type::Bool
                | Type::Byte
                | Type::Char
                | Type::Short
                | Type::Int
                | Type::Long
                | Type::Float
                | Type::Double
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.unaliased(), Type::Pointer { .. })
    }

    /// Type of `nulo`
    pub fn is_null(&self) -> bool {
        matches!(self.unaliased(), Type::Pointer { pointee: None, .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self.unaliased(), Type::Array { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.unaliased(), Type::Struct(_))
    }

    /// Values copied with `PUSHMEM`/`POPMEM`
    pub fn is_aggregate(&self) -> bool {
        matches!(self.unaliased(), Type::Array { .. } | Type::Struct(_))
    }

    /// `char*` and decayed `char[]`
    pub fn is_string(&self) -> bool {
        matches!(self.pointee(), Some(Type::Char))
    }

    /// Pointed-to type; `None` for `nulo` and non-pointers
    pub fn pointee(&self) -> Option<Type> {
        match self.unaliased() {
            Type::Pointer {
                pointee: Some(pointee),
                ..
            } => Some(pointee.unaliased()),
            _ => None,
        }
    }

    /// Stack family; `None` for void and aggregates
    pub fn width_class(&self) -> Option<WidthClass> {
        match self.unaliased() {
            Type::Bool
            | Type::Byte
            | Type::Char
            | Type::Short
            | Type::Int
            | Type::Pointer { .. } => Some(WidthClass::I32),
            Type::Long => Some(WidthClass::I64),
            Type::Float => Some(WidthClass::F32),
            Type::Double => Some(WidthClass::F64),
            _ => None,
        }
    }

    /// Replace `Unresolved` names using `lookup`, returning the first unknown name
    pub fn resolve_with(
        &self,
        lookup: &dyn Fn(&str) -> Option<Type>,
    ) -> std::result::Result<Type, String> {
        Ok(match self {
            Type::Unresolved { name } => lookup(name).ok_or_else(|| name.clone())?,
            Type::Pointer {
                pointee: Some(pointee),
                is_array_decay,
            } => Type::Pointer {
                pointee: Some(Box::new(pointee.resolve_with(lookup)?)),
                is_array_decay: *is_array_decay,
            },
            Type::Array { element, dims } => Type::Array {
                element: Box::new(element.resolve_with(lookup)?),
                dims: dims.clone(),
            },
            other => other.clone(),
        })
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::TypeSet(a), _) => *a.aliased.borrow() == *other,
            (_, Type::TypeSet(b)) => *self == *b.aliased.borrow(),
            (Type::Pointer { pointee: a, .. }, Type::Pointer { pointee: b, .. }) => a == b,
            (
                Type::Array { element: a, dims: da },
                Type::Array { element: b, dims: db },
            ) => a == b && da == db,
            (Type::Struct(a), Type::Struct(b)) => a.qualified == b.qualified,
            (Type::Unresolved { name: a }, Type::Unresolved { name: b }) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Byte => write!(f, "byte"),
            Type::Char => write!(f, "char"),
            Type::Short => write!(f, "short"),
            Type::Int => write!(f, "int"),
            Type::Long => write!(f, "long"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Pointer { pointee: None, .. } => write!(f, "nulo"),
            Type::Pointer {
                pointee: Some(pointee),
                ..
            } => write!(f, "{}*", pointee),
            Type::Array { element, dims } => {
                write!(f, "{}", element)?;
                for dim in dims {
                    write!(f, "[{}]", dim)?;
                }
                Ok(())
            }
            Type::Struct(def) => write!(f, "{}", def.name),
            Type::TypeSet(def) => write!(f, "{}", def.name),
            Type::Unresolved { name } => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::VarKind;

    fn point() -> Rc<StructDef> {
        let def = StructDef::new("Ponto", "main", Span::dummy());
        def.fields.borrow_mut().push(Variable::new("x", Type::Int, Span::dummy(), VarKind::Field, 0));
        def.fields.borrow_mut().push(Variable::new("y", Type::Short, Span::dummy(), VarKind::Field, 4));
        def.size.set(Some(6));
        Rc::new(def)
    }

    #[test]
    fn test_primitive_sizes() {
        assert_eq!(Type::Bool.size(), 1);
        assert_eq!(Type::Byte.size(), 1);
        assert_eq!(Type::Char.size(), 2);
        assert_eq!(Type::Short.size(), 2);
        assert_eq!(Type::Int.size(), 4);
        assert_eq!(Type::Float.size(), 4);
        assert_eq!(Type::Long.size(), 8);
        assert_eq!(Type::Double.size(), 8);
        assert_eq!(Type::string().size(), 4);
    }

    #[test]
    fn test_aggregate_sizes() {
        let matrix = Type::Array {
            element: Box::new(Type::Short),
            dims: vec![2, 3],
        };
        assert_eq!(matrix.size(), 12);
        assert_eq!(matrix.cells(), 3);

        let s = Type::Struct(point());
        assert_eq!(s.size(), 6);
        assert_eq!(s.cells(), 2);
        assert!(s.is_aggregate());
    }

    #[test]
    fn test_struct_identity_by_qualified_name() {
        let a = Type::Struct(point());
        let b = Type::Struct(point());
        let other = Type::Struct(Rc::new(StructDef::new("Ponto", "util", Span::dummy())));
        assert_eq!(a, b);
        assert_ne!(a, other);
    }

    #[test]
    fn test_typeset_compares_as_aliased() {
        let alias = Type::TypeSet(Rc::new(TypeSetDef::new("Inteiro", "main", Type::Int)));
        assert_eq!(alias, Type::Int);
        assert_eq!(Type::Int, alias);
        assert_eq!(alias.size(), 4);
        assert!(alias.is_integer());
        assert_eq!(alias.to_string(), "Inteiro");
    }

    #[test]
    fn test_pointer_equality_ignores_decay() {
        assert_eq!(Type::decayed(Type::Int), Type::pointer_to(Type::Int));
        assert_ne!(Type::null(), Type::pointer_to(Type::Int));
        assert_ne!(Type::pointer_to(Type::Void), Type::pointer_to(Type::Int));
    }

    #[test]
    fn test_classes() {
        assert!(Type::Byte.is_arithmetic());
        assert!(!Type::Char.is_arithmetic());
        assert!(!Type::Bool.is_integer());
        assert!(Type::Char.is_numeric());
        assert_eq!(Type::Short.width_class(), Some(WidthClass::I32));
        assert_eq!(Type::pointer_to(Type::Long).width_class(), Some(WidthClass::I32));
        assert_eq!(Type::Long.width_class(), Some(WidthClass::I64));
        assert_eq!(Type::Float.width_class(), Some(WidthClass::F32));
        assert_eq!(Type::Struct(point()).width_class(), None);
    }

    #[test]
    fn test_display() {
        let ty = Type::pointer_to(Type::Array {
            element: Box::new(Type::Int),
            dims: vec![2, 3],
        });
        assert_eq!(ty.to_string(), "int[2][3]*");
        assert_eq!(Type::null().to_string(), "nulo");
    }

    #[test]
    fn test_resolve_with() {
        let ty = Type::pointer_to(Type::Unresolved { name: "Ponto".into() });
        let lookup = |name: &str| (name == "Ponto").then(|| Type::Struct(point()));
        let resolved = ty.resolve_with(&lookup).unwrap();
        assert_eq!(resolved.pointee().map(|p| p.size()), Some(6));

        let missing = Type::Unresolved { name: "Nada".into() };
        assert_eq!(missing.resolve_with(&lookup), Err("Nada".to_string()));
    }
}
