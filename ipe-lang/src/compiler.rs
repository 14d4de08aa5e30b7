//! Compiler driver
//!
//! Loads the program and the units it imports, runs the declare, resolve
//! and code generation passes over each unit in registration order
//! (dependencies first) and links everything into an [`Image`].
//!
//! Each compile call works on a fresh [`Session`]. The first error aborts
//! the compilation and is reported once, as a [`Diagnostic`], through the
//! hook registered with [`Compiler::on_diagnostic`].

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ipe_core::{Assembler, Image, LabelTable, Opcode};
use tracing::debug;

use crate::ast::{Item, Program, UnitKind};
use crate::codegen::{self, TopLevel, UnitContext, build_type};
use crate::error::{Diagnostic, Error, Result};
use crate::lexer::Span;
use crate::source::{FileProvider, SISTEMA, SourceProvider};
use crate::symbols::{ExternTable, Function, StringPool, Unit, VarKind, Variable};
use crate::types::{StructDef, Type, TypeSetDef};

/// Unit name of a program without a header
pub const MAIN_UNIT: &str = "main";

/// Name of the built-in unit declaring the VM natives
pub const SISTEMA_UNIT: &str = "sistema";

/// First data address handed out; address 0 stays null
const DATA_START: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Directory imported units are read from
    pub search_root: PathBuf,
    /// Source file extension, without the dot
    pub extension: String,
    /// Provide `sistema` when no source with that name exists
    pub builtin_sistema: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            search_root: PathBuf::from("."),
            extension: "ipe".to_string(),
            builtin_sistema: true,
        }
    }
}

type DiagnosticHook = Box<dyn FnMut(&Diagnostic)>;

pub struct Compiler {
    config: CompilerConfig,
    provider: Box<dyn SourceProvider>,
    hook: Option<DiagnosticHook>,
    image: Option<Image>,
    diagnostics: Vec<Diagnostic>,
    error: Option<Error>,
}

impl Compiler {
    /// Compiler reading imports from `config.search_root`
    pub fn new(config: CompilerConfig) -> Self {
        let provider = FileProvider::new(config.search_root.clone(), config.extension.clone());
        Self::with_provider(config, Box::new(provider))
    }

    pub fn with_provider(config: CompilerConfig, provider: Box<dyn SourceProvider>) -> Self {
        Self {
            config,
            provider,
            hook: None,
            image: None,
            diagnostics: Vec::new(),
            error: None,
        }
    }

    /// Register the callback that receives compile errors
    pub fn on_diagnostic(&mut self, hook: impl FnMut(&Diagnostic) + 'static) {
        self.hook = Some(Box::new(hook));
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile_source(&mut self, name: &str, text: &str) -> bool {
        self.compile_sources(&[(name, text)])
    }

    /// Compile several in-memory sources; each is registered under its header name
    pub fn compile_sources(&mut self, sources: &[(&str, &str)]) -> bool {
        self.image = None;
        self.error = None;
        self.diagnostics.clear();

        let result = Session::new(&self.config, self.provider.as_mut()).run(sources);
        match result {
            Ok(image) => {
                self.image = Some(image);
                true
            }
            Err(failure) => {
                self.report(failure);
                false
            }
        }
    }

    pub fn compile_file(&mut self, path: &Path) -> bool {
        self.compile_files(&[path.to_path_buf()])
    }

    pub fn compile_files(&mut self, paths: &[PathBuf]) -> bool {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path.display().to_string();
            match std::fs::read_to_string(path) {
                Ok(text) => sources.push((name, text)),
                Err(e) => {
                    self.image = None;
                    self.diagnostics.clear();
                    let error = Error::IoError {
                        message: format!("{}: {}", name, e),
                    };
                    self.report(Failure::new(&name, error));
                    return false;
                }
            }
        }
        let borrowed: Vec<(&str, &str)> = sources.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
        self.compile_sources(&borrowed)
    }

    /// Image of the last successful compilation
    pub fn image(&self) -> Option<&Image> {
        self.image.as_ref()
    }

    pub fn take_image(&mut self) -> Option<Image> {
        self.image.take()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Error behind the last failed compilation
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    fn report(&mut self, failure: Failure) {
        let diagnostic = Diagnostic::new(&failure.file, &failure.error);
        debug!(%diagnostic, "compilation failed");
        if let Some(hook) = self.hook.as_mut() {
            hook(&diagnostic);
        }
        self.diagnostics.push(diagnostic);
        self.error = Some(failure.error);
    }
}

/// An error and the file it belongs to
#[derive(Debug)]
struct Failure {
    file: String,
    error: Error,
}

impl Failure {
    fn new(file: &str, error: Error) -> Self {
        Self {
            file: file.to_string(),
            error,
        }
    }
}

type Outcome<T> = std::result::Result<T, Failure>;

trait InFile<T> {
    fn in_file(self, file: &str) -> Outcome<T>;
}

impl<T> InFile<T> for Result<T> {
    fn in_file(self, file: &str) -> Outcome<T> {
        self.map_err(|error| Failure::new(file, error))
    }
}

/// A parsed source waiting to be registered
struct Parsed {
    file: String,
    program: Program,
}

/// State of one compile call
struct Session<'c> {
    config: &'c CompilerConfig,
    provider: &'c mut dyn SourceProvider,
    /// Sources given explicitly, by unit name
    pending: HashMap<String, Parsed>,
    labels: LabelTable,
    externs: ExternTable,
    units: Vec<Unit>,
    index: HashMap<String, usize>,
    /// Units whose imports are being loaded
    loading: Vec<String>,
    pools: Vec<StringPool>,
    bodies: Vec<Assembler>,
    /// Next free data address
    cursor: u32,
}

impl<'c> Session<'c> {
    fn new(config: &'c CompilerConfig, provider: &'c mut dyn SourceProvider) -> Self {
        Self {
            config,
            provider,
            pending: HashMap::new(),
            labels: LabelTable::new(),
            externs: ExternTable::new(),
            units: Vec::new(),
            index: HashMap::new(),
            loading: Vec::new(),
            pools: Vec::new(),
            bodies: Vec::new(),
            cursor: DATA_START,
        }
    }

    fn run(mut self, sources: &[(&str, &str)]) -> Outcome<Image> {
        let mut roots = Vec::with_capacity(sources.len());
        let mut program: Option<String> = None;

        for &(file, text) in sources {
            let ast = crate::parse(text).in_file(file)?;
            let name = ast.header.name.clone().unwrap_or_else(|| MAIN_UNIT.to_string());
            if ast.header.kind == UnitKind::Program {
                if let Some(first) = &program {
                    let message = format!("more than one program: '{}' and '{}'", first, name);
                    return Err(Failure::new(file, Error::module(message, ast.header.span)));
                }
                program = Some(name.clone());
            }
            if roots.contains(&name) {
                let message = format!("unit '{}' is given twice", name);
                return Err(Failure::new(file, Error::module(message, ast.header.span)));
            }
            self.pending.insert(
                name.clone(),
                Parsed {
                    file: file.to_string(),
                    program: ast,
                },
            );
            roots.push(name);
        }

        for name in &roots {
            self.load_unit(name, None)?;
        }

        let program = program.and_then(|name| self.index.get(&name).copied());
        self.link(program).in_file(program.map_or(MAIN_UNIT, |i| self.units[i].name.as_str()))
    }

    // ===== Loading =====

    /// Load, compile and register `name` once; `site` is the importing file and span
    fn load_unit(&mut self, name: &str, site: Option<(&str, Span)>) -> Outcome<usize> {
        if let Some(&index) = self.index.get(name) {
            return Ok(index);
        }
        if let Some(start) = self.loading.iter().position(|n| n == name) {
            let mut chain = self.loading[start..].to_vec();
            chain.push(name.to_string());
            let (file, span) = site.unwrap_or((name, Span::dummy()));
            let message = format!("import cycle: {}", chain.join(" -> "));
            return Err(Failure::new(file, Error::module(message, span)));
        }

        let Parsed { file, program } = self.fetch(name, site)?;

        if let Some((_, span)) = site {
            if program.header.kind == UnitKind::Program {
                let message = format!("cannot import program '{}'", name);
                return Err(Failure::new(&file, Error::module(message, span)));
            }
        }
        if let Some(declared) = &program.header.name {
            if declared != name {
                let message = format!("unit '{}' declares itself as '{}'", name, declared);
                return Err(Failure::new(&file, Error::module(message, program.header.span)));
            }
        }
        debug!(unit = %name, file = %file, "unit loaded");

        self.loading.push(name.to_string());
        let imports = self.load_imports(name, &file, &program);
        self.loading.pop();
        let imports = imports?;

        let index = self.compile_unit(name, &file, &program, imports)?;
        self.index.insert(name.to_string(), index);
        Ok(index)
    }

    fn load_imports(&mut self, name: &str, file: &str, program: &Program) -> Outcome<Vec<usize>> {
        let mut imports = Vec::new();
        for item in &program.items {
            let Item::Import { names, .. } = item else {
                continue;
            };
            for (import, span) in names {
                if import == name {
                    let message = format!("unit '{}' imports itself", name);
                    return Err(Failure::new(file, Error::module(message, *span)));
                }
                let index = self.load_unit(import, Some((file, *span)))?;
                if !imports.contains(&index) {
                    imports.push(index);
                }
            }
        }
        Ok(imports)
    }

    /// Explicit sources first, then the provider, then the built-in `sistema`
    fn fetch(&mut self, name: &str, site: Option<(&str, Span)>) -> Outcome<Parsed> {
        if let Some(parsed) = self.pending.remove(name) {
            return Ok(parsed);
        }

        let file = self.provider.display_name(name);
        let text = match self.provider.load(name).in_file(&file)? {
            Some(text) => Some(text),
            None if name == SISTEMA_UNIT && self.config.builtin_sistema => Some(SISTEMA.to_string()),
            None => None,
        };

        match text {
            Some(text) => {
                let program = crate::parse(&text).in_file(&file)?;
                Ok(Parsed { file, program })
            }
            None => {
                let (importer, span) = site.unwrap_or((name, Span::dummy()));
                let message = format!("unit '{}' not found", name);
                Err(Failure::new(importer, Error::module(message, span)))
            }
        }
    }

    // ===== Passes =====

    fn compile_unit(&mut self, name: &str, file: &str, program: &Program, imports: Vec<usize>) -> Outcome<usize> {
        let mut unit = Unit::new(name, program.header.kind);
        unit.imports = imports;

        declare(&mut unit, program, &self.units, &mut self.labels).in_file(file)?;
        resolve(&mut unit, program, &self.units).in_file(file)?;
        unit.global_start = self.cursor;
        unit.layout_globals();

        let index = self.units.len();
        self.units.push(unit);
        self.generate(index, program).in_file(file)?;

        let unit = &self.units[index];
        debug!(
            unit = %unit.name,
            globals = unit.globals_size,
            functions = unit.functions.len(),
            "unit compiled"
        );
        Ok(index)
    }

    /// Compile every function body and the unit entry point
    fn generate(&mut self, index: usize, program: &Program) -> Result<()> {
        let units = &self.units;
        let unit = &units[index];
        let mut pool = StringPool::new(unit.global_start + unit.globals_size);

        let mut ctx = UnitContext {
            unit,
            imports: unit.imports.iter().map(|&i| &units[i]).collect(),
            strings: &mut pool,
            externs: &mut self.externs,
            labels: &mut self.labels,
        };

        let mut code = Vec::new();
        for item in &program.items {
            match item {
                Item::Function(decl) => {
                    let Some(body) = decl.body.as_deref().filter(|_| !decl.is_extern) else {
                        continue;
                    };
                    let function = unit
                        .function(&decl.name)
                        .ok_or_else(|| Error::internal(format!("function '{}' was not declared", decl.name)))?;
                    self.bodies.push(codegen::compile_function(&mut ctx, function, body)?);
                }
                Item::Var(decl) if decl.init.is_some() => code.push(TopLevel::Init(decl)),
                Item::Stmt(stmt) => code.push(TopLevel::Stmt(stmt)),
                _ => {}
            }
        }
        if let Some(entry) = unit.entry {
            self.bodies.push(codegen::compile_entry(&mut ctx, entry, &code)?);
        }

        self.cursor = (pool.base() + pool.bytes().len() as u32).next_multiple_of(4);
        self.pools.push(pool);
        Ok(())
    }

    /// Entry sequence, function bodies and data segment
    fn link(&mut self, program: Option<usize>) -> Result<Image> {
        let mut main = self.labels.assembler();
        let entries = self
            .units
            .iter()
            .enumerate()
            .filter(|&(i, _)| Some(i) != program)
            .chain(program.map(|i| (i, &self.units[i])))
            .filter_map(|(_, unit)| unit.entry);
        for entry in entries {
            main.emit_jump(&mut self.labels, Opcode::Call, entry);
        }
        main.op(Opcode::Halt);

        for body in self.bodies.drain(..) {
            main.splice(&mut self.labels, body);
        }
        self.labels.ensure_resolved()?;

        let mut bytes = vec![0u8; self.cursor as usize];
        for pool in &self.pools {
            let start = pool.base() as usize;
            bytes[start..start + pool.bytes().len()].copy_from_slice(pool.bytes());
        }
        let data_size = self.cursor;
        bytes.extend_from_slice(main.bytes());

        let externs = std::mem::take(&mut self.externs).into_entries();
        debug!(
            data = data_size,
            code = bytes.len() as u32 - data_size,
            externs = externs.len(),
            units = self.units.len(),
            "image linked"
        );
        Ok(Image {
            data_size,
            bytes,
            externs,
        })
    }
}

// ===== Declare =====

/// Named type visible from `unit`: its own, then its direct imports
fn named_type(unit: &Unit, units: &[Unit], name: &str) -> Option<Type> {
    unit.named_type(name)
        .or_else(|| unit.imports.iter().find_map(|&i| units[i].named_type(name)))
}

/// Register the unit's declarations in source order; later type names stay `Unresolved`
fn declare(unit: &mut Unit, program: &Program, units: &[Unit], labels: &mut LabelTable) -> Result<()> {
    let mut has_code = false;

    for item in &program.items {
        match item {
            Item::Import { .. } => {}
            Item::Struct { name, fields, span } => {
                let def = Rc::new(StructDef::new(name, &unit.name, *span));
                unit.declare_struct(def.clone())?;
                for field in fields {
                    if def.field(&field.name).is_some() {
                        return Err(Error::semantic(
                            format!("field '{}' is declared twice in '{}'", field.name, name),
                            field.span,
                        ));
                    }
                    let ty = build_type(&field.ty, &|n: &str| named_type(unit, units, n))?;
                    def.fields
                        .borrow_mut()
                        .push(Variable::new(&field.name, ty, field.span, VarKind::Field, 0));
                }
            }
            Item::TypeAlias { name, ty, span } => {
                let aliased = build_type(ty, &|n: &str| named_type(unit, units, n))?;
                unit.declare_typeset(Rc::new(TypeSetDef::new(name, &unit.name, aliased)), *span)?;
            }
            Item::Var(decl) => {
                let ty = build_type(&decl.ty, &|n: &str| named_type(unit, units, n))?;
                for (name, span) in &decl.names {
                    unit.declare_global(Variable::new(name, ty.clone(), *span, VarKind::Global, 0))?;
                }
                has_code |= decl.init.is_some();
            }
            Item::Function(decl) => {
                let mut params = Vec::with_capacity(decl.params.len());
                for param in &decl.params {
                    let ty = build_type(&param.ty, &|n: &str| named_type(unit, units, n))?;
                    let kind = VarKind::Parameter { by_ref: param.by_ref };
                    params.push(Variable::new(&param.name, ty, param.span, kind, 0));
                }
                let ret = match &decl.ret {
                    Some(ty) => build_type(ty, &|n: &str| named_type(unit, units, n))?,
                    None => Type::Void,
                };
                unit.declare_function(Function {
                    name: decl.name.clone(),
                    params,
                    ret,
                    entry: labels.create(),
                    ret_label: labels.create(),
                    param_size: 0,
                    frame_size: Cell::new(0),
                    is_extern: decl.is_extern,
                    span: decl.span,
                })?;
            }
            Item::Stmt(_) => has_code = true,
        }
    }

    if has_code {
        unit.entry = Some(labels.create());
    }
    Ok(())
}

// ===== Resolve =====

fn resolve_in(ty: &Type, span: Span, lookup: &dyn Fn(&str) -> Option<Type>) -> Result<Type> {
    ty.resolve_with(lookup)
        .map_err(|name| Error::semantic(format!("undeclared type '{}'", name), span))
}

/// Rewrite `Unresolved` names, lay out structures and parameters
fn resolve(unit: &mut Unit, program: &Program, units: &[Unit]) -> Result<()> {
    let (globals, signatures) = {
        let view: &Unit = unit;
        let lookup = |n: &str| named_type(view, units, n);
        resolve_named_types(view, program, &lookup)?;

        let globals = view
            .globals
            .iter()
            .map(|var| {
                let ty = resolve_in(&var.ty, var.span, &lookup)?;
                if ty.is_void() {
                    return Err(Error::semantic("variables cannot be 'void'", var.span));
                }
                Ok(ty)
            })
            .collect::<Result<Vec<_>>>()?;

        let signatures = view
            .functions
            .iter()
            .map(|function| {
                let params = function
                    .params
                    .iter()
                    .map(|param| {
                        let ty = resolve_in(&param.ty, param.span, &lookup)?;
                        if ty.is_void() {
                            return Err(Error::semantic(
                                format!("parameter '{}' cannot be 'void'", param.name),
                                param.span,
                            ));
                        }
                        Ok(ty)
                    })
                    .collect::<Result<Vec<_>>>()?;
                let ret = resolve_in(&function.ret, function.span, &lookup)?;
                Ok((params, ret))
            })
            .collect::<Result<Vec<_>>>()?;
        (globals, signatures)
    };

    for (var, ty) in unit.globals.iter_mut().zip(globals) {
        var.ty = ty;
    }
    for (function, (params, ret)) in unit.functions.iter_mut().zip(signatures) {
        for (param, ty) in function.params.iter_mut().zip(params) {
            param.ty = ty;
        }
        function.ret = ret;
        function.layout_params();
    }
    Ok(())
}

fn resolve_named_types(unit: &Unit, program: &Program, lookup: &dyn Fn(&str) -> Option<Type>) -> Result<()> {
    for item in &program.items {
        if let Item::TypeAlias { name, ty, .. } = item {
            if let Some(def) = unit.typesets.get(name) {
                let resolved = resolve_in(&def.aliased.borrow(), ty.span, lookup)?;
                *def.aliased.borrow_mut() = resolved;
            }
        }
    }
    for item in &program.items {
        if let Item::TypeAlias { name, span, .. } = item {
            if let Some(def) = unit.typesets.get(name) {
                if alias_contains(def, &def.aliased.borrow(), &mut Vec::new()) {
                    return Err(Error::semantic(
                        format!("type '{}' is defined in terms of itself", name),
                        *span,
                    ));
                }
            }
        }
    }

    for item in &program.items {
        if let Item::Struct { name, .. } = item {
            if let Some(def) = unit.structs.get(name) {
                for field in def.fields.borrow_mut().iter_mut() {
                    field.ty = resolve_in(&field.ty, field.span, lookup)?;
                    if field.ty.is_void() {
                        return Err(Error::semantic(
                            format!("field '{}' cannot be 'void'", field.name),
                            field.span,
                        ));
                    }
                }
            }
        }
    }
    for item in &program.items {
        if let Item::Struct { name, .. } = item {
            if let Some(def) = unit.structs.get(name) {
                layout_struct(def, &mut Vec::new())?;
            }
        }
    }
    Ok(())
}

/// Does `ty` hold `target` by value through aliases and array elements?
fn alias_contains(target: &Rc<TypeSetDef>, ty: &Type, seen: &mut Vec<Rc<TypeSetDef>>) -> bool {
    match ty {
        Type::TypeSet(def) => {
            if Rc::ptr_eq(def, target) {
                return true;
            }
            if seen.iter().any(|s| Rc::ptr_eq(s, def)) {
                return false;
            }
            seen.push(def.clone());
            let aliased = def.aliased.borrow().clone();
            alias_contains(target, &aliased, seen)
        }
        Type::Array { element, .. } => alias_contains(target, element, seen),
        _ => false,
    }
}

/// Structure held by value, directly or as array element
fn by_value_struct(ty: &Type) -> Option<Rc<StructDef>> {
    match ty.unaliased() {
        Type::Struct(def) => Some(def),
        Type::Array { element, .. } => by_value_struct(&element),
        _ => None,
    }
}

/// Sequential field offsets without padding
fn layout_struct(def: &Rc<StructDef>, visiting: &mut Vec<Rc<StructDef>>) -> Result<()> {
    if def.size.get().is_some() {
        return Ok(());
    }
    if visiting.iter().any(|d| Rc::ptr_eq(d, def)) {
        return Err(Error::semantic(
            format!("structure '{}' contains itself", def.name),
            def.span,
        ));
    }

    visiting.push(def.clone());
    let nested: Vec<Rc<StructDef>> = def.fields.borrow().iter().filter_map(|f| by_value_struct(&f.ty)).collect();
    for inner in &nested {
        layout_struct(inner, visiting)?;
    }
    visiting.pop();

    let mut offset = 0u32;
    for field in def.fields.borrow_mut().iter_mut() {
        field.offset = offset as i32;
        offset += field.ty.size();
    }
    def.size.set(Some(offset));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryProvider;
    use std::cell::RefCell;

    fn compiler(provider: MemoryProvider) -> Compiler {
        Compiler::with_provider(CompilerConfig::default(), Box::new(provider))
    }

    #[test]
    fn test_compile_minimal_program() {
        let mut c = compiler(MemoryProvider::new());
        assert!(c.compile_source("main.ipe", "programa p;"));
        let image = c.take_image().unwrap();
        assert_eq!(image.data_size, DATA_START);
        assert_eq!(image.code(), &[Opcode::Halt as u8]);
        assert!(c.image().is_none());
    }

    #[test]
    fn test_strings_follow_globals() {
        let mut c = compiler(MemoryProvider::new());
        assert!(c.compile_source("main.ipe", "programa p; var a: long; escreva \"ok\";"));
        let image = c.image().unwrap();
        // 4 null bytes, 8 for `a`, then "ok\0" in UTF-16
        assert_eq!(image.data_size, 20);
        assert_eq!(&image.data()[12..18], &[b'o', 0, b'k', 0, 0, 0]);
    }

    #[test]
    fn test_hook_receives_first_error_once() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut c = compiler(MemoryProvider::new());
        c.on_diagnostic(move |d: &Diagnostic| sink.borrow_mut().push(d.clone()));

        let ok = c.compile_source("main.ipe", "programa p;\nescreva y;\nescreva z;");
        assert!(!ok);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].file, "main.ipe");
        assert_eq!(seen[0].line(), 2);
        assert!(seen[0].message.contains("'y'"));
        assert_eq!(c.diagnostics().len(), 1);
        assert!(c.image().is_none());
    }

    #[test]
    fn test_each_call_starts_fresh() {
        let mut c = compiler(MemoryProvider::new());
        assert!(!c.compile_source("a.ipe", "programa p; escreva x;"));
        assert!(c.compile_source("b.ipe", "programa p; var x: int; escreva x;"));
        assert!(c.diagnostics().is_empty());
        assert!(c.error().is_none());
    }

    #[test]
    fn test_forward_struct_reference() {
        let source = "programa p;
            var n: No;
            estrutura No { valor: int; prox: No*; }
            n.valor = 7;
            n.prox = &n;
            escreva n.prox.valor;";
        let mut c = compiler(MemoryProvider::new());
        assert!(c.compile_source("main.ipe", source), "{:?}", c.diagnostics());
    }

    #[test]
    fn test_struct_containing_itself_is_rejected() {
        let mut c = compiler(MemoryProvider::new());
        assert!(!c.compile_source("main.ipe", "programa p; estrutura A { b: B; } estrutura B { a: A[2]; }"));
        assert!(c.diagnostics()[0].message.contains("contains itself"));
    }

    #[test]
    fn test_alias_cycle_is_rejected() {
        let mut c = compiler(MemoryProvider::new());
        assert!(!c.compile_source("main.ipe", "programa p; tipo A = B; tipo B = A[3];"));
        assert!(c.diagnostics()[0].message.contains("in terms of itself"));
    }

    #[test]
    fn test_undeclared_type() {
        let mut c = compiler(MemoryProvider::new());
        assert!(!c.compile_source("main.ipe", "programa p; var x: Nada;"));
        assert!(c.diagnostics()[0].message.contains("undeclared type 'Nada'"));
    }

    #[test]
    fn test_struct_layout_has_no_padding() {
        let mut unit = Unit::new("main", UnitKind::Program);
        let program = crate::parse("unidade main; estrutura S { a: byte; b: long; c: char; }").unwrap();
        let mut labels = LabelTable::new();
        declare(&mut unit, &program, &[], &mut labels).unwrap();
        resolve(&mut unit, &program, &[]).unwrap();

        let def = unit.structs.get("S").unwrap();
        assert_eq!(def.size.get(), Some(11));
        assert_eq!(def.field("b").map(|f| f.offset), Some(1));
        assert_eq!(def.field("c").map(|f| f.offset), Some(9));
    }

    #[test]
    fn test_two_programs_are_rejected() {
        let mut c = compiler(MemoryProvider::new());
        assert!(!c.compile_sources(&[("a.ipe", "programa a;"), ("b.ipe", "programa b;")]));
        assert!(c.diagnostics()[0].message.contains("more than one program"));
    }
}
