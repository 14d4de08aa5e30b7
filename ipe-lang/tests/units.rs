//! Multi-unit compilation: imports, visibility, load errors

use std::cell::RefCell;
use std::rc::Rc;

use ipe_core::{Image, Machine, VmConfig};
use ipe_lang::{Compiler, CompilerConfig, Diagnostic, ErrorKind, MemoryProvider};

fn compiler(provider: MemoryProvider) -> Compiler {
    Compiler::with_provider(CompilerConfig::default(), Box::new(provider))
}

fn run(image: &Image) -> String {
    let out = Rc::new(RefCell::new(String::new()));
    let sink = out.clone();
    let mut vm = Machine::new(VmConfig::default());
    vm.load(image).unwrap();
    vm.set_printer(move |s: &str| sink.borrow_mut().push_str(s));
    vm.run().unwrap();
    let text = out.borrow().clone();
    text
}

fn compile_main(provider: MemoryProvider, main: &str) -> Result<String, Vec<Diagnostic>> {
    let mut c = compiler(provider);
    if c.compile_source("main.ipe", main) {
        Ok(run(c.image().unwrap()))
    } else {
        Err(c.diagnostics().to_vec())
    }
}

fn first_error(provider: MemoryProvider, main: &str) -> Diagnostic {
    compile_main(provider, main).unwrap_err().remove(0)
}

// ===== Visibility =====

#[test]
fn test_imported_functions_and_globals() {
    let util = "
        unidade util;
        var contador: int;
        função incrementa() { contador++; }
        contador = 10;
    ";
    let provider = MemoryProvider::new().with("util", util);
    let out = compile_main(provider, "programa p; importe util; incrementa(); escreva contador;").unwrap();
    assert_eq!(out, "11");
}

#[test]
fn test_unit_entries_run_in_registration_order() {
    let provider = MemoryProvider::new()
        .with("a", "unidade a; importe b; escreva \"a\";")
        .with("b", "unidade b; escreva \"b\";");
    let out = compile_main(provider, "escreva \"p\"; importe a;").unwrap();
    assert_eq!(out, "bap");
}

#[test]
fn test_imports_are_not_transitive() {
    let provider = MemoryProvider::new()
        .with("a", "unidade a; importe b; função viaA(): int { retorne doB(); }")
        .with("b", "unidade b; função doB(): int { retorne 2; }");

    assert_eq!(compile_main(provider.clone(), "importe a; escreva viaA();").unwrap(), "2");

    let err = first_error(provider, "importe a; escreva doB();");
    assert!(err.message.contains("undeclared function 'doB'"));
    assert_eq!(err.file, "main.ipe");
}

#[test]
fn test_imported_struct_type() {
    let geo = "
        unidade geo;
        estrutura Ponto { x: int; y: int; }
        função ponto(x: int, y: int): Ponto { var p: Ponto; p.x = x; p.y = y; retorne p; }
    ";
    let provider = MemoryProvider::new().with("geo", geo);
    let main = "importe geo; var p: Ponto = ponto(1, 2); escreva p.x + p.y;";
    assert_eq!(compile_main(provider, main).unwrap(), "3");
}

#[test]
fn test_own_globals_shadow_imported_ones() {
    let provider = MemoryProvider::new().with("u", "unidade u; var x: int = 1; função ux(): int { retorne x; }");
    let main = "importe u; var x: int = 2; escreva x, ux();";
    assert_eq!(compile_main(provider, main).unwrap(), "21");
}

#[test]
fn test_unit_strings_do_not_collide() {
    let provider = MemoryProvider::new().with("u", "unidade u; função nome(): char* { retorne \"unidade\"; }");
    let main = "importe u; escreva \"programa\", \" \", nome();";
    assert_eq!(compile_main(provider, main).unwrap(), "programa unidade");
}

// ===== Load Errors =====

#[test]
fn test_self_import_is_rejected() {
    let provider = MemoryProvider::new().with("a", "unidade a;\nimporte a;");
    let err = first_error(provider, "importe a;");
    assert!(err.message.contains("imports itself"));
    assert_eq!(err.file, "a");
    assert_eq!(err.line(), 2);
    assert_eq!(err.kind, ErrorKind::Module);
}

#[test]
fn test_import_cycle_is_rejected() {
    let provider = MemoryProvider::new()
        .with("a", "unidade a; importe b;")
        .with("b", "unidade b; importe a;");
    let err = first_error(provider, "importe a;");
    assert!(err.message.contains("import cycle: a -> b -> a"), "{}", err.message);
    assert_eq!(err.file, "b");
}

#[test]
fn test_importing_a_program_is_rejected() {
    let provider = MemoryProvider::new().with("outro", "programa outro;");
    let err = first_error(provider, "importe outro;");
    assert!(err.message.contains("cannot import program 'outro'"));
}

#[test]
fn test_missing_unit() {
    let err = first_error(MemoryProvider::new(), "programa p;\nimporte nada;");
    assert!(err.message.contains("unit 'nada' not found"));
    assert_eq!(err.file, "main.ipe");
    assert_eq!(err.line(), 2);
}

#[test]
fn test_header_must_match_import_name() {
    let provider = MemoryProvider::new().with("util", "unidade outra;");
    let err = first_error(provider, "importe util;");
    assert!(err.message.contains("declares itself as 'outra'"));
}

#[test]
fn test_builtin_sistema_can_be_disabled() {
    let config = CompilerConfig {
        builtin_sistema: false,
        ..CompilerConfig::default()
    };
    let mut c = Compiler::with_provider(config, Box::new(MemoryProvider::new()));
    assert!(!c.compile_source("main.ipe", "importe sistema;"));
    assert!(c.diagnostics()[0].message.contains("unit 'sistema' not found"));
}

#[test]
fn test_first_error_aborts_compilation() {
    let provider = MemoryProvider::new().with("u", "unidade u;\nvar a: Nada;\nvar b: Outro;");
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();

    let mut c = compiler(provider);
    c.on_diagnostic(move |d: &Diagnostic| sink.borrow_mut().push(d.to_string()));
    assert!(!c.compile_source("main.ipe", "importe u; escreva y;"));

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], "u:2: undeclared type 'Nada'");
    assert!(c.image().is_none());
}

// ===== Several Sources =====

#[test]
fn test_compile_sources_registers_by_header_name() {
    let mut c = compiler(MemoryProvider::new());
    let sources = [
        ("main.ipe", "programa p; importe matematica; escreva quadrado(9);"),
        ("matematica.ipe", "unidade matematica; função quadrado(n: int): int { retorne n * n; }"),
    ];
    assert!(c.compile_sources(&sources), "{:?}", c.diagnostics());
    assert_eq!(run(c.image().unwrap()), "81");
}

#[test]
fn test_compile_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("saudacao.ipe"),
        "unidade saudacao; função ola() { escreva \"ola\"; }",
    )
    .unwrap();
    let main = dir.path().join("main.ipe");
    std::fs::write(&main, "programa p; importe saudacao; ola();").unwrap();

    let config = CompilerConfig {
        search_root: dir.path().to_path_buf(),
        ..CompilerConfig::default()
    };
    let mut c = Compiler::new(config);
    assert!(c.compile_file(&main), "{:?}", c.diagnostics());
    assert_eq!(run(&c.take_image().unwrap()), "ola");

    let missing = dir.path().join("nada.ipe");
    assert!(!c.compile_files(&[missing]));
    assert_eq!(c.diagnostics()[0].kind, ErrorKind::Io);
}
