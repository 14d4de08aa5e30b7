//! Programs compiled from source and run on the machine
//!
//! Output is captured one print call at a time, so `escreva a, b` shows up
//! as two entries.

use std::cell::RefCell;
use std::rc::Rc;

use ipe_core::{
    DivisionByZero, Image, Machine, NativeCall, ScanFailure, ShiftRight64, VmConfig, VmError, VmResult,
};
use ipe_lang::compile;

fn machine(image: &Image, config: VmConfig) -> (Machine, Rc<RefCell<Vec<String>>>) {
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = out.clone();
    let mut vm = Machine::new(config);
    vm.load(image).unwrap();
    vm.set_printer(move |s: &str| sink.borrow_mut().push(s.to_string()));
    (vm, out)
}

fn run_with(source: &str, config: VmConfig) -> VmResult<Vec<String>> {
    let image = compile(source).unwrap_or_else(|e| panic!("{}", e));
    let (mut vm, out) = machine(&image, config);
    vm.run()?;
    let printed = out.take();
    Ok(printed)
}

fn prints(source: &str) -> Vec<String> {
    run_with(source, VmConfig::default()).unwrap()
}

fn output(source: &str) -> String {
    prints(source).concat()
}

fn compile_error(source: &str) -> String {
    compile(source).unwrap_err().to_string()
}

// ===== Scenarios =====

#[test]
fn test_scenario_a_function_call() {
    let source = "
        programa soma;
        função soma(a: int, b: int): int { retorne a + b; }
        escreva soma(2, 3);
    ";
    assert_eq!(prints(source), vec!["5"]);
}

#[test]
fn test_scenario_b_for_loop() {
    let source = "programa p; para (var i: int = 0; i < 3; i++) escreva i;";
    assert_eq!(prints(source), vec!["0", "1", "2"]);
}

#[test]
fn test_scenario_c_struct_fields() {
    let source = "
        programa p;
        estrutura Par { primeiro: int; segundo: int; }
        var par: Par;
        par.primeiro = 11;
        par.segundo = -22;
        escreva par.primeiro, par.segundo;
        escreva cast<int>(&par.segundo) - cast<int>(&par);
    ";
    assert_eq!(prints(source), vec!["11", "-22", "4"]);
}

#[test]
fn test_scenario_d_compound_assignment() {
    assert_eq!(output("programa p; var x: int = 5; x += 2; escreva x;"), "7");
    assert_eq!(output("programa p; var x: byte = 250; x += 10; escreva x;"), "4");
}

// ===== Arithmetic =====

#[test]
fn test_promotion_of_small_integers() {
    let source = "programa p; var b: byte = 200; var s: short = 1000; escreva b + s;";
    assert_eq!(output(source), "1200");
}

#[test]
fn test_int_widens_to_long() {
    let source = "programa p; var i: int = 2000000000; var l: long = i; escreva l * 3;";
    assert_eq!(output(source), "6000000000");
}

#[test]
fn test_mixed_int_and_double() {
    assert_eq!(output("programa p; escreva 7 / 2.0;"), "3.5");
    assert_eq!(output("programa p; var f: float = 1.5; escreva f * 2.0f;"), "3");
}

#[test]
fn test_narrowing_needs_cast() {
    let err = compile_error("programa p; var l: long = 5L; var i: int = l;");
    assert!(err.contains("long"), "{}", err);
    assert_eq!(output("programa p; var l: long = 300L; escreva cast<byte>(l);"), "44");
}

#[test]
fn test_char_arithmetic_through_casts() {
    let source = "programa p; var c: char = 'a'; escreva cast<char>(cast<int>(c) + 1);";
    assert_eq!(output(source), "b");
}

#[test]
fn test_compound_target_evaluated_once() {
    let source = "
        programa p;
        var a: int[3];
        var chamadas: int = 0;
        função indice(): int { chamadas++; retorne 1; }
        a[indice()] += 5;
        a[indice()]++;
        escreva chamadas, \" \", a[1];
    ";
    assert_eq!(output(source), "2 6");
}

#[test]
fn test_increment_forms() {
    let source = "programa p; var i: int = 1; escreva i++; escreva ++i; escreva i--; escreva i;";
    assert_eq!(prints(source), vec!["1", "3", "3", "2"]);
}

// ===== Pointers and Arrays =====

#[test]
fn test_pointer_arithmetic_scales_by_element() {
    let source = "
        programa p;
        var v: long[4];
        var p: long* = &v[0];
        var q: long* = p + 3;
        escreva cast<int>(q) - cast<int>(p), \" \", q - p;
    ";
    assert_eq!(output(source), "24 3");
}

#[test]
fn test_void_pointer_arithmetic_is_rejected() {
    let err = compile_error("programa p; var p: void*; var q: void* = p + 1;");
    assert!(err.contains("pointer arithmetic"), "{}", err);
}

#[test]
fn test_write_through_pointer() {
    let source = "programa p; var x: int = 1; var p: int* = &x; *p = 42; escreva x;";
    assert_eq!(output(source), "42");
}

#[test]
fn test_matrix_is_row_major() {
    let source = "
        programa p;
        var m: int[2][3];
        para (var i: int = 0; i < 2; i++)
            para (var j: int = 0; j < 3; j++)
                m[i, j] = i * 10 + j;
        escreva m[1][2], \" \", cast<int>(&m[1, 0]) - cast<int>(&m[0, 0]);
    ";
    assert_eq!(output(source), "12 12");
}

#[test]
fn test_address_of_nested_places() {
    let source = "
        programa p;
        estrutura Par { a: int; b: int; }
        var v: Par[3];
        var q: Par* = &v[0];
        var r: int* = &v[2].b;
        *r = 9;
        escreva v[2].b, \" \", cast<int>(r) - cast<int>(q), \" \", cast<int>(&(*q).b) - cast<int>(q);
    ";
    assert_eq!(output(source), "9 20 4");
}

#[test]
fn test_null_pointer_comparison() {
    let source = "programa p; var p: int* = nulo; se (p == nulo) escreva \"nulo\";";
    assert_eq!(output(source), "nulo");
}

// ===== Control Flow =====

#[test]
fn test_short_circuit() {
    let source = "
        programa p;
        função efeito(): bool { escreva \"x\"; retorne verdadeiro; }
        se (falso && efeito()) escreva \"a\";
        se (verdadeiro || efeito()) escreva \"b\";
        se (verdadeiro && efeito()) escreva \"c\";
    ";
    assert_eq!(output(source), "bxc");
}

#[test]
fn test_recursion() {
    let source = "
        programa p;
        função fatorial(n: long): long {
            se (n <= 1L) retorne 1L;
            retorne n * fatorial(n - 1L);
        }
        escreva fatorial(20L);
    ";
    assert_eq!(output(source), "2432902008176640000");
}

// ===== Calls =====

#[test]
fn test_by_ref_parameters() {
    let source = "
        programa p;
        função troca(ref a: int, ref b: int) { var t: int = a; a = b; b = t; }
        var x: int = 1;
        var y: int = 2;
        troca(x, y);
        escreva x, y;
    ";
    assert_eq!(output(source), "21");
}

#[test]
fn test_by_ref_requires_matching_type() {
    let source = "
        programa p;
        função zera(ref a: int) { a = 0; }
        var s: short;
        zera(s);
    ";
    assert!(compile_error(source).contains("ref a"));
}

#[test]
fn test_struct_returned_by_value() {
    let source = "
        programa p;
        estrutura Ponto { x: int; y: long; }
        função ponto(x: int, y: long): Ponto {
            var r: Ponto;
            r.x = x;
            r.y = y;
            retorne r;
        }
        var q: Ponto = ponto(3, 40000000000L);
        escreva q.x, \" \", q.y, \" \", ponto(7, 8L).x;
    ";
    assert_eq!(output(source), "3 40000000000 7");
}

#[test]
fn test_array_passed_by_value_is_copied() {
    let source = "
        programa p;
        função altera(v: int[2]): int { v[0] = 99; retorne v[0]; }
        var a: int[2];
        a[0] = 1;
        escreva altera(a), \" \", a[0];
    ";
    assert_eq!(output(source), "99 1");
}

#[test]
fn test_arity_mismatch() {
    let source = "programa p; função f(a: int) {} f(1, 2);";
    assert!(compile_error(source).contains("expects 1 arguments, got 2"));
}

#[test]
fn test_return_checks() {
    assert!(compile_error("programa p; função f() { retorne 1; }").contains("void function"));
    assert!(compile_error("programa p; função f(): int { retorne; }").contains("missing return value"));
}

// ===== Natives =====

#[test]
fn test_sistema_string_natives() {
    let source = "
        programa p;
        importe sistema;
        var s: char[32];
        copie(s, \"ola\");
        concatene(s, \", mundo\");
        escreva s, \" \", tamanho(s), \" \", compare(s, \"ola, mundo\");
    ";
    assert_eq!(output(source), "ola, mundo 10 0");
}

#[test]
fn test_sistema_conversions() {
    let source = "
        programa p;
        importe sistema;
        var texto: char[16];
        inteiroParaTexto(-42, texto);
        escreva texto, \" \", paraInteiro(\"17\") + 1, \" \", paraLongo(\"9000000000\");
    ";
    assert_eq!(output(source), "-42 18 9000000000");
}

fn triple(call: &mut NativeCall<'_>) -> VmResult<()> {
    let value = call.arg_i32(0)?;
    call.ret_i32(value * 3)
}

#[test]
fn test_host_native() {
    let source = "programa p; externa função triplo(v: int): int; escreva triplo(14);";
    let image = compile(source).unwrap();
    assert_eq!(image.externs[0].name, "triplo");
    assert_eq!(image.externs[0].param_bytes, 4);

    let (mut vm, out) = machine(&image, VmConfig::default());
    assert!(matches!(vm.run(), Err(VmError::UnboundExtern { .. })));

    let (mut vm, out2) = machine(&image, VmConfig::default());
    vm.bind_native("triplo", triple);
    vm.run().unwrap();
    assert!(out.borrow().is_empty());
    assert_eq!(out2.take(), vec!["42"]);
}

// ===== Input =====

#[test]
fn test_read_values() {
    let image = compile("programa p; var n: int; var nome: char[8]; leia n, nome; escreva n * 2, nome;").unwrap();
    let (mut vm, out) = machine(&image, VmConfig::default());
    let mut lines = vec!["maria".to_string(), "21".to_string()];
    vm.set_reader(move || lines.pop().unwrap_or_default());
    vm.run().unwrap();
    assert_eq!(out.take(), vec!["42", "maria"]);
}

// ===== Policies =====

#[test]
fn test_division_by_zero_policy() {
    let source = "programa p; var z: int = 0; escreva 10 / z;";
    let trapped = run_with(source, VmConfig::default());
    assert!(matches!(trapped, Err(VmError::DivisionByZero { .. })));

    let zeroed = run_with(source, VmConfig::default().with_division_by_zero(DivisionByZero::Zero));
    assert_eq!(zeroed.unwrap(), vec!["0"]);
}

#[test]
fn test_shift_right_64_policy() {
    let source = "programa p; var a: long = -16L; escreva a >> 2;";
    assert_eq!(prints(source), vec!["-4"]);

    let quirk = VmConfig::default().with_shift_right_64(ShiftRight64::LeftShiftQuirk);
    assert_eq!(run_with(source, quirk).unwrap(), vec!["-64"]);
}

#[test]
fn test_scan_failure_policy() {
    let image = compile("programa p; var n: int = 5; leia n; escreva n;").unwrap();

    let (mut vm, out) = machine(&image, VmConfig::default());
    vm.set_reader(|| "abc".to_string());
    vm.run().unwrap();
    assert_eq!(out.take(), vec!["0"]);

    let config = VmConfig {
        scan_failure: ScanFailure::Fault,
        ..VmConfig::default()
    };
    let (mut vm, _) = machine(&image, config);
    vm.set_reader(|| "abc".to_string());
    assert!(matches!(vm.run(), Err(VmError::ScanParse { .. })));
}

// ===== Images =====

#[test]
fn test_image_serialization_round_trip() {
    let image = compile("programa p; var s: char[8]; escrevaln \"ola\", 1 + 2;").unwrap();
    let decoded = Image::from_bytes(&image.to_bytes()).unwrap();
    assert_eq!(decoded, image);

    let (mut vm, out) = machine(&decoded, VmConfig::default());
    vm.run().unwrap();
    assert_eq!(out.take(), vec!["ola", "3", "\n"]);
}
