//! # Compiler Benchmarks
//!
//! Measures lexing, parsing and full compilation to an image.
//!
//! Run: `cargo bench --bench compile_bench`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ipe_lang::{Compiler, CompilerConfig, Lexer, MemoryProvider, compile, parse};

const FIBONACCI: &str = "
programa fib;
função fib(n: int): int {
    se (n < 2) retorne n;
    retorne fib(n - 1) + fib(n - 2);
}
escreva fib(20);
";

/// Program with `n` small functions and a loop calling each one
fn generated_program(n: usize) -> String {
    let mut source = String::from("programa gerado;\n");
    for i in 0..n {
        source.push_str(&format!(
            "função f{i}(a: int, b: long): long {{ var t: long = a * {i}; retorne t + b; }}\n"
        ));
    }
    source.push_str("var total: long = 0L;\n");
    for i in 0..n {
        source.push_str(&format!("total += f{i}({i}, total);\n"));
    }
    source.push_str("escreva total;\n");
    source
}

fn bench_front_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("front_end");

    group.bench_function("tokenize_fibonacci", |b| {
        b.iter(|| black_box(Lexer::new(black_box(FIBONACCI)).tokenize_with_spans()))
    });

    group.bench_function("parse_fibonacci", |b| {
        b.iter(|| black_box(parse(black_box(FIBONACCI))))
    });

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for size in [10, 100, 500] {
        let source = generated_program(size);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("functions", size), &source, |b, source| {
            b.iter(|| black_box(compile(source)))
        });
    }

    group.finish();
}

fn bench_units(c: &mut Criterion) {
    let provider = MemoryProvider::new()
        .with("util", "unidade util; função dobro(x: int): int { retorne x * 2; }")
        .with("texto", "unidade texto; importe sistema; função vazio(s: char*): bool { retorne tamanho(s) == 0; }");
    let main = "programa p; importe util; importe texto; escreva dobro(21), vazio(\"\");";

    c.bench_function("compile_with_units", |b| {
        b.iter(|| {
            let mut compiler = Compiler::with_provider(CompilerConfig::default(), Box::new(provider.clone()));
            black_box(compiler.compile_source("main.ipe", main))
        })
    });
}

criterion_group!(benches, bench_front_end, bench_compile, bench_units);
criterion_main!(benches);
