//! # VM Benchmarks
//!
//! Measures image loading and execution of compiled programs.
//!
//! Run: `cargo bench --bench vm_bench`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ipe_core::{Image, Machine, VmConfig};
use ipe_lang::compile;

fn quiet_machine(image: &Image) -> Machine {
    let mut vm = Machine::new(VmConfig::default());
    vm.set_printer(|_: &str| {});
    vm.load(image).unwrap();
    vm
}

fn bench_recursion(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursion");

    for n in [10, 15, 20] {
        let source = format!(
            "programa fib;
             função fib(n: int): int {{ se (n < 2) retorne n; retorne fib(n - 1) + fib(n - 2); }}
             escreva fib({n});"
        );
        let image = compile(&source).unwrap();
        group.bench_with_input(BenchmarkId::new("fib", n), &image, |b, image| {
            b.iter(|| {
                let mut vm = quiet_machine(image);
                black_box(vm.run().unwrap())
            })
        });
    }

    group.finish();
}

fn bench_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("loops");

    let sum = compile(
        "programa soma;
         var total: long = 0L;
         para (var i: int = 0; i < 10000; i++) total += i;
         escreva total;",
    )
    .unwrap();
    group.bench_function("sum_10k", |b| {
        b.iter(|| {
            let mut vm = quiet_machine(&sum);
            black_box(vm.run().unwrap())
        })
    });

    let matrix = compile(
        "programa matriz;
         var m: int[32][32];
         para (var i: int = 0; i < 32; i++)
             para (var j: int = 0; j < 32; j++)
                 m[i, j] = i * j;
         var soma: int = 0;
         para (var i: int = 0; i < 32; i++) soma += m[i][i];
         escreva soma;",
    )
    .unwrap();
    group.bench_function("matrix_32x32", |b| {
        b.iter(|| {
            let mut vm = quiet_machine(&matrix);
            black_box(vm.run().unwrap())
        })
    });

    group.finish();
}

fn bench_image(c: &mut Criterion) {
    let image = compile("programa p; importe sistema; var s: char[64]; copie(s, \"ola\"); escreva s;").unwrap();
    let bytes = image.to_bytes();

    let mut group = c.benchmark_group("image");
    group.bench_function("to_bytes", |b| b.iter(|| black_box(image.to_bytes())));
    group.bench_function("from_bytes", |b| b.iter(|| black_box(Image::from_bytes(black_box(&bytes)))));
    group.bench_function("load", |b| {
        let mut vm = Machine::new(VmConfig::default());
        b.iter(|| black_box(vm.load(&image)))
    });
    group.finish();
}

criterion_group!(benches, bench_recursion, bench_loops, bench_image);
criterion_main!(benches);
