//! Machine tests over hand-assembled programs
//!
//! Programs follow the compiler's calling convention: the caller reserves the
//! return slot, pushes arguments and calls; the callee addresses parameters
//! below `bp - 8` and ends with `RETN param_cells`.

use std::cell::RefCell;
use std::rc::Rc;

use ipe_core::{
    Assembler, ExternDecl, Image, LabelTable, Machine, MachineState, NativeCall, Opcode, VmConfig,
    VmError, VmResult, disassemble, encode_string,
};

fn link(data: &[u8], code: Vec<u8>) -> Image {
    let mut bytes = vec![0u8; 4];
    bytes.extend_from_slice(data);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    let data_size = bytes.len() as u32;
    bytes.extend(code);
    Image {
        data_size,
        bytes,
        externs: Vec::new(),
    }
}

fn run_image(image: &Image) -> (Machine, Vec<String>) {
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = out.clone();
    let mut vm = Machine::new(VmConfig::default());
    vm.load(image).unwrap();
    vm.set_printer(move |s| sink.borrow_mut().push(s.to_string()));
    vm.run().unwrap();
    let lines = out.take();
    (vm, lines)
}

fn assemble(build: impl FnOnce(&mut LabelTable, &mut Assembler)) -> Vec<u8> {
    let mut labels = LabelTable::new();
    let mut asm = labels.assembler();
    build(&mut labels, &mut asm);
    labels.ensure_resolved().unwrap();
    asm.into_bytes()
}

// ===== Calling Convention =====

#[test]
fn test_function_with_return_slot() {
    // quadrado(x: int): int
    let code = assemble(|labels, a| {
        let quadrado = labels.create();
        a.op_i32(Opcode::Stack, 4);
        a.op_u8(Opcode::Lcb, 7);
        a.emit_jump(labels, Opcode::Call, quadrado);
        a.op(Opcode::Print32);
        a.op(Opcode::Halt);

        a.bind(labels, quadrado).unwrap();
        a.op_i32(Opcode::Ldl32, -12);
        a.op(Opcode::Dup);
        a.op(Opcode::Mul32);
        a.op_i32(Opcode::Stl32, -16);
        a.op_u16(Opcode::Retn, 1);
    });
    let image = link(&[], code);
    let (vm, out) = run_image(&image);
    assert_eq!(out, vec!["49"]);
    assert_eq!(vm.sp(), vm.memory().stack_base());
    assert_eq!(vm.state(), MachineState::Halted);
}

#[test]
fn test_recursive_long_factorial() {
    // fatorial(n: int): long
    let code = assemble(|labels, a| {
        let fatorial = labels.create();
        let caso_geral = labels.create();
        let fim = labels.create();

        a.op_i32(Opcode::Stack, 8);
        a.op_u8(Opcode::Lcb, 20);
        a.emit_jump(labels, Opcode::Call, fatorial);
        a.op(Opcode::Print64);
        a.op(Opcode::Halt);

        a.bind(labels, fatorial).unwrap();
        a.op_i32(Opcode::Ldl32, -12);
        a.op_u8(Opcode::Lcb, 1);
        a.op(Opcode::Le32);
        a.emit_jump(labels, Opcode::Jf, caso_geral);
        a.op_i64(Opcode::Lc64, 1);
        a.op_i32(Opcode::Stl64, -20);
        a.emit_jump(labels, Opcode::Jmp, fim);

        a.bind(labels, caso_geral).unwrap();
        a.op_i32(Opcode::Stack, 8);
        a.op_i32(Opcode::Ldl32, -12);
        a.op_u8(Opcode::Lcb, 1);
        a.op(Opcode::Sub32);
        a.emit_jump(labels, Opcode::Call, fatorial);
        a.op_i32(Opcode::Ldl32, -12);
        a.op(Opcode::I2L);
        a.op(Opcode::Mul64);
        a.op_i32(Opcode::Stl64, -20);

        a.bind(labels, fim).unwrap();
        a.op_u16(Opcode::Retn, 1);
    });
    let (vm, out) = run_image(&link(&[], code));
    assert_eq!(out, vec!["2432902008176640000"]);
    assert_eq!(vm.sp(), vm.memory().stack_base());
    assert_eq!(vm.bp(), vm.memory().stack_base());
}

// ===== Data Segment and Natives =====

#[test]
fn test_strings_and_standard_natives() {
    let text = encode_string("ipê");
    let code = assemble(|_, a| {
        a.op_i32(Opcode::Stack, 4);
        a.op_i32(Opcode::Lc32, 4);
        a.op_u16(Opcode::Ecall, 0);
        a.op(Opcode::Print32);
        a.op_i32(Opcode::Lc32, 4);
        a.op(Opcode::PrintS);
        a.op(Opcode::Halt);
    });
    let mut image = link(&text, code);
    image.externs.push(ExternDecl {
        name: "tamanho".into(),
        param_bytes: 4,
    });
    let (_, out) = run_image(&image);
    assert_eq!(out, vec!["3", "ipê"]);
}

/// `saude(nome: char*): int` prints a greeting and returns the length of a line read
fn saude(call: &mut NativeCall<'_>) -> VmResult<()> {
    let nome = call.arg_string(0)?;
    call.print(&format!("ola, {}", nome))?;
    let resposta = call.read_line()?;
    call.ret_i32(resposta.trim().len() as i32)
}

#[test]
fn test_native_uses_machine_console() {
    let text = encode_string("ana");
    let code = assemble(|_, a| {
        a.op_i32(Opcode::Stack, 4);
        a.op_i32(Opcode::Lc32, 4);
        a.op_u16(Opcode::Ecall, 0);
        a.op(Opcode::Print32);
        a.op(Opcode::Halt);
    });
    let mut image = link(&text, code);
    image.externs.push(ExternDecl {
        name: "saude".into(),
        param_bytes: 4,
    });

    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = out.clone();
    let mut vm = Machine::new(VmConfig::default());
    vm.load(&image).unwrap();
    vm.bind_native("saude", saude);
    vm.set_printer(move |s| sink.borrow_mut().push(s.to_string()));
    vm.set_reader(|| "bem\n".to_string());
    vm.run().unwrap();

    assert_eq!(out.take(), vec!["ola, ana", "3"]);
}

#[test]
fn test_image_file_round_trip_runs() {
    let code = assemble(|_, a| {
        a.op_u32(Opcode::Ldg32, 4);
        a.op(Opcode::Print32);
        a.op(Opcode::Halt);
    });
    let image = link(&1234i32.to_le_bytes(), code);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.ipec");
    image.save(&path).unwrap();

    let (_, out) = run_image(&Image::load(&path).unwrap());
    assert_eq!(out, vec!["1234"]);
}

#[test]
fn test_scan_string_respects_capacity() {
    let code = assemble(|_, a| {
        a.op_i32(Opcode::Stack, 8);
        a.op_i32(Opcode::Leal, 0);
        a.op_u32(Opcode::ScanS, 4);
        a.op_i32(Opcode::Leal, 0);
        a.op(Opcode::PrintS);
        a.op(Opcode::Halt);
    });
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = out.clone();
    let mut vm = Machine::new(VmConfig::default());
    vm.load(&link(&[], code)).unwrap();
    vm.set_reader(|| "abcdef\n".to_string());
    vm.set_printer(move |s| sink.borrow_mut().push(s.to_string()));
    vm.run().unwrap();
    assert_eq!(out.take(), vec!["abc"]);
}

// ===== Faults =====

#[test]
fn test_out_of_bounds_reports_instruction() {
    let code = assemble(|_, a| {
        a.op(Opcode::Nop);
        a.op_u32(Opcode::Ldg32, u32::MAX - 1);
        a.op(Opcode::Halt);
    });
    let mut vm = Machine::new(VmConfig::default());
    vm.load(&link(&[], code)).unwrap();
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::AddressOutOfBounds { offset: 5, .. }));
    assert!(matches!(vm.step(), Err(VmError::Faulted)));
}

#[test]
fn test_stack_overflow_on_runaway_recursion() {
    let code = assemble(|labels, a| {
        let f = labels.create();
        a.bind(labels, f).unwrap();
        a.emit_jump(labels, Opcode::Call, f);
    });
    let mut vm = Machine::new(VmConfig::default().with_stack_size(4096));
    vm.load(&link(&[], code)).unwrap();
    assert!(matches!(vm.run(), Err(VmError::StackOverflow)));
}

#[test]
fn test_run_without_image() {
    let mut vm = Machine::new(VmConfig::default());
    assert!(matches!(vm.run(), Err(VmError::NoImage)));
}

// ===== Label Patching =====

#[test]
fn test_patched_displacement_lands_on_label() {
    // forward and backward references over varying padding,
    // split across spliced assemblers
    for padding in [0usize, 1, 3, 17, 200] {
        let mut labels = LabelTable::new();
        let mut main = labels.assembler();
        let mut tail = labels.assembler();
        let back = labels.create();
        let forward = labels.create();

        main.bind(&mut labels, back).unwrap();
        for _ in 0..padding {
            main.op(Opcode::Nop);
        }
        main.emit_jump(&mut labels, Opcode::Jmp, forward);
        for _ in 0..padding {
            tail.op(Opcode::Nop);
        }
        tail.bind(&mut labels, forward).unwrap();
        tail.emit_jump(&mut labels, Opcode::Call, back);
        main.splice(&mut labels, tail);
        labels.ensure_resolved().unwrap();

        let code = main.into_bytes();
        let lines = disassemble(&code, 0, code.len() as u32).unwrap();
        let jumps: Vec<_> = lines.iter().filter(|l| l.opcode.is_transfer()).collect();
        assert_eq!(jumps.len(), 2);

        let forward_at = (padding + 6 + padding) as u32;
        assert_eq!(jumps[0].target, Some(forward_at));
        assert_eq!(jumps[1].target, Some(0));

        // disp + site - 1 == target, with site at the LC32 immediate
        for jump in jumps {
            let lc32 = jump.offset - Opcode::Lc32.size() as u32;
            let site = lc32 + 1;
            let disp = i32::from_le_bytes(
                code[site as usize..site as usize + 4].try_into().unwrap(),
            );
            assert_eq!((disp as i64 + site as i64 - 1) as u32, jump.target.unwrap());
        }
    }
}
