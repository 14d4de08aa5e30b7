//! # IPE-Core
//!
//! Máquina virtual de pilha e assembler da linguagem IPE.
//!
//! ## Módulos
//!
//! - [`opcode`]: ISA de um byte por opcode com operando imediato fixo
//! - [`assembler`]: emissão de bytecode e rótulos com correção adiada
//! - [`image`]: imagem ligada (.ipec) com segmento de dados e tabela externa
//! - [`memory`]: memória plana endereçada por byte
//! - [`natives`]: funções `externa` implementadas no host
//! - [`vm`]: interpretador
//! - [`disasm`]: listagem de código
//!
//! ## Quick Start
//!
//! ```
//! use ipe_core::{Image, LabelTable, Machine, Opcode, VmConfig};
//!
//! let mut labels = LabelTable::new();
//! let mut asm = labels.assembler();
//! asm.op_u8(Opcode::Lcb, 7);
//! asm.op(Opcode::Print32);
//! asm.op(Opcode::Halt);
//!
//! let mut bytes = vec![0u8; 4];
//! bytes.extend(asm.into_bytes());
//! let image = Image { data_size: 4, bytes, externs: Vec::new() };
//!
//! let mut vm = Machine::new(VmConfig::default());
//! vm.load(&image).unwrap();
//! vm.set_printer(|_| {});
//! vm.run().unwrap();
//! ```

pub mod assembler;
pub mod disasm;
pub mod error;
pub mod image;
pub mod memory;
pub mod natives;
pub mod opcode;
pub mod vm;

pub use assembler::{Assembler, AsmId, Label, LabelTable};
pub use disasm::{Line, disassemble, listing};
pub use error::{AsmError, VmError, VmResult};
pub use image::{ExternDecl, Image, ImageHeader, IPEC_MAGIC, IPEC_VERSION};
pub use memory::{CELL, Memory, cells_for, encode_string};
pub use natives::{Console, NativeCall, NativeFn, NativeRegistry};
pub use opcode::{Opcode, OpcodeCategory, Operand};
pub use vm::{
    DivisionByZero, Machine, MachineState, RunStats, ScanFailure, ShiftRight64, VmConfig,
};
