//! Máquina de pilha IPE
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  memória: [ dados (globais, textos) | pilha → ]              │
//! │                                       ^bp        ^sp         │
//! │  código:  [ dados | entrada: CALL…, HALT | corpos ]          │
//! │                     ^ip                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Quadro de chamada (offsets relativos a `bp`, em bytes):
//!
//! ```text
//!   bp - 8 - P - R   retorno (R bytes, reservado pelo chamador)
//!   bp - 8 - P       parâmetros (P bytes, do primeiro ao último)
//!   bp - 8           ip de retorno
//!   bp - 4           bp salvo
//!   bp + 0 ...       locais
//! ```
//!
//! Células têm 4 bytes; valores de 64 bits ocupam duas células, a baixa
//! primeiro. Inteiros menores que 32 bits são estendidos ao carregar e
//! truncados ao gravar.

pub mod config;

pub use config::{DivisionByZero, ScanFailure, ShiftRight64, VmConfig};

use std::io::{BufRead, Write};

use tracing::{debug, trace, warn};

use crate::error::{VmError, VmResult};
use crate::image::{ExternDecl, Image};
use crate::memory::{CELL, Memory, cells_for};
use crate::natives::{Console, NativeCall, NativeFn, NativeRegistry};
use crate::opcode::Opcode;

/// Callback de leitura do console
pub type ReadFn = Box<dyn FnMut() -> String>;

/// Callback de escrita do console
pub type PrintFn = Box<dyn FnMut(&str)>;

/// Estado do ciclo de vida
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Sem imagem
    Empty,
    /// Imagem carregada, pronta para executar
    Ready,
    /// `HALT` executado
    Halted,
    /// Falha fatal; a máquina deve ser descartada
    Faulted,
}

/// Estatísticas de uma execução
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Instruções executadas
    pub cycles: u64,
}

/// Largura e extensão de um acesso à memória
#[derive(Debug, Clone, Copy)]
enum Access {
    U8,
    I16,
    U16,
    W32,
    W64,
}

/// Máquina virtual
pub struct Machine {
    config: VmConfig,
    code: Vec<u8>,
    memory: Memory,
    ip: u32,
    sp: u32,
    bp: u32,
    externs: Vec<ExternDecl>,
    handlers: Vec<Option<NativeFn>>,
    registry: NativeRegistry,
    reader: ReadFn,
    printer: PrintFn,
    state: MachineState,
    cycles: u64,
}

impl Machine {
    /// Cria máquina sem imagem, com console padrão e natives de `sistema`
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            code: Vec::new(),
            memory: Memory::empty(),
            ip: 0,
            sp: 0,
            bp: 0,
            externs: Vec::new(),
            handlers: Vec::new(),
            registry: NativeRegistry::standard(),
            reader: Box::new(stdin_reader),
            printer: Box::new(stdout_printer),
            state: MachineState::Empty,
            cycles: 0,
        }
    }

    /// Carrega uma imagem, zerando registradores e memória
    pub fn load(&mut self, image: &Image) -> VmResult<()> {
        if image.data_size as usize > image.bytes.len() {
            return Err(VmError::InvalidImage("data segment larger than image".into()));
        }
        self.memory = Memory::new(self.config.stack_size, image.data())?;
        self.code = image.bytes.clone();
        self.ip = image.entry();
        self.sp = self.memory.stack_base();
        self.bp = self.sp;
        self.externs = image.externs.clone();
        self.bind_handlers();
        self.state = MachineState::Ready;
        self.cycles = 0;
        debug!(
            data = image.data_size,
            code = image.code().len(),
            externs = image.externs.len(),
            "image loaded"
        );
        Ok(())
    }

    /// Registra (ou substitui) um handler nativo
    pub fn bind_native(&mut self, name: &str, handler: NativeFn) {
        self.registry.register(name, handler);
        self.bind_handlers();
    }

    /// Substitui todo o registro de natives
    pub fn bind_natives(&mut self, registry: NativeRegistry) {
        self.registry = registry;
        self.bind_handlers();
    }

    pub fn set_reader(&mut self, reader: impl FnMut() -> String + 'static) {
        self.reader = Box::new(reader);
    }

    pub fn set_printer(&mut self, printer: impl FnMut(&str) + 'static) {
        self.printer = Box::new(printer);
    }

    fn bind_handlers(&mut self) {
        self.handlers = self
            .externs
            .iter()
            .map(|ext| self.registry.get(&ext.name))
            .collect();
    }

    // ─── Acesso ao estado ───

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn sp(&self) -> u32 {
        self.sp
    }

    pub fn bp(&self) -> u32 {
        self.bp
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════
    // EXECUÇÃO
    // ═══════════════════════════════════════════════════════════════

    /// Executa até `HALT`
    pub fn run(&mut self) -> VmResult<RunStats> {
        self.check_runnable()?;
        if let Some(index) = self.handlers.iter().position(Option::is_none) {
            self.state = MachineState::Faulted;
            return Err(VmError::UnboundExtern {
                name: self.externs[index].name.clone(),
            });
        }
        debug!(entry = self.ip, "run");
        let start = self.cycles;
        while self.step()? {}
        let stats = RunStats {
            cycles: self.cycles - start,
        };
        debug!(cycles = stats.cycles, "halted");
        Ok(stats)
    }

    /// Executa uma instrução; retorna `false` depois de `HALT`
    pub fn step(&mut self) -> VmResult<bool> {
        self.check_runnable()?;
        if self.state == MachineState::Halted {
            return Ok(false);
        }
        if let Some(limit) = self.config.max_cycles {
            if self.cycles >= limit {
                self.state = MachineState::Faulted;
                return Err(VmError::CycleLimit { limit });
            }
        }

        let start = self.ip;
        match self.execute(start) {
            Ok(()) => {
                self.cycles += 1;
                Ok(self.state != MachineState::Halted)
            }
            Err(err) => {
                let err = match err {
                    VmError::AddressOutOfBounds { address, .. } => {
                        VmError::AddressOutOfBounds { address, offset: start }
                    }
                    other => other,
                };
                warn!(offset = start, error = %err, "machine fault");
                self.state = MachineState::Faulted;
                Err(err)
            }
        }
    }

    fn check_runnable(&self) -> VmResult<()> {
        match self.state {
            MachineState::Empty => Err(VmError::NoImage),
            MachineState::Faulted => Err(VmError::Faulted),
            MachineState::Ready | MachineState::Halted => Ok(()),
        }
    }

    fn execute(&mut self, start: u32) -> VmResult<()> {
        let byte = self.fetch_u8()?;
        let op = Opcode::from_byte(byte).ok_or(VmError::InvalidOpcode {
            opcode: byte,
            offset: start,
        })?;
        if self.config.trace {
            trace!(ip = start, sp = self.sp, bp = self.bp, op = op.mnemonic());
        }

        use Opcode::*;
        match op {
            // ─── Controle ───
            Nop => {}
            Halt => self.state = MachineState::Halted,
            Jmp => {
                let disp = self.pop32()? as i32;
                self.ip = transfer_target(start, disp);
            }
            Jt | Jf => {
                let disp = self.pop32()? as i32;
                let cond = self.pop32()? & 1 == 1;
                if cond == (op == Jt) {
                    self.ip = transfer_target(start, disp);
                }
            }
            Call => {
                let disp = self.pop32()? as i32;
                self.push32(self.ip)?;
                self.push32(self.bp)?;
                self.bp = self.sp;
                self.ip = transfer_target(start, disp);
            }
            Ret => self.ret(0)?,
            Retn => {
                let n = self.fetch_u16()?;
                self.ret(n as u32)?;
            }
            Ecall => {
                let index = self.fetch_u16()?;
                self.ecall(index, start)?;
            }
            Stack => {
                let n = self.fetch_i32()?;
                self.adjust_stack(n)?;
            }

            // ─── Constantes ───
            Lcb => {
                let v = self.fetch_u8()?;
                self.push32(v as u32)?;
            }
            Lcs => {
                let v = self.fetch_u16()? as i16;
                self.push32(v as i32 as u32)?;
            }
            Lcc => {
                let v = self.fetch_u16()?;
                self.push32(v as u32)?;
            }
            Lc32 => {
                let v = self.fetch_i32()?;
                self.push32(v as u32)?;
            }
            Lc64 => {
                let v = self.fetch_u64()?;
                self.push64(v)?;
            }
            Leal => {
                let offset = self.fetch_i32()?;
                self.push32(self.local(offset))?;
            }

            // ─── Leituras ───
            Ldg8 | Ldg16s | Ldg16u | Ldg32 | Ldg64 => {
                let address = self.fetch_u32()?;
                self.read_memory(address, load_access(op))?;
            }
            Ldl8 | Ldl16s | Ldl16u | Ldl32 | Ldl64 => {
                let offset = self.fetch_i32()?;
                self.read_memory(self.local(offset), load_access(op))?;
            }
            Lds8 | Lds16s | Lds16u | Lds32 | Lds64 => {
                let address = self.pop32()?;
                self.read_memory(address, load_access(op))?;
            }

            // ─── Escritas ───
            Stg8 | Stg16 | Stg32 | Stg64 => {
                let address = self.fetch_u32()?;
                self.write_memory(address, store_access(op))?;
            }
            Stl8 | Stl16 | Stl32 | Stl64 => {
                let offset = self.fetch_i32()?;
                self.write_memory(self.local(offset), store_access(op))?;
            }
            Sts8 | Sts16 | Sts32 | Sts64 => {
                let address = self.pop32()?;
                self.write_memory(address, store_access(op))?;
            }
            Pushmem => {
                let len = self.fetch_u32()?;
                let address = self.pop32()?;
                let bytes = cells_for(len) * CELL;
                let dst = self.sp;
                self.reserve(bytes)?;
                self.memory.fill_zero(dst, bytes)?;
                self.memory.copy(address, dst, len)?;
            }
            Popmem => {
                let len = self.fetch_u32()?;
                let address = self.pop32()?;
                let src = self.release(cells_for(len) * CELL)?;
                self.memory.copy(src, address, len)?;
            }

            // ─── Inteiros 32 ───
            Add32 => self.binary32(i32::wrapping_add)?,
            Sub32 => self.binary32(i32::wrapping_sub)?,
            Mul32 => self.binary32(i32::wrapping_mul)?,
            Div32 => self.divide32(start, i32::wrapping_div)?,
            Mod32 => self.divide32(start, i32::wrapping_rem)?,
            Neg32 => self.unary32(i32::wrapping_neg)?,
            And32 => self.binary32(|a, b| a & b)?,
            Or32 => self.binary32(|a, b| a | b)?,
            Xor32 => self.binary32(|a, b| a ^ b)?,
            Not32 => self.unary32(|a| !a)?,
            Shl32 => self.binary32(|a, b| a.wrapping_shl(b as u32))?,
            Shr32 => self.binary32(|a, b| a.wrapping_shr(b as u32))?,
            Ushr32 => self.binary32(|a, b| (a as u32).wrapping_shr(b as u32) as i32)?,
            Lnot => self.unary32(|a| (a == 0) as i32)?,

            // ─── Inteiros 64 ───
            Add64 => self.binary64(i64::wrapping_add)?,
            Sub64 => self.binary64(i64::wrapping_sub)?,
            Mul64 => self.binary64(i64::wrapping_mul)?,
            Div64 => self.divide64(start, i64::wrapping_div)?,
            Mod64 => self.divide64(start, i64::wrapping_rem)?,
            Neg64 => self.unary64(i64::wrapping_neg)?,
            And64 => self.binary64(|a, b| a & b)?,
            Or64 => self.binary64(|a, b| a | b)?,
            Xor64 => self.binary64(|a, b| a ^ b)?,
            Not64 => self.unary64(|a| !a)?,
            Shl64 => self.shift64(|a, n| a.wrapping_shl(n))?,
            Shr64 => match self.config.shift_right_64 {
                ShiftRight64::Arithmetic => self.shift64(|a, n| a.wrapping_shr(n))?,
                ShiftRight64::LeftShiftQuirk => self.shift64(|a, n| a.wrapping_shl(n))?,
            },
            Ushr64 => self.shift64(|a, n| (a as u64).wrapping_shr(n) as i64)?,

            // ─── Ponto flutuante ───
            AddF => self.binary_f32(|a, b| a + b)?,
            SubF => self.binary_f32(|a, b| a - b)?,
            MulF => self.binary_f32(|a, b| a * b)?,
            DivF => self.binary_f32(|a, b| a / b)?,
            ModF => self.binary_f32(|a, b| a % b)?,
            NegF => {
                let a = f32::from_bits(self.pop32()?);
                self.push32((-a).to_bits())?;
            }
            AddD => self.binary_f64(|a, b| a + b)?,
            SubD => self.binary_f64(|a, b| a - b)?,
            MulD => self.binary_f64(|a, b| a * b)?,
            DivD => self.binary_f64(|a, b| a / b)?,
            ModD => self.binary_f64(|a, b| a % b)?,
            NegD => {
                let a = f64::from_bits(self.pop64()?);
                self.push64((-a).to_bits())?;
            }

            // ─── Comparações ───
            Eq32 => self.compare32(|a, b| a == b)?,
            Ne32 => self.compare32(|a, b| a != b)?,
            Gt32 => self.compare32(|a, b| a > b)?,
            Ge32 => self.compare32(|a, b| a >= b)?,
            Lt32 => self.compare32(|a, b| a < b)?,
            Le32 => self.compare32(|a, b| a <= b)?,
            Eq64 => self.compare64(|a, b| a == b)?,
            Ne64 => self.compare64(|a, b| a != b)?,
            Gt64 => self.compare64(|a, b| a > b)?,
            Ge64 => self.compare64(|a, b| a >= b)?,
            Lt64 => self.compare64(|a, b| a < b)?,
            Le64 => self.compare64(|a, b| a <= b)?,
            EqF => self.compare_f32(|a, b| a == b)?,
            NeF => self.compare_f32(|a, b| a != b)?,
            GtF => self.compare_f32(|a, b| a > b)?,
            GeF => self.compare_f32(|a, b| a >= b)?,
            LtF => self.compare_f32(|a, b| a < b)?,
            LeF => self.compare_f32(|a, b| a <= b)?,
            EqD => self.compare_f64(|a, b| a == b)?,
            NeD => self.compare_f64(|a, b| a != b)?,
            GtD => self.compare_f64(|a, b| a > b)?,
            GeD => self.compare_f64(|a, b| a >= b)?,
            LtD => self.compare_f64(|a, b| a < b)?,
            LeD => self.compare_f64(|a, b| a <= b)?,

            // ─── Conversões ───
            I2L => {
                let a = self.pop32()? as i32;
                self.push64(a as i64 as u64)?;
            }
            L2I => {
                let a = self.pop64()? as i64;
                self.push32(a as i32 as u32)?;
            }
            I2F => {
                let a = self.pop32()? as i32;
                self.push32((a as f32).to_bits())?;
            }
            I2D => {
                let a = self.pop32()? as i32;
                self.push64((a as f64).to_bits())?;
            }
            L2F => {
                let a = self.pop64()? as i64;
                self.push32((a as f32).to_bits())?;
            }
            L2D => {
                let a = self.pop64()? as i64;
                self.push64((a as f64).to_bits())?;
            }
            F2I => {
                let a = f32::from_bits(self.pop32()?);
                self.push32(a as i32 as u32)?;
            }
            F2L => {
                let a = f32::from_bits(self.pop32()?);
                self.push64(a as i64 as u64)?;
            }
            D2I => {
                let a = f64::from_bits(self.pop64()?);
                self.push32(a as i32 as u32)?;
            }
            D2L => {
                let a = f64::from_bits(self.pop64()?);
                self.push64(a as i64 as u64)?;
            }
            F2D => {
                let a = f32::from_bits(self.pop32()?);
                self.push64((a as f64).to_bits())?;
            }
            D2F => {
                let a = f64::from_bits(self.pop64()?);
                self.push32((a as f32).to_bits())?;
            }
            I2B => self.unary32(|a| a & 0xFF)?,
            I2S => self.unary32(|a| a as i16 as i32)?,
            I2C => self.unary32(|a| a & 0xFFFF)?,
            I2Z => self.unary32(|a| (a != 0) as i32)?,

            // ─── Pilha ───
            Pop => {
                self.release(CELL)?;
            }
            Pop2 => {
                self.release(2 * CELL)?;
            }
            Popn => {
                let n = self.fetch_u16()? as u32;
                self.release(n * CELL)?;
            }
            Dup => {
                let v = self.peek32()?;
                self.push32(v)?;
            }
            Dup64 => {
                let v = self.peek64()?;
                self.push64(v)?;
            }
            Dupn => {
                let n = self.fetch_u16()?;
                let v = self.peek32()?;
                for _ in 0..n {
                    self.push32(v)?;
                }
            }
            Dup64n => {
                let n = self.fetch_u16()?;
                let v = self.peek64()?;
                for _ in 0..n {
                    self.push64(v)?;
                }
            }

            // ─── Entrada e saída ───
            PrintZ => {
                let v = self.pop32()?;
                self.print(if v != 0 { "verdadeiro" } else { "falso" });
            }
            Print8 => {
                let v = self.pop32()? as u8;
                self.print(&v.to_string());
            }
            PrintC => {
                let v = self.pop32()? & 0xFFFF;
                let c = char::from_u32(v).unwrap_or(char::REPLACEMENT_CHARACTER);
                self.print(c.encode_utf8(&mut [0; 4]));
            }
            Print16 => {
                let v = self.pop32()? as i16;
                self.print(&v.to_string());
            }
            Print32 => {
                let v = self.pop32()? as i32;
                self.print(&v.to_string());
            }
            Print64 => {
                let v = self.pop64()? as i64;
                self.print(&v.to_string());
            }
            PrintF => {
                let v = f32::from_bits(self.pop32()?);
                self.print(&v.to_string());
            }
            PrintD => {
                let v = f64::from_bits(self.pop64()?);
                self.print(&v.to_string());
            }
            PrintS => {
                let address = self.pop32()?;
                let text = self.memory.read_string(address)?;
                self.print(&text);
            }
            ScanZ | Scan8 | ScanC | Scan16 | Scan32 | Scan64 | ScanF | ScanD => {
                let address = self.pop32()?;
                self.scan(op, address, start)?;
            }
            ScanS => {
                let capacity = self.fetch_u32()?;
                let address = self.pop32()?;
                let input = (self.reader)();
                let line = input.trim_end_matches(['\r', '\n']);
                let limit = capacity.saturating_sub(1) as usize;
                if capacity > 0 {
                    let units: Vec<u16> = line.encode_utf16().take(limit).collect();
                    self.memory.write_units(address, &units)?;
                }
            }
        }
        Ok(())
    }

    // ─── Busca de operandos ───

    fn fetch<const N: usize>(&mut self) -> VmResult<[u8; N]> {
        let at = self.ip as usize;
        let bytes = self
            .code
            .get(at..at + N)
            .ok_or(VmError::UnexpectedEnd { offset: self.ip })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.ip += N as u32;
        Ok(out)
    }

    fn fetch_u8(&mut self) -> VmResult<u8> {
        Ok(self.fetch::<1>()?[0])
    }

    fn fetch_u16(&mut self) -> VmResult<u16> {
        Ok(u16::from_le_bytes(self.fetch()?))
    }

    fn fetch_i32(&mut self) -> VmResult<i32> {
        Ok(i32::from_le_bytes(self.fetch()?))
    }

    fn fetch_u32(&mut self) -> VmResult<u32> {
        Ok(u32::from_le_bytes(self.fetch()?))
    }

    fn fetch_u64(&mut self) -> VmResult<u64> {
        Ok(u64::from_le_bytes(self.fetch()?))
    }

    // ─── Pilha ───

    fn reserve(&mut self, bytes: u32) -> VmResult<u32> {
        let top = self.sp;
        let end = top.checked_add(bytes).ok_or(VmError::StackOverflow)?;
        if end > self.memory.size() {
            return Err(VmError::StackOverflow);
        }
        self.sp = end;
        Ok(top)
    }

    /// Libera `bytes` do topo e retorna o novo sp
    fn release(&mut self, bytes: u32) -> VmResult<u32> {
        let new_sp = self
            .sp
            .checked_sub(bytes)
            .filter(|&sp| sp >= self.memory.stack_base())
            .ok_or(VmError::StackUnderflow)?;
        self.sp = new_sp;
        Ok(new_sp)
    }

    fn adjust_stack(&mut self, bytes: i32) -> VmResult<()> {
        if bytes >= 0 {
            let at = self.reserve(bytes as u32)?;
            self.memory.fill_zero(at, bytes as u32)
        } else {
            self.release(bytes.unsigned_abs()).map(|_| ())
        }
    }

    fn push32(&mut self, value: u32) -> VmResult<()> {
        let at = self.reserve(CELL)?;
        self.memory.write_u32(at, value)
    }

    fn pop32(&mut self) -> VmResult<u32> {
        let at = self.release(CELL)?;
        self.memory.read_u32(at)
    }

    fn peek32(&self) -> VmResult<u32> {
        if self.sp < self.memory.stack_base() + CELL {
            return Err(VmError::StackUnderflow);
        }
        self.memory.read_u32(self.sp - CELL)
    }

    fn push64(&mut self, value: u64) -> VmResult<()> {
        let at = self.reserve(2 * CELL)?;
        self.memory.write_u64(at, value)
    }

    fn pop64(&mut self) -> VmResult<u64> {
        let at = self.release(2 * CELL)?;
        self.memory.read_u64(at)
    }

    fn peek64(&self) -> VmResult<u64> {
        if self.sp < self.memory.stack_base() + 2 * CELL {
            return Err(VmError::StackUnderflow);
        }
        self.memory.read_u64(self.sp - 2 * CELL)
    }

    /// Endereço absoluto de `bp + offset`
    fn local(&self, offset: i32) -> u32 {
        (self.bp as i64 + offset as i64) as u32
    }

    // ─── Memória ───

    fn read_memory(&mut self, address: u32, access: Access) -> VmResult<()> {
        match access {
            Access::U8 => {
                let v = self.memory.read_u8(address)?;
                self.push32(v as u32)
            }
            Access::I16 => {
                let v = self.memory.read_u16(address)? as i16;
                self.push32(v as i32 as u32)
            }
            Access::U16 => {
                let v = self.memory.read_u16(address)?;
                self.push32(v as u32)
            }
            Access::W32 => {
                let v = self.memory.read_u32(address)?;
                self.push32(v)
            }
            Access::W64 => {
                let v = self.memory.read_u64(address)?;
                self.push64(v)
            }
        }
    }

    fn write_memory(&mut self, address: u32, access: Access) -> VmResult<()> {
        match access {
            Access::U8 => {
                let v = self.pop32()?;
                self.memory.write_u8(address, v as u8)
            }
            Access::I16 | Access::U16 => {
                let v = self.pop32()?;
                self.memory.write_u16(address, v as u16)
            }
            Access::W32 => {
                let v = self.pop32()?;
                self.memory.write_u32(address, v)
            }
            Access::W64 => {
                let v = self.pop64()?;
                self.memory.write_u64(address, v)
            }
        }
    }

    // ─── Aritmética ───

    fn unary32(&mut self, f: impl FnOnce(i32) -> i32) -> VmResult<()> {
        let a = self.pop32()? as i32;
        self.push32(f(a) as u32)
    }

    fn binary32(&mut self, f: impl FnOnce(i32, i32) -> i32) -> VmResult<()> {
        let b = self.pop32()? as i32;
        let a = self.pop32()? as i32;
        self.push32(f(a, b) as u32)
    }

    fn divide32(&mut self, start: u32, f: impl FnOnce(i32, i32) -> i32) -> VmResult<()> {
        let b = self.pop32()? as i32;
        let a = self.pop32()? as i32;
        let result = if b == 0 {
            match self.config.division_by_zero {
                DivisionByZero::Trap => return Err(VmError::DivisionByZero { offset: start }),
                DivisionByZero::Zero => 0,
            }
        } else {
            f(a, b)
        };
        self.push32(result as u32)
    }

    fn compare32(&mut self, f: impl FnOnce(i32, i32) -> bool) -> VmResult<()> {
        let b = self.pop32()? as i32;
        let a = self.pop32()? as i32;
        self.push32(f(a, b) as u32)
    }

    fn unary64(&mut self, f: impl FnOnce(i64) -> i64) -> VmResult<()> {
        let a = self.pop64()? as i64;
        self.push64(f(a) as u64)
    }

    fn binary64(&mut self, f: impl FnOnce(i64, i64) -> i64) -> VmResult<()> {
        let b = self.pop64()? as i64;
        let a = self.pop64()? as i64;
        self.push64(f(a, b) as u64)
    }

    fn divide64(&mut self, start: u32, f: impl FnOnce(i64, i64) -> i64) -> VmResult<()> {
        let b = self.pop64()? as i64;
        let a = self.pop64()? as i64;
        let result = if b == 0 {
            match self.config.division_by_zero {
                DivisionByZero::Trap => return Err(VmError::DivisionByZero { offset: start }),
                DivisionByZero::Zero => 0,
            }
        } else {
            f(a, b)
        };
        self.push64(result as u64)
    }

    /// Contagem em uma célula de 32 bits, valor em duas
    fn shift64(&mut self, f: impl FnOnce(i64, u32) -> i64) -> VmResult<()> {
        let n = self.pop32()?;
        let a = self.pop64()? as i64;
        self.push64(f(a, n) as u64)
    }

    fn compare64(&mut self, f: impl FnOnce(i64, i64) -> bool) -> VmResult<()> {
        let b = self.pop64()? as i64;
        let a = self.pop64()? as i64;
        self.push32(f(a, b) as u32)
    }

    fn binary_f32(&mut self, f: impl FnOnce(f32, f32) -> f32) -> VmResult<()> {
        let b = f32::from_bits(self.pop32()?);
        let a = f32::from_bits(self.pop32()?);
        self.push32(f(a, b).to_bits())
    }

    fn compare_f32(&mut self, f: impl FnOnce(f32, f32) -> bool) -> VmResult<()> {
        let b = f32::from_bits(self.pop32()?);
        let a = f32::from_bits(self.pop32()?);
        self.push32(f(a, b) as u32)
    }

    fn binary_f64(&mut self, f: impl FnOnce(f64, f64) -> f64) -> VmResult<()> {
        let b = f64::from_bits(self.pop64()?);
        let a = f64::from_bits(self.pop64()?);
        self.push64(f(a, b).to_bits())
    }

    fn compare_f64(&mut self, f: impl FnOnce(f64, f64) -> bool) -> VmResult<()> {
        let b = f64::from_bits(self.pop64()?);
        let a = f64::from_bits(self.pop64()?);
        self.push32(f(a, b) as u32)
    }

    // ─── Chamadas ───

    fn ret(&mut self, param_cells: u32) -> VmResult<()> {
        let saved_bp = self.pop32()?;
        self.ip = self.pop32()?;
        self.bp = saved_bp;
        self.release(param_cells * CELL)?;
        Ok(())
    }

    fn ecall(&mut self, index: u16, start: u32) -> VmResult<()> {
        let invalid = VmError::InvalidExtern { index, offset: start };
        let ext = self.externs.get(index as usize).ok_or(invalid)?;
        let param_bytes = ext.param_bytes;
        let handler = match self.handlers.get(index as usize).copied().flatten() {
            Some(handler) => handler,
            None => {
                return Err(VmError::UnboundExtern {
                    name: ext.name.clone(),
                });
            }
        };
        let name = ext.name.clone();
        let args = self
            .sp
            .checked_sub(param_bytes)
            .filter(|&a| a >= self.memory.stack_base())
            .ok_or(VmError::StackUnderflow)?;

        let console = Console {
            printer: &mut *self.printer,
            reader: &mut *self.reader,
        };
        handler(&mut NativeCall::new(&mut self.memory, args, &name).with_console(console))?;
        self.sp = args;
        Ok(())
    }

    // ─── Console ───

    fn print(&mut self, text: &str) {
        (self.printer)(text);
    }

    fn scan(&mut self, op: Opcode, address: u32, start: u32) -> VmResult<()> {
        let input = (self.reader)();
        let text = input.trim();
        let fault = || VmError::ScanParse {
            input: text.to_string(),
            offset: start,
        };
        let lenient = self.config.scan_failure == ScanFailure::Zero;

        macro_rules! parsed {
            ($ty:ty) => {
                match text.parse::<$ty>() {
                    Ok(v) => v,
                    Err(_) if lenient => <$ty>::default(),
                    Err(_) => return Err(fault()),
                }
            };
        }

        match op {
            Opcode::ScanZ => {
                let v = match text {
                    "verdadeiro" | "true" | "1" => 1,
                    "falso" | "false" | "0" => 0,
                    _ if lenient => 0,
                    _ => return Err(fault()),
                };
                self.memory.write_u8(address, v)
            }
            Opcode::Scan8 => self.memory.write_u8(address, parsed!(u8)),
            Opcode::ScanC => {
                let unit = match text.encode_utf16().next() {
                    Some(unit) => unit,
                    None if lenient => 0,
                    None => return Err(fault()),
                };
                self.memory.write_u16(address, unit)
            }
            Opcode::Scan16 => self.memory.write_u16(address, parsed!(i16) as u16),
            Opcode::Scan32 => self.memory.write_u32(address, parsed!(i32) as u32),
            Opcode::Scan64 => self.memory.write_u64(address, parsed!(i64) as u64),
            Opcode::ScanF => self.memory.write_u32(address, parsed!(f32).to_bits()),
            Opcode::ScanD => self.memory.write_u64(address, parsed!(f64).to_bits()),
            _ => Err(VmError::InvalidOpcode {
                opcode: op as u8,
                offset: start,
            }),
        }
    }
}

/// Destino de um desvio: início da sequência `LC32 disp; op` + deslocamento
fn transfer_target(op_start: u32, disp: i32) -> u32 {
    let sequence_start = op_start as i64 - Opcode::Lc32.size() as i64;
    (sequence_start + disp as i64) as u32
}

fn load_access(op: Opcode) -> Access {
    use Opcode::*;
    match op {
        Ldg8 | Ldl8 | Lds8 => Access::U8,
        Ldg16s | Ldl16s | Lds16s => Access::I16,
        Ldg16u | Ldl16u | Lds16u => Access::U16,
        Ldg64 | Ldl64 | Lds64 => Access::W64,
        _ => Access::W32,
    }
}

fn store_access(op: Opcode) -> Access {
    use Opcode::*;
    match op {
        Stg8 | Stl8 | Sts8 => Access::U8,
        Stg16 | Stl16 | Sts16 => Access::U16,
        Stg64 | Stl64 | Sts64 => Access::W64,
        _ => Access::W32,
    }
}

fn stdin_reader() -> String {
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        line.clear();
    }
    line
}

fn stdout_printer(text: &str) {
    let mut out = std::io::stdout().lock();
    if let Err(err) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        warn!(error = %err, "console write failed");
    }
}
