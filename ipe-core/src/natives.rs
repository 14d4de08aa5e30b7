//! Funções nativas
//!
//! Uma função `externa` é chamada via `ECALL idx`. A máquina passa para o
//! handler uma visão (`NativeCall`) da memória com a base do bloco de
//! parâmetros; o slot de retorno fica imediatamente abaixo dessa base,
//! reservado pelo chamador antes de empilhar os argumentos.
//!
//! ```text
//!   [ retorno ][ arg0 ][ arg1 ] ...   ← sp
//!              ^ args
//! ```
//!
//! A chamada também carrega o console da máquina ([`Console`]), para que
//! handlers do host possam escrever e ler pelo mesmo leitor e impressor
//! injetados em `Machine`.
//!
//! O conjunto padrão implementa a unidade `sistema`: textos e conversões.

use std::collections::HashMap;

use crate::error::{VmError, VmResult};
use crate::memory::Memory;

/// Assinatura de um handler nativo
pub type NativeFn = fn(&mut NativeCall<'_>) -> VmResult<()>;

/// Leitor e impressor emprestados da máquina durante um `ECALL`
pub struct Console<'a> {
    pub printer: &'a mut dyn FnMut(&str),
    pub reader: &'a mut dyn FnMut() -> String,
}

/// Contexto de uma chamada nativa
pub struct NativeCall<'a> {
    memory: &'a mut Memory,
    args: u32,
    name: &'a str,
    console: Option<Console<'a>>,
}

impl<'a> NativeCall<'a> {
    /// Chamada sem console; `print` e `read_line` falham
    pub fn new(memory: &'a mut Memory, args: u32, name: &'a str) -> Self {
        Self {
            memory,
            args,
            name,
            console: None,
        }
    }

    pub fn with_console(mut self, console: Console<'a>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn memory(&mut self) -> &mut Memory {
        self.memory
    }

    /// Endereço do primeiro byte de parâmetros
    pub fn args(&self) -> u32 {
        self.args
    }

    /// Célula de argumento a `offset` bytes da base
    pub fn arg_u32(&self, offset: u32) -> VmResult<u32> {
        self.memory.read_u32(self.args + offset)
    }

    pub fn arg_i32(&self, offset: u32) -> VmResult<i32> {
        Ok(self.arg_u32(offset)? as i32)
    }

    pub fn arg_string(&self, offset: u32) -> VmResult<String> {
        let address = self.arg_u32(offset)?;
        self.memory.read_string(address)
    }

    /// Grava um retorno de uma célula
    pub fn ret_u32(&mut self, value: u32) -> VmResult<()> {
        let slot = self.return_slot(4)?;
        self.memory.write_u32(slot, value)
    }

    pub fn ret_i32(&mut self, value: i32) -> VmResult<()> {
        self.ret_u32(value as u32)
    }

    /// Grava um retorno de duas células
    pub fn ret_u64(&mut self, value: u64) -> VmResult<()> {
        let slot = self.return_slot(8)?;
        self.memory.write_u64(slot, value)
    }

    /// Escreve no console da máquina
    pub fn print(&mut self, text: &str) -> VmResult<()> {
        match self.console.as_mut() {
            Some(console) => {
                (console.printer)(text);
                Ok(())
            }
            None => Err(self.fail("no console attached")),
        }
    }

    /// Lê uma linha do console da máquina
    pub fn read_line(&mut self) -> VmResult<String> {
        match self.console.as_mut() {
            Some(console) => Ok((console.reader)()),
            None => Err(self.fail("no console attached")),
        }
    }

    /// Erro atribuído a esta função
    pub fn fail(&self, message: impl Into<String>) -> VmError {
        VmError::Native {
            name: self.name.to_string(),
            message: message.into(),
        }
    }

    fn return_slot(&self, size: u32) -> VmResult<u32> {
        self.args
            .checked_sub(size)
            .filter(|&slot| slot >= self.memory.stack_base())
            .ok_or(VmError::StackUnderflow)
    }
}

/// Tabela nome → handler
#[derive(Clone, Default)]
pub struct NativeRegistry {
    handlers: HashMap<String, NativeFn>,
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("NativeRegistry").field("handlers", &names).finish()
    }
}

impl NativeRegistry {
    /// Registro vazio
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro com as funções da unidade `sistema`
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("tamanho", tamanho);
        registry.register("copie", copie);
        registry.register("concatene", concatene);
        registry.register("compare", compare);
        registry.register("paraInteiro", para_inteiro);
        registry.register("paraLongo", para_longo);
        registry.register("paraReal", para_real);
        registry.register("inteiroParaTexto", inteiro_para_texto);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, handler: NativeFn) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.handlers.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

// ═══════════════════════════════════════════════════════════════
// UNIDADE `sistema`
// ═══════════════════════════════════════════════════════════════

/// `tamanho(s: char*): int`
fn tamanho(call: &mut NativeCall<'_>) -> VmResult<()> {
    let address = call.arg_u32(0)?;
    let len = call.memory().string_len(address)?;
    call.ret_u32(len)
}

/// `copie(destino: char*, origem: char*)`
fn copie(call: &mut NativeCall<'_>) -> VmResult<()> {
    let dst = call.arg_u32(0)?;
    let src = call.arg_u32(4)?;
    let units = call.memory().read_units(src)?;
    call.memory().write_units(dst, &units)
}

/// `concatene(destino: char*, origem: char*)`
fn concatene(call: &mut NativeCall<'_>) -> VmResult<()> {
    let dst = call.arg_u32(0)?;
    let src = call.arg_u32(4)?;
    let units = call.memory().read_units(src)?;
    let end = dst + call.memory().string_len(dst)? * 2;
    call.memory().write_units(end, &units)
}

/// `compare(a: char*, b: char*): int`
fn compare(call: &mut NativeCall<'_>) -> VmResult<()> {
    let a = call.arg_u32(0)?;
    let b = call.arg_u32(4)?;
    let left = call.memory().read_units(a)?;
    let right = call.memory().read_units(b)?;
    call.ret_i32(left.cmp(&right) as i32)
}

/// `paraInteiro(s: char*): int`
fn para_inteiro(call: &mut NativeCall<'_>) -> VmResult<()> {
    let text = call.arg_string(0)?;
    call.ret_i32(text.trim().parse().unwrap_or(0))
}

/// `paraLongo(s: char*): long`
fn para_longo(call: &mut NativeCall<'_>) -> VmResult<()> {
    let text = call.arg_string(0)?;
    let value: i64 = text.trim().parse().unwrap_or(0);
    call.ret_u64(value as u64)
}

/// `paraReal(s: char*): double`
fn para_real(call: &mut NativeCall<'_>) -> VmResult<()> {
    let text = call.arg_string(0)?;
    let value: f64 = text.trim().parse().unwrap_or(0.0);
    call.ret_u64(value.to_bits())
}

/// `inteiroParaTexto(v: int, destino: char*)`
fn inteiro_para_texto(call: &mut NativeCall<'_>) -> VmResult<()> {
    let value = call.arg_i32(0)?;
    let dst = call.arg_u32(4)?;
    call.memory().write_string(dst, &value.to_string())
}
