//! Erros da máquina e do assembler

use thiserror::Error;

use crate::assembler::Label;

/// Tipo de resultado da máquina
pub type VmResult<T> = Result<T, VmError>;

/// Falhas de execução. Toda falha é fatal: a máquina deixa de ser executável.
#[derive(Debug, Error)]
pub enum VmError {
    /// Opcode desconhecido
    #[error("invalid opcode 0x{opcode:02X} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: u32 },

    /// Operando truncado no fim do código
    #[error("unexpected end of code at offset {offset}")]
    UnexpectedEnd { offset: u32 },

    /// Acesso fora da memória da máquina
    #[error("address {address} out of bounds (instruction at {offset})")]
    AddressOutOfBounds { address: u32, offset: u32 },

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    /// Divisão inteira por zero com política `Trap`
    #[error("integer division by zero at offset {offset}")]
    DivisionByZero { offset: u32 },

    /// Entrada inválida com política `Fault`
    #[error("cannot parse input {input:?} (instruction at {offset})")]
    ScanParse { input: String, offset: u32 },

    /// Função externa sem implementação nativa
    #[error("extern function '{name}' has no native handler")]
    UnboundExtern { name: String },

    /// Índice de ECALL fora da tabela
    #[error("extern index {index} out of range at offset {offset}")]
    InvalidExtern { index: u16, offset: u32 },

    /// Limite de ciclos excedido
    #[error("cycle limit of {limit} exceeded")]
    CycleLimit { limit: u64 },

    /// Máquina já falhou e precisa ser descartada
    #[error("machine faulted and can no longer run")]
    Faulted,

    #[error("no image loaded")]
    NoImage,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Falha reportada por uma função nativa
    #[error("native '{name}': {message}")]
    Native { name: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Erros de uso do assembler. Indicam bug no gerador, não no programa fonte.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("label {0} bound twice")]
    LabelAlreadyBound(Label),

    #[error("label {0} still has unpatched references")]
    UnresolvedLabel(Label),
}
