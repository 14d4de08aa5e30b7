//! Configuração da máquina
//!
//! Políticas que a ISA deixa em aberto ficam explícitas aqui e podem vir da
//! seção `[vm]` do manifesto do projeto.

use serde::{Deserialize, Serialize};

/// Tamanho padrão da memória (dados + pilha): 1 MiB
pub const DEFAULT_STACK_SIZE: u32 = 1 << 20;

/// Semântica de `SHR64`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShiftRight64 {
    /// Deslocamento aritmético para a direita
    #[default]
    Arithmetic,
    /// Reproduz a implementação legada, que desloca para a esquerda
    LeftShiftQuirk,
}

/// Divisão ou resto inteiro por zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DivisionByZero {
    /// Falha com `VmError::DivisionByZero`
    #[default]
    Trap,
    /// Empilha zero e segue
    Zero,
}

/// Entrada que não pode ser convertida por uma instrução `SCAN*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanFailure {
    /// Grava zero no destino
    #[default]
    Zero,
    /// Falha com `VmError::ScanParse`
    Fault,
}

/// Configuração da máquina
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Bytes de memória (segmento de dados + pilha)
    pub stack_size: u32,
    /// Limite de instruções por `run` (None = ilimitado)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u64>,
    pub shift_right_64: ShiftRight64,
    pub division_by_zero: DivisionByZero,
    pub scan_failure: ScanFailure,
    /// Emite um evento `trace` por instrução
    pub trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            max_cycles: None,
            shift_right_64: ShiftRight64::default(),
            division_by_zero: DivisionByZero::default(),
            scan_failure: ScanFailure::default(),
            trace: false,
        }
    }
}

impl VmConfig {
    pub fn with_stack_size(mut self, bytes: u32) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn with_max_cycles(mut self, limit: u64) -> Self {
        self.max_cycles = Some(limit);
        self
    }

    pub fn with_shift_right_64(mut self, mode: ShiftRight64) -> Self {
        self.shift_right_64 = mode;
        self
    }

    pub fn with_division_by_zero(mut self, policy: DivisionByZero) -> Self {
        self.division_by_zero = policy;
        self
    }

    pub fn with_scan_failure(mut self, policy: ScanFailure) -> Self {
        self.scan_failure = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(config.shift_right_64, ShiftRight64::Arithmetic);
        assert_eq!(config.division_by_zero, DivisionByZero::Trap);
        assert_eq!(config.scan_failure, ScanFailure::Zero);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: VmConfig = serde_json::from_str(
            r#"{"shift_right_64": "left-shift-quirk", "max_cycles": 1000}"#,
        )
        .unwrap();
        assert_eq!(config.shift_right_64, ShiftRight64::LeftShiftQuirk);
        assert_eq!(config.max_cycles, Some(1000));
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
    }
}
