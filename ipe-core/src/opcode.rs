//! Opcodes da máquina IPE
//!
//! Definição de todos os opcodes da ISA da máquina de pilha. Cada opcode ocupa
//! um byte seguido de um operando imediato de largura fixa (ou nenhum).
//!
//! Famílias por largura: inteiros de 8/16/32 bits compartilham a família `32`
//! (ocupam uma célula de 4 bytes na pilha), inteiros de 64 bits usam a família
//! `64`, e `F`/`D` são ponto flutuante de 32 e 64 bits.

use std::fmt;

/// Categorias de opcode (faixas de byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeCategory {
    /// Controle de fluxo (0x00-0x0F)
    Control,
    /// Constantes e endereços (0x10-0x1F)
    Constant,
    /// Leituras de memória (0x20-0x2F)
    Load,
    /// Escritas e cópias de memória (0x30-0x3F)
    Store,
    /// Aritmética inteira 32 bits (0x40-0x4F)
    Int32,
    /// Aritmética inteira 64 bits (0x50-0x5F)
    Int64,
    /// Aritmética de ponto flutuante (0x60-0x6F)
    Float,
    /// Comparações (0x70-0x8F)
    Compare,
    /// Conversões (0x90-0x9F)
    Convert,
    /// Manipulação de pilha (0xA0-0xAF)
    Stack,
    /// Entrada e saída (0xB0-0xC1)
    Io,
}

impl OpcodeCategory {
    /// Obtém categoria de um byte de opcode
    pub fn from_opcode(byte: u8) -> Self {
        match byte {
            0x00..=0x0F => Self::Control,
            0x10..=0x1F => Self::Constant,
            0x20..=0x2F => Self::Load,
            0x30..=0x3F => Self::Store,
            0x40..=0x4F => Self::Int32,
            0x50..=0x5F => Self::Int64,
            0x60..=0x6F => Self::Float,
            0x70..=0x8F => Self::Compare,
            0x90..=0x9F => Self::Convert,
            0xA0..=0xAF => Self::Stack,
            _ => Self::Io,
        }
    }
}

/// Formato do operando imediato que segue o byte de opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
}

impl Operand {
    /// Tamanho em bytes
    pub const fn size(self) -> usize {
        match self {
            Operand::None => 0,
            Operand::U8 => 1,
            Operand::I16 | Operand::U16 => 2,
            Operand::I32 | Operand::U32 => 4,
            Operand::I64 => 8,
        }
    }
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $byte:literal, $mnemonic:literal, $operand:ident; )*) => {
        /// Opcodes da máquina
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $byte, )*
        }

        impl Opcode {
            /// Todos os opcodes, em ordem de byte
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name),*];

            /// Decodifica um byte
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Mnemônico usado pelo disassembler
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Formato do operando imediato
            pub fn operand(self) -> Operand {
                match self {
                    $( Opcode::$name => Operand::$operand, )*
                }
            }
        }
    };
}

opcodes! {
    // ═══════════════════════════════════════════════════════════════
    // CONTROLE DE FLUXO (0x00-0x0F)
    // ═══════════════════════════════════════════════════════════════

    /// Sem operação
    Nop = 0x00, "NOP", None;
    /// Para o laço de execução
    Halt = 0x01, "HALT", None;
    /// Desvio incondicional: desempilha deslocamento
    Jmp = 0x02, "JMP", None;
    /// Desvio se verdadeiro: desempilha deslocamento e condição
    Jt = 0x03, "JT", None;
    /// Desvio se falso: desempilha deslocamento e condição
    Jf = 0x04, "JF", None;
    /// Chamada: desempilha deslocamento, empilha ip de retorno e bp
    Call = 0x05, "CALL", None;
    /// Retorno: restaura bp e ip
    Ret = 0x06, "RET", None;
    /// Retorno descartando n células de parâmetros
    Retn = 0x07, "RETN", U16;
    /// Chamada de função nativa por índice
    Ecall = 0x08, "ECALL", U16;
    /// Ajusta sp em n bytes (positivo zera a região reservada)
    Stack = 0x09, "STACK", I32;

    // ═══════════════════════════════════════════════════════════════
    // CONSTANTES (0x10-0x1F)
    // ═══════════════════════════════════════════════════════════════

    /// Constante de 8 bits sem sinal (bool, byte)
    Lcb = 0x10, "LCB", U8;
    /// Constante de 16 bits com sinal (short)
    Lcs = 0x11, "LCS", I16;
    /// Constante de 16 bits sem sinal (char)
    Lcc = 0x12, "LCC", U16;
    /// Constante de 32 bits
    Lc32 = 0x13, "LC32", I32;
    /// Constante de 64 bits (duas células)
    Lc64 = 0x14, "LC64", I64;
    /// Empilha o endereço absoluto de bp + deslocamento
    Leal = 0x15, "LEAL", I32;

    // ═══════════════════════════════════════════════════════════════
    // LEITURAS (0x20-0x2F): global, local (bp), pilha (endereço no topo)
    // ═══════════════════════════════════════════════════════════════

    Ldg8 = 0x20, "LDG8", U32;
    Ldg16s = 0x21, "LDG16S", U32;
    Ldg16u = 0x22, "LDG16U", U32;
    Ldg32 = 0x23, "LDG32", U32;
    Ldg64 = 0x24, "LDG64", U32;
    Ldl8 = 0x25, "LDL8", I32;
    Ldl16s = 0x26, "LDL16S", I32;
    Ldl16u = 0x27, "LDL16U", I32;
    Ldl32 = 0x28, "LDL32", I32;
    Ldl64 = 0x29, "LDL64", I32;
    Lds8 = 0x2A, "LDS8", None;
    Lds16s = 0x2B, "LDS16S", None;
    Lds16u = 0x2C, "LDS16U", None;
    Lds32 = 0x2D, "LDS32", None;
    Lds64 = 0x2E, "LDS64", None;

    // ═══════════════════════════════════════════════════════════════
    // ESCRITAS (0x30-0x3F)
    // ═══════════════════════════════════════════════════════════════

    Stg8 = 0x30, "STG8", U32;
    Stg16 = 0x31, "STG16", U32;
    Stg32 = 0x32, "STG32", U32;
    Stg64 = 0x33, "STG64", U32;
    Stl8 = 0x34, "STL8", I32;
    Stl16 = 0x35, "STL16", I32;
    Stl32 = 0x36, "STL32", I32;
    Stl64 = 0x37, "STL64", I32;
    /// Desempilha endereço, depois o valor
    Sts8 = 0x38, "STS8", None;
    Sts16 = 0x39, "STS16", None;
    Sts32 = 0x3A, "STS32", None;
    Sts64 = 0x3B, "STS64", None;
    /// Desempilha endereço e empilha n bytes lidos dele (arredondado a células)
    Pushmem = 0x3C, "PUSHMEM", U32;
    /// Desempilha endereço, depois n bytes de valor, e os grava no endereço
    Popmem = 0x3D, "POPMEM", U32;

    // ═══════════════════════════════════════════════════════════════
    // INTEIROS 32 BITS (0x40-0x4F)
    // ═══════════════════════════════════════════════════════════════

    Add32 = 0x40, "ADD32", None;
    Sub32 = 0x41, "SUB32", None;
    Mul32 = 0x42, "MUL32", None;
    Div32 = 0x43, "DIV32", None;
    Mod32 = 0x44, "MOD32", None;
    Neg32 = 0x45, "NEG32", None;
    And32 = 0x46, "AND32", None;
    Or32 = 0x47, "OR32", None;
    Xor32 = 0x48, "XOR32", None;
    Not32 = 0x49, "NOT32", None;
    Shl32 = 0x4A, "SHL32", None;
    Shr32 = 0x4B, "SHR32", None;
    Ushr32 = 0x4C, "USHR32", None;
    /// Negação lógica (0 <-> 1)
    Lnot = 0x4D, "LNOT", None;

    // ═══════════════════════════════════════════════════════════════
    // INTEIROS 64 BITS (0x50-0x5F)
    // ═══════════════════════════════════════════════════════════════

    Add64 = 0x50, "ADD64", None;
    Sub64 = 0x51, "SUB64", None;
    Mul64 = 0x52, "MUL64", None;
    Div64 = 0x53, "DIV64", None;
    Mod64 = 0x54, "MOD64", None;
    Neg64 = 0x55, "NEG64", None;
    And64 = 0x56, "AND64", None;
    Or64 = 0x57, "OR64", None;
    Xor64 = 0x58, "XOR64", None;
    Not64 = 0x59, "NOT64", None;
    /// Contagem de deslocamento é uma célula de 32 bits
    Shl64 = 0x5A, "SHL64", None;
    Shr64 = 0x5B, "SHR64", None;
    Ushr64 = 0x5C, "USHR64", None;

    // ═══════════════════════════════════════════════════════════════
    // PONTO FLUTUANTE (0x60-0x6F)
    // ═══════════════════════════════════════════════════════════════

    AddF = 0x60, "ADDF", None;
    SubF = 0x61, "SUBF", None;
    MulF = 0x62, "MULF", None;
    DivF = 0x63, "DIVF", None;
    ModF = 0x64, "MODF", None;
    NegF = 0x65, "NEGF", None;
    AddD = 0x68, "ADDD", None;
    SubD = 0x69, "SUBD", None;
    MulD = 0x6A, "MULD", None;
    DivD = 0x6B, "DIVD", None;
    ModD = 0x6C, "MODD", None;
    NegD = 0x6D, "NEGD", None;

    // ═══════════════════════════════════════════════════════════════
    // COMPARAÇÕES (0x70-0x87): empilham 0 ou 1
    // ═══════════════════════════════════════════════════════════════

    Eq32 = 0x70, "EQ32", None;
    Ne32 = 0x71, "NE32", None;
    Gt32 = 0x72, "GT32", None;
    Ge32 = 0x73, "GE32", None;
    Lt32 = 0x74, "LT32", None;
    Le32 = 0x75, "LE32", None;
    Eq64 = 0x76, "EQ64", None;
    Ne64 = 0x77, "NE64", None;
    Gt64 = 0x78, "GT64", None;
    Ge64 = 0x79, "GE64", None;
    Lt64 = 0x7A, "LT64", None;
    Le64 = 0x7B, "LE64", None;
    EqF = 0x7C, "EQF", None;
    NeF = 0x7D, "NEF", None;
    GtF = 0x7E, "GTF", None;
    GeF = 0x7F, "GEF", None;
    LtF = 0x80, "LTF", None;
    LeF = 0x81, "LEF", None;
    EqD = 0x82, "EQD", None;
    NeD = 0x83, "NED", None;
    GtD = 0x84, "GTD", None;
    GeD = 0x85, "GED", None;
    LtD = 0x86, "LTD", None;
    LeD = 0x87, "LED", None;

    // ═══════════════════════════════════════════════════════════════
    // CONVERSÕES (0x90-0x9F)
    // ═══════════════════════════════════════════════════════════════

    I2L = 0x90, "I2L", None;
    L2I = 0x91, "L2I", None;
    I2F = 0x92, "I2F", None;
    I2D = 0x93, "I2D", None;
    L2F = 0x94, "L2F", None;
    L2D = 0x95, "L2D", None;
    F2I = 0x96, "F2I", None;
    F2L = 0x97, "F2L", None;
    D2I = 0x98, "D2I", None;
    D2L = 0x99, "D2L", None;
    F2D = 0x9A, "F2D", None;
    D2F = 0x9B, "D2F", None;
    /// Trunca para 8 bits sem sinal
    I2B = 0x9C, "I2B", None;
    /// Trunca para 16 bits com sinal
    I2S = 0x9D, "I2S", None;
    /// Trunca para 16 bits sem sinal
    I2C = 0x9E, "I2C", None;
    /// Diferente de zero vira 1
    I2Z = 0x9F, "I2Z", None;

    // ═══════════════════════════════════════════════════════════════
    // PILHA (0xA0-0xAF)
    // ═══════════════════════════════════════════════════════════════

    Pop = 0xA0, "POP", None;
    Pop2 = 0xA1, "POP2", None;
    Popn = 0xA2, "POPN", U16;
    Dup = 0xA3, "DUP", None;
    Dup64 = 0xA4, "DUP64", None;
    Dupn = 0xA5, "DUPN", U16;
    Dup64n = 0xA6, "DUP64N", U16;

    // ═══════════════════════════════════════════════════════════════
    // ENTRADA E SAÍDA (0xB0-0xC1)
    // ═══════════════════════════════════════════════════════════════

    PrintZ = 0xB0, "PRINTZ", None;
    Print8 = 0xB1, "PRINT8", None;
    PrintC = 0xB2, "PRINTC", None;
    Print16 = 0xB3, "PRINT16", None;
    Print32 = 0xB4, "PRINT32", None;
    Print64 = 0xB5, "PRINT64", None;
    PrintF = 0xB6, "PRINTF", None;
    PrintD = 0xB7, "PRINTD", None;
    /// Desempilha endereço de texto UTF-16 terminado em zero
    PrintS = 0xB8, "PRINTS", None;
    ScanZ = 0xB9, "SCANZ", None;
    Scan8 = 0xBA, "SCAN8", None;
    ScanC = 0xBB, "SCANC", None;
    Scan16 = 0xBC, "SCAN16", None;
    Scan32 = 0xBD, "SCAN32", None;
    Scan64 = 0xBE, "SCAN64", None;
    ScanF = 0xBF, "SCANF", None;
    ScanD = 0xC0, "SCAND", None;
    /// Lê texto para um vetor de char com capacidade n
    ScanS = 0xC1, "SCANS", U32;
}

impl Opcode {
    /// Categoria do opcode
    pub fn category(self) -> OpcodeCategory {
        OpcodeCategory::from_opcode(self as u8)
    }

    /// Tamanho total da instrução (opcode + operando)
    pub fn size(self) -> usize {
        1 + self.operand().size()
    }

    /// Desvios e chamadas consomem um deslocamento empilhado por `LC32`
    pub fn is_transfer(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Jt | Opcode::Jf | Opcode::Call)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op as u8), Some(op));
        }
        assert_eq!(Opcode::from_byte(0xFF), None);
        assert_eq!(Opcode::from_byte(0x0A), None);
    }

    #[test]
    fn test_categories() {
        assert_eq!(Opcode::Jmp.category(), OpcodeCategory::Control);
        assert_eq!(Opcode::Ldl64.category(), OpcodeCategory::Load);
        assert_eq!(Opcode::Popmem.category(), OpcodeCategory::Store);
        assert_eq!(Opcode::LeD.category(), OpcodeCategory::Compare);
        assert_eq!(Opcode::ScanS.category(), OpcodeCategory::Io);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(Opcode::Lc32.size(), 5);
        assert_eq!(Opcode::Lc64.size(), 9);
        assert_eq!(Opcode::Lcb.size(), 2);
        assert_eq!(Opcode::Retn.size(), 3);
        assert_eq!(Opcode::Add32.size(), 1);
    }

    #[test]
    fn test_mnemonics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for &op in Opcode::ALL {
            assert!(seen.insert(op.mnemonic()), "duplicado: {}", op);
        }
    }
}
