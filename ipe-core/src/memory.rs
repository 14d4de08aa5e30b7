//! Memória da máquina
//!
//! Um único vetor de bytes: o segmento de dados da imagem (globais e textos)
//! ocupa o prefixo e a pilha cresce logo depois dele. Endereços são offsets
//! absolutos em bytes; todo acesso é verificado contra o tamanho do vetor.

use crate::error::{VmError, VmResult};

/// Tamanho de uma célula da pilha
pub const CELL: u32 = 4;

/// Arredonda um tamanho em bytes para células inteiras
pub const fn cells_for(bytes: u32) -> u32 {
    bytes.div_ceil(CELL)
}

/// Memória plana endereçada por byte
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
    /// Fim do segmento de dados (início da pilha, alinhado a célula)
    stack_base: u32,
}

impl Memory {
    /// Cria memória com `size` bytes e copia o segmento de dados para o início
    pub fn new(size: u32, data: &[u8]) -> VmResult<Self> {
        let stack_base = cells_for(data.len() as u32) * CELL;
        if stack_base >= size {
            return Err(VmError::StackOverflow);
        }
        let mut bytes = vec![0u8; size as usize];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self { bytes, stack_base })
    }

    /// Memória sem bytes, antes de carregar uma imagem
    pub fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            stack_base: 0,
        }
    }

    /// Primeiro endereço da pilha
    pub fn stack_base(&self) -> u32 {
        self.stack_base
    }

    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn range(&self, address: u32, len: u32) -> VmResult<std::ops::Range<usize>> {
        let start = address as usize;
        let end = start + len as usize;
        if end > self.bytes.len() {
            return Err(VmError::AddressOutOfBounds { address, offset: 0 });
        }
        Ok(start..end)
    }

    // ─── Leitura ───

    pub fn read_u8(&self, address: u32) -> VmResult<u8> {
        let r = self.range(address, 1)?;
        Ok(self.bytes[r.start])
    }

    pub fn read_u16(&self, address: u32) -> VmResult<u16> {
        let r = self.range(address, 2)?;
        Ok(u16::from_le_bytes([self.bytes[r.start], self.bytes[r.start + 1]]))
    }

    pub fn read_u32(&self, address: u32) -> VmResult<u32> {
        let r = self.range(address, 4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[r]);
        Ok(u32::from_le_bytes(buf))
    }

    /// 64 bits: célula baixa primeiro
    pub fn read_u64(&self, address: u32) -> VmResult<u64> {
        let r = self.range(address, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[r]);
        Ok(u64::from_le_bytes(buf))
    }

    // ─── Escrita ───

    pub fn write_u8(&mut self, address: u32, value: u8) -> VmResult<()> {
        let r = self.range(address, 1)?;
        self.bytes[r.start] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, address: u32, value: u16) -> VmResult<()> {
        let r = self.range(address, 2)?;
        self.bytes[r].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, address: u32, value: u32) -> VmResult<()> {
        let r = self.range(address, 4)?;
        self.bytes[r].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write_u64(&mut self, address: u32, value: u64) -> VmResult<()> {
        let r = self.range(address, 8)?;
        self.bytes[r].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Zera `len` bytes a partir de `address`
    pub fn fill_zero(&mut self, address: u32, len: u32) -> VmResult<()> {
        let r = self.range(address, len)?;
        self.bytes[r].fill(0);
        Ok(())
    }

    /// Copia `len` bytes; as regiões podem se sobrepor
    pub fn copy(&mut self, from: u32, to: u32, len: u32) -> VmResult<()> {
        let src = self.range(from, len)?;
        self.range(to, len)?;
        self.bytes.copy_within(src, to as usize);
        Ok(())
    }

    // ─── Textos UTF-16 terminados em zero ───

    /// Quantidade de unidades de código até o terminador
    pub fn string_len(&self, address: u32) -> VmResult<u32> {
        let mut len = 0;
        while self.read_u16(address + len * 2)? != 0 {
            len += 1;
        }
        Ok(len)
    }

    pub fn read_units(&self, address: u32) -> VmResult<Vec<u16>> {
        let len = self.string_len(address)?;
        (0..len).map(|i| self.read_u16(address + i * 2)).collect()
    }

    pub fn read_string(&self, address: u32) -> VmResult<String> {
        Ok(String::from_utf16_lossy(&self.read_units(address)?))
    }

    /// Grava unidades e o terminador
    pub fn write_units(&mut self, address: u32, units: &[u16]) -> VmResult<()> {
        for (i, &unit) in units.iter().enumerate() {
            self.write_u16(address + i as u32 * 2, unit)?;
        }
        self.write_u16(address + units.len() as u32 * 2, 0)
    }

    pub fn write_string(&mut self, address: u32, text: &str) -> VmResult<()> {
        let units: Vec<u16> = text.encode_utf16().collect();
        self.write_units(address, &units)
    }
}

/// Codifica um texto como unidades UTF-16 LE terminadas em zero
pub fn encode_string(text: &str) -> Vec<u8> {
    let mut out: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    out.extend_from_slice(&[0, 0]);
    out
}
