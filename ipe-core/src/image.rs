//! Imagem de bytecode (.ipec)
//!
//! Layout em memória: segmento de dados (globais e textos) seguido do código.
//! A execução começa em `data_size`, onde o ligador coloca a sequência de
//! entrada (chamadas de inicialização de unidades, programa, `HALT`).
//!
//! Layout em arquivo: header, bytes da imagem, tabela de funções externas.

use std::fs;
use std::path::Path;

use crate::error::{VmError, VmResult};

/// Magic number: "IPEC"
pub const IPEC_MAGIC: u32 = 0x4345_5049;

/// Versão do formato
pub const IPEC_VERSION: u16 = 0x0100;

/// Header do arquivo .ipec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    pub magic: u32,
    pub version: u16,
    /// Tamanho do segmento de dados
    pub data_size: u32,
    /// Tamanho do código após o segmento de dados
    pub code_size: u32,
    /// Entradas na tabela externa
    pub extern_count: u32,
}

impl ImageHeader {
    /// Tamanho do header em bytes
    pub const SIZE: usize = 20;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        // 6..8 reservado
        bytes[8..12].copy_from_slice(&self.data_size.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.code_size.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.extern_count.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> VmResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(VmError::InvalidImage("header too short".into()));
        }
        let mut reader = Reader::new(bytes);
        let magic = reader.u32()?;
        if magic != IPEC_MAGIC {
            return Err(VmError::InvalidImage(format!(
                "invalid magic: expected 0x{:08X}, got 0x{:08X}",
                IPEC_MAGIC, magic
            )));
        }
        let version = reader.u16()?;
        if version >> 8 != IPEC_VERSION >> 8 {
            return Err(VmError::InvalidImage(format!(
                "unsupported version {}.{}",
                version >> 8,
                version & 0xFF
            )));
        }
        reader.u16()?;
        Ok(Self {
            magic,
            version,
            data_size: reader.u32()?,
            code_size: reader.u32()?,
            extern_count: reader.u32()?,
        })
    }
}

/// Entrada da tabela de funções externas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternDecl {
    pub name: String,
    /// Bytes de parâmetros que a máquina desempilha após a chamada
    pub param_bytes: u32,
}

/// Programa ligado, pronto para a máquina
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Tamanho do segmento de dados no início de `bytes`
    pub data_size: u32,
    /// Segmento de dados seguido do código
    pub bytes: Vec<u8>,
    /// Funções externas referenciadas por `ECALL`
    pub externs: Vec<ExternDecl>,
}

impl Image {
    /// Ponto de entrada
    pub fn entry(&self) -> u32 {
        self.data_size
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.data_size as usize]
    }

    pub fn code(&self) -> &[u8] {
        &self.bytes[self.data_size as usize..]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header = ImageHeader {
            magic: IPEC_MAGIC,
            version: IPEC_VERSION,
            data_size: self.data_size,
            code_size: self.bytes.len() as u32 - self.data_size,
            extern_count: self.externs.len() as u32,
        };
        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(&self.bytes);
        for ext in &self.externs {
            out.extend_from_slice(&(ext.name.len() as u16).to_le_bytes());
            out.extend_from_slice(ext.name.as_bytes());
            out.extend_from_slice(&ext.param_bytes.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> VmResult<Self> {
        let header = ImageHeader::from_bytes(bytes)?;
        let mut reader = Reader::new(&bytes[ImageHeader::SIZE..]);
        let total = header.data_size as usize + header.code_size as usize;
        let image_bytes = reader.take(total)?.to_vec();

        let mut externs = Vec::with_capacity(header.extern_count as usize);
        for _ in 0..header.extern_count {
            let len = reader.u16()? as usize;
            let name = std::str::from_utf8(reader.take(len)?)
                .map_err(|e| VmError::InvalidImage(format!("extern name: {}", e)))?
                .to_string();
            let param_bytes = reader.u32()?;
            externs.push(ExternDecl { name, param_bytes });
        }

        Ok(Self {
            data_size: header.data_size,
            bytes: image_bytes,
            externs,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> VmResult<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> VmResult<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

/// Leitor sequencial little-endian
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> VmResult<&'a [u8]> {
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(VmError::InvalidImage("truncated image".into()));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> VmResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> VmResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Image {
        Image {
            data_size: 8,
            bytes: vec![0, 0, 0, 0, 7, 0, 0, 0, 0x01],
            externs: vec![ExternDecl {
                name: "tamanho".into(),
                param_bytes: 4,
            }],
        }
    }

    #[test]
    fn test_file_layout() {
        let image = sample();
        let bytes = image.to_bytes();
        assert_eq!(&bytes[0..4], b"IPEC");
        assert_eq!(Image::from_bytes(&bytes).unwrap(), image);
        assert_eq!(image.entry(), 8);
        assert_eq!(image.code(), &[0x01]);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(Image::from_bytes(&bytes), Err(VmError::InvalidImage(_))));
    }

    #[test]
    fn test_truncated() {
        let bytes = sample().to_bytes();
        assert!(Image::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.ipec");
        sample().save(&path).unwrap();
        assert_eq!(Image::load(&path).unwrap(), sample());
    }
}
