//! Bytecode image container.
//!
//! Layout (all integers little-endian `u32`):
//!
//! ```text
//! [string table size] [global area size] [public symbol count]
//! [public symbols: (name offset, code offset) * count]
//! [string table bytes]
//! [code bytes ... to end of file]
//! ```

use std::path::Path;

use anyhow::{Context, Result, ensure};
use tracing::debug;

use super::error::{DecodeError, VmError, VmResult};
use super::word::Word;

const HEADER_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicSymbol {
    /// Offset of the symbol name in the string table.
    pub name: u32,
    /// Code offset of the symbol.
    pub offset: u32,
}

/// A loaded program. Only the global area changes after loading.
#[derive(Debug, Clone, Default)]
pub struct BytecodeImage {
    strings: Vec<u8>,
    globals: Vec<Word>,
    publics: Vec<PublicSymbol>,
    code: Vec<u8>,
}

impl BytecodeImage {
    pub fn new(code: Vec<u8>) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }

    pub fn with_strings(mut self, strings: Vec<u8>) -> Self {
        self.strings = strings;
        self
    }

    pub fn with_globals(mut self, count: usize) -> Self {
        self.globals = vec![Word::NULL; count];
        self
    }

    pub fn with_public(mut self, name: u32, offset: u32) -> Self {
        self.publics.push(PublicSymbol { name, offset });
        self
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("failed to read bytecode file {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("malformed bytecode file {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(bytes.len() >= HEADER_WORDS * 4, "file too small for header ({} bytes)", bytes.len());

        let mut cursor = 0usize;
        let string_size = read_u32(bytes, &mut cursor)? as usize;
        let global_size = read_u32(bytes, &mut cursor)? as usize;
        let public_count = read_u32(bytes, &mut cursor)? as usize;

        let public_bytes = public_count
            .checked_mul(8)
            .context("public symbol table size overflows")?;
        ensure!(
            cursor + public_bytes <= bytes.len(),
            "public symbol table ({public_count} entries) exceeds file size"
        );
        let mut publics = Vec::with_capacity(public_count);
        for _ in 0..public_count {
            let name = read_u32(bytes, &mut cursor)?;
            let offset = read_u32(bytes, &mut cursor)?;
            publics.push(PublicSymbol { name, offset });
        }

        ensure!(
            cursor + string_size <= bytes.len(),
            "string table ({string_size} bytes) exceeds file size"
        );
        let strings = bytes[cursor..cursor + string_size].to_vec();
        cursor += string_size;
        let code = bytes[cursor..].to_vec();

        debug!(
            target: "lama::vm::image",
            strings = string_size,
            globals = global_size,
            publics = public_count,
            code = code.len(),
            "image loaded"
        );

        Ok(Self {
            strings,
            globals: vec![Word::NULL; global_size],
            publics,
            code,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_WORDS * 4 + self.publics.len() * 8 + self.strings.len() + self.code.len());
        out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.globals.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.publics.len() as u32).to_le_bytes());
        for sym in &self.publics {
            out.extend_from_slice(&sym.name.to_le_bytes());
            out.extend_from_slice(&sym.offset.to_le_bytes());
        }
        out.extend_from_slice(&self.strings);
        out.extend_from_slice(&self.code);
        out
    }

    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn string_table(&self) -> &[u8] {
        &self.strings
    }

    /// NUL-terminated string starting at `offset`. A string running to the end
    /// of the table without a terminator is returned as-is.
    pub fn string_at(&self, offset: u32) -> VmResult<&[u8]> {
        let tail = self
            .strings
            .get(offset as usize..)
            .filter(|tail| !tail.is_empty())
            .ok_or(VmError::Decode(DecodeError::StringOutOfRange { offset }))?;
        let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        Ok(&tail[..end])
    }

    pub fn string_lossy(&self, offset: u32) -> Option<String> {
        self.string_at(offset)
            .ok()
            .map(|s| String::from_utf8_lossy(s).into_owned())
    }

    pub fn globals(&self) -> &[Word] {
        &self.globals
    }

    pub fn global(&self, index: usize) -> VmResult<Word> {
        self.globals.get(index).copied().ok_or(VmError::InvalidLocation {
            kind: "global",
            index: index as i64,
        })
    }

    pub fn set_global(&mut self, index: usize, value: Word) -> VmResult<()> {
        let slot = self.globals.get_mut(index).ok_or(VmError::InvalidLocation {
            kind: "global",
            index: index as i64,
        })?;
        *slot = value;
        Ok(())
    }

    pub fn publics(&self) -> &[PublicSymbol] {
        &self.publics
    }

    /// Public symbols with their names resolved.
    pub fn public_names(&self) -> Vec<(String, u32)> {
        self.publics
            .iter()
            .map(|sym| {
                let name = self.string_lossy(sym.name).unwrap_or_else(|| format!("@{}", sym.name));
                (name, sym.offset)
            })
            .collect()
    }
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let end = *cursor + 4;
    ensure!(end <= bytes.len(), "unexpected end of file at byte {}", *cursor);
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[*cursor..end]);
    *cursor = end;
    Ok(u32::from_le_bytes(buf))
}
