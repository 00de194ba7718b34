use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::vm::BytecodeImage;
use crate::vm::decode::decode;
use crate::vm::error::DecodeError;

/// One instruction of a linear disassembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisasmLine {
    pub offset: usize,
    pub len: usize,
    pub text: String,
}

impl fmt::Display for DisasmLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}:\t{}", self.offset, self.text)
    }
}

/// Decodes the whole code section front to back. The sweep stops at the
/// first byte that does not decode.
pub fn disassemble(image: &BytecodeImage) -> Result<Vec<DisasmLine>, DecodeError> {
    let code = image.code();
    let mut lines = Vec::new();
    let mut pos = 0;
    while pos < code.len() {
        let (instr, len) = decode(code, pos)?;
        lines.push(DisasmLine {
            offset: pos,
            len,
            text: instr.render(|off| image.string_lossy(off)),
        });
        pos += len;
    }
    Ok(lines)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequencyEntry {
    pub count: usize,
    pub bytecode: String,
    /// Offset of the first occurrence.
    pub first: usize,
}

/// How often each distinct instruction encoding occurs in an image.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrequencyReport {
    pub total: usize,
    pub entries: Vec<FrequencyEntry>,
}

impl FrequencyReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for FrequencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{} occurrences of bytecode: \"{}\"", entry.count, entry.bytecode)?;
        }
        Ok(())
    }
}

/// Counts identical instruction byte sequences. Entries are sorted by
/// descending count, ties broken by first occurrence.
pub fn frequency(image: &BytecodeImage) -> Result<FrequencyReport, DecodeError> {
    let lines = disassemble(image)?;
    let code = image.code();
    let mut seen: FxHashMap<&[u8], usize> = FxHashMap::with_capacity_and_hasher(lines.len(), Default::default());
    let mut entries: Vec<FrequencyEntry> = Vec::new();

    for line in &lines {
        let bytes = &code[line.offset..line.offset + line.len];
        match seen.get(bytes) {
            Some(&idx) => entries[idx].count += 1,
            None => {
                seen.insert(bytes, entries.len());
                entries.push(FrequencyEntry {
                    count: 1,
                    bytecode: line.text.clone(),
                    first: line.offset,
                });
            }
        }
    }

    entries.sort_by(|a, b| b.count.cmp(&a.count).then(a.first.cmp(&b.first)));
    Ok(FrequencyReport {
        total: lines.len(),
        entries,
    })
}
