//! Sexp tag hashing.
//!
//! A tag name packs into 6 bits per character over a 64-symbol alphabet; at
//! most five characters fit a boxed 31-bit word.

use once_cell::sync::Lazy;

use crate::vm::{VmError, VmResult, Word};

const ALPHABET: &[u8; 64] = b"_abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789'";

pub const MAX_TAG_LEN: usize = 5;

static POSITIONS: Lazy<[Option<u8>; 256]> = Lazy::new(|| {
    let mut table = [None; 256];
    for (pos, &ch) in ALPHABET.iter().enumerate() {
        table[ch as usize] = Some(pos as u8);
    }
    table
});

/// `LtagHash`: boxed hash of a tag name.
pub fn tag_hash(name: &[u8]) -> VmResult<Word> {
    if name.len() > MAX_TAG_LEN {
        return Err(VmError::Runtime(format!(
            "tag {:?} longer than {MAX_TAG_LEN} characters",
            String::from_utf8_lossy(name)
        )));
    }
    let mut h: i32 = 0;
    for &ch in name {
        let pos = POSITIONS[ch as usize].ok_or_else(|| {
            VmError::Runtime(format!("tag hash: character not found: {:?}", ch as char))
        })?;
        h = (h << 6) | pos as i32;
    }
    Ok(Word::boxed(h))
}

/// Inverse of [`tag_hash`], used when printing sexps.
pub fn de_hash(tag: Word) -> String {
    let mut h = tag.unbox() as u32;
    let mut out = Vec::with_capacity(MAX_TAG_LEN);
    while h != 0 {
        out.push(ALPHABET[(h & 0x3F) as usize]);
        h >>= 6;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
