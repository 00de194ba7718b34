//! Bytecode interpreter for Lama stack-machine images
//!
//! This module contains the instruction set, the decoder, the operand stack and
//! execution state, and the dispatch loop. Heap objects and I/O primitives live
//! in [`crate::rt`].

mod analysis;
mod bytecode;
mod decode;
mod error;
mod image;
mod interp;
mod stack;
mod state;
mod word;

pub use analysis::*;
pub use bytecode::*;
pub use decode::*;
pub use error::*;
pub use image::*;
pub use interp::*;
pub use stack::*;
pub use state::*;
pub use word::*;

#[cfg(test)]
mod vm_test;
