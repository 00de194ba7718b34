pub(super) use crate::{
    config::InterpreterConfig,
    vm::{BinOp, BytecodeImage, Fault, Instr, Interpreter, Loc, Patt, Step, VmError, Word, assemble},
};

use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

/// Output sink the test keeps a handle to after handing it to the interpreter.
#[derive(Clone, Default)]
pub(super) struct SharedOut(Rc<RefCell<Vec<u8>>>);

impl SharedOut {
    pub(super) fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedOut {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(super) fn test_config() -> InterpreterConfig {
    InterpreterConfig {
        stack_words: 4096,
        gc_threshold: 16,
        heap_limit: 100_000,
    }
}

pub(super) fn interpreter_with(image: BytecodeImage, config: &InterpreterConfig, input: &str) -> (Interpreter, SharedOut) {
    let out = SharedOut::default();
    let interp = Interpreter::with_io(
        image,
        config,
        Box::new(io::Cursor::new(input.as_bytes().to_vec())),
        Box::new(out.clone()),
    )
    .unwrap();
    (interp, out)
}

pub(super) fn interpreter(image: BytecodeImage) -> (Interpreter, SharedOut) {
    interpreter_with(image, &test_config(), "")
}

/// Runs `image` to completion, returning the outcome and everything written.
pub(super) fn run_image(image: BytecodeImage) -> (Result<(), Fault>, String) {
    let (mut interp, out) = interpreter(image);
    let res = interp.run();
    (res, out.text())
}

pub(super) fn run_code(instrs: &[Instr]) -> (Result<(), Fault>, String) {
    run_image(BytecodeImage::new(assemble(instrs)))
}

/// Runs `instrs` and returns the word the entry function left behind.
pub(super) fn eval(instrs: &[Instr]) -> Word {
    let (mut interp, _) = interpreter(BytecodeImage::new(assemble(instrs)));
    interp.run().unwrap();
    interp.stack().peek(0).unwrap()
}

/// Code offset just past `prefix`.
pub(super) fn offset_of(prefix: &[Instr]) -> u32 {
    prefix.iter().map(Instr::encoded_len).sum::<usize>() as u32
}

/// NUL-terminated string table and the offset of each entry.
pub(super) fn string_table(names: &[&str]) -> (Vec<u8>, Vec<u32>) {
    let mut table = Vec::new();
    let mut offsets = Vec::new();
    for name in names {
        offsets.push(table.len() as u32);
        table.extend_from_slice(name.as_bytes());
        table.push(0);
    }
    (table, offsets)
}

mod analysis;
mod binops;
mod closures;
mod frames;
