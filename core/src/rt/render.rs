//! Value printer behind `Lstring`.

use super::heap::{Heap, Object};
use super::tag::de_hash;
use crate::vm::Word;

/// Nesting beyond this prints as `...`; heap values may be cyclic.
const MAX_DEPTH: usize = 64;

pub fn render(heap: &Heap, value: Word) -> String {
    let mut out = String::new();
    write_value(heap, value, 0, &mut out);
    out
}

fn write_int(n: i32, out: &mut String) {
    let mut buf = itoa::Buffer::new();
    out.push_str(buf.format(n));
}

fn write_list(heap: &Heap, items: &[Word], depth: usize, out: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_value(heap, *item, depth + 1, out);
    }
}

fn write_value(heap: &Heap, value: Word, depth: usize, out: &mut String) {
    if value.is_unboxed() {
        write_int(value.unbox(), out);
        return;
    }
    if depth > MAX_DEPTH {
        out.push_str("...");
        return;
    }
    let Some(obj) = heap.get(value) else {
        out.push_str(if value.is_null() { "<null>" } else { "<dangling>" });
        return;
    };
    match obj {
        Object::String(bytes) => {
            out.push('"');
            out.push_str(&String::from_utf8_lossy(bytes));
            out.push('"');
        }
        Object::Array(items) => {
            out.push('[');
            write_list(heap, items, depth, out);
            out.push(']');
        }
        Object::Sexp { tag, fields } => {
            let name = de_hash(*tag);
            if name == "cons" {
                write_cons(heap, fields, depth, out);
            } else {
                out.push_str(&name);
                if !fields.is_empty() {
                    out.push_str(" (");
                    write_list(heap, fields, depth, out);
                    out.push(')');
                }
            }
        }
        Object::Closure { entry, captures } => {
            out.push_str(&format!("<closure {entry:#x}"));
            for cap in captures {
                out.push_str(", ");
                write_value(heap, *cap, depth + 1, out);
            }
            out.push('>');
        }
        Object::Ref(_) => out.push_str("<ref>"),
    }
}

/// `cons` cells print as `{a, b, c}`, following the tail until it is unboxed.
fn write_cons(heap: &Heap, first: &[Word], depth: usize, out: &mut String) {
    out.push('{');
    let mut cell = first;
    let mut steps = 0usize;
    while let [head, tail, ..] = cell {
        write_value(heap, *head, depth + 1, out);
        match heap.get(*tail) {
            Some(Object::Sexp { fields, .. }) if !tail.is_unboxed() && steps < 1 << 20 => {
                out.push_str(", ");
                cell = fields;
                steps += 1;
            }
            _ => break,
        }
    }
    out.push('}');
}
