use super::*;
use crate::vm::{DecodeError, disassemble, frequency};

fn sample_image() -> BytecodeImage {
    let (table, offs) = string_table(&["main", "hi"]);
    let code = assemble(&[
        Instr::Begin { nargs: 2, nlocals: 0 },
        Instr::Const(1),
        Instr::Const(1),
        Instr::Binop(BinOp::Add),
        Instr::String(offs[1]),
        Instr::Drop,
        Instr::Const(1),
        Instr::CallWrite,
        Instr::End,
    ]);
    BytecodeImage::new(code).with_strings(table).with_public(offs[0], 0)
}

#[test]
fn test_disassemble_lists_every_instruction() {
    let lines = disassemble(&sample_image()).unwrap();
    let text: Vec<String> = lines.iter().map(ToString::to_string).collect();
    assert_eq!(
        text,
        vec![
            "0x00000000:\tBEGIN\t2 0",
            "0x00000009:\tCONST\t1",
            "0x0000000e:\tCONST\t1",
            "0x00000013:\tBINOP\t+",
            "0x00000014:\tSTRING\thi",
            "0x00000019:\tDROP",
            "0x0000001a:\tCONST\t1",
            "0x0000001f:\tCALL\tLwrite",
            "0x00000020:\tEND",
        ]
    );
}

#[test]
fn test_frequency_orders_by_count_then_first_seen() {
    let report = frequency(&sample_image()).unwrap();
    assert_eq!(report.total, 9);
    let counts: Vec<(usize, &str)> = report.entries.iter().map(|e| (e.count, e.bytecode.as_str())).collect();
    assert_eq!(
        counts,
        vec![
            (3, "CONST\t1"),
            (1, "BEGIN\t2 0"),
            (1, "BINOP\t+"),
            (1, "STRING\thi"),
            (1, "DROP"),
            (1, "CALL\tLwrite"),
            (1, "END"),
        ]
    );
    let text = report.to_string();
    assert!(text.starts_with("3 occurrences of bytecode: \"CONST\t1\"\n"), "{text}");
    assert_eq!(text.lines().count(), 7);
}

#[test]
fn test_frequency_report_serializes_to_json() {
    let report = frequency(&sample_image()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["total"], 9);
    assert_eq!(json["entries"][0]["count"], 3);
    assert_eq!(json["entries"][0]["bytecode"], "CONST\t1");
    assert_eq!(json["entries"][0]["first"], 9);
}

#[test]
fn test_analysis_stops_on_undecodable_byte() {
    let mut code = assemble(&[Instr::Begin { nargs: 2, nlocals: 0 }]);
    code.push(0x1C);
    let image = BytecodeImage::new(code);
    assert_eq!(
        disassemble(&image).unwrap_err(),
        DecodeError::UnknownOpcode { offset: 9, byte: 0x1C }
    );
    assert!(frequency(&image).is_err());
}

#[test]
fn test_image_bytes_round_trip() {
    let image = sample_image().with_globals(3);
    let loaded = BytecodeImage::from_bytes(&image.to_bytes()).unwrap();
    assert_eq!(loaded.code(), image.code());
    assert_eq!(loaded.globals().len(), 3);
    assert_eq!(loaded.public_names(), vec![("main".to_string(), 0)]);
    assert_eq!(loaded.string_at(5).unwrap(), b"hi");
}

#[test]
fn test_truncated_image_is_rejected() {
    assert!(BytecodeImage::from_bytes(&[1, 0, 0]).is_err());

    // Header claims a 100-byte string table in a 12-byte file.
    let mut bytes = Vec::new();
    for word in [100u32, 0, 0] {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    let err = BytecodeImage::from_bytes(&bytes).unwrap_err();
    assert!(err.to_string().contains("string table"), "{err}");
}
