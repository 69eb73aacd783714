//! End-to-end coverage: build a small x86reference-shaped `Element` tree,
//! load it, build its trie, and decode the six worked byte sequences
//! (spec.md §8) through the public API exactly as a consumer would.

use x86ref::{build_trie, load_reference, DecodeError, Decoder, Element, Mode};

/// `<entry><syntax><mnem>MNEM</mnem>[<dst>..</dst>][<src>..</src>]*</syntax></entry>`
/// nested under a `<pri_opcd value="..">`, itself under `one-byte` or
/// `two-byte`.
fn operand_el(tag: &str, address: &str, ty: Option<&str>) -> Element {
    let mut el = Element::new(tag).with_attr("address", address);
    if let Some(ty) = ty {
        el = el.with_attr("type", ty);
    }
    el
}

fn entry_el(mnemonic: &str, operands: Vec<Element>) -> Element {
    let mut syntax = Element::new("syntax").with_child(Element::new("mnem").with_text(mnemonic));
    for op in operands {
        syntax = syntax.with_child(op);
    }
    Element::new("entry")
        .with_attr("mode", "e")
        .with_child(syntax)
}

fn pri_opcd(value: &str, entry: Element) -> Element {
    Element::new("pri_opcd")
        .with_attr("value", value)
        .with_child(entry)
}

fn build_reference() -> Element {
    Element::new("x86reference")
        .with_child(
            Element::new("one-byte")
                // 0x50 - PUSH, Z-addressing (expands to 0x50-0x57).
                .with_child(pri_opcd("50", entry_el("PUSH", vec![operand_el("dst", "Z", None)])))
                // 0x89 - MOV Ev, Gv.
                .with_child(pri_opcd(
                    "89",
                    entry_el(
                        "MOV",
                        vec![
                            operand_el("dst", "E", Some("vqp")),
                            operand_el("src", "G", Some("vqp")),
                        ],
                    ),
                ))
                // 0xE8 - CALL Jz.
                .with_child(pri_opcd("e8", entry_el("CALL", vec![operand_el("dst", "J", None)])))
                // 0xC3 - RET, no operands.
                .with_child(pri_opcd("c3", entry_el("RET", vec![]))),
        )
        .with_child(
            Element::new("two-byte")
                // 0F 1F - multi-byte NOP, Ev.
                .with_child(pri_opcd("1f", entry_el("NOP", vec![operand_el("dst", "E", Some("vqp"))]))),
        )
}

#[test]
fn test_loader_and_trie_then_decode_worked_scenarios() {
    let root = build_reference();
    let entries = load_reference(&root).expect("reference loads");
    let trie = build_trie(&entries).expect("trie builds");
    let decoder = Decoder::new(&entries, &trie, Mode::E);

    let cases: &[(&[u8], usize, &str)] = &[
        (&[0x55], 1, "PUSH"),
        (&[0x48, 0x89, 0xE5], 3, "MOV"),
        (&[0xE8, 0x4E, 0x00, 0x00, 0x00], 5, "CALL"),
        (&[0x0F, 0x1F, 0x44, 0x00, 0x00], 5, "NOP"),
        (&[0xC3], 1, "RET"),
        (&[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00], 6, "NOP"),
    ];

    for (bytes, expected_len, expected_mnemonic) in cases.iter().copied() {
        let insn = decoder
            .decode(bytes)
            .next()
            .unwrap_or_else(|| panic!("{bytes:02x?} decodes to something"))
            .unwrap_or_else(|e| panic!("{bytes:02x?} decodes without error, got {e}"));
        assert_eq!(insn.total_length, expected_len, "length for {bytes:02x?}");
        let mnemonic = entries[insn.entry.0].canonical_syntax().unwrap().mnemonic.as_str();
        assert_eq!(mnemonic, expected_mnemonic, "mnemonic for {bytes:02x?}");
    }
}

#[test]
fn test_unknown_byte_sequence_is_rejected() {
    let root = build_reference();
    let entries = load_reference(&root).unwrap();
    let trie = build_trie(&entries).unwrap();
    let decoder = Decoder::new(&entries, &trie, Mode::E);

    let err = decoder.decode(&[0xFF]).next().unwrap().unwrap_err();
    assert_eq!(err, DecodeError::Unknown);
}

#[test]
fn test_decode_multiple_instructions_in_one_buffer() {
    let root = build_reference();
    let entries = load_reference(&root).unwrap();
    let trie = build_trie(&entries).unwrap();
    let decoder = Decoder::new(&entries, &trie, Mode::E);

    let stream = [0x55u8, 0xC3, 0x55, 0xC3];
    let lengths: Vec<usize> = decoder
        .decode(&stream)
        .map(|r| r.unwrap().total_length)
        .collect();
    assert_eq!(lengths, vec![1, 1, 1, 1]);
}

