//! Turns a byte buffer into a stream of decoded instructions (spec.md §4.4).
//!
//! The state machine is: consume legacy/REX prefixes, walk the trie against
//! whatever remains, select exactly one [`Entry`] from the candidates the
//! walk turns up, then resolve ModR/M, SIB, displacement, and immediate
//! bytes off that entry's canonical [`Syntax`] to learn the instruction's
//! total length.

use std::{error, fmt};

use crate::cursor::{ByteCursor, CursorError};
use crate::model::entry::{Entry, EntryId};
use crate::model::enums::{Address, Mode};
use crate::trie::Trie;

/// Errors raised while decoding a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The trie walk produced no candidates at all.
    Unknown,
    /// More than one candidate survived mode-filtering (or mode-filtering
    /// left none at all - spec.md §4.4: "if the restricted set is zero or
    /// many, report ambiguity").
    Ambiguous,
    /// The resolved instruction would be longer than 15 bytes, or the
    /// buffer ran out before decoding finished.
    BufferOverflow,
    /// An operand's addressing method calls for a sized immediate but its
    /// `OperandType` doesn't denote one (spec.md §4.4 closing paragraph).
    UnsupportedOperand(Address),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("no entry matches this byte sequence"),
            Self::Ambiguous => f.write_str("more than one entry matches this byte sequence"),
            Self::BufferOverflow => f.write_str("instruction exceeds 15 bytes"),
            Self::UnsupportedOperand(addr) => {
                write!(f, "operand addressing method {addr:?} has no resolvable immediate size")
            }
        }
    }
}

impl error::Error for DecodeError {}

impl From<CursorError> for DecodeError {
    fn from(_: CursorError) -> Self {
        // Running out of bytes mid-decode is, from the caller's point of
        // view, the same complaint as a too-long one: the buffer doesn't
        // hold a well-formed instruction.
        Self::BufferOverflow
    }
}

/// x86 segment a segment-override prefix selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Cs,
    Ss,
    Ds,
    Es,
    Fs,
    Gs,
}

/// One recognised prefix byte and what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixKind {
    Lock,
    Repne,
    Rep,
    SegmentOverride(Segment),
    OperandSizeOverride,
    AddressSizeOverride,
    /// 64-bit mode only; carries the raw byte so its W/R/X/B bits can be
    /// read back out.
    Rex(u8),
}

/// A prefix byte consumed ahead of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumedPrefix {
    pub byte: u8,
    pub kind: PrefixKind,
}

fn classify_prefix(byte: u8, mode: Mode) -> Option<PrefixKind> {
    use PrefixKind::*;
    use Segment::*;
    match byte {
        0xF0 => Some(Lock),
        0xF2 => Some(Repne),
        0xF3 => Some(Rep),
        0x2E => Some(SegmentOverride(Cs)),
        0x36 => Some(SegmentOverride(Ss)),
        0x3E => Some(SegmentOverride(Ds)),
        0x26 => Some(SegmentOverride(Es)),
        0x64 => Some(SegmentOverride(Fs)),
        0x65 => Some(SegmentOverride(Gs)),
        0x66 => Some(OperandSizeOverride),
        0x67 => Some(AddressSizeOverride),
        0x40..=0x4F if mode == Mode::E => Some(Rex(byte)),
        _ => None,
    }
}

/// One fully decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub prefixes: Vec<ConsumedPrefix>,
    pub rex_prefix: Option<ConsumedPrefix>,
    pub entry: EntryId,
    pub modrm: Option<u8>,
    pub sib: Option<u8>,
    /// `(size_in_bytes, sign_extended_value)`.
    pub immediate: Option<(u8, i64)>,
    pub total_length: usize,
}

/// Sign-extend a little-endian byte slice of length 1, 2, 4, or 8 into an
/// `i64`.
fn sign_extend_le(bytes: &[u8]) -> i64 {
    match bytes.len() {
        1 => i64::from(bytes[0] as i8),
        2 => i64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        4 => i64::from(i32::from_le_bytes(bytes.try_into().unwrap())),
        8 => i64::from_le_bytes(bytes.try_into().unwrap()),
        n => unreachable!("immediate_size_bytes never returns {n}"),
    }
}

/// Decodes instructions against a loaded catalog and its trie, in a fixed
/// operating mode (spec.md §4.4: "Inputs: an immutable trie, a buffer of ≤
/// 15 bytes, and the current operating mode").
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    entries: &'a [Entry],
    trie: &'a Trie<EntryId>,
    mode: Mode,
}

impl<'a> Decoder<'a> {
    #[must_use]
    pub fn new(entries: &'a [Entry], trie: &'a Trie<EntryId>, mode: Mode) -> Self {
        Self { entries, trie, mode }
    }

    /// Decode every instruction in `bytes`, stopping at the first error.
    #[must_use]
    pub fn decode<'b>(&self, bytes: &'b [u8]) -> DecodeIter<'a, 'b> {
        DecodeIter {
            decoder: *self,
            cursor: ByteCursor::new(bytes),
            done: false,
        }
    }

    /// Decode exactly one instruction starting at the cursor's current
    /// position, advancing it past the bytes consumed.
    pub fn decode_one(&self, cursor: &mut ByteCursor<'_>) -> Result<Instruction, DecodeError> {
        let mut prefixes = Vec::new();
        let mut rex_prefix = None;
        loop {
            let Some(byte) = cursor.peek() else { break };
            match classify_prefix(byte, self.mode) {
                Some(PrefixKind::Rex(raw)) => {
                    cursor.advance()?;
                    rex_prefix = Some(ConsumedPrefix { byte, kind: PrefixKind::Rex(raw) });
                    break;
                }
                Some(kind) => {
                    cursor.advance()?;
                    prefixes.push(ConsumedPrefix { byte, kind });
                }
                None => break,
            }
        }

        let entry_id = self.select_entry(cursor.remaining())?;
        let entry = &self.entries[entry_id.0];
        let syntax = entry.canonical_syntax().ok_or(DecodeError::Unknown)?;

        let mut len = prefixes.len()
            + usize::from(rex_prefix.is_some())
            + entry.bytes.len()
            + usize::from(entry.secondary_byte.is_some());

        cursor.take(entry.bytes.len())?;
        if entry.secondary_byte.is_some() {
            cursor.take(1)?;
        }

        let needs_modrm = syntax.operands().any(|op| op.address.is_some_and(Address::requires_modrm));
        let mut modrm = None;
        let mut sib = None;
        if needs_modrm {
            let byte = cursor.advance()?;
            modrm = Some(byte);
            len += 1;

            let mod_bits = byte >> 6;
            let rm_bits = byte & 0b111;
            let has_sib = mod_bits != 0b11 && rm_bits == 0b100;
            if has_sib {
                let sib_byte = cursor.advance()?;
                sib = Some(sib_byte);
                len += 1;
            }

            let sib_base_is_bp = sib.is_some_and(|s| s & 0b111 == 0b101);
            let disp_len: usize = match mod_bits {
                0b00 if (rm_bits == 0b101 && !has_sib) || sib_base_is_bp => 4,
                0b00 => 0,
                0b01 => 1,
                0b10 => 4,
                _ => 0,
            };
            if disp_len > 0 {
                cursor.take(disp_len)?;
                len += disp_len;
            }
        }

        let rex_w = rex_prefix.is_some_and(|p| p.byte & 0x08 != 0);
        let operand_size_override =
            prefixes.iter().any(|p| p.kind == PrefixKind::OperandSizeOverride);

        let mut immediate = None;
        for op in syntax.operands() {
            let Some(addr) = op.address else { continue };
            if addr.is_relative_jump() {
                let bytes = cursor.take(4)?;
                immediate = Some((4u8, sign_extend_le(bytes)));
                len += 4;
            } else if addr.has_sized_immediate() {
                let size = op
                    .ty
                    .and_then(|ty| ty.immediate_size_bytes(rex_w, operand_size_override))
                    .ok_or(DecodeError::UnsupportedOperand(addr))?;
                let bytes = cursor.take(size as usize)?;
                immediate = Some((size, sign_extend_le(bytes)));
                len += size as usize;
            }
        }

        if len > 15 {
            return Err(DecodeError::BufferOverflow);
        }

        Ok(Instruction {
            prefixes,
            rex_prefix,
            entry: entry_id,
            modrm,
            sib,
            immediate,
            total_length: len,
        })
    }

    /// spec.md §4.4 selection policy: empty candidate set fails, a single
    /// candidate is taken as-is, otherwise filter to the current mode and
    /// require the filtered set be a singleton.
    fn select_entry(&self, remaining: &[u8]) -> Result<EntryId, DecodeError> {
        let candidates: Vec<EntryId> = self.trie.get(remaining).copied().collect();
        match candidates.as_slice() {
            [] => Err(DecodeError::Unknown),
            [only] => Ok(*only),
            many => {
                let filtered: Vec<EntryId> = many
                    .iter()
                    .copied()
                    .filter(|id| self.entries[id.0].mode == self.mode)
                    .collect();
                match filtered.as_slice() {
                    [only] => Ok(*only),
                    _ => Err(DecodeError::Ambiguous),
                }
            }
        }
    }
}

/// Lazily decodes successive instructions out of a byte buffer, stopping
/// after the first error (spec.md §4.4: "producing one `Instruction` per
/// consumed encoding until the buffer is exhausted or an error is raised").
pub struct DecodeIter<'a, 'b> {
    decoder: Decoder<'a>,
    cursor: ByteCursor<'b>,
    done: bool,
}

impl Iterator for DecodeIter<'_, '_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor.is_empty() {
            return None;
        }
        let result = self.decoder.decode_one(&mut self.cursor);
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::{Operand, Syntax, SyntaxId};
    use crate::model::enums::{BitFieldSet, Documentation, ModConstraint, OperandType};
    use crate::model::flags::FlagSet;
    use crate::trie::build_trie;

    fn operand(syntax: SyntaxId, address: Address, ty: Option<OperandType>) -> Operand {
        Operand {
            syntax,
            text: None,
            register_number: None,
            group: None,
            ty,
            address: Some(address),
            no_depend: false,
            no_displayed: false,
        }
    }

    fn entry(
        id: usize,
        bytes: &[u8],
        mode: Mode,
        mnemonic: &str,
        operands: Vec<(Address, Option<OperandType>)>,
    ) -> Entry {
        let entry_id = EntryId(id);
        let syntax_id = SyntaxId { entry: entry_id, index: 0 };
        let ops = operands
            .into_iter()
            .map(|(addr, ty)| operand(syntax_id, addr, ty))
            .collect();
        Entry {
            id: entry_id,
            prefix_byte: None,
            bytes: bytes.to_vec(),
            secondary_byte: None,
            groups: vec![],
            processor_start: None,
            processor_end: None,
            instruction_extension: None,
            alias_bytes: None,
            partial_alias_bytes: None,
            syntaxes: vec![Syntax {
                entry: entry_id,
                mnemonic: mnemonic.to_string(),
                mod_constraint: ModConstraint::Unspecified,
                src_operands: ops,
                dst_operands: vec![],
            }],
            is_valid_with_lock_prefix: false,
            is_undocumented: false,
            is_particular: false,
            is_modrm_register: false,
            opcode_extension: -1,
            fpush: 0,
            fpop: 0,
            bit_fields: BitFieldSet::empty(),
            mod_constraint: ModConstraint::Unspecified,
            attr: None,
            ring: None,
            mode,
            documentation: Documentation::Documented,
            flags: FlagSet::new(),
            conditionally_modifies_flags: false,
            fpu_flags: FlagSet::new(),
            note: None,
        }
    }

    /// A tiny hand-built catalog covering the worked scenarios of spec.md §8.
    fn worked_catalog() -> Vec<Entry> {
        vec![
            // 55 - PUSH rBP (Z-addressing, register-only, no ModR/M).
            entry(0, &[0x50], Mode::E, "PUSH", vec![(Address::Z, None)]),
            // 48 89 e5 - MOV rBP, rSP (E + G, ModR/M only).
            entry(
                1,
                &[0x89],
                Mode::E,
                "MOV",
                vec![(Address::E, Some(OperandType::Vqp)), (Address::G, Some(OperandType::Vqp))],
            ),
            // e8 .. - CALL rel32.
            entry(2, &[0xE8], Mode::E, "CALL", vec![(Address::J, None)]),
            // 0f 1f - multi-byte NOP, E-only ModR/M, no immediate.
            entry(3, &[0x0F, 0x1F], Mode::E, "NOP", vec![(Address::E, Some(OperandType::Vqp))]),
            // c3 - RET, no operands.
            entry(4, &[0xC3], Mode::E, "RET", vec![]),
        ]
    }

    fn decode_first(bytes: &[u8]) -> Instruction {
        let entries = worked_catalog();
        let trie = build_trie(&entries).unwrap();
        let decoder = Decoder::new(&entries, &trie, Mode::E);
        decoder.decode(bytes).next().unwrap().unwrap()
    }

    #[test]
    fn test_push_rbp_length_one() {
        let insn = decode_first(&[0x55]);
        assert_eq!(insn.total_length, 1);
        assert_eq!(insn.entry, EntryId(0));
        assert!(insn.modrm.is_none());
    }

    #[test]
    fn test_mov_rbp_rsp_length_three() {
        let insn = decode_first(&[0x48, 0x89, 0xE5]);
        assert_eq!(insn.total_length, 3);
        assert_eq!(insn.entry, EntryId(1));
        assert_eq!(insn.modrm, Some(0xE5));
        assert!(insn.sib.is_none());
        assert!(insn.rex_prefix.is_some());
    }

    #[test]
    fn test_call_rel32_length_five() {
        let insn = decode_first(&[0xE8, 0x4E, 0x00, 0x00, 0x00]);
        assert_eq!(insn.total_length, 5);
        assert_eq!(insn.entry, EntryId(2));
        assert_eq!(insn.immediate, Some((4, 0x4E)));
    }

    #[test]
    fn test_multibyte_nop_length_five() {
        let insn = decode_first(&[0x0F, 0x1F, 0x44, 0x00, 0x00]);
        assert_eq!(insn.total_length, 5);
        assert_eq!(insn.entry, EntryId(3));
        assert_eq!(insn.modrm, Some(0x44));
        assert!(insn.sib.is_some());
    }

    #[test]
    fn test_ret_length_one() {
        let insn = decode_first(&[0xC3]);
        assert_eq!(insn.total_length, 1);
        assert_eq!(insn.entry, EntryId(4));
    }

    #[test]
    fn test_operand_size_prefixed_nop_length_six() {
        let insn = decode_first(&[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00]);
        assert_eq!(insn.total_length, 6);
        assert_eq!(insn.entry, EntryId(3));
        assert_eq!(insn.prefixes.len(), 1);
        assert_eq!(insn.prefixes[0].kind, PrefixKind::OperandSizeOverride);
    }

    #[test]
    fn test_unknown_encoding_errors() {
        let entries = worked_catalog();
        let trie = build_trie(&entries).unwrap();
        let decoder = Decoder::new(&entries, &trie, Mode::E);
        let err = decoder.decode(&[0xFF, 0xFF]).next().unwrap().unwrap_err();
        assert_eq!(err, DecodeError::Unknown);
    }

    #[test]
    fn test_decode_iter_stops_after_error() {
        let entries = worked_catalog();
        let trie = build_trie(&entries).unwrap();
        let decoder = Decoder::new(&entries, &trie, Mode::E);
        let results: Vec<_> = decoder.decode(&[0x55, 0xC3, 0xFF, 0x55]).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(results[2].is_err());
    }
}
