//! The reference loader (spec.md §4.1): walks a [`crate::dom::Element`]
//! tree shaped like the x86reference schema and produces a flat, ordered
//! `Vec<Entry>`, with `Syntax`->`Entry` and `Operand`->`Syntax`
//! back-references wired up as each entity is constructed.

use std::{error, fmt, str::FromStr};

use crate::dom::Element;
use crate::hex::{self, HexError};
use crate::model::enums::{Group, GroupTag, Tier, UnknownEnumerant};
use crate::model::entry::{Entry, EntryId, Note, Operand, Syntax, SyntaxId};
use crate::model::enums::{
    Address, Attr, BitFieldSet, Documentation, Extension, Mode, ModConstraint, OperandGroup,
    OperandType, ProcessorCode, RegisterNumber, Ring,
};
use crate::model::flags::{FlagSet, Flag, FpuFlag};

/// Errors that abort loading (spec.md §7 `ReferenceFormat`/`Invariant`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// A `<syntax>` had no (or empty) `<mnem>` child.
    MissingMnemonic,
    /// Both an attribute and a child element specified the same thing
    /// (spec.md §4.1: "it is a loader error for both to be present
    /// simultaneously").
    DoubleSpecified(&'static str),
    /// An enumerated attribute/element value didn't match its closed set.
    UnknownEnumerant(UnknownEnumerant),
    /// A hex byte sequence (opcode bytes, `alias`) failed to parse.
    InvalidHex(HexError),
    /// A `pri_opcd` path reached an `<entry>` with no accumulated opcode
    /// bytes (spec.md §3.3 invariant: `bytes` is non-empty).
    EmptyBytes,
    /// A `<pri_opcd>` element's `value` attribute was missing.
    MissingOpcodeValue,
    /// A numeric attribute's value was present but not a valid integer.
    InvalidInteger(&'static str),
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMnemonic => write!(f, "syntax is missing a mandatory mnemonic"),
            Self::DoubleSpecified(field) => {
                write!(f, "operand specifies `{field}` both as an attribute and as a child element")
            }
            Self::UnknownEnumerant(e) => e.fmt(f),
            Self::InvalidHex(e) => e.fmt(f),
            Self::EmptyBytes => write!(f, "entry has an empty opcode byte sequence"),
            Self::MissingOpcodeValue => write!(f, "pri_opcd element is missing its `value` attribute"),
            Self::InvalidInteger(attr) => write!(f, "`{attr}` attribute is not a valid integer"),
        }
    }
}

impl error::Error for LoaderError {}

impl From<UnknownEnumerant> for LoaderError {
    fn from(e: UnknownEnumerant) -> Self {
        Self::UnknownEnumerant(e)
    }
}

impl From<HexError> for LoaderError {
    fn from(e: HexError) -> Self {
        Self::InvalidHex(e)
    }
}

/// Entry point: consumes the DOM root of an x86reference-shaped document
/// and produces the flat, ordered entry catalog (spec.md §4.1, §6.2
/// `load_reference`).
pub fn load_reference(root: &Element) -> Result<Vec<Entry>, LoaderError> {
    let mut entries = Vec::new();
    if let Some(one_byte) = root.child("one-byte") {
        collect_entries(one_byte, &[], &mut entries)?;
    }
    if let Some(two_byte) = root.child("two-byte") {
        collect_entries(two_byte, &[0x0F], &mut entries)?;
    }
    Ok(entries)
}

/// Recurses through `pri_opcd` children, accumulating the opcode byte
/// path, and parses any `entry` children found at each level (spec.md
/// §4.1: "that byte is appended to the current prefix vector, and any
/// child entry elements are parsed against the accumulated byte vector").
fn collect_entries(
    node: &Element,
    prefix: &[u8],
    out: &mut Vec<Entry>,
) -> Result<(), LoaderError> {
    for pri_opcd in node.children("pri_opcd") {
        let value = pri_opcd.attr("value").ok_or(LoaderError::MissingOpcodeValue)?;
        let byte = hex::parse_hex_byte(value)?;
        let mut accumulated = prefix.to_vec();
        accumulated.push(byte);

        for entry_el in pri_opcd.children("entry") {
            let id = EntryId(out.len());
            out.push(parse_entry(entry_el, id, &accumulated)?);
        }
        // Nested pri_opcd (multi-byte opcode tables beyond one level).
        collect_entries(pri_opcd, &accumulated, out)?;
    }
    Ok(())
}

/// Bit-field membership (spec.md §4.1: "set whenever the corresponding
/// attribute is present"). The attribute's *value* doesn't matter, only
/// whether it was specified at all - `direction="0"` still means the
/// direction bit applies to this entry, just with its 0 variant.
fn attr_present(el: &Element, key: &str) -> bool {
    el.attr(key).is_some()
}

/// Genuinely boolean attributes, where `"0"` means false.
fn attr_true(el: &Element, key: &str) -> bool {
    el.attr(key).is_some_and(|v| v != "0")
}

/// Parses a present-but-possibly-malformed numeric attribute, defaulting
/// only when the attribute is absent (spec.md §4.1 "Failure": malformed
/// input must not be silently swallowed the way a missing attribute is).
fn parse_int_attr<T: FromStr>(el: &Element, key: &'static str) -> Result<Option<T>, LoaderError> {
    el.attr(key)
        .map(|v| v.parse::<T>().map_err(|_| LoaderError::InvalidInteger(key)))
        .transpose()
}

fn parse_entry(el: &Element, id: EntryId, bytes: &[u8]) -> Result<Entry, LoaderError> {
    if bytes.is_empty() {
        return Err(LoaderError::EmptyBytes);
    }

    let prefix_byte = match el.child("pref").and_then(Element::text_trimmed) {
        Some(t) => Some(hex::parse_hex_byte(t)?),
        None => None,
    };
    let secondary_byte = match el.child("sec_opcd").and_then(Element::text_trimmed) {
        Some(t) => Some(hex::parse_hex_byte(t)?),
        None => None,
    };

    let groups = parse_groups(el)?;

    let processor_start = parse_enum_child::<ProcessorCode>(el, "proc_start")?;
    let processor_end = parse_enum_child::<ProcessorCode>(el, "proc_end")?;
    let instruction_extension = parse_enum_child::<Extension>(el, "instr_ext")?;

    let (alias_bytes, partial_alias_bytes) = match el.attr("alias") {
        Some(s) => {
            let bytes = s
                .split('_')
                .map(hex::parse_hex_byte)
                .collect::<Result<Vec<u8>, HexError>>()?;
            (Some(bytes.clone()), Some(bytes))
        }
        None => (None, None),
    };

    let opcode_extension = parse_int_attr::<i8>(el, "opcd_ext")?.unwrap_or(-1);

    let mut bit_fields = BitFieldSet::empty();
    if attr_present(el, "op_size") {
        bit_fields |= BitFieldSet::OPERAND_SIZE;
    }
    if attr_present(el, "sign-ext") {
        bit_fields |= BitFieldSet::SIGN_EXTEND;
    }
    if attr_present(el, "direction") {
        bit_fields |= BitFieldSet::DIRECTION;
    }
    if attr_present(el, "tttn") {
        bit_fields |= BitFieldSet::CONDITION;
    }
    if attr_present(el, "mem_format") {
        bit_fields |= BitFieldSet::MEMORY_FORMAT;
    }

    let mod_constraint = parse_enum_attr::<ModConstraint>(el, "mod")?.unwrap_or_default();
    let attr = parse_enum_attr::<Attr>(el, "attr")?;
    let ring = parse_enum_attr::<Ring>(el, "ring")?;
    let mode = parse_enum_attr::<Mode>(el, "mode")?.unwrap_or_default();
    let documentation = parse_enum_attr::<Documentation>(el, "documentation")?.unwrap_or_default();

    let note = el.child("note").map(|n| Note {
        brief: n.child("brief").and_then(Element::text_trimmed).map(str::to_string),
        detailed: n.child("det").and_then(Element::text_trimmed).map(str::to_string),
    });

    let flags = parse_flag_set::<Flag>(el, "test_f", "modif_f", "def_f", "undef_f", "f_vals")?;
    let fpu_flags = parse_flag_set::<FpuFlag>(
        el,
        "test_f_fpu",
        "modif_f_fpu",
        "def_f_fpu",
        "undef_f_fpu",
        "f_vals_fpu",
    )?;
    let conditionally_modifies_flags = el
        .child("def_f")
        .is_some_and(|e| attr_true(e, "cond"))
        || el.child("undef_f").is_some_and(|e| attr_true(e, "cond"));

    let mut syntaxes = Vec::new();
    for syntax_el in el.children("syntax") {
        syntaxes.push(parse_syntax(syntax_el, id, syntaxes.len())?);
    }

    Ok(Entry {
        id,
        prefix_byte,
        bytes: bytes.to_vec(),
        secondary_byte,
        groups,
        processor_start,
        processor_end,
        instruction_extension,
        alias_bytes,
        partial_alias_bytes,
        syntaxes,
        is_valid_with_lock_prefix: attr_true(el, "lock"),
        is_undocumented: attr_true(el, "is_undoc"),
        is_particular: attr_true(el, "is_particular"),
        is_modrm_register: attr_true(el, "r"),
        opcode_extension,
        fpush: parse_int_attr::<u8>(el, "fpush")?.unwrap_or(0),
        fpop: parse_int_attr::<u8>(el, "fpop")?.unwrap_or(0),
        bit_fields,
        mod_constraint,
        attr,
        ring,
        mode,
        documentation,
        flags,
        conditionally_modifies_flags,
        fpu_flags,
        note,
    })
}

fn parse_groups(el: &Element) -> Result<Vec<Group>, LoaderError> {
    let mut groups = Vec::new();
    for (index, tag_name) in ["grp1", "grp2", "grp3"].into_iter().enumerate() {
        if let Some(text) = el.child(tag_name).and_then(Element::text_trimmed) {
            let tier = Tier::try_from(index as u8).expect("index is 0..=2");
            groups.push(Group {
                tag: GroupTag::from_str(text)?,
                tier,
            });
        }
    }
    Ok(groups)
}

fn parse_enum_child<T>(el: &Element, tag: &str) -> Result<Option<T>, LoaderError>
where
    T: FromStr<Err = UnknownEnumerant>,
{
    el.child(tag)
        .and_then(Element::text_trimmed)
        .map(T::from_str)
        .transpose()
        .map_err(LoaderError::from)
}

fn parse_enum_attr<T>(el: &Element, key: &str) -> Result<Option<T>, LoaderError>
where
    T: FromStr<Err = UnknownEnumerant>,
{
    el.attr(key).map(T::from_str).transpose().map_err(LoaderError::from)
}

fn parse_syntax(el: &Element, entry: EntryId, index: usize) -> Result<Syntax, LoaderError> {
    let mnemonic = el
        .child("mnem")
        .and_then(Element::text_trimmed)
        .ok_or(LoaderError::MissingMnemonic)?
        .to_string();
    let mod_constraint = parse_enum_attr::<ModConstraint>(el, "mod")?.unwrap_or_default();

    let syntax_id = SyntaxId { entry, index };
    let src_operands = el
        .children("src")
        .map(|op_el| parse_operand(op_el, syntax_id))
        .collect::<Result<Vec<_>, _>>()?;
    let dst_operands = el
        .children("dst")
        .map(|op_el| parse_operand(op_el, syntax_id))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Syntax {
        entry,
        mnemonic,
        mod_constraint,
        src_operands,
        dst_operands,
    })
}

fn parse_operand(el: &Element, syntax: SyntaxId) -> Result<Operand, LoaderError> {
    let register_number = el
        .attr("registerNumber")
        .map(RegisterNumber::parse)
        .transpose()?;
    let group = parse_enum_attr::<OperandGroup>(el, "group")?;
    let no_depend = el.attr("depend") == Some("no");
    let no_displayed = el.attr("displayed") == Some("no");

    let ty = match (el.attr("type"), el.child("t").and_then(Element::text_trimmed)) {
        (Some(_), Some(_)) => return Err(LoaderError::DoubleSpecified("type")),
        (Some(v), None) => Some(OperandType::from_str(v)?),
        (None, Some(v)) => Some(OperandType::from_str(v)?),
        (None, None) => None,
    };
    let address = match (el.attr("address"), el.child("a").and_then(Element::text_trimmed)) {
        (Some(_), Some(_)) => return Err(LoaderError::DoubleSpecified("address")),
        (Some(v), None) => Some(Address::from_str(v)?),
        (None, Some(v)) => Some(Address::from_str(v)?),
        (None, None) => None,
    };

    Ok(Operand {
        syntax,
        text: el.text_trimmed().map(str::to_string),
        register_number,
        group,
        ty,
        address,
        no_depend,
        no_displayed,
    })
}

/// Parses the four list-valued flag children plus the compact `f_vals`
/// set/unset string into a [`FlagSet`].
///
/// The list children (`test_f`/`modif_f`/`def_f`/`undef_f`) hold
/// whitespace/comma-separated flag letter tokens (so multi-letter flags
/// like `NT`/`IOPL1` are unambiguous); `f_vals` uses the compact
/// single-character case convention spec.md §4.1 describes (`Cz` => `set
/// = {C}`, `unset = {Z}`), which only ever names the nine single-letter
/// flags.
fn parse_flag_set<T: FlagLetter>(
    el: &Element,
    test_tag: &str,
    modif_tag: &str,
    def_tag: &str,
    undef_tag: &str,
    vals_tag: &str,
) -> Result<FlagSet<T>, LoaderError> {
    let mut out = FlagSet::<T>::new();
    out.tested = parse_flag_list::<T>(el, test_tag)?;
    out.modified = parse_flag_list::<T>(el, modif_tag)?;
    out.defined = parse_flag_list::<T>(el, def_tag)?;
    out.undefined = parse_flag_list::<T>(el, undef_tag)?;
    if let Some(text) = el.child(vals_tag).and_then(Element::text_trimmed) {
        for ch in text.chars() {
            let flag = T::from_letter(&ch.to_string())
                .ok_or_else(|| UnknownEnumerant {
                    kind: "flag letter",
                    value: ch.to_string(),
                })?;
            if ch.is_uppercase() {
                out.set |= flag;
            } else {
                out.unset |= flag;
            }
        }
    }
    Ok(out)
}

fn parse_flag_list<T: FlagLetter>(el: &Element, tag: &str) -> Result<T, LoaderError> {
    let mut acc = T::empty_set();
    if let Some(text) = el.child(tag).and_then(Element::text_trimmed) {
        for token in text.split(|c: char| c.is_whitespace() || c == ',').filter(|t| !t.is_empty()) {
            let flag = T::from_letter(token).ok_or_else(|| UnknownEnumerant {
                kind: "flag",
                value: token.to_string(),
            })?;
            acc |= flag;
        }
    }
    Ok(acc)
}

/// Bridges [`Flag`] and [`FpuFlag`] for the generic flag-list parser above.
trait FlagLetter: std::ops::BitOrAssign + Copy {
    fn from_letter(s: &str) -> Option<Self>;
    fn empty_set() -> Self;
}

impl FlagLetter for Flag {
    fn from_letter(s: &str) -> Option<Self> {
        Flag::from_letter(s)
    }
    fn empty_set() -> Self {
        Flag::empty()
    }
}

impl FlagLetter for FpuFlag {
    fn from_letter(s: &str) -> Option<Self> {
        FpuFlag::from_letter(s)
    }
    fn empty_set() -> Self {
        FpuFlag::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Element;

    fn push_ebp_document() -> Element {
        let entry = Element::new("entry").with_child(
            Element::new("syntax")
                .with_child(Element::new("mnem").with_text("PUSH"))
                .with_child(
                    Element::new("src")
                        .with_attr("address", "Z")
                        .with_attr("type", "VQP"),
                ),
        );
        let pri_opcd = Element::new("pri_opcd")
            .with_attr("value", "50")
            .with_child(entry);
        let one_byte = Element::new("one-byte").with_child(pri_opcd);
        Element::new("x86reference").with_child(one_byte)
    }

    #[test]
    fn test_load_simple_entry() {
        let doc = push_ebp_document();
        let entries = load_reference(&doc).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.bytes, vec![0x50]);
        assert_eq!(entry.syntaxes.len(), 1);
        assert_eq!(entry.syntaxes[0].mnemonic, "PUSH");
        assert_eq!(entry.syntaxes[0].entry, entry.id);
        let operand = &entry.syntaxes[0].src_operands[0];
        assert_eq!(operand.syntax.entry, entry.id);
        assert_eq!(operand.syntax.index, 0);
        assert_eq!(operand.address, Some(Address::Z));
    }

    #[test]
    fn test_two_byte_table_prepends_0f() {
        let entry = Element::new("entry").with_child(
            Element::new("syntax").with_child(Element::new("mnem").with_text("NOP")),
        );
        let pri_opcd = Element::new("pri_opcd")
            .with_attr("value", "1F")
            .with_child(entry);
        let two_byte = Element::new("two-byte").with_child(pri_opcd);
        let doc = Element::new("x86reference").with_child(two_byte);

        let entries = load_reference(&doc).unwrap();
        assert_eq!(entries[0].bytes, vec![0x0F, 0x1F]);
    }

    #[test]
    fn test_double_specified_type_is_an_error() {
        let op = Element::new("src")
            .with_attr("type", "E")
            .with_child(Element::new("t").with_text("E"));
        let err = parse_operand(&op, SyntaxId { entry: EntryId(0), index: 0 }).unwrap_err();
        assert_eq!(err, LoaderError::DoubleSpecified("type"));
    }

    #[test]
    fn test_unknown_enumerant_is_fatal() {
        let op = Element::new("src").with_attr("address", "NOPE");
        let err = parse_operand(&op, SyntaxId { entry: EntryId(0), index: 0 }).unwrap_err();
        assert!(matches!(err, LoaderError::UnknownEnumerant(_)));
    }

    #[test]
    fn test_f_vals_set_and_unset() {
        let entry = Element::new("entry").with_child(Element::new("f_vals").with_text("Cz"));
        let flags = parse_flag_set::<Flag>(&entry, "test_f", "modif_f", "def_f", "undef_f", "f_vals")
            .unwrap();
        assert_eq!(flags.set, Flag::C);
        assert_eq!(flags.unset, Flag::Z);
    }

    #[test]
    fn test_missing_mnemonic_is_fatal() {
        let syntax = Element::new("syntax");
        let err = parse_syntax(&syntax, EntryId(0), 0).unwrap_err();
        assert_eq!(err, LoaderError::MissingMnemonic);
    }

    #[test]
    fn test_alias_and_partial_alias_share_source() {
        let entry = Element::new("entry").with_attr("alias", "0F_1E");
        let parsed = parse_entry(&entry, EntryId(0), &[0x90]).unwrap();
        assert_eq!(parsed.alias_bytes, Some(vec![0x0F, 0x1E]));
        assert_eq!(parsed.partial_alias_bytes, parsed.alias_bytes);
    }

    #[test]
    fn test_bit_field_present_with_zero_value_still_sets_membership() {
        let entry = Element::new("entry").with_attr("direction", "0");
        let parsed = parse_entry(&entry, EntryId(0), &[0x00]).unwrap();
        assert!(parsed.bit_fields.contains(BitFieldSet::DIRECTION));
    }

    #[test]
    fn test_malformed_opcode_extension_is_fatal() {
        let entry = Element::new("entry").with_attr("opcd_ext", "xx");
        let err = parse_entry(&entry, EntryId(0), &[0x00]).unwrap_err();
        assert_eq!(err, LoaderError::InvalidInteger("opcd_ext"));
    }

    #[test]
    fn test_missing_opcode_extension_defaults_to_minus_one() {
        let entry = Element::new("entry");
        let parsed = parse_entry(&entry, EntryId(0), &[0x00]).unwrap();
        assert_eq!(parsed.opcode_extension, -1);
    }
}
