//! The immutable reference entities themselves (spec.md §3.1): one
//! `Entry` per opcode encoding, each carrying one or more `Syntax`
//! (mnemonic variants), each carrying ordered `Operand` lists.
//!
//! Back-references follow spec.md §9's arena/index recommendation:
//! `Entry`s live in a flat `Vec` (see [`crate::loader::load_reference`]),
//! addressed by [`EntryId`]; a `Syntax`'s `entry` field and an `Operand`'s
//! `syntax` field are plain, assigned-once data rather than pointers, so
//! there is nothing to mutate after construction and nothing to get out
//! of sync.

use super::enums::{
    Address, Attr, Documentation, Extension, Group, Mode, ModConstraint, OperandGroup,
    OperandType, ProcessorCode, RegisterNumber, Ring,
};
use super::flags::{FlagSet, FpuFlag, Flag};
use crate::model::enums::BitFieldSet;

/// Index of an [`Entry`] within the catalog `Vec` it was loaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub usize);

/// Index of a [`Syntax`] within its enclosing [`Entry`]'s `syntaxes` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyntaxId {
    pub entry: EntryId,
    pub index: usize,
}

/// A brief/detailed note pair (spec.md §3.1 `Note`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Note {
    pub brief: Option<String>,
    pub detailed: Option<String>,
}

/// One operand slot within a [`Syntax`] (spec.md §3.1 `Operand`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    /// Back-reference to the enclosing `Syntax`, set once by the loader.
    pub syntax: SyntaxId,
    pub text: Option<String>,
    pub register_number: Option<RegisterNumber>,
    pub group: Option<OperandGroup>,
    pub ty: Option<OperandType>,
    pub address: Option<Address>,
    pub no_depend: bool,
    pub no_displayed: bool,
}

/// A mnemonic and its operands for one [`Entry`] (spec.md §3.1 `Syntax`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    /// Back-reference to the enclosing `Entry`, set once by the loader.
    pub entry: EntryId,
    pub mnemonic: String,
    pub mod_constraint: ModConstraint,
    pub src_operands: Vec<Operand>,
    pub dst_operands: Vec<Operand>,
}

impl Syntax {
    /// All operands in document order: `src` first, then `dst`, matching
    /// the order spec.md §4.4's length computation walks them in
    /// ("for each operand across src and dst").
    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        self.src_operands.iter().chain(self.dst_operands.iter())
    }
}

/// One opcode encoding (spec.md §3.1 `Entry`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub prefix_byte: Option<u8>,
    pub bytes: Vec<u8>,
    pub secondary_byte: Option<u8>,
    pub groups: Vec<Group>,
    pub processor_start: Option<ProcessorCode>,
    pub processor_end: Option<ProcessorCode>,
    pub instruction_extension: Option<Extension>,
    /// Same source attribute as `alias_bytes` (spec.md §9 open question):
    /// the schema does not currently distinguish a "partial" alias from a
    /// full one, so this is always equal to `alias_bytes`.
    pub alias_bytes: Option<Vec<u8>>,
    pub partial_alias_bytes: Option<Vec<u8>>,
    pub syntaxes: Vec<Syntax>,
    pub is_valid_with_lock_prefix: bool,
    pub is_undocumented: bool,
    pub is_particular: bool,
    pub is_modrm_register: bool,
    /// `/0`..`/7` ModR/M.reg sub-opcode, or `-1` if unused.
    pub opcode_extension: i8,
    pub fpush: u8,
    pub fpop: u8,
    pub bit_fields: BitFieldSet,
    pub mod_constraint: ModConstraint,
    pub attr: Option<Attr>,
    pub ring: Option<Ring>,
    pub mode: Mode,
    pub documentation: Documentation,
    pub flags: FlagSet<Flag>,
    pub conditionally_modifies_flags: bool,
    pub fpu_flags: FlagSet<FpuFlag>,
    pub note: Option<Note>,
}

impl Entry {
    /// Last syntax in [`Entry::syntaxes`] - spec.md §4.4: "choose the
    /// canonical `Syntax` (the last one in its list — this matches source
    /// behaviour and is the form used for length/operand semantics)".
    #[must_use]
    pub fn canonical_syntax(&self) -> Option<&Syntax> {
        self.syntaxes.last()
    }

    /// True if any operand of any syntax uses the `Z` addressing method
    /// (spec.md §3.3 / §4.3 Z-expansion).
    #[must_use]
    pub fn has_z_operand(&self) -> bool {
        self.syntaxes
            .iter()
            .flat_map(Syntax::operands)
            .any(|op| op.address == Some(Address::Z))
    }
}

#[test]
fn test_canonical_syntax_is_last() {
    let entry_id = EntryId(0);
    let mk_syntax = |index: usize, mnemonic: &str| Syntax {
        entry: entry_id,
        mnemonic: mnemonic.to_string(),
        mod_constraint: ModConstraint::Unspecified,
        src_operands: vec![],
        dst_operands: vec![],
    };
    let entry = Entry {
        id: entry_id,
        prefix_byte: None,
        bytes: vec![0x90],
        secondary_byte: None,
        groups: vec![],
        processor_start: None,
        processor_end: None,
        instruction_extension: None,
        alias_bytes: None,
        partial_alias_bytes: None,
        syntaxes: vec![mk_syntax(0, "NOP_ATT"), mk_syntax(1, "NOP_INTEL")],
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
        mode: Mode::R,
        documentation: Documentation::Documented,
        flags: FlagSet::new(),
        conditionally_modifies_flags: false,
        fpu_flags: FlagSet::new(),
        note: None,
    };
    assert_eq!(entry.canonical_syntax().unwrap().mnemonic, "NOP_INTEL");
}
