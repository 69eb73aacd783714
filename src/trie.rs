//! 256-ary byte trie keyed by opcode byte sequences (spec.md §4.2), and the
//! builder that expands Z-addressing forms into their 8 low-3-bit opcode
//! variants (spec.md §4.3).

use std::collections::HashMap;
use std::{error, fmt};

use crate::model::entry::{Entry, EntryId};

/// Raised while building a trie from the loaded catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// A `Z`-addressing entry's final opcode byte already has a non-zero
    /// low 3 bits (spec.md §3.3 / §4.3: "Require that those bits are
    /// initially zero, otherwise fatal").
    ZFormLowBitsSet { entry: EntryId, last_byte: u8 },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZFormLowBitsSet { entry, last_byte } => write!(
                f,
                "entry {} uses Z-addressing but its opcode byte 0x{last_byte:02x} has non-zero low 3 bits",
                entry.0
            ),
        }
    }
}

impl error::Error for BuildError {}

#[derive(Debug, Default)]
struct Node<T> {
    children: HashMap<u8, Box<Node<T>>>,
    values: Vec<T>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            values: Vec::new(),
        }
    }
}

/// A 256-ary radix tree mapping byte sequences to lists of values.
///
/// Multiple values may be inserted at the same key (spec.md §4.2:
/// "encodings that are polymorphic across mode/extension/operand-size
/// attach multiple entries"); [`Trie::get`] walks every node along a
/// lookup path and yields every value seen, ancestor before descendant,
/// insertion order within a node.
#[derive(Debug)]
pub struct Trie<T> {
    root: Node<T>,
}

impl<T> Default for Trie<T> {
    fn default() -> Self {
        Self { root: Node::new() }
    }
}

impl<T: Clone> Trie<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` at `key`, creating intermediate nodes as needed.
    pub fn add(&mut self, key: &[u8], value: T) {
        let mut node = &mut self.root;
        for &byte in key {
            node = node.children.entry(byte).or_insert_with(|| Box::new(Node::new()));
        }
        node.values.push(value);
    }

    /// Walk `bytes` against the trie, returning every value found at every
    /// prefix-matching node along the way (spec.md §4.2).
    #[must_use]
    pub fn get<'a>(&'a self, bytes: &'a [u8]) -> TrieWalk<'a, T> {
        TrieWalk {
            node: Some(&self.root),
            bytes,
            value_index: 0,
        }
    }
}

/// Lazily yields every value along a trie walk, ancestor-to-descendant,
/// insertion order within a node. Grounded on the teacher's custom
/// iterator structs (`RecordIter`/`BlockIter`) rather than eagerly
/// collecting into a `Vec`.
pub struct TrieWalk<'a, T> {
    node: Option<&'a Node<T>>,
    bytes: &'a [u8],
    value_index: usize,
}

impl<'a, T> Iterator for TrieWalk<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.node?;
            if let Some(value) = node.values.get(self.value_index) {
                self.value_index += 1;
                return Some(value);
            }
            // Exhausted this node's values; descend to the next byte.
            let (&next_byte, rest) = self.bytes.split_first()?;
            self.bytes = rest;
            self.node = node.children.get(&next_byte).map(Box::as_ref);
            self.value_index = 0;
        }
    }
}

/// Build a trie from the loaded catalog (spec.md §4.3).
///
/// For each `(entry, syntax)` pair: composes the key as `prefix_byte? ∥
/// bytes ∥ secondary_byte?`, inserts `entry.id` at that key, and, if the
/// syntax has a `Z`-addressing operand, additionally inserts the same
/// entry at the 7 keys obtained by OR-ing `1..=7` into the low 3 bits of
/// the final opcode byte.
pub fn build_trie(entries: &[Entry]) -> Result<Trie<EntryId>, BuildError> {
    let mut trie = Trie::new();
    for entry in entries {
        let mut key = Vec::with_capacity(entry.bytes.len() + 2);
        if let Some(prefix) = entry.prefix_byte {
            key.push(prefix);
        }
        key.extend_from_slice(&entry.bytes);
        if let Some(secondary) = entry.secondary_byte {
            key.push(secondary);
        }

        trie.add(&key, entry.id);

        if entry.has_z_operand() {
            let last = *key.last().expect("bytes is non-empty (spec.md §3.3)");
            if last & 0b111 != 0 {
                return Err(BuildError::ZFormLowBitsSet {
                    entry: entry.id,
                    last_byte: last,
                });
            }
            let (prefix_key, _) = key.split_at(key.len() - 1);
            for low_bits in 1u8..=7 {
                let mut variant = prefix_key.to_vec();
                variant.push(last | low_bits);
                trie.add(&variant, entry.id);
            }
        }
    }
    Ok(trie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_and_ancestor_before_descendant() {
        let mut trie: Trie<&'static str> = Trie::new();
        trie.add(&[0x0F], "two-byte-prefix");
        trie.add(&[0x0F, 0x1F], "nop");
        trie.add(&[0x0F, 0x1F], "nop-alias");

        let found: Vec<_> = trie.get(&[0x0F, 0x1F, 0x00]).copied().collect();
        assert_eq!(found, vec!["two-byte-prefix", "nop", "nop-alias"]);
    }

    #[test]
    fn test_get_stops_when_no_child() {
        let mut trie: Trie<&'static str> = Trie::new();
        trie.add(&[0x55], "push");
        let found: Vec<_> = trie.get(&[0x89, 0xe5]).copied().collect();
        assert!(found.is_empty());
    }

    #[test]
    fn test_z_expansion_inserts_eight_keys() {
        use crate::model::entry::{Entry, EntryId, Operand, Syntax, SyntaxId};
        use crate::model::enums::{
            Address, BitFieldSet, Documentation, Mode, ModConstraint,
        };
        use crate::model::flags::FlagSet;

        let id = EntryId(0);
        let syntax_id = SyntaxId { entry: id, index: 0 };
        let operand = Operand {
            syntax: syntax_id,
            text: None,
            register_number: None,
            group: None,
            ty: None,
            address: Some(Address::Z),
            no_depend: false,
            no_displayed: false,
        };
        let entry = Entry {
            id,
            prefix_byte: None,
            bytes: vec![0x50],
            secondary_byte: None,
            groups: vec![],
            processor_start: None,
            processor_end: None,
            instruction_extension: None,
            alias_bytes: None,
            partial_alias_bytes: None,
            syntaxes: vec![Syntax {
                entry: id,
                mnemonic: "PUSH".to_string(),
                mod_constraint: ModConstraint::Unspecified,
                src_operands: vec![operand],
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
            mode: Mode::R,
            documentation: Documentation::Documented,
            flags: FlagSet::new(),
            conditionally_modifies_flags: false,
            fpu_flags: FlagSet::new(),
            note: None,
        };

        let trie = build_trie(std::slice::from_ref(&entry)).unwrap();
        for low_bits in 0u8..=7 {
            let found: Vec<_> = trie.get(&[0x50 | low_bits]).collect();
            assert_eq!(found, vec![&id], "opcode 0x{:02x}", 0x50 | low_bits);
        }
    }
}
