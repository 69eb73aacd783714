//! The reference model: immutable typed entities describing opcode
//! encodings, plus every closed enumeration the loader validates attribute
//! and element text against (spec.md §3).

pub mod entry;
pub mod enums;
pub mod flags;

pub use entry::{Entry, EntryId, Note, Operand, Syntax, SyntaxId};
pub use enums::{
    Address, Attr, BitFieldSet, Documentation, Extension, Group, GroupTag, Mode, ModConstraint,
    OperandGroup, OperandType, ProcessorCode, RegisterNumber, Ring, Tier, UnknownEnumerant,
};
pub use flags::{Flag, FlagSet, FpuFlag};
