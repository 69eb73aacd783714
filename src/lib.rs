//! Reference-model driven x86/x86-64 instruction decoder core.
//!
//! An x86reference-style catalog of opcode encodings ([`model`]) is loaded
//! from a DOM-like element tree ([`dom`]) by [`loader`], indexed into a
//! byte [`trie`], and walked by [`decoder`] to turn a byte buffer into a
//! stream of decoded instructions. XML parsing itself is out of scope:
//! [`dom::Element`] is the seam a real front end would build against.

pub mod cursor;
pub mod decoder;
pub mod dom;
pub mod hex;
pub mod loader;
pub mod model;
pub mod trie;

pub use cursor::{ByteCursor, CursorError};
pub use decoder::{DecodeError, DecodeIter, Decoder, Instruction};
pub use dom::Element;
pub use loader::{load_reference, LoaderError};
pub use model::{Entry, EntryId, Mode, Syntax, SyntaxId};
pub use trie::{build_trie, BuildError, Trie};
