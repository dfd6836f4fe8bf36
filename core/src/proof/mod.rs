//! Trie proofs and their wire format.
//!
//! A proof is a set of strands, each a path from the root down to a terminal, along with a
//! program of commands which fold the strands back together into the root. Each command is
//! addressed to a single strand and hashes the strand's accumulated node with a sibling: a
//! provided hash, the empty node, or the next strand in order ([`Cmd::Merge`]).
//!
//! Proofs are produced by [`export`] from a (possibly partial) trie, serialized with
//! [`encode`], parsed with [`decode`] and turned back into a partial trie by [`import`].

use crate::{
    key::KeyHash,
    trie::{Node, ValueHash},
};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

pub use export::{export, export_indices, export_range};
pub use import::import;
pub use transport::{decode, encode, from_hex, to_hex};

pub mod varint;

mod export;
mod import;
mod transport;

/// How leaf keys are carried on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    /// Leaves carry their (compressed) key hash.
    #[default]
    HashedKeys = 0,
    /// Leaves carry the full key, which is hashed on decode.
    FullKeys = 1,
}

/// The kind of terminal proving a key's absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessKind {
    /// The key's path ends in an empty sub-trie.
    Empty,
    /// The key's path ends in a leaf holding a different key.
    Leaf,
}

/// What sits at the bottom of a strand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// A leaf with its value revealed. The full key is known when it was tracked by the producer
    /// or carried on the wire.
    Leaf {
        value: Vec<u8>,
        key: Option<Vec<u8>>,
    },
    /// A leaf whose value is withheld.
    WitnessLeaf { value_hash: ValueHash },
    /// An empty sub-trie.
    WitnessEmpty,
    /// An opaque sub-trie, known only by its commitment.
    Witness { node: Node },
}

impl Terminal {
    /// The wire tag of this terminal.
    pub fn tag(&self) -> u8 {
        match self {
            Terminal::Leaf { .. } => tag::LEAF,
            Terminal::WitnessLeaf { .. } => tag::WITNESS_LEAF,
            Terminal::WitnessEmpty => tag::WITNESS_EMPTY,
            Terminal::Witness { .. } => tag::WITNESS,
        }
    }
}

/// Strand tags on the wire.
pub mod tag {
    pub const LEAF: u8 = 0;
    /// Terminates the strand list.
    pub const END: u8 = 1;
    pub const WITNESS_LEAF: u8 = 2;
    pub const WITNESS_EMPTY: u8 = 3;
    pub const WITNESS: u8 = 4;
}

/// A path from the root to a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strand {
    /// The depth of the terminal. The root is at depth 0.
    pub depth: u8,
    /// The path of the terminal. For [`Terminal::WitnessEmpty`], only the first `depth` bits are
    /// meaningful and the producer zeroes the rest.
    pub key_hash: KeyHash,
    pub terminal: Terminal,
}

/// A single fold operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    /// Hash with the given sibling.
    HashProvided(Node),
    /// Hash with an empty sibling.
    HashEmpty,
    /// Hash with the accumulated node of the next unmerged strand.
    Merge,
}

/// A command addressed to a strand, by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofCmd {
    pub op: Cmd,
    pub strand: usize,
}

/// A decoded proof.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Proof {
    /// Strands, sorted by key hash.
    pub strands: Vec<Strand>,
    pub cmds: Vec<ProofCmd>,
}

/// Errors in the structure of a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// The input ended in the middle of an item.
    Truncated,
    /// The leading encoding byte is neither 0 nor 1.
    UnknownEncoding(u8),
    /// A compressed key hash claims more than 32 trailing zero bytes.
    BadKeyHash(u8),
    /// A length prefix does not fit in 64 bits.
    VarIntOverflow,
    /// A jump moved the command cursor outside of the strand list.
    JumpOutOfRange,
    /// A command targeted a strand which was already merged into another.
    AlreadyMerged(usize),
    /// A command would have moved a strand above the root.
    DepthUnderflow(usize),
    /// A merge found no following strand to merge with.
    NothingToMerge(usize),
    /// The proof carries no strands.
    NoStrands,
    /// A `FullKeys` encoding was requested for a leaf whose key is unknown.
    MissingKey(usize),
    /// The hex transport could not be parsed.
    BadHex,
}

impl core::fmt::Display for Malformed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Malformed::Truncated => write!(f, "proof ends prematurely"),
            Malformed::UnknownEncoding(b) => write!(f, "unexpected proof encoding type {}", b),
            Malformed::BadKeyHash(n) => write!(f, "key hash with {} trailing zero bytes", n),
            Malformed::VarIntOverflow => write!(f, "varint overflows 64 bits"),
            Malformed::JumpOutOfRange => write!(f, "jumped outside of proof strands"),
            Malformed::AlreadyMerged(i) => write!(f, "strand {} already merged", i),
            Malformed::DepthUnderflow(i) => write!(f, "strand {} moved above the root", i),
            Malformed::NothingToMerge(i) => write!(f, "no strand left to merge with {}", i),
            Malformed::NoStrands => write!(f, "proof has no strands"),
            Malformed::MissingKey(i) => write!(f, "key of strand {} is not available", i),
            Malformed::BadHex => write!(f, "invalid hex"),
        }
    }
}
