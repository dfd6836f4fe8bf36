//! Core operations and types of merkv, an authenticated key/value dictionary.
//!
//! The dictionary is a sparse binary merkle trie over 256-bit key hashes. This crate defines the
//! schema of the trie, the compact multiproof format and the algorithms to verify a proof, answer
//! queries against it and compute the root resulting from updates, all without access to the
//! full trie.
//!
//! The verifier does not require the standard library, but does require Rust's alloc crate.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod hasher;
pub mod key;
pub mod proof;
pub mod push;
pub mod tree;
pub mod trie;
pub mod update;
pub mod verifier;

pub use hasher::{Keccak256Hasher, NodeHasher, TrieHasher, ValueHasher};
pub use key::KeyHash;
pub use proof::{Encoding, Proof, WitnessKind};
pub use tree::Tree;
pub use trie::{Node, EMPTY};
pub use update::Update;
pub use verifier::{verify_and_update, verify_decoded, Cost, Query, Target, Verified, VerifyError};
