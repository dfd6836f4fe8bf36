//! This module defines the types of a sparse binary merkle trie, generalized over a 256 bit hash
//! function. All lookup paths in the trie are the 256-bit hashes of keys.
//!
//! All nodes are 256 bits. There are three kinds of nodes.
//!   1. Branch nodes, which each have two children. The value of a branch node is given by
//!      hashing the concatenation of the two child nodes.
//!   2. Leaf nodes, which have zero children. The value of a leaf node is given by hashing
//!      the concatenation of the 256-bit key hash, the hash of the value stored at the leaf and
//!      a single zero tag byte.
//!   3. [`EMPTY`] nodes, which have the special value of all 0s. These nodes have no children
//!      and serve as a stand-in for an empty sub-trie at any height.
//!
//! The trie is kept in canonical form: a branch never has two empty children, and a branch
//! never has a single leaf next to an empty sibling. In that case the leaf is stored in place of
//! the branch. A leaf's hash does not depend on its depth, so moving a leaf up or down never
//! requires rehashing it.

use crate::hasher::NodeHasher;

/// A node in the binary trie. In this schema, it is always 256 bits and is the hash of either
/// a [`LeafData`] or [`BranchData`], or zeroed if it's [`EMPTY`].
pub type Node = [u8; 32];

/// The hash of a value. In this schema, it is always 256 bits.
pub type ValueHash = [u8; 32];

/// The empty hash is a special node hash value denoting an empty sub-tree.
/// Concretely, when this appears at a given location in the trie,
/// it implies that no key with a path beginning with the location has a value.
///
/// This value may appear at any height.
pub const EMPTY: Node = [0u8; 32];

/// Whether the node holds the special [`EMPTY`] value.
pub fn is_empty(node: &Node) -> bool {
    node == &EMPTY
}

/// The kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An empty node indicates an empty sub-trie.
    Empty,
    /// A leaf node indicates a sub-trie with a single key.
    Leaf,
    /// A branch node indicates at least two keys.
    Branch,
}

/// The data of a branch node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchData {
    /// The hash of the left child of this node.
    pub left: Node,
    /// The hash of the right child of this node.
    pub right: Node,
}

impl BranchData {
    /// Compute the commitment of this branch.
    pub fn hash<H: NodeHasher>(&self) -> Node {
        H::hash_branch(self)
    }
}

/// The data of a leaf node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub struct LeafData {
    /// The total path to this value within the trie.
    ///
    /// The actual location of this node may be anywhere along this path, depending on the other
    /// data within the trie.
    pub key_hash: crate::key::KeyHash,
    /// The hash of the value carried in this leaf.
    pub value_hash: ValueHash,
}

impl LeafData {
    /// Compute the commitment of this leaf.
    pub fn hash<H: NodeHasher>(&self) -> Node {
        H::hash_leaf(self)
    }
}
