//! An in-memory partial trie.
//!
//! Nodes live in an arena and refer to their children by index. Parts of the trie which are not
//! known are represented by witness nodes: a [`NodeData::WitnessLeaf`] stands for a leaf whose
//! value is withheld and a [`NodeData::Witness`] for an opaque sub-trie of unknown shape.
//!
//! Every node caches its commitment. Nodes are never mutated once created; updates allocate new
//! nodes along the touched paths and leave the old ones unreachable.

use crate::{
    hasher::TrieHasher,
    key::{self, KeyHash},
    proof::WitnessKind,
    trie::{self, BranchData, LeafData, Node, NodeKind, ValueHash, EMPTY},
    verifier::VerifyError,
};

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use core::marker::PhantomData;

/// The index of a node within a [`Tree`].
pub type NodeId = usize;

/// The shared empty node. It is always present at index 0.
pub const EMPTY_ID: NodeId = 0;

/// The contents of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Empty,
    Leaf {
        key_hash: KeyHash,
        value: Vec<u8>,
        /// The full key, when known.
        key: Option<Vec<u8>>,
    },
    WitnessLeaf {
        key_hash: KeyHash,
        value_hash: ValueHash,
    },
    /// A sub-trie known only by its commitment. It is assumed to hold at least two keys.
    Witness,
    Branch {
        left: NodeId,
        right: NodeId,
    },
}

impl NodeData {
    /// The shape of this node. Witness sub-tries count as branches.
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Empty => NodeKind::Empty,
            NodeData::Leaf { .. } | NodeData::WitnessLeaf { .. } => NodeKind::Leaf,
            NodeData::Witness | NodeData::Branch { .. } => NodeKind::Branch,
        }
    }

    /// The key hash of a leaf or witness leaf.
    pub fn leaf_key_hash(&self) -> Option<&KeyHash> {
        match self {
            NodeData::Leaf { key_hash, .. } | NodeData::WitnessLeaf { key_hash, .. } => {
                Some(key_hash)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    hash: Node,
}

/// The place where a key's path ends.
#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    /// The depth of the terminal node.
    pub depth: usize,
    pub id: NodeId,
    pub node: &'a NodeData,
}

impl<'a> Located<'a> {
    /// The value stored under `key_hash`, or `None` if the terminal proves it absent.
    pub fn value(&self, key_hash: &KeyHash) -> Result<Option<&'a [u8]>, VerifyError> {
        match self.node {
            NodeData::Empty => Ok(None),
            NodeData::Leaf {
                key_hash: leaf_key,
                value,
                ..
            } => Ok((leaf_key == key_hash).then(|| &value[..])),
            NodeData::WitnessLeaf {
                key_hash: leaf_key,
                ..
            } => {
                if leaf_key == key_hash {
                    Err(VerifyError::IncompleteTree)
                } else {
                    Ok(None)
                }
            }
            NodeData::Witness | NodeData::Branch { .. } => Err(VerifyError::IncompleteTree),
        }
    }

    /// How the terminal proves `key_hash` absent, or `None` if the key is present.
    pub fn absence(&self, key_hash: &KeyHash) -> Result<Option<WitnessKind>, VerifyError> {
        match self.node {
            NodeData::Empty => Ok(Some(WitnessKind::Empty)),
            NodeData::Leaf {
                key_hash: leaf_key,
                ..
            } => Ok((leaf_key != key_hash).then_some(WitnessKind::Leaf)),
            NodeData::WitnessLeaf {
                key_hash: leaf_key,
                ..
            } => {
                if leaf_key == key_hash {
                    // the key is in the trie, but the proof withheld its value.
                    Err(VerifyError::InvalidWitness)
                } else {
                    Ok(Some(WitnessKind::Leaf))
                }
            }
            NodeData::Witness | NodeData::Branch { .. } => Err(VerifyError::IncompleteTree),
        }
    }
}

/// A partial binary trie held in memory.
pub struct Tree<H> {
    nodes: Vec<Slot>,
    root: NodeId,
    hash_ops: u64,
    _marker: PhantomData<H>,
}

impl<H> Clone for Tree<H> {
    fn clone(&self) -> Self {
        Tree {
            nodes: self.nodes.clone(),
            root: self.root,
            hash_ops: self.hash_ops,
            _marker: PhantomData,
        }
    }
}

impl<H> core::fmt::Debug for Tree<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tree")
            .field("root", &hex::encode(self.nodes[self.root].hash))
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl<H: TrieHasher> Default for Tree<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: TrieHasher> Tree<H> {
    /// Create an empty trie.
    pub fn new() -> Self {
        Tree {
            nodes: vec![Slot {
                data: NodeData::Empty,
                hash: EMPTY,
            }],
            root: EMPTY_ID,
            hash_ops: 0,
            _marker: PhantomData,
        }
    }

    /// The commitment to the whole trie.
    pub fn root(&self) -> Node {
        self.nodes[self.root].hash
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    /// The number of hash invocations performed while building this trie.
    pub fn hash_ops(&self) -> u64 {
        self.hash_ops
    }

    /// The number of nodes allocated, including unreachable ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root == EMPTY_ID
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id].data
    }

    pub fn hash(&self, id: NodeId) -> Node {
        self.nodes[id].hash
    }

    fn alloc(&mut self, data: NodeData, hash: Node) -> NodeId {
        self.nodes.push(Slot { data, hash });
        self.nodes.len() - 1
    }

    /// Allocate a leaf, hashing its value.
    pub fn new_leaf(&mut self, key_hash: KeyHash, value: Vec<u8>, key: Option<Vec<u8>>) -> NodeId {
        let value_hash = H::hash_value(&value);
        let hash = LeafData {
            key_hash,
            value_hash,
        }
        .hash::<H>();
        self.hash_ops += 2;
        self.alloc(
            NodeData::Leaf {
                key_hash,
                value,
                key,
            },
            hash,
        )
    }

    pub fn new_witness_leaf(&mut self, key_hash: KeyHash, value_hash: ValueHash) -> NodeId {
        let hash = LeafData {
            key_hash,
            value_hash,
        }
        .hash::<H>();
        self.hash_ops += 1;
        self.alloc(
            NodeData::WitnessLeaf {
                key_hash,
                value_hash,
            },
            hash,
        )
    }

    /// Allocate an opaque sub-trie. The empty commitment maps onto the empty node.
    pub fn new_witness(&mut self, node: Node) -> NodeId {
        if trie::is_empty(&node) {
            return EMPTY_ID;
        }
        self.alloc(NodeData::Witness, node)
    }

    pub fn new_branch(&mut self, left: NodeId, right: NodeId) -> NodeId {
        let hash = BranchData {
            left: self.nodes[left].hash,
            right: self.nodes[right].hash,
        }
        .hash::<H>();
        self.hash_ops += 1;
        self.alloc(NodeData::Branch { left, right }, hash)
    }

    /// Walk from the root along `key_hash` until a non-branch node.
    pub fn locate(&self, key_hash: &KeyHash) -> Located<'_> {
        let mut id = self.root;
        let mut depth = 0;
        loop {
            match &self.nodes[id].data {
                NodeData::Branch { left, right } if depth < key::KEY_BITS => {
                    id = if key::bit(key_hash, depth) {
                        *right
                    } else {
                        *left
                    };
                    depth += 1;
                }
                node => return Located { depth, id, node },
            }
        }
    }

    /// Look up the value stored under `key_hash`.
    ///
    /// Returns `None` if the trie proves the key absent and [`VerifyError::IncompleteTree`] if the
    /// known part of the trie can't answer.
    pub fn get(&self, key_hash: &KeyHash) -> Result<Option<&[u8]>, VerifyError> {
        self.locate(key_hash).value(key_hash)
    }

    /// Check that `key_hash` is absent, returning the kind of terminal proving it. Returns `None`
    /// if the key is present.
    pub fn confirm_absent(&self, key_hash: &KeyHash) -> Result<Option<WitnessKind>, VerifyError> {
        self.locate(key_hash).absence(key_hash)
    }

    /// Fold what `other` knows into this trie. Both must commit to the same root.
    ///
    /// Wherever this trie only has a witness and `other` has more, the witness is replaced by a
    /// copy of `other`'s nodes. Nothing this trie already reveals is lost.
    pub fn merge(&mut self, other: &Tree<H>) -> Result<(), VerifyError> {
        if self.root() != other.root() {
            return Err(VerifyError::RootMismatch);
        }

        let root = self.merge_node(self.root, other, other.root);
        self.root = root;
        Ok(())
    }

    fn merge_node(&mut self, ours: NodeId, other: &Tree<H>, theirs: NodeId) -> NodeId {
        match (&self.nodes[ours].data, &other.nodes[theirs].data) {
            (NodeData::Witness, NodeData::Witness) => ours,
            (NodeData::Witness, _) | (NodeData::WitnessLeaf { .. }, NodeData::Leaf { .. }) => {
                self.adopt(other, theirs)
            }
            (
                NodeData::Branch { left, right },
                NodeData::Branch {
                    left: their_left,
                    right: their_right,
                },
            ) => {
                let (left, right) = (*left, *right);
                let (their_left, their_right) = (*their_left, *their_right);

                let new_left = self.merge_node(left, other, their_left);
                let new_right = self.merge_node(right, other, their_right);
                if new_left == left && new_right == right {
                    return ours;
                }

                // same children commitments, same branch commitment.
                let hash = self.nodes[ours].hash;
                self.alloc(
                    NodeData::Branch {
                        left: new_left,
                        right: new_right,
                    },
                    hash,
                )
            }
            _ => ours,
        }
    }

    // Copy a sub-trie of `other` into this arena.
    fn adopt(&mut self, other: &Tree<H>, id: NodeId) -> NodeId {
        let slot = &other.nodes[id];
        match &slot.data {
            NodeData::Empty => EMPTY_ID,
            NodeData::Branch { left, right } => {
                let left = self.adopt(other, *left);
                let right = self.adopt(other, *right);
                self.alloc(NodeData::Branch { left, right }, slot.hash)
            }
            data => self.alloc(data.clone(), slot.hash),
        }
    }

    /// Iterate over the leaves with key hashes at or after `start`, in key hash order.
    pub fn iter_from(&self, start: &KeyHash) -> Leaves<'_, H> {
        Leaves::new(self, *start, [0xFF; 32], false)
    }

    /// Iterate over the leaves with key hashes at or before `start`, in reverse key hash order.
    pub fn iter_rev_from(&self, start: &KeyHash) -> Leaves<'_, H> {
        Leaves::new(self, [0; 32], *start, true)
    }

    /// Iterate over the leaves with key hashes in `begin..=end`, in key hash order. Parts of the
    /// trie outside of the range may be unknown.
    pub fn iter_range(&self, begin: &KeyHash, end: &KeyHash) -> Leaves<'_, H> {
        Leaves::new(self, *begin, *end, false)
    }
}

/// A leaf visited by [`Leaves`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub key_hash: &'a KeyHash,
    pub value: &'a [u8],
    /// The full key, when known.
    pub key: Option<&'a [u8]>,
}

/// An ordered walk over the leaves of a trie within a range of key hashes.
///
/// Yields [`VerifyError::IncompleteTree`] once, and then stops, when the walk reaches a witness
/// which could hide leaves in the range.
pub struct Leaves<'a, H> {
    tree: &'a Tree<H>,
    // sub-tries still to visit, the next one on top, with their depth and path.
    stack: Vec<(NodeId, usize, KeyHash)>,
    low: KeyHash,
    high: KeyHash,
    reverse: bool,
}

impl<'a, H> Leaves<'a, H> {
    fn new(tree: &'a Tree<H>, low: KeyHash, high: KeyHash, reverse: bool) -> Self {
        Leaves {
            tree,
            stack: vec![(tree.root, 0, [0u8; 32])],
            low,
            high,
            reverse,
        }
    }

    // Whether the sub-trie at `depth` along `path` lies entirely outside of the range.
    fn out_of_range(&self, depth: usize, path: &KeyHash) -> bool {
        key::fill_after(path, depth) < self.low || key::keep_prefix_bits(path, depth) > self.high
    }

    fn key_out_of_range(&self, key_hash: &KeyHash) -> bool {
        *key_hash < self.low || *key_hash > self.high
    }
}

impl<'a, H> Iterator for Leaves<'a, H> {
    type Item = Result<Entry<'a>, VerifyError>;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        while let Some((id, depth, path)) = self.stack.pop() {
            if self.out_of_range(depth, &path) {
                continue;
            }

            match &tree.nodes[id].data {
                NodeData::Empty => {}
                NodeData::Leaf {
                    key_hash,
                    value,
                    key,
                } => {
                    if self.key_out_of_range(key_hash) {
                        continue;
                    }
                    return Some(Ok(Entry {
                        key_hash,
                        value,
                        key: key.as_deref(),
                    }));
                }
                NodeData::WitnessLeaf { key_hash, .. } if self.key_out_of_range(key_hash) => {}
                NodeData::WitnessLeaf { .. } | NodeData::Witness => {
                    self.stack.clear();
                    return Some(Err(VerifyError::IncompleteTree));
                }
                NodeData::Branch { left, right } => {
                    let mut right_path = path;
                    key::set_bit(&mut right_path, depth, true);

                    let (first, second) = if self.reverse {
                        ((*right, right_path), (*left, path))
                    } else {
                        ((*left, path), (*right, right_path))
                    };
                    self.stack.push((second.0, depth + 1, second.1));
                    self.stack.push((first.0, depth + 1, first.1));
                }
            }
        }
        None
    }
}
