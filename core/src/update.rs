//! Trie update logic.
//!
//! A batch of puts and deletes is applied in one pass. The batch is sorted by key hash and then
//! partitioned at every branch by the bit at that branch's depth, so each touched node is
//! visited exactly once. When a partition reaches a terminal node, the terminal is replaced with
//! a fresh sub-trie built from the partition, with the terminal's own leaf spliced in if it
//! survives.
//!
//! For example,
//!   - Replacing a leaf with another leaf, when the only update in the partition is a put to
//!     the same key.
//!   - Replacing a leaf with the empty node, when the only update is its deletion.
//!   - Replacing the empty node with a leaf, when there's a single put with that prefix.
//!   - Replacing a leaf or the empty node with a larger sub-trie in the case of multiple puts for
//!     keys beginning with that prefix, possibly preserving the initial leaf.
//!
//! Deletions may leave a branch with an empty child next to a leaf, or with two empty children.
//! Such branches are compacted upwards on the way back to the root, as far as they go.
//! Compaction needs to know the shape of the sibling, so it can't pass an opaque witness.

use crate::{
    hasher::TrieHasher,
    key::{self, KeyHash},
    tree::{NodeData, NodeId, Tree, EMPTY_ID},
    trie::NodeKind,
    verifier::VerifyError,
};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// A single change to the trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Insert or overwrite the value. The full key is kept alongside the leaf when given.
    Put {
        value: Vec<u8>,
        key: Option<Vec<u8>>,
    },
    Delete,
}

impl Update {
    /// A put without the full key.
    pub fn put(value: Vec<u8>) -> Self {
        Update::Put { value, key: None }
    }
}

/// Apply a batch of updates to the trie.
///
/// Updates may be given in any order. When the same key appears more than once, the last
/// update for it wins. On error the trie is left unchanged.
pub fn apply<H: TrieHasher>(
    tree: &mut Tree<H>,
    mut updates: Vec<(KeyHash, Update)>,
) -> Result<(), VerifyError> {
    if updates.is_empty() {
        return Ok(());
    }

    // stable, so that duplicates stay in the caller's order.
    updates.sort_by(|a, b| a.0.cmp(&b.0));
    let mut ops: Vec<(KeyHash, Update)> = Vec::with_capacity(updates.len());
    for (key_hash, update) in updates {
        if ops.last().map_or(false, |(last, _)| *last == key_hash) {
            ops.pop();
        }
        ops.push((key_hash, update));
    }

    let (root, _) = update_node(tree, tree.root_id(), 0, &ops)?;
    tracing::trace!(ops = ops.len(), hash_ops = tree.hash_ops(), "applied updates");
    tree.set_root(root);
    Ok(())
}

#[derive(Clone, Copy)]
enum Shape {
    Empty,
    Leaf(KeyHash),
    Witness,
    Branch(NodeId, NodeId),
}

// Returns the replacement for the node, and whether it shrank into something its parent may
// need to compact.
fn update_node<H: TrieHasher>(
    tree: &mut Tree<H>,
    id: NodeId,
    depth: usize,
    ops: &[(KeyHash, Update)],
) -> Result<(NodeId, bool), VerifyError> {
    if ops.is_empty() {
        return Ok((id, false));
    }

    let shape = match tree.node(id) {
        NodeData::Empty => Shape::Empty,
        NodeData::Leaf { key_hash, .. } | NodeData::WitnessLeaf { key_hash, .. } => {
            Shape::Leaf(*key_hash)
        }
        NodeData::Witness => Shape::Witness,
        NodeData::Branch { left, right } => Shape::Branch(*left, *right),
    };

    match shape {
        Shape::Empty => {
            let leaves: Vec<_> = ops.iter().filter_map(new_leaf_source).collect();
            if leaves.is_empty() {
                // only deletions of keys which don't exist.
                return Ok((id, false));
            }
            Ok((build_sub_trie(tree, depth, leaves), false))
        }
        Shape::Leaf(leaf_key) => update_leaf(tree, id, leaf_key, depth, ops),
        Shape::Witness => {
            tracing::trace!(depth, "update reached an opaque witness");
            Err(VerifyError::UnsupportedUpdate)
        }
        Shape::Branch(left, right) => {
            let middle = ops.partition_point(|(k, _)| !key::bit(k, depth));

            let (new_left, left_bubble) = update_node(tree, left, depth + 1, &ops[..middle])?;
            let (new_right, right_bubble) = update_node(tree, right, depth + 1, &ops[middle..])?;

            if new_left == left && new_right == right {
                return Ok((id, false));
            }

            if left_bubble || right_bubble {
                match (tree.node(new_left), tree.node(new_right)) {
                    (NodeData::Empty, NodeData::Empty) => return Ok((EMPTY_ID, true)),
                    (NodeData::Witness, NodeData::Empty) | (NodeData::Empty, NodeData::Witness) => {
                        return Err(VerifyError::IncompleteTree)
                    }
                    (l, NodeData::Empty) if l.kind() == NodeKind::Leaf => {
                        return Ok((new_left, true))
                    }
                    (NodeData::Empty, r) if r.kind() == NodeKind::Leaf => {
                        return Ok((new_right, true))
                    }
                    // one side is a branch, or both are leaves.
                    _ => {}
                }
            }

            Ok((tree.new_branch(new_left, new_right), false))
        }
    }
}

fn update_leaf<H: TrieHasher>(
    tree: &mut Tree<H>,
    id: NodeId,
    leaf_key: KeyHash,
    depth: usize,
    ops: &[(KeyHash, Update)],
) -> Result<(NodeId, bool), VerifyError> {
    if let [(key_hash, update)] = ops {
        if *key_hash == leaf_key {
            return Ok(match update {
                Update::Delete => (EMPTY_ID, true),
                Update::Put { value, .. } if unchanged(tree.node(id), value) => (id, false),
                Update::Put { value, key } => {
                    // a witness leaf is upgraded to a full leaf here.
                    (tree.new_leaf(leaf_key, value.clone(), key.clone()), false)
                }
            });
        }
    }

    let deletes_leaf = ops
        .binary_search_by(|(k, _)| k.cmp(&leaf_key))
        .map_or(false, |i| ops[i].1 == Update::Delete);

    let leaves = leaf_ops_spliced(id, leaf_key, ops);
    if leaves.is_empty() {
        return Ok(if deletes_leaf {
            (EMPTY_ID, true)
        } else {
            (id, false)
        });
    }

    Ok((build_sub_trie(tree, depth, leaves), false))
}

fn unchanged(node: &NodeData, new_value: &[u8]) -> bool {
    matches!(node, NodeData::Leaf { value, .. } if value.as_slice() == new_value)
}

enum LeafSource<'a> {
    Existing(NodeId),
    New {
        value: &'a [u8],
        key: Option<&'a [u8]>,
    },
}

fn new_leaf_source((key_hash, update): &(KeyHash, Update)) -> Option<(KeyHash, LeafSource<'_>)> {
    match update {
        Update::Put { value, key } => Some((
            *key_hash,
            LeafSource::New {
                value,
                key: key.as_deref(),
            },
        )),
        Update::Delete => None,
    }
}

// All puts of the partition, with the existing leaf spliced in at its sorted position unless
// its key is updated too. Deletions are dropped: they are implicit in a fresh sub-trie.
fn leaf_ops_spliced(
    existing: NodeId,
    leaf_key: KeyHash,
    ops: &[(KeyHash, Update)],
) -> Vec<(KeyHash, LeafSource<'_>)> {
    let splice_index = ops.binary_search_by(|(k, _)| k.cmp(&leaf_key)).err();

    let mut leaves = Vec::with_capacity(ops.len() + 1);
    let (before, after) = ops.split_at(splice_index.unwrap_or(0));
    leaves.extend(before.iter().filter_map(new_leaf_source));
    if splice_index.is_some() {
        leaves.push((leaf_key, LeafSource::Existing(existing)));
    }
    leaves.extend(after.iter().filter_map(new_leaf_source));
    leaves
}

// Build a compact sub-trie rooted at depth `skip` out of leaves sorted by key, returning its
// root.
//
// Consider any three leaves A, B, C in sorted order by key, with different keys. A and B share
// n1 bits, B and C share n2. n1 cannot equal n2, and B is a leaf at depth max(n1, n2) + 1. If n1
// is less than n2, B is on the left of its parent, otherwise on the right. The first leaf only
// has a following neighbor and the last only a preceding one.
//
// Leaves are placed left to right. A frontier of finished sub-tries waits for siblings coming
// from the right, and every leaf hashes upward as far as the following leaf can't affect.
fn build_sub_trie<H: TrieHasher>(
    tree: &mut Tree<H>,
    skip: usize,
    leaves: Vec<(KeyHash, LeafSource<'_>)>,
) -> NodeId {
    // (node, depth) pairs, deepest last.
    let mut pending_siblings: Vec<(NodeId, usize)> = Vec::new();

    let mut leaves = leaves.into_iter();
    let mut a: Option<KeyHash> = None;
    let mut b = leaves.next();
    let mut c = leaves.next();

    while let Some((this_key, source)) = b {
        let n1 = a.map(|k| key::shared_bits(&k, &this_key) - skip);
        let n2 = c.as_ref().map(|(k, _)| key::shared_bits(k, &this_key) - skip);

        let leaf = match source {
            LeafSource::Existing(id) => id,
            LeafSource::New { value, key } => {
                tree.new_leaf(this_key, value.to_vec(), key.map(|k| k.to_vec()))
            }
        };

        let (depth_after_skip, hash_up_layers) = match (n1, n2) {
            // single leaf: it is the whole sub-trie.
            (None, None) => (0, 0),
            // first leaf, its ancestors are completed by the next.
            (None, Some(n2)) => (n2 + 1, 0),
            // last leaf, hash up to the sub-trie root.
            (Some(n1), None) => (n1 + 1, n1 + 1),
            (Some(n1), Some(n2)) => (core::cmp::max(n1, n2) + 1, n1.saturating_sub(n2)),
        };

        let mut layer = skip + depth_after_skip;
        let mut last_node = leaf;
        for _ in 0..hash_up_layers {
            layer -= 1;
            let sibling = match pending_siblings.last() {
                Some(&(node, d)) if d == layer + 1 => {
                    pending_siblings.pop();
                    node
                }
                _ => EMPTY_ID,
            };

            last_node = if key::bit(&this_key, layer) {
                tree.new_branch(sibling, last_node)
            } else {
                tree.new_branch(last_node, sibling)
            };
        }
        pending_siblings.push((last_node, layer));

        a = Some(this_key);
        b = c;
        c = leaves.next();
    }

    pending_siblings.pop().map_or(EMPTY_ID, |(node, _)| node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hasher::Keccak256Hasher,
        key::hash_key,
        proof::{export, import},
        trie::EMPTY,
    };

    type H = Keccak256Hasher;

    fn put(key: &[u8], value: &[u8]) -> (KeyHash, Update) {
        (hash_key::<H>(key), Update::put(value.to_vec()))
    }

    fn del(key: &[u8]) -> (KeyHash, Update) {
        (hash_key::<H>(key), Update::Delete)
    }

    fn tree_of(updates: Vec<(KeyHash, Update)>) -> Tree<H> {
        let mut tree = Tree::new();
        apply(&mut tree, updates).unwrap();
        tree
    }

    fn keys(n: u32) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("key-{}", i).into_bytes()).collect()
    }

    #[test]
    fn incremental_matches_batch() {
        let keys = keys(100);
        let batch = tree_of(keys.iter().map(|k| put(k, k)).collect());

        let mut incremental = Tree::<H>::new();
        for k in keys.iter().rev() {
            apply(&mut incremental, vec![put(k, k)]).unwrap();
        }

        assert_eq!(batch.root(), incremental.root());
        for k in &keys {
            assert_eq!(batch.get(&hash_key::<H>(k)), Ok(Some(&k[..])));
        }
    }

    #[test]
    fn last_duplicate_wins() {
        let tree = tree_of(vec![put(b"a", b"1"), put(b"a", b"2"), put(b"b", b"3")]);
        let expected = tree_of(vec![put(b"b", b"3"), put(b"a", b"2")]);
        assert_eq!(tree.root(), expected.root());

        let deleted = tree_of(vec![put(b"a", b"1"), del(b"a"), put(b"b", b"3")]);
        assert_eq!(deleted.root(), tree_of(vec![put(b"b", b"3")]).root());
    }

    #[test]
    fn deletion_compacts() {
        let keys = keys(40);
        let mut tree = tree_of(keys.iter().map(|k| put(k, b"v")).collect());

        apply(&mut tree, keys[10..].iter().map(|k| del(k)).collect()).unwrap();
        let expected = tree_of(keys[..10].iter().map(|k| put(k, b"v")).collect());
        assert_eq!(tree.root(), expected.root());

        apply(&mut tree, keys[1..10].iter().map(|k| del(k)).collect()).unwrap();
        assert_eq!(tree.root(), tree_of(vec![put(&keys[0], b"v")]).root());

        apply(&mut tree, vec![del(&keys[0])]).unwrap();
        assert_eq!(tree.root(), EMPTY);
    }

    #[test]
    fn deleting_missing_keys_changes_nothing() {
        let mut tree = tree_of(vec![put(b"a", b"1"), put(b"b", b"2")]);
        let root = tree.root();
        let ops = tree.hash_ops();
        apply(&mut tree, vec![del(b"c"), del(b"d")]).unwrap();
        assert_eq!(tree.root(), root);
        assert_eq!(tree.hash_ops(), ops);
    }

    #[test]
    fn rewriting_same_value_does_no_hashing() {
        let mut tree = tree_of(vec![put(b"a", b"1"), put(b"b", b"2")]);
        let ops = tree.hash_ops();
        apply(&mut tree, vec![put(b"a", b"1")]).unwrap();
        assert_eq!(tree.hash_ops(), ops);
    }

    #[test]
    fn updates_need_known_paths() {
        let full = tree_of(keys(8).iter().map(|k| put(k, b"v")).collect());
        let known = hash_key::<H>(b"key-0");
        let mut partial = import::<H>(&export(&full, &[known]).unwrap()).unwrap();

        // somewhere under a sibling hash.
        let err = apply(&mut partial, vec![put(b"key-5", b"w")]).unwrap_err();
        assert!(matches!(
            err,
            VerifyError::UnsupportedUpdate | VerifyError::IncompleteTree
        ));

        apply(&mut partial, vec![put(b"key-0", b"w")]).unwrap();
        let mut expected = full.clone();
        apply(&mut expected, vec![put(b"key-0", b"w")]).unwrap();
        assert_eq!(partial.root(), expected.root());
    }
}
