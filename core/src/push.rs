//! Appending to a trie used as an array.
//!
//! In integer-array mode every key is an index mapped onto a path by [`key::from_integer`].
//! Because that mapping preserves order, the highest index is always stored in the rightmost
//! leaf, and the next free index can be found by walking the right edge of the trie.

use crate::{
    hasher::TrieHasher,
    key,
    tree::{NodeData, Tree, EMPTY_ID},
    update::{self, Update},
    verifier::VerifyError,
};

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

/// The index the next pushed value would be stored under.
///
/// The right edge of the trie must be known. A rightmost leaf whose key isn't in the integer
/// format makes the trie unusable as an array.
pub fn next_index<H: TrieHasher>(tree: &Tree<H>) -> Result<u64, VerifyError> {
    let mut id = tree.root_id();
    loop {
        match tree.node(id) {
            NodeData::Empty => return Ok(0),
            NodeData::Branch { left, right } => {
                id = if *right == EMPTY_ID { *left } else { *right };
            }
            NodeData::Leaf { key_hash, .. } | NodeData::WitnessLeaf { key_hash, .. } => {
                let last = key::to_integer(key_hash).ok_or(VerifyError::UnsupportedUpdate)?;
                return last
                    .checked_add(1)
                    .filter(|n| *n <= key::MAX_INTEGER)
                    .ok_or(VerifyError::IndexOutOfRange(last.saturating_add(1)));
            }
            NodeData::Witness => return Err(VerifyError::IncompleteTree),
        }
    }
}

/// Append values to the end of the array, in order. Returns the indices they were stored under.
pub fn push<H: TrieHasher>(
    tree: &mut Tree<H>,
    values: impl IntoIterator<Item = Vec<u8>>,
) -> Result<Vec<u64>, VerifyError> {
    let mut indices = Vec::new();
    for value in values {
        let index = next_index(tree)?;
        let key_hash = key::from_integer(index).map_err(|_| VerifyError::IndexOutOfRange(index))?;
        update::apply(tree, vec![(key_hash, Update::put(value))])?;
        tracing::trace!(index, "pushed");
        indices.push(index);
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hasher::Keccak256Hasher,
        key::{from_integer, hash_key},
        proof::{export_indices, import},
    };

    type H = Keccak256Hasher;

    fn array(values: &[&[u8]]) -> Tree<H> {
        let mut tree = Tree::new();
        let updates = values
            .iter()
            .enumerate()
            .map(|(i, v)| (from_integer(i as u64).unwrap(), Update::put(v.to_vec())))
            .collect();
        update::apply(&mut tree, updates).unwrap();
        tree
    }

    #[test]
    fn push_from_empty() {
        let mut tree = Tree::<H>::new();
        assert_eq!(next_index(&tree), Ok(0));

        let indices = push(&mut tree, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]).unwrap();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(tree.root(), array(&[&b"a"[..], &b"b"[..], &b"c"[..]]).root());
        assert_eq!(next_index(&tree), Ok(3));
    }

    #[test]
    fn push_onto_partial_tree() {
        let values: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; 3]).collect();
        let refs: Vec<&[u8]> = values.iter().map(|v| &v[..]).collect();
        let full = array(&refs);

        let proof = export_indices(&full, &[19, 20, 21]).unwrap();
        let mut partial = import::<H>(&proof).unwrap();
        assert_eq!(next_index(&partial), Ok(20));

        push(&mut partial, vec![b"x".to_vec(), b"y".to_vec()]).unwrap();

        let mut expected = full.clone();
        push(&mut expected, vec![b"x".to_vec(), b"y".to_vec()]).unwrap();
        assert_eq!(partial.root(), expected.root());
    }

    #[test]
    fn non_integer_keys_cannot_push() {
        let mut tree = Tree::<H>::new();
        update::apply(&mut tree, vec![(hash_key::<H>(b"a"), Update::put(b"1".to_vec()))]).unwrap();
        assert_eq!(next_index(&tree), Err(VerifyError::UnsupportedUpdate));
    }

    #[test]
    fn hidden_right_edge_is_incomplete() {
        let values: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i]).collect();
        let refs: Vec<&[u8]> = values.iter().map(|v| &v[..]).collect();
        let full = array(&refs);

        let partial = import::<H>(&export_indices(&full, &[0]).unwrap()).unwrap();
        assert_eq!(next_index(&partial), Err(VerifyError::IncompleteTree));
    }
}
