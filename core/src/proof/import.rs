//! Fold a proof's strands into a partial trie.

use super::{Cmd, Malformed, Proof, Terminal};
use crate::{
    hasher::TrieHasher,
    key::{self, KeyHash},
    tree::{NodeData, NodeId, Tree, EMPTY_ID},
    verifier::VerifyError,
};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

struct Accum {
    depth: usize,
    node: NodeId,
    next: Option<usize>,
    key_hash: KeyHash,
    merged: bool,
}

/// Rebuild the partial trie described by `proof`.
///
/// Every strand starts as an accumulator holding its terminal node. Each command lifts one
/// accumulator a level by hashing it together with a sibling. Once all commands have run, a
/// single accumulator must remain, at the root.
pub fn import<H: TrieHasher>(proof: &Proof) -> Result<Tree<H>, VerifyError> {
    if proof.strands.is_empty() {
        return Err(Malformed::NoStrands.into());
    }

    let mut tree = Tree::<H>::new();
    let num_strands = proof.strands.len();
    let mut accums = Vec::with_capacity(num_strands);

    for (i, strand) in proof.strands.iter().enumerate() {
        let node = match &strand.terminal {
            Terminal::Leaf { value, key } => {
                tree.new_leaf(strand.key_hash, value.clone(), key.clone())
            }
            Terminal::WitnessLeaf { value_hash } => {
                tree.new_witness_leaf(strand.key_hash, *value_hash)
            }
            Terminal::WitnessEmpty => EMPTY_ID,
            Terminal::Witness { node } => tree.new_witness(*node),
        };

        accums.push(Accum {
            depth: strand.depth as usize,
            node,
            next: (i + 1 < num_strands).then_some(i + 1),
            key_hash: strand.key_hash,
            merged: false,
        });
    }

    for cmd in &proof.cmds {
        let i = cmd.strand;
        if i >= num_strands {
            return Err(Malformed::JumpOutOfRange.into());
        }
        if accums[i].merged {
            return Err(Malformed::AlreadyMerged(i).into());
        }
        if accums[i].depth == 0 {
            return Err(Malformed::DepthUnderflow(i).into());
        }

        let depth = accums[i].depth;
        let (sibling, go_left) = match cmd.op {
            Cmd::HashProvided(hash) => (
                tree.new_witness(hash),
                !key::bit(&accums[i].key_hash, depth - 1),
            ),
            Cmd::HashEmpty => (EMPTY_ID, !key::bit(&accums[i].key_hash, depth - 1)),
            Cmd::Merge => {
                let next = accums[i].next.ok_or(Malformed::NothingToMerge(i))?;
                if accums[next].depth != depth {
                    tracing::trace!(strand = i, next, "merge depth mismatch");
                    return Err(VerifyError::RootMismatch);
                }
                if !are_siblings(&accums[i].key_hash, &accums[next].key_hash, depth) {
                    tracing::trace!(strand = i, next, "merged strands are not siblings");
                    return Err(VerifyError::RootMismatch);
                }

                accums[i].next = accums[next].next;
                accums[next].merged = true;
                (accums[next].node, true)
            }
        };

        check_canonical(&tree, accums[i].node, sibling)?;

        let branch = if go_left {
            tree.new_branch(accums[i].node, sibling)
        } else {
            tree.new_branch(sibling, accums[i].node)
        };

        accums[i].depth -= 1;
        accums[i].node = branch;
    }

    if accums[0].next.is_some() {
        tracing::trace!("not all strands were merged");
        return Err(VerifyError::RootMismatch);
    }
    if accums[0].depth != 0 {
        tracing::trace!(depth = accums[0].depth, "proof didn't reach the root");
        return Err(VerifyError::RootMismatch);
    }

    tree.set_root(accums[0].node);
    Ok(tree)
}

// Two nodes at `depth` are siblings iff their paths agree above `depth - 1` and split there,
// left then right.
fn are_siblings(left: &KeyHash, right: &KeyHash, depth: usize) -> bool {
    key::shared_bits(left, right) == depth - 1
        && !key::bit(left, depth - 1)
        && key::bit(right, depth - 1)
}

// A canonical trie never has a branch whose children are both empty, or a leaf next to an empty
// sibling.
fn check_canonical<H: TrieHasher>(
    tree: &Tree<H>,
    a: NodeId,
    b: NodeId,
) -> Result<(), VerifyError> {
    let collapsible = |x: &NodeData| {
        matches!(
            x,
            NodeData::Empty | NodeData::Leaf { .. } | NodeData::WitnessLeaf { .. }
        )
    };

    let (a, b) = (tree.node(a), tree.node(b));
    let a_empty = matches!(a, NodeData::Empty);
    let b_empty = matches!(b, NodeData::Empty);
    if (a_empty && collapsible(b)) || (b_empty && collapsible(a)) {
        return Err(VerifyError::InvalidWitness);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hasher::Keccak256Hasher,
        proof::{ProofCmd, Strand},
        trie::{BranchData, LeafData, EMPTY},
    };

    type H = Keccak256Hasher;

    fn key(first: u8) -> KeyHash {
        let mut k = [0u8; 32];
        k[0] = first;
        k[31] = 1;
        k
    }

    fn leaf(depth: u8, key_hash: KeyHash, value: &[u8]) -> Strand {
        Strand {
            depth,
            key_hash,
            terminal: Terminal::Leaf {
                value: value.to_vec(),
                key: None,
            },
        }
    }

    fn cmd(op: Cmd, strand: usize) -> ProofCmd {
        ProofCmd { op, strand }
    }

    fn leaf_hash(key_hash: KeyHash, value: &[u8]) -> [u8; 32] {
        LeafData {
            key_hash,
            value_hash: <H as crate::hasher::ValueHasher>::hash_value(value),
        }
        .hash::<H>()
    }

    #[test]
    fn single_leaf_at_root() {
        let proof = Proof {
            strands: vec![leaf(0, key(0x12), b"v")],
            cmds: vec![],
        };
        let tree = import::<H>(&proof).unwrap();
        assert_eq!(tree.root(), leaf_hash(key(0x12), b"v"));
    }

    #[test]
    fn merge_two_leaves() {
        let proof = Proof {
            strands: vec![leaf(1, key(0x00), b"x"), leaf(1, key(0x80), b"y")],
            cmds: vec![cmd(Cmd::Merge, 0)],
        };
        let tree = import::<H>(&proof).unwrap();
        let expected = BranchData {
            left: leaf_hash(key(0x00), b"x"),
            right: leaf_hash(key(0x80), b"y"),
        }
        .hash::<H>();
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.get(&key(0x80)), Ok(Some(&b"y"[..])));
    }

    #[test]
    fn provided_hash_goes_on_the_other_side() {
        let sibling = [5u8; 32];
        let proof = Proof {
            strands: vec![leaf(1, key(0x80), b"y")],
            cmds: vec![cmd(Cmd::HashProvided(sibling), 0)],
        };
        let tree = import::<H>(&proof).unwrap();
        let expected = BranchData {
            left: sibling,
            right: leaf_hash(key(0x80), b"y"),
        }
        .hash::<H>();
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn structural_errors() {
        assert_eq!(
            import::<H>(&Proof::default()).unwrap_err(),
            VerifyError::MalformedProof(Malformed::NoStrands)
        );

        let underflow = Proof {
            strands: vec![leaf(0, key(0x12), b"v")],
            cmds: vec![cmd(Cmd::HashEmpty, 0)],
        };
        assert_eq!(
            import::<H>(&underflow).unwrap_err(),
            VerifyError::MalformedProof(Malformed::DepthUnderflow(0))
        );

        let nothing = Proof {
            strands: vec![leaf(1, key(0x12), b"v")],
            cmds: vec![cmd(Cmd::Merge, 0)],
        };
        assert_eq!(
            import::<H>(&nothing).unwrap_err(),
            VerifyError::MalformedProof(Malformed::NothingToMerge(0))
        );

        let twice = Proof {
            strands: vec![
                leaf(1, key(0x00), b"x"),
                leaf(1, key(0x80), b"y"),
            ],
            cmds: vec![cmd(Cmd::Merge, 0), cmd(Cmd::HashEmpty, 1)],
        };
        assert_eq!(
            import::<H>(&twice).unwrap_err(),
            VerifyError::MalformedProof(Malformed::AlreadyMerged(1))
        );
    }

    #[test]
    fn mismatched_merges() {
        // both strands on the left.
        let same_side = Proof {
            strands: vec![leaf(1, key(0x00), b"x"), leaf(1, key(0x40), b"y")],
            cmds: vec![cmd(Cmd::Merge, 0)],
        };
        assert_eq!(
            import::<H>(&same_side).unwrap_err(),
            VerifyError::RootMismatch
        );

        let depths = Proof {
            strands: vec![leaf(2, key(0x00), b"x"), leaf(1, key(0x80), b"y")],
            cmds: vec![cmd(Cmd::Merge, 0)],
        };
        assert_eq!(import::<H>(&depths).unwrap_err(), VerifyError::RootMismatch);

        let unmerged = Proof {
            strands: vec![leaf(1, key(0x00), b"x"), leaf(1, key(0x80), b"y")],
            cmds: vec![
                cmd(Cmd::HashProvided([5; 32]), 1),
                cmd(Cmd::HashProvided([6; 32]), 0),
            ],
        };
        assert_eq!(
            import::<H>(&unmerged).unwrap_err(),
            VerifyError::RootMismatch
        );

        let short = Proof {
            strands: vec![leaf(2, key(0x00), b"x"), leaf(2, key(0x40), b"y")],
            cmds: vec![cmd(Cmd::Merge, 0)],
        };
        assert_eq!(import::<H>(&short).unwrap_err(), VerifyError::RootMismatch);
    }

    #[test]
    fn non_canonical_witnesses() {
        let empty_pair = Proof {
            strands: vec![Strand {
                depth: 1,
                key_hash: EMPTY,
                terminal: Terminal::WitnessEmpty,
            }],
            cmds: vec![cmd(Cmd::HashProvided(EMPTY), 0)],
        };
        assert_eq!(
            import::<H>(&empty_pair).unwrap_err(),
            VerifyError::InvalidWitness
        );

        let lonely_leaf = Proof {
            strands: vec![leaf(1, key(0x00), b"x")],
            cmds: vec![cmd(Cmd::HashEmpty, 0)],
        };
        assert_eq!(
            import::<H>(&lonely_leaf).unwrap_err(),
            VerifyError::InvalidWitness
        );
    }
}
