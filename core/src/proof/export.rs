//! Generate a proof for a set of keys from a (partial) trie.
//!
//! The trie is walked along every requested path. Each walk ends in a strand: a leaf holding the
//! key, a witness for a different leaf occupying the path, or a witness for an empty sub-trie.
//! Then the strands are lifted towards the root level by level, deepest first, emitting a merge
//! whenever two strands meet and a sibling hash otherwise.

use super::{Cmd, Proof, ProofCmd, Strand, Terminal};
use crate::{
    hasher::TrieHasher,
    key::{self, KeyHash},
    tree::{NodeData, NodeId, Tree, EMPTY_ID},
    verifier::VerifyError,
};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

struct Item {
    strand: Strand,
    // The nodes along the strand's path, from the root to the terminal.
    path: Vec<NodeId>,
}

/// Produce a proof covering every key in `key_hashes`.
///
/// Keys may be given in any order and may repeat. Fails with [`VerifyError::IncompleteTree`] if
/// a path runs into a part of the trie which isn't known.
pub fn export<H: TrieHasher>(tree: &Tree<H>, key_hashes: &[KeyHash]) -> Result<Proof, VerifyError> {
    let mut sorted = key_hashes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut items = Vec::new();
    let mut path = Vec::new();
    walk(tree, tree.root_id(), 0, &sorted, &mut path, &mut items)?;

    let cmds = lift(tree, &items);
    let strands = items.into_iter().map(|item| item.strand).collect();

    Ok(Proof { strands, cmds })
}

/// Produce a proof covering the given integer keys.
pub fn export_indices<H: TrieHasher>(
    tree: &Tree<H>,
    indices: &[u64],
) -> Result<Proof, VerifyError> {
    let key_hashes = indices
        .iter()
        .map(|n| key::from_integer(*n).map_err(|_| VerifyError::IndexOutOfRange(*n)))
        .collect::<Result<Vec<_>, _>>()?;
    export(tree, &key_hashes)
}

/// Produce a proof revealing every leaf whose key hash lies within `begin..=end`.
///
/// Sub-tries outside of the range are folded into sibling hashes. With a `depth_limit`, only
/// that many levels of two-sided branches are expanded; deeper sub-tries become
/// [`Terminal::Witness`] strands holding just their commitment. Leaves reached on the way are
/// always revealed, even when their key falls outside of the range.
///
/// An empty range (`begin > end`) yields a proof without strands.
pub fn export_range<H: TrieHasher>(
    tree: &Tree<H>,
    begin: &KeyHash,
    end: &KeyHash,
    depth_limit: Option<usize>,
) -> Result<Proof, VerifyError> {
    if begin > end {
        return Ok(Proof::default());
    }

    let mut items = Vec::new();
    let mut range = RangeWalk {
        begin,
        end,
        path: Vec::new(),
        items: &mut items,
    };
    range.walk(tree, tree.root_id(), 0, [0u8; 32], depth_limit)?;

    let cmds = lift(tree, &items);
    let strands = items.into_iter().map(|item| item.strand).collect();

    Ok(Proof { strands, cmds })
}

struct RangeWalk<'a> {
    begin: &'a KeyHash,
    end: &'a KeyHash,
    path: Vec<NodeId>,
    items: &'a mut Vec<Item>,
}

impl RangeWalk<'_> {
    fn walk<H: TrieHasher>(
        &mut self,
        tree: &Tree<H>,
        id: NodeId,
        depth: usize,
        key_path: KeyHash,
        depth_limit: Option<usize>,
    ) -> Result<(), VerifyError> {
        self.path.push(id);

        let terminal = match tree.node(id) {
            NodeData::Empty => Some((key_path, Terminal::WitnessEmpty)),
            NodeData::Leaf {
                key_hash,
                value,
                key,
            } => Some((
                *key_hash,
                Terminal::Leaf {
                    value: value.clone(),
                    key: key.clone(),
                },
            )),
            NodeData::WitnessLeaf { .. } | NodeData::Witness => {
                return Err(VerifyError::IncompleteTree)
            }
            NodeData::Branch { .. } if depth_limit == Some(0) => Some((
                key_path,
                Terminal::Witness {
                    node: tree.hash(id),
                },
            )),
            NodeData::Branch { left, right } => {
                let (left, right) = (*left, *right);
                let depth_limit = match depth_limit {
                    Some(n) if left != EMPTY_ID && right != EMPTY_ID => Some(n - 1),
                    other => other,
                };

                let mut right_path = key_path;
                key::set_bit(&mut right_path, depth, true);

                let mut go_left = self.begin < &right_path;
                let mut go_right = self.end >= &right_path;
                // as with key proofs, an empty side next to a walked one is proven by a
                // `HashEmpty` on the other side's strands.
                if go_left && go_right {
                    go_left = left != EMPTY_ID;
                    go_right = right != EMPTY_ID;
                }

                if go_left {
                    self.walk(tree, left, depth + 1, key_path, depth_limit)?;
                }
                if go_right {
                    self.walk(tree, right, depth + 1, right_path, depth_limit)?;
                }
                None
            }
        };

        if let Some((key_hash, terminal)) = terminal {
            self.items.push(Item {
                strand: Strand {
                    depth: depth as u8,
                    key_hash,
                    terminal,
                },
                path: self.path.clone(),
            });
        }

        self.path.pop();
        Ok(())
    }
}

fn walk<H: TrieHasher>(
    tree: &Tree<H>,
    id: NodeId,
    depth: usize,
    keys: &[KeyHash],
    path: &mut Vec<NodeId>,
    items: &mut Vec<Item>,
) -> Result<(), VerifyError> {
    let Some(first) = keys.first() else {
        return Ok(());
    };

    path.push(id);

    let strand = match tree.node(id) {
        NodeData::Empty => Some(Strand {
            depth: depth as u8,
            key_hash: key::keep_prefix_bits(first, depth),
            terminal: Terminal::WitnessEmpty,
        }),
        NodeData::Leaf {
            key_hash,
            value,
            key,
        } => Some(if keys.contains(key_hash) {
            Strand {
                depth: depth as u8,
                key_hash: *key_hash,
                terminal: Terminal::Leaf {
                    value: value.clone(),
                    key: key.clone(),
                },
            }
        } else {
            Strand {
                depth: depth as u8,
                key_hash: *key_hash,
                terminal: Terminal::WitnessLeaf {
                    value_hash: H::hash_value(value),
                },
            }
        }),
        NodeData::WitnessLeaf {
            key_hash,
            value_hash,
        } => {
            if keys.contains(key_hash) {
                return Err(VerifyError::IncompleteTree);
            }
            Some(Strand {
                depth: depth as u8,
                key_hash: *key_hash,
                terminal: Terminal::WitnessLeaf {
                    value_hash: *value_hash,
                },
            })
        }
        NodeData::Witness => return Err(VerifyError::IncompleteTree),
        NodeData::Branch { left, right } => {
            let (left, right) = (*left, *right);
            let middle = keys.partition_point(|k| !key::bit(k, depth));
            let (left_keys, right_keys) = keys.split_at(middle);

            // Don't descend into an empty side when the other side has keys: the sibling
            // hash of the other side's strands proves it empty.
            if left != EMPTY_ID || right_keys.is_empty() {
                walk(tree, left, depth + 1, left_keys, path, items)?;
            }
            if right != EMPTY_ID || left_keys.is_empty() {
                walk(tree, right, depth + 1, right_keys, path, items)?;
            }
            None
        }
    };

    if let Some(strand) = strand {
        items.push(Item {
            strand,
            path: path.clone(),
        });
    }

    path.pop();
    Ok(())
}

struct Accum {
    depth: usize,
    next: Option<usize>,
    merged_order: usize,
    cmds: Vec<ProofCmd>,
}

fn lift<H: TrieHasher>(tree: &Tree<H>, items: &[Item]) -> Vec<ProofCmd> {
    if items.is_empty() {
        return Vec::new();
    }

    let mut accums: Vec<Accum> = items
        .iter()
        .enumerate()
        .map(|(i, item)| Accum {
            depth: item.strand.depth as usize,
            next: (i + 1 < items.len()).then_some(i + 1),
            merged_order: 0,
            cmds: Vec::new(),
        })
        .collect();

    let max_depth = accums.iter().map(|a| a.depth).max().unwrap_or(0);
    let mut merge_order = 0;

    for depth in (1..=max_depth).rev() {
        let mut cursor = Some(0);
        while let Some(i) = cursor {
            if accums[i].depth == depth {
                let key_hash = &items[i].strand.key_hash;

                let merge_with = accums[i].next.filter(|&n| {
                    accums[n].depth == depth && {
                        let next_key = &items[n].strand.key_hash;
                        key::shared_bits(key_hash, next_key) >= depth - 1
                            && key::bit(next_key, depth - 1)
                            && !key::bit(key_hash, depth - 1)
                    }
                });

                let op = match merge_with {
                    Some(n) => {
                        accums[n].merged_order = merge_order;
                        merge_order += 1;
                        accums[i].next = accums[n].next;
                        Cmd::Merge
                    }
                    None => {
                        let sibling = match tree.node(items[i].path[depth - 1]) {
                            NodeData::Branch { left, right } => {
                                if key::bit(key_hash, depth - 1) {
                                    *left
                                } else {
                                    *right
                                }
                            }
                            // the walk only ever passes through branches.
                            _ => EMPTY_ID,
                        };
                        if sibling == EMPTY_ID {
                            Cmd::HashEmpty
                        } else {
                            Cmd::HashProvided(tree.hash(sibling))
                        }
                    }
                };

                accums[i].cmds.push(ProofCmd { op, strand: i });
                accums[i].depth -= 1;
            }
            cursor = accums[i].next;
        }
    }

    accums[0].merged_order = merge_order;
    accums.sort_by_key(|a| a.merged_order);

    accums.into_iter().flat_map(|a| a.cmds).collect()
}
