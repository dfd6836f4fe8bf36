//! Verification of encoded proofs against a set of queries and updates.
//!
//! [`verify_and_update`] is the single entry point: it decodes a proof, rebuilds the partial
//! trie it describes, answers the inclusion and exclusion queries, applies updates and pushes,
//! and reports the old and new roots. Any failure aborts the whole call.

use crate::{
    hasher::{TrieHasher, ValueHasher},
    key::{self, KeyHash},
    proof::{self, Malformed, Proof, WitnessKind},
    push,
    trie::Node,
    update::{self, Update},
};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Errors of proof verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    /// The proof can't be parsed, or its commands are structurally invalid.
    MalformedProof(Malformed),
    /// A strand has a terminal tag which isn't known.
    UnknownWitnessKind(u8),
    /// A query or update reached a part of the trie the proof doesn't reveal.
    IncompleteTree,
    /// A witness contradicts the canonical shape of the trie or the claim made about it.
    InvalidWitness,
    /// The strands don't fold into a single consistent root, or the root isn't the expected one.
    RootMismatch,
    /// An update targets a key which no strand covers.
    UnsupportedUpdate,
    /// An integer key is beyond the range of the integer encoding.
    IndexOutOfRange(u64),
}

impl From<Malformed> for VerifyError {
    fn from(e: Malformed) -> Self {
        VerifyError::MalformedProof(e)
    }
}

impl core::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            VerifyError::MalformedProof(e) => write!(f, "malformed proof: {}", e),
            VerifyError::UnknownWitnessKind(tag) => write!(f, "unknown strand type {}", tag),
            VerifyError::IncompleteTree => write!(f, "incomplete tree"),
            VerifyError::InvalidWitness => write!(f, "invalid witness"),
            VerifyError::RootMismatch => write!(f, "root mismatch"),
            VerifyError::UnsupportedUpdate => write!(f, "update not covered by the proof"),
            VerifyError::IndexOutOfRange(n) => write!(f, "index {} out of range", n),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for VerifyError {}

/// A key, either as bytes to be hashed or as an array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Key(Vec<u8>),
    Index(u64),
}

impl Target {
    pub fn key_hash<H: ValueHasher>(&self) -> Result<KeyHash, VerifyError> {
        match self {
            Target::Key(k) => Ok(key::hash_key::<H>(k)),
            Target::Index(n) => key::from_integer(*n).map_err(|_| VerifyError::IndexOutOfRange(*n)),
        }
    }
}

/// What to check and change against a proof.
#[derive(Debug, Default, Clone)]
pub struct Query {
    include: Vec<Target>,
    exclude: Vec<Target>,
    updates: Vec<(Target, Option<Vec<u8>>)>,
    pushes: Vec<Vec<u8>>,
    expected_root: Option<Node>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from parallel lists. `update_values` holds one value for each update key,
    /// followed by the values to push.
    ///
    /// Returns `None` if there are fewer values than update keys.
    pub fn from_parts(
        inclusion_keys: Vec<Vec<u8>>,
        inclusion_indices: Vec<u64>,
        update_keys: Vec<Vec<u8>>,
        mut update_values: Vec<Vec<u8>>,
    ) -> Option<Self> {
        if update_values.len() < update_keys.len() {
            return None;
        }
        let pushes = update_values.split_off(update_keys.len());

        let mut query = Query::new();
        query.include = inclusion_keys
            .into_iter()
            .map(Target::Key)
            .chain(inclusion_indices.into_iter().map(Target::Index))
            .collect();
        query.updates = update_keys
            .into_iter()
            .zip(update_values)
            .map(|(k, v)| (Target::Key(k), Some(v)))
            .collect();
        query.pushes = pushes;
        Some(query)
    }

    /// Ask for the value of a key.
    pub fn include(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.include.push(Target::Key(key.into()));
        self
    }

    pub fn include_index(mut self, index: u64) -> Self {
        self.include.push(Target::Index(index));
        self
    }

    /// Ask for confirmation that a key is absent.
    pub fn exclude(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.exclude.push(Target::Key(key.into()));
        self
    }

    pub fn exclude_index(mut self, index: u64) -> Self {
        self.exclude.push(Target::Index(index));
        self
    }

    pub fn put(mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        self.updates
            .push((Target::Key(key.into()), Some(value.into())));
        self
    }

    pub fn put_index(mut self, index: u64, value: impl Into<Vec<u8>>) -> Self {
        self.updates.push((Target::Index(index), Some(value.into())));
        self
    }

    pub fn delete(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.updates.push((Target::Key(key.into()), None));
        self
    }

    pub fn delete_index(mut self, index: u64) -> Self {
        self.updates.push((Target::Index(index), None));
        self
    }

    /// Append a value after the highest index. Pushes are applied after all other updates, in
    /// the order given.
    pub fn push(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.pushes.push(value.into());
        self
    }

    /// Fail with [`VerifyError::RootMismatch`] unless the proof folds to `root`.
    pub fn expect_root(mut self, root: Node) -> Self {
        self.expected_root = Some(root);
        self
    }

    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty() || !self.pushes.is_empty()
    }
}

/// Work performed by a verification, in hash invocations and visited nodes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cost {
    /// Hashing while rebuilding the partial trie.
    pub decode: u64,
    /// Nodes visited while answering queries.
    pub query: u64,
    /// Hashing while applying updates and pushes.
    pub update: u64,
}

impl Cost {
    pub fn total(&self) -> u64 {
        self.decode + self.query + self.update
    }
}

/// The outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    /// The root the proof folds to.
    pub root: Node,
    /// One entry per included key or index, in query order. `None` when the proof shows the
    /// key is absent.
    pub values: Vec<Option<Vec<u8>>>,
    /// One entry per excluded key or index, in query order. `None` when the key is present.
    pub absences: Vec<Option<WitnessKind>>,
    /// The root after updates and pushes. Equal to `root` if there were none.
    pub new_root: Node,
    /// The indices assigned to pushed values.
    pub pushed: Vec<u64>,
    pub cost: Cost,
}

/// Verify an encoded proof, answer `query` against it and apply its updates.
#[tracing::instrument(level = "debug", skip_all, fields(proof_len = proof.len()))]
pub fn verify_and_update<H: TrieHasher>(
    proof: &[u8],
    query: &Query,
) -> Result<Verified, VerifyError> {
    let decoded = proof::decode::<H>(proof)?;
    verify_decoded::<H>(&decoded, query)
}

/// Like [`verify_and_update`], for a proof which was already decoded.
pub fn verify_decoded<H: TrieHasher>(
    decoded: &Proof,
    query: &Query,
) -> Result<Verified, VerifyError> {
    let mut tree = proof::import::<H>(decoded)?;
    let root = tree.root();

    let mut cost = Cost {
        decode: tree.hash_ops(),
        ..Cost::default()
    };

    if let Some(expected) = query.expected_root {
        if expected != root {
            tracing::debug!(
                root = %hex::encode(root),
                expected = %hex::encode(expected),
                "unexpected root"
            );
            return Err(VerifyError::RootMismatch);
        }
    }

    let mut values = Vec::with_capacity(query.include.len());
    for target in &query.include {
        let key_hash = target.key_hash::<H>()?;
        let located = tree.locate(&key_hash);
        cost.query += located.depth as u64 + 1;
        values.push(located.value(&key_hash)?.map(|v| v.to_vec()));
    }

    let mut absences = Vec::with_capacity(query.exclude.len());
    for target in &query.exclude {
        let key_hash = target.key_hash::<H>()?;
        let located = tree.locate(&key_hash);
        cost.query += located.depth as u64 + 1;
        absences.push(located.absence(&key_hash)?);
    }

    let before_update = tree.hash_ops();
    let mut pushed = Vec::new();
    if query.has_updates() {
        let updates = query
            .updates
            .iter()
            .map(|(target, value)| {
                let key_hash = target.key_hash::<H>()?;
                let update = match (value, target) {
                    (None, _) => Update::Delete,
                    (Some(value), Target::Key(k)) => Update::Put {
                        value: value.clone(),
                        key: Some(k.clone()),
                    },
                    (Some(value), Target::Index(_)) => Update::put(value.clone()),
                };
                Ok((key_hash, update))
            })
            .collect::<Result<Vec<_>, VerifyError>>()?;

        update::apply(&mut tree, updates)?;
        pushed = push::push(&mut tree, query.pushes.iter().cloned())?;
    }
    cost.update = tree.hash_ops() - before_update;

    let new_root = tree.root();
    tracing::debug!(
        strands = decoded.strands.len(),
        root = %hex::encode(root),
        new_root = %hex::encode(new_root),
        cost = cost.total(),
        "verified proof"
    );

    Ok(Verified {
        root,
        values,
        absences,
        new_root,
        pushed,
        cost,
    })
}
