#![warn(missing_docs)]

//! merkv: an authenticated key/value dictionary.
//!
//! The dictionary is committed to by the root of a sparse binary merkle trie. A [`Dictionary`]
//! holds the trie in memory and produces compact multiproofs for sets of keys. A [`Verifier`]
//! holds nothing but its [`Options`]: given a proof it confirms values and absences and computes
//! the root that results from a batch of updates.
//!
//! A dictionary can also be opened from a proof, in which case only the parts of the trie the
//! proof reveals are available. Reads and updates elsewhere fail.

use std::marker::PhantomData;

use anyhow::{bail, Context as _};
use merkv_core::{
    key,
    proof::{self, Malformed},
    push,
    update::{self, Update},
};

pub use merkv_core::{
    hasher::{Keccak256Hasher, NodeHasher, TrieHasher, ValueHasher},
    key::KeyHash,
    proof::{Encoding, WitnessKind},
    trie::{Node, EMPTY},
    verifier::{Cost, Query, Target, Verified, VerifyError},
    Tree,
};
#[cfg(feature = "blake3-hasher")]
pub use merkv_core::hasher::Blake3Hasher;
#[cfg(feature = "sha2-hasher")]
pub use merkv_core::hasher::Sha2Hasher;
#[cfg(feature = "blake2-hasher")]
pub use merkv_core::hasher::Blake2sHasher;
pub use options::{Options, Transport};

mod options;

/// An in-memory dictionary, full or partial.
pub struct Dictionary<H = Keccak256Hasher> {
    tree: Tree<H>,
    options: Options,
}

impl<H> Clone for Dictionary<H> {
    fn clone(&self) -> Self {
        Dictionary {
            tree: self.tree.clone(),
            options: self.options.clone(),
        }
    }
}

impl<H> std::fmt::Debug for Dictionary<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary").field("tree", &self.tree).finish()
    }
}

impl<H: TrieHasher> Dictionary<H> {
    /// Create an empty dictionary.
    pub fn new(options: Options) -> Self {
        Dictionary {
            tree: Tree::new(),
            options,
        }
    }

    /// Open a partial dictionary from a proof, transported as set in `options`.
    pub fn from_proof(proof: &[u8], options: Options) -> anyhow::Result<Self> {
        let bytes = untransport(&options, proof)?;
        let decoded = proof::decode::<H>(&bytes).context("failed to decode proof")?;
        let tree = proof::import::<H>(&decoded).context("failed to import proof")?;
        tracing::debug!(
            strands = decoded.strands.len(),
            root = %hex::encode(tree.root()),
            "opened dictionary from proof"
        );
        Ok(Dictionary { tree, options })
    }

    /// Fold a second proof of the same root into this dictionary, revealing whatever it adds.
    pub fn merge_proof(&mut self, proof: &[u8]) -> anyhow::Result<()> {
        let bytes = untransport(&self.options, proof)?;
        let decoded = proof::decode::<H>(&bytes).context("failed to decode proof")?;
        let other = proof::import::<H>(&decoded).context("failed to import proof")?;
        self.tree
            .merge(&other)
            .context("unable to merge proofs with different roots")?;
        tracing::debug!(
            strands = decoded.strands.len(),
            nodes = self.tree.len(),
            "merged proof"
        );
        Ok(())
    }

    /// The current root.
    pub fn root(&self) -> Node {
        self.tree.root()
    }

    /// The underlying trie.
    pub fn tree(&self) -> &Tree<H> {
        &self.tree
    }

    /// Read the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        self.read(Target::Key(key.to_vec()))
    }

    /// Read the value stored under an array index.
    pub fn get_index(&self, index: u64) -> anyhow::Result<Option<Vec<u8>>> {
        self.read(Target::Index(index))
    }

    fn read(&self, target: Target) -> anyhow::Result<Option<Vec<u8>>> {
        let key_hash = target.key_hash::<H>()?;
        let value = self
            .tree
            .get(&key_hash)
            .with_context(|| format!("failed to read {}", describe(&target)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    /// Insert or overwrite a value.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> anyhow::Result<()> {
        self.apply([(Target::Key(key.to_vec()), Some(value.to_vec()))])
    }

    /// Insert or overwrite the value at an array index.
    pub fn put_index(&mut self, index: u64, value: &[u8]) -> anyhow::Result<()> {
        self.apply([(Target::Index(index), Some(value.to_vec()))])
    }

    /// Remove a key. Removing an absent key is not an error.
    pub fn delete(&mut self, key: &[u8]) -> anyhow::Result<()> {
        self.apply([(Target::Key(key.to_vec()), None)])
    }

    /// Apply a batch of puts (`Some`) and deletes (`None`) atomically.
    ///
    /// Order within the batch does not matter, except that the last update to a key wins.
    pub fn apply(
        &mut self,
        updates: impl IntoIterator<Item = (Target, Option<Vec<u8>>)>,
    ) -> anyhow::Result<()> {
        let updates = updates
            .into_iter()
            .map(|(target, value)| {
                let key_hash = target.key_hash::<H>()?;
                let update = match (value, target) {
                    (None, _) => Update::Delete,
                    (Some(value), Target::Key(key)) if self.options.track_keys => Update::Put {
                        value,
                        key: Some(key),
                    },
                    (Some(value), _) => Update::put(value),
                };
                Ok((key_hash, update))
            })
            .collect::<Result<Vec<(KeyHash, Update)>, VerifyError>>()?;

        let count = updates.len();
        update::apply(&mut self.tree, updates).context("failed to apply updates")?;

        tracing::debug!(count, root = %hex::encode(self.tree.root()), "applied updates");
        Ok(())
    }

    /// The index the next pushed value would get.
    pub fn next_index(&self) -> anyhow::Result<u64> {
        Ok(push::next_index(&self.tree)?)
    }

    /// Append a value after the highest array index, returning its index.
    pub fn push(&mut self, value: &[u8]) -> anyhow::Result<u64> {
        let pushed = push::push(&mut self.tree, [value.to_vec()])
            .context("failed to push onto the array")?;
        match pushed.as_slice() {
            [index] => Ok(*index),
            _ => bail!("push stored {} values instead of one", pushed.len()),
        }
    }

    /// Produce a transported proof covering the given keys and indices.
    pub fn prove(&self, targets: &[Target]) -> anyhow::Result<Vec<u8>> {
        let key_hashes = targets
            .iter()
            .map(|t| t.key_hash::<H>())
            .collect::<Result<Vec<_>, _>>()?;
        let proof = proof::export(&self.tree, &key_hashes).context("failed to export proof")?;
        let bytes = proof::encode(&proof, self.options.encoding)
            .map_err(VerifyError::from)
            .context("failed to encode proof")?;
        tracing::debug!(
            targets = targets.len(),
            strands = proof.strands.len(),
            len = bytes.len(),
            "produced proof"
        );
        Ok(transport(&self.options, bytes))
    }

    /// Produce a transported proof covering `keys`.
    pub fn prove_keys<K: AsRef<[u8]>>(&self, keys: &[K]) -> anyhow::Result<Vec<u8>> {
        let targets: Vec<Target> = keys
            .iter()
            .map(|k| Target::Key(k.as_ref().to_vec()))
            .collect();
        self.prove(&targets)
    }

    /// Produce a transported proof revealing every leaf with a key hash in `begin..=end`.
    ///
    /// With a `depth_limit`, sub-tries below that many two-sided branches are left opaque.
    pub fn prove_range(
        &self,
        begin: &KeyHash,
        end: &KeyHash,
        depth_limit: Option<usize>,
    ) -> anyhow::Result<Vec<u8>> {
        let proof = proof::export_range(&self.tree, begin, end, depth_limit)
            .context("failed to export range proof")?;
        let bytes = proof::encode(&proof, self.options.encoding)
            .map_err(VerifyError::from)
            .context("failed to encode proof")?;
        tracing::debug!(
            strands = proof.strands.len(),
            len = bytes.len(),
            "produced range proof"
        );
        Ok(transport(&self.options, bytes))
    }

    /// Produce a transported proof revealing the array elements `first..=last`.
    pub fn prove_index_range(&self, first: u64, last: u64) -> anyhow::Result<Vec<u8>> {
        let begin = Target::Index(first).key_hash::<H>()?;
        let end = Target::Index(last).key_hash::<H>()?;
        self.prove_range(&begin, &end, None)
    }

    /// The array elements with indices in `first..=last`, in order.
    ///
    /// Only that range has to be known, as after importing a proof from
    /// [`Dictionary::prove_index_range`]. Leaves which aren't array elements are skipped.
    pub fn entries(&self, first: u64, last: u64) -> anyhow::Result<Vec<(u64, Vec<u8>)>> {
        let begin = Target::Index(first).key_hash::<H>()?;
        let end = Target::Index(last).key_hash::<H>()?;

        let mut entries = Vec::new();
        for entry in self.tree.iter_range(&begin, &end) {
            let entry =
                entry.with_context(|| format!("failed to read indices {}..={}", first, last))?;
            if let Some(index) = key::to_integer(entry.key_hash) {
                entries.push((index, entry.value.to_vec()));
            }
        }
        Ok(entries)
    }

    /// Produce a transported proof covering array `indices`.
    pub fn prove_indices(&self, indices: &[u64]) -> anyhow::Result<Vec<u8>> {
        let targets: Vec<Target> = indices.iter().copied().map(Target::Index).collect();
        self.prove(&targets)
    }
}

impl<H: TrieHasher> Default for Dictionary<H> {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

/// Checks proofs within configured limits.
pub struct Verifier<H = Keccak256Hasher> {
    options: Options,
    _marker: PhantomData<H>,
}

impl<H: TrieHasher> Verifier<H> {
    /// Create a verifier.
    pub fn new(options: Options) -> Self {
        Verifier {
            options,
            _marker: PhantomData,
        }
    }

    /// Verify a transported proof and answer `query` against it.
    ///
    /// Limits are checked before any hashing happens.
    pub fn verify(&self, proof: &[u8], query: &Query) -> anyhow::Result<Verified> {
        if proof.len() > self.options.max_proof_len {
            bail!(
                "proof of {} bytes exceeds the limit of {}",
                proof.len(),
                self.options.max_proof_len
            );
        }

        let bytes = untransport(&self.options, proof)?;
        let decoded = proof::decode::<H>(&bytes).context("failed to decode proof")?;
        if decoded.strands.len() > self.options.max_strands {
            bail!(
                "proof of {} strands exceeds the limit of {}",
                decoded.strands.len(),
                self.options.max_strands
            );
        }

        merkv_core::verify_decoded::<H>(&decoded, query).context("failed to verify proof")
    }
}

fn transport(options: &Options, bytes: Vec<u8>) -> Vec<u8> {
    match options.transport {
        Transport::Compact => bytes,
        Transport::Hex => proof::to_hex(&bytes).into_bytes(),
    }
}

fn untransport(options: &Options, proof: &[u8]) -> anyhow::Result<Vec<u8>> {
    match options.transport {
        Transport::Compact => Ok(proof.to_vec()),
        Transport::Hex => {
            let text = std::str::from_utf8(proof)
                .map_err(|_| VerifyError::from(Malformed::BadHex))
                .context("hex proof is not text")?;
            Ok(proof::from_hex(text.trim()).map_err(VerifyError::from)?)
        }
    }
}

fn describe(target: &Target) -> String {
    match target {
        Target::Key(k) => format!("key 0x{}", hex::encode(k)),
        Target::Index(n) => format!("index {}", n),
    }
}

