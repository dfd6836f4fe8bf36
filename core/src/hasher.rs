//! Hashers (feature-gated) and utilities for implementing them.

use crate::trie::{BranchData, LeafData, Node};

/// A trie node hash function.
///
/// Note that it is illegal for the produced hash to equal [0; 32], as this value is reserved
/// for the empty sub-trie.
///
/// A node hasher must domain-separate leaves and branches. The [`BinaryHasher`] does this by
/// hashing preimages of different lengths: leaves commit to 65 bytes ending in a zero tag,
/// branches to 64 bytes.
pub trait NodeHasher {
    /// Hash a leaf. This should domain-separate the hash from branches.
    fn hash_leaf(data: &LeafData) -> Node;

    /// Hash a branch. This should domain-separate the hash from leaves.
    fn hash_branch(data: &BranchData) -> Node;
}

/// A hasher for arbitrary-length values. Byte-string keys are hashed with the same function.
pub trait ValueHasher {
    /// Hash an arbitrary-length value.
    fn hash_value(value: &[u8]) -> [u8; 32];
}

/// Everything the trie needs from a hash function.
pub trait TrieHasher: NodeHasher + ValueHasher {}

impl<H: NodeHasher + ValueHasher> TrieHasher for H {}

/// The trailing tag byte of every leaf preimage.
pub const LEAF_TAG: u8 = 0;

/// A simple trait for representing binary hash functions.
pub trait BinaryHash {
    /// Given a bit-string, produce a 32-byte hash.
    fn hash(input: &[u8]) -> [u8; 32];

    /// An optional specialization of `hash` where there are two 32-byte inputs, left and right.
    fn hash2_32_concat(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut buf = [0u8; 64];
        buf[0..32].copy_from_slice(left);
        buf[32..64].copy_from_slice(right);
        Self::hash(&buf)
    }

    /// An optional specialization of `hash` for the leaf preimage: two 32-byte inputs followed
    /// by a single tag byte.
    fn hash2_32_concat_tagged(left: &[u8; 32], right: &[u8; 32], tag: u8) -> [u8; 32] {
        let mut buf = [0u8; 65];
        buf[0..32].copy_from_slice(left);
        buf[32..64].copy_from_slice(right);
        buf[64] = tag;
        Self::hash(&buf)
    }
}

/// A node and value hasher constructed from a simple binary hasher.
///
/// Leaves are committed as `H(key_hash ‖ value_hash ‖ 0x00)` and branches as `H(left ‖ right)`.
///
/// The binary hash wrapped by this structure must behave approximately like a random oracle over
/// the space 2^256, i.e. all 256 bit outputs are valid and inputs are uniformly distributed.
///
/// Functions like Sha2/Blake3/Keccak all meet these criteria.
pub struct BinaryHasher<H>(core::marker::PhantomData<H>);

impl<H: BinaryHash> ValueHasher for BinaryHasher<H> {
    fn hash_value(value: &[u8]) -> [u8; 32] {
        H::hash(value)
    }
}

impl<H: BinaryHash> NodeHasher for BinaryHasher<H> {
    fn hash_leaf(data: &LeafData) -> Node {
        H::hash2_32_concat_tagged(&data.key_hash, &data.value_hash, LEAF_TAG)
    }

    fn hash_branch(data: &BranchData) -> Node {
        H::hash2_32_concat(&data.left, &data.right)
    }
}

pub use keccak::Keccak256Hasher;

/// A node and value hasher making use of keccak-256. This is the default, and the hasher of
/// EVM-side verifiers.
pub mod keccak {
    use super::{BinaryHash, BinaryHasher};
    use sha3::{Digest, Keccak256};

    /// A [`BinaryHash`] implementation for keccak-256.
    pub struct Keccak256BinaryHasher;

    /// A wrapper around keccak-256 for use in merkv.
    pub type Keccak256Hasher = BinaryHasher<Keccak256BinaryHasher>;

    impl BinaryHash for Keccak256BinaryHasher {
        fn hash(value: &[u8]) -> [u8; 32] {
            Keccak256::digest(value).into()
        }

        fn hash2_32_concat(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
            let mut hasher = Keccak256::new();
            hasher.update(left);
            hasher.update(right);
            hasher.finalize().into()
        }

        fn hash2_32_concat_tagged(left: &[u8; 32], right: &[u8; 32], tag: u8) -> [u8; 32] {
            let mut hasher = Keccak256::new();
            hasher.update(left);
            hasher.update(right);
            hasher.update([tag]);
            hasher.finalize().into()
        }
    }
}

#[cfg(any(feature = "blake3-hasher", test))]
pub use blake3::Blake3Hasher;

/// A node hasher making use of blake3.
#[cfg(any(feature = "blake3-hasher", test))]
pub mod blake3 {
    use super::{BinaryHash, BinaryHasher};

    /// A [`BinaryHash`] implementation for Blake3.
    pub struct Blake3BinaryHasher;

    /// A wrapper around Blake3 for use in merkv.
    pub type Blake3Hasher = BinaryHasher<Blake3BinaryHasher>;

    impl BinaryHash for Blake3BinaryHasher {
        fn hash(value: &[u8]) -> [u8; 32] {
            blake3::hash(value).into()
        }

        fn hash2_32_concat(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
            let mut hasher = blake3::Hasher::new();
            hasher.update(left);
            hasher.update(right);
            hasher.finalize().into()
        }
    }
}

#[cfg(feature = "sha2-hasher")]
pub use sha2::Sha2Hasher;

/// A node and value hasher making use of sha2-256.
#[cfg(feature = "sha2-hasher")]
pub mod sha2 {
    use super::{BinaryHash, BinaryHasher};
    use sha2::{Digest, Sha256};

    /// A [`BinaryHash`] implementation for Sha2.
    pub struct Sha2BinaryHasher;

    /// A wrapper around sha2-256 for use in merkv.
    pub type Sha2Hasher = BinaryHasher<Sha2BinaryHasher>;

    impl BinaryHash for Sha2BinaryHasher {
        fn hash(value: &[u8]) -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(value);
            hasher.finalize().into()
        }

        fn hash2_32_concat(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(left);
            hasher.update(right);
            hasher.finalize().into()
        }
    }
}

#[cfg(feature = "blake2-hasher")]
pub use self::blake2::Blake2sHasher;

/// A node and value hasher making use of BLAKE2s-256. Tries committed by the native `quadb`
/// tooling use this hash, so their roots and proofs verify with [`Blake2sHasher`].
#[cfg(feature = "blake2-hasher")]
pub mod blake2 {
    use super::{BinaryHash, BinaryHasher};
    use blake2::{Blake2s256, Digest};

    /// A [`BinaryHash`] implementation for BLAKE2s-256.
    pub struct Blake2sBinaryHasher;

    /// A wrapper around BLAKE2s-256 for use in merkv.
    pub type Blake2sHasher = BinaryHasher<Blake2sBinaryHasher>;

    impl BinaryHash for Blake2sBinaryHasher {
        fn hash(value: &[u8]) -> [u8; 32] {
            Blake2s256::digest(value).into()
        }

        fn hash2_32_concat(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
            let mut hasher = Blake2s256::new();
            hasher.update(left);
            hasher.update(right);
            hasher.finalize().into()
        }

        fn hash2_32_concat_tagged(left: &[u8; 32], right: &[u8; 32], tag: u8) -> [u8; 32] {
            let mut hasher = Blake2s256::new();
            hasher.update(left);
            hasher.update(right);
            hasher.update([tag]);
            hasher.finalize().into()
        }
    }
}
