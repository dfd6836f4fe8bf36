//! Key hashes: the 256-bit paths through the trie.
//!
//! Byte-string keys are hashed with the trie's [`ValueHasher`]. In integer-array mode, keys are
//! non-negative integers mapped onto paths by [`from_integer`]. That mapping is strictly
//! increasing in lexicographic order, so the largest index in the trie always lives in the
//! rightmost leaf.

use crate::hasher::ValueHasher;
use bitvec::prelude::*;

/// The path to a key. All paths have a 256 bit fixed length.
pub type KeyHash = [u8; 32];

/// The number of bits in a [`KeyHash`], and so the maximum depth of the trie.
pub const KEY_BITS: usize = 256;

const HEADER_BITS: usize = 6;

/// Hash a byte-string key into its path.
pub fn hash_key<H: ValueHasher>(key: &[u8]) -> KeyHash {
    H::hash_value(key)
}

/// Get the bit of the path at the given depth, MSB first.
///
/// Panics if `depth >= 256`.
pub fn bit(key: &KeyHash, depth: usize) -> bool {
    key.view_bits::<Msb0>()[depth]
}

/// Get the path bits up to (not including) the given depth.
pub fn prefix(key: &KeyHash, depth: usize) -> &BitSlice<u8, Msb0> {
    &key.view_bits::<Msb0>()[..depth]
}

/// The number of leading bits two paths have in common.
pub fn shared_bits(a: &KeyHash, b: &KeyHash) -> usize {
    a.view_bits::<Msb0>()
        .iter()
        .zip(b.view_bits::<Msb0>().iter())
        .take_while(|(a, b)| a == b)
        .count()
}

/// Zero out every bit of the path at or after `depth`.
pub fn keep_prefix_bits(key: &KeyHash, depth: usize) -> KeyHash {
    let mut out = [0u8; 32];
    let depth = core::cmp::min(depth, KEY_BITS);
    out.view_bits_mut::<Msb0>()[..depth].copy_from_bitslice(&key.view_bits::<Msb0>()[..depth]);
    out
}

/// Set the bit of the path at the given depth.
pub fn set_bit(key: &mut KeyHash, depth: usize, value: bool) {
    key.view_bits_mut::<Msb0>().set(depth, value);
}

/// Set every bit of the path at or after `depth`. Together with [`keep_prefix_bits`], this gives
/// the bounds of the sub-trie at `depth` along `key`.
pub fn fill_after(key: &KeyHash, depth: usize) -> KeyHash {
    let mut out = *key;
    let depth = core::cmp::min(depth, KEY_BITS);
    out.view_bits_mut::<Msb0>()[depth..].fill(true);
    out
}

/// The integer does not fit the integer key encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerOutOfRange(pub u64);

/// The largest integer which can be mapped onto a path.
pub const MAX_INTEGER: u64 = u64::MAX - 2;

/// Map an integer onto a path.
///
/// With `bits = floor(log2(n + 2))`, the path starts with a 6-bit header holding `bits - 1`,
/// followed by `n - (2^bits - 2)` in `bits` bits. All remaining bits are zero.
pub fn from_integer(n: u64) -> Result<KeyHash, IntegerOutOfRange> {
    if n > MAX_INTEGER {
        return Err(IntegerOutOfRange(n));
    }

    let bits = (63 - (n + 2).leading_zeros()) as usize;
    let offset = (1u64 << bits) - 2;

    let mut key = [0u8; 32];
    let view = key.view_bits_mut::<Msb0>();
    view[..HEADER_BITS].store_be::<u8>((bits - 1) as u8);
    view[HEADER_BITS..HEADER_BITS + bits].store_be::<u64>(n - offset);
    Ok(key)
}

/// Recover the integer from a path produced by [`from_integer`].
///
/// Returns `None` if the path is not in the integer format.
pub fn to_integer(key: &KeyHash) -> Option<u64> {
    let view = key.view_bits::<Msb0>();
    let bits = view[..HEADER_BITS].load_be::<u8>() as usize + 1;
    if bits > 63 {
        return None;
    }

    let end = HEADER_BITS + bits;
    if view[end..].any() {
        return None;
    }

    let offset = (1u64 << bits) - 2;
    Some(view[HEADER_BITS..end].load_be::<u64>() + offset)
}
