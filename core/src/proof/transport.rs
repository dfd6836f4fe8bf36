//! The compact binary encoding of proofs.
//!
//! ```text
//! proof   := encoding strand* 0x01 cmd*
//! strand  := tag depth body
//! keyhash := trailing_zero_count bytes[32 - trailing_zero_count]
//! ```
//!
//! Commands are addressed by a cursor which starts at the last strand. A zero byte merges the
//! strand under the cursor. A byte with the high bit clear is a group of up to 6 hashing
//! commands. Any other byte moves the cursor.

use super::{tag, varint, Cmd, Encoding, Malformed, Proof, ProofCmd, Strand, Terminal};
use crate::{hasher::ValueHasher, key::KeyHash, verifier::VerifyError};

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

const MAX_GROUP: usize = 6;

const JUMP_FWD: u8 = 0b100;
const JUMP_REV: u8 = 0b101;
const JUMP_LONG_FWD: u8 = 0b110;
const JUMP_LONG_REV: u8 = 0b111;

/// Serialize a proof.
///
/// Fails only if `FullKeys` is requested and a leaf strand does not know its key.
pub fn encode(proof: &Proof, encoding: Encoding) -> Result<Vec<u8>, Malformed> {
    let mut out = Vec::new();
    out.push(encoding as u8);

    for (i, strand) in proof.strands.iter().enumerate() {
        out.push(strand.terminal.tag());
        out.push(strand.depth);

        match &strand.terminal {
            Terminal::Leaf { value, key } => {
                match encoding {
                    Encoding::HashedKeys => push_key_hash(&strand.key_hash, &mut out),
                    Encoding::FullKeys => {
                        let key = key.as_ref().ok_or(Malformed::MissingKey(i))?;
                        varint::encode(key.len() as u64, &mut out);
                        out.extend_from_slice(key);
                    }
                }
                varint::encode(value.len() as u64, &mut out);
                out.extend_from_slice(value);
            }
            Terminal::WitnessLeaf { value_hash } => {
                push_key_hash(&strand.key_hash, &mut out);
                out.extend_from_slice(value_hash);
            }
            Terminal::WitnessEmpty => push_key_hash(&strand.key_hash, &mut out),
            Terminal::Witness { node } => {
                push_key_hash(&strand.key_hash, &mut out);
                out.extend_from_slice(node);
            }
        }
    }

    out.push(tag::END);

    if proof.strands.is_empty() {
        return Ok(out);
    }

    let mut cursor = proof.strands.len() - 1;
    let mut group = HashGroup::default();

    for cmd in &proof.cmds {
        while cmd.strand != cursor {
            group.flush(&mut out);
            cursor = jump(cursor, cmd.strand, &mut out);
        }

        match cmd.op {
            Cmd::Merge => {
                group.flush(&mut out);
                out.push(0);
            }
            op => {
                group.push(op);
                if group.len == MAX_GROUP {
                    group.flush(&mut out);
                }
            }
        }
    }
    group.flush(&mut out);

    Ok(out)
}

fn push_key_hash(key_hash: &KeyHash, out: &mut Vec<u8>) {
    let trailing = key_hash.iter().rev().take_while(|b| **b == 0).count();
    out.push(trailing as u8);
    out.extend_from_slice(&key_hash[..32 - trailing]);
}

// Emit a single jump from `from` towards `to`, returning the new cursor.
fn jump(from: usize, to: usize, out: &mut Vec<u8>) -> usize {
    let forward = to > from;
    let delta = if forward { to - from } else { from - to };

    if delta < 64 {
        let distance = core::cmp::min(delta, 32);
        let action = if forward { JUMP_FWD } else { JUMP_REV };
        out.push(action << 5 | (distance - 1) as u8);
        if forward {
            from + distance
        } else {
            from - distance
        }
    } else {
        let log_distance = usize::BITS - delta.leading_zeros();
        debug_assert!(log_distance - 7 < 32);
        let action = if forward { JUMP_LONG_FWD } else { JUMP_LONG_REV };
        out.push(action << 5 | (log_distance - 7) as u8);
        let distance = 1usize << (log_distance - 1);
        if forward {
            from + distance
        } else {
            from - distance
        }
    }
}

#[derive(Default)]
struct HashGroup {
    len: usize,
    bits: u8,
    hashes: [[u8; 32]; MAX_GROUP],
}

impl HashGroup {
    fn push(&mut self, op: Cmd) {
        if let Cmd::HashProvided(node) = op {
            self.bits |= 1 << self.len;
            self.hashes[self.len] = node;
        }
        self.len += 1;
    }

    fn flush(&mut self, out: &mut Vec<u8>) {
        if self.len == 0 {
            return;
        }

        // the lowest set bit marks the start, the commands follow in order.
        let byte = ((self.bits << 1) | 1) << (MAX_GROUP - self.len);
        out.push(byte);
        for i in 0..self.len {
            if self.bits & (1 << i) != 0 {
                out.extend_from_slice(&self.hashes[i]);
            }
        }

        *self = HashGroup::default();
    }
}

struct Reader<'a> {
    input: &'a [u8],
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, Malformed> {
        let (first, rest) = self.input.split_first().ok_or(Malformed::Truncated)?;
        self.input = rest;
        Ok(*first)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], Malformed> {
        if self.input.len() < n {
            return Err(Malformed::Truncated);
        }
        let (head, rest) = self.input.split_at(n);
        self.input = rest;
        Ok(head)
    }

    fn array(&mut self) -> Result<[u8; 32], Malformed> {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.bytes(32)?);
        Ok(out)
    }

    fn key_hash(&mut self) -> Result<KeyHash, Malformed> {
        let trailing = self.byte()?;
        if trailing > 32 {
            return Err(Malformed::BadKeyHash(trailing));
        }
        let mut key_hash = [0u8; 32];
        let len = 32 - trailing as usize;
        key_hash[..len].copy_from_slice(self.bytes(len)?);
        Ok(key_hash)
    }

    fn varint(&mut self) -> Result<usize, Malformed> {
        let (n, consumed) = varint::decode(self.input).map_err(|e| match e {
            varint::Error::Truncated => Malformed::Truncated,
            varint::Error::Overflow => Malformed::VarIntOverflow,
        })?;
        self.input = &self.input[consumed..];
        // a length beyond the address space can't be satisfied by the remaining input anyway.
        usize::try_from(n).map_err(|_| Malformed::Truncated)
    }

    fn is_empty(&self) -> bool {
        self.input.is_empty()
    }
}

/// Parse a proof. In the `FullKeys` encoding, leaf keys are hashed with `H`.
pub fn decode<H: ValueHasher>(input: &[u8]) -> Result<Proof, VerifyError> {
    let mut reader = Reader { input };

    let encoding = match reader.byte()? {
        0 => Encoding::HashedKeys,
        1 => Encoding::FullKeys,
        other => return Err(Malformed::UnknownEncoding(other).into()),
    };

    let mut proof = Proof::default();

    loop {
        let strand_tag = reader.byte()?;
        if strand_tag == tag::END {
            break;
        }

        let depth = reader.byte()?;
        let strand = match strand_tag {
            tag::LEAF => {
                let (key_hash, key) = match encoding {
                    Encoding::HashedKeys => (reader.key_hash()?, None),
                    Encoding::FullKeys => {
                        let len = reader.varint()?;
                        let key = reader.bytes(len)?.to_vec();
                        (H::hash_value(&key), Some(key))
                    }
                };
                let len = reader.varint()?;
                let value = reader.bytes(len)?.to_vec();
                Strand {
                    depth,
                    key_hash,
                    terminal: Terminal::Leaf { value, key },
                }
            }
            tag::WITNESS_LEAF => Strand {
                depth,
                key_hash: reader.key_hash()?,
                terminal: Terminal::WitnessLeaf {
                    value_hash: reader.array()?,
                },
            },
            tag::WITNESS_EMPTY => Strand {
                depth,
                key_hash: reader.key_hash()?,
                terminal: Terminal::WitnessEmpty,
            },
            tag::WITNESS => Strand {
                depth,
                key_hash: reader.key_hash()?,
                terminal: Terminal::Witness {
                    node: reader.array()?,
                },
            },
            other => return Err(VerifyError::UnknownWitnessKind(other)),
        };

        proof.strands.push(strand);
    }

    if proof.strands.is_empty() {
        return Ok(proof);
    }

    let num_strands = proof.strands.len();
    let mut cursor = num_strands - 1;

    while !reader.is_empty() {
        let byte = reader.byte()?;

        if byte == 0 {
            proof.cmds.push(ProofCmd {
                op: Cmd::Merge,
                strand: cursor,
            });
        } else if byte & 0x80 == 0 {
            let mut bits = byte;
            let mut started = false;
            for _ in 0..7 {
                if started {
                    let op = if bits & 1 == 1 {
                        Cmd::HashProvided(reader.array()?)
                    } else {
                        Cmd::HashEmpty
                    };
                    proof.cmds.push(ProofCmd { op, strand: cursor });
                } else if bits & 1 == 1 {
                    started = true;
                }
                bits >>= 1;
            }
        } else {
            let distance = (byte & 0b1_1111) as usize;
            let next = match byte >> 5 {
                JUMP_FWD => cursor.checked_add(distance + 1),
                JUMP_REV => cursor.checked_sub(distance + 1),
                JUMP_LONG_FWD => 1usize
                    .checked_shl((distance + 6) as u32)
                    .and_then(|d| cursor.checked_add(d)),
                _ => 1usize
                    .checked_shl((distance + 6) as u32)
                    .and_then(|d| cursor.checked_sub(d)),
            };
            cursor = match next {
                Some(c) if c < num_strands => c,
                _ => return Err(Malformed::JumpOutOfRange.into()),
            };
        }
    }

    tracing::trace!(
        strands = proof.strands.len(),
        cmds = proof.cmds.len(),
        "decoded proof"
    );

    Ok(proof)
}

/// Render bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parse hex, accepting an optional `0x` prefix.
pub fn from_hex(input: &str) -> Result<Vec<u8>, Malformed> {
    let input = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(input).map_err(|_| Malformed::BadHex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Keccak256Hasher;

    fn leaf(depth: u8, first: u8, value: &[u8]) -> Strand {
        let mut key_hash = [0u8; 32];
        key_hash[0] = first;
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

    #[test]
    fn two_leaf_proof_bytes() {
        let proof = Proof {
            strands: vec![leaf(1, 0x00, b"x"), leaf(1, 0x80, b"y")],
            cmds: vec![cmd(Cmd::Merge, 0)],
        };

        let bytes = encode(&proof, Encoding::HashedKeys).unwrap();
        assert_eq!(
            bytes,
            vec![
                0, // encoding
                0, 1, 32, 1, b'x', // leaf, depth 1, all-zero key hash, value
                0, 1, 31, 0x80, 1, b'y', // leaf, depth 1, one key byte, value
                1,    // end of strands
                0xA0, // jump back by 1
                0,    // merge
            ]
        );

        assert_eq!(decode::<Keccak256Hasher>(&bytes).unwrap(), proof);
    }

    #[test]
    fn hash_groups_split_at_six() {
        let sibling = [7u8; 32];
        let mut cmds = Vec::new();
        for i in 0..8 {
            let op = if i % 2 == 0 {
                Cmd::HashProvided(sibling)
            } else {
                Cmd::HashEmpty
            };
            cmds.push(cmd(op, 0));
        }

        let proof = Proof {
            strands: vec![leaf(8, 0x55, b"v")],
            cmds,
        };
        let bytes = encode(&proof, Encoding::HashedKeys).unwrap();

        // six commands: provided, empty, provided, empty, provided, empty.
        let first_group = 8;
        assert_eq!(bytes[first_group], 0b0010_1011);
        // two commands: provided, empty.
        assert_eq!(bytes[first_group + 1 + 3 * 32], 0b0011_0000);
        assert_eq!(decode::<Keccak256Hasher>(&bytes).unwrap(), proof);
    }

    #[test]
    fn long_jumps() {
        let strands: Vec<Strand> = (0..200u8)
            .map(|i| Strand {
                depth: 8,
                key_hash: {
                    let mut k = [0u8; 32];
                    k[0] = i;
                    k
                },
                terminal: Terminal::WitnessEmpty,
            })
            .collect();

        let proof = Proof {
            strands,
            cmds: vec![
                cmd(Cmd::HashEmpty, 0),
                cmd(Cmd::HashEmpty, 150),
                cmd(Cmd::HashEmpty, 199),
            ],
        };

        let bytes = encode(&proof, Encoding::HashedKeys).unwrap();
        assert_eq!(decode::<Keccak256Hasher>(&bytes).unwrap(), proof);
    }

    #[test]
    fn full_keys_are_hashed() {
        let key = b"hello".to_vec();
        let key_hash = Keccak256Hasher::hash_value(&key);
        let proof = Proof {
            strands: vec![Strand {
                depth: 0,
                key_hash,
                terminal: Terminal::Leaf {
                    value: b"world".to_vec(),
                    key: Some(key),
                },
            }],
            cmds: vec![],
        };

        let bytes = encode(&proof, Encoding::FullKeys).unwrap();
        assert_eq!(decode::<Keccak256Hasher>(&bytes).unwrap(), proof);

        let mut no_key = proof.clone();
        no_key.strands[0].terminal = Terminal::Leaf {
            value: b"world".to_vec(),
            key: None,
        };
        assert_eq!(
            encode(&no_key, Encoding::FullKeys),
            Err(Malformed::MissingKey(0))
        );
    }

    #[test]
    fn rejects_garbage() {
        let malformed = |bytes: &[u8]| decode::<Keccak256Hasher>(bytes).unwrap_err();
        let m = VerifyError::MalformedProof;

        assert_eq!(malformed(&[]), m(Malformed::Truncated));
        assert_eq!(malformed(&[2]), m(Malformed::UnknownEncoding(2)));
        assert_eq!(malformed(&[0, 3, 0, 33]), m(Malformed::BadKeyHash(33)));
        assert_eq!(malformed(&[0, 0, 0, 32]), m(Malformed::Truncated));
        assert_eq!(malformed(&[0, 9, 0]), VerifyError::UnknownWitnessKind(9));
        // one strand, then a jump forward past it.
        assert_eq!(
            malformed(&[0, 3, 0, 32, 1, 0x80]),
            m(Malformed::JumpOutOfRange)
        );
        assert_eq!(
            malformed(&[0, 3, 0, 32, 1, 0xE0]),
            m(Malformed::JumpOutOfRange)
        );
        // a provided hash cut short.
        assert_eq!(
            malformed(&[0, 3, 0, 32, 1, 0b0110_0000, 1, 2]),
            m(Malformed::Truncated)
        );
    }

    #[test]
    fn hex_prefix_is_optional() {
        assert_eq!(from_hex("0x00ff").unwrap(), vec![0, 255]);
        assert_eq!(from_hex("00FF").unwrap(), vec![0, 255]);
        assert_eq!(from_hex("0x0"), Err(Malformed::BadHex));
        assert_eq!(to_hex(&[0xab, 0x01]), "ab01");
    }
}
