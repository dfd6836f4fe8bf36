use arbitrary::Arbitrary;
use bitvec::{order::Msb0, view::BitView};

/// Two key hashes sharing exactly `shared` leading bits.
#[derive(Debug)]
pub struct KeyPair {
    pub shared: usize,
    pub a: [u8; 32],
    pub b: [u8; 32],
}

impl<'a> Arbitrary<'a> for KeyPair {
    fn arbitrary(input: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let shared = input.int_in_range(0..=256)?;
        let mut a = [0; 32];
        input.fill_buffer(&mut a)?;

        let mut b = a;
        if shared < 256 {
            let bits = b.view_bits_mut::<Msb0>();
            let flipped = !bits[shared];
            bits.set(shared, flipped);
            let mut tail = [0u8; 32];
            input.fill_buffer(&mut tail)?;
            bits[shared + 1..].copy_from_bitslice(&tail.view_bits::<Msb0>()[shared + 1..]);
        }

        Ok(Self { shared, a, b })
    }
}

/// A small batch of updates over a one-byte key space, so collisions and deletions are common.
#[derive(Debug, Arbitrary)]
pub struct Batch {
    pub initial: Vec<(u8, u8)>,
    pub updates: Vec<(u8, Option<u8>)>,
}
