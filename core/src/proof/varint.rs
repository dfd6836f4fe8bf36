//! Big-endian base-128 integers.
//!
//! Each byte carries 7 bits, most significant group first. All bytes but the last have the high
//! bit set. Zero is a single zero byte.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Append the encoding of `n` to `out`.
pub fn encode(mut n: u64, out: &mut Vec<u8>) {
    let mut buf = [0u8; 10];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = (n & 0x7F) as u8;
        n >>= 7;
        if n == 0 {
            break;
        }
    }

    let last = buf.len() - 1;
    for b in &mut buf[i..last] {
        *b |= 0x80;
    }
    out.extend_from_slice(&buf[i..]);
}

/// Errors from [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Truncated,
    Overflow,
}

/// Decode a varint from the front of `input`, returning it and the number of bytes consumed.
pub fn decode(input: &[u8]) -> Result<(u64, usize), Error> {
    let mut res: u64 = 0;
    for (i, byte) in input.iter().enumerate() {
        if res >> 57 != 0 {
            return Err(Error::Overflow);
        }
        res = (res << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((res, i + 1));
        }
    }
    Err(Error::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(n: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode(n, &mut out);
        out
    }

    #[test]
    fn known_encodings() {
        assert_eq!(enc(0), vec![0x00]);
        assert_eq!(enc(1), vec![0x01]);
        assert_eq!(enc(127), vec![0x7F]);
        assert_eq!(enc(128), vec![0x81, 0x00]);
        assert_eq!(enc(300), vec![0x82, 0x2C]);
        assert_eq!(enc(16384), vec![0x81, 0x80, 0x00]);
    }

    #[test]
    fn decode_reports_length() {
        assert_eq!(decode(&[0x82, 0x2C, 0xFF]), Ok((300, 2)));
        assert_eq!(decode(&enc(u64::MAX)), Ok((u64::MAX, 10)));
    }

    #[test]
    fn decode_errors() {
        assert_eq!(decode(&[]), Err(Error::Truncated));
        assert_eq!(decode(&[0x81, 0x80]), Err(Error::Truncated));
        assert_eq!(decode(&[0xFF; 11]), Err(Error::Overflow));
    }
}
