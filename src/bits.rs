//! Byte-level helpers treating a byte sequence as one big-endian binary number.

use crate::error::{Error, Result};

/// Reads bit `i`, where bit 0 is the least significant bit of the last byte.
///
/// Panics if `i` addresses a byte outside of `buf`.
#[inline]
pub fn get_bit(buf: &[u8], i: usize) -> bool {
  let byte = buf[buf.len() - i / 8 - 1];
  (byte >> (i % 8)) & 1 == 1
}

/// Writes bit `i` with the same numbering as [`get_bit`].
#[inline]
pub fn set_bit(buf: &mut [u8], i: usize, value: bool) {
  let index = buf.len() - i / 8 - 1;
  let mask = 1u8 << (i % 8);
  if value {
    buf[index] |= mask;
  } else {
    buf[index] &= !mask;
  }
}

/// Zero-extends `buf` on the left to `n` bytes.
pub fn pad_left(buf: &[u8], n: usize) -> Result<Vec<u8>> {
  if buf.len() > n {
    return Err(Error::PadOverflow { len: buf.len(), max: n });
  }
  let mut padded = vec![0u8; n - buf.len()];
  padded.extend_from_slice(buf);
  Ok(padded)
}

#[inline]
pub fn equal<A: AsRef<[u8]>, B: AsRef<[u8]>>(a: A, b: B) -> bool {
  a.as_ref() == b.as_ref()
}

/// Lowercase hex with a `0x` prefix.
pub fn to_hex<B: AsRef<[u8]>>(bytes: B) -> String {
  format!("0x{}", hex::encode(bytes))
}

/// Decodes hex with or without a `0x` prefix.
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
  let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
  hex::decode(digits).map_err(|e| Error::InvalidHex(format!("{s}: {e}")))
}
