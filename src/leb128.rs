//! ULEB128 decoding for class-data and string-data headers.
//!
//! The teacher crate's equivalent helper panics on malformed input; callers
//! here only ever see bytes from a caller-supplied image, so decode errors
//! are recoverable `DexError`s instead.

use varint_simd::VarIntTarget;

use crate::error::DexError;
use crate::Result;

#[inline]
pub fn decode_leb128<T: VarIntTarget>(data: &[u8], offset: usize) -> Result<(T, usize)> {
    match varint_simd::decode::<T>(&data[offset..]) {
        Ok((value, size)) => Ok((value, size as usize)),
        Err(_) => Err(DexError::VarIntError { offset }),
    }
}

/// Decodes at `*pos`, advancing `*pos` past the consumed bytes.
#[inline]
pub fn decode_leb128_off<T: VarIntTarget>(data: &[u8], pos: &mut usize) -> Result<T> {
    let (value, size) = decode_leb128(data, *pos)?;
    *pos += size;
    Ok(value)
}

/// `uleb128p1`: stored as `value + 1`, used for fields that may be absent (`-1`).
#[inline]
pub fn decode_leb128p1_off(data: &[u8], pos: &mut usize) -> Result<i32> {
    let value: u32 = decode_leb128_off(data, pos)?;
    Ok(value as i32 - 1)
}
