//! Conversions between bit counts and byte counts.
//!
//! Two rounding rules coexist: whole committed bytes (`Length`, `Position`)
//! round down, while the storage reserved for a bit count rounds up so that a
//! partially filled trailing byte always has somewhere to live.

/// Size of the intermediate buffer used by bulk copies when the caller does
/// not pick one.
pub const BLOCK_COPY_SIZE: usize = 4 * 1024 * 1024;

/// Number of complete bytes covered by `bits`.
#[inline]
pub const fn bits_to_bytes(bits: u64) -> u64 {
    bits / 8
}

/// Number of bytes that must be allocated to hold `bits`.
#[inline]
pub const fn bytes_needed(bits: u64) -> u64 {
    bits.div_ceil(8)
}

/// Bits left over after the last complete byte.
#[inline]
pub const fn trailing_bits(bits: u64) -> u32 {
    (bits % 8) as u32
}

/// Mask selecting the low `count` bits of a `u64`.
#[inline]
pub(crate) const fn low_mask(count: usize) -> u64 {
    if count >= 64 {
        u64::MAX
    } else {
        (1u64 << count) - 1
    }
}
