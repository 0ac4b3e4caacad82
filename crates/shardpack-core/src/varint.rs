//! Variable-length Integer Encoding (Varint)
//!
//! Protobuf writes every length prefix and every key-table index as a base-128
//! varint:
//! - Each byte carries 7 bits of data and 1 "continuation" bit
//! - Values 0-127 take 1 byte, 128-16383 take 2 bytes, and so on
//!
//! ## Why This Matters for Shardpack
//! The packer never serializes a physical record just to learn its size. It
//! predicts the exact number of bytes each user record adds, and every length
//! and index in that prediction is a varint. [`encoded_len`] is the function the
//! prediction is built on; it must agree byte-for-byte with what prost writes.
//!
//! ## Usage
//! ```ignore
//! assert_eq!(encoded_len(0), 1);
//! assert_eq!(encoded_len(127), 1);
//! assert_eq!(encoded_len(128), 2);
//! ```

/// Number of bytes needed to write `value` as a varint.
///
/// Computed as `ceil(bit_length(value) / 7)` where `bit_length(0) = 1`, so zero
/// still takes one byte.
pub fn encoded_len(value: u64) -> usize {
    let bits = if value == 0 {
        1
    } else {
        64 - value.leading_zeros() as usize
    };
    bits.div_ceil(7)
}
