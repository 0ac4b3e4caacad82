//! Partition Key and Hash Key Handling
//!
//! Streams route records by a 128-bit unsigned hash. A record either carries an
//! explicit hash key (a decimal string) or is routed by the MD5 digest of its
//! partition key, read as a big-endian 128-bit integer.
//!
//! Hash keys are compared as numbers (`u128`), never as strings: `"9"` sorts
//! after `"10"` as text but is smaller as a hash.

use md5::{Digest, Md5};

use crate::{Error, Result, DIGEST_LEN, PARTITION_KEY_MAX_LENGTH, PARTITION_KEY_MIN_LENGTH};

/// Check that a partition key has between 1 and 256 characters.
pub fn validate_partition_key(partition_key: &str) -> Result<()> {
    let len = partition_key.chars().count();
    if !(PARTITION_KEY_MIN_LENGTH..=PARTITION_KEY_MAX_LENGTH).contains(&len) {
        return Err(Error::InvalidPartitionKey(format!(
            "length must be at least {} and at most {}, got {}",
            PARTITION_KEY_MIN_LENGTH, PARTITION_KEY_MAX_LENGTH, len
        )));
    }
    Ok(())
}

/// Parse an explicit hash key into its numeric value.
///
/// Accepts only plain decimal digits in `0..=2^128-1`.
pub fn parse_explicit_hash_key(explicit_hash_key: &str) -> Result<u128> {
    if explicit_hash_key.is_empty() || !explicit_hash_key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidExplicitHashKey(format!(
            "must be a non-negative integer, got {:?}",
            explicit_hash_key
        )));
    }

    explicit_hash_key.parse::<u128>().map_err(|_| {
        Error::InvalidExplicitHashKey(format!(
            "must be less than or equal to 2^128 - 1, got {}",
            explicit_hash_key
        ))
    })
}

/// Hash a partition key onto the 128-bit key space.
pub fn partition_key_hash(partition_key: &str) -> u128 {
    let digest = Md5::digest(partition_key.as_bytes());
    let mut bytes = [0u8; DIGEST_LEN];
    bytes.copy_from_slice(&digest);
    u128::from_be_bytes(bytes)
}

/// Explicit hash key a KPL producer would derive for `partition_key`.
///
/// The encoder never fills this in on its own; records added without an
/// explicit hash key stay without one.
pub fn explicit_hash_key_for(partition_key: &str) -> String {
    partition_key_hash(partition_key).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_length_limits() {
        assert!(validate_partition_key("a").is_ok());
        assert!(validate_partition_key(&"k".repeat(256)).is_ok());
        assert!(matches!(
            validate_partition_key(""),
            Err(Error::InvalidPartitionKey(_))
        ));
        assert!(matches!(
            validate_partition_key(&"k".repeat(257)),
            Err(Error::InvalidPartitionKey(_))
        ));
    }

    #[test]
    fn test_parse_explicit_hash_key_bounds() {
        assert_eq!(parse_explicit_hash_key("0").unwrap(), 0);
        assert_eq!(
            parse_explicit_hash_key("340282366920938463463374607431768211455").unwrap(),
            u128::MAX
        );
        // 2^128
        assert!(parse_explicit_hash_key("340282366920938463463374607431768211456").is_err());
    }

    #[test]
    fn test_parse_explicit_hash_key_rejects_non_digits() {
        for bad in ["", "-1", "+1", "12a", " 1", "1.0"] {
            assert!(
                matches!(parse_explicit_hash_key(bad), Err(Error::InvalidExplicitHashKey(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_partition_key_hash_is_md5_big_endian() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(
            partition_key_hash(""),
            0xd41d8cd98f00b204e9800998ecf8427e_u128
        );
        assert_eq!(
            explicit_hash_key_for(""),
            0xd41d8cd98f00b204e9800998ecf8427e_u128.to_string()
        );
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let nine = parse_explicit_hash_key("9").unwrap();
        let ten = parse_explicit_hash_key("10").unwrap();
        assert!(nine < ten);
        assert!("9" > "10");
    }
}
