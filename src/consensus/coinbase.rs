//! Merge-mining commitment inside a parent chain coinbase
//!
//! The commitment is `[FA BE 6D 6D]? <root: 32 bytes, big-endian> <tree size: u32 LE> <nonce: u32 LE>`.
//! Older miners omit the prefix, in which case the root must sit near the
//! start of the script so that only one commitment can be recognised.

use thiserror::Error;
use crate::constants::{MAX_COINBASE_ROOT_OFFSET, MERGE_MINE_PREFIX};
use crate::crypto::Hash;

/// Reasons a coinbase script does not carry a usable commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("AuxPow missing chain merkle root in parent coinbase")]
    MissingRoot,
    #[error("Multiple merged mining prefixes in coinbase")]
    MultiplePrefixes,
    #[error("Merged mining prefix is not just before chain merkle root")]
    PrefixNotAdjacent,
    #[error("AuxPow chain merkle root can have at most 20 preceding bytes of the parent coinbase")]
    RootTooDeep,
    #[error("AuxPow missing chain merkle tree size and nonce in parent coinbase")]
    TruncatedCommitment,
}

/// Data following the chain merkle root in the coinbase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAuxPowCoinbase {
    /// Number of leaves of the chain merkle tree
    pub tree_size: u32,
    /// Nonce mixed into the expected slot of our chain
    pub merge_mine_nonce: u32,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

impl ParsedAuxPowCoinbase {
    /// Locate the commitment to `root_hash` in `script` and read the tree size and nonce after it.
    ///
    /// `root_hash` is given in internal byte order; the script stores it reversed.
    pub fn parse(script: &[u8], root_hash: &Hash) -> Result<Self, ParseError> {
        let root_be = root_hash.reversed();
        let root_pos = find(script, root_be.as_bytes()).ok_or(ParseError::MissingRoot)?;

        match find(script, &MERGE_MINE_PREFIX) {
            Some(prefix_pos) => {
                if find(&script[prefix_pos + 1..], &MERGE_MINE_PREFIX).is_some() {
                    return Err(ParseError::MultiplePrefixes);
                }
                if prefix_pos + MERGE_MINE_PREFIX.len() != root_pos {
                    return Err(ParseError::PrefixNotAdjacent);
                }
            }
            None => {
                if root_pos > MAX_COINBASE_ROOT_OFFSET {
                    return Err(ParseError::RootTooDeep);
                }
            }
        }

        let data = &script[root_pos + root_be.as_bytes().len()..];
        if data.len() < 8 {
            return Err(ParseError::TruncatedCommitment);
        }

        Ok(Self {
            tree_size: read_u32_le(&data[0..4]),
            merge_mine_nonce: read_u32_le(&data[4..8]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

    fn test_hash() -> Hash {
        Hash::from_hex("cdab907856341290785634129078563412907856341290785634129078563412").unwrap()
    }

    /// `test_hash` as it appears inside a coinbase script
    fn test_hash_be() -> Vec<u8> {
        Hash::from_hex("123456789012345678901234567890123456789012345678901234567890abcd")
            .unwrap()
            .0
            .to_vec()
    }

    /// Script push of `data` (length byte then payload)
    fn push(script: &mut Vec<u8>, data: &[u8]) {
        script.push(data.len() as u8);
        script.extend_from_slice(data);
    }

    fn parse(script: &[u8]) -> Result<ParsedAuxPowCoinbase, ParseError> {
        ParsedAuxPowCoinbase::parse(script, &test_hash())
    }

    #[test]
    fn test_missing_root() {
        assert_eq!(
            ParsedAuxPowCoinbase::parse(&[], &Hash::zero()),
            Err(ParseError::MissingRoot)
        );

        // The script must carry the root big-endian
        let mut one = Hash::zero();
        one.0[0] = 1;
        let mut script = Vec::new();
        push(&mut script, one.as_bytes());
        assert_eq!(ParsedAuxPowCoinbase::parse(&script, &one), Err(ParseError::MissingRoot));
    }

    #[test]
    fn test_big_endian_root_found() {
        let mut script = Vec::new();
        push(&mut script, &test_hash_be());
        assert_eq!(parse(&script), Err(ParseError::TruncatedCommitment));
    }

    #[test]
    fn test_multiple_prefixes() {
        for num_prefixes in [2, 3, 4, 5, 10, 20] {
            let mut script = Vec::new();
            push(&mut script, &test_hash_be());
            for _ in 0..num_prefixes {
                push(&mut script, &MERGE_MINE_PREFIX);
            }
            assert_eq!(parse(&script), Err(ParseError::MultiplePrefixes), "{}", num_prefixes);
        }
    }

    #[test]
    fn test_prefix_after_root() {
        let mut script = Vec::new();
        push(&mut script, &test_hash_be());
        push(&mut script, &MERGE_MINE_PREFIX);
        assert_eq!(parse(&script), Err(ParseError::PrefixNotAdjacent));
    }

    #[test]
    fn test_gap_between_prefix_and_root() {
        for pad in 1..100 {
            let mut script = MERGE_MINE_PREFIX.to_vec();
            script.extend(std::iter::repeat(0u8).take(pad));
            script.extend_from_slice(&test_hash_be());
            assert_eq!(parse(&script), Err(ParseError::PrefixNotAdjacent), "pad={}", pad);
        }
    }

    #[test]
    fn test_prefix_then_root_without_data() {
        let mut script = MERGE_MINE_PREFIX.to_vec();
        script.extend_from_slice(&test_hash_be());
        assert_eq!(parse(&script), Err(ParseError::TruncatedCommitment));

        // Legacy form without the prefix
        assert_eq!(parse(&test_hash_be()), Err(ParseError::TruncatedCommitment));
    }

    #[test]
    fn test_legacy_root_offset_limit() {
        for pad in 0..=100 {
            let mut script = vec![0u8; pad];
            script.extend_from_slice(&test_hash_be());
            let expected = if pad <= MAX_COINBASE_ROOT_OFFSET {
                ParseError::TruncatedCommitment
            } else {
                ParseError::RootTooDeep
            };
            assert_eq!(parse(&script), Err(expected), "pad={}", pad);
        }
    }

    #[test]
    fn test_one_byte_short() {
        let mut script = MERGE_MINE_PREFIX.to_vec();
        script.extend_from_slice(&test_hash_be());
        script.extend_from_slice(&[0u8; 7]);
        assert_eq!(parse(&script), Err(ParseError::TruncatedCommitment));
    }

    #[test]
    fn test_parse_with_prefix() {
        let mut script = MERGE_MINE_PREFIX.to_vec();
        script.extend_from_slice(&test_hash_be());
        script.extend_from_slice(&DATA);
        let parsed = parse(&script).unwrap();
        assert_eq!(parsed.tree_size, 0x04030201);
        assert_eq!(parsed.merge_mine_nonce, 0x08070605);
    }

    #[test]
    fn test_parse_without_prefix() {
        let mut script = test_hash_be();
        script.extend_from_slice(&DATA);
        let parsed = parse(&script).unwrap();
        assert_eq!(parsed.tree_size, 0x04030201);
        assert_eq!(parsed.merge_mine_nonce, 0x08070605);
    }

    #[test]
    fn test_prefix_allows_any_leading_bytes() {
        for pad in 0..=100 {
            let mut script = vec![0u8; pad];
            script.extend_from_slice(&MERGE_MINE_PREFIX);
            script.extend_from_slice(&test_hash_be());
            script.extend_from_slice(&DATA);
            script.extend_from_slice(&[0xff, 0xff, 0xff]);
            let parsed = parse(&script).unwrap();
            assert_eq!(parsed.tree_size, 0x04030201);
            assert_eq!(parsed.merge_mine_nonce, 0x08070605);
        }
    }

    #[test]
    fn test_legacy_padding_with_trailing_bytes() {
        for pad in 0..=100 {
            let mut script = vec![0u8; pad];
            script.extend_from_slice(&test_hash_be());
            script.extend_from_slice(&DATA);
            script.extend_from_slice(&[0xff, 0xff, 0xff]);
            match parse(&script) {
                Ok(parsed) => {
                    assert!(pad <= MAX_COINBASE_ROOT_OFFSET);
                    assert_eq!(parsed.tree_size, 0x04030201);
                    assert_eq!(parsed.merge_mine_nonce, 0x08070605);
                }
                Err(err) => {
                    assert!(pad > MAX_COINBASE_ROOT_OFFSET);
                    assert_eq!(err, ParseError::RootTooDeep);
                }
            }
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ParseError::RootTooDeep.to_string(),
            "AuxPow chain merkle root can have at most 20 preceding bytes of the parent coinbase"
        );
        assert_eq!(
            ParseError::MultiplePrefixes.to_string(),
            "Multiple merged mining prefixes in coinbase"
        );
    }
}
