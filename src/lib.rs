//! AuxPoW Core Library
//!
//! Merge-mining (auxiliary proof-of-work) validation and the Dogecoin-style
//! difficulty adjustment engine, including the Digishield transition.
//!
//! Everything here is a pure function over immutable inputs. Chain
//! parameters are passed explicitly to every entry point.

pub mod consensus;
pub mod crypto;
pub mod storage;

/// Consensus constants - wire visible, must never change
pub mod constants {
    /// Chain ID carried in the version of every merge-mined block on this chain
    pub const AUXPOW_CHAIN_ID: u32 = 0x62;

    /// Bit in the block version signalling an attached AuxPoW payload
    pub const VERSION_AUXPOW_FLAG: i32 = 1 << 8;

    /// First version bit of the chain ID field
    pub const VERSION_CHAIN_ID_FIRST_BIT: u32 = 16;

    /// Largest chain ID that fits in the version field
    pub const MAX_ALLOWED_CHAIN_ID: u32 = (1 << (32 - VERSION_CHAIN_ID_FIRST_BIT)) - 1;

    /// Magic bytes announcing the merge-mining commitment in a coinbase script
    pub const MERGE_MINE_PREFIX: [u8; 4] = [0xfa, 0xbe, b'm', b'm'];

    /// Maximum height of the chain merkle tree (the nonce-derived slot is 32 bits)
    pub const MAX_CHAIN_MERKLE_BRANCH_LEN: usize = 30;

    /// Without a prefix, the commitment root may be preceded by at most this many bytes
    pub const MAX_COINBASE_ROOT_OFFSET: usize = 20;

    /// Serialized size of a base block header
    pub const BASE_HEADER_SIZE: usize = 80;
}
