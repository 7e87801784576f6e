//! Proof-of-work checks
//!
//! Plain target checks, the merge-mining aware header check and the work
//! represented by a target.

use primitive_types::U256;
use tracing::debug;
use crate::consensus::{compact, version, BlockHeader, ChainParams, ValidationError};
use crate::crypto::Hash;

/// Interpret a hash as a 256-bit little-endian integer
pub fn hash_to_u256(hash: &Hash) -> U256 {
    U256::from_little_endian(hash.as_bytes())
}

/// Check that `hash` meets the compact target `bits`
///
/// The target itself must be positive, nonzero, free of overflow and no
/// easier than the network's `pow_limit`.
pub fn check_proof_of_work(hash: &Hash, bits: u32, params: &ChainParams) -> bool {
    let decoded = compact::decode(bits);
    if !decoded.is_valid_target() || decoded.target > params.pow_limit {
        return false;
    }
    hash_to_u256(hash) <= decoded.target
}

/// Full proof-of-work check of a header, merge-mined or not.
///
/// Without an AuxPoW the header's own scrypt hash must meet its target.
/// With one, the AuxPoW must commit to this header and the parent block's
/// scrypt hash must meet this header's target.
pub fn check_aux_proof_of_work(
    header: &BlockHeader,
    params: &ChainParams,
) -> Result<(), ValidationError> {
    let block_version = header.version();
    let chain_id = version::chain_id(block_version);

    // Legacy versions predate chain IDs; their height range is checked elsewhere
    if params.enforce_strict_auxpow_chain_id
        && !version::is_legacy(block_version)
        && chain_id != params.auxpow_chain_id
    {
        debug!(chain_id, version = block_version, "block does not have our chain ID");
        return Err(ValidationError::WrongChainId {
            got: chain_id,
            expected: params.auxpow_chain_id,
        });
    }

    let has_flag = version::has_auxpow(block_version);
    let auxpow = match &header.auxpow {
        None if has_flag => return Err(ValidationError::MissingAuxPow),
        None => {
            if !check_proof_of_work(&header.pow_hash(), header.bits(), params) {
                debug!(bits = header.bits(), "non-AuxPoW proof of work failed");
                return Err(ValidationError::HighHash);
            }
            return Ok(());
        }
        Some(_) if !has_flag => return Err(ValidationError::UnexpectedAuxPow),
        Some(auxpow) => auxpow,
    };

    auxpow.check_aux_block_hash(&header.hash(), chain_id, params)?;

    if !check_proof_of_work(&auxpow.parent_block.pow_hash(), header.bits(), params) {
        debug!(bits = header.bits(), "AuxPoW parent proof of work failed");
        return Err(ValidationError::HighHash);
    }
    Ok(())
}

/// Expected number of hashes needed to meet `bits`: `2^256 / (target + 1)`
///
/// Computed as `~target / (target + 1) + 1` to stay within 256 bits.
/// Invalid targets represent no work.
pub fn block_proof(bits: u32) -> U256 {
    let decoded = compact::decode(bits);
    if !decoded.is_valid_target() {
        return U256::zero();
    }
    let target = decoded.target;
    (!target / (target + U256::one())) + U256::one()
}
