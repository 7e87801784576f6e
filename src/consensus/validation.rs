//! Header validation
//!
//! Error taxonomy for AuxPoW and proof-of-work checks, and the header
//! acceptance path that ties the difficulty engine, the AuxPoW checks and
//! the block index together.

use thiserror::Error;
use tracing::debug;
use crate::consensus::{
    check_aux_proof_of_work, get_next_work_required, permitted_difficulty_transition,
    BlockHeader, ChainParams, ParseError,
};
use crate::crypto::Hash;
use crate::storage::{BlockId, BlockIndex, BlockIndexError};

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("AuxPow nIndex must be 0")]
    BadCoinbaseIndex,
    #[error("AuxPow chain merkle branch too long")]
    ChainBranchTooLong,
    #[error("AuxPow parent has our chain ID")]
    ParentSharesChainId,
    #[error("AuxPow merkle root incorrect")]
    CoinbaseNotInParentBlock,
    #[error("AuxPow coinbase transaction missing input")]
    CoinbaseMissingInput,
    #[error(transparent)]
    CommitmentParseFailed(#[from] ParseError),
    #[error("AuxPow merkle branch size does not match parent coinbase")]
    TreeSizeMismatch,
    #[error("AuxPow wrong chain index")]
    WrongChainIndex,
    #[error("Block does not have our chain ID (got {got:#x}, expected {expected:#x})")]
    WrongChainId { got: u32, expected: u32 },
    #[error("AuxPow flag set but no AuxPow attached")]
    MissingAuxPow,
    #[error("AuxPow attached but version flag not set")]
    UnexpectedAuxPow,
    #[error("Proof of work failed")]
    HighHash,
    #[error("Incorrect proof of work: expected bits {expected:#010x}, got {got:#010x}")]
    BadDifficultyBits { expected: u32, got: u32 },
    #[error("Difficulty transition out of bounds")]
    DifficultyOutOfBounds,
    #[error("Block index has no ancestor at height {0}")]
    MissingAncestor(i32),
    #[error("Previous block {0} not found")]
    UnknownParent(Hash),
    #[error(transparent)]
    Index(#[from] BlockIndexError),
}

/// Validate a header against its parent in `index` and add it.
///
/// Checks, in order: the parent is known, the difficulty bits are the ones
/// the retarget rules require and lie within the permitted transition, and
/// the (possibly merge-mined) proof of work is valid.
pub fn accept_header(
    header: &BlockHeader,
    index: &mut BlockIndex,
    params: &ChainParams,
) -> Result<BlockId, ValidationError> {
    let prev_hash = header.base.prev_hash;
    let prev = index
        .lookup(&prev_hash)
        .ok_or(ValidationError::UnknownParent(prev_hash))?;
    let prev_entry = index.entry(prev);
    let height = prev_entry.height + 1;
    let prev_bits = prev_entry.bits;

    let expected = get_next_work_required(&*index, prev, i64::from(header.time()), params)?;
    if header.bits() != expected {
        debug!(height, expected, got = header.bits(), "rejecting header with bad difficulty bits");
        return Err(ValidationError::BadDifficultyBits {
            expected,
            got: header.bits(),
        });
    }
    if !permitted_difficulty_transition(params, height, prev_bits, header.bits()) {
        debug!(height, bits = header.bits(), "difficulty transition out of bounds");
        return Err(ValidationError::DifficultyOutOfBounds);
    }

    check_aux_proof_of_work(header, params)?;

    Ok(index.insert(&header.base)?)
}
