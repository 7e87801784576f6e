//! Block version bit layout
//!
//! The 32-bit block version carries three fields:
//!
//! | bits      | meaning                                   |
//! |-----------|-------------------------------------------|
//! | `[0,8)`   | legacy version number                     |
//! | `8`       | AuxPoW flag (payload follows the header)  |
//! | `[9,16)`  | reserved                                  |
//! | `[16,32)` | chain ID                                  |

use crate::constants::{MAX_ALLOWED_CHAIN_ID, VERSION_AUXPOW_FLAG, VERSION_CHAIN_ID_FIRST_BIT};
use thiserror::Error;

/// Number of low version bits below the AuxPoW flag
const LOW_BITS_LIMIT: u32 = VERSION_AUXPOW_FLAG as u32;

/// Out-of-range input to [`make_version`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Chain ID {0:#x} exceeds maximum allowed chain ID")]
    ChainIdOutOfRange(u32),
    #[error("Low version bits {0:#x} do not fit below the AuxPoW flag")]
    LowBitsOutOfRange(u32),
}

/// Pack a chain ID and low version bits into a block version (AuxPoW flag clear)
pub fn make_version(chain_id: u32, low_bits: u32) -> Result<i32, VersionError> {
    if low_bits >= LOW_BITS_LIMIT {
        return Err(VersionError::LowBitsOutOfRange(low_bits));
    }
    if chain_id > MAX_ALLOWED_CHAIN_ID {
        return Err(VersionError::ChainIdOutOfRange(chain_id));
    }
    Ok(((chain_id << VERSION_CHAIN_ID_FIRST_BIT) | low_bits) as i32)
}

/// Set or clear the AuxPoW flag, leaving all other bits untouched
pub fn with_auxpow_flag(version: i32, present: bool) -> i32 {
    if present {
        version | VERSION_AUXPOW_FLAG
    } else {
        version & !VERSION_AUXPOW_FLAG
    }
}

/// Legacy version number below the AuxPoW flag
pub fn low_bits(version: i32) -> u32 {
    (version as u32) % LOW_BITS_LIMIT
}

/// Chain ID stored in the upper 16 bits
pub fn chain_id(version: i32) -> u32 {
    (version as u32) >> VERSION_CHAIN_ID_FIRST_BIT
}

pub fn has_auxpow(version: i32) -> bool {
    version & VERSION_AUXPOW_FLAG != 0
}

/// Versions 1 and 2 predate chain IDs.
///
/// Version 2 is included only because of one historical v2 block mined
/// without AuxPoW; no other value is treated this way.
pub fn is_legacy(version: i32) -> bool {
    version == 1 || version == 2
}
