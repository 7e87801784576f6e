//! Chain parameters
//!
//! Per-network consensus constants, loaded once and passed explicitly to
//! every validation entry point. Difficulty parameters that change with
//! height are derived on demand as [`DaaParams`].

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::consensus::compact;
use crate::constants::{AUXPOW_CHAIN_ID, MAX_ALLOWED_CHAIN_ID};

/// Target timespan of the pre-Digishield multi-hour retarget window
const LEGACY_TARGET_TIMESPAN: i64 = 4 * 60 * 60;

/// Target timespan once Digishield retargets every block
const DIGISHIELD_TARGET_TIMESPAN: i64 = 60;

/// Heights at which minimum-difficulty blocks are never allowed, even on testnet
const MIN_DIFFICULTY_EXEMPT_HEIGHTS: std::ops::Range<i32> = 145_000..157_500;

/// Coinbase maturity after Digishield activation
const DIGISHIELD_COINBASE_MATURITY: i32 = 240;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ChainParamsError {
    #[error("Invalid chain parameters JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Target spacing must be positive, got {0}")]
    InvalidSpacing(i64),
    #[error("Proof-of-work limit must be nonzero")]
    ZeroPowLimit,
    #[error("AuxPoW chain ID {0:#x} exceeds maximum allowed chain ID")]
    InvalidChainId(u32),
}

/// Known networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Testnet,
    Regtest,
}

/// Consensus parameters of one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub network: Network,
    /// Easiest allowed target
    #[serde(with = "u256_hex")]
    pub pow_limit: U256,
    /// Seconds between blocks
    pub pow_target_spacing: i64,
    /// Static difficulty (regtest)
    pub pow_no_retargeting: bool,
    /// Allow minimum-difficulty blocks after a stall
    pub enable_testnet_min_difficulty: bool,
    /// Reject merge-mined blocks whose version carries a foreign chain ID
    pub enforce_strict_auxpow_chain_id: bool,
    /// Chain ID of this chain
    pub auxpow_chain_id: u32,
    /// First height whose successor is retargeted with Digishield
    pub digishield_height: i32,
    /// Coinbase maturity before Digishield
    pub initial_coinbase_maturity: i32,
}

/// Difficulty parameters in force at one height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaaParams {
    pub min_timespan: i64,
    pub max_timespan: i64,
    pub target_timespan: i64,
    pub digishield: bool,
    pub allow_min_difficulty: bool,
}

impl ChainParams {
    /// Main network
    pub fn main() -> Self {
        Self {
            network: Network::Main,
            pow_limit: U256::MAX >> 20,
            pow_target_spacing: 60,
            pow_no_retargeting: false,
            enable_testnet_min_difficulty: false,
            enforce_strict_auxpow_chain_id: true,
            auxpow_chain_id: AUXPOW_CHAIN_ID,
            digishield_height: 145_000,
            initial_coinbase_maturity: 30,
        }
    }

    /// Public test network
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            pow_target_spacing: 10 * 60,
            enable_testnet_min_difficulty: true,
            enforce_strict_auxpow_chain_id: false,
            ..Self::main()
        }
    }

    /// Local regression test network
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            pow_limit: U256::MAX >> 1,
            pow_target_spacing: 10 * 60,
            pow_no_retargeting: true,
            enable_testnet_min_difficulty: false,
            enforce_strict_auxpow_chain_id: true,
            auxpow_chain_id: AUXPOW_CHAIN_ID,
            digishield_height: 1450,
            initial_coinbase_maturity: 100,
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Load and validate parameters from JSON
    pub fn from_json(json: &str) -> Result<Self, ChainParamsError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String, ChainParamsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the difficulty engine cannot work with
    pub fn validate(&self) -> Result<(), ChainParamsError> {
        if self.pow_target_spacing <= 0 {
            return Err(ChainParamsError::InvalidSpacing(self.pow_target_spacing));
        }
        if self.pow_limit.is_zero() {
            return Err(ChainParamsError::ZeroPowLimit);
        }
        if self.auxpow_chain_id > MAX_ALLOWED_CHAIN_ID {
            return Err(ChainParamsError::InvalidChainId(self.auxpow_chain_id));
        }
        Ok(())
    }

    /// `pow_limit` in compact form
    pub fn pow_limit_compact(&self) -> u32 {
        compact::encode(&self.pow_limit, false)
    }

    pub fn is_digishield_enabled(&self, height: i32) -> bool {
        height >= self.digishield_height
    }

    /// Derive the difficulty parameters used when `height` is the previous block
    pub fn daa_params_at_height(&self, height: i32) -> DaaParams {
        let digishield = self.is_digishield_enabled(height);
        let allow_min_difficulty = self.enable_testnet_min_difficulty
            && !MIN_DIFFICULTY_EXEMPT_HEIGHTS.contains(&height);

        let target_timespan = if digishield {
            DIGISHIELD_TARGET_TIMESPAN
        } else {
            LEGACY_TARGET_TIMESPAN
        };

        let (min_timespan, max_timespan) = if digishield {
            (
                target_timespan - target_timespan / 4,
                target_timespan + target_timespan / 2,
            )
        } else if height > 10_000 {
            (target_timespan / 4, target_timespan * 4)
        } else if height > 5_000 {
            (target_timespan / 8, target_timespan * 4)
        } else {
            (target_timespan / 16, target_timespan * 4)
        };

        DaaParams {
            min_timespan,
            max_timespan,
            target_timespan,
            digishield,
            allow_min_difficulty,
        }
    }

    /// Blocks per retarget window for the given era
    pub fn difficulty_adjustment_interval(&self, daa: &DaaParams) -> i64 {
        daa.target_timespan / self.pow_target_spacing
    }

    /// Confirmations before a coinbase output at `height` may be spent
    pub fn coinbase_maturity(&self, height: i32) -> i32 {
        if self.is_digishield_enabled(height) {
            DIGISHIELD_COINBASE_MATURITY
        } else {
            self.initial_coinbase_maturity
        }
    }
}

/// Big-endian hex (de)serialization for 256-bit values
mod u256_hex {
    use primitive_types::U256;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(D::Error::custom)?;
        if bytes.len() > 32 {
            return Err(D::Error::custom("value wider than 256 bits"));
        }
        Ok(U256::from_big_endian(&bytes))
    }
}
