//! Difficulty adjustment algorithm
//!
//! Retargeting as the chain has done it through its history: a fixed
//! multi-hour window with era-dependent clamps, then Digishield, which
//! retargets every block and damps each adjustment to an eighth.
//!
//! The engine never owns blocks. It walks whatever block index the caller
//! has through the [`ChainView`] trait.

use primitive_types::{U256, U512};
use tracing::{debug, trace};
use crate::consensus::{compact, ChainParams, DaaParams, ValidationError};

/// Read-only view of a block index, as needed by the retarget rules
pub trait ChainView {
    /// Handle of one block in the view
    type Id: Copy;

    fn height(&self, id: Self::Id) -> i32;

    /// Block timestamp in seconds
    fn time(&self, id: Self::Id) -> i64;

    fn bits(&self, id: Self::Id) -> u32;

    fn parent(&self, id: Self::Id) -> Option<Self::Id>;

    /// Ancestor of `id` at `height`, or `None` if there is none
    fn ancestor(&self, id: Self::Id, height: i32) -> Option<Self::Id>;
}

/// `target * numerator / denominator`, capped at `limit`
///
/// The product is taken in 512 bits so it cannot overflow.
fn scale_target(target: &U256, numerator: i64, denominator: i64, limit: &U256) -> U256 {
    let numerator = u64::try_from(numerator).unwrap_or(0);
    let denominator = u64::try_from(denominator).unwrap_or(0);
    if denominator == 0 {
        return *limit;
    }
    let scaled = U512::from(*target) * U512::from(numerator) / U512::from(denominator);
    match U256::try_from(scaled) {
        Ok(scaled) if scaled <= *limit => scaled,
        _ => *limit,
    }
}

/// New compact target after a window that took `actual_timespan` seconds.
pub fn calculate_next_work_required(
    daa: &DaaParams,
    prev_bits: u32,
    actual_timespan: i64,
    params: &ChainParams,
) -> u32 {
    let modulated = if daa.digishield {
        daa.target_timespan + (actual_timespan - daa.target_timespan) / 8
    } else {
        actual_timespan
    };
    let clamped = modulated.max(daa.min_timespan).min(daa.max_timespan);

    let old_target = compact::decode(prev_bits).target;
    let new_target = scale_target(&old_target, clamped, daa.target_timespan, &params.pow_limit);
    compact::encode(&new_target, false)
}

/// Most recent bits in the window that were not a minimum-difficulty exception.
///
/// Stops at a window boundary or at the first block, whatever its bits.
fn last_non_min_difficulty_bits<C: ChainView + ?Sized>(
    chain: &C,
    from: C::Id,
    interval: i64,
    limit_bits: u32,
) -> u32 {
    let mut id = from;
    while let Some(parent) = chain.parent(id) {
        if i64::from(chain.height(id)) % interval == 0 || chain.bits(id) != limit_bits {
            break;
        }
        id = parent;
    }
    chain.bits(id)
}

/// Compact target required of the block following `prev`.
///
/// `candidate_time` is the new block's timestamp; it only matters on
/// networks that allow minimum-difficulty blocks after a stall.
pub fn get_next_work_required<C: ChainView + ?Sized>(
    chain: &C,
    prev: C::Id,
    candidate_time: i64,
    params: &ChainParams,
) -> Result<u32, ValidationError> {
    let prev_bits = chain.bits(prev);
    if params.pow_no_retargeting {
        return Ok(prev_bits);
    }

    let prev_height = chain.height(prev);
    let prev_time = chain.time(prev);
    let daa = params.daa_params_at_height(prev_height);
    let limit_bits = params.pow_limit_compact();

    if daa.allow_min_difficulty && candidate_time > prev_time + 2 * params.pow_target_spacing {
        trace!(height = prev_height + 1, "chain stalled, allowing minimum difficulty");
        return Ok(limit_bits);
    }

    let default_interval = params.difficulty_adjustment_interval(&daa);
    let interval = if daa.digishield { 1 } else { default_interval };
    let next_height = i64::from(prev_height) + 1;

    if interval <= 0 || next_height % interval != 0 {
        if daa.allow_min_difficulty && default_interval > 0 {
            return Ok(last_non_min_difficulty_bits(chain, prev, default_interval, limit_bits));
        }
        return Ok(prev_bits);
    }

    // The first retarget looks back one block less
    let lookback = if next_height == interval { interval - 1 } else { interval };
    let first_height = i64::from(prev_height) - lookback;
    let first_height = i32::try_from(first_height).unwrap_or(i32::MIN);
    let first = chain
        .ancestor(prev, first_height)
        .ok_or(ValidationError::MissingAncestor(first_height))?;

    let actual_timespan = prev_time - chain.time(first);
    let bits = calculate_next_work_required(&daa, prev_bits, actual_timespan, params);
    debug!(
        height = next_height,
        actual_timespan,
        digishield = daa.digishield,
        old_bits = prev_bits,
        new_bits = bits,
        "retarget"
    );
    Ok(bits)
}

/// Whether a block at `height` may move the difficulty from `old_bits` to `new_bits`.
///
/// Checks only that the change lies within what the retarget clamps can
/// produce, without looking at the chain.
pub fn permitted_difficulty_transition(
    params: &ChainParams,
    height: i32,
    old_bits: u32,
    new_bits: u32,
) -> bool {
    let daa = params.daa_params_at_height(height.saturating_sub(1));
    if daa.allow_min_difficulty || params.pow_no_retargeting || old_bits == new_bits {
        return true;
    }

    let interval = params.difficulty_adjustment_interval(&daa);
    if !daa.digishield && (interval <= 0 || i64::from(height) % interval != 0) {
        return false;
    }

    let decoded = compact::decode(new_bits);
    if !decoded.is_valid_target() || decoded.target > params.pow_limit {
        return false;
    }
    let new_target = decoded.target;
    let old_target = compact::decode(old_bits).target;

    let largest = compact::round(&scale_target(
        &old_target,
        daa.max_timespan,
        daa.target_timespan,
        &params.pow_limit,
    ));
    if largest < new_target {
        return false;
    }

    let smallest = compact::round(&scale_target(
        &old_target,
        daa.min_timespan,
        daa.target_timespan,
        &params.pow_limit,
    ));
    smallest <= new_target
}
