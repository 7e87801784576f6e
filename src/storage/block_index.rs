//! Block index
//!
//! An arena of header metadata addressed by stable [`BlockId`] handles.
//! Entries are never removed, so a handle stays valid for the lifetime of
//! the index. Each entry keeps a skip pointer, which makes ancestor lookups
//! logarithmic in the chain height.

use std::collections::HashMap;
use primitive_types::{U256, U512};
use thiserror::Error;
use tracing::trace;
use crate::consensus::{block_proof, BaseHeader, ChainParams, ChainView};
use crate::crypto::Hash;

/// Handle of a block in a [`BlockIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

/// Block index errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockIndexError {
    #[error("Parent block {0} is not in the index")]
    UnknownParent(Hash),
    #[error("Block {0} is already in the index")]
    Duplicate(Hash),
    #[error("Index already has a genesis block")]
    GenesisExists,
    #[error("Block index is full")]
    Full,
}

/// Header metadata stored for each block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndexEntry {
    pub height: i32,
    pub time: u32,
    pub bits: u32,
    pub version: i32,
    pub hash: Hash,
    pub parent: Option<BlockId>,
    /// Some ancestor further back than the parent
    pub skip: Option<BlockId>,
    /// Total work of the chain up to and including this block
    pub chain_work: U256,
}

/// Clear the lowest set bit
fn invert_lowest_one(n: i32) -> i32 {
    n & (n - 1)
}

/// Height the skip pointer of a block at `height` points to
fn skip_height(height: i32) -> i32 {
    if height < 2 {
        return 0;
    }
    // Odd heights jump a little less far so that even and odd
    // neighbours reach different ancestors
    if height & 1 != 0 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

/// In-memory index of every known header
#[derive(Debug, Default)]
pub struct BlockIndex {
    entries: Vec<BlockIndexEntry>,
    by_hash: HashMap<Hash, BlockId>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add the first block; it has no parent
    pub fn insert_genesis(&mut self, header: &BaseHeader) -> Result<BlockId, BlockIndexError> {
        if !self.is_empty() {
            return Err(BlockIndexError::GenesisExists);
        }
        self.push(BlockIndexEntry {
            height: 0,
            time: header.time,
            bits: header.bits,
            version: header.version,
            hash: header.hash(),
            parent: None,
            skip: None,
            chain_work: block_proof(header.bits),
        })
    }

    /// Add a header whose parent (`prev_hash`) is already indexed
    pub fn insert(&mut self, header: &BaseHeader) -> Result<BlockId, BlockIndexError> {
        let hash = header.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(BlockIndexError::Duplicate(hash));
        }
        let parent = self
            .lookup(&header.prev_hash)
            .ok_or(BlockIndexError::UnknownParent(header.prev_hash))?;

        let parent_entry = self.entry(parent);
        let height = parent_entry.height + 1;
        let chain_work = parent_entry.chain_work.saturating_add(block_proof(header.bits));
        let skip = self.ancestor(parent, skip_height(height));

        self.push(BlockIndexEntry {
            height,
            time: header.time,
            bits: header.bits,
            version: header.version,
            hash,
            parent: Some(parent),
            skip,
            chain_work,
        })
    }

    fn push(&mut self, entry: BlockIndexEntry) -> Result<BlockId, BlockIndexError> {
        let id = BlockId(u32::try_from(self.entries.len()).map_err(|_| BlockIndexError::Full)?);
        if self.by_hash.contains_key(&entry.hash) {
            return Err(BlockIndexError::Duplicate(entry.hash));
        }
        trace!(height = entry.height, hash = %entry.hash, "indexed block");
        self.by_hash.insert(entry.hash, id);
        self.entries.push(entry);
        Ok(id)
    }

    pub fn lookup(&self, hash: &Hash) -> Option<BlockId> {
        self.by_hash.get(hash).copied()
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockIndexEntry> {
        self.entries.get(id.0 as usize)
    }

    /// Entry for a handle issued by this index
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by another index.
    pub fn entry(&self, id: BlockId) -> &BlockIndexEntry {
        &self.entries[id.0 as usize]
    }

    pub fn parent(&self, id: BlockId) -> Option<BlockId> {
        self.get(id).and_then(|entry| entry.parent)
    }

    /// Ancestor of `id` at `height`, following skip pointers where they
    /// do not overshoot
    pub fn ancestor(&self, id: BlockId, height: i32) -> Option<BlockId> {
        let mut walk = id;
        let mut walk_height = self.get(id)?.height;
        if height < 0 || height > walk_height {
            return None;
        }

        while walk_height > height {
            let entry = self.entry(walk);
            let skip_to = skip_height(walk_height);
            let skip_prev = skip_height(walk_height - 1);
            let take_skip = skip_to == height
                || (skip_to > height && !(skip_prev < skip_to - 2 && skip_prev >= height));
            match entry.skip {
                Some(skip) if take_skip => {
                    walk = skip;
                    walk_height = skip_to;
                }
                _ => {
                    walk = entry.parent?;
                    walk_height -= 1;
                }
            }
        }
        Some(walk)
    }

    /// Block with the most cumulative work; the earliest inserted wins ties
    pub fn tip_by_work(&self) -> Option<BlockId> {
        let mut best: Option<(BlockId, &BlockIndexEntry)> = None;
        for (pos, entry) in self.entries.iter().enumerate() {
            if best.map_or(true, |(_, current)| entry.chain_work > current.chain_work) {
                best = Some((BlockId(pos as u32), entry));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Time the tip's difficulty would need to produce the work between
    /// `from` and `to`; negative if `from` has more work. Saturates at
    /// `i64` bounds.
    pub fn proof_equivalent_time(
        &self,
        to: BlockId,
        from: BlockId,
        tip: BlockId,
        params: &ChainParams,
    ) -> i64 {
        let to_work = self.entry(to).chain_work;
        let from_work = self.entry(from).chain_work;
        let (work, sign) = if to_work >= from_work {
            (to_work - from_work, 1)
        } else {
            (from_work - to_work, -1)
        };

        let tip_proof = block_proof(self.entry(tip).bits);
        if tip_proof.is_zero() {
            return if work.is_zero() { 0 } else { sign * i64::MAX };
        }
        let spacing = u64::try_from(params.pow_target_spacing).unwrap_or(0);
        let seconds = U512::from(work) * U512::from(spacing) / U512::from(tip_proof);
        if seconds.bits() > 63 {
            return sign * i64::MAX;
        }
        sign * seconds.low_u64() as i64
    }
}

impl ChainView for BlockIndex {
    type Id = BlockId;

    fn height(&self, id: BlockId) -> i32 {
        self.entry(id).height
    }

    fn time(&self, id: BlockId) -> i64 {
        i64::from(self.entry(id).time)
    }

    fn bits(&self, id: BlockId) -> u32 {
        self.entry(id).bits
    }

    fn parent(&self, id: BlockId) -> Option<BlockId> {
        BlockIndex::parent(self, id)
    }

    fn ancestor(&self, id: BlockId, height: i32) -> Option<BlockId> {
        BlockIndex::ancestor(self, id, height)
    }
}
