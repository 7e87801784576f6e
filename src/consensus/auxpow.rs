//! Auxiliary proof of work
//!
//! A merge-mined block proves its work through a block of a parent chain.
//! The parent's coinbase commits to the root of a small "chain merkle tree"
//! whose leaves are the block hashes of every merge-mined chain; each chain
//! owns one slot, derived from its chain ID and a nonce chosen by the miner.
//!
//! Checking an [`AuxPow`] therefore means walking two merkle branches: from
//! our block hash up to the chain merkle root, and from the parent coinbase
//! up to the parent block's merkle root.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{self, VarInt, MAX_VEC_SIZE};
use bitcoin::consensus::{Decodable, Encodable};
use bitcoin::transaction::Version;
use bitcoin::{io, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, Witness};
use tracing::debug;
use crate::consensus::{
    compact, hash_to_u256, version, BaseHeader, ChainParams, ParsedAuxPowCoinbase, ValidationError,
};
use crate::constants::{MAX_CHAIN_MERKLE_BRANCH_LEN, MERGE_MINE_PREFIX};
use crate::crypto::{root_from_branch, Hash};

/// Merge-mining proof attached to a block header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxPow {
    /// Parent chain coinbase carrying the commitment
    pub coinbase_tx: Transaction,
    /// Scrypt hash of the parent block; informational, never validated
    pub hash_block: Hash,
    /// Branch from the coinbase to the parent block's merkle root
    pub merkle_branch: Vec<Hash>,
    /// Position of the coinbase in the parent block, always 0
    pub index: u32,
    /// Branch from our block hash to the chain merkle root
    pub chain_merkle_branch: Vec<Hash>,
    /// Slot of our chain in the chain merkle tree
    pub chain_index: u32,
    /// Header of the parent block whose hash carries the work
    pub parent_block: BaseHeader,
}

/// Slot of `chain_id` in a chain merkle tree of height `height`.
///
/// A fixed linear congruential step mixes the merge-mine nonce and the chain
/// ID, so a miner cannot place two blocks of one chain in the same tree.
/// All arithmetic wraps at 32 bits.
pub fn expected_merkle_index(nonce: u32, chain_id: u32, height: u32) -> u32 {
    let mut rand = nonce;
    rand = rand.wrapping_mul(1_103_515_245).wrapping_add(12_345);
    rand = rand.wrapping_add(chain_id);
    rand = rand.wrapping_mul(1_103_515_245).wrapping_add(12_345);

    match 1u32.checked_shl(height) {
        Some(tree_size) => rand % tree_size,
        None => rand,
    }
}

/// Coinbase with a single null-outpoint input carrying `script_sig` and no outputs
fn coinbase_with_script(script_sig: Vec<u8>) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::from_bytes(script_sig),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![],
    }
}

impl Default for AuxPow {
    /// Null proof: empty coinbase script, empty branches, zeroed parent
    fn default() -> Self {
        Self {
            coinbase_tx: coinbase_with_script(vec![]),
            hash_block: Hash::zero(),
            merkle_branch: vec![],
            index: 0,
            chain_merkle_branch: vec![],
            chain_index: 0,
            parent_block: BaseHeader::default(),
        }
    }
}

impl AuxPow {
    /// Check that this proof commits to `hash_aux_block` on chain `chain_id`.
    ///
    /// Only the commitment is verified here; whether the parent block's
    /// hash meets the target is checked by the caller.
    pub fn check_aux_block_hash(
        &self,
        hash_aux_block: &Hash,
        chain_id: u32,
        params: &ChainParams,
    ) -> Result<(), ValidationError> {
        let result = self.check_commitment(hash_aux_block, chain_id, params);
        if let Err(err) = &result {
            debug!(chain_id, block = %hash_aux_block, error = %err, "AuxPoW commitment rejected");
        }
        result
    }

    fn check_commitment(
        &self,
        hash_aux_block: &Hash,
        chain_id: u32,
        params: &ChainParams,
    ) -> Result<(), ValidationError> {
        if self.index != 0 {
            return Err(ValidationError::BadCoinbaseIndex);
        }
        if self.chain_merkle_branch.len() > MAX_CHAIN_MERKLE_BRANCH_LEN {
            return Err(ValidationError::ChainBranchTooLong);
        }
        if params.enforce_strict_auxpow_chain_id && self.parent_block.chain_id() == chain_id {
            return Err(ValidationError::ParentSharesChainId);
        }

        let chain_root = root_from_branch(*hash_aux_block, &self.chain_merkle_branch, self.chain_index);

        let coinbase_root = root_from_branch(self.coinbase_hash(), &self.merkle_branch, self.index);
        if coinbase_root != self.parent_block.merkle_root {
            return Err(ValidationError::CoinbaseNotInParentBlock);
        }

        let script = self
            .coinbase_tx
            .input
            .first()
            .map(|input| input.script_sig.as_bytes())
            .ok_or(ValidationError::CoinbaseMissingInput)?;
        let parsed = ParsedAuxPowCoinbase::parse(script, &chain_root)?;

        // Branch length is at most 30, so the shift cannot overflow
        let height = self.chain_merkle_branch.len() as u32;
        if parsed.tree_size != 1u32 << height {
            return Err(ValidationError::TreeSizeMismatch);
        }
        if self.chain_index != expected_merkle_index(parsed.merge_mine_nonce, chain_id, height) {
            return Err(ValidationError::WrongChainIndex);
        }
        Ok(())
    }

    /// Txid of the parent coinbase, the leaf of the parent merkle branch
    pub fn coinbase_hash(&self) -> Hash {
        self.coinbase_tx.compute_txid().into()
    }

    /// Scrypt hash of the parent block, the hash that carries the work
    pub fn parent_pow_hash(&self) -> Hash {
        self.parent_block.pow_hash()
    }

    /// Build a proof committing to `hash_aux_block`.
    ///
    /// Our block sits in the slot the nonce selects, under `chain_branch`;
    /// the coinbase sits at position 0 under `coinbase_branch`. The parent
    /// header gets version `parent_low_bits` with `parent_chain_id` and is
    /// left unsolved (see [`AuxPow::solve`]). An out-of-range parent chain
    /// ID or low bits leave the parent version at zero.
    pub fn build(
        hash_aux_block: Hash,
        chain_id: u32,
        parent_chain_id: u32,
        merge_mine_nonce: u32,
        chain_branch: &[Hash],
        coinbase_branch: &[Hash],
        parent_low_bits: u32,
    ) -> Self {
        let height = chain_branch.len() as u32;
        let chain_index = expected_merkle_index(merge_mine_nonce, chain_id, height);
        let chain_root = root_from_branch(hash_aux_block, chain_branch, chain_index);

        let mut script = MERGE_MINE_PREFIX.to_vec();
        script.extend_from_slice(chain_root.reversed().as_bytes());
        script.extend_from_slice(&1u32.checked_shl(height).unwrap_or(0).to_le_bytes());
        script.extend_from_slice(&merge_mine_nonce.to_le_bytes());
        let coinbase_tx = coinbase_with_script(script);

        let parent_version = version::make_version(parent_chain_id, parent_low_bits).unwrap_or(0);
        let merkle_root = root_from_branch(coinbase_tx.compute_txid().into(), coinbase_branch, 0);
        let parent_block = BaseHeader::new(parent_version, Hash::zero(), merkle_root, 0, 0, 0);

        Self {
            coinbase_tx,
            hash_block: Hash::zero(),
            merkle_branch: coinbase_branch.to_vec(),
            index: 0,
            chain_merkle_branch: chain_branch.to_vec(),
            chain_index,
            parent_block,
        }
    }

    /// Grind the parent nonce until the parent's scrypt hash meets `bits`.
    ///
    /// Returns false if `bits` is not a usable target or no nonce works.
    /// On success `hash_block` is updated to the new parent hash.
    pub fn solve(&mut self, bits: u32, params: &ChainParams) -> bool {
        let decoded = compact::decode(bits);
        if !decoded.is_valid_target() || decoded.target > params.pow_limit {
            return false;
        }

        for nonce in 0..=u32::MAX {
            self.parent_block.nonce = nonce;
            let pow_hash = self.parent_block.pow_hash();
            if hash_to_u256(&pow_hash) <= decoded.target {
                self.hash_block = pow_hash;
                return true;
            }
        }
        false
    }
}

fn encode_branch<W: io::Write + ?Sized>(branch: &[Hash], writer: &mut W) -> Result<usize, io::Error> {
    let mut len = VarInt(branch.len() as u64).consensus_encode(writer)?;
    for hash in branch {
        len += hash.consensus_encode(writer)?;
    }
    Ok(len)
}

/// Count-prefixed branch; counts that could not fit in a vector of
/// `MAX_VEC_SIZE` bytes are refused before anything is read
fn decode_branch<R: io::Read + ?Sized>(reader: &mut R) -> Result<Vec<Hash>, encode::Error> {
    const HASH_SIZE: usize = 32;
    let count = VarInt::consensus_decode(reader)?.0;
    let requested = usize::try_from(count).unwrap_or(usize::MAX).saturating_mul(HASH_SIZE);
    if requested > MAX_VEC_SIZE {
        return Err(encode::Error::OversizedVectorAllocation { requested, max: MAX_VEC_SIZE });
    }
    let mut branch = Vec::new();
    for _ in 0..count {
        branch.push(Hash::consensus_decode(reader)?);
    }
    Ok(branch)
}

impl Encodable for AuxPow {
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut len = self.coinbase_tx.consensus_encode(writer)?;
        len += self.hash_block.consensus_encode(writer)?;
        len += encode_branch(&self.merkle_branch, writer)?;
        len += self.index.consensus_encode(writer)?;
        len += encode_branch(&self.chain_merkle_branch, writer)?;
        len += self.chain_index.consensus_encode(writer)?;
        len += self.parent_block.consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for AuxPow {
    fn consensus_decode_from_finite_reader<R: io::Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, encode::Error> {
        Ok(Self {
            coinbase_tx: Transaction::consensus_decode_from_finite_reader(reader)?,
            hash_block: Hash::consensus_decode(reader)?,
            merkle_branch: decode_branch(reader)?,
            index: u32::consensus_decode(reader)?,
            chain_merkle_branch: decode_branch(reader)?,
            chain_index: u32::consensus_decode(reader)?,
            parent_block: BaseHeader::consensus_decode(reader)?,
        })
    }
}
