//! Merkle tree implementation
//!
//! Bitcoin-style binary merkle trees over double SHA-256. A level with an
//! odd number of nodes pairs its last node with itself.

use super::{hash_pair, Hash};

/// Sentinel index meaning "no merkle proof attached"
pub const NO_PROOF_INDEX: u32 = u32::MAX;

/// Result of a single streaming pass over the leaves
struct MerkleComputation {
    root: Hash,
    branch: Vec<Hash>,
    mutated: bool,
}

/// Streaming merkle computation.
///
/// Keeps one pending inner hash per level (`inner`), so memory is bounded by
/// the tree height rather than the leaf count. When `branch_pos` is given,
/// the sibling hashes on the path from that leaf to the root are collected.
fn merkle_computation(leaves: &[Hash], branch_pos: Option<u64>) -> MerkleComputation {
    let mut branch = Vec::new();
    if leaves.is_empty() {
        return MerkleComputation { root: Hash::zero(), branch, mutated: false };
    }

    let mut inner = [Hash::zero(); 64];
    let mut match_level: Option<usize> = None;
    let mut mutated = false;
    let mut count: u64 = 0;

    for leaf in leaves {
        let mut h = *leaf;
        let mut matched = branch_pos == Some(count);
        count += 1;
        let mut level = 0usize;
        // Combine with every completed subtree this leaf closes
        while count & (1u64 << level) == 0 {
            if matched {
                branch.push(inner[level]);
            } else if match_level == Some(level) {
                branch.push(h);
                matched = true;
            }
            mutated |= inner[level] == h;
            h = hash_pair(&inner[level], &h);
            level += 1;
        }
        inner[level] = h;
        if matched {
            match_level = Some(level);
        }
    }

    // Fold the remaining partial subtrees, self-pairing where a level is odd
    let mut level = 0usize;
    while count & (1u64 << level) == 0 {
        level += 1;
    }
    let mut h = inner[level];
    let mut matched = match_level == Some(level);
    while count != (1u64 << level) {
        if matched {
            branch.push(h);
        }
        h = hash_pair(&h, &h);
        count += 1u64 << level;
        level += 1;
        while count & (1u64 << level) == 0 {
            if matched {
                branch.push(inner[level]);
            } else if match_level == Some(level) {
                branch.push(h);
                matched = true;
            }
            h = hash_pair(&inner[level], &h);
            level += 1;
        }
    }

    MerkleComputation { root: h, branch, mutated }
}

/// Compute the merkle root of a list of hashes
///
/// If the list is empty, returns zero hash.
pub fn compute_merkle_root(hashes: &[Hash]) -> Hash {
    merkle_computation(hashes, None).root
}

/// Compute the merkle root and report whether two identical sibling hashes
/// were combined anywhere in the tree.
///
/// Duplicate siblings let distinct leaf lists share a root, so callers that
/// validate full blocks reject such lists.
pub fn compute_merkle_root_mutated(hashes: &[Hash]) -> (Hash, bool) {
    let result = merkle_computation(hashes, None);
    (result.root, result.mutated)
}

/// Compute the merkle root together with the branch proving `branch_index`
///
/// Runs in one pass over the leaves. An out-of-range index yields an empty
/// branch.
pub fn compute_merkle_root_and_branch(leaves: &[Hash], branch_index: u32) -> (Hash, Vec<Hash>) {
    let result = merkle_computation(leaves, Some(u64::from(branch_index)));
    (result.root, result.branch)
}

/// Compute only the merkle branch for the leaf at `branch_index`
pub fn compute_merkle_branch(leaves: &[Hash], branch_index: u32) -> Vec<Hash> {
    compute_merkle_root_and_branch(leaves, branch_index).1
}

/// Recompute a merkle root from a leaf, its branch and its index
///
/// Bit `i` of `index` tells whether the running hash is the right-hand
/// child at level `i`. `NO_PROOF_INDEX` returns the zero hash.
pub fn root_from_branch(leaf: Hash, branch: &[Hash], index: u32) -> Hash {
    if index == NO_PROOF_INDEX {
        return Hash::zero();
    }

    let mut hash = leaf;
    let mut index = index;
    for sibling in branch {
        hash = if index & 1 == 1 {
            hash_pair(sibling, &hash)
        } else {
            hash_pair(&hash, sibling)
        };
        index >>= 1;
    }
    hash
}
