//! The deterministic binary commitment tree over cross-chain leaves.
//!
//! Leaves are ordered by `(transaction index, emission index)` at the call
//! site; this module only ever sees the final order. Levels with an odd node
//! count duplicate their last node, and the empty tree commits to the zero
//! hash so empty batches stay cheap to verify on L1.

use crate::TreeLeaf;
use alloy_primitives::{keccak256, B256};

/// Hashes a [TreeLeaf] into a tree node.
pub fn leaf_hash(leaf: &TreeLeaf) -> B256 {
    keccak256(alloy_rlp::encode(leaf))
}

/// Computes the root of the cross-chain commitment tree.
pub fn cross_chain_root(leaves: &[TreeLeaf]) -> B256 {
    if leaves.is_empty() {
        return B256::ZERO;
    }
    let mut level = leaves.iter().map(leaf_hash).collect::<Vec<_>>();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().expect("level is non-empty"));
        }
        level = level.chunks_exact(2).map(|pair| hash_pair(pair[0], pair[1])).collect();
    }
    level[0]
}

/// Produces the sibling path proving inclusion of the leaf at `index`.
/// Returns `None` when the index is out of range.
pub fn merkle_proof(leaves: &[TreeLeaf], index: usize) -> Option<Vec<B256>> {
    if index >= leaves.len() {
        return None;
    }
    let mut level = leaves.iter().map(leaf_hash).collect::<Vec<_>>();
    let mut idx = index;
    let mut proof = Vec::new();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().expect("level is non-empty"));
        }
        proof.push(level[idx ^ 1]);
        level = level.chunks_exact(2).map(|pair| hash_pair(pair[0], pair[1])).collect();
        idx /= 2;
    }
    Some(proof)
}

/// Verifies a proof produced by [merkle_proof] against a root.
pub fn verify_merkle_proof(root: B256, leaf: &TreeLeaf, index: usize, proof: &[B256]) -> bool {
    let mut node = leaf_hash(leaf);
    let mut idx = index;
    for sibling in proof {
        node = if idx % 2 == 0 { hash_pair(node, *sibling) } else { hash_pair(*sibling, node) };
        idx /= 2;
    }
    node == root
}

fn hash_pair(left: B256, right: B256) -> B256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_slice());
    buf[32..].copy_from_slice(right.as_slice());
    keccak256(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LEAF_TYPE_MESSAGE;
    use proptest::prelude::*;

    fn leaf(n: u8) -> TreeLeaf {
        TreeLeaf { kind: LEAF_TYPE_MESSAGE, hash: B256::repeat_byte(n) }
    }

    #[test]
    fn test_empty_tree_is_zero_root() {
        assert_eq!(cross_chain_root(&[]), B256::ZERO);
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let l = leaf(1);
        assert_eq!(cross_chain_root(&[l]), leaf_hash(&l));
    }

    #[test]
    fn test_odd_leaf_count_duplicates_last() {
        let leaves = [leaf(1), leaf(2), leaf(3)];
        let padded = [leaf(1), leaf(2), leaf(3), leaf(3)];
        assert_eq!(cross_chain_root(&leaves), cross_chain_root(&padded));
    }

    #[test]
    fn test_reordering_leaves_changes_root() {
        let leaves = [leaf(1), leaf(2), leaf(3), leaf(4)];
        let swapped = [leaf(2), leaf(1), leaf(3), leaf(4)];
        assert_ne!(cross_chain_root(&leaves), cross_chain_root(&swapped));
    }

    proptest! {
        #[test]
        fn proof_verifies_for_every_leaf(count in 1usize..24, seed in any::<u8>()) {
            let leaves = (0..count).map(|i| leaf(seed.wrapping_add(i as u8))).collect::<Vec<_>>();
            let root = cross_chain_root(&leaves);
            for (i, l) in leaves.iter().enumerate() {
                let proof = merkle_proof(&leaves, i).expect("index in range");
                prop_assert!(verify_merkle_proof(root, l, i, &proof));
            }
        }

        #[test]
        fn proof_rejects_wrong_leaf(count in 2usize..24) {
            let leaves = (0..count).map(|i| leaf(i as u8)).collect::<Vec<_>>();
            let root = cross_chain_root(&leaves);
            let proof = merkle_proof(&leaves, 0).expect("index in range");
            prop_assert!(!verify_merkle_proof(root, &leaf(0xEE), 0, &proof));
        }
    }
}
