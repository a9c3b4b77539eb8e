//! Local append-only hash chain over capsule contents. Root is SHA-256
//! over the concatenation of leaf hashes — arena-plus-index, not a
//! pointer graph, so the on-disk layout (a flat ordered list of leaf
//! hashes in `store/kv.rs`'s `consensus_leaves` table) is auditable.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Default)]
pub struct ConsensusTree {
    leaf_hashes: Vec<[u8; 32]>,
}

impl ConsensusTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_leaves(leaf_hashes: Vec<[u8; 32]>) -> Self {
        Self { leaf_hashes }
    }

    pub fn leaf_hash(content: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hasher.finalize().into()
    }

    pub fn update_tree(&mut self, capsule_content: &[u8]) -> [u8; 32] {
        let leaf = Self::leaf_hash(capsule_content);
        self.leaf_hashes.push(leaf);
        leaf
    }

    pub fn root_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for leaf in &self.leaf_hashes {
            hasher.update(leaf);
        }
        hasher.finalize().into()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_hashes.len()
    }

    pub fn leaves(&self) -> &[[u8; 32]] {
        &self.leaf_hashes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_matches_recomputation_from_leaves() {
        let mut tree = ConsensusTree::new();
        tree.update_tree(b"capsule one");
        tree.update_tree(b"capsule two");
        let root = tree.root_hash();

        let recomputed = ConsensusTree::from_leaves(tree.leaves().to_vec());
        assert_eq!(recomputed.root_hash(), root);
    }

    #[test]
    fn empty_tree_has_stable_root() {
        let tree = ConsensusTree::new();
        assert_eq!(tree.root_hash(), ConsensusTree::new().root_hash());
    }
}
