//! C11 — Vector Store: a durable key/value map of capsules plus an
//! in-memory ANN index over 128-D embeddings, transactional.
//!
//! Composes [`kv::KvStore`] (durable, rusqlite-backed), [`ann::AnnIndex`]
//! (in-memory, usearch-backed), and [`consensus::ConsensusTree`] behind
//! a single `RwLock` write lane: readers run concurrently, writes are
//! serialized through one exclusive lock, matching §4.11/§5's
//! write-exclusion requirement.

pub mod ann;
pub mod consensus;
pub mod kv;

use crate::capsule::{cosine_similarity, Capsule};
use ann::{AnnConfig, AnnIndex};
use consensus::ConsensusTree;
use kv::KvStore;
pub use kv::StoreError;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub struct Store {
    kv: KvStore,
    ann: RwLock<AnnIndex>,
    consensus: RwLock<ConsensusTree>,
    ann_snapshot_path: PathBuf,
}

impl Store {
    /// Opens (or creates) the store at `dir`. On open the KV store is
    /// authoritative: the ANN index is rebuilt from KV whenever a
    /// snapshot is missing or its element count disagrees with the KV
    /// capsule count.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let kv = KvStore::open(&dir.join("capsules.db"))?;
        let ann_snapshot_path = dir.join("ann_index.bin");
        let ann = Self::load_or_rebuild_ann(&kv, &ann_snapshot_path)?;
        let leaves = kv.load_consensus_leaves()?;
        let consensus = ConsensusTree::from_leaves(leaves);
        Ok(Self {
            kv,
            ann: RwLock::new(ann),
            consensus: RwLock::new(consensus),
            ann_snapshot_path,
        })
    }

    fn load_or_rebuild_ann(kv: &KvStore, snapshot_path: &Path) -> Result<AnnIndex, StoreError> {
        let kv_count = kv.capsule_count()?;
        if let Ok(index) = AnnIndex::load(snapshot_path, AnnConfig::default()) {
            if index.len() == kv_count {
                return Ok(index);
            }
            tracing::warn!(kv_count, ann_count = index.len(), "ann snapshot inconsistent with kv store, rebuilding");
        }
        let mut index = AnnIndex::new(AnnConfig::default()).map_err(|e| StoreError::Init(e.to_string()))?;
        for (label, embedding) in kv.all_embeddings()? {
            index.add(label, &embedding).map_err(|e| StoreError::Init(e.to_string()))?;
        }
        Ok(index)
    }

    /// Stores a capsule and its ANN mapping atomically, then appends to
    /// the consensus tree. The KV write and the label allocation happen
    /// inside one SQLite transaction in `kv::put_capsule`; the ANN add
    /// happens under the exclusive write lock immediately after, so no
    /// reader observes a KV entry without a corresponding ANN entry for
    /// longer than that lock hold.
    pub fn put(&self, capsule: &Capsule) -> Result<(), StoreError> {
        let label = self.kv.put_capsule(capsule)?;
        {
            let mut ann = self.ann.write().map_err(|_| StoreError::Init("ann lock poisoned".into()))?;
            if ann.contains(label) {
                ann.remove(label).map_err(|e| StoreError::Init(e.to_string()))?;
            }
            ann.add(label, &capsule.embedding).map_err(|e| StoreError::Init(e.to_string()))?;
        }
        {
            let mut consensus = self.consensus.write().map_err(|_| StoreError::Init("consensus lock poisoned".into()))?;
            let leaf = consensus.update_tree(capsule.content.as_bytes());
            self.kv.append_consensus_leaf(&leaf)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Capsule>, StoreError> {
        self.kv.get_capsule(id)
    }

    /// Deletes the KV entry and its mapping; the ANN slot is tombstoned
    /// (removed) immediately rather than compacted lazily, since
    /// `usearch` supports direct removal.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        if let Some(label) = self.kv.label_for(id)? {
            let mut ann = self.ann.write().map_err(|_| StoreError::Init("ann lock poisoned".into()))?;
            let _ = ann.remove(label);
        }
        self.kv.delete_capsule(id)
    }

    /// Returns ids ordered by descending cosine similarity. `usearch`'s
    /// `Cos` metric returns a distance (1 - cosine for unit vectors);
    /// results come back pre-sorted by ascending distance, i.e.
    /// descending similarity.
    pub fn search_knn(&self, query_embedding: &[f32], k: usize) -> Result<Vec<String>, StoreError> {
        let ann = self.ann.read().map_err(|_| StoreError::Init("ann lock poisoned".into()))?;
        let matches = ann.search(query_embedding, k).map_err(|e| StoreError::Init(e.to_string()))?;
        let mut out = Vec::with_capacity(matches.len());
        for (label, _distance) in matches {
            if let Some(id) = self.kv.id_for_label(label)? {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Same as `search_knn` but also returns the cosine similarity,
    /// recomputed directly from the stored embedding (C12 needs the
    /// actual similarity value, not usearch's internal distance units).
    pub fn search_knn_scored(&self, query_embedding: &[f32], k: usize) -> Result<Vec<(Capsule, f32)>, StoreError> {
        let ids = self.search_knn(query_embedding, k)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(capsule) = self.kv.get_capsule(&id)? {
                let sim = cosine_similarity(query_embedding, &capsule.embedding);
                out.push((capsule, sim));
            }
        }
        Ok(out)
    }

    pub fn iterate_topic_index(&self, topic: &str) -> Result<Vec<Capsule>, StoreError> {
        self.kv.iterate_topic_index(topic)
    }

    pub fn put_q(&self, state_key: &str, json_blob: &str) -> Result<(), StoreError> {
        self.kv.put_q(state_key, json_blob)
    }

    pub fn get_q(&self, state_key: &str) -> Result<Option<String>, StoreError> {
        self.kv.get_q(state_key)
    }

    pub fn iterate_q_keys(&self) -> Result<Vec<String>, StoreError> {
        self.kv.iterate_q_keys()
    }

    pub fn capsule_count(&self) -> Result<usize, StoreError> {
        self.kv.capsule_count()
    }

    pub fn consensus_root(&self) -> Result<[u8; 32], StoreError> {
        let consensus = self.consensus.read().map_err(|_| StoreError::Init("consensus lock poisoned".into()))?;
        Ok(consensus.root_hash())
    }

    /// Recomputes the consensus root from the durable leaf list and
    /// compares it to the in-memory tree's root — the property exercised
    /// by `cerebrum-cli verify-consensus`.
    pub fn verify_consensus(&self) -> Result<bool, StoreError> {
        let leaves = self.kv.load_consensus_leaves()?;
        let recomputed = ConsensusTree::from_leaves(leaves);
        let current = self.consensus_root()?;
        Ok(recomputed.root_hash() == current)
    }

    /// Flushes the ANN index snapshot to disk; called by the autosave
    /// timer and on graceful shutdown.
    pub fn snapshot_ann(&self) -> Result<(), StoreError> {
        let ann = self.ann.read().map_err(|_| StoreError::Init("ann lock poisoned".into()))?;
        ann.save(&self.ann_snapshot_path).map_err(|e| StoreError::Init(e.to_string()))
    }

    /// Backs the CLI's `compact-store` command: vacuums the KV file and
    /// re-snapshots the ANN index so both durable artifacts shrink to
    /// their live size.
    pub fn compact(&self) -> Result<(), StoreError> {
        self.kv.compact()?;
        self.snapshot_ann()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::EMBEDDING_DIM;

    fn capsule(id: &str, topic: &str, mut embedding: Vec<f32>) -> Capsule {
        crate::capsule::l2_normalize(&mut embedding);
        Capsule {
            id: id.to_string(),
            topic: topic.to_string(),
            source: "peer-1".into(),
            content: format!("content for {id}"),
            plain_text_summary: "summary".into(),
            confidence: 0.8,
            timestamp_utc: chrono::Utc::now(),
            embedding,
            cryptofig_blob_base64: "".into(),
            encrypted_content: vec![],
            encryption_iv_base64: "".into(),
            signature_base64: "".into(),
        }
    }

    #[test]
    fn put_then_search_finds_self() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        embedding[3] = 1.0;
        let c = capsule("c1", "topicA", embedding.clone());
        store.put(&c).unwrap();
        let ids = store.search_knn(&embedding, 1).unwrap();
        assert_eq!(ids, vec!["c1".to_string()]);
    }

    #[test]
    fn consensus_root_matches_recomputation_after_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut e1 = vec![0.0f32; EMBEDDING_DIM];
        e1[0] = 1.0;
        store.put(&capsule("c1", "t", e1)).unwrap();
        assert!(store.verify_consensus().unwrap());
    }

    #[test]
    fn delete_removes_from_search_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        embedding[5] = 1.0;
        store.put(&capsule("c1", "t", embedding.clone())).unwrap();
        store.delete("c1").unwrap();
        assert!(store.get("c1").unwrap().is_none());
    }
}
