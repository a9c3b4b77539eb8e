//! Durable, transactional key/value layer backing C11. Grounded in the
//! teacher's `storage/sqlite.rs`: separate reader/writer connections
//! over a bundled SQLite database in WAL mode, one table per logical
//! sub-store (capsules, Q-table, ANN label mapping, consensus leaves)
//! in place of the original's separate LMDB `MDB_dbi` handles.

use crate::capsule::Capsule;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store initialization failed: {0}")]
    Init(String),
    #[error("store is busy, retry")]
    Busy,
    #[error("index inconsistent with kv store: kv={kv_count} ann={ann_count}")]
    Inconsistent { kv_count: usize, ann_count: usize },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy)
            || matches!(self, StoreError::Database(e) if matches!(e, rusqlite::Error::SqliteFailure(code, _) if code.code == rusqlite::ErrorCode::DatabaseBusy))
    }
}

pub struct KvStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl KvStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = Connection::open(path)?;
        configure(&writer)?;
        let reader = Connection::open(path)?;
        configure(&reader)?;
        let store = Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let writer = Connection::open_in_memory()?;
        let reader = Connection::open_in_memory()?;
        // in-memory connections can't share state across handles; tests
        // that need a true in-memory store should open a single connection
        // and share it, this constructor exists for schema smoke tests only.
        let store = Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS capsules (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                source TEXT NOT NULL,
                content TEXT NOT NULL,
                plain_text_summary TEXT NOT NULL,
                confidence REAL NOT NULL,
                timestamp_utc TEXT NOT NULL,
                embedding BLOB NOT NULL,
                cryptofig_blob_base64 TEXT NOT NULL,
                encrypted_content BLOB NOT NULL,
                encryption_iv_base64 TEXT NOT NULL,
                signature_base64 TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_capsules_topic ON capsules(topic);

            CREATE TABLE IF NOT EXISTS ann_mapping (
                label INTEGER PRIMARY KEY,
                capsule_id TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS ann_next_label (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                next_label INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO ann_next_label (id, next_label) VALUES (0, 1);

            CREATE TABLE IF NOT EXISTS q_table (
                state_key TEXT PRIMARY KEY,
                json_blob TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS consensus_leaves (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                leaf_hash BLOB NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Stores the capsule, allocates (or reuses) its ANN label, and
    /// records the bidirectional mapping — all inside one transaction,
    /// so "KV entry + label->id + id->label all land, or none do" is
    /// literal, not a convention.
    pub fn put_capsule(&self, capsule: &Capsule) -> Result<u64, StoreError> {
        let mut conn = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
        let tx = conn.transaction()?;

        let embedding_bytes = embedding_to_bytes(&capsule.embedding);
        tx.execute(
            "INSERT INTO capsules
                (id, topic, source, content, plain_text_summary, confidence, timestamp_utc,
                 embedding, cryptofig_blob_base64, encrypted_content, encryption_iv_base64, signature_base64)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                topic=excluded.topic, source=excluded.source, content=excluded.content,
                plain_text_summary=excluded.plain_text_summary, confidence=excluded.confidence,
                timestamp_utc=excluded.timestamp_utc, embedding=excluded.embedding,
                cryptofig_blob_base64=excluded.cryptofig_blob_base64,
                encrypted_content=excluded.encrypted_content,
                encryption_iv_base64=excluded.encryption_iv_base64,
                signature_base64=excluded.signature_base64",
            params![
                capsule.id,
                capsule.topic,
                capsule.source,
                capsule.content,
                capsule.plain_text_summary,
                capsule.confidence,
                capsule.timestamp_utc.to_rfc3339(),
                embedding_bytes,
                capsule.cryptofig_blob_base64,
                capsule.encrypted_content,
                capsule.encryption_iv_base64,
                capsule.signature_base64,
            ],
        )?;

        let existing_label: Option<u64> = tx
            .query_row("SELECT label FROM ann_mapping WHERE capsule_id = ?1", params![capsule.id], |r| r.get(0))
            .optional()?;

        let label = match existing_label {
            Some(label) => label,
            None => {
                let next_label: u64 = tx.query_row("SELECT next_label FROM ann_next_label WHERE id = 0", [], |r| r.get(0))?;
                tx.execute(
                    "INSERT INTO ann_mapping (label, capsule_id) VALUES (?1, ?2)",
                    params![next_label, capsule.id],
                )?;
                tx.execute(
                    "UPDATE ann_next_label SET next_label = ?1 WHERE id = 0",
                    params![next_label + 1],
                )?;
                next_label
            }
        };

        tx.commit()?;
        Ok(label)
    }

    pub fn get_capsule(&self, id: &str) -> Result<Option<Capsule>, StoreError> {
        let conn = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let capsule = conn
            .query_row(
                "SELECT id, topic, source, content, plain_text_summary, confidence, timestamp_utc,
                        embedding, cryptofig_blob_base64, encrypted_content, encryption_iv_base64, signature_base64
                 FROM capsules WHERE id = ?1",
                params![id],
                row_to_capsule,
            )
            .optional()?;
        Ok(capsule)
    }

    pub fn delete_capsule(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM capsules WHERE id = ?1", params![id])?;
        tx.execute("DELETE FROM ann_mapping WHERE capsule_id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn label_for(&self, id: &str) -> Result<Option<u64>, StoreError> {
        let conn = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let label = conn
            .query_row("SELECT label FROM ann_mapping WHERE capsule_id = ?1", params![id], |r| r.get(0))
            .optional()?;
        Ok(label)
    }

    pub fn id_for_label(&self, label: u64) -> Result<Option<String>, StoreError> {
        let conn = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let id = conn
            .query_row("SELECT capsule_id FROM ann_mapping WHERE label = ?1", params![label], |r| r.get(0))
            .optional()?;
        Ok(id)
    }

    pub fn iterate_topic_index(&self, topic: &str) -> Result<Vec<Capsule>, StoreError> {
        let conn = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let mut stmt = conn.prepare(
            "SELECT id, topic, source, content, plain_text_summary, confidence, timestamp_utc,
                    embedding, cryptofig_blob_base64, encrypted_content, encryption_iv_base64, signature_base64
             FROM capsules WHERE topic = ?1",
        )?;
        let rows = stmt.query_map(params![topic], row_to_capsule)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn capsule_count(&self) -> Result<usize, StoreError> {
        let conn = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM capsules", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    pub fn all_embeddings(&self) -> Result<Vec<(u64, Vec<f32>)>, StoreError> {
        let conn = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let mut stmt = conn.prepare(
            "SELECT m.label, c.embedding FROM ann_mapping m JOIN capsules c ON c.id = m.capsule_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let label: i64 = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((label as u64, bytes_to_embedding(&bytes)))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn put_q(&self, state_key: &str, json_blob: &str) -> Result<(), StoreError> {
        let conn = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
        conn.execute(
            "INSERT INTO q_table (state_key, json_blob) VALUES (?1, ?2)
             ON CONFLICT(state_key) DO UPDATE SET json_blob = excluded.json_blob",
            params![state_key, json_blob],
        )?;
        Ok(())
    }

    pub fn get_q(&self, state_key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let blob = conn
            .query_row("SELECT json_blob FROM q_table WHERE state_key = ?1", params![state_key], |r| r.get(0))
            .optional()?;
        Ok(blob)
    }

    pub fn iterate_q_keys(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let mut stmt = conn.prepare("SELECT state_key FROM q_table")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn append_consensus_leaf(&self, leaf_hash: &[u8; 32]) -> Result<(), StoreError> {
        let conn = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
        conn.execute("INSERT INTO consensus_leaves (leaf_hash) VALUES (?1)", params![leaf_hash.to_vec()])?;
        Ok(())
    }

    pub fn load_consensus_leaves(&self) -> Result<Vec<[u8; 32]>, StoreError> {
        let conn = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let mut stmt = conn.prepare("SELECT leaf_hash FROM consensus_leaves ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |r| {
            let bytes: Vec<u8> = r.get(0)?;
            Ok(bytes)
        })?;
        let mut out = Vec::new();
        for row in rows {
            let bytes = row?;
            let mut leaf = [0u8; 32];
            leaf.copy_from_slice(&bytes[..32.min(bytes.len())]);
            out.push(leaf);
        }
        Ok(out)
    }

    /// Reclaims free pages left behind by deletes. Takes the writer lock
    /// for the duration of the `VACUUM`, matching SQLite's requirement
    /// that nothing else write to the file while it runs.
    pub fn compact(&self) -> Result<(), StoreError> {
        let conn = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}

fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn row_to_capsule(row: &rusqlite::Row) -> rusqlite::Result<Capsule> {
    let embedding_bytes: Vec<u8> = row.get(7)?;
    let timestamp_str: String = row.get(6)?;
    let timestamp_utc = chrono::DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now());
    Ok(Capsule {
        id: row.get(0)?,
        topic: row.get(1)?,
        source: row.get(2)?,
        content: row.get(3)?,
        plain_text_summary: row.get(4)?,
        confidence: row.get(5)?,
        timestamp_utc,
        embedding: bytes_to_embedding(&embedding_bytes),
        cryptofig_blob_base64: row.get(8)?,
        encrypted_content: row.get(9)?,
        encryption_iv_base64: row.get(10)?,
        signature_base64: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::EMBEDDING_DIM;

    fn sample_capsule(id: &str) -> Capsule {
        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        embedding[0] = 1.0;
        Capsule {
            id: id.to_string(),
            topic: "CerebrumLux".into(),
            source: "peer-1".into(),
            content: "hello world".into(),
            plain_text_summary: "hello".into(),
            confidence: 0.9,
            timestamp_utc: chrono::Utc::now(),
            embedding,
            cryptofig_blob_base64: "".into(),
            encrypted_content: vec![1, 2, 3],
            encryption_iv_base64: "iv".into(),
            signature_base64: "sig".into(),
        }
    }

    #[test]
    fn put_then_get_round_trips_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(&dir.path().join("store.db")).unwrap();
        let capsule = sample_capsule("c1");
        store.put_capsule(&capsule).unwrap();
        let fetched = store.get_capsule("c1").unwrap().unwrap();
        assert_eq!(fetched.id, capsule.id);
        assert_eq!(fetched.content, capsule.content);
        assert_eq!(fetched.embedding, capsule.embedding);
    }

    #[test]
    fn put_allocates_stable_label() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(&dir.path().join("store.db")).unwrap();
        let capsule = sample_capsule("c1");
        let label1 = store.put_capsule(&capsule).unwrap();
        let label2 = store.put_capsule(&capsule).unwrap();
        assert_eq!(label1, label2);
    }

    #[test]
    fn delete_removes_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(&dir.path().join("store.db")).unwrap();
        let capsule = sample_capsule("c1");
        store.put_capsule(&capsule).unwrap();
        store.delete_capsule("c1").unwrap();
        assert!(store.get_capsule("c1").unwrap().is_none());
        assert!(store.label_for("c1").unwrap().is_none());
    }

    #[test]
    fn q_table_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(&dir.path().join("store.db")).unwrap();
        store.put_q("state-a", "{\"LaunchApplication\":0.5}").unwrap();
        assert_eq!(store.get_q("state-a").unwrap().unwrap(), "{\"LaunchApplication\":0.5}");
    }
}
