//! The vector store boundary (§6.3).
//!
//! `CozoVectorStore` is grounded on `sly`'s `CozoBackend`
//! (`src/memory/backend_cozo.rs`, HNSW index over an `<F32; N>` column,
//! cosine distance) and `Memory::find_related`'s query script
//! (`src/memory/store_graph.rs`). The teacher hardcodes one 384-wide
//! `nodes` table; this generalizes to one table per collection, created on
//! first `upsert`, since §6.3 specifies "collections are string-keyed
//! namespaces" rather than a single global table.

use async_trait::async_trait;
use cozo::{DataValue, DbInstance, ScriptMutability};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Opaque metadata blob (page, ordinal, source id...); the store does
    /// not interpret it, only returns it with `ScoredRecord`.
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    pub score: f32,
}

/// Upsert, top-k query, and delete by collection key, per §6.3.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replaces the collection wholesale: records from a prior call under
    /// the same key are gone after this returns (§4.R ingest idempotency).
    async fn upsert(&self, collection_key: &str, records: Vec<VectorRecord>) -> Result<()>;

    async fn query_top_k(
        &self,
        collection_key: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>>;

    async fn delete(&self, collection_key: &str) -> Result<()>;
}

fn vec_to_datavalue(v: Vec<f32>) -> DataValue {
    DataValue::List(v.into_iter().map(|x| DataValue::from(x as f64)).collect())
}

fn table_name(collection_key: &str) -> String {
    let sanitized: String = collection_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("coll_{sanitized}")
}

pub struct CozoVectorStore {
    db: DbInstance,
    dim: usize,
    known_tables: Mutex<HashMap<String, String>>,
}

impl CozoVectorStore {
    pub fn open(path: &str, dim: usize) -> Result<Self> {
        let db = DbInstance::new("rocksdb", path, "{}")
            .map_err(|e| CoreError::upstream(format!("failed to open vector store at {path}: {e}")))?;
        Ok(Self {
            db,
            dim,
            known_tables: Mutex::new(HashMap::new()),
        })
    }

    fn ensure_table(&self, collection_key: &str) -> Result<String> {
        let table = table_name(collection_key);
        let mut known = self.known_tables.lock().unwrap();
        if known.contains_key(&table) {
            return Ok(table);
        }

        let create = format!(
            ":create {table} {{ id: String => text: String, metadata: Json, embedding: <F32; {}> }}",
            self.dim
        );
        self.run_mutable(&create)?;

        let create_idx = format!(
            "::hnsw create {table}:idx {{ dim: {}, dtype: F32, fields: [embedding], distance: Cosine, m: 50, ef_construction: 200 }}",
            self.dim
        );
        // Index creation is idempotent-enough in practice; ignore "already exists".
        let _ = self.run_mutable(&create_idx);

        known.insert(table.clone(), table.clone());
        Ok(table)
    }

    fn run_mutable(&self, script: &str) -> Result<()> {
        self.db
            .run_script(script, BTreeMap::new(), ScriptMutability::Mutable)
            .map(|_| ())
            .map_err(|e| CoreError::upstream(format!("vector store script failed: {e}")))
    }
}

#[async_trait]
impl VectorStore for CozoVectorStore {
    async fn upsert(&self, collection_key: &str, records: Vec<VectorRecord>) -> Result<()> {
        let table = self.ensure_table(collection_key)?;
        let _ = self.run_mutable(&format!("::remove {table}:idx"));
        self.run_mutable(&format!("::remove {table}"))?;
        let create = format!(
            ":create {table} {{ id: String => text: String, metadata: Json, embedding: <F32; {}> }}",
            self.dim
        );
        self.run_mutable(&create)?;
        let create_idx = format!(
            "::hnsw create {table}:idx {{ dim: {}, dtype: F32, fields: [embedding], distance: Cosine, m: 50, ef_construction: 200 }}",
            self.dim
        );
        self.run_mutable(&create_idx)?;

        for record in records {
            if record.embedding.len() != self.dim {
                return Err(CoreError::contract(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dim,
                    record.embedding.len()
                )));
            }
            let script = format!("?[id, text, metadata, embedding] <- [[$id, $text, $metadata, $embedding]] :put {table} {{ id => text, metadata, embedding }}");
            let mut params = BTreeMap::new();
            params.insert("id".to_string(), DataValue::from(record.id));
            params.insert("text".to_string(), DataValue::from(record.text));
            params.insert("metadata".to_string(), DataValue::from(record.metadata.to_string()));
            params.insert("embedding".to_string(), vec_to_datavalue(record.embedding));
            self.db
                .run_script(&script, params, ScriptMutability::Mutable)
                .map_err(|e| CoreError::upstream(format!("vector store upsert failed: {e}")))?;
        }
        Ok(())
    }

    async fn query_top_k(
        &self,
        collection_key: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let table = table_name(collection_key);
        {
            let known = self.known_tables.lock().unwrap();
            if !known.contains_key(&table) {
                return Err(CoreError::not_found(format!("collection {collection_key} does not exist")));
            }
        }

        let script = format!(
            "?[id, text, metadata, dist] := ~{table}:idx {{ id, text, metadata | query: $query_vec, k: {k}, bind_distance: dist, ef: 100 }} :sort dist"
        );
        let mut params = BTreeMap::new();
        params.insert("query_vec".to_string(), vec_to_datavalue(query_embedding.to_vec()));

        let result = self
            .db
            .run_script(&script, params, ScriptMutability::Immutable)
            .map_err(|e| CoreError::upstream(format!("vector store query failed: {e}")))?;

        let mut out = Vec::new();
        for row in result.rows {
            let id = row.first().and_then(as_str).unwrap_or_default();
            let text = row.get(1).and_then(as_str).unwrap_or_default();
            let metadata = row
                .get(2)
                .and_then(as_str)
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(serde_json::Value::Null);
            let dist = row.get(3).and_then(as_f64).unwrap_or(1.0);
            out.push(ScoredRecord {
                id,
                text,
                metadata,
                score: 1.0 - dist as f32,
            });
        }
        Ok(out)
    }

    async fn delete(&self, collection_key: &str) -> Result<()> {
        let table = table_name(collection_key);
        let mut known = self.known_tables.lock().unwrap();
        let _ = self.run_mutable(&format!("::remove {table}:idx"));
        let _ = self.run_mutable(&format!("::remove {table}"));
        known.remove(&table);
        Ok(())
    }
}

fn as_str(v: &DataValue) -> Option<String> {
    match v {
        DataValue::Str(s) => Some(s.to_string()),
        _ => None,
    }
}

fn as_f64(v: &DataValue) -> Option<f64> {
    match v {
        DataValue::Num(n) => n.get_float().into(),
        _ => None,
    }
}

/// Dependency-free stand-in for tests, grounded on the `create_test_pipeline`
/// helper that builds an `HNSWVectorStorage` directly with no backing store.
#[cfg(any(test, feature = "test-util"))]
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, Vec<VectorRecord>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, collection_key: &str, records: Vec<VectorRecord>) -> Result<()> {
        self.collections
            .lock()
            .unwrap()
            .insert(collection_key.to_string(), records);
        Ok(())
    }

    async fn query_top_k(
        &self,
        collection_key: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.lock().unwrap();
        let records = collections
            .get(collection_key)
            .ok_or_else(|| CoreError::not_found(format!("collection {collection_key} does not exist")))?;

        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                score: cosine(&r.embedding, query_embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete(&self, collection_key: &str) -> Result<()> {
        self.collections.lock().unwrap().remove(collection_key);
        Ok(())
    }
}
