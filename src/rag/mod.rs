//! R. RAG Substrate — PDF → text → chunks → embeddings → retrieval (§4.R).

pub mod chunking;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::collab::pdf::PdfExtractor;
use crate::collab::vector_store::{VectorRecord, VectorStore};
use crate::collab::Embedder;
use crate::config::RagConfig;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub collection_key: String,
    pub source_id: String,
    pub page: u32,
    pub in_page_ordinal: u32,
    pub global_ordinal: u32,
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub chunk_count: usize,
}

pub struct RagSubstrate {
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: RagConfig,
}

impl RagSubstrate {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: RagConfig,
    ) -> Self {
        Self {
            extractor,
            embedder,
            store,
            config,
        }
    }

    /// Idempotent per `collection_key`: replaces the prior collection
    /// wholesale. An unreadable source fails the whole call with
    /// `ErrCorruptSource`; no partial collection is written (§4.R).
    #[instrument(skip(self, source_bytes), fields(collection_key))]
    pub async fn ingest(
        &self,
        collection_key: &str,
        source_id: &str,
        source_bytes: &[u8],
    ) -> Result<IngestOutcome> {
        let pages = self.extractor.extract(source_bytes).await?;

        let raw_chunks = chunking::chunk_pages(&pages, self.config.chunk_target_words, self.config.chunk_overlap_words);
        if raw_chunks.is_empty() {
            return Err(CoreError::corrupt_source("source produced no extractable text"));
        }

        let texts: Vec<String> = raw_chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != raw_chunks.len() {
            return Err(CoreError::upstream("embedder returned a mismatched batch size"));
        }

        let records = raw_chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, embedding))| {
                let metadata = ChunkMetadata {
                    collection_key: collection_key.to_string(),
                    source_id: source_id.to_string(),
                    page: chunk.page,
                    in_page_ordinal: chunk.in_page_ordinal,
                    global_ordinal: chunk.global_ordinal,
                };
                VectorRecord {
                    id: format!("{collection_key}-{i}"),
                    text: chunk.text,
                    embedding,
                    metadata: serde_json::to_value(metadata).unwrap_or(serde_json::Value::Null),
                }
            })
            .collect::<Vec<_>>();

        let chunk_count = records.len();
        self.store.upsert(collection_key, records).await?;

        Ok(IngestOutcome { chunk_count })
    }

    /// Fails with `ErrNotFound` on a missing collection; callers are
    /// expected to fall back to an empty context rather than fail the
    /// enclosing operation (§4.R).
    #[instrument(skip(self, query_text), fields(collection_key, k))]
    pub async fn query(&self, collection_key: &str, query_text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let embedding = self.embedder.embed_one(query_text).await?;
        let scored = self.store.query_top_k(collection_key, &embedding, k).await?;

        Ok(scored
            .into_iter()
            .filter_map(|r| {
                let metadata: ChunkMetadata = serde_json::from_value(r.metadata).ok()?;
                Some(RetrievedChunk {
                    text: r.text,
                    metadata,
                    score: r.score,
                })
            })
            .collect())
    }

    /// Same as `query` but swallows `ErrNotFound` into an empty context, for
    /// callers (Generator, Tutor) that must tolerate a missing collection.
    pub async fn query_or_empty(&self, collection_key: &str, query_text: &str, k: usize) -> Vec<RetrievedChunk> {
        match self.query(collection_key, query_text, k).await {
            Ok(chunks) => chunks,
            Err(e) if e.kind() == crate::error::ErrorKind::NotFound => Vec::new(),
            Err(_) => Vec::new(),
        }
    }

    pub async fn delete(&self, collection_key: &str) -> Result<()> {
        self.store.delete(collection_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::embedder::FakeEmbedder;
    use crate::collab::pdf::FakePdfExtractor;
    use crate::collab::pdf::PageText;
    use crate::collab::vector_store::InMemoryVectorStore;

    fn substrate() -> RagSubstrate {
        RagSubstrate::new(
            Arc::new(FakePdfExtractor {
                pages: vec![PageText {
                    page_number: 1,
                    text: "For loops iterate over a sequence. They are fundamental to control flow.".to_string(),
                }],
                fail: false,
            }),
            Arc::new(FakeEmbedder { dim: 16 }),
            Arc::new(InMemoryVectorStore::default()),
            RagConfig::default(),
        )
    }

    #[tokio::test]
    async fn ingest_then_query_round_trips() {
        let rag = substrate();
        let outcome = rag.ingest("course-1", "lecture.pdf", b"irrelevant").await.unwrap();
        assert_eq!(outcome.chunk_count, 1);

        let results = rag.query("course-1", "for loops", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.collection_key, "course-1");
    }

    #[tokio::test]
    async fn query_on_missing_collection_is_not_found() {
        let rag = substrate();
        let err = rag.query("nope", "q", 5).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn query_or_empty_tolerates_missing_collection() {
        let rag = substrate();
        let results = rag.query_or_empty("nope", "q", 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn corrupt_source_fails_ingest_with_no_partial_write() {
        let rag = RagSubstrate::new(
            Arc::new(FakePdfExtractor {
                pages: vec![],
                fail: true,
            }),
            Arc::new(FakeEmbedder { dim: 16 }),
            Arc::new(InMemoryVectorStore::default()),
            RagConfig::default(),
        );
        let err = rag.ingest("course-2", "broken.pdf", b"junk").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CorruptSource);

        let query_err = rag.query("course-2", "q", 5).await.unwrap_err();
        assert_eq!(query_err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn reingest_replaces_collection_atomically() {
        let rag = substrate();
        rag.ingest("course-3", "v1.pdf", b"irrelevant").await.unwrap();
        rag.ingest("course-3", "v2.pdf", b"irrelevant").await.unwrap();

        let results = rag.query("course-3", "for loops", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.source_id, "v2.pdf");
    }
}
