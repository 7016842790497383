//! External collaborator traits (§6).
//!
//! Everything the core needs but does not own — the model provider, the
//! embedder, the vector store, the catalog, the trace store, the risk
//! signal, and the PDF extractor — is declared here as a trait. The rest of
//! the core only ever holds `Arc<dyn Trait>`. Grounded on the teacher's
//! `MemoryStore` trait (`src/memory/mod.rs`), generalized from one
//! monolithic trait to one per collaborator since §6 specifies seven
//! independent contracts rather than a single memory facade.

pub mod catalog;
pub mod embedder;
pub mod llm;
pub mod pdf;
pub mod risk;
pub mod trace;
pub mod vector_store;

pub use catalog::{ActivityHeader, CatalogExercise, CatalogWriter, PublishOutcome};
pub use embedder::Embedder;
pub use llm::{ChatOptions, ChatRequest, CompletionResult, LlmProvider, TokenChunk};
pub use pdf::{PageText, PdfExtractor};
pub use risk::{RiskSignal, RiskSignalSource};
pub use trace::{TraceQuery, TraceReader, TraceWriter};
pub use vector_store::{ScoredRecord, VectorRecord, VectorStore};
