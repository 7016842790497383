//! `tutorforge_core` — the server-side AI orchestration core: LLM gateway,
//! RAG substrate, generator workflow engine, tutor session engine,
//! pedagogical analyst, and the trace/job store they share.
//!
//! This crate has no environment-variable surface and installs no tracing
//! subscriber; the embedding binary owns configuration loading and logging
//! setup, and passes a `config::CoreConfig` and collaborator implementations
//! in.

pub mod analyst;
pub mod collab;
pub mod config;
pub mod error;
pub mod gateway;
pub mod generator;
pub mod ids;
pub mod rag;
pub mod store;
pub mod tutor;

pub use error::{CoreError, ErrorKind, Result};
