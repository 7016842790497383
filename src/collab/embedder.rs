//! The embedding boundary (§6.2).
//!
//! `CandleEmbedder` is grounded on `sly`'s `EmbeddingEngine`
//! (`src/memory/engine_candle.rs`): BGE-small via `candle-transformers`'
//! `BertModel`, CLS-token pooling, manual L2 normalization on the tensor
//! before it leaves the device. Generalized to prefer CUDA when available
//! and fall back to CPU, rather than hardcoding Metal.

use async_trait::async_trait;
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::Mutex;
use tokenizers::Tokenizer;

use crate::error::{CoreError, Result};

/// Deterministic per (text, model) pair, per §4.R's embedding contract.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        batch
            .pop()
            .ok_or_else(|| CoreError::upstream("embedder returned no vector for single input"))
    }
}

pub struct CandleEmbedder {
    model: Mutex<BertModel>,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl CandleEmbedder {
    /// Loads `BAAI/bge-small-en-v1.5` from the HF Hub cache, same model the
    /// teacher pins. `dim` is the model's hidden size (384 for bge-small).
    pub fn load() -> Result<Self> {
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);

        let model_id = "BAAI/bge-small-en-v1.5".to_string();
        let api = Api::new().map_err(|e| CoreError::upstream(e.to_string()))?;
        let repo = api.repo(Repo::new(model_id, RepoType::Model));

        let config_filename = repo.get("config.json").map_err(|e| CoreError::upstream(e.to_string()))?;
        let tokenizer_filename = repo.get("tokenizer.json").map_err(|e| CoreError::upstream(e.to_string()))?;
        let weights_filename = repo.get("model.safetensors").map_err(|e| CoreError::upstream(e.to_string()))?;

        let config: Config = serde_json::from_str(
            &std::fs::read_to_string(config_filename).map_err(|e| CoreError::upstream(e.to_string()))?,
        )
        .map_err(|e| CoreError::upstream(e.to_string()))?;

        let mut tokenizer =
            Tokenizer::from_file(tokenizer_filename).map_err(|e| CoreError::upstream(e.to_string()))?;
        if let Some(pp) = tokenizer.get_padding_mut() {
            pp.strategy = tokenizers::PaddingStrategy::BatchLongest;
        }

        let tensors = candle_core::safetensors::load(&weights_filename, &device)
            .map_err(|e| CoreError::upstream(e.to_string()))?;
        let vb = candle_nn::VarBuilder::from_tensors(tensors, DType::F32, &device);
        let model = BertModel::load(vb, &config).map_err(|e| CoreError::upstream(e.to_string()))?;
        let dim = config.hidden_size;

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            device,
            dim,
        })
    }

    fn batch_embed_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| CoreError::upstream(e.to_string()))?;

        let batch_size = texts.len();
        let seq_len = encodings[0].get_ids().len();

        let ids: Vec<u32> = encodings.iter().flat_map(|t| t.get_ids().to_vec()).collect();
        let type_ids: Vec<u32> = encodings.iter().flat_map(|t| t.get_type_ids().to_vec()).collect();

        let token_ids = Tensor::from_vec(ids, (batch_size, seq_len), &self.device)
            .map_err(|e| CoreError::upstream(e.to_string()))?;
        let token_type_ids = Tensor::from_vec(type_ids, (batch_size, seq_len), &self.device)
            .map_err(|e| CoreError::upstream(e.to_string()))?;

        let model = self.model.lock().unwrap();
        let embeddings = model
            .forward(&token_ids, &token_type_ids, None)
            .map_err(|e| CoreError::upstream(e.to_string()))?;
        drop(model);

        let cls = embeddings
            .i((.., 0, ..))
            .map_err(|e| CoreError::upstream(e.to_string()))?;

        let mut out = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let row = cls.i(i).map_err(|e| CoreError::upstream(e.to_string()))?;
            let normalized = normalize_l2(&row)?;
            out.push(
                normalized
                    .flatten_all()
                    .and_then(|t| t.to_vec1())
                    .map_err(|e| CoreError::upstream(e.to_string()))?,
            );
        }
        Ok(out)
    }
}

fn normalize_l2(v: &Tensor) -> Result<Tensor> {
    let sq_sum = v.sqr().and_then(|t| t.sum_all()).map_err(|e| CoreError::upstream(e.to_string()))?;
    let norm = sq_sum.sqrt().map_err(|e| CoreError::upstream(e.to_string()))?;
    v.broadcast_div(&norm).map_err(|e| CoreError::upstream(e.to_string()))
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_embed_sync(texts)
    }
}

/// Deterministic hashing embedder for tests: same (text, dim) always yields
/// the same vector, with no model weights to download.
#[cfg(any(test, feature = "test-util"))]
pub struct FakeEmbedder {
    pub dim: usize,
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Embedder for FakeEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dim)).collect())
    }
}

#[cfg(any(test, feature = "test-util"))]
fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut out = vec![0.0f32; dim];
    for (i, word) in text.split_whitespace().enumerate() {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        let h = hasher.finish();
        out[(h as usize + i) % dim] += 1.0;
    }
    let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in out.iter_mut() {
            *x /= norm;
        }
    }
    out
}
