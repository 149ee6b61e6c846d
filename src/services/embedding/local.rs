//! In-process ONNX embedding backend.
//!
//! Loads a sentence-embedding model (e.g. all-MiniLM-L6-v2 exported to
//! ONNX) and runs inference locally. Token embeddings are mean-pooled
//! over the attention mask and L2-normalized.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{ArrayViewD, Axis};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};

use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;

struct LocalModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
}

impl LocalModel {
    fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let max_tokens = config.max_tokens as usize;

        if !model_path.exists() {
            return Err(EmbeddingError::ModelError(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;

        // Configure truncation to prevent OOM with long texts
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;

        // Configure padding for efficient batch processing
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.dimension,
        })
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[i * max_len + j] = id as i64;
                attention_mask[i * max_len + j] = m as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array(([batch_size, max_len], input_ids))
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array(([batch_size, max_len], attention_mask))
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array(([batch_size, max_len], token_type_ids))
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::ModelError("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![
                input_ids_tensor,
                attention_mask_tensor,
                token_type_ids_tensor
            ])
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;

        let output_array: ArrayViewD<f32> = outputs[0]
            .try_extract_array()
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;

        let shape = output_array.shape();
        if shape.len() != 3 {
            return Err(EmbeddingError::ModelError(format!(
                "unexpected output shape: {:?}",
                shape
            )));
        }

        // Mean pooling over real (unmasked) token positions
        let embeddings: Vec<Vec<f32>> = (0..batch_size)
            .map(|i| {
                let sentence = output_array.index_axis(Axis(0), i);
                let mask = encodings[i].get_attention_mask();
                let token_count = mask.iter().filter(|&&m| m == 1).count().max(1) as f32;
                let mut pooled = vec![0.0f32; self.dimension];
                for (j, &m) in mask.iter().enumerate() {
                    if m == 1 {
                        for (d, value) in pooled.iter_mut().enumerate() {
                            *value += sentence[[j, d]];
                        }
                    }
                }
                for value in &mut pooled {
                    *value /= token_count;
                }
                normalize(&pooled)
            })
            .collect();

        Ok(embeddings)
    }
}

/// Embedding provider backed by a locally-loaded ONNX model.
pub struct LocalEmbeddingProvider {
    model: Arc<LocalModel>,
    dimension: usize,
}

impl LocalEmbeddingProvider {
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_dir = config.model_dir.as_deref().ok_or_else(|| {
            EmbeddingError::ModelError(
                "embedding.model_dir is required for the local provider".to_string(),
            )
        })?;
        let model = LocalModel::load(config, model_dir)?;
        Ok(Self {
            model: Arc::new(model),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        // Inference is CPU-bound; keep it off the async runtime
        tokio::task::spawn_blocking(move || model.embed(&texts))
            .await
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        // Loading succeeded, so the session is usable
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let normalized = normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_dir_is_a_config_problem() {
        let config = EmbeddingConfig {
            model_dir: None,
            ..Default::default()
        };
        assert!(matches!(
            LocalEmbeddingProvider::load(&config),
            Err(EmbeddingError::ModelError(_))
        ));
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            model_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(
            LocalEmbeddingProvider::load(&config),
            Err(EmbeddingError::ModelError(_))
        ));
    }
}
