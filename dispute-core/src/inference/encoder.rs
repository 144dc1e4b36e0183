//! ONNX sentence encoder for `all-MiniLM-L6-v2`.
//!
//! Uses the `ort` crate for ONNX Runtime and `tokenizers` for WordPiece
//! tokenization. Produces 384-dimensional, mean-pooled, L2-normalized
//! embeddings entirely offline.

use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

use super::{InferenceError, TextEncoder};

/// ONNX encoder configuration
#[derive(Debug, Clone)]
pub struct OnnxEncoderConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimensions: usize,
    pub max_sequence_length: usize,
    /// Rows per ONNX run; larger inputs are split into chunks.
    pub batch_size: usize,
}

/// Local sentence encoder backed by an ONNX session.
pub struct OnnxTextEncoder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    dimensions: usize,
    batch_size: usize,
}

impl std::fmt::Debug for OnnxTextEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxTextEncoder")
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl OnnxTextEncoder {
    /// Load the ONNX model and tokenizer named in `config`.
    ///
    /// Returns `InferenceError::ModelNotFound` if either file is missing.
    pub fn load(config: OnnxEncoderConfig) -> Result<Self, InferenceError> {
        if !config.model_path.exists() {
            return Err(InferenceError::ModelNotFound {
                path: config.model_path.display().to_string(),
            });
        }
        if !config.tokenizer_path.exists() {
            return Err(InferenceError::ModelNotFound {
                path: config.tokenizer_path.display().to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(&config.model_path))
            .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;

        let mut tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: config.max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        // Pad every input in a chunk to the longest sequence.
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        info!(
            dim = config.dimensions,
            model = %config.model_path.display(),
            "loaded text encoder"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }
}

impl TextEncoder for OnnxTextEncoder {
    fn encode(&self, texts: &[&str]) -> Result<Array2<f32>, InferenceError> {
        let mut flat = Vec::with_capacity(texts.len() * self.dimensions);

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::OnnxInference(format!("session lock poisoned: {e}")))?;

        for chunk in texts.chunks(self.batch_size) {
            encode_chunk(&mut session, &self.tokenizer, chunk, self.dimensions, &mut flat)?;
        }

        Array2::from_shape_vec((texts.len(), self.dimensions), flat)
            .map_err(|e| InferenceError::OnnxInference(e.to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Run one padded batch through the session and append the pooled rows to `out`.
fn encode_chunk(
    session: &mut Session,
    tokenizer: &tokenizers::Tokenizer,
    texts: &[&str],
    expected_dims: usize,
    out: &mut Vec<f32>,
) -> Result<(), InferenceError> {
    let batch_size = texts.len();

    // 1. Tokenize
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

    let seq_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0);

    // 2. Flat [batch_size, seq_len] input tensors
    let mut input_ids = vec![0i64; batch_size * seq_len];
    let mut attention_mask = vec![0i64; batch_size * seq_len];
    let mut token_type_ids = vec![0i64; batch_size * seq_len];

    for (i, encoding) in encodings.iter().enumerate() {
        let offset = i * seq_len;
        for (j, &id) in encoding.get_ids().iter().enumerate() {
            input_ids[offset + j] = id as i64;
        }
        for (j, &mask) in encoding.get_attention_mask().iter().enumerate() {
            attention_mask[offset + j] = mask as i64;
        }
        for (j, &tid) in encoding.get_type_ids().iter().enumerate() {
            token_type_ids[offset + j] = tid as i64;
        }
    }

    let shape = vec![batch_size as i64, seq_len as i64];

    let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids))
        .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;
    let attention_mask_tensor = Tensor::from_array((shape.clone(), attention_mask.clone()))
        .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
        .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;

    let inputs = ort::inputs! {
        "input_ids" => input_ids_tensor,
        "attention_mask" => attention_mask_tensor,
        "token_type_ids" => token_type_ids_tensor,
    };

    // 3. Run session
    let outputs = session
        .run(inputs)
        .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;

    // 4. Last hidden state: [batch_size, seq_len, hidden_dim]
    let (out_shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;

    if out_shape.len() != 3 || out_shape[0] as usize != batch_size {
        return Err(InferenceError::OnnxInference(format!(
            "unexpected output shape {:?}, expected [{batch_size}, {seq_len}, {expected_dims}]",
            &out_shape[..]
        )));
    }
    let out_seq_len = out_shape[1] as usize;
    let hidden_dim = out_shape[2] as usize;
    if hidden_dim != expected_dims {
        return Err(InferenceError::DimensionMismatch {
            stage: "encoder",
            expected: expected_dims,
            actual: hidden_dim,
        });
    }

    // 5. Mean-pool each row under its attention mask, then L2 normalize
    for i in 0..batch_size {
        let mut pooled = vec![0.0f32; hidden_dim];
        let mut token_count = 0.0f32;

        for j in 0..out_seq_len.min(seq_len) {
            let mask_val = attention_mask[i * seq_len + j] as f32;
            if mask_val > 0.0 {
                let offset = (i * out_seq_len + j) * hidden_dim;
                for (d, p) in pooled.iter_mut().enumerate() {
                    *p += data[offset + d] * mask_val;
                }
                token_count += mask_val;
            }
        }

        if token_count > 0.0 {
            for p in &mut pooled {
                *p /= token_count;
            }
        }
        normalize(&mut pooled);
        out.extend_from_slice(&pooled);
    }

    Ok(())
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Resolve the default model directory.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("dispute-assist/models")
}

/// Resolve paths for the ONNX model and tokenizer.
///
/// An empty model path means the default location; an empty tokenizer path
/// means `<model-stem>-tokenizer.json` next to the model.
pub fn resolve_encoder_paths(model_path: &str, tokenizer_path: &str) -> (PathBuf, PathBuf) {
    let model = if model_path.is_empty() {
        default_model_dir().join("all-MiniLM-L6-v2.onnx")
    } else {
        PathBuf::from(model_path)
    };

    let tokenizer = if tokenizer_path.is_empty() {
        let stem = model
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        model.with_file_name(format!("{stem}-tokenizer.json"))
    } else {
        PathBuf::from(tokenizer_path)
    };

    (model, tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ENCODER_DIMENSIONS;

    fn config(model: &str, tokenizer: &str) -> OnnxEncoderConfig {
        OnnxEncoderConfig {
            model_path: PathBuf::from(model),
            tokenizer_path: PathBuf::from(tokenizer),
            dimensions: ENCODER_DIMENSIONS,
            max_sequence_length: 256,
            batch_size: 32,
        }
    }

    #[test]
    fn test_model_not_found_returns_error() {
        let result = OnnxTextEncoder::load(config(
            "/nonexistent/model.onnx",
            "/nonexistent/tokenizer.json",
        ));
        match result.unwrap_err() {
            InferenceError::ModelNotFound { path } => {
                assert!(path.ends_with("model.onnx"), "path was: {path}");
            }
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_missing_tokenizer_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.onnx");
        std::fs::write(&model, b"not really onnx").unwrap();

        let result = OnnxTextEncoder::load(config(
            model.to_str().unwrap(),
            "/nonexistent/tokenizer.json",
        ));
        match result.unwrap_err() {
            InferenceError::ModelNotFound { path } => {
                assert!(path.ends_with("tokenizer.json"), "path was: {path}");
            }
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_default_model_dir_is_namespaced() {
        let dir = default_model_dir();
        assert!(
            dir.to_string_lossy().contains("dispute-assist/models"),
            "got: {}",
            dir.display()
        );
    }

    #[test]
    fn test_resolve_paths_default() {
        let (model, tokenizer) = resolve_encoder_paths("", "");
        assert!(model.to_string_lossy().ends_with("all-MiniLM-L6-v2.onnx"));
        assert!(tokenizer
            .to_string_lossy()
            .ends_with("all-MiniLM-L6-v2-tokenizer.json"));
    }

    #[test]
    fn test_resolve_paths_custom_model_derives_tokenizer() {
        let (model, tokenizer) = resolve_encoder_paths("/opt/models/minilm.onnx", "");
        assert_eq!(model, PathBuf::from("/opt/models/minilm.onnx"));
        assert_eq!(tokenizer, PathBuf::from("/opt/models/minilm-tokenizer.json"));
    }

    #[test]
    fn test_resolve_paths_explicit_tokenizer_wins() {
        let (_, tokenizer) = resolve_encoder_paths("/opt/m.onnx", "/srv/tok.json");
        assert_eq!(tokenizer, PathBuf::from("/srv/tok.json"));
    }

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
