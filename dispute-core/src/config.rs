use std::path::PathBuf;

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DisputeConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    /// Empty means the default model location.
    #[serde(default)]
    pub encoder_model_path: String,
    /// Empty means `<model-stem>-tokenizer.json` beside the model.
    #[serde(default)]
    pub tokenizer_path: String,
    #[serde(default = "default_encoder_dimensions")]
    pub encoder_dimensions: usize,
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
    #[serde(default = "default_encode_batch_size")]
    pub encode_batch_size: usize,
    pub reducer_path: String,
    pub classifier_path: String,
}

fn default_encoder_dimensions() -> usize {
    crate::inference::ENCODER_DIMENSIONS
}

fn default_max_sequence_length() -> usize {
    256
}

fn default_encode_batch_size() -> usize {
    32
}

impl ModelsConfig {
    /// Expanded ONNX model and tokenizer paths, with defaults filled in.
    pub fn encoder_paths(&self) -> (PathBuf, PathBuf) {
        let expand = |raw: &str| {
            if raw.is_empty() {
                String::new()
            } else {
                expand_path(raw).to_string_lossy().into_owned()
            }
        };
        crate::inference::resolve_encoder_paths(
            &expand(&self.encoder_model_path),
            &expand(&self.tokenizer_path),
        )
    }

    pub fn reducer_path(&self) -> PathBuf {
        expand_path(&self.reducer_path)
    }

    pub fn classifier_path(&self) -> PathBuf {
        expand_path(&self.classifier_path)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Explanations are deterministic; anything but 0 is rejected on load.
    pub explain_temperature: f64,
    pub justify_temperature: f64,
    pub explain_max_tokens: u32,
    pub justify_max_tokens: u32,
    pub timeout_seconds: u64,
    pub max_retries: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            explain_temperature: 0.0,
            justify_temperature: 0.1,
            explain_max_tokens: 70,
            justify_max_tokens: 80,
            timeout_seconds: 30,
            max_retries: 0,
        }
    }
}

impl GenerationConfig {
    /// The API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub max_workers: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self { max_workers: 10 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub classification_file: String,
    pub resolution_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            classification_file: "classified_disputes.csv".to_string(),
            resolution_file: "resolutions.csv".to_string(),
        }
    }
}

impl DisputeConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.enrichment.max_workers == 0 {
            return Err(ConfigError::Message(
                "enrichment.max_workers must be at least 1".to_string(),
            ));
        }
        if self.models.encoder_dimensions == 0 || self.models.encode_batch_size == 0 {
            return Err(ConfigError::Message(
                "models.encoder_dimensions and models.encode_batch_size must be positive".to_string(),
            ));
        }
        if self.generation.explain_temperature != 0.0 {
            return Err(ConfigError::Message(format!(
                "generation.explain_temperature must be 0, got {}",
                self.generation.explain_temperature
            )));
        }
        let t = self.generation.justify_temperature;
        if !(0.0..=2.0).contains(&t) {
            return Err(ConfigError::Message(format!(
                "generation.justify_temperature must be within [0, 2], got {t}"
            )));
        }
        Ok(())
    }
}

/// Expand `~` and `$VARS`; falls back to the literal string if expansion fails.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}
