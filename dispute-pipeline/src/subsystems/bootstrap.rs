//! Process bootstrap: load the model artifacts once and wire the pipeline.
//!
//! Everything built here is created exactly once per process and handed to
//! the commands explicitly; nothing is cached in globals.

use std::sync::Arc;

use dispute_core::{
    config::{GenerationConfig, ModelsConfig},
    inference::{
        InferenceModels, LogisticRegressionClassifier, OnnxEncoderConfig, OnnxTextEncoder,
        PcaReducer,
    },
    ChatCompletionsClient, ChatCompletionsConfig, DisputeConfig, DisputeError, EnrichmentScheduler,
    GenerativeClient, NarrativeEnricher, NarrativeSettings, PipelineOrchestrator,
    ResolutionRuleTable,
};
use tracing::info;

/// Load encoder, reducer and classifier, checking they fit together.
pub fn load_models(config: &ModelsConfig) -> Result<InferenceModels, DisputeError> {
    let (model_path, tokenizer_path) = config.encoder_paths();
    let encoder = OnnxTextEncoder::load(OnnxEncoderConfig {
        model_path,
        tokenizer_path,
        dimensions: config.encoder_dimensions,
        max_sequence_length: config.max_sequence_length,
        batch_size: config.encode_batch_size,
    })?;
    let reducer = PcaReducer::load(&config.reducer_path())?;
    let classifier = LogisticRegressionClassifier::load(&config.classifier_path())?;

    let models = InferenceModels::new(Arc::new(encoder), Arc::new(reducer), Arc::new(classifier))?;
    info!(?models, "inference models ready");
    Ok(models)
}

/// Create the generative client. A missing API key is fatal here.
pub fn create_generative_client(
    config: &GenerationConfig,
) -> Result<Arc<dyn GenerativeClient>, DisputeError> {
    let client = ChatCompletionsClient::new(ChatCompletionsConfig::from_generation(config)?)?;
    info!(
        model = client.model(),
        base_url = %config.base_url,
        max_retries = config.max_retries,
        "generative client ready"
    );
    Ok(Arc::new(client))
}

/// Wire already-loaded stages into an orchestrator using the config's settings.
pub fn build_orchestrator_with(
    models: InferenceModels,
    client: Arc<dyn GenerativeClient>,
    config: &DisputeConfig,
) -> PipelineOrchestrator {
    let enricher = NarrativeEnricher::new(
        client,
        ResolutionRuleTable::standard(),
        NarrativeSettings::from(&config.generation),
    );
    PipelineOrchestrator::new(
        models,
        enricher,
        EnrichmentScheduler::new(config.enrichment.max_workers),
    )
}

/// Load everything from config. Any failure aborts startup.
pub fn build_orchestrator(config: &DisputeConfig) -> Result<PipelineOrchestrator, DisputeError> {
    let models = load_models(&config.models)?;
    let client = create_generative_client(&config.generation)?;
    Ok(build_orchestrator_with(models, client, config))
}
