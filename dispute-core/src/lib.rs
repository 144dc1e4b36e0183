pub mod agent;
pub mod batch;
pub mod config;
pub mod csv;
pub mod db;
pub mod error;
pub mod generation;
pub mod inference;
pub mod models;
pub mod narrative;
pub mod pipeline;
pub mod rules;
pub mod scheduler;
pub mod store;

pub use agent::{AgentError, GenerativeQueryAgent, QueryAgent, TableView};
pub use batch::{BatchIoError, ClassificationRow, OutputPaths, ResolutionRow};
pub use config::DisputeConfig;
pub use error::DisputeError;
pub use generation::{
    ChatCompletionsClient, ChatCompletionsConfig, CompletionRequest, GenerationError,
    GenerativeClient,
};
pub use inference::{InferenceError, InferenceModels};
pub use models::{Category, Dispute, DisputeStatus, EnrichedDispute, Enrichment};
pub use narrative::{NarrativeEnricher, NarrativeSettings};
pub use pipeline::{PipelineError, PipelineOrchestrator};
pub use rules::{ResolutionRule, ResolutionRuleTable};
pub use scheduler::EnrichmentScheduler;
pub use store::{DisputeStore, StoreError};
