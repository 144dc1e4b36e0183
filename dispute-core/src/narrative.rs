//! Explanation and justification text for classified disputes.
//!
//! `NarrativeEnricher` never returns an error. A failed generative call is
//! logged once at `warn` and replaced by a deterministic fallback string,
//! reported as [`Enrichment::Fallback`].

use std::sync::Arc;

use tracing::warn;

use crate::config::GenerationConfig;
use crate::generation::{CompletionRequest, GenerativeClient};
use crate::models::{Category, Enrichment};
use crate::rules::ResolutionRuleTable;

const EXPLAIN_SYSTEM: &str = "You write clear, evidence-based explanations.";
const JUSTIFY_SYSTEM: &str = "You write clear, actionable justifications for support agents.";

/// Sampling settings for the two prompts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrativeSettings {
    pub explain_temperature: f64,
    pub explain_max_tokens: u32,
    pub justify_temperature: f64,
    pub justify_max_tokens: u32,
}

impl Default for NarrativeSettings {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

impl From<&GenerationConfig> for NarrativeSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            explain_temperature: config.explain_temperature,
            explain_max_tokens: config.explain_max_tokens,
            justify_temperature: config.justify_temperature,
            justify_max_tokens: config.justify_max_tokens,
        }
    }
}

/// Text used when an explanation cannot be generated.
pub fn explanation_fallback(category: Category) -> String {
    format!("Classified as {category} based on semantic analysis.")
}

#[derive(Clone)]
pub struct NarrativeEnricher {
    client: Arc<dyn GenerativeClient>,
    rules: ResolutionRuleTable,
    settings: NarrativeSettings,
}

impl NarrativeEnricher {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        rules: ResolutionRuleTable,
        settings: NarrativeSettings,
    ) -> Self {
        Self {
            client,
            rules,
            settings,
        }
    }

    pub fn rules(&self) -> &ResolutionRuleTable {
        &self.rules
    }

    /// One sentence citing evidence in `description` for `category`.
    pub async fn explain(&self, description: &str, category: Category) -> Enrichment {
        let request = CompletionRequest {
            system: EXPLAIN_SYSTEM.to_string(),
            user: format!(
                "A financial support agent needs to know why a customer dispute was classified.\n\
                 - Customer's description: \"{description}\"\n\
                 - Predicted category: {category}\n\
                 In one clear sentence, explain why this dispute belongs in the '{category}' \
                 category, quoting the key evidence from the customer's description."
            ),
            temperature: self.settings.explain_temperature,
            max_tokens: self.settings.explain_max_tokens,
        };

        match self.client.complete(&request).await {
            Ok(text) => Enrichment::generated(text),
            Err(e) => {
                warn!(
                    operation = "explain",
                    client = self.client.name(),
                    category = %category,
                    error = %e,
                    "explanation generation failed, using fallback text"
                );
                Enrichment::fallback(explanation_fallback(category), e.to_string())
            }
        }
    }

    /// One sentence connecting `action` to the customer's complaint.
    pub async fn justify(&self, description: &str, category: Category, action: &str) -> Enrichment {
        let request = CompletionRequest {
            system: JUSTIFY_SYSTEM.to_string(),
            user: format!(
                "A customer dispute has been analyzed for a financial support agent.\n\
                 - Customer's description: \"{description}\"\n\
                 - Classified as: {category}\n\
                 - Suggested next action: {action}\n\
                 In one short sentence, tell the agent why '{action}' is the right next step, \
                 tying it to what the customer reported."
            ),
            temperature: self.settings.justify_temperature,
            max_tokens: self.settings.justify_max_tokens,
        };

        match self.client.complete(&request).await {
            Ok(text) => Enrichment::generated(text),
            Err(e) => {
                warn!(
                    operation = "justify",
                    client = self.client.name(),
                    category = %category,
                    error = %e,
                    "justification generation failed, using rule table text"
                );
                Enrichment::fallback(self.rules.justification(category), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{ChatCompletionsClient, ChatCompletionsConfig, GenerationError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records every request and answers with a fixed string or a fixed error.
    struct Recording {
        reply: Option<&'static str>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl GenerativeClient for Recording {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            match self.reply {
                Some(text) => Ok(text.to_string()),
                None => Err(GenerationError::Api {
                    code: 429,
                    message: "quota exceeded".to_string(),
                }),
            }
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn enricher(reply: Option<&'static str>) -> (NarrativeEnricher, Arc<Recording>) {
        let client = Arc::new(Recording {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let enricher = NarrativeEnricher::new(
            client.clone(),
            ResolutionRuleTable::standard(),
            NarrativeSettings::default(),
        );
        (enricher, client)
    }

    #[tokio::test]
    async fn explain_returns_generated_text() {
        let (enricher, client) = enricher(Some("The customer reports being charged twice."));
        let out = enricher
            .explain("charged twice for same purchase", Category::DuplicateCharge)
            .await;

        assert_eq!(out, Enrichment::generated("The customer reports being charged twice."));
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].temperature, 0.0);
        assert_eq!(seen[0].max_tokens, 70);
        assert_eq!(seen[0].system, EXPLAIN_SYSTEM);
        assert!(seen[0].user.contains("charged twice for same purchase"));
        assert!(seen[0].user.contains("DUPLICATE_CHARGE"));
    }

    #[tokio::test]
    async fn justify_prompt_names_the_action() {
        let (enricher, client) = enricher(Some("Refund is automatic for duplicates."));
        let out = enricher
            .justify("charged twice", Category::DuplicateCharge, "Auto-refund")
            .await;

        assert!(!out.is_fallback());
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].system, JUSTIFY_SYSTEM);
        assert_eq!(seen[0].max_tokens, 80);
        assert!((seen[0].temperature - 0.1).abs() < 1e-9);
        assert!(seen[0].user.contains("'Auto-refund'"));
    }

    #[tokio::test]
    async fn failures_fall_back_to_deterministic_text() {
        let (enricher, _) = enricher(None);
        let rules = ResolutionRuleTable::standard();

        for category in Category::ALL {
            let explanation = enricher.explain("anything", category).await;
            assert!(explanation.is_fallback());
            assert_eq!(
                explanation.text(),
                format!("Classified as {category} based on semantic analysis.")
            );

            let justification = enricher
                .justify("anything", category, rules.action(category))
                .await;
            assert!(justification.is_fallback());
            assert_eq!(justification.text(), rules.justification(category));
        }
    }

    #[tokio::test]
    async fn fallback_reason_carries_the_error() {
        let (enricher, _) = enricher(None);
        match enricher.explain("x", Category::Fraud).await {
            Enrichment::Fallback { reason, .. } => assert!(reason.contains("quota exceeded")),
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_description_is_sent_as_is() {
        let (enricher, client) = enricher(Some("No detail was provided."));
        let out = enricher.explain("", Category::Others).await;
        assert_eq!(out.text(), "No detail was provided.");
        assert!(client.seen.lock().unwrap()[0].user.contains("\"\""));
    }

    #[tokio::test]
    async fn http_server_error_falls_back() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "temperature": 0.0 })))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ChatCompletionsClient::new(ChatCompletionsConfig {
            api_key: "test-key".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: mock_server.uri(),
            timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_delay_ms: 10,
        })
        .unwrap();
        let enricher = NarrativeEnricher::new(
            Arc::new(client),
            ResolutionRuleTable::standard(),
            NarrativeSettings::default(),
        );

        let out = enricher.explain("card stolen", Category::Fraud).await;
        assert!(out.is_fallback());
        assert_eq!(out.text(), "Classified as FRAUD based on semantic analysis.");
    }
}
