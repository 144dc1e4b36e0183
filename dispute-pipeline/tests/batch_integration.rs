//! End-to-end batch runs through `classify_file` with stubbed inference
//! stages and a mock chat completions server.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispute_core::{
    batch::OutputPaths,
    config::OutputConfig,
    inference::{
        CategoryClassifier, DimensionalityReducer, InferenceError, InferenceModels, RawPrediction,
        TextEncoder,
    },
    ChatCompletionsClient, ChatCompletionsConfig, CompletionRequest, EnrichmentScheduler,
    GenerationError, GenerativeClient, NarrativeEnricher, NarrativeSettings, PipelineOrchestrator,
    ResolutionRuleTable,
};
use dispute_pipeline::subsystems::classify::classify_file;
use ndarray::{Array2, ArrayView2};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Stubs
// ============================================================================

struct ZeroEncoder;

impl TextEncoder for ZeroEncoder {
    fn encode(&self, texts: &[&str]) -> Result<Array2<f32>, InferenceError> {
        Ok(Array2::zeros((texts.len(), 3)))
    }
    fn dimensions(&self) -> usize {
        3
    }
    fn name(&self) -> &str {
        "zero"
    }
}

struct PassThrough;

impl DimensionalityReducer for PassThrough {
    fn reduce(&self, vectors: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        Ok(vectors.to_owned())
    }
    fn input_dim(&self) -> usize {
        3
    }
    fn output_dim(&self) -> usize {
        3
    }
}

/// Cycles through fixed predictions by row.
struct Scripted(Vec<(&'static str, f32)>);

impl CategoryClassifier for Scripted {
    fn classify(&self, features: ArrayView2<'_, f32>) -> Result<Vec<RawPrediction>, InferenceError> {
        Ok((0..features.nrows())
            .map(|i| {
                let (label, confidence) = self.0[i % self.0.len()];
                RawPrediction::new(label, confidence)
            })
            .collect())
    }
    fn input_dim(&self) -> usize {
        3
    }
}

/// Fixed replies for explain and justify, told apart by token budget.
struct FixedReplies {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerativeClient for FixedReplies {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.max_tokens == 70 {
            Ok("The customer says they were charged twice.".to_string())
        } else {
            Ok("A duplicate charge qualifies for an automatic refund.".to_string())
        }
    }
    fn name(&self) -> &str {
        "fixed"
    }
}

fn orchestrator(
    script: Vec<(&'static str, f32)>,
    client: Arc<dyn GenerativeClient>,
    workers: usize,
) -> PipelineOrchestrator {
    let models = InferenceModels::new(
        Arc::new(ZeroEncoder),
        Arc::new(PassThrough),
        Arc::new(Scripted(script)),
    )
    .expect("stub stages fit together");
    let enricher = NarrativeEnricher::new(
        client,
        ResolutionRuleTable::standard(),
        NarrativeSettings::default(),
    );
    PipelineOrchestrator::new(models, enricher, EnrichmentScheduler::new(workers))
}

fn write_input(dir: &Path, body: &str) -> std::path::PathBuf {
    let input = dir.join("disputes.csv");
    std::fs::write(&input, body).unwrap();
    input
}

fn outputs(dir: &Path) -> OutputPaths {
    OutputPaths::in_dir(dir, &OutputConfig::default())
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_duplicate_charge_row_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        "dispute_id,description\nD1,charged twice for same purchase\n",
    );
    let client = Arc::new(FixedReplies {
        calls: AtomicUsize::new(0),
    });
    let pipeline = orchestrator(vec![("DUPLICATE_CHARGE", 0.91)], client.clone(), 10);
    let out = outputs(dir.path());

    let summary = classify_file(&pipeline, &input, &out).await.unwrap();
    assert_eq!(summary.rows, 1);
    assert_eq!(summary.explanation_fallbacks, 0);
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);

    assert_eq!(
        read_lines(&out.classification),
        vec![
            "dispute_id,predicted_category,confidence,explanation",
            "D1,DUPLICATE_CHARGE,0.91,The customer says they were charged twice.",
        ]
    );
    assert_eq!(
        read_lines(&out.resolution),
        vec![
            "dispute_id,suggested_action,justification",
            "D1,Auto-refund,A duplicate charge qualifies for an automatic refund.",
        ]
    );
}

#[tokio::test]
async fn test_failing_generation_server_yields_fallback_text() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
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

    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        "dispute_id,description\nA1,card stolen\nA2,refund not received\nA3,\n",
    );
    let pipeline = orchestrator(
        vec![("FRAUD", 0.8), ("REFUND_PENDING", 0.64), ("OTHERS", 0.333)],
        Arc::new(client),
        2,
    );
    let out = outputs(dir.path());

    let summary = classify_file(&pipeline, &input, &out).await.unwrap();
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.explanation_fallbacks, 3);
    assert_eq!(summary.justification_fallbacks, 3);

    let rules = ResolutionRuleTable::standard();
    assert_eq!(
        read_lines(&out.classification)[1..],
        [
            "A1,FRAUD,0.80,Classified as FRAUD based on semantic analysis.".to_string(),
            "A2,REFUND_PENDING,0.64,Classified as REFUND_PENDING based on semantic analysis."
                .to_string(),
            "A3,OTHERS,0.33,Classified as OTHERS based on semantic analysis.".to_string(),
        ]
    );
    let resolutions = read_lines(&out.resolution);
    assert_eq!(
        resolutions[1],
        format!(
            "A1,Mark as potential fraud,{}",
            rules.justification(dispute_core::Category::Fraud)
        )
    );
    assert!(resolutions[2].starts_with("A2,Ask for more info,"));
    assert!(resolutions[3].starts_with("A3,Manual review,"));
}

#[tokio::test]
async fn test_unknown_category_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "dispute_id,description\nX1,a\nX2,b\n");
    let client = Arc::new(FixedReplies {
        calls: AtomicUsize::new(0),
    });
    let pipeline = orchestrator(vec![("OTHERS", 0.5), ("CHARGEBACK", 0.9)], client.clone(), 10);
    let out = outputs(dir.path());

    let err = classify_file(&pipeline, &input, &out).await.unwrap_err();
    assert!(format!("{err:#}").contains("CHARGEBACK"), "{err:#}");
    assert!(!out.classification.exists());
    assert!(!out.resolution.exists());
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_row_order_matches_input_for_any_worker_bound() {
    let mut body = String::from("description,dispute_id\n");
    for i in 0..120 {
        body.push_str(&format!("text {i},ID-{i:03}\n"));
    }
    let script = vec![("FRAUD", 0.7), ("DUPLICATE_CHARGE", 0.95), ("OTHERS", 0.2)];

    let mut runs = Vec::new();
    for workers in [1, 10] {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), &body);
        let client = Arc::new(FixedReplies {
            calls: AtomicUsize::new(0),
        });
        let pipeline = orchestrator(script.clone(), client, workers);
        let out = outputs(dir.path());
        classify_file(&pipeline, &input, &out).await.unwrap();
        runs.push((read_lines(&out.classification), read_lines(&out.resolution)));
    }

    let expected_ids: Vec<String> = (0..120).map(|i| format!("ID-{i:03}")).collect();
    for (classification, resolution) in &runs {
        let ids: Vec<String> = classification[1..]
            .iter()
            .map(|l| l.split(',').next().unwrap().to_string())
            .collect();
        assert_eq!(ids, expected_ids);
        let ids: Vec<String> = resolution[1..]
            .iter()
            .map(|l| l.split(',').next().unwrap().to_string())
            .collect();
        assert_eq!(ids, expected_ids);
    }
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn test_header_only_input_writes_header_only_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "dispute_id,description\n");
    let client = Arc::new(FixedReplies {
        calls: AtomicUsize::new(0),
    });
    let pipeline = orchestrator(vec![("OTHERS", 0.5)], client.clone(), 10);
    let out = outputs(dir.path());

    let summary = classify_file(&pipeline, &input, &out).await.unwrap();
    assert_eq!(summary.rows, 0);
    assert_eq!(read_lines(&out.classification).len(), 1);
    assert_eq!(read_lines(&out.resolution).len(), 1);
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_input_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(FixedReplies {
        calls: AtomicUsize::new(0),
    });
    let pipeline = orchestrator(vec![("OTHERS", 0.5)], client, 10);
    let out = outputs(dir.path());

    assert!(classify_file(&pipeline, &dir.path().join("nope.csv"), &out)
        .await
        .is_err());
    assert!(!out.classification.exists());
}
