//! Natural-language questions over the stored dispute set.
//!
//! Only the contract is fixed here: a question plus read-only table views in,
//! a plain-language answer out. Destructive requests are refused before any
//! external call, and answers that contain code are rejected.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use crate::csv::write_record;
use crate::generation::{CompletionRequest, GenerationError, GenerativeClient};
use crate::models::DisputeRecord;

pub const GREETING_REPLY: &str = "I can only answer questions about the dispute data. \
     Please ask a question like 'How many fraud cases are there?'";

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("refused: {reason}")]
    Refused { reason: String },

    #[error("answer contained code instead of a plain-language reply")]
    CodeInAnswer,

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("invalid guard pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A named, column-labelled table of text cells handed to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Enriched dispute set: classification, status and timestamps.
    pub fn disputes(records: &[DisputeRecord]) -> Self {
        let mut view = Self::new(
            "disputes",
            &[
                "dispute_id",
                "customer_id",
                "txn_id",
                "description",
                "predicted_category",
                "confidence",
                "explanation",
                "suggested_action",
                "status",
                "created_at",
            ],
        );
        view.rows = records
            .iter()
            .map(|r| {
                vec![
                    r.dispute_id.clone(),
                    r.customer_id.clone().unwrap_or_default(),
                    r.txn_id.clone().unwrap_or_default(),
                    r.description.clone(),
                    r.predicted_category.clone(),
                    format!("{:.2}", r.confidence),
                    r.explanation.clone(),
                    r.suggested_action.clone(),
                    r.status.clone(),
                    r.created_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                ]
            })
            .collect();
        view
    }

    /// Resolution set: action and justification per dispute.
    pub fn resolutions(records: &[DisputeRecord]) -> Self {
        let mut view = Self::new("resolutions", &["dispute_id", "suggested_action", "justification"]);
        view.rows = records
            .iter()
            .map(|r| {
                vec![
                    r.dispute_id.clone(),
                    r.suggested_action.clone(),
                    r.justification.clone(),
                ]
            })
            .collect();
        view
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_record(&mut out, &self.columns);
        for row in &self.rows {
            write_record(&mut out, row);
        }
        out
    }
}

#[async_trait]
pub trait QueryAgent: Send + Sync {
    async fn answer(&self, question: &str, views: &[TableView]) -> Result<String, AgentError>;
}

/// Patterns that decide what the agent refuses, short-circuits, or rejects.
#[derive(Debug, Clone)]
struct QueryGuard {
    destructive: Regex,
    greeting: Regex,
    code: Vec<Regex>,
}

impl QueryGuard {
    fn new() -> Result<Self, AgentError> {
        Ok(Self {
            destructive: Regex::new(
                r"(?i)\b(delete|drop|truncate|update|insert|alter|overwrite|remove|erase|wipe|purge|modify|reset)\b",
            )?,
            greeting: Regex::new(
                r"(?i)^\s*(hi|hello|hey|yo|good (morning|afternoon|evening)|how are you)\b[\s!.?,]*(there)?[\s!.?]*$",
            )?,
            code: vec![
                Regex::new(r"```")?,
                Regex::new(r"\bdf\d*\s*\[")?,
                Regex::new(r"\bdf\d*\.\w+\s*\(")?,
                Regex::new(r"\bpd\.\w+\s*\(")?,
                Regex::new(r"(?is)\bselect\b.+\bfrom\b\s+\w+")?,
                Regex::new(r"(?m)^\s*(import|from)\s+\w+")?,
            ],
        })
    }

    fn destructive_verb<'a>(&self, question: &'a str) -> Option<&'a str> {
        self.destructive.find(question).map(|m| m.as_str())
    }

    fn is_greeting(&self, question: &str) -> bool {
        self.greeting.is_match(question)
    }

    fn contains_code(&self, answer: &str) -> bool {
        self.code.iter().any(|re| re.is_match(answer))
    }
}

/// `QueryAgent` backed by a `GenerativeClient`, with the tables inlined as CSV.
pub struct GenerativeQueryAgent {
    client: Arc<dyn GenerativeClient>,
    guard: QueryGuard,
    max_tokens: u32,
}

impl GenerativeQueryAgent {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Result<Self, AgentError> {
        Ok(Self {
            client,
            guard: QueryGuard::new()?,
            max_tokens: 300,
        })
    }

    fn system_prompt() -> &'static str {
        "You are a direct and factual assistant for analyzing financial dispute data.\n\
         Rules:\n\
         1. Answer only from the tables provided. Do not greet the user or make small talk.\n\
         2. If the message is a greeting or not a question about the data, reply exactly: \
         \"I can only answer questions about the dispute data. Please ask a question like \
         'How many fraud cases are there?'\"\n\
         3. Never include code, queries, or raw tables in the answer. Reply with a clear \
         sentence or a short summarized list, for example \"There are 3 fraud cases.\"\n\
         4. The status column holds OPEN, IN_REVIEW, RESOLVED or CLOSED. \"Unresolved\" means \
         the status is neither RESOLVED nor CLOSED.\n\
         5. \"Duplicates\" refers to predicted_category DUPLICATE_CHARGE; \"fraud\" refers to \
         predicted_category FRAUD.\n\
         6. You cannot change the data. Never claim to have modified, deleted or added rows."
    }

    fn user_prompt(question: &str, views: &[TableView]) -> String {
        let mut prompt = String::new();
        for view in views {
            prompt.push_str(&format!(
                "Table `{}` ({} rows):\n{}\n",
                view.name,
                view.rows.len(),
                view.to_csv()
            ));
        }
        prompt.push_str(&format!("Question: {question}"));
        prompt
    }
}

#[async_trait]
impl QueryAgent for GenerativeQueryAgent {
    async fn answer(&self, question: &str, views: &[TableView]) -> Result<String, AgentError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::EmptyQuestion);
        }
        if let Some(verb) = self.guard.destructive_verb(question) {
            warn!(verb, "refusing destructive question");
            return Err(AgentError::Refused {
                reason: format!("the dispute data is read-only here ('{verb}' requested)"),
            });
        }
        if self.guard.is_greeting(question) {
            return Ok(GREETING_REPLY.to_string());
        }

        let request = CompletionRequest {
            system: Self::system_prompt().to_string(),
            user: Self::user_prompt(question, views),
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };
        let answer = self.client.complete(&request).await?;

        if self.guard.contains_code(&answer) {
            warn!(client = self.client.name(), "answer contained code, discarding");
            return Err(AgentError::CodeInAnswer);
        }
        info!(tables = views.len(), "answered dispute question");
        Ok(answer)
    }
}
