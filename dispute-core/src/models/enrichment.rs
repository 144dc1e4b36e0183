use serde::{Deserialize, Serialize};

/// Outcome of one narrative-generation call.
///
/// `Generated` carries what the model actually said; `Fallback` carries the
/// deterministic substitute and the reason the call did not produce text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Enrichment {
    Generated { text: String },
    Fallback { text: String, reason: String },
}

impl Enrichment {
    pub fn generated(text: impl Into<String>) -> Self {
        Self::Generated { text: text.into() }
    }

    pub fn fallback(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fallback {
            text: text.into(),
            reason: reason.into(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Generated { text } | Self::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Generated { text } | Self::Fallback { text, .. } => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_available_for_both_variants() {
        let generated = Enrichment::generated("model output");
        let fallback = Enrichment::fallback("default text", "HTTP 500");

        assert_eq!(generated.text(), "model output");
        assert!(!generated.is_fallback());
        assert_eq!(fallback.text(), "default text");
        assert!(fallback.is_fallback());
        assert_eq!(fallback.into_text(), "default text");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let value = serde_json::to_value(Enrichment::fallback("t", "timeout")).unwrap();
        assert_eq!(value["kind"], "fallback");
        assert_eq!(value["reason"], "timeout");
    }
}
