use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of dispute categories the classifier is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    DuplicateCharge,
    FailedTransaction,
    Fraud,
    RefundPending,
    Others,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::DuplicateCharge,
        Category::FailedTransaction,
        Category::Fraud,
        Category::RefundPending,
        Category::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateCharge => "DUPLICATE_CHARGE",
            Self::FailedTransaction => "FAILED_TRANSACTION",
            Self::Fraud => "FRAUD",
            Self::RefundPending => "REFUND_PENDING",
            Self::Others => "OTHERS",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label string that is not one of the five known categories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dispute category: {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_label() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
    }

    #[test]
    fn rejects_unknown_and_differently_cased_labels() {
        assert_eq!(
            "CHARGEBACK".parse::<Category>(),
            Err(UnknownCategory("CHARGEBACK".to_string()))
        );
        assert!("fraud".parse::<Category>().is_err());
        assert!("".parse::<Category>().is_err());
    }

    #[test]
    fn serde_uses_wire_labels() {
        let json = serde_json::to_string(&Category::RefundPending).unwrap();
        assert_eq!(json, "\"REFUND_PENDING\"");
        let back: Category = serde_json::from_str("\"FAILED_TRANSACTION\"").unwrap();
        assert_eq!(back, Category::FailedTransaction);
    }
}
