//! Category → resolution rule table.
//!
//! The table is the authoritative source for `suggested_action` and the
//! fallback justification. Lookup is an exhaustive `match` on [`Category`],
//! so there is no miss case at runtime.

use crate::models::Category;

/// Suggested action plus the default justification for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionRule {
    pub action: &'static str,
    pub justification: &'static str,
}

static DUPLICATE_CHARGE: ResolutionRule = ResolutionRule {
    action: "Auto-refund",
    justification: "System detected a duplicate charge, qualifying for an automatic refund.",
};

static FAILED_TRANSACTION: ResolutionRule = ResolutionRule {
    action: "Manual review",
    justification:
        "Transaction failed but the customer was debited. This requires manual investigation.",
};

static FRAUD: ResolutionRule = ResolutionRule {
    action: "Mark as potential fraud",
    justification: "The transaction was flagged as fraudulent by the customer and must be reviewed by the fraud team.",
};

static REFUND_PENDING: ResolutionRule = ResolutionRule {
    action: "Ask for more info",
    justification: "Customer is waiting for a refund. An agent needs to check the status and provide an update.",
};

static OTHERS: ResolutionRule = ResolutionRule {
    action: "Manual review",
    justification:
        "The dispute does not fit a standard category and requires a manual agent review.",
};

/// Static mapping from category to resolution rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionRuleTable;

impl ResolutionRuleTable {
    pub fn standard() -> Self {
        Self
    }

    pub fn get(&self, category: Category) -> &'static ResolutionRule {
        match category {
            Category::DuplicateCharge => &DUPLICATE_CHARGE,
            Category::FailedTransaction => &FAILED_TRANSACTION,
            Category::Fraud => &FRAUD,
            Category::RefundPending => &REFUND_PENDING,
            Category::Others => &OTHERS,
        }
    }

    pub fn action(&self, category: Category) -> &'static str {
        self.get(category).action
    }

    pub fn justification(&self, category: Category) -> &'static str {
        self.get(category).justification
    }
}
