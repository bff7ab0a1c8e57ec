//! Bank transaction types, normalized from the Plaid wire format

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A bank transaction as fetched from the source system.
///
/// Immutable once fetched; category assignment lives alongside the
/// transaction in storage, not on this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Source-system-assigned unique id; the dedup key across every stage
    pub external_id: String,
    /// Account the transaction was posted against
    pub account_id: String,
    /// Signed amount in minor units (cents). Positive = money out,
    /// negative = credit/refund (Plaid convention).
    pub amount_cents: i64,
    /// ISO 4217 currency code
    pub currency: String,
    /// Counterparty name as reported by the bank
    pub name: String,
    pub merchant_name: Option<String>,
    /// Original statement description, when the source provides one
    pub description: Option<String>,
    /// Date the transaction posted
    pub posted: NaiveDate,
    pub pending: bool,
    /// Raw source payload, kept verbatim for audit/reprocessing
    pub raw: serde_json::Value,
}

impl Transaction {
    /// Amount in major units, for display only
    pub fn amount(&self) -> f64 {
        self.amount_cents as f64 / 100.0
    }

    /// Returns true if this is an expense (money out)
    pub fn is_expense(&self) -> bool {
        self.amount_cents > 0
    }

    /// Best text to hand to the categorizer: merchant name when present,
    /// else the bank's counterparty name.
    pub fn display_name(&self) -> &str {
        self.merchant_name.as_deref().unwrap_or(&self.name)
    }
}

/// Convert a major-unit amount (as reported by Plaid) to signed cents.
/// Rounds half-away-from-zero so e.g. 4.005 becomes 401, -4.005 becomes -401.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Drop duplicate external ids from a batch, keeping first occurrence order.
pub fn dedup_by_external_id(txns: Vec<Transaction>) -> Vec<Transaction> {
    let mut seen = std::collections::HashSet::new();
    txns.into_iter()
        .filter(|t| seen.insert(t.external_id.clone()))
        .collect()
}
