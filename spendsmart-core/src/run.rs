//! Per-run statistics reported after the pipeline finishes

use crate::category::Category;
use std::collections::HashMap;

/// Counters accumulated across one pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Transactions returned by the banking API for the window
    pub fetched: usize,
    /// Of those, how many had unseen external ids
    pub new: usize,
    /// Successfully categorized by the model
    pub categorized: usize,
    /// Fell back to Other after call failure or unrecognized output
    pub fallback: usize,
    /// Rows upserted into storage
    pub persisted: usize,
    /// Rows acknowledged by the spreadsheet this run
    pub synced: usize,
    /// Sum of model confidences, for averaging
    pub confidence_total: f64,
    /// Distinct categories assigned this run
    pub categories_used: HashMap<Category, usize>,
}

impl RunStats {
    pub fn record_categorization(&mut self, category: Category, confidence: f64, fell_back: bool) {
        if fell_back {
            self.fallback += 1;
        } else {
            self.categorized += 1;
        }
        self.confidence_total += confidence;
        *self.categories_used.entry(category).or_insert(0) += 1;
    }

    /// Average model confidence over everything categorized this run
    pub fn average_confidence(&self) -> f64 {
        let n = self.categorized + self.fallback;
        if n == 0 {
            return 0.0;
        }
        self.confidence_total / n as f64
    }

    /// Human-readable summary block, printed after a run
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&"=".repeat(50));
        out.push_str("\nSpendSmart Processing Summary\n");
        out.push_str(&"=".repeat(50));
        out.push_str(&format!("\nTotal transactions fetched: {}", self.fetched));
        out.push_str(&format!("\nNew transactions processed: {}", self.new));
        out.push_str(&format!("\nCategorized: {}", self.categorized));
        out.push_str(&format!("\nFell back to Other: {}", self.fallback));
        out.push_str(&format!(
            "\nAverage confidence: {:.0}%",
            self.average_confidence() * 100.0
        ));
        out.push_str(&format!("\nCategories used: {}", self.categories_used.len()));
        out.push_str(&format!("\nSynced to Google Sheets: {}", self.synced));
        out.push('\n');
        out.push_str(&"=".repeat(50));
        out
    }
}
