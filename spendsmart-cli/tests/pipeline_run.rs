//! End-to-end pipeline scenarios against fake upstreams and in-memory SQLite.

use chrono::NaiveDate;
use spendsmart_cli::pipeline::{
    run_pipeline, Categorizer, PipelineOptions, SheetSink, TransactionSource,
};
use spendsmart_connectors::retry::RetryPolicy;
use spendsmart_core::category::{Categorization, Category};
use spendsmart_core::error::{Result, SpendError};
use spendsmart_core::transaction::Transaction;
use spendsmart_store::{Store, StoredTransaction};
use std::collections::HashMap;
use std::sync::Mutex;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
}

fn tx(id: &str, name: &str, cents: i64) -> Transaction {
    Transaction {
        external_id: id.to_string(),
        account_id: "acct-1".to_string(),
        amount_cents: cents,
        currency: "USD".to_string(),
        name: name.to_string(),
        merchant_name: None,
        description: None,
        posted: date(12),
        pending: false,
        raw: serde_json::Value::Null,
    }
}

struct Bank(Vec<Transaction>);

impl TransactionSource for Bank {
    async fn fetch(&self, _s: NaiveDate, _e: NaiveDate) -> Result<Vec<Transaction>> {
        Ok(self.0.clone())
    }
}

/// Fixed id -> category mapping; unknown ids time out like a dead model.
struct Model(HashMap<String, Category>);

impl Categorizer for Model {
    async fn categorize_all(
        &self,
        txns: &[Transaction],
        _concurrency: usize,
    ) -> Vec<Result<Categorization>> {
        txns.iter()
            .map(|t| match self.0.get(&t.external_id) {
                Some(&category) => Ok(Categorization {
                    category,
                    subcategory: String::new(),
                    confidence: 0.9,
                }),
                None => Err(SpendError::upstream("gemini", "timeout after retries")),
            })
            .collect()
    }
}

/// In-memory spreadsheet keyed by external id, optionally rejecting some ids.
struct Sheet {
    rows: Mutex<Vec<String>>,
    reject: Vec<String>,
}

impl Sheet {
    fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            reject: Vec::new(),
        }
    }
}

impl SheetSink for Sheet {
    async fn push(&self, rows: &[StoredTransaction]) -> Result<Vec<String>> {
        let mut sheet = self.rows.lock().unwrap();
        let mut acked = Vec::new();
        for row in rows {
            let id = row.transaction.external_id.clone();
            if self.reject.contains(&id) {
                continue;
            }
            if !sheet.contains(&id) {
                sheet.push(id.clone());
            }
            acked.push(id);
        }
        Ok(acked)
    }
}

fn opts() -> PipelineOptions {
    PipelineOptions {
        concurrency: 1,
        retry: RetryPolicy {
            attempts: 3,
            initial_delay: std::time::Duration::from_millis(1),
        },
    }
}

fn abc_model() -> Model {
    Model(HashMap::from([
        ("A".to_string(), Category::FoodAndDining),
        ("B".to_string(), Category::Transportation),
        ("C".to_string(), Category::FoodAndDining),
    ]))
}

fn abc_bank() -> Bank {
    Bank(vec![
        tx("A", "WAKABA JAPANESE", 3730),
        tx("B", "CLIPPER SYSTEMS", 1000),
        tx("C", "TRADER JOES", 5421),
    ])
}

#[tokio::test]
async fn abc_run_then_rerun_writes_nothing_new() {
    let bank = abc_bank();
    let model = abc_model();
    let store = Store::open_in_memory().unwrap();
    let sheet = Sheet::new();

    let first = run_pipeline(&bank, &model, &store, Some(&sheet), date(1), date(30), &opts())
        .await
        .unwrap();
    assert_eq!(first.fetched, 3);
    assert_eq!(first.persisted, 3);
    assert_eq!(first.synced, 3);
    assert_eq!(store.count().unwrap(), 3);
    assert_eq!(sheet.rows.lock().unwrap().len(), 3);

    // Re-run over the same window: 0 new rows, 0 new spreadsheet writes
    let second = run_pipeline(&bank, &model, &store, Some(&sheet), date(1), date(30), &opts())
        .await
        .unwrap();
    assert_eq!(second.new, 0);
    assert_eq!(second.persisted, 0);
    assert_eq!(second.synced, 0);
    assert_eq!(store.count().unwrap(), 3);
    assert_eq!(sheet.rows.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn overlapping_windows_keep_distinct_external_ids() {
    let store = Store::open_in_memory().unwrap();
    let model = Model(HashMap::from([
        ("A".to_string(), Category::FoodAndDining),
        ("B".to_string(), Category::FoodAndDining),
        ("C".to_string(), Category::FoodAndDining),
        ("D".to_string(), Category::FoodAndDining),
    ]));
    let sheet = Sheet::new();

    let week_one = Bank(vec![tx("A", "x", 1), tx("B", "y", 2), tx("C", "z", 3)]);
    let week_two = Bank(vec![tx("B", "y", 2), tx("C", "z", 3), tx("D", "w", 4)]);

    run_pipeline(&week_one, &model, &store, Some(&sheet), date(1), date(7), &opts())
        .await
        .unwrap();
    run_pipeline(&week_two, &model, &store, Some(&sheet), date(5), date(14), &opts())
        .await
        .unwrap();

    // 4 distinct external ids across both windows
    assert_eq!(store.count().unwrap(), 4);
    assert_eq!(sheet.rows.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn model_timeout_on_b_persists_other_and_continues() {
    let bank = abc_bank();
    // B is missing from the mapping: every call for it times out
    let model = Model(HashMap::from([
        ("A".to_string(), Category::FoodAndDining),
        ("C".to_string(), Category::FoodAndDining),
    ]));
    let store = Store::open_in_memory().unwrap();
    let sheet = Sheet::new();

    let stats = run_pipeline(&bank, &model, &store, Some(&sheet), date(1), date(30), &opts())
        .await
        .unwrap();

    assert_eq!(stats.persisted, 3, "C must be processed despite B failing");
    assert_eq!(stats.fallback, 1);

    let summary = store.category_summary().unwrap();
    let other = summary.iter().find(|(label, _, _)| label == "Other").unwrap();
    assert_eq!(other.1, 1);
}

#[tokio::test]
async fn sheet_rejects_c_then_next_run_retries_only_c() {
    let bank = abc_bank();
    let model = abc_model();
    let store = Store::open_in_memory().unwrap();
    let mut sheet = Sheet::new();
    sheet.reject = vec!["C".to_string()];

    let first = run_pipeline(&bank, &model, &store, Some(&sheet), date(1), date(30), &opts())
        .await
        .unwrap();
    assert_eq!(first.synced, 2);

    let unsynced = store.unsynced().unwrap();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].transaction.external_id, "C");

    sheet.reject.clear();
    let second = run_pipeline(&bank, &model, &store, Some(&sheet), date(1), date(30), &opts())
        .await
        .unwrap();
    assert_eq!(second.synced, 1);
    assert!(store.unsynced().unwrap().is_empty());

    let rows = sheet.rows.lock().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|id| *id == "C").count(), 1);
}
