//! Pipeline orchestrator: fetch -> categorize -> persist -> sync.
//!
//! Every stage is idempotent and keyed on the external transaction id, so a
//! failed run leaves nothing to roll back; re-running the same window simply
//! resumes. The trait seams exist so tests can drive the state machine with
//! fake upstreams.

use std::future::Future;

use chrono::NaiveDate;
use spendsmart_connectors::retry::{retry_with_backoff, RetryPolicy};
use spendsmart_connectors::{GeminiClient, PlaidClient, SheetsClient};
use spendsmart_core::category::Categorization;
use spendsmart_core::error::{Result, SpendError, Stage, StageError};
use spendsmart_core::run::RunStats;
use spendsmart_core::transaction::Transaction;
use spendsmart_store::{Store, StoredTransaction};

/// Where transactions come from (Plaid in production)
pub trait TransactionSource {
    fn fetch(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<Transaction>>>;
}

/// Assigns a category to each transaction (Gemini in production).
/// Results must come back in input order; a failed element yields Err at
/// its own index rather than poisoning the batch.
pub trait Categorizer {
    fn categorize_all(
        &self,
        txns: &[Transaction],
        concurrency: usize,
    ) -> impl Future<Output = Vec<Result<Categorization>>>;
}

/// Mirrors persisted rows to the spreadsheet (Google Sheets in production).
/// Returns the external ids the spreadsheet acknowledged; only those get
/// their sync flag flipped.
pub trait SheetSink {
    fn push(
        &self,
        rows: &[StoredTransaction],
    ) -> impl Future<Output = Result<Vec<String>>>;
}

impl TransactionSource for PlaidClient {
    async fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Transaction>> {
        self.fetch_window(start, end).await
    }
}

impl Categorizer for GeminiClient {
    async fn categorize_all(
        &self,
        txns: &[Transaction],
        concurrency: usize,
    ) -> Vec<Result<Categorization>> {
        GeminiClient::categorize_all(self, txns, concurrency).await
    }
}

impl SheetSink for SheetsClient {
    async fn push(&self, rows: &[StoredTransaction]) -> Result<Vec<String>> {
        SheetsClient::push(self, rows).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Categorization worker pool size; 1 means strictly sequential
    pub concurrency: usize,
    /// Backoff policy for the fetch stage
    pub retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

/// Run the full pipeline over one date window. Terminal states: Ok(stats)
/// for Done, Err(StageError) capturing which stage aborted. Prior stages
/// are never rolled back.
pub async fn run_pipeline<S, C, K>(
    source: &S,
    categorizer: &C,
    store: &Store,
    sink: Option<&K>,
    start: NaiveDate,
    end: NaiveDate,
    opts: &PipelineOptions,
) -> std::result::Result<RunStats, StageError>
where
    S: TransactionSource,
    C: Categorizer,
    K: SheetSink,
{
    let mut stats = RunStats::default();

    // Fetching
    println!("Fetching transactions from Plaid ({start} to {end})...");
    let fetched = retry_with_backoff(opts.retry, "plaid", || source.fetch(start, end))
        .await
        .map_err(|e| StageError::new(Stage::Fetching, e))?;
    stats.fetched = fetched.len();
    println!("Fetched {} transactions", fetched.len());

    // Categorizing: only unseen external ids go to the model
    let existing = store
        .existing_ids()
        .map_err(|e| StageError::new(Stage::Categorizing, e))?;
    let new: Vec<Transaction> = fetched
        .into_iter()
        .filter(|t| !existing.contains(&t.external_id))
        .collect();
    stats.new = new.len();
    println!("{} new transactions to categorize", new.len());

    let mut categorized: Vec<(Transaction, Categorization)> = Vec::with_capacity(new.len());
    if !new.is_empty() {
        let results = categorizer.categorize_all(&new, opts.concurrency).await;
        for (tx, result) in new.into_iter().zip(results) {
            let (cat, fell_back) = match result {
                Ok(c) => (c, false),
                Err(e) => {
                    eprintln!("categorizing {}: {e}; defaulting to Other", tx.external_id);
                    (Categorization::fallback(), true)
                }
            };
            stats.record_categorization(cat.category, cat.confidence, fell_back);
            categorized.push((tx, cat));
        }
    }

    // Persisting: idempotent upserts, storage loss is fatal for the run
    for (tx, cat) in &categorized {
        store
            .upsert(tx, cat)
            .map_err(|e| StageError::new(Stage::Persisting, e))?;
        stats.persisted += 1;
    }
    println!("Stored {} transactions", stats.persisted);

    // Syncing: push unsynced rows, flip flags only for acknowledged ids
    match sink {
        None => println!("Spreadsheet sync disabled; skipping"),
        Some(sink) => {
            let unsynced = store
                .unsynced()
                .map_err(|e| StageError::new(Stage::Syncing, e))?;
            if unsynced.is_empty() {
                println!("Nothing to sync");
            } else {
                println!("Syncing {} transactions to Google Sheets...", unsynced.len());
                let acked = sink
                    .push(&unsynced)
                    .await
                    .map_err(|e| StageError::new(Stage::Syncing, e))?;
                for id in &acked {
                    store
                        .mark_synced(id)
                        .map_err(|e| StageError::new(Stage::Syncing, e))?;
                }
                stats.synced = acked.len();
                if acked.len() < unsynced.len() {
                    eprintln!(
                        "{} rows were not acknowledged; they stay unsynced for the next run",
                        unsynced.len() - acked.len()
                    );
                }
            }
        }
    }

    Ok(stats)
}

/// A sink that refuses everything, used when sync is disabled. The `None`
/// arm never calls it; this only pins down the generic parameter.
pub struct NoSheets;

impl SheetSink for NoSheets {
    async fn push(&self, _rows: &[StoredTransaction]) -> Result<Vec<String>> {
        Err(SpendError::SyncFailure("sync disabled".to_string()))
    }
}
