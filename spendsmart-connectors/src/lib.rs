//! spendsmart-connectors: Plaid fetcher, Gemini categorizer, Sheets syncer,
//! and the shared retry/backoff helper.

pub mod gemini;
pub mod plaid;
pub mod retry;
pub mod sheets;

pub use gemini::GeminiClient;
pub use plaid::{PlaidClient, PlaidEnv};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sheets::SheetsClient;
