//! Plaid `/transactions/get` client: paginated fetch over a date window,
//! normalized into domain transactions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spendsmart_core::error::{Result, SpendError};
use spendsmart_core::transaction::{dedup_by_external_id, to_cents, Transaction};

/// Page size for pagination; Plaid caps count at 500.
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaidEnv {
    Sandbox,
    Development,
    Production,
}

impl PlaidEnv {
    pub fn base_url(&self) -> &'static str {
        match self {
            PlaidEnv::Sandbox => "https://sandbox.plaid.com",
            PlaidEnv::Development => "https://development.plaid.com",
            PlaidEnv::Production => "https://production.plaid.com",
        }
    }

    pub fn parse(s: &str) -> Result<PlaidEnv> {
        match s.to_lowercase().as_str() {
            "sandbox" => Ok(PlaidEnv::Sandbox),
            "development" => Ok(PlaidEnv::Development),
            "production" => Ok(PlaidEnv::Production),
            other => Err(SpendError::Config(format!(
                "unknown PLAID_ENV {other:?} (expected sandbox, development, or production)"
            ))),
        }
    }
}

pub struct PlaidClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: String,
    access_token: String,
}

#[derive(Serialize)]
struct TransactionsGetRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
    start_date: String,
    end_date: String,
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    count: u32,
    offset: u32,
}

#[derive(Deserialize)]
struct PlaidErrorBody {
    error_code: Option<String>,
    error_message: Option<String>,
}

/// The subset of a Plaid transaction object we consume. The full object is
/// kept verbatim as the raw payload.
#[derive(Debug, Deserialize)]
struct PlaidTransaction {
    transaction_id: String,
    account_id: String,
    amount: f64,
    iso_currency_code: Option<String>,
    date: String,
    name: String,
    merchant_name: Option<String>,
    original_description: Option<String>,
    #[serde(default)]
    pending: bool,
}

impl PlaidClient {
    pub fn new(env: PlaidEnv, client_id: String, secret: String, access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: env.base_url().to_string(),
            client_id,
            secret,
            access_token,
        }
    }

    /// Fetch every transaction in `[start, end]`, paginating until
    /// `total_transactions` is exhausted. Output is deduplicated by
    /// external id within the batch.
    pub async fn fetch_window(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Transaction>> {
        let mut all: Vec<Transaction> = Vec::new();
        let mut offset = 0u32;

        loop {
            let page = self.fetch_page(start, end, offset).await?;
            let (txns, total) = parse_page(&page)?;
            let fetched = txns.len() as u32;
            all.extend(txns);

            offset += fetched;
            if u64::from(offset) >= total || fetched == 0 {
                break;
            }
        }

        Ok(dedup_by_external_id(all))
    }

    async fn fetch_page(&self, start: NaiveDate, end: NaiveDate, offset: u32) -> Result<Value> {
        let body = TransactionsGetRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            access_token: &self.access_token,
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
            options: RequestOptions {
                count: PAGE_SIZE,
                offset,
            },
        };

        let resp = self
            .http
            .post(format!("{}/transactions/get", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SpendError::upstream("plaid", e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<PlaidErrorBody>(&text) {
                Ok(err) => format!(
                    "{} ({})",
                    err.error_message.unwrap_or_else(|| text.clone()),
                    err.error_code.unwrap_or_else(|| status.to_string())
                ),
                Err(_) => format!("{status} {text}"),
            };
            return Err(SpendError::upstream("plaid", reason));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| SpendError::upstream("plaid", format!("bad response body: {e}")))
    }
}

/// Split one `/transactions/get` response into normalized transactions plus
/// the server-reported total for pagination.
fn parse_page(body: &Value) -> Result<(Vec<Transaction>, u64)> {
    let total = body
        .get("total_transactions")
        .and_then(Value::as_u64)
        .ok_or_else(|| SpendError::upstream("plaid", "response missing total_transactions"))?;

    let raw_txns = body
        .get("transactions")
        .and_then(Value::as_array)
        .ok_or_else(|| SpendError::upstream("plaid", "response missing transactions"))?;

    let mut txns = Vec::with_capacity(raw_txns.len());
    for raw in raw_txns {
        txns.push(to_transaction(raw)?);
    }
    Ok((txns, total))
}

/// Normalize one raw Plaid transaction object, keeping the original
/// payload attached.
fn to_transaction(raw: &Value) -> Result<Transaction> {
    let parsed: PlaidTransaction = serde_json::from_value(raw.clone())
        .map_err(|e| SpendError::upstream("plaid", format!("malformed transaction: {e}")))?;

    let posted = NaiveDate::parse_from_str(&parsed.date, "%Y-%m-%d").map_err(|e| {
        SpendError::upstream("plaid", format!("bad date {:?}: {e}", parsed.date))
    })?;

    Ok(Transaction {
        external_id: parsed.transaction_id,
        account_id: parsed.account_id,
        amount_cents: to_cents(parsed.amount),
        currency: parsed.iso_currency_code.unwrap_or_else(|| "USD".to_string()),
        name: parsed.name,
        merchant_name: parsed.merchant_name,
        description: parsed.original_description,
        posted,
        pending: parsed.pending,
        raw: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plaid_tx(id: &str, amount: f64) -> Value {
        json!({
            "transaction_id": id,
            "account_id": "acct-1",
            "amount": amount,
            "iso_currency_code": "USD",
            "date": "2026-08-15",
            "name": "STARBUCKS #1234",
            "merchant_name": "Starbucks",
            "original_description": "STARBUCKS STORE 1234",
            "pending": false
        })
    }

    #[test]
    fn test_env_base_urls() {
        assert_eq!(PlaidEnv::Sandbox.base_url(), "https://sandbox.plaid.com");
        assert_eq!(
            PlaidEnv::Production.base_url(),
            "https://production.plaid.com"
        );
        assert_eq!(PlaidEnv::parse("SANDBOX").unwrap(), PlaidEnv::Sandbox);
        assert!(PlaidEnv::parse("staging").is_err());
    }

    #[test]
    fn test_to_transaction_normalizes() {
        let raw = plaid_tx("tx-1", 4.005);
        let tx = to_transaction(&raw).unwrap();
        assert_eq!(tx.external_id, "tx-1");
        assert_eq!(tx.amount_cents, 401);
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.merchant_name.as_deref(), Some("Starbucks"));
        assert_eq!(tx.posted, NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());
        assert_eq!(tx.raw, raw);
    }

    #[test]
    fn test_to_transaction_defaults() {
        let raw = json!({
            "transaction_id": "tx-2",
            "account_id": "acct-1",
            "amount": -12.5,
            "iso_currency_code": null,
            "date": "2026-08-15",
            "name": "REFUND"
        });
        let tx = to_transaction(&raw).unwrap();
        assert_eq!(tx.amount_cents, -1250);
        assert_eq!(tx.currency, "USD");
        assert!(!tx.pending);
        assert!(tx.merchant_name.is_none());
    }

    #[test]
    fn test_to_transaction_bad_date() {
        let raw = json!({
            "transaction_id": "tx-3",
            "account_id": "acct-1",
            "amount": 1.0,
            "date": "08/15/2026",
            "name": "X"
        });
        assert!(to_transaction(&raw).is_err());
    }

    #[test]
    fn test_parse_page() {
        let body = json!({
            "transactions": [plaid_tx("a", 1.0), plaid_tx("b", 2.0)],
            "total_transactions": 5
        });
        let (txns, total) = parse_page(&body).unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(total, 5);
    }

    #[test]
    fn test_parse_page_missing_total() {
        let body = json!({"transactions": []});
        assert!(parse_page(&body).is_err());
    }
}
