//! Google Sheets syncer: installed-app OAuth, one `Transactions` sheet,
//! rows addressed by external transaction id so re-runs never duplicate.

use std::collections::HashSet;
use std::path::Path;

use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, Request, SheetProperties, ValueRange,
};
use google_sheets4::Sheets;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use serde_json::Value;
use spendsmart_core::error::{Result, SpendError};
use spendsmart_store::StoredTransaction;

// IMPORTANT: use the oauth2 version re-exported by google-sheets4 to avoid
// version mismatches.
use google_sheets4::oauth2;

pub const SHEET_NAME: &str = "Transactions";

const HEADER: [&str; 9] = [
    "Date",
    "Name",
    "Merchant",
    "Amount",
    "Category",
    "Subcategory",
    "Description",
    "Confidence",
    "Transaction ID",
];

/// Column holding the external id, used for dedup (column I, 1-based 9)
const ID_COLUMN_RANGE: &str = "Transactions!I2:I";

pub struct SheetsClient {
    hub: Sheets<HttpsConnector<HttpConnector>>,
    spreadsheet_id: String,
}

fn sync_err(e: impl std::fmt::Display) -> SpendError {
    SpendError::SyncFailure(e.to_string())
}

impl SheetsClient {
    /// Build the hub from an installed-app OAuth client secret, caching
    /// tokens on disk next to the database.
    pub async fn connect(
        credentials_file: &Path,
        token_cache: &Path,
        spreadsheet_id: String,
    ) -> Result<SheetsClient> {
        let secret = oauth2::read_application_secret(credentials_file)
            .await
            .map_err(|e| {
                SpendError::Config(format!(
                    "reading Google credentials {}: {e}",
                    credentials_file.display()
                ))
            })?;

        let auth = oauth2::InstalledFlowAuthenticator::builder(
            secret,
            oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(token_cache)
        .build()
        .await
        .map_err(sync_err)?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let hub = Sheets::new(hyper::Client::builder().build(connector), auth);

        Ok(SheetsClient {
            hub,
            spreadsheet_id,
        })
    }

    /// Mirror unsynced rows into the spreadsheet. Rows whose external id is
    /// already present count as acknowledged without a write. Returns the
    /// external ids the spreadsheet now holds from this batch; the caller
    /// flips sync flags only for those.
    pub async fn push(&self, rows: &[StoredTransaction]) -> Result<Vec<String>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        self.ensure_sheet().await?;
        let present = self.existing_ids().await?;

        let (already, missing): (Vec<_>, Vec<_>) = rows
            .iter()
            .partition(|r| present.contains(&r.transaction.external_id));

        if !missing.is_empty() {
            let values: Vec<Vec<Value>> = missing.iter().map(|r| to_row(r)).collect();
            let req = ValueRange {
                values: Some(values),
                ..Default::default()
            };
            self.hub
                .spreadsheets()
                .values_append(req, &self.spreadsheet_id, &format!("{SHEET_NAME}!A:I"))
                .value_input_option("RAW")
                .insert_data_option("INSERT_ROWS")
                .doit()
                .await
                .map_err(sync_err)?;
        }

        Ok(already
            .iter()
            .chain(missing.iter())
            .map(|r| r.transaction.external_id.clone())
            .collect())
    }

    /// Create the Transactions sheet and header row if absent.
    async fn ensure_sheet(&self) -> Result<()> {
        let (_, spreadsheet) = self
            .hub
            .spreadsheets()
            .get(&self.spreadsheet_id)
            .doit()
            .await
            .map_err(sync_err)?;

        let exists = spreadsheet
            .sheets
            .unwrap_or_default()
            .iter()
            .filter_map(|s| s.properties.as_ref())
            .filter_map(|p| p.title.as_deref())
            .any(|t| t == SHEET_NAME);

        if !exists {
            let req = BatchUpdateSpreadsheetRequest {
                requests: Some(vec![Request {
                    add_sheet: Some(AddSheetRequest {
                        properties: Some(SheetProperties {
                            title: Some(SHEET_NAME.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            };
            self.hub
                .spreadsheets()
                .batch_update(req, &self.spreadsheet_id)
                .doit()
                .await
                .map_err(sync_err)?;
        }

        let (_, first_row) = self
            .hub
            .spreadsheets()
            .values_get(&self.spreadsheet_id, &format!("{SHEET_NAME}!A1:I1"))
            .doit()
            .await
            .map_err(sync_err)?;

        if first_row.values.unwrap_or_default().is_empty() {
            let header = ValueRange {
                values: Some(vec![HEADER.iter().map(|h| Value::from(*h)).collect()]),
                ..Default::default()
            };
            self.hub
                .spreadsheets()
                .values_update(header, &self.spreadsheet_id, &format!("{SHEET_NAME}!A1"))
                .value_input_option("RAW")
                .doit()
                .await
                .map_err(sync_err)?;
        }

        Ok(())
    }

    /// External ids already present in the sheet's id column.
    async fn existing_ids(&self) -> Result<HashSet<String>> {
        let (_, column) = self
            .hub
            .spreadsheets()
            .values_get(&self.spreadsheet_id, ID_COLUMN_RANGE)
            .doit()
            .await
            .map_err(sync_err)?;
        Ok(ids_from_column(&column.values))
    }
}

/// One spreadsheet row per transaction, matching HEADER order.
fn to_row(stored: &StoredTransaction) -> Vec<Value> {
    let tx = &stored.transaction;
    let cat = &stored.categorization;
    vec![
        Value::from(tx.posted.format("%Y-%m-%d").to_string()),
        Value::from(tx.name.clone()),
        Value::from(tx.merchant_name.clone().unwrap_or_default()),
        Value::from(tx.amount()),
        Value::from(cat.category.label()),
        Value::from(cat.subcategory.clone()),
        Value::from(tx.description.clone().unwrap_or_default()),
        Value::from(cat.confidence),
        Value::from(tx.external_id.clone()),
    ]
}

fn ids_from_column(values: &Option<Vec<Vec<Value>>>) -> HashSet<String> {
    values
        .iter()
        .flatten()
        .filter_map(|row| row.first())
        .filter_map(|cell| cell.as_str())
        .map(|s| s.to_string())
        .collect()
}
