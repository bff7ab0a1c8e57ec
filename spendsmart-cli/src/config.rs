//! Environment configuration, loaded once into an immutable struct

use std::path::PathBuf;

use spendsmart_connectors::PlaidEnv;
use spendsmart_core::error::{Result, SpendError};

/// Everything the pipeline needs, validated up front. A missing required
/// value aborts the process before any network call.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database file
    pub database_path: PathBuf,
    pub plaid_client_id: String,
    pub plaid_secret: String,
    pub plaid_env: PlaidEnv,
    pub gemini_api_key: String,
    /// OAuth client secret file downloaded from Google Cloud Console
    pub sheets_credentials_file: PathBuf,
    /// Absent id means the sync stage is skipped with a warning
    pub spreadsheet_id: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Settings> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Lookup-function seam so validation is testable without mutating
    /// process-global environment state.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        let database_url = required(&get, "DATABASE_URL")?;
        let plaid_env = PlaidEnv::parse(
            get("PLAID_ENV")
                .filter(|s| !s.trim().is_empty())
                .as_deref()
                .unwrap_or("sandbox"),
        )?;

        Ok(Settings {
            database_path: database_path_from_url(&database_url),
            plaid_client_id: required(&get, "PLAID_CLIENT_ID")?,
            plaid_secret: required(&get, "PLAID_SECRET")?,
            plaid_env,
            gemini_api_key: required(&get, "GEMINI_API_KEY")?,
            sheets_credentials_file: PathBuf::from(
                get("GOOGLE_SHEETS_CREDENTIALS_FILE")
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "credentials.json".to_string()),
            ),
            spreadsheet_id: get("GOOGLE_SHEETS_SPREADSHEET_ID").filter(|s| !s.trim().is_empty()),
        })
    }

    /// OAuth token cache lives next to the database file.
    pub fn token_cache_path(&self) -> PathBuf {
        self.database_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
            .join("sheets_token.json")
    }
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match get(key) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SpendError::Config(format!("{key} is not set"))),
    }
}

/// Accept a plain path or a `sqlite:`/`sqlite://` URL for the database.
fn database_path_from_url(url: &str) -> PathBuf {
    let stripped = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    PathBuf::from(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[
            ("DATABASE_URL", "sqlite:///tmp/spendsmart.db"),
            ("PLAID_CLIENT_ID", "client-id"),
            ("PLAID_SECRET", "secret"),
            ("PLAID_ENV", "sandbox"),
            ("GEMINI_API_KEY", "key"),
            ("GOOGLE_SHEETS_SPREADSHEET_ID", "sheet-1"),
        ])
    }

    fn load(map: &HashMap<String, String>) -> Result<Settings> {
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_full_config_loads() {
        let s = load(&full_env()).unwrap();
        assert_eq!(s.database_path, PathBuf::from("/tmp/spendsmart.db"));
        assert_eq!(s.plaid_env, PlaidEnv::Sandbox);
        assert_eq!(s.spreadsheet_id.as_deref(), Some("sheet-1"));
        assert_eq!(
            s.sheets_credentials_file,
            PathBuf::from("credentials.json")
        );
    }

    #[test]
    fn test_missing_required_value_is_config_error() {
        for key in ["DATABASE_URL", "PLAID_CLIENT_ID", "PLAID_SECRET", "GEMINI_API_KEY"] {
            let mut map = full_env();
            map.remove(key);
            let err = load(&map).unwrap_err();
            match err {
                SpendError::Config(msg) => assert!(msg.contains(key), "bad message: {msg}"),
                other => panic!("expected Config error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut map = full_env();
        map.insert("PLAID_SECRET".to_string(), "  ".to_string());
        assert!(load(&map).is_err());
    }

    #[test]
    fn test_plaid_env_defaults_to_sandbox() {
        let mut map = full_env();
        map.remove("PLAID_ENV");
        assert_eq!(load(&map).unwrap().plaid_env, PlaidEnv::Sandbox);
    }

    #[test]
    fn test_bad_plaid_env_rejected() {
        let mut map = full_env();
        map.insert("PLAID_ENV".to_string(), "staging".to_string());
        assert!(load(&map).is_err());
    }

    #[test]
    fn test_spreadsheet_id_optional() {
        let mut map = full_env();
        map.remove("GOOGLE_SHEETS_SPREADSHEET_ID");
        assert!(load(&map).unwrap().spreadsheet_id.is_none());
    }

    #[test]
    fn test_database_url_forms() {
        assert_eq!(
            database_path_from_url("sqlite://data/app.db"),
            PathBuf::from("data/app.db")
        );
        assert_eq!(
            database_path_from_url("sqlite:app.db"),
            PathBuf::from("app.db")
        );
        assert_eq!(database_path_from_url("app.db"), PathBuf::from("app.db"));
    }

    #[test]
    fn test_token_cache_next_to_db() {
        let s = load(&full_env()).unwrap();
        assert_eq!(s.token_cache_path(), PathBuf::from("/tmp/sheets_token.json"));
    }
}
