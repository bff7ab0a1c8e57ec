use anyhow::{Context, Result};
use chrono::{Duration, Local};
use clap::{Parser, Subcommand};
use spendsmart_cli::config::Settings;
use spendsmart_cli::pipeline::{run_pipeline, PipelineOptions};
use spendsmart_connectors::{GeminiClient, PlaidClient, SheetsClient};
use spendsmart_store::Store;

#[derive(Parser, Debug)]
#[command(
    name = "spendsmart",
    version,
    about = "Plaid -> Gemini -> SQLite -> Google Sheets expense pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, categorize, persist, and sync a window of transactions
    Run {
        /// Plaid access token for the linked bank account
        access_token: String,

        /// Lookback window in days (default: 30)
        #[arg(long, default_value_t = 30)]
        days: i64,

        /// Skip the Google Sheets sync stage
        #[arg(long)]
        no_sheets: bool,

        /// Concurrent categorization calls (1 = sequential)
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },

    /// Print spending totals per category from the local database
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env().context("loading configuration")?;

    match cli.command {
        Command::Run {
            access_token,
            days,
            no_sheets,
            concurrency,
        } => {
            let store = Store::open(&settings.database_path)
                .with_context(|| format!("opening {}", settings.database_path.display()))?;

            let source = PlaidClient::new(
                settings.plaid_env,
                settings.plaid_client_id.clone(),
                settings.plaid_secret.clone(),
                access_token,
            );
            let categorizer = GeminiClient::new(settings.gemini_api_key.clone());

            let sink = if no_sheets {
                None
            } else {
                match &settings.spreadsheet_id {
                    None => {
                        eprintln!("No spreadsheet ID configured; skipping Google Sheets sync");
                        None
                    }
                    Some(id) => Some(
                        SheetsClient::connect(
                            &settings.sheets_credentials_file,
                            &settings.token_cache_path(),
                            id.clone(),
                        )
                        .await
                        .context("connecting to Google Sheets")?,
                    ),
                }
            };

            let end = Local::now().date_naive();
            let start = end - Duration::days(days);
            let opts = PipelineOptions {
                concurrency,
                ..Default::default()
            };

            let stats = run_pipeline(
                &source,
                &categorizer,
                &store,
                sink.as_ref(),
                start,
                end,
                &opts,
            )
            .await?;

            println!("\n{}", stats.render());
            print_category_summary(&store)?;
        }

        Command::Summary => {
            let store = Store::open(&settings.database_path)
                .with_context(|| format!("opening {}", settings.database_path.display()))?;
            print_category_summary(&store)?;
        }
    }

    Ok(())
}

fn print_category_summary(store: &Store) -> Result<()> {
    let summary = store.category_summary()?;
    if summary.is_empty() {
        return Ok(());
    }
    println!("\nSpending by Category:");
    println!("{}", "-".repeat(50));
    for (label, count, total_cents) in summary {
        println!(
            "{label:25} ${:>10.2} ({count} transactions)",
            total_cents as f64 / 100.0
        );
    }
    Ok(())
}
