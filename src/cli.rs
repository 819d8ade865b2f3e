//! Command-line interface

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{OAuthTokenExchanger, TokenProvider};
use crate::client::RestAdsClient;
use crate::config::Config;
use crate::coordinator::RunCoordinator;
use crate::error::Result;
use crate::models::{AccountId, RunReport};
use crate::output::JsonFileSink;
use crate::query::default_report_date;

#[derive(Parser, Debug)]
#[command(name = "ads-click-export")]
#[command(version = "0.1.0")]
#[command(about = "Export Google Ads click data across a manager account hierarchy", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ads-click-export.toml")]
    pub config: PathBuf,

    /// Day to export (YYYY-MM-DD); defaults to yesterday in UTC
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Root manager account; defaults to GOOGLE_ADS_LOGIN_CUSTOMER_ID
    #[arg(long)]
    pub root: Option<AccountId>,

    /// Directory for the output file; overrides the config file
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
    }

    pub fn report_date(&self) -> NaiveDate {
        self.date.unwrap_or_else(default_report_date)
    }
}

/// Wire up the production components and perform one run
///
/// # Arguments
/// * `cli` - Parsed command-line arguments
/// * `config` - Configuration with credentials already filled in
///
/// # Returns
/// * `Ok(RunReport)` - Records, warnings and the output location
/// * `Err(AdsError)` - Authentication, root walk or output failure
pub async fn execute(cli: &Cli, config: Config) -> Result<RunReport> {
    let root = match cli.root {
        Some(root) => root,
        None => config.credentials.login_customer()?,
    };
    let date = cli.report_date();

    let exchanger = Arc::new(OAuthTokenExchanger::new(&config.credentials).await?);
    let tokens = Arc::new(TokenProvider::from_credentials(&config.credentials, exchanger)?);
    let client = Arc::new(RestAdsClient::new(&config, Arc::clone(&tokens))?);

    let coordinator = RunCoordinator::new(
        tokens,
        client,
        Arc::new(JsonFileSink::from_config(&config.output)),
        config.run.clone(),
    )
    .with_fallback_sink(Arc::new(JsonFileSink::fallback_from_config(&config.output)));

    coordinator.run(root, date).await
}

/// Human-readable run summary
pub fn render_summary(report: &RunReport) -> String {
    let output = match &report.output_path {
        Some(path) => path.display().to_string(),
        None => "none (no click data)".to_string(),
    };

    let mut summary = format!(
        "========================================\n\
         Click Export Summary\n\
         ========================================\n\
         Run ID: {}\n\
         Date: {}\n\
         Root manager: {}\n\
         Duration: {} seconds\n\
         Leaf accounts: {}\n\
         Accounts queried: {}\n\
         Records written: {}\n\
         Output: {}\n",
        report.run_id,
        report.date,
        report.root,
        report.duration_seconds(),
        report.leaves_discovered,
        report.accounts_queried,
        report.records_written(),
        output,
    );

    if !report.warnings.is_empty() {
        summary.push_str(&format!("Warnings ({}):\n", report.warnings.len()));
        for warning in &report.warnings {
            summary.push_str(&format!("  - {}\n", warning));
        }
    }

    summary.push_str("========================================");
    summary
}
