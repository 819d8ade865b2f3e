//! Google Ads click export
//!
//! Pulls click-level data (`click_view`) for every client account under a
//! manager account and writes it to a timestamped JSON file for downstream
//! attribution.
//!
//! # Overview
//!
//! - **Authentication**: refresh-token exchange with a cached access token
//! - **Hierarchy walk**: breadth-first discovery of client accounts
//! - **Click queries**: one single-day query per client account
//! - **Run coordination**: partial-failure tolerant aggregation and output
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ads_click_export::{
//!     auth::{OAuthTokenExchanger, TokenProvider},
//!     client::RestAdsClient,
//!     config::{AdsCredentials, Config},
//!     coordinator::RunCoordinator,
//!     output::JsonFileSink,
//!     query::default_report_date,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("ads-click-export.toml".as_ref())
//!         .await?
//!         .with_credentials(AdsCredentials::from_env()?);
//!
//!     let exchanger = Arc::new(OAuthTokenExchanger::new(&config.credentials).await?);
//!     let tokens = Arc::new(TokenProvider::from_credentials(&config.credentials, exchanger)?);
//!     let client = Arc::new(RestAdsClient::new(&config, Arc::clone(&tokens))?);
//!     let sink = Arc::new(JsonFileSink::from_config(&config.output));
//!
//!     let report = RunCoordinator::new(tokens, client, sink, config.run.clone())
//!         .run(config.credentials.login_customer()?, default_report_date())
//!         .await?;
//!
//!     println!("{} records written", report.records_written());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 token exchange and caching
//! - [`client`] - Google Ads REST client
//! - [`cli`] - Command-line interface and run wiring
//! - [`config`] - Configuration and credentials
//! - [`coordinator`] - Run orchestration
//! - [`error`] - Error types and result aliases
//! - [`hierarchy`] - Manager-account hierarchy traversal
//! - [`models`] - Core data structures
//! - [`output`] - JSON file output
//! - [`query`] - Per-account click queries

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hierarchy;
pub mod models;
pub mod output;
pub mod query;

// Re-export commonly used types for convenience
pub use error::{AdsError, Result};

// Core data models
pub use models::{Account, AccountId, ClickRecord, RunPhase, RunReport, RunWarning};

// Config types
pub use config::{AdsCredentials, ApiConfig, Config, OutputConfig, RunConfig};

// Pipeline components
pub use auth::{AccessToken, OAuthTokenExchanger, TokenExchanger, TokenProvider};
pub use client::{AdsClient, RestAdsClient, SearchRow};
pub use coordinator::RunCoordinator;
pub use hierarchy::{HierarchyWalker, TraversalQueue, WalkItem};
pub use output::{JsonFileSink, OutputSink};
pub use query::ClickQueryExecutor;

// CLI types (for binary usage)
pub use cli::Cli;
