//! Run orchestration
//!
//! A run authenticates, walks the hierarchy and queries every discovered
//! leaf, then hands the collected records to the output sink. Only an
//! authentication failure, a root-level walk failure with nothing found, or
//! a failed write abort the run; everything else becomes a warning on the
//! report.

use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::TokenProvider;
use crate::client::AdsClient;
use crate::config::RunConfig;
use crate::error::{AdsError, Result};
use crate::hierarchy::{HierarchyWalker, WalkItem};
use crate::models::{Account, AccountId, ClickRecord, RunPhase, RunReport, RunWarning};
use crate::output::OutputSink;
use crate::query::ClickQueryExecutor;

/// Result of processing one walk item
enum Outcome {
    Queried {
        account: Account,
        result: Result<Vec<ClickRecord>>,
    },
    BranchSkipped {
        manager_id: AccountId,
        error: AdsError,
    },
}

pub struct RunCoordinator {
    tokens: Arc<TokenProvider>,
    client: Arc<dyn AdsClient>,
    sink: Arc<dyn OutputSink>,
    fallback_sink: Option<Arc<dyn OutputSink>>,
    config: RunConfig,
}

impl RunCoordinator {
    pub fn new(
        tokens: Arc<TokenProvider>,
        client: Arc<dyn AdsClient>,
        sink: Arc<dyn OutputSink>,
        config: RunConfig,
    ) -> Self {
        Self {
            tokens,
            client,
            sink,
            fallback_sink: None,
            config,
        }
    }

    /// Where records go if the primary sink fails
    pub fn with_fallback_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.fallback_sink = Some(sink);
        self
    }

    fn enter(report: &mut RunReport, phase: RunPhase) {
        tracing::debug!("Run {}: {:?} -> {:?}", report.run_id, report.phase, phase);
        report.phase = phase;
    }

    /// Export the clicks of every leaf under `root` for `date`
    pub async fn run(&self, root: AccountId, date: NaiveDate) -> Result<RunReport> {
        let mut report = RunReport::new(root, date);
        info!("Starting run {} for {} under manager {}", report.run_id, date, root);

        Self::enter(&mut report, RunPhase::Authenticating);
        if let Err(e) = self.tokens.access_token().await {
            Self::enter(&mut report, RunPhase::Failed);
            error!("Authentication failed, aborting run: {}", e);
            return Err(e);
        }

        Self::enter(&mut report, RunPhase::Walking);
        let walker = HierarchyWalker::from_config(Arc::clone(&self.client), &self.config);
        let executor = ClickQueryExecutor::new(Arc::clone(&self.client));
        let mut root_failure: Option<AdsError> = None;

        // `buffered` keeps discovery order while queries run concurrently
        let mut outcomes = walker
            .discover_leaf_accounts(root)
            .map(|item| {
                let executor = &executor;
                async move {
                    match item {
                        WalkItem::Leaf(account) => {
                            let result = executor.fetch_clicks(account.id, date).await;
                            Outcome::Queried { account, result }
                        }
                        WalkItem::BranchSkipped { manager_id, error } => {
                            Outcome::BranchSkipped { manager_id, error }
                        }
                    }
                }
            })
            .buffered(self.config.max_concurrent_queries.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Outcome::Queried { account, result } => {
                    if report.phase == RunPhase::Walking {
                        Self::enter(&mut report, RunPhase::Querying);
                    }
                    report.leaves_discovered += 1;

                    match result {
                        Ok(records) => {
                            info!("Account {}: {} clicks", account.label(), records.len());
                            report.accounts_queried += 1;
                            report.records.extend(records);
                        }
                        Err(e) if e.is_fatal() => {
                            Self::enter(&mut report, RunPhase::Failed);
                            error!("Aborting run at account {}: {}", account.label(), e);
                            return Err(e);
                        }
                        Err(e) => {
                            warn!("Skipping account {}: {}", account.label(), e);
                            report.warnings.push(RunWarning::AccountSkipped {
                                account_id: account.id,
                                cause: e.to_string(),
                            });
                        }
                    }
                }
                Outcome::BranchSkipped { manager_id, error } => {
                    if error.is_fatal() {
                        Self::enter(&mut report, RunPhase::Failed);
                        error!("Aborting run while listing manager {}: {}", manager_id, error);
                        return Err(error);
                    }
                    report.warnings.push(RunWarning::BranchSkipped {
                        manager_id,
                        cause: error.to_string(),
                    });
                    if manager_id == root {
                        root_failure = Some(error);
                    }
                }
            }
        }
        drop(outcomes);

        Self::enter(&mut report, RunPhase::Aggregating);
        if report.leaves_discovered == 0 {
            if let Some(error) = root_failure {
                error!("Could not list accounts under root manager {}", root);
                return Err(error.for_branch(root));
            }
        }

        info!(
            "Collected {} records from {} accounts ({} warnings)",
            report.records.len(),
            report.accounts_queried,
            report.warnings.len()
        );

        if report.records.is_empty() {
            info!("No click data returned, nothing written");
        } else {
            report.output_path = Some(self.write_output(&report.records).await?);
        }

        Self::enter(&mut report, RunPhase::Done);
        report.finished_at = Some(Utc::now());
        Ok(report)
    }

    /// Write through the primary sink, dumping to the fallback if it fails
    ///
    /// The run still fails when the primary write fails; the fallback only
    /// keeps the fetched data from being lost.
    async fn write_output(&self, records: &[ClickRecord]) -> Result<std::path::PathBuf> {
        let primary_error = match self.sink.write(records).await {
            Ok(path) => return Ok(path),
            Err(e) => e,
        };
        error!("Failed to write output: {}", primary_error);

        let Some(fallback) = &self.fallback_sink else {
            return Err(primary_error);
        };

        match fallback.write(records).await {
            Ok(path) => {
                warn!("Dumped {} records to fallback location {:?}", records.len(), path);
                Err(AdsError::OutputError(format!(
                    "{} (records dumped to {:?})",
                    primary_error, path
                )))
            }
            Err(fallback_error) => {
                error!("Fallback dump failed as well: {}", fallback_error);
                Err(primary_error)
            }
        }
    }
}
