//! Per-account click queries against `click_view`

use chrono::{Duration, NaiveDate, Utc};
use tracing::debug;

use crate::client::{AdsClient, SearchRow};
use crate::error::Result;
use crate::models::{AccountId, ClickRecord};

/// Yesterday in UTC, the default reporting day
pub fn default_report_date() -> NaiveDate {
    (Utc::now() - Duration::days(1)).date_naive()
}

/// GAQL for one day of clicks
///
/// `click_view` rejects date ranges, so the filter is always a single day.
pub fn build_click_query(date: NaiveDate) -> String {
    format!(
        "SELECT click_view.gclid, click_view.ad_group_ad, campaign.id, ad_group.id, \
         segments.ad_network_type, segments.device, segments.click_type, segments.date \
         FROM click_view WHERE segments.date = '{}'",
        date.format("%Y-%m-%d")
    )
}

/// Ad id from an `adGroupAds/{ad_group_id}~{ad_id}` resource name
fn parse_ad_id(resource_name: &str) -> Option<u64> {
    resource_name.rsplit_once('~')?.1.parse().ok()
}

/// Runs the click query for single leaf accounts
pub struct ClickQueryExecutor<A> {
    client: A,
}

impl<A: AdsClient> ClickQueryExecutor<A> {
    pub fn new(client: A) -> Self {
        Self { client }
    }

    /// Fetch every click for `account_id` on `date`
    ///
    /// An account without clicks that day returns `Ok` with an empty list.
    /// Failures come back as `QueryError` naming the account (authentication
    /// failures are passed through unchanged).
    pub async fn fetch_clicks(&self, account_id: AccountId, date: NaiveDate) -> Result<Vec<ClickRecord>> {
        let query = build_click_query(date);

        let rows = self
            .client
            .search(account_id, &query)
            .await
            .map_err(|e| e.for_account(account_id))?;

        let total = rows.len();
        let records: Vec<ClickRecord> = rows
            .into_iter()
            .filter_map(|row| row_to_record(account_id, date, row))
            .collect();

        if records.len() < total {
            debug!(
                "Dropped {} rows without a gclid for account {}",
                total - records.len(),
                account_id
            );
        }

        Ok(records)
    }
}

/// Convert a result row, stamping the account the query was issued for
fn row_to_record(account_id: AccountId, date: NaiveDate, row: SearchRow) -> Option<ClickRecord> {
    let click_view = row.click_view?;
    let gclid = click_view.gclid.filter(|g| !g.is_empty())?;
    let segments = row.segments.unwrap_or_default();

    let timestamp = segments
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .unwrap_or(date);

    Some(ClickRecord {
        account_id,
        gclid,
        campaign_id: row.campaign.and_then(|c| c.id),
        ad_group_id: row.ad_group.and_then(|g| g.id),
        ad_id: click_view.ad_group_ad.as_deref().and_then(parse_ad_id),
        network: segments.ad_network_type,
        device: segments.device,
        click_type: segments.click_type,
        timestamp,
    })
}
