use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AdsError;

/// Google Ads customer id, stored without the `123-456-7890` formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(u64);

impl AccountId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Resource name used by the API, e.g. `customers/1234567890`
    pub fn resource_name(&self) -> String {
        format!("customers/{}", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = AdsError;

    /// Accepts `1234567890`, `123-456-7890` and `customers/1234567890`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed.strip_prefix("customers/").unwrap_or(trimmed);
        let digits: String = bare.chars().filter(|c| *c != '-').collect();

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AdsError::ConfigError(format!(
                "Invalid customer id '{}': expected digits, optionally hyphenated",
                s
            )));
        }

        digits
            .parse::<u64>()
            .map(AccountId)
            .map_err(|e| AdsError::ConfigError(format!("Invalid customer id '{}': {}", s, e)))
    }
}

/// A node in the account hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub is_manager: bool,
    pub name: Option<String>,
    /// Distance from the root manager (root = 0)
    pub depth: u32,
}

impl Account {
    pub fn manager(id: AccountId, depth: u32) -> Self {
        Self {
            id,
            is_manager: true,
            name: None,
            depth,
        }
    }

    pub fn leaf(id: AccountId, depth: u32) -> Self {
        Self {
            id,
            is_manager: false,
            name: None,
            depth,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Human-friendly label for log lines
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("{} ({})", self.id, name),
            _ => self.id.to_string(),
        }
    }
}

/// One click retrieved from `click_view`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickRecord {
    pub account_id: AccountId,
    pub gclid: String,
    pub campaign_id: Option<u64>,
    pub ad_group_id: Option<u64>,
    pub ad_id: Option<u64>,
    pub network: Option<String>,
    pub device: Option<String>,
    pub click_type: Option<String>,
    /// Day the click belongs to (`segments.date`)
    pub timestamp: NaiveDate,
}

/// A non-fatal problem recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// The children of a manager could not be listed; its subtree is missing
    BranchSkipped { manager_id: AccountId, cause: String },
    /// The click query for a leaf account failed; it contributes no records
    AccountSkipped { account_id: AccountId, cause: String },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::BranchSkipped { manager_id, cause } => {
                write!(f, "skipped branch under manager {}: {}", manager_id, cause)
            }
            RunWarning::AccountSkipped { account_id, cause } => {
                write!(f, "skipped account {}: {}", account_id, cause)
            }
        }
    }
}

/// Run phases, in the order a successful run passes through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Init,
    Authenticating,
    Walking,
    Querying,
    Aggregating,
    Done,
    Failed,
}

/// Outcome of a single run: everything fetched plus everything skipped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub root: AccountId,
    pub date: NaiveDate,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Leaf accounts yielded by the walk
    pub leaves_discovered: usize,
    /// Leaf accounts whose click query succeeded (possibly with zero rows)
    pub accounts_queried: usize,
    pub records: Vec<ClickRecord>,
    pub warnings: Vec<RunWarning>,
    pub output_path: Option<std::path::PathBuf>,
}

impl RunReport {
    pub fn new(root: AccountId, date: NaiveDate) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            root,
            date,
            phase: RunPhase::Init,
            started_at: Utc::now(),
            finished_at: None,
            leaves_discovered: 0,
            accounts_queried: 0,
            records: Vec::new(),
            warnings: Vec::new(),
            output_path: None,
        }
    }

    pub fn records_written(&self) -> usize {
        if self.output_path.is_some() {
            self.records.len()
        } else {
            0
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or(0)
    }
}

/// Custom deserializers for Google Ads REST payloads
pub mod deserializers {
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    /// Deserialize an int64 field, which the REST API encodes as a JSON string
    pub fn deserialize_int64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<StringOrNumber> = Option::deserialize(deserializer)?;
        match opt {
            Some(StringOrNumber::String(s)) => s.parse::<u64>().map(Some).map_err(de::Error::custom),
            Some(StringOrNumber::Number(n)) => Ok(Some(n)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_parsing() {
        assert_eq!("1234567890".parse::<AccountId>().unwrap(), AccountId::new(1234567890));
        assert_eq!("123-456-7890".parse::<AccountId>().unwrap(), AccountId::new(1234567890));
        assert_eq!(
            "customers/1234567890".parse::<AccountId>().unwrap(),
            AccountId::new(1234567890)
        );
        assert_eq!(" 111 ".parse::<AccountId>().unwrap(), AccountId::new(111));
    }

    #[test]
    fn test_account_id_rejects_garbage() {
        assert!("".parse::<AccountId>().is_err());
        assert!("---".parse::<AccountId>().is_err());
        assert!("12a45".parse::<AccountId>().is_err());
        assert!("customers/".parse::<AccountId>().is_err());
    }

    #[test]
    fn test_account_id_display_has_no_formatting() {
        assert_eq!(AccountId::new(1234567890).to_string(), "1234567890");
        assert_eq!(AccountId::new(42).resource_name(), "customers/42");
    }

    #[test]
    fn test_account_label() {
        let plain = Account::leaf(AccountId::new(333), 1);
        assert_eq!(plain.label(), "333");

        let named = Account::manager(AccountId::new(222), 1).with_name("EU brands");
        assert_eq!(named.label(), "222 (EU brands)");
        assert!(named.is_manager);
    }

    #[test]
    fn test_click_record_serialization() {
        let record = ClickRecord {
            account_id: AccountId::new(333),
            gclid: "Cj0KCQ".to_string(),
            campaign_id: Some(17),
            ad_group_id: Some(23),
            ad_id: None,
            network: Some("SEARCH".to_string()),
            device: Some("MOBILE".to_string()),
            click_type: None,
            timestamp: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["account_id"], 333);
        assert_eq!(json["gclid"], "Cj0KCQ");
        assert_eq!(json["timestamp"], "2026-10-17");

        let back: ClickRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_run_warning_serialization() {
        let warning = RunWarning::AccountSkipped {
            account_id: AccountId::new(444),
            cause: "permission denied".to_string(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "account_skipped");
        assert_eq!(json["account_id"], 444);
        assert!(warning.to_string().contains("444"));
    }

    #[test]
    fn test_records_written_requires_output() {
        let mut report = RunReport::new(AccountId::new(111), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        report.records.push(ClickRecord {
            account_id: AccountId::new(333),
            gclid: "g".to_string(),
            campaign_id: None,
            ad_group_id: None,
            ad_id: None,
            network: None,
            device: None,
            click_type: None,
            timestamp: report.date,
        });
        assert_eq!(report.records_written(), 0);

        report.output_path = Some("clicks.json".into());
        assert_eq!(report.records_written(), 1);
    }

    #[test]
    fn test_deserialize_int64() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default, deserialize_with = "deserializers::deserialize_int64")]
            id: Option<u64>,
        }

        let from_string: Holder = serde_json::from_str(r#"{"id": "987"}"#).unwrap();
        assert_eq!(from_string.id, Some(987));

        let from_number: Holder = serde_json::from_str(r#"{"id": 987}"#).unwrap();
        assert_eq!(from_number.id, Some(987));

        let missing: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.id, None);

        assert!(serde_json::from_str::<Holder>(r#"{"id": "abc"}"#).is_err());
    }
}
