//! Header resolution for heterogeneous billing spreadsheets.
//!
//! Each canonical field has an ordered alias list; the first alias present in
//! the (trimmed, lower-cased) headers wins. Resolution happens once per file and
//! produces a [`ColumnMap`] of fixed column indexes used for every row.

use crate::error::{LedgerError, Result};
use crate::models::split_packed_subscriber;

pub const DEFAULT_COVERAGE_TYPE: &str = "Standard";
pub const DEFAULT_STATUS: &str = "No Adjustments";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Amount,
    SubscriberId,
    SubscriberName,
    CoverageType,
    Status,
    CoverageDates,
    Plan,
    Policy,
    Description,
}

const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (Field::Amount, &["charge amount", "premium amount", "premium", "amount"]),
    (Field::SubscriberId, &["id", "subscriber id", "member id", "employee id"]),
    (Field::SubscriberName, &["subscriber name", "name", "employee name", "member name"]),
    (Field::CoverageType, &["coverage type", "coverage", "tier"]),
    (Field::Status, &["adj code", "adjustment code", "status"]),
    (Field::CoverageDates, &["coverage dates", "coverage date", "coverage period"]),
    (Field::Plan, &["plan", "plan name", "plan type"]),
    (Field::Policy, &["policy", "policy number", "policy name"]),
    (Field::Description, &["description", "product", "benefit"]),
];

fn aliases(field: Field) -> &'static [&'static str] {
    FIELD_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, a)| *a)
        .unwrap_or(&[])
}

pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// One row projected onto the canonical fields, defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub amount: String,
    pub subscriber_id: String,
    pub subscriber_name: String,
    pub coverage_type: String,
    pub status: String,
    pub coverage_dates: String,
    pub plan: String,
    pub policy: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    headers: Vec<String>,
    amount: usize,
    subscriber_id: Option<usize>,
    subscriber_name: Option<usize>,
    coverage_type: Option<usize>,
    status: Option<usize>,
    coverage_dates: Option<usize>,
    plan: Option<usize>,
    policy: Option<usize>,
    description: Option<usize>,
}

impl ColumnMap {
    pub fn resolve(raw_headers: &[String]) -> Result<Self> {
        let headers: Vec<String> = raw_headers.iter().map(|h| normalize_header(h)).collect();
        let find = |field: Field| -> Option<usize> {
            aliases(field)
                .iter()
                .find_map(|alias| headers.iter().position(|h| h == alias))
        };

        let amount = find(Field::Amount).ok_or_else(|| LedgerError::MissingAmountColumn {
            available: headers.clone(),
        })?;

        Ok(Self {
            amount,
            subscriber_id: find(Field::SubscriberId),
            subscriber_name: find(Field::SubscriberName),
            coverage_type: find(Field::CoverageType),
            status: find(Field::Status),
            coverage_dates: find(Field::CoverageDates),
            plan: find(Field::Plan),
            policy: find(Field::Policy),
            description: find(Field::Description),
            headers,
        })
    }

    pub fn column(&self, field: Field) -> Option<usize> {
        match field {
            Field::Amount => Some(self.amount),
            Field::SubscriberId => self.subscriber_id,
            Field::SubscriberName => self.subscriber_name,
            Field::CoverageType => self.coverage_type,
            Field::Status => self.status,
            Field::CoverageDates => self.coverage_dates,
            Field::Plan => self.plan,
            Field::Policy => self.policy,
            Field::Description => self.description,
        }
    }

    /// Resolved header name for a field, for diagnostics.
    pub fn header(&self, field: Field) -> Option<&str> {
        self.column(field).map(|i| self.headers[i].as_str())
    }

    fn cell<'a>(&self, row: &'a [String], idx: Option<usize>) -> &'a str {
        idx.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("")
    }

    pub fn normalize(&self, row: &[String]) -> NormalizedRow {
        let or_default = |value: &str, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        let mut subscriber_id = self.cell(row, self.subscriber_id).to_string();
        let mut subscriber_name = self.cell(row, self.subscriber_name).to_string();
        if subscriber_name.is_empty() && subscriber_id.contains(" - ") {
            (subscriber_id, subscriber_name) = split_packed_subscriber(&subscriber_id);
        } else if subscriber_id.is_empty() && subscriber_name.contains(" - ") {
            (subscriber_id, subscriber_name) = split_packed_subscriber(&subscriber_name);
        }

        NormalizedRow {
            amount: self.cell(row, Some(self.amount)).to_string(),
            subscriber_id,
            subscriber_name,
            coverage_type: or_default(self.cell(row, self.coverage_type), DEFAULT_COVERAGE_TYPE),
            status: or_default(self.cell(row, self.status), DEFAULT_STATUS),
            coverage_dates: self.cell(row, self.coverage_dates).to_string(),
            plan: self.cell(row, self.plan).to_string(),
            policy: self.cell(row, self.policy).to_string(),
            description: self.cell(row, self.description).to_string(),
        }
    }
}
