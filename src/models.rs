use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: i64,
    pub plan_name: String,
    pub file_name: String,
    pub upload_date: String,
    pub month: String,
    pub year: i32,
    pub checksum: Option<String>,
    pub row_count: i64,
}

/// A persisted line-item charge. `month` is the owning file's reporting
/// month; `year` is the year the charge was allocated to at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRecord {
    pub id: i64,
    pub file_id: i64,
    pub subscriber_id: String,
    pub subscriber_name: String,
    pub plan: String,
    pub coverage_type: String,
    pub status: String,
    pub coverage_dates: String,
    pub charge_amount: f64,
    pub month: String,
    pub year: i32,
}

/// Intermediate representation of a processed row before the batch insert.
#[derive(Debug, Clone)]
pub struct NewCharge {
    pub subscriber_id: String,
    pub subscriber_name: String,
    pub plan: String,
    pub coverage_type: String,
    pub status: String,
    pub coverage_dates: String,
    pub charge_amount: f64,
    pub month: String,
    pub year: i32,
}

/// Split a legacy `"<id> - <name>"` subscriber field into its parts.
/// A value without the separator is treated as an id with no name.
pub fn split_packed_subscriber(raw: &str) -> (String, String) {
    match raw.split_once(" - ") {
        Some((id, name)) => (id.trim().to_string(), name.trim().to_string()),
        None => (raw.trim().to_string(), String::new()),
    }
}

/// Inverse of [`split_packed_subscriber`], for consumers that still expect one field.
pub fn packed_subscriber(id: &str, name: &str) -> String {
    match (id.is_empty(), name.is_empty()) {
        (false, false) => format!("{id} - {name}"),
        (false, true) => id.to_string(),
        (true, _) => name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Boundary contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    pub base64_content: String,
    pub plan_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Result<Self> {
        if page == 0 || limit == 0 {
            return Err(LedgerError::InvalidPage { page, limit });
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }

    /// Apply this page to an already materialized list.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub total: usize,
    pub items: Vec<T>,
}

impl<T> Default for Paged<T> {
    fn default() -> Self {
        Self {
            total: 0,
            items: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_packed_subscriber() {
        assert_eq!(
            split_packed_subscriber("10023 - DOE, JANE"),
            ("10023".to_string(), "DOE, JANE".to_string())
        );
        assert_eq!(split_packed_subscriber(" 10023 "), ("10023".to_string(), String::new()));
    }

    #[test]
    fn test_packed_subscriber_roundtrips_legacy_field() {
        assert_eq!(packed_subscriber("10023", "DOE, JANE"), "10023 - DOE, JANE");
        assert_eq!(packed_subscriber("", "DOE, JANE"), "DOE, JANE");
        assert_eq!(packed_subscriber("10023", ""), "10023");
    }

    #[test]
    fn test_page_rejects_zero() {
        assert!(Page::new(0, 10).is_err());
        assert!(Page::new(1, 0).is_err());
        assert_eq!(Page::new(3, 25).unwrap().offset(), 50);
    }

    #[test]
    fn test_page_slice() {
        let items: Vec<i32> = (1..=7).collect();
        assert_eq!(Page::new(2, 3).unwrap().slice(&items), vec![4, 5, 6]);
        assert!(Page::new(4, 3).unwrap().slice(&items).is_empty());
    }

    #[test]
    fn test_upload_response_skips_empty_fields() {
        let json = serde_json::to_string(&UploadResponse::failed("boom")).unwrap();
        assert_eq!(json, r#"{"success":false,"error":"boom"}"#);
    }
}
