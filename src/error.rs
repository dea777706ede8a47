use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid plan identifier '{0}': expected CARRIER[-SUBCODE]-MON-YYYY (e.g. UHC-3000-OCT-2024)")]
    InvalidPlanIdentifier(String),

    #[error("Could not decode file content: {0}")]
    Decode(String),

    #[error("Could not read file as a spreadsheet or CSV: {0}")]
    UnreadableFile(String),

    #[error("No amount column found. Available columns: {available:?}")]
    MissingAmountColumn { available: Vec<String> },

    #[error("A file with plan name {0} already exists. Delete it before uploading again.")]
    DuplicatePlan(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid page request: page and limit must be positive (got page={page}, limit={limit})")]
    InvalidPage { page: u32, limit: u32 },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
