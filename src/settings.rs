use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Rows buffered per insert batch during ingestion.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Calendar month (1-12) on which the fiscal year begins.
    #[serde(default = "default_fiscal_year_start")]
    pub fiscal_year_start: u32,
    /// First of the two fiscal years broken out in the monthly summary.
    #[serde(default = "default_report_fiscal_year")]
    pub report_fiscal_year: i32,
    /// Additional keywords per UHG category (DENTAL, VISION, LIFE, AD&D).
    #[serde(default)]
    pub extra_plan_keywords: BTreeMap<String, Vec<String>>,
}

fn default_batch_size() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_fiscal_year_start() -> u32 {
    10
}

fn default_report_fiscal_year() -> i32 {
    2025
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            batch_size: default_batch_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
            fiscal_year_start: default_fiscal_year_start(),
            report_fiscal_year: default_report_fiscal_year(),
            extra_plan_keywords: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.fiscal_year_start) {
            return Err(LedgerError::Settings(format!(
                "fiscal_year_start must be a month between 1 and 12, got {}",
                self.fiscal_year_start
            )));
        }
        if self.batch_size == 0 {
            return Err(LedgerError::Settings("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("premium-ledger")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("premium-ledger")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| LedgerError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
