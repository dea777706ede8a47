pub mod export;
pub mod files;
pub mod init;
pub mod report;
pub mod status;
pub mod upload;

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::ledger::Ledger;
use crate::models::Paged;
use crate::settings::load_settings;

pub(crate) fn open_ledger() -> Result<Ledger> {
    Ledger::open(load_settings())
}

pub(crate) fn page_footer<T>(paged: &Paged<T>, page: u32, limit: u32) -> String {
    let pages = paged.total.div_ceil(limit as usize).max(1);
    format!("Page {page} of {pages} ({} total)", paged.total)
}

#[derive(Parser)]
#[command(
    name = "premium-ledger",
    about = "Ingest insurance premium billing files and reconcile charges by plan and fiscal year."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for ledger data (default: ~/Documents/premium-ledger)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Upload a billing spreadsheet (XLSX/XLS/ODS or CSV) under a plan identifier.
    Upload {
        /// Path to the billing file
        file: String,
        /// Plan identifier, e.g. UHC-3000-OCT-2024 or UHG-DEC-2024
        #[arg(long)]
        plan: String,
        /// File name to record (default: the file's own name)
        #[arg(long)]
        name: Option<String>,
        /// Print the response envelope as JSON
        #[arg(long)]
        json: bool,
    },
    /// Process a JSON upload request ({fileName, base64Content, planIdentifier}).
    Request {
        /// Read the request from this file instead of stdin
        #[arg(long)]
        input: Option<String>,
    },
    /// Delete an uploaded file and all of its charges.
    Delete {
        /// Plan identifier of the file to delete
        plan: String,
    },
    /// List uploaded files, newest first.
    Files,
    /// Monthly and fiscal-year summary per plan per file.
    Summary {
        /// Plan code, e.g. UHC-3000 or UHG-DENTAL
        #[arg(long)]
        plan: Option<String>,
        /// Reporting month code, e.g. OCT
        #[arg(long)]
        month: Option<String>,
        /// Reporting year
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "25")]
        limit: u32,
    },
    /// Totals per fiscal year across all plans.
    Fiscal,
    /// Cost analysis per plan.
    Costs,
    /// Premium statistics per coverage type and plan.
    Coverage,
    /// Subscriber and premium totals with plan and coverage distribution.
    Metrics,
    /// Latest charge per subscriber.
    Employees {
        /// Case-insensitive search across name, id, coverage, plan, status and dates
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "25")]
        limit: u32,
    },
    /// Every charge record.
    Charges {
        #[arg(long)]
        search: Option<String>,
        /// Restrict to one plan code
        #[arg(long)]
        plan: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "25")]
        limit: u32,
    },
    /// Charge history for one subscriber, per plan.
    History {
        /// Subscriber id (or name, for records without an id)
        subscriber: String,
    },
    /// Export charge records to CSV.
    Export {
        /// Output CSV path
        #[arg(long)]
        output: String,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        plan: Option<String>,
    },
    /// Show current database and summary statistics.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_page_footer() {
        let paged = Paged {
            total: 51,
            items: vec![1, 2],
        };
        assert_eq!(page_footer(&paged, 3, 25), "Page 3 of 3 (51 total)");
        assert_eq!(page_footer(&Paged::<i32>::default(), 1, 25), "Page 1 of 1 (0 total)");
    }
}
