use std::path::PathBuf;

use crate::db::DB_FILE;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        let expanded = shellexpand_path(&dir);
        std::fs::create_dir_all(&expanded)?;
        settings.data_dir = expanded;
    }

    Ledger::open(settings.clone())?;
    save_settings(&settings)?;

    let db_path = PathBuf::from(&settings.data_dir).join(DB_FILE);
    println!("Initialized database at {}", db_path.display());
    println!("Fiscal year starts in month {}.", settings.fiscal_year_start);
    Ok(())
}
