use std::path::PathBuf;

use crate::classifier::PlanClassifier;
use crate::db::{get_connection, DB_FILE};
use crate::error::Result;
use crate::fmt::{format_bytes, money};
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join(DB_FILE);

    println!("Data dir:     {}", data_dir.display());
    println!("Database:     {}", db_path.display());
    println!("Fiscal start: month {}", settings.fiscal_year_start);

    let classifier = PlanClassifier::with_extra_keywords(&settings.extra_plan_keywords);
    let categories: Vec<&str> = classifier.rules().iter().map(|r| r.category.as_str()).collect();
    println!("UHG lines:    {}", categories.join(", "));

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:      {}", format_bytes(size));

        let conn = get_connection(&db_path)?;
        let files: i64 = conn.query_row("SELECT count(*) FROM uploaded_files", [], |r| r.get(0))?;
        let charges: i64 = conn.query_row("SELECT count(*) FROM charges", [], |r| r.get(0))?;
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(charge_amount), 0) FROM charges",
            [],
            |r| r.get(0),
        )?;

        println!();
        println!("Files:        {files}");
        println!("Charges:      {charges}");
        println!("Total:        {}", money(total));
    } else {
        println!();
        println!("Database not found. Run `premium-ledger init` to set up.");
    }

    Ok(())
}
