use comfy_table::{Cell, Table};

use crate::cli::open_ledger;
use crate::error::Result;
use crate::fmt::short_hash;

pub fn list() -> Result<()> {
    let files = open_ledger()?.files();
    if files.is_empty() {
        println!("No files uploaded yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Plan", "File", "Uploaded", "Period", "Rows", "Checksum"]);
    for f in &files {
        table.add_row(vec![
            Cell::new(&f.plan_name),
            Cell::new(&f.file_name),
            Cell::new(&f.upload_date),
            Cell::new(format!("{} {}", f.month, f.year)),
            Cell::new(f.row_count),
            Cell::new(short_hash(f.checksum.as_deref().unwrap_or(""), 12)),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn delete(plan: &str) -> Result<()> {
    let removed = open_ledger()?.delete(plan)?;
    println!("Deleted {} ({removed} charges removed)", plan.trim().to_uppercase());
    Ok(())
}
