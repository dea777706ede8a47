use std::fs::File;
use std::io::BufWriter;

use crate::cli::open_ledger;
use crate::error::Result;
use crate::reports::write_charges_csv;

pub fn run(output: &str, search: Option<&str>, plan: Option<&str>) -> Result<()> {
    let records = open_ledger()?.export(search, plan)?;
    let file = File::create(output)?;
    write_charges_csv(&records, BufWriter::new(file))?;
    println!("Exported {} charges to {output}", records.len());
    Ok(())
}
