use base64::Engine;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::classifier::{PlanClassifier, PlanIdentifier};
use crate::error::{LedgerError, Result};
use crate::fiscal::{parse_coverage_start, FiscalCalendar};
use crate::models::{NewCharge, UploadRequest, UploadedFile};
use crate::normalizer::{ColumnMap, NormalizedRow};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strip currency decoration and parse; `None` means the row has no usable amount.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | '₹' | ',' | '"') && !c.is_whitespace())
        .collect();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| -v);
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Base64 payload to bytes, tolerating a `data:...;base64,` prefix and line breaks.
pub fn decode_payload(content: &str) -> Result<Vec<u8>> {
    let payload = content.split_once(',').map_or(content, |(_, rest)| rest);
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(LedgerError::Decode("file content is empty".to_string()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| LedgerError::Decode(e.to_string()))
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Table parsing: workbook first, delimited text as fallback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn table_from_rows(rows: impl IntoIterator<Item = Vec<String>>) -> Result<RawTable> {
    let is_blank = |r: &Vec<String>| r.iter().all(|c| c.trim().is_empty());
    let mut rows = rows.into_iter().filter(|r| !is_blank(r));
    let headers = rows
        .next()
        .ok_or_else(|| LedgerError::UnreadableFile("no header row found".to_string()))?;
    Ok(RawTable {
        headers,
        rows: rows.collect(),
    })
}

pub fn parse_table(bytes: &[u8]) -> Result<RawTable> {
    #[cfg(feature = "excel")]
    {
        match parse_workbook(bytes) {
            Ok(table) => return Ok(table),
            Err(e) => debug!(error = %e, "not a workbook, retrying as delimited text"),
        }
    }
    parse_delimited(bytes).map_err(|e| match e {
        LedgerError::UnreadableFile(_) => e,
        other => LedgerError::UnreadableFile(other.to_string()),
    })
}

fn parse_delimited(bytes: &[u8]) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    table_from_rows(rows)
}

#[cfg(feature = "excel")]
fn parse_workbook(bytes: &[u8]) -> Result<RawTable> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto_from_rs(std::io::Cursor::new(bytes))
        .map_err(|e| LedgerError::UnreadableFile(format!("Failed to open workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LedgerError::UnreadableFile("workbook has no sheets".to_string()))?
        .map_err(|e| LedgerError::UnreadableFile(format!("Failed to read sheet: {e}")))?;
    table_from_rows(range.rows().map(|row| row.iter().map(cell_text).collect()))
}

#[cfg(feature = "excel")]
fn cell_text(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => number_text(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => {
            crate::fiscal::excel_serial_to_mdy(dt.as_f64()).unwrap_or_default()
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Integral floats render without a fractional part so ids stay readable.
#[cfg_attr(not(feature = "excel"), allow(dead_code))]
fn number_text(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

// ---------------------------------------------------------------------------
// Upload pipeline
// ---------------------------------------------------------------------------

pub struct IngestOptions<'a> {
    pub classifier: &'a PlanClassifier,
    pub calendar: FiscalCalendar,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub duplicate_file: bool,
}

impl ImportResult {
    fn duplicate() -> Self {
        Self {
            imported: 0,
            skipped: 0,
            duplicate_file: true,
        }
    }
}

fn plan_exists(conn: &Connection, plan_name: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM uploaded_files WHERE plan_name = ?1")?;
    Ok(stmt.exists([plan_name])?)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Turn one normalized row into a charge, or explain why it was dropped.
fn process_row(
    row: &NormalizedRow,
    id: &PlanIdentifier,
    opts: &IngestOptions,
) -> std::result::Result<NewCharge, String> {
    let amount = parse_amount(&row.amount)
        .ok_or_else(|| format!("unparseable amount {:?}", row.amount))?;
    let plan = opts.classifier.plan_for(id, row);
    let coverage = parse_coverage_start(&row.coverage_dates);
    Ok(NewCharge {
        subscriber_id: row.subscriber_id.clone(),
        subscriber_name: row.subscriber_name.clone(),
        plan,
        coverage_type: row.coverage_type.clone(),
        status: row.status.trim().to_uppercase(),
        coverage_dates: row.coverage_dates.clone(),
        charge_amount: amount,
        month: id.month.code().to_string(),
        year: opts.calendar.allocation_year(coverage, id.month.number(), id.year),
    })
}

const CHARGE_INSERT_COLUMNS: usize = 10;

// Keeps one statement well under SQLite's bound-parameter limit.
const ROWS_PER_STATEMENT: usize = 500;

/// Insert a batch as multi-row `VALUES` statements.
fn flush_batch(tx: &Transaction, file_id: i64, batch: &mut Vec<NewCharge>) -> Result<usize> {
    let count = batch.len();
    for chunk in batch.chunks(ROWS_PER_STATEMENT) {
        let row = format!("({})", vec!["?"; CHARGE_INSERT_COLUMNS].join(", "));
        let sql = format!(
            "INSERT INTO charges (file_id, subscriber_id, subscriber_name, plan, coverage_type, status, \
             coverage_dates, charge_amount, month, year) VALUES {}",
            vec![row; chunk.len()].join(", ")
        );
        let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * CHARGE_INSERT_COLUMNS);
        for c in chunk {
            values.extend([
                Value::from(file_id),
                Value::from(c.subscriber_id.clone()),
                Value::from(c.subscriber_name.clone()),
                Value::from(c.plan.clone()),
                Value::from(c.coverage_type.clone()),
                Value::from(c.status.clone()),
                Value::from(c.coverage_dates.clone()),
                Value::from(c.charge_amount),
                Value::from(c.month.clone()),
                Value::from(c.year),
            ]);
        }
        tx.prepare_cached(&sql)?
            .execute(rusqlite::params_from_iter(values))?;
    }
    batch.clear();
    debug!(file_id, rows = count, "flushed charge batch");
    Ok(count)
}

/// Decode, parse, normalize, classify, allocate and persist one uploaded file.
///
/// The duplicate check and every insert share one IMMEDIATE transaction, so a
/// concurrent upload under the same identifier waits and then sees the
/// committed file. Any error after the transaction opens rolls back the whole
/// file; individual bad rows are logged and skipped.
pub fn import_upload(
    conn: &mut Connection,
    request: &UploadRequest,
    opts: &IngestOptions,
) -> Result<ImportResult> {
    let id = PlanIdentifier::parse(&request.plan_identifier)?;
    let bytes = decode_payload(&request.base64_content)?;
    info!(plan = %id.raw, bytes = bytes.len(), "decoded upload");

    let table = parse_table(&bytes)?;
    let columns = ColumnMap::resolve(&table.headers)?;
    info!(
        plan = %id.raw,
        rows = table.rows.len(),
        amount_column = columns.header(crate::normalizer::Field::Amount).unwrap_or(""),
        "resolved columns"
    );

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if plan_exists(&tx, &id.raw)? {
        info!(plan = %id.raw, "plan identifier already uploaded");
        return Ok(ImportResult::duplicate());
    }

    let inserted = tx.execute(
        "INSERT INTO uploaded_files (plan_name, file_name, upload_date, month, year, checksum) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.raw,
            request.file_name,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            id.month.code(),
            id.year,
            compute_checksum(&bytes),
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Ok(ImportResult::duplicate()),
        Err(e) => return Err(e.into()),
    }
    let file_id = tx.last_insert_rowid();

    let batch_size = opts.batch_size.max(1);
    let mut batch: Vec<NewCharge> = Vec::with_capacity(batch_size.min(table.rows.len()));
    let mut imported = 0usize;
    let mut skipped = 0usize;

    for (idx, raw) in table.rows.iter().enumerate() {
        let normalized = columns.normalize(raw);
        match process_row(&normalized, &id, opts) {
            Ok(charge) => batch.push(charge),
            Err(reason) => {
                // +2: one for the header, one for 1-based numbering
                warn!(plan = %id.raw, row = idx + 2, %reason, "dropping row");
                skipped += 1;
                continue;
            }
        }
        if batch.len() >= batch_size {
            imported += flush_batch(&tx, file_id, &mut batch)?;
        }
    }
    imported += flush_batch(&tx, file_id, &mut batch)?;

    tx.execute(
        "UPDATE uploaded_files SET row_count = ?1 WHERE id = ?2",
        rusqlite::params![imported as i64, file_id],
    )?;
    tx.commit()?;
    info!(plan = %id.raw, imported, skipped, "upload committed");

    Ok(ImportResult {
        imported,
        skipped,
        duplicate_file: false,
    })
}

// ---------------------------------------------------------------------------
// File management
// ---------------------------------------------------------------------------

/// Delete a file and its charges; returns how many charges were removed.
pub fn delete_file(conn: &mut Connection, plan_name: &str) -> Result<usize> {
    let plan_name = plan_name.trim().to_uppercase();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let file_id: i64 = tx
        .query_row(
            "SELECT id FROM uploaded_files WHERE plan_name = ?1",
            [&plan_name],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| LedgerError::FileNotFound(plan_name.clone()))?;
    let removed = tx.execute("DELETE FROM charges WHERE file_id = ?1", [file_id])?;
    tx.execute("DELETE FROM uploaded_files WHERE id = ?1", [file_id])?;
    tx.commit()?;
    info!(plan = %plan_name, charges = removed, "deleted file");
    Ok(removed)
}

pub fn list_files(conn: &Connection) -> Result<Vec<UploadedFile>> {
    let mut stmt = conn.prepare(
        "SELECT id, plan_name, file_name, upload_date, month, year, checksum, row_count \
         FROM uploaded_files ORDER BY upload_date DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(UploadedFile {
                id: row.get(0)?,
                plan_name: row.get(1)?,
                file_name: row.get(2)?,
                upload_date: row.get(3)?,
                month: row.get(4)?,
                year: row.get(5)?,
                checksum: row.get(6)?,
                row_count: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{get_connection, init_db, test_db};

    pub(crate) fn b64(content: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(content.as_bytes())
    }

    pub(crate) fn charge_count_for(conn: &Connection, plan_name: &str) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT count(*) FROM charges c JOIN uploaded_files f ON c.file_id = f.id \
             WHERE f.plan_name = ?1",
            [plan_name.trim().to_uppercase()],
            |r| r.get(0),
        )?)
    }

    pub(crate) fn request(plan: &str, csv: &str) -> UploadRequest {
        UploadRequest {
            file_name: format!("{plan}.csv"),
            base64_content: b64(csv),
            plan_identifier: plan.to_string(),
        }
    }

    fn import(conn: &mut Connection, plan: &str, csv: &str) -> Result<ImportResult> {
        let classifier = PlanClassifier::default();
        let opts = IngestOptions {
            classifier: &classifier,
            calendar: FiscalCalendar::default(),
            batch_size: 1000,
        };
        import_upload(conn, &request(plan, csv), &opts)
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |r| r.get(0)).unwrap()
    }

    const UHC_CSV: &str = "\
Subscriber ID,Subscriber Name,Coverage Type,Adj Code,Coverage Dates,Charge Amount
100,\"DOE, JANE\",EE,,10/01/2024-10/31/2024,\"$1,234.56\"
101,\"ROE, RICK\",ES,term,09/01/2024-09/30/2024,-45.10
102,\"POE, ED\",EF,,10/01/2024-10/31/2024,n/a
";

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("  -42.50  "), Some(-42.5));
        assert_eq!(parse_amount("-$50.00"), Some(-50.0));
        assert_eq!(parse_amount("(1,234.56)"), Some(-1234.56));
        assert_eq!(parse_amount("0"), Some(0.0));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount("NaN"), None);
    }

    #[test]
    fn test_parse_amount_strips_other_currency_symbols() {
        assert_eq!(parse_amount("€100"), Some(100.0));
        assert_eq!(parse_amount("£1,200.00"), Some(1200.0));
        assert_eq!(parse_amount("¥ 5000"), Some(5000.0));
        assert_eq!(parse_amount("(€12.50)"), Some(-12.5));
    }

    #[test]
    fn test_decode_payload_strips_data_url_prefix() {
        let encoded = format!("data:text/csv;base64,{}", b64("Amount\n1\n"));
        assert_eq!(decode_payload(&encoded).unwrap(), b"Amount\n1\n");
    }

    #[test]
    fn test_decode_payload_tolerates_line_breaks() {
        let encoded = b64("Amount\n1\n");
        let (a, b) = encoded.split_at(4);
        assert_eq!(decode_payload(&format!("{a}\n{b}\n")).unwrap(), b"Amount\n1\n");
    }

    #[test]
    fn test_decode_payload_rejects_bad_base64() {
        assert!(matches!(decode_payload("@@not base64@@"), Err(LedgerError::Decode(_))));
        assert!(matches!(decode_payload(""), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_parse_table_falls_back_to_csv() {
        let table = parse_table(b"\n Amount , Plan \n1,A\n,\n2,B\n").unwrap();
        assert_eq!(table.headers, vec!["Amount", "Plan"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_parse_table_rejects_unreadable_content() {
        assert!(matches!(parse_table(b""), Err(LedgerError::UnreadableFile(_))));
        assert!(matches!(
            parse_table(&[0xff, 0xfe, 0x00, 0x81, b'\n', 0xc3]),
            Err(LedgerError::UnreadableFile(_))
        ));
    }

    #[test]
    fn test_number_text() {
        assert_eq!(number_text(10023.0), "10023");
        assert_eq!(number_text(12.5), "12.5");
    }

    #[test]
    fn test_import_skips_unparseable_rows() {
        let (_dir, mut conn) = test_db();
        let result = import(&mut conn, "UHC-3000-OCT-2024", UHC_CSV).unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped, 1);
        assert!(!result.duplicate_file);
        assert_eq!(charge_count_for(&conn, "UHC-3000-OCT-2024").unwrap(), 2);
        let amount: f64 = conn
            .query_row("SELECT charge_amount FROM charges WHERE subscriber_id = '100'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(amount, 1234.56);
    }

    #[test]
    fn test_import_records_file_metadata() {
        let (_dir, mut conn) = test_db();
        import(&mut conn, "uhc-3000-oct-2024", UHC_CSV).unwrap();
        let files = list_files(&conn).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].plan_name, "UHC-3000-OCT-2024");
        assert_eq!(files[0].month, "OCT");
        assert_eq!(files[0].year, 2024);
        assert_eq!(files[0].row_count, 2);
        assert_eq!(files[0].checksum.as_ref().map(|c| c.len()), Some(64));
    }

    #[test]
    fn test_import_normalizes_status_and_allocates_year() {
        let (_dir, mut conn) = test_db();
        import(&mut conn, "UHC-3000-OCT-2024", UHC_CSV).unwrap();
        let rows: Vec<(String, String, i32, String)> = conn
            .prepare("SELECT subscriber_id, status, year, plan FROM charges ORDER BY id")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0], ("100".to_string(), "NO ADJUSTMENTS".to_string(), 2024, "UHC-3000".to_string()));
        assert_eq!(rows[1], ("101".to_string(), "TERM".to_string(), 2023, "UHC-3000".to_string()));
    }

    #[test]
    fn test_duplicate_plan_identifier_is_rejected() {
        let (_dir, mut conn) = test_db();
        import(&mut conn, "UHC-3000-OCT-2024", UHC_CSV).unwrap();
        let second = import(&mut conn, "UHC-3000-OCT-2024", "Amount\n1\n2\n3\n").unwrap();
        assert!(second.duplicate_file);
        assert_eq!(second.imported, 0);
        assert_eq!(charge_count_for(&conn, "UHC-3000-OCT-2024").unwrap(), 2);
        assert_eq!(count(&conn, "SELECT count(*) FROM uploaded_files"), 1);
    }

    #[test]
    fn test_missing_amount_column_persists_nothing() {
        let (_dir, mut conn) = test_db();
        let err = import(&mut conn, "UHC-3000-OCT-2024", "Name,Total\nA,1\n").unwrap_err();
        assert!(matches!(err, LedgerError::MissingAmountColumn { .. }));
        assert_eq!(count(&conn, "SELECT count(*) FROM uploaded_files"), 0);
    }

    #[test]
    fn test_malformed_identifier_fails_before_decoding() {
        let (_dir, mut conn) = test_db();
        let classifier = PlanClassifier::default();
        let opts = IngestOptions {
            classifier: &classifier,
            calendar: FiscalCalendar::default(),
            batch_size: 1000,
        };
        let req = UploadRequest {
            file_name: "x.csv".to_string(),
            base64_content: "@@@".to_string(),
            plan_identifier: "UHC-OCTOBER".to_string(),
        };
        let err = import_upload(&mut conn, &req, &opts).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPlanIdentifier(_)));
    }

    #[test]
    fn test_uhg_rows_are_classified() {
        let (_dir, mut conn) = test_db();
        let csv = "\
ID,Plan,Policy,Coverage Type,Premium
1 - SMITH,Dental Plan,,EE,10
2 - JONES,,VSP,EE,5
3 - BROWN,Basic,GTL,EE,7
4 - GREEN,Medical,,EE,3
";
        import(&mut conn, "UHG-OCT-2024", csv).unwrap();
        let plans: Vec<(String, String, String)> = conn
            .prepare("SELECT subscriber_id, subscriber_name, plan FROM charges ORDER BY id")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(plans[0], ("1".to_string(), "SMITH".to_string(), "UHG-DENTAL".to_string()));
        assert_eq!(plans[1].2, "UHG-VISION");
        assert_eq!(plans[2].2, "UHG-LIFE");
        assert_eq!(plans[3].2, "UHG-OTHER");
    }

    #[test]
    fn test_small_batches_persist_every_row() {
        let (_dir, mut conn) = test_db();
        let classifier = PlanClassifier::default();
        let opts = IngestOptions {
            classifier: &classifier,
            calendar: FiscalCalendar::default(),
            batch_size: 2,
        };
        let csv = "Amount\n1\n2\n3\n4\n5\n";
        let result = import_upload(&mut conn, &request("UHC-2000-NOV-2024", csv), &opts).unwrap();
        assert_eq!(result.imported, 5);
        assert_eq!(count(&conn, "SELECT count(*) FROM charges"), 5);
        assert_eq!(count(&conn, "SELECT CAST(SUM(charge_amount) AS INTEGER) FROM charges"), 15);
    }

    #[test]
    fn test_multi_statement_batch_persists_every_row() {
        let (_dir, mut conn) = test_db();
        let classifier = PlanClassifier::default();
        let opts = IngestOptions {
            classifier: &classifier,
            calendar: FiscalCalendar::default(),
            batch_size: 5000,
        };
        let mut csv = String::from("Amount\n");
        for i in 1..=1203 {
            csv.push_str(&format!("{i}\n"));
        }
        let result = import_upload(&mut conn, &request("UHC-2000-DEC-2024", &csv), &opts).unwrap();
        assert_eq!(result.imported, 1203);
        assert_eq!(count(&conn, "SELECT count(*) FROM charges"), 1203);
        assert_eq!(count(&conn, "SELECT row_count FROM uploaded_files"), 1203);
    }

    #[test]
    fn test_failure_after_first_batch_rolls_back_file() {
        let (_dir, mut conn) = test_db();
        conn.execute_batch(
            "CREATE TRIGGER reject_fourth BEFORE INSERT ON charges \
             WHEN (SELECT count(*) FROM charges) >= 3 \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();
        let classifier = PlanClassifier::default();
        let opts = IngestOptions {
            classifier: &classifier,
            calendar: FiscalCalendar::default(),
            batch_size: 2,
        };
        let csv = "Amount\n1\n2\n3\n4\n5\n";
        let result = import_upload(&mut conn, &request("UHC-2000-NOV-2024", csv), &opts);
        assert!(matches!(result, Err(LedgerError::Db(_))), "{result:?}");
        assert_eq!(count(&conn, "SELECT count(*) FROM uploaded_files"), 0);
        assert_eq!(count(&conn, "SELECT count(*) FROM charges"), 0);
    }

    #[test]
    fn test_undated_rows_share_year_with_dated_rows_in_file_month() {
        let (_dir, mut conn) = test_db();
        let csv = "Subscriber ID,Coverage Dates,Amount\n1,01/01/2025,10\n2,,20\n";
        import(&mut conn, "UHC-3000-JAN-2025", csv).unwrap();
        let years: Vec<i32> = conn
            .prepare("SELECT year FROM charges ORDER BY subscriber_id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(years, vec![2024, 2024]);
    }

    #[test]
    fn test_delete_file_removes_charges() {
        let (_dir, mut conn) = test_db();
        import(&mut conn, "UHC-3000-OCT-2024", UHC_CSV).unwrap();
        import(&mut conn, "UHC-2000-OCT-2024", UHC_CSV).unwrap();
        let removed = delete_file(&mut conn, "UHC-3000-OCT-2024").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(charge_count_for(&conn, "UHC-3000-OCT-2024").unwrap(), 0);
        assert_eq!(charge_count_for(&conn, "UHC-2000-OCT-2024").unwrap(), 2);
        assert_eq!(list_files(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_unknown_file() {
        let (_dir, mut conn) = test_db();
        let err = delete_file(&mut conn, "UHC-3000-OCT-2024").unwrap_err();
        assert!(matches!(err, LedgerError::FileNotFound(_)));
    }

    #[test]
    fn test_reupload_after_delete() {
        let (_dir, mut conn) = test_db();
        import(&mut conn, "UHC-3000-OCT-2024", UHC_CSV).unwrap();
        delete_file(&mut conn, "UHC-3000-OCT-2024").unwrap();
        let again = import(&mut conn, "UHC-3000-OCT-2024", UHC_CSV).unwrap();
        assert!(!again.duplicate_file);
        assert_eq!(again.imported, 2);
    }

    #[test]
    fn test_list_files_newest_first() {
        let (_dir, mut conn) = test_db();
        import(&mut conn, "UHC-3000-OCT-2024", UHC_CSV).unwrap();
        import(&mut conn, "UHC-3000-NOV-2024", UHC_CSV).unwrap();
        let files = list_files(&conn).unwrap();
        assert_eq!(files[0].plan_name, "UHC-3000-NOV-2024");
        assert_eq!(files[1].plan_name, "UHC-3000-OCT-2024");
    }

    #[test]
    fn test_concurrent_uploads_same_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        init_db(&get_connection(&path).unwrap()).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut conn = get_connection(&path).unwrap();
                    import(&mut conn, "UHG-DEC-2024", "Amount,Plan\n1,Dental\n2,Vision\n").unwrap()
                })
            })
            .collect();
        let results: Vec<ImportResult> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.duplicate_file).count(), 1);
        assert_eq!(results.iter().filter(|r| r.imported == 2).count(), 1);
        let conn = get_connection(&path).unwrap();
        assert_eq!(charge_count_for(&conn, "UHG-DEC-2024").unwrap(), 2);
    }
}
