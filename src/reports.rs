use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::fiscal::{parse_coverage_start, FiscalCalendar, Month, Period};
use crate::models::{packed_subscriber, ChargeRecord, Page, Paged};

const CHARGE_COLUMNS: &str = "c.id, c.file_id, c.subscriber_id, c.subscriber_name, c.plan, \
     c.coverage_type, c.status, c.coverage_dates, c.charge_amount, c.month, c.year";

const SUBSCRIBER_KEY: &str =
    "CASE WHEN c.subscriber_id <> '' THEN c.subscriber_id ELSE c.subscriber_name END";

fn charge_from_row(row: &rusqlite::Row) -> rusqlite::Result<ChargeRecord> {
    Ok(ChargeRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        subscriber_id: row.get(2)?,
        subscriber_name: row.get(3)?,
        plan: row.get(4)?,
        coverage_type: row.get(5)?,
        status: row.get(6)?,
        coverage_dates: row.get(7)?,
        charge_amount: row.get(8)?,
        month: row.get(9)?,
        year: row.get(10)?,
    })
}

fn month_number(code: &str) -> u32 {
    Month::from_code(code).map_or(0, Month::number)
}

// ---------------------------------------------------------------------------
// Filter helpers
// ---------------------------------------------------------------------------

/// WHERE-clause fragments plus their positional parameters.
#[derive(Default)]
struct Clauses {
    parts: Vec<String>,
    params: Vec<Value>,
}

impl Clauses {
    fn push_param(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn add(&mut self, part: String) {
        self.parts.push(part);
    }

    fn where_sql(&self) -> String {
        if self.parts.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.parts.join(" AND "))
        }
    }

    /// Case-insensitive substring search across the listing fields.
    fn search(&mut self, search: Option<&str>) {
        let Some(text) = search.map(str::trim).filter(|s| !s.is_empty()) else {
            return;
        };
        let escaped = text
            .to_lowercase()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let p = self.push_param(Value::Text(format!("%{escaped}%")));
        let fields = [
            "c.subscriber_name",
            "c.subscriber_id",
            "c.coverage_type",
            "c.plan",
            "c.status",
            "c.coverage_dates",
        ];
        let ors: Vec<String> = fields
            .iter()
            .map(|f| format!("fold_case({f}) LIKE {p} ESCAPE '\\'"))
            .collect();
        self.add(format!("({})", ors.join(" OR ")));
    }

    fn plan(&mut self, plan: Option<&str>) {
        if let Some(plan) = plan.map(str::trim).filter(|s| !s.is_empty()) {
            let p = self.push_param(Value::Text(plan.to_uppercase()));
            self.add(format!("upper(c.plan) = {p}"));
        }
    }
}

fn query_charges(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<ChargeRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), charge_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_count(conn: &Connection, sql: &str, params: &[Value]) -> Result<usize> {
    let n: i64 = conn.query_row(sql, rusqlite::params_from_iter(params.iter()), |r| r.get(0))?;
    Ok(n.max(0) as usize)
}

// ---------------------------------------------------------------------------
// Monthly / fiscal summary per plan per file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub plan_type: String,
    pub month: String,
    pub year: i32,
    pub current_month_total: f64,
    pub previous_months_total: f64,
    /// Totals for the configured fiscal year N and N+1.
    pub fiscal_n_total: f64,
    pub fiscal_n1_total: f64,
    pub grand_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SummaryFilter {
    pub plan: Option<String>,
    pub month: Option<String>,
    pub year: Option<i32>,
}

impl SummaryFilter {
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.plan.as_deref().unwrap_or("*"),
            self.month.as_deref().unwrap_or("*"),
            self.year.map_or("*".to_string(), |y| y.to_string())
        )
    }
}

pub fn get_plan_summaries(
    conn: &Connection,
    calendar: &FiscalCalendar,
    fiscal_n: i32,
    filter: &SummaryFilter,
) -> Result<Vec<PlanSummary>> {
    let mut clauses = Clauses::default();
    clauses.plan(filter.plan.as_deref());
    if let Some(month) = filter.month.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        let p = clauses.push_param(Value::Text(month.to_uppercase()));
        clauses.add(format!("f.month = {p}"));
    }
    if let Some(year) = filter.year {
        let p = clauses.push_param(Value::Integer(year as i64));
        clauses.add(format!("f.year = {p}"));
    }

    let sql = format!(
        "SELECT f.id, f.month, f.year, c.plan, c.coverage_dates, c.charge_amount \
         FROM charges c JOIN uploaded_files f ON c.file_id = f.id {}",
        clauses.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(clauses.params.iter()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i32>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, f64>(5)?,
        ))
    })?;

    // (file year, file month, plan, file id) keeps output in reporting order
    let mut groups: BTreeMap<(i32, u32, String, i64), PlanSummary> = BTreeMap::new();
    for row in rows {
        let (file_id, month, year, plan, dates, amount) = row?;
        let file_month = month_number(&month);
        let coverage = parse_coverage_start(&dates);
        let entry = groups
            .entry((year, file_month, plan.clone(), file_id))
            .or_insert_with(|| PlanSummary {
                plan_type: plan,
                month,
                year,
                current_month_total: 0.0,
                previous_months_total: 0.0,
                fiscal_n_total: 0.0,
                fiscal_n1_total: 0.0,
                grand_total: 0.0,
            });
        match calendar.period(coverage, file_month, year) {
            Period::Current => entry.current_month_total += amount,
            Period::Previous => entry.previous_months_total += amount,
        }
        let fy = calendar.fiscal_year_of(coverage, file_month, year);
        if fy == fiscal_n {
            entry.fiscal_n_total += amount;
        } else if fy == fiscal_n + 1 {
            entry.fiscal_n1_total += amount;
        }
    }

    Ok(groups
        .into_values()
        .filter(|s| s.current_month_total != 0.0 || s.previous_months_total != 0.0)
        .map(|mut s| {
            s.grand_total = s.current_month_total + s.previous_months_total;
            s
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Fiscal-year totals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FiscalTotals {
    pub by_year: BTreeMap<i32, f64>,
}

impl FiscalTotals {
    pub fn total_for(&self, fiscal_year: i32) -> f64 {
        self.by_year.get(&fiscal_year).copied().unwrap_or(0.0)
    }
}

/// Totals per fiscal year across all plans, pre-aggregated in SQL by
/// (coverage dates, file period) so no per-plan rows are built.
pub fn get_fiscal_totals(conn: &Connection, calendar: &FiscalCalendar) -> Result<FiscalTotals> {
    let mut stmt = conn.prepare(
        "SELECT c.coverage_dates, f.month, f.year, SUM(c.charge_amount) \
         FROM charges c JOIN uploaded_files f ON c.file_id = f.id \
         GROUP BY c.coverage_dates, f.month, f.year",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i32>(2)?,
            row.get::<_, f64>(3)?,
        ))
    })?;

    let mut totals = FiscalTotals::default();
    for row in rows {
        let (dates, month, year, amount) = row?;
        let fy = calendar.fiscal_year_of(parse_coverage_start(&dates), month_number(&month), year);
        *totals.by_year.entry(fy).or_default() += amount;
    }
    Ok(totals)
}

// ---------------------------------------------------------------------------
// Cost and coverage analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostAnalysis {
    pub plan: String,
    pub total_cost: f64,
    pub average_cost: f64,
    pub policy_count: i64,
    pub subscriber_count: i64,
}

pub fn get_cost_analysis(conn: &Connection) -> Result<Vec<CostAnalysis>> {
    let sql = format!(
        "SELECT c.plan, SUM(c.charge_amount), AVG(c.charge_amount), COUNT(*), \
         COUNT(DISTINCT {SUBSCRIBER_KEY}) \
         FROM charges c GROUP BY c.plan ORDER BY c.plan"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CostAnalysis {
                plan: row.get(0)?,
                total_cost: row.get(1)?,
                average_cost: row.get(2)?,
                policy_count: row.get(3)?,
                subscriber_count: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageAnalysis {
    pub coverage_type: String,
    pub plan: String,
    pub total_premium: f64,
    pub average_premium: f64,
    pub charge_count: i64,
    pub subscriber_count: i64,
}

pub fn get_coverage_analysis(conn: &Connection) -> Result<Vec<CoverageAnalysis>> {
    let sql = format!(
        "SELECT c.coverage_type, c.plan, SUM(c.charge_amount), AVG(c.charge_amount), COUNT(*), \
         COUNT(DISTINCT {SUBSCRIBER_KEY}) \
         FROM charges c GROUP BY c.coverage_type, c.plan ORDER BY c.coverage_type, c.plan"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CoverageAnalysis {
                coverage_type: row.get(0)?,
                plan: row.get(1)?,
                total_premium: row.get(2)?,
                average_premium: row.get(3)?,
                charge_count: row.get(4)?,
                subscriber_count: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_subscribers: i64,
    pub total_premium: f64,
    pub average_premium: f64,
    /// Distinct subscribers per plan.
    pub plan_distribution: BTreeMap<String, i64>,
    /// Distinct subscribers per coverage type.
    pub coverage_distribution: BTreeMap<String, i64>,
}

fn distribution(conn: &Connection, column: &str) -> Result<BTreeMap<String, i64>> {
    let sql = format!(
        "SELECT {column}, COUNT(DISTINCT {SUBSCRIBER_KEY}) FROM charges c GROUP BY {column}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

pub fn get_metrics(conn: &Connection) -> Result<DashboardMetrics> {
    let sql = format!(
        "SELECT COUNT(DISTINCT {SUBSCRIBER_KEY}), COALESCE(SUM(c.charge_amount), 0), \
         COALESCE(AVG(c.charge_amount), 0) FROM charges c"
    );
    let (total_subscribers, total_premium, average_premium): (i64, f64, f64) =
        conn.query_row(&sql, [], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
    Ok(DashboardMetrics {
        total_subscribers,
        total_premium,
        average_premium,
        plan_distribution: distribution(conn, "c.plan")?,
        coverage_distribution: distribution(conn, "c.coverage_type")?,
    })
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// Latest record (by id) per subscriber, searchable and paginated.
pub fn get_unique_employees(
    conn: &Connection,
    search: Option<&str>,
    page: Page,
) -> Result<Paged<ChargeRecord>> {
    let mut clauses = Clauses::default();
    clauses.add(format!(
        "c.id IN (SELECT MAX(c.id) FROM charges c GROUP BY {SUBSCRIBER_KEY})"
    ));
    clauses.search(search);
    paged_charges(conn, clauses, page)
}

/// Every charge record, searchable, optionally restricted to one plan.
pub fn get_charges(
    conn: &Connection,
    search: Option<&str>,
    plan: Option<&str>,
    page: Page,
) -> Result<Paged<ChargeRecord>> {
    let mut clauses = Clauses::default();
    clauses.search(search);
    clauses.plan(plan);
    paged_charges(conn, clauses, page)
}

fn paged_charges(conn: &Connection, mut clauses: Clauses, page: Page) -> Result<Paged<ChargeRecord>> {
    let where_sql = clauses.where_sql();
    let total = query_count(
        conn,
        &format!("SELECT count(*) FROM charges c {where_sql}"),
        &clauses.params,
    )?;
    let limit = clauses.push_param(Value::Integer(page.limit as i64));
    let offset = clauses.push_param(Value::Integer(page.offset()));
    let sql = format!(
        "SELECT {CHARGE_COLUMNS} FROM charges c {where_sql} \
         ORDER BY c.subscriber_name COLLATE NOCASE, c.id LIMIT {limit} OFFSET {offset}"
    );
    Ok(Paged {
        total,
        items: query_charges(conn, &sql, &clauses.params)?,
    })
}

pub fn export_charges(
    conn: &Connection,
    search: Option<&str>,
    plan: Option<&str>,
) -> Result<Vec<ChargeRecord>> {
    let mut clauses = Clauses::default();
    clauses.search(search);
    clauses.plan(plan);
    let sql = format!(
        "SELECT {CHARGE_COLUMNS} FROM charges c {} ORDER BY c.id",
        clauses.where_sql()
    );
    query_charges(conn, &sql, &clauses.params)
}

pub fn write_charges_csv<W: std::io::Write>(records: &[ChargeRecord], out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record([
        "Subscriber",
        "Plan",
        "Coverage Type",
        "Status",
        "Coverage Dates",
        "Charge Amount",
        "Month",
        "Year",
    ])?;
    for r in records {
        wtr.write_record([
            packed_subscriber(&r.subscriber_id, &r.subscriber_name),
            r.plan.clone(),
            r.coverage_type.clone(),
            r.status.clone(),
            r.coverage_dates.clone(),
            format!("{:.2}", r.charge_amount),
            r.month.clone(),
            r.year.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-subscriber history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    NewEnrollment,
    Termination,
    CoverageChange,
    RateChange,
    Unchanged,
}

pub fn classify_change(previous: Option<&ChargeRecord>, current: &ChargeRecord) -> ChangeKind {
    let Some(prev) = previous else {
        return ChangeKind::NewEnrollment;
    };
    if current.status.contains("TERM")
        || (current.charge_amount <= 0.0 && prev.charge_amount > 0.0)
    {
        ChangeKind::Termination
    } else if !current.coverage_type.eq_ignore_ascii_case(&prev.coverage_type) {
        ChangeKind::CoverageChange
    } else if (current.charge_amount - prev.charge_amount).abs() > 0.01 {
        ChangeKind::RateChange
    } else {
        ChangeKind::Unchanged
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalSnapshot {
    pub file_month: String,
    pub file_year: i32,
    pub fiscal_year: i32,
    pub period: Period,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub record: ChargeRecord,
    pub snapshot: FiscalSnapshot,
    pub change: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanHistory {
    pub plan: String,
    pub latest: HistoryEntry,
    /// Earlier records for this plan, oldest first.
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberHistory {
    pub subscriber_id: String,
    pub subscriber_name: String,
    pub plans: Vec<PlanHistory>,
}

/// History for a subscriber id (or name, for records without an id).
pub fn get_subscriber_history(
    conn: &Connection,
    calendar: &FiscalCalendar,
    subscriber: &str,
) -> Result<Option<SubscriberHistory>> {
    let sql = format!(
        "SELECT {CHARGE_COLUMNS}, f.month, f.year FROM charges c \
         JOIN uploaded_files f ON c.file_id = f.id \
         WHERE {SUBSCRIBER_KEY} = ?1 ORDER BY c.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([subscriber.trim()], |row| {
            Ok((charge_from_row(row)?, row.get::<_, String>(11)?, row.get::<_, i32>(12)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let Some((last, _, _)) = rows.last() else {
        return Ok(None);
    };
    let subscriber_id = last.subscriber_id.clone();
    let subscriber_name = last.subscriber_name.clone();

    let mut by_plan: BTreeMap<String, Vec<HistoryEntry>> = BTreeMap::new();
    for (record, file_month, file_year) in rows {
        let entries = by_plan.entry(record.plan.clone()).or_default();
        let change = classify_change(entries.last().map(|e| &e.record), &record);
        let coverage = parse_coverage_start(&record.coverage_dates);
        let month_no = month_number(&file_month);
        let snapshot = FiscalSnapshot {
            fiscal_year: calendar.fiscal_year_of(coverage, month_no, file_year),
            period: calendar.period(coverage, month_no, file_year),
            file_month,
            file_year,
        };
        entries.push(HistoryEntry {
            record,
            snapshot,
            change,
        });
    }

    let plans = by_plan
        .into_iter()
        .filter_map(|(plan, mut history)| {
            let latest = history.pop()?;
            Some(PlanHistory {
                plan,
                latest,
                history,
            })
        })
        .collect();

    Ok(Some(SubscriberHistory {
        subscriber_id,
        subscriber_name,
        plans,
    }))
}
