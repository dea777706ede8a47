use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{open_ledger, page_footer};
use crate::error::{LedgerError, Result};
use crate::fmt::money;
use crate::models::{packed_subscriber, ChargeRecord, Page};
use crate::reports::{ChangeKind, HistoryEntry, SummaryFilter};

pub fn summary(
    plan: Option<String>,
    month: Option<String>,
    year: Option<i32>,
    page: u32,
    limit: u32,
) -> Result<()> {
    let page = Page::new(page, limit)?;
    let mut ledger = open_ledger()?;
    let n = ledger.settings().report_fiscal_year;
    let filter = SummaryFilter { plan, month, year };
    let rows = ledger.summaries(&filter, page);

    let mut table = Table::new();
    table.set_header(vec![
        "Plan".to_string(),
        "Month".to_string(),
        "Year".to_string(),
        "Current".to_string(),
        "Previous".to_string(),
        format!("FY{n}"),
        format!("FY{}", n + 1),
        "Total".to_string(),
    ]);
    for s in &rows.items {
        let plan = if s.plan_type.ends_with("-OTHER") {
            Cell::new(s.plan_type.as_str().yellow())
        } else {
            Cell::new(&s.plan_type)
        };
        table.add_row(vec![
            plan,
            Cell::new(&s.month),
            Cell::new(s.year),
            Cell::new(money(s.current_month_total)),
            Cell::new(money(s.previous_months_total)),
            Cell::new(money(s.fiscal_n_total)),
            Cell::new(money(s.fiscal_n1_total)),
            Cell::new(money(s.grand_total).bold()),
        ]);
    }
    println!("Plan Summary\n{table}");
    println!("{}", page_footer(&rows, page.page, page.limit));
    Ok(())
}

pub fn fiscal() -> Result<()> {
    let mut ledger = open_ledger()?;
    let n = ledger.settings().report_fiscal_year;
    let totals = ledger.fiscal_totals();

    let mut table = Table::new();
    table.set_header(vec!["Fiscal Year", "Total"]);
    for (fy, total) in &totals.by_year {
        table.add_row(vec![Cell::new(format!("FY{fy}")), Cell::new(money(*total))]);
    }
    let grand: f64 = totals.by_year.values().sum();
    table.add_row(vec![Cell::new("Total".bold()), Cell::new(money(grand).bold())]);
    println!("Fiscal Year Totals\n{table}");
    println!(
        "FY{n}: {}   FY{}: {}",
        money(totals.total_for(n)),
        n + 1,
        money(totals.total_for(n + 1))
    );
    Ok(())
}

pub fn costs() -> Result<()> {
    let rows = open_ledger()?.cost_analysis();

    let mut table = Table::new();
    table.set_header(vec!["Plan", "Total", "Average", "Charges", "Subscribers"]);
    for c in &rows {
        table.add_row(vec![
            Cell::new(&c.plan),
            Cell::new(money(c.total_cost)),
            Cell::new(money(c.average_cost)),
            Cell::new(c.policy_count),
            Cell::new(c.subscriber_count),
        ]);
    }
    let total: f64 = rows.iter().map(|c| c.total_cost).sum();
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(money(total).bold()),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
    ]);
    println!("Cost Analysis\n{table}");
    Ok(())
}

pub fn coverage() -> Result<()> {
    let rows = open_ledger()?.coverage_analysis();

    let mut table = Table::new();
    table.set_header(vec!["Coverage", "Plan", "Total", "Average", "Charges", "Subscribers"]);
    for c in &rows {
        table.add_row(vec![
            Cell::new(&c.coverage_type),
            Cell::new(&c.plan),
            Cell::new(money(c.total_premium)),
            Cell::new(money(c.average_premium)),
            Cell::new(c.charge_count),
            Cell::new(c.subscriber_count),
        ]);
    }
    println!("Coverage Analysis\n{table}");
    Ok(())
}

pub fn metrics() -> Result<()> {
    let m = open_ledger()?.metrics();

    println!("Subscribers:     {}", m.total_subscribers);
    println!("Total premium:   {}", money(m.total_premium));
    println!("Average premium: {}", money(m.average_premium));

    let mut plans = Table::new();
    plans.set_header(vec!["Plan", "Subscribers"]);
    for (plan, count) in &m.plan_distribution {
        plans.add_row(vec![Cell::new(plan), Cell::new(count)]);
    }
    println!("\nBy Plan\n{plans}");

    let mut coverage = Table::new();
    coverage.set_header(vec!["Coverage", "Subscribers"]);
    for (kind, count) in &m.coverage_distribution {
        coverage.add_row(vec![Cell::new(kind), Cell::new(count)]);
    }
    println!("\nBy Coverage\n{coverage}");
    Ok(())
}

fn charge_table(records: &[ChargeRecord]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Subscriber",
        "Plan",
        "Coverage",
        "Status",
        "Coverage Dates",
        "Amount",
        "Month",
        "Year",
    ]);
    for r in records {
        let amount = if r.charge_amount < 0.0 {
            Cell::new(money(r.charge_amount).red())
        } else {
            Cell::new(money(r.charge_amount))
        };
        table.add_row(vec![
            Cell::new(packed_subscriber(&r.subscriber_id, &r.subscriber_name)),
            Cell::new(&r.plan),
            Cell::new(&r.coverage_type),
            Cell::new(&r.status),
            Cell::new(&r.coverage_dates),
            amount,
            Cell::new(&r.month),
            Cell::new(r.year),
        ]);
    }
    table
}

pub fn employees(search: Option<String>, page: u32, limit: u32) -> Result<()> {
    let page = Page::new(page, limit)?;
    let rows = open_ledger()?.employees(search.as_deref(), page);
    println!("Employees\n{}", charge_table(&rows.items));
    println!("{}", page_footer(&rows, page.page, page.limit));
    Ok(())
}

pub fn charges(search: Option<String>, plan: Option<String>, page: u32, limit: u32) -> Result<()> {
    let page = Page::new(page, limit)?;
    let rows = open_ledger()?.charges(search.as_deref(), plan.as_deref(), page);
    println!("Charges\n{}", charge_table(&rows.items));
    println!("{}", page_footer(&rows, page.page, page.limit));
    Ok(())
}

fn change_label(kind: ChangeKind) -> colored::ColoredString {
    match kind {
        ChangeKind::NewEnrollment => "new enrollment".green(),
        ChangeKind::Termination => "termination".red(),
        ChangeKind::CoverageChange => "coverage change".yellow(),
        ChangeKind::RateChange => "rate change".yellow(),
        ChangeKind::Unchanged => "unchanged".normal(),
    }
}

fn history_row(entry: &HistoryEntry) -> Vec<Cell> {
    vec![
        Cell::new(format!("{} {}", entry.snapshot.file_month, entry.snapshot.file_year)),
        Cell::new(&entry.record.coverage_dates),
        Cell::new(&entry.record.coverage_type),
        Cell::new(&entry.record.status),
        Cell::new(money(entry.record.charge_amount)),
        Cell::new(format!("FY{}", entry.snapshot.fiscal_year)),
        Cell::new(format!("{:?}", entry.snapshot.period)),
        Cell::new(change_label(entry.change)),
    ]
}

pub fn history(subscriber: &str) -> Result<()> {
    let history = open_ledger()?
        .history(subscriber)
        .ok_or_else(|| LedgerError::Other(format!("No charges found for subscriber {subscriber}")))?;

    println!(
        "{}",
        packed_subscriber(&history.subscriber_id, &history.subscriber_name).bold()
    );
    for plan in &history.plans {
        let mut table = Table::new();
        table.set_header(vec![
            "File", "Coverage Dates", "Coverage", "Status", "Amount", "Fiscal", "Period", "Change",
        ]);
        for entry in &plan.history {
            table.add_row(history_row(entry));
        }
        table.add_row(history_row(&plan.latest));
        println!("\n{}\n{table}", plan.plan.bold());
    }
    Ok(())
}
