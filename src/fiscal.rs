//! Coverage-date parsing and period allocation.
//!
//! Three independent rules are applied to a charge and none is derived from
//! another:
//! - the year a charge is stored under at ingestion ([`FiscalCalendar::allocation_year`]),
//! - whether it counts as current-month or a previous-month adjustment
//!   relative to its file ([`FiscalCalendar::period`]),
//! - the fiscal-year bucket used for totals ([`FiscalCalendar::fiscal_year_of`]).

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Month {
    Jan = 1,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn code(self) -> &'static str {
        match self {
            Month::Jan => "JAN",
            Month::Feb => "FEB",
            Month::Mar => "MAR",
            Month::Apr => "APR",
            Month::May => "MAY",
            Month::Jun => "JUN",
            Month::Jul => "JUL",
            Month::Aug => "AUG",
            Month::Sep => "SEP",
            Month::Oct => "OCT",
            Month::Nov => "NOV",
            Month::Dec => "DEC",
        }
    }

    pub fn from_code(code: &str) -> Option<Month> {
        let code = code.trim();
        Self::ALL
            .iter()
            .find(|m| m.code().eq_ignore_ascii_case(code))
            .copied()
    }
}

/// Calendar month/year extracted from a coverage-date string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageMonth {
    pub month: u32,
    pub year: i32,
}

/// Parse the start of a coverage range (`MM/DD/YYYY` or `MM/DD/YYYY-MM/DD/YYYY`).
/// Anything else is unparseable and yields `None`.
pub fn parse_coverage_start(raw: &str) -> Option<CoverageMonth> {
    let start = raw.split_once('-').map_or(raw, |(s, _)| s).trim();
    let parts: Vec<&str> = start.split('/').collect();
    if parts.len() != 3 || parts[2].len() != 4 {
        return None;
    }
    let m: u32 = parts[0].trim().parse().ok()?;
    let d: u32 = parts[1].trim().parse().ok()?;
    let y: i32 = parts[2].trim().parse().ok()?;
    chrono::NaiveDate::from_ymd_opt(y, m, d)?;
    Some(CoverageMonth { month: m, year: y })
}

/// Excel serial day number to `MM/DD/YYYY`.
pub fn excel_serial_to_mdy(serial: f64) -> Option<String> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(chrono::Duration::days(serial.trunc() as i64))?;
    Some(date.format("%m/%d/%Y").to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Period {
    Current,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalCalendar {
    pub start_month: u32,
}

impl Default for FiscalCalendar {
    fn default() -> Self {
        Self { start_month: 10 }
    }
}

impl FiscalCalendar {
    pub fn new(start_month: u32) -> Self {
        Self { start_month }
    }

    /// Fiscal year containing the given calendar month.
    pub fn fiscal_year(&self, month: u32, year: i32) -> i32 {
        if self.start_month > 1 && month >= self.start_month {
            year + 1
        } else {
            year
        }
    }

    /// Fiscal bucket for a charge; unparseable dates fall back to the file's period.
    pub fn fiscal_year_of(
        &self,
        coverage: Option<CoverageMonth>,
        file_month: u32,
        file_year: i32,
    ) -> i32 {
        match coverage {
            Some(c) => self.fiscal_year(c.month, c.year),
            None => self.fiscal_year(file_month, file_year),
        }
    }

    /// Year a charge is stored under at ingestion: the file's year from the
    /// fiscal start month onward, otherwise the year before. Unparseable
    /// dates are placed in the file's own month.
    pub fn allocation_year(
        &self,
        coverage: Option<CoverageMonth>,
        file_month: u32,
        file_year: i32,
    ) -> i32 {
        let month = coverage.map_or(file_month, |c| c.month);
        if month < self.start_month {
            file_year - 1
        } else {
            file_year
        }
    }

    /// Current-month when the coverage start equals the file's own period.
    pub fn period(&self, coverage: Option<CoverageMonth>, file_month: u32, file_year: i32) -> Period {
        match coverage {
            Some(c) if c.month != file_month || c.year != file_year => Period::Previous,
            _ => Period::Current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cm(month: u32, year: i32) -> Option<CoverageMonth> {
        Some(CoverageMonth { month, year })
    }

    #[test]
    fn test_month_codes() {
        assert_eq!(Month::from_code("oct"), Some(Month::Oct));
        assert_eq!(Month::from_code("DEC"), Some(Month::Dec));
        assert_eq!(Month::from_code("OCTOBER"), None);
        assert_eq!(Month::Sep.number(), 9);
    }

    #[test]
    fn test_parse_coverage_start_single_date() {
        assert_eq!(parse_coverage_start("10/01/2024"), cm(10, 2024));
        assert_eq!(parse_coverage_start(" 1/15/2025 "), cm(1, 2025));
    }

    #[test]
    fn test_parse_coverage_start_uses_range_start() {
        assert_eq!(parse_coverage_start("09/01/2024-09/30/2024"), cm(9, 2024));
        assert_eq!(parse_coverage_start("12/01/2024 - 12/31/2024"), cm(12, 2024));
    }

    #[test]
    fn test_parse_coverage_start_rejects_other_shapes() {
        assert_eq!(parse_coverage_start(""), None);
        assert_eq!(parse_coverage_start("2024-10-01"), None);
        assert_eq!(parse_coverage_start("10/2024"), None);
        assert_eq!(parse_coverage_start("13/01/2024"), None);
        assert_eq!(parse_coverage_start("02/30/2025"), None);
        assert_eq!(parse_coverage_start("10/01/24"), None);
        assert_eq!(parse_coverage_start("N/A - N/A"), None);
    }

    #[test]
    fn test_fiscal_year_starts_in_october() {
        let cal = FiscalCalendar::default();
        assert_eq!(cal.fiscal_year(10, 2024), 2025);
        assert_eq!(cal.fiscal_year(12, 2024), 2025);
        assert_eq!(cal.fiscal_year(9, 2024), 2024);
        assert_eq!(cal.fiscal_year(1, 2025), 2025);
    }

    #[test]
    fn test_fiscal_year_from_date_strings() {
        let cal = FiscalCalendar::default();
        for (raw, expected) in [("10/01/2024", 2025), ("09/30/2024", 2024), ("01/31/2025", 2025)] {
            let fy = cal.fiscal_year_of(parse_coverage_start(raw), 1, 1900);
            assert_eq!(fy, expected, "{raw}");
        }
    }

    #[test]
    fn test_fiscal_year_of_unparseable_uses_file_period() {
        let cal = FiscalCalendar::default();
        assert_eq!(cal.fiscal_year_of(None, 11, 2024), 2025);
        assert_eq!(cal.fiscal_year_of(None, 3, 2025), 2025);
    }

    #[test]
    fn test_calendar_year_fiscal_start() {
        let cal = FiscalCalendar::new(1);
        assert_eq!(cal.fiscal_year(1, 2025), 2025);
        assert_eq!(cal.fiscal_year(12, 2025), 2025);
    }

    #[test]
    fn test_allocation_year() {
        let cal = FiscalCalendar::default();
        assert_eq!(cal.allocation_year(cm(10, 2024), 10, 2024), 2024);
        assert_eq!(cal.allocation_year(cm(11, 2024), 11, 2024), 2024);
        assert_eq!(cal.allocation_year(cm(9, 2024), 10, 2024), 2023);
        assert_eq!(cal.allocation_year(cm(1, 2025), 1, 2025), 2024);
        assert_eq!(cal.allocation_year(None, 10, 2024), 2024);
    }

    #[test]
    fn test_allocation_year_undated_follows_file_month() {
        let cal = FiscalCalendar::default();
        let dated = cal.allocation_year(cm(1, 2025), 1, 2025);
        assert_eq!(cal.allocation_year(None, 1, 2025), dated);
        assert_eq!(cal.allocation_year(None, 9, 2025), 2024);
        assert_eq!(cal.allocation_year(None, 12, 2024), 2024);
    }

    #[test]
    fn test_period() {
        let cal = FiscalCalendar::default();
        assert_eq!(cal.period(cm(10, 2024), 10, 2024), Period::Current);
        assert_eq!(cal.period(cm(9, 2024), 10, 2024), Period::Previous);
        assert_eq!(cal.period(cm(10, 2023), 10, 2024), Period::Previous);
        assert_eq!(cal.period(None, 10, 2024), Period::Current);
    }

    #[test]
    fn test_rules_are_independent() {
        // Current for display, yet allocated to the prior year and bucketed in FY2025.
        let cal = FiscalCalendar::default();
        let jan = cm(1, 2025);
        assert_eq!(cal.period(jan, 1, 2025), Period::Current);
        assert_eq!(cal.allocation_year(jan, 1, 2025), 2024);
        assert_eq!(cal.fiscal_year_of(jan, 1, 2025), 2025);
    }

    #[test]
    fn test_excel_serial_to_mdy() {
        assert_eq!(excel_serial_to_mdy(45667.0).as_deref(), Some("01/10/2025"));
        assert_eq!(excel_serial_to_mdy(45566.75).as_deref(), Some("10/01/2024"));
    }
}
