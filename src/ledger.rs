use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::classifier::PlanClassifier;
use crate::db::{get_connection, init_db, DB_FILE};
use crate::error::{LedgerError, Result};
use crate::fiscal::FiscalCalendar;
use crate::importer::{self, IngestOptions};
use crate::models::{ChargeRecord, Page, Paged, UploadRequest, UploadResponse, UploadedFile};
use crate::reports::{
    self, CostAnalysis, CoverageAnalysis, DashboardMetrics, FiscalTotals, PlanSummary,
    SubscriberHistory, SummaryFilter,
};
use crate::settings::Settings;

#[derive(Debug, Clone)]
enum CachedView {
    Summary(Vec<PlanSummary>),
    Fiscal(FiscalTotals),
    Costs(Vec<CostAnalysis>),
    Coverage(Vec<CoverageAnalysis>),
    Metrics(DashboardMetrics),
}

/// Upload, delete and reporting operations over one database, with the
/// summary views cached until the next write or TTL expiry.
pub struct Ledger<C: Clock = SystemClock> {
    conn: Connection,
    settings: Settings,
    classifier: PlanClassifier,
    calendar: FiscalCalendar,
    cache: TtlCache<String, CachedView, C>,
}

impl Ledger<SystemClock> {
    pub fn open(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let data_dir = std::path::PathBuf::from(&settings.data_dir);
        std::fs::create_dir_all(&data_dir)?;
        let conn = get_connection(&data_dir.join(DB_FILE))?;
        init_db(&conn)?;
        Ok(Self::with_clock(conn, settings, SystemClock))
    }
}

impl<C: Clock> Ledger<C> {
    pub fn with_clock(conn: Connection, settings: Settings, clock: C) -> Self {
        let classifier = PlanClassifier::with_extra_keywords(&settings.extra_plan_keywords);
        let calendar = FiscalCalendar::new(settings.fiscal_year_start);
        let cache = TtlCache::with_clock(Duration::from_secs(settings.cache_ttl_secs), clock);
        Self {
            conn,
            settings,
            classifier,
            calendar,
            cache,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub fn upload(&mut self, request: &UploadRequest) -> UploadResponse {
        let opts = IngestOptions {
            classifier: &self.classifier,
            calendar: self.calendar,
            batch_size: self.settings.batch_size,
        };
        match importer::import_upload(&mut self.conn, request, &opts) {
            Ok(result) if result.duplicate_file => {
                let plan = request.plan_identifier.trim().to_uppercase();
                warn!(plan = %plan, "upload rejected, plan identifier already exists");
                UploadResponse::failed(LedgerError::DuplicatePlan(plan).to_string())
            }
            Ok(result) => {
                self.cache.invalidate_all();
                info!(
                    file = %request.file_name,
                    imported = result.imported,
                    skipped = result.skipped,
                    "upload complete"
                );
                UploadResponse::ok(format!(
                    "Imported {} charges from {} ({} rows skipped)",
                    result.imported, request.file_name, result.skipped
                ))
            }
            Err(e) => {
                error!(file = %request.file_name, error = %e, "upload failed");
                UploadResponse::failed(e.to_string())
            }
        }
    }

    pub fn delete(&mut self, plan_identifier: &str) -> Result<usize> {
        let removed = importer::delete_file(&mut self.conn, plan_identifier)?;
        self.cache.invalidate_all();
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn files(&self) -> Vec<UploadedFile> {
        importer::list_files(&self.conn).unwrap_or_else(|e| {
            error!(error = %e, "listing uploaded files failed");
            Vec::new()
        })
    }

    fn cached_view<T: Clone + Default>(
        &mut self,
        key: String,
        unwrap: fn(CachedView) -> Option<T>,
        wrap: fn(T) -> CachedView,
        load: impl FnOnce(&Connection, &FiscalCalendar) -> Result<T>,
    ) -> T {
        if let Some(hit) = self.cache.get(&key).and_then(unwrap) {
            debug!(view = %key, "cache hit");
            return hit;
        }
        match load(&self.conn, &self.calendar) {
            Ok(value) => {
                self.cache.insert(key.clone(), wrap(value.clone()));
                debug!(view = %key, cached = self.cache.len(), "cached view");
                value
            }
            Err(e) => {
                error!(view = %key, error = %e, "query failed, returning empty result");
                T::default()
            }
        }
    }

    pub fn summaries(&mut self, filter: &SummaryFilter, page: Page) -> Paged<PlanSummary> {
        let fiscal_n = self.settings.report_fiscal_year;
        let rows = self.cached_view(
            format!("summary:{}", filter.cache_key()),
            |v| match v {
                CachedView::Summary(rows) => Some(rows),
                _ => None,
            },
            CachedView::Summary,
            |conn, cal| reports::get_plan_summaries(conn, cal, fiscal_n, filter),
        );
        Paged {
            total: rows.len(),
            items: page.slice(&rows),
        }
    }

    pub fn fiscal_totals(&mut self) -> FiscalTotals {
        self.cached_view(
            "fiscal".to_string(),
            |v| match v {
                CachedView::Fiscal(t) => Some(t),
                _ => None,
            },
            CachedView::Fiscal,
            reports::get_fiscal_totals,
        )
    }

    pub fn cost_analysis(&mut self) -> Vec<CostAnalysis> {
        self.cached_view(
            "costs".to_string(),
            |v| match v {
                CachedView::Costs(c) => Some(c),
                _ => None,
            },
            CachedView::Costs,
            |conn, _| reports::get_cost_analysis(conn),
        )
    }

    pub fn coverage_analysis(&mut self) -> Vec<CoverageAnalysis> {
        self.cached_view(
            "coverage".to_string(),
            |v| match v {
                CachedView::Coverage(c) => Some(c),
                _ => None,
            },
            CachedView::Coverage,
            |conn, _| reports::get_coverage_analysis(conn),
        )
    }

    pub fn metrics(&mut self) -> DashboardMetrics {
        self.cached_view(
            "metrics".to_string(),
            |v| match v {
                CachedView::Metrics(m) => Some(m),
                _ => None,
            },
            CachedView::Metrics,
            |conn, _| reports::get_metrics(conn),
        )
    }

    pub fn employees(&self, search: Option<&str>, page: Page) -> Paged<ChargeRecord> {
        reports::get_unique_employees(&self.conn, search, page).unwrap_or_else(|e| {
            error!(error = %e, "employee listing failed");
            Paged::default()
        })
    }

    pub fn charges(&self, search: Option<&str>, plan: Option<&str>, page: Page) -> Paged<ChargeRecord> {
        reports::get_charges(&self.conn, search, plan, page).unwrap_or_else(|e| {
            error!(error = %e, "charge listing failed");
            Paged::default()
        })
    }

    pub fn history(&self, subscriber: &str) -> Option<SubscriberHistory> {
        reports::get_subscriber_history(&self.conn, &self.calendar, subscriber).unwrap_or_else(|e| {
            error!(subscriber = %subscriber, error = %e, "history lookup failed");
            None
        })
    }

    /// Unlike the listing views, export errors propagate: a partial file is worse than none.
    pub fn export(&self, search: Option<&str>, plan: Option<&str>) -> Result<Vec<ChargeRecord>> {
        reports::export_charges(&self.conn, search, plan)
    }
}
