// ===============================
// src/report.rs (report orchestrator)
// ===============================
//
// Alur per request:
//   1) volume table dari order service (gagal = fatal, 503)
//   2) per item (paralel, dibatasi, urutan input dipertahankan):
//        rating lookup -> validity check -> rekonsiliasi
//   3) fold hasil per item -> TOTAL + diagnostics
//
use futures_util::{stream, Stream, StreamExt};
use hyper::body::Bytes;
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::{
    ratio, Period, RatingCells, RatingSnapshot, Report, ReportRow, ReportTotals, ReportType,
    VolumeRecord,
};
use crate::error::{ItemEnrichmentFailed, ReportError, StreamError, UpstreamError};
use crate::metrics::{ENRICH_FAILURES, NUMERIC_SKIPS, REPORTS, REPORT_ROWS};
use crate::render;
use crate::upstream::{OrderSource, RatingSource};

/// Result of enriching one volume row. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub row: ReportRow,
    pub failure: Option<ItemEnrichmentFailed>,
}

/// Sequential fold over item outcomes (no shared state across the fan-out).
#[derive(Debug, Default)]
pub struct Accumulator {
    quantity: i64,
    income: Decimal,
    total_reviews: i64,
    good_reviews: i64,
    rows: usize,
    diagnostics: Vec<String>,
}

impl Accumulator {
    pub fn push(&mut self, item: &ItemOutcome) {
        self.rows += 1;
        let row = &item.row;

        // quantity/income dihitung terpisah: sel rusak (atau overflow) hanya keluar dari TOTAL
        match row.quantity.trim().parse::<i64>().ok().and_then(|q| self.quantity.checked_add(q)) {
            Some(sum) => self.quantity = sum,
            None => skip(&row.item_id, "quantity", &row.quantity),
        }
        match Decimal::from_str(row.income.trim()).ok().and_then(|v| self.income.checked_add(v)) {
            Some(sum) => self.income = sum,
            None => skip(&row.item_id, "income", &row.income),
        }

        // total dan good selalu masuk berpasangan, supaya rasio TOTAL tetap <= 1
        let total = self.total_reviews.checked_add(row.rating.total_reviews.unwrap_or(0));
        let good = self.good_reviews.checked_add(row.rating.good_reviews.unwrap_or(0));
        match total.zip(good) {
            Some((t, g)) => {
                self.total_reviews = t;
                self.good_reviews = g;
            }
            None => skip(&row.item_id, "reviews", &format!("{:?}", row.rating)),
        }

        if let Some(f) = &item.failure {
            self.diagnostics.push(f.to_string());
        }
    }

    pub fn rows(&self) -> usize { self.rows }

    pub fn failed_items(&self) -> usize { self.diagnostics.len() }

    pub fn finish(self) -> (ReportTotals, Vec<String>) {
        let totals = ReportTotals {
            quantity: self.quantity,
            income: self.income.round_dp(2),
            total_reviews: self.total_reviews,
            good_reviews: self.good_reviews,
            good_ratio: ratio(self.good_reviews, self.total_reviews),
        };
        (totals, self.diagnostics)
    }
}

fn skip(item_id: &str, column: &'static str, raw: &str) {
    NUMERIC_SKIPS.inc();
    debug!(item_id, column, raw, "cell not numeric or overflows, skipped in totals");
}

/// Subtract reviews backed by orders that left the window.
/// Adjusted counts saturate at zero; ratio is 0.0 when nothing is left.
pub fn reconcile(snap: &RatingSnapshot, invalid_count: i64) -> RatingCells {
    let adj_total = (snap.total_reviews - invalid_count).max(0);
    let adj_good = (snap.good_reviews - invalid_count).max(0).min(adj_total);
    RatingCells::measured(adj_total, adj_good, ratio(adj_good, adj_total).unwrap_or(0.0))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub rows: usize,
    pub failed_items: usize,
    pub totals: ReportTotals,
}

pub struct ReportService<O, R> {
    orders: O,
    ratings: R,
    concurrency: usize,
}

impl<O: OrderSource, R: RatingSource> ReportService<O, R> {
    pub fn new(orders: O, ratings: R, concurrency: usize) -> Self {
        Self { orders, ratings, concurrency: concurrency.max(1) }
    }

    /// Step 1. An empty window (`NotFound`) is a valid, empty report.
    pub async fn fetch_volume(&self, period: Period) -> Result<Vec<VolumeRecord>, ReportError> {
        match self.orders.order_volume(period).await {
            Ok(rows) => Ok(rows),
            Err(UpstreamError::NotFound) => {
                info!(%period, "no order data in window");
                Ok(Vec::new())
            }
            Err(e) => {
                error!(%period, error = %e, "order volume query failed");
                REPORTS.with_label_values(&["upstream_unavailable"]).inc();
                Err(ReportError::UpstreamUnavailable(e))
            }
        }
    }

    /// Step 2 for one row. Never fails: every failure combination has a fallback.
    pub async fn enrich(&self, rec: VolumeRecord, period: Period) -> ItemOutcome {
        let (rating, failure) = match rec.item_id.trim().parse::<i64>() {
            Err(_) => (
                RatingCells::unavailable(),
                Some(ItemEnrichmentFailed::Rating {
                    item_id: rec.item_id.clone(),
                    cause: UpstreamError::Rejected("item_id is not numeric".to_string()),
                }),
            ),
            Ok(id) => match self.ratings.rating_with_orders(id).await {
                Err(cause) => (
                    RatingCells::unavailable(),
                    Some(ItemEnrichmentFailed::Rating { item_id: rec.item_id.clone(), cause }),
                ),
                Ok(snap) => self.reconcile_with_window(&rec.item_id, snap, period).await,
            },
        };

        if let Some(f) = &failure {
            ENRICH_FAILURES.with_label_values(&[f.stage()]).inc();
            warn!(item_id = %rec.item_id, stage = f.stage(), error = %f, "rating enrichment failed");
        }

        ItemOutcome {
            row: ReportRow {
                item_id: rec.item_id,
                item_name: rec.item_name,
                quantity: rec.quantity,
                income: rec.income,
                rating,
            },
            failure,
        }
    }

    async fn reconcile_with_window(
        &self,
        item_id: &str,
        snap: RatingSnapshot,
        period: Period,
    ) -> (RatingCells, Option<ItemEnrichmentFailed>) {
        let raw = RatingCells::measured(snap.total_reviews, snap.good_reviews, snap.good_ratio);
        // Tidak ada order id = tidak ada yang bisa kadaluarsa
        if snap.order_ids.is_empty() {
            return (raw, None);
        }
        match self.orders.check_validity(&snap.order_ids, period).await {
            Ok(v) => (reconcile(&snap, v.invalid_count()), None),
            // Fallback ke snapshot item ini saja, tanpa carry-over dari item lain
            Err(cause) => (
                raw,
                Some(ItemEnrichmentFailed::Validity { item_id: item_id.to_string(), cause }),
            ),
        }
    }

    /// Bounded, order-preserving fan-out over the volume rows.
    pub fn enriched(&self, rows: Vec<VolumeRecord>, period: Period) -> impl Stream<Item = ItemOutcome> + '_ {
        stream::iter(rows)
            .map(move |rec| self.enrich(rec, period))
            .buffered(self.concurrency)
    }

    /// Materialised report (used by callers that do not stream).
    pub async fn build_report(&self, report_type: ReportType, period: Period) -> Result<Report, ReportError> {
        if report_type != ReportType::OrderTrends {
            return Err(ReportError::InvalidReportType(report_type.as_str().to_string()));
        }
        let volume = self.fetch_volume(period).await?;
        let outcomes: Vec<ItemOutcome> = self.enriched(volume, period).collect().await;

        let mut acc = Accumulator::default();
        outcomes.iter().for_each(|o| acc.push(o));
        let (totals, diagnostics) = acc.finish();

        let rows: Vec<ReportRow> = outcomes.into_iter().map(|o| o.row).collect();
        REPORTS.with_label_values(&[if rows.is_empty() { "empty" } else { "ok" }]).inc();
        info!(%period, rows = rows.len(), failed = diagnostics.len(), "report built");
        Ok(Report { rows, totals, diagnostics })
    }

    /// Steps 2-4 as a CSV stream: header, one line per item as soon as it (and every
    /// item before it) is enriched, then TOTAL and the optional ERROR line.
    /// A closed `out` stops the fan-out and drops in-flight upstream calls.
    pub async fn stream_csv(
        &self,
        rows: Vec<VolumeRecord>,
        period: Period,
        out: &mpsc::Sender<Bytes>,
    ) -> Result<ReportSummary, StreamError> {
        let res = self.stream_inner(rows, period, out).await;
        match &res {
            Ok(s) => {
                REPORTS.with_label_values(&[if s.rows == 0 { "empty" } else { "ok" }]).inc();
                info!(%period, rows = s.rows, failed = s.failed_items, "report streamed");
            }
            Err(StreamError::Cancelled) => {
                REPORTS.with_label_values(&["cancelled"]).inc();
                info!(%period, "report stream cancelled by consumer");
            }
            Err(e) => error!(%period, error = %e, "report stream aborted"),
        }
        res
    }

    async fn stream_inner(
        &self,
        rows: Vec<VolumeRecord>,
        period: Period,
        out: &mpsc::Sender<Bytes>,
    ) -> Result<ReportSummary, StreamError> {
        send(out, render::header()?).await?;

        let mut acc = Accumulator::default();
        let items = self.enriched(rows, period);
        tokio::pin!(items);
        loop {
            // consumer pergi -> stream di-drop, panggilan upstream in-flight ikut batal
            let item = tokio::select! {
                next = items.next() => match next {
                    Some(item) => item,
                    None => break,
                },
                _ = out.closed() => return Err(StreamError::Cancelled),
            };
            acc.push(&item);
            send(out, render::row(&item.row)?).await?;
            REPORT_ROWS.inc();
        }

        let rows = acc.rows();
        let failed_items = acc.failed_items();
        let (totals, _diagnostics) = acc.finish();
        send(out, render::totals(&totals)?).await?;
        if failed_items > 0 {
            send(out, render::diagnostics(failed_items)?).await?;
        }
        Ok(ReportSummary { rows, failed_items, totals })
    }
}

async fn send(out: &mpsc::Sender<Bytes>, chunk: Bytes) -> Result<(), StreamError> {
    out.send(chunk).await.map_err(|_| StreamError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RatingCells;

    fn snap(total: i64, good: i64) -> RatingSnapshot {
        RatingSnapshot {
            menu_item_id: 1,
            menu_item_name: "DishA".into(),
            total_reviews: total,
            good_reviews: good,
            good_ratio: ratio(good, total).unwrap_or(0.0),
            order_ids: (1..=total).collect(),
        }
    }

    fn outcome(qty: &str, income: &str, rating: RatingCells, failed: bool) -> ItemOutcome {
        ItemOutcome {
            row: ReportRow {
                item_id: "1".into(),
                item_name: "x".into(),
                quantity: qty.into(),
                income: income.into(),
                rating,
            },
            failure: failed.then(|| ItemEnrichmentFailed::Rating {
                item_id: "1".into(),
                cause: UpstreamError::Status(500),
            }),
        }
    }

    #[test]
    fn reconciliation_subtracts_stale_reviews() {
        assert_eq!(reconcile(&snap(10, 8), 2), RatingCells::measured(8, 6, 0.75));
        assert_eq!(reconcile(&snap(5, 3), 0), RatingCells::measured(5, 3, 0.6));
    }

    #[test]
    fn reconciliation_to_zero_has_zero_ratio() {
        let cells = reconcile(&snap(3, 3), 3);
        assert_eq!(cells, RatingCells::measured(0, 0, 0.0));
        assert!(!cells.good_ratio.unwrap().is_nan());
        // more stale ids than reviews still never goes negative
        assert_eq!(reconcile(&snap(2, 1), 5), RatingCells::measured(0, 0, 0.0));
    }

    #[test]
    fn accumulator_skips_non_numeric_cells_independently() {
        let mut acc = Accumulator::default();
        acc.push(&outcome("10", "100.00", RatingCells::measured(8, 6, 0.75), false));
        acc.push(&outcome("abc", "50.50", RatingCells::unavailable(), true));
        acc.push(&outcome("5", "n/a", RatingCells::measured(5, 3, 0.6), false));
        assert_eq!(acc.rows(), 3);
        assert_eq!(acc.failed_items(), 1);

        let (totals, diags) = acc.finish();
        assert_eq!(totals.quantity, 15);
        assert_eq!(totals.income, Decimal::new(15050, 2));
        assert_eq!(totals.total_reviews, 13);
        assert_eq!(totals.good_reviews, 9);
        assert_eq!(totals.good_ratio, Some(0.69));
        assert_eq!(diags, vec!["menu_item_id 1 response 500".to_string()]);
    }

    #[test]
    fn overflowing_cells_are_skipped_not_fatal() {
        let mut acc = Accumulator::default();
        acc.push(&outcome(
            "9223372036854775807",
            "79228162514264337593543950335",
            RatingCells::measured(i64::MAX, 1, 0.0),
            false,
        ));
        acc.push(&outcome("1", "1", RatingCells::measured(1, 1, 1.0), false));
        acc.push(&outcome("2", "2.50", RatingCells::measured(2, 1, 0.5), false));

        let (totals, _) = acc.finish();
        // first row fits on its own; the second would overflow and drops out
        assert_eq!(totals.quantity, i64::MAX);
        assert_eq!(totals.income, Decimal::MAX);
        assert_eq!(totals.total_reviews, i64::MAX);
        assert_eq!(totals.good_reviews, 1);
    }

    #[test]
    fn totals_ratio_is_empty_without_reviews() {
        let mut acc = Accumulator::default();
        acc.push(&outcome("1", "1.00", RatingCells::unavailable(), true));
        let (totals, _) = acc.finish();
        assert_eq!(totals.total_reviews, 0);
        assert_eq!(totals.good_ratio, None);
    }
}
