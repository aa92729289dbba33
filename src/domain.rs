// ===============================
// src/domain.rs
// ===============================
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::ReportError;

/// Trailing report window, dihitung mundur dari "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub fn days(&self) -> i64 {
        match self {
            Period::Daily => 1,
            Period::Weekly => 7,
            Period::Monthly => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }

    /// Missing or empty -> daily.
    pub fn parse_or_default(raw: Option<&str>) -> Result<Self, ReportError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Period::default()),
            Some(s) => s.parse(),
        }
    }
}

impl FromStr for Period {
    type Err = ReportError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            other => Err(ReportError::InvalidPeriod(other.to_string())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Query mode of the order aggregator. The report itself is always `OrderTrends`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportType {
    #[default]
    OrderTrends,
    MenuPreferences,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::OrderTrends => "order_trends",
            ReportType::MenuPreferences => "menu_preferences",
        }
    }

    pub fn parse_or_default(raw: Option<&str>) -> Result<Self, ReportError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(ReportType::default()),
            Some(s) => s.parse(),
        }
    }
}

impl FromStr for ReportType {
    type Err = ReportError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order_trends" | "order_volume" => Ok(ReportType::OrderTrends),
            "menu_preferences" => Ok(ReportType::MenuPreferences),
            other => Err(ReportError::InvalidReportType(other.to_string())),
        }
    }
}

// ---- Order aggregator ----

/// Typed row produced by the aggregator before it goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderVolumeRow { pub item_id: i64, pub item_name: String, pub quantity: i64, pub income: Decimal }

/// Volume row as received over the wire: cells are kept raw so a bad number
/// only drops out of the totals, never out of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord { pub item_id: String, pub item_name: String, pub quantity: String, pub income: String }

impl From<OrderVolumeRow> for VolumeRecord {
    fn from(r: OrderVolumeRow) -> Self {
        VolumeRecord {
            item_id: r.item_id.to_string(),
            item_name: r.item_name,
            quantity: r.quantity.to_string(),
            income: format!("{:.2}", r.income.round_dp(2)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowValidity { pub total_order_ids: i64, pub recent_orders_within_period: i64 }

impl WindowValidity {
    /// Order ids referenced by reviews that fell out of the window.
    pub fn invalid_count(&self) -> i64 {
        (self.total_order_ids - self.recent_orders_within_period).max(0)
    }
}

// ---- Rating lookup ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub menu_item_id: i64,
    pub menu_item_name: String,
    pub total_reviews: i64,
    pub good_reviews: i64,
    pub good_ratio: f64,
    #[serde(default)]
    pub order_ids: Vec<i64>,
}

// ---- Report ----

/// Rating columns of a report row. `None` = unmeasured (rendered as an empty cell),
/// which is not the same thing as a measured zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RatingCells { pub total_reviews: Option<i64>, pub good_reviews: Option<i64>, pub good_ratio: Option<f64> }

impl RatingCells {
    pub fn measured(total_reviews: i64, good_reviews: i64, good_ratio: f64) -> Self {
        Self { total_reviews: Some(total_reviews), good_reviews: Some(good_reviews), good_ratio: Some(good_ratio) }
    }
    pub fn unavailable() -> Self { Self::default() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub item_id: String,
    pub item_name: String,
    pub quantity: String,
    pub income: String,
    pub rating: RatingCells,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportTotals {
    pub quantity: i64,
    pub income: Decimal,
    pub total_reviews: i64,
    pub good_reviews: i64,
    pub good_ratio: Option<f64>,
}

/// Fully materialised report (the streaming path never builds one).
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub rows: Vec<ReportRow>,
    pub totals: ReportTotals,
    pub diagnostics: Vec<String>,
}

/// round(x, 2) atas rasio; `total <= 0` tidak pernah dibagi.
pub fn ratio(good: i64, total: i64) -> Option<f64> {
    if total > 0 {
        Some(round2(good as f64 / total as f64))
    } else {
        None
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
