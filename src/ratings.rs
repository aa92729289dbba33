// ===============================
// src/ratings.rs (rating lookup read model)
// ===============================
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::domain::{ratio, RatingSnapshot};
use crate::error::SeedError;

/// Ratings are 1..=5; at or above this counts as a good review.
pub const GOOD_RATING: u8 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiningRecord {
    pub id: i64,
    pub user_id: i64,
    pub order_id: i64,
    pub menu_item_id: i64,
    pub menu_item_name: String,
    #[serde(default)]
    pub dining_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub dining_record_id: i64,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Review {
    pub fn is_good(&self) -> bool { self.rating >= GOOD_RATING }
}

/// Seed document for `serve-ratings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingSeed {
    #[serde(default)]
    pub dining_records: Vec<DiningRecord>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("No dining records for menu item {0}")]
    NotFound(i64),
}

#[derive(Debug, Default)]
pub struct RatingBook {
    // menu_item_id -> dining records (urutan seed dipertahankan)
    records: HashMap<i64, Vec<DiningRecord>>,
    // dining_record_id -> reviews
    reviews: HashMap<i64, Vec<Review>>,
}

impl RatingBook {
    pub fn from_seed(seed: RatingSeed) -> Result<Self, SeedError> {
        let mut records: HashMap<i64, Vec<DiningRecord>> = HashMap::new();
        let mut known = ahash::AHashSet::new();
        for r in seed.dining_records {
            known.insert(r.id);
            records.entry(r.menu_item_id).or_default().push(r);
        }

        let mut reviews: HashMap<i64, Vec<Review>> = HashMap::new();
        for rv in seed.reviews {
            if !(1..=5).contains(&rv.rating) {
                return Err(SeedError::Integrity(format!("review {} rating {} out of 1..=5", rv.id, rv.rating)));
            }
            if !known.contains(&rv.dining_record_id) {
                return Err(SeedError::Integrity(format!(
                    "review {} references unknown dining record {}",
                    rv.id, rv.dining_record_id
                )));
            }
            reviews.entry(rv.dining_record_id).or_default().push(rv);
        }

        info!(items = records.len(), reviewed_records = reviews.len(), "rating book loaded");
        Ok(Self { records, reviews })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_seed(serde_json::from_str(&raw)?)
    }

    /// Review aggregate for one menu item plus the order ids behind the reviewed
    /// dining records. An item with records but no reviews is a measured zero.
    pub fn rating_with_orders(&self, menu_item_id: i64) -> Result<RatingSnapshot, LookupError> {
        let records = match self.records.get(&menu_item_id) {
            Some(rs) if !rs.is_empty() => rs,
            _ => return Err(LookupError::NotFound(menu_item_id)),
        };

        let mut total = 0i64;
        let mut good = 0i64;
        let mut order_ids = Vec::new();
        for rec in records {
            let Some(rvs) = self.reviews.get(&rec.id).filter(|v| !v.is_empty()) else {
                continue;
            };
            total += rvs.len() as i64;
            good += rvs.iter().filter(|r| r.is_good()).count() as i64;
            order_ids.push(rec.order_id);
        }

        Ok(RatingSnapshot {
            menu_item_id,
            menu_item_name: records[0].menu_item_name.clone(),
            total_reviews: total,
            good_reviews: good,
            good_ratio: ratio(good, total).unwrap_or(0.0),
            order_ids,
        })
    }
}
