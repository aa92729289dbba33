// ===============================
// src/upstream.rs (order & rating sources)
// ===============================
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::StatusCode;
use std::{future::Future, sync::Arc, time::Instant};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::domain::{Period, RatingSnapshot, ReportType, VolumeRecord, WindowValidity};
use crate::error::UpstreamError;
use crate::metrics::UPSTREAM_LAT;
use crate::orders::{AggregateError, OrderBook};
use crate::ratings::{LookupError, RatingBook};

/// Order subsystem as seen by the report orchestrator.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Volume table for the window. `NotFound` means "no orders", not an outage.
    async fn order_volume(&self, period: Period) -> Result<Vec<VolumeRecord>, UpstreamError>;

    async fn check_validity(&self, order_ids: &[i64], period: Period) -> Result<WindowValidity, UpstreamError>;
}

/// Rating subsystem as seen by the report orchestrator.
#[async_trait]
pub trait RatingSource: Send + Sync {
    async fn rating_with_orders(&self, menu_item_id: i64) -> Result<RatingSnapshot, UpstreamError>;
}

#[async_trait]
impl<T: OrderSource + ?Sized> OrderSource for Arc<T> {
    async fn order_volume(&self, period: Period) -> Result<Vec<VolumeRecord>, UpstreamError> {
        (**self).order_volume(period).await
    }
    async fn check_validity(&self, order_ids: &[i64], period: Period) -> Result<WindowValidity, UpstreamError> {
        (**self).check_validity(order_ids, period).await
    }
}

#[async_trait]
impl<T: RatingSource + ?Sized> RatingSource for Arc<T> {
    async fn rating_with_orders(&self, menu_item_id: i64) -> Result<RatingSnapshot, UpstreamError> {
        (**self).rating_with_orders(menu_item_id).await
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// Timeout + bounded retry shared by both HTTP sources.
#[derive(Debug, Clone)]
pub struct HttpPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff_ms: u64,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_millis(5_000), retries: 0, backoff_ms: 100 }
    }
}

impl HttpPolicy {
    pub fn client(&self) -> Result<reqwest::Client, UpstreamError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(UpstreamError::from)
    }

    /// One attempt plus `retries` more on retryable failures, jittered backoff in between.
    async fn run<T, F, Fut>(&self, call: &'static str, mut attempt: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut tries = 0u32;
        loop {
            let started = Instant::now();
            let res = attempt().await;
            UPSTREAM_LAT
                .with_label_values(&[call])
                .observe(started.elapsed().as_secs_f64() * 1_000.0);

            match res {
                Err(e) if e.is_retryable() && tries < self.retries => {
                    tries += 1;
                    let jitter = rand::thread_rng().gen_range(0..=self.backoff_ms);
                    let wait = self.backoff_ms * u64::from(tries) + jitter;
                    warn!(call, attempt = tries, error = %e, wait_ms = wait, "upstream retry");
                    sleep(Duration::from_millis(wait)).await;
                }
                other => return other,
            }
        }
    }
}

fn status_error(status: StatusCode) -> UpstreamError {
    if status == StatusCode::NOT_FOUND {
        UpstreamError::NotFound
    } else {
        UpstreamError::Status(status.as_u16())
    }
}

fn read_csv<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<Vec<T>, UpstreamError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body);
    let mut out = Vec::new();
    for rec in rdr.deserialize() {
        out.push(rec?);
    }
    Ok(out)
}

/// Order service client: `GET {base}/api/analytics`.
#[derive(Clone)]
pub struct HttpOrderSource {
    http: reqwest::Client,
    base: String,
    policy: HttpPolicy,
}

impl HttpOrderSource {
    pub fn new(base: &str, policy: HttpPolicy) -> Result<Self, UpstreamError> {
        Ok(Self { http: policy.client()?, base: base.trim_end_matches('/').to_string(), policy })
    }

    async fn get_csv(&self, query: &[(&str, String)]) -> Result<Vec<u8>, UpstreamError> {
        let url = format!("{}/api/analytics", self.base);
        let rsp = self.http.get(url).query(query).send().await?;
        if !rsp.status().is_success() {
            return Err(status_error(rsp.status()));
        }
        Ok(rsp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl OrderSource for HttpOrderSource {
    async fn order_volume(&self, period: Period) -> Result<Vec<VolumeRecord>, UpstreamError> {
        let query = [
            ("report_type", ReportType::OrderTrends.as_str().to_string()),
            ("report_period", period.as_str().to_string()),
        ];
        let body = self.policy.run("order_volume", || self.get_csv(&query)).await?;
        let rows: Vec<VolumeRecord> = read_csv(&body)?;
        debug!(%period, rows = rows.len(), "order volume fetched");
        Ok(rows)
    }

    async fn check_validity(&self, order_ids: &[i64], period: Period) -> Result<WindowValidity, UpstreamError> {
        let mut query = vec![
            ("report_type", ReportType::MenuPreferences.as_str().to_string()),
            ("report_period", period.as_str().to_string()),
        ];
        query.extend(order_ids.iter().map(|id| ("order_ids", id.to_string())));

        let body = self.policy.run("check_validity", || self.get_csv(&query)).await?;
        read_csv::<WindowValidity>(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::Decode("empty validity table".to_string()))
    }
}

/// User service client: `GET {base}/ratings/{menu_item_id}`.
#[derive(Clone)]
pub struct HttpRatingSource {
    http: reqwest::Client,
    base: String,
    policy: HttpPolicy,
}

impl HttpRatingSource {
    pub fn new(base: &str, policy: HttpPolicy) -> Result<Self, UpstreamError> {
        Ok(Self { http: policy.client()?, base: base.trim_end_matches('/').to_string(), policy })
    }

    async fn get_rating(&self, menu_item_id: i64) -> Result<RatingSnapshot, UpstreamError> {
        let url = format!("{}/ratings/{}", self.base, menu_item_id);
        let rsp = self.http.get(url).send().await?;
        if !rsp.status().is_success() {
            return Err(status_error(rsp.status()));
        }
        Ok(rsp.json::<RatingSnapshot>().await?)
    }
}

#[async_trait]
impl RatingSource for HttpRatingSource {
    async fn rating_with_orders(&self, menu_item_id: i64) -> Result<RatingSnapshot, UpstreamError> {
        self.policy.run("rating", || self.get_rating(menu_item_id)).await
    }
}

// =============================================================================
// In-process (read models dipakai langsung, tanpa HTTP)
// =============================================================================

#[async_trait]
impl OrderSource for OrderBook {
    async fn order_volume(&self, period: Period) -> Result<Vec<VolumeRecord>, UpstreamError> {
        match OrderBook::order_volume(self, period, Utc::now()) {
            Ok(rows) => Ok(rows.into_iter().map(VolumeRecord::from).collect()),
            Err(AggregateError::NoOrders) => Err(UpstreamError::NotFound),
            Err(e) => Err(UpstreamError::Rejected(e.to_string())),
        }
    }

    async fn check_validity(&self, order_ids: &[i64], period: Period) -> Result<WindowValidity, UpstreamError> {
        OrderBook::check_validity(self, order_ids, period, Utc::now())
            .map_err(|e| UpstreamError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl RatingSource for RatingBook {
    async fn rating_with_orders(&self, menu_item_id: i64) -> Result<RatingSnapshot, UpstreamError> {
        RatingBook::rating_with_orders(self, menu_item_id).map_err(|e| match e {
            LookupError::NotFound(_) => UpstreamError::NotFound,
        })
    }
}
