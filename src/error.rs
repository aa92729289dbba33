// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

/// One upstream call failing. The Display text ends up in report diagnostics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("response 404")]
    NotFound,
    #[error("response {0}")]
    Status(u16),
    #[error("error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

impl UpstreamError {
    /// Transport failures and 5xx are worth another attempt; 4xx never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Transport(_) => true,
            UpstreamError::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

impl From<csv::Error> for UpstreamError {
    fn from(e: csv::Error) -> Self {
        UpstreamError::Decode(e.to_string())
    }
}

/// Non-fatal, per-item enrichment failure (becomes one diagnostic entry).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemEnrichmentFailed {
    #[error("menu_item_id {item_id} {cause}")]
    Rating { item_id: String, cause: UpstreamError },
    #[error("menu_item_id {item_id} validity check {cause}")]
    Validity { item_id: String, cause: UpstreamError },
}

impl ItemEnrichmentFailed {
    pub fn stage(&self) -> &'static str {
        match self {
            ItemEnrichmentFailed::Rating { .. } => "rating",
            ItemEnrichmentFailed::Validity { .. } => "validity",
        }
    }
}

/// Request-level failures: the caller gets a single status, never a partial report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("Order or Rating service unavailable: {0}")]
    UpstreamUnavailable(UpstreamError),
    #[error("Invalid report period: {0}")]
    InvalidPeriod(String),
    #[error("Invalid report type: {0}")]
    InvalidReportType(String),
}

impl ReportError {
    pub fn http_status(&self) -> u16 {
        match self {
            ReportError::UpstreamUnavailable(_) => 503,
            ReportError::InvalidPeriod(_) | ReportError::InvalidReportType(_) => 400,
        }
    }
}

/// Why a streamed report stopped before its TOTAL row.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("report consumer disconnected")]
    Cancelled,
    #[error("render: {0}")]
    Render(#[from] csv::Error),
}

/// Loading a seed document for one of the standalone upstream roles.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seed io: {0}")]
    Io(#[from] std::io::Error),
    #[error("seed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("seed integrity: {0}")]
    Integrity(String),
}
