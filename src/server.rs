// ===============================
// src/server.rs (hyper 0.14 HTTP surfaces)
// ===============================
//
// Tiga role, satu pola:
//   report  : GET /report/analytics?report_type=&report_period=
//   orders  : GET /api/analytics?report_type=&report_period=&order_ids=..
//   ratings : GET /ratings/{menu_item_id}
// Semua role juga melayani GET /metrics dan GET /health.
//
use chrono::Utc;
use futures_util::stream;
use hyper::{
    body::Bytes,
    header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE},
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::domain::{Period, ReportType};
use crate::metrics::encode_metrics;
use crate::orders::{encode_validity_csv, encode_volume_csv, AggregateError, OrderBook};
use crate::ratings::{LookupError, RatingBook};
use crate::report::ReportService;
use crate::upstream::{OrderSource, RatingSource};

/// Chunks buffered between the orchestrator and the socket.
const STREAM_BUFFER: usize = 16;

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
    let mut rsp = Response::new(body.into());
    *rsp.status_mut() = status;
    rsp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    rsp
}

fn text(status: StatusCode, msg: impl Into<String>) -> Response<Body> {
    respond(status, "text/plain; charset=utf-8", msg.into())
}

fn json_detail(status: StatusCode, detail: String) -> Response<Body> {
    let body = serde_json::json!({ "detail": detail }).to_string();
    respond(status, "application/json", body)
}

fn csv_attachment(body: impl Into<Body>, disposition: &'static str) -> Response<Body> {
    let mut rsp = respond(StatusCode::OK, "text/csv", body);
    rsp.headers_mut()
        .insert(CONTENT_DISPOSITION, HeaderValue::from_static(disposition));
    rsp
}

/// Decoded query string, repeated keys kept in order.
fn query_pairs(req: &Request<Body>) -> Vec<(String, String)> {
    req.uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Routes shared by every role; `None` means "not mine".
fn common_routes(req: &Request<Body>) -> Option<Response<Body>> {
    if req.method() != Method::GET {
        return Some(text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
    }
    match req.uri().path() {
        "/metrics" => Some(respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            encode_metrics(),
        )),
        "/health" | "/" => Some(text(StatusCode::OK, "ok")),
        _ => None,
    }
}

/// Bind `addr` and serve `handler` until `shutdown` resolves.
/// Returns the bound address (useful with port 0) and the server future.
pub fn bind<H, Fut, S>(
    addr: SocketAddr,
    handler: H,
    shutdown: S,
) -> Result<(SocketAddr, impl Future<Output = Result<(), hyper::Error>>), hyper::Error>
where
    H: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    let make_svc = make_service_fn(move |_conn| {
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                debug!(method = %req.method(), uri = %req.uri(), "request");
                let fut = handler(req);
                async move { Ok::<_, Infallible>(fut.await) }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    let local = server.local_addr();
    info!(addr = %local, "http listening");
    Ok((local, server.with_graceful_shutdown(shutdown)))
}

// =============================================================================
// report role
// =============================================================================

pub async fn handle_report<O, R>(req: Request<Body>, svc: Arc<ReportService<O, R>>) -> Response<Body>
where
    O: OrderSource + 'static,
    R: RatingSource + 'static,
{
    if let Some(rsp) = common_routes(&req) {
        return rsp;
    }
    if req.uri().path().trim_end_matches('/') != "/report/analytics" {
        return text(StatusCode::NOT_FOUND, "not found");
    }

    let q = query_pairs(&req);
    let parsed = ReportType::parse_or_default(first(&q, "report_type")).and_then(|rt| {
        Period::parse_or_default(first(&q, "report_period")).map(|p| (rt, p))
    });
    let period = match parsed {
        Ok((ReportType::OrderTrends, p)) => p,
        Ok((other, _)) => return text(StatusCode::BAD_REQUEST, format!("Invalid report type: {}", other.as_str())),
        Err(e) => return text(StatusCode::BAD_REQUEST, e.to_string()),
    };

    // Fatal path diputuskan sebelum byte pertama dikirim
    let rows = match svc.fetch_volume(period).await {
        Ok(rows) => rows,
        Err(e) => {
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
            return text(status, "Order or Rating service unavailable");
        }
    };

    let (tx, rx) = mpsc::channel::<Bytes>(STREAM_BUFFER);
    tokio::spawn(async move {
        // errors are already logged and counted inside stream_csv
        let _ = svc.stream_csv(rows, period, &tx).await;
    });

    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });
    csv_attachment(Body::wrap_stream(body), "attachment; filename=analytics_with_ratings.csv")
}

// =============================================================================
// orders role
// =============================================================================

pub async fn handle_orders(req: Request<Body>, book: Arc<OrderBook>) -> Response<Body> {
    if let Some(rsp) = common_routes(&req) {
        return rsp;
    }
    if req.uri().path().trim_end_matches('/') != "/api/analytics" {
        return text(StatusCode::NOT_FOUND, "not found");
    }

    let q = query_pairs(&req);
    let report_type = match ReportType::parse_or_default(first(&q, "report_type")) {
        Ok(rt) => rt,
        Err(e) => return json_detail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let period = match Period::parse_or_default(first(&q, "report_period")) {
        Ok(p) => p,
        Err(e) => return json_detail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let now = Utc::now();

    match report_type {
        ReportType::OrderTrends => match OrderBook::order_volume(&book, period, now) {
            Ok(rows) => match encode_volume_csv(rows) {
                Ok(buf) => csv_attachment(buf, "attachment; filename=analytics.csv"),
                Err(e) => {
                    error!(error = %e, "encode volume csv failed");
                    json_detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            },
            Err(e @ AggregateError::NoOrders) => json_detail(StatusCode::NOT_FOUND, e.to_string()),
            Err(e) => json_detail(StatusCode::BAD_REQUEST, e.to_string()),
        },
        ReportType::MenuPreferences => {
            let mut ids = Vec::new();
            for (_, raw) in q.iter().filter(|(k, _)| k == "order_ids") {
                match raw.trim().parse::<i64>() {
                    Ok(id) => ids.push(id),
                    Err(_) => {
                        return json_detail(StatusCode::BAD_REQUEST, format!("Invalid order id: {raw}"))
                    }
                }
            }
            match OrderBook::check_validity(&book, &ids, period, now) {
                Ok(v) => match encode_validity_csv(&v) {
                    Ok(buf) => csv_attachment(buf, "attachment; filename=menu_preferences.csv"),
                    Err(e) => json_detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                },
                Err(e) => json_detail(StatusCode::BAD_REQUEST, e.to_string()),
            }
        }
    }
}

// =============================================================================
// ratings role
// =============================================================================

pub async fn handle_ratings(req: Request<Body>, book: Arc<RatingBook>) -> Response<Body> {
    if let Some(rsp) = common_routes(&req) {
        return rsp;
    }
    let Some(raw_id) = req.uri().path().trim_end_matches('/').strip_prefix("/ratings/") else {
        return text(StatusCode::NOT_FOUND, "not found");
    };
    let id = match raw_id.parse::<i64>() {
        Ok(id) => id,
        Err(_) => return json_detail(StatusCode::UNPROCESSABLE_ENTITY, format!("Invalid menu item id: {raw_id}")),
    };

    match RatingBook::rating_with_orders(&book, id) {
        Ok(snap) => match serde_json::to_vec(&snap) {
            Ok(buf) => respond(StatusCode::OK, "application/json", buf),
            Err(e) => json_detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        Err(e @ LookupError::NotFound(_)) => json_detail(StatusCode::NOT_FOUND, e.to_string()),
    }
}
