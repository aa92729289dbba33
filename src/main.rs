// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/meal_report_rust

 # laporan mingguan (report service harus jalan)
curl -s 'localhost:8080/report/analytics?report_type=order_trends&report_period=weekly'

# kegagalan enrichment per stage
curl -s localhost:8080/metrics | grep '^enrich_failures_total'

*/
/*
=============================================================================
Project : meal_report_rust — analytics reconciliation & report service
Module  : main.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Merges per-item order volume (order service) with review ratings
          (user service) into one CSV report, reconciling reviews whose
          orders fell out of the reporting window and recording partial
          upstream failures as diagnostics.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use clap::Parser;
use hyper::body::Bytes;
use std::{path::PathBuf, sync::Arc};
use tokio::{io::AsyncWriteExt, sync::mpsc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use meal_report::config::{self, Cli, Command, Settings};
use meal_report::domain::{Period, ReportType};
use meal_report::error::ReportError;
use meal_report::metrics;
use meal_report::orders::OrderBook;
use meal_report::ratings::RatingBook;
use meal_report::report::ReportService;
use meal_report::server;
use meal_report::upstream::{HttpOrderSource, HttpRatingSource, OrderSource, RatingSource};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type DynReport = ReportService<Arc<dyn OrderSource>, Arc<dyn RatingSource>>;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config ----
    let cli = Cli::parse();
    let settings = config::load(&cli);

    // ---- Metrics ----
    metrics::init();
    metrics::CONFIG_ENRICH_CONCURRENCY.set(settings.enrich_concurrency as i64);

    info!(
        order_service = %settings.order_service_url,
        user_service = %settings.user_service_url,
        timeout_ms = settings.upstream_timeout.as_millis() as u64,
        retries = settings.upstream_retries,
        concurrency = settings.enrich_concurrency,
        "startup config"
    );

    let res = match cli.command {
        Command::Serve => serve_report(&settings).await,
        Command::ServeOrders { seed } => serve_orders(&settings, seed).await,
        Command::ServeRatings { seed } => serve_ratings(&settings, seed).await,
        Command::Report { period, report_type, orders_seed, ratings_seed } => {
            one_shot(&settings, period, report_type, orders_seed, ratings_seed).await
        }
    };

    if let Err(e) = res {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

fn build_service(
    settings: &Settings,
    orders_seed: Option<PathBuf>,
    ratings_seed: Option<PathBuf>,
) -> Result<DynReport, BoxError> {
    // Seed file -> in-process read model, selain itu HTTP ke service aslinya
    let orders: Arc<dyn OrderSource> = match orders_seed {
        Some(path) => Arc::new(OrderBook::load(path)?),
        None => Arc::new(HttpOrderSource::new(&settings.order_service_url, settings.http_policy())?),
    };
    let ratings: Arc<dyn RatingSource> = match ratings_seed {
        Some(path) => Arc::new(RatingBook::load(path)?),
        None => Arc::new(HttpRatingSource::new(&settings.user_service_url, settings.http_policy())?),
    };
    Ok(ReportService::new(orders, ratings, settings.enrich_concurrency))
}

async fn serve_report(settings: &Settings) -> Result<(), BoxError> {
    let svc = Arc::new(build_service(settings, None, None)?);
    let (_, srv) = server::bind(
        settings.listen_addr,
        move |req| server::handle_report(req, svc.clone()),
        shutdown_signal(),
    )?;
    srv.await?;
    Ok(())
}

async fn serve_orders(settings: &Settings, seed: PathBuf) -> Result<(), BoxError> {
    let book = Arc::new(OrderBook::load(seed)?);
    let (_, srv) = server::bind(
        settings.listen_addr,
        move |req| server::handle_orders(req, book.clone()),
        shutdown_signal(),
    )?;
    srv.await?;
    Ok(())
}

async fn serve_ratings(settings: &Settings, seed: PathBuf) -> Result<(), BoxError> {
    let book = Arc::new(RatingBook::load(seed)?);
    let (_, srv) = server::bind(
        settings.listen_addr,
        move |req| server::handle_ratings(req, book.clone()),
        shutdown_signal(),
    )?;
    srv.await?;
    Ok(())
}

async fn one_shot(
    settings: &Settings,
    period: Option<String>,
    report_type: Option<String>,
    orders_seed: Option<PathBuf>,
    ratings_seed: Option<PathBuf>,
) -> Result<(), BoxError> {
    let period = Period::parse_or_default(period.as_deref())?;
    let report_type = ReportType::parse_or_default(report_type.as_deref())?;
    if report_type != ReportType::OrderTrends {
        return Err(ReportError::InvalidReportType(report_type.as_str().to_string()).into());
    }

    let svc = build_service(settings, orders_seed, ratings_seed)?;
    let rows = svc.fetch_volume(period).await?;

    let (tx, mut rx) = mpsc::channel::<Bytes>(16);
    let producer = async {
        let tx = tx; // dropped when the report is done -> writer loop ends
        svc.stream_csv(rows, period, &tx).await
    };
    let writer = async {
        let mut out = tokio::io::stdout();
        while let Some(chunk) = rx.recv().await {
            out.write_all(&chunk).await?;
        }
        out.flush().await
    };

    let (summary, written) = tokio::join!(producer, writer);
    written?;
    let summary = summary?;
    info!(rows = summary.rows, failed = summary.failed_items, "report written");
    Ok(())
}
