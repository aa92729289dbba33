// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : meal_report_rust — analytics reconciliation & report service
Module  : config.rs
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
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use crate::upstream::HttpPolicy;

#[derive(Debug, Parser)]
#[command(name = "meal_report", version, about = "Order volume x rating report pipeline")]
pub struct Cli {
    /// Override LISTEN_ADDR
    #[arg(long, global = true)]
    pub listen: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report service: GET /report/analytics
    Serve,
    /// Order aggregator over a seeded order book: GET /api/analytics
    ServeOrders {
        #[arg(long)]
        seed: PathBuf,
    },
    /// Rating lookup over seeded dining records/reviews: GET /ratings/{id}
    ServeRatings {
        #[arg(long)]
        seed: PathBuf,
    },
    /// Build one report and write the CSV to stdout
    Report {
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        report_type: Option<String>,
        /// Read orders from a seed file instead of ORDER_SERVICE_URL
        #[arg(long)]
        orders_seed: Option<PathBuf>,
        /// Read ratings from a seed file instead of USER_SERVICE_URL
        #[arg(long)]
        ratings_seed: Option<PathBuf>,
    },
}

#[derive(Clone, Debug)]
pub struct Settings {
    // upstream
    pub order_service_url: String,
    pub user_service_url: String,
    pub upstream_timeout: Duration,
    pub upstream_retries: u32,

    // fan-out
    pub enrich_concurrency: usize,

    // http
    pub listen_addr: SocketAddr,
}

impl Settings {
    pub fn http_policy(&self) -> HttpPolicy {
        HttpPolicy { timeout: self.upstream_timeout, retries: self.upstream_retries, ..HttpPolicy::default() }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

pub fn load(cli: &Cli) -> Settings {
    // Pastikan .env dibaca (agar ORDER_SERVICE_URL, dll ter-load)
    let _ = dotenv();

    // ===== Upstream =====
    let order_service_url = env::var("ORDER_SERVICE_URL")
        .unwrap_or_else(|_| "http://order-service:8000".to_string());
    let user_service_url = env::var("USER_SERVICE_URL")
        .unwrap_or_else(|_| "http://user-service:8000".to_string());
    let upstream_timeout = Duration::from_millis(env_parse("UPSTREAM_TIMEOUT_MS", 5_000u64));
    let upstream_retries = env_parse("UPSTREAM_RETRIES", 0u32);

    // ===== Fan-out (minimal 1) =====
    let enrich_concurrency = env_parse("ENRICH_CONCURRENCY", 8usize).max(1);

    // ===== HTTP =====
    let listen_addr = cli
        .listen
        .unwrap_or_else(|| env_parse("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080))));

    Settings {
        order_service_url,
        user_service_url,
        upstream_timeout,
        upstream_retries,
        enrich_concurrency,
        listen_addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_report_flags() {
        let cli = Cli::parse_from([
            "meal_report",
            "report",
            "--period",
            "weekly",
            "--orders-seed",
            "o.json",
        ]);
        match cli.command {
            Command::Report { period, orders_seed, ratings_seed, .. } => {
                assert_eq!(period.as_deref(), Some("weekly"));
                assert_eq!(orders_seed, Some(PathBuf::from("o.json")));
                assert!(ratings_seed.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn listen_flag_overrides_env() {
        let cli = Cli::parse_from(["meal_report", "--listen", "127.0.0.1:9100", "serve"]);
        let s = load(&cli);
        assert_eq!(s.listen_addr, SocketAddr::from(([127, 0, 0, 1], 9100)));
        assert!(s.enrich_concurrency >= 1);
        assert_eq!(s.http_policy().timeout, s.upstream_timeout);
    }
}
