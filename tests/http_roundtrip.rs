// ===============================
// tests/http_roundtrip.rs
// ===============================
//
// Tiga role dijalankan di 127.0.0.1:0, lalu report diambil lewat HTTP.
//
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::{net::SocketAddr, sync::Arc, time::Duration as StdDuration};

use meal_report::domain::Period;
use meal_report::error::UpstreamError;
use meal_report::orders::{MenuItem, Order, OrderBook, OrderLine, OrderSeed};
use meal_report::ratings::{DiningRecord, RatingBook, RatingSeed, Review};
use meal_report::report::ReportService;
use meal_report::server;
use meal_report::upstream::{HttpOrderSource, HttpPolicy, HttpRatingSource, OrderSource, RatingSource};

fn any_port() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn policy() -> HttpPolicy {
    HttpPolicy { timeout: StdDuration::from_secs(2), retries: 0, backoff_ms: 10 }
}

fn order_book() -> OrderBook {
    let now = Utc::now();
    let price = Decimal::new(1000, 2);
    let seed = OrderSeed {
        menu_items: vec![
            MenuItem { id: 1, en_name: "DishA".into(), zh_name: None, price },
            MenuItem { id: 2, en_name: "DishB".into(), zh_name: None, price },
        ],
        orders: vec![
            Order { id: 1, user_id: 1, order_date: now - Duration::hours(1) },
            Order { id: 2, user_id: 2, order_date: now - Duration::hours(2) },
            Order { id: 90, user_id: 1, order_date: now - Duration::days(20) },
            Order { id: 91, user_id: 3, order_date: now - Duration::days(20) },
        ],
        order_lines: vec![
            OrderLine { order_id: 1, menu_item_id: 1, quantity: 10, unit_price: price },
            OrderLine { order_id: 2, menu_item_id: 2, quantity: 5, unit_price: price },
            OrderLine { order_id: 90, menu_item_id: 1, quantity: 1, unit_price: price },
            OrderLine { order_id: 91, menu_item_id: 1, quantity: 1, unit_price: price },
        ],
    };
    OrderBook::from_seed(seed).unwrap()
}

fn rating_book() -> RatingBook {
    let rec = |id: i64, order_id: i64, item: i64, name: &str| DiningRecord {
        id,
        user_id: 1,
        order_id,
        menu_item_id: item,
        menu_item_name: name.into(),
        dining_date: None,
    };
    let review = |id: i64, record: i64, rating: u8| Review {
        id,
        user_id: 1,
        dining_record_id: record,
        rating,
        comment: None,
    };
    let seed = RatingSeed {
        dining_records: vec![
            rec(1, 1, 1, "DishA"),
            rec(2, 90, 1, "DishA"),
            rec(3, 91, 1, "DishA"),
            rec(4, 2, 2, "DishB"),
        ],
        reviews: vec![review(1, 1, 5), review(2, 2, 5), review(3, 3, 2), review(4, 4, 4)],
    };
    RatingBook::from_seed(seed).unwrap()
}

async fn spawn_orders() -> String {
    let book = Arc::new(order_book());
    let (addr, srv) = server::bind(
        any_port(),
        move |req| server::handle_orders(req, book.clone()),
        std::future::pending(),
    )
    .unwrap();
    tokio::spawn(srv);
    format!("http://{addr}")
}

async fn spawn_ratings() -> String {
    let book = Arc::new(rating_book());
    let (addr, srv) = server::bind(
        any_port(),
        move |req| server::handle_ratings(req, book.clone()),
        std::future::pending(),
    )
    .unwrap();
    tokio::spawn(srv);
    format!("http://{addr}")
}

async fn spawn_report(orders_url: &str, ratings_url: &str) -> String {
    let orders = HttpOrderSource::new(orders_url, policy()).unwrap();
    let ratings = HttpRatingSource::new(ratings_url, policy()).unwrap();
    let svc = Arc::new(ReportService::new(orders, ratings, 4));
    let (addr, srv) = server::bind(
        any_port(),
        move |req| server::handle_report(req, svc.clone()),
        std::future::pending(),
    )
    .unwrap();
    tokio::spawn(srv);
    format!("http://{addr}")
}

#[tokio::test]
async fn http_sources_speak_the_upstream_formats() {
    let orders = HttpOrderSource::new(&spawn_orders().await, policy()).unwrap();
    let ratings = HttpRatingSource::new(&spawn_ratings().await, policy()).unwrap();

    let volume = orders.order_volume(Period::Weekly).await.unwrap();
    assert_eq!(volume.len(), 2);
    assert_eq!(volume[0].item_name, "DishA");
    assert_eq!(volume[0].quantity, "10");
    assert_eq!(volume[0].income, "100.00");

    let monthly = orders.order_volume(Period::Monthly).await.unwrap();
    assert_eq!(monthly[0].quantity, "12");

    let v = orders.check_validity(&[1, 90, 91], Period::Weekly).await.unwrap();
    assert_eq!((v.total_order_ids, v.recent_orders_within_period), (3, 1));
    assert_eq!(v.invalid_count(), 2);

    let snap = ratings.rating_with_orders(1).await.unwrap();
    assert_eq!((snap.total_reviews, snap.good_reviews), (3, 2));
    assert_eq!(snap.order_ids, vec![1, 90, 91]);
    assert_eq!(ratings.rating_with_orders(77).await, Err(UpstreamError::NotFound));
}

#[tokio::test]
async fn report_over_http_is_a_csv_attachment() {
    let report = spawn_report(&spawn_orders().await, &spawn_ratings().await).await;

    let rsp = reqwest::get(format!("{report}/report/analytics?report_type=order_trends&report_period=weekly"))
        .await
        .unwrap();
    assert_eq!(rsp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        rsp.headers()["content-disposition"],
        "attachment; filename=analytics_with_ratings.csv"
    );
    let body = rsp.text().await.unwrap();
    assert_eq!(
        body,
        "item_name,quantity,income,total_reviews,good_reviews,good_ratio\n\
         DishA,10,100.00,1,0,0.0\n\
         DishB,5,50.00,1,1,1.0\n\
         TOTAL,15,150.00,2,1,0.5\n"
    );
}

#[tokio::test]
async fn report_rejects_bad_query() {
    let report = spawn_report(&spawn_orders().await, &spawn_ratings().await).await;

    let rsp = reqwest::get(format!("{report}/report/analytics?report_period=yearly")).await.unwrap();
    assert_eq!(rsp.status(), reqwest::StatusCode::BAD_REQUEST);

    let rsp = reqwest::get(format!("{report}/report/analytics?report_type=menu_preferences"))
        .await
        .unwrap();
    assert_eq!(rsp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dead_order_service_is_503() {
    // port 1 on loopback: connection refused
    let report = spawn_report("http://127.0.0.1:1", &spawn_ratings().await).await;

    let rsp = reqwest::get(format!("{report}/report/analytics")).await.unwrap();
    assert_eq!(rsp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(rsp.text().await.unwrap(), "Order or Rating service unavailable");
}
