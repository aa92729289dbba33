// ===============================
// src/orders.rs (order aggregator read model)
// ===============================
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{OrderVolumeRow, Period, VolumeRecord, WindowValidity};
use crate::error::SeedError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: i64,
    pub en_name: String,
    #[serde(default)]
    pub zh_name: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order { pub id: i64, pub user_id: i64, pub order_date: DateTime<Utc> }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine { pub order_id: i64, pub menu_item_id: i64, pub quantity: i64, pub unit_price: Decimal }

/// Seed document for `serve-orders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSeed {
    #[serde(default)]
    pub menu_items: Vec<MenuItem>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub order_lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("No order data found")]
    NoOrders,
    #[error("Order IDs must be provided for menu preferences report")]
    MissingOrderIds,
}

pub fn window_start(period: Period, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(period.days())
}

#[derive(Debug, Default)]
pub struct OrderBook {
    menu: HashMap<i64, MenuItem>,
    orders: HashMap<i64, Order>,
    lines: Vec<OrderLine>,
}

impl OrderBook {
    pub fn from_seed(seed: OrderSeed) -> Result<Self, SeedError> {
        let menu: HashMap<i64, MenuItem> = seed.menu_items.into_iter().map(|m| (m.id, m)).collect();
        let orders: HashMap<i64, Order> = seed.orders.into_iter().map(|o| (o.id, o)).collect();

        for l in &seed.order_lines {
            if !orders.contains_key(&l.order_id) {
                return Err(SeedError::Integrity(format!("order line references unknown order {}", l.order_id)));
            }
            if l.quantity < 0 || l.unit_price.is_sign_negative() {
                return Err(SeedError::Integrity(format!("negative quantity/price on order {}", l.order_id)));
            }
        }

        info!(menu_items = menu.len(), orders = orders.len(), lines = seed.order_lines.len(), "order book loaded");
        Ok(Self { menu, orders, lines: seed.order_lines })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_seed(serde_json::from_str(&raw)?)
    }

    /// Per-item quantity and income (unit_price x quantity) over the trailing window,
    /// busiest item first.
    pub fn order_volume(&self, period: Period, now: DateTime<Utc>) -> Result<Vec<OrderVolumeRow>, AggregateError> {
        let start = window_start(period, now);

        // BTreeMap: urutan awal deterministik sebelum sort stabil
        let mut acc: BTreeMap<i64, (i64, Decimal)> = BTreeMap::new();
        for line in &self.lines {
            let in_window = self
                .orders
                .get(&line.order_id)
                .map(|o| o.order_date >= start)
                .unwrap_or(false);
            if !in_window || !self.menu.contains_key(&line.menu_item_id) {
                continue;
            }
            let slot = acc.entry(line.menu_item_id).or_insert((0, Decimal::ZERO));
            slot.0 += line.quantity;
            slot.1 += line.unit_price * Decimal::from(line.quantity);
        }

        if acc.is_empty() {
            debug!(%period, "no orders in window");
            return Err(AggregateError::NoOrders);
        }

        let mut rows: Vec<OrderVolumeRow> = acc
            .into_iter()
            .filter_map(|(item_id, (quantity, income))| {
                self.menu.get(&item_id).map(|m| OrderVolumeRow {
                    item_id,
                    item_name: m.en_name.clone(),
                    quantity,
                    income,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.quantity.cmp(&a.quantity));
        Ok(rows)
    }

    /// How many of `order_ids` are known orders placed inside the window.
    /// `total_order_ids` is the raw input length; recent counts distinct orders.
    /// So one recent order behind two reviewed dining records still reports one
    /// id as invalid (same as an SQL `IN (..)` count on the order table).
    pub fn check_validity(
        &self,
        order_ids: &[i64],
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<WindowValidity, AggregateError> {
        if order_ids.is_empty() {
            return Err(AggregateError::MissingOrderIds);
        }
        let start = window_start(period, now);
        let recent: HashSet<i64> = order_ids
            .iter()
            .copied()
            .filter(|id| self.orders.get(id).map(|o| o.order_date >= start).unwrap_or(false))
            .collect();

        Ok(WindowValidity {
            total_order_ids: order_ids.len() as i64,
            recent_orders_within_period: recent.len() as i64,
        })
    }
}

// ---- wire encoding (GET /api/analytics) ----

fn finish(w: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, csv::Error> {
    w.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

pub fn encode_volume_csv(rows: Vec<OrderVolumeRow>) -> Result<Vec<u8>, csv::Error> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(["item_id", "item_name", "quantity", "income"])?;
    for row in rows {
        let rec = VolumeRecord::from(row);
        w.write_record([&rec.item_id, &rec.item_name, &rec.quantity, &rec.income])?;
    }
    finish(w)
}

pub fn encode_validity_csv(v: &WindowValidity) -> Result<Vec<u8>, csv::Error> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(["total_order_ids", "recent_orders_within_period"])?;
    w.write_record([v.total_order_ids.to_string(), v.recent_orders_within_period.to_string()])?;
    finish(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn book() -> OrderBook {
        let n = now();
        let seed = OrderSeed {
            menu_items: vec![
                MenuItem { id: 1, en_name: "Beef Noodles".into(), zh_name: None, price: Decimal::new(1000, 2) },
                MenuItem { id: 2, en_name: "Fried Rice".into(), zh_name: None, price: Decimal::new(850, 2) },
                MenuItem { id: 3, en_name: "Dumplings".into(), zh_name: None, price: Decimal::new(500, 2) },
            ],
            orders: vec![
                Order { id: 10, user_id: 1, order_date: n - Duration::hours(2) },
                Order { id: 11, user_id: 2, order_date: n - Duration::days(3) },
                Order { id: 12, user_id: 1, order_date: n - Duration::days(20) },
                Order { id: 13, user_id: 3, order_date: n - Duration::days(45) },
            ],
            order_lines: vec![
                OrderLine { order_id: 10, menu_item_id: 1, quantity: 2, unit_price: Decimal::new(1000, 2) },
                OrderLine { order_id: 10, menu_item_id: 2, quantity: 1, unit_price: Decimal::new(850, 2) },
                OrderLine { order_id: 11, menu_item_id: 2, quantity: 4, unit_price: Decimal::new(850, 2) },
                OrderLine { order_id: 12, menu_item_id: 3, quantity: 9, unit_price: Decimal::new(500, 2) },
                OrderLine { order_id: 13, menu_item_id: 1, quantity: 50, unit_price: Decimal::new(1000, 2) },
            ],
        };
        OrderBook::from_seed(seed).unwrap()
    }

    #[test]
    fn daily_window_only_sees_todays_orders() {
        let rows = book().order_volume(Period::Daily, now()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].item_id, 1);
        assert_eq!(rows[0].quantity, 2);
        assert_eq!(rows[0].income, Decimal::new(2000, 2));
        assert_eq!(rows[1].item_name, "Fried Rice");
    }

    #[test]
    fn weekly_and_monthly_sort_by_quantity_desc() {
        let weekly = book().order_volume(Period::Weekly, now()).unwrap();
        assert_eq!(weekly.iter().map(|r| r.item_id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(weekly[0].quantity, 5);
        assert_eq!(weekly[0].income, Decimal::new(4250, 2));

        let monthly = book().order_volume(Period::Monthly, now()).unwrap();
        assert_eq!(monthly.iter().map(|r| r.item_id).collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn empty_window_is_no_orders() {
        let later = now() + Duration::days(90);
        assert_eq!(book().order_volume(Period::Monthly, later), Err(AggregateError::NoOrders));
    }

    #[test]
    fn validity_counts_known_recent_orders() {
        let b = book();
        let v = b.check_validity(&[10, 11, 12, 13, 99, 10], Period::Weekly, now()).unwrap();
        assert_eq!(v.total_order_ids, 6);
        assert_eq!(v.recent_orders_within_period, 2);
        assert_eq!(b.check_validity(&[], Period::Daily, now()), Err(AggregateError::MissingOrderIds));
    }

    #[test]
    fn seed_rejects_dangling_lines() {
        let seed = OrderSeed {
            order_lines: vec![OrderLine { order_id: 1, menu_item_id: 1, quantity: 1, unit_price: Decimal::ONE }],
            ..Default::default()
        };
        assert!(matches!(OrderBook::from_seed(seed), Err(SeedError::Integrity(_))));
    }

    #[test]
    fn volume_csv_layout() {
        let rows = book().order_volume(Period::Weekly, now()).unwrap();
        let text = String::from_utf8(encode_volume_csv(rows).unwrap()).unwrap();
        assert_eq!(
            text,
            "item_id,item_name,quantity,income\n2,Fried Rice,5,42.50\n1,Beef Noodles,2,20.00\n"
        );
        let v = WindowValidity { total_order_ids: 10, recent_orders_within_period: 8 };
        let text = String::from_utf8(encode_validity_csv(&v).unwrap()).unwrap();
        assert_eq!(text, "total_order_ids,recent_orders_within_period\n10,8\n");
    }
}
