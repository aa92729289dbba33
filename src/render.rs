// ===============================
// src/render.rs (CSV lines for the report stream)
// ===============================
//
// Satu fungsi = satu baris CSV, supaya baris bisa dikirim begitu siap.
// Kolom: item_name,quantity,income,total_reviews,good_reviews,good_ratio
// (item_id dipakai internal saja, tidak ditulis ulang).
//
use hyper::body::Bytes;

use crate::domain::{ReportRow, ReportTotals};

pub const COLUMNS: [&str; 6] = [
    "item_name",
    "quantity",
    "income",
    "total_reviews",
    "good_reviews",
    "good_ratio",
];

pub const TOTAL_LABEL: &str = "TOTAL";

fn line<I, T>(fields: I) -> Result<Bytes, csv::Error>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut w = csv::Writer::from_writer(Vec::with_capacity(96));
    w.write_record(fields)?;
    let buf = w.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(Bytes::from(buf))
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

/// 0.75 -> "0.75", 0 -> "0.0"
pub fn fmt_ratio(x: f64) -> String {
    if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

pub fn header() -> Result<Bytes, csv::Error> {
    line(COLUMNS)
}

pub fn row(r: &ReportRow) -> Result<Bytes, csv::Error> {
    line([
        r.item_name.clone(),
        r.quantity.clone(),
        r.income.clone(),
        opt(r.rating.total_reviews),
        opt(r.rating.good_reviews),
        r.rating.good_ratio.map(fmt_ratio).unwrap_or_default(),
    ])
}

pub fn totals(t: &ReportTotals) -> Result<Bytes, csv::Error> {
    line([
        TOTAL_LABEL.to_string(),
        t.quantity.to_string(),
        format!("{:.2}", t.income.round_dp(2)),
        t.total_reviews.to_string(),
        t.good_reviews.to_string(),
        t.good_ratio.map(fmt_ratio).unwrap_or_default(),
    ])
}

pub fn diagnostics(failed_items: usize) -> Result<Bytes, csv::Error> {
    let msg = format!("ERROR: {failed_items} menu items failed to fetch ratings.");
    line([msg.as_str(), "", "", "", "", ""])
}
