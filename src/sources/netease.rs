//! Netease (网易财经) adapter.
//!
//! The feed API wraps JSON in `_ntes_quote_callback(...)` and keys records
//! by the 7-digit exchange-prefixed code (`0` Shanghai, `1` Shenzhen).
//! `percent` arrives as a fraction, not a percentage. Daily history comes
//! from the 163 chddata CSV export, which is GBK-encoded and newest-first;
//! the gateway has already transcoded it by the time it reaches the mapper.

use async_trait::async_trait;
use serde_json::Value;

use crate::codec::strip_jsonp;
use crate::error::{FetchError, FetchResult};
use crate::models::*;
use crate::net::Gateway;
use crate::sources::symbols::Symbol;
use crate::sources::{KlineRequest, SourceAdapter, SourceId};

const HOST: &str = "api.money.126.net";
const REFERER: &str = "https://money.163.com/";

pub struct Netease;

fn num(row: &Value, key: &str) -> f64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn map_quotes(value: &Value) -> Vec<Quote> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, row)| {
            let symbol = Symbol::from_netease(key).ok()?;
            let quote = Quote {
                code: symbol.canonical(),
                name: row.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                price: num(row, "price"),
                open: num(row, "open"),
                high: num(row, "high"),
                low: num(row, "low"),
                pre_close: num(row, "yestclose"),
                change: num(row, "updown"),
                // Fraction to percentage.
                change_percent: num(row, "percent") * 100.0,
                volume: num(row, "volume") as i64,
                turnover: num(row, "turnover"),
                time: row.get("time").and_then(Value::as_str).unwrap_or_default().to_string(),
            };
            quote.is_valid().then_some(quote)
        })
        .collect()
}

/// chddata CSV columns: 0 日期, 1 股票代码, 2 名称, 3 收盘价, 4 最高价,
/// 5 最低价, 6 开盘价, 11 成交量. Rows are newest-first.
fn map_history_csv(body: &str, canonical: &str) -> Vec<Candle> {
    let mut candles: Vec<Candle> = body
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cells: Vec<&str> = line.split(',').collect();
            if cells.len() < 12 {
                return None;
            }
            let candle = Candle {
                date: cells[0].trim().to_string(),
                close: cells[3].trim().parse().unwrap_or(0.0),
                high: cells[4].trim().parse().unwrap_or(0.0),
                low: cells[5].trim().parse().unwrap_or(0.0),
                open: cells[6].trim().parse().unwrap_or(0.0),
                volume: cells[11].trim().parse::<f64>().map(|v| v as i64).unwrap_or(0),
                code: canonical.to_string(),
            };
            (candle.close > 0.0).then_some(candle)
        })
        .collect();
    candles.reverse();
    candles
}

fn non_empty<T>(records: Vec<T>) -> FetchResult<Vec<T>> {
    if records.is_empty() {
        Err(FetchError::EmptyResult)
    } else {
        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for Netease {
    fn id(&self) -> SourceId {
        SourceId::Netease
    }

    async fn quotes(&self, gw: &Gateway, symbols: &[Symbol]) -> FetchResult<Vec<Quote>> {
        let list: Vec<String> = symbols.iter().map(Symbol::to_netease).collect();
        let url = format!("https://api.money.126.net/data/feed/{},money.api", list.join(","));
        let body = gw.get_text(HOST, &url, Some(REFERER), None).await?;
        let value = strip_jsonp(&body).ok_or_else(|| FetchError::Decode("bad feed envelope".into()))?;
        non_empty(map_quotes(&value))
    }

    async fn klines(&self, gw: &Gateway, req: KlineRequest<'_>) -> FetchResult<Vec<Candle>> {
        // The CSV export only carries daily bars; other periods belong to
        // other sources in the rotation.
        if req.period != KlinePeriod::Daily {
            return Err(FetchError::EmptyResult);
        }
        let end = chrono::Local::now().format("%Y%m%d").to_string();
        let url = format!(
            "https://quotes.money.163.com/service/chddata.html?code={}&end={end}&fields=TCLOSE;HIGH;LOW;TOPEN;LCLOSE;CHG;PCHG;TURNOVER;VOTURNOVER;VATURNOVER",
            req.symbol.to_netease()
        );
        // Same quota family as the feed host.
        let body = gw.get_text(HOST, &url, Some(REFERER), None).await?;
        let mut candles = map_history_csv(&body, &req.symbol.canonical());
        if candles.len() > req.count {
            candles.drain(..candles.len() - req.count);
        }
        non_empty(candles)
    }
}
