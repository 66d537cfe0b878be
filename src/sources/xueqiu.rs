//! Xueqiu (雪球) adapter.
//!
//! The v5 quote API is plain JSON but refuses requests without a session
//! cookie; a placeholder token is sent and rotated by the caller if the
//! host starts answering 400. Symbols use uppercase exchange prefixes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{FetchError, FetchResult};
use crate::models::*;
use crate::net::Gateway;
use crate::sources::symbols::Symbol;
use crate::sources::{SourceAdapter, SourceId};

const HOST: &str = "xueqiu.com";
const REFERER: &str = "https://xueqiu.com/";
/// Placeholder session cookie; the host only checks for presence.
const COOKIE: &str = "xq_a_token=placeholder";

pub struct Xueqiu;

fn num(row: &Value, key: &str) -> f64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn map_quotes(value: &Value) -> Vec<Quote> {
    let Some(rows) = value.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let tag = row.get("symbol").and_then(Value::as_str)?;
            let symbol = Symbol::from_xueqiu(tag).ok()?;
            let quote = Quote {
                code: symbol.canonical(),
                name: row.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                price: num(row, "current"),
                change: num(row, "chg"),
                change_percent: num(row, "percent"),
                open: num(row, "open"),
                high: num(row, "high"),
                low: num(row, "low"),
                pre_close: num(row, "last_close"),
                volume: num(row, "volume") as i64,
                turnover: num(row, "amount"),
                time: match row.get("timestamp") {
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::String(s)) => s.clone(),
                    _ => String::new(),
                },
            };
            quote.is_valid().then_some(quote)
        })
        .collect()
}

fn map_hot_topics(value: &Value) -> Vec<HotTopic> {
    let Some(rows) = value.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .enumerate()
        .filter_map(|(rank, row)| {
            let title = row.get("title").and_then(Value::as_str)?.to_string();
            Some(HotTopic {
                rank: rank as u32 + 1,
                title,
                heat: num(row, "view_count"),
                source: "雪球".to_string(),
            })
        })
        .collect()
}

fn non_empty<T>(records: Vec<T>) -> FetchResult<Vec<T>> {
    if records.is_empty() {
        Err(FetchError::EmptyResult)
    } else {
        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for Xueqiu {
    fn id(&self) -> SourceId {
        SourceId::Xueqiu
    }

    async fn quotes(&self, gw: &Gateway, symbols: &[Symbol]) -> FetchResult<Vec<Quote>> {
        let list: Vec<String> = symbols.iter().map(Symbol::to_xueqiu).collect();
        let url = format!(
            "https://stock.xueqiu.com/v5/stock/realtime/quotec.json?symbol={}",
            list.join(",")
        );
        let body = gw.get_text(HOST, &url, Some(REFERER), Some(COOKIE)).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        non_empty(map_quotes(&value))
    }

    async fn hot_topics(&self, gw: &Gateway, limit: usize) -> FetchResult<Vec<HotTopic>> {
        let url = format!("https://xueqiu.com/query/v1/hot_event/tag.json?since_id=-1&size={limit}");
        let body = gw.get_text(HOST, &url, Some(REFERER), Some(COOKIE)).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        non_empty(map_hot_topics(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quote_mapping_restores_canonical_codes() {
        let value = json!({"data": [
            {"symbol": "SH600519", "name": "贵州茅台", "current": 1688.0,
             "chg": 20.5, "percent": 1.23, "open": 1690.0, "high": 1695.5,
             "low": 1680.0, "last_close": 1667.5, "volume": 2500000,
             "amount": 4.2e9, "timestamp": 1705298403000i64},
            {"symbol": "SZ000001", "name": "平安银行", "current": -1.0}
        ], "error_code": 0});
        let quotes = map_quotes(&value);
        assert_eq!(quotes.len(), 1, "negative sentinel dropped");
        assert_eq!(quotes[0].code, "sh600519");
        assert_eq!(quotes[0].time, "1705298403000");
    }

    #[test]
    fn hot_topics_ranked_in_feed_order() {
        let value = json!({"data": [
            {"title": "AI产业链大涨", "view_count": 125000},
            {"title": "北向资金流入", "view_count": 86000}
        ]});
        let topics = map_hot_topics(&value);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].rank, 1);
        assert_eq!(topics[0].heat, 125000.0);
        assert_eq!(topics[1].source, "雪球");
    }
}
