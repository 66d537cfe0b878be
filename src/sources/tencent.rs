//! Tencent (腾讯财经) adapter.
//!
//! qt.gtimg.cn answers `v_<code>="a~b~c~...";` tilde strings. A-share volume
//! arrives in lots and turnover in 万元; both are normalized here and
//! nowhere else. Kline history lives on web.ifzq.gtimg.cn as nested JSON.

use async_trait::async_trait;
use serde_json::Value;

use crate::codec::{json_path, parse_tencent_vars, TaggedRecord};
use crate::error::{FetchError, FetchResult};
use crate::models::*;
use crate::net::Gateway;
use crate::sources::symbols::{canonical_hk, canonical_us, Symbol};
use crate::sources::{KlineRequest, SourceAdapter, SourceId};

const QT_HOST: &str = "qt.gtimg.cn";
const KLINE_HOST: &str = "gtimg.cn";
const REFERER: &str = "https://gu.qq.com/";

const INDEX_CODES: &[&str] = &["sh000001", "sz399001", "sz399006", "sh000300", "sh000016", "sz399005"];

/// Tencent global tags -> stable short symbols.
const GLOBAL_INDEX_TABLE: &[(&str, &str, &str, &str)] = &[
    ("usDJI", "DJI", "美洲", "US"),
    ("usIXIC", "IXIC", "美洲", "US"),
    ("usINX", "SPX", "美洲", "US"),
    ("hkHSI", "HSI", "亚太", "HK"),
];

pub struct Tencent;

/// Shared tilde layout: 1 name, 2 code, 3 price, 4 pre-close, 5 open,
/// 6 volume, 30 time, 31 change, 32 change%, 33 high, 34 low, 37 turnover.
struct TildeQuote {
    name: String,
    code: String,
    price: f64,
    pre_close: f64,
    open: f64,
    volume: i64,
    time: String,
    change: f64,
    change_percent: f64,
    high: f64,
    low: f64,
    /// 万元 as delivered; scaling is per instrument family.
    turnover_wan: f64,
}

fn tilde_quote(record: &TaggedRecord) -> Option<TildeQuote> {
    if record.fields.len() < 35 {
        return None;
    }
    let q = TildeQuote {
        name: record.str_at(1).to_string(),
        code: record.str_at(2).to_string(),
        price: record.f64_at(3),
        pre_close: record.f64_at(4),
        open: record.f64_at(5),
        volume: record.i64_at(6),
        time: record.str_at(30).to_string(),
        change: record.f64_at(31),
        change_percent: record.f64_at(32),
        high: record.f64_at(33),
        low: record.f64_at(34),
        turnover_wan: record.f64_at(37),
    };
    (q.price > 0.0).then_some(q)
}

fn map_a_share(record: &TaggedRecord) -> Option<Quote> {
    let symbol = Symbol::parse(&record.code).ok()?;
    let q = tilde_quote(record)?;
    Some(Quote {
        code: symbol.canonical(),
        name: q.name,
        price: q.price,
        pre_close: q.pre_close,
        open: q.open,
        // Lots to shares.
        volume: q.volume * 100,
        change: q.change,
        change_percent: q.change_percent,
        high: q.high,
        low: q.low,
        // 万元 to yuan.
        turnover: q.turnover_wan * 10_000.0,
        time: q.time,
    })
}

fn map_index(record: &TaggedRecord) -> Option<IndexQuote> {
    let q = tilde_quote(record)?;
    Some(IndexQuote {
        code: record.code.clone(),
        name: q.name,
        price: q.price,
        pre_close: q.pre_close,
        open: q.open,
        volume: q.volume * 100,
        change: q.change,
        change_percent: q.change_percent,
        high: q.high,
        low: q.low,
        turnover: q.turnover_wan * 10_000.0,
        time: q.time,
        ..Default::default()
    })
}

fn map_global_index(record: &TaggedRecord) -> Option<IndexQuote> {
    let entry = GLOBAL_INDEX_TABLE.iter().find(|(tag, _, _, _)| *tag == record.code)?;
    let q = tilde_quote(record)?;
    Some(IndexQuote {
        code: entry.1.to_string(),
        name: q.name,
        price: q.price,
        pre_close: q.pre_close,
        open: q.open,
        change: q.change,
        change_percent: q.change_percent,
        high: q.high,
        low: q.low,
        region: entry.2.to_string(),
        country: entry.3.to_string(),
        time: q.time,
        ..Default::default()
    })
}

fn map_hk(record: &TaggedRecord) -> Option<HkStockQuote> {
    let digits = record.code.strip_prefix("hk")?;
    let code = canonical_hk(digits).ok()?;
    let q = tilde_quote(record)?;
    Some(HkStockQuote {
        code,
        name: q.name,
        price: q.price,
        pre_close: q.pre_close,
        open: q.open,
        // HK volume is already in shares.
        volume: q.volume,
        change: q.change,
        change_percent: q.change_percent,
        high: q.high,
        low: q.low,
        turnover: q.turnover_wan * 10_000.0,
        lot_size: 0,
        time: q.time,
    })
}

fn map_us(record: &TaggedRecord) -> Option<UsStockQuote> {
    let ticker = record.code.strip_prefix("us")?;
    let code = canonical_us(ticker).ok()?;
    let q = tilde_quote(record)?;
    Some(UsStockQuote {
        code,
        name: q.name,
        price: q.price,
        pre_close: q.pre_close,
        open: q.open,
        volume: q.volume,
        change: q.change,
        change_percent: q.change_percent,
        high: q.high,
        low: q.low,
        time: q.time,
    })
}

fn tencent_kline_kind(period: KlinePeriod) -> &'static str {
    match period {
        KlinePeriod::Daily => "day",
        KlinePeriod::Weekly => "week",
        KlinePeriod::Monthly => "month",
        KlinePeriod::Min60 => "m60",
    }
}

/// Kline rows are `[date, open, close, high, low, volume, ...]` arrays under
/// `data.<code>.qfq<kind>` (adjusted) or `data.<code>.<kind>`.
fn map_klines(value: &Value, code: &str, kind: &str, canonical: &str) -> Vec<Candle> {
    let qfq = format!("data.{code}.qfq{kind}");
    let plain = format!("data.{code}.{kind}");
    let rows = json_path(value, &qfq)
        .or_else(|| json_path(value, &plain))
        .and_then(Value::as_array);
    let Some(rows) = rows else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let cells = row.as_array()?;
            let f = |i: usize| -> f64 {
                cells
                    .get(i)
                    .map(|v| match v {
                        Value::String(s) => s.parse().unwrap_or(0.0),
                        Value::Number(n) => n.as_f64().unwrap_or(0.0),
                        _ => 0.0,
                    })
                    .unwrap_or(0.0)
            };
            let candle = Candle {
                date: cells.first()?.as_str()?.to_string(),
                open: f(1),
                close: f(2),
                high: f(3),
                low: f(4),
                volume: (f(5) * 100.0) as i64,
                code: canonical.to_string(),
            };
            (candle.close > 0.0).then_some(candle)
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

async fn fetch_qt(gw: &Gateway, list: &str) -> FetchResult<Vec<TaggedRecord>> {
    let url = format!("https://qt.gtimg.cn/q={list}");
    let body = gw.get_text(QT_HOST, &url, Some(REFERER), None).await?;
    Ok(parse_tencent_vars(&body))
}

#[async_trait]
impl SourceAdapter for Tencent {
    fn id(&self) -> SourceId {
        SourceId::Tencent
    }

    async fn quotes(&self, gw: &Gateway, symbols: &[Symbol]) -> FetchResult<Vec<Quote>> {
        let list: Vec<String> = symbols.iter().map(Symbol::to_tencent).collect();
        let records = fetch_qt(gw, &list.join(",")).await?;
        non_empty(records.iter().filter_map(map_a_share).collect())
    }

    async fn indices(&self, gw: &Gateway) -> FetchResult<Vec<IndexQuote>> {
        let records = fetch_qt(gw, &INDEX_CODES.join(",")).await?;
        non_empty(records.iter().filter_map(map_index).collect())
    }

    async fn global_indices(&self, gw: &Gateway) -> FetchResult<Vec<IndexQuote>> {
        let tags: Vec<&str> = GLOBAL_INDEX_TABLE.iter().map(|(t, _, _, _)| *t).collect();
        let records = fetch_qt(gw, &tags.join(",")).await?;
        non_empty(records.iter().filter_map(map_global_index).collect())
    }

    async fn klines(&self, gw: &Gateway, req: KlineRequest<'_>) -> FetchResult<Vec<Candle>> {
        let code = req.symbol.to_tencent();
        let kind = tencent_kline_kind(req.period);
        let url = format!(
            "https://web.ifzq.gtimg.cn/appstock/app/fqkline/get?param={code},{kind},,,{},qfq",
            req.count
        );
        let body = gw.get_text(KLINE_HOST, &url, Some(REFERER), None).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        non_empty(map_klines(&value, &code, kind, &req.symbol.canonical()))
    }

    async fn hk_quotes(&self, gw: &Gateway, codes: &[String]) -> FetchResult<Vec<HkStockQuote>> {
        let list: Vec<String> = codes
            .iter()
            .filter_map(|c| canonical_hk(c).ok())
            .map(|c| format!("hk{c}"))
            .collect();
        let records = fetch_qt(gw, &list.join(",")).await?;
        non_empty(records.iter().filter_map(map_hk).collect())
    }

    async fn us_quotes(&self, gw: &Gateway, codes: &[String]) -> FetchResult<Vec<UsStockQuote>> {
        let list: Vec<String> = codes
            .iter()
            .filter_map(|c| canonical_us(c).ok())
            .map(|c| format!("us{c}"))
            .collect();
        let records = fetch_qt(gw, &list.join(",")).await?;
        non_empty(records.iter().filter_map(map_us).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, n_fields: usize, set: &[(usize, &str)]) -> TaggedRecord {
        let mut fields = vec!["0".to_string(); n_fields];
        for (i, v) in set {
            fields[*i] = v.to_string();
        }
        TaggedRecord { code: code.to_string(), fields }
    }

    #[test]
    fn a_share_mapping_scales_lots_and_wan() {
        let rec = record(
            "sh600519",
            48,
            &[
                (1, "贵州茅台"),
                (2, "600519"),
                (3, "1688.00"),
                (4, "1667.50"),
                (5, "1690.00"),
                (6, "25000"),
                (30, "20240115150003"),
                (31, "20.50"),
                (32, "1.23"),
                (33, "1695.50"),
                (34, "1680.00"),
                (37, "422345.6"),
            ],
        );
        let quote = map_a_share(&rec).unwrap();
        assert_eq!(quote.code, "sh600519");
        assert_eq!(quote.volume, 2_500_000, "lots x100");
        assert_eq!(quote.turnover, 4_223_456_000.0, "万元 x10000");
        assert_eq!(quote.change, 20.5);
        assert_eq!(quote.time, "20240115150003");
    }

    #[test]
    fn short_records_rejected() {
        let rec = TaggedRecord {
            code: "sh600519".into(),
            fields: vec!["1".into(), "贵州茅台".into(), "600519".into()],
        };
        assert!(map_a_share(&rec).is_none());
    }

    #[test]
    fn hk_volume_not_rescaled() {
        let rec = record(
            "hk00700",
            48,
            &[
                (1, "腾讯控股"),
                (2, "00700"),
                (3, "300.60"),
                (4, "295.40"),
                (5, "300.00"),
                (6, "15000000"),
                (31, "5.20"),
                (32, "1.76"),
                (33, "302.00"),
                (34, "298.20"),
                (37, "450000"),
            ],
        );
        let quote = map_hk(&rec).unwrap();
        assert_eq!(quote.code, "00700");
        assert_eq!(quote.volume, 15_000_000);
    }

    #[test]
    fn global_index_table_maps_tags() {
        let rec = record(
            "usDJI",
            48,
            &[(1, "道琼斯"), (2, "DJI"), (3, "38850.00"), (4, "38798.00"), (31, "52.00"), (32, "0.13")],
        );
        let idx = map_global_index(&rec).unwrap();
        assert_eq!(idx.code, "DJI");
        assert_eq!(idx.region, "美洲");
    }

    #[test]
    fn kline_mapping_walks_nested_payload() {
        let body = r#"{"code":0,"data":{"sh600519":{"qfqday":[
            ["2024-01-12","1690.00","1688.00","1695.50","1680.00","25000"],
            ["2024-01-15","1688.00","1701.00","1705.00","1685.00","31000"]
        ]}}}"#;
        let value: Value = serde_json::from_str(body).unwrap();
        let candles = map_klines(&value, "sh600519", "day", "sh600519");
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 1688.0);
        assert_eq!(candles[0].volume, 2_500_000);
    }
}
