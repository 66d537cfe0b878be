//! Sina (新浪财经) adapter.
//!
//! The hq.sinajs.cn quote host answers GBK-encoded `var hq_str_<code>="..."`
//! lines; field meaning is positional and differs per instrument family
//! (A-share, `rt_hk`, `gb_`, `fx_`, `nf_`). A-share volume is already in
//! shares and turnover in yuan. The host rejects requests without a
//! finance.sina.com.cn Referer.

use async_trait::async_trait;
use serde_json::Value;

use crate::codec::{parse_sina_vars, TaggedRecord};
use crate::error::{FetchError, FetchResult};
use crate::models::*;
use crate::net::Gateway;
use crate::sources::symbols::{canonical_hk, canonical_us, Symbol};
use crate::sources::{KlineRequest, SourceAdapter, SourceId};

const HQ_HOST: &str = "hq.sinajs.cn";
const MAIN_HOST: &str = "sina.com.cn";
const REFERER: &str = "https://finance.sina.com.cn/";

/// International index tags on the hq host -> stable short symbols.
const GLOBAL_INDEX_TABLE: &[(&str, &str, &str, &str)] = &[
    ("int_dji", "DJI", "美洲", "US"),
    ("int_nasdaq", "IXIC", "美洲", "US"),
    ("int_sp500", "SPX", "美洲", "US"),
    ("int_hangseng", "HSI", "亚太", "HK"),
    ("int_nikkei", "N225", "亚太", "JP"),
    ("int_kospi", "KOSPI", "亚太", "KR"),
    ("int_twii", "TWII", "亚太", "TW"),
    ("int_sti", "STI", "亚太", "SG"),
    ("int_ftse", "FTSE", "欧洲", "GB"),
    ("int_dax", "GDAXI", "欧洲", "DE"),
    ("int_cac", "FCHI", "欧洲", "FR"),
];

/// Domestic benchmark indices on the `s_` compact form.
const INDEX_CODES: &[&str] = &["s_sh000001", "s_sz399001", "s_sz399006", "s_sh000300", "s_sh000016", "s_sz399005"];

pub struct Sina;

/// A-share layout: 0 name, 1 open, 2 pre-close, 3 price, 4 high, 5 low,
/// 8 volume (shares), 9 turnover (yuan), 30 date, 31 time.
fn map_a_share(record: &TaggedRecord) -> Option<Quote> {
    let symbol = Symbol::parse(&record.code).ok()?;
    let price = record.f64_at(3);
    let pre_close = record.f64_at(2);
    let change = price - pre_close;
    let quote = Quote {
        code: symbol.canonical(),
        name: record.str_at(0).to_string(),
        open: record.f64_at(1),
        pre_close,
        price,
        high: record.f64_at(4),
        low: record.f64_at(5),
        volume: record.i64_at(8),
        turnover: record.f64_at(9),
        change,
        change_percent: if pre_close > 0.0 { change / pre_close * 100.0 } else { 0.0 },
        time: format!("{} {}", record.str_at(30), record.str_at(31)),
    };
    quote.is_valid().then_some(quote)
}

/// Compact index layout: 0 name, 1 price, 2 change, 3 change%, 4 volume
/// (lots), 5 turnover (万元).
fn map_index(record: &TaggedRecord) -> Option<IndexQuote> {
    let code = record.code.strip_prefix("s_")?.to_string();
    let idx = IndexQuote {
        code,
        name: record.str_at(0).to_string(),
        price: record.f64_at(1),
        change: record.f64_at(2),
        change_percent: record.f64_at(3),
        volume: record.i64_at(4) * 100,
        turnover: record.f64_at(5) * 10_000.0,
        ..Default::default()
    };
    (idx.price > 0.0).then_some(idx)
}

/// International index layout: 0 name, 1 price, 2 change, 3 change%.
fn map_global_index(record: &TaggedRecord) -> Option<IndexQuote> {
    let entry = GLOBAL_INDEX_TABLE.iter().find(|(tag, _, _, _)| *tag == record.code)?;
    let idx = IndexQuote {
        code: entry.1.to_string(),
        name: record.str_at(0).to_string(),
        price: record.f64_at(1),
        change: record.f64_at(2),
        change_percent: record.f64_at(3),
        region: entry.2.to_string(),
        country: entry.3.to_string(),
        ..Default::default()
    };
    (idx.price > 0.0).then_some(idx)
}

/// `rt_hk` layout: 0 english name, 1 name, 2 open, 3 pre-close, 4 high,
/// 5 low, 6 price, 7 change, 8 change%, 11 turnover, 12 volume, 17 date,
/// 18 time.
fn map_hk(record: &TaggedRecord) -> Option<HkStockQuote> {
    let digits = record.code.strip_prefix("rt_hk")?;
    let code = canonical_hk(digits).ok()?;
    let quote = HkStockQuote {
        code,
        name: record.str_at(1).to_string(),
        open: record.f64_at(2),
        pre_close: record.f64_at(3),
        high: record.f64_at(4),
        low: record.f64_at(5),
        price: record.f64_at(6),
        change: record.f64_at(7),
        change_percent: record.f64_at(8),
        turnover: record.f64_at(11),
        volume: record.i64_at(12),
        lot_size: 0,
        time: format!("{} {}", record.str_at(17), record.str_at(18)),
    };
    (quote.price > 0.0).then_some(quote)
}

/// `gb_` layout: 0 name, 1 price, 2 change%, 3 time, 4 change, 5 open,
/// 6 high, 7 low, 10 volume, 26 pre-close.
fn map_us(record: &TaggedRecord) -> Option<UsStockQuote> {
    let ticker = record.code.strip_prefix("gb_")?;
    let code = canonical_us(&ticker.replace('$', ".")).ok()?;
    let quote = UsStockQuote {
        code,
        name: record.str_at(0).to_string(),
        price: record.f64_at(1),
        change_percent: record.f64_at(2),
        time: record.str_at(3).to_string(),
        change: record.f64_at(4),
        open: record.f64_at(5),
        high: record.f64_at(6),
        low: record.f64_at(7),
        volume: record.i64_at(10),
        pre_close: record.f64_at(26),
    };
    (quote.price > 0.0).then_some(quote)
}

/// `fx_s` layout: 0 time, 1 bid, 2 ask, 3 pre-close, 5 open, 6 high, 7 low,
/// 8 latest, 9 name.
fn map_forex(record: &TaggedRecord) -> Option<ForexQuote> {
    let pair = record.code.strip_prefix("fx_s")?.to_ascii_uppercase();
    let price = {
        let latest = record.f64_at(8);
        if latest > 0.0 { latest } else { record.f64_at(1) }
    };
    let pre_close = record.f64_at(3);
    let change = price - pre_close;
    let quote = ForexQuote {
        pair,
        name: record.str_at(9).to_string(),
        time: record.str_at(0).to_string(),
        pre_close,
        open: record.f64_at(5),
        high: record.f64_at(6),
        low: record.f64_at(7),
        price,
        change,
        change_percent: if pre_close > 0.0 { change / pre_close * 100.0 } else { 0.0 },
    };
    (quote.price > 0.0).then_some(quote)
}

/// `nf_` layout: 0 name, 1 time, 2 open, 3 high, 4 low, 8 latest,
/// 9 settlement, 10 previous settlement, 13 open interest, 14 volume.
fn map_futures(record: &TaggedRecord) -> Option<FuturesQuote> {
    let code = record.code.strip_prefix("nf_")?.to_ascii_uppercase();
    let price = record.f64_at(8);
    let prev_settlement = record.f64_at(10);
    let change = price - prev_settlement;
    let quote = FuturesQuote {
        code,
        name: record.str_at(0).to_string(),
        time: record.str_at(1).to_string(),
        open: record.f64_at(2),
        high: record.f64_at(3),
        low: record.f64_at(4),
        price,
        settlement: record.f64_at(9),
        change,
        change_percent: if prev_settlement > 0.0 { change / prev_settlement * 100.0 } else { 0.0 },
        open_interest: record.i64_at(13),
        volume: record.i64_at(14),
    };
    (quote.price > 0.0).then_some(quote)
}

fn sina_kline_scale(period: KlinePeriod) -> &'static str {
    match period {
        KlinePeriod::Daily => "240",
        KlinePeriod::Weekly => "1200",
        KlinePeriod::Monthly => "7200",
        KlinePeriod::Min60 => "60",
    }
}

fn map_klines(value: &Value, canonical: &str) -> Vec<Candle> {
    let Some(rows) = value.as_array() else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let get = |k: &str| -> f64 {
                match row.get(k) {
                    Some(Value::String(s)) => s.parse().unwrap_or(0.0),
                    Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                    _ => 0.0,
                }
            };
            let date = row.get("day").and_then(Value::as_str)?.to_string();
            let candle = Candle {
                date,
                open: get("open"),
                high: get("high"),
                low: get("low"),
                close: get("close"),
                volume: get("volume") as i64,
                code: canonical.to_string(),
            };
            (candle.close > 0.0).then_some(candle)
        })
        .collect()
}

fn map_news(value: &Value) -> Vec<NewsItem> {
    let Some(rows) = crate::codec::json_path(value, "result.data").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .enumerate()
        .filter_map(|(rank, row)| {
            let title = row.get("title").and_then(Value::as_str)?.to_string();
            let ctime = match row.get("ctime") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            Some(NewsItem {
                id: row.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
                title,
                body: row.get("intro").and_then(Value::as_str).unwrap_or_default().to_string(),
                time: ctime,
                source: "新浪财经".to_string(),
                importance: Importance::from_rank(rank),
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

async fn fetch_hq(gw: &Gateway, list: &str) -> FetchResult<Vec<TaggedRecord>> {
    let url = format!("https://hq.sinajs.cn/list={list}");
    let body = gw.get_text(HQ_HOST, &url, Some(REFERER), None).await?;
    Ok(parse_sina_vars(&body))
}

#[async_trait]
impl SourceAdapter for Sina {
    fn id(&self) -> SourceId {
        SourceId::Sina
    }

    async fn quotes(&self, gw: &Gateway, symbols: &[Symbol]) -> FetchResult<Vec<Quote>> {
        let list: Vec<String> = symbols.iter().map(Symbol::to_sina).collect();
        let records = fetch_hq(gw, &list.join(",")).await?;
        non_empty(records.iter().filter_map(map_a_share).collect())
    }

    async fn indices(&self, gw: &Gateway) -> FetchResult<Vec<IndexQuote>> {
        let records = fetch_hq(gw, &INDEX_CODES.join(",")).await?;
        non_empty(records.iter().filter_map(map_index).collect())
    }

    async fn global_indices(&self, gw: &Gateway) -> FetchResult<Vec<IndexQuote>> {
        let tags: Vec<&str> = GLOBAL_INDEX_TABLE.iter().map(|(t, _, _, _)| *t).collect();
        let records = fetch_hq(gw, &tags.join(",")).await?;
        non_empty(records.iter().filter_map(map_global_index).collect())
    }

    async fn klines(&self, gw: &Gateway, req: KlineRequest<'_>) -> FetchResult<Vec<Candle>> {
        let url = format!(
            "https://money.finance.sina.com.cn/quotes_service/api/json_v2.php/CN_MarketData.getKLineData?symbol={}&scale={}&ma=no&datalen={}",
            req.symbol.to_sina(),
            sina_kline_scale(req.period),
            req.count
        );
        let body = gw.get_text(MAIN_HOST, &url, Some(REFERER), None).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        non_empty(map_klines(&value, &req.symbol.canonical()))
    }

    async fn news(&self, gw: &Gateway, limit: usize) -> FetchResult<Vec<NewsItem>> {
        let url = format!(
            "https://feed.mix.sina.com.cn/api/roll/get?pageid=153&lid=2516&k=&num={limit}&page=1"
        );
        let body = gw.get_text(MAIN_HOST, &url, Some(REFERER), None).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        non_empty(map_news(&value))
    }

    async fn hk_quotes(&self, gw: &Gateway, codes: &[String]) -> FetchResult<Vec<HkStockQuote>> {
        let list: Vec<String> = codes
            .iter()
            .filter_map(|c| canonical_hk(c).ok())
            .map(|c| format!("rt_hk{c}"))
            .collect();
        let records = fetch_hq(gw, &list.join(",")).await?;
        non_empty(records.iter().filter_map(map_hk).collect())
    }

    async fn us_quotes(&self, gw: &Gateway, codes: &[String]) -> FetchResult<Vec<UsStockQuote>> {
        let list: Vec<String> = codes
            .iter()
            .filter_map(|c| canonical_us(c).ok())
            .map(|c| format!("gb_{}", c.to_ascii_lowercase().replace('.', "$")))
            .collect();
        let records = fetch_hq(gw, &list.join(",")).await?;
        non_empty(records.iter().filter_map(map_us).collect())
    }

    async fn forex(&self, gw: &Gateway, pairs: &[String]) -> FetchResult<Vec<ForexQuote>> {
        let list: Vec<String> = pairs
            .iter()
            .map(|p| format!("fx_s{}", p.to_ascii_lowercase()))
            .collect();
        let records = fetch_hq(gw, &list.join(",")).await?;
        non_empty(records.iter().filter_map(map_forex).collect())
    }

    async fn futures(&self, gw: &Gateway, codes: &[String]) -> FetchResult<Vec<FuturesQuote>> {
        let list: Vec<String> = codes
            .iter()
            .map(|c| format!("nf_{}", c.to_ascii_uppercase()))
            .collect();
        let records = fetch_hq(gw, &list.join(",")).await?;
        non_empty(records.iter().filter_map(map_futures).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, csv: &str) -> TaggedRecord {
        TaggedRecord {
            code: code.to_string(),
            fields: csv.split(',').map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn a_share_mapping_derives_change_fields() {
        let body = "var hq_str_sh600519=\"贵州茅台,1690.000,1667.500,1688.000,1695.500,1680.000,1687.990,1688.000,2500000,4223456789.000,100,1687.990,200,1687.980,300,1687.970,400,1687.960,500,1687.950,100,1688.000,200,1688.010,300,1688.020,400,1688.030,500,1688.040,2024-01-15,15:00:03,00\";";
        let records = parse_sina_vars(body);
        let quote = map_a_share(&records[0]).unwrap();
        assert_eq!(quote.code, "sh600519");
        assert_eq!(quote.name, "贵州茅台");
        assert_eq!(quote.price, 1688.0);
        assert_eq!(quote.pre_close, 1667.5);
        assert!((quote.change - 20.5).abs() < 1e-9);
        assert!((quote.change_percent - 20.5 / 1667.5 * 100.0).abs() < 1e-9);
        assert_eq!(quote.volume, 2_500_000);
        assert_eq!(quote.time, "2024-01-15 15:00:03");
    }

    #[test]
    fn index_mapping_scales_lots_and_wan() {
        let rec = record("s_sh000001", "上证指数,3125.50,38.70,1.25,3500000,41000000");
        let idx = map_index(&rec).unwrap();
        assert_eq!(idx.code, "sh000001");
        assert_eq!(idx.volume, 350_000_000);
        assert_eq!(idx.turnover, 410_000_000_000.0);
    }

    #[test]
    fn global_index_symbol_table() {
        let rec = record("int_dji", "道琼斯,38850.00,52.00,0.13");
        let idx = map_global_index(&rec).unwrap();
        assert_eq!(idx.code, "DJI");
        assert_eq!(idx.region, "美洲");
        assert!(map_global_index(&record("int_unknown", "x,1,1,1")).is_none());
    }

    #[test]
    fn hk_mapping_pads_code() {
        let rec = record(
            "rt_hk00700",
            "TENCENT,腾讯控股,300.000,295.400,302.000,298.200,300.600,5.200,1.76,300.4,300.6,4.5e9,15000000,0,0,0,0,2024/01/15,16:08",
        );
        let quote = map_hk(&rec).unwrap();
        assert_eq!(quote.code, "00700");
        assert_eq!(quote.name, "腾讯控股");
        assert_eq!(quote.price, 300.6);
        assert_eq!(quote.volume, 15_000_000);
    }

    #[test]
    fn us_mapping_restores_dotted_tickers() {
        let rec = record(
            "gb_brk$b",
            "伯克希尔B,360.50,0.85,2024-01-15 16:00:00,3.04,358.00,361.20,357.10,365.0,300.0,3200000,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,357.46",
        );
        let quote = map_us(&rec).unwrap();
        assert_eq!(quote.code, "BRK.B");
        assert_eq!(quote.price, 360.5);
        assert_eq!(quote.pre_close, 357.46);
    }

    #[test]
    fn forex_mapping_prefers_latest_over_bid() {
        let rec = record(
            "fx_susdcny",
            "15:59:29,7.1920,7.1930,7.1825,0,7.1850,7.1990,7.1800,7.1925,美元人民币",
        );
        let quote = map_forex(&rec).unwrap();
        assert_eq!(quote.pair, "USDCNY");
        assert_eq!(quote.price, 7.1925);
        assert!((quote.change - (7.1925 - 7.1825)).abs() < 1e-9);
    }

    #[test]
    fn futures_mapping_changes_against_prev_settlement() {
        let rec = record(
            "nf_AU2406",
            "沪金2406,150959,468.00,470.88,466.98,469.98,469.90,469.96,469.96,469.00,466.00,13,20,168808,289206",
        );
        let quote = map_futures(&rec).unwrap();
        assert_eq!(quote.code, "AU2406");
        assert_eq!(quote.price, 469.96);
        assert_eq!(quote.settlement, 469.0);
        assert!((quote.change - (469.96 - 466.00)).abs() < 1e-9);
        assert_eq!(quote.open_interest, 168808);
        assert_eq!(quote.volume, 289206);
    }

    #[test]
    fn kline_mapping_parses_sina_json() {
        let body = r#"[{"day":"2024-01-12","open":"1690.000","high":"1695.500","low":"1680.000","close":"1688.000","volume":"2500000"},
                       {"day":"2024-01-15","open":"1688.000","high":"1705.000","low":"1685.000","close":"1701.000","volume":"3100000"}]"#;
        let value: Value = serde_json::from_str(body).unwrap();
        let candles = map_klines(&value, "sh600519");
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, 1701.0);
        assert_eq!(candles[0].code, "sh600519");
    }
}
