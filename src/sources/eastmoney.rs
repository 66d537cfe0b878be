//! Eastmoney (东方财富) adapter.
//!
//! The push2 quote API has two dialects: with `fltt=2` prices arrive as raw
//! decimals; without it every price field is scaled by 100. Both are used
//! upstream, so the division lives in the mapping for each endpoint and is
//! never centralized. Volume (`f5`) is in lots and is converted to shares.
//! Suspended instruments report `"-"` in numeric fields; those parse to 0
//! and the price filter drops the row.

use async_trait::async_trait;
use serde_json::Value;

use crate::codec::{json_path, strip_jsonp};
use crate::error::{FetchError, FetchResult};
use crate::models::*;
use crate::net::Gateway;
use crate::sources::symbols::{canonical_hk, canonical_us, Symbol};
use crate::sources::{bust, KlineRequest, SourceAdapter, SourceId};

const PUSH2_HOST: &str = "push2.eastmoney.com";
const MAIN_HOST: &str = "eastmoney.com";
const FUND_HOST: &str = "fund.eastmoney.com";

const REFERER: &str = "https://quote.eastmoney.com/";
const FUND_REFERER: &str = "https://fund.eastmoney.com/";

/// Quote fields requested from the ulist endpoint, `fltt=2` dialect.
const QUOTE_FIELDS: &str = "f2,f3,f4,f5,f6,f12,f13,f14,f15,f16,f17,f18,f124";

/// Domestic benchmark indices (secid form).
const INDEX_SECIDS: &str = "1.000001,0.399001,0.399006,1.000300,1.000016,0.399005";

/// Global index boards: Eastmoney secid -> (stable short symbol, region, country).
const GLOBAL_INDEX_TABLE: &[(&str, &str, &str, &str)] = &[
    ("100.DJIA", "DJI", "美洲", "US"),
    ("100.NDX", "IXIC", "美洲", "US"),
    ("100.SPX", "SPX", "美洲", "US"),
    ("100.HSI", "HSI", "亚太", "HK"),
    ("100.N225", "N225", "亚太", "JP"),
    ("100.KS11", "KOSPI", "亚太", "KR"),
    ("100.TWII", "TWII", "亚太", "TW"),
    ("100.STI", "STI", "亚太", "SG"),
    ("100.SENSEX", "SENSEX", "亚太", "IN"),
    ("100.AS51", "AXJO", "亚太", "AU"),
    ("100.FTSE", "FTSE", "欧洲", "GB"),
    ("100.GDAXI", "GDAXI", "欧洲", "DE"),
    ("100.FCHI", "FCHI", "欧洲", "FR"),
    ("100.TSX", "TSX", "美洲", "CA"),
    ("100.NZ50", "NZ50", "亚太", "NZ"),
];

pub struct Eastmoney;

/// Numeric field that may arrive as a number, a numeric string, or `"-"`.
fn num(row: &Value, key: &str) -> f64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn text(row: &Value, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn map_quote_row(row: &Value) -> Option<Quote> {
    let code_digits = text(row, "f12");
    let market = text(row, "f13");
    let secid = format!("{market}.{code_digits}");
    let symbol = Symbol::from_eastmoney(&secid).ok()?;

    let quote = Quote {
        code: symbol.canonical(),
        name: text(row, "f14"),
        price: num(row, "f2"),
        change_percent: num(row, "f3"),
        change: num(row, "f4"),
        volume: (num(row, "f5") * 100.0) as i64,
        turnover: num(row, "f6"),
        high: num(row, "f15"),
        low: num(row, "f16"),
        open: num(row, "f17"),
        pre_close: num(row, "f18"),
        time: text(row, "f124"),
    };
    quote.is_valid().then_some(quote)
}

fn map_quotes(value: &Value) -> Vec<Quote> {
    json_path(value, "data.diff")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(map_quote_row).collect())
        .unwrap_or_default()
}

/// Short-form dialect: every price-like field is x100.
fn map_index_row_short(row: &Value) -> Option<IndexQuote> {
    let code = text(row, "f12");
    if code.is_empty() {
        return None;
    }
    let idx = IndexQuote {
        code,
        name: text(row, "f14"),
        price: num(row, "f2") / 100.0,
        change_percent: num(row, "f3") / 100.0,
        change: num(row, "f4") / 100.0,
        volume: (num(row, "f5") * 100.0) as i64,
        turnover: num(row, "f6"),
        high: num(row, "f15") / 100.0,
        low: num(row, "f16") / 100.0,
        open: num(row, "f17") / 100.0,
        pre_close: num(row, "f18") / 100.0,
        time: text(row, "f124"),
        ..Default::default()
    };
    (idx.price > 0.0).then_some(idx)
}

fn map_indices_short(value: &Value) -> Vec<IndexQuote> {
    json_path(value, "data.diff")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(map_index_row_short).collect())
        .unwrap_or_default()
}

fn map_global_indices(value: &Value) -> Vec<IndexQuote> {
    let Some(rows) = json_path(value, "data.diff").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let mut idx = map_index_row_short(row)?;
            let em_code = idx.code.clone();
            let entry = GLOBAL_INDEX_TABLE
                .iter()
                .find(|(secid, _, _, _)| secid.ends_with(&format!(".{em_code}")))?;
            idx.code = entry.1.to_string();
            idx.region = entry.2.to_string();
            idx.country = entry.3.to_string();
            Some(idx)
        })
        .collect()
}

/// Kline rows arrive as `"date,open,close,high,low,volume,turnover"` strings.
fn map_klines(value: &Value, canonical: &str) -> Vec<Candle> {
    let Some(rows) = json_path(value, "data.klines").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(Value::as_str)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() < 6 {
                return None;
            }
            Some(Candle {
                date: parts[0].to_string(),
                open: parts[1].parse().unwrap_or(0.0),
                close: parts[2].parse().unwrap_or(0.0),
                high: parts[3].parse().unwrap_or(0.0),
                low: parts[4].parse().unwrap_or(0.0),
                volume: parts[5].parse::<f64>().map(|v| (v * 100.0) as i64).unwrap_or(0),
                code: canonical.to_string(),
            })
        })
        .filter(|c| c.close > 0.0)
        .collect()
}

fn map_news(value: &Value) -> Vec<NewsItem> {
    let Some(rows) = json_path(value, "data.fastNewsList").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .enumerate()
        .filter_map(|(rank, row)| {
            let title = text(row, "title");
            if title.is_empty() {
                return None;
            }
            Some(NewsItem {
                id: text(row, "code"),
                title,
                body: text(row, "summary"),
                time: text(row, "showTime"),
                source: "东方财富".to_string(),
                importance: Importance::from_rank(rank),
            })
        })
        .collect()
}

fn map_fund_flow(value: &Value) -> Vec<FundFlow> {
    let Some(rows) = json_path(value, "data.diff").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let code_digits = text(row, "f12");
            let secid = format!("{}.{}", text(row, "f13"), code_digits);
            let symbol = Symbol::from_eastmoney(&secid).ok()?;
            Some(FundFlow {
                code: symbol.canonical(),
                name: text(row, "f14"),
                main_net: num(row, "f62"),
                super_net: num(row, "f66"),
                large_net: num(row, "f72"),
                medium_net: num(row, "f78"),
                small_net: num(row, "f84"),
                main_net_percent: num(row, "f184"),
            })
        })
        .collect()
}

fn map_reports(value: &Value) -> Vec<ResearchReport> {
    let Some(rows) = value.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let title = text(row, "title");
            if title.is_empty() {
                return None;
            }
            let info_code = text(row, "infoCode");
            Some(ResearchReport {
                title,
                org: text(row, "orgSName"),
                rating: text(row, "emRatingName"),
                date: text(row, "publishDate"),
                url: format!("https://data.eastmoney.com/report/info/{info_code}.html"),
            })
        })
        .collect()
}

fn map_notices(value: &Value, code_digits: &str) -> Vec<Notice> {
    let Some(rows) = json_path(value, "data.list").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let title = text(row, "title");
            if title.is_empty() {
                return None;
            }
            let art_code = text(row, "art_code");
            let notice_type = row
                .get("columns")
                .and_then(Value::as_array)
                .and_then(|cols| cols.first())
                .map(|c| text(c, "column_name"))
                .unwrap_or_default();
            Some(Notice {
                title,
                notice_type,
                date: text(row, "notice_date"),
                url: format!("https://data.eastmoney.com/notices/detail/{code_digits}/{art_code}.html"),
            })
        })
        .collect()
}

fn map_fund_estimate(value: &Value) -> Option<FundPriceEstimate> {
    let est = FundPriceEstimate {
        code: text(value, "fundcode"),
        name: text(value, "name"),
        net_value: num(value, "dwjz"),
        estimate: num(value, "gsz"),
        estimate_change_percent: num(value, "gszzl"),
        estimate_time: text(value, "gztime"),
    };
    (!est.code.is_empty() && est.net_value > 0.0).then_some(est)
}

fn map_fund_basic(value: &Value) -> Option<FundDetail> {
    let datas = value.get("Datas")?;
    let detail = FundDetail {
        code: text(datas, "FCODE"),
        name: text(datas, "SHORTNAME"),
        fund_type: text(datas, "FTYPE"),
        net_value: num(datas, "DWJZ"),
        net_value_date: text(datas, "FSRQ"),
        cumulative_value: num(datas, "LJJZ"),
        return_1m: num(datas, "SYL_Y"),
        return_3m: num(datas, "SYL_3Y"),
        return_1y: num(datas, "SYL_1N"),
        holdings: Vec::new(),
        performance: Vec::new(),
    };
    (!detail.code.is_empty()).then_some(detail)
}

fn map_fund_holdings(value: &Value) -> Vec<FundHolding> {
    json_path(value, "Datas.fundStocks")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let code = text(row, "GPDM");
                    if code.is_empty() {
                        return None;
                    }
                    Some(FundHolding {
                        stock_code: code,
                        stock_name: text(row, "GPJC"),
                        weight_percent: num(row, "JZBL"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn map_fund_history(value: &Value) -> Vec<FundPerformancePoint> {
    value
        .get("Datas")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let date = text(row, "FSRQ");
                    let v = num(row, "DWJZ");
                    (!date.is_empty() && v > 0.0)
                        .then_some(FundPerformancePoint { date, value: v })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn map_hk_quotes(value: &Value) -> Vec<HkStockQuote> {
    let Some(rows) = json_path(value, "data.diff").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let code = canonical_hk(&text(row, "f12")).ok()?;
            let quote = HkStockQuote {
                code,
                name: text(row, "f14"),
                price: num(row, "f2"),
                change_percent: num(row, "f3"),
                change: num(row, "f4"),
                volume: num(row, "f5") as i64,
                turnover: num(row, "f6"),
                high: num(row, "f15"),
                low: num(row, "f16"),
                open: num(row, "f17"),
                pre_close: num(row, "f18"),
                lot_size: 0,
                time: text(row, "f124"),
            };
            (quote.price > 0.0).then_some(quote)
        })
        .collect()
}

fn map_us_quotes(value: &Value) -> Vec<UsStockQuote> {
    let Some(rows) = json_path(value, "data.diff").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter_map(|row| {
            let code = canonical_us(&text(row, "f12")).ok()?;
            if !seen.insert(code.clone()) {
                return None;
            }
            let quote = UsStockQuote {
                code,
                name: text(row, "f14"),
                price: num(row, "f2"),
                change_percent: num(row, "f3"),
                change: num(row, "f4"),
                volume: num(row, "f5") as i64,
                high: num(row, "f15"),
                low: num(row, "f16"),
                open: num(row, "f17"),
                pre_close: num(row, "f18"),
                time: text(row, "f124"),
            };
            (quote.price > 0.0).then_some(quote)
        })
        .collect()
}

fn map_industry_ranking(value: &Value) -> Vec<IndustryRank> {
    let Some(rows) = json_path(value, "data.diff").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let board_code = text(row, "f12");
            if board_code.is_empty() {
                return None;
            }
            Some(IndustryRank {
                board_code,
                board_name: text(row, "f14"),
                change_percent: num(row, "f3"),
                main_net: num(row, "f62"),
                leader_name: text(row, "f128"),
                leader_code: text(row, "f140"),
                leader_change_percent: num(row, "f136"),
            })
        })
        .collect()
}

fn map_leaderboard(value: &Value) -> Vec<LeaderboardRow> {
    let Some(rows) = json_path(value, "result.data").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let digits = text(row, "SECURITY_CODE");
            let symbol = Symbol::parse(&digits).ok()?;
            Some(LeaderboardRow {
                code: symbol.canonical(),
                name: text(row, "SECURITY_NAME_ABBR"),
                change_percent: num(row, "CHANGE_RATE"),
                net_buy: num(row, "BILLBOARD_NET_AMT"),
                reason: text(row, "EXPLANATION"),
                date: text(row, "TRADE_DATE"),
            })
        })
        .collect()
}

/// Breadth counters: `f104`/`f105`/`f106` on the two exchange indices are
/// advancing/declining/flat counts; the 涨跌分布 endpoint supplies the
/// limit-up and limit-down tails.
fn map_overview_counts(value: &Value) -> (u32, u32, u32) {
    let Some(rows) = json_path(value, "data.diff").and_then(Value::as_array) else {
        return (0, 0, 0);
    };
    rows.iter().fold((0, 0, 0), |acc, row| {
        (
            acc.0 + num(row, "f104") as u32,
            acc.1 + num(row, "f105") as u32,
            acc.2 + num(row, "f106") as u32,
        )
    })
}

fn map_limit_counts(value: &Value) -> (u32, u32) {
    let Some(rows) = json_path(value, "data.fenbu").and_then(Value::as_array) else {
        return (0, 0);
    };
    let mut up = 0u32;
    let mut down = 0u32;
    for bucket in rows {
        if let Some(map) = bucket.as_object() {
            for (k, v) in map {
                let count = v.as_f64().unwrap_or(0.0) as u32;
                match k.parse::<i32>() {
                    Ok(b) if b >= 10 => up += count,
                    Ok(b) if b <= -10 => down += count,
                    _ => {}
                }
            }
        }
    }
    (up, down)
}

fn map_northbound(value: &Value) -> Option<NorthboundFlow> {
    let data = value.get("data")?;
    // dayNetAmtIn comes in 万元.
    let sh = data.get("hk2sh").map(|v| num(v, "dayNetAmtIn") * 10_000.0).unwrap_or(0.0);
    let sz = data.get("hk2sz").map(|v| num(v, "dayNetAmtIn") * 10_000.0).unwrap_or(0.0);
    Some(NorthboundFlow {
        net_inflow: sh + sz,
        sh_net: sh,
        sz_net: sz,
        time: String::new(),
    })
}

fn kline_klt(period: KlinePeriod) -> &'static str {
    match period {
        KlinePeriod::Daily => "101",
        KlinePeriod::Weekly => "102",
        KlinePeriod::Monthly => "103",
        KlinePeriod::Min60 => "60",
    }
}

fn parse_json(body: &str) -> FetchResult<Value> {
    strip_jsonp(body).ok_or_else(|| FetchError::Decode("unparseable response".into()))
}

fn non_empty<T>(records: Vec<T>) -> FetchResult<Vec<T>> {
    if records.is_empty() {
        Err(FetchError::EmptyResult)
    } else {
        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for Eastmoney {
    fn id(&self) -> SourceId {
        SourceId::Eastmoney
    }

    async fn quotes(&self, gw: &Gateway, symbols: &[Symbol]) -> FetchResult<Vec<Quote>> {
        let secids: Vec<String> = symbols.iter().map(Symbol::to_eastmoney).collect();
        let url = format!(
            "https://push2.eastmoney.com/api/qt/ulist.np/get?fltt=2&np=1&fields={QUOTE_FIELDS}&secids={}",
            secids.join(",")
        );
        let body = gw.get_text(PUSH2_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_quotes(&parse_json(&body)?))
    }

    async fn indices(&self, gw: &Gateway) -> FetchResult<Vec<IndexQuote>> {
        let url = format!(
            "https://push2.eastmoney.com/api/qt/ulist.np/get?np=1&fields={QUOTE_FIELDS}&secids={INDEX_SECIDS}"
        );
        let body = gw.get_text(PUSH2_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_indices_short(&parse_json(&body)?))
    }

    async fn global_indices(&self, gw: &Gateway) -> FetchResult<Vec<IndexQuote>> {
        let secids: Vec<&str> = GLOBAL_INDEX_TABLE.iter().map(|(s, _, _, _)| *s).collect();
        let url = format!(
            "https://push2.eastmoney.com/api/qt/ulist.np/get?np=1&fields={QUOTE_FIELDS}&secids={}",
            secids.join(",")
        );
        let body = gw.get_text(PUSH2_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_global_indices(&parse_json(&body)?))
    }

    async fn klines(&self, gw: &Gateway, req: KlineRequest<'_>) -> FetchResult<Vec<Candle>> {
        let url = format!(
            "https://push2his.eastmoney.com/api/qt/stock/kline/get?secid={}&klt={}&fqt=1&lmt={}&fields1=f1,f2,f3&fields2=f51,f52,f53,f54,f55,f56,f57",
            req.symbol.to_eastmoney(),
            kline_klt(req.period),
            req.count
        );
        let body = gw.get_text(PUSH2_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_klines(&parse_json(&body)?, &req.symbol.canonical()))
    }

    async fn news(&self, gw: &Gateway, limit: usize) -> FetchResult<Vec<NewsItem>> {
        let url = bust(&format!(
            "https://np-listapi.eastmoney.com/comm/web/getFastNewsList?client=web&biz=web_724&fastColumn=102&pageSize={limit}"
        ));
        let body = gw.get_text(MAIN_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_news(&parse_json(&body)?))
    }

    async fn fund_flow(&self, gw: &Gateway, symbols: &[Symbol]) -> FetchResult<Vec<FundFlow>> {
        let secids: Vec<String> = symbols.iter().map(Symbol::to_eastmoney).collect();
        let url = format!(
            "https://push2.eastmoney.com/api/qt/ulist.np/get?fltt=2&np=1&fields=f12,f13,f14,f62,f66,f72,f78,f84,f184&secids={}",
            secids.join(",")
        );
        let body = gw.get_text(PUSH2_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_fund_flow(&parse_json(&body)?))
    }

    async fn research_reports(
        &self,
        gw: &Gateway,
        symbol: &Symbol,
    ) -> FetchResult<Vec<ResearchReport>> {
        let url = bust(&format!(
            "https://reportapi.eastmoney.com/report/list?pageSize=20&pageNo=1&code={}&industryCode=*&ratingChange=*&beginTime=&endTime=&qType=0",
            symbol.code()
        ));
        let body = gw.get_text(MAIN_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_reports(&parse_json(&body)?))
    }

    async fn notices(&self, gw: &Gateway, symbol: &Symbol) -> FetchResult<Vec<Notice>> {
        let url = format!(
            "https://np-anotice-stock.eastmoney.com/api/security/ann?sr=-1&page_size=20&page_index=1&ann_type=A&stock_list={}",
            symbol.code()
        );
        let body = gw.get_text(MAIN_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_notices(&parse_json(&body)?, symbol.code()))
    }

    async fn fund_detail(&self, gw: &Gateway, code: &str) -> FetchResult<FundDetail> {
        let base = "https://fundmobapi.eastmoney.com/FundMNewApi";
        let common = "plat=Android&appType=ttjj&product=EFund&version=6.2.8";

        let url = format!("{base}/FundMNBasicInformation?FCODE={code}&{common}");
        let body = gw.get_text(FUND_HOST, &url, Some(FUND_REFERER), None).await?;
        let mut detail =
            map_fund_basic(&parse_json(&body)?).ok_or(FetchError::EmptyResult)?;

        // Holdings and history are best-effort decorations on the basic row.
        let url = format!("{base}/FundMNInverstPosition?FCODE={code}&{common}");
        if let Ok(body) = gw.get_text(FUND_HOST, &url, Some(FUND_REFERER), None).await {
            if let Ok(value) = parse_json(&body) {
                detail.holdings = map_fund_holdings(&value);
            }
        }
        let url = format!("{base}/FundMNHisNetList?FCODE={code}&pageIndex=1&pageSize=30&{common}");
        if let Ok(body) = gw.get_text(FUND_HOST, &url, Some(FUND_REFERER), None).await {
            if let Ok(value) = parse_json(&body) {
                detail.performance = map_fund_history(&value);
            }
        }
        Ok(detail)
    }

    async fn fund_estimates(
        &self,
        gw: &Gateway,
        codes: &[String],
    ) -> FetchResult<Vec<FundPriceEstimate>> {
        let mut estimates = Vec::with_capacity(codes.len());
        for code in codes {
            let url = bust(&format!("https://fundgz.1234567.com.cn/js/{code}.js"));
            match gw.get_text(FUND_HOST, &url, Some(FUND_REFERER), None).await {
                Ok(body) => {
                    if let Some(value) = strip_jsonp(&body) {
                        if let Some(est) = map_fund_estimate(&value) {
                            estimates.push(est);
                        }
                    }
                }
                Err(e) => tracing::debug!(code, error = %e, "fund estimate fetch failed"),
            }
        }
        non_empty(estimates)
    }

    async fn hk_quotes(&self, gw: &Gateway, codes: &[String]) -> FetchResult<Vec<HkStockQuote>> {
        let secids: Vec<String> = codes
            .iter()
            .filter_map(|c| canonical_hk(c).ok())
            .map(|c| format!("116.{c}"))
            .collect();
        let url = format!(
            "https://push2.eastmoney.com/api/qt/ulist.np/get?fltt=2&np=1&fields={QUOTE_FIELDS}&secids={}",
            secids.join(",")
        );
        let body = gw.get_text(PUSH2_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_hk_quotes(&parse_json(&body)?))
    }

    async fn us_quotes(&self, gw: &Gateway, codes: &[String]) -> FetchResult<Vec<UsStockQuote>> {
        // The US market id depends on the listing venue, which we do not
        // track; ask for all three and keep whichever answers.
        let secids: Vec<String> = codes
            .iter()
            .filter_map(|c| canonical_us(c).ok())
            .flat_map(|c| [format!("105.{c}"), format!("106.{c}"), format!("107.{c}")])
            .collect();
        let url = format!(
            "https://push2.eastmoney.com/api/qt/ulist.np/get?fltt=2&np=1&fields={QUOTE_FIELDS}&secids={}",
            secids.join(",")
        );
        let body = gw.get_text(PUSH2_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_us_quotes(&parse_json(&body)?))
    }

    async fn forex(&self, gw: &Gateway, pairs: &[String]) -> FetchResult<Vec<ForexQuote>> {
        let secids: Vec<String> = pairs
            .iter()
            .map(|p| format!("119.{}", p.to_ascii_uppercase()))
            .collect();
        let url = format!(
            "https://push2.eastmoney.com/api/qt/ulist.np/get?fltt=2&np=1&fields={QUOTE_FIELDS}&secids={}",
            secids.join(",")
        );
        let body = gw.get_text(PUSH2_HOST, &url, Some(REFERER), None).await?;
        let value = parse_json(&body)?;
        let Some(rows) = json_path(&value, "data.diff").and_then(Value::as_array) else {
            return Err(FetchError::EmptyResult);
        };
        let quotes: Vec<ForexQuote> = rows
            .iter()
            .filter_map(|row| {
                let quote = ForexQuote {
                    pair: text(row, "f12").to_ascii_uppercase(),
                    name: text(row, "f14"),
                    price: num(row, "f2"),
                    change_percent: num(row, "f3"),
                    change: num(row, "f4"),
                    high: num(row, "f15"),
                    low: num(row, "f16"),
                    open: num(row, "f17"),
                    pre_close: num(row, "f18"),
                    time: text(row, "f124"),
                };
                (quote.price > 0.0).then_some(quote)
            })
            .collect();
        non_empty(quotes)
    }

    async fn industry_ranking(&self, gw: &Gateway) -> FetchResult<Vec<IndustryRank>> {
        let url = "https://push2.eastmoney.com/api/qt/clist/get?pn=1&pz=20&po=1&np=1&fltt=2&fid=f3&fs=m:90+t:2+f:!50&fields=f3,f12,f14,f62,f128,f136,f140";
        let body = gw.get_text(PUSH2_HOST, url, Some(REFERER), None).await?;
        non_empty(map_industry_ranking(&parse_json(&body)?))
    }

    async fn leaderboard(&self, gw: &Gateway) -> FetchResult<Vec<LeaderboardRow>> {
        let url = bust(
            "https://datacenter-web.eastmoney.com/api/data/v1/get?reportName=RPT_DAILYBILLBOARD_DETAILSNEW&columns=SECURITY_CODE,SECURITY_NAME_ABBR,CHANGE_RATE,BILLBOARD_NET_AMT,EXPLANATION,TRADE_DATE&sortColumns=BILLBOARD_NET_AMT&sortTypes=-1&pageSize=30&pageNumber=1",
        );
        let body = gw.get_text(MAIN_HOST, &url, Some(REFERER), None).await?;
        non_empty(map_leaderboard(&parse_json(&body)?))
    }

    async fn market_overview(&self, gw: &Gateway) -> FetchResult<MarketOverview> {
        let url = "https://push2.eastmoney.com/api/qt/ulist.np/get?np=1&fields=f104,f105,f106&secids=1.000001,0.399001";
        let body = gw.get_text(PUSH2_HOST, url, Some(REFERER), None).await?;
        let (advancing, declining, flat) = map_overview_counts(&parse_json(&body)?);
        if advancing + declining + flat == 0 {
            return Err(FetchError::EmptyResult);
        }

        let url = bust("https://push2ex.eastmoney.com/getTopicZDFenBu?ut=7eea3edcaed734bea9cbfc24409ed989&dpt=wz.ztzt");
        let (limit_up, limit_down) = match gw.get_text(PUSH2_HOST, &url, Some(REFERER), None).await
        {
            Ok(body) => parse_json(&body).map(|v| map_limit_counts(&v)).unwrap_or((0, 0)),
            Err(_) => (0, 0),
        };

        Ok(MarketOverview {
            advancing,
            declining,
            flat,
            limit_up,
            limit_down,
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
        })
    }

    async fn northbound_flow(&self, gw: &Gateway) -> FetchResult<NorthboundFlow> {
        let url = "https://push2.eastmoney.com/api/qt/kamt/get?fields1=f1,f2,f3,f4&fields2=f51,f52,f53,f54";
        let body = gw.get_text(PUSH2_HOST, url, Some(REFERER), None).await?;
        map_northbound(&parse_json(&body)?).ok_or(FetchError::EmptyResult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quote_mapping_converts_lots_and_keeps_raw_decimals() {
        let value = json!({"data": {"diff": [
            {"f2": 1688.0, "f3": 1.23, "f4": 20.5, "f5": 25000, "f6": 4.2e9,
             "f12": "600519", "f13": 1, "f14": "贵州茅台",
             "f15": 1695.5, "f16": 1680.0, "f17": 1690.0, "f18": 1667.5, "f124": 1700000000},
            {"f2": "-", "f3": "-", "f12": "600000", "f13": 1, "f14": "停牌股"}
        ]}});
        let quotes = map_quotes(&value);
        assert_eq!(quotes.len(), 1, "suspended row with '-' price must be dropped");
        let q = &quotes[0];
        assert_eq!(q.code, "sh600519");
        assert_eq!(q.name, "贵州茅台");
        assert_eq!(q.price, 1688.0);
        assert_eq!(q.volume, 2_500_000, "f5 is lots, x100 to shares");
        assert_eq!(q.pre_close, 1667.5);
    }

    #[test]
    fn short_form_index_mapping_divides_by_100() {
        let value = json!({"data": {"diff": [
            {"f2": 312550, "f3": 125, "f4": 3870, "f5": 350_000_000, "f6": 4.1e11,
             "f12": "000001", "f14": "上证指数",
             "f15": 313000, "f16": 310000, "f17": 310500, "f18": 308680}
        ]}});
        let indices = map_indices_short(&value);
        assert_eq!(indices.len(), 1);
        assert_eq!(indices[0].price, 3125.50);
        assert_eq!(indices[0].change_percent, 1.25);
        assert_eq!(indices[0].pre_close, 3086.80);
    }

    #[test]
    fn global_index_mapping_uses_stable_symbols() {
        let value = json!({"data": {"diff": [
            {"f2": 3885000, "f3": 52, "f12": "DJIA", "f14": "道琼斯",
             "f15": 3890000, "f16": 3870000, "f17": 3875000, "f18": 3865000},
            {"f2": 1700000, "f3": -30, "f12": "HSI", "f14": "恒生指数",
             "f15": 1710000, "f16": 1690000, "f17": 1705000, "f18": 1705000}
        ]}});
        let indices = map_global_indices(&value);
        assert_eq!(indices.len(), 2);
        assert_eq!(indices[0].code, "DJI");
        assert_eq!(indices[0].region, "美洲");
        assert_eq!(indices[1].code, "HSI");
        assert_eq!(indices[1].country, "HK");
    }

    #[test]
    fn kline_mapping_parses_packed_rows() {
        let value = json!({"data": {"klines": [
            "2024-01-12,1690.00,1688.00,1695.50,1680.00,25000,4.2e9",
            "2024-01-15,1688.00,1701.00,1705.00,1685.00,31000,5.1e9",
            "garbage-row"
        ]}});
        let candles = map_klines(&value, "sh600519");
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].date, "2024-01-12");
        assert_eq!(candles[0].close, 1688.0);
        assert_eq!(candles[0].volume, 2_500_000);
        assert_eq!(candles[1].code, "sh600519");
    }

    #[test]
    fn news_importance_assigned_by_rank() {
        let rows: Vec<Value> = (0..12)
            .map(|i| json!({"code": format!("n{i}"), "title": format!("标题{i}"),
                            "summary": "", "showTime": "2024-01-15 09:30:00"}))
            .collect();
        let value = json!({"data": {"fastNewsList": rows}});
        let news = map_news(&value);
        assert_eq!(news.len(), 12);
        assert_eq!(news[0].importance, Importance::High);
        assert_eq!(news[5].importance, Importance::Medium);
        assert_eq!(news[11].importance, Importance::Normal);
    }

    #[test]
    fn fund_estimate_mapping() {
        let value = json!({"fundcode": "110011", "name": "易方达优质精选",
                           "jzrq": "2024-01-12", "dwjz": "1.2345",
                           "gsz": "1.2411", "gszzl": "0.53",
                           "gztime": "2024-01-15 14:30"});
        let est = map_fund_estimate(&value).unwrap();
        assert_eq!(est.code, "110011");
        assert_eq!(est.net_value, 1.2345);
        assert_eq!(est.estimate_change_percent, 0.53);
    }

    #[test]
    fn northbound_converts_wan_to_yuan() {
        let value = json!({"data": {
            "hk2sh": {"dayNetAmtIn": 25.5},
            "hk2sz": {"dayNetAmtIn": -10.0}
        }});
        let flow = map_northbound(&value).unwrap();
        assert_eq!(flow.sh_net, 255_000.0);
        assert_eq!(flow.sz_net, -100_000.0);
        assert_eq!(flow.net_inflow, 155_000.0);
    }

    #[test]
    fn limit_counts_from_distribution_buckets() {
        let value = json!({"data": {"fenbu": [
            {"-11": 3, "-10": 12, "-5": 100},
            {"0": 500, "5": 200, "10": 45, "11": 2, "20": 5}
        ]}});
        let (up, down) = map_limit_counts(&value);
        assert_eq!(up, 52);
        assert_eq!(down, 15);
    }

    #[test]
    fn us_quotes_dedupe_across_market_prefixes() {
        let value = json!({"data": {"diff": [
            {"f2": 185.5, "f12": "AAPL", "f14": "苹果", "f5": 1000},
            {"f2": 185.5, "f12": "AAPL", "f14": "苹果", "f5": 1000},
            {"f2": 0, "f12": "BAD", "f14": "无效"}
        ]}});
        let quotes = map_us_quotes(&value);
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].code, "AAPL");
    }
}
