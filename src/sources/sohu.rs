//! Sohu (搜狐证券) adapter.
//!
//! Only serves kline history. The hisHq endpoint wraps an array in JSONP;
//! rows arrive newest-first with volume in lots and turnover in 万元.

use async_trait::async_trait;
use serde_json::Value;

use crate::codec::strip_jsonp;
use crate::error::{FetchError, FetchResult};
use crate::models::*;
use crate::net::Gateway;
use crate::sources::symbols::Symbol;
use crate::sources::{KlineRequest, SourceAdapter, SourceId};

const HOST: &str = "sohu.com";
const REFERER: &str = "https://q.stock.sohu.com/";

pub struct Sohu;

fn sohu_period(period: KlinePeriod) -> Option<&'static str> {
    match period {
        KlinePeriod::Daily => Some("d"),
        KlinePeriod::Weekly => Some("w"),
        KlinePeriod::Monthly => Some("m"),
        KlinePeriod::Min60 => None,
    }
}

/// `hq` rows: 0 date, 1 open, 2 close, 5 low, 6 high, 7 volume (lots).
fn map_history(value: &Value, canonical: &str) -> Vec<Candle> {
    let Some(hq) = value
        .as_array()
        .and_then(|blocks| blocks.first())
        .and_then(|b| b.get("hq"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    let mut candles: Vec<Candle> = hq
        .iter()
        .filter_map(|row| {
            let cells = row.as_array()?;
            let f = |i: usize| -> f64 {
                cells.get(i).and_then(Value::as_str).and_then(|s| s.parse().ok()).unwrap_or(0.0)
            };
            let candle = Candle {
                date: cells.first()?.as_str()?.to_string(),
                open: f(1),
                close: f(2),
                low: f(5),
                high: f(6),
                volume: (f(7) * 100.0) as i64,
                code: canonical.to_string(),
            };
            (candle.close > 0.0).then_some(candle)
        })
        .collect();
    candles.reverse();
    candles
}

#[async_trait]
impl SourceAdapter for Sohu {
    fn id(&self) -> SourceId {
        SourceId::Sohu
    }

    async fn klines(&self, gw: &Gateway, req: KlineRequest<'_>) -> FetchResult<Vec<Candle>> {
        let Some(period) = sohu_period(req.period) else {
            return Err(FetchError::EmptyResult);
        };
        let url = format!(
            "https://q.stock.sohu.com/hisHq?code={}&stat=1&order=D&period={period}&rt=jsonp",
            req.symbol.to_sohu()
        );
        let body = gw.get_text(HOST, &url, Some(REFERER), None).await?;
        let value =
            strip_jsonp(&body).ok_or_else(|| FetchError::Decode("bad hisHq envelope".into()))?;
        let mut candles = map_history(&value, &req.symbol.canonical());
        if candles.len() > req.count {
            candles.drain(..candles.len() - req.count);
        }
        if candles.is_empty() {
            Err(FetchError::EmptyResult)
        } else {
            Ok(candles)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_mapping_reverses_and_scales() {
        let body = r#"historySearchHandler([{"status":0,"hq":[
            ["2024-01-15","1688.00","1701.00","13.00","0.77%","1685.00","1705.00","31000","51000","0.2%"],
            ["2024-01-12","1690.00","1688.00","20.50","1.23%","1680.00","1695.50","25000","42000","0.2%"]
        ]}])"#;
        let value = strip_jsonp(body).unwrap();
        let candles = map_history(&value, "sh600519");
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].date, "2024-01-12");
        assert_eq!(candles[0].volume, 2_500_000);
        assert_eq!(candles[1].close, 1701.0);
        assert_eq!(candles[1].high, 1705.0);
    }

    #[test]
    fn minute_period_unsupported() {
        assert!(sohu_period(KlinePeriod::Min60).is_none());
    }
}
