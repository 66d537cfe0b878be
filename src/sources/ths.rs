//! Tonghuashun (同花顺) adapter.
//!
//! Fund-flow fallback. The data center publishes per-stock capital flow as
//! an HTML table, not JSON; the shared table scraper turns it into rows.
//! Column layout: 1 code, 2 name, 8 net inflow (万元). Only the main net is
//! recoverable at this granularity; the finer buckets stay zero.

use async_trait::async_trait;

use crate::codec::scrape_table;
use crate::error::{FetchError, FetchResult};
use crate::models::FundFlow;
use crate::net::Gateway;
use crate::sources::symbols::Symbol;
use crate::sources::{bust, SourceAdapter, SourceId};

const HOST: &str = "10jqka.com.cn";
const REFERER: &str = "https://data.10jqka.com.cn/";

pub struct Ths;

fn parse_wan(cell: &str) -> f64 {
    // Cells read like "1.25亿" or "8600.00万" or plain numbers in 万元.
    let cell = cell.trim();
    if let Some(yi) = cell.strip_suffix('亿') {
        yi.parse::<f64>().map(|v| v * 1e8).unwrap_or(0.0)
    } else if let Some(wan) = cell.strip_suffix('万') {
        wan.parse::<f64>().map(|v| v * 1e4).unwrap_or(0.0)
    } else {
        cell.parse::<f64>().map(|v| v * 1e4).unwrap_or(0.0)
    }
}

fn map_fund_flow(rows: &[Vec<String>], wanted: &[Symbol]) -> Vec<FundFlow> {
    let wanted: std::collections::HashMap<&str, String> =
        wanted.iter().map(|s| (s.code(), s.canonical())).collect();
    rows.iter()
        .filter_map(|cells| {
            if cells.len() < 9 {
                return None;
            }
            let canonical = wanted.get(cells[1].trim().trim_start_matches('\''))?;
            Some(FundFlow {
                code: canonical.clone(),
                name: cells[2].trim().to_string(),
                main_net: parse_wan(&cells[8]),
                ..Default::default()
            })
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for Ths {
    fn id(&self) -> SourceId {
        SourceId::Ths
    }

    async fn fund_flow(&self, gw: &Gateway, symbols: &[Symbol]) -> FetchResult<Vec<FundFlow>> {
        let url = bust("https://data.10jqka.com.cn/funds/ggzjl/");
        let html = gw.get_text(HOST, &url, Some(REFERER), None).await?;
        let rows = scrape_table(&html);
        let flows = map_fund_flow(&rows, symbols);
        if flows.is_empty() {
            Err(FetchError::EmptyResult)
        } else {
            Ok(flows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scraped_rows_filter_to_requested_codes() {
        let rows = vec![
            vec!["1", "600519", "贵州茅台", "1688.00", "1.23%", "0.2%", "5.1亿", "3.8亿", "1.25亿", "8.9亿"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>(),
            vec!["2", "000858", "五粮液", "150.00", "0.55%", "0.3%", "2.1亿", "2.0亿", "860.00万", "4.1亿"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>(),
        ];
        let wanted = vec![Symbol::parse("sh600519").unwrap()];
        let flows = map_fund_flow(&rows, &wanted);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].code, "sh600519");
        assert_eq!(flows[0].main_net, 1.25e8);
    }

    #[test]
    fn unit_suffixes_scale_to_yuan() {
        assert_eq!(parse_wan("1.25亿"), 1.25e8);
        assert_eq!(parse_wan("860.00万"), 8.6e6);
        assert_eq!(parse_wan("100"), 1e6);
        assert_eq!(parse_wan("garbage"), 0.0);
    }
}
