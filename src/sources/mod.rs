//! Data-source adapters, one module per provider.
//!
//! An adapter knows one provider's URL shapes, field positions and unit
//! quirks, and nothing else; transport, throttling and decoding live in the
//! gateway and codec layers. The orchestrator talks to adapters through the
//! `SourceAdapter` trait and never constructs URLs itself.

pub mod baidu;
pub mod eastmoney;
pub mod netease;
pub mod sina;
pub mod sohu;
pub mod symbols;
pub mod tencent;
pub mod ths;
pub mod xueqiu;

use async_trait::async_trait;

use crate::error::{FetchError, FetchResult};
use crate::models::*;
use crate::net::Gateway;
use crate::sources::symbols::Symbol;

/// Every provider the backend knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Eastmoney,
    Sina,
    Tencent,
    Netease,
    Sohu,
    Xueqiu,
    Baidu,
    Hexun,
    Ths,
}

impl SourceId {
    pub const ALL: &'static [SourceId] = &[
        SourceId::Eastmoney,
        SourceId::Sina,
        SourceId::Tencent,
        SourceId::Netease,
        SourceId::Sohu,
        SourceId::Xueqiu,
        SourceId::Baidu,
        SourceId::Hexun,
        SourceId::Ths,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SourceId::Eastmoney => "东方财富",
            SourceId::Sina => "新浪财经",
            SourceId::Tencent => "腾讯财经",
            SourceId::Netease => "网易财经",
            SourceId::Sohu => "搜狐证券",
            SourceId::Xueqiu => "雪球",
            SourceId::Baidu => "百度股市通",
            SourceId::Hexun => "和讯",
            SourceId::Ths => "同花顺",
        }
    }

    /// The limiter scope this source's quota is charged against.
    pub fn host_key(&self) -> &'static str {
        match self {
            SourceId::Eastmoney => "push2.eastmoney.com",
            SourceId::Sina => "hq.sinajs.cn",
            SourceId::Tencent => "qt.gtimg.cn",
            SourceId::Netease => "api.money.126.net",
            SourceId::Sohu => "sohu.com",
            SourceId::Xueqiu => "xueqiu.com",
            SourceId::Baidu => "baidu.com",
            SourceId::Hexun => "hexun.com",
            SourceId::Ths => "10jqka.com.cn",
        }
    }

    /// Lower is better; breaks cold-start ties.
    pub fn priority(&self) -> u8 {
        match self {
            SourceId::Eastmoney => 0,
            SourceId::Sina => 1,
            SourceId::Tencent => 2,
            SourceId::Netease => 3,
            SourceId::Xueqiu => 4,
            SourceId::Sohu => 5,
            SourceId::Baidu => 6,
            SourceId::Ths => 7,
            SourceId::Hexun => 8,
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A fetchable domain area. Cache keys, TTLs and registry rotation are all
/// scoped by area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    Quotes,
    Indices,
    GlobalIndices,
    Klines,
    News,
    FundFlow,
    Reports,
    Notices,
    FundDetail,
    FundEstimates,
    HkQuotes,
    UsQuotes,
    Forex,
    Futures,
    IndustryRanking,
    Leaderboard,
    HotTopics,
    MarketOverview,
    NorthboundFlow,
}

impl Area {
    /// Cache key prefix; also the family name for prefix-scoped purges.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Area::Quotes => "quote_",
            Area::Indices => "index_",
            Area::GlobalIndices => "global_index_",
            Area::Klines => "kline_",
            Area::News => "news_",
            Area::FundFlow => "fundflow_",
            Area::Reports => "report_",
            Area::Notices => "notice_",
            Area::FundDetail => "fund_detail_",
            Area::FundEstimates => "fund_est_",
            Area::HkQuotes => "hk_quote_",
            Area::UsQuotes => "us_quote_",
            Area::Forex => "forex_",
            Area::Futures => "futures_",
            Area::IndustryRanking => "industry_rank_",
            Area::Leaderboard => "leaderboard_",
            Area::HotTopics => "hot_topic_",
            Area::MarketOverview => "market_overview_",
            Area::NorthboundFlow => "northbound_",
        }
    }

    /// Sources serving this area, in priority order. The registry rotates
    /// over this list; sources without an adapter for the area never appear.
    pub fn sources(&self) -> &'static [SourceId] {
        match self {
            Area::Quotes => &[
                SourceId::Eastmoney,
                SourceId::Sina,
                SourceId::Tencent,
                SourceId::Netease,
                SourceId::Xueqiu,
            ],
            Area::Indices => &[SourceId::Eastmoney, SourceId::Sina, SourceId::Tencent],
            Area::GlobalIndices => &[SourceId::Eastmoney, SourceId::Sina, SourceId::Tencent],
            Area::Klines => &[
                SourceId::Eastmoney,
                SourceId::Sina,
                SourceId::Tencent,
                SourceId::Netease,
                SourceId::Sohu,
            ],
            Area::News => &[SourceId::Eastmoney, SourceId::Sina, SourceId::Baidu],
            Area::FundFlow => &[SourceId::Eastmoney, SourceId::Ths],
            Area::Reports => &[SourceId::Eastmoney],
            Area::Notices => &[SourceId::Eastmoney],
            Area::FundDetail => &[SourceId::Eastmoney],
            Area::FundEstimates => &[SourceId::Eastmoney],
            Area::HkQuotes => &[SourceId::Eastmoney, SourceId::Sina, SourceId::Tencent],
            Area::UsQuotes => &[SourceId::Eastmoney, SourceId::Sina, SourceId::Tencent],
            Area::Forex => &[SourceId::Sina, SourceId::Eastmoney],
            Area::Futures => &[SourceId::Sina],
            Area::IndustryRanking => &[SourceId::Eastmoney],
            Area::Leaderboard => &[SourceId::Eastmoney],
            Area::HotTopics => &[SourceId::Xueqiu, SourceId::Baidu],
            Area::MarketOverview => &[SourceId::Eastmoney],
            Area::NorthboundFlow => &[SourceId::Eastmoney],
        }
    }
}

/// Kline fetch parameters.
#[derive(Debug, Clone, Copy)]
pub struct KlineRequest<'a> {
    pub symbol: &'a Symbol,
    pub period: KlinePeriod,
    pub count: usize,
}

/// One provider's fetch surface. Default implementations refuse the area so
/// each adapter only writes the areas it actually serves; the orchestrator
/// consults `Area::sources` and never calls an unserved area.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    async fn quotes(&self, _gw: &Gateway, _symbols: &[Symbol]) -> FetchResult<Vec<Quote>> {
        Err(FetchError::EmptyResult)
    }

    async fn indices(&self, _gw: &Gateway) -> FetchResult<Vec<IndexQuote>> {
        Err(FetchError::EmptyResult)
    }

    async fn global_indices(&self, _gw: &Gateway) -> FetchResult<Vec<IndexQuote>> {
        Err(FetchError::EmptyResult)
    }

    async fn klines(&self, _gw: &Gateway, _req: KlineRequest<'_>) -> FetchResult<Vec<Candle>> {
        Err(FetchError::EmptyResult)
    }

    async fn news(&self, _gw: &Gateway, _limit: usize) -> FetchResult<Vec<NewsItem>> {
        Err(FetchError::EmptyResult)
    }

    async fn fund_flow(&self, _gw: &Gateway, _symbols: &[Symbol]) -> FetchResult<Vec<FundFlow>> {
        Err(FetchError::EmptyResult)
    }

    async fn research_reports(
        &self,
        _gw: &Gateway,
        _symbol: &Symbol,
    ) -> FetchResult<Vec<ResearchReport>> {
        Err(FetchError::EmptyResult)
    }

    async fn notices(&self, _gw: &Gateway, _symbol: &Symbol) -> FetchResult<Vec<Notice>> {
        Err(FetchError::EmptyResult)
    }

    async fn fund_detail(&self, _gw: &Gateway, _code: &str) -> FetchResult<FundDetail> {
        Err(FetchError::EmptyResult)
    }

    async fn fund_estimates(
        &self,
        _gw: &Gateway,
        _codes: &[String],
    ) -> FetchResult<Vec<FundPriceEstimate>> {
        Err(FetchError::EmptyResult)
    }

    async fn hk_quotes(&self, _gw: &Gateway, _codes: &[String]) -> FetchResult<Vec<HkStockQuote>> {
        Err(FetchError::EmptyResult)
    }

    async fn us_quotes(&self, _gw: &Gateway, _codes: &[String]) -> FetchResult<Vec<UsStockQuote>> {
        Err(FetchError::EmptyResult)
    }

    async fn forex(&self, _gw: &Gateway, _pairs: &[String]) -> FetchResult<Vec<ForexQuote>> {
        Err(FetchError::EmptyResult)
    }

    async fn futures(&self, _gw: &Gateway, _codes: &[String]) -> FetchResult<Vec<FuturesQuote>> {
        Err(FetchError::EmptyResult)
    }

    async fn industry_ranking(&self, _gw: &Gateway) -> FetchResult<Vec<IndustryRank>> {
        Err(FetchError::EmptyResult)
    }

    async fn leaderboard(&self, _gw: &Gateway) -> FetchResult<Vec<LeaderboardRow>> {
        Err(FetchError::EmptyResult)
    }

    async fn hot_topics(&self, _gw: &Gateway, _limit: usize) -> FetchResult<Vec<HotTopic>> {
        Err(FetchError::EmptyResult)
    }

    async fn market_overview(&self, _gw: &Gateway) -> FetchResult<MarketOverview> {
        Err(FetchError::EmptyResult)
    }

    async fn northbound_flow(&self, _gw: &Gateway) -> FetchResult<NorthboundFlow> {
        Err(FetchError::EmptyResult)
    }
}

/// Append the cache-busting `_=<millis>` parameter some portals require.
pub(crate) fn bust(url: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    if url.contains('?') {
        format!("{url}&_={millis}")
    } else {
        format!("{url}?_={millis}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_area_has_at_least_one_source() {
        let areas = [
            Area::Quotes,
            Area::Indices,
            Area::GlobalIndices,
            Area::Klines,
            Area::News,
            Area::FundFlow,
            Area::Reports,
            Area::Notices,
            Area::FundDetail,
            Area::FundEstimates,
            Area::HkQuotes,
            Area::UsQuotes,
            Area::Forex,
            Area::Futures,
            Area::IndustryRanking,
            Area::Leaderboard,
            Area::HotTopics,
            Area::MarketOverview,
            Area::NorthboundFlow,
        ];
        for area in areas {
            assert!(!area.sources().is_empty(), "{area:?} has no sources");
        }
    }

    #[test]
    fn priorities_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for id in SourceId::ALL {
            assert!(seen.insert(id.priority()), "duplicate priority for {id:?}");
        }
    }

    #[test]
    fn bust_appends_query_param() {
        assert!(bust("https://x.cn/api?a=1").contains("&_="));
        assert!(bust("https://x.cn/api").contains("?_="));
    }
}
