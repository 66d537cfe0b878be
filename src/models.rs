use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A real-time equity quote in canonical symbol form.
///
/// Monetary fields are plain f64 — good enough for display and analysis,
/// never for settlement. `time` is the source's own wall-clock label and is
/// passed through verbatim; the backend does not interpret timezones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    pub change: f64,
    pub change_percent: f64,
    /// Shares, not lots.
    pub volume: i64,
    /// Yuan, not 万元.
    pub turnover: f64,
    pub time: String,
}

impl Quote {
    /// Broken feeds emit 0 or negative price sentinels; those rows are dropped.
    pub fn is_valid(&self) -> bool {
        !self.code.is_empty() && self.price > 0.0
    }
}

/// One candlestick bar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candle {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub code: String,
}

/// Candlestick period accepted by the kline endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KlinePeriod {
    Daily,
    Weekly,
    Monthly,
    Min60,
}

impl KlinePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            KlinePeriod::Daily => "daily",
            KlinePeriod::Weekly => "weekly",
            KlinePeriod::Monthly => "monthly",
            KlinePeriod::Min60 => "60m",
        }
    }
}

/// A global or domestic market index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexQuote {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    pub volume: i64,
    pub turnover: f64,
    /// Region label for the global board ("亚太" / "欧美" ...).
    pub region: String,
    pub country: String,
    pub time: String,
}

/// A foreign-exchange pair quote (`USDCNY`, `EURUSD`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForexQuote {
    pub pair: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    pub time: String,
}

/// A futures contract quote (`AU2406`, or `AU0` for the main contract).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuturesQuote {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub settlement: f64,
    pub volume: i64,
    pub open_interest: i64,
    pub time: String,
}

/// A US-listed equity quote. Ticker is uppercase, dots preserved (`BRK.B`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsStockQuote {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: i64,
    pub time: String,
}

/// A Hong Kong equity quote. Code is 5-digit left-zero-padded (`00700`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HkStockQuote {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: i64,
    pub turnover: f64,
    pub lot_size: i64,
    pub time: String,
}

/// News importance, assigned by rank position within a feed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    High,
    Medium,
    Normal,
}

impl Importance {
    /// Top of the page is important; the tail is noise.
    pub fn from_rank(rank: usize) -> Self {
        match rank {
            0..=2 => Importance::High,
            3..=9 => Importance::Medium,
            _ => Importance::Normal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub time: String,
    pub source: String,
    pub importance: Importance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchReport {
    pub title: String,
    pub org: String,
    pub rating: String,
    pub date: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub notice_type: String,
    pub date: String,
    pub url: String,
}

/// Open-ended fund detail as consumed by the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundDetail {
    pub code: String,
    pub name: String,
    pub fund_type: String,
    /// Latest published net value.
    pub net_value: f64,
    pub net_value_date: String,
    pub cumulative_value: f64,
    pub return_1m: f64,
    pub return_3m: f64,
    pub return_1y: f64,
    pub holdings: Vec<FundHolding>,
    pub performance: Vec<FundPerformancePoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundHolding {
    pub stock_code: String,
    pub stock_name: String,
    pub weight_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundPerformancePoint {
    pub date: String,
    pub value: f64,
}

/// Intraday net-value estimate published between official valuations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundPriceEstimate {
    pub code: String,
    pub name: String,
    pub net_value: f64,
    pub estimate: f64,
    pub estimate_change_percent: f64,
    pub estimate_time: String,
}

/// Per-stock capital-flow breakdown, all values in yuan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundFlow {
    pub code: String,
    pub name: String,
    pub main_net: f64,
    pub super_net: f64,
    pub large_net: f64,
    pub medium_net: f64,
    pub small_net: f64,
    pub main_net_percent: f64,
}

/// Industry board ranking row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndustryRank {
    pub board_code: String,
    pub board_name: String,
    pub change_percent: f64,
    pub main_net: f64,
    pub leader_code: String,
    pub leader_name: String,
    pub leader_change_percent: f64,
}

/// 龙虎榜 entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub code: String,
    pub name: String,
    pub change_percent: f64,
    pub net_buy: f64,
    pub reason: String,
    pub date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HotTopic {
    pub rank: u32,
    pub title: String,
    pub heat: f64,
    pub source: String,
}

/// Breadth counters for the whole A-share market, one poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketOverview {
    pub advancing: u32,
    pub declining: u32,
    pub flat: u32,
    pub limit_up: u32,
    pub limit_down: u32,
    pub time: String,
}

/// Northbound (沪深港通) capital flow, normalized to yuan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NorthboundFlow {
    pub net_inflow: f64,
    pub sh_net: f64,
    pub sz_net: f64,
    pub time: String,
}

/// Whole-process snapshot persisted across restarts for instant warm paint.
///
/// Every section is optional; a section is overwritten only by the next
/// successful fetch of the same area. Stale after 24 h on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotes: Option<Vec<Quote>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<IndexQuote>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_indices: Option<Vec<IndexQuote>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news: Option<Vec<NewsItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_flow: Option<Vec<FundFlow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_ranking: Option<Vec<IndustryRank>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_topics: Option<Vec<HotTopic>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forex: Option<Vec<ForexQuote>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub futures: Option<Vec<FuturesQuote>>,
    pub cache_time: DateTime<Utc>,
}

impl Default for CachedSnapshot {
    fn default() -> Self {
        Self {
            quotes: None,
            indices: None,
            global_indices: None,
            news: None,
            fund_flow: None,
            industry_ranking: None,
            hot_topics: None,
            forex: None,
            futures: None,
            // An empty snapshot is maximally stale.
            cache_time: DateTime::<Utc>::MIN_UTC,
        }
    }
}

impl CachedSnapshot {
    pub const MAX_AGE_HOURS: i64 = 24;

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.cache_time).num_hours() < Self::MAX_AGE_HOURS
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Outbound forward proxy; empty means direct.
    pub proxy_url: Option<String>,
    /// Root of the per-user state directory, default `<home>/.stock-ai`.
    pub data_dir: std::path::PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let proxy_url = std::env::var("STOCK_AI_PROXY")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let data_dir = match std::env::var("STOCK_AI_DATA_DIR") {
            Ok(dir) if !dir.trim().is_empty() => std::path::PathBuf::from(dir),
            _ => dirs::home_dir()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join(".stock-ai"),
        };

        Ok(Self { proxy_url, data_dir })
    }

    pub fn snapshot_path(&self) -> std::path::PathBuf {
        self.data_dir.join("cache").join("market_data.json")
    }
}
