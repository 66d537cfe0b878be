//! Prompt composition for the LLM collaborator.
//!
//! Templates are plain strings with `{placeholder}` substitutions filled
//! from typed records; the output is human-readable Markdown. The reverse
//! direction parses a model reply into a trade signal by keyword presence,
//! checking the strong forms before the plain ones so "强烈卖出" never
//! degrades to a bare sell.

use serde::{Deserialize, Serialize};

use crate::models::{Candle, Quote};

/// A held position as the UI layer hands it over; the SQLite store that owns
/// it lives outside the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub code: String,
    pub name: String,
    pub quantity: f64,
    pub cost_price: f64,
    pub current_price: f64,
}

impl PortfolioPosition {
    pub fn profit(&self) -> f64 {
        (self.current_price - self.cost_price) * self.quantity
    }
}

/// Everything a template may reference. Missing sections substitute as
/// empty strings rather than failing the render.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub quote: Option<Quote>,
    pub klines: Vec<Candle>,
    pub stock_list: Vec<Quote>,
    pub portfolio: Vec<PortfolioPosition>,
}

fn format_klines(klines: &[Candle]) -> String {
    if klines.is_empty() {
        return String::new();
    }
    let mut out = String::from("日期 | 开盘 | 最高 | 最低 | 收盘 | 成交量\n");
    for candle in klines {
        out.push_str(&format!(
            "{} | {:.2} | {:.2} | {:.2} | {:.2} | {}\n",
            candle.date, candle.open, candle.high, candle.low, candle.close, candle.volume
        ));
    }
    out
}

fn format_stock_list(quotes: &[Quote]) -> String {
    quotes
        .iter()
        .map(|q| {
            format!(
                "- {}（{}）现价 {:.2}，涨跌幅 {:+.2}%",
                q.name, q.code, q.price, q.change_percent
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_portfolio(positions: &[PortfolioPosition]) -> String {
    positions
        .iter()
        .map(|p| {
            format!(
                "- {}（{}）持仓 {:.0} 股，成本 {:.2}，现价 {:.2}，盈亏 {:+.2}",
                p.name,
                p.code,
                p.quantity,
                p.cost_price,
                p.current_price,
                p.profit()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fill `template`'s placeholders from `ctx`. Unknown placeholders are left
/// untouched so template typos stay visible downstream.
pub fn render(template: &str, ctx: &PromptContext) -> String {
    let mut out = template.to_string();

    let quote = ctx.quote.clone().unwrap_or_default();
    let pairs: Vec<(&str, String)> = vec![
        ("{code}", quote.code.clone()),
        ("{name}", quote.name.clone()),
        ("{price}", format!("{:.2}", quote.price)),
        ("{change}", format!("{:+.2}", quote.change)),
        ("{changePercent}", format!("{:+.2}", quote.change_percent)),
        ("{volume}", quote.volume.to_string()),
        ("{amount}", format!("{:.2}", quote.turnover)),
        ("{high}", format!("{:.2}", quote.high)),
        ("{low}", format!("{:.2}", quote.low)),
        ("{open}", format!("{:.2}", quote.open)),
        ("{preClose}", format!("{:.2}", quote.pre_close)),
        ("{klines}", format_klines(&ctx.klines)),
        ("{stockList}", format_stock_list(&ctx.stock_list)),
        ("{stockCount}", ctx.stock_list.len().to_string()),
        ("{portfolio}", format_portfolio(&ctx.portfolio)),
        ("{positionCount}", ctx.portfolio.len().to_string()),
        (
            "{totalProfit}",
            format!("{:+.2}", ctx.portfolio.iter().map(PortfolioPosition::profit).sum::<f64>()),
        ),
    ];
    for (placeholder, value) in pairs {
        if out.contains(placeholder) {
            out = out.replace(placeholder, &value);
        }
    }
    out
}

/// Trade signal extracted from a model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
    Neutral,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::StrongBuy => "strong_buy",
            Signal::Buy => "buy",
            Signal::Hold => "hold",
            Signal::Sell => "sell",
            Signal::StrongSell => "strong_sell",
            Signal::Neutral => "neutral",
        }
    }
}

/// Keyword sets per signal, strong forms first. The first set with a hit
/// decides; a reply with no hit is neutral.
const SIGNAL_KEYWORDS: &[(Signal, &[&str])] = &[
    (Signal::StrongBuy, &["强烈买入", "强烈推荐买入", "strong buy", "strongly recommend buying"]),
    (Signal::StrongSell, &["强烈卖出", "立即卖出", "strong sell", "sell immediately"]),
    (Signal::Buy, &["买入", "建仓", "加仓", "buy", "accumulate"]),
    (Signal::Sell, &["卖出", "减仓", "清仓", "sell", "reduce position"]),
    (Signal::Hold, &["持有", "观望", "继续持股", "hold", "wait and see"]),
];

/// Parse a reply for its trade signal by keyword presence.
pub fn parse_signal(reply: &str) -> Signal {
    let lower = reply.to_lowercase();
    for (signal, keywords) in SIGNAL_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *signal;
        }
    }
    Signal::Neutral
}
