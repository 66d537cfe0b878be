//! Market sentiment composite.
//!
//! Five primitives are fetched in parallel, each scored 0–100 by a
//! piecewise-linear curve, then combined with fixed weights. The weights
//! and curves are empirical and are kept exactly as tuned upstream; a
//! primitive that fails to collect is silently dropped and the composite is
//! renormalized over what remains. Nothing collected scores a flat 50.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FetchResult;
use crate::models::{IndexQuote, MarketOverview, NorthboundFlow};
use crate::orchestrator::Orchestrator;

const W_BREADTH: f64 = 0.30;
const W_LIMITS: f64 = 0.20;
const W_NORTHBOUND: f64 = 0.15;
const W_MAIN_CAPITAL: f64 = 0.15;
const W_BENCHMARK: f64 = 0.20;

/// Northbound net-inflow saturates the curve at ±50亿 yuan.
const NORTHBOUND_FULL_SCALE: f64 = 50e8;
/// Whole-market main-capital net saturates at ±100亿 yuan.
const MAIN_CAPITAL_FULL_SCALE: f64 = 100e8;
/// Benchmark daily move saturates at ±3%.
const BENCHMARK_FULL_SCALE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentBand {
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    ExtremeGreed,
}

impl SentimentBand {
    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            SentimentBand::ExtremeFear
        } else if score < 40.0 {
            SentimentBand::Fear
        } else if score < 60.0 {
            SentimentBand::Neutral
        } else if score < 80.0 {
            SentimentBand::Greed
        } else {
            SentimentBand::ExtremeGreed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentBand::ExtremeFear => "极度恐慌",
            SentimentBand::Fear => "恐慌",
            SentimentBand::Neutral => "中性",
            SentimentBand::Greed => "贪婪",
            SentimentBand::ExtremeGreed => "极度贪婪",
        }
    }
}

/// Raw primitives, each optional: a missing value drops its weight.
#[derive(Debug, Clone, Default)]
pub struct SentimentInputs {
    pub overview: Option<MarketOverview>,
    pub northbound: Option<NorthboundFlow>,
    /// Whole-market main-capital net inflow, yuan.
    pub main_capital_net: Option<f64>,
    /// Benchmark index percent change.
    pub benchmark_change_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentComponent {
    pub name: String,
    pub score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReading {
    /// 0–100 composite.
    pub score: f64,
    pub band: SentimentBand,
    pub components: Vec<SentimentComponent>,
}

/// Map a signed value to 0–100, linear between -full_scale and +full_scale.
fn linear_score(value: f64, full_scale: f64) -> f64 {
    (50.0 + value / full_scale * 50.0).clamp(0.0, 100.0)
}

/// Share-of-total score for a pair of opposing counts.
fn ratio_score(positive: u32, negative: u32) -> Option<f64> {
    let total = positive + negative;
    if total == 0 {
        return None;
    }
    Some(positive as f64 / total as f64 * 100.0)
}

/// Pure composition over whatever primitives were collected.
pub fn compose(inputs: &SentimentInputs) -> SentimentReading {
    let mut components = Vec::new();

    if let Some(overview) = &inputs.overview {
        if let Some(score) = ratio_score(overview.advancing, overview.declining) {
            components.push(SentimentComponent {
                name: "breadth".to_string(),
                score,
                weight: W_BREADTH,
            });
        }
        if let Some(score) = ratio_score(overview.limit_up, overview.limit_down) {
            components.push(SentimentComponent {
                name: "limits".to_string(),
                score,
                weight: W_LIMITS,
            });
        }
    }

    if let Some(flow) = &inputs.northbound {
        components.push(SentimentComponent {
            name: "northbound".to_string(),
            score: linear_score(flow.net_inflow, NORTHBOUND_FULL_SCALE),
            weight: W_NORTHBOUND,
        });
    }

    if let Some(net) = inputs.main_capital_net {
        components.push(SentimentComponent {
            name: "main_capital".to_string(),
            score: linear_score(net, MAIN_CAPITAL_FULL_SCALE),
            weight: W_MAIN_CAPITAL,
        });
    }

    if let Some(change) = inputs.benchmark_change_percent {
        components.push(SentimentComponent {
            name: "benchmark".to_string(),
            score: linear_score(change, BENCHMARK_FULL_SCALE),
            weight: W_BENCHMARK,
        });
    }

    let weight_sum: f64 = components.iter().map(|c| c.weight).sum();
    let score = if weight_sum > 0.0 {
        components.iter().map(|c| c.score * c.weight).sum::<f64>() / weight_sum
    } else {
        50.0
    };
    let score = (score * 100.0).round() / 100.0;

    SentimentReading { score, band: SentimentBand::from_score(score), components }
}

/// Collect the primitives through the orchestrator and compose. Individual
/// failures are logged and dropped, never surfaced.
pub async fn collect(orchestrator: &Orchestrator) -> FetchResult<SentimentReading> {
    let (overview, northbound, ranking, indices) = tokio::join!(
        orchestrator.get_market_overview(),
        orchestrator.get_northbound_flow(),
        orchestrator.get_industry_ranking(),
        orchestrator.get_index_quotes(),
    );

    let mut inputs = SentimentInputs::default();
    match overview {
        Ok(o) => inputs.overview = Some(o),
        Err(e) => debug!(error = %e, "overview primitive missing"),
    }
    match northbound {
        Ok(f) => inputs.northbound = Some(f),
        Err(e) => debug!(error = %e, "northbound primitive missing"),
    }
    match ranking {
        Ok(ranks) => {
            inputs.main_capital_net = Some(ranks.iter().map(|r| r.main_net).sum());
        }
        Err(e) => debug!(error = %e, "main capital primitive missing"),
    }
    match indices {
        Ok(indices) => {
            inputs.benchmark_change_percent = benchmark_change(&indices);
        }
        Err(e) => debug!(error = %e, "benchmark primitive missing"),
    }

    Ok(compose(&inputs))
}

/// The Shanghai composite is the benchmark; fall back to the first index.
fn benchmark_change(indices: &[IndexQuote]) -> Option<f64> {
    indices
        .iter()
        .find(|i| i.code.ends_with("000001") || i.name.contains("上证"))
        .or_else(|| indices.first())
        .map(|i| i.change_percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_collected_scores_neutral_50() {
        let reading = compose(&SentimentInputs::default());
        assert_eq!(reading.score, 50.0);
        assert_eq!(reading.band, SentimentBand::Neutral);
        assert!(reading.components.is_empty());
    }

    #[test]
    fn full_inputs_weighted_composite() {
        let inputs = SentimentInputs {
            overview: Some(MarketOverview {
                advancing: 3000,
                declining: 1000,
                flat: 200,
                limit_up: 40,
                limit_down: 10,
                ..Default::default()
            }),
            northbound: Some(NorthboundFlow { net_inflow: 25e8, ..Default::default() }),
            main_capital_net: Some(-50e8),
            benchmark_change_percent: Some(1.5),
        };
        let reading = compose(&inputs);
        // breadth 75 * .30 + limits 80 * .20 + northbound 75 * .15 +
        // main 25 * .15 + benchmark 75 * .20 = 68.5
        assert!((reading.score - 68.5).abs() < 0.01, "got {}", reading.score);
        assert_eq!(reading.band, SentimentBand::Greed);
        assert_eq!(reading.components.len(), 5);
    }

    #[test]
    fn missing_primitives_renormalize() {
        let inputs = SentimentInputs {
            benchmark_change_percent: Some(3.0),
            ..Default::default()
        };
        let reading = compose(&inputs);
        // Only the benchmark collected: its saturated 100 is the composite.
        assert_eq!(reading.score, 100.0);
        assert_eq!(reading.band, SentimentBand::ExtremeGreed);
    }

    #[test]
    fn zero_limit_counts_drop_the_primitive() {
        let inputs = SentimentInputs {
            overview: Some(MarketOverview {
                advancing: 1000,
                declining: 3000,
                ..Default::default()
            }),
            ..Default::default()
        };
        let reading = compose(&inputs);
        assert_eq!(reading.components.len(), 1);
        assert_eq!(reading.components[0].name, "breadth");
        assert_eq!(reading.score, 25.0);
        assert_eq!(reading.band, SentimentBand::Fear);
    }

    #[test]
    fn linear_curves_clamp_at_extremes() {
        assert_eq!(linear_score(0.0, 50e8), 50.0);
        assert_eq!(linear_score(50e8, 50e8), 100.0);
        assert_eq!(linear_score(-80e8, 50e8), 0.0);
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(SentimentBand::from_score(19.99), SentimentBand::ExtremeFear);
        assert_eq!(SentimentBand::from_score(20.0), SentimentBand::Fear);
        assert_eq!(SentimentBand::from_score(40.0), SentimentBand::Neutral);
        assert_eq!(SentimentBand::from_score(60.0), SentimentBand::Greed);
        assert_eq!(SentimentBand::from_score(80.0), SentimentBand::ExtremeGreed);
    }
}
