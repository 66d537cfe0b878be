//! End-to-end protocol tests for the fetch orchestrator, driven through
//! mock adapters so no network is touched: cold-start race and winner
//! selection, cache visibility, gap-fill across disjoint sources, and the
//! three-strike disable lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use stockai_backend::error::{FetchError, FetchResult};
use stockai_backend::models::{IndexQuote, Quote};
use stockai_backend::net::Gateway;
use stockai_backend::sources::symbols::Symbol;
use stockai_backend::sources::{SourceAdapter, SourceId};
use stockai_backend::{MemoryCache, Orchestrator, RateLimiter, SourceRegistry};

fn quote(code: &str, price: f64) -> Quote {
    Quote { code: code.into(), name: code.into(), price, ..Default::default() }
}

fn index(code: &str, price: f64) -> IndexQuote {
    IndexQuote { code: code.into(), name: code.into(), price, ..Default::default() }
}

/// Scripted source: fixed responses per area, with call counting.
struct MockSource {
    id: SourceId,
    quotes: Option<Vec<Quote>>,
    indices: Option<Vec<IndexQuote>>,
    quote_calls: AtomicUsize,
    index_calls: AtomicUsize,
}

impl MockSource {
    fn new(id: SourceId) -> Self {
        Self {
            id,
            quotes: None,
            indices: None,
            quote_calls: AtomicUsize::new(0),
            index_calls: AtomicUsize::new(0),
        }
    }

    fn with_quotes(mut self, quotes: Vec<Quote>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    fn with_indices(mut self, indices: Vec<IndexQuote>) -> Self {
        self.indices = Some(indices);
        self
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn quotes(&self, _gw: &Gateway, symbols: &[Symbol]) -> FetchResult<Vec<Quote>> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        match &self.quotes {
            Some(all) => {
                let wanted: Vec<String> = symbols.iter().map(|s| s.canonical()).collect();
                let hits: Vec<Quote> =
                    all.iter().filter(|q| wanted.contains(&q.code)).cloned().collect();
                if hits.is_empty() {
                    Err(FetchError::EmptyResult)
                } else {
                    Ok(hits)
                }
            }
            None => Err(FetchError::Status { code: 500, body: "scripted failure".into() }),
        }
    }

    async fn global_indices(&self, _gw: &Gateway) -> FetchResult<Vec<IndexQuote>> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        match &self.indices {
            Some(indices) => Ok(indices.clone()),
            None => Err(FetchError::Status { code: 500, body: "scripted failure".into() }),
        }
    }
}

struct Harness {
    orchestrator: Orchestrator,
    cache: Arc<MemoryCache>,
    registry: Arc<SourceRegistry>,
    mocks: HashMap<SourceId, Arc<MockSource>>,
}

fn harness(mocks: Vec<MockSource>) -> Harness {
    let limiter = Arc::new(RateLimiter::new());
    let gateway = Arc::new(Gateway::new(limiter, None));
    let registry = Arc::new(SourceRegistry::new());
    let cache = Arc::new(MemoryCache::new());

    let mocks: HashMap<SourceId, Arc<MockSource>> =
        mocks.into_iter().map(|m| (m.id, Arc::new(m))).collect();
    let adapters: HashMap<SourceId, Arc<dyn SourceAdapter>> = mocks
        .iter()
        .map(|(id, m)| (*id, m.clone() as Arc<dyn SourceAdapter>))
        .collect();

    let orchestrator = Orchestrator::with_adapters(
        gateway,
        registry.clone(),
        cache.clone(),
        None,
        adapters,
    );
    Harness { orchestrator, cache, registry, mocks }
}

#[tokio::test]
async fn cold_start_races_all_sources_and_picks_largest() {
    let h = harness(vec![
        MockSource::new(SourceId::Eastmoney).with_quotes(vec![quote("sh600519", 1688.0)]),
        MockSource::new(SourceId::Sina).with_quotes(vec![
            quote("sh600519", 1687.5),
            quote("sz000001", 10.5),
        ]),
        MockSource::new(SourceId::Tencent).with_quotes(vec![quote("sh600519", 1688.2)]),
    ]);
    assert!(h.orchestrator.gateway().is_cold());

    let result = h
        .orchestrator
        .get_quotes(&["sh600519".into(), "sz000001".into()])
        .await
        .unwrap();

    // Every registered source was raced exactly once.
    for mock in h.mocks.values() {
        assert_eq!(mock.quote_calls.load(Ordering::SeqCst), 1);
    }
    // Sina had the largest result and wins outright.
    assert_eq!(result.len(), 2);
    let winner_price = result.iter().find(|q| q.code == "sh600519").unwrap().price;
    assert_eq!(winner_price, 1687.5);
    assert!(result.iter().all(|q| q.price > 0.0));
    assert!(!h.orchestrator.gateway().is_cold(), "cold flag cleared after the race");
}

#[tokio::test]
async fn second_call_within_ttl_is_served_from_cache() {
    let h = harness(vec![
        MockSource::new(SourceId::Eastmoney).with_quotes(vec![quote("sh600519", 1688.0)]),
    ]);

    let first = h.orchestrator.get_quotes(&["sh600519".into()]).await.unwrap();
    let second = h.orchestrator.get_quotes(&["600519".into()]).await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].code, "sh600519", "bare code canonicalized before lookup");
    let calls = h.mocks[&SourceId::Eastmoney].quote_calls.load(Ordering::SeqCst);
    assert_eq!(calls, 1, "second call must not reach the adapter");
}

#[tokio::test]
async fn gap_fill_covers_disjoint_sources() {
    let h = harness(vec![
        MockSource::new(SourceId::Eastmoney), // scripted failure
        MockSource::new(SourceId::Sina).with_quotes(vec![quote("sh600519", 1687.5)]),
        MockSource::new(SourceId::Tencent).with_quotes(vec![quote("sz000001", 10.5)]),
    ]);

    let result = h
        .orchestrator
        .get_quotes(&["sh600519".into(), "sz000001".into()])
        .await
        .unwrap();

    let codes: Vec<&str> = result.iter().map(|q| q.code.as_str()).collect();
    assert!(codes.contains(&"sh600519"), "winner entry present");
    assert!(codes.contains(&"sz000001"), "loser donated the missing code");
    assert_eq!(result.len(), 2);
}

#[tokio::test]
async fn three_failures_disable_a_source_until_recovery() {
    let h = harness(vec![
        MockSource::new(SourceId::Eastmoney), // always fails
        MockSource::new(SourceId::Sina),      // always fails
        MockSource::new(SourceId::Tencent).with_indices(vec![index("DJI", 38850.0)]),
    ]);
    // Skip the cold race so every call exercises steady-state rotation.
    h.orchestrator.gateway().clear_cold();

    // Four rounds: the rotation cursor reaches the healthy source on round
    // three without touching the failing pair, so their third strikes land
    // on round four.
    for _ in 0..4 {
        let result = h.orchestrator.get_global_indices().await.unwrap();
        assert_eq!(result.len(), 1, "tencent keeps the area alive");
        // Invalidate so the next call fetches again instead of hitting cache.
        h.cache.purge_prefix("global_index_");
    }

    let report = h.registry.health_report();
    let eastmoney = report.iter().find(|(id, _, _)| *id == SourceId::Eastmoney).unwrap();
    let sina = report.iter().find(|(id, _, _)| *id == SourceId::Sina).unwrap();
    assert!(eastmoney.2, "eastmoney disabled after three strikes");
    assert!(sina.2, "sina disabled after three strikes");

    // Disabled sources are skipped entirely on the next call.
    let em_before = h.mocks[&SourceId::Eastmoney].index_calls.load(Ordering::SeqCst);
    let result = h.orchestrator.get_global_indices().await.unwrap();
    assert_eq!(result.len(), 1);
    let em_after = h.mocks[&SourceId::Eastmoney].index_calls.load(Ordering::SeqCst);
    assert_eq!(em_before, em_after, "disabled source must not be invoked");

    // A success resets health immediately (the 5-minute window is covered
    // by the registry unit tests; here we exercise the success path).
    h.registry.mark_success(SourceId::Eastmoney);
    assert!(h.registry.available(SourceId::Eastmoney));
}

#[tokio::test]
async fn all_sources_failing_surfaces_last_error() {
    let h = harness(vec![
        MockSource::new(SourceId::Eastmoney),
        MockSource::new(SourceId::Sina),
        MockSource::new(SourceId::Tencent),
    ]);
    h.orchestrator.gateway().clear_cold();

    let err = h
        .orchestrator
        .get_quotes(&["sh600519".into()])
        .await
        .expect_err("no source can answer");
    match err {
        FetchError::AllSourcesFailed { last } => match *last {
            FetchError::Status { code, .. } => assert_eq!(code, 500),
            other => panic!("unexpected inner error: {other:?}"),
        },
        other => panic!("expected AllSourcesFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_symbol_rejected_before_any_fetch() {
    let h = harness(vec![
        MockSource::new(SourceId::Eastmoney).with_quotes(vec![quote("sh600519", 1688.0)]),
    ]);
    let err = h.orchestrator.get_quotes(&["not-a-code".into()]).await.expect_err("bad symbol");
    assert!(matches!(err, FetchError::InvalidSymbol(_)));
    assert_eq!(h.mocks[&SourceId::Eastmoney].quote_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn global_indices_fall_back_to_static_board_when_everything_fails() {
    let h = harness(vec![
        MockSource::new(SourceId::Eastmoney),
        MockSource::new(SourceId::Sina),
        MockSource::new(SourceId::Tencent),
    ]);
    h.orchestrator.gateway().clear_cold();

    let board = h.orchestrator.get_global_indices().await.unwrap();
    assert!(!board.is_empty(), "static fallback keeps the board non-empty");
    assert!(board.iter().all(|i| i.price == 0.0), "fallback rows are price-less");
    assert!(
        h.cache.get("global_index_all").is_none(),
        "synthesized payloads are never cached"
    );
}
