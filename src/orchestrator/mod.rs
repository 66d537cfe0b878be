//! Multi-source fetch orchestration.
//!
//! Every area follows the same two-phase protocol. On the first call after
//! process start the orchestrator races one task per available source and
//! keeps the largest result, gap-filling missing codes from the losers. On
//! every later call it round-robins through the registry, falling back
//! through the remaining sources on failure. Results land in the TTL cache
//! and, for the snapshot-backed areas, in the persisted warm-restart file.
//!
//! A caller sees, in order of preference: fresh records, cached records, the
//! prior persisted snapshot, a static fallback list (never cached), and only
//! then an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::persist::SnapshotStore;
use crate::cache::{ttl_for, MemoryCache};
use crate::error::{FetchError, FetchResult};
use crate::models::*;
use crate::net::Gateway;
use crate::registry::SourceRegistry;
use crate::sources::symbols::{canonical_hk, canonical_us, parse_all, Symbol};
use crate::sources::{
    baidu::Baidu, eastmoney::Eastmoney, netease::Netease, sina::Sina, sohu::Sohu,
    tencent::Tencent, ths::Ths, xueqiu::Xueqiu, Area, KlineRequest, SourceAdapter, SourceId,
};

/// Merge identity for a record within an area.
pub trait Keyed {
    fn key(&self) -> &str;
}

macro_rules! keyed_by {
    ($($ty:ty => $field:ident),+ $(,)?) => {
        $(impl Keyed for $ty {
            fn key(&self) -> &str {
                &self.$field
            }
        })+
    };
}

keyed_by! {
    Quote => code,
    Candle => date,
    IndexQuote => code,
    NewsItem => id,
    FundFlow => code,
    ForexQuote => pair,
    FuturesQuote => code,
    HkStockQuote => code,
    UsStockQuote => code,
    HotTopic => title,
    IndustryRank => board_code,
    LeaderboardRow => code,
    ResearchReport => url,
    Notice => url,
    FundPriceEstimate => code,
}

type Maker<'m, T> = &'m dyn Fn(SourceId) -> Option<BoxFuture<'static, FetchResult<Vec<T>>>>;

pub struct Orchestrator {
    gateway: Arc<Gateway>,
    registry: Arc<SourceRegistry>,
    cache: Arc<MemoryCache>,
    store: Option<Arc<dyn SnapshotStore>>,
    snapshot: Mutex<CachedSnapshot>,
    adapters: HashMap<SourceId, Arc<dyn SourceAdapter>>,
}

impl Orchestrator {
    /// Build with the full production adapter set and, when a store is
    /// given, the last persisted snapshot pre-loaded for warm fallback.
    pub fn new(
        gateway: Arc<Gateway>,
        registry: Arc<SourceRegistry>,
        cache: Arc<MemoryCache>,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let mut adapters: HashMap<SourceId, Arc<dyn SourceAdapter>> = HashMap::new();
        adapters.insert(SourceId::Eastmoney, Arc::new(Eastmoney));
        adapters.insert(SourceId::Sina, Arc::new(Sina));
        adapters.insert(SourceId::Tencent, Arc::new(Tencent));
        adapters.insert(SourceId::Netease, Arc::new(Netease));
        adapters.insert(SourceId::Sohu, Arc::new(Sohu));
        adapters.insert(SourceId::Xueqiu, Arc::new(Xueqiu));
        adapters.insert(SourceId::Baidu, Arc::new(Baidu));
        adapters.insert(SourceId::Ths, Arc::new(Ths));

        Self::with_adapters(gateway, registry, cache, store, adapters)
    }

    /// Seam for swapping the adapter table (used by the protocol tests).
    pub fn with_adapters(
        gateway: Arc<Gateway>,
        registry: Arc<SourceRegistry>,
        cache: Arc<MemoryCache>,
        store: Option<Arc<dyn SnapshotStore>>,
        adapters: HashMap<SourceId, Arc<dyn SourceAdapter>>,
    ) -> Self {
        let snapshot = store
            .as_ref()
            .and_then(|s| s.load())
            .unwrap_or_default();
        Self { gateway, registry, cache, store, snapshot: Mutex::new(snapshot), adapters }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// The warm-restart snapshot as loaded or last updated. The UI paints
    /// from this before the first live fetch lands.
    pub fn warm_snapshot(&self) -> CachedSnapshot {
        self.snapshot.lock().clone()
    }

    // ------------------------------------------------------------------
    // Core protocol
    // ------------------------------------------------------------------

    /// Merge a single response: later rows replace earlier rows with the
    /// same key (adapters have already dropped sentinel prices), first-seen
    /// order is preserved.
    fn merge_by_key<T: Keyed>(records: Vec<T>) -> Vec<T> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut out: Vec<T> = Vec::with_capacity(records.len());
        for record in records {
            match index.get(record.key()) {
                Some(&i) => out[i] = record,
                None => {
                    index.insert(record.key().to_string(), out.len());
                    out.push(record);
                }
            }
        }
        out
    }

    /// Steady state: rotate to the next available source, falling back
    /// through the rest in ranking order until one succeeds.
    async fn rotate<T: Keyed>(&self, area: Area, make: Maker<'_, T>) -> FetchResult<Vec<T>> {
        let mut order: Vec<SourceId> = Vec::new();
        if let Some(first) = self.registry.next_for(area) {
            order.push(first);
        }
        for id in self.registry.available_for(area) {
            if !order.contains(&id) {
                order.push(id);
            }
        }
        if order.is_empty() {
            return Err(FetchError::all_failed(FetchError::SourceDisabled(
                "no source available".into(),
            )));
        }

        let mut last_err = FetchError::EmptyResult;
        for id in order {
            let Some(fut) = make(id) else { continue };
            match fut.await {
                Ok(records) if !records.is_empty() => {
                    self.registry.mark_success(id);
                    return Ok(Self::merge_by_key(records));
                }
                Ok(_) => {
                    self.registry.mark_failure(id);
                    last_err = FetchError::EmptyResult;
                }
                Err(e) => {
                    debug!(area = ?area, source = %id, error = %e, "source failed, rotating");
                    self.registry.mark_failure(id);
                    last_err = e;
                }
            }
        }
        Err(FetchError::all_failed(last_err))
    }

    /// Cache-first fetch of a keyed record list for one area. The flag is
    /// true when the records came off the wire, so callers only persist a
    /// snapshot section on genuine updates.
    async fn fetch_list_tracked<T>(
        &self,
        area: Area,
        cache_key: &str,
        requested: Option<&[String]>,
        make: Maker<'_, T>,
    ) -> FetchResult<(Vec<T>, bool)>
    where
        T: Keyed + Clone + Serialize + DeserializeOwned,
    {
        if let Some(cached) = self.cache.get_as::<Vec<T>>(cache_key) {
            debug!(area = ?area, key = cache_key, "cache hit");
            return Ok((cached, false));
        }

        let result = if self.gateway.is_cold() {
            let result = self.race_with_gap_fill(area, requested, make).await;
            self.gateway.clear_cold();
            result
        } else {
            self.rotate(area, make).await
        }?;

        if !result.is_empty() {
            self.cache.put_as(cache_key, &result, ttl_for(area));
        }
        Ok((result, true))
    }

    /// As `fetch_list_tracked`, for areas that do not persist a section.
    async fn fetch_list<T>(
        &self,
        area: Area,
        cache_key: &str,
        requested: Option<&[String]>,
        make: Maker<'_, T>,
    ) -> FetchResult<Vec<T>>
    where
        T: Keyed + Clone + Serialize + DeserializeOwned,
    {
        self.fetch_list_tracked(area, cache_key, requested, make)
            .await
            .map(|(records, _)| records)
    }

    /// Cold race plus gap-fill over the losers' outputs.
    async fn race_with_gap_fill<T: Keyed + Clone>(
        &self,
        area: Area,
        requested: Option<&[String]>,
        make: Maker<'_, T>,
    ) -> FetchResult<Vec<T>> {
        // Run all sources and keep every output so losers can donate rows.
        let mut ids = Vec::new();
        let mut futures = Vec::new();
        for id in self.registry.available_for(area) {
            if let Some(fut) = make(id) {
                ids.push(id);
                futures.push(fut);
            }
        }
        if ids.is_empty() {
            return Err(FetchError::all_failed(FetchError::SourceDisabled(
                "no source available".into(),
            )));
        }

        let outcomes = join_all(futures).await;
        let mut results: Vec<(SourceId, Vec<T>)> = Vec::new();
        let mut last_err = None;
        for (id, outcome) in ids.into_iter().zip(outcomes) {
            match outcome {
                Ok(records) if !records.is_empty() => {
                    self.registry.mark_success(id);
                    results.push((id, Self::merge_by_key(records)));
                }
                Ok(_) => {
                    self.registry.mark_failure(id);
                    last_err = Some(FetchError::EmptyResult);
                }
                Err(e) => {
                    warn!(area = ?area, source = %id, error = %e, "cold-start task failed");
                    self.registry.mark_failure(id);
                    last_err = Some(e);
                }
            }
        }
        if results.is_empty() {
            return Err(FetchError::all_failed(last_err.unwrap_or(FetchError::EmptyResult)));
        }

        let winner_idx = {
            let mut best = 0;
            for i in 1..results.len() {
                let (best_id, best_records) = &results[best];
                let (id, records) = &results[i];
                if records.len() > best_records.len()
                    || (records.len() == best_records.len()
                        && id.priority() < best_id.priority())
                {
                    best = i;
                }
            }
            best
        };
        let winner = results[winner_idx].0;
        info!(
            area = ?area,
            winner = %winner,
            count = results[winner_idx].1.len(),
            "cold-start winner"
        );
        self.registry.set_cursor_after(area, winner);

        let mut merged = results.swap_remove(winner_idx).1;

        if let Some(requested) = requested {
            // First present entry among the losers wins, in priority order.
            results.sort_by_key(|(id, _)| id.priority());
            let mut have: std::collections::HashSet<String> =
                merged.iter().map(|r| r.key().to_string()).collect();
            for key in requested {
                if have.contains(key) {
                    continue;
                }
                for (_, loser) in &results {
                    if let Some(found) = loser.iter().find(|r| r.key() == key) {
                        have.insert(key.clone());
                        merged.push(found.clone());
                        break;
                    }
                }
            }
        }
        Ok(merged)
    }

    /// Cache-first fetch of a single record for one area.
    async fn fetch_one<T>(
        &self,
        area: Area,
        cache_key: &str,
        make: &dyn Fn(SourceId) -> Option<BoxFuture<'static, FetchResult<T>>>,
    ) -> FetchResult<T>
    where
        T: Clone + Serialize + DeserializeOwned,
    {
        if let Some(cached) = self.cache.get_as::<T>(cache_key) {
            return Ok(cached);
        }

        let mut order: Vec<SourceId> = Vec::new();
        if !self.gateway.is_cold() {
            if let Some(first) = self.registry.next_for(area) {
                order.push(first);
            }
        }
        for id in self.registry.available_for(area) {
            if !order.contains(&id) {
                order.push(id);
            }
        }
        let was_cold = self.gateway.is_cold();

        let mut last_err = FetchError::EmptyResult;
        for id in order {
            let Some(fut) = make(id) else { continue };
            let outcome = fut.await;
            if was_cold {
                self.gateway.clear_cold();
            }
            match outcome {
                Ok(record) => {
                    self.registry.mark_success(id);
                    self.cache.put_as(cache_key, &record, ttl_for(area));
                    return Ok(record);
                }
                Err(e) => {
                    debug!(area = ?area, source = %id, error = %e, "source failed, rotating");
                    self.registry.mark_failure(id);
                    last_err = e;
                }
            }
        }
        Err(FetchError::all_failed(last_err))
    }

    /// Update one snapshot section and persist in the background. Snapshot
    /// errors never propagate.
    fn persist_section(&self, update: impl FnOnce(&mut CachedSnapshot)) {
        let Some(store) = self.store.clone() else { return };
        let copy = {
            let mut snapshot = self.snapshot.lock();
            update(&mut snapshot);
            snapshot.cache_time = Utc::now();
            snapshot.clone()
        };
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.save(&copy) {
                warn!(error = %e, "snapshot save failed");
            }
        });
    }

    // ------------------------------------------------------------------
    // Public area methods
    // ------------------------------------------------------------------

    pub async fn get_quotes(&self, codes: &[String]) -> FetchResult<Vec<Quote>> {
        let symbols = parse_all(codes)?;
        if symbols.is_empty() {
            return Err(FetchError::InvalidSymbol("empty code list".into()));
        }
        let keys: Vec<String> = symbols.iter().map(|s| s.canonical()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        let cache_key = format!("{}{}", Area::Quotes.key_prefix(), sorted.join(","));

        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let symbols = Arc::new(symbols);
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<Quote>>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            let symbols = symbols.clone();
            Some(Box::pin(async move { adapter.quotes(&gw, &symbols).await }))
        };

        let result = self.fetch_list_tracked(Area::Quotes, &cache_key, Some(&keys), &make).await;
        match result {
            Ok((quotes, fresh)) => {
                if fresh {
                    self.persist_section(|s| s.quotes = Some(quotes.clone()));
                }
                Ok(quotes)
            }
            Err(e) => {
                // Per-symbol queries surface a true error only when the
                // snapshot has nothing for any requested code.
                let snapshot = self.snapshot.lock();
                let from_snapshot: Vec<Quote> = snapshot
                    .quotes
                    .iter()
                    .flatten()
                    .filter(|q| keys.contains(&q.code))
                    .cloned()
                    .collect();
                if from_snapshot.is_empty() {
                    Err(e)
                } else {
                    warn!(error = %e, "serving quotes from persisted snapshot");
                    Ok(from_snapshot)
                }
            }
        }
    }

    pub async fn get_index_quotes(&self) -> FetchResult<Vec<IndexQuote>> {
        let cache_key = format!("{}domestic", Area::Indices.key_prefix());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<IndexQuote>>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            Some(Box::pin(async move { adapter.indices(&gw).await }))
        };
        let result = self.fetch_list_tracked(Area::Indices, &cache_key, None, &make).await;
        match result {
            Ok((indices, fresh)) => {
                if fresh {
                    self.persist_section(|s| s.indices = Some(indices.clone()));
                }
                Ok(indices)
            }
            Err(e) => self.snapshot_or(e, |s| s.indices.clone()),
        }
    }

    pub async fn get_global_indices(&self) -> FetchResult<Vec<IndexQuote>> {
        let cache_key = format!("{}all", Area::GlobalIndices.key_prefix());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<IndexQuote>>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            Some(Box::pin(async move { adapter.global_indices(&gw).await }))
        };
        let result = self.fetch_list_tracked(Area::GlobalIndices, &cache_key, None, &make).await;
        match result {
            Ok((indices, fresh)) => {
                if fresh {
                    self.persist_section(|s| s.global_indices = Some(indices.clone()));
                }
                Ok(indices)
            }
            Err(e) => match self.snapshot_or(e, |s| s.global_indices.clone()) {
                Ok(indices) => Ok(indices),
                Err(_) => {
                    // Static fallback keeps the board non-empty; never cached.
                    warn!("serving static global index fallback");
                    Ok(fallback_global_indices())
                }
            },
        }
    }

    pub async fn get_klines(
        &self,
        code: &str,
        period: KlinePeriod,
        count: usize,
    ) -> FetchResult<Vec<Candle>> {
        let symbol = Symbol::parse(code)?;
        let cache_key = format!(
            "{}{}_{}_{count}",
            Area::Klines.key_prefix(),
            symbol.canonical(),
            period.as_str()
        );
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let symbol = Arc::new(symbol);
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<Candle>>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            let symbol = symbol.clone();
            Some(Box::pin(async move {
                adapter
                    .klines(&gw, KlineRequest { symbol: &symbol, period, count })
                    .await
            }))
        };
        self.fetch_list(Area::Klines, &cache_key, None, &make).await
    }

    pub async fn get_news(&self, limit: usize) -> FetchResult<Vec<NewsItem>> {
        let limit = limit.clamp(1, 100);
        let cache_key = format!("{}{limit}", Area::News.key_prefix());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<NewsItem>>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            Some(Box::pin(async move { adapter.news(&gw, limit).await }))
        };
        let result = self.fetch_list_tracked(Area::News, &cache_key, None, &make).await;
        match result {
            Ok((news, fresh)) => {
                if fresh {
                    self.persist_section(|s| s.news = Some(news.clone()));
                }
                Ok(news)
            }
            Err(e) => self.snapshot_or(e, |s| s.news.clone()),
        }
    }

    pub async fn get_fund_flow(&self, codes: &[String]) -> FetchResult<Vec<FundFlow>> {
        let symbols = parse_all(codes)?;
        let keys: Vec<String> = symbols.iter().map(|s| s.canonical()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        let cache_key = format!("{}{}", Area::FundFlow.key_prefix(), sorted.join(","));

        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let symbols = Arc::new(symbols);
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<FundFlow>>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            let symbols = symbols.clone();
            Some(Box::pin(async move { adapter.fund_flow(&gw, &symbols).await }))
        };
        let result = self.fetch_list_tracked(Area::FundFlow, &cache_key, Some(&keys), &make).await;
        match result {
            Ok((flows, fresh)) => {
                if fresh {
                    self.persist_section(|s| s.fund_flow = Some(flows.clone()));
                }
                Ok(flows)
            }
            Err(e) => self.snapshot_or(e, |s| s.fund_flow.clone()),
        }
    }

    pub async fn get_research_reports(&self, code: &str) -> FetchResult<Vec<ResearchReport>> {
        let symbol = Arc::new(Symbol::parse(code)?);
        let cache_key = format!("{}{}", Area::Reports.key_prefix(), symbol.canonical());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make =
            move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<ResearchReport>>>> {
                let adapter = adapters.get(&id)?.clone();
                let gw = gateway.clone();
                let symbol = symbol.clone();
                Some(Box::pin(async move { adapter.research_reports(&gw, &symbol).await }))
            };
        self.fetch_list(Area::Reports, &cache_key, None, &make).await
    }

    pub async fn get_notices(&self, code: &str) -> FetchResult<Vec<Notice>> {
        let symbol = Arc::new(Symbol::parse(code)?);
        let cache_key = format!("{}{}", Area::Notices.key_prefix(), symbol.canonical());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<Notice>>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            let symbol = symbol.clone();
            Some(Box::pin(async move { adapter.notices(&gw, &symbol).await }))
        };
        self.fetch_list(Area::Notices, &cache_key, None, &make).await
    }

    pub async fn get_fund_detail(&self, code: &str) -> FetchResult<FundDetail> {
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FetchError::InvalidSymbol(code.to_string()));
        }
        let cache_key = format!("{}{code}", Area::FundDetail.key_prefix());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let code = code.to_string();
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<FundDetail>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            let code = code.clone();
            Some(Box::pin(async move { adapter.fund_detail(&gw, &code).await }))
        };
        self.fetch_one(Area::FundDetail, &cache_key, &make).await
    }

    pub async fn get_fund_estimates(
        &self,
        codes: &[String],
    ) -> FetchResult<Vec<FundPriceEstimate>> {
        let mut keys: Vec<String> = Vec::with_capacity(codes.len());
        for code in codes {
            if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
                return Err(FetchError::InvalidSymbol(code.clone()));
            }
            if !keys.contains(code) {
                keys.push(code.clone());
            }
        }
        let mut sorted = keys.clone();
        sorted.sort();
        let cache_key = format!("{}{}", Area::FundEstimates.key_prefix(), sorted.join(","));

        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let codes = Arc::new(keys.clone());
        let make =
            move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<FundPriceEstimate>>>> {
                let adapter = adapters.get(&id)?.clone();
                let gw = gateway.clone();
                let codes = codes.clone();
                Some(Box::pin(async move { adapter.fund_estimates(&gw, &codes).await }))
            };
        self.fetch_list(Area::FundEstimates, &cache_key, Some(&keys), &make).await
    }

    pub async fn get_hk_quotes(&self, codes: &[String]) -> FetchResult<Vec<HkStockQuote>> {
        let mut keys = Vec::with_capacity(codes.len());
        for code in codes {
            let canonical = canonical_hk(code)?;
            if !keys.contains(&canonical) {
                keys.push(canonical);
            }
        }
        let mut sorted = keys.clone();
        sorted.sort();
        let cache_key = format!("{}{}", Area::HkQuotes.key_prefix(), sorted.join(","));

        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let arc_codes = Arc::new(keys.clone());
        let make =
            move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<HkStockQuote>>>> {
                let adapter = adapters.get(&id)?.clone();
                let gw = gateway.clone();
                let codes = arc_codes.clone();
                Some(Box::pin(async move { adapter.hk_quotes(&gw, &codes).await }))
            };
        self.fetch_list(Area::HkQuotes, &cache_key, Some(&keys), &make).await
    }

    pub async fn get_us_quotes(&self, codes: &[String]) -> FetchResult<Vec<UsStockQuote>> {
        let mut keys = Vec::with_capacity(codes.len());
        for code in codes {
            let canonical = canonical_us(code)?;
            if !keys.contains(&canonical) {
                keys.push(canonical);
            }
        }
        let mut sorted = keys.clone();
        sorted.sort();
        let cache_key = format!("{}{}", Area::UsQuotes.key_prefix(), sorted.join(","));

        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let arc_codes = Arc::new(keys.clone());
        let make =
            move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<UsStockQuote>>>> {
                let adapter = adapters.get(&id)?.clone();
                let gw = gateway.clone();
                let codes = arc_codes.clone();
                Some(Box::pin(async move { adapter.us_quotes(&gw, &codes).await }))
            };
        self.fetch_list(Area::UsQuotes, &cache_key, Some(&keys), &make).await
    }

    pub async fn get_forex(&self, pairs: &[String]) -> FetchResult<Vec<ForexQuote>> {
        let keys: Vec<String> = pairs.iter().map(|p| p.to_ascii_uppercase()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        let cache_key = format!("{}{}", Area::Forex.key_prefix(), sorted.join(","));

        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let arc_pairs = Arc::new(keys.clone());
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<ForexQuote>>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            let pairs = arc_pairs.clone();
            Some(Box::pin(async move { adapter.forex(&gw, &pairs).await }))
        };
        let result = self.fetch_list_tracked(Area::Forex, &cache_key, Some(&keys), &make).await;
        match result {
            Ok((quotes, fresh)) => {
                if fresh {
                    self.persist_section(|s| s.forex = Some(quotes.clone()));
                }
                Ok(quotes)
            }
            Err(e) => self.snapshot_or(e, |s| s.forex.clone()),
        }
    }

    pub async fn get_futures(&self, codes: &[String]) -> FetchResult<Vec<FuturesQuote>> {
        let keys: Vec<String> = codes.iter().map(|c| c.to_ascii_uppercase()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        let cache_key = format!("{}{}", Area::Futures.key_prefix(), sorted.join(","));

        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let arc_codes = Arc::new(keys.clone());
        let make =
            move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<FuturesQuote>>>> {
                let adapter = adapters.get(&id)?.clone();
                let gw = gateway.clone();
                let codes = arc_codes.clone();
                Some(Box::pin(async move { adapter.futures(&gw, &codes).await }))
            };
        let result = self.fetch_list_tracked(Area::Futures, &cache_key, Some(&keys), &make).await;
        match result {
            Ok((quotes, fresh)) => {
                if fresh {
                    self.persist_section(|s| s.futures = Some(quotes.clone()));
                }
                Ok(quotes)
            }
            Err(e) => self.snapshot_or(e, |s| s.futures.clone()),
        }
    }

    pub async fn get_industry_ranking(&self) -> FetchResult<Vec<IndustryRank>> {
        let cache_key = format!("{}all", Area::IndustryRanking.key_prefix());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make =
            move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<IndustryRank>>>> {
                let adapter = adapters.get(&id)?.clone();
                let gw = gateway.clone();
                Some(Box::pin(async move { adapter.industry_ranking(&gw).await }))
            };
        let result = self.fetch_list_tracked(Area::IndustryRanking, &cache_key, None, &make).await;
        match result {
            Ok((ranks, fresh)) => {
                if fresh {
                    self.persist_section(|s| s.industry_ranking = Some(ranks.clone()));
                }
                Ok(ranks)
            }
            Err(e) => self.snapshot_or(e, |s| s.industry_ranking.clone()),
        }
    }

    pub async fn get_leaderboard(&self) -> FetchResult<Vec<LeaderboardRow>> {
        let cache_key = format!("{}all", Area::Leaderboard.key_prefix());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make =
            move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<LeaderboardRow>>>> {
                let adapter = adapters.get(&id)?.clone();
                let gw = gateway.clone();
                Some(Box::pin(async move { adapter.leaderboard(&gw).await }))
            };
        self.fetch_list(Area::Leaderboard, &cache_key, None, &make).await
    }

    pub async fn get_hot_topics(&self) -> FetchResult<Vec<HotTopic>> {
        let cache_key = format!("{}all", Area::HotTopics.key_prefix());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<Vec<HotTopic>>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            Some(Box::pin(async move { adapter.hot_topics(&gw, 10).await }))
        };
        let result = self.fetch_list_tracked(Area::HotTopics, &cache_key, None, &make).await;
        match result {
            Ok((topics, fresh)) => {
                if fresh {
                    self.persist_section(|s| s.hot_topics = Some(topics.clone()));
                }
                Ok(topics)
            }
            Err(e) => match self.snapshot_or(e, |s| s.hot_topics.clone()) {
                Ok(topics) => Ok(topics),
                Err(_) => {
                    warn!("serving static hot-topic fallback");
                    Ok(fallback_hot_topics())
                }
            },
        }
    }

    pub async fn get_market_overview(&self) -> FetchResult<MarketOverview> {
        let cache_key = format!("{}now", Area::MarketOverview.key_prefix());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<MarketOverview>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            Some(Box::pin(async move { adapter.market_overview(&gw).await }))
        };
        self.fetch_one(Area::MarketOverview, &cache_key, &make).await
    }

    pub async fn get_northbound_flow(&self) -> FetchResult<NorthboundFlow> {
        let cache_key = format!("{}now", Area::NorthboundFlow.key_prefix());
        let gateway = self.gateway.clone();
        let adapters = self.adapters.clone();
        let make = move |id: SourceId| -> Option<BoxFuture<'static, FetchResult<NorthboundFlow>>> {
            let adapter = adapters.get(&id)?.clone();
            let gw = gateway.clone();
            Some(Box::pin(async move { adapter.northbound_flow(&gw).await }))
        };
        self.fetch_one(Area::NorthboundFlow, &cache_key, &make).await
    }

    fn snapshot_or<T>(
        &self,
        err: FetchError,
        section: impl Fn(&CachedSnapshot) -> Option<Vec<T>>,
    ) -> FetchResult<Vec<T>> {
        let snapshot = self.snapshot.lock();
        match section(&snapshot) {
            Some(records) if !records.is_empty() => {
                warn!(error = %err, "serving persisted snapshot");
                Ok(records)
            }
            _ => Err(err),
        }
    }
}

/// Static board shown when every source and the snapshot fail. Prices are
/// zero; the UI renders names with a stale marker. Never cached.
fn fallback_global_indices() -> Vec<IndexQuote> {
    const BOARD: &[(&str, &str, &str, &str)] = &[
        ("DJI", "道琼斯工业平均", "美洲", "US"),
        ("IXIC", "纳斯达克综合", "美洲", "US"),
        ("SPX", "标普500", "美洲", "US"),
        ("HSI", "恒生指数", "亚太", "HK"),
        ("N225", "日经225", "亚太", "JP"),
        ("KOSPI", "韩国KOSPI", "亚太", "KR"),
        ("FTSE", "英国富时100", "欧洲", "GB"),
        ("GDAXI", "德国DAX", "欧洲", "DE"),
        ("FCHI", "法国CAC40", "欧洲", "FR"),
    ];
    BOARD
        .iter()
        .map(|(code, name, region, country)| IndexQuote {
            code: code.to_string(),
            name: name.to_string(),
            region: region.to_string(),
            country: country.to_string(),
            ..Default::default()
        })
        .collect()
}

fn fallback_hot_topics() -> Vec<HotTopic> {
    ["大盘走势", "北向资金", "板块轮动", "业绩预告"]
        .iter()
        .enumerate()
        .map(|(i, title)| HotTopic {
            rank: i as u32 + 1,
            title: title.to_string(),
            heat: 0.0,
            source: "fallback".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_last_write_per_key_in_first_seen_order() {
        let records = vec![
            Quote { code: "sh600519".into(), price: 1688.0, ..Default::default() },
            Quote { code: "sz000001".into(), price: 10.5, ..Default::default() },
            Quote { code: "sh600519".into(), price: 1689.0, ..Default::default() },
        ];
        let merged = Orchestrator::merge_by_key(records);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].code, "sh600519");
        assert_eq!(merged[0].price, 1689.0, "last non-sentinel write wins");
        assert_eq!(merged[1].code, "sz000001");
    }

    #[test]
    fn fallback_payloads_are_nonempty() {
        assert!(!fallback_global_indices().is_empty());
        assert!(!fallback_hot_topics().is_empty());
        assert!(fallback_global_indices().iter().all(|i| i.price == 0.0));
    }
}
