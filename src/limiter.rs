//! Per-host outbound rate limiting.
//!
//! Every upstream host family gets a policy: minute/hour caps, a jittered
//! inter-request interval, and a burst cooldown that forces an idle window
//! after too many back-to-back requests. Callers block in `execute` until a
//! slot is granted; a failed request still occupies its slot.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use parking_lot::Mutex;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};

/// Throttling policy for one host family.
#[derive(Debug, Clone)]
pub struct HostPolicy {
    pub max_per_minute: u32,
    pub max_per_hour: u32,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// When false the delay is always `min_interval`.
    pub randomize: bool,
    /// Consecutive accepted requests before the cooldown arms.
    pub burst_threshold: u32,
    pub cooldown: Duration,
}

impl HostPolicy {
    const fn new(
        min_ms: u64,
        max_ms: u64,
        per_minute: u32,
        per_hour: u32,
        burst: u32,
        cooldown_secs: u64,
    ) -> Self {
        Self {
            max_per_minute: per_minute,
            max_per_hour: per_hour,
            min_interval: Duration::from_millis(min_ms),
            max_interval: Duration::from_millis(max_ms),
            randomize: true,
            burst_threshold: burst,
            cooldown: Duration::from_secs(cooldown_secs),
        }
    }
}

lazy_static! {
    /// Known host families, matched by suffix. Order matters: the longest
    /// matching suffix wins, so `push2.eastmoney.com` must precede
    /// `eastmoney.com`.
    static ref HOST_POLICIES: Vec<(&'static str, HostPolicy)> = vec![
        ("push2.eastmoney.com", HostPolicy::new(2000, 5000, 15, 150, 8, 45)),
        ("eastmoney.com", HostPolicy::new(3000, 8000, 10, 100, 5, 60)),
        ("hq.sinajs.cn", HostPolicy::new(1000, 3000, 30, 300, 15, 20)),
        ("sina.com.cn", HostPolicy::new(1500, 4000, 20, 200, 10, 30)),
        ("qt.gtimg.cn", HostPolicy::new(1000, 3000, 30, 300, 15, 20)),
        ("gtimg.cn", HostPolicy::new(1500, 4000, 20, 200, 10, 30)),
        ("api.money.126.net", HostPolicy::new(1200, 3500, 25, 250, 12, 25)),
        ("126.net", HostPolicy::new(1500, 4000, 20, 200, 10, 30)),
        ("xueqiu.com", HostPolicy::new(2000, 5000, 20, 200, 10, 40)),
        ("sohu.com", HostPolicy::new(2000, 5000, 15, 150, 8, 45)),
        ("baidu.com", HostPolicy::new(2000, 5000, 15, 150, 8, 45)),
        ("10jqka.com.cn", HostPolicy::new(2500, 6000, 12, 120, 6, 60)),
        ("hexun.com", HostPolicy::new(2500, 6000, 12, 120, 6, 60)),
        ("fund.eastmoney.com", HostPolicy::new(2000, 5000, 15, 150, 8, 45)),
    ];

    /// Conservative fallback for hosts we have no table entry for.
    static ref DEFAULT_POLICY: HostPolicy = HostPolicy::new(5000, 10000, 8, 80, 3, 120);
}

/// Resolve the policy for a host key by longest suffix match.
pub fn policy_for(host: &str) -> &'static HostPolicy {
    let mut best: Option<&(&str, HostPolicy)> = None;
    for entry in HOST_POLICIES.iter() {
        if host.ends_with(entry.0) {
            match best {
                Some(b) if b.0.len() >= entry.0.len() => {}
                _ => best = Some(entry),
            }
        }
    }
    best.map(|e| &e.1).unwrap_or(&DEFAULT_POLICY)
}

#[derive(Debug, Default)]
struct HostState {
    /// Accepted request times, truncated to the trailing hour.
    timestamps: VecDeque<Instant>,
    last_request: Option<Instant>,
    consecutive: u32,
    in_cooldown: bool,
    cooldown_end: Option<Instant>,
}

/// Outcome of a slot check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Ready,
    /// Not yet; wait at least this long before asking again.
    Wait(Duration),
}

/// Process-wide outbound throttle, one state machine per host key.
pub struct RateLimiter {
    states: Mutex<HashMap<String, HostState>>,
}

const HOUR: Duration = Duration::from_secs(3600);
const MINUTE: Duration = Duration::from_secs(60);
/// Gap after which a burst is considered broken and the counter restarts.
const BURST_RESET_FACTOR: u32 = 3;

impl RateLimiter {
    pub fn new() -> Self {
        Self { states: Mutex::new(HashMap::new()) }
    }

    /// Check whether `host` may issue a request right now.
    ///
    /// Clears an expired cooldown, purges timestamps older than one hour,
    /// then reports the tightest violated constraint as a wait duration.
    pub fn can_request(&self, host: &str) -> Gate {
        self.can_request_at(host, Instant::now())
    }

    fn can_request_at(&self, host: &str, now: Instant) -> Gate {
        let policy = policy_for(host);
        let mut states = self.states.lock();
        let state = states.entry(host.to_string()).or_default();

        if state.in_cooldown {
            match state.cooldown_end {
                Some(end) if now < end => return Gate::Wait(end - now),
                _ => {
                    state.in_cooldown = false;
                    state.cooldown_end = None;
                }
            }
        }

        while let Some(front) = state.timestamps.front() {
            if now.duration_since(*front) > HOUR {
                state.timestamps.pop_front();
            } else {
                break;
            }
        }

        let mut wait = Duration::ZERO;

        let in_minute = state
            .timestamps
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) <= MINUTE)
            .count() as u32;
        if in_minute >= policy.max_per_minute {
            let oldest_in_minute = state
                .timestamps
                .iter()
                .rev()
                .take(policy.max_per_minute as usize)
                .last();
            if let Some(t) = oldest_in_minute {
                wait = wait.max(MINUTE.saturating_sub(now.duration_since(*t)));
            }
        }

        if state.timestamps.len() as u32 >= policy.max_per_hour {
            if let Some(front) = state.timestamps.front() {
                wait = wait.max(HOUR.saturating_sub(now.duration_since(*front)));
            }
        }

        if let Some(last) = state.last_request {
            let elapsed = now.duration_since(last);
            if elapsed < policy.min_interval {
                wait = wait.max(policy.min_interval - elapsed);
            }
        }

        if wait.is_zero() {
            Gate::Ready
        } else {
            Gate::Wait(wait)
        }
    }

    /// Record an accepted request against `host`.
    ///
    /// Counts toward the minute/hour windows even if the request later fails.
    /// Reaching the burst threshold arms the cooldown and resets the counter.
    pub fn record(&self, host: &str) {
        self.record_at(host, Instant::now());
    }

    fn record_at(&self, host: &str, now: Instant) {
        let policy = policy_for(host);
        let mut states = self.states.lock();
        let state = states.entry(host.to_string()).or_default();

        let burst_broken = match state.last_request {
            Some(last) => now.duration_since(last) > policy.min_interval * BURST_RESET_FACTOR,
            None => true,
        };
        if burst_broken {
            state.consecutive = 0;
        }

        state.timestamps.push_back(now);
        while let Some(front) = state.timestamps.front() {
            if now.duration_since(*front) > HOUR {
                state.timestamps.pop_front();
            } else {
                break;
            }
        }
        state.last_request = Some(now);
        state.consecutive += 1;

        if state.consecutive >= policy.burst_threshold {
            state.in_cooldown = true;
            state.cooldown_end = Some(now + policy.cooldown);
            state.consecutive = 0;
            warn!(
                host,
                cooldown_secs = policy.cooldown.as_secs(),
                "burst threshold reached, cooling down"
            );
        }
    }

    /// Non-blocking acquire. The orchestrator never calls this; it exists for
    /// callers that prefer an error over waiting.
    pub fn try_acquire(&self, host: &str) -> FetchResult<()> {
        match self.can_request(host) {
            Gate::Ready => {
                self.record(host);
                Ok(())
            }
            Gate::Wait(wait) => Err(FetchError::RateExhausted {
                host: host.to_string(),
                wait_ms: wait.as_millis() as u64,
            }),
        }
    }

    /// Record without gating. Used once per source during the cold-start race
    /// so first paint is never blocked; the burst is accepted knowingly.
    pub fn record_unchecked(&self, host: &str) {
        self.record(host);
    }

    /// Block until a slot is granted, apply the jittered delay, record the
    /// slot, then run `f`. The slot stays consumed whatever `f` returns.
    pub async fn execute<F, Fut, T>(&self, host: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            match self.can_request(host) {
                Gate::Ready => break,
                Gate::Wait(wait) => {
                    debug!(host, wait_ms = wait.as_millis() as u64, "throttled, waiting");
                    sleep(wait).await;
                }
            }
        }

        let policy = policy_for(host);
        let delay = if policy.randomize {
            let min = policy.min_interval.as_millis() as u64;
            let max = policy.max_interval.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(min..=max))
        } else {
            policy.min_interval
        };
        sleep(delay).await;

        self.record(host);
        f().await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle the gateway and orchestrator hold.
pub type SharedLimiter = Arc<RateLimiter>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_resolution_prefers_longest_match() {
        assert_eq!(policy_for("push2.eastmoney.com").max_per_minute, 15);
        assert_eq!(policy_for("quote.eastmoney.com").max_per_minute, 10);
        assert_eq!(policy_for("hq.sinajs.cn").max_per_minute, 30);
        // Unknown host falls back to the conservative default.
        let d = policy_for("example.org");
        assert_eq!(d.max_per_minute, 8);
        assert_eq!(d.burst_threshold, 3);
        assert_eq!(d.cooldown, Duration::from_secs(120));
    }

    #[test]
    fn min_interval_enforced() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        assert_eq!(limiter.can_request_at("hq.sinajs.cn", t0), Gate::Ready);
        limiter.record_at("hq.sinajs.cn", t0);

        // 200ms later: still inside the 1000ms min interval.
        match limiter.can_request_at("hq.sinajs.cn", t0 + Duration::from_millis(200)) {
            Gate::Wait(w) => assert_eq!(w, Duration::from_millis(800)),
            Gate::Ready => panic!("should be throttled"),
        }
        assert_eq!(
            limiter.can_request_at("hq.sinajs.cn", t0 + Duration::from_millis(1001)),
            Gate::Ready
        );
    }

    /// Seed raw window state without going through `record`, so the burst
    /// cooldown cannot interfere with the window math under test.
    fn seed(limiter: &RateLimiter, host: &str, times: &[Instant]) {
        let mut states = limiter.states.lock();
        let state = states.entry(host.to_string()).or_default();
        for t in times {
            state.timestamps.push_back(*t);
        }
        state.last_request = times.last().copied();
    }

    #[test]
    fn minute_cap_blocks_until_window_slides() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        // Default policy host: 8 per minute.
        let times: Vec<Instant> = (0..8).map(|i| t0 + Duration::from_secs(i * 6)).collect();
        seed(&limiter, "example.org", &times);

        let probe = t0 + Duration::from_secs(50);
        match limiter.can_request_at("example.org", probe) {
            Gate::Wait(w) => {
                // First of the 8 falls out of the minute window at t0+60s.
                assert_eq!(w, Duration::from_secs(10));
            }
            Gate::Ready => panic!("minute cap should block"),
        }
        assert_eq!(
            limiter.can_request_at("example.org", t0 + Duration::from_secs(61)),
            Gate::Ready
        );
    }

    #[test]
    fn hour_cap_purges_and_blocks() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        // Fill the hour cap (default policy: 80/h) with old, widely spaced
        // requests; the most recent is long past every other constraint.
        let times: Vec<Instant> = (0..80).map(|i| t0 + Duration::from_secs(i * 40)).collect();
        seed(&limiter, "example.org", &times);

        let probe = t0 + Duration::from_secs(80 * 40);
        match limiter.can_request_at("example.org", probe) {
            Gate::Wait(w) => {
                // The oldest entry leaves the hour window at t0+3600s.
                assert_eq!(w, Duration::from_secs(3600 - 80 * 40));
            }
            Gate::Ready => panic!("hour cap should block"),
        }
        // One second past the boundary the oldest timestamp is purged.
        assert_eq!(
            limiter.can_request_at("example.org", t0 + Duration::from_secs(3601)),
            Gate::Ready
        );
    }

    #[test]
    fn burst_cooldown_is_monotonic() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        // hq.sinajs.cn bursts at 15 → 20s cooldown. Back-to-back requests at
        // the min interval keep the consecutive counter alive.
        for i in 0..15u64 {
            limiter.record_at("hq.sinajs.cn", t0 + Duration::from_millis(i * 1000));
        }
        let after_burst = t0 + Duration::from_millis(15 * 1000);
        match limiter.can_request_at("hq.sinajs.cn", after_burst) {
            Gate::Wait(w) => assert!(w > Duration::from_secs(15), "cooldown wait was {w:?}"),
            Gate::Ready => panic!("cooldown must hold"),
        }
        // Once the cooldown expires, the next check auto-clears it.
        let past_cooldown = t0 + Duration::from_millis(14 * 1000) + Duration::from_secs(21);
        assert_eq!(limiter.can_request_at("hq.sinajs.cn", past_cooldown), Gate::Ready);
    }

    #[test]
    fn burst_counter_resets_after_idle_gap() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        // 14 rapid requests, one short of the threshold...
        for i in 0..14u64 {
            limiter.record_at("hq.sinajs.cn", t0 + Duration::from_millis(i * 1000));
        }
        // ...then an idle gap past 3x the min interval breaks the burst.
        let resumed = t0 + Duration::from_millis(14 * 1000) + Duration::from_secs(10);
        limiter.record_at("hq.sinajs.cn", resumed);
        assert_eq!(
            limiter.can_request_at("hq.sinajs.cn", resumed + Duration::from_secs(2)),
            Gate::Ready,
            "no cooldown: the burst was broken by the gap"
        );
    }

    #[test]
    fn try_acquire_reports_rate_exhausted() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire("example.org").is_ok());
        match limiter.try_acquire("example.org") {
            Err(FetchError::RateExhausted { host, wait_ms }) => {
                assert_eq!(host, "example.org");
                assert!(wait_ms > 0);
            }
            other => panic!("expected RateExhausted, got {other:?}"),
        }
    }
}
