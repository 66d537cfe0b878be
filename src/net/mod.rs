//! Shared HTTP gateway for all upstream fetches.
//!
//! One pooled client serves every adapter. Each request is gated by the
//! per-host rate limiter, carries a rotated desktop UA and a source-supplied
//! Referer, and is retried on transient failure with linear backoff. Bodies
//! are decompressed by reqwest and decoded to UTF-8 here, GBK included.

pub mod charset;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use rand::seq::SliceRandom;
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::limiter::SharedLimiter;

/// Default deadline for quote/news fetches.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
/// Extended deadline for streaming chat responses.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(120);

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_millis(300);

/// Rotated per request. The quote hosts shed traffic from unfamiliar agents.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Edg/118.0.2088.76",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

fn pick_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

fn build_client(proxy_url: Option<&str>) -> Client {
    let mut builder = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60));

    if let Some(url) = proxy_url {
        match reqwest::Proxy::all(url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => warn!(proxy = url, error = %e, "invalid proxy url, going direct"),
        }
    }

    builder.build().unwrap_or_else(|_| Client::new())
}

/// Shared transport. Immutable post-construction except for the proxy swap,
/// which rebuilds the client and replaces the reference atomically.
pub struct Gateway {
    client: ArcSwap<Client>,
    limiter: SharedLimiter,
    /// Set until the first successful cold-start race completes; while set,
    /// requests record their slot without blocking so first paint is never
    /// gated.
    cold: AtomicBool,
}

impl Gateway {
    pub fn new(limiter: SharedLimiter, proxy_url: Option<&str>) -> Self {
        Self {
            client: ArcSwap::from_pointee(build_client(proxy_url)),
            limiter,
            cold: AtomicBool::new(true),
        }
    }

    /// Rebuild the client for a new proxy configuration and swap it in.
    /// In-flight requests finish on the old client.
    pub fn set_proxy(&self, proxy_url: Option<&str>) {
        self.client.store(Arc::new(build_client(proxy_url)));
        debug!(proxy = proxy_url.unwrap_or("<direct>"), "http client rebuilt");
    }

    pub fn is_cold(&self) -> bool {
        self.cold.load(Ordering::Acquire)
    }

    pub fn clear_cold(&self) {
        self.cold.store(false, Ordering::Release);
    }

    pub fn limiter(&self) -> &SharedLimiter {
        &self.limiter
    }

    /// GET `url`, throttled under `host_key`, returning the decoded body.
    ///
    /// `host_key` is named by the adapter and may differ from the URL host
    /// when a family of hosts shares quota. Transient failures retry up to
    /// three times with linear backoff; every attempt occupies a limiter slot.
    pub async fn get_text(
        &self,
        host_key: &str,
        url: &str,
        referer: Option<&str>,
        cookie: Option<&str>,
    ) -> FetchResult<String> {
        let mut last_err = FetchError::Network("no attempt made".into());

        for attempt in 1..=MAX_ATTEMPTS {
            let result = if self.is_cold() {
                self.limiter.record_unchecked(host_key);
                self.send(url, referer, cookie).await
            } else {
                self.limiter
                    .execute(host_key, || self.send(url, referer, cookie))
                    .await
            };

            match result {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    debug!(url, attempt, error = %e, "transient failure, retrying");
                    sleep(BACKOFF_STEP * attempt).await;
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }

    /// GET a plain-JSON endpoint and deserialize.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        host_key: &str,
        url: &str,
        referer: Option<&str>,
        cookie: Option<&str>,
    ) -> FetchResult<T> {
        let body = self.get_text(host_key, url, referer, cookie).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn send(&self, url: &str, referer: Option<&str>, cookie: Option<&str>) -> FetchResult<String> {
        let client = self.client.load();
        let mut request = client.get(url).header("User-Agent", pick_user_agent());
        if let Some(r) = referer {
            request = request.header("Referer", r);
        }
        if let Some(c) = cookie {
            request = request.header("Cookie", c);
        }

        let response = request.send().await.map_err(FetchError::from)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response.bytes().await.map_err(FetchError::from)?;
        let body = charset::decode_auto(content_type.as_deref(), &bytes);

        if status.as_u16() >= 400 {
            return Err(FetchError::Status { code: status.as_u16(), body });
        }
        Ok(body)
    }

    /// POST a JSON payload and hand back the raw streaming response. Used by
    /// the SSE chat path; the body is not charset-decoded here.
    pub async fn post_stream(
        &self,
        host_key: &str,
        url: &str,
        headers: &[(&str, String)],
        payload: &serde_json::Value,
    ) -> FetchResult<reqwest::Response> {
        let do_send = || async {
            let client = self.client.load();
            let mut request = client
                .post(url)
                .timeout(STREAM_TIMEOUT)
                .header("User-Agent", pick_user_agent())
                .json(payload);
            for (name, value) in headers {
                request = request.header(*name, value);
            }
            let response = request.send().await.map_err(FetchError::from)?;
            let status = response.status();
            if status.as_u16() >= 400 {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::Status { code: status.as_u16(), body });
            }
            Ok(response)
        };

        if self.is_cold() {
            self.limiter.record_unchecked(host_key);
            do_send().await
        } else {
            self.limiter.execute(host_key, do_send).await
        }
    }
}

/// Limiter scope for a URL: the host with any port stripped. Adapters usually
/// pass an explicit family key instead; this is the fallback.
pub fn host_of(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1)?;
    let host_port = rest.split(['/', '?']).next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction_strips_port_and_path() {
        assert_eq!(
            host_of("https://push2.eastmoney.com/api/qt/ulist.np/get?secids=1.600519"),
            Some("push2.eastmoney.com".to_string())
        );
        assert_eq!(
            host_of("http://hq.sinajs.cn:80/list=sh600519"),
            Some("hq.sinajs.cn".to_string())
        );
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn ua_pool_is_nonempty_and_rotates_from_pool() {
        for _ in 0..20 {
            let ua = pick_user_agent();
            assert!(USER_AGENTS.contains(&ua));
        }
    }
}
