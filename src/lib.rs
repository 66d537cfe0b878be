//! Stock-AI market data backend.
//!
//! A multi-source fetch orchestrator for public Chinese-market endpoints:
//! per-host rate limiting, source health tracking, a cold-start race with
//! round-robin steady state, a layered TTL + snapshot cache, and typed
//! normalization of the providers' JSONP/quote-string/HTML dialects.

pub mod cache;
pub mod codec;
pub mod error;
pub mod indicators;
pub mod limiter;
pub mod llm;
pub mod models;
pub mod net;
pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod sentiment;
pub mod sources;

// The handles a host application wires together at startup.
pub use cache::persist::{FileSnapshotStore, SnapshotStore};
pub use cache::MemoryCache;
pub use error::{FetchError, FetchResult};
pub use limiter::RateLimiter;
pub use net::Gateway;
pub use orchestrator::Orchestrator;
pub use registry::SourceRegistry;
