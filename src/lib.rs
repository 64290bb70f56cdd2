//! # pool-census
//!
//! Batched on-chain discovery and liquidity classification of DEX pools.
//! The crate enumerates pool identifiers per protocol, fetches their state
//! in bulk through an on-chain aggregation contract, and classifies which
//! pools are tradeable under whitelist-and-threshold policy.
//!
//! ## Pipeline
//!
//! 1. **Discovery**: registry index enumeration or creation-event scanning,
//!    with bounded retry — an exhausted discovery window fails the scan
//!    instead of silently shrinking the pool set.
//! 2. **Detail fetch**: fixed per-variant call sequences, batched through a
//!    single aggregate call per chunk, with pacing between chunks and
//!    skip-with-log on chunk failure.
//! 3. **Classification**: pure whitelist/threshold policy over the decoded
//!    state; accepted pools become normalized [`records::PoolRecord`]s.
//!
//! Protocol specifics (discovery strategy, variant shape, routers, policy
//! thresholds) are configuration, not code — see [`settings::Settings`].

// Core pipeline
/// Multicall batch aggregation
pub mod multicall;
/// Protocol variants: call plans and state decoding
pub mod protocol;
/// Pool identifier enumeration
pub mod discovery;
/// Bounded retry with backoff
pub mod retry;
/// Batched detail fetch driver
pub mod fetcher;
/// Whitelist-and-threshold classification
pub mod classifier;
/// Output records and batch-file persistence
pub mod records;

// Orchestration & configuration
/// Per-run orchestration and diagnostics
pub mod scanner;
/// Configuration management
pub mod settings;

// Utilities
/// Chunking and formatting helpers
pub mod utils;

// Re-exports for convenience
pub use classifier::{classify, Classification, LiquidityThresholds, TokenClass, Whitelist};
pub use discovery::{DiscoveredPool, DiscoveryStrategy, PoolDiscoverer};
pub use fetcher::BatchPipeline;
pub use multicall::{Call, CallOutcome, Multicall};
pub use protocol::{PoolKind, PoolState};
pub use records::PoolRecord;
pub use retry::RetryPolicy;
pub use scanner::PoolScanner;
pub use settings::Settings;
