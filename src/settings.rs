use config::{Config, ConfigError, File};
use ethers::prelude::*;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::classifier::{LiquidityThresholds, TokenClass, Whitelist, WhitelistedToken};
use crate::discovery::{event_topic, DiscoveryStrategy};
use crate::protocol::PoolKind;
use crate::retry::{Backoff, RetryPolicy};

/// RPC endpoint configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    pub http_url: String,
    /// Multicall3 deployment on the target chain
    pub multicall_address: String,
}

/// Batch pipeline tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct Scanner {
    /// Calls per aggregate request (clamped to 50..=200 by the multicall)
    pub multicall_batch_size: usize,
    /// Pools per detail-phase chunk
    pub pools_per_batch: usize,
    /// Inter-batch pacing delay in milliseconds
    pub pacing_ms: u64,
    /// Retry policy for the discovery layer
    pub discovery_retry: RetrySettings,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            multicall_batch_size: 100,
            pools_per_batch: 25,
            pacing_ms: 250,
            discovery_retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            backoff: Backoff::Linear,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff: self.backoff,
        }
    }
}

fn default_count_signature() -> String {
    "allPairsLength()".to_string()
}

fn default_item_signature() -> String {
    "allPairs(uint256)".to_string()
}

fn default_window_blocks() -> u64 {
    50_000
}

/// Per-protocol discovery configuration. Strategy selection is data, not
/// code: adding a protocol is a new `[[protocols]]` table, not a new branch.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DiscoverySettings {
    /// Incrementing-index enumeration against an enumerable registry
    Index {
        registry: String,
        #[serde(default = "default_count_signature")]
        count_signature: String,
        #[serde(default = "default_item_signature")]
        item_signature: String,
    },
    /// Creation-event scan over a block range
    Events {
        factory: String,
        /// Canonical event signature, e.g.
        /// `PairCreated(address,address,address,uint256)`
        #[serde(default)]
        event_signature: Option<String>,
        /// Raw 32-byte topic hash, overriding `event_signature` when the
        /// canonical signature is not known
        #[serde(default)]
        topic0: Option<String>,
        start_block: u64,
        #[serde(default = "default_window_blocks")]
        window_blocks: u64,
        /// Data word holding the pool address (0 for V2 PairCreated,
        /// 1 for V3 PoolCreated)
        #[serde(default)]
        address_word: usize,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolSettings {
    pub name: String,
    pub kind: PoolKind,
    pub router: String,
    /// Quoter contract for concentrated pools; constant-product pools quote
    /// against the pool itself
    pub quoter: Option<String>,
    pub discovery: DiscoverySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WhitelistEntry {
    pub address: String,
    pub decimals: u8,
    pub class: TokenClass,
}

/// Liquidity policy knobs. Reserve floors are decimal strings in raw token
/// units; tier values are raw concentrated-liquidity magnitudes. All of them
/// are operator-tuned, never derived.
#[derive(Debug, Deserialize, Clone)]
pub struct Thresholds {
    pub min_native_reserve: String,
    pub min_stable_reserve: String,
    pub min_other_reserve: String,
    #[serde(deserialize_with = "de_u128_from_int")]
    pub cl_low_tier: u128,
    #[serde(deserialize_with = "de_u128_from_int")]
    pub cl_high_tier: u128,
}

/// The `config` crate's deserializer does not support `u128` (it errors with
/// "u128 is not supported"), so read these operator-tuned tier magnitudes
/// through `u64` and widen. TOML integers are `i64`-bounded on the wire, so
/// this is lossless for every value the config file can express.
fn de_u128_from_int<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(u64::deserialize(deserializer)? as u128)
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rpc: Rpc,
    #[serde(default)]
    pub scanner: Scanner,
    pub protocols: Vec<ProtocolSettings>,
    pub whitelist: Vec<WhitelistEntry>,
    pub thresholds: Thresholds,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config.toml")
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder().add_source(File::with_name(path)).build()?;
        let mut settings: Self = s.try_deserialize()?;

        // Environment variable override for the RPC endpoint
        if let Ok(url) = env::var("POOL_CENSUS_RPC_HTTP_URL") {
            if !url.trim().is_empty() {
                settings.rpc.http_url = url;
            }
        }

        Ok(settings)
    }
}

/// Fatal configuration error. Raised before any network work begins; nothing
/// in this category is retried or absorbed.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid address '{value}' for {field}")]
    InvalidAddress { field: String, value: String },
    #[error("invalid threshold '{value}' for {field}")]
    InvalidThreshold { field: String, value: String },
    #[error("invalid topic hash '{value}' for {field}")]
    InvalidTopic { field: String, value: String },
    #[error("protocol '{0}' declares an event scan without event_signature or topic0")]
    MissingEventTopic(String),
    #[error("no protocols configured")]
    NoProtocols,
    #[error("token whitelist is empty")]
    EmptyWhitelist,
}

/// One protocol, fully parsed and ready to scan.
#[derive(Debug, Clone)]
pub struct ProtocolPlan {
    pub name: String,
    pub kind: PoolKind,
    pub router: Address,
    pub quoter: Option<Address>,
    pub strategy: DiscoveryStrategy,
}

/// The validated, address-typed view of [`Settings`].
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub rpc_url: String,
    pub multicall_address: Address,
    pub multicall_batch_size: usize,
    pub pools_per_batch: usize,
    pub pacing: Duration,
    pub retry: RetryPolicy,
    pub protocols: Vec<ProtocolPlan>,
    pub whitelist: Whitelist,
    pub thresholds: LiquidityThresholds,
}

fn parse_address(field: &str, value: &str) -> Result<Address, SettingsError> {
    value.parse::<Address>().map_err(|_| SettingsError::InvalidAddress {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_threshold(field: &str, value: &str) -> Result<U256, SettingsError> {
    U256::from_dec_str(value).map_err(|_| SettingsError::InvalidThreshold {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_topic(field: &str, value: &str) -> Result<H256, SettingsError> {
    let invalid = || SettingsError::InvalidTopic {
        field: field.to_string(),
        value: value.to_string(),
    };
    let bytes = hex::decode(value.trim_start_matches("0x")).map_err(|_| invalid())?;
    if bytes.len() != 32 {
        return Err(invalid());
    }
    Ok(H256::from_slice(&bytes))
}

impl Settings {
    /// Validates the raw settings into a typed scan plan.
    pub fn plan(&self) -> Result<ScanPlan, SettingsError> {
        if self.protocols.is_empty() {
            return Err(SettingsError::NoProtocols);
        }
        if self.whitelist.is_empty() {
            return Err(SettingsError::EmptyWhitelist);
        }

        let multicall_address = parse_address("rpc.multicall_address", &self.rpc.multicall_address)?;

        let mut protocols = Vec::with_capacity(self.protocols.len());
        for p in &self.protocols {
            let field = |suffix: &str| format!("protocols.{}.{}", p.name, suffix);
            let router = parse_address(&field("router"), &p.router)?;
            let quoter = match &p.quoter {
                Some(q) => Some(parse_address(&field("quoter"), q)?),
                None => None,
            };

            let strategy = match &p.discovery {
                DiscoverySettings::Index {
                    registry,
                    count_signature,
                    item_signature,
                } => DiscoveryStrategy::IndexEnumeration {
                    registry: parse_address(&field("discovery.registry"), registry)?,
                    count_signature: count_signature.clone(),
                    item_signature: item_signature.clone(),
                },
                DiscoverySettings::Events {
                    factory,
                    event_signature,
                    topic0,
                    start_block,
                    window_blocks,
                    address_word,
                } => {
                    let topic0 = match (topic0, event_signature) {
                        (Some(raw), _) => parse_topic(&field("discovery.topic0"), raw)?,
                        (None, Some(signature)) => event_topic(signature),
                        (None, None) => {
                            return Err(SettingsError::MissingEventTopic(p.name.clone()));
                        }
                    };
                    DiscoveryStrategy::EventScan {
                        factory: parse_address(&field("discovery.factory"), factory)?,
                        topic0,
                        start_block: *start_block,
                        window_blocks: (*window_blocks).max(1),
                        address_word: *address_word,
                    }
                }
            };

            protocols.push(ProtocolPlan {
                name: p.name.clone(),
                kind: p.kind,
                router,
                quoter,
                strategy,
            });
        }

        let mut entries = Vec::with_capacity(self.whitelist.len());
        for entry in &self.whitelist {
            let address = parse_address("whitelist.address", &entry.address)?;
            entries.push((
                address,
                WhitelistedToken {
                    decimals: entry.decimals,
                    class: entry.class,
                },
            ));
        }

        let thresholds = LiquidityThresholds {
            min_native_reserve: parse_threshold(
                "thresholds.min_native_reserve",
                &self.thresholds.min_native_reserve,
            )?,
            min_stable_reserve: parse_threshold(
                "thresholds.min_stable_reserve",
                &self.thresholds.min_stable_reserve,
            )?,
            min_other_reserve: parse_threshold(
                "thresholds.min_other_reserve",
                &self.thresholds.min_other_reserve,
            )?,
            cl_low_tier: self.thresholds.cl_low_tier,
            cl_high_tier: self.thresholds.cl_high_tier,
        };

        Ok(ScanPlan {
            rpc_url: self.rpc.http_url.clone(),
            multicall_address,
            multicall_batch_size: self.scanner.multicall_batch_size,
            pools_per_batch: self.scanner.pools_per_batch,
            pacing: Duration::from_millis(self.scanner.pacing_ms),
            retry: self.scanner.discovery_retry.policy(),
            protocols,
            whitelist: Whitelist::new(entries),
            thresholds,
        })
    }
}
