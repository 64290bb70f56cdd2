//! Pool identifier enumeration.
//!
//! Produces the ordered set of pool addresses to inspect, by one of two
//! mutually exclusive strategies selected per protocol configuration:
//!
//! - **Index enumeration** against a registry that tracks its own length
//!   (`allPairsLength()` / `allPairs(uint256)` by default), fetched through
//!   the multicall in fixed-size chunks.
//! - **Event scan** of a creation-event topic over `[start_block, head]`,
//!   partitioned into fixed-size block windows.
//!
//! Every network fetch in this layer is wrapped in the configured retry
//! policy; an exhausted window fails the whole scan rather than silently
//! producing a non-obviously-incomplete pool set.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::prelude::*;
use ethers::utils::keccak256;
use tracing::{debug, info, warn};

use crate::multicall::{Call, Multicall};
use crate::protocol::{decode_address, selector_call, PoolKind};
use crate::retry::RetryPolicy;
use crate::utils::{create_block_chunks, create_index_chunks};

/// Where an identifier came from within its scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Position in an enumerable registry
    RegistryIndex(u64),
    /// Creation-event position
    CreationLog { block: u64, log_index: u64 },
}

/// One discovered pool identifier. Immutable once produced.
#[derive(Debug, Clone)]
pub struct DiscoveredPool {
    pub address: Address,
    pub protocol: String,
    pub kind: PoolKind,
    pub source: DiscoverySource,
}

/// Per-protocol discovery strategy, fully data-driven from settings.
#[derive(Debug, Clone)]
pub enum DiscoveryStrategy {
    IndexEnumeration {
        registry: Address,
        /// Zero-arg uint count getter, e.g. `allPairsLength()`
        count_signature: String,
        /// Single-uint-arg address getter, e.g. `allPairs(uint256)`
        item_signature: String,
    },
    EventScan {
        factory: Address,
        topic0: H256,
        start_block: u64,
        window_blocks: u64,
        /// Which 32-byte word of the log data holds the pool address
        /// (word 0 for V2 `PairCreated`, word 1 for V3 `PoolCreated`)
        address_word: usize,
    },
}

/// Minimal chain-read seam for discovery, so the scan logic is testable
/// against canned logs.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn latest_block(&self) -> Result<u64>;
    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>>;
}

#[async_trait]
impl<M: Middleware + 'static> LogSource for M {
    async fn latest_block(&self) -> Result<u64> {
        let head = self
            .get_block_number()
            .await
            .map_err(|e| anyhow!("failed to read block height: {e}"))?;
        Ok(head.as_u64())
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.get_logs(filter)
            .await
            .map_err(|e| anyhow!("get_logs failed: {e}"))
    }
}

/// Enumerates pool identifiers for one protocol.
pub struct PoolDiscoverer<M: Middleware> {
    provider: Arc<M>,
    multicall: Multicall<M>,
    retry: RetryPolicy,
}

impl<M: Middleware + 'static> PoolDiscoverer<M> {
    pub fn new(provider: Arc<M>, multicall: Multicall<M>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            multicall,
            retry,
        }
    }

    /// Runs the protocol's configured strategy to completion.
    pub async fn discover(
        &self,
        protocol: &str,
        kind: PoolKind,
        strategy: &DiscoveryStrategy,
    ) -> Result<Vec<DiscoveredPool>> {
        match strategy {
            DiscoveryStrategy::IndexEnumeration {
                registry,
                count_signature,
                item_signature,
            } => {
                self.enumerate_registry(protocol, kind, *registry, count_signature, item_signature)
                    .await
            }
            DiscoveryStrategy::EventScan {
                factory,
                topic0,
                start_block,
                window_blocks,
                address_word,
            } => {
                self.scan_creation_events(
                    protocol,
                    kind,
                    *factory,
                    *topic0,
                    *start_block,
                    *window_blocks,
                    *address_word,
                )
                .await
            }
        }
    }

    async fn enumerate_registry(
        &self,
        protocol: &str,
        kind: PoolKind,
        registry: Address,
        count_signature: &str,
        item_signature: &str,
    ) -> Result<Vec<DiscoveredPool>> {
        let count = self
            .retry
            .run(&format!("{protocol} registry count"), || {
                self.read_registry_count(registry, count_signature)
            })
            .await?;
        info!(protocol, count, "registry reports pool count");

        let chunk_size = self.multicall.batch_size() as u64;
        let mut pools = Vec::with_capacity(count as usize);

        for (start, end) in create_index_chunks(count, chunk_size) {
            let calls: Vec<Call> = (start..end)
                .map(|i| encode_index_call(registry, item_signature, i))
                .collect();

            let outcomes = self
                .retry
                .run(&format!("{protocol} registry indices {start}..{end}"), || {
                    self.multicall.run(calls.clone(), None)
                })
                .await?;

            for (offset, outcome) in outcomes.iter().enumerate() {
                let index = start + offset as u64;
                match outcome.ok().and_then(decode_address) {
                    Some(address) => pools.push(DiscoveredPool {
                        address,
                        protocol: protocol.to_string(),
                        kind,
                        source: DiscoverySource::RegistryIndex(index),
                    }),
                    None => {
                        warn!(protocol, index, "registry slot did not decode as an address");
                    }
                }
            }
        }

        Ok(pools)
    }

    async fn read_registry_count(&self, registry: Address, count_signature: &str) -> Result<u64> {
        let call = selector_call(registry, count_signature);
        let tx_request = ethers::types::TransactionRequest::new()
            .to(call.target)
            .data(call.call_data);
        let typed_tx: ethers::types::transaction::eip2718::TypedTransaction = tx_request.into();
        let response = self
            .provider
            .call(&typed_tx, None)
            .await
            .map_err(|e| anyhow!("registry count call failed: {e}"))?;

        if response.len() < 32 {
            return Err(anyhow!(
                "registry count returned {} bytes, expected a uint word",
                response.len()
            ));
        }
        let count = U256::from_big_endian(&response[0..32]);
        count
            .try_into()
            .map_err(|_| anyhow!("registry count {count} exceeds u64"))
    }

    #[allow(clippy::too_many_arguments)]
    async fn scan_creation_events(
        &self,
        protocol: &str,
        kind: PoolKind,
        factory: Address,
        topic0: H256,
        start_block: u64,
        window_blocks: u64,
        address_word: usize,
    ) -> Result<Vec<DiscoveredPool>> {
        let head = self
            .retry
            .run(&format!("{protocol} head block"), || async move {
                self.provider.as_ref().latest_block().await
            })
            .await?;

        if start_block > head {
            warn!(protocol, start_block, head, "start block is ahead of head, nothing to scan");
            return Ok(Vec::new());
        }

        let windows = create_block_chunks(start_block, head, window_blocks);
        info!(
            protocol,
            start_block,
            head,
            windows = windows.len(),
            "scanning creation events"
        );

        // Retried and overlapping windows must not double-count an address.
        let mut seen: HashSet<Address> = HashSet::new();
        let mut pools = Vec::new();

        for (from_block, to_block) in windows {
            let filter = Filter::new()
                .address(factory)
                .from_block(from_block)
                .to_block(to_block)
                .topic0(topic0);

            // An exhausted window is a hard failure: dropping it silently
            // would yield an incomplete pool set with no visible gap.
            let logs = self
                .retry
                .run(&format!("{protocol} window {from_block}..{to_block}"), || {
                    let filter = filter.clone();
                    async move { self.provider.as_ref().logs(&filter).await }
                })
                .await
                .with_context(|| format!("{protocol} discovery window {from_block}..{to_block}"))?;

            debug!(protocol, from_block, to_block, logs = logs.len(), "window fetched");

            for (address, block, log_index) in extract_created_pools(&logs, address_word) {
                if seen.insert(address) {
                    pools.push(DiscoveredPool {
                        address,
                        protocol: protocol.to_string(),
                        kind,
                        source: DiscoverySource::CreationLog { block, log_index },
                    });
                }
            }
        }

        Ok(pools)
    }
}

/// Encodes one `item(uint256)` registry lookup.
pub fn encode_index_call(registry: Address, item_signature: &str, index: u64) -> Call {
    let mut call_data = keccak256(item_signature)[..4].to_vec();
    call_data.extend(abi::encode(&[Token::Uint(U256::from(index))]));
    Call {
        target: registry,
        call_data: Bytes::from(call_data),
    }
}

/// Pulls pool addresses out of creation-event logs.
///
/// The pool address sits in the configured data word; logs with shorter data
/// are skipped. Returns (address, block, log_index) tuples in log order.
pub fn extract_created_pools(logs: &[Log], address_word: usize) -> Vec<(Address, u64, u64)> {
    let offset = address_word * 32;
    logs.iter()
        .filter_map(|log| {
            let data = log.data.as_ref();
            if data.len() < offset + 32 {
                return None;
            }
            let address = Address::from_slice(&data[offset + 12..offset + 32]);
            let block = log.block_number.map(|n| n.as_u64()).unwrap_or_default();
            let log_index = log
                .log_index
                .map(|n| n.as_u64())
                .unwrap_or_default();
            Some((address, block, log_index))
        })
        .collect()
}

/// keccak topic for an event signature string, e.g.
/// `PairCreated(address,address,address,uint256)`.
pub fn event_topic(event_signature: &str) -> H256 {
    H256::from(keccak256(event_signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creation_log(pool: Address, block: u64, log_index: u64, address_word: usize) -> Log {
        let mut data = vec![0u8; (address_word + 1) * 32];
        let offset = address_word * 32;
        data[offset + 12..offset + 32].copy_from_slice(pool.as_bytes());
        Log {
            address: Address::repeat_byte(0xfa),
            topics: vec![event_topic("PairCreated(address,address,address,uint256)")],
            data: data.into(),
            block_number: Some(block.into()),
            log_index: Some(log_index.into()),
            ..Default::default()
        }
    }

    #[test]
    fn extracts_address_from_configured_word() {
        let pool = Address::repeat_byte(0x42);
        // V3-style PoolCreated carries (tickSpacing, pool) in data: word 1
        let logs = vec![creation_log(pool, 100, 3, 1)];
        let extracted = extract_created_pools(&logs, 1);
        assert_eq!(extracted, vec![(pool, 100, 3)]);
    }

    #[test]
    fn short_data_logs_are_skipped() {
        let pool = Address::repeat_byte(0x42);
        let logs = vec![creation_log(pool, 100, 0, 0)];
        // Asking for word 1 when the log only has one word
        assert!(extract_created_pools(&logs, 1).is_empty());
    }

    #[test]
    fn overlapping_windows_do_not_duplicate() {
        let a = Address::repeat_byte(0x0a);
        let b = Address::repeat_byte(0x0b);
        // Two windows that both saw the log for pool `a`
        let window1 = vec![creation_log(a, 10, 0, 0)];
        let window2 = vec![creation_log(a, 10, 0, 0), creation_log(b, 11, 1, 0)];

        let mut seen = HashSet::new();
        let mut pools: Vec<Address> = Vec::new();
        for logs in [window1, window2] {
            for (address, _, _) in extract_created_pools(&logs, 0) {
                if seen.insert(address) {
                    pools.push(address);
                }
            }
        }

        assert_eq!(pools, vec![a, b]);
    }

    #[test]
    fn index_call_encodes_selector_and_argument() {
        let registry = Address::repeat_byte(0xfa);
        let call = encode_index_call(registry, "allPairs(uint256)", 7);

        assert_eq!(call.target, registry);
        assert_eq!(call.call_data.len(), 4 + 32);
        assert_eq!(
            &call.call_data[..4],
            &keccak256("allPairs(uint256)")[..4]
        );
        assert_eq!(call.call_data[4 + 31], 7);
    }

    #[test]
    fn pair_created_topic_matches_known_hash() {
        let topic = event_topic("PairCreated(address,address,address,uint256)");
        assert_eq!(
            format!("{topic:?}"),
            "0x0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9"
        );
    }
}
