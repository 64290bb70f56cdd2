//! Batch pipeline driver for the pool detail phase.
//!
//! Partitions discovered pools into fixed-size chunks, drives one aggregate
//! call per chunk, and paces between chunks so the RPC endpoint is never
//! hammered. Pacing is the only admission control the endpoint gets.
//!
//! Failure handling here is deliberately looser than discovery's: a chunk
//! whose aggregate call fails at the transport level is logged, counted, and
//! skipped. Missing a few pools from the detail phase is tolerable; missing
//! an entire discovery window is not.

use std::sync::Arc;
use std::time::Duration;

use ethers::prelude::*;
use log::{debug, info, warn};

use crate::discovery::DiscoveredPool;
use crate::multicall::{CallOutcome, Multicall};
use crate::protocol::PoolState;

/// Counters for one detail-phase run, reported at run end so operators can
/// tell an empty result from a degraded one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Aggregate chunks attempted
    pub batches: u64,
    /// Chunks dropped on transport failure
    pub batches_failed: u64,
    /// Addresses inside failed chunks, never decoded
    pub skipped: u64,
    /// Addresses whose state did not decode under their declared variant
    pub undecodable: u64,
}

/// Drives state fetching over a discovered-pool list.
pub struct BatchPipeline<M: Middleware> {
    multicall: Arc<Multicall<M>>,
    pools_per_batch: usize,
    pacing: Duration,
}

impl<M: Middleware + 'static> BatchPipeline<M> {
    pub fn new(multicall: Arc<Multicall<M>>, pools_per_batch: usize, pacing: Duration) -> Self {
        Self {
            multicall,
            pools_per_batch: pools_per_batch.max(1),
            pacing,
        }
    }

    /// Fetches and decodes state for every pool, chunk by chunk.
    ///
    /// Chunks are strictly sequential; the pacing delay runs after every
    /// chunk. Returns the decoded pools paired with their identifiers, plus
    /// the run counters.
    pub async fn fetch_states<'a>(
        &self,
        pools: &'a [DiscoveredPool],
    ) -> (Vec<(&'a DiscoveredPool, PoolState)>, FetchStats) {
        let mut decoded: Vec<(&'a DiscoveredPool, PoolState)> = Vec::new();
        let mut stats = FetchStats::default();

        for chunk in pools.chunks(self.pools_per_batch) {
            stats.batches += 1;

            let calls: Vec<_> = chunk
                .iter()
                .flat_map(|pool| pool.kind.state_calls(pool.address))
                .collect();

            match self.multicall.run(calls, None).await {
                Ok(outcomes) => {
                    let chunk_decoded = decode_batch(chunk, &outcomes);
                    stats.undecodable += (chunk.len() - chunk_decoded.len()) as u64;
                    decoded.extend(chunk_decoded);
                }
                Err(e) => {
                    // Skip the whole chunk; its addresses are treated as
                    // undecodable rather than retried indefinitely.
                    stats.batches_failed += 1;
                    stats.skipped += chunk.len() as u64;
                    warn!(
                        "⚠️ Dropping batch of {} pools after transport failure: {}",
                        chunk.len(),
                        e
                    );
                }
            }

            debug!(
                "Batch {}/{} done, pacing {:?}",
                stats.batches,
                (pools.len() + self.pools_per_batch - 1) / self.pools_per_batch,
                self.pacing
            );
            tokio::time::sleep(self.pacing).await;
        }

        info!(
            "Detail phase: {} pools decoded, {} undecodable, {}/{} batches failed",
            decoded.len(),
            stats.undecodable,
            stats.batches_failed,
            stats.batches
        );

        (decoded, stats)
    }
}

/// Slices one chunk's aggregate outcomes back onto its pools, positionally.
///
/// Each pool consumes exactly `kind.calls_per_pool()` consecutive slots; a
/// pool that fails to decode is dropped without shifting its neighbors'
/// slices. Outcomes beyond the expected total are ignored; a truncated
/// outcome vector drops only the pools whose slots are missing.
pub fn decode_batch<'a>(
    pools: &'a [DiscoveredPool],
    outcomes: &[CallOutcome],
) -> Vec<(&'a DiscoveredPool, PoolState)> {
    let mut decoded = Vec::with_capacity(pools.len());
    let mut offset = 0usize;

    for pool in pools {
        let width = pool.kind.calls_per_pool();
        let Some(slots) = outcomes.get(offset..offset + width) else {
            offset += width;
            continue;
        };
        offset += width;

        if let Some(state) = pool.kind.decode_state(slots) {
            decoded.push((pool, state));
        }
    }

    decoded
}
