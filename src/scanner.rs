//! Run orchestration: drives every configured protocol through discovery,
//! batched state fetch, and classification, strictly sequentially against
//! one shared endpoint.
//!
//! One protocol failing discovery does not abort the run; its failure is
//! counted and the remaining protocols still scan. Only configuration errors
//! (caught before a scanner is ever built) are fatal.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use ethers::prelude::*;
use log::{error, info};

use crate::classifier::{classify, Classification};
use crate::discovery::PoolDiscoverer;
use crate::fetcher::{BatchPipeline, FetchStats};
use crate::multicall::Multicall;
use crate::records::{build_record, PoolRecord};
use crate::settings::ScanPlan;

/// Run-end diagnostics. These counters exist so an operator can tell
/// "0 pools found" (configuration bug) apart from "10,000 pools found,
/// 42 batches dropped" (partial, acceptable degradation).
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub pools_discovered: u64,
    pub pools_decoded: u64,
    pub records_emitted: u64,
    pub undecodable: u64,
    pub skipped: u64,
    pub batches: u64,
    pub batches_failed: u64,
    pub protocols_failed: u64,
    pub rejections: HashMap<&'static str, u64>,
}

impl ScanStats {
    fn absorb_fetch(&mut self, fetch: FetchStats) {
        self.batches += fetch.batches;
        self.batches_failed += fetch.batches_failed;
        self.skipped += fetch.skipped;
        self.undecodable += fetch.undecodable;
    }

    fn record_rejection(&mut self, reason: &'static str) {
        *self.rejections.entry(reason).or_insert(0) += 1;
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejections.values().sum()
    }

    /// Logs the end-of-run report.
    pub fn report(&self) {
        info!("📊 Scan complete:");
        info!("   pools discovered:   {}", self.pools_discovered);
        info!("   pools decoded:      {}", self.pools_decoded);
        info!("   records emitted:    {}", self.records_emitted);
        info!(
            "   rejected by policy: {} ({})",
            self.rejected_total(),
            self.rejection_breakdown()
        );
        info!("   undecodable:        {}", self.undecodable);
        info!(
            "   batches failed:     {}/{} ({} addresses skipped)",
            self.batches_failed, self.batches, self.skipped
        );
        if self.protocols_failed > 0 {
            info!(
                "   ⚠️ {} protocol scan(s) failed entirely — result set is incomplete",
                self.protocols_failed
            );
        }
    }

    fn rejection_breakdown(&self) -> String {
        if self.rejections.is_empty() {
            return "none".to_string();
        }
        let mut parts: Vec<String> = self
            .rejections
            .iter()
            .map(|(reason, count)| format!("{reason}={count}"))
            .collect();
        parts.sort();
        parts.join(", ")
    }
}

/// The result of one full run.
#[derive(Debug)]
pub struct ScanOutcome {
    pub records: Vec<PoolRecord>,
    pub stats: ScanStats,
}

/// Drives the whole discovery + detail + classification pipeline.
pub struct PoolScanner<M: Middleware> {
    provider: Arc<M>,
    plan: ScanPlan,
}

impl<M: Middleware + 'static> PoolScanner<M> {
    pub fn new(provider: Arc<M>, plan: ScanPlan) -> Self {
        Self { provider, plan }
    }

    /// Scans every configured protocol sequentially and accumulates the
    /// accepted records.
    pub async fn run(&self) -> Result<ScanOutcome> {
        let multicall = Multicall::new(
            Arc::clone(&self.provider),
            self.plan.multicall_address,
            self.plan.multicall_batch_size,
        );
        let discoverer = PoolDiscoverer::new(
            Arc::clone(&self.provider),
            multicall.clone(),
            self.plan.retry,
        );
        let pipeline = BatchPipeline::new(
            Arc::new(multicall),
            self.plan.pools_per_batch,
            self.plan.pacing,
        );

        let mut records: Vec<PoolRecord> = Vec::new();
        let mut stats = ScanStats::default();

        for protocol in &self.plan.protocols {
            info!(
                "🔍 Scanning {} ({} pools)",
                protocol.name,
                protocol.kind.as_str()
            );

            let discovered = match discoverer
                .discover(&protocol.name, protocol.kind, &protocol.strategy)
                .await
            {
                Ok(discovered) => discovered,
                Err(e) => {
                    stats.protocols_failed += 1;
                    error!("❌ Discovery failed for {}: {:#}", protocol.name, e);
                    continue;
                }
            };
            stats.pools_discovered += discovered.len() as u64;
            info!("Discovered {} {} pools", discovered.len(), protocol.name);

            let (decoded, fetch_stats) = pipeline.fetch_states(&discovered).await;
            stats.pools_decoded += decoded.len() as u64;
            stats.absorb_fetch(fetch_stats);

            let before = records.len();
            for (pool, state) in &decoded {
                match classify(state, &self.plan.whitelist, &self.plan.thresholds) {
                    Classification::Accepted => {
                        records.push(build_record(
                            pool.address,
                            &pool.protocol,
                            state,
                            protocol.router,
                            protocol.quoter,
                        ));
                    }
                    Classification::Rejected(reason) => {
                        stats.record_rejection(reason.as_str());
                    }
                }
            }

            info!(
                "{}: {} tradeable of {} decoded",
                protocol.name,
                records.len() - before,
                decoded.len()
            );
        }

        stats.records_emitted = records.len() as u64;
        Ok(ScanOutcome { records, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_breakdown_is_sorted_and_labelled() {
        let mut stats = ScanStats::default();
        stats.record_rejection("stable_curve");
        stats.record_rejection("no_whitelisted_token");
        stats.record_rejection("stable_curve");

        assert_eq!(stats.rejected_total(), 3);
        assert_eq!(
            stats.rejection_breakdown(),
            "no_whitelisted_token=1, stable_curve=2"
        );
    }

    #[test]
    fn fetch_stats_accumulate_across_protocols() {
        let mut stats = ScanStats::default();
        stats.absorb_fetch(FetchStats {
            batches: 4,
            batches_failed: 1,
            skipped: 25,
            undecodable: 3,
        });
        stats.absorb_fetch(FetchStats {
            batches: 2,
            batches_failed: 0,
            skipped: 0,
            undecodable: 1,
        });

        assert_eq!(stats.batches, 6);
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.skipped, 25);
        assert_eq!(stats.undecodable, 4);
    }
}
