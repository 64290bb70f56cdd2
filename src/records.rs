//! Final pool records and per-run output.
//!
//! A record is the externally visible unit of output: one tradeable pool,
//! normalized across protocol variants. Records accumulate append-only during
//! a run and are written as a single JSON batch file at the end.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use ethers::prelude::*;
use serde::Serialize;

use crate::protocol::PoolState;
use crate::utils::short_address;

/// One tradeable pool, ready for the downstream consumer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolRecord {
    pub name: String,
    pub token_a: Address,
    pub token_b: Address,
    pub router: Address,
    pub protocol: String,
    /// Where quotes are requested: the quoter contract for concentrated
    /// pools, the pool itself for constant-product shapes.
    pub quote_target: Address,
    /// Set only when `quote_target` is not the pool itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_spacing: Option<i32>,
}

/// Builds the normalized record for an accepted pool.
pub fn build_record(
    pool_address: Address,
    protocol: &str,
    state: &PoolState,
    router: Address,
    quoter: Option<Address>,
) -> PoolRecord {
    let (token_a, token_b) = state.token_pair();
    let (quote_target, pool) = match quoter {
        Some(quoter) => (quoter, Some(pool_address)),
        None => (pool_address, None),
    };

    PoolRecord {
        name: format!(
            "{} {}/{}",
            protocol,
            short_address(token_a),
            short_address(token_b)
        ),
        token_a,
        token_b,
        router,
        protocol: protocol.to_string(),
        quote_target,
        pool,
        fee: state.fee(),
        tick_spacing: state.tick_spacing(),
    }
}

/// Timestamped batch-file name for one run.
pub fn run_file_name() -> String {
    format!("pools_{}.json", Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Writes the run's records as one pretty-printed JSON array.
pub fn write_records(path: &Path, records: &[PoolRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file {}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, records)
        .with_context(|| format!("failed to serialize {} records", records.len()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_product_record_quotes_against_the_pool() {
        let pool_address = Address::repeat_byte(0x99);
        let router = Address::repeat_byte(0x10);
        let state = PoolState::ConstantProduct {
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            reserve0: U256::from(1u64),
            reserve1: U256::from(2u64),
        };

        let record = build_record(pool_address, "testdex", &state, router, None);
        assert_eq!(record.quote_target, pool_address);
        assert_eq!(record.pool, None);
        assert_eq!(record.fee, None);
        assert_eq!(record.tick_spacing, None);
        assert!(record.name.starts_with("testdex "));
    }

    #[test]
    fn concentrated_record_carries_quoter_and_pool_separately() {
        let pool_address = Address::repeat_byte(0x99);
        let router = Address::repeat_byte(0x10);
        let quoter = Address::repeat_byte(0x20);
        let state = PoolState::Concentrated {
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            liquidity: 1_000_000,
            fee: 500,
            tick_spacing: 10,
        };

        let record = build_record(pool_address, "cldex", &state, router, Some(quoter));
        assert_eq!(record.quote_target, quoter);
        assert_eq!(record.pool, Some(pool_address));
        assert_eq!(record.fee, Some(500));
        assert_eq!(record.tick_spacing, Some(10));
    }

    #[test]
    fn records_roundtrip_through_the_batch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pools_test.json");

        let state = PoolState::ConstantProduct {
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            reserve0: U256::from(1u64),
            reserve1: U256::from(2u64),
        };
        let records = vec![build_record(
            Address::repeat_byte(0x99),
            "testdex",
            &state,
            Address::repeat_byte(0x10),
            None,
        )];

        write_records(&path, &records).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["protocol"], "testdex");
        // Optional fields are omitted for constant-product records
        assert!(parsed[0].get("fee").is_none());
    }
}
