// src/utils.rs
// Utility functions for pool-census

use ethers::types::Address;

/// Creates a vector of (start_block, end_block) tuples for a given range and
/// chunk size. Both bounds are inclusive.
pub fn create_block_chunks(from_block: u64, to_block: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut chunks = Vec::new();
    let mut current_from = from_block;
    while current_from <= to_block {
        let current_to = std::cmp::min(current_from + chunk_size - 1, to_block);
        chunks.push((current_from, current_to));
        current_from = current_to + 1;
    }
    chunks
}

/// Partitions the half-open index range `[0, count)` into chunks of at most
/// `chunk_size` indices, as (start, end-exclusive) pairs.
pub fn create_index_chunks(count: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut chunks = Vec::new();
    let mut start = 0u64;
    while start < count {
        let end = std::cmp::min(start + chunk_size, count);
        chunks.push((start, end));
        start = end;
    }
    chunks
}

/// Shortened `0x1234..abcd` rendering for record names and log lines.
pub fn short_address(addr: Address) -> String {
    let full = format!("{:#x}", addr);
    format!("{}..{}", &full[..6], &full[full.len() - 4..])
}
