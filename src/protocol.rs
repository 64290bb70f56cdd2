//! Protocol variants: per-variant call plans and state decoding.
//!
//! Each supported pool shape requires a fixed, known number of calls per
//! address in a fixed order, so the batch driver can slice aggregate results
//! positionally. `PoolKind` owns both the call plan and the decoder; adding a
//! protocol variant is one new enum arm, not a string branch scattered across
//! the pipeline.

use ethers::prelude::*;
use ethers::utils::keccak256;
use serde::Deserialize;

use crate::multicall::{Call, CallOutcome};

/// Encodes a zero-argument call from its canonical signature.
pub fn selector_call(target: Address, signature: &str) -> Call {
    let selector = keccak256(signature)[..4].to_vec();
    Call {
        target,
        call_data: Bytes::from(selector),
    }
}

/// The pool shapes this pipeline knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// x * y = k pair exposing `getReserves()`
    ConstantProduct,
    /// Solidly-style pair with a per-pool `stable()` curve flag
    Solidly,
    /// Tick-based concentrated liquidity pool
    Concentrated,
}

/// Decoded per-pool state, tagged by variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolState {
    ConstantProduct {
        token0: Address,
        token1: Address,
        reserve0: U256,
        reserve1: U256,
    },
    Solidly {
        token0: Address,
        token1: Address,
        reserve0: U256,
        reserve1: U256,
        stable: bool,
    },
    Concentrated {
        token0: Address,
        token1: Address,
        liquidity: u128,
        fee: u32,
        tick_spacing: i32,
    },
}

impl PoolState {
    pub fn token_pair(&self) -> (Address, Address) {
        match self {
            PoolState::ConstantProduct { token0, token1, .. }
            | PoolState::Solidly { token0, token1, .. }
            | PoolState::Concentrated { token0, token1, .. } => (*token0, *token1),
        }
    }

    pub fn fee(&self) -> Option<u32> {
        match self {
            PoolState::Concentrated { fee, .. } => Some(*fee),
            _ => None,
        }
    }

    pub fn tick_spacing(&self) -> Option<i32> {
        match self {
            PoolState::Concentrated { tick_spacing, .. } => Some(*tick_spacing),
            _ => None,
        }
    }
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::ConstantProduct => "constant_product",
            PoolKind::Solidly => "solidly",
            PoolKind::Concentrated => "concentrated",
        }
    }

    /// Number of calls the state fetch issues per pool of this kind.
    pub fn calls_per_pool(&self) -> usize {
        match self {
            PoolKind::ConstantProduct => 3,
            PoolKind::Solidly => 4,
            PoolKind::Concentrated => 5,
        }
    }

    /// The fixed, ordered call sequence for one pool address.
    ///
    /// The decoder slices aggregate results positionally, so this order is
    /// load-bearing: it must match `decode_state` arm by arm.
    pub fn state_calls(&self, pool: Address) -> Vec<Call> {
        match self {
            PoolKind::ConstantProduct => vec![
                selector_call(pool, "token0()"),
                selector_call(pool, "token1()"),
                selector_call(pool, "getReserves()"),
            ],
            PoolKind::Solidly => vec![
                selector_call(pool, "token0()"),
                selector_call(pool, "token1()"),
                selector_call(pool, "getReserves()"),
                selector_call(pool, "stable()"),
            ],
            PoolKind::Concentrated => vec![
                selector_call(pool, "token0()"),
                selector_call(pool, "token1()"),
                selector_call(pool, "liquidity()"),
                selector_call(pool, "fee()"),
                selector_call(pool, "tickSpacing()"),
            ],
        }
    }

    /// Decodes one pool's slice of aggregate outcomes.
    ///
    /// Any soft-failed or malformed slot drops the whole address: partial
    /// state is never emitted, and a decode failure is indistinguishable from
    /// "this address is not a pool of this shape".
    pub fn decode_state(&self, slots: &[CallOutcome]) -> Option<PoolState> {
        if slots.len() != self.calls_per_pool() {
            return None;
        }

        let token0 = decode_address(slots[0].ok()?)?;
        let token1 = decode_address(slots[1].ok()?)?;

        match self {
            PoolKind::ConstantProduct => {
                let (reserve0, reserve1) = decode_reserves(slots[2].ok()?)?;
                Some(PoolState::ConstantProduct {
                    token0,
                    token1,
                    reserve0,
                    reserve1,
                })
            }
            PoolKind::Solidly => {
                let (reserve0, reserve1) = decode_reserves(slots[2].ok()?)?;
                let stable = decode_bool(slots[3].ok()?)?;
                Some(PoolState::Solidly {
                    token0,
                    token1,
                    reserve0,
                    reserve1,
                    stable,
                })
            }
            PoolKind::Concentrated => {
                let liquidity = decode_u128(slots[2].ok()?)?;
                let fee = decode_u24(slots[3].ok()?)?;
                let tick_spacing = decode_i24(slots[4].ok()?)?;
                Some(PoolState::Concentrated {
                    token0,
                    token1,
                    liquidity,
                    fee,
                    tick_spacing,
                })
            }
        }
    }
}

/// Address from the low 20 bytes of a return word.
pub fn decode_address(data: &[u8]) -> Option<Address> {
    if data.len() < 32 {
        return None;
    }
    Some(Address::from_slice(&data[12..32]))
}

/// First two words of a `getReserves()` return.
///
/// Works for both uint112 (Uniswap V2) and uint256 (Solidly) reserve
/// layouts; the trailing timestamp word is ignored.
pub fn decode_reserves(data: &[u8]) -> Option<(U256, U256)> {
    if data.len() < 64 {
        return None;
    }
    let r0 = U256::from_big_endian(&data[0..32]);
    let r1 = U256::from_big_endian(&data[32..64]);
    Some((r0, r1))
}

pub fn decode_bool(data: &[u8]) -> Option<bool> {
    if data.len() < 32 {
        return None;
    }
    Some(!U256::from_big_endian(&data[0..32]).is_zero())
}

pub fn decode_u128(data: &[u8]) -> Option<u128> {
    if data.len() < 32 {
        return None;
    }
    U256::from_big_endian(&data[0..32]).try_into().ok()
}

/// uint24 from the tail of a return word.
pub fn decode_u24(data: &[u8]) -> Option<u32> {
    if data.len() < 32 {
        return None;
    }
    let b = &data[29..32];
    Some(((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32))
}

/// int24 from the tail of a return word, sign-extended.
pub fn decode_i24(data: &[u8]) -> Option<i32> {
    let raw = decode_u24(data)?;
    if raw & 0x800000 != 0 {
        Some((raw as i32) | !0xFFFFFF)
    } else {
        Some(raw as i32)
    }
}
