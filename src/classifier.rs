// Pool Classifier Module
//
// Applies whitelist-and-threshold policy to decoded pool state to decide
// keep/drop. Classification is a pure function of (state, whitelist,
// thresholds): no RPC, no hidden state, always the same verdict for the same
// input.

use ethers::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;

use crate::protocol::PoolState;

/// Trust class of a whitelisted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenClass {
    /// Chain-native wrapped asset (e.g. WETH)
    Native,
    /// Fiat-pegged stable asset
    Stable,
    /// Whitelisted but neither native nor stable
    Other,
}

/// One whitelist entry. The address is the map key in [`Whitelist`].
#[derive(Debug, Clone, Copy)]
pub struct WhitelistedToken {
    pub decimals: u8,
    pub class: TokenClass,
}

/// The configured set of token addresses trusted to anchor a liquidity
/// judgment. Immutable for the duration of a run.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    tokens: HashMap<Address, WhitelistedToken>,
}

impl Whitelist {
    pub fn new(entries: impl IntoIterator<Item = (Address, WhitelistedToken)>) -> Self {
        Self {
            tokens: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, token: &Address) -> Option<&WhitelistedToken> {
        self.tokens.get(token)
    }

    pub fn contains(&self, token: &Address) -> bool {
        self.tokens.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Per-class reserve floors and the two-tier concentrated liquidity gate.
///
/// The tier values are operator-tuned heuristics, deliberately configuration
/// rather than derived constants; they do not generalize across fee tiers or
/// token decimal layouts.
#[derive(Debug, Clone)]
pub struct LiquidityThresholds {
    /// Minimum same-side reserve when the whitelisted side is native
    pub min_native_reserve: U256,
    /// Minimum same-side reserve when the whitelisted side is stable
    pub min_stable_reserve: U256,
    /// Minimum same-side reserve for other whitelisted tokens
    pub min_other_reserve: U256,
    /// Raw liquidity floor when both tokens are whitelisted
    pub cl_low_tier: u128,
    /// Raw liquidity floor when exactly one token is whitelisted
    pub cl_high_tier: u128,
}

impl LiquidityThresholds {
    fn reserve_floor(&self, class: TokenClass) -> U256 {
        match class {
            TokenClass::Native => self.min_native_reserve,
            TokenClass::Stable => self.min_stable_reserve,
            TokenClass::Other => self.min_other_reserve,
        }
    }
}

/// Reason why a pool was dropped by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Solidly pool with the stable-curve flag set
    StableCurve,
    /// Neither token is in the whitelist
    NoWhitelistedToken,
    /// No whitelisted side cleared its class reserve floor
    BelowReserveFloor,
    /// Concentrated liquidity under the applicable tier
    BelowLiquidityTier,
    /// token0 or token1 is the zero address
    ZeroAddress,
    /// token0 == token1
    SameTokens,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::StableCurve => "stable_curve",
            RejectReason::NoWhitelistedToken => "no_whitelisted_token",
            RejectReason::BelowReserveFloor => "below_reserve_floor",
            RejectReason::BelowLiquidityTier => "below_liquidity_tier",
            RejectReason::ZeroAddress => "zero_address",
            RejectReason::SameTokens => "same_tokens",
        }
    }
}

/// Classifier verdict for one decoded pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Accepted,
    Rejected(RejectReason),
}

impl Classification {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Classification::Accepted)
    }
}

/// Applies the keep/drop policy to one decoded pool state.
///
/// Policy by variant:
/// - Solidly with `stable == true`: rejected unconditionally (the downstream
///   pricing model does not support that curve shape).
/// - Constant-product (both v2 shapes when non-stable): a side whose token is
///   whitelisted with class `c` accepts the pool when its own reserve is at
///   least the configured floor for `c` (inclusive); first matching side
///   wins.
/// - Concentrated: both sides whitelisted requires liquidity above the low
///   tier; exactly one side whitelisted must clear the strictly higher tier;
///   neither side whitelisted is rejected.
///
/// A final gate rejects any pool with zero whitelisted sides regardless of
/// the variant verdict.
pub fn classify(
    state: &PoolState,
    whitelist: &Whitelist,
    thresholds: &LiquidityThresholds,
) -> Classification {
    let (token0, token1) = state.token_pair();

    if token0.is_zero() || token1.is_zero() {
        return Classification::Rejected(RejectReason::ZeroAddress);
    }
    if token0 == token1 {
        return Classification::Rejected(RejectReason::SameTokens);
    }

    let entry0 = whitelist.get(&token0).copied();
    let entry1 = whitelist.get(&token1).copied();

    let verdict = match state {
        PoolState::Solidly { stable: true, .. } => {
            Classification::Rejected(RejectReason::StableCurve)
        }
        PoolState::ConstantProduct {
            reserve0, reserve1, ..
        }
        | PoolState::Solidly {
            reserve0, reserve1, ..
        } => classify_reserves(&[(entry0, *reserve0), (entry1, *reserve1)], thresholds),
        PoolState::Concentrated { liquidity, .. } => {
            classify_liquidity(entry0.is_some(), entry1.is_some(), *liquidity, thresholds)
        }
    };

    // Universal gate: a pool with zero whitelisted sides never passes, even
    // if a variant rule above would have let it through.
    if verdict.is_accepted() && entry0.is_none() && entry1.is_none() {
        return Classification::Rejected(RejectReason::NoWhitelistedToken);
    }

    verdict
}

fn classify_reserves(
    sides: &[(Option<WhitelistedToken>, U256); 2],
    thresholds: &LiquidityThresholds,
) -> Classification {
    let mut any_whitelisted = false;
    for (entry, reserve) in sides {
        if let Some(entry) = entry {
            any_whitelisted = true;
            // Inclusive floor: a reserve exactly at the threshold passes
            if *reserve >= thresholds.reserve_floor(entry.class) {
                return Classification::Accepted;
            }
        }
    }

    if any_whitelisted {
        Classification::Rejected(RejectReason::BelowReserveFloor)
    } else {
        Classification::Rejected(RejectReason::NoWhitelistedToken)
    }
}

fn classify_liquidity(
    side0_whitelisted: bool,
    side1_whitelisted: bool,
    liquidity: u128,
    thresholds: &LiquidityThresholds,
) -> Classification {
    let tier = match (side0_whitelisted, side1_whitelisted) {
        // Pools between two trusted assets carry lower risk
        (true, true) => thresholds.cl_low_tier,
        // An untrusted counter-asset needs materially deeper liquidity
        (true, false) | (false, true) => thresholds.cl_high_tier,
        (false, false) => {
            return Classification::Rejected(RejectReason::NoWhitelistedToken);
        }
    };

    if liquidity > tier {
        Classification::Accepted
    } else {
        Classification::Rejected(RejectReason::BelowLiquidityTier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist() -> Whitelist {
        Whitelist::new([
            (
                Address::repeat_byte(0xee),
                WhitelistedToken {
                    decimals: 18,
                    class: TokenClass::Native,
                },
            ),
            (
                Address::repeat_byte(0x05),
                WhitelistedToken {
                    decimals: 6,
                    class: TokenClass::Stable,
                },
            ),
        ])
    }

    fn thresholds() -> LiquidityThresholds {
        LiquidityThresholds {
            min_native_reserve: U256::from(1_000u64),
            min_stable_reserve: U256::from(2_000u64),
            min_other_reserve: U256::from(3_000u64),
            cl_low_tier: 10_000,
            cl_high_tier: 100_000,
        }
    }

    #[test]
    fn zero_address_rejected_before_policy() {
        let state = PoolState::ConstantProduct {
            token0: Address::zero(),
            token1: Address::repeat_byte(0xee),
            reserve0: U256::from(u64::MAX),
            reserve1: U256::from(u64::MAX),
        };
        assert_eq!(
            classify(&state, &whitelist(), &thresholds()),
            Classification::Rejected(RejectReason::ZeroAddress)
        );
    }

    #[test]
    fn identical_tokens_rejected_before_policy() {
        let t = Address::repeat_byte(0xee);
        let state = PoolState::ConstantProduct {
            token0: t,
            token1: t,
            reserve0: U256::from(u64::MAX),
            reserve1: U256::from(u64::MAX),
        };
        assert_eq!(
            classify(&state, &whitelist(), &thresholds()),
            Classification::Rejected(RejectReason::SameTokens)
        );
    }

    #[test]
    fn second_side_can_carry_the_pool() {
        // token0 is unknown; the stable side's own reserve clears its floor
        let state = PoolState::ConstantProduct {
            token0: Address::repeat_byte(0x77),
            token1: Address::repeat_byte(0x05),
            reserve0: U256::zero(),
            reserve1: U256::from(2_000u64),
        };
        assert_eq!(
            classify(&state, &whitelist(), &thresholds()),
            Classification::Accepted
        );
    }

    #[test]
    fn whitelisted_side_below_floor_uses_distinct_reason() {
        let state = PoolState::ConstantProduct {
            token0: Address::repeat_byte(0xee),
            token1: Address::repeat_byte(0x77),
            reserve0: U256::from(999u64),
            reserve1: U256::from(u64::MAX),
        };
        assert_eq!(
            classify(&state, &whitelist(), &thresholds()),
            Classification::Rejected(RejectReason::BelowReserveFloor)
        );
    }

    #[test]
    fn concentrated_with_no_whitelisted_side_rejected() {
        let state = PoolState::Concentrated {
            token0: Address::repeat_byte(0x77),
            token1: Address::repeat_byte(0x88),
            liquidity: u128::MAX,
            fee: 3000,
            tick_spacing: 60,
        };
        assert_eq!(
            classify(&state, &whitelist(), &thresholds()),
            Classification::Rejected(RejectReason::NoWhitelistedToken)
        );
    }

    #[test]
    fn reject_reasons_have_stable_labels() {
        assert_eq!(RejectReason::StableCurve.as_str(), "stable_curve");
        assert_eq!(
            RejectReason::NoWhitelistedToken.as_str(),
            "no_whitelisted_token"
        );
        assert_eq!(
            RejectReason::BelowLiquidityTier.as_str(),
            "below_liquidity_tier"
        );
    }
}
