use anyhow::{anyhow, Context, Result};
use ethers::abi::{self, ParamType, Token};
use ethers::prelude::*;
use ethers::utils::keccak256;
use log::{debug, warn};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// A single RPC call to be batched in a multicall.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target contract address
    pub target: Address,
    /// Encoded function call data
    pub call_data: Bytes,
}

/// Outcome of one slot in an aggregate batch.
///
/// A call that reverts inside the aggregation contract yields
/// `success == false` with empty `data` for its slot; the surrounding slots
/// are unaffected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    pub success: bool,
    pub data: Bytes,
}

impl CallOutcome {
    /// Returns the raw return bytes when the slot succeeded with a non-empty
    /// payload.
    pub fn ok(&self) -> Option<&[u8]> {
        if self.success && !self.data.is_empty() {
            Some(self.data.as_ref())
        } else {
            None
        }
    }
}

// aggregate3((address,bool,bytes)[]) -> (bool,bytes)[]
static AGGREGATE3_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| {
    let hash = keccak256("aggregate3((address,bool,bytes)[])");
    [hash[0], hash[1], hash[2], hash[3]]
});

/// Multicall batch executor for optimized RPC calls.
///
/// Batches multiple contract calls into a single RPC request to reduce latency
/// and RPC provider load.
///
/// ## Guarantees
///
/// - Result order matches input order exactly, across internal chunking.
/// - A reverting call produces a failed slot without aborting its batch
///   (every Call3 is encoded with `allowFailure = true`).
/// - Transport-level failures surface as a single `Err` for the whole run;
///   retry is the caller's concern, not this component's.
///
/// ## Example
///
/// ```ignore
/// let multicall = Multicall::new(provider, multicall_address, 100);
/// let outcomes = multicall.run(calls, None).await?;
/// ```
pub struct Multicall<M: Middleware> {
    provider: Arc<M>,
    multicall_address: Address,
    batch_size: usize,
}

// Hand-written so cloning never requires M: Clone; only the Arc is cloned.
impl<M: Middleware> Clone for Multicall<M> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            multicall_address: self.multicall_address,
            batch_size: self.batch_size,
        }
    }
}

impl<M: Middleware + 'static> Multicall<M> {
    pub fn new(provider: Arc<M>, multicall_address: Address, batch_size: usize) -> Self {
        // Cap at 200 calls per batch to avoid rejections from RPC providers
        let validated_batch_size = batch_size.clamp(50, 200);
        if batch_size > 200 {
            warn!(
                "⚠️ Batch size {} exceeds recommended maximum (200), capping to 200",
                batch_size
            );
        }

        Self {
            provider,
            multicall_address,
            batch_size: validated_batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs a batch of calls, optionally at a specific block.
    ///
    /// Returns one `CallOutcome` per submitted call, same index order as the
    /// input. Identical calls are coalesced into a single slot on the wire
    /// and fanned back out to their original positions.
    pub async fn run(&self, calls: Vec<Call>, block: Option<BlockId>) -> Result<Vec<CallOutcome>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        // Coalesce identical calls to reduce load
        let (unique_call_vec, original_indices) = coalesce(&calls);
        debug!(
            "Multicall coalesced {} calls into {}",
            calls.len(),
            unique_call_vec.len()
        );

        let mut unique_outcomes: Vec<CallOutcome> = Vec::with_capacity(unique_call_vec.len());
        for call_chunk in unique_call_vec.chunks(self.batch_size) {
            let calldata = encode_aggregate(call_chunk);
            let tx_request = ethers::types::TransactionRequest::new()
                .to(self.multicall_address)
                .data(calldata);
            let typed_tx: ethers::types::transaction::eip2718::TypedTransaction =
                tx_request.into();
            let response = self
                .provider
                .call(&typed_tx, block)
                .await
                .map_err(|e| anyhow!("aggregate call failed: {e}"))?;

            let outcomes = decode_aggregate(&response)?;
            if outcomes.len() != call_chunk.len() {
                return Err(anyhow!(
                    "aggregate returned {} results for {} calls",
                    outcomes.len(),
                    call_chunk.len()
                ));
            }
            unique_outcomes.extend(outcomes);
        }

        // Reconstruct the full result set in the original order
        let final_outcomes = original_indices
            .into_iter()
            .map(|index| unique_outcomes[index].clone())
            .collect();

        Ok(final_outcomes)
    }
}

/// De-duplicates identical calls while remembering every original position,
/// so each unique call goes over the wire once and results fan back out in
/// input order.
pub fn coalesce(calls: &[Call]) -> (Vec<Call>, Vec<usize>) {
    let mut unique_calls = indexmap::IndexMap::new();
    let mut original_indices = vec![0; calls.len()];
    for (i, call) in calls.iter().enumerate() {
        let (index, _) = unique_calls.insert_full((call.target, call.call_data.clone()), ());
        original_indices[i] = index;
    }

    let unique = unique_calls
        .into_keys()
        .map(|(target, call_data)| Call { target, call_data })
        .collect();
    (unique, original_indices)
}

/// Encodes an `aggregate3` invocation for the given calls.
///
/// Every Call3 tuple carries `allowFailure = true` so that one reverting
/// target cannot poison its neighbors.
pub fn encode_aggregate(calls: &[Call]) -> Bytes {
    let call_tokens: Vec<Token> = calls
        .iter()
        .map(|call| {
            Token::Tuple(vec![
                Token::Address(call.target),
                Token::Bool(true),
                Token::Bytes(call.call_data.to_vec()),
            ])
        })
        .collect();

    let mut calldata = AGGREGATE3_SELECTOR.to_vec();
    calldata.extend(abi::encode(&[Token::Array(call_tokens)]));
    Bytes::from(calldata)
}

/// Decodes an `aggregate3` response into per-slot outcomes, preserving order.
pub fn decode_aggregate(response: &[u8]) -> Result<Vec<CallOutcome>> {
    let decoded = abi::decode(
        &[ParamType::Array(Box::new(ParamType::Tuple(vec![
            ParamType::Bool,
            ParamType::Bytes,
        ])))],
        response,
    )
    .context("invalid aggregate3 response encoding")?;

    let results_array = decoded
        .into_iter()
        .next()
        .and_then(|t| t.into_array())
        .ok_or_else(|| anyhow!("invalid multicall response format"))?;

    let mut outcomes = Vec::with_capacity(results_array.len());
    for result_token in results_array {
        match result_token {
            Token::Tuple(mut tuple) if tuple.len() == 2 => {
                let data = match tuple.remove(1) {
                    Token::Bytes(data) => Bytes::from(data),
                    other => return Err(anyhow!("unexpected returnData token: {other:?}")),
                };
                let success = match tuple.remove(0) {
                    Token::Bool(b) => b,
                    other => return Err(anyhow!("unexpected success token: {other:?}")),
                };
                outcomes.push(CallOutcome { success, data });
            }
            other => return Err(anyhow!("unexpected result tuple: {other:?}")),
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_response(slots: &[(bool, Vec<u8>)]) -> Vec<u8> {
        let tokens: Vec<Token> = slots
            .iter()
            .map(|(success, data)| {
                Token::Tuple(vec![Token::Bool(*success), Token::Bytes(data.clone())])
            })
            .collect();
        abi::encode(&[Token::Array(tokens)])
    }

    fn word_with_value(v: u8) -> Vec<u8> {
        let mut word = vec![0u8; 32];
        word[31] = v;
        word
    }

    #[test]
    fn decode_preserves_length_and_order_across_sizes() {
        // Sweep call counts; each slot carries its own index so reordering
        // or truncation shows up immediately.
        for count in [0usize, 1, 2, 3, 7, 50, 137, 200] {
            let slots: Vec<(bool, Vec<u8>)> = (0..count)
                .map(|i| (true, word_with_value((i % 251) as u8)))
                .collect();
            let response = encode_response(&slots);
            let outcomes = decode_aggregate(&response).unwrap();

            assert_eq!(outcomes.len(), count);
            for (i, outcome) in outcomes.iter().enumerate() {
                assert!(outcome.success);
                assert_eq!(outcome.data.as_ref()[31], (i % 251) as u8);
            }
        }
    }

    #[test]
    fn decode_keeps_failed_slot_in_place() {
        let slots = vec![
            (true, word_with_value(1)),
            (false, Vec::new()),
            (true, word_with_value(3)),
        ];
        let outcomes = decode_aggregate(&encode_response(&slots)).unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].data.as_ref()[31], 1);
        assert!(!outcomes[1].success);
        assert!(outcomes[1].data.is_empty());
        assert!(outcomes[2].success);
        assert_eq!(outcomes[2].data.as_ref()[31], 3);
    }

    #[test]
    fn failed_slot_returns_none_from_ok() {
        let failed = CallOutcome {
            success: false,
            data: Bytes::new(),
        };
        assert!(failed.ok().is_none());

        let empty_success = CallOutcome {
            success: true,
            data: Bytes::new(),
        };
        assert!(empty_success.ok().is_none());

        let good = CallOutcome {
            success: true,
            data: Bytes::from(vec![1u8; 32]),
        };
        assert_eq!(good.ok().unwrap().len(), 32);
    }

    #[test]
    fn coalesced_results_expand_back_to_input_order() {
        // Duplicate-heavy input across a sweep of sizes: the fan-out must
        // always restore one result per input call, in input order.
        for count in [1usize, 2, 5, 17, 64] {
            let calls: Vec<Call> = (0..count)
                .map(|i| Call {
                    target: Address::repeat_byte((i % 3) as u8 + 1),
                    call_data: Bytes::from(vec![(i % 3) as u8]),
                })
                .collect();

            let (unique, indices) = coalesce(&calls);
            assert_eq!(unique.len(), count.min(3));
            assert_eq!(indices.len(), count);

            let expanded: Vec<Call> = indices.iter().map(|&i| unique[i].clone()).collect();
            assert_eq!(expanded, calls);
        }
    }

    #[test]
    fn encode_roundtrips_through_abi() {
        let calls = vec![
            Call {
                target: Address::repeat_byte(0x11),
                call_data: Bytes::from(vec![0xaa, 0xbb, 0xcc, 0xdd]),
            },
            Call {
                target: Address::repeat_byte(0x22),
                call_data: Bytes::from(vec![0x01, 0x02, 0x03, 0x04, 0x05]),
            },
        ];
        let encoded = encode_aggregate(&calls);
        assert_eq!(&encoded[..4], AGGREGATE3_SELECTOR.as_slice());

        let decoded = abi::decode(
            &[ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bool,
                ParamType::Bytes,
            ])))],
            &encoded[4..],
        )
        .unwrap();
        let array = decoded.into_iter().next().unwrap().into_array().unwrap();
        assert_eq!(array.len(), 2);
        match &array[1] {
            Token::Tuple(fields) => {
                assert_eq!(fields[0], Token::Address(Address::repeat_byte(0x22)));
                assert_eq!(fields[1], Token::Bool(true));
                assert_eq!(fields[2], Token::Bytes(vec![0x01, 0x02, 0x03, 0x04, 0x05]));
            }
            other => panic!("unexpected token {other:?}"),
        }
    }
}
