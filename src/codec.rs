//! Submission payload encoding.
//!
//! [`JsonCodec`] writes the input half of a batch as JSON: derived order
//! fields and the batch's description, signing algorithm and hash never
//! leave the process. Its decoder is the reference parser used by the
//! in-process simulator: it validates ring references and resolves every
//! derived order field the way the protocol does before settlement.

use alloy::primitives::{Address, Bytes, U256};
use tracing::debug;

use crate::batch::{OrderDescriptor, SettlementBatch, SignAlgorithm};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to serialize batch: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse submission payload: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("ring {ring} is empty")]
    EmptyRing { ring: usize },
    #[error("ring {ring} references order {index} but the batch has {orders} orders")]
    RingIndexOutOfRange {
        ring: usize,
        index: usize,
        orders: usize,
    },
}

/// Turns a batch into the payload submitted to the ring submitter.
pub trait SubmissionEncoder: Send + Sync {
    fn encode(&self, batch: &SettlementBatch) -> Result<Bytes, CodecError>;
}

#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    trade_delegate: Address,
    lrc: Address,
}

impl JsonCodec {
    pub fn new(trade_delegate: Address, lrc: Address) -> Self {
        Self {
            trade_delegate,
            lrc,
        }
    }

    /// Parses a payload and resolves the derived fields of every order.
    pub fn decode(&self, payload: &[u8]) -> Result<SettlementBatch, CodecError> {
        let mut batch: SettlementBatch =
            serde_json::from_slice(payload).map_err(CodecError::Parse)?;

        validate_rings(&batch)?;

        for (index, order) in batch.orders.iter_mut().enumerate() {
            self.resolve(order, index as u64);
        }
        batch.hash = Some(batch.compute_hash());

        debug!(
            rings = batch.rings.len(),
            orders = batch.orders.len(),
            "Decoded submission payload"
        );

        Ok(batch)
    }

    fn resolve(&self, order: &mut OrderDescriptor, index: u64) {
        order.index = Some(index);
        order.hash = Some(order.compute_hash());
        order.delegate_contract = Some(self.trade_delegate);
        order.lrc_address = Some(order.fee_token.unwrap_or(self.lrc));
        order.sign_algorithm = Some(signing_algorithm(order.sig.as_ref()));
        order.dual_auth_sign_algorithm = Some(signing_algorithm(order.dual_auth_sig.as_ref()));
        order.valid = Some(order.amount_s > U256::ZERO && order.amount_b > U256::ZERO);
    }
}

impl SubmissionEncoder for JsonCodec {
    fn encode(&self, batch: &SettlementBatch) -> Result<Bytes, CodecError> {
        let submitted = SettlementBatch {
            rings: batch.rings.clone(),
            orders: batch
                .orders
                .iter()
                .map(OrderDescriptor::input_only)
                .collect(),
            fee_recipient: batch.fee_recipient,
            miner: batch.miner,
            transaction_origin: batch.transaction_origin,
            description: None,
            sign_algorithm: None,
            hash: None,
        };

        serde_json::to_vec(&submitted)
            .map(Bytes::from)
            .map_err(CodecError::Serialize)
    }
}

/// Orders without a signature are authorized on-chain.
fn signing_algorithm(signature: Option<&Bytes>) -> SignAlgorithm {
    if signature.is_some() {
        SignAlgorithm::Ethereum
    } else {
        SignAlgorithm::None
    }
}

fn validate_rings(batch: &SettlementBatch) -> Result<(), CodecError> {
    let orders = batch.orders.len();

    for (ring, descriptor) in batch.rings.iter().enumerate() {
        if descriptor.is_empty() {
            return Err(CodecError::EmptyRing { ring });
        }

        if let Some(index) = descriptor
            .order_indices()
            .iter()
            .find(|index| **index >= orders)
        {
            return Err(CodecError::RingIndexOutOfRange {
                ring,
                index: *index,
                orders,
            });
        }
    }

    Ok(())
}
