//! Settlement simulation oracle.
//!
//! The simulator is an external collaborator: it parses submission
//! payloads with its own decoder and predicts the token transfers a batch
//! will produce. [`HttpSimulator`] talks to an oracle service, while the
//! `test-support` [`MockSimulator`] runs a reference ring calculation in
//! process.

use alloy::primitives::{Bytes, U256};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::SettlementBatch;
use crate::codec::CodecError;
use crate::transfer::TransferRecord;

mod http;
#[cfg(any(test, feature = "test-support"))]
mod mock;

pub use http::HttpSimulator;
#[cfg(any(test, feature = "test-support"))]
pub use mock::MockSimulator;

#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("simulator API error (status {status}): {message}")]
    ApiError { status: StatusCode, message: String },
    #[error("simulator could not decode payload: {0}")]
    Codec(#[from] CodecError),
    #[error("ring {ring} cannot be simulated: {reason}")]
    InvalidRing { ring: usize, reason: String },
}

/// Fill details the simulator computed for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFill {
    pub order: usize,
    pub fill_amount_s: U256,
    pub fill_amount_b: U256,
    pub fill_amount_fee: U256,
    pub split_s: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub transfers: Vec<TransferRecord>,
    pub fills: Vec<OrderFill>,
}

impl SimulationReport {
    pub fn is_fully_unfilled(&self) -> bool {
        self.fills.iter().all(|fill| fill.fill_amount_s.is_zero())
    }
}

#[async_trait]
pub trait SettlementSimulator: Send + Sync {
    /// Reconstructs a batch from a submission payload.
    ///
    /// The batch comes back untyped, exactly as the parser produced it, so
    /// keys it added or dropped are still visible to
    /// [`diff_parsed`](crate::diff::diff_parsed).
    async fn deserialize(&self, payload: &Bytes) -> Result<Value, SimulatorError>;

    async fn simulate(&self, batch: &SettlementBatch) -> Result<SimulationReport, SimulatorError>;
}
