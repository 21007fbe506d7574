//! Ledger access: block queries, ring submission, transfer event queries
//! and test-token provisioning.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::PendingTransactionError;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;

use crate::transfer::TransferRecord;

mod evm;
#[cfg(any(test, feature = "test-support"))]
mod mock;

pub use evm::EvmLedger;
#[cfg(any(test, feature = "test-support"))]
pub use mock::{Credit, MockLedger};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("transaction error: {0}")]
    Transaction(#[from] PendingTransactionError),
    #[error("transport error: {0}")]
    Transport(#[from] RpcError<TransportErrorKind>),
    #[error("transaction reverted: {tx_hash}")]
    Reverted { tx_hash: TxHash },
    #[error("receipt for {tx_hash} has no block number")]
    Unmined { tx_hash: TxHash },
    #[error("latest block is not available")]
    MissingLatestBlock,
    #[error("failed to decode Transfer log: {0}")]
    LogDecode(#[from] alloy::sol_types::Error),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn latest_block(&self) -> Result<BlockInfo, LedgerError>;

    /// Submits an encoded batch to the ring submitter and waits for it to be
    /// mined. A reverted transaction is an error.
    async fn submit(&self, payload: Bytes) -> Result<SubmissionReceipt, LedgerError>;

    /// Every `Transfer` event emitted by `token` from `from_block` through
    /// the latest block.
    async fn transfer_events(
        &self,
        token: Address,
        from_block: u64,
    ) -> Result<Vec<TransferRecord>, LedgerError>;
}

/// Tops up account balances before a scenario runs.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn credit(
        &self,
        account: Address,
        token: Address,
        amount: U256,
    ) -> Result<SubmissionReceipt, LedgerError>;
}
