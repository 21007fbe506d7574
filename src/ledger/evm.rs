//! [`Ledger`] and [`Provisioner`] backed by an alloy provider with an
//! embedded signing wallet.

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, WalletProvider};
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use tracing::debug;

use super::{BlockInfo, Ledger, LedgerError, Provisioner, SubmissionReceipt};
use crate::bindings::{IERC20, IRingSubmitter, ITestToken};
use crate::harvest::decode_transfer_logs;
use crate::transfer::TransferRecord;

pub struct EvmLedger<P> {
    provider: P,
    ring_submitter: Address,
    required_confirmations: u64,
}

impl<P> EvmLedger<P>
where
    P: Provider + WalletProvider + Send + Sync,
{
    pub fn new(provider: P, ring_submitter: Address, required_confirmations: u64) -> Self {
        Self {
            provider,
            ring_submitter,
            required_confirmations,
        }
    }

    pub fn signer(&self) -> Address {
        self.provider.default_signer_address()
    }

    async fn send(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<SubmissionReceipt, LedgerError> {
        debug!(%contract, note, "Submitting contract call");

        let tx = TransactionRequest::default()
            .to(contract)
            .input(calldata.into());

        let pending = self.provider.send_transaction(tx).await?;

        debug!(tx_hash = %pending.tx_hash(), note, "Transaction submitted");

        let receipt = pending
            .with_required_confirmations(self.required_confirmations)
            .get_receipt()
            .await?;

        if !receipt.status() {
            return Err(LedgerError::Reverted {
                tx_hash: receipt.transaction_hash,
            });
        }

        let block_number = receipt.block_number.ok_or(LedgerError::Unmined {
            tx_hash: receipt.transaction_hash,
        })?;

        debug!(tx_hash = %receipt.transaction_hash, block_number, note, "Transaction confirmed");

        Ok(SubmissionReceipt {
            tx_hash: receipt.transaction_hash,
            block_number,
        })
    }
}

#[async_trait]
impl<P> Ledger for EvmLedger<P>
where
    P: Provider + WalletProvider + Send + Sync,
{
    async fn latest_block(&self) -> Result<BlockInfo, LedgerError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or(LedgerError::MissingLatestBlock)?;

        Ok(BlockInfo {
            number: block.header.number,
            timestamp: block.header.timestamp,
        })
    }

    async fn submit(&self, payload: Bytes) -> Result<SubmissionReceipt, LedgerError> {
        let calldata = IRingSubmitter::submitRingsCall { data: payload }.abi_encode();

        self.send(self.ring_submitter, calldata.into(), "submitRings")
            .await
    }

    async fn transfer_events(
        &self,
        token: Address,
        from_block: u64,
    ) -> Result<Vec<TransferRecord>, LedgerError> {
        let filter = Filter::new()
            .address(token)
            .from_block(from_block)
            .event_signature(IERC20::Transfer::SIGNATURE_HASH);

        let logs = self.provider.get_logs(&filter).await?;

        debug!(%token, from_block, count = logs.len(), "Fetched Transfer logs");

        decode_transfer_logs(token, &logs)
    }
}

#[async_trait]
impl<P> Provisioner for EvmLedger<P>
where
    P: Provider + WalletProvider + Send + Sync,
{
    async fn credit(
        &self,
        account: Address,
        token: Address,
        amount: U256,
    ) -> Result<SubmissionReceipt, LedgerError> {
        let calldata = ITestToken::mintCall {
            to: account,
            amount,
        }
        .abi_encode();

        self.send(token, calldata.into(), "mint").await
    }
}
