//! In-memory ledger that settles submitted batches with the reference ring
//! calculation and mines one block per transaction.

use alloy::primitives::{Address, Bytes, TxHash, U256, keccak256};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use super::{BlockInfo, Ledger, LedgerError, Provisioner, SubmissionReceipt};
use crate::codec::JsonCodec;
use crate::simulator::MockSimulator;
use crate::transfer::TransferRecord;

const GENESIS_BLOCK: u64 = 100;
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_TIME: u64 = 12;

type SettlementFilter = Box<dyn Fn(&mut Vec<TransferRecord>) + Send + Sync>;

/// A credit made through [`Provisioner::credit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credit {
    pub account: Address,
    pub token: Address,
    pub amount: U256,
}

struct Chain {
    head: BlockInfo,
    events: Vec<(u64, TransferRecord)>,
    credits: Vec<Credit>,
    submissions: usize,
}

impl Chain {
    fn mine(&mut self, transfers: impl IntoIterator<Item = TransferRecord>) -> SubmissionReceipt {
        self.head = BlockInfo {
            number: self.head.number + 1,
            timestamp: self.head.timestamp + BLOCK_TIME,
        };

        let number = self.head.number;
        self.events
            .extend(transfers.into_iter().map(|transfer| (number, transfer)));

        SubmissionReceipt {
            tx_hash: block_tx_hash(number),
            block_number: number,
        }
    }
}

fn block_tx_hash(block: u64) -> TxHash {
    keccak256(block.to_be_bytes())
}

pub struct MockLedger {
    codec: JsonCodec,
    chain: Mutex<Chain>,
    settlement_filter: Option<SettlementFilter>,
    failing_tokens: HashSet<Address>,
}

impl MockLedger {
    pub fn new(codec: JsonCodec) -> Self {
        Self {
            codec,
            chain: Mutex::new(Chain {
                head: BlockInfo {
                    number: GENESIS_BLOCK,
                    timestamp: GENESIS_TIMESTAMP,
                },
                events: Vec::new(),
                credits: Vec::new(),
                submissions: 0,
            }),
            settlement_filter: None,
            failing_tokens: HashSet::new(),
        }
    }

    /// Rewrites the transfers each settlement emits, standing in for a
    /// contract that diverges from the reference calculation.
    #[must_use]
    pub fn with_settlement_filter(
        mut self,
        filter: impl Fn(&mut Vec<TransferRecord>) + Send + Sync + 'static,
    ) -> Self {
        self.settlement_filter = Some(Box::new(filter));
        self
    }

    /// Makes every event query for `token` fail.
    #[must_use]
    pub fn with_failing_token(mut self, token: Address) -> Self {
        self.failing_tokens.insert(token);
        self
    }

    pub fn credits(&self) -> Vec<Credit> {
        self.chain.lock().unwrap().credits.clone()
    }

    pub fn submissions(&self) -> usize {
        self.chain.lock().unwrap().submissions
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn latest_block(&self) -> Result<BlockInfo, LedgerError> {
        Ok(self.chain.lock().unwrap().head)
    }

    async fn submit(&self, payload: Bytes) -> Result<SubmissionReceipt, LedgerError> {
        let mut chain = self.chain.lock().unwrap();
        chain.submissions += 1;

        let reverted = || LedgerError::Reverted {
            tx_hash: block_tx_hash(chain.head.number + 1),
        };

        let batch = self.codec.decode(&payload).map_err(|_| reverted())?;
        let mut transfers = MockSimulator::predict(&batch)
            .map_err(|_| reverted())?
            .transfers;

        if let Some(filter) = &self.settlement_filter {
            filter(&mut transfers);
        }

        Ok(chain.mine(transfers))
    }

    async fn transfer_events(
        &self,
        token: Address,
        from_block: u64,
    ) -> Result<Vec<TransferRecord>, LedgerError> {
        if self.failing_tokens.contains(&token) {
            return Err(LedgerError::Unavailable(format!(
                "log query for {token} timed out"
            )));
        }

        let chain = self.chain.lock().unwrap();

        Ok(chain
            .events
            .iter()
            .filter(|(block, transfer)| *block >= from_block && transfer.token == token)
            .map(|(_, transfer)| *transfer)
            .collect())
    }
}

#[async_trait]
impl Provisioner for MockLedger {
    async fn credit(
        &self,
        account: Address,
        token: Address,
        amount: U256,
    ) -> Result<SubmissionReceipt, LedgerError> {
        let mut chain = self.chain.lock().unwrap();

        chain.credits.push(Credit {
            account,
            token,
            amount,
        });

        Ok(chain.mine([TransferRecord {
            token,
            from: Address::ZERO,
            to: account,
            amount,
        }]))
    }
}
