//! Transfer event harvesting.
//!
//! Every token is queried concurrently, but the result is all-or-nothing:
//! a single failed query fails the harvest, so reconciliation never runs
//! against a partial transfer set.

use alloy::primitives::Address;
use alloy::rpc::types::Log;
use futures_util::future::try_join_all;
use itertools::Itertools;
use tracing::debug;

use crate::bindings::IERC20;
use crate::ledger::{Ledger, LedgerError};
use crate::transfer::TransferRecord;

#[derive(Debug, thiserror::Error)]
#[error("failed to retrieve Transfer events for token {token}: {source}")]
pub struct HarvestError {
    pub token: Address,
    #[source]
    pub source: LedgerError,
}

/// Collects the `Transfer` events of every token in `tokens` emitted from
/// `from_block` onwards.
#[tracing::instrument(skip(ledger, tokens), fields(tokens = tokens.len()))]
pub async fn harvest_transfers<L: Ledger + ?Sized>(
    ledger: &L,
    tokens: &[Address],
    from_block: u64,
) -> Result<Vec<TransferRecord>, HarvestError> {
    let queries = tokens.iter().unique().map(|token| async move {
        ledger
            .transfer_events(*token, from_block)
            .await
            .map_err(|source| HarvestError {
                token: *token,
                source,
            })
    });

    let transfers: Vec<TransferRecord> = try_join_all(queries)
        .await?
        .into_iter()
        .flatten()
        .collect();

    debug!(count = transfers.len(), "Harvested Transfer events");

    Ok(transfers)
}

/// Decodes raw `Transfer` logs emitted by `token` in chain order.
pub fn decode_transfer_logs(
    token: Address,
    logs: &[Log],
) -> Result<Vec<TransferRecord>, LedgerError> {
    logs.iter()
        .sorted_by_key(|log| (log.block_number, log.log_index))
        .map(|log| {
            let decoded = log.log_decode::<IERC20::Transfer>()?;
            let event = decoded.data();

            Ok(TransferRecord {
                token,
                from: event.from,
                to: event.to,
                amount: event.value,
            })
        })
        .collect()
}
