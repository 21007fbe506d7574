//! Canonical transfer records and multiset reconciliation.
//!
//! Neither the simulator nor the event log guarantees an order, so both
//! transfer lists are sorted with [`canonical_cmp`] and then compared
//! position by position. Duplicate records are allowed and must occur the
//! same number of times on both sides.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Display;
use tracing::debug;

use crate::tolerance::{Precision, ToleranceViolation, amounts_match, display_amount};

/// One token movement, either predicted by the simulator or observed in a
/// `Transfer` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferRecord {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

impl Display for TransferRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} from {} to {}",
            display_amount(self.amount),
            self.token,
            self.from,
            self.to
        )
    }
}

/// Sort key: checksummed address strings compared case-sensitively, then
/// the amount numerically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CanonicalKey {
    token: String,
    from: String,
    to: String,
    amount: U256,
}

impl TransferRecord {
    fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey {
            token: self.token.to_checksum(None),
            from: self.from.to_checksum(None),
            to: self.to.to_checksum(None),
            amount: self.amount,
        }
    }

    /// Names the first of token, sender and recipient that differs. These
    /// must match exactly, only the amount is compared with tolerance.
    fn route_mismatch(&self, other: &Self) -> Option<&'static str> {
        let (left, right) = (self.canonical_key(), other.canonical_key());

        if left.token != right.token {
            Some("token")
        } else if left.from != right.from {
            Some("from")
        } else if left.to != right.to {
            Some("to")
        } else {
            None
        }
    }
}

/// Total order over transfer records: token, then sender, then recipient,
/// then amount.
pub fn canonical_cmp(left: &TransferRecord, right: &TransferRecord) -> Ordering {
    left.canonical_key().cmp(&right.canonical_key())
}

pub fn canonical_sort(mut transfers: Vec<TransferRecord>) -> Vec<TransferRecord> {
    transfers.sort_by_cached_key(TransferRecord::canonical_key);
    transfers
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferSetMismatch {
    #[error("transfer count mismatch: predicted {predicted}, observed {observed}")]
    Length { predicted: usize, observed: usize },
    #[error("transfer {index} differs in {field}: predicted {predicted}, observed {observed}")]
    Route {
        index: usize,
        field: &'static str,
        predicted: TransferRecord,
        observed: TransferRecord,
    },
    #[error("transfer {index} amount out of tolerance: {violation}")]
    Amount {
        index: usize,
        #[source]
        violation: ToleranceViolation,
    },
}

/// Requires the predicted and observed transfer multisets to be equal:
/// same length, and after canonical sorting, identical token, sender and
/// recipient at every position with amounts equal within `precision`.
pub fn reconcile_transfers(
    predicted: &[TransferRecord],
    observed: &[TransferRecord],
    precision: Precision,
) -> Result<(), TransferSetMismatch> {
    let predicted = canonical_sort(predicted.to_vec());
    let observed = canonical_sort(observed.to_vec());

    if predicted.len() != observed.len() {
        debug!(?predicted, ?observed, "Transfer sets differ in length");
        return Err(TransferSetMismatch::Length {
            predicted: predicted.len(),
            observed: observed.len(),
        });
    }

    for (index, (expected, actual)) in predicted.iter().zip(&observed).enumerate() {
        if let Some(field) = expected.route_mismatch(actual) {
            return Err(TransferSetMismatch::Route {
                index,
                field,
                predicted: *expected,
                observed: *actual,
            });
        }

        amounts_match(expected.amount, actual.amount, precision)
            .map_err(|violation| TransferSetMismatch::Amount { index, violation })?;
    }

    Ok(())
}
