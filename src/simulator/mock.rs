//! In-process simulator running a reference ring calculation.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde_json::Value;

use super::{OrderFill, SettlementSimulator, SimulationReport, SimulatorError};
use crate::batch::{OrderDescriptor, SettlementBatch};
use crate::codec::{CodecError, JsonCodec};
use crate::transfer::TransferRecord;

type Tamper = Box<dyn Fn(&mut SettlementBatch) + Send + Sync>;
type WireTamper = Box<dyn Fn(&mut Value) + Send + Sync>;

/// Decodes with [`JsonCodec`] and settles each ring proportionally.
///
/// Each order sells at most its `amountS` and the order after it in the
/// ring receives at most its `amountB`, both at the order's own price. A
/// ring containing an `allOrNone` order that cannot be filled completely
/// settles nothing.
pub struct MockSimulator {
    codec: JsonCodec,
    tamper: Option<Tamper>,
    wire_tamper: Option<WireTamper>,
}

impl MockSimulator {
    pub fn new(codec: JsonCodec) -> Self {
        Self {
            codec,
            tamper: None,
            wire_tamper: None,
        }
    }

    /// Applies `tamper` to every decoded batch, standing in for a parser
    /// that loses or corrupts fields.
    #[must_use]
    pub fn with_tamper(
        mut self,
        tamper: impl Fn(&mut SettlementBatch) + Send + Sync + 'static,
    ) -> Self {
        self.tamper = Some(Box::new(tamper));
        self
    }

    /// Applies `tamper` to the JSON the parser answers with, for faults a
    /// typed batch cannot express such as added or missing keys.
    #[must_use]
    pub fn with_wire_tamper(mut self, tamper: impl Fn(&mut Value) + Send + Sync + 'static) -> Self {
        self.wire_tamper = Some(Box::new(tamper));
        self
    }

    pub fn predict(batch: &SettlementBatch) -> Result<SimulationReport, SimulatorError> {
        let mut report = SimulationReport::default();

        for (ring, descriptor) in batch.rings.iter().enumerate() {
            let orders = descriptor
                .order_indices()
                .iter()
                .map(|index| {
                    batch
                        .orders
                        .get(*index)
                        .map(|order| (*index, order))
                        .ok_or_else(|| SimulatorError::InvalidRing {
                            ring,
                            reason: format!("order {index} does not exist"),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            settle_ring(ring, &orders, batch.fee_recipient, &mut report)?;
        }

        Ok(report)
    }
}

#[async_trait]
impl SettlementSimulator for MockSimulator {
    async fn deserialize(&self, payload: &Bytes) -> Result<Value, SimulatorError> {
        let mut batch = self.codec.decode(payload)?;

        if let Some(tamper) = &self.tamper {
            tamper(&mut batch);
        }

        let mut parsed = serde_json::to_value(&batch).map_err(CodecError::Serialize)?;

        if let Some(tamper) = &self.wire_tamper {
            tamper(&mut parsed);
        }

        Ok(parsed)
    }

    async fn simulate(&self, batch: &SettlementBatch) -> Result<SimulationReport, SimulatorError> {
        Self::predict(batch)
    }
}

fn settle_ring(
    ring: usize,
    orders: &[(usize, &OrderDescriptor)],
    fee_recipient: Address,
    report: &mut SimulationReport,
) -> Result<(), SimulatorError> {
    let len = orders.len();
    let overflow = || SimulatorError::InvalidRing {
        ring,
        reason: "fill amount overflows".to_string(),
    };

    for (position, (index, order)) in orders.iter().enumerate() {
        let (next_index, next) = orders[(position + 1) % len];
        if order.token_s != next.token_b {
            return Err(SimulatorError::InvalidRing {
                ring,
                reason: format!(
                    "order {index} sells {} but order {next_index} buys {}",
                    order.token_s, next.token_b
                ),
            });
        }
    }

    let mut fill_s: Vec<U256> = orders
        .iter()
        .map(|(_, order)| {
            if order.valid == Some(false) {
                U256::ZERO
            } else {
                order.amount_s
            }
        })
        .collect();

    // Fills only shrink, so this settles within a few passes.
    for _ in 0..=2 * len {
        let mut changed = false;

        for position in 0..len {
            let next = (position + 1) % len;
            let (_, next_order) = orders[next];
            let wanted = at_price(fill_s[next], next_order.amount_b, next_order.amount_s)
                .ok_or_else(overflow)?;

            if fill_s[position] > wanted {
                fill_s[position] = wanted;
                changed = true;
            } else if fill_s[position] < wanted {
                fill_s[next] = at_price(
                    fill_s[position],
                    next_order.amount_s,
                    next_order.amount_b,
                )
                .ok_or_else(overflow)?;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    let incomplete_all_or_none = orders
        .iter()
        .zip(&fill_s)
        .any(|((_, order), fill)| order.all_or_none && *fill < order.amount_s);

    if incomplete_all_or_none {
        fill_s.iter_mut().for_each(|fill| *fill = U256::ZERO);
    }

    for (position, (index, order)) in orders.iter().enumerate() {
        let previous = (position + len - 1) % len;
        let (_, next) = orders[(position + 1) % len];
        let sold = fill_s[position];

        let fee = if order.amount_s.is_zero() {
            U256::ZERO
        } else {
            order
                .fee_amount
                .checked_mul(sold)
                .ok_or_else(overflow)?
                / order.amount_s
        };

        report.fills.push(OrderFill {
            order: *index,
            fill_amount_s: sold,
            fill_amount_b: fill_s[previous],
            fill_amount_fee: fee,
            split_s: U256::ZERO,
        });

        if !sold.is_zero() {
            report.transfers.push(TransferRecord {
                token: order.token_s,
                from: order.owner,
                to: next.token_recipient.unwrap_or(next.owner),
                amount: sold,
            });
        }

        push_fee_transfers(order, fee, fee_recipient, &mut report.transfers);
    }

    Ok(())
}

/// Converts `amount` of one side of an order into the other side at the
/// order's price, rounding down.
fn at_price(amount: U256, numerator: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return Some(U256::ZERO);
    }

    amount
        .checked_mul(numerator)
        .map(|scaled| scaled / denominator)
}

fn push_fee_transfers(
    order: &OrderDescriptor,
    fee: U256,
    fee_recipient: Address,
    transfers: &mut Vec<TransferRecord>,
) {
    let Some(token) = order.lrc_address.or(order.fee_token) else {
        return;
    };

    let wallet_share = match order.wallet_addr {
        Some(_) => fee * U256::from(order.wallet_split_percentage.min(100)) / U256::from(100),
        None => U256::ZERO,
    };
    let recipient_share = fee - wallet_share;

    if !recipient_share.is_zero() {
        transfers.push(TransferRecord {
            token,
            from: order.owner,
            to: fee_recipient,
            amount: recipient_share,
        });
    }

    if let Some(wallet) = order.wallet_addr.filter(|_| !wallet_share.is_zero()) {
        transfers.push(TransferRecord {
            token,
            from: order.owner,
            to: wallet,
            amount: wallet_share,
        });
    }
}
