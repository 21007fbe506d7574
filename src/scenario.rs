//! Scenario definitions and batch construction.
//!
//! A scenario names its participants by position in the configured account
//! list and its tokens by symbol. Amounts are decimal strings in whole
//! tokens and are scaled to 18 decimals when the batch is described.

use alloy::primitives::utils::{ParseUnits, UnitsError, parse_units};
use alloy::primitives::{Address, U256};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::batch::{OrderDescriptor, RingDescriptor, SettlementBatch, SignAlgorithm};
use crate::ledger::BlockInfo;
use crate::tolerance::TOKEN_DECIMALS;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("order {order} references unknown token {symbol}")]
    UnknownToken { order: usize, symbol: String },
    #[error("order {order} references account {index} but only {accounts} are configured")]
    UnknownAccount {
        order: usize,
        index: usize,
        accounts: usize,
    },
    #[error("order {order} has an invalid {field}: {source}")]
    InvalidAmount {
        order: usize,
        field: &'static str,
        #[source]
        source: UnitsError,
    },
    #[error("order {order} has a negative {field}")]
    NegativeAmount { order: usize, field: &'static str },
    #[error("ring {ring} is empty")]
    EmptyRing { ring: usize },
    #[error("ring {ring} references order {index} but the scenario has {orders} orders")]
    RingIndexOutOfRange {
        ring: usize,
        index: usize,
        orders: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub description: String,
    pub orders: Vec<ScenarioOrder>,
    pub rings: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioOrder {
    /// Index into the configured accounts.
    pub owner: usize,
    pub token_s: String,
    pub token_b: String,
    pub amount_s: String,
    pub amount_b: String,
    #[serde(default)]
    pub fee_token: Option<String>,
    #[serde(default)]
    pub fee_amount: Option<String>,
    #[serde(default)]
    pub all_or_none: bool,
    /// Index into the configured accounts of the wallet sharing the fee.
    #[serde(default)]
    pub wallet: Option<usize>,
    /// Seconds after the current block the order stays valid.
    #[serde(default)]
    pub valid_for: Option<u64>,
}

/// Addresses and parameters shared by every scenario of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub tokens: BTreeMap<String, Address>,
    pub accounts: Vec<Address>,
    pub lrc: Address,
    pub fee_recipient: Address,
    pub miner: Option<Address>,
    pub transaction_origin: Address,
    pub wallet_split_percentage: u16,
}

impl Deployment {
    /// Every token whose `Transfer` events can belong to a settlement.
    pub fn harvest_tokens(&self) -> Vec<Address> {
        let mut tokens: Vec<Address> = self
            .tokens
            .values()
            .copied()
            .chain(std::iter::once(self.lrc))
            .collect();
        tokens.sort_unstable();
        tokens.dedup();
        tokens
    }

    fn token(&self, order: usize, symbol: &str) -> Result<Address, ScenarioError> {
        self.tokens
            .get(symbol)
            .copied()
            .ok_or_else(|| ScenarioError::UnknownToken {
                order,
                symbol: symbol.to_string(),
            })
    }

    fn account(&self, order: usize, index: usize) -> Result<Address, ScenarioError> {
        self.accounts
            .get(index)
            .copied()
            .ok_or(ScenarioError::UnknownAccount {
                order,
                index,
                accounts: self.accounts.len(),
            })
    }
}

/// Chain state a batch is described against.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeContext<'a> {
    pub deployment: &'a Deployment,
    pub block: BlockInfo,
}

impl Scenario {
    /// Checks every reference the scenario makes without a live chain.
    pub fn validate(&self, deployment: &Deployment) -> Result<(), ScenarioError> {
        let context = RuntimeContext {
            deployment,
            block: BlockInfo {
                number: 0,
                timestamp: 0,
            },
        };

        describe(self, &context).map(|_| ())
    }
}

/// Builds the batch a scenario submits at the context's block.
pub fn describe(
    scenario: &Scenario,
    context: &RuntimeContext<'_>,
) -> Result<SettlementBatch, ScenarioError> {
    let deployment = context.deployment;

    let orders = scenario
        .orders
        .iter()
        .enumerate()
        .map(|(index, order)| describe_order(index, order, context))
        .collect::<Result<Vec<_>, _>>()?;

    let rings = scenario
        .rings
        .iter()
        .enumerate()
        .map(|(ring, indices)| {
            if indices.is_empty() {
                return Err(ScenarioError::EmptyRing { ring });
            }

            match indices.iter().find(|index| **index >= orders.len()) {
                Some(index) => Err(ScenarioError::RingIndexOutOfRange {
                    ring,
                    index: *index,
                    orders: orders.len(),
                }),
                None => Ok(RingDescriptor::new(indices.clone())),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut batch = SettlementBatch {
        rings,
        orders,
        fee_recipient: deployment.fee_recipient,
        miner: deployment.miner,
        transaction_origin: deployment.transaction_origin,
        description: Some(scenario.description.clone()),
        sign_algorithm: Some(SignAlgorithm::Ethereum),
        hash: None,
    };
    batch.hash = Some(batch.compute_hash());

    Ok(batch)
}

fn describe_order(
    index: usize,
    order: &ScenarioOrder,
    context: &RuntimeContext<'_>,
) -> Result<OrderDescriptor, ScenarioError> {
    let deployment = context.deployment;
    let timestamp = context.block.timestamp;

    let fee_token = order
        .fee_token
        .as_deref()
        .map(|symbol| deployment.token(index, symbol))
        .transpose()?;

    let fee_amount = order
        .fee_amount
        .as_deref()
        .map(|amount| parse_amount(index, "feeAmount", amount))
        .transpose()?
        .unwrap_or_default();

    let wallet_addr = order
        .wallet
        .map(|wallet| deployment.account(index, wallet))
        .transpose()?;

    Ok(OrderDescriptor {
        owner: deployment.account(index, order.owner)?,
        token_s: deployment.token(index, &order.token_s)?,
        token_b: deployment.token(index, &order.token_b)?,
        amount_s: parse_amount(index, "amountS", &order.amount_s)?,
        amount_b: parse_amount(index, "amountB", &order.amount_b)?,
        valid_since: timestamp,
        valid_until: order.valid_for.map(|seconds| timestamp.saturating_add(seconds)),
        wallet_addr,
        fee_token,
        fee_amount,
        wallet_split_percentage: deployment.wallet_split_percentage,
        all_or_none: order.all_or_none,
        ..OrderDescriptor::default()
    })
}

fn parse_amount(order: usize, field: &'static str, amount: &str) -> Result<U256, ScenarioError> {
    match parse_units(amount, TOKEN_DECIMALS) {
        Ok(ParseUnits::U256(value)) => Ok(value),
        Ok(ParseUnits::I256(_)) => Err(ScenarioError::NegativeAmount { order, field }),
        Err(source) => Err(ScenarioError::InvalidAmount {
            order,
            field,
            source,
        }),
    }
}
