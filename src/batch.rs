//! Settlement batch data model: orders, rings and the batch context.
//!
//! Each record declares its comparable schema next to its definition. Every
//! schema field carries a [`FieldRole`]: fields are compared by default and
//! only fields explicitly tagged `InputOnly` or `DerivedOnly` are skipped by
//! the structural diff, so a field added later is compared until someone
//! decides otherwise.

use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// How a schema field takes part in structural comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Present on both representations and compared exactly.
    Compared,
    /// Only meaningful on the freshly described batch (consumed while
    /// encoding, absent or regenerated after decoding).
    InputOnly,
    /// Only produced by decoding, simulation or on-chain resolution.
    DerivedOnly,
}

impl FieldRole {
    pub const fn is_compared(self) -> bool {
        matches!(self, Self::Compared)
    }
}

macro_rules! field_schema {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $key:literal $(as $role:ident)?,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant,)*];

            /// Key of the field in the submission payload.
            pub const fn key(self) -> &'static str {
                match self {
                    $(Self::$variant => $key,)*
                }
            }

            /// Schema field carrying `key`, if any.
            pub fn from_key(key: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|field| field.key() == key)
            }

            pub const fn role(self) -> FieldRole {
                match self {
                    $(Self::$variant => field_schema!(@role $($role)?),)*
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.key())
            }
        }
    };
    (@role) => { FieldRole::Compared };
    (@role $role:ident) => { FieldRole::$role };
}

field_schema! {
    /// Top-level fields of a [`SettlementBatch`].
    pub enum BatchField {
        Rings => "rings",
        Orders => "orders",
        FeeRecipient => "feeRecipient",
        Miner => "miner",
        TransactionOrigin => "transactionOrigin",
        Description => "description" as InputOnly,
        SignAlgorithm => "signAlgorithm" as InputOnly,
        Hash => "hash" as DerivedOnly,
    }
}

field_schema! {
    /// Fields of an [`OrderDescriptor`].
    pub enum OrderField {
        Owner => "owner",
        TokenS => "tokenS",
        TokenB => "tokenB",
        AmountS => "amountS",
        AmountB => "amountB",
        ValidSince => "validSince",
        ValidUntil => "validUntil",
        Broker => "broker",
        DualAuthAddr => "dualAuthAddr",
        OrderInterceptor => "orderInterceptor",
        WalletAddr => "walletAddr",
        TokenRecipient => "tokenRecipient",
        FeeToken => "feeToken",
        FeeAmount => "feeAmount",
        FeePercentage => "feePercentage",
        TokenSFeePercentage => "tokenSFeePercentage",
        TokenBFeePercentage => "tokenBFeePercentage",
        WalletSplitPercentage => "walletSplitPercentage",
        AllOrNone => "allOrNone",
        Sig => "sig",
        DualAuthSig => "dualAuthSig",
        FillAmountS => "fillAmountS" as DerivedOnly,
        FillAmountB => "fillAmountB" as DerivedOnly,
        FillAmountFee => "fillAmountFee" as DerivedOnly,
        SplitS => "splitS" as DerivedOnly,
        Valid => "valid" as DerivedOnly,
        Hash => "hash" as DerivedOnly,
        DelegateContract => "delegateContract" as DerivedOnly,
        SignAlgorithm => "signAlgorithm" as DerivedOnly,
        DualAuthSignAlgorithm => "dualAuthSignAlgorithm" as DerivedOnly,
        Index => "index" as DerivedOnly,
        LrcAddress => "lrcAddress" as DerivedOnly,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignAlgorithm {
    #[default]
    Ethereum,
    Eip712,
    None,
}

impl Display for SignAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ethereum => write!(f, "ethereum"),
            Self::Eip712 => write!(f, "eip712"),
            Self::None => write!(f, "none"),
        }
    }
}

/// A scalar field value as seen by the structural diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Absent,
    Address(Address),
    Amount(U256),
    Number(u64),
    Flag(bool),
    Bytes(Bytes),
    Hash(B256),
    Text(String),
    Algorithm(SignAlgorithm),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "<absent>"),
            Self::Address(address) => write!(f, "{address}"),
            Self::Amount(amount) => write!(f, "{amount}"),
            Self::Number(number) => write!(f, "{number}"),
            Self::Flag(flag) => write!(f, "{flag}"),
            Self::Bytes(bytes) => write!(f, "{bytes}"),
            Self::Hash(hash) => write!(f, "{hash}"),
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Algorithm(algorithm) => write!(f, "{algorithm}"),
        }
    }
}

impl From<Address> for FieldValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<U256> for FieldValue {
    fn from(value: U256) -> Self {
        Self::Amount(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        Self::Number(u64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<Bytes> for FieldValue {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<B256> for FieldValue {
    fn from(value: B256) -> Self {
        Self::Hash(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<SignAlgorithm> for FieldValue {
    fn from(value: SignAlgorithm) -> Self {
        Self::Algorithm(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}

/// A single resting order.
///
/// Fields below `fill_amount_s` are derived: they are filled in by the
/// simulator's parser or by on-chain resolution and are never part of the
/// submission payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDescriptor {
    pub owner: Address,
    pub token_s: Address,
    pub token_b: Address,
    pub amount_s: U256,
    pub amount_b: U256,
    pub valid_since: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dual_auth_addr: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_interceptor: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_addr: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_recipient: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_token: Option<Address>,
    #[serde(default)]
    pub fee_amount: U256,
    #[serde(default)]
    pub fee_percentage: u16,
    #[serde(default, rename = "tokenSFeePercentage")]
    pub token_s_fee_percentage: u16,
    #[serde(default, rename = "tokenBFeePercentage")]
    pub token_b_fee_percentage: u16,
    #[serde(default)]
    pub wallet_split_percentage: u16,
    #[serde(default)]
    pub all_or_none: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dual_auth_sig: Option<Bytes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_amount_s: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_amount_b: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_amount_fee: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_s: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_contract: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_algorithm: Option<SignAlgorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dual_auth_sign_algorithm: Option<SignAlgorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lrc_address: Option<Address>,
}

impl OrderDescriptor {
    pub fn field(&self, field: OrderField) -> FieldValue {
        match field {
            OrderField::Owner => self.owner.into(),
            OrderField::TokenS => self.token_s.into(),
            OrderField::TokenB => self.token_b.into(),
            OrderField::AmountS => self.amount_s.into(),
            OrderField::AmountB => self.amount_b.into(),
            OrderField::ValidSince => self.valid_since.into(),
            OrderField::ValidUntil => self.valid_until.into(),
            OrderField::Broker => self.broker.into(),
            OrderField::DualAuthAddr => self.dual_auth_addr.into(),
            OrderField::OrderInterceptor => self.order_interceptor.into(),
            OrderField::WalletAddr => self.wallet_addr.into(),
            OrderField::TokenRecipient => self.token_recipient.into(),
            OrderField::FeeToken => self.fee_token.into(),
            OrderField::FeeAmount => self.fee_amount.into(),
            OrderField::FeePercentage => self.fee_percentage.into(),
            OrderField::TokenSFeePercentage => self.token_s_fee_percentage.into(),
            OrderField::TokenBFeePercentage => self.token_b_fee_percentage.into(),
            OrderField::WalletSplitPercentage => self.wallet_split_percentage.into(),
            OrderField::AllOrNone => self.all_or_none.into(),
            OrderField::Sig => self.sig.clone().into(),
            OrderField::DualAuthSig => self.dual_auth_sig.clone().into(),
            OrderField::FillAmountS => self.fill_amount_s.into(),
            OrderField::FillAmountB => self.fill_amount_b.into(),
            OrderField::FillAmountFee => self.fill_amount_fee.into(),
            OrderField::SplitS => self.split_s.into(),
            OrderField::Valid => self.valid.into(),
            OrderField::Hash => self.hash.into(),
            OrderField::DelegateContract => self.delegate_contract.into(),
            OrderField::SignAlgorithm => self.sign_algorithm.into(),
            OrderField::DualAuthSignAlgorithm => self.dual_auth_sign_algorithm.into(),
            OrderField::Index => self.index.into(),
            OrderField::LrcAddress => self.lrc_address.into(),
        }
    }

    /// Copy of the order without any derived field, as it is submitted.
    pub fn input_only(&self) -> Self {
        Self {
            fill_amount_s: None,
            fill_amount_b: None,
            fill_amount_fee: None,
            split_s: None,
            valid: None,
            hash: None,
            delegate_contract: None,
            sign_algorithm: None,
            dual_auth_sign_algorithm: None,
            index: None,
            lrc_address: None,
            ..self.clone()
        }
    }

    /// Keccak-256 over the order's input fields.
    pub fn compute_hash(&self) -> B256 {
        let mut preimage = Vec::with_capacity(512);

        preimage.extend_from_slice(self.owner.as_slice());
        preimage.extend_from_slice(self.token_s.as_slice());
        preimage.extend_from_slice(self.token_b.as_slice());
        preimage.extend_from_slice(&self.amount_s.to_be_bytes::<32>());
        preimage.extend_from_slice(&self.amount_b.to_be_bytes::<32>());
        preimage.extend_from_slice(&self.valid_since.to_be_bytes());
        preimage.extend_from_slice(&self.valid_until.unwrap_or_default().to_be_bytes());

        for address in [
            self.broker,
            self.dual_auth_addr,
            self.order_interceptor,
            self.wallet_addr,
            self.token_recipient,
            self.fee_token,
        ] {
            preimage.extend_from_slice(address.unwrap_or_default().as_slice());
        }

        preimage.extend_from_slice(&self.fee_amount.to_be_bytes::<32>());

        for percentage in [
            self.fee_percentage,
            self.token_s_fee_percentage,
            self.token_b_fee_percentage,
            self.wallet_split_percentage,
        ] {
            preimage.extend_from_slice(&percentage.to_be_bytes());
        }

        preimage.push(u8::from(self.all_or_none));

        keccak256(preimage)
    }
}

/// One settlement cycle: indices into the batch's order list, in cycle
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RingDescriptor(Vec<usize>);

impl RingDescriptor {
    pub fn new(order_indices: Vec<usize>) -> Self {
        Self(order_indices)
    }

    pub fn order_indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Value of a top-level batch field: either a scalar or one of the two
/// nested collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchValue<'a> {
    Scalar(FieldValue),
    Rings(&'a [RingDescriptor]),
    Orders(&'a [OrderDescriptor]),
}

/// Everything submitted in one transaction: rings, the orders they
/// reference, and the settlement context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementBatch {
    pub rings: Vec<RingDescriptor>,
    pub orders: Vec<OrderDescriptor>,
    pub fee_recipient: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miner: Option<Address>,
    pub transaction_origin: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_algorithm: Option<SignAlgorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<B256>,
}

impl SettlementBatch {
    pub fn value(&self, field: BatchField) -> BatchValue<'_> {
        match field {
            BatchField::Rings => BatchValue::Rings(&self.rings),
            BatchField::Orders => BatchValue::Orders(&self.orders),
            BatchField::FeeRecipient => BatchValue::Scalar(self.fee_recipient.into()),
            BatchField::Miner => BatchValue::Scalar(self.miner.into()),
            BatchField::TransactionOrigin => {
                BatchValue::Scalar(self.transaction_origin.into())
            }
            BatchField::Description => BatchValue::Scalar(self.description.clone().into()),
            BatchField::SignAlgorithm => BatchValue::Scalar(self.sign_algorithm.into()),
            BatchField::Hash => BatchValue::Scalar(self.hash.into()),
        }
    }

    /// Keccak-256 over the order hashes, the ring topology and the
    /// settlement context.
    pub fn compute_hash(&self) -> B256 {
        let mut preimage = Vec::new();

        for order in &self.orders {
            preimage.extend_from_slice(order.compute_hash().as_slice());
        }

        for ring in &self.rings {
            for index in ring.order_indices() {
                preimage.extend_from_slice(&(*index as u64).to_be_bytes());
            }
        }

        preimage.extend_from_slice(self.fee_recipient.as_slice());
        preimage.extend_from_slice(self.miner.unwrap_or_default().as_slice());
        preimage.extend_from_slice(self.transaction_origin.as_slice());

        keccak256(preimage)
    }

    /// Every distinct token the batch can move: sold, bought and fee
    /// tokens.
    pub fn tokens(&self) -> Vec<Address> {
        let mut tokens: Vec<Address> = self
            .orders
            .iter()
            .flat_map(|order| {
                [Some(order.token_s), Some(order.token_b), order.fee_token]
                    .into_iter()
                    .flatten()
            })
            .collect();
        tokens.sort_unstable();
        tokens.dedup();
        tokens
    }
}
