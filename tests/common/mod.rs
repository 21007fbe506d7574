//! Shared fixtures for the scenario tests: a deployment of three tokens and
//! two traders, and a verifier wired to the in-memory ledger and simulator.

use alloy::primitives::{Address, U256, address};
use std::collections::BTreeMap;
use std::sync::Arc;

use ring_verify::Verifier;
use ring_verify::codec::JsonCodec;
use ring_verify::ledger::MockLedger;
use ring_verify::scenario::{Deployment, Scenario};
use ring_verify::simulator::MockSimulator;
use ring_verify::tolerance::Precision;

pub const WETH: Address = address!("0x00000000000000000000000000000000000000aa");
pub const GTO: Address = address!("0x00000000000000000000000000000000000000bb");
pub const LRC: Address = address!("0x00000000000000000000000000000000000000cc");
pub const ALICE: Address = address!("0x1111111111111111111111111111111111111111");
pub const BOB: Address = address!("0x2222222222222222222222222222222222222222");
pub const WALLET: Address = address!("0x5555555555555555555555555555555555555555");
pub const FEE_RECIPIENT: Address = address!("0x9999999999999999999999999999999999999999");
pub const TRADE_DELEGATE: Address = address!("0x4444444444444444444444444444444444444444");

pub fn tokens(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(18u8))
}

pub fn codec() -> JsonCodec {
    JsonCodec::new(TRADE_DELEGATE, LRC)
}

pub fn deployment() -> Deployment {
    Deployment {
        tokens: BTreeMap::from([
            ("WETH".to_string(), WETH),
            ("GTO".to_string(), GTO),
            ("LRC".to_string(), LRC),
        ]),
        accounts: vec![ALICE, BOB, WALLET],
        lrc: LRC,
        fee_recipient: FEE_RECIPIENT,
        miner: Some(FEE_RECIPIENT),
        transaction_origin: ALICE,
        wallet_split_percentage: 0,
    }
}

pub fn verifier_with(
    deployment: Deployment,
    simulator: MockSimulator,
    ledger: Arc<MockLedger>,
) -> Verifier {
    Verifier::new(
        Arc::new(codec()),
        Arc::new(simulator),
        ledger.clone(),
        ledger,
        deployment,
        Precision::default(),
    )
}

pub fn verifier(simulator: MockSimulator, ledger: Arc<MockLedger>) -> Verifier {
    verifier_with(deployment(), simulator, ledger)
}

pub fn scenario(toml: &str) -> Scenario {
    toml::from_str(toml).unwrap()
}

/// Two orders swapping 100 WETH for 100 GTO, each paying a 1 LRC fee.
pub fn direct_ring() -> Scenario {
    scenario(
        r#"
        description = "direct ring"
        rings = [[0, 1]]

        [[orders]]
        owner = 0
        token_s = "WETH"
        token_b = "GTO"
        amount_s = "100"
        amount_b = "100"
        fee_token = "LRC"
        fee_amount = "1"

        [[orders]]
        owner = 1
        token_s = "GTO"
        token_b = "WETH"
        amount_s = "100"
        amount_b = "100"
        fee_token = "LRC"
        fee_amount = "1"
        "#,
    )
}

/// An all-or-none order for 100 WETH against a counter order offering only
/// 50 GTO.
pub fn all_or_none_shortfall() -> Scenario {
    scenario(
        r#"
        description = "all or none without counter liquidity"
        rings = [[0, 1]]

        [[orders]]
        owner = 0
        token_s = "WETH"
        token_b = "GTO"
        amount_s = "100"
        amount_b = "100"
        fee_amount = "1"
        all_or_none = true

        [[orders]]
        owner = 1
        token_s = "GTO"
        token_b = "WETH"
        amount_s = "50"
        amount_b = "50"
        "#,
    )
}
