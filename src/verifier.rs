//! Scenario verification.
//!
//! Each scenario runs through fixed phases: describe, provision, self-check,
//! simulate, then execute and reconcile. The first error ends the scenario
//! with [`Verdict::Fail`]; nothing is retried. Scenarios share a
//! [`RunState`] and run strictly one after another.

use alloy::primitives::{Address, Bytes, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::batch::SettlementBatch;
use crate::codec::{CodecError, SubmissionEncoder};
use crate::diff::{StructuralMismatch, diff_parsed};
use crate::harvest::{HarvestError, harvest_transfers};
use crate::ledger::{Ledger, LedgerError, Provisioner};
use crate::scenario::{Deployment, RuntimeContext, Scenario, ScenarioError, describe};
use crate::simulator::{SettlementSimulator, SimulationReport, SimulatorError};
use crate::tolerance::Precision;
use crate::transfer::{TransferSetMismatch, reconcile_transfers};

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("serialization mismatch: {0}")]
    SerializationMismatch(#[from] StructuralMismatch),
    #[error("event retrieval failed: {0}")]
    EventRetrieval(#[from] HarvestError),
    #[error("transfer set mismatch: {0}")]
    TransferSet(#[from] TransferSetMismatch),
    #[error("invalid scenario: {0}")]
    Scenario(#[from] ScenarioError),
    #[error("failed to encode batch: {0}")]
    Codec(#[from] CodecError),
    #[error("simulation failed: {0}")]
    Simulator(#[from] SimulatorError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug)]
pub enum Verdict {
    Pass,
    Fail(VerificationError),
}

impl Verdict {
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// State carried from one scenario to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    /// First block whose events belong to the next settlement.
    pub checkpoint_block: u64,
    /// Total credited per `(account, token)`.
    pub funded_accounts: BTreeMap<(Address, Address), U256>,
}

impl RunState {
    pub fn new(checkpoint_block: u64) -> Self {
        Self {
            checkpoint_block,
            funded_accounts: BTreeMap::new(),
        }
    }

    pub fn funded(&self, account: Address, token: Address) -> U256 {
        self.funded_accounts
            .get(&(account, token))
            .copied()
            .unwrap_or_default()
    }

    fn advance_past(&mut self, block: u64) {
        self.checkpoint_block = self.checkpoint_block.max(block.saturating_add(1));
    }
}

#[derive(Debug)]
pub struct FailedScenario {
    pub description: String,
    pub error: VerificationError,
}

/// Outcome of [`Verifier::run_scenarios`]. The run stops at the first
/// failure, so scenarios after it are neither passed nor failed.
#[derive(Debug, Default)]
pub struct RunReport {
    pub passed: Vec<String>,
    pub failed: Option<FailedScenario>,
}

impl RunReport {
    pub const fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}

pub struct Verifier {
    encoder: Arc<dyn SubmissionEncoder>,
    simulator: Arc<dyn SettlementSimulator>,
    ledger: Arc<dyn Ledger>,
    provisioner: Arc<dyn Provisioner>,
    deployment: Deployment,
    precision: Precision,
}

impl Verifier {
    pub fn new(
        encoder: Arc<dyn SubmissionEncoder>,
        simulator: Arc<dyn SettlementSimulator>,
        ledger: Arc<dyn Ledger>,
        provisioner: Arc<dyn Provisioner>,
        deployment: Deployment,
        precision: Precision,
    ) -> Self {
        Self {
            encoder,
            simulator,
            ledger,
            provisioner,
            deployment,
            precision,
        }
    }

    /// Run state whose checkpoint starts after the current head.
    pub async fn start(&self) -> Result<RunState, VerificationError> {
        let head = self.ledger.latest_block().await?;
        Ok(RunState::new(head.number + 1))
    }

    /// Verifies every scenario in order, stopping at the first failure.
    pub async fn run_scenarios(
        &self,
        scenarios: &[Scenario],
    ) -> Result<RunReport, VerificationError> {
        let mut state = self.start().await?;
        let mut report = RunReport::default();

        for scenario in scenarios {
            match self.verify(&mut state, scenario).await {
                Verdict::Pass => report.passed.push(scenario.description.clone()),
                Verdict::Fail(error) => {
                    report.failed = Some(FailedScenario {
                        description: scenario.description.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        Ok(report)
    }

    pub async fn verify(&self, state: &mut RunState, scenario: &Scenario) -> Verdict {
        match self.run_phases(state, scenario).await {
            Ok(()) => {
                info!(scenario = %scenario.description, "PASS");
                Verdict::Pass
            }
            Err(error) => {
                error!(scenario = %scenario.description, %error, "FAIL");
                Verdict::Fail(error)
            }
        }
    }

    #[tracing::instrument(skip_all, fields(scenario = %scenario.description), level = tracing::Level::DEBUG)]
    async fn run_phases(
        &self,
        state: &mut RunState,
        scenario: &Scenario,
    ) -> Result<(), VerificationError> {
        let batch = self.describe(scenario).await?;
        self.provision(state, &batch).await?;
        let (payload, decoded) = self.self_check(&batch).await?;
        let report = self.simulate(&decoded).await?;
        self.execute_and_reconcile(state, &batch, payload, &report)
            .await
    }

    async fn describe(&self, scenario: &Scenario) -> Result<SettlementBatch, VerificationError> {
        let block = self.ledger.latest_block().await?;
        debug!(block = block.number, timestamp = block.timestamp, "Describing batch");

        let context = RuntimeContext {
            deployment: &self.deployment,
            block,
        };

        Ok(describe(scenario, &context)?)
    }

    /// Credits every order owner with what the order can sell and the fee
    /// it can pay. Mint events land before the checkpoint.
    async fn provision(
        &self,
        state: &mut RunState,
        batch: &SettlementBatch,
    ) -> Result<(), VerificationError> {
        debug!(orders = batch.orders.len(), "Provisioning order owners");

        for order in &batch.orders {
            let fee_token = order.fee_token.unwrap_or(self.deployment.lrc);

            let credits = [(order.token_s, order.amount_s), (fee_token, order.fee_amount)];

            for (token, amount) in credits {
                if amount.is_zero() {
                    continue;
                }

                let receipt = self.provisioner.credit(order.owner, token, amount).await?;
                state.advance_past(receipt.block_number);

                let funded = state
                    .funded_accounts
                    .entry((order.owner, token))
                    .or_default();
                *funded = funded.saturating_add(amount);
            }
        }

        Ok(())
    }

    /// Encodes the batch, has the simulator parse it back, and requires the
    /// parsed batch to describe the same settlement.
    async fn self_check(
        &self,
        batch: &SettlementBatch,
    ) -> Result<(Bytes, SettlementBatch), VerificationError> {
        let payload = self.encoder.encode(batch)?;
        debug!(bytes = payload.len(), "Self-checking submission payload");

        let parsed = self.simulator.deserialize(&payload).await?;
        let decoded = diff_parsed(batch, &parsed)?;

        Ok((payload, decoded))
    }

    async fn simulate(
        &self,
        decoded: &SettlementBatch,
    ) -> Result<SimulationReport, VerificationError> {
        let report = self.simulator.simulate(decoded).await?;

        debug!(
            transfers = report.transfers.len(),
            unfilled = report.is_fully_unfilled(),
            fills = ?report.fills,
            "Simulated settlement"
        );

        Ok(report)
    }

    async fn execute_and_reconcile(
        &self,
        state: &mut RunState,
        batch: &SettlementBatch,
        payload: Bytes,
        report: &SimulationReport,
    ) -> Result<(), VerificationError> {
        let receipt = self.ledger.submit(payload).await?;
        debug!(tx_hash = %receipt.tx_hash, block = receipt.block_number, "Batch executed");

        let mut tokens = self.deployment.harvest_tokens();
        tokens.extend(batch.tokens());

        let observed =
            harvest_transfers(self.ledger.as_ref(), &tokens, state.checkpoint_block).await?;
        state.advance_past(receipt.block_number);

        reconcile_transfers(&report.transfers, &observed, self.precision)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use tracing_test::traced_test;

    use super::*;
    use crate::batch::{FieldValue, OrderField};
    use crate::codec::JsonCodec;
    use crate::ledger::MockLedger;
    use crate::simulator::MockSimulator;

    const WETH: Address = address!("0x00000000000000000000000000000000000000aa");
    const GTO: Address = address!("0x00000000000000000000000000000000000000bb");
    const LRC: Address = address!("0x00000000000000000000000000000000000000cc");
    const ALICE: Address = address!("0x1111111111111111111111111111111111111111");
    const BOB: Address = address!("0x2222222222222222222222222222222222222222");
    const FEE_RECIPIENT: Address = address!("0x9999999999999999999999999999999999999999");

    fn codec() -> JsonCodec {
        JsonCodec::new(Address::ZERO, LRC)
    }

    fn deployment() -> Deployment {
        Deployment {
            tokens: BTreeMap::from([
                ("WETH".to_string(), WETH),
                ("GTO".to_string(), GTO),
                ("LRC".to_string(), LRC),
            ]),
            accounts: vec![ALICE, BOB],
            lrc: LRC,
            fee_recipient: FEE_RECIPIENT,
            miner: None,
            transaction_origin: ALICE,
            wallet_split_percentage: 0,
        }
    }

    fn verifier(simulator: MockSimulator, ledger: Arc<MockLedger>) -> Verifier {
        Verifier::new(
            Arc::new(codec()),
            Arc::new(simulator),
            ledger.clone(),
            ledger,
            deployment(),
            Precision::default(),
        )
    }

    fn scenario(toml: &str) -> Scenario {
        toml::from_str(toml).unwrap()
    }

    fn direct_ring() -> Scenario {
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
            fee_amount = "1"
            "#,
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn matching_settlement_passes() {
        let ledger = Arc::new(MockLedger::new(codec()));
        let verifier = verifier(MockSimulator::new(codec()), ledger.clone());
        let mut state = verifier.start().await.unwrap();

        let verdict = verifier.verify(&mut state, &direct_ring()).await;

        assert!(verdict.is_pass(), "{verdict:?}");
        assert_eq!(ledger.submissions(), 1);
        assert!(logs_contain("PASS"));
        assert!(logs_contain("unfilled=false"));
        assert!(!logs_contain("FAIL"));
    }

    #[tokio::test]
    #[traced_test]
    async fn passing_scenario_logs_only_the_marker_at_info() {
        let ledger = Arc::new(MockLedger::new(codec()));
        let verifier = verifier(MockSimulator::new(codec()), ledger);
        let mut state = verifier.start().await.unwrap();

        let verdict = verifier.verify(&mut state, &direct_ring()).await;
        assert!(verdict.is_pass(), "{verdict:?}");

        logs_assert(|lines: &[&str]| {
            let loud: Vec<_> = lines
                .iter()
                .filter(|line| {
                    [" INFO ", " WARN ", "ERROR "]
                        .iter()
                        .any(|level| line.contains(level))
                })
                .collect();

            match loud.as_slice() {
                [only] if only.contains("PASS") => Ok(()),
                other => Err(format!("expected a single PASS line, got {other:?}")),
            }
        });
    }

    #[tokio::test]
    async fn key_dropped_by_the_parser_fails_self_check() {
        let ledger = Arc::new(MockLedger::new(codec()));
        let simulator = MockSimulator::new(codec()).with_wire_tamper(|parsed| {
            parsed["orders"][1].as_object_mut().unwrap().remove("amountS");
        });
        let verifier = verifier(simulator, ledger.clone());
        let mut state = verifier.start().await.unwrap();

        let Verdict::Fail(error) = verifier.verify(&mut state, &direct_ring()).await else {
            panic!("dropped key should fail");
        };

        assert!(
            matches!(
                &error,
                VerificationError::SerializationMismatch(StructuralMismatch::OrderField {
                    order: 1,
                    field: OrderField::AmountS,
                    actual: FieldValue::Absent,
                    ..
                })
            ),
            "{error:?}"
        );
        assert_eq!(ledger.submissions(), 0);
    }

    #[tokio::test]
    async fn key_added_by_the_parser_fails_self_check() {
        let ledger = Arc::new(MockLedger::new(codec()));
        let simulator = MockSimulator::new(codec()).with_wire_tamper(|parsed| {
            parsed["orders"][0]["tokenSpendable"] = serde_json::json!("0x64");
        });
        let verifier = verifier(simulator, ledger.clone());
        let mut state = verifier.start().await.unwrap();

        let Verdict::Fail(error) = verifier.verify(&mut state, &direct_ring()).await else {
            panic!("added key should fail");
        };

        assert_eq!(
            error.to_string(),
            "serialization mismatch: order 0 has unexpected field tokenSpendable"
        );
        assert_eq!(ledger.submissions(), 0);
    }

    #[tokio::test]
    async fn provisioning_credits_sell_and_fee_amounts() {
        let ledger = Arc::new(MockLedger::new(codec()));
        let verifier = verifier(MockSimulator::new(codec()), ledger.clone());
        let mut state = verifier.start().await.unwrap();

        verifier.verify(&mut state, &direct_ring()).await;

        let one = U256::from(10u64).pow(U256::from(18u8));
        assert_eq!(state.funded(ALICE, WETH), U256::from(100u64) * one);
        assert_eq!(state.funded(ALICE, LRC), one);
        assert_eq!(state.funded(BOB, GTO), U256::from(100u64) * one);
        assert_eq!(state.funded(BOB, LRC), one);
        assert_eq!(ledger.credits().len(), 4);
    }

    #[tokio::test]
    async fn checkpoint_moves_past_submission() {
        let ledger = Arc::new(MockLedger::new(codec()));
        let verifier = verifier(MockSimulator::new(codec()), ledger.clone());
        let mut state = verifier.start().await.unwrap();

        verifier.verify(&mut state, &direct_ring()).await;

        let head = ledger.latest_block().await.unwrap();
        assert_eq!(state.checkpoint_block, head.number + 1);
    }

    #[tokio::test]
    async fn second_scenario_ignores_first_settlement() {
        let ledger = Arc::new(MockLedger::new(codec()));
        let verifier = verifier(MockSimulator::new(codec()), ledger);

        let report = verifier
            .run_scenarios(&[direct_ring(), direct_ring()])
            .await
            .unwrap();

        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.passed.len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn tampered_parse_fails_self_check_before_submission() {
        let ledger = Arc::new(MockLedger::new(codec()));
        let simulator = MockSimulator::new(codec()).with_tamper(|batch| {
            batch.orders[0].fee_amount = U256::ZERO;
        });
        let verifier = verifier(simulator, ledger.clone());
        let mut state = verifier.start().await.unwrap();

        let Verdict::Fail(error) = verifier.verify(&mut state, &direct_ring()).await else {
            panic!("tampered parse should fail");
        };

        assert!(
            matches!(
                &error,
                VerificationError::SerializationMismatch(StructuralMismatch::OrderField {
                    order: 0,
                    ..
                })
            ),
            "{error:?}"
        );
        assert_eq!(ledger.submissions(), 0);
        assert!(logs_contain("FAIL"));
    }

    #[tokio::test]
    async fn failed_scenario_stops_the_run() {
        let ledger = Arc::new(MockLedger::new(codec()).with_failing_token(GTO));
        let verifier = verifier(MockSimulator::new(codec()), ledger);

        let report = verifier
            .run_scenarios(&[direct_ring(), direct_ring()])
            .await
            .unwrap();

        assert!(report.passed.is_empty());
        let failed = report.failed.unwrap();
        assert_eq!(failed.description, "direct ring");
        assert!(matches!(
            failed.error,
            VerificationError::EventRetrieval(ref harvest) if harvest.token == GTO
        ));
    }

    #[tokio::test]
    async fn invalid_scenario_fails_without_touching_the_ledger() {
        let ledger = Arc::new(MockLedger::new(codec()));
        let verifier = verifier(MockSimulator::new(codec()), ledger.clone());
        let mut state = verifier.start().await.unwrap();
        let mut scenario = direct_ring();
        scenario.orders[0].token_s = "DAI".to_string();

        let verdict = verifier.verify(&mut state, &scenario).await;

        assert!(matches!(
            verdict,
            Verdict::Fail(VerificationError::Scenario(ScenarioError::UnknownToken { .. }))
        ));
        assert!(ledger.credits().is_empty());
    }

    #[test]
    fn checkpoint_never_moves_backwards() {
        let mut state = RunState::new(50);

        state.advance_past(10);
        assert_eq!(state.checkpoint_block, 50);

        state.advance_past(60);
        assert_eq!(state.checkpoint_block, 61);
    }
}
