use alloy::network::EthereumWallet;
use alloy::providers::ProviderBuilder;
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, info};

use ring_verify::Verifier;
use ring_verify::config::{Ctx, Env, setup_tracing};
use ring_verify::ledger::EvmLedger;
use ring_verify::simulator::HttpSimulator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = Env::parse();
    let ctx = Ctx::load_files(&env.config, &env.secrets)?;
    setup_tracing(&ctx.log_level);

    debug!(?ctx, "Loaded configuration");

    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(ctx.signer().clone()))
        .connect_http(ctx.rpc_url.clone());

    let ledger = Arc::new(EvmLedger::new(
        provider,
        ctx.ring_submitter,
        ctx.required_confirmations,
    ));

    let verifier = Verifier::new(
        Arc::new(ctx.codec()),
        Arc::new(HttpSimulator::new(&ctx.simulator_url)),
        ledger.clone(),
        ledger,
        ctx.deployment.clone(),
        ctx.precision,
    );

    let report = verifier.run_scenarios(&ctx.scenarios).await?;

    if let Some(failed) = report.failed {
        anyhow::bail!(
            "scenario {:?} failed after {} passed: {}",
            failed.description,
            report.passed.len(),
            failed.error
        );
    }

    info!(passed = report.passed.len(), "All scenarios passed");

    Ok(())
}
