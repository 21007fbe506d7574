use clap::Parser;
use std::process::ExitCode;

use ring_verify::config::{ConfigError, Ctx, Env};

fn main() -> ExitCode {
    let env = Env::parse();
    match Ctx::load_files(&env.config, &env.secrets) {
        Ok(ctx) => {
            eprintln!(
                "Config validation passed ({} scenarios)",
                ctx.scenarios.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Config validation failed: {}: {e}", error_kind(&e));
            ExitCode::FAILURE
        }
    }
}

fn error_kind(e: &ConfigError) -> &'static str {
    match e {
        ConfigError::Io(_) => "failed to read config file",
        ConfigError::Toml(_) => "failed to parse config file",
        ConfigError::InvalidPrivateKey(_) => "failed to derive signer from private_key",
        ConfigError::InvalidWalletSplit(_) => "invalid wallet split percentage",
        ConfigError::Scenario { .. } => "invalid scenario",
    }
}
