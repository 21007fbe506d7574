//! Differential verification of ring settlements.
//!
//! Each configured scenario is described as a settlement batch, checked to
//! survive the simulator's parser unchanged, simulated, executed on-chain,
//! and finally reconciled: the `Transfer` events the execution emitted must
//! equal the simulator's predicted transfers as a multiset, with amounts
//! compared at a bounded decimal precision.

pub mod batch;
mod bindings;
pub mod codec;
pub mod config;
pub mod diff;
pub mod harvest;
pub mod ledger;
pub mod scenario;
pub mod simulator;
pub mod tolerance;
pub mod transfer;
pub mod verifier;

pub use verifier::{RunReport, RunState, Verdict, VerificationError, Verifier};
