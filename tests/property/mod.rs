//! Property-based tests for graph determinism, naming and ledger idempotence

mod graph_determinism;
mod ledger_idempotence;
mod naming;
