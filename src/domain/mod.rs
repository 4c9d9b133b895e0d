//! Domain layer: value objects, entities, state machines and ports.
//!
//! Nothing in here performs I/O. Storage, the wallet ledger, gateways and time
//! are reached through the traits in [`ports`].

pub mod channel;
pub mod config;
pub mod money;
pub mod ports;
pub mod quote;
pub mod risk;
pub mod topup;
pub mod webhook;
