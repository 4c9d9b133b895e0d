//! Application layer orchestrating the top-up flow.
//!
//! Each service owns one step: [`pricing`] resolves prices, [`risk`] decides
//! settlement, [`quotes`] freezes both into a quote, [`orders`] redeems quotes
//! into orders and [`confirmation`] settles them. [`engine::TopupEngine`] wires
//! them together behind one entry point.

pub mod confirmation;
pub mod engine;
pub mod gateways;
pub mod locks;
pub mod orders;
pub mod pricing;
pub mod quotes;
pub mod risk;
pub mod sweeper;
