//! Port implementations: storage, wallet, clocks and gateway adapters.

pub mod clock;
pub mod gateways;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
