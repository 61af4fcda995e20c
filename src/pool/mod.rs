//! Keyed pool of idle sockets shared by the request workers of a client.

pub mod key;
pub mod manager;
mod reaper;
pub mod socket;

pub use key::PoolKey;
pub use manager::{PoolManager, PoolStats};
pub use socket::{PoolSocket, RawDescriptor};
