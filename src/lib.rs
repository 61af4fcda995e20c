// sockpool - Bounded, keyed socket pool for HTTP clients

pub mod config;
pub mod pool;
pub mod utils;

// Re-export commonly used types
pub use pool::{PoolKey, PoolManager, PoolSocket, PoolStats};
pub use utils::error::{Result, SockPoolError};
