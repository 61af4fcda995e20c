use std::fmt;

/// Partition of the pool: destination address plus whether the socket speaks TLS.
///
/// A plain and a TLS connection to the same address are never interchangeable,
/// so they live under different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pub address: String,
    pub tls: bool,
}

impl PoolKey {
    pub fn new(address: impl Into<String>, tls: bool) -> Self {
        Self {
            address: address.into(),
            tls,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tls {
            write!(f, "{} (tls)", self.address)
        } else {
            write!(f, "{}", self.address)
        }
    }
}
