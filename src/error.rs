/// Errors that can occur when constructing a ParaTree.
///
/// Absent keys are not errors: `get` returns `None` and `remove` returns
/// `None` as normal results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The shard count is invalid (must be at least 1).
    InvalidShardCount,
    /// The virtual-node count is invalid (must be at least 1).
    InvalidVirtualNodes,
    /// The consecutive-redirect limit is invalid (must be at least 1).
    InvalidRedirectLimit,
    /// The hotspot factor is invalid (must be at least 1.0).
    InvalidHotspotFactor,
    /// The load-view refresh period is invalid (must be non-zero).
    InvalidRefreshPeriod,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidShardCount => write!(f, "shard count must be at least 1"),
            Error::InvalidVirtualNodes => {
                write!(f, "virtual nodes per shard must be at least 1")
            }
            Error::InvalidRedirectLimit => {
                write!(f, "max consecutive redirects must be at least 1")
            }
            Error::InvalidHotspotFactor => write!(f, "hotspot factor must be at least 1.0"),
            Error::InvalidRefreshPeriod => write!(f, "refresh period must be non-zero"),
        }
    }
}

impl std::error::Error for Error {}
