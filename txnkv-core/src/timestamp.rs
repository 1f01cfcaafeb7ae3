use core::fmt;

/// A logical timestamp handed out by the cluster's timestamp authority.
///
/// Timestamps are totally ordered. A transaction reads at its start timestamp and its writes
/// become visible at its commit timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    pub const fn from_version(version: u64) -> Self {
        Self(version)
    }

    pub const fn version(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(version: u64) -> Self {
        Self(version)
    }
}
