//! Validation and v4/v6 partitioning of published CIDR ranges.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::SyncError;

/// Address family of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => f.write_str("IPv4"),
            Family::V6 => f.write_str("IPv6"),
        }
    }
}

/// A syntactically valid CIDR range.
///
/// The family comes from the parsed network: anything that is not a 4-byte
/// network is v6, including v4-mapped v6 ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange(IpNet);

impl AddressRange {
    /// Parse a CIDR. Bare addresses without a prefix length are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<IpNet>().ok().map(Self)
    }

    pub fn family(&self) -> Family {
        match self.0 {
            IpNet::V4(_) => Family::V4,
            IpNet::V6(_) => Family::V6,
        }
    }

    pub fn net(&self) -> IpNet {
        self.0
    }
}

impl From<IpNet> for AddressRange {
    fn from(net: IpNet) -> Self {
        Self(net)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What to do when a fetch yields no ranges for one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyFamilyPolicy {
    /// Abort only when both families are empty. An empty family keeps its
    /// current set contents; if reclaim already deleted that set the run
    /// aborts instead.
    #[default]
    Preserve,
    /// Abort when either family is empty.
    Strict,
}

/// Ranges partitioned by family, each in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub v4: Vec<AddressRange>,
    pub v6: Vec<AddressRange>,
    /// Number of inputs that were not valid CIDRs.
    pub rejected: usize,
}

impl Classified {
    pub fn total(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Apply the empty-result policy.
    ///
    /// An empty update almost always means the upstream list failed to load,
    /// not that the provider stopped publishing ranges.
    pub fn enforce(&self, policy: EmptyFamilyPolicy) -> Result<(), SyncError> {
        let empty = match policy {
            EmptyFamilyPolicy::Preserve => self.v4.is_empty() && self.v6.is_empty(),
            EmptyFamilyPolicy::Strict => self.v4.is_empty() || self.v6.is_empty(),
        };
        if empty {
            return Err(SyncError::EmptyRanges {
                v4: self.v4.len(),
                v6: self.v6.len(),
            });
        }
        Ok(())
    }
}

/// Partition raw strings into valid v4 and v6 CIDRs.
///
/// Invalid entries are skipped and counted, never fatal. Duplicates are kept;
/// the set's auto-merge flag folds them.
pub fn classify<I, S>(raw: I) -> Classified
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut classified = Classified::default();

    for entry in raw {
        let entry = entry.as_ref();
        match AddressRange::parse(entry) {
            Some(range) => match range.family() {
                Family::V4 => classified.v4.push(range),
                Family::V6 => classified.v6.push(range),
            },
            None => {
                warn!("Skipping invalid CIDR: {:?}", entry);
                classified.rejected += 1;
            }
        }
    }

    classified
}
