//! Driver and browser version strings: parsing, ordering, prefix matching.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::UpdaterError;

/// A dotted version such as `115.0.5790.171`.
///
/// Ordered component-wise; missing trailing components compare as zero, so
/// `115.0` and `115.0.0.0` are equal. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Version(Vec<u64>);

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let trailing_zeros = self.0.iter().rev().take_while(|&&c| c == 0).count();
        let significant = &self.0[..self.0.len() - trailing_zeros];
        significant.hash(state);
    }
}

impl Version {
    /// Parses a dotted version string. Requires at least one numeric
    /// component; anything else fails with `InvalidVersion`.
    pub fn parse(s: &str) -> Result<Self, UpdaterError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(UpdaterError::InvalidVersion {
                input: s.to_string(),
            });
        }
        let components = trimmed
            .split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| UpdaterError::InvalidVersion {
                    input: s.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Version(components))
    }

    /// First component, e.g. `115` for `115.0.5790.171`. Browsers and their
    /// drivers are assumed compatible only within the same major.
    pub fn major(&self) -> u64 {
        self.0[0]
    }

    /// The first `n` components, or all of them if fewer exist. At least the
    /// major is always kept, so the result stays a valid version. Vendor
    /// catalogs key point releases on the `major.minor.build` (3-component)
    /// prefix.
    pub fn prefix(&self, n: usize) -> Version {
        Version(self.0.iter().take(n.max(1)).copied().collect())
    }

    /// True iff every component of `self` equals the corresponding component
    /// of `other`.
    pub fn is_prefix_of(&self, other: &Version) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }

    /// True for versions like `0`, `0.0.0` — used to treat a zero pin as
    /// "no pin".
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&c| c == 0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{c}")?;
            first = false;
        }
        Ok(())
    }
}

// --- Tests ---
