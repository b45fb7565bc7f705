//! Configuration consumed by the resolution engine.

use crate::error::UpdaterError;
use crate::version::Version;

/// Default freshness window for a cached resolution, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

/// Which driver version the caller wants.
///
/// `Auto` resolves to the latest release compatible with the installed
/// browser. `Pinned` bypasses browser matching and network resolution
/// entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequiredVersion {
    #[default]
    Auto,
    Pinned(Version),
}

impl RequiredVersion {
    /// Pins a version. A zero version (`0`, `0.0.0`) is an alias for "no
    /// pin" and normalizes to [`RequiredVersion::Auto`].
    pub fn pin(version: Version) -> Self {
        if version.is_zero() {
            RequiredVersion::Auto
        } else {
            RequiredVersion::Pinned(version)
        }
    }

    /// Parses a user-supplied setting. `None` and the empty string both mean
    /// "no pin".
    pub fn from_setting(value: Option<&str>) -> Result<Self, UpdaterError> {
        match value {
            None => Ok(RequiredVersion::Auto),
            Some(s) if s.trim().is_empty() => Ok(RequiredVersion::Auto),
            Some(s) => Ok(RequiredVersion::pin(Version::parse(s)?)),
        }
    }
}

/// Process-wide engine configuration; set at construction time, read-only
/// during resolution.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Seconds a cached resolution stays fresh. `0` means always stale, so
    /// every auto-mode resolution goes to the network.
    pub cache_ttl_secs: u64,
    pub required_version: RequiredVersion,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        UpdaterConfig {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            required_version: RequiredVersion::Auto,
        }
    }
}

impl UpdaterConfig {
    pub fn with_required_version(mut self, required: RequiredVersion) -> Self {
        self.required_version = required;
        self
    }

    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }
}

// --- Tests ---
