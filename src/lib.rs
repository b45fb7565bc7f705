//! Resolve, cache, and provision the correct webdriver binary for a locally
//! installed browser, re-fetching only when the installed binary is stale or
//! absent.
//!
//! The [`engine::ResolutionEngine`] orchestrates four substitutable
//! collaborators: a [`browser::BrowserProbe`] reporting the installed
//! browser's version, a [`catalog::RemoteCatalog`] over the vendor's release
//! listing, a [`cache::CacheStore`] remembering the last network resolution,
//! and an [`installer::Installer`] placing the binary on disk. See
//! [`drivers::edgedriver::updater`] for a ready-wired msedgedriver setup.

// Top-level public modules
pub mod browser;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod installer;
pub mod version;

pub use browser::{BrowserProbe, SystemBrowserProbe};
pub use cache::{CacheEntry, CacheStore, JsonFileCache};
pub use catalog::{CatalogEntry, MatchStrategy, RemoteCatalog, VendorCatalog};
pub use config::{DEFAULT_CACHE_TTL_SECS, RequiredVersion, UpdaterConfig};
pub use engine::{ResolutionEngine, UpdateOutcome};
pub use error::UpdaterError;
pub use installer::{DriverInstaller, Installer};
pub use version::Version;
