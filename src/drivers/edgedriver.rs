//! Ready-wired updater for Microsoft Edge's msedgedriver.

use std::path::PathBuf;

use crate::browser::SystemBrowserProbe;
use crate::cache::JsonFileCache;
use crate::catalog::{MatchStrategy, VendorCatalog};
use crate::config::UpdaterConfig;
use crate::engine::ResolutionEngine;
use crate::error::UpdaterError;
use crate::installer::DriverInstaller;

/// Vendor endpoint serving both the release listing and the per-version
/// download paths.
pub const EDGEDRIVER_DOWNLOADS_URL: &str = "https://msedgedriver.azureedge.net";

pub const DRIVER_NAME: &str = "msedgedriver";

pub type EdgeDriverEngine =
    ResolutionEngine<SystemBrowserProbe, VendorCatalog, JsonFileCache, DriverInstaller>;

/// Platform identifier used in the vendor's archive file names.
fn platform_key() -> Result<&'static str, UpdaterError> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("windows", "x86_64") => Ok("win64"),
        ("windows", "x86") => Ok("win32"),
        ("macos", "x86_64") => Ok("mac64"),
        ("macos", "aarch64") => Ok("mac64_m1"),
        ("linux", "x86_64") => Ok("linux64"),
        ("linux", "aarch64") => Ok("arm64"),
        _ => Err(UpdaterError::UnsupportedPlatform(format!(
            "{}-{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ))),
    }
}

fn archive_name() -> Result<String, UpdaterError> {
    Ok(format!("edgedriver_{}.zip", platform_key()?))
}

/// Builds a [`ResolutionEngine`] wired with the default Edge components:
/// system browser probe, vendor listing catalog, JSON-file cache, and the
/// download/unzip installer.
pub fn updater(
    install_dir: impl Into<PathBuf>,
    cache_file: impl Into<PathBuf>,
    config: UpdaterConfig,
) -> Result<EdgeDriverEngine, UpdaterError> {
    let catalog = VendorCatalog::new(
        EDGEDRIVER_DOWNLOADS_URL,
        &archive_name()?,
        MatchStrategy::PerPointRelease,
    );
    Ok(ResolutionEngine::new(
        SystemBrowserProbe::new("edge"),
        catalog,
        JsonFileCache::new(cache_file),
        DriverInstaller::new(install_dir, DRIVER_NAME),
        config,
        DRIVER_NAME,
    ))
}

// --- Tests ---
