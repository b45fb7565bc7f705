//! The resolution engine: decides whether a driver download is needed and
//! which version to fetch, with as few network calls as possible.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::browser::BrowserProbe;
use crate::cache::{CacheEntry, CacheStore};
use crate::catalog::RemoteCatalog;
use crate::config::{RequiredVersion, UpdaterConfig};
use crate::error::UpdaterError;
use crate::installer::Installer;
use crate::version::Version;

/// What [`ResolutionEngine::update`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The installed binary already matches the resolved version.
    AlreadyCurrent,
    /// A new binary was downloaded and installed.
    Installed(Version),
    /// The network was unreachable but the installed binary shares the
    /// browser's major, so it was kept as-is.
    KeptExisting(Version),
}

/// Orchestrates probe, catalog, cache, and installer. Each collaborator is
/// independently substitutable so tests can supply fakes.
///
/// Single-call synchronous use: one `update`/`latest_version` call runs to
/// completion, performing at most one catalog round trip and at most one
/// download.
pub struct ResolutionEngine<P, C, S, I> {
    probe: P,
    catalog: C,
    cache: S,
    installer: I,
    config: UpdaterConfig,
    cache_key: String,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl<P, C, S, I> ResolutionEngine<P, C, S, I>
where
    P: BrowserProbe,
    C: RemoteCatalog,
    S: CacheStore,
    I: Installer,
{
    pub fn new(
        probe: P,
        catalog: C,
        cache: S,
        installer: I,
        config: UpdaterConfig,
        cache_key: &str,
    ) -> Self {
        ResolutionEngine {
            probe,
            catalog,
            cache,
            installer,
            config,
            cache_key: cache_key.to_string(),
        }
    }

    /// The engine's installer, e.g. to ask where the driver binary lives.
    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// The effective pin, if any. A literal zero version is an alias for
    /// "no pin", even when the `Pinned` variant was constructed directly
    /// instead of through [`RequiredVersion::pin`].
    fn pinned_version(&self) -> Option<&Version> {
        match &self.config.required_version {
            RequiredVersion::Pinned(pinned) if !pinned.is_zero() => Some(pinned),
            _ => None,
        }
    }

    /// Resolves the driver version the caller should be running.
    ///
    /// Pinned versions return immediately. Otherwise a fresh cache entry
    /// wins; only a stale or absent cache triggers the one catalog round
    /// trip, whose result is persisted. Failures propagate unchanged — no
    /// stale-cache fallback here (the fail-soft path lives in [`update`],
    /// where an installed binary exists to validate against).
    ///
    /// [`update`]: ResolutionEngine::update
    pub async fn latest_version(&self) -> Result<Version, UpdaterError> {
        self.resolve_target().await.map(|(version, _)| version)
    }

    /// Ensures the installed driver matches the resolved version, fetching
    /// at most once. Never leaves the system worse off than before the call.
    pub async fn update(&self) -> Result<UpdateOutcome, UpdaterError> {
        let installed = self.installer.installed_version().await?;

        // A satisfied pin needs neither cache nor network.
        if let Some(pinned) = self.pinned_version() {
            if installed.as_ref() == Some(pinned) {
                debug!("Installed driver already matches pinned version {pinned}");
                return Ok(UpdateOutcome::AlreadyCurrent);
            }
        }

        let (target, url) = match self.resolve_target().await {
            Ok(resolved) => resolved,
            Err(err @ UpdaterError::ConnectionFailed { .. }) => {
                return self.keep_existing_or_fail(installed, err).await;
            }
            Err(err) => return Err(err),
        };

        if installed.as_ref() == Some(&target) {
            debug!("Installed driver already matches resolved version {target}");
            return Ok(UpdateOutcome::AlreadyCurrent);
        }

        if let Err(err) = self.installer.fetch(&url).await {
            return match err {
                UpdaterError::ConnectionFailed { .. } => {
                    self.keep_existing_or_fail(installed, err).await
                }
                other => Err(other),
            };
        }

        // Trust but verify the binary's self-report after install.
        match self.installer.installed_version().await? {
            Some(confirmed) if confirmed == target => {
                info!("Installed driver version {target}");
            }
            other => {
                warn!("Installed driver reports version {other:?} after fetching {target}");
            }
        }
        Ok(UpdateOutcome::Installed(target))
    }

    /// Resolves the target version plus its download URL. The cache records
    /// what was last resolved from the network, never what is on disk.
    async fn resolve_target(&self) -> Result<(Version, String), UpdaterError> {
        if let Some(pinned) = self.pinned_version() {
            return Ok((pinned.clone(), self.catalog.download_url(pinned)));
        }

        if let Some(entry) = self.cache.get(&self.cache_key)? {
            if self.is_fresh(&entry) {
                debug!("Using cached driver version {} for '{}'", entry.version, self.cache_key);
                return Ok((entry.version.clone(), self.catalog.download_url(&entry.version)));
            }
        }

        let browser = self.probe.browser_version().await?;
        let entry = self.catalog.latest_matching(&browser).await?;
        self.cache.put(&self.cache_key, &entry.version, unix_now())?;
        info!("Resolved driver version {} for browser {browser}", entry.version);
        Ok((entry.version, entry.download_url))
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        let ttl = self.config.cache_ttl_secs;
        ttl > 0 && unix_now().saturating_sub(entry.fetched_at) < ttl
    }

    /// Offline policy, as a decision table over {binary present, major match}:
    ///
    ///   binary present, same major as browser  -> keep it, swallow the error
    ///   binary present, different major        -> propagate
    ///   no binary                              -> propagate
    ///
    /// A same-major binary is assumed compatible enough to keep working
    /// offline; anything else cannot guarantee a working setup.
    async fn keep_existing_or_fail(
        &self,
        installed: Option<Version>,
        err: UpdaterError,
    ) -> Result<UpdateOutcome, UpdaterError> {
        let Some(installed) = installed else {
            return Err(err);
        };
        let browser = self.probe.browser_version().await?;
        if installed.major() == browser.major() {
            warn!(
                "Network unavailable, keeping installed driver {installed} \
                 (same major as browser {browser}): {err}"
            );
            Ok(UpdateOutcome::KeptExisting(installed))
        } else {
            Err(err)
        }
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    struct FakeProbe {
        version: Option<Version>,
    }

    #[async_trait]
    impl BrowserProbe for FakeProbe {
        async fn browser_version(&self) -> Result<Version, UpdaterError> {
            self.version.clone().ok_or(UpdaterError::BrowserNotFound)
        }
    }

    enum CatalogBehavior {
        Offer(Version),
        Offline,
        NoMatch,
    }

    struct FakeCatalog {
        behavior: CatalogBehavior,
        calls: AtomicUsize,
    }

    impl FakeCatalog {
        fn new(behavior: CatalogBehavior) -> Self {
            FakeCatalog {
                behavior,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteCatalog for FakeCatalog {
        async fn latest_matching(&self, browser: &Version) -> Result<CatalogEntry, UpdaterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                CatalogBehavior::Offer(version) => Ok(CatalogEntry {
                    version: version.clone(),
                    download_url: self.download_url(version),
                }),
                CatalogBehavior::Offline => Err(UpdaterError::ConnectionFailed {
                    url: "https://vendor.test/".to_string(),
                    reason: "connection refused".to_string(),
                }),
                CatalogBehavior::NoMatch => Err(UpdaterError::VersionNotFound {
                    message: format!(
                        "Unable to find latest point release version for {}. \
                         You appear to be using a non-production version of the browser. \
                         Set an explicit required version.",
                        browser.prefix(3)
                    ),
                }),
            }
        }

        fn download_url(&self, version: &Version) -> String {
            format!("https://vendor.test/{version}/driver.zip")
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        entries: Mutex<HashMap<String, CacheEntry>>,
    }

    impl MemoryCache {
        fn with(key: &str, version: Version, fetched_at: u64) -> Self {
            let cache = MemoryCache::default();
            cache.entries.lock().unwrap().insert(
                key.to_string(),
                CacheEntry {
                    version,
                    fetched_at,
                },
            );
            cache
        }

        fn entry(&self, key: &str) -> Option<CacheEntry> {
            self.entries.lock().unwrap().get(key).cloned()
        }
    }

    impl CacheStore for MemoryCache {
        fn get(&self, key: &str) -> Result<Option<CacheEntry>, UpdaterError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        fn put(&self, key: &str, version: &Version, fetched_at: u64) -> Result<(), UpdaterError> {
            self.entries.lock().unwrap().insert(
                key.to_string(),
                CacheEntry {
                    version: version.clone(),
                    fetched_at,
                },
            );
            Ok(())
        }
    }

    struct FakeInstaller {
        installed: Mutex<Option<Version>>,
        fetches: AtomicUsize,
        offline: bool,
    }

    impl FakeInstaller {
        fn new(installed: Option<Version>) -> Self {
            FakeInstaller {
                installed: Mutex::new(installed),
                fetches: AtomicUsize::new(0),
                offline: false,
            }
        }

        fn offline(installed: Option<Version>) -> Self {
            FakeInstaller {
                installed: Mutex::new(installed),
                fetches: AtomicUsize::new(0),
                offline: true,
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Installer for FakeInstaller {
        async fn fetch(&self, url: &str) -> Result<(), UpdaterError> {
            if self.offline {
                return Err(UpdaterError::ConnectionFailed {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            self.fetches.fetch_add(1, Ordering::SeqCst);
            // Install exactly what the URL names, like the real installer.
            let version_segment = url
                .trim_end_matches("/driver.zip")
                .rsplit('/')
                .next()
                .unwrap();
            *self.installed.lock().unwrap() = Some(v(version_segment));
            Ok(())
        }

        async fn installed_version(&self) -> Result<Option<Version>, UpdaterError> {
            Ok(self.installed.lock().unwrap().clone())
        }
    }

    type TestEngine = ResolutionEngine<FakeProbe, FakeCatalog, MemoryCache, FakeInstaller>;

    fn engine(
        browser: Option<&str>,
        catalog: FakeCatalog,
        cache: MemoryCache,
        installer: FakeInstaller,
        config: UpdaterConfig,
    ) -> TestEngine {
        ResolutionEngine::new(
            FakeProbe {
                version: browser.map(v),
            },
            catalog,
            cache,
            installer,
            config,
            "msedgedriver",
        )
    }

    #[tokio::test]
    async fn pinned_version_needs_no_network_and_no_cache() {
        let config = UpdaterConfig::default()
            .with_required_version(RequiredVersion::pin(v("85.0.564.0")));
        let engine = engine(
            None, // even a missing browser is irrelevant when pinned
            FakeCatalog::new(CatalogBehavior::Offline),
            MemoryCache::default(),
            FakeInstaller::new(None),
            config,
        );

        assert_eq!(engine.latest_version().await.unwrap(), v("85.0.564.0"));
        assert_eq!(engine.catalog.calls(), 0);
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_network_entirely() {
        let cache = MemoryCache::with("msedgedriver", v("91.0.864.41"), unix_now());
        let engine = engine(
            Some("91.0.864.48"),
            FakeCatalog::new(CatalogBehavior::Offline),
            cache,
            FakeInstaller::new(None),
            UpdaterConfig::default(),
        );

        assert_eq!(engine.latest_version().await.unwrap(), v("91.0.864.41"));
        assert_eq!(engine.catalog.calls(), 0);
    }

    #[tokio::test]
    async fn stale_cache_fetches_exactly_once_and_persists() {
        let cache = MemoryCache::with("msedgedriver", v("71.0.3578.137"), 0);
        let engine = engine(
            Some("73.0.3683.68"),
            FakeCatalog::new(CatalogBehavior::Offer(v("73.0.3683.68"))),
            cache,
            FakeInstaller::new(None),
            UpdaterConfig::default(),
        );

        assert_eq!(engine.latest_version().await.unwrap(), v("73.0.3683.68"));
        assert_eq!(engine.catalog.calls(), 1);

        let entry = engine.cache.entry("msedgedriver").unwrap();
        assert_eq!(entry.version, v("73.0.3683.68"));
        assert!(entry.fetched_at > 0);
    }

    #[tokio::test]
    async fn zero_ttl_treats_every_entry_as_stale() {
        let cache = MemoryCache::with("msedgedriver", v("91.0.864.41"), unix_now());
        let engine = engine(
            Some("91.0.864.48"),
            FakeCatalog::new(CatalogBehavior::Offer(v("91.0.864.48"))),
            cache,
            FakeInstaller::new(None),
            UpdaterConfig::default().with_cache_ttl_secs(0),
        );

        assert_eq!(engine.latest_version().await.unwrap(), v("91.0.864.48"));
        assert_eq!(engine.catalog.calls(), 1);
    }

    #[tokio::test]
    async fn latest_version_never_falls_back_to_a_stale_cache() {
        let cache = MemoryCache::with("msedgedriver", v("71.0.3578.137"), 0);
        let engine = engine(
            Some("73.0.3683.68"),
            FakeCatalog::new(CatalogBehavior::Offline),
            cache,
            FakeInstaller::new(None),
            UpdaterConfig::default(),
        );

        let err = engine.latest_version().await.unwrap_err();
        assert!(matches!(err, UpdaterError::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn missing_browser_is_a_hard_blocker() {
        let engine = engine(
            None,
            FakeCatalog::new(CatalogBehavior::Offer(v("91.0.864.48"))),
            MemoryCache::default(),
            FakeInstaller::new(None),
            UpdaterConfig::default(),
        );

        let err = engine.latest_version().await.unwrap_err();
        assert!(matches!(err, UpdaterError::BrowserNotFound));
        assert_eq!(engine.catalog.calls(), 0);
    }

    #[tokio::test]
    async fn update_is_a_noop_when_cached_resolution_matches_installed() {
        let cache = MemoryCache::with("msedgedriver", v("91.0.864.41"), unix_now());
        let engine = engine(
            Some("91.0.864.41"),
            FakeCatalog::new(CatalogBehavior::Offline),
            cache,
            FakeInstaller::new(Some(v("91.0.864.41"))),
            UpdaterConfig::default(),
        );

        assert_eq!(engine.update().await.unwrap(), UpdateOutcome::AlreadyCurrent);
        assert_eq!(engine.catalog.calls(), 0);
        assert_eq!(engine.installer.fetches(), 0);
    }

    #[tokio::test]
    async fn update_is_a_noop_when_pin_matches_installed() {
        let config = UpdaterConfig::default()
            .with_required_version(RequiredVersion::pin(v("85.0.564.0")));
        let engine = engine(
            None,
            FakeCatalog::new(CatalogBehavior::Offline),
            MemoryCache::default(),
            FakeInstaller::new(Some(v("85.0.564.0"))),
            config,
        );

        assert_eq!(engine.update().await.unwrap(), UpdateOutcome::AlreadyCurrent);
        assert_eq!(engine.catalog.calls(), 0);
        assert_eq!(engine.installer.fetches(), 0);
    }

    #[tokio::test]
    async fn update_downloads_once_on_version_mismatch() {
        // Cached resolution is stale, so the catalog is consulted once and
        // the newer driver is installed once.
        let cache = MemoryCache::with("msedgedriver", v("71.0.3578.137"), 0);
        let engine = engine(
            Some("73.0.3683.68"),
            FakeCatalog::new(CatalogBehavior::Offer(v("73.0.3683.68"))),
            cache,
            FakeInstaller::new(Some(v("71.0.3578.137"))),
            UpdaterConfig::default(),
        );

        assert_eq!(
            engine.update().await.unwrap(),
            UpdateOutcome::Installed(v("73.0.3683.68"))
        );
        assert_eq!(engine.catalog.calls(), 1);
        assert_eq!(engine.installer.fetches(), 1);
        assert_eq!(
            engine.installer.installed_version().await.unwrap(),
            Some(v("73.0.3683.68"))
        );
    }

    #[tokio::test]
    async fn offline_with_same_major_binary_keeps_it() {
        let engine = engine(
            Some("73.0.3683.68"),
            FakeCatalog::new(CatalogBehavior::Offline),
            MemoryCache::default(),
            FakeInstaller::new(Some(v("73.0.3683.20"))),
            UpdaterConfig::default(),
        );

        assert_eq!(
            engine.update().await.unwrap(),
            UpdateOutcome::KeptExisting(v("73.0.3683.20"))
        );
        assert_eq!(
            engine.installer.installed_version().await.unwrap(),
            Some(v("73.0.3683.20"))
        );
    }

    #[tokio::test]
    async fn offline_without_a_binary_raises_connection_error() {
        let engine = engine(
            Some("73.0.3683.68"),
            FakeCatalog::new(CatalogBehavior::Offline),
            MemoryCache::default(),
            FakeInstaller::new(None),
            UpdaterConfig::default(),
        );

        let err = engine.update().await.unwrap_err();
        let UpdaterError::ConnectionFailed { url, .. } = err else {
            panic!("expected ConnectionFailed, got {err:?}");
        };
        assert!(url.contains("vendor.test"));
    }

    #[tokio::test]
    async fn offline_with_major_mismatch_raises_connection_error() {
        let engine = engine(
            Some("73.0.3683.68"),
            FakeCatalog::new(CatalogBehavior::Offline),
            MemoryCache::default(),
            FakeInstaller::new(Some(v("71.0.3578.137"))),
            UpdaterConfig::default(),
        );

        let err = engine.update().await.unwrap_err();
        assert!(matches!(err, UpdaterError::ConnectionFailed { .. }));
        // The mismatched binary is left untouched.
        assert_eq!(
            engine.installer.installed_version().await.unwrap(),
            Some(v("71.0.3578.137"))
        );
    }

    #[tokio::test]
    async fn download_failure_offline_also_falls_back_to_same_major_binary() {
        let cache = MemoryCache::with("msedgedriver", v("73.0.3683.68"), unix_now());
        let engine = engine(
            Some("73.0.3683.68"),
            FakeCatalog::new(CatalogBehavior::Offline),
            cache,
            FakeInstaller::offline(Some(v("73.0.3683.20"))),
            UpdaterConfig::default(),
        );

        // Resolution succeeds off the fresh cache; only the download fails.
        assert_eq!(
            engine.update().await.unwrap(),
            UpdateOutcome::KeptExisting(v("73.0.3683.20"))
        );
        assert_eq!(engine.catalog.calls(), 0);
    }

    #[tokio::test]
    async fn version_not_found_propagates_despite_installed_binary() {
        // Fail-soft covers connection failures only; an unpublished browser
        // version is surfaced even when a same-major binary exists.
        let engine = engine(
            Some("100.0.0"),
            FakeCatalog::new(CatalogBehavior::NoMatch),
            MemoryCache::default(),
            FakeInstaller::new(Some(v("100.0.0"))),
            UpdaterConfig::default(),
        );

        let err = engine.update().await.unwrap_err();
        let UpdaterError::VersionNotFound { message } = err else {
            panic!("expected VersionNotFound, got {err:?}");
        };
        assert!(message.contains("100.0.0"));
        assert!(message.contains("non-production"));
    }

    #[tokio::test]
    async fn directly_constructed_zero_pin_still_resolves_to_latest() {
        // Bypassing `RequiredVersion::pin` must not smuggle in a literal-0
        // pin; the engine treats it as "no pin" at resolution time.
        let config = UpdaterConfig::default()
            .with_required_version(RequiredVersion::Pinned(v("0")));
        let engine = engine(
            Some("73.0.3683.68"),
            FakeCatalog::new(CatalogBehavior::Offer(v("73.0.3683.68"))),
            MemoryCache::default(),
            FakeInstaller::new(None),
            config,
        );

        assert_eq!(engine.latest_version().await.unwrap(), v("73.0.3683.68"));
        assert_eq!(engine.catalog.calls(), 1);

        assert_eq!(
            engine.update().await.unwrap(),
            UpdateOutcome::Installed(v("73.0.3683.68"))
        );
        assert_eq!(
            engine.installer.installed_version().await.unwrap(),
            Some(v("73.0.3683.68"))
        );
    }

    #[tokio::test]
    async fn zero_pin_behaves_as_auto() {
        let config = UpdaterConfig::default()
            .with_required_version(RequiredVersion::pin(v("0")));
        let engine = engine(
            Some("73.0.3683.68"),
            FakeCatalog::new(CatalogBehavior::Offer(v("73.0.3683.68"))),
            MemoryCache::default(),
            FakeInstaller::new(None),
            config,
        );

        assert_eq!(engine.latest_version().await.unwrap(), v("73.0.3683.68"));
        assert_eq!(engine.catalog.calls(), 1);
    }
}
