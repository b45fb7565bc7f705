//! Vendor release listing: fetch, parse, and match against a browser version.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::UpdaterError;
use crate::version::Version;

/// One published release extracted from the vendor listing. Ephemeral —
/// produced fresh per fetch, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub version: Version,
    pub download_url: String,
}

/// How the vendor keys its listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Releases are keyed per `major.minor.build` point release; the browser
    /// must match on its 3-component prefix (msedgedriver style).
    PerPointRelease,
    /// Releases are keyed coarsely per major; the newest entry sharing the
    /// browser's major wins (chromedriver style).
    PerMajor,
}

/// Source of published driver releases.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// One network round trip: fetch the listing and return the best release
    /// for the given browser version.
    async fn latest_matching(&self, browser: &Version) -> Result<CatalogEntry, UpdaterError>;

    /// Synthesizes the download URL for a known version without touching the
    /// network. Used for pinned versions and cache hits.
    fn download_url(&self, version: &Version) -> String;
}

// Archive links look like `.../91.0.864.41/edgedriver_win64.zip`; the
// version is the parent path segment.
static ARCHIVE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:https?://[^\s"'<>]+/)?(\d+(?:\.\d+){1,3})/[\w.-]+\.zip"#)
        .expect("archive link pattern is valid")
});

/// [`RemoteCatalog`] backed by the vendor's published markup listing.
pub struct VendorCatalog {
    client: reqwest::Client,
    /// Base URL serving both the listing document and the per-version
    /// download paths.
    base_url: String,
    /// Platform-specific archive file name, e.g. `edgedriver_linux64.zip`.
    archive_name: String,
    strategy: MatchStrategy,
}

impl VendorCatalog {
    pub fn new(base_url: &str, archive_name: &str, strategy: MatchStrategy) -> Self {
        VendorCatalog {
            client: reqwest::Client::builder()
                .user_agent("webdriver-updater")
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            archive_name: archive_name.to_string(),
            strategy,
        }
    }

    /// Scans the listing for archive links and groups them per version.
    /// Multiple platform links per version reduce to one canonical URL,
    /// preferring this catalog's own platform archive.
    fn parse_listing(&self, body: &str) -> Vec<CatalogEntry> {
        let mut links: HashMap<Version, Vec<String>> = HashMap::new();
        for caps in ARCHIVE_LINK.captures_iter(body) {
            let Ok(version) = Version::parse(&caps[1]) else {
                continue;
            };
            let link = caps[0].to_string();
            let url = if link.starts_with("http://") || link.starts_with("https://") {
                link
            } else {
                format!("{}/{}", self.base_url, link)
            };
            links.entry(version).or_default().push(url);
        }

        links
            .into_iter()
            .map(|(version, urls)| {
                let canonical = urls
                    .iter()
                    .find(|u| u.ends_with(&self.archive_name))
                    .unwrap_or(&urls[0])
                    .clone();
                CatalogEntry {
                    version,
                    download_url: canonical,
                }
            })
            .collect()
    }

    fn select(
        &self,
        entries: Vec<CatalogEntry>,
        browser: &Version,
    ) -> Result<CatalogEntry, UpdaterError> {
        let point_release = browser.prefix(3);
        let same_major: Vec<CatalogEntry> = entries
            .into_iter()
            .filter(|e| e.version.major() == browser.major())
            .collect();

        // No entry shares the browser's major at all: the major falls outside
        // the catalog's known range, which usually means a beta/dev channel.
        let Some(newest_of_major) = same_major
            .iter()
            .max_by(|a, b| a.version.cmp(&b.version))
            .cloned()
        else {
            return Err(UpdaterError::VersionNotFound {
                message: format!(
                    "Unable to find latest point release version for {point_release}. \
                     You appear to be using a non-production version of the browser. \
                     Set an explicit required version."
                ),
            });
        };

        match self.strategy {
            MatchStrategy::PerMajor => Ok(newest_of_major),
            MatchStrategy::PerPointRelease => same_major
                .into_iter()
                .filter(|e| point_release.is_prefix_of(&e.version))
                .max_by(|a, b| a.version.cmp(&b.version))
                .ok_or_else(|| UpdaterError::VersionNotFound {
                    message: format!(
                        "Unable to find latest point release version for {point_release}. \
                         Set an explicit required version."
                    ),
                }),
        }
    }
}

#[async_trait]
impl RemoteCatalog for VendorCatalog {
    async fn latest_matching(&self, browser: &Version) -> Result<CatalogEntry, UpdaterError> {
        let url = format!("{}/", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UpdaterError::connection(&url, e))?
            .error_for_status()
            .map_err(|e| UpdaterError::connection(&url, e))?;
        let body = response
            .text()
            .await
            .map_err(|e| UpdaterError::connection(&url, e))?;

        let entries = self.parse_listing(&body);
        debug!("Vendor listing at {url} yielded {} release entries", entries.len());
        self.select(entries, browser)
    }

    fn download_url(&self, version: &Version) -> String {
        format!("{}/{}/{}", self.base_url, version, self.archive_name)
    }
}

// --- Tests ---
