//! Installed-browser detection: locate the browser binary and read its
//! version.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;

use crate::error::UpdaterError;
use crate::version::Version;

/// Reports the installed browser's full version.
///
/// A missing browser is a hard blocker, distinct from a network failure —
/// there is no reasonable fallback when nothing is installed to match
/// against.
#[async_trait]
pub trait BrowserProbe: Send + Sync {
    async fn browser_version(&self) -> Result<Version, UpdaterError>;
}

/// [`BrowserProbe`] backed by the host OS.
///
/// If a path override is provided it is used directly; otherwise the probe
/// searches standard install locations for the named browser. On Windows the
/// product version is read via PowerShell; elsewhere the binary's `--version`
/// output is parsed.
pub struct SystemBrowserProbe {
    browser_name: String,
    path_override: Option<PathBuf>,
}

impl SystemBrowserProbe {
    pub fn new(browser_name: &str) -> Self {
        SystemBrowserProbe {
            browser_name: browser_name.to_string(),
            path_override: None,
        }
    }

    pub fn with_path(browser_name: &str, path: impl Into<PathBuf>) -> Self {
        SystemBrowserProbe {
            browser_name: browser_name.to_string(),
            path_override: Some(path.into()),
        }
    }
}

#[async_trait]
impl BrowserProbe for SystemBrowserProbe {
    async fn browser_version(&self) -> Result<Version, UpdaterError> {
        let path = match &self.path_override {
            Some(p) => p.clone(),
            None => find_browser_path(&self.browser_name).ok_or(UpdaterError::BrowserNotFound)?,
        };
        let raw = read_version_string(&self.browser_name, &path).await?;
        Version::parse(&raw).map_err(|_| UpdaterError::BrowserVersionParsingError { output: raw })
    }
}

fn find_browser_path(browser_name: &str) -> Option<PathBuf> {
    if browser_name != "edge" && browser_name != "chrome" {
        return None;
    }
    find_browser_path_system(browser_name)
}

// --- Platform-Specific Implementations ---

#[cfg(target_os = "windows")]
fn find_browser_path_system(browser_name: &str) -> Option<PathBuf> {
    let program_files = std::env::var("ProgramFiles").ok()?;
    let program_files_x86 = std::env::var("ProgramFiles(x86)").ok()?;
    let local_appdata = std::env::var("LOCALAPPDATA").ok()?;

    let (sub_path, exe_name) = if browser_name.contains("edge") {
        ("Microsoft\\Edge\\Application", "msedge.exe")
    } else {
        ("Google\\Chrome\\Application", "chrome.exe")
    };

    [program_files, program_files_x86, local_appdata]
        .into_iter()
        .map(|base| Path::new(&base).join(sub_path).join(exe_name))
        .find(|path| path.exists())
}

#[cfg(target_os = "macos")]
fn find_browser_path_system(browser_name: &str) -> Option<PathBuf> {
    let path_str = if browser_name.contains("edge") {
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"
    } else {
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"
    };
    let path = PathBuf::from(path_str);
    if path.exists() { Some(path) } else { None }
}

#[cfg(target_os = "linux")]
fn find_browser_path_system(browser_name: &str) -> Option<PathBuf> {
    let candidates = if browser_name.contains("edge") {
        vec!["microsoft-edge", "microsoft-edge-stable", "microsoft-edge-beta"]
    } else {
        vec![
            "google-chrome",
            "google-chrome-stable",
            "chromium-browser",
            "chromium",
        ]
    };

    candidates
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

#[cfg(target_os = "windows")]
async fn read_version_string(_browser_name: &str, path: &Path) -> Result<String, UpdaterError> {
    let command_str = format!(
        "(Get-Command '{}').Version.ToString()",
        path.to_string_lossy()
    );
    let output = Command::new("powershell")
        .args(["-Command", &command_str])
        .output()
        .map_err(|e| UpdaterError::CommandExecutionError {
            command: command_str.clone(),
            source: e,
        })?;

    let version = String::from_utf8(output.stdout).map_err(|e| {
        UpdaterError::CommandOutputParsingError {
            command: command_str,
            source: e,
        }
    })?;
    Ok(version.trim().to_string())
}

#[cfg(not(target_os = "windows"))]
async fn read_version_string(_browser_name: &str, path: &Path) -> Result<String, UpdaterError> {
    let output = Command::new(path)
        .arg("--version")
        .output()
        .map_err(|e| UpdaterError::CommandExecutionError {
            command: format!("'{}' --version", path.to_string_lossy()),
            source: e,
        })?;

    let version_str = String::from_utf8(output.stdout).map_err(|e| {
        UpdaterError::CommandOutputParsingError {
            command: format!("'{}' --version", path.to_string_lossy()),
            source: e,
        }
    })?;

    extract_version_token(&version_str)
}

/// Picks the first dotted numeric token out of e.g.
/// `Microsoft Edge 91.0.864.41` or `Google Chrome 115.0.5790.170`.
pub(crate) fn extract_version_token(output: &str) -> Result<String, UpdaterError> {
    output
        .split_whitespace()
        .find(|s| {
            s.chars().next().is_some_and(|c| c.is_ascii_digit()) && s.contains('.')
        })
        .map(|s| s.to_string())
        .ok_or_else(|| UpdaterError::BrowserVersionParsingError {
            output: output.to_string(),
        })
}

// --- Tests ---
