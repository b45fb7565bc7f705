use std::path::PathBuf;
use thiserror::Error;

/// Error type for all possible failures in the library.
#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Invalid version string '{input}'")]
    InvalidVersion { input: String },

    /// The vendor catalog was reachable but held no release matching the
    /// browser's version. The message names the offending version and tells
    /// the user how to pin one explicitly.
    #[error("{message}")]
    VersionNotFound { message: String },

    /// Any transport-level failure talking to the vendor: DNS, connect
    /// refused, timeout, TLS, or a non-success HTTP status. All layers are
    /// normalized to this one kind so callers never special-case transports.
    #[error("Unable to reach '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Browser not found. Please specify the path manually or ensure it's in a standard location.")]
    BrowserNotFound,

    #[error("Failed to execute command '{command}': {source}")]
    CommandExecutionError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' output could not be parsed: {source}")]
    CommandOutputParsingError {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("Failed to parse browser version from output: '{output}'")]
    BrowserVersionParsingError { output: String },

    #[error("I/O error accessing path '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decompress zip file to '{path}': {source}")]
    ZipError {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Driver executable not found in the downloaded archive at '{path}'")]
    DriverExecutableNotFound { path: PathBuf },

    #[error("Driver install failed: {0}")]
    InstallFailed(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl UpdaterError {
    /// Normalizes a reqwest failure into [`UpdaterError::ConnectionFailed`],
    /// tagged with the URL that was attempted.
    pub(crate) fn connection(url: &str, err: reqwest::Error) -> Self {
        UpdaterError::ConnectionFailed {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
