//! Driver binary install: download, extract, and atomically place the
//! executable, plus reading the installed binary's self-reported version.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

use crate::browser::extract_version_token;
use crate::error::UpdaterError;
use crate::version::Version;

/// Installs driver binaries and reports what is currently installed.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Downloads the archive at `url` and installs the driver executable.
    /// Must be atomic from the caller's point of view: a failed download
    /// never leaves a partial binary at the final path.
    async fn fetch(&self, url: &str) -> Result<(), UpdaterError>;

    /// The version the installed binary reports for itself, or `None` when
    /// no binary exists at the expected path.
    async fn installed_version(&self) -> Result<Option<Version>, UpdaterError>;
}

/// Default [`Installer`]: downloads into a temporary staging directory,
/// extracts there, and only then renames the executable into place.
pub struct DriverInstaller {
    install_dir: PathBuf,
    driver_name: String,
}

impl DriverInstaller {
    pub fn new(install_dir: impl Into<PathBuf>, driver_name: &str) -> Self {
        DriverInstaller {
            install_dir: install_dir.into(),
            driver_name: driver_name.to_string(),
        }
    }

    fn exe_name(&self) -> String {
        if cfg!(target_os = "windows") {
            format!("{}.exe", self.driver_name)
        } else {
            self.driver_name.clone()
        }
    }

    /// Final path of the installed driver executable.
    pub fn driver_path(&self) -> PathBuf {
        dunce::simplified(&self.install_dir.join(self.exe_name())).to_path_buf()
    }
}

#[async_trait]
impl Installer for DriverInstaller {
    async fn fetch(&self, url: &str) -> Result<(), UpdaterError> {
        // Stage everything in a temporary directory; nothing touches the
        // final path until the executable is fully on disk.
        let temp_dir = tempfile::Builder::new()
            .prefix("webdriver-updater-")
            .tempdir()
            .map_err(|e| UpdaterError::IoError {
                path: PathBuf::from("temp"),
                source: e,
            })?;
        let archive_path = temp_dir.path().join("driver.zip");
        let extract_dir = temp_dir.path().join("extracted");

        download_file(url, &archive_path).await?;
        unzip_file(&archive_path, &extract_dir).await?;
        let staged = find_driver_executable(&extract_dir, &self.exe_name())?;

        fs::create_dir_all(&self.install_dir)
            .await
            .map_err(|e| UpdaterError::IoError {
                path: self.install_dir.clone(),
                source: e,
            })?;

        // The staging dir may be on another filesystem, so copy next to the
        // final path first and rename last.
        let final_path = self.driver_path();
        let part_path = self.install_dir.join(format!("{}.part", self.exe_name()));
        if let Err(e) = fs::copy(&staged, &part_path).await {
            // A half-written staging file must not linger in the install dir.
            let _ = fs::remove_file(&part_path).await;
            return Err(UpdaterError::IoError {
                path: part_path.clone(),
                source: e,
            });
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&part_path, std::fs::Permissions::from_mode(0o755))
            {
                let _ = fs::remove_file(&part_path).await;
                return Err(UpdaterError::IoError {
                    path: part_path.clone(),
                    source: e,
                });
            }
        }

        fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| UpdaterError::IoError {
                path: final_path.clone(),
                source: e,
            })?;

        debug!("Installed driver binary at {:?}", final_path);
        Ok(())
    }

    async fn installed_version(&self) -> Result<Option<Version>, UpdaterError> {
        let path = self.driver_path();
        if !path.exists() {
            return Ok(None);
        }

        let mut command = tokio::process::Command::new(&path);
        command.arg("--version");
        let output = command
            .output()
            .await
            .map_err(|e| UpdaterError::CommandExecutionError {
                command: format!("{command:?}"),
                source: e,
            })?;

        if !output.status.success() {
            return Err(UpdaterError::InstallFailed(format!(
                "Driver at {path:?} exited with a non-zero status when asked for its version."
            )));
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| {
            UpdaterError::CommandOutputParsingError {
                command: format!("{command:?}"),
                source: e,
            }
        })?;

        // e.g. "Microsoft Edge WebDriver 91.0.864.41 (...)"
        let token = extract_version_token(&stdout)?;
        Ok(Some(Version::parse(&token)?))
    }
}

/// Downloads a file from a given URL and saves it to a destination path.
/// Transport-level failures normalize to `ConnectionFailed`.
async fn download_file(url: &str, dest_path: &Path) -> Result<(), UpdaterError> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| UpdaterError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| UpdaterError::connection(url, e))?
        .error_for_status()
        .map_err(|e| UpdaterError::connection(url, e))?;

    let mut dest_file = File::create(dest_path)
        .await
        .map_err(|e| UpdaterError::IoError {
            path: dest_path.to_path_buf(),
            source: e,
        })?;

    let content = response
        .bytes()
        .await
        .map_err(|e| UpdaterError::connection(url, e))?;
    dest_file
        .write_all(&content)
        .await
        .map_err(|e| UpdaterError::IoError {
            path: dest_path.to_path_buf(),
            source: e,
        })?;

    Ok(())
}

/// Decompresses a .zip archive to a specified directory.
///
/// The core zip logic is synchronous, so it runs under `spawn_blocking` to
/// avoid blocking the Tokio runtime.
async fn unzip_file(archive_path: &Path, extract_to: &Path) -> Result<(), UpdaterError> {
    let archive_path_buf = archive_path.to_path_buf();
    let extract_to_buf = extract_to.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive_path_buf).map_err(|e| UpdaterError::IoError {
            path: archive_path_buf.clone(),
            source: e,
        })?;

        let mut archive = zip::ZipArchive::new(file).map_err(|e| UpdaterError::ZipError {
            path: archive_path_buf.clone(),
            source: e,
        })?;

        std::fs::create_dir_all(&extract_to_buf).map_err(|e| UpdaterError::IoError {
            path: extract_to_buf.clone(),
            source: e,
        })?;

        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(|e| UpdaterError::ZipError {
                path: archive_path_buf.clone(),
                source: e,
            })?;

            let outpath = match file.enclosed_name() {
                Some(path) => extract_to_buf.join(path),
                None => continue,
            };

            if file.name().ends_with('/') {
                std::fs::create_dir_all(&outpath).map_err(|e| UpdaterError::IoError {
                    path: outpath,
                    source: e,
                })?;
            } else {
                if let Some(p) = outpath.parent() {
                    if !p.exists() {
                        std::fs::create_dir_all(p).map_err(|e| UpdaterError::IoError {
                            path: p.to_path_buf(),
                            source: e,
                        })?;
                    }
                }

                let mut outfile =
                    std::fs::File::create(&outpath).map_err(|e| UpdaterError::IoError {
                        path: outpath.clone(),
                        source: e,
                    })?;

                std::io::copy(&mut file, &mut outfile).map_err(|e| UpdaterError::IoError {
                    path: outpath.clone(),
                    source: e,
                })?;

                // Preserve executable bits recorded in the archive.
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Some(mode) = file.unix_mode() {
                        std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                            .map_err(|e| UpdaterError::IoError {
                                path: outpath,
                                source: e,
                            })?;
                    }
                }
            }
        }
        Ok(())
    })
    .await
    .unwrap() // Propagate panics from the blocking task.
}

/// Searches a directory for the driver executable file. Archives sometimes
/// nest the binary under a top-level directory.
fn find_driver_executable(search_path: &Path, exe_name: &str) -> Result<PathBuf, UpdaterError> {
    for entry in WalkDir::new(search_path) {
        let entry = entry.map_err(|e| UpdaterError::IoError {
            path: e.path().unwrap_or(search_path).to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("WalkDir error")),
        })?;
        if let Some(file_name) = entry.path().file_name().and_then(|n| n.to_str()) {
            if file_name == exe_name {
                return Ok(entry.path().to_path_buf());
            }
        }
    }

    Err(UpdaterError::DriverExecutableNotFound {
        path: search_path.to_path_buf(),
    })
}

// --- Tests ---
