use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::debug;

use crate::error::{EngineError, Result};

pub const USER_AGENT: &str = "tacklebox";

pub fn metadata_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(10))
        .timeout_write(Duration::from_secs(10))
        .build()
}

pub fn download_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(60))
        .timeout_write(Duration::from_secs(60))
        .build()
}

/// Removes the staged directory on drop unless the caller disarms it, so a
/// failed download or extraction does not strand a half-written package in a
/// path a later install could mistake for a payload.
pub struct StagingGuard {
    path: PathBuf,
    armed: bool,
}

impl StagingGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

pub fn temp_root(data_dir: &Path) -> Result<PathBuf> {
    let dir = data_dir.join("temp");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn staging_dir(data_dir: &Path, label: &str) -> Result<PathBuf> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = temp_root(data_dir)?.join(format!("{label}_{stamp}"));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn download_file(url: &str, dest: &Path) -> Result<()> {
    debug!(url, "downloading");
    let response = download_agent()
        .get(url)
        .set("User-Agent", USER_AGENT)
        .call()
        .map_err(|err| EngineError::transport(format!("download {url}"), err))?;
    let mut reader = response.into_reader();
    let mut file = File::create(dest)?;
    io::copy(&mut reader, &mut file)
        .map_err(|err| EngineError::transport(format!("write {}", dest.display()), err))?;
    Ok(())
}

pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|err| EngineError::transport(format!("open archive {}", archive.display()), err))?;
    zip.extract(dest)
        .map_err(|err| EngineError::transport(format!("extract {}", archive.display()), err))?;
    Ok(())
}

/// Downloads a package zip and extracts it into a fresh staging directory.
/// On success the guard is handed to the caller still armed; the caller
/// disarms it only once the payload has been moved out.
pub fn fetch_package(url: &str, data_dir: &Path, label: &str) -> Result<StagingGuard> {
    let staging = staging_dir(data_dir, label)?;
    let guard = StagingGuard::new(staging);
    let archive = guard.path().join("package.zip");
    download_file(url, &archive)?;
    let extracted = guard.path().join("extracted");
    fs::create_dir_all(&extracted)?;
    extract_zip(&archive, &extracted)?;
    Ok(guard)
}

pub fn extracted_root(guard: &StagingGuard) -> PathBuf {
    guard.path().join("extracted")
}

/// Clears leftover staging directories from interrupted runs.
pub fn delete_temp_files(data_dir: &Path) -> Result<usize> {
    let root = temp_root(data_dir)?;
    let mut removed = 0;
    for entry in fs::read_dir(&root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let removed_ok = if entry.path().is_dir() {
            fs::remove_dir_all(entry.path()).is_ok()
        } else {
            fs::remove_file(entry.path()).is_ok()
        };
        if removed_ok {
            removed += 1;
        }
    }
    Ok(removed)
}
