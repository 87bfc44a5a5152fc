use std::{fs, path::{Path, PathBuf}};
use tracing::info;

use crate::config::Settings;
use crate::error::{EngineError, Result};
use crate::lifecycle::copy_dir_recursive;
use crate::transport;
use crate::update;

pub const LOADER_DIR: &str = "GDWeave";
pub const LOADER_DISABLED_DIR: &str = "GDWeave.disabled";
pub const LOADER_DOWNLOAD_URL: &str =
    "https://github.com/NotNite/GDWeave/releases/latest/download/GDWeave.zip";
const LOADER_SHIM_DLL: &str = "winmm.dll";

pub fn loader_dir(game_path: &Path) -> PathBuf {
    game_path.join(LOADER_DIR)
}

pub fn is_installed(game_path: &Path) -> bool {
    loader_dir(game_path).exists() || game_path.join(LOADER_DISABLED_DIR).exists()
}

pub fn is_enabled(game_path: &Path) -> bool {
    loader_dir(game_path).exists()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Enabled,
    Disabled,
    NotInstalled,
}

pub fn state(game_path: &Path) -> LoaderState {
    if is_enabled(game_path) {
        LoaderState::Enabled
    } else if is_installed(game_path) {
        LoaderState::Disabled
    } else {
        LoaderState::NotInstalled
    }
}

/// Flips the loader between active and dormant by renaming its directory,
/// which leaves every installed mod's files in place.
pub fn toggle(game_path: &Path) -> Result<LoaderState> {
    let enabled = loader_dir(game_path);
    let disabled = game_path.join(LOADER_DISABLED_DIR);
    if enabled.exists() {
        fs::rename(&enabled, &disabled)?;
        info!("loader disabled");
        Ok(LoaderState::Disabled)
    } else if disabled.exists() {
        fs::rename(&disabled, &enabled)?;
        info!("loader enabled");
        Ok(LoaderState::Enabled)
    } else {
        Err(EngineError::NotInstalled("GDWeave".to_string()))
    }
}

/// Installs or updates the loader: the release zip is fetched and staged,
/// the existing `Mods/` and `configs/` trees are parked in the staging dir,
/// the loader directory is replaced wholesale, and the parked trees are
/// restored. The freshly recorded loader version is returned for the caller
/// to persist in settings.
pub fn install_or_update(data_dir: &Path, game_path: &Path, settings: &mut Settings) -> Result<String> {
    let target = loader_dir(game_path);
    let mut guard = transport::StagingGuard::new(transport::staging_dir(data_dir, "gdweave")?);

    let archive = guard.path().join("GDWeave.zip");
    transport::download_file(LOADER_DOWNLOAD_URL, &archive)?;
    let extracted = guard.path().join("extracted");
    fs::create_dir_all(&extracted)?;
    transport::extract_zip(&archive, &extracted)?;

    let extracted_loader = extracted.join(LOADER_DIR);
    if !extracted_loader.exists() {
        return Err(EngineError::transport(
            "unpack loader release",
            "archive does not contain a GDWeave directory",
        ));
    }

    // park mods and configs so the wholesale replace below cannot eat them
    let backup = guard.path().join("backup");
    for kept in ["Mods", "configs"] {
        let src = target.join(kept);
        if src.exists() {
            copy_dir_recursive(&src, &backup.join(kept))?;
        }
    }

    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    fs::rename(&extracted_loader, &target).or_else(|_| -> std::io::Result<()> {
        copy_dir_recursive(&extracted_loader, &target)?;
        fs::remove_dir_all(&extracted_loader)
    })?;

    let shim = extracted.join(LOADER_SHIM_DLL);
    if shim.exists() {
        fs::copy(&shim, game_path.join(LOADER_SHIM_DLL))?;
    }

    for kept in ["Mods", "configs"] {
        let parked = backup.join(kept);
        if parked.exists() {
            copy_dir_recursive(&parked, &target.join(kept))?;
        }
    }
    guard.disarm();
    let _ = fs::remove_dir_all(guard.path());

    let version = update::latest_loader_version();
    settings.gdweave_version = Some(version.clone());
    info!(%version, "loader installed");
    Ok(version)
}

/// Removes the loader and its shim from the game directory. Mods stay in the
/// local stores and can be re-materialized after a reinstall.
pub fn uninstall(game_path: &Path, settings: &mut Settings) -> Result<()> {
    for dir in [LOADER_DIR, LOADER_DISABLED_DIR] {
        let path = game_path.join(dir);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
    }
    let shim = game_path.join(LOADER_SHIM_DLL);
    if shim.exists() {
        fs::remove_file(&shim)?;
    }
    settings.gdweave_version = None;
    info!("loader uninstalled");
    Ok(())
}
