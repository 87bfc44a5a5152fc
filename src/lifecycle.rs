use std::{
    fs, io,
    path::Path,
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::{self, CatalogEntry};
use crate::error::{EngineError, Result};
use crate::library::{find_installed, refresh_cache, save_descriptor, ModDescriptor};
use crate::package;
use crate::store::{self, derive_id, ModStore, Scope};
use crate::transport;
use crate::update::ReleaseInfo;

/// Built-in curated packs: a pack names titles, not ids, because its members
/// may not be installed yet.
pub const MOD_PACKS: &[(&str, &[&str])] = &[
    (
        "Vanilla+",
        &["WebfishingPlus", "SprintToggle", "QuickGamble", "BorderlessFix", "SaveCanvas"],
    ),
    (
        "Quality of Life",
        &[
            "WebfishingPlus",
            "SprintToggle",
            "QuickGamble",
            "BorderlessFix",
            "SaveCanvas",
            "EventAlert",
            "Automasher",
        ],
    ),
    (
        "Accessibility",
        &["Automasher", "EventAlert", "SprintToggle", "LegibleChat", "BionicFisher"],
    ),
    (
        "Fishing Enthusiast",
        &["Fishing+", "BionicFisher", "Lure", "MidiStrummer"],
    ),
    (
        "Visual Enhancements",
        &["BorderlessFix", "SaveCanvas", "WebfishingRichPresence"],
    ),
];

pub fn pack_titles(name: &str) -> Option<&'static [&'static str]> {
    MOD_PACKS
        .iter()
        .find(|(pack, _)| pack.eq_ignore_ascii_case(name))
        .map(|(_, titles)| *titles)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Changed,
    /// The mod was already in the requested state; reported, not an error.
    NoOp,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn record(&mut self, label: &str, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded.push(label.to_string()),
            Err(err) => self.failed.push((label.to_string(), err.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct PackReport {
    pub pack: String,
    pub disabled: usize,
    pub members: BatchReport,
}

/// Mirrors a mod's owning-store directory into the game's plugin directory by
/// wholesale replacement: the destination is deleted if present, then copied
/// in full, so an enabled mod's game copy is always an exact image of its
/// store copy.
pub fn sync_to_game(store: &ModStore, game_path: &Path, descriptor: &ModDescriptor) -> Result<()> {
    let source = store.mod_dir(&descriptor.id, descriptor.scope());
    if !source.exists() {
        return Err(EngineError::NotInstalled(descriptor.id.clone()));
    }
    let dest = store::game_mod_dir(game_path, &descriptor.id);
    mirror_dir(&source, &dest).map_err(|source| EngineError::Sync {
        id: descriptor.id.clone(),
        game_dir: dest.clone(),
        source,
    })?;
    debug!(id = %descriptor.id, "synchronized into game directory");
    Ok(())
}

pub fn remove_from_game(game_path: &Path, id: &str) -> io::Result<bool> {
    let dest = store::game_mod_dir(game_path, id);
    if !dest.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(&dest)?;
    Ok(true)
}

/// Installs a catalog entry from its already-downloaded, already-extracted
/// package directory. Conflict rules: a third-party occupant of the id blocks
/// the install outright; a managed occupant is replaced (implicit update).
pub fn install_extracted(
    store: &ModStore,
    data_dir: &Path,
    game_path: &Path,
    extracted: &Path,
    entry: &CatalogEntry,
    release: Option<&ReleaseInfo>,
) -> Result<ModDescriptor> {
    let (manifest_path, manifest) = package::locate_and_read(extracted)?;
    let id = derive_id(manifest.id.as_deref(), Some(&entry.title))?;

    if store.mod_exists(&id, Scope::ThirdParty) {
        return Err(EngineError::Conflict {
            id,
            existing: Scope::ThirdParty,
        });
    }
    let dest = store.mod_dir(&id, Scope::Managed);
    if dest.exists() {
        info!(%id, "replacing managed mod with fresh install");
        fs::remove_dir_all(&dest)?;
        let _ = remove_from_game(game_path, &id);
    }

    let payload = manifest_path.parent().unwrap_or(extracted);
    move_dir(payload, &dest)?;

    let version = match manifest.version.as_deref() {
        Some(version) => version.to_string(),
        None => release
            .map(|release| release.version.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
    };
    let descriptor = ModDescriptor {
        id: id.clone(),
        title: entry.title.clone(),
        author: entry
            .author
            .clone()
            .unwrap_or_else(|| manifest.author()),
        description: entry
            .description
            .clone()
            .unwrap_or_else(|| manifest.description()),
        version,
        enabled: true,
        third_party: false,
        published_at: release.and_then(|release| release.published_at.clone()),
        download: Some(entry.download.clone()),
    };
    save_descriptor(&dest, &descriptor)?;
    sync_to_game(store, game_path, &descriptor)?;
    refresh_cache(store, data_dir);
    info!(%id, version = %descriptor.version, "installed mod");
    Ok(descriptor)
}

/// Full install: fetch the package over the transport, then hand the
/// extracted tree to `install_extracted`. Staging is cleaned up on every
/// path; a failed download may leave artifacts under the temp root for
/// manual cleanup, never under the stores.
pub fn install(
    store: &ModStore,
    data_dir: &Path,
    game_path: &Path,
    entry: &CatalogEntry,
    release: Option<&ReleaseInfo>,
) -> Result<ModDescriptor> {
    let guard = transport::fetch_package(&entry.download, data_dir, "install")?;
    let extracted = transport::extracted_root(&guard);
    install_extracted(store, data_dir, game_path, &extracted, entry, release)
}

/// Sequential batch install. One mod's failure is recorded and the batch
/// continues; there is no cross-mod rollback.
pub fn install_many(
    store: &ModStore,
    data_dir: &Path,
    game_path: &Path,
    entries: &[CatalogEntry],
) -> BatchReport {
    let mut report = BatchReport::default();
    for entry in entries {
        let release = crate::update::query_release(&entry.download).ok();
        let result = install(store, data_dir, game_path, entry, release.as_ref())
            .map(|_| ());
        if let Err(err) = &result {
            warn!(title = %entry.title, "install failed: {err}");
        }
        report.record(&entry.title, result);
    }
    report
}

/// Imports an arbitrary package zip into the third-party subtree. The id
/// conflict check is symmetric: an occupant in either scope blocks the
/// import, and the caller must uninstall it first.
pub fn import_package(
    store: &ModStore,
    data_dir: &Path,
    game_path: &Path,
    archive: &Path,
) -> Result<ModDescriptor> {
    let staging = transport::staging_dir(data_dir, "import")?;
    let guard = transport::StagingGuard::new(staging);
    transport::extract_zip(archive, guard.path())?;

    let (manifest_path, manifest) = package::locate_and_read(guard.path())?;
    let id = derive_id(manifest.id.as_deref(), manifest.name.as_deref())?;

    if let Some(existing) = store.scope_of(&id) {
        return Err(EngineError::Conflict { id, existing });
    }

    let dest = store.mod_dir(&id, Scope::ThirdParty);
    let payload = manifest_path.parent().unwrap_or_else(|| guard.path());
    move_dir(payload, &dest)?;

    let descriptor = ModDescriptor {
        id: id.clone(),
        title: manifest.title(),
        author: manifest.author(),
        description: manifest.description(),
        version: manifest.version(),
        enabled: true,
        third_party: true,
        published_at: None,
        download: None,
    };
    save_descriptor(&dest, &descriptor)?;
    sync_to_game(store, game_path, &descriptor)?;
    refresh_cache(store, data_dir);
    info!(%id, "imported third-party mod");
    Ok(descriptor)
}

/// Marks a mod enabled and materializes it into the game directory. The
/// descriptor is persisted before the copy, so a copy failure surfaces as
/// `Sync` divergence rather than silently rolling the flag back.
pub fn enable(
    store: &ModStore,
    data_dir: &Path,
    game_path: &Path,
    id: &str,
) -> Result<ToggleOutcome> {
    let mut descriptor =
        find_installed(store, id)?.ok_or_else(|| EngineError::NotInstalled(id.to_string()))?;
    if descriptor.enabled {
        return Ok(ToggleOutcome::NoOp);
    }
    descriptor.enabled = true;
    save_descriptor(&store.mod_dir(id, descriptor.scope()), &descriptor)?;
    let synced = sync_to_game(store, game_path, &descriptor);
    refresh_cache(store, data_dir);
    synced?;
    info!(%id, "enabled mod");
    Ok(ToggleOutcome::Changed)
}

/// Marks a mod disabled and removes its game-directory copy. A removal
/// failure after the flag is persisted is reported as partial.
pub fn disable(
    store: &ModStore,
    data_dir: &Path,
    game_path: &Path,
    id: &str,
) -> Result<ToggleOutcome> {
    let mut descriptor =
        find_installed(store, id)?.ok_or_else(|| EngineError::NotInstalled(id.to_string()))?;
    if !descriptor.enabled {
        return Ok(ToggleOutcome::NoOp);
    }
    descriptor.enabled = false;
    save_descriptor(&store.mod_dir(id, descriptor.scope()), &descriptor)?;
    let removed = remove_from_game(game_path, id);
    refresh_cache(store, data_dir);
    if let Err(source) = removed {
        return Err(EngineError::PartialRemoval {
            id: id.to_string(),
            game_dir: store::game_mod_dir(game_path, id),
            source,
        });
    }
    info!(%id, "disabled mod");
    Ok(ToggleOutcome::Changed)
}

/// Removes a mod from its owning store and from the game directory. Either
/// copy being absent already is fine; a store copy removed while the game
/// copy is stuck (say, locked by a running game) is a partial removal, not a
/// success.
pub fn uninstall(store: &ModStore, data_dir: &Path, game_path: &Path, id: &str) -> Result<()> {
    let mut found = false;
    for scope in [Scope::Managed, Scope::ThirdParty] {
        let dir = store.mod_dir(id, scope);
        if dir.exists() {
            found = true;
            fs::remove_dir_all(&dir)?;
        }
    }
    let game_dir = store::game_mod_dir(game_path, id);
    let game_result = if game_dir.exists() {
        found = true;
        fs::remove_dir_all(&game_dir)
    } else {
        Ok(())
    };
    refresh_cache(store, data_dir);

    if !found {
        return Err(EngineError::NotInstalled(id.to_string()));
    }
    if let Err(source) = game_result {
        return Err(EngineError::PartialRemoval {
            id: id.to_string(),
            game_dir,
            source,
        });
    }
    info!(%id, "uninstalled mod");
    Ok(())
}

/// Applies a curated pack: every installed mod is disabled first, then each
/// pack member is enabled by title, installing it from the catalog when it is
/// not present locally. No atomicity — a mid-batch failure leaves the pack
/// partially applied, and the report says which members landed.
pub fn apply_pack(
    store: &ModStore,
    data_dir: &Path,
    game_path: &Path,
    pack_name: &str,
    titles: &[&str],
    catalog_entries: &[CatalogEntry],
) -> PackReport {
    let mut disabled = 0;
    for descriptor in crate::library::installed_mods(store) {
        match disable(store, data_dir, game_path, &descriptor.id) {
            Ok(ToggleOutcome::Changed) => disabled += 1,
            Ok(ToggleOutcome::NoOp) => {}
            Err(err) => warn!(id = %descriptor.id, "pack disable failed: {err}"),
        }
    }

    let mut members = BatchReport::default();
    let installed = crate::library::installed_mods(store);
    for title in titles {
        let result = enable_by_title(
            store,
            data_dir,
            game_path,
            title,
            &installed,
            catalog_entries,
        );
        members.record(title, result);
    }

    PackReport {
        pack: pack_name.to_string(),
        disabled,
        members,
    }
}

fn enable_by_title(
    store: &ModStore,
    data_dir: &Path,
    game_path: &Path,
    title: &str,
    installed: &[ModDescriptor],
    catalog_entries: &[CatalogEntry],
) -> Result<()> {
    if let Some(descriptor) = installed
        .iter()
        .find(|descriptor| descriptor.title.eq_ignore_ascii_case(title))
    {
        enable(store, data_dir, game_path, &descriptor.id)?;
        return Ok(());
    }
    let entry = catalog::find_by_title(catalog_entries, title)
        .ok_or_else(|| EngineError::NotInCatalog(title.to_string()))?;
    let release = crate::update::query_release(&entry.download).ok();
    install(store, data_dir, game_path, entry, release.as_ref())?;
    Ok(())
}

/// Destination becomes a complete, exact copy of source: delete-if-exists,
/// then full directory copy. No incremental merging.
fn mirror_dir(source: &Path, dest: &Path) -> io::Result<()> {
    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    copy_dir_recursive(source, dest)
}

pub fn copy_dir_recursive(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Move a directory, falling back to copy-and-delete when the rename crosses
/// filesystems.
fn move_dir(source: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_dir_recursive(source, dest)?;
            fs::remove_dir_all(source)
        }
    }
}
