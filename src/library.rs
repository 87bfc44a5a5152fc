use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

use crate::error::Result;
use crate::store::{ModStore, Scope};

pub const DESCRIPTOR_FILE: &str = "mod_info.json";
pub const CACHE_FILE: &str = "mod_cache.json";

/// Per-mod metadata record, persisted as `mod_info.json` inside the mod's own
/// directory. The file is the single source of truth for enabled/version
/// state; in-memory lists are projections of these files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModDescriptor {
    pub id: String,
    pub title: String,
    #[serde(default = "unknown")]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "unknown")]
    pub version: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub third_party: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
}

impl ModDescriptor {
    pub fn scope(&self) -> Scope {
        if self.third_party {
            Scope::ThirdParty
        } else {
            Scope::Managed
        }
    }
}

pub fn descriptor_path(mod_dir: &Path) -> PathBuf {
    mod_dir.join(DESCRIPTOR_FILE)
}

pub fn load_descriptor(mod_dir: &Path) -> Result<Option<ModDescriptor>> {
    let path = descriptor_path(mod_dir);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)?;
    let descriptor = serde_json::from_str(&raw)?;
    Ok(Some(descriptor))
}

/// Writes the descriptor into the mod's directory, creating it if absent.
pub fn save_descriptor(mod_dir: &Path, descriptor: &ModDescriptor) -> Result<()> {
    fs::create_dir_all(mod_dir)?;
    let raw = serde_json::to_string_pretty(descriptor)?;
    fs::write(descriptor_path(mod_dir), raw)?;
    Ok(())
}

/// Re-reads every descriptor from disk across both scopes. Third-party
/// provenance is forced from the subtree a descriptor lives in, so a stray
/// flag in the file cannot migrate a mod between scopes.
pub fn installed_mods(store: &ModStore) -> Vec<ModDescriptor> {
    let mut mods = Vec::new();
    for scope in [Scope::Managed, Scope::ThirdParty] {
        for id in store.list_ids(scope) {
            let dir = store.mod_dir(&id, scope);
            match load_descriptor(&dir) {
                Ok(Some(mut descriptor)) => {
                    descriptor.third_party = scope == Scope::ThirdParty;
                    mods.push(descriptor);
                }
                Ok(None) => {}
                Err(err) => warn!(%id, "skipping unreadable descriptor: {err}"),
            }
        }
    }
    mods
}

pub fn find_installed(store: &ModStore, id: &str) -> Result<Option<ModDescriptor>> {
    for scope in [Scope::ThirdParty, Scope::Managed] {
        let dir = store.mod_dir(id, scope);
        if let Some(mut descriptor) = load_descriptor(&dir)? {
            descriptor.third_party = scope == Scope::ThirdParty;
            return Ok(Some(descriptor));
        }
    }
    Ok(None)
}

/// Minimal projection of a descriptor kept in the flat cache file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub title: String,
    pub version: String,
    pub enabled: bool,
    pub third_party: bool,
}

/// Derived index over the installed set for fast list population. Never
/// authoritative: it is rebuilt from descriptors after every mutation and a
/// failed write only costs the next startup a full rescan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModCache {
    #[serde(flatten)]
    pub mods: BTreeMap<String, CacheEntry>,
}

impl ModCache {
    pub fn rebuild(descriptors: &[ModDescriptor]) -> Self {
        let mods = descriptors
            .iter()
            .map(|descriptor| {
                (
                    descriptor.id.clone(),
                    CacheEntry {
                        title: descriptor.title.clone(),
                        version: descriptor.version.clone(),
                        enabled: descriptor.enabled,
                        third_party: descriptor.third_party,
                    },
                )
            })
            .collect();
        Self { mods }
    }

    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(CACHE_FILE);
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!("mod cache unreadable, rebuilding: {err}");
                Self::default()
            }),
            Err(err) => {
                warn!("mod cache unreadable, rebuilding: {err}");
                Self::default()
            }
        }
    }

    /// Cache writes are non-fatal: a failure is logged and the mutation that
    /// triggered the rebuild stands.
    pub fn save(&self, data_dir: &Path) {
        let path = data_dir.join(CACHE_FILE);
        let raw = match serde_json::to_string_pretty(self) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("failed to serialize mod cache: {err}");
                return;
            }
        };
        if let Err(err) = fs::write(&path, raw) {
            warn!("failed to write mod cache to {}: {err}", path.display());
        }
    }

    /// Drops entries whose mod directory no longer exists.
    pub fn clean(&mut self, store: &ModStore) {
        self.mods.retain(|id, entry| {
            let scope = if entry.third_party {
                Scope::ThirdParty
            } else {
                Scope::Managed
            };
            store.mod_exists(id, scope)
        });
    }
}

/// Rebuild the cache from the current descriptor set and persist it. Called
/// after every mutation that adds, removes, or toggles a mod.
pub fn refresh_cache(store: &ModStore, data_dir: &Path) -> ModCache {
    let cache = ModCache::rebuild(&installed_mods(store));
    cache.save(data_dir);
    cache
}

fn unknown() -> String {
    "Unknown".to_string()
}

fn default_enabled() -> bool {
    true
}
