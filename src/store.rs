use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{EngineError, Result};

pub const THIRD_PARTY_DIR: &str = "3rd_party";
pub const GAME_MODS_SUBDIR: &str = "GDWeave/Mods";

/// Which of the two local stores a mod belongs to. The game plugin directory
/// is not a scope: it is a disposable mirror of the enabled subset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Managed,
    ThirdParty,
}

#[derive(Debug, Clone)]
pub struct ModStore {
    mods_root: PathBuf,
}

impl ModStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let mods_root = data_dir.join("mods");
        fs::create_dir_all(mods_root.join(THIRD_PARTY_DIR))?;
        Ok(Self { mods_root })
    }

    pub fn mods_root(&self) -> &Path {
        &self.mods_root
    }

    pub fn scope_root(&self, scope: Scope) -> PathBuf {
        match scope {
            Scope::Managed => self.mods_root.clone(),
            Scope::ThirdParty => self.mods_root.join(THIRD_PARTY_DIR),
        }
    }

    pub fn mod_dir(&self, id: &str, scope: Scope) -> PathBuf {
        self.scope_root(scope).join(id)
    }

    pub fn mod_exists(&self, id: &str, scope: Scope) -> bool {
        self.mod_dir(id, scope).exists()
    }

    /// The scope currently occupying `id`, if any. When both scopes hold the
    /// id (the transient conflict condition) the third-party one is reported,
    /// since that is the occupant the caller must remove by hand.
    pub fn scope_of(&self, id: &str) -> Option<Scope> {
        if self.mod_exists(id, Scope::ThirdParty) {
            return Some(Scope::ThirdParty);
        }
        if self.mod_exists(id, Scope::Managed) {
            return Some(Scope::Managed);
        }
        None
    }

    pub fn list_ids(&self, scope: Scope) -> Vec<String> {
        let root = self.scope_root(scope);
        let Ok(entries) = fs::read_dir(&root) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| !(scope == Scope::Managed && name == THIRD_PARTY_DIR))
            .collect();
        ids.sort();
        ids
    }
}

pub fn game_mods_dir(game_path: &Path) -> PathBuf {
    game_path.join(GAME_MODS_SUBDIR)
}

pub fn game_mod_dir(game_path: &Path, id: &str) -> PathBuf {
    game_mods_dir(game_path).join(id)
}

/// Derive a mod's stable id: the manifest-declared id when present, otherwise
/// the normalized title. Guessing is not allowed past this point.
pub fn derive_id(manifest_id: Option<&str>, title: Option<&str>) -> Result<String> {
    if let Some(id) = manifest_id {
        let id = id.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }
    if let Some(title) = title {
        let normalized = normalize_title(title);
        if !normalized.is_empty() {
            return Ok(normalized);
        }
    }
    Err(EngineError::Identity)
}

pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase().replace(' ', "_")
}
