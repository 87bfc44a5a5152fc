use serde::Deserialize;
use std::{collections::HashSet, fs, path::Path};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::library::{save_descriptor, ModDescriptor};
use crate::lifecycle::copy_dir_recursive;
use crate::package::{self, MANIFEST_FILE};
use crate::store::{self, derive_id, ModStore, Scope};
use crate::transport::{metadata_agent, USER_AGENT};

pub const CATALOG_URL: &str = "https://notnite.github.io/webfishing-mods/list.json";
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub download: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl CatalogEntry {
    /// The entry's stable id, synthesizing one from the title when the
    /// catalog omits it.
    pub fn resolved_id(&self) -> Result<String> {
        derive_id(self.id.as_deref(), Some(&self.title))
    }
}

/// A catalog entry annotated with its display category. The category is a
/// label only, never a storage scope.
#[derive(Debug, Clone)]
pub struct AvailableMod {
    pub entry: CatalogEntry,
    pub category: &'static str,
}

const CATEGORIES: &[(&str, &str)] = &[
    ("Automasher", "Accessibility"),
    ("BionicFisher", "Accessibility"),
    ("LegibleChat", "Accessibility"),
    ("BorderlessFix", "Improvements"),
    ("SaveCanvas", "Improvements"),
    ("EventAlert", "Quality of Life"),
    ("Fishing+", "Quality of Life"),
    ("NeoQOLPack", "Quality of Life"),
    ("Nyoom!!!", "Quality of Life"),
    ("PropTweaks", "Quality of Life"),
    ("QuickGamble", "Quality of Life"),
    ("SprintToggle", "Quality of Life"),
    ("WebfishingPlus", "Quality of Life"),
    ("Lure", "Customization"),
    ("MidiStrummer", "Customization"),
    ("RAYTRAC3R's Cosmetics", "Customization"),
    ("VoiceTrainedSpecies", "Customization"),
    ("WebfishingRichPresence", "Customization"),
];

pub fn category_for(title: &str) -> &'static str {
    CATEGORIES
        .iter()
        .find(|(name, _)| *name == title)
        .map(|(_, category)| *category)
        .unwrap_or(UNCATEGORIZED)
}

pub fn fetch_catalog() -> Result<Vec<CatalogEntry>> {
    let response = metadata_agent()
        .get(CATALOG_URL)
        .set("User-Agent", USER_AGENT)
        .call()
        .map_err(|err| EngineError::transport("fetch mod catalog", err))?;
    let entries: Vec<CatalogEntry> = response
        .into_json()
        .map_err(|err| EngineError::transport("decode mod catalog", err))?;
    debug!(count = entries.len(), "fetched catalog");
    Ok(entries)
}

/// Annotates and orders the catalog for presentation: categories sorted
/// alphabetically with Uncategorized forced last, titles sorted within each.
pub fn available_mods(entries: &[CatalogEntry]) -> Vec<AvailableMod> {
    let mut mods: Vec<AvailableMod> = entries
        .iter()
        .cloned()
        .map(|entry| AvailableMod {
            category: category_for(&entry.title),
            entry,
        })
        .collect();
    mods.sort_by(|a, b| {
        let a_last = a.category == UNCATEGORIZED;
        let b_last = b.category == UNCATEGORIZED;
        a_last
            .cmp(&b_last)
            .then_with(|| a.category.cmp(b.category))
            .then_with(|| a.entry.title.cmp(&b.entry.title))
    });
    mods
}

pub fn find_by_title<'a>(entries: &'a [CatalogEntry], title: &str) -> Option<&'a CatalogEntry> {
    entries
        .iter()
        .find(|entry| entry.title.trim().eq_ignore_ascii_case(title.trim()))
}

/// Registers pre-existing, unmanaged plugin-directory contents as third-party
/// mods: every game-dir subdirectory carrying a manifest whose id is unknown
/// to both stores is copied into the third-party subtree with a synthesized
/// descriptor. Known ids are left untouched, so repeated runs converge.
pub fn absorb_existing(store: &ModStore, game_path: &Path) -> Result<Vec<ModDescriptor>> {
    let game_mods = store::game_mods_dir(game_path);
    if !game_mods.exists() {
        return Ok(Vec::new());
    }

    let mut known: HashSet<String> = HashSet::new();
    for scope in [Scope::Managed, Scope::ThirdParty] {
        known.extend(store.list_ids(scope));
    }

    let mut absorbed = Vec::new();
    for entry in fs::read_dir(&game_mods)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let src = entry.path();
        if !src.is_dir() {
            continue;
        }
        let manifest_path = src.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            debug!(dir = %src.display(), "skipping plugin dir without manifest");
            continue;
        }
        let manifest = match package::read_manifest(&manifest_path) {
            Ok(manifest) => manifest,
            Err(err) => {
                debug!(dir = %src.display(), "skipping unreadable manifest: {err}");
                continue;
            }
        };
        let folder_name = entry.file_name().to_string_lossy().to_string();
        let id = match derive_id(manifest.id.as_deref(), Some(&folder_name)) {
            Ok(id) => id,
            Err(_) => continue,
        };
        if known.contains(&id) {
            continue;
        }

        let dest = store.mod_dir(&id, Scope::ThirdParty);
        if !dest.exists() {
            copy_dir_recursive(&src, &dest)?;
        }
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
        info!(%id, "absorbed unmanaged plugin as third-party mod");
        known.insert(id);
        absorbed.push(descriptor);
    }

    Ok(absorbed)
}
