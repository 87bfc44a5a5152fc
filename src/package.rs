use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use crate::error::{EngineError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

/// The manifest every installable package carries. `Id` is the one hard
/// requirement; everything else has a display fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageManifest {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Author", default)]
    pub author: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "Version", default)]
    pub version: Option<String>,
}

impl PackageManifest {
    pub fn title(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn author(&self) -> String {
        self.author.clone().unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn description(&self) -> String {
        self.description.clone().unwrap_or_default()
    }

    pub fn version(&self) -> String {
        self.version.clone().unwrap_or_else(|| "Unknown".to_string())
    }
}

pub fn read_manifest(path: &Path) -> Result<PackageManifest> {
    let raw = fs::read_to_string(path)?;
    let manifest = serde_json::from_str(&raw)?;
    Ok(manifest)
}

/// Locates `manifest.json` anywhere under `root`, shallowest match first.
/// The manifest's parent directory is the mod payload root.
pub fn find_manifest(root: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<(usize, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).max_depth(6) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .eq_ignore_ascii_case(MANIFEST_FILE)
        {
            candidates.push((entry.depth(), entry.path().to_path_buf()));
        }
    }
    candidates.sort_by_key(|(depth, _)| *depth);
    candidates.first().map(|(_, path)| path.clone())
}

/// Finds the manifest under an extracted package and parses it, surfacing the
/// two package-shaped failures: no manifest at all, or a manifest with no id.
pub fn locate_and_read(root: &Path) -> Result<(PathBuf, PackageManifest)> {
    let manifest_path = find_manifest(root).ok_or(EngineError::ManifestMissing)?;
    let manifest = read_manifest(&manifest_path)?;
    Ok((manifest_path, manifest))
}
