use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub game_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub auto_update: bool,
    #[serde(default)]
    pub notifications: bool,
    #[serde(default)]
    pub gdweave_version: Option<String>,
    #[serde(default)]
    pub error_webhook: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            game_path: None,
            auto_update: true,
            notifications: false,
            gdweave_version: None,
            error_webhook: None,
        }
    }
}

impl Settings {
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("create app data dir")?;
        let path = data_dir.join("settings.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read settings")?;
            let settings: Settings = serde_json::from_str(&raw).context("parse settings")?;
            return Ok(settings);
        }

        let settings = Settings::default();
        settings.save(data_dir)?;
        Ok(settings)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        fs::create_dir_all(data_dir).context("create app data dir")?;
        let path = data_dir.join("settings.json");
        let raw = serde_json::to_string_pretty(self).context("serialize settings")?;
        fs::write(path, raw).context("write settings")?;
        Ok(())
    }

    /// Game path, only if it still exists on disk. Lifecycle operations that
    /// touch the plugin directory refuse to run without one.
    pub fn valid_game_path(&self) -> Option<&Path> {
        self.game_path.as_deref().filter(|path| path.exists())
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("tacklebox"))
}

fn default_true() -> bool {
    true
}
