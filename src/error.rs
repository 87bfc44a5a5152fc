use std::path::PathBuf;
use thiserror::Error;

use crate::store::Scope;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Failure modes of the lifecycle engine. `Conflict`, `Identity`, and `Busy`
/// abort before any file is touched; `Sync` and `PartialRemoval` describe
/// operations whose bookkeeping and filesystem state have diverged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("package declares no id and has no title to derive one from")]
    Identity,

    #[error("mod id '{id}' is already taken by a {existing:?} mod; uninstall it first")]
    Conflict { id: String, existing: Scope },

    #[error("an operation on mod '{0}' is already in flight")]
    Busy(String),

    #[error("mod '{0}' is not installed")]
    NotInstalled(String),

    #[error("'{0}' was not found in the catalog")]
    NotInCatalog(String),

    #[error("game path is not set or does not exist")]
    GamePathUnset,

    #[error("transport failed for {what}: {source}")]
    Transport {
        what: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(
        "mod '{id}' is recorded as enabled but its files were not materialized \
         into {game_dir:?}: {source}"
    )]
    Sync {
        id: String,
        game_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "mod '{id}' bookkeeping was updated but its game directory copy \
         {game_dir:?} could not be deleted: {source}"
    )]
    PartialRemoval {
        id: String,
        game_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no manifest.json found in the package")]
    ManifestMissing,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn transport(what: impl Into<String>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        EngineError::Transport {
            what: what.into(),
            source: source.into(),
        }
    }
}
