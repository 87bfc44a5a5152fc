use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::library::ModDescriptor;
use crate::transport::{metadata_agent, USER_AGENT};

pub const LOADER_RELEASES_URL: &str =
    "https://api.github.com/repos/NotNite/GDWeave/releases/latest";

/// Freshness metadata for the newest published release of a mod.
#[derive(Debug, Clone)]
pub struct ReleaseInfo {
    pub version: String,
    pub published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    published_at: Option<String>,
}

/// Decides whether the catalog release is newer than the installed mod.
/// Publish timestamps win when both sides have one; otherwise dotted numeric
/// version strings are compared component-wise. An uncomparable version pair
/// reports no update rather than failing the whole check.
pub fn is_update_available(installed: &ModDescriptor, latest: &ReleaseInfo) -> bool {
    if let (Some(have), Some(upstream)) = (installed.published_at.as_deref(), latest.published_at.as_deref()) {
        return timestamp_lt(have, upstream);
    }

    match (
        parse_version_tuple(&installed.version),
        parse_version_tuple(&latest.version),
    ) {
        (Some(have), Some(upstream)) => have < upstream,
        _ => {
            warn!(
                id = %installed.id,
                installed = %installed.version,
                latest = %latest.version,
                "unable to compare versions, assuming no update"
            );
            false
        }
    }
}

/// Strictly-earlier comparison of two publish timestamps. RFC3339 values are
/// compared temporally; anything unparsable falls back to lexical order,
/// which agrees with temporal order for well-formed ISO-8601 strings.
pub fn timestamp_lt(a: &str, b: &str) -> bool {
    match (
        OffsetDateTime::parse(a.trim(), &Rfc3339),
        OffsetDateTime::parse(b.trim(), &Rfc3339),
    ) {
        (Ok(a), Ok(b)) => a < b,
        _ => a < b,
    }
}

/// Parses a dotted numeric version into an integer tuple, tolerating a `v`
/// prefix and pre-release/build suffixes. Non-numeric components yield None.
pub fn parse_version_tuple(raw: &str) -> Option<Vec<u64>> {
    let raw = raw
        .trim()
        .trim_start_matches('v')
        .split('-')
        .next()?
        .split('+')
        .next()?;
    if raw.is_empty() {
        return None;
    }
    raw.split('.')
        .map(|part| part.trim().parse::<u64>().ok())
        .collect()
}

pub fn normalize_version(tag: &str) -> String {
    tag.trim().trim_start_matches('v').to_string()
}

/// Queries the latest release for a mod's origin repository. GitHub hosts get
/// the GitHub API; anything else is assumed to speak the Gitea API, matching
/// where catalog mods are actually published.
pub fn query_release(download_url: &str) -> Result<ReleaseInfo> {
    let api_url = release_api_url(download_url).ok_or_else(|| {
        EngineError::transport(
            format!("derive release endpoint from {download_url}"),
            "unrecognized repository URL",
        )
    })?;
    let response = metadata_agent()
        .get(&api_url)
        .set("User-Agent", USER_AGENT)
        .call()
        .map_err(|err| EngineError::transport(format!("query release {api_url}"), err))?;
    let release: Release = response
        .into_json()
        .map_err(|err| EngineError::transport("decode release", err))?;
    Ok(ReleaseInfo {
        version: normalize_version(&release.tag_name),
        published_at: release.published_at,
    })
}

fn release_api_url(download_url: &str) -> Option<String> {
    let rest = download_url
        .strip_prefix("https://")
        .or_else(|| download_url.strip_prefix("http://"))?;
    let mut parts = rest.split('/');
    let host = parts.next()?;
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    if host == "github.com" {
        Some(format!(
            "https://api.github.com/repos/{owner}/{repo}/releases/latest"
        ))
    } else {
        Some(format!(
            "https://{host}/api/v1/repos/{owner}/{repo}/releases/latest"
        ))
    }
}

/// Latest GDWeave release tag, or "Unknown" when the query fails. The agent's
/// 10 second read timeout bounds the call, so a stalled endpoint degrades to
/// "Unknown" instead of hanging the caller.
pub fn latest_loader_version() -> String {
    let result: Result<Release> = metadata_agent()
        .get(LOADER_RELEASES_URL)
        .set("User-Agent", USER_AGENT)
        .call()
        .map_err(|err| EngineError::transport("query GDWeave release", err))
        .and_then(|response| {
            response
                .into_json()
                .map_err(|err| EngineError::transport("decode GDWeave release", err))
        });
    match result {
        Ok(release) => release.tag_name,
        Err(err) => {
            warn!("loader version query failed: {err}");
            "Unknown".to_string()
        }
    }
}

/// Whether the recorded loader version is stale against `latest`. Tags that
/// both parse as versions compare numerically; otherwise any disagreement
/// counts as an update, except that an unknown latest never does.
pub fn loader_update_available(recorded: Option<&str>, latest: &str) -> bool {
    if latest == "Unknown" {
        return false;
    }
    let Some(recorded) = recorded else {
        return true;
    };
    match (parse_version_tuple(recorded), parse_version_tuple(latest)) {
        (Some(have), Some(upstream)) => have < upstream,
        _ => recorded != latest,
    }
}

/// One installed mod's sweep outcome.
#[derive(Debug, Clone)]
pub struct UpdateCheck {
    pub id: String,
    pub title: String,
    pub installed_version: String,
    pub status: UpdateStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    Available { version: String },
    /// The release query failed or timed out; freshness is unknowable.
    Unknown,
    NotInCatalog,
}

/// Pairs every installed mod with its catalog counterpart by title and
/// reports which have newer releases. Per-mod failures degrade to `Unknown`
/// and the sweep continues.
pub fn check_all(
    installed: &[ModDescriptor],
    catalog: &[crate::catalog::CatalogEntry],
) -> Vec<UpdateCheck> {
    installed
        .iter()
        .map(|descriptor| {
            let entry = catalog.iter().find(|entry| {
                entry.title.trim().eq_ignore_ascii_case(descriptor.title.trim())
            });
            let status = match entry {
                None => UpdateStatus::NotInCatalog,
                Some(entry) => match query_release(&entry.download) {
                    Ok(release) => {
                        if is_update_available(descriptor, &release) {
                            UpdateStatus::Available {
                                version: release.version,
                            }
                        } else {
                            UpdateStatus::UpToDate
                        }
                    }
                    Err(err) => {
                        debug!(id = %descriptor.id, "release query failed: {err}");
                        UpdateStatus::Unknown
                    }
                },
            };
            UpdateCheck {
                id: descriptor.id.clone(),
                title: descriptor.title.clone(),
                installed_version: descriptor.version.clone(),
                status,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(version: &str, published_at: Option<&str>) -> ModDescriptor {
        ModDescriptor {
            id: "fish-plus".to_string(),
            title: "Fishing+".to_string(),
            author: "someone".to_string(),
            description: String::new(),
            version: version.to_string(),
            enabled: true,
            third_party: false,
            published_at: published_at.map(str::to_string),
            download: None,
        }
    }

    #[test]
    fn timestamps_win_over_versions() {
        let installed = descriptor("9.0.0", Some("2024-01-05T10:00:00Z"));
        let latest = ReleaseInfo {
            version: "1.0.0".to_string(),
            published_at: Some("2024-02-01T00:00:00Z".to_string()),
        };
        assert!(is_update_available(&installed, &latest));
    }

    #[test]
    fn equal_timestamps_mean_no_update() {
        let installed = descriptor("1.0.0", Some("2024-02-01T00:00:00Z"));
        let latest = ReleaseInfo {
            version: "2.0.0".to_string(),
            published_at: Some("2024-02-01T00:00:00Z".to_string()),
        };
        assert!(!is_update_available(&installed, &latest));
    }

    #[test]
    fn version_fallback_compares_numerically() {
        let installed = descriptor("1.2.0", None);
        let latest = ReleaseInfo {
            version: "1.10.0".to_string(),
            published_at: None,
        };
        assert!(is_update_available(&installed, &latest));
    }

    #[test]
    fn shorter_tuple_is_older() {
        assert!(parse_version_tuple("1.2").unwrap() < parse_version_tuple("1.2.1").unwrap());
    }

    #[test]
    fn unparsable_version_reports_no_update() {
        let installed = descriptor("Unknown", None);
        let latest = ReleaseInfo {
            version: "1.0.0".to_string(),
            published_at: None,
        };
        assert!(!is_update_available(&installed, &latest));
    }

    #[test]
    fn version_tuple_tolerates_prefixes_and_suffixes() {
        assert_eq!(parse_version_tuple("v1.4.2"), Some(vec![1, 4, 2]));
        assert_eq!(parse_version_tuple("1.4.2-beta+build5"), Some(vec![1, 4, 2]));
        assert_eq!(parse_version_tuple("one.two"), None);
    }

    #[test]
    fn release_api_url_detects_host() {
        assert_eq!(
            release_api_url("https://github.com/NotNite/WebfishingPlus").as_deref(),
            Some("https://api.github.com/repos/NotNite/WebfishingPlus/releases/latest")
        );
        assert_eq!(
            release_api_url("https://git.example.net/owner/mod/releases").as_deref(),
            Some("https://git.example.net/api/v1/repos/owner/mod/releases/latest")
        );
        assert!(release_api_url("not a url").is_none());
    }

    #[test]
    fn loader_staleness() {
        assert!(loader_update_available(None, "v1.2.0"));
        assert!(loader_update_available(Some("v1.1.0"), "v1.2.0"));
        assert!(!loader_update_available(Some("v1.2.0"), "v1.2.0"));
        assert!(!loader_update_available(Some("v1.1.0"), "Unknown"));
    }
}
