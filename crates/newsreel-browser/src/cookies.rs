//! Persisted cookie jar.
//!
//! One JSON cookie file per user profile at a fixed path. The jar is read
//! at session start and rewritten after every successful authenticated
//! interaction; concurrent runs sharing one profile are last-writer-wins.

use std::path::{Path, PathBuf};

use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, TimeSinceEpoch,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BrowserError, BrowserResult};

/// A single persisted cookie record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,

    /// Expiry as seconds since epoch; session cookies carry none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,

    #[serde(default)]
    pub http_only: bool,

    #[serde(default)]
    pub secure: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl CookieRecord {
    /// Convert a CDP cookie into a persistable record.
    pub fn from_cdp(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires: if cookie.session {
                None
            } else {
                Some(cookie.expires)
            },
            http_only: cookie.http_only,
            secure: cookie.secure,
            same_site: cookie.same_site.as_ref().map(|s| {
                match s {
                    CookieSameSite::Strict => "Strict",
                    CookieSameSite::Lax => "Lax",
                    CookieSameSite::None => "None",
                }
                .to_string()
            }),
        }
    }

    /// Convert this record into a CDP cookie parameter for injection.
    pub fn to_cdp_param(&self) -> BrowserResult<CookieParam> {
        let mut builder = CookieParam::builder()
            .name(self.name.clone())
            .value(self.value.clone())
            .domain(self.domain.clone())
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure);

        if let Some(expires) = self.expires {
            builder = builder.expires(TimeSinceEpoch::new(expires));
        }

        if let Some(same_site) = self.same_site.as_deref() {
            let mapped = match same_site {
                "Strict" => Some(CookieSameSite::Strict),
                "Lax" => Some(CookieSameSite::Lax),
                "None" => Some(CookieSameSite::None),
                other => {
                    warn!(same_site = other, "Unknown SameSite value in cookie jar");
                    None
                }
            };
            if let Some(mapped) = mapped {
                builder = builder.same_site(mapped);
            }
        }

        builder.build().map_err(BrowserError::cookie_store)
    }
}

/// File-backed cookie store for one profile.
#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    /// Store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default per-user profile path
    /// (`<config_dir>/newsreel/cookies.json`).
    pub fn default_profile() -> BrowserResult<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| BrowserError::cookie_store("No user config directory available"))?;
        Ok(Self::new(base.join("newsreel").join("cookies.json")))
    }

    /// The jar's path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a non-empty jar exists.
    pub fn exists(&self) -> bool {
        self.path
            .metadata()
            .map(|m| m.is_file() && m.len() > 2)
            .unwrap_or(false)
    }

    /// Load all records; a missing file is an empty jar, a corrupt file
    /// is treated the same way (the user just logs in again).
    pub async fn load(&self) -> BrowserResult<Vec<CookieRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let raw = tokio::fs::read_to_string(&self.path).await?;
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Cookie jar unreadable, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Persist the given records, replacing the jar.
    pub async fn save(&self, records: &[CookieRecord]) -> BrowserResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let raw = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, raw).await?;

        debug!(path = ?self.path, count = records.len(), "Saved cookie jar");
        Ok(())
    }

    /// Remove the jar from disk.
    pub async fn clear(&self) -> BrowserResult<()> {
        if self.path.exists() {
            tokio::fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CookieRecord {
        CookieRecord {
            name: "session_token".to_string(),
            value: "abc123".to_string(),
            domain: ".platform.example".to_string(),
            path: "/".to_string(),
            expires: Some(1_900_000_000.0),
            http_only: true,
            secure: true,
            same_site: Some("Lax".to_string()),
        }
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("cookies.json"));

        assert!(!store.exists());
        store.save(&[sample_record()]).await.unwrap();
        assert!(store.exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "session_token");
        assert_eq!(loaded[0].same_site.as_deref(), Some("Lax"));

        store.clear().await.unwrap();
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_missing_jar_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("nope.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_jar_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let store = CookieStore::new(path);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[test]
    fn test_to_cdp_param() {
        let param = sample_record().to_cdp_param().unwrap();
        assert_eq!(param.name, "session_token");
        assert_eq!(param.value, "abc123");
    }
}
