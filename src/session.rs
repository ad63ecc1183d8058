//! Session state and its persistence.
//!
//! A [`Session`] is the cookie state plus the CSRF token of an authenticated
//! portal login. It is persisted through a [`SessionStore`] so that short-lived
//! processes can reuse a login instead of signing in on every run.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;

/// Cookies received from the portal, replayed on every later request.
/// Only name and value are kept; attributes (path, expiry) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieJar(BTreeMap<String, String>);

impl CookieJar {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Apply one `Set-Cookie` header value. An empty value deletes the cookie.
    pub fn apply_set_cookie(&mut self, header: &str) {
        let pair = header.split(';').next().unwrap_or("");
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            self.0.remove(name);
        } else {
            self.0.insert(name.to_string(), value.to_string());
        }
    }

    pub fn absorb(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(s) = value.to_str() {
                self.apply_set_cookie(s);
            }
        }
    }

    /// Value for a `Cookie` request header, `None` when the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// An authenticated portal session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub cookies: CookieJar,
    pub csrf_token: String,
    pub refreshed_at: DateTime<Utc>,
}

/// Persisted storage for a single session blob.
///
/// Stores do no network I/O. No locking is done: clients sharing one store
/// must serialize access themselves.
pub trait SessionStore: Send {
    fn load(&self) -> Result<Option<Session>>;
    fn save(&mut self, session: &Session) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
    /// When the blob was last written, `None` if nothing is stored.
    fn last_write(&self) -> Result<Option<DateTime<Utc>>>;
}

/// Process-local store; sessions do not outlive the client.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Option<(Session, DateTime<Utc>)>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a session written at `written_at`.
    pub fn with_session(session: Session, written_at: DateTime<Utc>) -> Self {
        Self {
            slot: Some((session, written_at)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>> {
        Ok(self.slot.as_ref().map(|(s, _)| s.clone()))
    }

    fn save(&mut self, session: &Session) -> Result<()> {
        self.slot = Some((session.clone(), Utc::now()));
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.slot = None;
        Ok(())
    }

    fn last_write(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.slot.as_ref().map(|(_, at)| *at))
    }
}

/// JSON file store. The file's modification time is the last-write time.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %self.path.display(), "discarding unreadable session file: {e}");
                Ok(None)
            }
        }
    }

    fn save(&mut self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec(session)?)?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn last_write(&self) -> Result<Option<DateTime<Utc>>> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.modified()?.into())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tempfile::tempdir;

    fn session() -> Session {
        let mut cookies = CookieJar::default();
        cookies.apply_set_cookie("_nexia_session=s3ss; path=/; HttpOnly");
        Session {
            cookies,
            csrf_token: "csrf".into(),
            refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn set_cookie_keeps_name_and_value_only() {
        let mut jar = CookieJar::default();
        jar.apply_set_cookie("a=1; path=/; secure");
        jar.apply_set_cookie("b=\"2\"; Max-Age=60");
        assert_eq!(jar.get("a"), Some("1"));
        assert_eq!(jar.get("b"), Some("2"));
        assert_eq!(jar.header_value().as_deref(), Some("a=1; b=2"));
    }

    #[test]
    fn empty_value_deletes_cookie() {
        let mut jar = CookieJar::default();
        jar.apply_set_cookie("a=1");
        jar.apply_set_cookie("a=; expires=Thu, 01 Jan 1970 00:00:00 GMT");
        assert!(jar.is_empty());
        assert_eq!(jar.header_value(), None);
    }

    #[test]
    fn absorb_reads_every_set_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1; path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2; path=/"));
        let mut jar = CookieJar::default();
        jar.absorb(&headers);
        assert_eq!(jar.get("a"), Some("1"));
        assert_eq!(jar.get("b"), Some("2"));
    }

    #[test]
    fn memory_store_tracks_last_write() {
        let mut store = MemorySessionStore::new();
        assert!(store.load().unwrap().is_none());
        assert!(store.last_write().unwrap().is_none());

        store.save(&session()).unwrap();
        assert_eq!(store.load().unwrap().unwrap().csrf_token, "csrf");
        assert!(store.last_write().unwrap().is_some());

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("session.json");

        let mut store = FileSessionStore::new(&path);
        store.save(&session()).unwrap();

        let reopened = FileSessionStore::new(&path);
        let loaded = reopened.load().unwrap().unwrap();
        assert_eq!(loaded.cookies.get("_nexia_session"), Some("s3ss"));
        assert!(reopened.last_write().unwrap().is_some());
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut store = FileSessionStore::new(dir.path().join("session.json"));
        store.clear().unwrap();
        store.save(&session()).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(store.last_write().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();
        assert!(FileSessionStore::new(&path).load().unwrap().is_none());
    }
}
