//! Pseudonymous session identity.
//!
//! # Responsibility
//! - Generate one durable session identifier per client profile.
//! - Persist it in durable client storage under key `session_id`.
//! - Mirror it into a long-lived cookie so server-side access checks see it.
//!
//! # Invariants
//! - `ensure_identity` is read-or-create: once stored, the value never changes.
//! - A failed cookie write never fails identity resolution.
//! - Identity is resolved once and passed down explicitly; there is no global.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Storage key and cookie name for the session identifier.
pub const SESSION_ID_KEY: &str = "session_id";
/// Cookie lifetime (~1 year).
pub const SESSION_COOKIE_MAX_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Opaque session identifier establishing note ownership.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh globally-unique identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity persistence and cookie errors.
#[derive(Debug)]
pub enum IdentityError {
    Io(std::io::Error),
    Corrupt(String),
    Cookie(String),
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "identity storage io error: {err}"),
            Self::Corrupt(details) => write!(f, "identity storage is corrupt: {details}"),
            Self::Cookie(details) => write!(f, "session cookie write failed: {details}"),
        }
    }
}

impl Error for IdentityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Corrupt(_) | Self::Cookie(_) => None,
        }
    }
}

impl From<std::io::Error> for IdentityError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Durable client-side storage (the source of truth for the identity).
pub trait IdentityStore {
    fn load(&self, key: &str) -> Result<Option<String>, IdentityError>;
    fn save(&self, key: &str, value: &str) -> Result<(), IdentityError>;
}

/// Cookie mirror target.
pub trait CookieJar {
    fn set_cookie(&self, cookie: &SessionCookie) -> Result<(), IdentityError>;
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
        }
    }
}

/// Session cookie mirroring the stored identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: &'static str,
    pub value: String,
    pub max_age: Duration,
    pub same_site: SameSite,
    pub secure: bool,
    pub path: &'static str,
}

impl SessionCookie {
    /// Builds the `session_id` cookie for `session_id`.
    pub fn for_session(session_id: &SessionId, secure: bool) -> Self {
        Self {
            name: SESSION_ID_KEY,
            value: session_id.as_str().to_string(),
            max_age: SESSION_COOKIE_MAX_AGE,
            same_site: SameSite::Lax,
            secure,
            path: "/",
        }
    }

    /// Renders the value of a `Set-Cookie` header.
    pub fn to_header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Max-Age={}; Path={}; SameSite={}",
            self.name,
            self.value,
            self.max_age.as_secs(),
            self.path,
            self.same_site.as_str()
        );
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

/// Extracts the `session_id` value from a `Cookie` request header.
pub fn session_id_from_cookie_header(header: &str) -> Option<SessionId> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == SESSION_ID_KEY)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map(SessionId::new)
}

/// Read-or-create identity provider.
pub struct IdentityProvider<S, C> {
    store: S,
    cookies: C,
    secure_cookies: bool,
}

impl<S: IdentityStore, C: CookieJar> IdentityProvider<S, C> {
    pub fn new(store: S, cookies: C, secure_cookies: bool) -> Self {
        Self {
            store,
            cookies,
            secure_cookies,
        }
    }

    /// Returns the stored identity, generating and persisting one on first use.
    ///
    /// The cookie mirror is refreshed on every call.
    ///
    /// # Errors
    /// - Returns an error when durable storage cannot be read or written.
    pub fn ensure_identity(&self) -> Result<SessionId, IdentityError> {
        let stored = self
            .store
            .load(SESSION_ID_KEY)?
            .filter(|value| !value.trim().is_empty());

        let session_id = match stored {
            Some(value) => SessionId::new(value),
            None => {
                let generated = SessionId::generate();
                self.store.save(SESSION_ID_KEY, generated.as_str())?;
                info!("event=identity_created module=identity status=ok");
                generated
            }
        };

        let cookie = SessionCookie::for_session(&session_id, self.secure_cookies);
        if let Err(err) = self.cookies.set_cookie(&cookie) {
            // Server-side checks will treat this client as a non-owner.
            warn!(
                "event=identity_cookie module=identity status=error error={}",
                err
            );
        }

        Ok(session_id)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cookies(&self) -> &C {
        &self.cookies
    }
}

/// JSON key/value file acting as durable client storage.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, IdentityError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| {
                IdentityError::Corrupt(format!("`{}`: {err}", self.path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self, key: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.read_map()?.remove(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), IdentityError> {
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&map)
            .map_err(|err| IdentityError::Corrupt(err.to_string()))?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// In-memory storage, for tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self, key: &str) -> Result<Option<String>, IdentityError> {
        let values = self
            .values
            .lock()
            .map_err(|_| IdentityError::Corrupt("memory store poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), IdentityError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| IdentityError::Corrupt("memory store poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Cookie jar that records the last `Set-Cookie` value.
#[derive(Debug, Default)]
pub struct RecordingCookieJar {
    last: Mutex<Option<String>>,
}

impl RecordingCookieJar {
    pub fn last_header(&self) -> Option<String> {
        self.last.lock().ok().and_then(|value| value.clone())
    }
}

impl CookieJar for RecordingCookieJar {
    fn set_cookie(&self, cookie: &SessionCookie) -> Result<(), IdentityError> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| IdentityError::Cookie("cookie jar poisoned".to_string()))?;
        *last = Some(cookie.to_header_value());
        Ok(())
    }
}
