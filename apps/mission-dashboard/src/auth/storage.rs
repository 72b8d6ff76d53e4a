use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::cookies::StoredCookie;
use super::{AuthState, UserProfile};

/// Key under which the session record is stored.
pub const STORAGE_NAMESPACE: &str = "auth-storage";
pub const COOKIES_NAMESPACE: &str = "auth-cookies";
const STORAGE_VERSION: u32 = 0;

/// The part of the auth state that survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

impl From<&AuthState> for PersistedSession {
    fn from(state: &AuthState) -> Self {
        Self {
            user: state.user.clone(),
            is_authenticated: state.is_authenticated,
            csrf_token: state.csrf_token.clone(),
        }
    }
}

impl PersistedSession {
    pub(crate) fn restore_into(self, state: &mut AuthState) {
        state.user = self.user;
        state.is_authenticated = self.is_authenticated;
        state.csrf_token = self.csrf_token;
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    state: T,
    #[serde(default)]
    version: u32,
}

pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>>;
    fn save(&self, session: &PersistedSession) -> Result<()>;
    fn load_cookies(&self) -> Result<Vec<StoredCookie>>;
    fn save_cookies(&self, cookies: &[StoredCookie]) -> Result<()>;
}

/// Stores the session as `<dir>/auth-storage.json` and its cookies as
/// `<dir>/auth-cookies.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
    cookies_path: PathBuf,
}

impl JsonFileStorage {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{STORAGE_NAMESPACE}.json")),
            cookies_path: dir.join(format!("{COOKIES_NAMESPACE}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cookies_path(&self) -> &Path {
        &self.cookies_path
    }
}

fn read_envelope<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let envelope: Envelope<T> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if envelope.version != STORAGE_VERSION {
        tracing::warn!(
            path = %path.display(),
            version = envelope.version,
            "ignoring auth state stored with unknown version"
        );
        return Ok(None);
    }
    Ok(Some(envelope.state))
}

fn write_envelope<T: Serialize>(path: &Path, state: T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let envelope = Envelope {
        state,
        version: STORAGE_VERSION,
    };
    let body = serde_json::to_vec_pretty(&envelope)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

impl SessionStorage for JsonFileStorage {
    fn load(&self) -> Result<Option<PersistedSession>> {
        read_envelope(&self.path)
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        write_envelope(&self.path, session)
    }

    fn load_cookies(&self) -> Result<Vec<StoredCookie>> {
        Ok(read_envelope::<Vec<StoredCookie>>(&self.cookies_path)?.unwrap_or_default())
    }

    fn save_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        write_envelope(&self.cookies_path, cookies)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Option<PersistedSession>>,
    cookies: Mutex<Vec<StoredCookie>>,
}

impl MemoryStorage {
    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            inner: Mutex::new(Some(session)),
            cookies: Mutex::default(),
        }
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<PersistedSession>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("session storage lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("session storage lock poisoned"))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn load_cookies(&self) -> Result<Vec<StoredCookie>> {
        let guard = self
            .cookies
            .lock()
            .map_err(|_| anyhow!("cookie storage lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        let mut guard = self
            .cookies
            .lock()
            .map_err(|_| anyhow!("cookie storage lock poisoned"))?;
        *guard = cookies.to_vec();
        Ok(())
    }
}
