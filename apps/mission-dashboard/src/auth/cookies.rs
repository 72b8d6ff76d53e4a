use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// One `Set-Cookie` line and the URL it was received from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub url: String,
    pub set_cookie: String,
}

impl StoredCookie {
    fn key(&self) -> (Option<String>, Option<&str>) {
        let host = Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));
        (host, cookie_name(&self.set_cookie))
    }
}

fn cookie_name(set_cookie: &str) -> Option<&str> {
    let (name, _) = set_cookie.split(';').next()?.split_once('=')?;
    Some(name.trim())
}

#[derive(Debug, Default)]
struct CookieLog {
    entries: Vec<StoredCookie>,
    dirty: bool,
}

/// Cookie jar that also keeps the latest `Set-Cookie` line per host and
/// cookie name, so the session can be replayed into a later process.
#[derive(Debug, Default)]
pub struct SessionCookies {
    jar: Jar,
    log: Mutex<CookieLog>,
}

impl SessionCookies {
    /// Rebuilds the jar from lines saved by an earlier run. Expired cookies
    /// are dropped by the jar itself on replay.
    pub fn restore(saved: Vec<StoredCookie>) -> Self {
        let cookies = Self::default();
        let mut entries = Vec::with_capacity(saved.len());
        for cookie in saved {
            match Url::parse(&cookie.url) {
                Ok(url) => {
                    cookies.jar.add_cookie_str(&cookie.set_cookie, &url);
                    entries.push(cookie);
                }
                Err(err) => tracing::warn!(url = %cookie.url, error = %err, "dropping saved cookie"),
            }
        }
        cookies.lock().entries = entries;
        cookies
    }

    pub fn add_cookie_str(&self, cookie: &str, url: &Url) {
        self.jar.add_cookie_str(cookie, url);
        self.record(cookie, url);
    }

    /// Cookie lines to save, if anything changed since the last call.
    pub fn take_changes(&self) -> Option<Vec<StoredCookie>> {
        let mut log = self.lock();
        if !log.dirty {
            return None;
        }
        log.dirty = false;
        Some(log.entries.clone())
    }

    fn lock(&self) -> MutexGuard<'_, CookieLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, set_cookie: &str, url: &Url) {
        let stored = StoredCookie {
            url: url.to_string(),
            set_cookie: set_cookie.to_string(),
        };
        let mut log = self.lock();
        let key = stored.key();
        log.entries.retain(|existing| existing.key() != key);
        log.entries.push(stored);
        log.dirty = true;
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<HeaderValue> = cookie_headers.cloned().collect();
        self.jar.set_cookies(&mut headers.iter(), url);
        for header in &headers {
            if let Ok(raw) = header.to_str() {
                self.record(raw, url);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}
