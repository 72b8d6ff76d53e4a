use reqwest::cookie::CookieStore;
use serde::Deserialize;
use url::Url;

pub const CSRF_COOKIE_NAME: &str = "csrftoken";
pub const CSRF_HEADER: &str = "X-CSRFToken";

#[derive(Debug, Deserialize)]
pub(crate) struct CsrfTokenResponse {
    #[serde(default)]
    pub csrftoken: Option<String>,
}

/// Reads the `csrftoken` cookie the backend set on `origin`.
pub fn cookie_token(cookies: &dyn CookieStore, origin: &Url) -> Option<String> {
    let header = cookies.cookies(origin)?;
    let raw = header.to_str().ok()?;
    token_from_cookie_header(raw)
}

pub fn token_from_cookie_header(raw: &str) -> Option<String> {
    let prefix = format!("{CSRF_COOKIE_NAME}=");
    let value = raw
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))?;
    let decoded = urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string());
    Some(decoded).filter(|token| !token.is_empty())
}
