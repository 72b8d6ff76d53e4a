pub mod cookies;
pub mod csrf;
pub mod storage;

use anyhow::Context;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

use crate::config::DashboardConfig;
use crate::error::{AuthError, FieldError, SERVER_ERROR_MESSAGE};
use cookies::SessionCookies;
use csrf::{CsrfTokenResponse, CSRF_HEADER};
use storage::{JsonFileStorage, PersistedSession, SessionStorage};

const ALLAUTH_APP_PATH: &str = "/_allauth/app/v1/auth";
const VERIFY_EMAIL_FLOW: &str = "verify_email";

pub const VERIFICATION_SENT_MESSAGE: &str =
    "A verification email has been sent. Please check your inbox.";
const VERIFICATION_SERVER_ERROR_MESSAGE: &str = "Server error during verification.";
const CSRF_FETCH_ERROR_MESSAGE: &str = "Failed to fetch CSRF token.";

/// Profile returned by the backend. Only the common allauth fields are typed;
/// everything else is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStage {
    #[default]
    Signin,
    Signup,
    VerifyEmail,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub csrf_token: Option<String>,
    pub auth_stage: AuthStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Serialize)]
struct SignupPayload<'a> {
    email: &'a str,
    username: &'a str,
    password: &'a str,
    first_name: &'a str,
    last_name: &'a str,
}

#[derive(Serialize)]
struct LoginPayload<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct VerifyEmailPayload<'a> {
    key: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    VerificationPending { message: String },
}

/// Local session state is cleared whatever the variant; the variant only
/// says what the server made of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    Confirmed,
    ServerRejected { status: StatusCode },
    NotSent { reason: String },
}

impl LogoutOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, LogoutOutcome::Confirmed)
    }

    pub fn message(&self) -> String {
        match self {
            LogoutOutcome::Confirmed => "Logout successful!".to_string(),
            LogoutOutcome::ServerRejected { .. } => {
                "Logout completed, but API returned an error.".to_string()
            }
            LogoutOutcome::NotSent { reason } => format!("Logged out locally. {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    origin: Url,
}

impl AuthEndpoints {
    pub fn new(origin: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            origin: Url::parse(origin)?,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.origin.as_str().trim_end_matches('/'))
    }

    pub fn csrf_token(&self) -> String {
        self.url("/api/set-csrf-token")
    }

    pub fn signup(&self) -> String {
        self.url(&format!("{ALLAUTH_APP_PATH}/signup"))
    }

    pub fn login(&self) -> String {
        self.url(&format!("{ALLAUTH_APP_PATH}/login"))
    }

    pub fn verify_email(&self) -> String {
        self.url(&format!("{ALLAUTH_APP_PATH}/email/verify"))
    }

    pub fn logout(&self) -> String {
        self.url("/api/logout")
    }

    pub fn user(&self) -> String {
        self.url("/api/user")
    }
}

pub struct AuthStore {
    state: watch::Sender<AuthState>,
    http: reqwest::Client,
    cookies: Arc<SessionCookies>,
    endpoints: AuthEndpoints,
    storage: Box<dyn SessionStorage>,
}

impl AuthStore {
    pub fn new(config: &DashboardConfig) -> anyhow::Result<Self> {
        let endpoints = AuthEndpoints::new(&config.auth_origin)
            .with_context(|| format!("invalid auth origin {}", config.auth_origin))?;
        let storage = JsonFileStorage::in_dir(&config.state_dir);
        Self::with_storage(endpoints, Box::new(storage))
    }

    /// Builds the store and rehydrates the session and cookies `storage` holds.
    pub fn with_storage(
        endpoints: AuthEndpoints,
        storage: Box<dyn SessionStorage>,
    ) -> anyhow::Result<Self> {
        let saved_cookies = storage.load_cookies().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to load saved cookies");
            Vec::new()
        });
        let cookies = Arc::new(SessionCookies::restore(saved_cookies));
        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .build()
            .context("failed to build auth http client")?;

        let mut initial = AuthState::default();
        match storage.load() {
            Ok(Some(session)) => session.restore_into(&mut initial),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to rehydrate auth session; starting signed out")
            }
        }
        let (state, _) = watch::channel(initial);

        Ok(Self {
            state,
            http,
            cookies,
            endpoints,
            storage,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn cookie_jar(&self) -> &Arc<SessionCookies> {
        &self.cookies
    }

    /// Sends `request` and saves any cookies the response set.
    async fn send(&self, request: RequestBuilder) -> Result<Response, reqwest::Error> {
        let sent = request.send().await;
        if let Some(changed) = self.cookies.take_changes() {
            if let Err(err) = self.storage.save_cookies(&changed) {
                tracing::warn!(error = %err, "failed to persist session cookies");
            }
        }
        sent
    }

    pub fn set_auth_stage(&self, stage: AuthStage) {
        self.update(|state| state.auth_stage = stage);
    }

    fn update(&self, apply: impl FnOnce(&mut AuthState)) {
        let before = PersistedSession::from(&*self.state.borrow());
        self.state.send_if_modified(|state| {
            let previous = state.clone();
            apply(state);
            *state != previous
        });
        let after = PersistedSession::from(&*self.state.borrow());
        if after != before {
            if let Err(err) = self.storage.save(&after) {
                tracing::warn!(error = %err, "failed to persist auth session");
            }
        }
    }

    fn clear_session(&self) {
        self.update(|state| {
            state.user = None;
            state.is_authenticated = false;
        });
    }

    /// Asks the backend for a fresh CSRF token. A failed request keeps
    /// whatever token is already stored.
    pub async fn set_csrf_token(&self) -> Result<(), AuthError> {
        let fetched = async {
            self.send(self.http.get(self.endpoints.csrf_token()))
                .await?
                .json::<CsrfTokenResponse>()
                .await
        }
        .await;

        match fetched {
            Ok(body) => {
                if let Some(token) = body.csrftoken.filter(|token| !token.is_empty()) {
                    self.update(|state| state.csrf_token = Some(token));
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch CSRF token");
                Err(AuthError::transport(CSRF_FETCH_ERROR_MESSAGE, err))
            }
        }
    }

    /// Fresh token if the backend hands one out, else the stored one, else
    /// the `csrftoken` cookie.
    async fn resolve_csrf_token(&self) -> Option<String> {
        let _ = self.set_csrf_token().await;
        let stored = self.state.borrow().csrf_token.clone();
        stored.or_else(|| csrf::cookie_token(&*self.cookies, self.endpoints.origin()))
    }

    async fn post_json<T: Serialize>(
        &self,
        url: String,
        csrf_token: Option<&str>,
        payload: &T,
    ) -> Result<(StatusCode, JsonValue), reqwest::Error> {
        let mut request = self.http.post(url).json(payload);
        if let Some(token) = csrf_token {
            request = request.header(CSRF_HEADER, token);
        }
        let response = self.send(request).await?;
        let status = response.status();
        let body = response.json::<JsonValue>().await?;
        Ok((status, body))
    }

    pub async fn register(&self, registration: &Registration) -> Result<RegisterOutcome, AuthError> {
        let Some(token) = self.resolve_csrf_token().await else {
            tracing::error!("CSRF token is missing; cannot register");
            return Err(AuthError::MissingCsrfToken);
        };

        let payload = SignupPayload {
            email: &registration.email,
            username: &registration.email,
            password: &registration.password,
            first_name: &registration.first_name,
            last_name: &registration.last_name,
        };
        let (status, body) = self
            .post_json(self.endpoints.signup(), Some(token.as_str()), &payload)
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "registration request failed");
                AuthError::transport(SERVER_ERROR_MESSAGE, err)
            })?;

        if status == StatusCode::UNAUTHORIZED && verify_email_pending(&body) {
            tracing::info!(email = %registration.email, "registration pending email verification");
            return Ok(RegisterOutcome::VerificationPending {
                message: VERIFICATION_SENT_MESSAGE.to_string(),
            });
        }
        if status.is_success() {
            return Ok(RegisterOutcome::Registered);
        }

        tracing::warn!(%status, "registration rejected");
        Err(AuthError::Validation(field_errors(&body, "Registration failed")))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Option<UserProfile>, AuthError> {
        let Some(token) = self.resolve_csrf_token().await else {
            tracing::error!("CSRF token is missing; cannot log in");
            return Err(AuthError::MissingCsrfToken);
        };

        let (status, body) = self
            .post_json(self.endpoints.login(), Some(token.as_str()), &LoginPayload { email, password })
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "login request failed");
                AuthError::transport(SERVER_ERROR_MESSAGE, err)
            })?;

        if !status.is_success() {
            tracing::info!(%status, "login rejected");
            return Err(AuthError::Rejected(backend_message(&body, "Invalid credentials")));
        }

        let user = body
            .get("user")
            .or_else(|| body.pointer("/data/user"))
            .cloned()
            .and_then(|value| serde_json::from_value::<UserProfile>(value).ok());
        let stored = user.clone();
        self.update(|state| {
            state.user = stored;
            state.is_authenticated = true;
        });
        Ok(user)
    }

    /// Signs out on the server when possible; the local session is cleared
    /// on every path.
    pub async fn logout(&self) -> LogoutOutcome {
        let outcome = match self.resolve_csrf_token().await {
            None => {
                tracing::error!("CSRF token is missing; clearing local session only");
                LogoutOutcome::NotSent {
                    reason: "CSRF token missing.".to_string(),
                }
            }
            Some(token) => {
                let request = self
                    .http
                    .post(self.endpoints.logout())
                    .header(CSRF_HEADER, token)
                    .header(CONTENT_TYPE, "application/json");
                let sent = self.send(request).await;
                match sent {
                    Ok(response) if response.status().is_success() => LogoutOutcome::Confirmed,
                    Ok(response) => {
                        tracing::warn!(status = %response.status(), "logout endpoint returned an error");
                        LogoutOutcome::ServerRejected {
                            status: response.status(),
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "logout request failed");
                        LogoutOutcome::NotSent {
                            reason: "Server error. Try again later.".to_string(),
                        }
                    }
                }
            }
        };

        self.update(|state| {
            state.user = None;
            state.is_authenticated = false;
            state.csrf_token = None;
        });
        outcome
    }

    /// Confirms an email verification key. The backend answers a resolved
    /// verification with 401 and a flow list that no longer holds a
    /// `verify_email` flow; any other answer is a failure.
    pub async fn verify_email(&self, verification_key: &str) -> Result<(), AuthError> {
        let key = match urlencoding::decode(verification_key) {
            Ok(key) => key.into_owned(),
            Err(err) => {
                tracing::error!(error = %err, "verification key is not valid percent-encoded UTF-8");
                return Err(AuthError::Rejected(VERIFICATION_SERVER_ERROR_MESSAGE.to_string()));
            }
        };

        let (status, body) = self
            .post_json(self.endpoints.verify_email(), None, &VerifyEmailPayload { key: &key })
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "email verification request failed");
                AuthError::transport(VERIFICATION_SERVER_ERROR_MESSAGE, err)
            })?;

        if status != StatusCode::UNAUTHORIZED || flows(&body).is_none() {
            return Err(AuthError::Rejected(backend_message(&body, "Verification failed.")));
        }
        if verify_email_flow(&body).is_some() {
            return Err(AuthError::Rejected(backend_message(
                &body,
                "Verification is still pending.",
            )));
        }

        self.update(|state| state.auth_stage = AuthStage::Signin);
        Ok(())
    }

    /// Confirms the current session with the backend. Anything short of a
    /// successful profile response signs the user out locally.
    pub async fn fetch_user(&self) -> bool {
        let token = self.resolve_csrf_token().await;
        let mut request = self
            .http
            .get(self.endpoints.user())
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.header(CSRF_HEADER, token);
        }

        let profile = async {
            let response = self.send(request).await?;
            if !response.status().is_success() {
                tracing::info!(status = %response.status(), "no active session");
                return Ok(None);
            }
            response.json::<UserProfile>().await.map(Some)
        }
        .await;

        match profile {
            Ok(Some(user)) => {
                self.update(|state| {
                    state.user = Some(user);
                    state.is_authenticated = true;
                });
                true
            }
            Ok(None) => {
                self.clear_session();
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch user");
                self.clear_session();
                false
            }
        }
    }
}

fn flows(body: &JsonValue) -> Option<&Vec<JsonValue>> {
    body.pointer("/data/flows")?.as_array()
}

fn verify_email_flow(body: &JsonValue) -> Option<&JsonValue> {
    flows(body)?
        .iter()
        .find(|flow| flow.get("id").and_then(JsonValue::as_str) == Some(VERIFY_EMAIL_FLOW))
}

fn verify_email_pending(body: &JsonValue) -> bool {
    verify_email_flow(body)
        .and_then(|flow| flow.get("is_pending"))
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

fn backend_message(body: &JsonValue, fallback: &str) -> String {
    body.get("error")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .or_else(|| {
            body.get("errors")?
                .as_array()?
                .first()?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| fallback.to_string())
}

fn field_errors(body: &JsonValue, fallback: &str) -> Vec<FieldError> {
    let parsed = body
        .get("errors")
        .cloned()
        .and_then(|errors| serde_json::from_value::<Vec<FieldError>>(errors).ok())
        .filter(|errors| !errors.is_empty());
    parsed.unwrap_or_else(|| vec![FieldError::message(backend_message(body, fallback))])
}
