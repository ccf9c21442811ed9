//! Client-held session: the single source of truth for "is there a
//! currently valid authenticated principal".
//!
//! The five session fields live in [`SessionStorage`] under fixed keys and
//! are written together at login, read by every protected call, and removed
//! by logout, lazy expiry, or a server-side 401.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{self, ApiError, ApiResult, MSG_LOGIN_FAILED};
use crate::gateway::{ApiRequest, Transport};
use crate::storage::{MemoryStorage, SessionStorage};

pub const KEY_TOKEN: &str = "token";
pub const KEY_TOKEN_EXPIRATION: &str = "tokenExpiration";
pub const KEY_USER_NAME: &str = "userName";
pub const KEY_USER_ROLES: &str = "userRoles";
pub const KEY_USER_ID: &str = "userId";

const SESSION_KEYS: [&str; 5] = [
    KEY_TOKEN,
    KEY_TOKEN_EXPIRATION,
    KEY_USER_NAME,
    KEY_USER_ROLES,
    KEY_USER_ID,
];

/// Proof of authentication plus denormalized profile data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub display_name: String,
    /// Server-provided order; effectively a singleton in this system.
    pub roles: Vec<String>,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub identification_number: String,
    pub password: String,
}

/// Owns validity computation and logout; the only writer of session fields.
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Authenticate and persist the session.
    ///
    /// On success all five fields are written as one atomic unit; on any
    /// failure nothing is written, so a prior session (valid or stale)
    /// stays byte-for-byte unchanged.
    pub async fn login(
        &self,
        transport: &dyn Transport,
        credentials: &Credentials,
    ) -> ApiResult<Session> {
        let body = serde_json::to_value(credentials).map_err(|e| {
            warn!("failed to encode credentials: {}", e);
            ApiError::unknown()
        })?;
        let resp = match transport.send(ApiRequest::post("/auth/login").json(body)).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("login transport failure: {}", e);
                return Err(ApiError::network());
            }
        };

        if !resp.is_success() {
            // Bad credentials arrive as a defined payload with a message;
            // validation maps and other statuses use the ordinary mapping.
            if let Some(msg) = login_failure_message(&resp.body) {
                return Err(ApiError::authentication_failed(msg));
            }
            if resp.body.get("errors").is_none() && (resp.status == 401 || resp.status == 400) {
                return Err(ApiError::authentication_failed(MSG_LOGIN_FAILED));
            }
            return Err(error::normalize(resp.status, &resp.body));
        }

        let session = parse_login_response(&resp.body)?;

        let roles_json = serde_json::to_string(&session.roles).map_err(|e| {
            warn!("failed to encode roles: {}", e);
            ApiError::unknown()
        })?;
        self.storage
            .put_all(&[
                (KEY_TOKEN, session.token.clone()),
                (KEY_TOKEN_EXPIRATION, session.expires_at.to_rfc3339()),
                (KEY_USER_NAME, session.display_name.clone()),
                (KEY_USER_ROLES, roles_json),
                (KEY_USER_ID, session.user_id.clone()),
            ])
            .map_err(|e| {
                warn!("failed to persist session: {}", e);
                ApiError::unknown()
            })?;

        info!("logged in as {} (user {})", session.display_name, session.user_id);
        Ok(session)
    }

    /// True iff a token is stored and its expiry lies in the future.
    /// A present-but-expired (or unparseable) session is cleared here —
    /// lazy expiry, no background timer.
    pub fn is_valid(&self) -> bool {
        match self.storage.get(KEY_TOKEN) {
            Some(t) if !t.is_empty() => {}
            _ => return false,
        }
        let raw = match self.storage.get(KEY_TOKEN_EXPIRATION) {
            Some(r) if !r.is_empty() => r,
            _ => return false,
        };
        let expires_at = match DateTime::parse_from_rfc3339(&raw) {
            Ok(e) => e.with_timezone(&Utc),
            Err(_) => {
                debug!("stored tokenExpiration is malformed, dropping session");
                self.clear();
                return false;
            }
        };
        if Utc::now() >= expires_at {
            debug!("session expired, clearing");
            self.clear();
            return false;
        }
        true
    }

    /// The session iff currently valid; partial or malformed stored state
    /// counts as logged out. Never fails.
    pub fn current(&self) -> Option<Session> {
        if !self.is_valid() {
            return None;
        }
        let token = self.storage.get(KEY_TOKEN)?;
        let expires_at = self
            .storage
            .get(KEY_TOKEN_EXPIRATION)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())?
            .with_timezone(&Utc);
        let display_name = self.storage.get(KEY_USER_NAME)?;
        let user_id = self.storage.get(KEY_USER_ID)?;
        let roles = self
            .storage
            .get(KEY_USER_ROLES)
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .unwrap_or_default();
        Some(Session { token, expires_at, display_name, roles, user_id })
    }

    /// Remove every session field. Idempotent.
    pub fn clear(&self) {
        self.storage.remove_all(&SESSION_KEYS);
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.current()
            .map(|s| s.roles.iter().any(|r| r == role))
            .unwrap_or(false)
    }
}

fn login_failure_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Pull the session out of a successful login payload:
/// `{ accessToken, expiresAt, user: { fullName, role, id } }`.
fn parse_login_response(body: &Value) -> ApiResult<Session> {
    let token = match body.get("accessToken").and_then(Value::as_str) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => {
            // 2xx without a token: the server refused the login in-band.
            let msg = login_failure_message(body).unwrap_or_else(|| MSG_LOGIN_FAILED.to_string());
            return Err(ApiError::authentication_failed(msg));
        }
    };
    let expires_at = body
        .get("expiresAt")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|e| e.with_timezone(&Utc))
        .ok_or_else(|| {
            warn!("login response is missing a usable expiresAt");
            ApiError::authentication_failed(MSG_LOGIN_FAILED)
        })?;

    let user = body.get("user").unwrap_or(&Value::Null);
    let display_name = user
        .get("fullName")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let roles = match user.get("role") {
        Some(Value::String(role)) => vec![role.clone()],
        _ => Vec::new(),
    };
    // Ids arrive as strings or numbers depending on the backend version.
    let user_id = match user.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    Ok(Session { token, expires_at, display_name, roles, user_id })
}
