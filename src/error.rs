//! Unified API error model and response normalization.
//! Every failure a gateway call can surface is one of these kinds, each
//! carrying a display-ready message the hosting UI can show as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Fixed user-facing messages for the status-mapped kinds.
pub const MSG_UNAUTHORIZED: &str = "Usuario no autenticado";
pub const MSG_BAD_REQUEST: &str = "Datos inválidos";
pub const MSG_FORBIDDEN: &str = "No tienes permisos para realizar esta acción";
pub const MSG_NOT_FOUND: &str = "Recurso no encontrado";
pub const MSG_SERVER_ERROR: &str = "Error interno del servidor";
pub const MSG_NETWORK: &str = "Error de conexión. Verifique su conexión a internet.";
pub const MSG_UNKNOWN: &str = "Ha ocurrido un error";
pub const MSG_LOGIN_FAILED: &str = "Error al iniciar sesión";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiError {
    /// Login endpoint returned a defined failure payload (bad credentials).
    AuthenticationFailed { message: String },
    /// Authorization-failure status; the gateway clears the session and
    /// fires the invalidation hook before surfacing this.
    Unauthorized { message: String },
    /// Field-level validation errors, flattened into one message.
    ValidationFailed { message: String },
    Forbidden { message: String },
    NotFound { message: String },
    ServerError { message: String },
    /// Transport failure: no response was received at all.
    Network { message: String },
    Unknown { message: String },
}

impl ApiError {
    pub fn authentication_failed<S: Into<String>>(msg: S) -> Self {
        ApiError::AuthenticationFailed { message: msg.into() }
    }
    pub fn unauthorized() -> Self {
        ApiError::Unauthorized { message: MSG_UNAUTHORIZED.into() }
    }
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        ApiError::ValidationFailed { message: msg.into() }
    }
    pub fn forbidden() -> Self {
        ApiError::Forbidden { message: MSG_FORBIDDEN.into() }
    }
    pub fn not_found() -> Self {
        ApiError::NotFound { message: MSG_NOT_FOUND.into() }
    }
    pub fn server_error() -> Self {
        ApiError::ServerError { message: MSG_SERVER_ERROR.into() }
    }
    pub fn network() -> Self {
        ApiError::Network { message: MSG_NETWORK.into() }
    }
    pub fn unknown() -> Self {
        ApiError::Unknown { message: MSG_UNKNOWN.into() }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            ApiError::AuthenticationFailed { .. } => "authentication_failed",
            ApiError::Unauthorized { .. } => "unauthorized",
            ApiError::ValidationFailed { .. } => "validation_failed",
            ApiError::Forbidden { .. } => "forbidden",
            ApiError::NotFound { .. } => "not_found",
            ApiError::ServerError { .. } => "server_error",
            ApiError::Network { .. } => "network",
            ApiError::Unknown { .. } => "unknown",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::AuthenticationFailed { message }
            | ApiError::Unauthorized { message }
            | ApiError::ValidationFailed { message }
            | ApiError::Forbidden { message }
            | ApiError::NotFound { message }
            | ApiError::ServerError { message }
            | ApiError::Network { message }
            | ApiError::Unknown { message } => message.as_str(),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind_str(), self.message())
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;

/// Map a non-success HTTP response onto the closed error set.
///
/// The precedence mirrors the server's observed failure shapes: an explicit
/// body `message` field wins, then an ASP.NET-style `errors` map, then the
/// fixed status-code mapping, then the generic fallback. 401 is always
/// `Unauthorized` regardless of body shape.
pub fn normalize(status: u16, body: &Value) -> ApiError {
    if status == 401 {
        return ApiError::unauthorized();
    }

    if let Some(msg) = body.get("message").and_then(Value::as_str) {
        return with_status_kind(status, msg);
    }

    if let Some(errors) = body.get("errors").and_then(Value::as_object) {
        return ApiError::validation(flatten_errors(errors));
    }

    match status {
        400 => ApiError::validation(MSG_BAD_REQUEST),
        403 => ApiError::forbidden(),
        404 => ApiError::not_found(),
        500..=599 => ApiError::server_error(),
        _ => ApiError::unknown(),
    }
}

/// Keep the status-derived kind but carry the server-provided message.
fn with_status_kind(status: u16, msg: &str) -> ApiError {
    let message = msg.to_string();
    match status {
        400 | 422 => ApiError::ValidationFailed { message },
        403 => ApiError::Forbidden { message },
        404 => ApiError::NotFound { message },
        500..=599 => ApiError::ServerError { message },
        _ => ApiError::Unknown { message },
    }
}

/// Flatten a `{ field: [msgs] }` map into one string, field order preserved.
/// Scalar values are tolerated alongside arrays.
fn flatten_errors(errors: &serde_json::Map<String, Value>) -> String {
    let mut parts: Vec<String> = Vec::new();
    for value in errors.values() {
        match value {
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => parts.push(s.clone()),
                        other => parts.push(other.to_string()),
                    }
                }
            }
            Value::String(s) => parts.push(s.clone()),
            other => parts.push(other.to_string()),
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_mapping() {
        assert_eq!(normalize(401, &Value::Null), ApiError::unauthorized());
        assert_eq!(
            normalize(400, &Value::Null),
            ApiError::validation(MSG_BAD_REQUEST)
        );
        assert_eq!(normalize(403, &Value::Null), ApiError::forbidden());
        assert_eq!(normalize(404, &Value::Null), ApiError::not_found());
        assert_eq!(normalize(500, &Value::Null), ApiError::server_error());
        assert_eq!(normalize(503, &Value::Null), ApiError::server_error());
        assert_eq!(normalize(418, &Value::Null), ApiError::unknown());
    }

    #[test]
    fn body_message_wins_over_status_default() {
        let err = normalize(404, &json!({ "message": "no existe el department" }));
        assert_eq!(err, ApiError::NotFound { message: "no existe el department".into() });

        let err = normalize(500, &json!({ "message": "boom" }));
        assert_eq!(err, ApiError::ServerError { message: "boom".into() });
    }

    #[test]
    fn validation_errors_flatten_in_field_order() {
        let body = json!({
            "errors": {
                "Name": ["required"],
                "Budget": ["must be positive"]
            }
        });
        let err = normalize(400, &body);
        assert_eq!(err.message(), "required, must be positive");
    }

    #[test]
    fn validation_errors_tolerate_scalars() {
        let body = json!({
            "errors": {
                "Name": "required",
                "StartDate": ["too early", "wrong format"]
            }
        });
        let err = normalize(400, &body);
        assert_eq!(err.message(), "required, too early, wrong format");
    }

    #[test]
    fn validation_errors_keep_non_string_array_items() {
        let body = json!({
            "errors": {
                "Budget": ["must be positive", 42],
                "Name": [{ "detail": "dup" }]
            }
        });
        let err = normalize(400, &body);
        assert_eq!(err.message(), r#"must be positive, 42, {"detail":"dup"}"#);
    }

    #[test]
    fn unauthorized_ignores_body_shape() {
        let err = normalize(401, &json!({ "message": "token vencido" }));
        assert_eq!(err, ApiError::unauthorized());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = ApiError::not_found();
        assert_eq!(format!("{}", err), format!("not_found: {}", MSG_NOT_FOUND));
    }
}
