use serde_json::Value;
use thiserror::Error;

/// Machine code attached to the terminal failure produced when a token refresh fails.
pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";

const SESSION_EXPIRED_MESSAGE: &str = "La sesion expiro. Inicia sesion nuevamente.";
const MISSING_REFRESH_TOKEN_MESSAGE: &str = "No hay refresh token disponible";
pub(crate) const UNEXPECTED_ERROR_MESSAGE: &str = "Ocurrió un error inesperado";

/// Discriminant of [`ApiError`], convenient for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    TooManyRequests,
    InternalServerError,
    BadGateway,
    ServiceUnavailable,
    Network,
    RequestCancelled,
    Http,
    InvalidRequest,
    InvalidResponse,
}

impl ErrorKind {
    /// Kind produced for a received HTTP error status.
    pub fn for_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::TooManyRequests,
            500 => ErrorKind::InternalServerError,
            502 => ErrorKind::BadGateway,
            503 => ErrorKind::ServiceUnavailable,
            _ => ErrorKind::Http,
        }
    }

    /// Human readable message used when the server does not provide one.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "Solicitud inválida",
            ErrorKind::Unauthorized => "No autorizado",
            ErrorKind::Forbidden => "Acceso denegado",
            ErrorKind::NotFound => "Recurso no encontrado",
            ErrorKind::Conflict => "Conflicto",
            ErrorKind::TooManyRequests => "Demasiadas solicitudes",
            ErrorKind::InternalServerError => "Error interno del servidor",
            ErrorKind::BadGateway => "Bad Gateway",
            ErrorKind::ServiceUnavailable => "Servicio no disponible",
            ErrorKind::Network => "No se pudo conectar con el servidor. Verifica tu conexión.",
            ErrorKind::RequestCancelled => "Solicitud cancelada por el usuario.",
            ErrorKind::Http => UNEXPECTED_ERROR_MESSAGE,
            ErrorKind::InvalidRequest | ErrorKind::InvalidResponse => {
                "Error al procesar la solicitud"
            }
        }
    }
}

/// Server supplied failure payload shared by every status-derived error.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub message: String,
    pub code: Option<String>,
    pub details: Value,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: Value::Null,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Every failure the HTTP client hands back to its callers.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("{}", .0.message)]
    BadRequest(ErrorBody),
    #[error("{}", .0.message)]
    Unauthorized(ErrorBody),
    #[error("{}", .0.message)]
    Forbidden(ErrorBody),
    #[error("{}", .0.message)]
    NotFound(ErrorBody),
    #[error("{}", .0.message)]
    Conflict(ErrorBody),
    #[error("{}", .0.message)]
    TooManyRequests(ErrorBody),
    #[error("{}", .0.message)]
    InternalServerError(ErrorBody),
    #[error("{}", .0.message)]
    BadGateway(ErrorBody),
    #[error("{}", .0.message)]
    ServiceUnavailable(ErrorBody),
    #[error("{message}")]
    Network { message: String },
    #[error("{message}")]
    RequestCancelled { message: String },
    /// Status without a dedicated kind.
    #[error("{} ({})", .body.message, .body.code.as_deref().unwrap_or_default())]
    Http { status: u16, body: ErrorBody },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Map an HTTP status to exactly one taxonomy member.
    ///
    /// 401 maps to [`ApiError::Unauthorized`]; whether it triggers a refresh is decided by the
    /// client, not here.
    pub fn from_status(status: u16, body: ErrorBody) -> Self {
        match ErrorKind::for_status(status) {
            ErrorKind::BadRequest => ApiError::BadRequest(body),
            ErrorKind::Unauthorized => ApiError::Unauthorized(body),
            ErrorKind::Forbidden => ApiError::Forbidden(body),
            ErrorKind::NotFound => ApiError::NotFound(body),
            ErrorKind::Conflict => ApiError::Conflict(body),
            ErrorKind::TooManyRequests => ApiError::TooManyRequests(body),
            ErrorKind::InternalServerError => ApiError::InternalServerError(body),
            ErrorKind::BadGateway => ApiError::BadGateway(body),
            ErrorKind::ServiceUnavailable => ApiError::ServiceUnavailable(body),
            _ => ApiError::Http { status, body },
        }
    }

    pub fn network() -> Self {
        ApiError::Network {
            message: ErrorKind::Network.default_message().to_owned(),
        }
    }

    pub fn cancelled() -> Self {
        ApiError::RequestCancelled {
            message: ErrorKind::RequestCancelled.default_message().to_owned(),
        }
    }

    /// Terminal failure surfaced to every caller affected by a failed token refresh.
    pub fn session_expired() -> Self {
        ApiError::Unauthorized(ErrorBody::new(SESSION_EXPIRED_MESSAGE).with_code(SESSION_EXPIRED))
    }

    pub(crate) fn missing_refresh_token() -> Self {
        ApiError::Unauthorized(ErrorBody::new(MISSING_REFRESH_TOKEN_MESSAGE))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::BadRequest,
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::Forbidden(_) => ErrorKind::Forbidden,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Conflict(_) => ErrorKind::Conflict,
            ApiError::TooManyRequests(_) => ErrorKind::TooManyRequests,
            ApiError::InternalServerError(_) => ErrorKind::InternalServerError,
            ApiError::BadGateway(_) => ErrorKind::BadGateway,
            ApiError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::RequestCancelled { .. } => ErrorKind::RequestCancelled,
            ApiError::Http { .. } => ErrorKind::Http,
            ApiError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ApiError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    /// HTTP-like status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::BadRequest(_) => Some(400),
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::TooManyRequests(_) => Some(429),
            ApiError::InternalServerError(_) => Some(500),
            ApiError::BadGateway(_) => Some(502),
            ApiError::ServiceUnavailable(_) => Some(503),
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network { .. }
            | ApiError::RequestCancelled { .. }
            | ApiError::InvalidRequest(_)
            | ApiError::InvalidResponse(_) => None,
        }
    }

    fn body(&self) -> Option<&ErrorBody> {
        match self {
            ApiError::BadRequest(body)
            | ApiError::Unauthorized(body)
            | ApiError::Forbidden(body)
            | ApiError::NotFound(body)
            | ApiError::Conflict(body)
            | ApiError::TooManyRequests(body)
            | ApiError::InternalServerError(body)
            | ApiError::BadGateway(body)
            | ApiError::ServiceUnavailable(body)
            | ApiError::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Network { message } | ApiError::RequestCancelled { message } => message,
            ApiError::InvalidRequest(message) | ApiError::InvalidResponse(message) => message,
            other => other
                .body()
                .map(|body| body.message.as_str())
                .unwrap_or_default(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.body().and_then(|body| body.code.as_deref())
    }

    pub fn details(&self) -> Option<&Value> {
        self.body().map(|body| &body.details)
    }

    /// Whether the failure is transient: no response was received or the server answered 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::InternalServerError(_)
            | ApiError::BadGateway(_)
            | ApiError::ServiceUnavailable(_) => true,
            ApiError::Http { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_)) && self.code() == Some(SESSION_EXPIRED)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_maps_to_single_kind() {
        let cases = [
            (400, ErrorKind::BadRequest),
            (401, ErrorKind::Unauthorized),
            (403, ErrorKind::Forbidden),
            (404, ErrorKind::NotFound),
            (409, ErrorKind::Conflict),
            (429, ErrorKind::TooManyRequests),
            (500, ErrorKind::InternalServerError),
            (502, ErrorKind::BadGateway),
            (503, ErrorKind::ServiceUnavailable),
            (418, ErrorKind::Http),
            (504, ErrorKind::Http),
        ];
        for (status, kind) in cases {
            let err = ApiError::from_status(status, ErrorBody::new("boom"));
            assert_eq!(err.kind(), kind, "status {status}");
            assert_eq!(err.status_code(), Some(status));
        }
    }

    #[test]
    fn unmapped_status_display_includes_code() {
        let err = ApiError::from_status(418, ErrorBody::new("teapot").with_code("(HTTP_418)"));
        assert_eq!(err.to_string(), "teapot ((HTTP_418))");
    }

    #[test]
    fn retryable_only_for_transport_and_server_errors() {
        assert!(ApiError::network().is_retryable());
        assert!(ApiError::from_status(503, ErrorBody::new("x")).is_retryable());
        assert!(ApiError::from_status(504, ErrorBody::new("x")).is_retryable());
        assert!(!ApiError::from_status(404, ErrorBody::new("x")).is_retryable());
        assert!(!ApiError::from_status(401, ErrorBody::new("x")).is_retryable());
        assert!(!ApiError::cancelled().is_retryable());
        assert!(!ApiError::InvalidRequest("bad".into()).is_retryable());
    }

    #[test]
    fn session_expired_carries_fixed_code() {
        let err = ApiError::session_expired();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.code(), Some(SESSION_EXPIRED));
        assert!(err.is_session_expired());
        assert!(!ApiError::missing_refresh_token().is_session_expired());
    }

    #[test]
    fn accessors_expose_body() {
        let err = ApiError::from_status(
            409,
            ErrorBody::new("duplicate")
                .with_code("EMAIL_TAKEN")
                .with_details(json!({ "field": "email" })),
        );
        assert_eq!(err.message(), "duplicate");
        assert_eq!(err.code(), Some("EMAIL_TAKEN"));
        assert_eq!(err.details(), Some(&json!({ "field": "email" })));
        assert_eq!(ApiError::network().details(), None);
    }
}
