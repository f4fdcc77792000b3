use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult, ErrorBody, ErrorKind};

/// Description of a single API call, replayable after a token refresh.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    /// Path relative to the client's base URL, or an absolute URL.
    pub url: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// Serialize `body` as the JSON payload.
    pub fn with_json<T>(self, body: &T) -> ApiResult<Self>
    where
        T: Serialize + ?Sized,
    {
        Ok(self.with_body(Some(to_body(body)?)))
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Extra request header. `Authorization` is always managed by the client and ignored here.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

pub(crate) fn to_body<T>(body: &T) -> ApiResult<Value>
where
    T: Serialize + ?Sized,
{
    serde_json::to_value(body).map_err(|err| ApiError::InvalidRequest(err.to_string()))
}

/// `{ success, data }` wrapper returned by every storefront endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: T,
}

/// Successful HTTP response with its body fully buffered.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn json<T>(&self) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|err| ApiError::InvalidResponse(err.to_string()))
    }

    /// Decode the response envelope and return its `data` member.
    pub fn data<T>(&self) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        Ok(self.json::<Envelope<T>>()?.data)
    }
}

/// Classify a non-success response body into the error taxonomy.
///
/// Fields are read independently, so one malformed field does not discard the others.
pub(crate) fn error_from_response(status: StatusCode, body: &[u8]) -> ApiError {
    let status = status.as_u16();
    let raw: Value = serde_json::from_slice(body).unwrap_or_else(|_| {
        if body.is_empty() {
            Value::Null
        } else {
            Value::String(String::from_utf8_lossy(body).into_owned())
        }
    });

    let message = raw
        .get("message")
        .and_then(message_text)
        .unwrap_or_else(|| ErrorKind::for_status(status).default_message().to_owned());
    let code = match raw.get("code") {
        Some(Value::String(code)) if !code.is_empty() => code.clone(),
        Some(Value::String(_)) | Some(Value::Null) | None => format!("(HTTP_{status})"),
        Some(other) => other.to_string(),
    };
    let details = json!({
        "errors": raw.get("errors"),
        "details": raw.get("details"),
        "raw": &raw,
    });

    ApiError::from_status(
        status,
        ErrorBody::new(message).with_code(code).with_details(details),
    )
}

/// Validation layers often send `message` as a list of strings.
fn message_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UNEXPECTED_ERROR_MESSAGE;

    #[test]
    fn server_message_and_code_are_kept() {
        let body = br#"{"message":"email taken","code":"EMAIL_TAKEN","errors":["email"]}"#;
        let err = error_from_response(StatusCode::CONFLICT, body);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.message(), "email taken");
        assert_eq!(err.code(), Some("EMAIL_TAKEN"));
        assert_eq!(err.details().unwrap()["errors"], json!(["email"]));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let err = error_from_response(StatusCode::NOT_FOUND, b"");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "Recurso no encontrado");
        assert_eq!(err.code(), Some("(HTTP_404)"));
        assert_eq!(err.details().unwrap()["raw"], Value::Null);
    }

    #[test]
    fn unmapped_status_uses_generic_message() {
        let err = error_from_response(StatusCode::IM_A_TEAPOT, b"short and stout");
        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.message(), UNEXPECTED_ERROR_MESSAGE);
        assert_eq!(err.details().unwrap()["raw"], "short and stout");
    }

    #[test]
    fn list_message_keeps_code_and_errors() {
        let body = br#"{"message":["email must be an email","password is too short"],"code":"VALIDATION_FAILED","errors":{"email":"invalid"}}"#;
        let err = error_from_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), "email must be an email, password is too short");
        assert_eq!(err.code(), Some("VALIDATION_FAILED"));
        assert_eq!(err.details().unwrap()["errors"]["email"], "invalid");
    }

    #[test]
    fn malformed_message_falls_back_without_losing_code() {
        let err = error_from_response(StatusCode::FORBIDDEN, br#"{"message":{"x":1},"code":"NO_ROLE"}"#);
        assert_eq!(err.message(), ErrorKind::Forbidden.default_message());
        assert_eq!(err.code(), Some("NO_ROLE"));
    }

    #[test]
    fn numeric_code_is_stringified() {
        let err = error_from_response(StatusCode::BAD_REQUEST, br#"{"code":42}"#);
        assert_eq!(err.code(), Some("42"));
    }

    #[test]
    fn envelope_data_is_unwrapped() {
        let response = ApiResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            br#"{"success":true,"data":{"id":"7"}}"#.to_vec(),
        );
        let data: Value = response.data().unwrap();
        assert_eq!(data["id"], "7");
        let err = response.data::<Vec<String>>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }
}
