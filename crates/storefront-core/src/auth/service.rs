use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::endpoints::{self, build_endpoint};
use crate::error::{ApiError, ApiResult};
use crate::http::{to_body, HttpClient};

use super::session::TokenFields;
use super::{AuthSession, LoginRequest, MePayload, RegisterRequest, TokenPair, User};

const INVALID_AUTH_RESPONSE: &str = "Respuesta de autenticacion invalida";
const INVALID_REFRESH_RESPONSE: &str = "Respuesta de refresh invalida";

/// Account operations against the `auth/*` endpoints.
#[derive(Debug, Clone)]
pub struct AuthService {
    http: HttpClient,
}

impl AuthService {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn login(&self, credentials: &LoginRequest) -> ApiResult<AuthSession> {
        self.authenticate(endpoints::auth::LOGIN, credentials).await
    }

    pub async fn register(&self, credentials: &RegisterRequest) -> ApiResult<AuthSession> {
        self.authenticate(endpoints::auth::REGISTER, credentials)
            .await
    }

    pub async fn me(&self) -> ApiResult<MePayload> {
        let endpoint = build_endpoint(endpoints::auth::ME, &[]);
        self.http.get(&endpoint, None).await?.data()
    }

    /// Explicitly exchange a refresh token. Expired sessions are normally refreshed by the client.
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        let endpoint = build_endpoint(endpoints::auth::REFRESH, &[]);
        let body = json!({ "refreshToken": refresh_token });
        let fields: TokenFields = self.http.post(&endpoint, Some(body), None).await?.data()?;
        fields
            .into_pair()
            .ok_or_else(|| ApiError::InvalidResponse(INVALID_REFRESH_RESPONSE.to_owned()))
    }

    pub async fn logout(&self) -> ApiResult<()> {
        let endpoint = build_endpoint(endpoints::auth::LOGOUT, &[]);
        self.http.post(&endpoint, None, None).await?;
        Ok(())
    }

    async fn authenticate<T>(&self, endpoint: &str, credentials: &T) -> ApiResult<AuthSession>
    where
        T: Serialize,
    {
        let body = to_body(credentials)?;
        let payload: AuthPayload = self.http.post(endpoint, Some(body), None).await?.data()?;
        payload.into_session()
    }
}

#[derive(Debug, Deserialize)]
struct AuthPayload {
    #[serde(default)]
    user: Option<User>,
    #[serde(flatten)]
    tokens: TokenFields,
}

impl AuthPayload {
    fn into_session(self) -> ApiResult<AuthSession> {
        match (self.user, self.tokens.into_pair()) {
            (Some(user), Some(tokens)) => Ok(AuthSession { user, tokens }),
            _ => Err(ApiError::InvalidResponse(INVALID_AUTH_RESPONSE.to_owned())),
        }
    }
}
