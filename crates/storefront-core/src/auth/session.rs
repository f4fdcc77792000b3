use serde::{Deserialize, Serialize};

/// Access/refresh token pair. Both halves are always present together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Tokens as currently known to a session authority; either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|token| !token.is_empty())
    }
}

impl From<TokenPair> for TokenSnapshot {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: Some(pair.access_token),
            refresh_token: Some(pair.refresh_token),
        }
    }
}

impl From<Option<TokenPair>> for TokenSnapshot {
    fn from(pair: Option<TokenPair>) -> Self {
        pair.map(Into::into).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// Authenticated user together with its token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

pub type LoginRequest = Credentials;
pub type RegisterRequest = Credentials;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MePayload {
    pub user: User,
}

/// Token fields as returned by login, register and refresh endpoints.
///
/// Tokens may sit directly in `data` or in a nested `tokens` object; the flat field wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenFields {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub tokens: Option<NestedTokens>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NestedTokens {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenFields {
    pub fn into_pair(self) -> Option<TokenPair> {
        let nested = self.tokens.unwrap_or_default();
        let access_token = first_non_empty(self.access_token, nested.access_token)?;
        let refresh_token = first_non_empty(self.refresh_token, nested.refresh_token)?;
        Some(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

fn first_non_empty(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|value| !value.is_empty())
        .or_else(|| fallback.filter(|value| !value.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> TokenFields {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn flat_tokens_are_extracted() {
        let pair = fields(json!({ "accessToken": "a", "refreshToken": "r" }))
            .into_pair()
            .unwrap();
        assert_eq!(pair, TokenPair::new("a", "r"));
    }

    #[test]
    fn nested_tokens_fill_missing_flat_fields() {
        let pair = fields(json!({
            "accessToken": "",
            "tokens": { "accessToken": "nested-a", "refreshToken": "nested-r" }
        }))
        .into_pair()
        .unwrap();
        assert_eq!(pair, TokenPair::new("nested-a", "nested-r"));
    }

    #[test]
    fn partial_pair_is_rejected() {
        assert!(fields(json!({ "accessToken": "a" })).into_pair().is_none());
        assert!(fields(json!({ "tokens": { "refreshToken": "r" } }))
            .into_pair()
            .is_none());
    }

    #[test]
    fn session_serializes_flat() {
        let session = AuthSession {
            user: User {
                id: "u1".into(),
                email: "ada@example.com".into(),
            },
            tokens: TokenPair::new("a", "r"),
        };
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["accessToken"], "a");
        assert_eq!(value["refreshToken"], "r");
        assert_eq!(value["user"]["email"], "ada@example.com");
    }
}
