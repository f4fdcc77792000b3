//! Logical endpoint names mapped to path templates.

pub mod auth {
    pub const REGISTER: &str = "auth/register";
    pub const LOGIN: &str = "auth/login";
    pub const ME: &str = "auth/me";
    pub const REFRESH: &str = "auth/refresh";
    pub const LOGOUT: &str = "auth/logout";
}

pub mod products {
    pub const LIST: &str = "products";
    pub const CREATE: &str = "products";
    pub const UPDATE: &str = "products/:id";
    pub const DELETE: &str = "products/:id";
}

/// Substitute `:name` placeholders in `template` with the supplied values.
///
/// Each parameter replaces its first occurrence only. Placeholders without a matching
/// parameter are left in the path verbatim.
pub fn build_endpoint(template: &str, params: &[(&str, &str)]) -> String {
    params
        .iter()
        .fold(template.to_owned(), |url, (key, value)| {
            url.replacen(&format!(":{key}"), value, 1)
        })
}

/// Whether `url` targets one of the session endpoints that must never trigger a token refresh.
pub fn is_auth_endpoint(url: &str) -> bool {
    [auth::LOGIN, auth::REGISTER, auth::REFRESH, auth::LOGOUT]
        .iter()
        .any(|endpoint| url.contains(endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_params() {
        assert_eq!(
            build_endpoint(products::UPDATE, &[("id", "42")]),
            "products/42"
        );
    }

    #[test]
    fn missing_param_stays_literal() {
        assert_eq!(build_endpoint(products::DELETE, &[]), "products/:id");
        assert_eq!(
            build_endpoint(products::DELETE, &[("sku", "1")]),
            "products/:id"
        );
    }

    #[test]
    fn auth_endpoints_detected() {
        assert!(is_auth_endpoint("auth/login"));
        assert!(is_auth_endpoint("/api/auth/refresh"));
        assert!(is_auth_endpoint(auth::LOGOUT));
        assert!(!is_auth_endpoint(auth::ME));
        assert!(!is_auth_endpoint("products/1"));
    }
}
