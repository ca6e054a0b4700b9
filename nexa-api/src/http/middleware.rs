//! Request authentication.
//!
//! Every endpoint requires a credential; the orchestrator treats the
//! resulting identity as opaque. Players that cannot set headers pass the
//! credential as an `apiKey` query parameter instead.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderValue},
};

use super::error::AppError;
use super::state::AppState;

/// Authenticated identity extracted from the request credential.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match parts.headers.get(axum::http::header::AUTHORIZATION) {
            Some(header) => extract_bearer_token(header).map_err(AppError::unauthorized)?,
            None => query_api_key(parts.uri.query())
                .ok_or_else(|| AppError::unauthorized("Missing credentials"))?,
        };

        let user_id = state
            .auth
            .validate(&token)
            .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

        Ok(AuthUser { user_id })
    }
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(header: &HeaderValue) -> Result<String, String> {
    let auth_str = header
        .to_str()
        .map_err(|_| "Invalid Authorization header value".to_string())?;
    auth_str
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| "Authorization header must be a Bearer token".to_string())
}

/// `apiKey` query parameter fallback for header-less players.
fn query_api_key(query: Option<&str>) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("apiKey=") {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parse() {
        let header = HeaderValue::from_static("Bearer abc123");
        assert_eq!(extract_bearer_token(&header).unwrap(), "abc123");

        let header = HeaderValue::from_static("Basic abc123");
        assert!(extract_bearer_token(&header).is_err());
    }

    #[test]
    fn test_query_api_key() {
        assert_eq!(
            query_api_key(Some("seekMs=0&apiKey=tok")),
            Some("tok".to_string())
        );
        assert_eq!(query_api_key(Some("seekMs=0")), None);
        assert_eq!(query_api_key(None), None);
        assert_eq!(query_api_key(Some("apiKey=")), None);
    }
}
