//! Bearer Authentication
//!
//! Buyer identity comes from an [`Authenticator`]. The server ships a static
//! token table for deployments that sit behind an identity proxy.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    Json,
};
use std::collections::HashMap;

use checkout_core::{Authenticator, CheckoutError, Result, UserId};

use crate::handlers::{api_error, ApiError, ErrorResponse};
use crate::state::AppState;

/// Authenticated buyer
#[derive(Clone, Copy, Debug)]
pub struct AuthUser(pub UserId);

fn unauthorized(reason: &str) -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: reason.into(),
            code: "UNAUTHORIZED".into(),
        }),
    )
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| unauthorized("Missing bearer token"))?;

        match state.authenticator.authenticate(token).await {
            Ok(Some(user)) => Ok(AuthUser(user)),
            Ok(None) => Err(unauthorized("Invalid token")),
            Err(e) => {
                tracing::error!("Authentication error: {}", e);
                Err(api_error(&e))
            }
        }
    }
}

/// Fixed token → user table
#[derive(Clone, Debug, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenAuthenticator {
    /// Parse `token:user_id` pairs separated by commas
    pub fn parse(table: &str) -> Result<Self> {
        let mut tokens = HashMap::new();
        for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, user) = entry
                .rsplit_once(':')
                .ok_or_else(|| CheckoutError::Config(format!("token entry '{}' has no user id", entry)))?;
            let user: u64 = user
                .trim()
                .parse()
                .map_err(|_| CheckoutError::Config(format!("invalid user id in token entry '{}'", entry)))?;
            tokens.insert(token.trim().to_string(), UserId(user));
        }
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Option<UserId>> {
        Ok(self.tokens.get(token).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_tokens() {
        let auth = StaticTokenAuthenticator::parse("alice-token:1, bob-token:2,").unwrap();
        assert_eq!(auth.len(), 2);
        assert_eq!(auth.authenticate("alice-token").await.unwrap(), Some(UserId(1)));
        assert_eq!(auth.authenticate("mallory").await.unwrap(), None);
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(StaticTokenAuthenticator::parse("no-user-id").is_err());
        assert!(StaticTokenAuthenticator::parse("tok:abc").is_err());
        assert!(StaticTokenAuthenticator::parse("").unwrap().is_empty());
    }
}
