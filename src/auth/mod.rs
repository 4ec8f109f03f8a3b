/*!
 * # Authentication boundary
 *
 * Sessions are issued by an external identity service. This module only
 * validates the HS256 bearer tokens it signs and exposes the caller's user id
 * to handlers through the [`AuthUser`] and [`MaybeAuthUser`] extractors.
 */

use async_trait::async_trait;
use axum::{
    extract::FromRef,
    http::{header, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::errors::ServiceError;

/// Claims the storefront relies on. Issuer and audience are checked by
/// `jsonwebtoken` against the raw token before this struct is filled.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
}

/// Authenticated caller extracted from the bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Caller that may be anonymous; an invalid token counts as anonymous.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

pub struct AuthService {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthService {
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::Unauthorized("Session has expired".to_string())
                }
                _ => ServiceError::Unauthorized("Invalid session token".to_string()),
            })?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(ServiceError::Unauthorized(
                "Session token has no subject".to_string(),
            ));
        }

        Ok(claims)
    }

    /// Resolves the user id from an `Authorization: Bearer` header, if any.
    pub fn user_from_headers(&self, headers: &HeaderMap) -> Result<Option<AuthUser>, ServiceError> {
        match bearer_token(headers) {
            Some(token) => self.validate_token(token).map(|claims| {
                Some(AuthUser {
                    user_id: claims.sub,
                })
            }),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService").finish_non_exhaustive()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        auth.user_from_headers(&parts.headers)?
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))
    }
}

#[async_trait]
impl<S> axum::extract::FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        match auth.user_from_headers(&parts.headers) {
            Ok(user) => Ok(MaybeAuthUser(user)),
            Err(err) => {
                debug!(error = %err, "ignoring invalid token on optional-auth route");
                Ok(MaybeAuthUser(None))
            }
        }
    }
}
