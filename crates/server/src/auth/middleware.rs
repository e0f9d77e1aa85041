//! # Authentication Middleware
//!
//! This module provides the Axum extractor for optional JWT-based authentication.
//! When `auth_enabled` is off every request is accepted anonymously. When it is
//! on, requests must carry `Authorization: Bearer <token>` signed with the
//! configured HS256 secret. The `aud` claim is enforced only when
//! `jwt_audience` is configured.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::{config::non_empty, state::AppState};

/// Represents the claims we expect to find in the JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The subject of the token, used as the caller's identity.
    pub sub: String,
    /// The expiration timestamp.
    pub exp: usize,
    /// The intended audience, checked against `jwt_audience` when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// The caller's identity: the token subject, or `None` when auth is disabled.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Option<String>);

/// A custom rejection type for authentication failures.
pub struct AuthError(StatusCode, String);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.0,
            Json(json!({ "error": { "kind": "unauthorized", "message": self.1 } })),
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.config.auth_enabled {
            return Ok(AuthenticatedUser(None));
        }

        let bearer_header =
            Option::<TypedHeader<Authorization<Bearer>>>::from_request_parts(parts, state)
                .await
                .map_err(|e| {
                    warn!("Unexpected error during header extraction: {}", e);
                    AuthError(
                        StatusCode::BAD_REQUEST,
                        "Invalid Authorization header format.".to_string(),
                    )
                })?;

        let Some(TypedHeader(Authorization(bearer))) = bearer_header else {
            debug!("Rejecting request without a bearer token.");
            return Err(AuthError(
                StatusCode::UNAUTHORIZED,
                "Missing bearer token.".to_string(),
            ));
        };

        let jwt_secret = non_empty(&state.config.jwt_secret).ok_or_else(|| {
            error!("auth_enabled is set but no jwt_secret is configured.");
            AuthError(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication is misconfigured.".to_string(),
            )
        })?;

        let mut validation = Validation::default();
        match non_empty(&state.config.jwt_audience) {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Claims>(
            bearer.token(),
            &DecodingKey::from_secret(jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            warn!("JWT validation failed: {}", e);
            AuthError(
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token.".to_string(),
            )
        })?;

        Ok(AuthenticatedUser(Some(token_data.claims.sub)))
    }
}
