use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::AuthContext;
use crate::app::AppState;
use crate::error::ErrorResponse;
use crate::middleware::RequestIdExt;

/// Extractor for a verified bearer token
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Extractor for an authenticated operator (`profiles.is_admin`)
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthContext);

impl std::ops::Deref for RequireAdmin {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
    NotAdmin,
    Lookup { request_id: Option<String> },
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::MissingToken => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing authorization token")
            }
            AuthError::InvalidFormat => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Invalid authorization format")
            }
            AuthError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Invalid or expired token")
            }
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "FORBIDDEN", "Admin privileges required"),
            AuthError::Lookup { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred",
            ),
        };

        let request_id = match self {
            AuthError::Lookup { request_id } => request_id,
            _ => None,
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidFormat)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat)?;
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = state.jwks_cache.verify_token(token).await.map_err(|e| {
            tracing::warn!(error = %e, "JWT verification failed");
            AuthError::InvalidToken
        })?;

        let context = AuthContext::from_claims(&claims).map_err(|e| {
            tracing::warn!(error = %e, "Failed to build auth context");
            AuthError::InvalidToken
        })?;

        Ok(RequireAuth(context))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(context) = RequireAuth::from_request_parts(parts, state).await?;

        let is_admin: Option<bool> = sqlx::query_scalar("SELECT is_admin FROM profiles WHERE id = $1")
            .bind(context.user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %context.user_id, error = %e, "Admin lookup failed");
                AuthError::Lookup {
                    request_id: parts.headers.request_id().map(str::to_string),
                }
            })?;

        if is_admin != Some(true) {
            tracing::warn!(user_id = %context.user_id, "Non-admin user attempted to access admin route");
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(context))
    }
}

impl RequireAdmin {
    pub fn admin_id(&self) -> Uuid {
        self.user_id
    }
}
