pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::jwt::{Claims, JwtService},
    error::{AppError, AppResult},
    state::AppState,
};

/// The owner every ledger operation is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
}

impl AuthenticatedUser {
    /// Any verification failure is a 401.
    pub fn from_access_token(jwt: &JwtService, token: &str) -> AppResult<Self> {
        jwt.verify_token(token)
            .map(Self::from)
            .map_err(|err| {
                debug!(error = %err, "rejected access token");
                AppError::unauthorized()
            })
    }
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        Self::from_access_token(&state.jwt, bearer.token())
    }
}
