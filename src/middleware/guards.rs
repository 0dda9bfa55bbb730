//! Extractors that enforce authentication at the type level.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;

/// Authenticated user, populated by the auth middleware.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)?;

        Ok(User {
            id: user.id,
            name: user.name,
            avatar_url: user.avatar_url,
        })
    }
}
