use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: i64,    // expiration (unix timestamp)
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Authenticated identity attached to requests and socket connections.
///
/// `name`/`avatar_url` ride along from the token claims; profile data is
/// owned elsewhere and this service only echoes it into delivery events.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Validate an HS256 bearer token and extract the identity.
pub fn verify_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| AppError::Unauthorized)?;

    let id = Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::Unauthorized)?;
    Ok(AuthUser {
        id,
        name: data.claims.name,
        avatar_url: data.claims.avatar_url,
    })
}

/// Middleware guarding the API surface: extracts the bearer token and adds
/// the authenticated user to request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let user = verify_token(token, &state.config.jwt_secret)?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_identity() {
        let id = Uuid::new_v4();
        let claims = Claims {
            sub: id.to_string(),
            exp: chrono::Utc::now().timestamp() + 600,
            name: Some("ada".into()),
            avatar_url: None,
        };

        let user = verify_token(&token_for(&claims, "s3cret"), "s3cret").unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.name.as_deref(), Some("ada"));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: chrono::Utc::now().timestamp() + 600,
            name: None,
            avatar_url: None,
        };

        let err = verify_token(&token_for(&claims, "other"), "s3cret").unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_non_uuid_subject_is_rejected() {
        let claims = Claims {
            sub: "not-a-uuid".into(),
            exp: chrono::Utc::now().timestamp() + 600,
            name: None,
            avatar_url: None,
        };

        assert!(verify_token(&token_for(&claims, "s3cret"), "s3cret").is_err());
    }
}
