//! Bearer-token authentication. A valid token puts a [`Principal`] into the
//! request extensions; anything else leaves the request anonymous.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use platform_api::ApiError;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct AuthConfig {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_minutes: i64,
}

impl AuthConfig {
    pub fn new(secret: &[u8], ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_minutes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
}

pub fn issue_token(user_id: Uuid, config: &AuthConfig) -> jsonwebtoken::errors::Result<String> {
    let now = Utc::now();
    let exp = now
        .checked_add_signed(Duration::minutes(config.ttl_minutes))
        .unwrap_or(now)
        .timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        exp,
        iat: now.timestamp() as usize,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &config.encoding)
}

pub fn decode_token(token: &str, config: &AuthConfig) -> jsonwebtoken::errors::Result<Claims> {
    jsonwebtoken::decode::<Claims>(token, &config.decoding, &Validation::default())
        .map(|data| data.claims)
}

pub async fn authenticate(
    State(auth): State<Arc<AuthConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(header) = request.headers().typed_get::<Authorization<Bearer>>() {
        match decode_token(header.token(), &auth) {
            Ok(claims) => {
                request
                    .extensions_mut()
                    .insert(Principal { id: claims.sub });
            }
            Err(err) => debug!(error = %err, "ignoring invalid bearer token"),
        }
    }
    next.run(request).await
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_with_same_secret_only() {
        let config = AuthConfig::new(&[3u8; 32], 5);
        let user = Uuid::new_v4();
        let token = issue_token(user, &config).unwrap();
        assert_eq!(decode_token(&token, &config).unwrap().sub, user);

        let other = AuthConfig::new(&[4u8; 32], 5);
        assert!(decode_token(&token, &other).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        // Past the default 60s leeway.
        let config = AuthConfig::new(&[3u8; 32], -10);
        let token = issue_token(Uuid::new_v4(), &config).unwrap();
        assert!(decode_token(&token, &config).is_err());
    }
}
