use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, Cookie, HeaderMapExt};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;
use tracing::{debug, error, warn};

use parlor_db::{Database, blocking};
use parlor_gateway::Notifier;
use parlor_types::api::Claims;


/// Cookie carrying the session token in session auth mode.
pub const SESSION_COOKIE: &str = "session_token";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub notifier: Notifier,
    pub resolver: Arc<dyn IdentityResolver>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,

    #[error("invalid credentials")]
    Invalid,

    #[error("session expired")]
    Expired,

    #[error("identity lookup failed: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Internal(e) = &self {
            error!("Identity lookup failed: {:#}", e);
            return (status, "internal error").into_response();
        }
        (status, "unauthorized").into_response()
    }
}

/// Maps request credentials to a user id.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<String, AuthError>;
}

/// Cookie sessions stored in the `sessions` table.
pub struct SessionResolver {
    db: Arc<Database>,
}

impl SessionResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityResolver for SessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let token = headers
            .typed_get::<Cookie>()
            .and_then(|cookie| cookie.get(SESSION_COOKIE).map(str::to_string))
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Missing)?;

        let session = {
            let db = self.db.clone();
            let token = token.clone();
            blocking(move || db.get_session(&token)).await?
        }
        .ok_or(AuthError::Invalid)?;

        if session.is_expired(Utc::now()) {
            let db = self.db.clone();
            if let Err(e) = blocking(move || db.delete_session(&token)).await {
                warn!("Failed to delete expired session: {:#}", e);
            }
            return Err(AuthError::Expired);
        }

        Ok(session.user_id)
    }
}

/// HS256 bearer tokens; the `sub` claim is the user id.
pub struct JwtResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let bearer = headers
            .typed_get::<Authorization<Bearer>>()
            .ok_or(AuthError::Missing)?;

        let token_data = decode::<Claims>(bearer.token(), &self.key, &self.validation)
            .map_err(|e| {
                debug!("Rejected bearer token: {}", e);
                AuthError::Invalid
            })?;

        if token_data.claims.sub.is_empty() {
            return Err(AuthError::Invalid);
        }
        Ok(token_data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header};
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn db() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "Alice").unwrap();
        Arc::new(db)
    }

    fn with_header(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn token(secret: &str, sub: &str, exp: chrono::DateTime<Utc>) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: exp.timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn session_cookie_resolves_user() {
        let db = db();
        db.create_session("tok", "alice", Utc::now() + Duration::hours(1)).unwrap();
        let resolver = SessionResolver::new(db);

        let headers = with_header(header::COOKIE, "theme=dark; session_token=tok");
        assert_eq!(resolver.resolve(&headers).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn expired_session_is_rejected_and_deleted() {
        let db = db();
        db.create_session("old", "alice", Utc::now() - Duration::minutes(5)).unwrap();
        let resolver = SessionResolver::new(db.clone());

        let err = resolver
            .resolve(&with_header(header::COOKIE, "session_token=old"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert!(db.get_session("old").unwrap().is_none());
    }

    #[tokio::test]
    async fn unreadable_session_expiry_is_rejected() {
        let db = db();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, user_id, expires_at) VALUES ('tok', 'alice', 'garbage')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        let resolver = SessionResolver::new(db.clone());

        let err = resolver
            .resolve(&with_header(header::COOKIE, "session_token=tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert!(db.get_session("tok").unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_or_unknown_session() {
        let resolver = SessionResolver::new(db());

        let err = resolver.resolve(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::Missing));

        let err = resolver
            .resolve(&with_header(header::COOKIE, "session_token=nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Invalid));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bearer_token_resolves_subject() {
        let resolver = JwtResolver::new("s3cret-for-tests");
        let t = token("s3cret-for-tests", "alice", Utc::now() + Duration::hours(1));

        let headers = with_header(header::AUTHORIZATION, &format!("Bearer {}", t));
        assert_eq!(resolver.resolve(&headers).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn bearer_token_rejections() {
        let resolver = JwtResolver::new("s3cret-for-tests");

        let wrong_key = token("other-secret", "alice", Utc::now() + Duration::hours(1));
        let expired = token("s3cret-for-tests", "alice", Utc::now() - Duration::hours(1));
        let no_subject = token("s3cret-for-tests", "", Utc::now() + Duration::hours(1));

        for t in [wrong_key, expired, no_subject] {
            let headers = with_header(header::AUTHORIZATION, &format!("Bearer {}", t));
            assert!(matches!(
                resolver.resolve(&headers).await.unwrap_err(),
                AuthError::Invalid
            ));
        }

        assert!(matches!(
            resolver.resolve(&HeaderMap::new()).await.unwrap_err(),
            AuthError::Missing
        ));
    }

    #[test]
    fn store_failures_are_server_errors() {
        let err = AuthError::from(anyhow::anyhow!("db gone"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
