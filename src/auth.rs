use anyhow::Result;
use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::web::AppState;

/// Name of the admin session cookie
pub const SESSION_COOKIE: &str = "admin_session";

/// Admin access configuration: one shared password, one signing secret.
/// There are no per-admin accounts: the session is a single boolean
/// capability, so the password is compared directly, without hashing.
#[derive(Clone)]
pub struct AdminConfig {
    password: String,
    session_secret: String,
}

impl AdminConfig {
    pub fn from_env() -> Result<Self> {
        let password = std::env::var("ADMIN_PASSWORD")
            .map_err(|_| anyhow::anyhow!("ADMIN_PASSWORD environment variable not set"))?;
        let session_secret = std::env::var("SESSION_SECRET")
            .map_err(|_| anyhow::anyhow!("SESSION_SECRET environment variable not set"))?;

        if password.is_empty() {
            anyhow::bail!("ADMIN_PASSWORD must not be empty");
        }

        Ok(Self {
            password,
            session_secret,
        })
    }

    #[cfg(test)]
    pub fn for_tests(password: &str, session_secret: &str) -> Self {
        Self {
            password: password.to_string(),
            session_secret: session_secret.to_string(),
        }
    }

    pub fn check_password(&self, candidate: &str) -> bool {
        candidate == self.password
    }

    pub fn session_service(&self) -> SessionService {
        SessionService::new(&self.session_secret)
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("password", &"[REDACTED]")
            .field("session_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub admin: bool,
    pub exp: i64, // expiration timestamp
    pub iat: i64, // issued at timestamp
}

impl SessionClaims {
    pub fn new() -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(24); // Session expires in 24 hours

        Self {
            admin: true,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

impl Default for SessionClaims {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    pub fn issue_session(&self) -> Result<String> {
        let claims = SessionClaims::new();
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to issue session token: {}", e))
    }

    pub fn verify_session(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| anyhow::anyhow!("Failed to verify session token: {}", e))
    }
}

/// Proof that the request carries a valid admin session cookie
#[derive(Debug)]
pub struct AdminSession;

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let cookie = jar.get(SESSION_COOKIE).ok_or(AuthError::MissingSession)?;

        let claims = state
            .admin
            .session_service()
            .verify_session(cookie.value())
            .map_err(|_| AuthError::InvalidSession)?;

        if !claims.admin {
            return Err(AuthError::InvalidSession);
        }

        Ok(AdminSession)
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingSession,
    InvalidSession,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingSession => "Authentification requise",
            AuthError::InvalidSession => "Session invalide ou expirée",
        };
        (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_roundtrip() {
        let service = SessionService::new("test-secret");
        let token = service.issue_session().unwrap();
        let claims = service.verify_session(&token).unwrap();

        assert!(claims.admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = SessionService::new("secret-a").issue_session().unwrap();
        assert!(SessionService::new("secret-b").verify_session(&token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let service = SessionService::new("test-secret");
        let mut token = service.issue_session().unwrap();
        token.push('x');
        assert!(service.verify_session(&token).is_err());
    }

    #[test]
    fn password_is_compared_directly() {
        let config = AdminConfig::for_tests("lune-2024", "secret");
        assert!(config.check_password("lune-2024"));
        assert!(!config.check_password("Lune-2024"));
        assert!(!config.check_password(""));
    }
}
