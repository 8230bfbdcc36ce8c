//! Token authentication, password hashing and login throttling.
//!
//! Tokens are opaque keys stored in `auth_tokens`, one per user, presented
//! as `Authorization: Token <key>` (`Bearer` is accepted too). Failed logins
//! are rate limited per username with an in-memory sliding window.

use crate::db::store::Store;
use crate::error::AppError;
use crate::models::User;
use crate::validation::Credentials;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const CREDENTIALS_NOT_PROVIDED: &str = "Authentication credentials were not provided.";
pub const INVALID_TOKEN: &str = "Invalid token.";

/// Maximum failed logins per username per window.
pub const MAX_ATTEMPTS: usize = 5;
/// Throttle window in seconds.
pub const RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// The caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Authenticated(User),
    Anonymous,
}

impl Actor {
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Anonymous => None,
        }
    }
}

/// Hash a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("[auth] Unreadable password hash: {}", e);
            false
        }
    }
}

/// Extract the token key from the `Authorization` header.
///
/// Returns `Ok(None)` when the header is absent or uses another scheme, and
/// an error when the scheme matches but the value is malformed.
pub fn token_from_headers(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AppError::unauthenticated(INVALID_TOKEN))?;

    let mut parts = value.split_whitespace();
    let scheme = parts.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
        return Ok(None);
    }

    match (parts.next(), parts.next()) {
        (Some(key), None) => Ok(Some(key.to_string())),
        (None, _) => Err(AppError::unauthenticated(
            "Invalid token header. No credentials provided.",
        )),
        (Some(_), Some(_)) => Err(AppError::unauthenticated(
            "Invalid token header. Token string should not contain spaces.",
        )),
    }
}

/// Resolve an optional token to an actor. Unknown tokens are anonymous.
pub async fn resolve_actor(store: &dyn Store, key: Option<&str>) -> Result<Actor, AppError> {
    let Some(key) = key.filter(|k| !k.is_empty()) else {
        return Ok(Actor::Anonymous);
    };

    Ok(match store.user_for_token(key).await? {
        Some(user) => Actor::Authenticated(user),
        None => Actor::Anonymous,
    })
}

/// Authenticate a request from its headers, rejecting anonymous callers.
pub async fn authenticate(store: &dyn Store, headers: &HeaderMap) -> Result<User, AppError> {
    let key = token_from_headers(headers)?
        .ok_or_else(|| AppError::unauthenticated(CREDENTIALS_NOT_PROVIDED))?;

    store
        .user_for_token(&key)
        .await?
        .ok_or_else(|| AppError::unauthenticated(INVALID_TOKEN))
}

/// Failed-login tracker keyed by username.
#[derive(Default)]
pub struct LoginThrottle {
    attempts: RwLock<HashMap<String, Vec<i64>>>,
}

impl LoginThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `username` has used up its attempts for the current window.
    pub async fn is_limited(&self, username: &str) -> bool {
        let attempts = self.attempts.read().await;
        let cutoff = Utc::now().timestamp() - RATE_LIMIT_WINDOW_SECS;
        attempts
            .get(username)
            .map(|times| times.iter().filter(|&&t| t > cutoff).count() >= MAX_ATTEMPTS)
            .unwrap_or(false)
    }

    /// Record a failed attempt and report whether the limit is now reached.
    ///
    /// Check and record happen under one write lock. A username already at
    /// the limit is not charged another attempt.
    pub async fn check_and_record_attempt(&self, username: &str) -> bool {
        let mut map = self.attempts.write().await;
        let now = Utc::now().timestamp();
        let cutoff = now - RATE_LIMIT_WINDOW_SECS;

        let attempts = map.entry(username.to_string()).or_default();
        attempts.retain(|&t| t > cutoff);

        if attempts.len() >= MAX_ATTEMPTS {
            return true;
        }

        attempts.push(now);
        attempts.len() >= MAX_ATTEMPTS
    }

    /// Forget failures after a successful login.
    pub async fn clear(&self, username: &str) {
        self.attempts.write().await.remove(username);
    }

    /// Drop usernames whose attempts have all expired.
    pub async fn prune(&self) {
        let cutoff = Utc::now().timestamp() - RATE_LIMIT_WINDOW_SECS;
        let mut map = self.attempts.write().await;
        map.retain(|_, times| {
            times.retain(|&t| t > cutoff);
            !times.is_empty()
        });
    }
}

/// Exchange credentials for the user's token.
pub async fn login(
    store: &dyn Store,
    throttle: &LoginThrottle,
    credentials: Credentials,
) -> Result<String, AppError> {
    let Credentials { username, password } = credentials;

    if throttle.is_limited(&username).await {
        log::warn!("[auth] Login throttled for {}", username);
        return Err(too_many_attempts());
    }

    let verified = match store.find_credentials(&username).await? {
        Some(stored) => {
            let hash = stored.password_hash.clone();
            let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
                .await
                .map_err(|e| AppError::internal(format!("Password check failed: {}", e)))?;
            ok.then_some(stored.user)
        }
        None => None,
    };

    let Some(user) = verified else {
        if throttle.check_and_record_attempt(&username).await {
            log::warn!("[auth] Too many failed logins for {}", username);
            return Err(too_many_attempts());
        }
        log::info!("[auth] Failed login for {}", username);
        return Err(AppError::InvalidCredentials);
    };

    throttle.clear(&username).await;
    let token = store.get_or_create_token(user.id).await?;
    log::info!("[auth] User {} logged in", user.username);
    Ok(token)
}

fn too_many_attempts() -> AppError {
    AppError::rate_limited(format!(
        "Too many failed login attempts. Try again in {} seconds.",
        RATE_LIMIT_WINDOW_SECS
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::tests::test_store;
    use crate::models::NewUser;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3creto").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3creto", &hash));
        assert!(!verify_password("otro", &hash));
        assert!(!verify_password("s3creto", "not-a-hash"));
    }

    #[test]
    fn token_header_schemes() {
        assert_eq!(token_from_headers(&HeaderMap::new()).unwrap(), None);
        assert_eq!(
            token_from_headers(&headers_with("Token abc")).unwrap(),
            Some("abc".to_string())
        );
        assert_eq!(
            token_from_headers(&headers_with("Bearer abc")).unwrap(),
            Some("abc".to_string())
        );
        assert_eq!(token_from_headers(&headers_with("Basic Zm9v")).unwrap(), None);
        assert!(token_from_headers(&headers_with("Token")).is_err());
        assert!(token_from_headers(&headers_with("Token a b")).is_err());
    }

    #[tokio::test]
    async fn throttle_limits_after_max_attempts() {
        let throttle = LoginThrottle::new();

        for i in 0..MAX_ATTEMPTS - 1 {
            assert!(
                !throttle.check_and_record_attempt("ana").await,
                "attempt {} should not be limited",
                i + 1
            );
        }
        assert!(throttle.check_and_record_attempt("ana").await);
        assert!(throttle.is_limited("ana").await);

        // Other usernames are unaffected.
        assert!(!throttle.is_limited("beto").await);

        throttle.clear("ana").await;
        assert!(!throttle.is_limited("ana").await);
    }

    #[tokio::test]
    async fn throttle_ignores_expired_attempts() {
        let throttle = LoginThrottle::new();
        {
            let expired = Utc::now().timestamp() - RATE_LIMIT_WINDOW_SECS - 10;
            let mut map = throttle.attempts.write().await;
            map.insert("ana".into(), vec![expired; MAX_ATTEMPTS]);
        }

        assert!(!throttle.is_limited("ana").await);
        assert!(!throttle.check_and_record_attempt("ana").await);
        assert_eq!(throttle.attempts.read().await["ana"].len(), 1);

        {
            let expired = Utc::now().timestamp() - RATE_LIMIT_WINDOW_SECS - 10;
            throttle.attempts.write().await.insert("beto".into(), vec![expired]);
        }
        throttle.prune().await;
        assert!(!throttle.attempts.read().await.contains_key("beto"));
    }

    #[tokio::test]
    async fn login_issues_stable_token() {
        let (store, _dir) = test_store().await;
        let user = store
            .create_user(NewUser {
                username: "ana".into(),
                email: "ana@example.com".into(),
                password_hash: hash_password("clave").unwrap(),
                is_staff: false,
                is_reviewer: false,
            })
            .await
            .unwrap();
        let throttle = LoginThrottle::new();
        let creds = || Credentials {
            username: "ana".into(),
            password: "clave".into(),
        };

        let first = login(&store, &throttle, creds()).await.unwrap();
        let second = login(&store, &throttle, creds()).await.unwrap();
        assert_eq!(first, second);

        let actor = resolve_actor(&store, Some(&first)).await.unwrap();
        assert_eq!(actor.user(), Some(&user));
        assert_eq!(
            resolve_actor(&store, Some("bogus")).await.unwrap(),
            Actor::Anonymous
        );

        let found = authenticate(&store, &headers_with(&format!("Token {}", first)))
            .await
            .unwrap();
        assert_eq!(found, user);
        let err = authenticate(&store, &headers_with("Token bogus")).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Authentication error: {}", INVALID_TOKEN));
    }

    #[tokio::test]
    async fn login_failures_are_throttled() {
        let (store, _dir) = test_store().await;
        store
            .create_user(NewUser {
                username: "ana".into(),
                email: String::new(),
                password_hash: hash_password("clave").unwrap(),
                is_staff: false,
                is_reviewer: false,
            })
            .await
            .unwrap();
        let throttle = LoginThrottle::new();
        let wrong = || Credentials {
            username: "ana".into(),
            password: "mal".into(),
        };

        for _ in 0..MAX_ATTEMPTS - 1 {
            let err = login(&store, &throttle, wrong()).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials));
        }
        let err = login(&store, &throttle, wrong()).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { .. }));

        // Even the right password is refused until the window passes.
        let err = login(
            &store,
            &throttle,
            Credentials {
                username: "ana".into(),
                password: "clave".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::RateLimited { .. }));
    }
}
