//! Token lifecycle: issue on login, rotate on refresh, verify on every
//! protected request.
//!
//! Both tokens are HS256 JWTs. An access token names its user and lives five
//! minutes. A refresh token carries only a random nonce and lives a year; it
//! is honoured only while it is the exact value stored in the user's token
//! pair, so each user has at most one live session and a refresh token is
//! dead the moment it is rotated or the user logs in again.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chats_db::Database;
use chats_types::api::{AccessClaims, RefreshClaims};

use crate::error::ApiError;
use crate::password::{hash_password, verify_password};

pub const ACCESS_TOKEN_TTL_SECS: i64 = 5 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 365 * 24 * 60 * 60;
pub const REFRESH_NONCE_LEN: usize = 10;

const NONCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Checked against when the username is unknown, so that path costs the same
/// Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("no user has this password").ok());

/// A freshly minted (access, refresh) pair, as encoded strings.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access: String,
    pub refresh: String,
}

#[derive(Clone)]
pub struct TokenService {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<String>) -> Self {
        LazyLock::force(&DUMMY_HASH);
        Self {
            secret: secret.into(),
            access_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_TTL_SECS),
        }
    }

    pub fn with_lifetimes(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    /// Check credentials, then replace any pair the user holds with a new one.
    pub fn login(
        &self,
        db: &Database,
        username: &str,
        password: &str,
    ) -> Result<IssuedTokens, ApiError> {
        let Some(user) = db.get_user_by_username(username)?.filter(|u| u.is_active) else {
            if let Some(hash) = DUMMY_HASH.as_deref() {
                verify_password(password, hash)?;
            }
            warn!("Login failed for '{}': no such active user", username);
            return Err(ApiError::InvalidCredentials);
        };

        if !verify_password(password, &user.password)? {
            warn!("Login failed for '{}': wrong password", username);
            return Err(ApiError::InvalidCredentials);
        }

        let user_id: Uuid = user
            .id
            .parse()
            .with_context(|| format!("Corrupt user id '{}'", user.id))?;

        let tokens = self.issue(user_id)?;
        db.replace_token_pair(&user.id, &tokens.access, &tokens.refresh)?;

        info!("User '{}' logged in", user.username);
        Ok(tokens)
    }

    /// Exchange the current refresh token for a new pair, overwriting the
    /// stored one in place.
    pub fn refresh(&self, db: &Database, refresh_token: &str) -> Result<IssuedTokens, ApiError> {
        self.verify_refresh(refresh_token)?;

        let pair = db
            .get_token_pair_by_refresh(refresh_token)?
            .ok_or(ApiError::TokenNotFound)?;

        let user_id: Uuid = pair
            .user_id
            .parse()
            .with_context(|| format!("Corrupt user id '{}' on token pair", pair.user_id))?;

        let tokens = self.issue(user_id)?;
        if !db.rotate_token_pair(&pair.user_id, refresh_token, &tokens.access, &tokens.refresh)? {
            // Rotated or replaced by a concurrent request since the lookup.
            return Err(ApiError::TokenNotFound);
        }

        debug!("Rotated token pair for user {}", user_id);
        Ok(tokens)
    }

    /// Signature and expiry check of an access token; yields its user id.
    pub fn verify_access(&self, token: &str) -> Result<Uuid, ApiError> {
        decode::<AccessClaims>(token, &self.decoding_key(), &validation())
            .map(|data| data.claims.user_id)
            .map_err(|_| ApiError::Unauthenticated)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, ApiError> {
        decode::<RefreshClaims>(token, &self.decoding_key(), &validation())
            .map(|data| data.claims)
            .map_err(|_| ApiError::TokenExpiredOrInvalid)
    }

    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<IssuedTokens> {
        let access = self.sign(&AccessClaims {
            user_id,
            exp: expiry(self.access_ttl),
        })?;
        let refresh = self.sign(&RefreshClaims {
            data: random_nonce(),
            exp: expiry(self.refresh_ttl),
        })?;
        Ok(IssuedTokens { access, refresh })
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> anyhow::Result<String> {
        let token = encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.secret.as_bytes())
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

fn expiry(ttl: Duration) -> usize {
    (Utc::now() + ttl).timestamp().max(0) as usize
}

fn random_nonce() -> String {
    let mut rng = rand::rng();
    (0..REFRESH_NONCE_LEN)
        .map(|_| NONCE_CHARSET[rng.random_range(0..NONCE_CHARSET.len())] as char)
        .collect()
}
