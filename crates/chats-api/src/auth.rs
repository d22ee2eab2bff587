use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use chats_db::models::UserFlags;
use chats_db::{Database, UsernameTaken};
use chats_types::ValidationError;
use chats_types::api::{
    LoginRequest, RefreshRequest, RegisterRequest, RegisterResponse, TokenPairResponse,
};

use crate::error::ApiError;
use crate::password::hash_password;
use crate::{AppState, blocking};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    blocking(&state, move |state| {
        // Skips the hashing work for the common case
        if state.db.get_user_by_username(&req.username)?.is_some() {
            return Err(username_taken());
        }
        create_account(&state.db, &req.username, &req.password)?;

        info!("Registered user '{}'", req.username);
        Ok(())
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: "User created.".to_string(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let tokens = blocking(&state, move |state| {
        state.tokens.login(&state.db, &req.username, &req.password)
    })
    .await?;

    Ok(Json(TokenPairResponse {
        access: tokens.access,
        refresh: tokens.refresh,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let tokens = blocking(&state, move |state| state.tokens.refresh(&state.db, &req.refresh)).await?;

    Ok(Json(TokenPairResponse {
        access: tokens.access,
        refresh: tokens.refresh,
    }))
}

/// Hash the password and insert an ordinary user. A username claimed between
/// the caller's existence check and this insert is still a validation error.
fn create_account(db: &Database, username: &str, password: &str) -> Result<(), ApiError> {
    // Hash password with Argon2id
    let password_hash = hash_password(password)?;
    let user_id = Uuid::new_v4();

    db.create_user(
        &user_id.to_string(),
        username,
        &password_hash,
        UserFlags::default(),
    )
    .map_err(|e| {
        if e.is::<UsernameTaken>() {
            username_taken()
        } else {
            e.into()
        }
    })
}

fn username_taken() -> ApiError {
    ValidationError::new("username", "A user with that username already exists.").into()
}

/// Make sure a superuser named `username` exists. Returns true if one was
/// created, false if the username was already taken.
pub fn ensure_superuser(db: &Database, username: &str, password: &str) -> anyhow::Result<bool> {
    if db.get_user_by_username(username)?.is_some() {
        return Ok(false);
    }

    let password_hash = hash_password(password)?;
    db.create_user(
        &Uuid::new_v4().to_string(),
        username,
        &password_hash,
        UserFlags::superuser(),
    )?;

    info!("Created superuser '{}'", username);
    Ok(true)
}
