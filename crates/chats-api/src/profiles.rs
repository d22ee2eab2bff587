use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use chats_db::models::{NewProfile, ProfileChanges, ProfileRow};
use chats_db::{SearchField, build_filter};
use chats_types::ValidationError;
use chats_types::api::{CreateProfileRequest, ProfileResponse, UpdateProfileRequest};

use crate::convert::{non_blank, parse_timestamp, parse_uuid};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::{AppState, blocking};

const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    /// Free-text search over username, first name and last name.
    pub keyword: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_profiles(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
    Extension(_user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = match query.keyword.as_deref() {
        Some(keyword) => build_filter(keyword, &SearchField::PROFILE)
            .map_err(|e| ValidationError::new("keyword", e.to_string()))?,
        None => None,
    };
    let limit = query.limit.min(MAX_PAGE);
    let offset = query.offset;

    let rows = blocking(&state, move |state| {
        Ok(state.db.search_profiles(filter.as_ref(), limit, offset)?)
    })
    .await?;

    let profiles: Vec<ProfileResponse> = rows.into_iter().map(profile_response).collect();
    Ok(Json(profiles))
}

pub async fn create_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let row = blocking(&state, move |state| {
        let user_id = user.id.to_string();
        if state.db.get_profile_by_user(&user_id)?.is_some() {
            return Err(ValidationError::new("user", "This user already has a profile.").into());
        }

        let profile_id = Uuid::new_v4().to_string();
        state.db.create_profile(
            &profile_id,
            &NewProfile {
                user_id: &user_id,
                first_name: req.first_name.trim(),
                last_name: req.last_name.trim(),
                caption: non_blank(req.caption.as_deref()),
                about: non_blank(req.about.as_deref()),
                profile_picture: non_blank(req.profile_picture.as_deref()),
            },
        )?;

        state.db.get_profile(&profile_id)?.ok_or(ApiError::NotFound)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(profile_response(row))))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(&state, move |state| {
        state.db.get_profile(&id.to_string())?.ok_or(ApiError::NotFound)
    })
    .await?;

    Ok(Json(profile_response(row)))
}

/// Serves both PUT and PATCH; absent fields are left untouched.
pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let row = blocking(&state, move |state| {
        let id = id.to_string();
        let existing = state.db.get_profile(&id)?.ok_or(ApiError::NotFound)?;
        if existing.user_id != user.id.to_string() {
            return Err(ApiError::PermissionDenied);
        }

        let changes = ProfileChanges {
            first_name: req.first_name.as_deref().map(str::trim),
            last_name: req.last_name.as_deref().map(str::trim),
            caption: clearable(&req.caption),
            about: clearable(&req.about),
            profile_picture: clearable(&req.profile_picture),
        };

        if !state.db.update_profile(&id, &changes)? {
            return Err(ApiError::NotFound);
        }
        state.db.get_profile(&id)?.ok_or(ApiError::NotFound)
    })
    .await?;

    Ok(Json(profile_response(row)))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |state| {
        let id = id.to_string();
        let existing = state.db.get_profile(&id)?.ok_or(ApiError::NotFound)?;
        if existing.user_id != user.id.to_string() {
            return Err(ApiError::PermissionDenied);
        }
        state.db.delete_profile(&id)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// `Some(None)` for a blank value, which clears the column.
fn clearable(value: &Option<String>) -> Option<Option<&str>> {
    value.as_deref().map(|s| non_blank(Some(s)))
}

fn profile_response(row: ProfileRow) -> ProfileResponse {
    ProfileResponse {
        id: parse_uuid(&row.id, "profile id"),
        user_id: parse_uuid(&row.user_id, "profile user_id"),
        created_at: parse_timestamp(&row.created_at, "profile created_at"),
        updated_at: parse_timestamp(&row.updated_at, "profile updated_at"),
        username: row.username,
        first_name: row.first_name,
        last_name: row.last_name,
        caption: row.caption,
        about: row.about,
        profile_picture: row.profile_picture,
    }
}
