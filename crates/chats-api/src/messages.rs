use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use chats_db::Database;
use chats_db::models::{AttachmentRow, MessageCursor, MessageRow, NewAttachment};
use chats_types::ValidationError;
use chats_types::api::{
    AttachmentResponse, CreateMessageRequest, MessageResponse, UpdateMessageRequest, UserSummary,
};

use crate::convert::{non_blank, parse_timestamp, parse_uuid, stored_timestamp};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Only the conversation with this user.
    pub user: Option<Uuid>,
    /// Cursor: the `created_at` of the oldest message on the previous page.
    pub before: Option<String>,
    /// That message's `id`, so messages sharing its timestamp are not skipped.
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.min(200);
    let before = match (query.before.as_deref(), query.before_id) {
        (Some(raw), before_id) => {
            let created_at = stored_timestamp(raw, "before")?;
            Some((created_at, before_id.map(|id| id.to_string())))
        }
        (None, Some(_)) => {
            return Err(ValidationError::new("before", "Required when before_id is given.").into());
        }
        (None, None) => None,
    };

    let messages = blocking(&state, move |state| {
        let peer = query.user.map(|u| u.to_string());
        let cursor = before.as_ref().map(|(created_at, id)| MessageCursor {
            created_at: created_at.as_str(),
            id: id.as_deref(),
        });
        let rows = state.db.list_messages_for_user(
            &user.id.to_string(),
            peer.as_deref(),
            limit,
            cursor,
        )?;
        with_attachments(&state.db, rows)
    })
    .await?;

    Ok(Json(messages))
}

/// Insert the message and its attachments atomically, then re-read it with
/// sender, receiver and attachments filled in.
pub async fn create_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let message = blocking(&state, move |state| {
        let receiver_id = req.receiver_id.to_string();
        if state.db.get_user_by_id(&receiver_id)?.is_none() {
            return Err(ValidationError::new("receiver_id", "Invalid pk - object does not exist.").into());
        }

        let attachments: Vec<NewAttachment> = req
            .attachments
            .into_iter()
            .map(|a| NewAttachment {
                caption: non_blank(a.caption.as_deref()).map(str::to_string),
                attachment: a.attachment,
            })
            .collect();

        let message_id = Uuid::new_v4().to_string();
        state.db.create_message(
            &message_id,
            &user.id.to_string(),
            &receiver_id,
            &req.message,
            &attachments,
        )?;

        info!(
            "Message {} from '{}' with {} attachment(s)",
            message_id,
            user.username,
            attachments.len()
        );

        let row = state.db.get_message(&message_id)?.ok_or(ApiError::NotFound)?;
        single_with_attachments(&state.db, row)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |state| {
        let row = visible_message(&state.db, &id.to_string(), &user)?;
        single_with_attachments(&state.db, row)
    })
    .await?;

    Ok(Json(message))
}

/// Serves both PUT and PATCH. Only the body text is editable, and only by the
/// sender.
pub async fn update_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let message = blocking(&state, move |state| {
        let id = id.to_string();
        let row = visible_message(&state.db, &id, &user)?;
        if row.sender_id != user.id.to_string() {
            return Err(ApiError::PermissionDenied);
        }

        if !state.db.update_message_body(&id, &req.message)? {
            return Err(ApiError::NotFound);
        }
        let row = state.db.get_message(&id)?.ok_or(ApiError::NotFound)?;
        single_with_attachments(&state.db, row)
    })
    .await?;

    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |state| {
        let id = id.to_string();
        let row = visible_message(&state.db, &id, &user)?;
        if row.sender_id != user.id.to_string() {
            return Err(ApiError::PermissionDenied);
        }
        state.db.delete_message(&id)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// The message, if it exists and `user` took part in it. Outsiders get the
/// same answer as for a missing message.
fn visible_message(db: &Database, id: &str, user: &AuthUser) -> Result<MessageRow, ApiError> {
    let uid = user.id.to_string();
    db.get_message(id)?
        .filter(|m| m.sender_id == uid || m.receiver_id == uid)
        .ok_or(ApiError::NotFound)
}

fn single_with_attachments(db: &Database, row: MessageRow) -> Result<MessageResponse, ApiError> {
    with_attachments(db, vec![row])?
        .pop()
        .ok_or(ApiError::NotFound)
}

fn with_attachments(db: &Database, rows: Vec<MessageRow>) -> Result<Vec<MessageResponse>, ApiError> {
    let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let attachment_rows = db.get_attachments_for_messages(&message_ids)?;

    let mut by_message: HashMap<String, Vec<AttachmentResponse>> = HashMap::new();
    for a in attachment_rows {
        by_message
            .entry(a.message_id.clone())
            .or_default()
            .push(attachment_response(a));
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let attachments = by_message.remove(&row.id).unwrap_or_default();
            message_response(row, attachments)
        })
        .collect())
}

fn message_response(row: MessageRow, attachments: Vec<AttachmentResponse>) -> MessageResponse {
    MessageResponse {
        id: parse_uuid(&row.id, "message id"),
        sender: UserSummary {
            id: parse_uuid(&row.sender_id, "message sender_id"),
            username: row.sender_username,
        },
        receiver: UserSummary {
            id: parse_uuid(&row.receiver_id, "message receiver_id"),
            username: row.receiver_username,
        },
        created_at: parse_timestamp(&row.created_at, "message created_at"),
        updated_at: parse_timestamp(&row.updated_at, "message updated_at"),
        message: row.message,
        attachments,
    }
}

fn attachment_response(row: AttachmentRow) -> AttachmentResponse {
    AttachmentResponse {
        id: parse_uuid(&row.id, "attachment id"),
        message_id: parse_uuid(&row.message_id, "attachment message_id"),
        created_at: parse_timestamp(&row.created_at, "attachment created_at"),
        attachment: row.attachment,
        caption: row.caption,
    }
}
