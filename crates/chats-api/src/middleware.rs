use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use uuid::Uuid;

use crate::error::ApiError;
use crate::{AppState, blocking};

/// The caller behind a verified access token, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

/// Extract and validate the bearer access token, and require its user to still
/// exist and be active.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthenticated)?;

    let user_id = state.tokens.verify_access(bearer.token())?;

    let user = blocking(&state, move |state| {
        Ok(state.db.get_user_by_id(&user_id.to_string())?)
    })
    .await?
    .filter(|u| u.is_active)
    .ok_or(ApiError::Unauthenticated)?;

    req.extensions_mut().insert(AuthUser {
        id: user_id,
        username: user.username,
    });
    Ok(next.run(req).await)
}
