//! Per-endpoint input validation.
//!
//! Each request type that needs more than structural checks gets a `validate`
//! method returning the first offending field. Uniqueness and existence checks
//! need the store and live in the handlers instead.

use thiserror::Error;

use crate::api::{
    CreateMessageRequest, CreateProfileRequest, LoginRequest, RefreshRequest, RegisterRequest,
    UpdateMessageRequest, UpdateProfileRequest,
};

pub const USERNAME_MAX_LEN: usize = 100;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const NAME_MAX_LEN: usize = 100;
pub const CAPTION_MAX_LEN: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "This field may not be blank."));
    }
    Ok(())
}

fn max_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("Ensure this field has no more than {} characters.", max),
        ));
    }
    Ok(())
}

fn validate_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    required(field, value)?;
    max_len(field, value, NAME_MAX_LEN)
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("username", &self.username)?;
        max_len("username", &self.username, USERNAME_MAX_LEN)?;
        if self.username.chars().any(char::is_whitespace) {
            return Err(ValidationError::new(
                "username",
                "Username may not contain whitespace.",
            ));
        }
        if self.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(ValidationError::new(
                "password",
                format!("Ensure this field has at least {} characters.", PASSWORD_MIN_LEN),
            ));
        }
        Ok(())
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("username", &self.username)?;
        required("password", &self.password)
    }
}

impl RefreshRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("refresh", &self.refresh)
    }
}

impl CreateProfileRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("first_name", &self.first_name)?;
        validate_name("last_name", &self.last_name)?;
        if let Some(caption) = &self.caption {
            max_len("caption", caption, CAPTION_MAX_LEN)?;
        }
        Ok(())
    }
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(first_name) = &self.first_name {
            validate_name("first_name", first_name)?;
        }
        if let Some(last_name) = &self.last_name {
            validate_name("last_name", last_name)?;
        }
        if let Some(caption) = &self.caption {
            max_len("caption", caption, CAPTION_MAX_LEN)?;
        }
        Ok(())
    }
}

impl CreateMessageRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.message.trim().is_empty() && self.attachments.is_empty() {
            return Err(ValidationError::new(
                "message",
                "A message needs a body or at least one attachment.",
            ));
        }
        for attachment in &self.attachments {
            required("attachments", &attachment.attachment)?;
        }
        Ok(())
    }
}

impl UpdateMessageRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("message", &self.message)
    }
}
