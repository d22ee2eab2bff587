//! Database row types. These map directly to SQLite rows.
//! Distinct from chats-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserFlags {
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Default for UserFlags {
    fn default() -> Self {
        Self {
            is_active: true,
            is_staff: false,
            is_superuser: false,
        }
    }
}

impl UserFlags {
    pub fn superuser() -> Self {
        Self {
            is_active: true,
            is_staff: true,
            is_superuser: true,
        }
    }
}

pub struct ProfileRow {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub caption: Option<String>,
    pub about: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewProfile<'a> {
    pub user_id: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub caption: Option<&'a str>,
    pub about: Option<&'a str>,
    pub profile_picture: Option<&'a str>,
}

/// Column updates for a profile. `None` leaves a column alone; for the
/// nullable columns `Some(None)` writes NULL.
#[derive(Default)]
pub struct ProfileChanges<'a> {
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub caption: Option<Option<&'a str>>,
    pub about: Option<Option<&'a str>>,
    pub profile_picture: Option<Option<&'a str>>,
}

pub struct TokenPairRow {
    pub user_id: String,
    pub access: String,
    pub refresh: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub receiver_id: String,
    pub receiver_username: String,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Position on the newest-first message list. Rows strictly older than
/// `created_at` come after it; so do rows with the same `created_at` that were
/// inserted before message `id`.
#[derive(Debug, Clone, Copy)]
pub struct MessageCursor<'a> {
    /// Stored timestamp form, `%Y-%m-%dT%H:%M:%S%.3fZ`.
    pub created_at: &'a str,
    pub id: Option<&'a str>,
}

pub struct NewAttachment {
    pub attachment: String,
    pub caption: Option<String>,
}

pub struct AttachmentRow {
    pub id: String,
    pub message_id: String,
    pub attachment: String,
    pub caption: Option<String>,
    pub created_at: String,
}
