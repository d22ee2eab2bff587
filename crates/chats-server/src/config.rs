use std::path::PathBuf;

use anyhow::{Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Superuser to create at startup, if both parts are set.
    pub admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("CHATS_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CHATS_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let db_path = get("CHATS_DB_PATH").unwrap_or_else(|| "chats.db".into()).into();
        let host = get("CHATS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("CHATS_PORT").unwrap_or_else(|| "8000".into()).parse()?;

        let admin = match (get("CHATS_ADMIN_USERNAME"), get("CHATS_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some((username, password))
            }
            _ => None,
        };

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            admin,
        })
    }
}
