use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AttachmentRow, MessageCursor, MessageRow, NewAttachment};
use crate::{Database, NOW};

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, s.username, m.receiver_id, r.username, \
     m.message, m.created_at, m.updated_at \
     FROM messages m \
     JOIN users s ON s.id = m.sender_id \
     JOIN users r ON r.id = m.receiver_id";

/// Attachment rows could not be written; the message insert that preceded
/// them was rolled back.
#[derive(Debug, Error)]
#[error("failed to insert attachments for message {message_id}")]
pub struct AttachmentInsertError {
    pub message_id: String,
    #[source]
    pub source: rusqlite::Error,
}

impl Database {
    /// Insert a message and its attachments as one transaction. Either every
    /// row lands or none does.
    pub fn create_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        body: &str,
        attachments: &[NewAttachment],
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, message) VALUES (?1, ?2, ?3, ?4)",
                (id, sender_id, receiver_id, body),
            )?;

            if !attachments.is_empty() {
                let attach_err = |source| AttachmentInsertError {
                    message_id: id.to_string(),
                    source,
                };
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO message_attachments (id, message_id, attachment, caption)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(attach_err)?;
                for attachment in attachments {
                    stmt.execute(rusqlite::params![
                        Uuid::new_v4().to_string(),
                        id,
                        attachment.attachment,
                        attachment.caption,
                    ])
                    .map_err(attach_err)?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
            let row = conn.query_row(&sql, [id], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// Messages `user_id` sent or received, newest first. `peer` narrows to the
    /// conversation with one other user; `before` resumes after the last row of
    /// a previous page.
    pub fn list_messages_for_user(
        &self,
        user_id: &str,
        peer: Option<&str>,
        limit: u32,
        before: Option<MessageCursor<'_>>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages_for_user(conn, user_id, peer, limit, before))
    }

    /// Batch-fetch attachments for a set of message IDs, in insertion order.
    pub fn get_attachments_for_messages(&self, message_ids: &[String]) -> Result<Vec<AttachmentRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, attachment, caption, created_at
                 FROM message_attachments WHERE message_id IN ({})
                 ORDER BY rowid",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(message_ids.iter()), |row| {
                    Ok(AttachmentRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        attachment: row.get(2)?,
                        caption: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Replace the body text. Returns false if the message does not exist.
    pub fn update_message_body(&self, id: &str, body: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE messages SET message = ?1, updated_at = {} WHERE id = ?2",
                NOW
            );
            let changed = conn.execute(&sql, (body, id))?;
            Ok(changed == 1)
        })
    }

    /// Delete a message; its attachments go with it.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(changed == 1)
        })
    }
}

fn query_messages_for_user(
    conn: &Connection,
    user_id: &str,
    peer: Option<&str>,
    limit: u32,
    before: Option<MessageCursor<'_>>,
) -> Result<Vec<MessageRow>> {
    // Ties on created_at fall back to insertion order, matching ORDER BY.
    let sql = format!(
        "{}
         WHERE (m.sender_id = ?1 OR m.receiver_id = ?1)
           AND (?2 IS NULL
                OR (m.sender_id = ?1 AND m.receiver_id = ?2)
                OR (m.sender_id = ?2 AND m.receiver_id = ?1))
           AND (?3 IS NULL
                OR m.created_at < ?3
                OR (m.created_at = ?3
                    AND m.rowid < (SELECT rowid FROM messages WHERE id = ?5)))
         ORDER BY m.created_at DESC, m.rowid DESC
         LIMIT ?4",
        MESSAGE_SELECT
    );

    let before_at = before.map(|c| c.created_at);
    let before_id = before.and_then(|c| c.id);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params![user_id, peer, before_at, limit, before_id],
            message_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row.get(2)?,
        receiver_id: row.get(3)?,
        receiver_username: row.get(4)?,
        message: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
