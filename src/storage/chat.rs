use anyhow::Result;
use rusqlite::{params, Connection};

use super::types::ChatMessage;

/// Persist a chat message stamped with `created_at_ms`. Returns the row id.
pub fn insert_chat_message(
    conn: &Connection,
    role: &str,
    content: &str,
    created_at_ms: i64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO chat_messages (role, content, created_at_ms) VALUES (?1, ?2, ?3)",
        params![role, content, created_at_ms],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent chat messages, newest first.
pub fn fetch_chat_messages(conn: &Connection, limit: i64) -> Result<Vec<ChatMessage>> {
    let limit = limit.max(0);
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT id, role, content, created_at_ms FROM chat_messages \
         ORDER BY created_at_ms DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok(ChatMessage {
                id: row.get(0)?,
                role: row.get(1)?,
                content: row.get(2)?,
                created_at_ms: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    #[test]
    fn newest_first_with_stable_ties() {
        let conn = open_memory_database().unwrap();
        let a = insert_chat_message(&conn, "user", "hi", 100).unwrap();
        let b = insert_chat_message(&conn, "assistant", "hello", 100).unwrap();
        let c = insert_chat_message(&conn, "user", "later", 200).unwrap();

        let ids: Vec<i64> = fetch_chat_messages(&conn, 10).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![c, b, a]);
        assert_eq!(fetch_chat_messages(&conn, 1).unwrap().len(), 1);
        assert!(fetch_chat_messages(&conn, 0).unwrap().is_empty());
    }
}
