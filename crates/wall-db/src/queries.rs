use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, ToSql};
use tracing::debug;

use wall_types::Partition;
use wall_types::models::pin_rank;

use crate::Database;
use crate::models::{EventRow, MessageRow, NewMessage, format_timestamp};

/// Derived pin rank. Computed on every query so it can never drift from `pinned`.
const PIN_RANK: &str = "(CASE WHEN pinned THEN 1 ELSE 0 END)";

const MESSAGE_COLUMNS: &str = "id, channel_id, text, sender_name, created_at, pinned";

/// A cursor message resolved to its position in the composite
/// `(pin_rank DESC, created_at DESC, id DESC)` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorKey {
    pub pin_rank: u8,
    pub created_at: String,
    pub id: String,
}

impl CursorKey {
    pub fn partition(&self) -> Partition {
        Partition::of(self.pin_rank == 1)
    }
}

impl Database {
    // -- Events --

    /// Returns false if an event with this code already exists.
    pub fn create_event(&self, code: &str, title: &str, description: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO events (code, title, description, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![code, title, description, format_timestamp(Utc::now())],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_event(&self, code: &str) -> Result<Option<EventRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT code, title, description, created_at FROM events WHERE code = ?1",
                    [code],
                    map_event_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_events(&self) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT code, title, description, created_at FROM events ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], map_event_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Update title and/or description. `description: Some(None)` clears it.
    /// Returns the updated row, or None if no event has this code.
    pub fn update_event(
        &self,
        code: &str,
        title: Option<&str>,
        description: Option<Option<&str>>,
    ) -> Result<Option<EventRow>> {
        self.with_conn_mut(|conn| {
            let row = conn
                .query_row(
                    "UPDATE events SET
                        title = COALESCE(?2, title),
                        description = CASE WHEN ?3 THEN ?4 ELSE description END
                     WHERE code = ?1
                     RETURNING code, title, description, created_at",
                    rusqlite::params![code, title, description.is_some(), description.flatten()],
                    map_event_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Messages --

    /// Persist a message and its image references atomically.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<MessageRow> {
        let created_at = format_timestamp(msg.created_at);

        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO messages (id, channel_id, text, sender_name, created_at, pinned)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                rusqlite::params![msg.id, msg.channel_id, msg.text, msg.sender_name, created_at],
            )
            .with_context(|| format!("inserting message {}", msg.id))?;

            for (position, key) in msg.image_keys.iter().enumerate() {
                tx.execute(
                    "INSERT INTO message_images (message_id, position, image_key) VALUES (?1, ?2, ?3)",
                    rusqlite::params![msg.id, position as i64, key],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;

        Ok(MessageRow {
            id: msg.id.to_string(),
            channel_id: msg.channel_id.to_string(),
            text: msg.text.to_string(),
            sender_name: msg.sender_name.map(str::to_string),
            created_at,
            pinned: false,
            images: msg.image_keys.to_vec(),
        })
    }

    /// Flip `pinned`. Returns the new state, or None if the message does not exist.
    pub fn toggle_pin(&self, id: &str) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            let pinned = conn
                .query_row(
                    "UPDATE messages SET pinned = NOT pinned WHERE id = ?1 RETURNING pinned",
                    [id],
                    |row| row.get::<_, bool>(0),
                )
                .optional()?;
            Ok(pinned)
        })
    }

    // -- Pagination --

    /// Up to `limit` messages of `partition`, most important and most recent
    /// first. With a cursor, only messages strictly older (in composite order)
    /// than the cursor are returned. A cursor that does not resolve within the
    /// channel is ignored and the most recent page is returned.
    pub fn page(
        &self,
        channel_id: &str,
        partition: Partition,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let cursor = resolve_optional_cursor(&tx, channel_id, before)?;
            let rows = query_page(&tx, channel_id, partition, cursor.as_ref(), limit)?;
            tx.commit()?;
            Ok(rows)
        })
    }

    /// Like [`Database::page`], but also reports whether anything older than
    /// the last returned message exists in the same partition. Both reads run
    /// in one snapshot so the answer is consistent with the page.
    pub fn page_with_probe(
        &self,
        channel_id: &str,
        partition: Partition,
        before: Option<&str>,
        limit: u32,
    ) -> Result<(Vec<MessageRow>, bool)> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let cursor = resolve_optional_cursor(&tx, channel_id, before)?;
            let rows = query_page(&tx, channel_id, partition, cursor.as_ref(), limit)?;

            let has_older = match rows.last() {
                Some(last) => {
                    let last_key = CursorKey {
                        pin_rank: pin_rank(last.pinned),
                        created_at: last.created_at.clone(),
                        id: last.id.clone(),
                    };
                    exists_older(&tx, channel_id, partition, &last_key)?
                }
                None => false,
            };
            tx.commit()?;
            Ok((rows, has_older))
        })
    }

    /// Whether at least one message strictly older than `before` exists in the
    /// same channel and the same partition as the cursor message. An
    /// unresolvable cursor yields false.
    pub fn has_older(&self, channel_id: &str, before: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let found = match resolve_cursor(&tx, channel_id, before)? {
                Some(cursor) => exists_older(&tx, channel_id, cursor.partition(), &cursor)?,
                None => false,
            };
            tx.commit()?;
            Ok(found)
        })
    }

    /// [`Database::has_older`] with an explicit partition instead of the cursor's own.
    pub fn has_older_in(&self, channel_id: &str, partition: Partition, before: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let found = match resolve_cursor(&tx, channel_id, before)? {
                Some(cursor) => exists_older(&tx, channel_id, partition, &cursor)?,
                None => false,
            };
            tx.commit()?;
            Ok(found)
        })
    }
}

fn map_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        code: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        text: row.get(2)?,
        sender_name: row.get(3)?,
        created_at: row.get(4)?,
        pinned: row.get(5)?,
        images: Vec::new(),
    })
}

fn resolve_cursor(conn: &Connection, channel_id: &str, id: &str) -> Result<Option<CursorKey>> {
    let key = conn
        .query_row(
            "SELECT pinned, created_at, id FROM messages WHERE id = ?1 AND channel_id = ?2",
            [id, channel_id],
            |row| {
                Ok(CursorKey {
                    pin_rank: pin_rank(row.get(0)?),
                    created_at: row.get(1)?,
                    id: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(key)
}

fn resolve_optional_cursor(
    conn: &Connection,
    channel_id: &str,
    before: Option<&str>,
) -> Result<Option<CursorKey>> {
    let Some(id) = before else {
        return Ok(None);
    };

    let cursor = resolve_cursor(conn, channel_id, id)?;
    if cursor.is_none() {
        debug!("Cursor {} not found in channel {}, serving latest page", id, channel_id);
    }
    Ok(cursor)
}

/// Incrementally built WHERE clause with positional parameters.
struct Filter {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

impl Filter {
    fn channel(channel_id: &str) -> Self {
        Self {
            sql: "channel_id = ?1".to_string(),
            params: vec![Box::new(channel_id.to_string())],
        }
    }

    fn bind<T: ToSql + 'static>(&mut self, value: T) -> String {
        self.params.push(Box::new(value));
        format!("?{}", self.params.len())
    }

    fn partition(&mut self, partition: Partition) {
        match partition {
            Partition::Pinned => self.sql.push_str(" AND pinned = 1"),
            Partition::Unpinned => self.sql.push_str(" AND pinned = 0"),
            Partition::All => {}
        }
    }

    /// Strictly less than `cursor` in composite order.
    fn older_than(&mut self, cursor: &CursorKey) {
        let rank = self.bind(cursor.pin_rank as i64);
        let ts = self.bind(cursor.created_at.clone());
        let id = self.bind(cursor.id.clone());
        self.sql.push_str(&format!(
            " AND ({PIN_RANK} < {rank} OR ({PIN_RANK} = {rank} AND \
             (created_at < {ts} OR (created_at = {ts} AND id < {id}))))"
        ));
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

fn query_page(
    conn: &Connection,
    channel_id: &str,
    partition: Partition,
    cursor: Option<&CursorKey>,
    limit: u32,
) -> Result<Vec<MessageRow>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut filter = Filter::channel(channel_id);
    filter.partition(partition);
    if let Some(cursor) = cursor {
        filter.older_than(cursor);
    }
    let limit_param = filter.bind(limit as i64);

    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE {}
         ORDER BY {PIN_RANK} DESC, created_at DESC, id DESC
         LIMIT {limit_param}",
        filter.sql
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map(filter.params().as_slice(), map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    attach_images(conn, &mut rows)?;
    Ok(rows)
}

fn exists_older(
    conn: &Connection,
    channel_id: &str,
    partition: Partition,
    cursor: &CursorKey,
) -> Result<bool> {
    let mut filter = Filter::channel(channel_id);
    filter.partition(partition);
    filter.older_than(cursor);

    let sql = format!("SELECT EXISTS(SELECT 1 FROM messages WHERE {})", filter.sql);
    let found: bool = conn.query_row(&sql, filter.params().as_slice(), |row| row.get(0))?;
    Ok(found)
}

/// Batch-fetch image keys for a set of messages.
fn attach_images(conn: &Connection, rows: &mut [MessageRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<String> = (1..=rows.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT message_id, image_key FROM message_images WHERE message_id IN ({})
         ORDER BY message_id, position",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn ToSql> = rows.iter().map(|r| &r.id as &dyn ToSql).collect();

    let mut by_message: HashMap<String, Vec<String>> = HashMap::new();
    let pairs = stmt.query_map(params.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for pair in pairs {
        let (message_id, key) = pair?;
        by_message.entry(message_id).or_default().push(key);
    }

    for row in rows.iter_mut() {
        if let Some(keys) = by_message.remove(&row.id) {
            row.images = keys;
        }
    }
    Ok(())
}
