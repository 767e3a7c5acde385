//! SQLite-based chat storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{ChatStore, CoverageRange};
use crate::models::{Message, MessageId, Thread, ThreadId};
use crate::remote::PROJECTION_VERSION;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Thread metadata, overwritten on every sync pass
            CREATE TABLE threads (
                uid TEXT PRIMARY KEY,
                name TEXT,
                last_message_timestamp INTEGER NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0
            );

            -- Messages, newest and oldest per thread define its coverage
            CREATE TABLE messages (
                uid TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                text TEXT,
                author TEXT NOT NULL
            );

            CREATE INDEX idx_messages_thread_timestamp
                ON messages(thread_id, timestamp);
            "#,
        ),
        // Migration 2: Record which projection wrote the rows
        M::up(
            r#"
            CREATE TABLE export_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// Upsert one message row. Shared by single writes and batched transactions.
fn write_message(conn: &Connection, thread_id: &ThreadId, message: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (uid, thread_id, timestamp, text, author)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(uid) DO UPDATE SET
            thread_id = excluded.thread_id,
            timestamp = excluded.timestamp,
            text = excluded.text,
            author = excluded.author",
        params![
            message.id.as_str(),
            thread_id.as_str(),
            message.timestamp,
            message.text,
            message.author,
        ],
    )
    .with_context(|| format!("Failed to write message {}", message.id))?;
    Ok(())
}

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<Thread> {
    let message_count: i64 = row.get(3)?;
    Ok(Thread {
        id: ThreadId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        last_message_timestamp: row.get(2)?,
        message_count: message_count.max(0) as usize,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId::new(row.get::<_, String>(0)?),
        thread_id: ThreadId::new(row.get::<_, String>(1)?),
        timestamp: row.get(2)?,
        text: row.get(3)?,
        author: row.get(4)?,
    })
}

/// SQLite-based chat storage
///
/// The `threads` and `messages` tables are the export format read by the
/// reporting layer; column names follow it.
pub struct SqliteChatStore {
    conn: Mutex<Connection>,
}

impl SqliteChatStore {
    /// Open (or create) the database at `db_path` and bring its schema up to date
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open an existing export for reading only.
    ///
    /// Never creates the file, runs migrations or writes metadata; a missing
    /// file or one that was never migrated is an error.
    pub fn open_read_only(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open database at {:?}", path))?;

        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .with_context(|| format!("Failed to read schema version of {:?}", path))?;
        anyhow::ensure!(version > 0, "{:?} is not a chat export database", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL lets the reporting layer read while an export is running;
        // NORMAL sync is durable enough with WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        conn.execute(
            "INSERT INTO export_meta (key, value) VALUES ('projection_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [PROJECTION_VERSION.to_string()],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Projection version recorded by the last writer
    pub fn projection_version(&self) -> Result<Option<u32>> {
        let conn = self.conn.lock().unwrap();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM export_meta WHERE key = 'projection_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|v| v.parse().context("Invalid projection_version"))
            .transpose()
    }
}

impl ChatStore for SqliteChatStore {
    fn upsert_thread(&self, thread: &Thread) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO threads (uid, name, last_message_timestamp, message_count)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(uid) DO UPDATE SET
                name = excluded.name,
                last_message_timestamp = excluded.last_message_timestamp,
                message_count = excluded.message_count",
            params![
                thread.id.as_str(),
                thread.name,
                thread.last_message_timestamp,
                thread.message_count as i64,
            ],
        )
        .with_context(|| format!("Failed to write thread {}", thread.id))?;

        Ok(())
    }

    fn upsert_message(&self, message: &Message) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        write_message(&conn, &message.thread_id, message)
    }

    fn upsert_messages_atomic(&self, thread_id: &ThreadId, messages: &[Message]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for message in messages {
            write_message(&tx, thread_id, message)?;
        }

        tx.commit()
            .with_context(|| format!("Failed to commit messages for thread {}", thread_id))?;
        Ok(())
    }

    fn coverage_range(&self, thread_id: &ThreadId) -> Result<Option<CoverageRange>> {
        let conn = self.conn.lock().unwrap();

        let (min, max): (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM messages WHERE thread_id = ?",
            [thread_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        CoverageRange::from_bounds(min, max)
    }

    fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>> {
        let conn = self.conn.lock().unwrap();

        let thread = conn
            .query_row(
                "SELECT uid, name, last_message_timestamp, message_count
                 FROM threads WHERE uid = ?",
                [id.as_str()],
                thread_from_row,
            )
            .optional()?;

        Ok(thread)
    }

    fn list_threads(&self) -> Result<Vec<Thread>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT uid, name, last_message_timestamp, message_count
             FROM threads ORDER BY last_message_timestamp DESC",
        )?;

        let threads = stmt
            .query_map([], thread_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(threads)
    }

    fn list_messages_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT uid, thread_id, timestamp, text, author
             FROM messages WHERE thread_id = ?
             ORDER BY timestamp ASC, uid ASC",
        )?;

        let messages = stmt
            .query_map([thread_id.as_str()], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    fn has_message(&self, id: &MessageId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE uid = ?",
            [id.as_str()],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn count_messages_in_thread(&self, thread_id: &ThreadId) -> Result<usize> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE thread_id = ?",
            [thread_id.as_str()],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ConsistencyError, PendingBatch};
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteChatStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("chat.test.sqlite");
        let store = SqliteChatStore::new(&db_path).unwrap();
        (store, dir)
    }

    fn make_test_thread(id: &str, message_count: usize) -> Thread {
        Thread::new(ThreadId::new(id), Some(format!("Thread {}", id)), 5000, message_count)
    }

    fn make_test_message(id: &str, thread_id: &str, timestamp: i64) -> Message {
        Message::new(
            MessageId::new(id),
            ThreadId::new(thread_id),
            timestamp,
            Some(format!("text of {}", id)),
            "author-1",
        )
    }

    #[test]
    fn test_thread_upsert_overwrites() {
        let (store, _dir) = create_test_store();

        store.upsert_thread(&make_test_thread("t1", 1)).unwrap();
        let mut updated = make_test_thread("t1", 7);
        updated.name = None;
        updated.last_message_timestamp = 9000;
        store.upsert_thread(&updated).unwrap();

        let retrieved = store.get_thread(&ThreadId::new("t1")).unwrap().unwrap();
        assert_eq!(retrieved, updated);
        assert_eq!(store.list_threads().unwrap().len(), 1);
        assert!(store.get_thread(&ThreadId::new("t2")).unwrap().is_none());
    }

    #[test]
    fn test_message_upsert_is_idempotent() {
        let (store, _dir) = create_test_store();

        let message = make_test_message("m1", "t1", 1000);
        store.upsert_message(&message).unwrap();
        store.upsert_message(&message).unwrap();

        let messages = store.list_messages_for_thread(&ThreadId::new("t1")).unwrap();
        assert_eq!(messages, vec![message]);
        assert!(store.has_message(&MessageId::new("m1")).unwrap());
        assert!(!store.has_message(&MessageId::new("m2")).unwrap());
    }

    #[test]
    fn test_message_without_text() {
        let (store, _dir) = create_test_store();

        let mut message = make_test_message("m1", "t1", 1000);
        message.text = None;
        store.upsert_message(&message).unwrap();

        let messages = store.list_messages_for_thread(&ThreadId::new("t1")).unwrap();
        assert_eq!(messages[0].text, None);
    }

    #[test]
    fn test_coverage_range() {
        let (store, _dir) = create_test_store();
        let t1 = ThreadId::new("t1");

        assert_eq!(store.coverage_range(&t1).unwrap(), None);

        for (id, ts) in [("m1", 3000), ("m2", 1000), ("m3", 5000)] {
            store.upsert_message(&make_test_message(id, "t1", ts)).unwrap();
        }
        store.upsert_message(&make_test_message("other", "t2", 9000)).unwrap();

        assert_eq!(
            store.coverage_range(&t1).unwrap(),
            Some(CoverageRange::new(1000, 5000))
        );
    }

    #[test]
    fn test_list_messages_ordered_by_timestamp() {
        let (store, _dir) = create_test_store();

        for (id, ts) in [("m3", 3000), ("m1", 1000), ("m2", 2000)] {
            store.upsert_message(&make_test_message(id, "t1", ts)).unwrap();
        }

        let ids: Vec<String> = store
            .list_messages_for_thread(&ThreadId::new("t1"))
            .unwrap()
            .into_iter()
            .map(|m| m.id.0)
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_atomic_upsert_stamps_thread_id() {
        let (store, _dir) = create_test_store();

        let messages = vec![
            make_test_message("m1", "wrong", 1000),
            make_test_message("m2", "wrong", 2000),
        ];
        store
            .upsert_messages_atomic(&ThreadId::new("t1"), &messages)
            .unwrap();

        assert_eq!(store.count_messages_in_thread(&ThreadId::new("t1")).unwrap(), 2);
        assert_eq!(store.count_messages_in_thread(&ThreadId::new("wrong")).unwrap(), 0);
    }

    #[test]
    fn test_dropped_batch_leaves_coverage_unchanged() {
        let (store, _dir) = create_test_store();
        let t1 = ThreadId::new("t1");
        store.upsert_message(&make_test_message("m1", "t1", 1000)).unwrap();
        store.upsert_message(&make_test_message("m2", "t1", 5000)).unwrap();
        let before = store.coverage_range(&t1).unwrap();

        let mut batch = PendingBatch::new(t1.clone());
        batch.push(make_test_message("m3", "t1", 6000));
        batch.push(make_test_message("m4", "t1", 7000));
        drop(batch);

        assert_eq!(store.coverage_range(&t1).unwrap(), before);

        let mut batch = PendingBatch::new(t1.clone());
        batch.push(make_test_message("m3", "t1", 6000));
        assert_eq!(batch.commit(&store).unwrap(), 1);
        assert_eq!(
            store.coverage_range(&t1).unwrap(),
            Some(CoverageRange::new(1000, 6000))
        );
    }

    #[test]
    fn test_verify_count_mismatch() {
        let (store, _dir) = create_test_store();
        let thread = make_test_thread("t1", 10);
        store.upsert_thread(&thread).unwrap();
        for i in 0..9 {
            store
                .upsert_message(&make_test_message(&format!("m{}", i), "t1", i * 100))
                .unwrap();
        }

        let err = store.verify_count(&thread).unwrap_err();
        let mismatch = err.downcast_ref::<ConsistencyError>().unwrap();
        assert_eq!(mismatch.expected, 10);
        assert_eq!(mismatch.actual, 9);
        assert_eq!(mismatch.thread_id, ThreadId::new("t1"));

        store.upsert_message(&make_test_message("m9", "t1", 900)).unwrap();
        assert!(store.verify_count(&thread).is_ok());
    }

    #[test]
    fn test_reopen_keeps_data_and_records_projection() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("chat.test.sqlite");

        {
            let store = SqliteChatStore::new(&db_path).unwrap();
            store.upsert_message(&make_test_message("m1", "t1", 1000)).unwrap();
        }

        let store = SqliteChatStore::new(&db_path).unwrap();
        assert!(store.has_message(&MessageId::new("m1")).unwrap());
        assert_eq!(store.projection_version().unwrap(), Some(PROJECTION_VERSION));
    }

    #[test]
    fn test_read_only_open_of_missing_file_fails_without_creating_it() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("missing.sqlite");

        assert!(SqliteChatStore::open_read_only(&db_path).is_err());
        assert!(!db_path.exists());
    }

    #[test]
    fn test_read_only_open_rejects_non_export_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("other.sqlite");
        Connection::open(&db_path)
            .unwrap()
            .execute_batch("CREATE TABLE unrelated (x INTEGER);")
            .unwrap();

        assert!(SqliteChatStore::open_read_only(&db_path).is_err());
    }

    #[test]
    fn test_read_only_store_reads_but_never_writes() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("chat.test.sqlite");
        {
            let store = SqliteChatStore::new(&db_path).unwrap();
            store.upsert_thread(&make_test_thread("t1", 1)).unwrap();
            store.upsert_message(&make_test_message("m1", "t1", 1000)).unwrap();
        }

        let store = SqliteChatStore::open_read_only(&db_path).unwrap();
        assert_eq!(store.list_threads().unwrap().len(), 1);
        assert_eq!(store.count_messages_in_thread(&ThreadId::new("t1")).unwrap(), 1);
        assert_eq!(store.projection_version().unwrap(), Some(PROJECTION_VERSION));

        assert!(store.upsert_message(&make_test_message("m2", "t1", 2000)).is_err());
        assert!(store.upsert_thread(&make_test_thread("t2", 0)).is_err());
        assert_eq!(store.count_messages_in_thread(&ThreadId::new("t1")).unwrap(), 1);
    }

    #[test]
    fn test_migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }
}
