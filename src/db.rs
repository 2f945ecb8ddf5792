use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::models::{EventMetaRow, LocalEventRecord, LocalVenueRecord, SyncStatus};
use crate::utils;

pub const EVENT_POST_TYPE: &str = "tribe_events";
pub const VENUE_POST_TYPE: &str = "tribe_venue";
pub const PLATFORM_ID_KEY: &str = "_live_connect_platform_id";

pub const START_DATE_KEY: &str = "_EventStartDate";
pub const END_DATE_KEY: &str = "_EventEndDate";
pub const START_DATE_UTC_KEY: &str = "_EventStartDateUTC";
pub const END_DATE_UTC_KEY: &str = "_EventEndDateUTC";
pub const TIMEZONE_KEY: &str = "_EventTimezone";
pub const VENUE_ID_KEY: &str = "_EventVenueID";

pub const VENUE_ADDRESS_KEY: &str = "_VenueAddress";
pub const VENUE_CITY_KEY: &str = "_VenueCity";
pub const VENUE_STATE_KEY: &str = "_VenueState";
pub const VENUE_ZIP_KEY: &str = "_VenueZip";
pub const VENUE_COUNTRY_KEY: &str = "_VenueCountry";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The calendar's content database plus the side table this crate owns.
pub struct Store {
    conn: Connection,
}

/// Side-table values for one upsert.
pub struct EventMetaWrite<'a> {
    pub event_id: i64,
    pub platform_event_id: &'a str,
    pub artist_data: &'a str,
    pub venue_data: &'a str,
    pub social_media_data: &'a str,
    pub multimedia_data: &'a str,
    pub sync_status: SyncStatus,
}

impl Store {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates the side table, and the external-id index once the calendar tables exist.
    pub fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS live_connect_event_meta(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL,
                platform_event_id TEXT NOT NULL,
                artist_data TEXT,
                venue_data TEXT,
                social_media_data TEXT,
                multimedia_data TEXT,
                sync_status TEXT NOT NULL DEFAULT 'pending',
                last_sync TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (platform_event_id)
            );
            CREATE INDEX IF NOT EXISTS live_connect_event_meta_event
                ON live_connect_event_meta(event_id);",
        )?;
        if self.calendar_installed()? {
            self.ensure_platform_index()?;
        }
        Ok(())
    }

    /// Creates the calendar's own `posts`/`postmeta` tables. A real deployment shares these
    /// with the calendar front-end; this exists for bootstrapping and tests.
    pub fn install_calendar_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS posts(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_type TEXT NOT NULL,
                post_title TEXT NOT NULL DEFAULT '',
                post_content TEXT NOT NULL DEFAULT '',
                post_status TEXT NOT NULL DEFAULT 'draft',
                post_date TEXT NOT NULL,
                post_modified TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS posts_type_title ON posts(post_type, post_title);
            CREATE TABLE IF NOT EXISTS postmeta(
                meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id),
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL DEFAULT '',
                UNIQUE (post_id, meta_key)
            );",
        )?;
        self.ensure_platform_index()
    }

    pub fn calendar_installed(&self) -> rusqlite::Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('posts', 'postmeta')",
            [],
            |row| row.get(0),
        )?;
        Ok(count == 2)
    }

    fn ensure_platform_index(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS live_connect_platform_id
                ON postmeta(meta_value) WHERE meta_key = '_live_connect_platform_id';",
        )
    }

    /// Runs `work` inside an IMMEDIATE transaction; the write lock is taken up front so
    /// lookup-then-insert cannot interleave with another writer.
    pub fn write<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = work(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn find_event_by_platform_id(&self, platform_id: &str) -> rusqlite::Result<Option<i64>> {
        find_event_by_platform_id(&self.conn, platform_id)
    }

    pub fn get_event(&self, id: i64) -> rusqlite::Result<Option<LocalEventRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, post_title, post_content, post_status FROM posts
                 WHERE id = ?1 AND post_type = ?2",
                params![id, EVENT_POST_TYPE],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, title, content, status)) = row else {
            return Ok(None);
        };

        let venue_id = get_post_meta(&self.conn, id, VENUE_ID_KEY)?
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0);
        Ok(Some(LocalEventRecord {
            id,
            title,
            content,
            status,
            platform_id: get_post_meta(&self.conn, id, PLATFORM_ID_KEY)?,
            start_date: get_post_meta(&self.conn, id, START_DATE_KEY)?.unwrap_or_default(),
            end_date: get_post_meta(&self.conn, id, END_DATE_KEY)?.unwrap_or_default(),
            venue_id,
        }))
    }

    pub fn get_venue(&self, id: i64) -> rusqlite::Result<Option<LocalVenueRecord>> {
        let title: Option<String> = self
            .conn
            .query_row(
                "SELECT post_title FROM posts WHERE id = ?1 AND post_type = ?2",
                params![id, VENUE_POST_TYPE],
                |row| row.get(0),
            )
            .optional()?;
        let Some(title) = title else {
            return Ok(None);
        };

        let field = |key: &str| -> rusqlite::Result<String> {
            Ok(get_post_meta(&self.conn, id, key)?.unwrap_or_default())
        };
        Ok(Some(LocalVenueRecord {
            id,
            title,
            address: field(VENUE_ADDRESS_KEY)?,
            city: field(VENUE_CITY_KEY)?,
            state: field(VENUE_STATE_KEY)?,
            zip: field(VENUE_ZIP_KEY)?,
            country: field(VENUE_COUNTRY_KEY)?,
        }))
    }

    pub fn get_post_meta(&self, post_id: i64, key: &str) -> rusqlite::Result<Option<String>> {
        get_post_meta(&self.conn, post_id, key)
    }

    pub fn count_posts(&self, post_type: &str) -> rusqlite::Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE post_type = ?1",
            params![post_type],
            |row| row.get(0),
        )
    }

    pub fn count_event_meta(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM live_connect_event_meta", [], |row| {
                row.get(0)
            })
    }

    pub fn get_event_meta(&self, event_id: i64) -> rusqlite::Result<Option<EventMetaRow>> {
        self.conn
            .query_row(
                "SELECT id, event_id, platform_event_id, artist_data, venue_data,
                        social_media_data, multimedia_data, sync_status, last_sync,
                        created_at, updated_at
                 FROM live_connect_event_meta WHERE event_id = ?1
                 ORDER BY id DESC LIMIT 1",
                params![event_id],
                meta_from_row,
            )
            .optional()
    }

    pub fn get_event_meta_by_platform_id(
        &self,
        platform_id: &str,
    ) -> rusqlite::Result<Option<EventMetaRow>> {
        self.conn
            .query_row(
                "SELECT id, event_id, platform_event_id, artist_data, venue_data,
                        social_media_data, multimedia_data, sync_status, last_sync,
                        created_at, updated_at
                 FROM live_connect_event_meta WHERE platform_event_id = ?1",
                params![platform_id],
                meta_from_row,
            )
            .optional()
    }

    pub fn meta_status_counts(&self) -> rusqlite::Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT sync_status, COUNT(*) FROM live_connect_event_meta
             GROUP BY sync_status ORDER BY sync_status",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn last_sync(&self) -> rusqlite::Result<Option<String>> {
        self.conn.query_row(
            "SELECT MAX(last_sync) FROM live_connect_event_meta",
            [],
            |row| row.get(0),
        )
    }
}

pub fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn find_event_by_platform_id(
    conn: &Connection,
    platform_id: &str,
) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT p.id FROM posts p
         JOIN postmeta m ON m.post_id = p.id
         WHERE p.post_type = ?1 AND m.meta_key = ?2 AND m.meta_value = ?3
         ORDER BY p.id LIMIT 1",
        params![EVENT_POST_TYPE, PLATFORM_ID_KEY, platform_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn find_post_by_title(
    conn: &Connection,
    post_type: &str,
    title: &str,
) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM posts WHERE post_type = ?1 AND post_title = ?2 ORDER BY id LIMIT 1",
        params![post_type, title],
        |row| row.get(0),
    )
    .optional()
}

pub fn insert_post(
    conn: &Connection,
    post_type: &str,
    title: &str,
    content: &str,
    status: &str,
) -> rusqlite::Result<i64> {
    let now = now_stamp();
    conn.execute(
        "INSERT INTO posts (post_type, post_title, post_content, post_status, post_date, post_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![post_type, title, content, status, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_post(conn: &Connection, id: i64, title: &str, content: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE posts SET post_title = ?2, post_content = ?3, post_modified = ?4 WHERE id = ?1",
        params![id, title, content, now_stamp()],
    )?;
    Ok(())
}

pub fn set_post_meta(conn: &Connection, post_id: i64, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO postmeta (post_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
         ON CONFLICT(post_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
        params![post_id, key, value],
    )?;
    Ok(())
}

pub fn get_post_meta(conn: &Connection, post_id: i64, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT meta_value FROM postmeta WHERE post_id = ?1 AND meta_key = ?2",
        params![post_id, key],
        |row| row.get(0),
    )
    .optional()
}

/// Insert or overwrite the side-table row for one external event. The row id and
/// `created_at` survive re-syncs.
pub fn upsert_event_meta(conn: &Connection, meta: &EventMetaWrite<'_>) -> rusqlite::Result<()> {
    let now = now_stamp();
    conn.execute(
        "INSERT INTO live_connect_event_meta (
            event_id, platform_event_id, artist_data, venue_data, social_media_data,
            multimedia_data, sync_status, last_sync, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8)
         ON CONFLICT(platform_event_id) DO UPDATE SET
           event_id = excluded.event_id,
           artist_data = excluded.artist_data,
           venue_data = excluded.venue_data,
           social_media_data = excluded.social_media_data,
           multimedia_data = excluded.multimedia_data,
           sync_status = excluded.sync_status,
           last_sync = excluded.last_sync,
           updated_at = excluded.updated_at",
        params![
            meta.event_id,
            meta.platform_event_id,
            meta.artist_data,
            meta.venue_data,
            meta.social_media_data,
            meta.multimedia_data,
            meta.sync_status.as_str(),
            now
        ],
    )?;
    Ok(())
}

fn meta_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventMetaRow> {
    let status: String = row.get(7)?;
    let sync_status = status.parse::<SyncStatus>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            status.len(),
            rusqlite::types::Type::Text,
            err.into(),
        )
    })?;
    Ok(EventMetaRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        platform_event_id: row.get(2)?,
        artist_data: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        venue_data: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        social_media_data: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        multimedia_data: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        sync_status,
        last_sync: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
