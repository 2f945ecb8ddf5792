use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use rusqlite::Connection;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api_client::{ApiError, EventSource};
use crate::config::AppConfig;
use crate::dates::{self, NormalizedDate};
use crate::db::{self, EventMetaWrite, Store};
use crate::models::{SyncReport, SyncStatus, UpstreamEvent, UpstreamVenue};
use crate::text;

/// Upper bound on pages per run, for platforms that ignore `offset`.
const MAX_PAGES: u32 = 1_000;
const PUBLISH_STATUS: &str = "publish";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("the calendar content store is not installed")]
    DependencyMissing,
    #[error("event data is missing required fields: {0}")]
    InvalidEventData(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("content store lock poisoned")]
    StoreUnavailable,
    #[error("store worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: u32,
    pub debug: bool,
    pub timezone: Option<Tz>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: crate::config::DEFAULT_PAGE_SIZE,
            debug: false,
            timezone: None,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            debug: config.debug_mode,
            timezone: config.site_timezone(),
        }
    }
}

/// Pulls events from an [`EventSource`] and reconciles them into the calendar store.
pub struct EventSync<S> {
    source: S,
    writer: EventWriter,
}

impl<S: EventSource> EventSync<S> {
    pub fn new(source: S, options: SyncOptions) -> Self {
        Self {
            source,
            writer: EventWriter::new(options),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn writer(&self) -> &EventWriter {
        &self.writer
    }

    /// Fetches every upstream page, then writes each event in its own transaction.
    /// Fetch failures abort the run before any write; per-event failures are only counted.
    pub async fn sync_all(&self, store: &Arc<Mutex<Store>>) -> Result<SyncReport, SyncError> {
        self.on_store(store, |_, store| ensure_calendar(store)).await?;

        let events = self.fetch_all().await?;
        info!(count = events.len(), "fetched upstream events");

        let report = self
            .on_store(store, move |writer, store| Ok(writer.apply(store, events)))
            .await?;
        info!(
            synced = report.synced_count,
            errors = report.error_count,
            "event sync finished"
        );
        Ok(report)
    }

    /// Fetches and reconciles one event by its platform id.
    pub async fn sync_event(
        &self,
        store: &Arc<Mutex<Store>>,
        platform_id: &str,
    ) -> Result<i64, SyncError> {
        self.on_store(store, |_, store| ensure_calendar(store)).await?;

        let event = self.source.fetch_event(platform_id).await?;
        self.on_store(store, move |writer, store| {
            writer.sync_single_event(store, &event)
        })
        .await
    }

    /// Runs blocking store work on the blocking pool so the write loop never holds the
    /// store lock on an executor thread.
    async fn on_store<T, F>(&self, store: &Arc<Mutex<Store>>, work: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&EventWriter, &mut Store) -> Result<T, SyncError> + Send + 'static,
    {
        let writer = self.writer.clone();
        let store = Arc::clone(store);
        tokio::task::spawn_blocking(move || {
            let mut guard = store.lock().map_err(|_| SyncError::StoreUnavailable)?;
            work(&writer, &mut guard)
        })
        .await
        .map_err(|err| SyncError::Worker(err.to_string()))?
    }

    async fn fetch_all(&self) -> Result<Vec<Value>, ApiError> {
        let limit = self.writer.options.page_size.max(1);
        let mut offset: u32 = 0;
        let mut seen: HashSet<String> = HashSet::new();
        let mut events = Vec::new();

        for page in 0..MAX_PAGES {
            let batch = self.source.fetch_events(limit, offset).await?;
            let count = batch.events.len();
            debug!(page, offset, count, "fetched event page");
            if count == 0 {
                break;
            }

            let fresh = batch
                .events
                .iter()
                .filter_map(event_key)
                .filter(|key| !seen.contains(key))
                .count();
            if page > 0 && fresh == 0 {
                warn!(offset, "upstream repeated a page; stopping pagination");
                break;
            }
            for event in batch.events {
                if let Some(key) = event_key(&event) {
                    if !seen.insert(key) {
                        continue;
                    }
                }
                events.push(event);
            }

            let fetched = offset as u64 + count as u64;
            if count < limit as usize || batch.total.is_some_and(|total| fetched >= total) {
                break;
            }
            offset = offset.saturating_add(count as u32);
        }

        Ok(events)
    }

    pub fn sync_single_event(
        &self,
        store: &mut Store,
        event: &UpstreamEvent,
    ) -> Result<i64, SyncError> {
        self.writer.sync_single_event(store, event)
    }
}

/// The store-side half of a sync: decodes fetched events and writes them.
#[derive(Debug, Clone, Default)]
pub struct EventWriter {
    options: SyncOptions,
}

impl EventWriter {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    /// Reconciles already-fetched events. Never fails as a whole.
    pub fn apply(&self, store: &mut Store, events: Vec<Value>) -> SyncReport {
        let mut report = SyncReport::default();

        for raw in events {
            let result = UpstreamEvent::from_value(raw)
                .map_err(|err| SyncError::InvalidEventData(err.to_string()))
                .and_then(|event| self.sync_single_event(store, &event));

            match result {
                Ok(_) => report.synced_count += 1,
                Err(err) => {
                    report.error_count += 1;
                    if self.options.debug {
                        warn!("live connect sync error: {err}");
                    } else {
                        debug!("live connect sync error: {err}");
                    }
                }
            }
        }

        report
    }

    /// Creates or updates the local record for one event and returns its local id.
    pub fn sync_single_event(
        &self,
        store: &mut Store,
        event: &UpstreamEvent,
    ) -> Result<i64, SyncError> {
        let platform_id = event
            .id
            .as_deref()
            .map(text::sanitize_text_field)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::InvalidEventData("event has no id".to_string()))?;
        let title = event
            .title
            .as_deref()
            .map(text::sanitize_text_field)
            .filter(|title| !title.is_empty())
            .ok_or_else(|| {
                SyncError::InvalidEventData(format!("event {platform_id} has no title"))
            })?;

        let content = text::sanitize_html(event.description.as_deref().unwrap_or_default());
        let start = dates::normalize(event.start_date.as_deref().unwrap_or_default(), self.options.timezone);
        let end = dates::normalize(event.end_date.as_deref().unwrap_or_default(), self.options.timezone);
        let payload = MetaPayload::from_event(event)?;
        let timezone = self.options.timezone;

        store.write(|conn| -> Result<i64, SyncError> {
            let venue_id = get_or_create_venue(conn, event.venue.as_ref())?;

            let event_id = match db::find_event_by_platform_id(conn, &platform_id)? {
                Some(id) => {
                    db::update_post(conn, id, &title, &content)?;
                    debug!(id, %platform_id, "updated event");
                    id
                }
                None => {
                    let id = db::insert_post(
                        conn,
                        db::EVENT_POST_TYPE,
                        &title,
                        &content,
                        PUBLISH_STATUS,
                    )?;
                    db::set_post_meta(conn, id, db::PLATFORM_ID_KEY, &platform_id)?;
                    debug!(id, %platform_id, "created event");
                    id
                }
            };

            write_event_fields(conn, event_id, &start, &end, venue_id, timezone)?;
            db::upsert_event_meta(
                conn,
                &EventMetaWrite {
                    event_id,
                    platform_event_id: &platform_id,
                    artist_data: &payload.artists,
                    venue_data: &payload.venue,
                    social_media_data: &payload.social_media,
                    multimedia_data: &payload.multimedia,
                    sync_status: SyncStatus::Completed,
                },
            )?;
            Ok(event_id)
        })
    }
}

fn ensure_calendar(store: &Store) -> Result<(), SyncError> {
    if store.calendar_installed()? {
        Ok(())
    } else {
        Err(SyncError::DependencyMissing)
    }
}

fn event_key(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn write_event_fields(
    conn: &Connection,
    event_id: i64,
    start: &NormalizedDate,
    end: &NormalizedDate,
    venue_id: i64,
    timezone: Option<Tz>,
) -> rusqlite::Result<()> {
    db::set_post_meta(conn, event_id, db::START_DATE_KEY, &start.local)?;
    db::set_post_meta(conn, event_id, db::END_DATE_KEY, &end.local)?;
    db::set_post_meta(conn, event_id, db::START_DATE_UTC_KEY, &start.utc)?;
    db::set_post_meta(conn, event_id, db::END_DATE_UTC_KEY, &end.utc)?;
    db::set_post_meta(conn, event_id, db::VENUE_ID_KEY, &venue_id.to_string())?;
    if let Some(tz) = timezone {
        db::set_post_meta(conn, event_id, db::TIMEZONE_KEY, tz.name())?;
    }
    Ok(())
}

/// Returns the local venue id for `venue`, creating the venue on first reference.
/// `0` means the event has no venue.
pub fn get_or_create_venue(
    conn: &Connection,
    venue: Option<&UpstreamVenue>,
) -> Result<i64, SyncError> {
    let Some(venue) = venue else {
        return Ok(0);
    };
    let name = text::sanitize_text_field(venue.name.as_deref().unwrap_or_default());
    if name.is_empty() {
        return Ok(0);
    }

    if let Some(id) = db::find_post_by_title(conn, db::VENUE_POST_TYPE, &name)? {
        return Ok(id);
    }

    let description = venue.description.as_deref().unwrap_or_default().trim();
    let id = db::insert_post(conn, db::VENUE_POST_TYPE, &name, description, PUBLISH_STATUS)?;
    let fields = [
        (db::VENUE_ADDRESS_KEY, &venue.address),
        (db::VENUE_CITY_KEY, &venue.city),
        (db::VENUE_STATE_KEY, &venue.state),
        (db::VENUE_ZIP_KEY, &venue.zip),
        (db::VENUE_COUNTRY_KEY, &venue.country),
    ];
    for (key, value) in fields {
        let value = text::sanitize_text_field(value.as_deref().unwrap_or_default());
        db::set_post_meta(conn, id, key, &value)?;
    }
    debug!(id, venue = %name, "created venue");
    Ok(id)
}

/// JSON columns of the side-table row.
struct MetaPayload {
    artists: String,
    venue: String,
    social_media: String,
    multimedia: String,
}

impl MetaPayload {
    fn from_event(event: &UpstreamEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            artists: serde_json::to_string(&event.artists)?,
            venue: match &event.venue {
                Some(venue) => serde_json::to_string(venue)?,
                None => "{}".to_string(),
            },
            social_media: serde_json::to_string(&event.social_media)?,
            multimedia: serde_json::to_string(&event.multimedia)?,
        })
    }
}
