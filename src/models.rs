use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// An event as the platform reports it. Every field decodes leniently: a `null` or
/// wrongly-typed value inside an optional field is dropped instead of failing the event, so
/// only a missing `id` or `title` can keep an event out of the calendar.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UpstreamEvent {
    #[serde(default, deserialize_with = "scalar_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub venue: Option<UpstreamVenue>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub artists: Vec<Artist>,
    #[serde(default, deserialize_with = "string_map")]
    pub social_media: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub multimedia: Vec<MediaItem>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UpstreamVenue {
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Artist {
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub spotify_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct MediaItem {
    #[serde(rename = "type", default, deserialize_with = "string_or_empty")]
    pub kind: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub url: String,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaItem {
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self.kind.trim().to_ascii_lowercase().as_str() {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// One page of `/events`. Items stay as raw JSON until the sync engine decodes them one by
/// one, so a single malformed event only costs that event.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EventBatch {
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl UpstreamEvent {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LocalEventRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub status: String,
    pub platform_id: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub venue_id: i64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LocalVenueRecord {
    pub id: i64,
    pub title: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Completed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "completed" => Ok(SyncStatus::Completed),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Side-table row holding the JSON payloads the calendar itself has no place for.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EventMetaRow {
    pub id: i64,
    pub event_id: i64,
    pub platform_event_id: String,
    pub artist_data: String,
    pub venue_data: String,
    pub social_media_data: String,
    pub multimedia_data: String,
    pub sync_status: SyncStatus,
    pub last_sync: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced_count: usize,
    pub error_count: usize,
}

/// Strings as-is, numbers and booleans as their text; anything else is absent.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_string(deserializer)?.unwrap_or_default())
}

/// Keeps the items that decode and drops the rest.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(object @ Value::Object(_)) => serde_json::from_value(object).ok(),
        _ => None,
    })
}

/// Platform → URL pairs; entries whose value is not a string are dropped.
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Object(map)) = value else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(url) => Some((key, url)),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_full_event() {
        let event = UpstreamEvent::from_value(json!({
            "id": "ext-1",
            "title": "Show",
            "start_date": "2024-05-01T20:00:00Z",
            "venue": {"name": "The Hall", "city": "Boise", "capacity": 400},
            "artists": [{"name": "Band", "spotify_url": "https://open.spotify.com/artist/1"}],
            "social_media": {"instagram": "https://instagram.com/band"},
            "multimedia": [{"type": "image", "url": "https://cdn.example.com/a.jpg", "caption": "Live"}]
        }))
        .unwrap();

        assert_eq!(event.id.as_deref(), Some("ext-1"));
        let venue = event.venue.as_ref().unwrap();
        assert_eq!(venue.name.as_deref(), Some("The Hall"));
        assert_eq!(venue.extra.get("capacity"), Some(&json!(400)));
        assert_eq!(event.multimedia[0].media_kind(), Some(MediaKind::Image));
        assert_eq!(event.social_media.len(), 1);
    }

    #[test]
    fn numeric_ids_become_strings() {
        let event = UpstreamEvent::from_value(json!({"id": 42, "title": "Numbers"})).unwrap();
        assert_eq!(event.id.as_deref(), Some("42"));
    }

    #[test]
    fn missing_fields_decode_as_empty() {
        let event = UpstreamEvent::from_value(json!({"title": "No id", "venue": null})).unwrap();
        assert!(event.id.is_none());
        assert!(event.venue.is_none());
        assert!(event.artists.is_empty());
        assert!(event.multimedia.is_empty());
    }

    #[test]
    fn nulls_in_optional_fields_are_dropped() {
        let event = UpstreamEvent::from_value(json!({
            "id": "ext-2",
            "title": "Show",
            "description": null,
            "start_date": 1714593600,
            "venue": {"name": "The Hall", "zip": 83702, "city": null},
            "artists": [{"name": "Band", "bio": null}, "not an artist"],
            "social_media": {"twitter": null, "instagram": "https://instagram.com/band", "x": 5},
            "multimedia": [{"type": "image", "url": null}, {"type": null, "url": "https://x/a.jpg"}]
        }))
        .unwrap();

        assert_eq!(event.description, None);
        assert_eq!(event.start_date.as_deref(), Some("1714593600"));
        let venue = event.venue.as_ref().unwrap();
        assert_eq!(venue.zip.as_deref(), Some("83702"));
        assert_eq!(venue.city, None);
        assert_eq!(event.artists.len(), 1);
        assert_eq!(event.artists[0].bio, None);
        assert_eq!(
            event.social_media.keys().collect::<Vec<_>>(),
            vec!["instagram"]
        );
        assert_eq!(event.multimedia.len(), 2);
        assert_eq!(event.multimedia[0].url, "");
        assert_eq!(event.multimedia[1].media_kind(), None);
    }

    #[test]
    fn wrongly_shaped_containers_decode_as_empty() {
        let event = UpstreamEvent::from_value(json!({
            "id": "ext-3",
            "title": "Show",
            "venue": "The Hall",
            "artists": "Band",
            "social_media": ["https://instagram.com/band"],
            "multimedia": {"type": "image"}
        }))
        .unwrap();
        assert!(event.venue.is_none());
        assert!(event.artists.is_empty());
        assert!(event.social_media.is_empty());
        assert!(event.multimedia.is_empty());
    }

    #[test]
    fn unknown_media_types_are_kept_but_untyped() {
        let item: MediaItem =
            serde_json::from_value(json!({"type": " Video ", "url": "https://x/v.mp4"})).unwrap();
        assert_eq!(item.media_kind(), Some(MediaKind::Video));
        let item: MediaItem =
            serde_json::from_value(json!({"type": "audio", "url": "https://x/a.mp3"})).unwrap();
        assert_eq!(item.media_kind(), None);
    }

    #[test]
    fn artist_extra_fields_survive_reserialization() {
        let artist: Artist =
            serde_json::from_value(json!({"name": "A", "youtube_url": "https://youtu.be/x"}))
                .unwrap();
        let back = serde_json::to_value(&artist).unwrap();
        assert_eq!(back["youtube_url"], json!("https://youtu.be/x"));
    }

    #[test]
    fn sync_status_round_trips_through_text() {
        assert_eq!("completed".parse::<SyncStatus>(), Ok(SyncStatus::Completed));
        assert_eq!(SyncStatus::Pending.to_string(), "pending");
        assert!("done".parse::<SyncStatus>().is_err());
    }
}
