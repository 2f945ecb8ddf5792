use std::fmt::Write as _;

use serde_json::Value;

use crate::config::AppConfig;
use crate::db::Store;
use crate::models::{Artist, EventMetaRow, MediaItem, MediaKind, SyncStatus};
use crate::text::{capitalize_first, class_token, escape_html, safe_url};

/// Renders the side-table payloads of a synced event as an HTML fragment for the
/// calendar's event modal.
#[derive(Debug, Clone, Copy)]
pub struct ModalEnhancer {
    enabled: bool,
}

impl ModalEnhancer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.modal_enhancement)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn get_enhanced_content(
        &self,
        store: &Store,
        event_id: i64,
    ) -> rusqlite::Result<Option<String>> {
        if !self.enabled {
            return Ok(None);
        }
        let Some(row) = store.get_event_meta(event_id)? else {
            return Ok(None);
        };
        if row.sync_status != SyncStatus::Completed {
            return Ok(None);
        }
        Ok(Some(build_enhanced_content(&EnhancedData::from_row(&row))))
    }

    /// Appends the enhanced fragment to `content`, or returns it untouched when there is no
    /// completed row for the event.
    pub fn enhance_event_modal(
        &self,
        store: &Store,
        content: &str,
        event_id: i64,
    ) -> rusqlite::Result<String> {
        Ok(match self.get_enhanced_content(store, event_id)? {
            Some(fragment) => format!("{content}{fragment}"),
            None => content.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct ArtistView {
    name: String,
    bio: String,
    spotify_url: Option<String>,
}

#[derive(Debug)]
struct MediaView {
    kind: MediaKind,
    url: String,
    caption: String,
}

/// Decoded side-table payloads. Anything that does not have the expected shape is skipped
/// rather than failing the render.
#[derive(Debug, Default)]
struct EnhancedData {
    artists: Vec<ArtistView>,
    social: Vec<(String, String)>,
    media: Vec<MediaView>,
}

impl EnhancedData {
    fn from_row(row: &EventMetaRow) -> Self {
        Self {
            artists: decode_artists(&row.artist_data),
            social: decode_social(&row.social_media_data),
            media: decode_media(&row.multimedia_data),
        }
    }
}

fn parse_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

fn trimmed(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

fn decode_artists(raw: &str) -> Vec<ArtistView> {
    let Value::Array(items) = parse_json(raw) else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Artist>(item).ok())
        .map(|artist| ArtistView {
            name: trimmed(artist.name.as_deref()),
            bio: trimmed(artist.bio.as_deref()),
            spotify_url: artist.spotify_url.as_deref().and_then(safe_url),
        })
        .filter(|artist| {
            !artist.name.is_empty() || !artist.bio.is_empty() || artist.spotify_url.is_some()
        })
        .collect()
}

fn decode_social(raw: &str) -> Vec<(String, String)> {
    let Value::Object(map) = parse_json(raw) else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(platform, url)| {
            let url = safe_url(url.as_str()?)?;
            let platform = platform.trim();
            if platform.is_empty() {
                return None;
            }
            Some((platform.to_string(), url))
        })
        .collect()
}

fn decode_media(raw: &str) -> Vec<MediaView> {
    let Value::Array(items) = parse_json(raw) else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<MediaItem>(item).ok())
        .filter_map(|item| {
            Some(MediaView {
                kind: item.media_kind()?,
                url: safe_url(&item.url)?,
                caption: trimmed(item.caption.as_deref()),
            })
        })
        .collect()
}

/// Sections are omitted when empty; the wrapper is always present.
fn build_enhanced_content(data: &EnhancedData) -> String {
    let mut html = String::from("<div class=\"live-connect-enhanced-content\">");

    if !data.artists.is_empty() {
        html.push_str("<div class=\"live-connect-artists\"><h4>Artists</h4>");
        for artist in &data.artists {
            html.push_str("<div class=\"live-connect-artist\">");
            if !artist.name.is_empty() {
                let _ = write!(html, "<h5>{}</h5>", escape_html(&artist.name));
            }
            if !artist.bio.is_empty() {
                let _ = write!(html, "<p>{}</p>", escape_html(&artist.bio));
            }
            if let Some(url) = &artist.spotify_url {
                let _ = write!(
                    html,
                    "<a href=\"{url}\" target=\"_blank\" rel=\"noopener\" class=\"live-connect-spotify\">Listen on Spotify</a>"
                );
            }
            html.push_str("</div>");
        }
        html.push_str("</div>");
    }

    if !data.social.is_empty() {
        html.push_str(
            "<div class=\"live-connect-social\"><h4>Follow</h4><div class=\"live-connect-social-links\">",
        );
        for (platform, url) in &data.social {
            let _ = write!(
                html,
                "<a href=\"{url}\" target=\"_blank\" rel=\"noopener\" class=\"live-connect-social-{}\">{}</a>",
                class_token(platform),
                escape_html(&capitalize_first(platform)),
            );
        }
        html.push_str("</div></div>");
    }

    if !data.media.is_empty() {
        html.push_str("<div class=\"live-connect-multimedia\"><h4>Media</h4>");
        for media in &data.media {
            match media.kind {
                MediaKind::Image => {
                    let _ = write!(
                        html,
                        "<img src=\"{}\" alt=\"{}\" class=\"live-connect-image\">",
                        media.url,
                        escape_html(&media.caption),
                    );
                }
                MediaKind::Video => {
                    let _ = write!(
                        html,
                        "<video controls class=\"live-connect-video\"><source src=\"{}\" type=\"video/mp4\"></video>",
                        media.url,
                    );
                }
            }
        }
        html.push_str("</div>");
    }

    html.push_str("</div>");
    html
}
