use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use chrono_tz::Tz;

const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M%:z",
];

const NAIVE_DATETIME_FORMATS: [&str; 10] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %I:%M %p",
];

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// A calendar-ready timestamp pair. Both halves are empty when the input could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedDate {
    pub local: String,
    pub utc: String,
}

impl NormalizedDate {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }
}

enum Parsed {
    Instant(DateTime<FixedOffset>),
    Wall(NaiveDateTime),
}

/// Best-effort normalisation into `YYYY-MM-DD HH:MM:SS`.
///
/// Inputs carrying an offset keep their own wall-clock time unless `site_tz` is given, in
/// which case they are shifted into it. Inputs without an offset are read as wall-clock time
/// in `site_tz`, or as UTC when no site timezone is configured.
pub fn normalize(input: &str, site_tz: Option<Tz>) -> NormalizedDate {
    let Some(parsed) = parse(input) else {
        return NormalizedDate::default();
    };

    match parsed {
        Parsed::Instant(dt) => {
            let local = match site_tz {
                Some(tz) => dt.with_timezone(&tz).naive_local(),
                None => dt.naive_local(),
            };
            NormalizedDate {
                local: local.format(STORAGE_FORMAT).to_string(),
                utc: dt.naive_utc().format(STORAGE_FORMAT).to_string(),
            }
        }
        Parsed::Wall(naive) => {
            let utc = match site_tz {
                Some(tz) => match tz.from_local_datetime(&naive) {
                    LocalResult::Single(dt) => Some(dt.naive_utc()),
                    LocalResult::Ambiguous(dt, _) => Some(dt.naive_utc()),
                    LocalResult::None => None,
                },
                None => Some(naive),
            };
            NormalizedDate {
                local: naive.format(STORAGE_FORMAT).to_string(),
                utc: utc
                    .map(|dt| dt.format(STORAGE_FORMAT).to_string())
                    .unwrap_or_default(),
            }
        }
    }
}

fn parse(input: &str) -> Option<Parsed> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(stamp) = text.strip_prefix('@') {
        let seconds = stamp.trim().parse::<i64>().ok()?;
        let dt = DateTime::<Utc>::from_timestamp(seconds, 0)?;
        return Some(Parsed::Instant(dt.fixed_offset()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Parsed::Instant(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(Parsed::Instant(dt));
    }
    for fmt in OFFSET_FORMATS.iter() {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(Parsed::Instant(dt));
        }
    }
    if let Some(without_zulu) = text.strip_suffix('Z').or_else(|| text.strip_suffix('z')) {
        if let Some(naive) = parse_naive_datetime(without_zulu) {
            return Some(Parsed::Instant(naive.and_utc().fixed_offset()));
        }
    }
    if let Some(naive) = parse_naive_datetime(text) {
        return Some(Parsed::Wall(naive));
    }
    for fmt in DATE_FORMATS.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(Parsed::Wall);
        }
    }
    None
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
