//! Domain records for the broadcast guide.
//!
//! Everything here is immutable once constructed.  The [`CacheStore`]
//! (`store` module) is the only owner of long-lived instances; anything a
//! caller receives is a clone.
//!
//! [`CacheStore`]: crate::store::CacheStore

use chrono::{DateTime, Local, Utc};
use indexmap::IndexMap;

/// A radio channel as listed by the catalogue endpoint.
///
/// Identity is `id`, which is stable across fetches and never empty (the
/// parser drops records without one).  `image_url` is an opaque reference;
/// nothing in this crate dereferences it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    /// Grouping key — the API calls this the channel type.
    pub category: String,
    pub tagline: String,
    pub image_url: String,
}

/// One scheduled broadcast.
///
/// Times arrive from the wire as UTC instants; the conversion to the local
/// system zone happens once, here, and is cached on the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub episode_id: String,
    pub title: String,
    pub description: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub start_local: DateTime<Local>,
    pub end_local: DateTime<Local>,
    pub image_url: String,
}

impl Broadcast {
    pub fn new(
        episode_id: String,
        title: String,
        description: String,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
        image_url: String,
    ) -> Self {
        Self {
            episode_id,
            title,
            description,
            start_utc,
            end_utc,
            start_local: start_utc.with_timezone(&Local),
            end_local: end_utc.with_timezone(&Local),
            image_url,
        }
    }

    /// Start time as `HH:MM - DD/MM` in the local zone, for listing rows.
    pub fn display_start(&self) -> String {
        self.start_local.format("%H:%M - %d/%m").to_string()
    }

    /// End time as `HH:MM - DD/MM` in the local zone.
    pub fn display_end(&self) -> String {
        self.end_local.format("%H:%M - %d/%m").to_string()
    }
}

/// A channel's schedule for the current window.  Replaced wholesale on each
/// fetch; never merged with a previously cached version.
pub type Schedule = Vec<Broadcast>;

/// Category → channels.  Categories keep the first-seen order of the source
/// document, which is why this is an `IndexMap` and not a `HashMap`.
pub type Catalogue = IndexMap<String, Vec<Channel>>;

/// Bucket a parsed channel list by category.  Every channel lands in exactly
/// one bucket; bucket order is the order categories first appear.
pub fn group_by_category(channels: Vec<Channel>) -> Catalogue {
    let mut catalogue = Catalogue::new();
    for channel in channels {
        catalogue
            .entry(channel.category.clone())
            .or_default()
            .push(channel);
    }
    catalogue
}
