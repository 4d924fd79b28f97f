//! In-memory cache of the catalogue and every fetched schedule.
//!
//! The store exclusively owns all [`Channel`] and [`Schedule`] records;
//! callers get clones.  Every read-modify-write sequence takes a single
//! lock, so a schedule and its cached-ness can never be observed
//! half-updated — a channel either has its schedule or it does not.

use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::model::{Catalogue, Channel, Schedule};

/// One catalogue row: the immutable channel plus its optionally cached
/// schedule.  The `Option` *is* the cached flag.
#[derive(Debug, Clone)]
struct Entry {
    channel: Channel,
    schedule: Option<Schedule>,
}

#[derive(Debug, Default)]
pub struct CacheStore {
    inner: RwLock<IndexMap<String, Vec<Entry>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap the whole category → channel mapping in one step.  Schedules
    /// cached under the previous catalogue are discarded with it.
    pub async fn replace_catalogue(&self, catalogue: Catalogue) {
        let mapped = catalogue
            .into_iter()
            .map(|(category, channels)| {
                let entries = channels
                    .into_iter()
                    .map(|channel| Entry {
                        channel,
                        schedule: None,
                    })
                    .collect();
                (category, entries)
            })
            .collect();
        *self.inner.write().await = mapped;
    }

    /// Store a freshly fetched schedule on the matching channel, marking it
    /// cached.  The previous schedule, if any, is replaced wholesale.
    /// Returns false when the channel is not in the catalogue (it may have
    /// been swapped out while the fetch was in flight).
    pub async fn set_schedule(&self, channel_id: &str, schedule: Schedule) -> bool {
        let mut inner = self.inner.write().await;
        for entries in inner.values_mut() {
            if let Some(entry) = entries.iter_mut().find(|e| e.channel.id == channel_id) {
                entry.schedule = Some(schedule);
                return true;
            }
        }
        false
    }

    /// Whether a schedule has been fetched for this channel.  False until
    /// the first successful fetch completes, true from then on.
    pub async fn is_schedule_cached(&self, channel_id: &str) -> bool {
        self.inner
            .read()
            .await
            .values()
            .flatten()
            .any(|e| e.channel.id == channel_id && e.schedule.is_some())
    }

    pub async fn schedule(&self, channel_id: &str) -> Option<Schedule> {
        self.inner
            .read()
            .await
            .values()
            .flatten()
            .find(|e| e.channel.id == channel_id)
            .and_then(|e| e.schedule.clone())
    }

    pub async fn channel(&self, channel_id: &str) -> Option<Channel> {
        self.inner
            .read()
            .await
            .values()
            .flatten()
            .find(|e| e.channel.id == channel_id)
            .map(|e| e.channel.clone())
    }

    /// Look a channel up by id or (case-insensitive) name.
    pub async fn find_channel(&self, key: &str) -> Option<Channel> {
        self.inner
            .read()
            .await
            .values()
            .flatten()
            .find(|e| e.channel.id == key || e.channel.name.eq_ignore_ascii_case(key))
            .map(|e| e.channel.clone())
    }

    /// All channels, flattened in catalogue order.
    pub async fn all_channels(&self) -> Vec<Channel> {
        self.inner
            .read()
            .await
            .values()
            .flatten()
            .map(|e| e.channel.clone())
            .collect()
    }

    /// The channels that currently have a cached schedule — the sweep set.
    pub async fn cached_channels(&self) -> Vec<Channel> {
        self.inner
            .read()
            .await
            .values()
            .flatten()
            .filter(|e| e.schedule.is_some())
            .map(|e| e.channel.clone())
            .collect()
    }

    /// Clone of the category → channel mapping, without schedules.
    pub async fn catalogue_snapshot(&self) -> Catalogue {
        self.inner
            .read()
            .await
            .iter()
            .map(|(category, entries)| {
                let channels = entries.iter().map(|e| e.channel.clone()).collect();
                (category.clone(), channels)
            })
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::group_by_category;

    fn channel(id: &str, name: &str, category: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            tagline: String::new(),
            image_url: String::new(),
        }
    }

    fn sample_catalogue() -> Catalogue {
        group_by_category(vec![
            channel("132", "P1", "Rikskanal"),
            channel("164", "P2", "Rikskanal"),
            channel("211", "P4 Norrbotten", "Lokal kanal"),
        ])
    }

    #[tokio::test]
    async fn schedule_is_uncached_until_set_then_cached() {
        let store = CacheStore::new();
        store.replace_catalogue(sample_catalogue()).await;

        assert!(!store.is_schedule_cached("132").await);
        assert!(store.schedule("132").await.is_none());

        assert!(store.set_schedule("132", Vec::new()).await);
        assert!(store.is_schedule_cached("132").await);
        assert!(store.schedule("132").await.is_some());
        assert!(!store.is_schedule_cached("164").await);
    }

    #[tokio::test]
    async fn set_schedule_on_unknown_channel_is_rejected() {
        let store = CacheStore::new();
        store.replace_catalogue(sample_catalogue()).await;
        assert!(!store.set_schedule("999", Vec::new()).await);
        assert!(!store.is_schedule_cached("999").await);
    }

    #[tokio::test]
    async fn replacing_the_catalogue_discards_cached_schedules() {
        let store = CacheStore::new();
        store.replace_catalogue(sample_catalogue()).await;
        store.set_schedule("132", Vec::new()).await;

        store.replace_catalogue(sample_catalogue()).await;
        assert!(!store.is_schedule_cached("132").await);
        assert_eq!(store.all_channels().await.len(), 3);
    }

    #[tokio::test]
    async fn cached_channels_is_exactly_the_sweep_set() {
        let store = CacheStore::new();
        store.replace_catalogue(sample_catalogue()).await;
        store.set_schedule("164", Vec::new()).await;
        store.set_schedule("211", Vec::new()).await;

        let cached: Vec<String> = store
            .cached_channels()
            .await
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(cached, ["164", "211"]);
    }

    #[tokio::test]
    async fn snapshot_preserves_category_order() {
        let store = CacheStore::new();
        store.replace_catalogue(sample_catalogue()).await;
        let snapshot = store.catalogue_snapshot().await;
        let order: Vec<&String> = snapshot.keys().collect();
        assert_eq!(order, ["Rikskanal", "Lokal kanal"]);
    }

    #[tokio::test]
    async fn find_channel_matches_id_and_name() {
        let store = CacheStore::new();
        store.replace_catalogue(sample_catalogue()).await;
        assert_eq!(store.find_channel("132").await.unwrap().name, "P1");
        assert_eq!(store.find_channel("p2").await.unwrap().id, "164");
        assert!(store.find_channel("nope").await.is_none());
    }
}
