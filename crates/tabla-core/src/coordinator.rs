//! The fetch coordinator: accepts fetch requests, runs each on its own
//! background task, mutates the cache store on completion and notifies the
//! listener.
//!
//! Concurrency shape: one short-lived `tokio::spawn` task per fetch.  The
//! only coordinator-owned mutable state is [`Flags`], behind a single mutex
//! that is never held across an await; everything else lives in the store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::event::{EventSender, GuideEvent};
use crate::model::{group_by_category, Channel};
use crate::refresh::RefreshScheduler;
use crate::schedule;
use crate::store::CacheStore;

/// Result of asking the coordinator to start a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A background task was spawned.
    Started,
    /// An equivalent fetch is already in flight; nothing was spawned.
    /// Callers are expected to surface this rather than queue a duplicate.
    Busy,
}

/// One unit of background work.  Created by the public entry points,
/// consumed by exactly one spawned task, never retried automatically.
#[derive(Debug, Clone)]
enum FetchRequest {
    Catalogue,
    Schedule(Channel),
}

/// What the explicit update action should do, given the two sticky bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateAction {
    FetchCatalogue,
    RefreshSchedules,
}

/// The update rule from the reference behavior, made explicit: a connection
/// failure (or a still-empty store) makes the next update retry the
/// catalogue fetch; otherwise update means "refresh what is cached".
fn decide_update(catalogue_unreachable: bool, catalogue_missing: bool) -> UpdateAction {
    if catalogue_unreachable || catalogue_missing {
        UpdateAction::FetchCatalogue
    } else {
        UpdateAction::RefreshSchedules
    }
}

/// Coordinator-shared mutable state.
#[derive(Debug, Default)]
struct Flags {
    /// True while the catalogue fetch task is outstanding.
    catalogue_in_flight: bool,
    /// Sticky: set when a fetch failed because the host was unreachable,
    /// consumed by the next explicit update.
    catalogue_unreachable: bool,
    /// Channel ids with an outstanding schedule fetch.  Guarantees at most
    /// one fetch per channel; a duplicate request is rejected as busy.
    schedules_in_flight: HashSet<String>,
}

pub struct Coordinator {
    client: ApiClient,
    store: Arc<CacheStore>,
    events: EventSender,
    flags: Mutex<Flags>,
    refresh: RefreshScheduler,
}

impl Coordinator {
    pub fn new(
        client: ApiClient,
        store: Arc<CacheStore>,
        events: EventSender,
        refresh_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            store,
            events,
            flags: Mutex::new(Flags::default()),
            refresh: RefreshScheduler::new(refresh_interval),
        })
    }

    pub fn store(&self) -> Arc<CacheStore> {
        Arc::clone(&self.store)
    }

    pub async fn is_schedule_cached(&self, channel_id: &str) -> bool {
        self.store.is_schedule_cached(channel_id).await
    }

    /// True while the full catalogue fetch is outstanding.
    pub async fn catalogue_fetch_in_flight(&self) -> bool {
        self.flags.lock().await.catalogue_in_flight
    }

    /// Start the full catalogue fetch.  Busy while another catalogue fetch
    /// is in flight — a caller-visible no-op, nothing is queued.
    pub async fn request_catalogue(self: &Arc<Self>) -> RequestOutcome {
        {
            let mut flags = self.flags.lock().await;
            if flags.catalogue_in_flight {
                debug!("catalogue fetch already in flight");
                return RequestOutcome::Busy;
            }
            flags.catalogue_in_flight = true;
        }
        self.dispatch(FetchRequest::Catalogue);
        RequestOutcome::Started
    }

    /// Start a schedule fetch for one channel.  At most one fetch per
    /// channel may be outstanding; a duplicate request is rejected as busy.
    pub async fn request_schedule(self: &Arc<Self>, channel: &Channel) -> RequestOutcome {
        {
            let mut flags = self.flags.lock().await;
            if !flags.schedules_in_flight.insert(channel.id.clone()) {
                debug!(channel = %channel.id, "schedule fetch already in flight");
                return RequestOutcome::Busy;
            }
        }
        self.dispatch(FetchRequest::Schedule(channel.clone()));
        RequestOutcome::Started
    }

    /// Re-fetch the schedule of every channel that currently has one cached,
    /// each on its own background task, then re-arm the refresh timer.
    /// A failure stays local to its channel; the rest of the sweep proceeds.
    pub async fn request_refresh_all(self: &Arc<Self>) {
        let cached = self.store.cached_channels().await;
        info!(channels = cached.len(), "refreshing cached schedules");
        for channel in &cached {
            let _ = self.request_schedule(channel).await;
        }
        self.arm_refresh().await;
    }

    /// The explicit user "update" action.  Busy while the catalogue fetch is
    /// in flight.  Consumes the sticky unreachable flag: after a connection
    /// failure (or with a still-empty store) the catalogue fetch is retried
    /// instead of a plain schedule sweep.
    pub async fn request_update(self: &Arc<Self>) -> RequestOutcome {
        let catalogue_missing = self.store.is_empty().await;
        let action = {
            let mut flags = self.flags.lock().await;
            if flags.catalogue_in_flight {
                debug!("update rejected: catalogue fetch in flight");
                return RequestOutcome::Busy;
            }
            let unreachable = std::mem::take(&mut flags.catalogue_unreachable);
            decide_update(unreachable, catalogue_missing)
        };
        match action {
            UpdateAction::FetchCatalogue => self.request_catalogue().await,
            UpdateAction::RefreshSchedules => {
                self.request_refresh_all().await;
                RequestOutcome::Started
            }
        }
    }

    /// (Re)arm the one-shot refresh timer; a previously pending timer is
    /// replaced, never stacked.  The collaborator arms it once at startup;
    /// after that every sweep re-arms it.
    pub async fn arm_refresh(self: &Arc<Self>) {
        self.refresh.arm(Arc::downgrade(self)).await;
    }

    /// Whether a refresh timer is currently pending.
    pub async fn refresh_armed(&self) -> bool {
        self.refresh.is_armed().await
    }

    /// Cancel the pending refresh timer, if any.
    pub async fn disarm_refresh(&self) {
        self.refresh.disarm().await;
    }

    pub(crate) fn on_refresh_fired(
        self: Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            debug!("refresh timer fired");
            self.refresh.fired().await;
            self.request_refresh_all().await;
        })
    }

    fn dispatch(self: &Arc<Self>, request: FetchRequest) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match request {
                FetchRequest::Catalogue => this.run_catalogue_fetch().await,
                FetchRequest::Schedule(channel) => this.run_schedule_fetch(channel).await,
            }
        });
    }

    async fn run_catalogue_fetch(self: Arc<Self>) {
        info!("fetching channel catalogue");
        let result = self.client.fetch_channels().await;

        // Flags are settled before any notification goes out, so a listener
        // reacting to the event sees the coordinator idle again.
        {
            let mut flags = self.flags.lock().await;
            flags.catalogue_in_flight = false;
            if let Err(err) = &result {
                if err.is_unreachable() {
                    flags.catalogue_unreachable = true;
                }
            }
        }

        match result {
            Ok(channels) => {
                let catalogue = group_by_category(channels);
                info!(
                    categories = catalogue.len(),
                    channels = catalogue.values().map(|c| c.len()).sum::<usize>(),
                    "catalogue updated"
                );
                self.store.replace_catalogue(catalogue.clone()).await;
                self.emit(GuideEvent::CatalogueReady(catalogue)).await;
            }
            Err(err) => {
                warn!("catalogue fetch failed: {err}");
                self.emit(GuideEvent::Error(err.user_message())).await;
            }
        }
    }

    async fn run_schedule_fetch(self: Arc<Self>, channel: Channel) {
        info!(channel = %channel.name, "fetching schedule");
        let result = schedule::build_schedule(&self.client, &channel.id, Utc::now()).await;

        {
            let mut flags = self.flags.lock().await;
            flags.schedules_in_flight.remove(&channel.id);
            if let Err(err) = &result {
                if err.is_unreachable() {
                    flags.catalogue_unreachable = true;
                }
            }
        }

        match result {
            Ok(broadcasts) => {
                if self.store.set_schedule(&channel.id, broadcasts).await {
                    self.emit(GuideEvent::ScheduleReady(channel.id)).await;
                } else {
                    // the catalogue was swapped while the fetch was in flight
                    warn!(channel = %channel.id, "channel no longer in catalogue, schedule dropped");
                    self.emit(GuideEvent::Error(format!(
                        "could not update channel {}",
                        channel.name
                    )))
                    .await;
                }
            }
            Err(err) => {
                warn!(channel = %channel.id, "schedule fetch failed: {err}");
                self.emit(GuideEvent::Error(err.user_message())).await;
            }
        }
    }

    /// Deliver a notification.  A vanished listener only means nobody is
    /// watching any more; the fetch itself already completed.
    async fn emit(&self, event: GuideEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event listener dropped, notification discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_retries_catalogue_after_unreachable() {
        assert_eq!(decide_update(true, false), UpdateAction::FetchCatalogue);
    }

    #[test]
    fn update_fetches_catalogue_when_store_is_empty() {
        assert_eq!(decide_update(false, true), UpdateAction::FetchCatalogue);
        assert_eq!(decide_update(true, true), UpdateAction::FetchCatalogue);
    }

    #[test]
    fn update_refreshes_schedules_in_the_steady_state() {
        assert_eq!(decide_update(false, false), UpdateAction::RefreshSchedules);
    }
}
