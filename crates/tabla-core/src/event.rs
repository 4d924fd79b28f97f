//! Notifications from background fetch tasks to the single registered
//! listener.
//!
//! Delivery contract: events are produced on arbitrary background tasks but
//! are observed one at a time, in arrival order, by whichever task drains
//! the [`EventReceiver`] — the mpsc receiver *is* the serialization point,
//! so the listener needs no locking of its own.  Hold exactly one receiver
//! and drain it from one place.
//!
//! Events carry identifiers and snapshots only; the cache store keeps
//! ownership of all domain records.

use tokio::sync::mpsc;

use crate::model::Catalogue;

#[derive(Debug, Clone)]
pub enum GuideEvent {
    /// The catalogue fetch completed; the store now holds this mapping.
    CatalogueReady(Catalogue),
    /// The given channel's schedule has been fetched and cached.
    ScheduleReady(String),
    /// A fetch failed.  The message is ready for direct display; the fetch
    /// it belonged to is simply over — nothing retries automatically.
    Error(String),
}

pub type EventSender = mpsc::Sender<GuideEvent>;
pub type EventReceiver = mpsc::Receiver<GuideEvent>;

/// Build the notification channel.  `capacity` bounds how many undelivered
/// events may pile up before producing tasks wait for the listener.
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}
