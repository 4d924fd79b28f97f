//! tabla-core — fetch-and-cache coordination for a radio broadcast guide.
//!
//! The pieces, bottom up: [`client`] + [`parser`] fetch and stream-parse the
//! two document shapes the remote catalogue service returns; [`schedule`]
//! merges two day pages into the ±12 h window around now; [`store`] owns
//! the in-memory catalogue and cached schedules; [`coordinator`] runs every
//! fetch on its own background task and reports through [`event`]; and
//! [`refresh`] re-sweeps all cached schedules on a timer.
//!
//! The presentation layer is a consumer of this crate: it calls the
//! `request_*` entry points and drains the single [`event::EventReceiver`].

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod model;
pub mod parser;
pub mod refresh;
pub mod schedule;
pub mod store;

pub use client::ApiClient;
pub use config::Config;
pub use coordinator::{Coordinator, RequestOutcome};
pub use error::Error;
pub use event::{EventReceiver, EventSender, GuideEvent};
pub use model::{Broadcast, Catalogue, Channel, Schedule};
pub use store::CacheStore;
