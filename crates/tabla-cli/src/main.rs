//! tabla — terminal front end for the broadcast guide.
//!
//! This is the "presentation layer" the core treats as a collaborator: it
//! issues requests to the coordinator and drains the single event receiver.

use std::sync::Arc;

use anyhow::{bail, Context};
use tabla_core::event::{self, EventReceiver};
use tabla_core::{ApiClient, CacheStore, Config, Coordinator, GuideEvent, RequestOutcome};
use tracing::info;

const USAGE: &str = "usage:
  tabla [channels]             list all channels grouped by category
  tabla schedule <id | name>   print a channel's ±12 h schedule
  tabla watch <id | name>...   keep running, refreshing the given channels";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to info for our own code, keep HTTP client internals quiet.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter.as_str())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::load().unwrap_or_default();
    let client = ApiClient::new(&config.api.base_url, config.request_timeout())?;
    let store = Arc::new(CacheStore::new());
    let (events_tx, mut events) = event::channel(64);
    let coordinator = Coordinator::new(
        client,
        Arc::clone(&store),
        events_tx,
        config.refresh_interval(),
    );

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("channels") => run_channels(&coordinator, &mut events).await,
        Some("schedule") => {
            let key = args.next().with_context(|| USAGE.to_string())?;
            run_schedule(&coordinator, &mut events, &key).await
        }
        Some("watch") => {
            let keys: Vec<String> = args.collect();
            if keys.is_empty() {
                bail!("watch needs at least one channel\n{USAGE}");
            }
            run_watch(&coordinator, &mut events, &keys).await
        }
        Some(other) => bail!("unknown command {other:?}\n{USAGE}"),
    }
}

/// Fetch the catalogue once and wait for the coordinator's notification.
async fn load_catalogue(
    coordinator: &Arc<Coordinator>,
    events: &mut EventReceiver,
) -> anyhow::Result<()> {
    if coordinator.request_catalogue().await == RequestOutcome::Busy {
        bail!("a catalogue fetch is already running");
    }
    loop {
        match events.recv().await {
            Some(GuideEvent::CatalogueReady(_)) => return Ok(()),
            Some(GuideEvent::Error(message)) => bail!(message),
            Some(_) => {}
            None => bail!("coordinator stopped"),
        }
    }
}

async fn run_channels(
    coordinator: &Arc<Coordinator>,
    events: &mut EventReceiver,
) -> anyhow::Result<()> {
    load_catalogue(coordinator, events).await?;

    let catalogue = coordinator.store().catalogue_snapshot().await;
    for (category, channels) in &catalogue {
        println!("{category}");
        for channel in channels {
            if channel.tagline.is_empty() {
                println!("  {:<6} {}", channel.id, channel.name);
            } else {
                println!("  {:<6} {} — {}", channel.id, channel.name, channel.tagline);
            }
        }
    }
    Ok(())
}

async fn run_schedule(
    coordinator: &Arc<Coordinator>,
    events: &mut EventReceiver,
    key: &str,
) -> anyhow::Result<()> {
    load_catalogue(coordinator, events).await?;

    let store = coordinator.store();
    let channel = store
        .find_channel(key)
        .await
        .with_context(|| format!("no channel matches {key:?}"))?;

    coordinator.request_schedule(&channel).await;
    loop {
        match events.recv().await {
            Some(GuideEvent::ScheduleReady(id)) if id == channel.id => break,
            Some(GuideEvent::Error(message)) => bail!(message),
            Some(_) => {}
            None => bail!("coordinator stopped"),
        }
    }

    print_schedule(&store, &channel.id, &channel.name).await;
    Ok(())
}

async fn run_watch(
    coordinator: &Arc<Coordinator>,
    events: &mut EventReceiver,
    keys: &[String],
) -> anyhow::Result<()> {
    load_catalogue(coordinator, events).await?;

    let store = coordinator.store();
    for key in keys {
        let channel = store
            .find_channel(key)
            .await
            .with_context(|| format!("no channel matches {key:?}"))?;
        coordinator.request_schedule(&channel).await;
    }
    coordinator.arm_refresh().await;
    info!("watching; schedules refresh automatically");

    // The single consumer of the notification channel: every event is
    // observed here, one at a time, in arrival order.
    while let Some(event) = events.recv().await {
        match event {
            GuideEvent::ScheduleReady(id) => {
                if let Some(channel) = store.channel(&id).await {
                    print_schedule(&store, &id, &channel.name).await;
                }
            }
            GuideEvent::Error(message) => eprintln!("error: {message}"),
            GuideEvent::CatalogueReady(_) => {}
        }
    }
    Ok(())
}

async fn print_schedule(store: &Arc<CacheStore>, channel_id: &str, channel_name: &str) {
    let Some(schedule) = store.schedule(channel_id).await else {
        return;
    };
    println!("{channel_name} — {} broadcasts", schedule.len());
    for broadcast in &schedule {
        println!(
            "  {}  {}",
            broadcast.display_start(),
            broadcast.title.trim()
        );
    }
}
