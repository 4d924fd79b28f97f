//! Coordinator behavior against a local fixture server: notification
//! delivery, busy rejection, failure classification, the in-flight dedup
//! set, the refresh sweep and the sticky catalogue-retry flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::Utc;

use tabla_core::event::{self, EventReceiver};
use tabla_core::{ApiClient, CacheStore, Coordinator, GuideEvent, RequestOutcome};

// ── fixture server ────────────────────────────────────────────────────────────

#[derive(Default)]
struct Fixture {
    catalogue_hits: AtomicUsize,
    schedule_hits: Mutex<HashMap<String, usize>>,
    /// Status for the channels endpoint; 0 means 200.
    catalogue_status: AtomicU16,
    catalogue_delay_ms: AtomicU64,
    schedule_delay_ms: AtomicU64,
}

impl Fixture {
    fn schedule_hits_for(&self, channel_id: &str) -> usize {
        *self
            .schedule_hits
            .lock()
            .unwrap()
            .get(channel_id)
            .unwrap_or(&0)
    }
}

const CHANNELS_XML: &str = r#"<sr><channels>
  <channel id="132" name="P1">
    <image>https://static.example/132.png</image>
    <tagline>Talked word</tagline>
    <channeltype>Rikskanal</channeltype>
  </channel>
  <channel id="164" name="P2">
    <image>https://static.example/164.png</image>
    <tagline>Classical</tagline>
    <channeltype>Rikskanal</channeltype>
  </channel>
  <channel id="211" name="P4 Norrbotten">
    <image>https://static.example/211.png</image>
    <tagline>Local news</tagline>
    <channeltype>Lokal kanal</channeltype>
  </channel>
</channels></sr>"#;

async fn channels_endpoint(State(fixture): State<Arc<Fixture>>) -> (StatusCode, String) {
    fixture.catalogue_hits.fetch_add(1, Ordering::SeqCst);
    let delay = fixture.catalogue_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let status = fixture.catalogue_status.load(Ordering::SeqCst);
    if status != 0 {
        return (
            StatusCode::from_u16(status).unwrap(),
            "not today".to_string(),
        );
    }
    (StatusCode::OK, CHANNELS_XML.to_string())
}

async fn schedule_endpoint(
    State(fixture): State<Arc<Fixture>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let channel_id = params.get("channelid").cloned().unwrap_or_default();
    *fixture
        .schedule_hits
        .lock()
        .unwrap()
        .entry(channel_id.clone())
        .or_insert(0) += 1;

    let delay = fixture.schedule_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    // One broadcast per day page, both inside the ±12 h window so the
    // assembler keeps them.  The page for the "past" date gets a distinct
    // episode id from the "future" one.
    let now = Utc::now();
    let past_date = (now - chrono::Duration::hours(12))
        .with_timezone(&chrono::Local)
        .date_naive()
        .to_string();
    let (episode, start) = if params.get("date") == Some(&past_date) {
        (format!("past-{channel_id}"), now - chrono::Duration::hours(1))
    } else {
        (
            format!("future-{channel_id}"),
            now + chrono::Duration::hours(1),
        )
    };
    let end = start + chrono::Duration::hours(1);

    let body = format!(
        "<sr><schedule><scheduledepisode>\
           <episodeid>{episode}</episodeid>\
           <title>Episode {episode}</title>\
           <description>test</description>\
           <starttimeutc>{}</starttimeutc>\
           <endtimeutc>{}</endtimeutc>\
           <imageurl>https://static.example/{episode}.png</imageurl>\
         </scheduledepisode></schedule></sr>",
        start.to_rfc3339(),
        end.to_rfc3339(),
    );
    (StatusCode::OK, body)
}

async fn serve(fixture: Arc<Fixture>) -> String {
    let app = Router::new()
        .route("/channels/", get(channels_endpoint))
        .route("/scheduledepisodes/", get(schedule_endpoint))
        .with_state(fixture);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture server");
    let addr = listener.local_addr().expect("fixture server addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fixture server");
    });
    format!("http://{addr}")
}

// ── harness ───────────────────────────────────────────────────────────────────

fn guide(
    base_url: &str,
    refresh_interval: Duration,
) -> (Arc<Coordinator>, Arc<CacheStore>, EventReceiver) {
    let client = ApiClient::new(base_url, Duration::from_millis(1000)).expect("client");
    let store = Arc::new(CacheStore::new());
    let (tx, rx) = event::channel(64);
    let coordinator = Coordinator::new(client, Arc::clone(&store), tx, refresh_interval);
    (coordinator, store, rx)
}

async fn next_event(rx: &mut EventReceiver) -> GuideEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

const LONG: Duration = Duration::from_secs(3600);

// ── tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn catalogue_fetch_populates_store_and_notifies() {
    let fixture = Arc::new(Fixture::default());
    let base = serve(Arc::clone(&fixture)).await;
    let (coordinator, store, mut rx) = guide(&base, LONG);

    assert!(store.is_empty().await);
    assert_eq!(coordinator.request_catalogue().await, RequestOutcome::Started);

    match next_event(&mut rx).await {
        GuideEvent::CatalogueReady(catalogue) => {
            let categories: Vec<&String> = catalogue.keys().collect();
            assert_eq!(categories, ["Rikskanal", "Lokal kanal"]);
            let total: usize = catalogue.values().map(|c| c.len()).sum();
            assert_eq!(total, 3);
            assert!(catalogue.values().flatten().all(|c| !c.id.is_empty()));
        }
        other => panic!("expected CatalogueReady, got {other:?}"),
    }

    assert_eq!(store.all_channels().await.len(), 3);
    assert!(!coordinator.catalogue_fetch_in_flight().await);
    assert_eq!(fixture.catalogue_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn overlapping_catalogue_fetches_are_rejected() {
    let fixture = Arc::new(Fixture::default());
    fixture.catalogue_delay_ms.store(300, Ordering::SeqCst);
    let base = serve(Arc::clone(&fixture)).await;
    let (coordinator, store, mut rx) = guide(&base, LONG);

    assert_eq!(coordinator.request_catalogue().await, RequestOutcome::Started);
    assert!(coordinator.catalogue_fetch_in_flight().await);
    assert_eq!(coordinator.request_catalogue().await, RequestOutcome::Busy);
    assert_eq!(coordinator.request_update().await, RequestOutcome::Busy);

    assert!(matches!(
        next_event(&mut rx).await,
        GuideEvent::CatalogueReady(_)
    ));

    // The rejected call spawned nothing and duplicated nothing.
    assert_eq!(fixture.catalogue_hits.load(Ordering::SeqCst), 1);
    assert_eq!(store.all_channels().await.len(), 3);

    // Once the fetch completed the flag is down again.
    assert_eq!(coordinator.request_catalogue().await, RequestOutcome::Started);
    assert!(matches!(
        next_event(&mut rx).await,
        GuideEvent::CatalogueReady(_)
    ));
}

#[tokio::test]
async fn protocol_error_leaves_previous_catalogue_untouched() {
    let fixture = Arc::new(Fixture::default());
    let base = serve(Arc::clone(&fixture)).await;
    let (coordinator, store, mut rx) = guide(&base, LONG);

    coordinator.request_catalogue().await;
    assert!(matches!(
        next_event(&mut rx).await,
        GuideEvent::CatalogueReady(_)
    ));

    fixture.catalogue_status.store(404, Ordering::SeqCst);
    assert_eq!(coordinator.request_catalogue().await, RequestOutcome::Started);

    match next_event(&mut rx).await {
        GuideEvent::Error(message) => assert!(message.contains("404"), "got: {message}"),
        other => panic!("expected Error, got {other:?}"),
    }

    // Stale but available.
    assert_eq!(store.all_channels().await.len(), 3);
    assert!(!coordinator.catalogue_fetch_in_flight().await);
}

#[tokio::test]
async fn schedule_fetch_caches_and_notifies() {
    let fixture = Arc::new(Fixture::default());
    let base = serve(Arc::clone(&fixture)).await;
    let (coordinator, store, mut rx) = guide(&base, LONG);

    coordinator.request_catalogue().await;
    next_event(&mut rx).await;

    let p1 = store.channel("132").await.expect("P1 in catalogue");
    assert!(!coordinator.is_schedule_cached("132").await);

    assert_eq!(
        coordinator.request_schedule(&p1).await,
        RequestOutcome::Started
    );
    match next_event(&mut rx).await {
        GuideEvent::ScheduleReady(id) => assert_eq!(id, "132"),
        other => panic!("expected ScheduleReady, got {other:?}"),
    }

    assert!(coordinator.is_schedule_cached("132").await);
    let schedule = store.schedule("132").await.expect("cached schedule");
    assert_eq!(schedule.len(), 2);
    let now = Utc::now();
    for b in &schedule {
        let offset = (b.start_utc - now).num_hours().abs();
        assert!(offset < 12, "broadcast outside window: {b:?}");
    }

    // One fetch is two day pages.
    assert_eq!(fixture.schedule_hits_for("132"), 2);
    assert!(!coordinator.is_schedule_cached("164").await);
}

#[tokio::test]
async fn duplicate_schedule_requests_are_rejected_while_in_flight() {
    let fixture = Arc::new(Fixture::default());
    fixture.schedule_delay_ms.store(300, Ordering::SeqCst);
    let base = serve(Arc::clone(&fixture)).await;
    let (coordinator, store, mut rx) = guide(&base, LONG);

    coordinator.request_catalogue().await;
    next_event(&mut rx).await;
    let p1 = store.channel("132").await.expect("P1 in catalogue");

    assert_eq!(
        coordinator.request_schedule(&p1).await,
        RequestOutcome::Started
    );
    assert_eq!(coordinator.request_schedule(&p1).await, RequestOutcome::Busy);

    assert!(matches!(
        next_event(&mut rx).await,
        GuideEvent::ScheduleReady(_)
    ));

    // Only the first request fetched; the store ended up structurally sound.
    assert_eq!(fixture.schedule_hits_for("132"), 2);
    assert!(store.schedule("132").await.is_some());

    // The in-flight reservation is released on completion.
    assert_eq!(
        coordinator.request_schedule(&p1).await,
        RequestOutcome::Started
    );
    assert!(matches!(
        next_event(&mut rx).await,
        GuideEvent::ScheduleReady(_)
    ));
    assert_eq!(fixture.schedule_hits_for("132"), 4);
}

#[tokio::test]
async fn refresh_sweep_refetches_exactly_the_cached_channels() {
    let fixture = Arc::new(Fixture::default());
    let base = serve(Arc::clone(&fixture)).await;
    let (coordinator, store, mut rx) = guide(&base, Duration::from_millis(600));

    coordinator.request_catalogue().await;
    next_event(&mut rx).await;

    let p1 = store.channel("132").await.expect("P1 in catalogue");
    coordinator.request_schedule(&p1).await;
    next_event(&mut rx).await;
    assert_eq!(fixture.schedule_hits_for("132"), 2);

    coordinator.arm_refresh().await;
    assert!(coordinator.refresh_armed().await);

    // The timer fires once and sweeps the one cached channel.
    match next_event(&mut rx).await {
        GuideEvent::ScheduleReady(id) => assert_eq!(id, "132"),
        other => panic!("expected sweep ScheduleReady, got {other:?}"),
    }
    // The sweep re-armed the timer; stop it before counting.
    assert!(coordinator.refresh_armed().await);
    coordinator.disarm_refresh().await;
    assert!(!coordinator.refresh_armed().await);

    assert_eq!(fixture.schedule_hits_for("132"), 4);
    assert_eq!(fixture.schedule_hits_for("164"), 0, "uncached channel swept");
    assert_eq!(fixture.schedule_hits_for("211"), 0, "uncached channel swept");
    assert_eq!(fixture.catalogue_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_failure_makes_the_next_update_retry_the_catalogue() {
    let fixture = Arc::new(Fixture::default());
    let base = serve(Arc::clone(&fixture)).await;
    let (coordinator, store, mut rx) = guide(&base, LONG);

    coordinator.request_catalogue().await;
    next_event(&mut rx).await;
    let p1 = store.channel("132").await.expect("P1 in catalogue");

    // The schedule endpoint stalls past the client timeout: an unreachable-
    // class failure that sets the sticky retry flag.
    fixture.schedule_delay_ms.store(2500, Ordering::SeqCst);
    coordinator.request_schedule(&p1).await;
    assert!(matches!(next_event(&mut rx).await, GuideEvent::Error(_)));
    assert!(!coordinator.is_schedule_cached("132").await);
    fixture.schedule_delay_ms.store(0, Ordering::SeqCst);

    // The store is populated, so without the sticky flag this would be a
    // plain sweep (of zero cached channels).  The flag reroutes it to the
    // catalogue fetch.
    assert_eq!(coordinator.request_update().await, RequestOutcome::Started);
    assert!(matches!(
        next_event(&mut rx).await,
        GuideEvent::CatalogueReady(_)
    ));
    assert_eq!(fixture.catalogue_hits.load(Ordering::SeqCst), 2);

    // Flag consumed: the next update is a sweep again, and with nothing
    // cached it touches no endpoint and emits nothing.
    assert_eq!(coordinator.request_update().await, RequestOutcome::Started);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(fixture.catalogue_hits.load(Ordering::SeqCst), 2);
    coordinator.disarm_refresh().await;
}
