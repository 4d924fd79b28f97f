//! Schedule assembly: two day pages merged and narrowed to the ±12 h window
//! around "now".

use chrono::{DateTime, Duration, Local, Utc};

use crate::client::ApiClient;
use crate::error::Error;
use crate::model::{Broadcast, Schedule};

/// Build one channel's schedule for the window `(now − 12 h, now + 12 h)`.
///
/// The window can straddle midnight, so the full-day pages for the dates of
/// `now − 12 h` and `now + 12 h` (local calendar, like the endpoint expects)
/// are both fetched.  The two fetches address disjoint days and are
/// read-only, so they run concurrently.  Errors from either propagate
/// unchanged.
pub async fn build_schedule(
    client: &ApiClient,
    channel_id: &str,
    now: DateTime<Utc>,
) -> Result<Schedule, Error> {
    let past_day = (now - Duration::hours(12)).with_timezone(&Local).date_naive();
    let future_day = (now + Duration::hours(12)).with_timezone(&Local).date_naive();

    let (past, future) = tokio::try_join!(
        client.fetch_schedule_day(channel_id, past_day),
        client.fetch_schedule_day(channel_id, future_day),
    )?;

    let mut merged = past;
    merged.extend(future);
    Ok(filter_window(merged, now))
}

/// Keep broadcasts whose start lies strictly inside the open interval
/// `(now − 12 h, now + 12 h)`.  Source order is preserved, and the two day
/// pages cannot overlap, so no deduplication is needed.
pub fn filter_window(broadcasts: Vec<Broadcast>, now: DateTime<Utc>) -> Vec<Broadcast> {
    let earliest = now - Duration::hours(12);
    let latest = now + Duration::hours(12);
    broadcasts
        .into_iter()
        .filter(|b| b.start_utc > earliest && b.start_utc < latest)
        .collect()
}
