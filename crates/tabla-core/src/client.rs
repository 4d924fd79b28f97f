//! HTTP transport for the catalogue service.
//!
//! One [`ApiClient`] is shared by every background fetch task; the inner
//! `reqwest::Client` pools connections.  Each fetch validates the status
//! code, then streams the body straight into the parser.

use std::time::Duration;

use chrono::NaiveDate;
use futures_util::TryStreamExt;
use reqwest::StatusCode;
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::Error;
use crate::model::{Broadcast, Channel};
use crate::parser;

/// Base URL of the Sveriges Radio open API.
pub const DEFAULT_BASE_URL: &str = "https://api.sr.se/api/v2";

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `timeout` bounds both connecting and reading one response; the
    /// coordinator imposes no deadline of its own beyond this.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tabla/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    /// Fetch and parse the full channel list, paging disabled.
    pub async fn fetch_channels(&self) -> Result<Vec<Channel>, Error> {
        let url = format!("{}/channels/?pagination=false", self.base_url);
        let body = self.get(&url).await?;
        parser::parse_channels(body).await
    }

    /// Fetch and parse one channel's full-day schedule.
    pub async fn fetch_schedule_day(
        &self,
        channel_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Broadcast>, Error> {
        let url = format!(
            "{}/scheduledepisodes/?channelid={}&date={}&pagination=false",
            self.base_url, channel_id, date
        );
        let body = self.get(&url).await?;
        parser::parse_broadcasts(body).await
    }

    /// Issue the GET, validate the status, hand the body back as a buffered
    /// async reader for the streaming parser.
    async fn get(&self, url: &str) -> Result<impl AsyncBufRead + Unpin, Error> {
        debug!(url, "GET");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::Protocol { status });
        }
        let stream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        Ok(StreamReader::new(stream))
    }
}
