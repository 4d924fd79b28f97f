//! Streaming parser for the two document shapes the catalogue service
//! returns.
//!
//! One event-driven engine serves both grammars; [`Grammar`] selects which
//! tag names open a record and which map to field slots.  The engine keeps a
//! single "current field" state keyed on the open tag name, accumulates
//! character data into that slot, and finalizes one typed record when the
//! record-delimiting element closes.  Nothing materializes the whole
//! document.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::io::AsyncBufRead;
use tracing::debug;

use crate::error::Error;
use crate::model::{Broadcast, Channel};

/// Which document shape the engine expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// Channel-list document: repeated `<channel name=.. id=..>` records
    /// with nested `image`, `tagline` and `channeltype` text nodes.
    Catalogue,
    /// Per-day schedule document: repeated `<scheduledepisode>` records with
    /// nested `episodeid`, `title`, `description`, `starttimeutc`,
    /// `endtimeutc` and `imageurl` text nodes.
    Schedule,
}

impl Grammar {
    /// Tag name that delimits one record.
    fn record_tag(self) -> &'static str {
        match self {
            Grammar::Catalogue => "channel",
            Grammar::Schedule => "scheduledepisode",
        }
    }

    /// Field slot a given open tag maps to, if any.  Unknown tags accumulate
    /// nothing.
    fn field_for(self, tag: &str) -> Option<Field> {
        match self {
            Grammar::Catalogue => match tag {
                "image" => Some(Field::ImageUrl),
                "tagline" => Some(Field::Tagline),
                "channeltype" => Some(Field::Category),
                _ => None,
            },
            Grammar::Schedule => match tag {
                "episodeid" => Some(Field::EpisodeId),
                "title" => Some(Field::Title),
                "description" => Some(Field::Description),
                "starttimeutc" => Some(Field::StartTime),
                "endtimeutc" => Some(Field::EndTime),
                "imageurl" => Some(Field::ImageUrl),
                _ => None,
            },
        }
    }
}

/// Slots the character accumulator can point at.  One set serves both
/// grammars; the reference implementation kept a boolean flag per tag, this
/// is the same state machine with the flags folded into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ImageUrl,
    Tagline,
    Category,
    EpisodeId,
    Title,
    Description,
    StartTime,
    EndTime,
}

/// Per-record transient state, reset whenever a record closes.
#[derive(Debug, Default)]
struct Draft {
    // channel record attributes
    name: String,
    id: String,
    // accumulated text fields
    image_url: String,
    tagline: String,
    category: String,
    episode_id: String,
    title: String,
    description: String,
    start_time: String,
    end_time: String,
}

impl Draft {
    fn slot_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::ImageUrl => &mut self.image_url,
            Field::Tagline => &mut self.tagline,
            Field::Category => &mut self.category,
            Field::EpisodeId => &mut self.episode_id,
            Field::Title => &mut self.title,
            Field::Description => &mut self.description,
            Field::StartTime => &mut self.start_time,
            Field::EndTime => &mut self.end_time,
        }
    }

    /// Finalize a channel record.  Records without an id are unusable as
    /// cache keys and are dropped.
    fn finish_channel(self) -> Option<Channel> {
        if self.id.trim().is_empty() {
            debug!(name = %self.name, "skipping channel record without id");
            return None;
        }
        Some(Channel {
            id: self.id,
            name: self.name,
            category: self.category,
            tagline: self.tagline,
            image_url: self.image_url,
        })
    }

    /// Finalize a broadcast record; fails when a timestamp is not valid
    /// RFC 3339 text.
    fn finish_broadcast(self) -> Result<Broadcast, Error> {
        let start = parse_utc(&self.start_time)?;
        let end = parse_utc(&self.end_time)?;
        Ok(Broadcast::new(
            self.episode_id,
            self.title,
            self.description,
            start,
            end,
            self.image_url,
        ))
    }
}

fn parse_utc(text: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Format {
            detail: format!("bad timestamp {text:?}: {e}"),
        })
}

fn format_err(e: impl std::fmt::Display) -> Error {
    Error::Format {
        detail: e.to_string(),
    }
}

/// Parse a channel-list document.
pub async fn parse_channels<R>(input: R) -> Result<Vec<Channel>, Error>
where
    R: AsyncBufRead + Unpin,
{
    let (channels, _) = run_engine(input, Grammar::Catalogue).await?;
    Ok(channels)
}

/// Parse a per-day schedule document.
pub async fn parse_broadcasts<R>(input: R) -> Result<Vec<Broadcast>, Error>
where
    R: AsyncBufRead + Unpin,
{
    let (_, broadcasts) = run_engine(input, Grammar::Schedule).await?;
    Ok(broadcasts)
}

/// The shared engine.  Only the vector matching `grammar` is ever filled.
async fn run_engine<R>(input: R, grammar: Grammar) -> Result<(Vec<Channel>, Vec<Broadcast>), Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut field: Option<Field> = None;
    let mut draft = Draft::default();
    let mut channels = Vec::new();
    let mut broadcasts = Vec::new();

    loop {
        match reader
            .read_event_into_async(&mut buf)
            .await
            .map_err(format_err)?
        {
            Event::Eof => break,
            Event::Start(start) => {
                let tag = tag_name(&start);
                if grammar == Grammar::Catalogue && tag == grammar.record_tag() {
                    draft = Draft::default();
                    read_channel_attributes(&start, &mut draft)?;
                } else {
                    field = grammar.field_for(&tag);
                }
            }
            Event::Text(text) => {
                if let Some(f) = field {
                    let chunk = text.unescape().map_err(format_err)?;
                    draft.slot_mut(f).push_str(&chunk);
                }
            }
            Event::CData(cdata) => {
                if let Some(f) = field {
                    let chunk = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                    draft.slot_mut(f).push_str(&chunk);
                }
            }
            Event::End(end) => {
                let tag = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                field = None;
                if tag == grammar.record_tag() {
                    let finished = std::mem::take(&mut draft);
                    match grammar {
                        Grammar::Catalogue => {
                            if let Some(channel) = finished.finish_channel() {
                                channels.push(channel);
                            }
                        }
                        Grammar::Schedule => broadcasts.push(finished.finish_broadcast()?),
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok((channels, broadcasts))
}

fn tag_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn read_channel_attributes(start: &BytesStart<'_>, draft: &mut Draft) -> Result<(), Error> {
    for attr in start.attributes() {
        let attr = attr.map_err(format_err)?;
        let value = attr.unescape_value().map_err(format_err)?.into_owned();
        match attr.key.as_ref() {
            b"name" => draft.name = value,
            b"id" => draft.id = value,
            _ => {}
        }
    }
    Ok(())
}
