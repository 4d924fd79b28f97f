//! Failure taxonomy for a single fetch.
//!
//! Every background-task failure is one of three kinds: the connection could
//! not be established, the server answered with an unexpected status, or the
//! body did not match the expected schema.  All three are non-fatal — they
//! are converted to a message and surfaced through the error notification.

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },
    #[error("unexpected response from server: {status}")]
    Protocol { status: StatusCode },
    #[error("unsupported format from API: {detail}")]
    Format { detail: String },
}

impl Error {
    /// Message ready for direct display to the user.
    pub fn user_message(&self) -> String {
        match self {
            Error::Network { source } => {
                let target = source
                    .url()
                    .map(|u| u.as_str())
                    .unwrap_or("the catalogue service");
                format!("could not connect to {target}: check your network connection")
            }
            Error::Protocol { status } => {
                format!("unexpected response from server: {status}")
            }
            Error::Format { .. } => "unsupported format from API".to_string(),
        }
    }

    /// True when the failure means the remote host cannot be reached at all
    /// (connect failure or timeout) rather than a bad response.  Drives the
    /// coordinator's catalogue-retry flag.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Network { source } if source.is_connect() || source.is_timeout())
    }
}
