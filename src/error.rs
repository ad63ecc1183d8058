use std::fmt;

use crate::types::OperatingMode;

#[derive(Debug)]
pub enum Error {
    /// No response, or a response too garbled to contain the login form.
    Connectivity(String),
    /// An expected token or marker is missing from the portal markup.
    MarkupChanged(String),
    /// The portal rejected the session check after login.
    Authentication { status: u16 },
    HouseMismatch { expected: u64, found: u64 },
    EndpointMoved { url: String, status: u16 },
    NotFound(String),
    Request { url: String, status: u16 },
    UnsupportedMode(OperatingMode),
    InvalidSetpoints { cooling: f64, heating: f64 },
    Http(reqwest::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
    Csv(csv::Error),
}

impl Error {
    /// Whether a later attempt may succeed without a code or configuration change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connectivity(_)
                | Error::Authentication { .. }
                | Error::Request { .. }
                | Error::Http(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connectivity(msg) => write!(f, "connectivity error: {msg}"),
            Error::MarkupChanged(msg) => write!(f, "portal markup changed: {msg}"),
            Error::Authentication { status } => {
                write!(f, "authentication failed (status {status})")
            }
            Error::HouseMismatch { expected, found } => {
                write!(f, "house mismatch: configured {expected}, portal reports {found}")
            }
            Error::EndpointMoved { url, status } => {
                write!(f, "endpoint moved: {url} answered {status}")
            }
            Error::NotFound(selector) => write!(f, "thermostat not found: {selector}"),
            Error::Request { url, status } => write!(f, "request to {url} failed with {status}"),
            Error::UnsupportedMode(mode) => write!(f, "unsupported operating mode: {mode}"),
            Error::InvalidSetpoints { cooling, heating } => write!(
                f,
                "invalid setpoints: heating {heating} above cooling {cooling}"
            ),
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Csv(e) => write!(f, "CSV error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Error::Connectivity(e.to_string())
        } else {
            Error::Http(e)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Csv(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
