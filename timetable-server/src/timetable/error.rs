//! Timetable source error types.

/// Errors that can occur while fetching or parsing timetable pages.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Origin returned a non-success status
    #[error("HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    /// A configured or derived URL could not be parsed
    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// A configured header value is not a valid HTTP header
    #[error("invalid {name} header value")]
    InvalidHeader { name: &'static str },

    /// Response bytes are malformed in the source's declared charset
    #[error("response from {url} is not valid {charset}")]
    Decode { url: String, charset: &'static str },

    /// Page has no recognizable station name
    #[error("station name not found at {url}")]
    MissingStationName { url: String },

    /// Page has no recognizable timetable
    #[error("timetable not found at {url}")]
    MissingTable { url: String },

    /// Every URL of a batch failed
    #[error("{operator}: no stations could be fetched")]
    NoStations { operator: String },
}
