//! Bus resolver error types.

/// Errors from loading bus reference data or parsing a requested date.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Requested date could not be understood
    #[error("invalid date: {input}")]
    InvalidDate { input: String },

    /// Calendar key is not a `YYYY-MM-DD` date
    #[error("invalid calendar key: {key}")]
    InvalidCalendarKey { key: String },

    /// Reference data is not valid JSON for its type
    #[error("bus data error: {0}")]
    Data(#[from] serde_json::Error),
}
