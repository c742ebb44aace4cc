//! Error type shared by the query builder, transport, and enrichment driver.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Detail strings the service uses to report a lookup it could not complete.
pub const SERVICE_DETAILS: &[&str] = &[
    "GeographyException",
    "IncompleteDataException",
    "NominatimQueryException",
    "ServerError",
];

#[derive(Error, Debug)]
pub enum ClientError {
    /// Both a free-form query and structured fields were supplied.
    #[error("specify free-form or structured address, not both")]
    ConflictingInput,

    /// Neither a free-form query nor any structured field was supplied.
    #[error("must include either a free-form query or some combination of address1, address2, city, state and zip_code")]
    MissingInput,

    /// A column selector names a column the table does not have.
    #[error("column not found in table: {0}")]
    UnknownColumn(String),

    #[error("email address is not valid: {0}")]
    InvalidEmail(String),

    /// Missing API key, or the service rejected the one we sent.
    #[error("authentication error: {0}")]
    Security(String),

    /// Network failure or a non-2xx response without a recognised detail.
    #[error("transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The payload could not be read as the expected schema.
    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    /// The service answered but reported that it could not resolve the address.
    #[error("service could not complete lookup: {0}")]
    Service(String),

    /// A row failed while enriching a table with `FailurePolicy::Abort`.
    #[error("row {row} failed: {source}")]
    Row {
        row: usize,
        #[source]
        source: Box<ClientError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Errors caused by the shape of the caller's input, raised before any request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::ConflictingInput | ClientError::MissingInput | ClientError::UnknownColumn(_)
        )
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        ClientError::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Maps a service `detail` string to `Service` when it is one we know.
    pub(crate) fn from_detail(detail: &str) -> Option<Self> {
        SERVICE_DETAILS
            .contains(&detail)
            .then(|| ClientError::Service(detail.to_string()))
    }
}
