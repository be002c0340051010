use thiserror::Error;

/// Tracker error types.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("a tracking session is already active")]
    AlreadyActive,

    #[error("HTTPS is required for location tracking")]
    InsecureContext,

    #[error("geolocation is not available on this device")]
    NoGeolocation,

    #[error("embedded browsers are not supported, open the page in a full browser")]
    EmbeddedBrowser,

    #[error("location permission is denied, enable it in the browser settings")]
    PermissionDenied,

    #[error("session start failed: {0}")]
    SessionStart(String),

    #[error("connection timeout")]
    ConnectTimeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("reconnect limit reached, start a new session")]
    ReconnectLimit,

    #[error("channel is not open")]
    ChannelNotOpen,

    #[error("api error: {0}")]
    Api(#[from] ApiError),
}

/// Errors from the session-lifecycle HTTP endpoints.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("response missing session id")]
    MissingSessionId,

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Request(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
