//! Error type shared by every Duplo API call.
//!
//! All failures, whether they happen before a request is sent, on the wire, or
//! while interpreting a response, are reported as a single [`ClientError`].
//! The error keeps the originating URL, the HTTP status (or `-1` when there is
//! no meaningful status) and the response body parsed into a JSON map.

use serde_json::{Map, Value};

/// The key under which a human readable message is always present in
/// [`ClientError::response`].
pub const MESSAGE_KEY: &str = "Message";

/// Status used when no HTTP status applies to an error.
pub const NO_STATUS: i32 = -1;

/// Broad classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The client could not be constructed.
    Configuration,
    /// The request could not be built or its body could not be serialized.
    /// Nothing was sent.
    Request,
    /// A network-level failure: connection refused, timeout, body read error.
    Io,
    /// The server answered with an error status or an unexpected status.
    Http,
    /// The response body could not be decoded into the requested type.
    Decode,
    /// A body was returned where the API contract requires none.
    UnexpectedResponse,
    /// The retry decorator gave up after repeated rate-limit responses.
    RetriesExhausted,
    /// An error synthesized by a caller with [`ClientError::custom`].
    Custom,
}

/// An error returned by a Duplo API call.
///
/// # Examples
///
/// ```no_run
/// use duplo_sdk::{Client, ClientError};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Tenant {
///     #[serde(rename = "AccountName")]
///     account_name: String,
/// }
///
/// # async fn example() -> Result<(), ClientError> {
/// let client = Client::new("https://example.duplocloud.net", "token")?;
///
/// match client.get_api::<Tenant>("TenantGet", "adminproxy/GetTenantNames").await {
///     Ok(tenant) => println!("tenant: {}", tenant.account_name),
///     Err(e) if e.possible_missing_api() => eprintln!("endpoint missing? {}", e),
///     Err(e) => eprintln!("status {}: {:?}", e.status(), e.response().get("Message")),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct ClientError {
    kind: ErrorKind,
    message: String,
    status: i32,
    url: String,
    response: Map<String, Value>,
}

impl ClientError {
    fn with_message_map(
        kind: ErrorKind,
        status: i32,
        url: impl Into<String>,
        message: impl Into<String>,
        mut response: Map<String, Value>,
    ) -> Self {
        let message = message.into();
        if !response.contains_key(MESSAGE_KEY) {
            response.insert(MESSAGE_KEY.to_string(), Value::String(message.clone()));
        }
        Self {
            kind,
            message,
            status,
            url: url.into(),
            response,
        }
    }

    pub(crate) fn new(
        kind: ErrorKind,
        status: i32,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::with_message_map(kind, status, url, message, Map::new())
    }

    /// An error raised before the request could be sent.
    pub(crate) fn request(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Request, NO_STATUS, url, message)
    }

    /// A transport failure while talking to the server.
    pub(crate) fn io(url: impl Into<String>, err: &reqwest::Error) -> Self {
        Self::new(ErrorKind::Io, NO_STATUS, url, err.to_string())
    }

    /// An error status, with the body already read and optionally parsed.
    pub(crate) fn http(
        status: i32,
        url: impl Into<String>,
        message: impl Into<String>,
        response: Map<String, Value>,
    ) -> Self {
        Self::with_message_map(ErrorKind::Http, status, url, message, response)
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, NO_STATUS, "", message)
    }

    /// Creates an error that callers can return from their own code paths,
    /// for example to report a missing object as a 404.
    ///
    /// ```
    /// use duplo_sdk::ClientError;
    ///
    /// let err = ClientError::custom("not found", 404);
    /// assert!(err.possible_missing_api());
    /// assert_eq!(err.response()["Message"], "not found");
    /// ```
    pub fn custom(message: impl Into<String>, status: i32) -> Self {
        Self::new(ErrorKind::Custom, status, "", message)
    }

    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status, or `-1` when no HTTP status applies.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Returns the URL of the request that failed, or an empty string.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the response body as a JSON map.
    ///
    /// The map always contains a `"Message"` entry, even when the server sent
    /// no body or a body that was not JSON.
    pub fn response(&self) -> &Map<String, Value> {
        &self.response
    }

    /// Returns the `"Message"` entry of the response when it is a string.
    pub fn response_message(&self) -> Option<&str> {
        self.response.get(MESSAGE_KEY).and_then(Value::as_str)
    }

    /// Returns `true` if the failure suggests the endpoint does not exist on
    /// this server version (status 404 or 500).
    pub fn possible_missing_api(&self) -> bool {
        self.status == 404 || self.status == 500
    }
}

/// A specialized `Result` type for Duplo API calls.
pub type Result<T> = std::result::Result<T, ClientError>;
