//! Request descriptor types.

use http::{Method, StatusCode};

/// Describes a single Duplo API request.
///
/// The API name is a label used in logs and error messages only; it is never
/// sent to the server.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, PUT, DELETE).
    pub method: Method,

    /// Short name of the API being called, e.g. `TenantGet`.
    pub api_name: String,

    /// The request path, relative to the client's host.
    pub path: String,

    /// When set, any other status is treated as an error even if it is a
    /// success status.
    pub expected_status: Option<StatusCode>,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method, API name and path.
    pub fn new(method: Method, api_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            api_name: api_name.into(),
            path: path.into(),
            expected_status: None,
        }
    }

    /// Requires the response to carry exactly this status.
    pub fn with_expected_status(mut self, status: StatusCode) -> Self {
        self.expected_status = Some(status);
        self
    }

    /// The label used to prefix log lines and error messages, e.g.
    /// `getAPI TenantGet`.
    pub fn label(&self) -> String {
        format!(
            "{}API {}",
            self.method.as_str().to_lowercase(),
            self.api_name
        )
    }

    /// The label used by the retry decorator, e.g. `GET (TenantGet, v3/x)`.
    pub fn caller(&self) -> String {
        format!("{} ({}, {})", self.method, self.api_name, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        let metadata = RequestMetadata::new(Method::DELETE, "testAPI", "v3/things/1");
        assert_eq!(metadata.label(), "deleteAPI testAPI");
        assert_eq!(metadata.caller(), "DELETE (testAPI, v3/things/1)");
        assert!(metadata.expected_status.is_none());
    }

    #[test]
    fn test_expected_status() {
        let metadata =
            RequestMetadata::new(Method::POST, "x", "y").with_expected_status(StatusCode::CREATED);
        assert_eq!(metadata.expected_status, Some(StatusCode::CREATED));
    }
}
