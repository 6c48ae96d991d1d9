//! Interpretation of successful response bodies.
//!
//! The Duplo backend signals "nothing to return" inconsistently: sometimes an
//! empty body with 204, sometimes a literal `null` with 200. A caller that
//! expects no body asks for [`NoContent`], and both shapes are accepted. Any
//! other type implementing `Deserialize` is decoded from the JSON body.

use serde::de::DeserializeOwned;

/// A type a successful response body can be turned into.
///
/// Implemented for every [`DeserializeOwned`] type and for [`NoContent`].
pub trait ResponseBody: Sized {
    /// Builds the value from the raw body text.
    ///
    /// `label` is the `<verb>API <name>` prefix used in the error message.
    fn from_body(label: &str, body: &str) -> Result<Self, BodyError>;
}

/// Why a successful response body was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    /// The body was not valid JSON for the requested type.
    Decode(String),
    /// A body was present although none was expected.
    Unexpected(String),
}

/// Marker for calls where the API returns no meaningful body.
///
/// An empty body, `null` or an empty JSON string are accepted; anything else
/// is reported as an unexpected response.
///
/// # Examples
///
/// ```no_run
/// use duplo_sdk::{Client, NoContent};
///
/// # async fn example() -> Result<(), duplo_sdk::ClientError> {
/// let client = Client::new("https://example.duplocloud.net", "token")?;
/// client
///     .delete_api::<NoContent>("TenantDeleteQueue", "v3/subscriptions/t1/aws/sqs/q1")
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoContent;

/// Returns `true` for the bodies the backend uses to mean "no content".
pub fn is_elided(body: &str) -> bool {
    body.is_empty() || body == "null" || body == "\"\""
}

impl ResponseBody for NoContent {
    fn from_body(label: &str, body: &str) -> Result<Self, BodyError> {
        tracing::trace!(api = %label, "expected null response");
        if is_elided(body) {
            Ok(NoContent)
        } else {
            Err(BodyError::Unexpected(format!(
                "{}: received unexpected response: {}",
                label, body
            )))
        }
    }
}

impl<T> ResponseBody for T
where
    T: DeserializeOwned,
{
    fn from_body(label: &str, body: &str) -> Result<Self, BodyError> {
        serde_json::from_str(body).map_err(|e| {
            BodyError::Decode(format!(
                "{}: cannot unmarshal response from JSON: {}",
                label, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Foo {
        foo: String,
    }

    #[test]
    fn test_elided_bodies() {
        for body in ["", "null", "\"\""] {
            assert_eq!(NoContent::from_body("getAPI x", body), Ok(NoContent));
        }
    }

    #[test]
    fn test_unexpected_body() {
        let err = NoContent::from_body("deleteAPI testAPI", "not JSON").unwrap_err();
        assert_eq!(
            err,
            BodyError::Unexpected("deleteAPI testAPI: received unexpected response: not JSON".into())
        );

        // Valid JSON is still unexpected when no body was asked for.
        assert!(NoContent::from_body("getAPI x", "{}").is_err());
    }

    #[test]
    fn test_typed_body() {
        let foo = Foo::from_body("getAPI x", r#"{"foo":"bar"}"#).unwrap();
        assert_eq!(foo.foo, "bar");
    }

    #[test]
    fn test_empty_body_is_not_elided_for_typed_targets() {
        match Foo::from_body("getAPI x", "") {
            Err(BodyError::Decode(msg)) => {
                assert!(msg.starts_with("getAPI x: cannot unmarshal response from JSON:"))
            }
            other => panic!("Expected Decode error, got {:?}", other),
        }
    }
}
