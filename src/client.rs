//! HTTP transport for the Duplo API.
//!
//! The [`Client`] type is the main entry point for making API calls.
//! Use [`ClientBuilder`] to configure and create clients, or
//! [`Client::from_env`] to read the standard `duplo_host` / `duplo_token`
//! environment variables.

use crate::{
    error::{ErrorKind, NO_STATUS},
    metadata::RequestMetadata,
    rate_limit::RetryConf,
    response::{BodyError, ResponseBody},
    retry::{retry_api_call, RetryOnRateExceeded, RetryPredicate},
    ClientError, Result,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const USER_ACCOUNT_HEADER: &str = "DuploUser";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const HOST_ENV: &str = "duplo_host";
const HOST_ENV_UPPER: &str = "DUPLO_HOST";
const TOKEN_ENV: &str = "duplo_token";
const TOKEN_ENV_UPPER: &str = "DUPLO_TOKEN";
// Crate-specific knobs; the Terraform provider takes these from its own config.
const TIMEOUT_ENV: &str = "duplo_http_timeout";
const SSL_NO_VERIFY_ENV: &str = "duplo_ssl_no_verify";

const MISSING_CONFIG: &str =
    "missing provider config for 'duplo_token' 'duplo_host'. Not defined in environment var / main.tf";

// Responses of these APIs carry secrets and are never logged.
const SENSITIVE_APIS: [&str; 3] = ["K8SecretGetList", "SsmParameterGet", "SsmParameterList"];

/// A client for the Duplo REST API.
///
/// The client is cheap to clone and safe to share between tasks: it holds a
/// connection pool, the host URL and the bearer token, none of which change
/// after construction. Every request carries the same timeout.
///
/// # Examples
///
/// ```no_run
/// use duplo_sdk::{Client, NoContent};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize)]
/// struct CreateQueue {
///     #[serde(rename = "Name")]
///     name: String,
/// }
///
/// #[derive(Deserialize)]
/// struct Queue {
///     #[serde(rename = "Url")]
///     url: String,
/// }
///
/// # async fn example() -> Result<(), duplo_sdk::ClientError> {
/// let client = Client::new("https://example.duplocloud.net", "my-token")?;
///
/// // A body is expected back.
/// let queue: Queue = client
///     .post_api("TenantCreateSQS", "v3/subscriptions/t1/aws/sqs", &CreateQueue {
///         name: "jobs".to_string(),
///     })
///     .await?;
/// println!("queue url: {}", queue.url);
///
/// // No body is expected back; "null" or an empty body is accepted.
/// client
///     .delete_api::<NoContent>("TenantDeleteSQS", "v3/subscriptions/t1/aws/sqs/jobs")
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    host: String,
    bearer: String,
    user_account: Option<String>,
    retry_conf: RetryConf,
    retry_predicate: Box<dyn RetryPredicate>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client with default settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `host` or `token` is empty.
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().host(host).token(token).build()
    }

    /// Creates a client from the `duplo_host` and `duplo_token` environment
    /// variables. See [`ClientBuilder::from_env`].
    pub fn from_env() -> Result<Self> {
        ClientBuilder::from_env()?.build()
    }

    /// The host URL requests are sent to.
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// The retry settings used by the `*_with_retry` methods.
    pub fn retry_conf(&self) -> &RetryConf {
        &self.inner.retry_conf
    }

    /// Makes a single API call.
    ///
    /// This is the method the verb helpers delegate to. It serializes the
    /// body, sends the request with the authorization and content-type
    /// headers, checks the status and interprets the body as `Res`.
    ///
    /// # Errors
    ///
    /// * [`ErrorKind::Request`] if the body cannot be serialized or the request
    ///   cannot be built. Nothing is sent.
    /// * [`ErrorKind::Io`] on connection, timeout or body read failures.
    /// * [`ErrorKind::Http`] if the status is above 300, or differs from
    ///   `metadata.expected_status` when one is set.
    /// * [`ErrorKind::Decode`] or [`ErrorKind::UnexpectedResponse`] if the body
    ///   does not fit `Res`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use duplo_sdk::{metadata::RequestMetadata, Client, NoContent};
    /// use http::{Method, StatusCode};
    ///
    /// # async fn example() -> Result<(), duplo_sdk::ClientError> {
    /// let client = Client::new("https://example.duplocloud.net", "my-token")?;
    /// let metadata = RequestMetadata::new(Method::POST, "TenantRestart", "v3/subscriptions/t1/restart")
    ///     .with_expected_status(StatusCode::NO_CONTENT);
    /// client.call::<(), NoContent>(&metadata, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<Req, Res>(&self, metadata: &RequestMetadata, body: Option<&Req>) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: ResponseBody,
    {
        let label = metadata.label();
        let url = format!("{}/{}", self.inner.host, metadata.path);

        let payload = match body {
            Some(body) => match serde_json::to_string(body) {
                Ok(json) => Some(json),
                Err(e) => {
                    let message = format!("{}: cannot marshal request to JSON: {}", label, e);
                    tracing::debug!(api = %label, url = %url, "{}", message);
                    return Err(ClientError::request(url, message));
                }
            },
            None => None,
        };

        tracing::trace!(
            api = %label,
            url = %url,
            body = payload.as_deref().unwrap_or(""),
            "prepared request"
        );

        let mut request = self
            .inner
            .http_client
            .request(metadata.method.clone(), &url)
            .header(AUTHORIZATION, &self.inner.bearer)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);

        if let Some(user_account) = &self.inner.user_account {
            request = request.header(USER_ACCOUNT_HEADER, user_account);
        }

        if let Some(payload) = payload {
            request = request.body(payload);
        }

        let request = match request.build() {
            Ok(request) => request,
            Err(e) => {
                let message = format!("{}: cannot build request: {}", label, e);
                tracing::debug!(api = %label, url = %url, "{}", message);
                return Err(ClientError::request(url, message));
            }
        };

        // Older endpoints live outside /v3/ and return unhelpful 400/404s.
        let legacy = !request.url().path().starts_with("/v3/");

        let response = match self.inner.http_client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                let err = ClientError::io(&url, &e);
                tracing::debug!(api = %label, url = %url, error = %err, "request failed");
                return Err(err);
            }
        };

        let status = response.status();
        if status.as_u16() > 300 || metadata.expected_status.is_some_and(|s| s != status) {
            let err = response_error(&url, legacy, response).await;
            tracing::debug!(api = %label, status = err.status(), error = %err, "request failed");
            return Err(err);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(api = %label, url = %url, error = %e, "failed to read response body");
                return Err(ClientError::io(&url, &e));
            }
        };

        if SENSITIVE_APIS.iter().any(|api| label.contains(api)) {
            tracing::trace!(api = %label, status = status.as_u16(), "received response");
        } else {
            tracing::trace!(api = %label, status = status.as_u16(), body = %body, "received response");
        }

        Res::from_body(&label, &body).map_err(|e| {
            let (kind, message) = match e {
                BodyError::Decode(message) => (ErrorKind::Decode, message),
                BodyError::Unexpected(message) => (ErrorKind::UnexpectedResponse, message),
            };
            tracing::debug!(api = %label, "{}", message);
            ClientError::new(kind, NO_STATUS, url, message)
        })
    }

    /// Makes a GET request.
    ///
    /// Use [`NoContent`](crate::NoContent) as `Res` when the API returns no body.
    pub async fn get_api<Res>(&self, api_name: &str, path: &str) -> Result<Res>
    where
        Res: ResponseBody,
    {
        let metadata = RequestMetadata::new(Method::GET, api_name, path);
        self.call::<(), Res>(&metadata, None).await
    }

    /// Makes a DELETE request.
    pub async fn delete_api<Res>(&self, api_name: &str, path: &str) -> Result<Res>
    where
        Res: ResponseBody,
    {
        let metadata = RequestMetadata::new(Method::DELETE, api_name, path);
        self.call::<(), Res>(&metadata, None).await
    }

    /// Makes a POST request with a JSON body.
    pub async fn post_api<Req, Res>(&self, api_name: &str, path: &str, body: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: ResponseBody,
    {
        let metadata = RequestMetadata::new(Method::POST, api_name, path);
        self.call(&metadata, Some(body)).await
    }

    /// Makes a PUT request with a JSON body.
    pub async fn put_api<Req, Res>(&self, api_name: &str, path: &str, body: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: ResponseBody,
    {
        let metadata = RequestMetadata::new(Method::PUT, api_name, path);
        self.call(&metadata, Some(body)).await
    }

    /// Like [`call`](Self::call), but retried while the backend answers
    /// `"Rate exceeded"` (or whatever the configured predicate accepts).
    ///
    /// # Errors
    ///
    /// Any error the predicate does not retry is returned as soon as it
    /// occurs. When every attempt is used up the error has kind
    /// [`ErrorKind::RetriesExhausted`].
    pub async fn call_with_retry<Req, Res>(
        &self,
        metadata: &RequestMetadata,
        body: Option<&Req>,
    ) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: ResponseBody,
    {
        retry_api_call(
            &metadata.caller(),
            &self.inner.retry_conf,
            self.inner.retry_predicate.as_ref(),
            || self.call(metadata, body),
        )
        .await
    }

    /// GET with rate-limit retries.
    pub async fn get_api_with_retry<Res>(&self, api_name: &str, path: &str) -> Result<Res>
    where
        Res: ResponseBody,
    {
        let metadata = RequestMetadata::new(Method::GET, api_name, path);
        self.call_with_retry::<(), Res>(&metadata, None).await
    }

    /// DELETE with rate-limit retries.
    pub async fn delete_api_with_retry<Res>(&self, api_name: &str, path: &str) -> Result<Res>
    where
        Res: ResponseBody,
    {
        let metadata = RequestMetadata::new(Method::DELETE, api_name, path);
        self.call_with_retry::<(), Res>(&metadata, None).await
    }

    /// POST with rate-limit retries.
    pub async fn post_api_with_retry<Req, Res>(
        &self,
        api_name: &str,
        path: &str,
        body: &Req,
    ) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: ResponseBody,
    {
        let metadata = RequestMetadata::new(Method::POST, api_name, path);
        self.call_with_retry(&metadata, Some(body)).await
    }

    /// PUT with rate-limit retries.
    pub async fn put_api_with_retry<Req, Res>(
        &self,
        api_name: &str,
        path: &str,
        body: &Req,
    ) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: ResponseBody,
    {
        let metadata = RequestMetadata::new(Method::PUT, api_name, path);
        self.call_with_retry(&metadata, Some(body)).await
    }
}

/// Builds the error for a response with an error or unexpected status.
///
/// The body is read once. Its JSON form is kept when the server declared
/// `application/json`; the error message always embeds the raw text.
async fn response_error(url: &str, legacy: bool, response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));

    let (mut text, parsed) = match response.text().await {
        Ok(text) => {
            let parsed = if is_json {
                match serde_json::from_str::<Map<String, Value>>(&text) {
                    Ok(map) => map,
                    Err(e) => {
                        tracing::trace!(error = %e, body = %text, "failed to parse error response JSON");
                        Map::new()
                    }
                }
            } else {
                Map::new()
            };
            (text, parsed)
        }
        Err(e) => {
            tracing::trace!(error = %e, "failed to read error response body");
            ("(read of body failed)".to_string(), Map::new())
        }
    };

    if legacy && (status == 400 || status == 404) {
        text = format!("{}. Please verify object exists in duplocloud.", text);
    }

    let message = format!("url: {}, status: {}, message: {}", url, status, text);
    ClientError::http(i32::from(status), url, message, parsed)
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use duplo_sdk::{rate_limit::RetryConf, ClientBuilder};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), duplo_sdk::ClientError> {
/// let client = ClientBuilder::new()
///     .host("https://example.duplocloud.net")
///     .token("my-token")
///     .timeout(Duration::from_secs(20))
///     .retry_conf(RetryConf::builder().max_attempts(5).build())
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    host: Option<String>,
    token: Option<String>,
    user_account: Option<String>,
    timeout: Duration,
    accept_invalid_certs: bool,
    retry_conf: RetryConf,
    retry_predicate: Option<Box<dyn RetryPredicate>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            host: None,
            token: None,
            user_account: None,
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
            retry_conf: RetryConf::default(),
            retry_predicate: None,
        }
    }

    /// Creates a builder from environment variables.
    ///
    /// * `duplo_host`, else `DUPLO_HOST` - base URL of the Duplo API
    /// * `duplo_token`, else `DUPLO_TOKEN` - bearer token
    ///
    /// Two optional variables are specific to this crate and have no
    /// counterpart in other Duplo tooling:
    ///
    /// * `duplo_http_timeout` - request timeout in seconds, same as
    ///   [`timeout`](Self::timeout)
    /// * `duplo_ssl_no_verify` - `true` disables certificate checks, same as
    ///   [`danger_accept_invalid_certs`](Self::danger_accept_invalid_certs)
    ///
    /// An empty lower-case variable falls back to the upper-case one. Missing
    /// host or token are reported by [`build`](Self::build).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an optional variable is set to a
    /// value that cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::new();
        if let Some(host) = env_with_fallback(HOST_ENV, HOST_ENV_UPPER) {
            builder = builder.host(host);
        }
        if let Some(token) = env_with_fallback(TOKEN_ENV, TOKEN_ENV_UPPER) {
            builder = builder.token(token);
        }
        if let Ok(timeout) = std::env::var(TIMEOUT_ENV) {
            let secs = timeout.trim().parse::<u64>().map_err(|e| {
                ClientError::configuration(format!("invalid {} `{}`: {}", TIMEOUT_ENV, timeout, e))
            })?;
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Ok(no_verify) = std::env::var(SSL_NO_VERIFY_ENV) {
            let no_verify = no_verify.trim().parse::<bool>().map_err(|e| {
                ClientError::configuration(format!(
                    "invalid {} `{}`: {}",
                    SSL_NO_VERIFY_ENV, no_verify, e
                ))
            })?;
            builder = builder.danger_accept_invalid_certs(no_verify);
        }
        Ok(builder)
    }

    /// Sets the base URL of the Duplo API, e.g. `https://example.duplocloud.net`.
    ///
    /// Request paths are appended after a `/`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the bearer token sent with every request.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the user account sent in the `DuploUser` header.
    pub fn user_account(mut self, account: impl Into<String>) -> Self {
        self.user_account = Some(account.into());
        self
    }

    /// Sets the timeout applied to every request. Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disables TLS certificate verification.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Sets the retry settings used by the `*_with_retry` methods.
    pub fn retry_conf(mut self, conf: RetryConf) -> Self {
        self.retry_conf = conf;
        self
    }

    /// Sets a custom retry predicate.
    ///
    /// By default only `"Rate exceeded"` responses are retried.
    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the host or token is missing or empty,
    /// or if the HTTP client cannot be created.
    pub fn build(self) -> Result<Client> {
        let host = self.host.filter(|host| !host.is_empty());
        let token = self.token.filter(|token| !token.is_empty());
        let (host, token) = match (host, token) {
            (Some(host), Some(token)) => (host, token),
            _ => return Err(ClientError::configuration(MISSING_CONFIG)),
        };

        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| {
                ClientError::configuration(format!("failed to build HTTP client: {}", e))
            })?;

        let retry_predicate = self
            .retry_predicate
            .unwrap_or_else(|| Box::new(RetryOnRateExceeded));

        tracing::debug!(host = %host, timeout_secs = self.timeout.as_secs(), "created Duplo client");

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                host,
                bearer: format!("Bearer {}", token),
                user_account: self.user_account.filter(|account| !account.is_empty()),
                retry_conf: self.retry_conf,
                retry_predicate,
            }),
        })
    }
}

fn env_with_fallback(name: &str, fallback: &str) -> Option<String> {
    [name, fallback]
        .into_iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.is_empty())
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_host_or_token() {
        for (host, token) in [("", "t"), ("https://h", ""), ("", "")] {
            let err = Client::new(host, token).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            assert_eq!(err.status(), -1);
            assert_eq!(err.message(), MISSING_CONFIG);
        }

        let err = ClientBuilder::new().token("t").build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_builder_defaults() {
        let client = Client::new("https://h", "t").unwrap();
        assert_eq!(client.host(), "https://h");
        assert_eq!(client.retry_conf(), &RetryConf::default());
        assert_eq!(client.inner.bearer, "Bearer t");
        assert!(client.inner.user_account.is_none());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(HOST_ENV, "https://env-host");
        std::env::set_var(TOKEN_ENV, "env-token");
        std::env::set_var(TIMEOUT_ENV, "20");
        std::env::remove_var(SSL_NO_VERIFY_ENV);

        let builder = ClientBuilder::from_env().unwrap();
        assert_eq!(builder.timeout, Duration::from_secs(20));
        let client = builder.build().unwrap();
        assert_eq!(client.host(), "https://env-host");
        assert_eq!(client.inner.bearer, "Bearer env-token");

        std::env::set_var(TIMEOUT_ENV, "soon");
        let err = ClientBuilder::from_env().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        std::env::remove_var(TIMEOUT_ENV);

        // Upper-case names are used when the lower-case ones are unset or empty.
        std::env::remove_var(HOST_ENV);
        std::env::set_var(TOKEN_ENV, "");
        std::env::set_var(HOST_ENV_UPPER, "https://upper-host");
        std::env::set_var(TOKEN_ENV_UPPER, "upper-token");
        let client = Client::from_env().unwrap();
        assert_eq!(client.host(), "https://upper-host");
        assert_eq!(client.inner.bearer, "Bearer upper-token");

        // Lower-case names win when both are set.
        std::env::set_var(TOKEN_ENV, "lower-token");
        let client = Client::from_env().unwrap();
        assert_eq!(client.inner.bearer, "Bearer lower-token");

        std::env::remove_var(HOST_ENV_UPPER);
        std::env::remove_var(TOKEN_ENV_UPPER);
        std::env::remove_var(TOKEN_ENV);
        let err = Client::from_env().err().unwrap();
        assert_eq!(err.message(), MISSING_CONFIG);
    }
}
