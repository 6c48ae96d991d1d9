//! # duplo-sdk - HTTP transport for the Duplo control-plane API
//!
//! This crate provides the layer every Duplo resource call goes through:
//! request construction, status checks, response interpretation, a single
//! error type and rate-limit aware retries.
//!
//! ## Quick Start
//!
//! ```no_run
//! use duplo_sdk::{encode_path_param, Client, NoContent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Tenant {
//!     #[serde(rename = "TenantId")]
//!     tenant_id: String,
//!     #[serde(rename = "AccountName")]
//!     account_name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct ApiEvent {
//!     #[serde(rename = "Path")]
//!     path: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), duplo_sdk::ClientError> {
//!     let client = Client::new("https://example.duplocloud.net", "my-token")?;
//!
//!     // A JSON body is expected back.
//!     let tenants: Vec<Tenant> = client.get_api("TenantGetList", "admin/GetTenantsForUser").await?;
//!     for tenant in &tenants {
//!         println!("{} {}", tenant.tenant_id, tenant.account_name);
//!     }
//!
//!     // No body is expected back, and throttled calls are retried.
//!     let path = format!(
//!         "v3/subscriptions/t1/aws/apigateway/events/gw1/GET/{}",
//!         encode_path_param("/orders/{id}")
//!     );
//!     client
//!         .put_api_with_retry::<_, NoContent>("ApiEventUpdate", &path, &ApiEvent {
//!             path: "/orders/{id}".to_string(),
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Response bodies
//!
//! Any `Deserialize` type can be requested as the response. When an API
//! returns nothing, ask for [`NoContent`]: an empty body or `null` is then a
//! success and anything else is an error, whatever the status.
//!
//! ## Errors
//!
//! Every failure is a [`ClientError`] carrying the message, the HTTP status
//! (`-1` when there is none), the request URL and the response body parsed
//! into a JSON map that always has a `"Message"` entry.
//!
//! ## Retries
//!
//! The `*_with_retry` methods retry only when the backend answers with the
//! message `"Rate exceeded"`, sleeping a randomized, growing delay before each
//! attempt, for at most nine attempts by default. See [`rate_limit::RetryConf`].

mod client;
mod error;
mod escape;
pub mod metadata;
pub mod rate_limit;
mod response;
pub mod retry;

pub use client::{Client, ClientBuilder};
pub use error::{ClientError, ErrorKind, Result, MESSAGE_KEY};
pub use escape::encode_path_param;
pub use response::{is_elided, BodyError, NoContent, ResponseBody};
pub use retry::{retry_api_call, RetryPredicate};
