//! Lists the tenants visible to the configured token.
//!
//! ```sh
//! duplo_host=https://example.duplocloud.net duplo_token=... \
//!     RUST_LOG=duplo_sdk=trace cargo run --example basic_call
//! ```

use duplo_sdk::{Client, ClientError};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Tenant {
    #[serde(rename = "TenantId")]
    tenant_id: String,
    #[serde(rename = "AccountName")]
    account_name: String,
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = Client::from_env()?;

    match client
        .get_api_with_retry::<Vec<Tenant>>("TenantGetList", "admin/GetTenantsForUser")
        .await
    {
        Ok(tenants) => {
            for tenant in tenants {
                println!("{:<40} {}", tenant.tenant_id, tenant.account_name);
            }
        }
        Err(e) if e.possible_missing_api() => {
            eprintln!("endpoint not available on this server: {}", e);
        }
        Err(e) => return Err(e),
    }

    Ok(())
}
