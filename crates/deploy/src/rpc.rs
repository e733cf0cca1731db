//! Shared utilities for Ethereum JSON-RPC endpoints.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default timeout for a single RPC request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
/// A `null` result deserializes into `None` when `T` is an `Option`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` every `interval` until it yields a value.
///
/// `Ok(None)` means "not yet". Errors are logged and the poll continues, since a dropped
/// request says nothing about the awaited event. There is no deadline here: callers bound
/// the wait themselves.
pub async fn poll_until<T, F, Fut>(name: &str, interval: Duration, check_fn: F) -> T
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = std::time::Instant::now();

    loop {
        match check_fn().await {
            Ok(Some(value)) => {
                tracing::debug!(
                    what = %name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Poll condition met"
                );
                return value;
            }
            Ok(None) => tracing::trace!(what = %name, "Not ready yet, polling again..."),
            Err(err) => tracing::warn!(what = %name, error = %err, "Poll failed, retrying..."),
        }

        tokio::time::sleep(interval).await;
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(quantity: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(quantity.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {}", quantity))
}
