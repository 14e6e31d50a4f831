use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use url::Url;

use crate::dispatch::NotificationPayload;

/// Delivery collaborator: one call per attempt. `Ok` carries the provider's
/// reference identifier; any non-success response comes back as `Err` so the
/// dispatcher can record a failed outcome instead of aborting the batch.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn deliver(&self, recipient: &str, payload: &NotificationPayload) -> Result<String>;
}

/// HTTP JSON transport. Posts `{ to, reply_to, targets, ... }` to a single
/// provider endpoint and expects `{ "id": "..." }` back on success.
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[derive(Serialize)]
struct DeliveryRequest<'a> {
    to: &'a str,
    #[serde(flatten)]
    payload: &'a NotificationPayload,
}

impl Transport for HttpTransport {
    async fn deliver(&self, recipient: &str, payload: &NotificationPayload) -> Result<String> {
        let request = DeliveryRequest {
            to: recipient,
            payload,
        };

        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = resp.status();
        let body = resp.text().await.context("reading provider response")?;
        reference_from_response(status, &body)
    }
}

/// Map a provider response to the reference id it carries. Any non-success
/// status or malformed body is an `Err`, which the dispatcher records as a
/// failed outcome for that one target.
fn reference_from_response(status: StatusCode, body: &str) -> Result<String> {
    if !status.is_success() {
        bail!("provider returned {}: {}", status, body.trim());
    }

    let value: serde_json::Value =
        serde_json::from_str(body).context("decoding provider response")?;
    match value.get("id").and_then(|v| v.as_str()) {
        Some(id) => Ok(id.to_string()),
        None => bail!("provider response missing reference id: {}", body.trim()),
    }
}
