//! HTTP bridge client - SSE subscription + POST send
//!
//! The subscription reconnects with exponential backoff and resumes from the
//! last seen event id, so consumers see at most duplicated events, never gaps.
//! The backoff and the silent-reconnect clock reset only once the bridge
//! delivers an event.

use async_stream::stream;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::{BackoffConfig, BridgeTransport, EnvelopeStream, InboundEnvelope};
use crate::crypto::KEY_LEN;
use crate::error::TransportError;

/// Default bridge message TTL in seconds
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Bridge transport over HTTP
#[derive(Clone)]
pub struct HttpBridge {
    client: Client,
    backoff: BackoffConfig,
    max_silent_reconnect: Option<Duration>,
    ttl_secs: u64,
}

impl Default for HttpBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBridge {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client, backoff: BackoffConfig::default(), max_silent_reconnect: None, ttl_secs: DEFAULT_TTL_SECS }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self { self.backoff = backoff; self }
    /// Give up after the bridge has been unreachable this long (`None`: never)
    pub fn with_max_silent_reconnect(mut self, limit: Option<Duration>) -> Self { self.max_silent_reconnect = limit; self }
    pub fn with_ttl(mut self, secs: u64) -> Self { self.ttl_secs = secs; self }
}

fn endpoint(bridge_url: &str, path: &str) -> Result<Url, TransportError> {
    let base = bridge_url.trim_end_matches('/');
    Url::parse(&format!("{base}/{path}"))
        .map_err(|e| TransportError::InvalidUrl(format!("{bridge_url}: {e}")))
}

fn http_error(e: reqwest::Error) -> TransportError {
    TransportError::Http(e.to_string())
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status { status: status.as_u16(), body })
}

async fn open_events(
    client: &Client,
    bridge_url: &str,
    client_id: &str,
    last_event_id: Option<&str>,
) -> Result<Response, TransportError> {
    let mut url = endpoint(bridge_url, "events")?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", client_id);
        if let Some(id) = last_event_id {
            query.append_pair("last_event_id", id);
        }
    }
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(http_error)?;
    check_status(response).await
}

#[async_trait]
impl BridgeTransport for HttpBridge {
    fn subscribe(
        &self,
        bridge_url: &str,
        client_id: &[u8; KEY_LEN],
        last_event_id: Option<String>,
    ) -> EnvelopeStream {
        let client = self.client.clone();
        let backoff = self.backoff;
        let max_silent = self.max_silent_reconnect;
        let bridge_url = bridge_url.to_string();
        let client_id = hex::encode(client_id);

        Box::pin(stream! {
            let mut last_event_id = last_event_id;
            let mut attempt: u32 = 0;
            let mut silent_since: Option<Instant> = None;

            loop {
                match open_events(&client, &bridge_url, &client_id, last_event_id.as_deref()).await {
                    Ok(response) => {
                        debug!(bridge = %bridge_url, resume = ?last_event_id, "bridge subscription open");

                        let mut events = Box::pin(response.bytes_stream().eventsource());
                        while let Some(event) = events.next().await {
                            let event = match event {
                                Ok(event) => event,
                                Err(e) => {
                                    warn!(bridge = %bridge_url, error = %e, "bridge stream error");
                                    break;
                                }
                            };
                            // A 200 that closes before any event is still silence
                            attempt = 0;
                            silent_since = None;
                            if !event.id.is_empty() {
                                last_event_id = Some(event.id.clone());
                            }
                            if event.event == "heartbeat" || event.data.trim().is_empty() {
                                continue;
                            }
                            match InboundEnvelope::from_bridge_json(last_event_id.clone(), &event.data) {
                                Ok(envelope) => yield Ok(envelope),
                                Err(e) => warn!(error = %e, "dropping malformed bridge event"),
                            }
                        }
                        debug!(bridge = %bridge_url, "bridge subscription closed");
                    }
                    Err(e) => warn!(bridge = %bridge_url, error = %e, attempt, "bridge subscribe failed"),
                }

                let since = *silent_since.get_or_insert_with(Instant::now);
                if let Some(limit) = max_silent {
                    let elapsed = since.elapsed();
                    if elapsed >= limit {
                        yield Err(TransportError::ReconnectExhausted { elapsed });
                        break;
                    }
                }

                let delay = backoff.delay(attempt);
                attempt = attempt.saturating_add(1);
                debug!(?delay, attempt, "bridge reconnect scheduled");
                tokio::time::sleep(delay).await;
            }
        })
    }

    async fn send(
        &self,
        bridge_url: &str,
        from: &[u8; KEY_LEN],
        to: &[u8; KEY_LEN],
        message: &[u8],
        topic: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut url = endpoint(bridge_url, "message")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &hex::encode(from));
            query.append_pair("to", &hex::encode(to));
            query.append_pair("ttl", &self.ttl_secs.to_string());
            if let Some(topic) = topic {
                query.append_pair("topic", topic);
            }
        }

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/plain")
            .body(BASE64.encode(message))
            .send()
            .await
            .map_err(http_error)?;
        check_status(response).await?;
        Ok(())
    }
}
