//! HTTP transport against the assistant server

use super::{sse, NotificationStream, Transport, TransportError, TurnStream};
use crate::config::ClientConfig;
use crate::protocol::{
    ChatRequest, ConversationLookup, ConversationRecord, ConversationSummary, DeleteReply,
    NotificationEvent, TurnEvent,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder, Response};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-api-key";

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timezone: String,
    request_timeout: Duration,
    reconnect_delay: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| TransportError::auth(format!("API key is not a valid header value: {e}")))?;
            headers.insert(API_KEY_HEADER, value);
        }

        // No overall timeout: it would also cut long-lived event streams.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timezone: config.timezone.clone(),
            request_timeout: config.request_timeout,
            reconnect_delay: config.reconnect_delay,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{path}", self.base_url))
    }

    fn event_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path)
            .header(ACCEPT, "text/event-stream")
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = checked(builder.timeout(self.request_timeout).send().await?).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Turn a non-success response into a classified error carrying its body.
async fn checked(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::from_status(status, &body))
}

#[async_trait]
impl Transport for HttpTransport {
    fn send_turn(&self, message: &str, conversation_id: Option<i64>) -> TurnStream {
        let mut builder = self
            .event_request(Method::POST, "/chat/stream")
            .json(&ChatRequest {
                message,
                timezone: &self.timezone,
            });
        if let Some(id) = conversation_id {
            builder = builder.query(&[("conversation_id", id)]);
        }

        stream! {
            let response = match builder.send().await {
                Ok(response) => checked(response).await,
                Err(e) => Err(TransportError::from(e)),
            };
            match response {
                Ok(response) => {
                    for await event in sse::events::<TurnEvent>(response) {
                        yield event;
                    }
                }
                Err(e) => yield Err(e),
            }
        }
        .boxed()
    }

    fn notification_feed(&self) -> NotificationStream {
        let transport = self.clone();

        stream! {
            loop {
                let connected = match transport
                    .event_request(Method::GET, "/notifications/stream")
                    .send()
                    .await
                {
                    Ok(response) => checked(response).await,
                    Err(e) => Err(TransportError::from(e)),
                };
                match connected {
                    Ok(response) => {
                        tracing::debug!("Notification feed connected");
                        for await event in sse::events::<NotificationEvent>(response) {
                            yield event;
                        }
                        tracing::debug!("Notification feed closed by server");
                    }
                    Err(e) => yield Err(e),
                }
                tokio::time::sleep(transport.reconnect_delay).await;
            }
        }
        .boxed()
    }

    async fn check_health(&self) -> Result<(), TransportError> {
        let response = self
            .request(Method::GET, "/health")
            .timeout(self.request_timeout)
            .send()
            .await?;
        checked(response).await.map(|_| ())
    }

    async fn get_conversation(&self, id: i64) -> Result<ConversationRecord, TransportError> {
        let lookup: ConversationLookup = self
            .fetch_json(self.request(Method::GET, &format!("/chat/conversations/{id}")))
            .await?;
        match lookup {
            ConversationLookup::Found(record) => Ok(record),
            ConversationLookup::Missing { error } => Err(TransportError::not_found(error)),
        }
    }

    async fn list_conversations(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, TransportError> {
        self.fetch_json(
            self.request(Method::GET, "/chat/conversations")
                .query(&[("limit", limit), ("offset", offset)]),
        )
        .await
    }

    async fn delete_conversation(&self, id: i64) -> Result<(), TransportError> {
        let reply: DeleteReply = self
            .fetch_json(self.request(Method::DELETE, &format!("/chat/conversations/{id}")))
            .await?;
        match reply {
            DeleteReply::Deleted { success: true, .. } => Ok(()),
            DeleteReply::Deleted { success: false, message } => Err(TransportError::unknown(
                message.unwrap_or_else(|| format!("Server refused to delete conversation {id}")),
            )),
            DeleteReply::Missing { error } => Err(TransportError::not_found(error)),
        }
    }
}
