use super::request;
use super::sse::{classify, LineBuffer, SseLine};
use super::{ChatRequest, Emit, StreamEvent, Transport};
use crate::auth::Credential;
use crate::channel::CancelFlag;
use crate::error::ChatError;
use futures_core::future::BoxFuture;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tokio_stream::StreamExt;

/// Bound on a whole non-streaming call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound on streaming call setup (until response headers arrive).
pub const STREAM_SETUP_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI Responses API client.
#[derive(Debug, Clone)]
pub struct OpenAiTransport {
    endpoint: Url,
}

impl OpenAiTransport {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    // Each worker runs on its own short-lived runtime, so connections are not
    // pooled across requests.
    fn http(&self, connect_timeout: Duration) -> Result<reqwest::Client, ChatError> {
        reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(ChatError::network)
    }

    async fn call_inner(&self, req: &ChatRequest, credential: &Credential) -> Result<String, ChatError> {
        let mut req = req.clone();
        req.stream = false;
        let wire = request::serialize(&req, &self.endpoint, credential)?;
        let resp = self
            .http(CALL_TIMEOUT)?
            .post(wire.url)
            .headers(wire.headers)
            .body(wire.body)
            .timeout(CALL_TIMEOUT)
            .send()
            .await
            .map_err(ChatError::network)?;

        let status = resp.status();
        let body = resp.text().await.map_err(ChatError::network)?;
        if !status.is_success() {
            return Err(ChatError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ResponsesOutput =
            serde_json::from_str(&body).map_err(|e| ChatError::Parse(e.to_string()))?;
        extract_text(&parsed).ok_or(ChatError::EmptyOutput)
    }

    async fn stream_inner<F>(
        &self,
        req: &ChatRequest,
        credential: &Credential,
        cancel: &CancelFlag,
        emit: &mut F,
    ) -> Result<(), ChatError>
    where
        F: FnMut(StreamEvent) + Send + ?Sized,
    {
        let mut req = req.clone();
        req.stream = true;
        let wire = request::serialize(&req, &self.endpoint, credential)?;

        let send = self
            .http(STREAM_SETUP_TIMEOUT)?
            .post(wire.url)
            .headers(wire.headers)
            .body(wire.body)
            .send();
        let resp = match tokio::time::timeout(STREAM_SETUP_TIMEOUT, send).await {
            Ok(r) => r.map_err(ChatError::network)?,
            Err(_) => {
                return Err(ChatError::Network {
                    reason: format!("request timed out after {}s", STREAM_SETUP_TIMEOUT.as_secs()),
                })
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = body_or_reason(resp.text().await);
            return Err(ChatError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let mut body = Box::pin(resp.bytes_stream());
        let mut lines = LineBuffer::new();

        loop {
            let (batch, exhausted) = match body.next().await {
                Some(Ok(bytes)) => (lines.push(&bytes), false),
                Some(Err(e)) => return Err(ChatError::network(e)),
                None => (lines.finish().into_iter().collect(), true),
            };

            for line in batch {
                if cancel.is_cancelled() {
                    tracing::debug!("stream cancelled");
                    return Ok(());
                }
                tracing::trace!(%line, "sse line");
                match classify(&line) {
                    SseLine::Skip => {}
                    SseLine::TextDelta(text) => emit(StreamEvent::Delta(text)),
                    SseLine::Done => return Ok(()),
                    SseLine::Failed(msg) => return Err(ChatError::Stream(msg)),
                }
            }

            if exhausted {
                return Ok(());
            }
        }
    }
}

impl Transport for OpenAiTransport {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn call<'a>(
        &'a self,
        req: &'a ChatRequest,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<String, ChatError>> {
        Box::pin(self.call_inner(req, credential))
    }

    fn stream<'a>(
        &'a self,
        req: &'a ChatRequest,
        credential: &'a Credential,
        cancel: &'a CancelFlag,
        emit: Emit<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(e) = self.stream_inner(req, credential, cancel, &mut *emit).await {
                tracing::warn!(error = %e, "stream failed");
                emit(StreamEvent::Error(e.to_string()));
            }
            emit(StreamEvent::Done);
        })
    }
}

/// The body of an error response, or why it could not be read.
fn body_or_reason<E: std::fmt::Display>(body: Result<String, E>) -> String {
    body.unwrap_or_else(|e| format!("<failed to read response body: {e}>"))
}

#[derive(Debug, Deserialize)]
struct ResponsesOutput {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn extract_text(r: &ResponsesOutput) -> Option<String> {
    // Concatenate every output_text part of every output item.
    let mut out = String::new();
    for part in r.output.iter().flat_map(|item| &item.content) {
        if part.kind != "output_text" {
            continue;
        }
        if let Some(t) = &part.text {
            out.push_str(t);
        }
    }
    if out.is_empty() { None } else { Some(out) }
}
