use super::{ChatRequest, Emit, StreamEvent, Transport};
use crate::auth::Credential;
use crate::channel::CancelFlag;
use crate::error::ChatError;
use futures_core::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Offline transport that drips a canned reply. Used by `--provider stub` and tests.
#[derive(Debug, Default)]
pub struct StubTransport {
    parts: Option<Vec<String>>,
    delay: Duration,
    failure: Option<ChatError>,
    calls: AtomicUsize,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(120),
            ..Self::default()
        }
    }

    /// Reply with exactly these fragments instead of echoing the prompt.
    pub fn with_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: Some(parts.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Fail every request with `err` after emitting any configured parts.
    pub fn failing(mut self, err: ChatError) -> Self {
        self.failure = Some(err);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of requests started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn reply(&self, req: &ChatRequest) -> Vec<String> {
        if let Some(parts) = &self.parts {
            return parts.clone();
        }
        vec![
            format!("[stub provider]\nmodel: {}\n\n", req.model),
            "You said: ".to_string(),
            req.user_prompt.clone(),
        ]
    }
}

impl Transport for StubTransport {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn call<'a>(
        &'a self,
        req: &'a ChatRequest,
        _credential: &'a Credential,
    ) -> BoxFuture<'a, Result<String, ChatError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            if let Some(err) = &self.failure {
                return Err(err.clone());
            }
            Ok(self.reply(req).concat())
        })
    }

    fn stream<'a>(
        &'a self,
        req: &'a ChatRequest,
        _credential: &'a Credential,
        cancel: &'a CancelFlag,
        emit: Emit<'a>,
    ) -> BoxFuture<'a, ()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            for part in self.reply(req) {
                tokio::time::sleep(self.delay).await;
                if cancel.is_cancelled() {
                    emit(StreamEvent::Done);
                    return;
                }
                emit(StreamEvent::Delta(part));
            }
            if let Some(err) = &self.failure {
                emit(StreamEvent::Error(err.to_string()));
            }
            emit(StreamEvent::Done);
        })
    }
}
