use crate::auth::Credential;
use crate::channel::CancelFlag;
use crate::error::ChatError;
use futures_core::future::BoxFuture;
use serde::Serialize;

/// One prompt/response exchange. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub stream: bool,
}

impl ChatRequest {
    /// Trim the inputs and reject an empty prompt before anything else happens.
    pub fn build(
        model: &str,
        system_prompt: Option<&str>,
        user_prompt: &str,
        stream: bool,
    ) -> Result<Self, ChatError> {
        let user_prompt = user_prompt.trim();
        if user_prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }

        let system_prompt = system_prompt
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            model: model.trim().to_string(),
            system_prompt,
            user_prompt: user_prompt.to_string(),
            stream,
        })
    }

    /// Role-tagged messages: an optional leading system message, then the user prompt.
    pub fn messages(&self) -> Vec<Message<'_>> {
        let mut out = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            out.push(Message {
                role: Role::System,
                content: system,
            });
        }
        out.push(Message {
            role: Role::User,
            content: &self.user_prompt,
        });
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message<'a> {
    pub role: Role,
    pub content: &'a str,
}

/// Progress reported by a background request, in arrival order.
///
/// Any number of `Delta`s, at most one `Error`, and always exactly one
/// trailing `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Error(String),
    Done,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}

/// Sink for stream events.
pub type Emit<'a> = &'a mut (dyn FnMut(StreamEvent) + Send);

/// A backend that can answer a [`ChatRequest`].
///
/// `stream` never fails: every problem is reported as one `Error` event and
/// the call always finishes by emitting `Done`.
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Wait for the full response and return its text.
    fn call<'a>(
        &'a self,
        req: &'a ChatRequest,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<String, ChatError>>;

    /// Stream the response as events, checking `cancel` before each line.
    fn stream<'a>(
        &'a self,
        req: &'a ChatRequest,
        credential: &'a Credential,
        cancel: &'a CancelFlag,
        emit: Emit<'a>,
    ) -> BoxFuture<'a, ()>;
}
