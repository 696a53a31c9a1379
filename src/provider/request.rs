use super::{ChatRequest, Message};
use crate::auth::Credential;
use crate::error::ChatError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Serialize;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/responses";

/// Everything needed to put a request on the wire.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct ResponsesBody<'a> {
    model: &'a str,
    input: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

pub fn serialize(req: &ChatRequest, endpoint: &Url, credential: &Credential) -> Result<WireRequest, ChatError> {
    let body = ResponsesBody {
        model: &req.model,
        input: req.messages(),
        stream: req.stream,
    };
    let body = serde_json::to_vec(&body).map_err(|e| ChatError::Parse(e.to_string()))?;

    Ok(WireRequest {
        url: endpoint.clone(),
        headers: headers(credential)?,
        body,
    })
}

fn headers(credential: &Credential) -> Result<HeaderMap, ChatError> {
    let mut h = HeaderMap::new();
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
        .map_err(|_| ChatError::InvalidCredential)?;
    auth.set_sensitive(true);
    h.insert(AUTHORIZATION, auth);
    Ok(h)
}
