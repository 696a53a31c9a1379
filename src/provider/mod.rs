#[cfg(feature = "openai")]
pub mod openai;
pub mod request;
pub mod sse;
pub mod stub;
mod types;

pub use types::{ChatRequest, Emit, Message, Role, StreamEvent, Transport};
