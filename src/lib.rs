//! Relay a prompt to an LLM HTTP API and stream the reply into a host UI.
//!
//! The host owns a [`driver::Driver`], implements [`driver::Host`], and calls
//! [`driver::Driver::tick`] on its own timer. Network I/O happens on a
//! background thread per request; events cross back over an unbounded queue.

pub mod auth;
pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod history;
pub mod provider;
pub mod worker;

pub use driver::{Driver, Host, Phase, Submission};
pub use error::{ChatError, Severity};
