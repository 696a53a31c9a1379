//! Foreground state machine, polled by the host on a fixed tick.

use crate::auth::{self, EnvLookup, KeyPreferences};
use crate::error::{ChatError, Severity};
use crate::history::History;
use crate::provider::{ChatRequest, StreamEvent, Transport};
use crate::worker::Worker;
use std::sync::Arc;
use std::time::Duration;

/// How often the host should call [`Driver::tick`] while a request is in flight.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// The embedding UI, as seen by the driver.
pub trait Host {
    /// Start calling [`Driver::tick`] every `interval`.
    fn register_tick(&mut self, interval: Duration);

    /// Stop the recurring tick.
    fn unregister_tick(&mut self);

    /// Start routing the user's cancel gesture (Esc, Ctrl-C) to [`Driver::cancel`].
    fn register_cancel(&mut self) {}

    fn unregister_cancel(&mut self) {}

    fn notify(&mut self, severity: Severity, message: &str);

    fn buffer_appended(&mut self, _delta: &str) {}

    fn buffer_replaced(&mut self, _text: &str) {}

    fn history_appended(&mut self, _prompt: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitted,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl Phase {
    /// Whether a new submission would be accepted.
    pub fn is_at_rest(self) -> bool {
        !matches!(self, Phase::Submitted | Phase::Streaming)
    }
}

/// What the user asked for.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub model: String,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub stream: bool,
}

struct InFlight {
    worker: Worker,
    error: Option<String>,
}

pub struct Driver {
    transport: Arc<dyn Transport>,
    keys: KeyPreferences,
    env: EnvLookup,
    phase: Phase,
    response: String,
    history: History,
    in_flight: Option<InFlight>,
    hooks_registered: bool,
}

impl Driver {
    pub fn new(transport: Arc<dyn Transport>, keys: KeyPreferences) -> Self {
        Self {
            transport,
            keys,
            env: auth::process_env,
            phase: Phase::Idle,
            response: String::new(),
            history: History::new(),
            in_flight: None,
            hooks_registered: false,
        }
    }

    /// Replace the environment used for API key lookup.
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn set_keys(&mut self, keys: KeyPreferences) {
        self.keys = keys;
    }

    /// Validate and start a request.
    ///
    /// Failures are already reported to `host` when this returns `Err`; the
    /// error is handed back for callers that want an exit status.
    pub fn submit(&mut self, host: &mut dyn Host, submission: Submission) -> Result<(), ChatError> {
        let res = self.try_submit(host, submission);
        if let Err(e) = &res {
            tracing::warn!(error = %e, "submission rejected");
            match e {
                ChatError::EmptyPrompt | ChatError::Busy => {}
                _ => self.overwrite_with_error(host, &e.to_string()),
            }
            host.notify(e.severity(), &e.to_string());
        }
        res
    }

    fn try_submit(&mut self, host: &mut dyn Host, s: Submission) -> Result<(), ChatError> {
        if !self.phase.is_at_rest() {
            return Err(ChatError::Busy);
        }

        let req = ChatRequest::build(&s.model, s.system_prompt.as_deref(), &s.prompt, s.stream)?;
        let credential = self
            .keys
            .resolve_with(self.env)
            .ok_or(ChatError::MissingCredential)?;

        tracing::info!(
            model = %req.model,
            stream = req.stream,
            transport = self.transport.name(),
            key = %credential.masked(),
            "submitting request"
        );

        self.phase = Phase::Submitted;
        self.response.clear();
        host.buffer_replaced("");
        self.history.push(req.user_prompt.clone());
        host.history_appended(&req.user_prompt);

        let worker = match Worker::spawn(self.transport.clone(), req, credential) {
            Ok(w) => w,
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(e);
            }
        };
        self.in_flight = Some(InFlight {
            worker,
            error: None,
        });

        host.register_tick(TICK_INTERVAL);
        host.register_cancel();
        self.hooks_registered = true;
        self.phase = Phase::Streaming;
        Ok(())
    }

    /// Drain queued events, then settle if the stream has finished.
    pub fn tick(&mut self, host: &mut dyn Host) -> Phase {
        if self.phase != Phase::Streaming {
            return self.phase;
        }
        let Some(flight) = self.in_flight.as_mut() else {
            return self.phase;
        };

        let mut done = false;
        while let Some(ev) = flight.worker.events().try_take() {
            match ev {
                StreamEvent::Delta(text) => {
                    self.response.push_str(&text);
                    host.buffer_appended(&text);
                }
                StreamEvent::Error(msg) => {
                    flight.error.get_or_insert(msg);
                }
                StreamEvent::Done => {
                    done = true;
                    break;
                }
            }
        }

        if !done && flight.worker.events().is_closed() {
            flight
                .error
                .get_or_insert_with(|| "background worker exited unexpectedly".to_string());
            done = true;
        }

        if done {
            let error = self.in_flight.take().and_then(|f| f.error);
            self.finish(host, error);
        }
        self.phase
    }

    /// Abandon the in-flight request. A no-op unless streaming.
    pub fn cancel(&mut self, host: &mut dyn Host) -> Phase {
        if self.phase != Phase::Streaming {
            return self.phase;
        }
        if let Some(flight) = self.in_flight.take() {
            flight.worker.cancel();
        }
        self.phase = Phase::Cancelled;
        self.deregister(host);
        tracing::info!("request cancelled");
        host.notify(Severity::Info, "Request cancelled");
        self.phase
    }

    /// Stop the host tick and cancel listener. Safe to call any number of times.
    pub fn deregister(&mut self, host: &mut dyn Host) {
        if std::mem::take(&mut self.hooks_registered) {
            host.unregister_cancel();
            host.unregister_tick();
        }
    }

    fn finish(&mut self, host: &mut dyn Host, error: Option<String>) {
        self.deregister(host);
        match error {
            None => {
                self.phase = Phase::Completed;
                tracing::info!(chars = self.response.chars().count(), "response complete");
                host.notify(Severity::Info, "Response complete");
            }
            Some(msg) => {
                self.phase = Phase::Failed;
                tracing::warn!(error = %msg, "request failed");
                self.overwrite_with_error(host, &msg);
                host.notify(Severity::Error, &msg);
            }
        }
    }

    fn overwrite_with_error(&mut self, host: &mut dyn Host, msg: &str) {
        self.response = format!("Error: {msg}");
        host.buffer_replaced(&self.response);
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("transport", &self.transport.name())
            .field("phase", &self.phase)
            .field("history", &self.history.len())
            .field("hooks_registered", &self.hooks_registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::KeySource;
    use crate::provider::stub::StubTransport;
    use std::time::Instant;

    #[derive(Debug, Default)]
    struct RecordingHost {
        ticking: bool,
        listening: bool,
        registrations: usize,
        cancel_registrations: usize,
        cancel_unregistrations: usize,
        unregistrations: usize,
        notices: Vec<(Severity, String)>,
        appended: Vec<String>,
        history: Vec<String>,
    }

    impl Host for RecordingHost {
        fn register_tick(&mut self, interval: Duration) {
            assert_eq!(interval, TICK_INTERVAL);
            self.ticking = true;
            self.registrations += 1;
        }

        fn unregister_tick(&mut self) {
            self.ticking = false;
            self.unregistrations += 1;
        }

        fn register_cancel(&mut self) {
            self.listening = true;
            self.cancel_registrations += 1;
        }

        fn unregister_cancel(&mut self) {
            self.listening = false;
            self.cancel_unregistrations += 1;
        }

        fn notify(&mut self, severity: Severity, message: &str) {
            self.notices.push((severity, message.to_string()));
        }

        fn buffer_appended(&mut self, delta: &str) {
            self.appended.push(delta.to_string());
        }

        fn history_appended(&mut self, prompt: &str) {
            self.history.push(prompt.to_string());
        }
    }

    fn stored_key() -> KeyPreferences {
        KeyPreferences {
            key: "sk-test".to_string(),
            ..KeyPreferences::default()
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn submission(prompt: &str) -> Submission {
        Submission {
            model: "gpt-5.2".to_string(),
            system_prompt: None,
            prompt: prompt.to_string(),
            stream: true,
        }
    }

    fn run_to_rest(driver: &mut Driver, host: &mut RecordingHost) -> Phase {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let phase = driver.tick(host);
            if phase.is_at_rest() {
                return phase;
            }
            assert!(Instant::now() < deadline, "driver never settled");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn streams_into_buffer_and_completes() {
        let stub = Arc::new(StubTransport::with_parts(["Hi", " there"]));
        let mut driver = Driver::new(stub.clone(), stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        driver.submit(&mut host, submission("  greet me ")).unwrap();
        assert_eq!(driver.phase(), Phase::Streaming);
        assert!(host.ticking);

        assert_eq!(run_to_rest(&mut driver, &mut host), Phase::Completed);
        assert_eq!(driver.response(), "Hi there");
        assert_eq!(host.appended.concat(), "Hi there");
        assert_eq!(host.history, ["greet me"]);
        assert_eq!(driver.history().selected(), Some("greet me"));
        assert!(!host.ticking);
        assert_eq!(host.unregistrations, 1);
        assert_eq!(host.notices.last().unwrap().0, Severity::Info);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn worker_error_overwrites_buffer() {
        let stub = Arc::new(StubTransport::with_parts(["partial"]).failing(ChatError::Http {
            status: 401,
            body: r#"{"error":"bad key"}"#.to_string(),
        }));
        let mut driver = Driver::new(stub, stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        driver.submit(&mut host, submission("hello")).unwrap();
        assert_eq!(run_to_rest(&mut driver, &mut host), Phase::Failed);
        assert_eq!(driver.response(), r#"Error: HTTP 401: {"error":"bad key"}"#);
        assert_eq!(
            host.notices.last().unwrap(),
            &(Severity::Error, r#"HTTP 401: {"error":"bad key"}"#.to_string())
        );
        assert!(!host.ticking);
    }

    #[test]
    fn blank_prompt_touches_nothing() {
        let stub = Arc::new(StubTransport::with_parts(["x"]));
        let mut driver = Driver::new(stub.clone(), stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        driver.submit(&mut host, submission("first")).unwrap();
        run_to_rest(&mut driver, &mut host);
        let before = driver.response().to_string();

        let err = driver.submit(&mut host, submission(" \n\t ")).unwrap_err();
        assert_eq!(err, ChatError::EmptyPrompt);
        assert_eq!(driver.response(), before);
        assert_eq!(driver.history().len(), 1);
        assert_eq!(host.registrations, 1);
        assert_eq!(host.notices.last().unwrap().0, Severity::Warning);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn blank_prompt_wins_over_missing_key() {
        let stub = Arc::new(StubTransport::new());
        let mut driver = Driver::new(stub.clone(), KeyPreferences::default()).with_env(no_env);
        let mut host = RecordingHost::default();

        assert_eq!(
            driver.submit(&mut host, submission("")).unwrap_err(),
            ChatError::EmptyPrompt
        );
        assert_eq!(driver.response(), "");
        assert_eq!(stub.calls(), 0);
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let stub = Arc::new(StubTransport::new());
        let keys = KeyPreferences {
            key_source: KeySource::Env,
            key_env: "GPTCHAT_TEST_UNSET".to_string(),
            ..KeyPreferences::default()
        };
        let mut driver = Driver::new(stub.clone(), keys).with_env(no_env);
        let mut host = RecordingHost::default();

        let err = driver.submit(&mut host, submission("hello")).unwrap_err();
        assert_eq!(err, ChatError::MissingCredential);
        assert!(driver.response().starts_with("Error: "));
        assert_eq!(driver.phase(), Phase::Idle);
        assert!(driver.history().is_empty());
        assert_eq!(host.registrations, 0);
        assert_eq!(host.notices[0].0, Severity::Error);
        assert_eq!(stub.calls(), 0);
    }

    #[test]
    fn second_submit_while_streaming_is_busy() {
        let stub = Arc::new(StubTransport::with_parts(["slow"]).delay(Duration::from_millis(200)));
        let mut driver = Driver::new(stub.clone(), stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        driver.submit(&mut host, submission("one")).unwrap();
        assert_eq!(driver.submit(&mut host, submission("two")).unwrap_err(), ChatError::Busy);
        assert_eq!(driver.history().len(), 1);

        assert_eq!(run_to_rest(&mut driver, &mut host), Phase::Completed);
        assert_eq!(driver.response(), "slow");

        // At rest again: the next submission goes through.
        driver.submit(&mut host, submission("three")).unwrap();
        assert_eq!(run_to_rest(&mut driver, &mut host), Phase::Completed);
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn cancel_settles_immediately() {
        let stub = Arc::new(
            StubTransport::with_parts(["a", "b", "c"]).delay(Duration::from_millis(100)),
        );
        let mut driver = Driver::new(stub, stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        driver.submit(&mut host, submission("hello")).unwrap();
        assert_eq!(driver.cancel(&mut host), Phase::Cancelled);
        assert!(!host.ticking);
        assert_eq!(host.unregistrations, 1);
        assert_eq!(host.notices.last().unwrap(), &(Severity::Info, "Request cancelled".to_string()));

        // Late signals are no-ops.
        assert_eq!(driver.tick(&mut host), Phase::Cancelled);
        assert_eq!(driver.cancel(&mut host), Phase::Cancelled);
        assert_eq!(host.unregistrations, 1);
        assert!(host.appended.is_empty());
    }

    #[test]
    fn deregister_is_idempotent() {
        let stub = Arc::new(StubTransport::with_parts(["x"]));
        let mut driver = Driver::new(stub, stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        driver.submit(&mut host, submission("hello")).unwrap();
        run_to_rest(&mut driver, &mut host);
        driver.deregister(&mut host);
        driver.deregister(&mut host);
        assert_eq!(host.registrations, 1);
        assert_eq!(host.unregistrations, 1);
    }

    #[test]
    fn cancel_listener_follows_the_request() {
        let stub = Arc::new(StubTransport::with_parts(["x"]));
        let mut driver = Driver::new(stub.clone(), stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        driver.submit(&mut host, submission("hello")).unwrap();
        assert!(host.listening);
        assert_eq!(run_to_rest(&mut driver, &mut host), Phase::Completed);
        assert!(!host.listening);

        // Rejected submissions never arm the listener.
        driver.submit(&mut host, submission("  ")).unwrap_err();
        assert_eq!(host.cancel_registrations, 1);

        let slow = Arc::new(StubTransport::with_parts(["a", "b"]).delay(Duration::from_millis(100)));
        let mut driver = Driver::new(slow, stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();
        driver.submit(&mut host, submission("hello")).unwrap();
        driver.cancel(&mut host);
        driver.deregister(&mut host);
        assert!(!host.listening);
        assert_eq!(host.cancel_registrations, 1);
        assert_eq!(host.cancel_unregistrations, 1);
    }

    #[test]
    fn non_streaming_submission_fills_buffer_once() {
        let stub = Arc::new(StubTransport::with_parts(["Hi", " there"]));
        let mut driver = Driver::new(stub, stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        let mut s = submission("hello");
        s.stream = false;
        driver.submit(&mut host, s).unwrap();
        assert_eq!(run_to_rest(&mut driver, &mut host), Phase::Completed);
        assert_eq!(host.appended, ["Hi there"]);
    }

    #[cfg(feature = "openai")]
    #[tokio::test(flavor = "multi_thread")]
    async fn http_401_ends_in_error_buffer() {
        use crate::provider::openai::OpenAiTransport;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"bad key"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = OpenAiTransport::new(&format!("{}/v1/responses", server.uri())).unwrap();
        let mut driver = Driver::new(Arc::new(transport), stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        driver.submit(&mut host, submission("hello")).unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while !driver.tick(&mut host).is_at_rest() {
            assert!(Instant::now() < deadline, "driver never settled");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(driver.phase(), Phase::Failed);
        assert_eq!(driver.response(), r#"Error: HTTP 401: {"error":"bad key"}"#);
    }

    #[cfg(feature = "openai")]
    #[tokio::test(flavor = "multi_thread")]
    async fn sse_stream_builds_response() {
        use crate::provider::openai::OpenAiTransport;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = [
            r#"data: {"type":"response.output_text.delta","delta":"Hi"}"#,
            r#"data: {"type":"response.output_text.delta","delta":" there"}"#,
            "data: [DONE]",
            "",
        ]
        .join("\n");
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let transport = OpenAiTransport::new(&format!("{}/v1/responses", server.uri())).unwrap();
        let mut driver = Driver::new(Arc::new(transport), stored_key()).with_env(no_env);
        let mut host = RecordingHost::default();

        driver.submit(&mut host, submission("hello")).unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while !driver.tick(&mut host).is_at_rest() {
            assert!(Instant::now() < deadline, "driver never settled");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(driver.phase(), Phase::Completed);
        assert_eq!(driver.response(), "Hi there");
    }
}
