//! One background thread per request, talking to the foreground only through the event channel.

use crate::auth::Credential;
use crate::channel::{self, CancelFlag, EventReceiver, EventSender};
use crate::error::ChatError;
use crate::provider::{ChatRequest, StreamEvent, Transport};
use std::sync::Arc;

/// Foreground handle to a running request.
#[derive(Debug)]
pub struct Worker {
    cancel: CancelFlag,
    events: EventReceiver,
}

impl Worker {
    /// Start `req` on a fresh detached thread.
    ///
    /// The thread is never joined; if the host exits mid-stream it is simply abandoned.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        req: ChatRequest,
        credential: Credential,
    ) -> Result<Self, ChatError> {
        let (tx, events) = channel::channel();
        let cancel = CancelFlag::new();
        let flag = cancel.clone();

        std::thread::Builder::new()
            .name("gptchat-worker".to_string())
            .spawn(move || run(transport.as_ref(), &req, &credential, &flag, &tx))
            .map_err(|e| ChatError::Worker(e.to_string()))?;

        Ok(Self { cancel, events })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn events(&mut self) -> &mut EventReceiver {
        &mut self.events
    }
}

fn run(transport: &dyn Transport, req: &ChatRequest, credential: &Credential, cancel: &CancelFlag, tx: &EventSender) {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tx.put(StreamEvent::Error(ChatError::Worker(e.to_string()).to_string()));
            tx.put(StreamEvent::Done);
            return;
        }
    };

    tracing::debug!(transport = transport.name(), stream = req.stream, "worker started");

    rt.block_on(async {
        if req.stream {
            transport
                .stream(req, credential, cancel, &mut |ev: StreamEvent| tx.put(ev))
                .await;
            return;
        }

        match transport.call(req, credential).await {
            Ok(text) => {
                if !cancel.is_cancelled() {
                    tx.put(StreamEvent::Delta(text));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "request failed");
                tx.put(StreamEvent::Error(e.to_string()));
            }
        }
        tx.put(StreamEvent::Done);
    });

    tracing::debug!("worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::stub::StubTransport;
    use std::time::{Duration, Instant};

    fn drain_until_done(worker: &mut Worker) -> Vec<StreamEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while Instant::now() < deadline {
            match worker.events().try_take() {
                Some(ev) => {
                    let done = ev.is_terminal();
                    out.push(ev);
                    if done {
                        return out;
                    }
                }
                None => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("worker did not finish: {out:?}");
    }

    #[test]
    fn streaming_request_forwards_events() {
        let stub = Arc::new(StubTransport::with_parts(["Hi", " there"]));
        let req = ChatRequest::build("m", None, "hello", true).unwrap();
        let mut worker = Worker::spawn(stub.clone(), req, Credential::new("k")).unwrap();

        assert_eq!(
            drain_until_done(&mut worker),
            vec![
                StreamEvent::Delta("Hi".into()),
                StreamEvent::Delta(" there".into()),
                StreamEvent::Done,
            ]
        );
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn plain_request_is_one_delta_then_done() {
        let stub = Arc::new(StubTransport::with_parts(["Hi", " there"]));
        let req = ChatRequest::build("m", None, "hello", false).unwrap();
        let mut worker = Worker::spawn(stub, req, Credential::new("k")).unwrap();

        assert_eq!(
            drain_until_done(&mut worker),
            vec![StreamEvent::Delta("Hi there".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn plain_request_failure_is_error_then_done() {
        let stub = Arc::new(StubTransport::with_parts(["x"]).failing(ChatError::Http {
            status: 500,
            body: "boom".into(),
        }));
        let req = ChatRequest::build("m", None, "hello", false).unwrap();
        let mut worker = Worker::spawn(stub, req, Credential::new("k")).unwrap();

        assert_eq!(
            drain_until_done(&mut worker),
            vec![StreamEvent::Error("HTTP 500: boom".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn cancel_stops_deltas_and_still_finishes() {
        let stub = Arc::new(
            StubTransport::with_parts(["a", "b", "c", "d"]).delay(Duration::from_millis(50)),
        );
        let req = ChatRequest::build("m", None, "hello", true).unwrap();
        let mut worker = Worker::spawn(stub, req, Credential::new("k")).unwrap();

        // Wait for the first delta, then cancel.
        let first = loop {
            if let Some(ev) = worker.events().try_take() {
                break ev;
            }
            std::thread::sleep(Duration::from_millis(2));
        };
        assert_eq!(first, StreamEvent::Delta("a".into()));
        worker.cancel();

        let rest = drain_until_done(&mut worker);
        assert_eq!(rest.last(), Some(&StreamEvent::Done));
        // At most the delta already in flight when the flag was set.
        let deltas = rest.iter().filter(|e| matches!(e, StreamEvent::Delta(_))).count();
        assert!(deltas <= 1, "unexpected deltas after cancel: {rest:?}");
    }
}
