//! Body wrappers: completion tracking and capped JSON capture.
//!
//! Neither wrapper holds frames back. Bytes are observed as the consumer
//! reads them, so a slow or stalled body never holds up the handler.

use axum::http::{Method, StatusCode};
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Error recorded when a body is dropped before its end.
pub const DROPPED_BEFORE_COMPLETION: &str = "response body dropped before completion";

/// How a response body finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyOutcome {
    /// Data bytes that passed through.
    pub bytes: u64,
    /// Set when the body errored or was dropped before its end.
    pub error: Option<String>,
    /// The body was dropped before its end.
    pub dropped: bool,
}

impl BodyOutcome {
    /// Outcome error, ignoring a drop when the response could not have had a
    /// body on the wire anyway.
    pub fn error_for(self, method: &Method, status: StatusCode) -> Option<String> {
        if self.dropped && !carries_body(method, status) {
            return None;
        }
        self.error
    }
}

/// Whether a response to `method` with `status` is sent with a body.
pub(crate) fn carries_body(method: &Method, status: StatusCode) -> bool {
    !(method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

type Callback = Box<dyn FnOnce(BodyOutcome) + Send + 'static>;

pin_project! {
    /// Wraps a response body and runs a callback exactly once when the body
    /// reaches its end, fails, or is dropped.
    ///
    /// Frames are forwarded untouched.
    pub struct CompletionBody<B> {
        #[pin]
        inner: B,
        bytes: u64,
        on_complete: Option<Callback>,
    }

    impl<B> PinnedDrop for CompletionBody<B> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(callback) = this.on_complete.take() {
                callback(BodyOutcome {
                    bytes: *this.bytes,
                    error: Some(DROPPED_BEFORE_COMPLETION.to_string()),
                    dropped: true,
                });
            }
        }
    }
}

impl<B: Body> CompletionBody<B> {
    /// Wrap `inner`. A body already at its end completes immediately.
    pub fn new<F>(inner: B, on_complete: F) -> Self
    where
        F: FnOnce(BodyOutcome) + Send + 'static,
    {
        let mut on_complete: Option<Callback> = Some(Box::new(on_complete));
        // Servers may never poll a body that is already at its end.
        if inner.is_end_stream() {
            if let Some(callback) = on_complete.take() {
                callback(BodyOutcome::default());
            }
        }
        Self {
            inner,
            bytes: 0,
            on_complete,
        }
    }
}

impl<B> Body for CompletionBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let result = match this.inner.as_mut().poll_frame(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result,
        };

        let (finished, error) = match &result {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    *this.bytes += data.len() as u64;
                }
                (this.inner.is_end_stream(), None)
            }
            Some(Err(e)) => (true, Some(e.to_string())),
            None => (true, None),
        };

        if finished {
            if let Some(callback) = this.on_complete.take() {
                callback(BodyOutcome {
                    bytes: *this.bytes,
                    error,
                    dropped: false,
                });
            }
        }

        Poll::Ready(result)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

type FinishCallback = Box<dyn FnOnce(Value) + Send + 'static>;

struct TapState {
    buf: Vec<u8>,
    limit: usize,
    capturing: bool,
    overflowed: bool,
    complete: bool,
    error: Option<String>,
    finished: bool,
    on_finish: Option<FinishCallback>,
}

impl TapState {
    fn value(&self) -> Value {
        if !self.capturing || self.overflowed || !self.complete || self.error.is_some() {
            return Value::Null;
        }
        serde_json::from_slice(&self.buf).unwrap_or(Value::Null)
    }
}

/// Shared copy of a JSON body, filled as a [`TeeBody`] is read.
///
/// Copying stops once more than `limit` bytes have passed; the value is then
/// `Null` while the reader still receives everything. A one-shot finish
/// callback receives the parsed value when the body ends or when
/// [`BodyTap::finish`] is called, whichever happens first.
#[derive(Clone)]
pub struct BodyTap {
    state: Arc<Mutex<TapState>>,
}

impl std::fmt::Debug for BodyTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BodyTap")
            .field("captured", &state.buf.len())
            .field("limit", &state.limit)
            .field("overflowed", &state.overflowed)
            .field("complete", &state.complete)
            .field("finished", &state.finished)
            .finish()
    }
}

impl BodyTap {
    /// Tap that copies up to `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self::with_state(TapState {
            buf: Vec::new(),
            limit,
            capturing: true,
            overflowed: false,
            complete: false,
            error: None,
            finished: false,
            on_finish: None,
        })
    }

    /// Tap for a body that is not captured. Already finished, value `Null`.
    pub fn disabled() -> Self {
        Self::with_state(TapState {
            buf: Vec::new(),
            limit: 0,
            capturing: false,
            overflowed: false,
            complete: true,
            error: None,
            finished: true,
            on_finish: None,
        })
    }

    fn with_state(state: TapState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy `data` unless the cap has been passed.
    pub fn record(&self, data: &[u8]) {
        let mut state = self.state.lock();
        if !state.capturing || state.overflowed || state.finished {
            return;
        }
        if state.buf.len() + data.len() > state.limit {
            state.overflowed = true;
            state.buf = Vec::new();
        } else {
            state.buf.extend_from_slice(data);
        }
    }

    /// Mark the body ended, cleanly or with `error`, then finish.
    pub fn end(&self, error: Option<String>) {
        {
            let mut state = self.state.lock();
            if state.complete || state.error.is_some() {
                return;
            }
            match error {
                Some(error) => state.error = Some(error),
                None => state.complete = true,
            }
        }
        self.finish();
    }

    /// Close the tap and run the finish callback. Later calls do nothing.
    pub fn finish(&self) {
        let (callback, value) = {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            state.finished = true;
            (state.on_finish.take(), state.value())
        };
        if let Some(callback) = callback {
            callback(value);
        }
    }

    /// Run `f` with the parsed value once the tap finishes. Runs now when it
    /// already has.
    pub fn on_finish<F>(&self, f: F)
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let value = {
            let mut state = self.state.lock();
            if !state.finished {
                state.on_finish = Some(Box::new(f));
                return;
            }
            state.value()
        };
        f(value);
    }

    /// Parsed body: `Null` unless the body ended cleanly within the cap and
    /// holds valid JSON.
    pub fn value(&self) -> Value {
        self.state.lock().value()
    }

    /// Read error seen by the consumer, if any.
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }
}

pin_project! {
    /// Forwards frames untouched while copying data into a [`BodyTap`].
    pub struct TeeBody<B> {
        #[pin]
        inner: B,
        tap: BodyTap,
    }
}

impl<B: Body> TeeBody<B> {
    /// Wrap `inner`. A body already at its end ends the tap immediately.
    pub fn new(inner: B, tap: BodyTap) -> Self {
        if inner.is_end_stream() {
            tap.end(None);
        }
        Self { inner, tap }
    }
}

impl<B> Body for TeeBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let result = match this.inner.as_mut().poll_frame(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result,
        };

        match &result {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.tap.record(data);
                }
                if this.inner.is_end_stream() {
                    this.tap.end(None);
                }
            }
            Some(Err(e)) => this.tap.end(Some(e.to_string())),
            None => this.tap.end(None),
        }

        Poll::Ready(result)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Empty, Full, StreamBody};
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<BodyOutcome>>>, impl FnOnce(BodyOutcome) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |outcome| sink.lock().unwrap().push(outcome))
    }

    #[tokio::test]
    async fn test_fires_once_at_end() {
        let (seen, callback) = recorder();
        let body = CompletionBody::new(Full::new(Bytes::from_static(b"hello")), callback);

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(&collected[..], b"hello");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0],
            BodyOutcome {
                bytes: 5,
                error: None,
                dropped: false
            }
        );
    }

    #[tokio::test]
    async fn test_empty_body_fires_immediately() {
        let (seen, callback) = recorder();
        let body = CompletionBody::new(Empty::<Bytes>::new(), callback);
        assert_eq!(seen.lock().unwrap().len(), 1);
        drop(body);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0].error, None);
    }

    #[test]
    fn test_drop_ignored_without_wire_body() {
        let dropped = BodyOutcome {
            bytes: 0,
            error: Some(DROPPED_BEFORE_COMPLETION.to_string()),
            dropped: true,
        };
        assert_eq!(dropped.clone().error_for(&Method::HEAD, StatusCode::OK), None);
        assert_eq!(dropped.clone().error_for(&Method::GET, StatusCode::NO_CONTENT), None);
        assert_eq!(dropped.clone().error_for(&Method::GET, StatusCode::NOT_MODIFIED), None);
        assert_eq!(
            dropped.error_for(&Method::GET, StatusCode::OK).as_deref(),
            Some(DROPPED_BEFORE_COMPLETION)
        );

        let failed = BodyOutcome {
            bytes: 3,
            error: Some("upstream reset".to_string()),
            dropped: false,
        };
        assert_eq!(
            failed.error_for(&Method::HEAD, StatusCode::OK).as_deref(),
            Some("upstream reset")
        );
    }

    #[test]
    fn test_fires_on_early_drop() {
        let (seen, callback) = recorder();
        let body = CompletionBody::new(Full::new(Bytes::from_static(b"unread")), callback);
        drop(body);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].bytes, 0);
        assert!(seen[0].dropped);
        assert_eq!(seen[0].error.as_deref(), Some(DROPPED_BEFORE_COMPLETION));
    }

    #[tokio::test]
    async fn test_stream_counts_all_frames() {
        let chunks: Vec<Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"ab"))),
            Ok(Frame::data(Bytes::from_static(b"cde"))),
        ];
        let (seen, callback) = recorder();
        let body = CompletionBody::new(StreamBody::new(futures::stream::iter(chunks)), callback);

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(&collected[..], b"abcde");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].bytes, 5);
    }

    #[tokio::test]
    async fn test_stream_error_is_reported() {
        let chunks: Vec<Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"ab"))),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "upstream reset")),
        ];
        let (seen, callback) = recorder();
        let body = CompletionBody::new(StreamBody::new(futures::stream::iter(chunks)), callback);

        assert!(body.collect().await.is_err());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].bytes, 2);
        assert_eq!(seen[0].error.as_deref(), Some("upstream reset"));
    }

    fn chunks(parts: &[&'static [u8]]) -> Vec<Result<Frame<Bytes>, std::io::Error>> {
        parts
            .iter()
            .map(|p| Ok(Frame::data(Bytes::from_static(p))))
            .collect()
    }

    #[tokio::test]
    async fn test_tee_captures_within_limit() {
        let tap = BodyTap::new(64);
        let body = TeeBody::new(
            StreamBody::new(futures::stream::iter(chunks(&[b"{\"amount\":", b" 50}"]))),
            tap.clone(),
        );
        assert_eq!(tap.value(), Value::Null);

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(&collected[..], br#"{"amount": 50}"#);
        assert_eq!(tap.value(), serde_json::json!({"amount": 50}));
        assert_eq!(tap.error(), None);
    }

    #[tokio::test]
    async fn test_tee_over_limit_passes_bytes_through() {
        let tap = BodyTap::new(8);
        let body = TeeBody::new(
            StreamBody::new(futures::stream::iter(chunks(&[
                b"{\"note\": \"",
                b"longer than the cap",
                b"\"}",
            ]))),
            tap.clone(),
        );

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(&collected[..], br#"{"note": "longer than the cap"}"#);
        assert_eq!(tap.value(), Value::Null);
    }

    #[tokio::test]
    async fn test_tee_invalid_json_is_null() {
        let tap = BodyTap::new(64);
        let body = TeeBody::new(Full::new(Bytes::from_static(b"{not json")), tap.clone());
        body.collect().await.unwrap();
        assert_eq!(tap.value(), Value::Null);
    }

    #[tokio::test]
    async fn test_tee_read_error_recorded() {
        let tap = BodyTap::new(64);
        let parts: Vec<Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"{\"a\":"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client reset")),
        ];
        let body = TeeBody::new(StreamBody::new(futures::stream::iter(parts)), tap.clone());

        assert!(body.collect().await.is_err());
        assert_eq!(tap.error().as_deref(), Some("client reset"));
        assert_eq!(tap.value(), Value::Null);
    }

    #[tokio::test]
    async fn test_tap_finish_callback_runs_once() {
        let tap = BodyTap::new(64);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tap.on_finish(move |value| sink.lock().unwrap().push(value));

        let body = TeeBody::new(Full::new(Bytes::from_static(b"[1,2]")), tap.clone());
        body.collect().await.unwrap();
        tap.finish();
        tap.end(None);

        assert_eq!(*seen.lock().unwrap(), vec![serde_json::json!([1, 2])]);
    }

    #[test]
    fn test_tap_finished_early_is_null() {
        let tap = BodyTap::new(64);
        tap.record(b"{\"partial\"");
        tap.finish();
        tap.record(b": 1}");
        tap.end(None);

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        tap.on_finish(move |value| *sink.lock().unwrap() = Some(value));

        assert_eq!(*seen.lock().unwrap(), Some(Value::Null));
    }

    #[test]
    fn test_disabled_tap_is_finished() {
        let tap = BodyTap::disabled();
        tap.record(b"{}");
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        tap.on_finish(move |value| *sink.lock().unwrap() = Some(value));

        assert_eq!(*seen.lock().unwrap(), Some(Value::Null));
        assert_eq!(tap.value(), Value::Null);
    }
}
