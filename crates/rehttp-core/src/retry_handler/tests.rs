use super::*;
use crate::dispatch::{Body, Method, StreamBody};
use crate::signal::AbortController;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One scripted event of a physical attempt.
#[derive(Clone)]
enum Step {
    Headers(u16, Vec<(&'static str, &'static str)>),
    Data(&'static [u8]),
    /// Pull bytes from a streaming request body.
    ReadBody(usize),
    Complete,
    Fail(RequestError),
}

/// In-memory transport replaying one script per attempt.
#[derive(Default)]
struct Scripted {
    attempts: Mutex<VecDeque<Vec<Step>>>,
    seen: Mutex<Vec<DispatchOptions>>,
}

impl Scripted {
    fn new(attempts: Vec<Vec<Step>>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn dispatched(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn request(&self, i: usize) -> DispatchOptions {
        self.seen.lock().unwrap()[i].clone()
    }
}

impl Dispatch for Scripted {
    fn dispatch(&self, opts: DispatchOptions, handler: &mut dyn Handler) {
        self.seen.lock().unwrap().push(opts.clone());
        let steps = self.attempts.lock().unwrap().pop_front().unwrap_or_else(|| {
            vec![Step::Fail(RequestError::transport(
                TransportErrorKind::Other,
                "script exhausted",
            ))]
        });

        let aborted: Arc<Mutex<Option<RequestError>>> = Arc::default();
        let slot = Arc::clone(&aborted);
        handler.on_connect(Box::new(move |reason| {
            *slot.lock().unwrap() = Some(reason);
        }));

        for step in steps {
            let pending = aborted.lock().unwrap().take();
            if let Some(reason) = pending {
                handler.on_error(reason);
                return;
            }
            match step {
                Step::Headers(status, pairs) => {
                    let headers: HeaderMap = pairs.into_iter().collect();
                    if !handler.on_headers(status, &headers) {
                        let err = aborted.lock().unwrap().take().unwrap_or_else(|| {
                            RequestError::transport(TransportErrorKind::Other, "stopped by handler")
                        });
                        handler.on_error(err);
                        return;
                    }
                }
                Step::Data(chunk) => {
                    handler.on_data(chunk);
                }
                Step::ReadBody(n) => {
                    if let Body::Stream(s) = &opts.body {
                        let mut buf = vec![0u8; n];
                        let _ = s.read(&mut buf);
                    }
                }
                Step::Complete => {
                    handler.on_complete(&HeaderMap::new());
                    return;
                }
                Step::Fail(err) => {
                    handler.on_error(err);
                    return;
                }
            }
        }
        let pending = aborted.lock().unwrap().take();
        if let Some(reason) = pending {
            handler.on_error(reason);
            return;
        }
        handler.on_complete(&HeaderMap::new());
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Headers(u16),
    Data(Vec<u8>),
    Complete,
    Error(RequestError),
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
    abort: Option<AbortFn>,
    abort_after_bytes: Option<usize>,
    received: usize,
}

impl Recorder {
    fn body(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Data(d) => Some(d.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    fn terminal(&self) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Complete | Event::Error(_)))
            .collect()
    }

    fn headers_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Headers(_)))
            .count()
    }
}

impl Handler for Recorder {
    fn on_connect(&mut self, abort: AbortFn) {
        self.abort = Some(abort);
    }

    fn on_headers(&mut self, status: u16, _headers: &HeaderMap) -> bool {
        self.events.push(Event::Headers(status));
        true
    }

    fn on_data(&mut self, chunk: &[u8]) -> bool {
        self.events.push(Event::Data(chunk.to_vec()));
        self.received += chunk.len();
        if self.abort_after_bytes.is_some_and(|n| self.received >= n) {
            if let Some(abort) = self.abort.take() {
                abort(RequestError::aborted("consumer gave up"));
            }
        }
        true
    }

    fn on_complete(&mut self, _trailers: &HeaderMap) {
        self.events.push(Event::Complete);
    }

    fn on_error(&mut self, err: RequestError) {
        self.events.push(Event::Error(err));
    }
}

fn fast_config() -> RetryConfiguration {
    RetryConfiguration {
        min_timeout: Duration::ZERO,
        max_timeout: Duration::from_millis(1),
        ..RetryConfiguration::default()
    }
}

fn reset() -> RequestError {
    RequestError::transport(TransportErrorKind::ConnectionReset, "other side closed")
}

fn get() -> DispatchOptions {
    DispatchOptions::get("http://example.test/file").unwrap()
}

fn run(transport: &Scripted, config: RetryConfiguration, opts: DispatchOptions) -> Recorder {
    let agent = RetryAgent::new(transport, config);
    let mut rec = Recorder::default();
    agent.dispatch(opts, &mut rec);
    rec
}

fn abc_then_reset(etag: &'static str) -> Vec<Step> {
    vec![
        Step::Headers(200, vec![("Content-Length", "6"), ("ETag", etag)]),
        Step::Data(b"abc"),
        Step::Fail(reset()),
    ]
}

#[test]
fn successful_attempt_passes_through_unchanged() {
    let script = vec![
        Step::Headers(200, vec![("Content-Length", "6")]),
        Step::Data(b"abc"),
        Step::Data(b"def"),
        Step::Complete,
    ];

    let direct_transport = Scripted::new(vec![script.clone()]);
    let mut direct = Recorder::default();
    direct_transport.dispatch(get(), &mut direct);

    let wrapped_transport = Scripted::new(vec![script]);
    let wrapped = run(&wrapped_transport, fast_config(), get());

    assert_eq!(wrapped.events, direct.events);
    assert_eq!(wrapped_transport.dispatched(), 1);
}

#[test]
fn custom_policy_cannot_exceed_max_retries() {
    let transport = Scripted::new(vec![vec![Step::Fail(reset())]; 20]);
    let config = RetryConfiguration {
        max_retries: 2,
        ..fast_config()
    }
    .with_policy(|_: &RequestError, ctx: &crate::retry::RetryContext<'_>| {
        if ctx.attempt < 8 {
            RetryDecision::Retry(Duration::ZERO)
        } else {
            RetryDecision::Fail(reset())
        }
    });
    let rec = run(&transport, config, get());
    assert_eq!(transport.dispatched(), 3);
    assert_eq!(rec.events, vec![Event::Error(reset())]);
}

#[test]
fn attempts_are_bounded_by_max_retries() {
    let transport = Scripted::new(vec![vec![Step::Fail(reset())]; 10]);
    let config = RetryConfiguration {
        max_retries: 3,
        ..fast_config()
    };
    let rec = run(&transport, config, get());
    assert_eq!(transport.dispatched(), 4);
    assert_eq!(rec.events, vec![Event::Error(reset())]);
}

#[test]
fn interrupted_body_is_resumed_with_range_and_if_match() {
    let transport = Scripted::new(vec![
        abc_then_reset("\"x\""),
        vec![
            Step::Headers(206, vec![("Content-Range", "bytes 3-5/6"), ("ETag", "\"x\"")]),
            Step::Data(b"def"),
            Step::Complete,
        ],
    ]);
    let rec = run(&transport, fast_config(), get());

    assert_eq!(rec.body(), b"abcdef");
    assert_eq!(rec.headers_count(), 1);
    assert_eq!(rec.terminal(), vec![&Event::Complete]);

    let first = transport.request(0);
    assert!(!first.headers.contains("range"));
    let second = transport.request(1);
    assert_eq!(second.headers.get("range"), Some("bytes=3-5"));
    assert_eq!(second.headers.get("if-match"), Some("\"x\""));
}

#[test]
fn complete_length_as_last_byte_is_accepted() {
    let transport = Scripted::new(vec![
        abc_then_reset("\"x\""),
        vec![
            Step::Headers(206, vec![("Content-Range", "bytes 3-6/6"), ("ETag", "\"x\"")]),
            Step::Data(b"def"),
            Step::Complete,
        ],
    ]);
    let rec = run(&transport, fast_config(), get());
    assert_eq!(rec.body(), b"abcdef");
    assert_eq!(rec.terminal(), vec![&Event::Complete]);
}

#[test]
fn changed_entity_surfaces_original_failure() {
    let transport = Scripted::new(vec![
        abc_then_reset("\"x\""),
        vec![
            Step::Headers(206, vec![("Content-Range", "bytes 3-5/6"), ("ETag", "\"y\"")]),
            Step::Data(b"XYZ"),
            Step::Complete,
        ],
    ]);
    let rec = run(&transport, fast_config(), get());
    assert_eq!(rec.body(), b"abc");
    assert_eq!(rec.terminal(), vec![&Event::Error(reset())]);
    assert_eq!(transport.dispatched(), 2);
}

#[test]
fn wrong_range_start_surfaces_original_failure() {
    let transport = Scripted::new(vec![
        abc_then_reset("\"x\""),
        vec![
            Step::Headers(206, vec![("Content-Range", "bytes 2-5/6"), ("ETag", "\"x\"")]),
            Step::Data(b"cdef"),
            Step::Complete,
        ],
    ]);
    let rec = run(&transport, fast_config(), get());
    assert_eq!(rec.body(), b"abc");
    assert_eq!(rec.terminal(), vec![&Event::Error(reset())]);
}

#[test]
fn full_body_after_partial_delivery_is_rejected() {
    let transport = Scripted::new(vec![
        abc_then_reset("\"x\""),
        vec![
            Step::Headers(200, vec![("Content-Length", "6"), ("ETag", "\"x\"")]),
            Step::Data(b"abcdef"),
            Step::Complete,
        ],
    ]);
    let rec = run(&transport, fast_config(), get());
    assert_eq!(rec.body(), b"abc");
    assert_eq!(rec.terminal(), vec![&Event::Error(reset())]);
}

#[test]
fn failure_before_headers_retries_without_range() {
    let transport = Scripted::new(vec![
        vec![Step::Fail(RequestError::transport(
            TransportErrorKind::ConnectionRefused,
            "refused",
        ))],
        vec![
            Step::Headers(200, vec![("Content-Length", "3")]),
            Step::Data(b"abc"),
            Step::Complete,
        ],
    ]);
    let rec = run(&transport, fast_config(), get());
    assert_eq!(
        rec.events,
        vec![
            Event::Headers(200),
            Event::Data(b"abc".to_vec()),
            Event::Complete
        ]
    );
    assert!(!transport.request(1).headers.contains("range"));
}

#[test]
fn retryable_status_is_hidden_and_retried_for_get() {
    let transport = Scripted::new(vec![
        vec![Step::Headers(503, vec![]), Step::Data(b"busy"), Step::Complete],
        vec![
            Step::Headers(200, vec![("Content-Length", "2")]),
            Step::Data(b"ok"),
            Step::Complete,
        ],
    ]);
    let rec = run(&transport, fast_config(), get());
    assert_eq!(
        rec.events,
        vec![
            Event::Headers(200),
            Event::Data(b"ok".to_vec()),
            Event::Complete
        ]
    );
    assert_eq!(transport.dispatched(), 2);
}

#[test]
fn post_is_not_retried_on_503() {
    let transport = Scripted::new(vec![
        vec![Step::Headers(503, vec![])],
        vec![Step::Headers(200, vec![]), Step::Complete],
    ]);
    let opts = DispatchOptions::new(Method::Post, "http://example.test/submit")
        .unwrap()
        .body("payload");
    let rec = run(&transport, fast_config(), opts);
    assert_eq!(transport.dispatched(), 1);
    assert!(matches!(
        rec.terminal().as_slice(),
        [Event::Error(RequestError::Status { status: 503, .. })]
    ));
    assert_eq!(rec.headers_count(), 0);
}

#[test]
fn non_retryable_status_is_forwarded() {
    let transport = Scripted::new(vec![vec![
        Step::Headers(404, vec![]),
        Step::Data(b"missing"),
        Step::Complete,
    ]]);
    let rec = run(&transport, fast_config(), get());
    assert_eq!(
        rec.events,
        vec![
            Event::Headers(404),
            Event::Data(b"missing".to_vec()),
            Event::Complete
        ]
    );
}

#[test]
fn exhausted_status_retries_report_last_status() {
    let transport = Scripted::new(vec![
        vec![Step::Headers(503, vec![])],
        vec![Step::Fail(reset())],
        vec![Step::Headers(502, vec![])],
    ]);
    let config = RetryConfiguration {
        max_retries: 2,
        ..fast_config()
    };
    let rec = run(&transport, config, get());
    assert_eq!(transport.dispatched(), 3);
    assert!(matches!(
        rec.terminal().as_slice(),
        [Event::Error(RequestError::Status { status: 502, .. })]
    ));
}

#[test]
fn retry_after_delays_next_attempt() {
    let transport = Scripted::new(vec![
        vec![Step::Headers(503, vec![("Retry-After", "2")])],
        vec![Step::Headers(200, vec![]), Step::Complete],
    ]);
    let config = RetryConfiguration {
        max_timeout: Duration::from_secs(30),
        ..fast_config()
    };
    let start = Instant::now();
    let rec = run(&transport, config, get());
    assert!(start.elapsed() >= Duration::from_millis(2000));
    assert_eq!(rec.terminal(), vec![&Event::Complete]);
}

#[test]
fn streamed_request_body_is_not_replayed() {
    let transport = Scripted::new(vec![
        vec![Step::ReadBody(4), Step::Fail(reset())],
        vec![Step::Headers(200, vec![]), Step::Complete],
    ]);
    let body = StreamBody::new(std::io::Cursor::new(b"upload-bytes".to_vec()));
    let opts = DispatchOptions::new(Method::Put, "http://example.test/upload")
        .unwrap()
        .body(Body::Stream(body));
    let rec = run(&transport, fast_config(), opts);
    assert_eq!(transport.dispatched(), 1);
    assert_eq!(rec.events, vec![Event::Error(reset())]);
}

#[test]
fn buffered_request_body_is_replayed() {
    let transport = Scripted::new(vec![
        vec![Step::Fail(reset())],
        vec![Step::Headers(201, vec![]), Step::Complete],
    ]);
    let opts = DispatchOptions::new(Method::Put, "http://example.test/upload")
        .unwrap()
        .body("upload-bytes");
    let rec = run(&transport, fast_config(), opts);
    assert_eq!(transport.dispatched(), 2);
    assert_eq!(rec.events, vec![Event::Headers(201), Event::Complete]);
}

#[test]
fn non_resumable_body_is_not_retried_after_headers() {
    let transport = Scripted::new(vec![
        vec![
            Step::Headers(200, vec![("Content-Length", "6"), ("Trailer", "Digest")]),
            Step::Data(b"abc"),
            Step::Fail(reset()),
        ],
        vec![Step::Headers(206, vec![]), Step::Complete],
    ]);
    let rec = run(&transport, fast_config(), get());
    assert_eq!(transport.dispatched(), 1);
    assert_eq!(rec.body(), b"abc");
    assert_eq!(rec.terminal(), vec![&Event::Error(reset())]);
}

#[test]
fn abort_before_dispatch_ends_first_attempt() {
    let controller = AbortController::new();
    controller.abort(RequestError::aborted("never mind"));
    let transport = Scripted::new(vec![vec![Step::Headers(200, vec![]), Step::Complete]]);
    let rec = run(&transport, fast_config(), get().signal(controller.signal()));
    assert_eq!(transport.dispatched(), 1);
    assert_eq!(
        rec.events,
        vec![Event::Error(RequestError::aborted("never mind"))]
    );
}

#[test]
fn abort_during_backoff_delivers_reason() {
    let controller = AbortController::new();
    let transport = Scripted::new(vec![vec![Step::Fail(reset())]]);
    let config = RetryConfiguration {
        min_timeout: Duration::from_secs(10),
        max_timeout: Duration::from_secs(10),
        ..RetryConfiguration::default()
    };
    let opts = get().signal(controller.signal());
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        controller.abort(RequestError::aborted("shutting down"));
    });

    let start = Instant::now();
    let rec = run(&transport, config, opts);
    canceller.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(transport.dispatched(), 1);
    assert_eq!(
        rec.events,
        vec![Event::Error(RequestError::aborted("shutting down"))]
    );
}

#[test]
fn consumer_abort_is_not_retried() {
    let transport = Scripted::new(vec![
        vec![
            Step::Headers(200, vec![("Content-Length", "6")]),
            Step::Data(b"abc"),
            Step::Data(b"def"),
            Step::Complete,
        ],
        vec![Step::Headers(206, vec![]), Step::Complete],
    ]);
    let agent = RetryAgent::new(&transport, fast_config());
    let mut rec = Recorder {
        abort_after_bytes: Some(3),
        ..Recorder::default()
    };
    agent.dispatch(get(), &mut rec);

    assert_eq!(transport.dispatched(), 1);
    assert_eq!(rec.body(), b"abc");
    assert_eq!(
        rec.terminal(),
        vec![&Event::Error(RequestError::aborted("consumer gave up"))]
    );
}

#[test]
fn aborted_transport_error_is_not_retried() {
    let transport = Scripted::new(vec![
        vec![Step::Fail(RequestError::aborted("transport closed"))],
        vec![Step::Headers(200, vec![]), Step::Complete],
    ]);
    let rec = run(&transport, fast_config(), get());
    assert_eq!(transport.dispatched(), 1);
    assert_eq!(
        rec.events,
        vec![Event::Error(RequestError::aborted("transport closed"))]
    );
}
