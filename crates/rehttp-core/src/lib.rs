pub mod config;
pub mod logging;

pub mod dispatch;
pub mod error;
pub mod etag;
pub mod headers;
pub mod range;
pub mod resume;
pub mod retry;
pub mod retry_handler;
pub mod signal;
pub mod transport;

pub use dispatch::{AbortFn, Body, Dispatch, DispatchOptions, Handler, Method, StreamBody};
pub use error::{RequestError, TransportErrorKind};
pub use headers::HeaderMap;
pub use retry::{RetryConfiguration, RetryContext, RetryDecision, RetryPolicy};
pub use retry_handler::{RetryAgent, RetryHandler};
pub use signal::{AbortController, AbortSignal};
pub use transport::CurlDispatcher;
