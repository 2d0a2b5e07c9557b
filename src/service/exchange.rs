//! One request/response cycle against one backend.

use std::fmt;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap, Response, StatusCode};

use crate::load_balancer::backend::{Backend, BackendConnectionGuard};

/// What the client sent as a request body, judged from its headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBody {
    /// No `Content-Length` and no `Transfer-Encoding`.
    Absent,
    /// Declared `Content-Length`.
    Length(u64),
    /// Chunked, or a length that does not parse.
    Streamed,
}

impl RequestBody {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if headers.contains_key(header::TRANSFER_ENCODING) {
            return RequestBody::Streamed;
        }
        match headers.get(header::CONTENT_LENGTH) {
            None => RequestBody::Absent,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .map_or(RequestBody::Streamed, RequestBody::Length),
        }
    }

    /// Whether the request can be sent again without the original body.
    pub fn is_replay_safe(&self) -> bool {
        matches!(self, RequestBody::Absent | RequestBody::Length(0))
    }
}

impl fmt::Display for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Absent => f.write_str("no body"),
            RequestBody::Length(n) => write!(f, "content-length {n}"),
            RequestBody::Streamed => f.write_str("streamed body"),
        }
    }
}

/// A backend response whose headers have arrived.
///
/// Holds the backend connection slot until the exchange is either turned
/// into the client response or released.
#[derive(Debug)]
pub struct BackendExchange {
    request_body: RequestBody,
    status: StatusCode,
    response: Option<Response<Body>>,
    guard: Option<BackendConnectionGuard>,
}

impl BackendExchange {
    pub fn new(request_headers: &HeaderMap, response: Response<Body>) -> Self {
        Self {
            request_body: RequestBody::from_headers(request_headers),
            status: response.status(),
            response: Some(response),
            guard: None,
        }
    }

    /// Attach the connection slot taken when the backend was selected.
    pub fn with_guard(mut self, guard: BackendConnectionGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn request_body(&self) -> RequestBody {
        self.request_body
    }

    /// Request `Content-Length`, if declared.
    pub fn request_content_length(&self) -> Option<u64> {
        match self.request_body {
            RequestBody::Length(n) => Some(n),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn backend(&self) -> Option<&Arc<Backend>> {
        self.guard.as_ref().map(|g| &g.backend)
    }

    pub fn is_released(&self) -> bool {
        self.response.is_none()
    }

    /// Give the backend slot back and discard the unread response.
    ///
    /// The response body is read to its end in a background task so the
    /// upstream connection can go back to the keep-alive pool. Outside a
    /// Tokio runtime the body is dropped instead.
    pub fn release(&mut self) {
        let backend = self.guard.take();
        if let Some(response) = self.response.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(drain(response.into_body()));
            }
        }
        if let Some(guard) = backend {
            tracing::trace!(backend = %guard.name, "Backend exchange released");
        }
    }

    /// Response to send to the client; `None` once released.
    pub fn into_response(mut self) -> Option<Response<Body>> {
        self.response.take()
    }
}

/// Bodies larger than this are not worth reading just to reuse a connection.
const MAX_DRAIN_BYTES: usize = 1 << 20;

/// Read `body` to its end. Returns false when it was abandoned early.
async fn drain(mut body: Body) -> bool {
    let mut drained = 0;
    while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        match frame {
            Ok(frame) => {
                drained += frame.data_ref().map_or(0, |data| data.len());
                if drained > MAX_DRAIN_BYTES {
                    tracing::trace!(drained, "Released body too large, closing upstream connection");
                    return false;
                }
            }
            Err(e) => {
                tracing::trace!(error = %e, "Released body failed while draining");
                return false;
            }
        }
    }
    true
}
