//! HTTP collaborator boundary.
//!
//! The [`Registry`](crate::registry::Registry) performs every GET through an
//! [`HttpTransport`]. A transport accepts fire-and-forget requests and hands
//! back a stream of [`TransportEvent`]s: headers once, body chunks in order,
//! then exactly one of `Done` or `Failed`. The registry pulls events and
//! applies them to catalog and install state on its own thread, so
//! transports never touch that state directly.
//!
//! [`ReqwestTransport`] is the production implementation. Tests script
//! responses with `test_utils::MockTransport`.

pub mod http;

pub use http::ReqwestTransport;

use futures::future::BoxFuture;
use std::fmt;

/// Identifies one request for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Progress of a request, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Response headers arrived.
    Headers {
        /// Request the event belongs to
        id: RequestId,
        /// HTTP status code
        status: u16,
        /// Declared body length, if the server sent one
        content_length: Option<u64>,
    },
    /// A chunk of the response body.
    Body {
        /// Request the event belongs to
        id: RequestId,
        /// Raw bytes
        data: Vec<u8>,
    },
    /// The body was received completely.
    Done {
        /// Request the event belongs to
        id: RequestId,
    },
    /// The request failed before completing.
    Failed {
        /// Request the event belongs to
        id: RequestId,
        /// Transport-level description (DNS, connect, timeout, reset...)
        reason: String,
    },
}

impl TransportEvent {
    /// Request the event belongs to.
    pub fn id(&self) -> RequestId {
        match self {
            Self::Headers { id, .. }
            | Self::Body { id, .. }
            | Self::Done { id }
            | Self::Failed { id, .. } => *id,
        }
    }

    /// True for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

/// Non-blocking HTTP GET service.
pub trait HttpTransport {
    /// Starts `GET url`. Events for the request are tagged with `id`.
    fn start(&mut self, id: RequestId, url: &str);

    /// Aborts a request. Events already produced may still be delivered;
    /// callers discard them.
    fn cancel(&mut self, id: RequestId);

    /// Returns the next event if one is ready.
    fn try_next_event(&mut self) -> Option<TransportEvent>;

    /// Waits for the next event. Resolves to `None` when no further event
    /// can arrive.
    fn next_event(&mut self) -> BoxFuture<'_, Option<TransportEvent>>;
}
