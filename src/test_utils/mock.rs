//! Scripted transport and recording delegate.

use crate::catalog::Catalog;
use crate::core::Status;
use crate::install::InstallOutcome;
use crate::registry::RegistryDelegate;
use crate::transport::{HttpTransport, RequestId, TransportEvent};
use futures::future::{self, BoxFuture};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// What the mock server does with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Headers, the body in chunks, then `Done`.
    Reply {
        status: u16,
        body: Vec<u8>,
        chunk_size: usize,
        declare_length: bool,
    },
    /// Headers and the body, then `Failed` instead of `Done`.
    Broken { body: Vec<u8>, reason: String },
    /// `Failed` before any headers.
    Fail(String),
    /// Never answers.
    Hold,
}

impl MockResponse {
    /// `200` with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::Reply {
            status: 200,
            body: body.into(),
            chunk_size: 4096,
            declare_length: true,
        }
    }

    /// Empty body with the given status code.
    pub fn status(code: u16) -> Self {
        Self::Reply {
            status: code,
            body: Vec::new(),
            chunk_size: 4096,
            declare_length: true,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }

    /// `200`, then the connection drops after `body`.
    pub fn broken(body: impl Into<Vec<u8>>) -> Self {
        Self::Broken {
            body: body.into(),
            reason: "connection reset".to_string(),
        }
    }

    pub fn hold() -> Self {
        Self::Hold
    }

    /// Delivers the body in chunks of `size` bytes.
    pub fn chunked(mut self, size: usize) -> Self {
        if let Self::Reply { chunk_size, .. } = &mut self {
            *chunk_size = size.max(1);
        }
        self
    }

    /// Omits the content length from the headers.
    pub fn without_length(mut self) -> Self {
        if let Self::Reply { declare_length, .. } = &mut self {
            *declare_length = false;
        }
        self
    }

    fn events(&self, id: RequestId) -> Vec<TransportEvent> {
        match self {
            Self::Reply {
                status,
                body,
                chunk_size,
                declare_length,
            } => {
                let mut events = vec![TransportEvent::Headers {
                    id,
                    status: *status,
                    content_length: declare_length.then_some(body.len() as u64),
                }];
                events.extend(body.chunks(*chunk_size).map(|chunk| TransportEvent::Body {
                    id,
                    data: chunk.to_vec(),
                }));
                events.push(TransportEvent::Done {
                    id,
                });
                events
            }
            Self::Broken { body, reason } => vec![
                TransportEvent::Headers {
                    id,
                    status: 200,
                    content_length: Some(body.len() as u64 * 2),
                },
                TransportEvent::Body {
                    id,
                    data: body.clone(),
                },
                TransportEvent::Failed {
                    id,
                    reason: reason.clone(),
                },
            ],
            Self::Fail(reason) => vec![TransportEvent::Failed {
                id,
                reason: reason.clone(),
            }],
            Self::Hold => Vec::new(),
        }
    }
}

/// Responses for one URL; the last one served keeps answering.
#[derive(Debug, Default)]
struct Route {
    pending: VecDeque<MockResponse>,
    last: Option<MockResponse>,
}

impl Route {
    fn next(&mut self) -> Option<MockResponse> {
        if let Some(response) = self.pending.pop_front() {
            self.last = Some(response);
        }
        self.last.clone()
    }
}

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<String, Route>,
    fallback: VecDeque<MockResponse>,
    events: VecDeque<TransportEvent>,
    requests: Vec<String>,
    cancelled: Vec<RequestId>,
}

/// In-memory [`HttpTransport`] answering from scripted responses.
///
/// Events of a request are queued as soon as it starts, so a single
/// [`Registry::poll`](crate::registry::Registry::poll) runs whole request
/// chains. Clones share their state: keep one to script and inspect, box
/// another for the registry.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues `response` for `url`. Responses are served in order; the last
    /// one is repeated for further requests.
    pub fn route(&self, url: &str, response: MockResponse) {
        self.state().routes.entry(url.to_string()).or_default().pending.push_back(response);
    }

    /// Queues a response for the next request whose URL has no route.
    /// Unrouted requests without one get a 404.
    pub fn push_response(&self, response: MockResponse) {
        self.state().fallback.push_back(response);
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }

    /// Number of requests for `url`.
    pub fn requests_for(&self, url: &str) -> usize {
        self.state().requests.iter().filter(|r| *r == url).count()
    }

    /// Requests the registry cancelled.
    pub fn cancelled(&self) -> Vec<RequestId> {
        self.state().cancelled.clone()
    }

    /// A boxed clone sharing this transport's state.
    pub fn boxed(&self) -> Box<dyn HttpTransport> {
        Box::new(self.clone())
    }
}

impl HttpTransport for MockTransport {
    fn start(&mut self, id: RequestId, url: &str) {
        let mut state = self.state();
        state.requests.push(url.to_string());
        let routed = state.routes.get_mut(url).and_then(Route::next);
        let response = routed
            .or_else(|| state.fallback.pop_front())
            .unwrap_or_else(|| MockResponse::status(404));
        let events = response.events(id);
        state.events.extend(events);
    }

    fn cancel(&mut self, id: RequestId) {
        let mut state = self.state();
        state.cancelled.push(id);
        state.events.retain(|event| event.id() != id);
    }

    fn try_next_event(&mut self) -> Option<TransportEvent> {
        self.state().events.pop_front()
    }

    fn next_event(&mut self) -> BoxFuture<'_, Option<TransportEvent>> {
        Box::pin(future::ready(self.try_next_event()))
    }
}

/// One notification received by a [`RecordingDelegate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    CatalogRefreshed { url: String, status: Status },
    StartInstall { package_id: String, path: PathBuf },
    Progress { path: PathBuf, downloaded: u64, total: u64 },
    FinishInstall(InstallOutcome),
    FinishUninstall(String),
    PackagesChanged,
}

/// Delegate that stores every notification in a shared list.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelegate {
    events: Arc<Mutex<Vec<RegistryEvent>>>,
}

impl RecordingDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Outcomes of finished installs, in order.
    pub fn outcomes(&self) -> Vec<InstallOutcome> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RegistryEvent::FinishInstall(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: RegistryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl RegistryDelegate for RecordingDelegate {
    fn catalog_refreshed(&mut self, catalog: &Catalog, status: Status) {
        self.record(RegistryEvent::CatalogRefreshed {
            url: catalog.url().to_string(),
            status,
        });
    }

    fn start_install(&mut self, package_id: &str, path: &Path) {
        self.record(RegistryEvent::StartInstall {
            package_id: package_id.to_string(),
            path: path.to_path_buf(),
        });
    }

    fn install_progress(&mut self, path: &Path, downloaded: u64, total: u64) {
        self.record(RegistryEvent::Progress {
            path: path.to_path_buf(),
            downloaded,
            total,
        });
    }

    fn finish_install(&mut self, outcome: &InstallOutcome) {
        self.record(RegistryEvent::FinishInstall(outcome.clone()));
    }

    fn finish_uninstall(&mut self, package_id: &str) {
        self.record(RegistryEvent::FinishUninstall(package_id.to_string()));
    }

    fn available_packages_changed(&mut self) {
        self.record(RegistryEvent::PackagesChanged);
    }
}
