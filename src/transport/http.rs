//! reqwest-backed transport.
//!
//! Every request runs as its own tokio task on the runtime that created the
//! transport. Tasks report through an unbounded channel, so a slow consumer
//! never stalls a download; cancelling aborts the task.

use super::{HttpTransport, RequestId, TransportEvent};
use crate::config::RegistryConfig;
use crate::core::{PkgError, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Production [`HttpTransport`].
pub struct ReqwestTransport {
    client: reqwest::Client,
    runtime: Handle,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    tasks: HashMap<RequestId, JoinHandle<()>>,
}

impl ReqwestTransport {
    /// Builds a client from the configured user agent and timeout.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| PkgError::TransportError {
            message: format!("no tokio runtime available: {e}"),
        })?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PkgError::TransportError {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self::with_client(client, runtime))
    }

    /// Uses an existing client and runtime.
    pub fn with_client(client: reqwest::Client, runtime: Handle) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            client,
            runtime,
            events_tx,
            events_rx,
            tasks: HashMap::new(),
        }
    }

    /// Number of requests whose task has not reported completion yet.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    fn observe(&mut self, event: &TransportEvent) {
        if event.is_terminal() {
            self.tasks.remove(&event.id());
        }
    }
}

async fn fetch(
    client: reqwest::Client,
    id: RequestId,
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = events.send(TransportEvent::Failed {
                id,
                reason: e.to_string(),
            });
            return;
        }
    };

    let headers = TransportEvent::Headers {
        id,
        status: response.status().as_u16(),
        content_length: response.content_length(),
    };
    if events.send(headers).is_err() {
        return;
    }

    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let body = TransportEvent::Body {
                    id,
                    data: chunk.to_vec(),
                };
                if events.send(body).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = events.send(TransportEvent::Failed {
                    id,
                    reason: e.to_string(),
                });
                return;
            }
        }
    }

    let _ = events.send(TransportEvent::Done {
        id,
    });
}

impl HttpTransport for ReqwestTransport {
    fn start(&mut self, id: RequestId, url: &str) {
        debug!("GET {url} ({id})");
        let task =
            self.runtime.spawn(fetch(self.client.clone(), id, url.to_string(), self.events_tx.clone()));
        self.tasks.insert(id, task);
    }

    fn cancel(&mut self, id: RequestId) {
        if let Some(task) = self.tasks.remove(&id) {
            debug!("Aborting request {id}");
            task.abort();
        }
    }

    fn try_next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events_rx.try_recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    fn next_event(&mut self) -> BoxFuture<'_, Option<TransportEvent>> {
        Box::pin(async move {
            if self.tasks.is_empty() {
                // Nothing can produce another event; only drain what is queued
                let event = self.events_rx.try_recv().ok()?;
                self.observe(&event);
                return Some(event);
            }
            let event = self.events_rx.recv().await?;
            self.observe(&event);
            Some(event)
        })
    }
}
