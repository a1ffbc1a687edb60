//! Execution coordinator: correlates requests with results and applies
//! them to the document store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use cellbook_core::{CellId, DocumentStore, ExecutionOutcome, Language, notebook};
use cellbook_transport::{Connector, ExecuteEnvelope, ResultEnvelope, Transport};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::{BackendError, ExecutionBackend};

/// Correlation id linking a request to its inbound results.
pub type RequestId = Uuid;

/// An in-flight execution request.
///
/// Created when a run is initiated; destroyed when a terminal outcome is
/// applied or the request is cancelled.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Correlation id, unique for the coordinator's lifetime.
    pub request_id: RequestId,
    /// Originating cell.
    pub cell_id: CellId,
    /// Source to compile and run.
    pub code: String,
    /// Source language.
    pub language: Language,
    /// Standard input for the program, if any.
    pub stdin: Option<String>,
    /// Submission timestamp (Unix epoch seconds).
    pub submitted_at: i64,
}

impl ExecutionRequest {
    fn new(cell_id: &str, code: String, language: Language, stdin: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            cell_id: cell_id.to_string(),
            code,
            language,
            stdin,
            submitted_at: notebook::now(),
        }
    }
}

/// Coordinator error.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Unknown cell: {0}")]
    UnknownCell(CellId),
}

/// Coordinator configuration.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Per-request timeout.
    ///
    /// On expiry a still-tracked request behaves like a terminal failure:
    /// `Failed { reason: "timeout" }` is applied and the tracking entry
    /// removed. Late results for it are then dropped as unknown. `None`
    /// disables the timer.
    pub request_timeout: Option<Duration>,
}

/// Both directions of the correlation table.
///
/// At most one outstanding request per cell; inserting for a cell with
/// an outstanding request drops the prior entry.
#[derive(Default)]
struct TrackingTable {
    by_request: HashMap<RequestId, CellId>,
    by_cell: HashMap<CellId, RequestId>,
}

impl TrackingTable {
    /// Register a request, superseding any prior one for the same cell.
    /// Returns the superseded request id, if any.
    fn insert(&mut self, request_id: RequestId, cell_id: &str) -> Option<RequestId> {
        let prior = self.by_cell.insert(cell_id.to_string(), request_id);
        if let Some(prior) = prior {
            self.by_request.remove(&prior);
        }
        self.by_request.insert(request_id, cell_id.to_string());
        prior
    }

    fn cell_for(&self, request_id: RequestId) -> Option<CellId> {
        self.by_request.get(&request_id).cloned()
    }

    fn remove_request(&mut self, request_id: RequestId) -> Option<CellId> {
        let cell_id = self.by_request.remove(&request_id)?;
        if self.by_cell.get(&cell_id) == Some(&request_id) {
            self.by_cell.remove(&cell_id);
        }
        Some(cell_id)
    }

    fn remove_cell(&mut self, cell_id: &str) -> Option<RequestId> {
        let request_id = self.by_cell.remove(cell_id)?;
        self.by_request.remove(&request_id);
        Some(request_id)
    }
}

/// Bridges user intent, transport, and document store.
///
/// Owns the request tracking table. Results arriving for requests no
/// longer tracked (superseded, cancelled, or orphaned by cell deletion)
/// are dropped silently; that race is expected, not an error.
pub struct ExecutionCoordinator<C: Connector> {
    transport: Arc<Transport<C>>,
    store: Arc<DocumentStore>,
    config: CoordinatorConfig,
    /// Correlation table. Every lookup or removal and the store write it
    /// gates happen under one lock acquisition, so a concurrent re-run
    /// cannot land `Pending` between them and be overwritten by a stale
    /// result.
    tracked: Mutex<TrackingTable>,
    /// Handle to self for timer tasks; never upgraded after drop.
    weak_self: Weak<Self>,
}

impl<C: Connector> ExecutionCoordinator<C> {
    /// Create a coordinator and register it as the transport's inbound
    /// handler.
    #[must_use]
    pub fn new(
        transport: Arc<Transport<C>>,
        store: Arc<DocumentStore>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        let coordinator = Arc::new_cyclic(|weak_self| Self {
            transport,
            store,
            config,
            tracked: Mutex::new(TrackingTable::default()),
            weak_self: weak_self.clone(),
        });

        let weak = Arc::downgrade(&coordinator);
        coordinator.transport.on_message(move |envelope| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.handle_message(envelope);
            }
        });

        coordinator
    }

    /// The document store this coordinator mutates.
    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Run a cell over the streaming channel.
    ///
    /// Cancels any outstanding request for the cell, applies `Pending`
    /// immediately, and sends the request. Returns the new request id.
    ///
    /// # Errors
    /// Returns `UnknownCell` if the cell is not in the notebook.
    pub fn run_cell(
        &self,
        cell_id: &str,
        code: impl Into<String>,
        language: Language,
        stdin: Option<String>,
    ) -> Result<RequestId, CoordinatorError> {
        self.ensure_cell(cell_id)?;
        let request = ExecutionRequest::new(cell_id, code.into(), language, stdin);
        let request_id = request.request_id;

        self.begin(&request);
        self.transport.send(&ExecuteEnvelope {
            request_id,
            code: request.code,
            language: request.language,
            stdin: request.stdin,
        });
        self.arm_timeout(request_id);

        Ok(request_id)
    }

    /// Run a cell against a request/response backend.
    ///
    /// Tracking and supersede semantics are identical to `run_cell`; the
    /// whole execution resolves to a single terminal outcome. A response
    /// arriving after the request was superseded or cancelled is
    /// discarded.
    ///
    /// # Errors
    /// Returns `UnknownCell` if the cell is not in the notebook.
    pub async fn run_cell_direct<B: ExecutionBackend>(
        &self,
        backend: &B,
        cell_id: &str,
        code: impl Into<String> + Send,
        language: Language,
        stdin: Option<String>,
    ) -> Result<RequestId, CoordinatorError> {
        self.ensure_cell(cell_id)?;
        let request = ExecutionRequest::new(cell_id, code.into(), language, stdin);
        let request_id = request.request_id;
        self.begin(&request);

        let executed = if let Some(limit) = self.config.request_timeout {
            match tokio::time::timeout(limit, backend.execute(&request)).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout),
            }
        } else {
            backend.execute(&request).await
        };

        let outcome = match executed {
            Ok(result) => result.into_outcome(),
            Err(e) => ExecutionOutcome::failed(e.to_string()),
        };

        {
            let mut tracked = self.lock_tracked();
            if let Some(cell_id) = tracked.remove_request(request_id) {
                self.store.apply_outcome(&cell_id, outcome);
            } else {
                tracing::trace!(%request_id, "discarding result for superseded request");
            }
        }

        Ok(request_id)
    }

    /// Cancel the outstanding request for a cell, if any.
    ///
    /// Advisory: the backend may still complete the execution, but its
    /// result will be dropped by correlation id mismatch.
    pub fn cancel(&self, cell_id: &str) {
        let mut tracked = self.lock_tracked();
        if let Some(request_id) = tracked.remove_cell(cell_id) {
            tracing::debug!(%request_id, cell_id, "cancelling request");
            self.store
                .apply_outcome(cell_id, ExecutionOutcome::failed("cancelled"));
        }
    }

    /// Remove a cell from the document, orphaning its outstanding
    /// request. Later results for that request are dropped as unknown.
    pub fn remove_cell(&self, cell_id: &str) {
        let mut tracked = self.lock_tracked();
        if let Some(request_id) = tracked.remove_cell(cell_id) {
            tracing::debug!(%request_id, cell_id, "orphaning request for removed cell");
        }
        self.store.remove_cell(cell_id);
    }

    /// Handle one inbound envelope from the transport.
    ///
    /// Outcomes are applied in delivery order; no reordering or
    /// buffering across requests.
    pub fn handle_message(&self, envelope: ResultEnvelope) {
        let outcome = ExecutionOutcome::from(envelope.payload);
        let terminal = outcome.is_terminal();

        let mut tracked = self.lock_tracked();
        let Some(cell_id) = tracked.cell_for(envelope.request_id) else {
            tracing::trace!(request_id = %envelope.request_id, "dropping result for unknown request");
            return;
        };
        if terminal {
            tracked.remove_request(envelope.request_id);
        }
        self.store.apply_outcome(&cell_id, outcome);
    }

    /// Whether a request is currently tracked. Mostly useful to UIs for
    /// showing a busy indicator.
    #[must_use]
    pub fn is_tracked(&self, request_id: RequestId) -> bool {
        self.lock_tracked().cell_for(request_id).is_some()
    }

    fn begin(&self, request: &ExecutionRequest) {
        let mut tracked = self.lock_tracked();
        if let Some(prior) = tracked.insert(request.request_id, &request.cell_id) {
            tracing::debug!(request_id = %prior, cell_id = %request.cell_id, "superseding outstanding request");
        }
        self.store
            .apply_outcome(&request.cell_id, ExecutionOutcome::Pending);
    }

    fn ensure_cell(&self, cell_id: &str) -> Result<(), CoordinatorError> {
        let present = self
            .store
            .snapshot()
            .is_some_and(|notebook| notebook.contains_cell(cell_id));
        if present {
            Ok(())
        } else {
            Err(CoordinatorError::UnknownCell(cell_id.to_string()))
        }
    }

    fn arm_timeout(&self, request_id: RequestId) {
        let Some(timeout) = self.config.request_timeout else {
            return;
        };
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            let mut tracked = coordinator.lock_tracked();
            if let Some(cell_id) = tracked.remove_request(request_id) {
                tracing::debug!(%request_id, cell_id, "request timed out");
                coordinator
                    .store
                    .apply_outcome(&cell_id, ExecutionOutcome::failed("timeout"));
            }
        });
    }

    fn lock_tracked(&self) -> std::sync::MutexGuard<'_, TrackingTable> {
        self.tracked
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
