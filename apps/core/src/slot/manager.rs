//! The slot manager proper: a single worker task owns the resident-model
//! flag and the per-role FIFO queues — the only mutable shared state in the
//! orchestration core — and every access goes through [`SlotManager`]
//! operations. Callers block on a oneshot reply without holding any lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::slot::backend::ModelBackend;
use crate::slot::{ModelRequest, ModelResult, ModelRole, ModelStatus, ALL_ROLES};

struct Submission {
    request: ModelRequest,
    deadline: Instant,
    timeout_ms: u64,
    reply: oneshot::Sender<Result<ModelResult, CoreError>>,
}

type StatusBoard = Arc<Mutex<HashMap<ModelRole, ModelStatus>>>;

/// Handle to the slot worker. Cheap to clone; all clones funnel into the
/// same queues.
#[derive(Clone)]
pub struct SlotManager {
    tx: mpsc::UnboundedSender<Submission>,
    statuses: StatusBoard,
}

impl SlotManager {
    /// Spawns the worker task that owns the slot state.
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        let statuses: StatusBoard = Arc::new(Mutex::new(
            ALL_ROLES
                .iter()
                .map(|&role| (role, ModelStatus::Unloaded))
                .collect(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            backend,
            rx,
            queues: ALL_ROLES
                .iter()
                .map(|&role| (role, VecDeque::new()))
                .collect(),
            resident: None,
            statuses: Arc::clone(&statuses),
        };
        tokio::spawn(worker.run());

        Self { tx, statuses }
    }

    /// Enqueues `request` for its role and waits for the result.
    ///
    /// `timeout` covers queue wait, any required model load, and the
    /// inference itself. Expiry fails this request only; the resident model
    /// is not torn down and other queued requests for the role still run.
    /// Dropping the returned future before completion withdraws a queued
    /// request with no side effects; an in-flight one runs to its deadline.
    pub async fn submit(
        &self,
        request: ModelRequest,
        timeout: Duration,
    ) -> Result<ModelResult, CoreError> {
        let role = request.role();
        let timeout_ms = timeout.as_millis() as u64;
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(Submission {
                request,
                deadline: Instant::now() + timeout,
                timeout_ms,
                reply: reply_tx,
            })
            .map_err(|_| CoreError::ModelUnavailable {
                role,
                reason: "slot manager is not running".to_string(),
            })?;

        // The deadline is enforced on both sides: here, so a caller queued
        // behind a long request for another role fails on time, and in the
        // worker, which discards the stale queue entry before dispatch.
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::ModelUnavailable {
                role,
                reason: "slot manager dropped the request".to_string(),
            }),
            Err(_) => Err(CoreError::Timeout { role, timeout_ms }),
        }
    }

    /// Read-only view of a role's lifecycle state.
    pub fn status(&self, role: ModelRole) -> ModelStatus {
        self.statuses
            .lock()
            .expect("status board poisoned")
            .get(&role)
            .copied()
            .unwrap_or(ModelStatus::Unloaded)
    }

    /// The role currently holding inference capacity, if any.
    pub fn resident(&self) -> Option<ModelRole> {
        self.statuses
            .lock()
            .expect("status board poisoned")
            .iter()
            .find(|(_, &s)| matches!(s, ModelStatus::Ready | ModelStatus::Busy))
            .map(|(&role, _)| role)
    }
}

enum LoadFailure {
    Failed(String),
    TimedOut,
}

struct Worker {
    backend: Arc<dyn ModelBackend>,
    rx: mpsc::UnboundedReceiver<Submission>,
    queues: HashMap<ModelRole, VecDeque<Submission>>,
    resident: Option<ModelRole>,
    statuses: StatusBoard,
}

impl Worker {
    async fn run(mut self) {
        loop {
            if self.queued_total() == 0 {
                match self.rx.recv().await {
                    Some(submission) => self.enqueue(submission),
                    None => break, // all handles dropped, nothing queued
                }
            }
            while let Ok(submission) = self.rx.try_recv() {
                self.enqueue(submission);
            }
            if let Some(role) = self.next_role() {
                self.serve_one(role).await;
            }
        }
    }

    fn enqueue(&mut self, submission: Submission) {
        let role = submission.request.role();
        self.queues
            .get_mut(&role)
            .expect("queue exists for every role")
            .push_back(submission);
    }

    fn queued_total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Batch-by-role: the resident role's queue is drained before any
    /// switch, since switching costs far more than a single inference.
    /// Across roles the scan order is fixed — no fairness guarantee.
    fn next_role(&self) -> Option<ModelRole> {
        if let Some(role) = self.resident {
            if !self.queues[&role].is_empty() {
                return Some(role);
            }
        }
        ALL_ROLES
            .into_iter()
            .find(|role| !self.queues[role].is_empty())
    }

    async fn serve_one(&mut self, role: ModelRole) {
        let Some(submission) = self.queues.get_mut(&role).and_then(VecDeque::pop_front) else {
            return;
        };

        // Caller gave up while queued: discard before any load is triggered.
        if submission.reply.is_closed() {
            debug!(%role, "dropping cancelled request");
            return;
        }

        if Instant::now() >= submission.deadline {
            let _ = submission.reply.send(Err(CoreError::Timeout {
                role,
                timeout_ms: submission.timeout_ms,
            }));
            return;
        }

        if self.resident != Some(role) {
            if let Err(failure) = self.make_resident(role, submission.deadline).await {
                let head_error = match failure {
                    LoadFailure::TimedOut => CoreError::Timeout {
                        role,
                        timeout_ms: submission.timeout_ms,
                    },
                    LoadFailure::Failed(reason) => CoreError::ModelUnavailable { role, reason },
                };
                let _ = submission.reply.send(Err(head_error));
                self.fail_queued(role, "model load failed");
                return;
            }
        }

        self.set_status(role, ModelStatus::Busy);
        let remaining = submission.deadline.duration_since(Instant::now());
        let outcome = tokio::time::timeout(remaining, self.backend.infer(&submission.request)).await;
        // The resident model survives a failed or timed-out inference;
        // only load/unload failures mark a role Failed.
        self.set_status(role, ModelStatus::Ready);

        let reply = match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(CoreError::Inference {
                role,
                reason: e.to_string(),
            }),
            Err(_) => Err(CoreError::Timeout {
                role,
                timeout_ms: submission.timeout_ms,
            }),
        };
        let _ = submission.reply.send(reply);
    }

    /// Unloads the current resident (if any), then loads `role`, bounded by
    /// the head request's deadline so a hung load can never leave the role
    /// stuck in `Loading`.
    async fn make_resident(
        &mut self,
        role: ModelRole,
        deadline: Instant,
    ) -> Result<(), LoadFailure> {
        if let Some(prev) = self.resident.take() {
            info!(from = %prev, to = %role, "switching resident model");
            match self.backend.unload(prev).await {
                Ok(()) => self.set_status(prev, ModelStatus::Unloaded),
                Err(e) => {
                    // Residency is considered free either way; prev's queue
                    // is empty by construction (drained before a switch).
                    warn!(model = %prev, error = %e, "model unload failed");
                    self.set_status(prev, ModelStatus::Failed);
                }
            }
        }

        self.set_status(role, ModelStatus::Loading);
        let remaining = deadline.duration_since(Instant::now());
        match tokio::time::timeout(remaining, self.backend.load(role)).await {
            Ok(Ok(())) => {
                info!(model = %role, "model loaded");
                self.set_status(role, ModelStatus::Ready);
                self.resident = Some(role);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(model = %role, error = %e, "model load failed");
                self.set_status(role, ModelStatus::Failed);
                Err(LoadFailure::Failed(e.to_string()))
            }
            Err(_) => {
                warn!(model = %role, "model load timed out");
                self.set_status(role, ModelStatus::Failed);
                Err(LoadFailure::TimedOut)
            }
        }
    }

    /// Fails every request still queued for `role`. The next `submit` for
    /// the role triggers a fresh load attempt — there is no background
    /// retry loop, so repeated failures surface to callers instead of
    /// looping silently.
    fn fail_queued(&mut self, role: ModelRole, reason: &str) {
        let queue = self
            .queues
            .get_mut(&role)
            .expect("queue exists for every role");
        for submission in queue.drain(..) {
            let _ = submission.reply.send(Err(CoreError::ModelUnavailable {
                role,
                reason: reason.to_string(),
            }));
        }
    }

    fn set_status(&self, role: ModelRole, status: ModelStatus) {
        self.statuses
            .lock()
            .expect("status board poisoned")
            .insert(role, status);
    }
}
