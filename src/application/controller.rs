use crate::domain::balance::BalanceObservation;
use crate::domain::policy::SplitPolicy;
use crate::domain::ports::SupervisorRef;
use crate::domain::state::{ControllerState, StateTransition};
use crate::domain::verifier::PaymentVerifier;
use crate::domain::worker::{WorkerExit, WorkerHandle, WorkerId, WorkerSpec};
use crate::error::ControllerError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const TRANSITION_BUFFER: usize = 64;

/// Owns the lifecycle of the single gated worker.
///
/// Every transition goes through one mutex, so `request_start`,
/// `request_stop` and exit notifications can arrive concurrently from HTTP
/// handlers and the supervisor without ever producing two live workers.
/// The lock is held across spawn and signal delivery; an exit notification
/// for a worker that was just spawned is therefore applied only after the
/// controller has recorded it as running.
///
/// Cloning is cheap and every clone drives the same state.
#[derive(Clone)]
pub struct GatedProcessController {
    inner: Arc<Inner>,
}

struct Inner {
    supervisor: SupervisorRef,
    spec: WorkerSpec,
    stop_timeout: Duration,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<ControllerState>,
    transitions: broadcast::Sender<StateTransition>,
}

#[derive(Default)]
struct Slot {
    state: ControllerState,
    worker: Option<WorkerHandle>,
}

impl Slot {
    fn assert_consistent(&self) {
        match self.state {
            ControllerState::Idle => assert!(
                self.worker.is_none(),
                "worker handle attached while controller is idle"
            ),
            ControllerState::Running | ControllerState::Stopping => assert!(
                self.worker.is_some(),
                "controller is {} without a worker handle",
                self.state
            ),
            // The handle is acquired while in this state.
            ControllerState::Starting => {}
        }
    }

    fn worker_id(&self) -> Option<WorkerId> {
        self.worker.as_ref().map(|w| w.id)
    }
}

impl GatedProcessController {
    /// Creates an idle controller.
    ///
    /// # Arguments
    ///
    /// * `supervisor` - Launches and terminates the worker process.
    /// * `spec` - The command run on every successful start.
    /// * `stop_timeout` - How long a signaled worker may take to exit before
    ///   it is force-killed. `Duration::ZERO` disables escalation.
    pub fn new(supervisor: SupervisorRef, spec: WorkerSpec, stop_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ControllerState::Idle);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            inner: Arc::new(Inner {
                supervisor,
                spec,
                stop_timeout,
                slot: Mutex::new(Slot::default()),
                state_tx,
                transitions,
            }),
        }
    }

    /// Verifies the payment split and, if it holds, launches the worker.
    ///
    /// Rejections leave the controller untouched: no transition happens and
    /// the supervisor is never called.
    pub async fn request_start(
        &self,
        caller: &str,
        policy: &SplitPolicy,
        observations: &[BalanceObservation],
    ) -> Result<WorkerHandle, ControllerError> {
        let mut slot = self.inner.slot.lock().await;
        if slot.state.holds_worker() {
            warn!(caller, state = %slot.state, "start rejected: worker already active");
            return Err(ControllerError::AlreadyActive(slot.state));
        }

        let verification = PaymentVerifier::verify(observations, policy);
        if !verification.valid {
            info!(
                caller,
                total = %verification.total_observed,
                reason = verification.reason.as_deref().unwrap_or_default(),
                "start rejected: payment not verified"
            );
            return Err(ControllerError::PaymentNotVerified(Box::new(verification)));
        }

        self.transition(&mut slot, ControllerState::Starting, None);
        match self.inner.supervisor.spawn(&self.inner.spec).await {
            Ok(spawned) => {
                let handle = WorkerHandle {
                    id: spawned.id,
                    pid: spawned.pid,
                    started_by: caller.to_string(),
                    started_at: Utc::now(),
                };
                slot.worker = Some(handle.clone());
                self.transition(&mut slot, ControllerState::Running, Some(spawned.id));
                info!(caller, worker = %spawned.id, pid = ?spawned.pid, "worker started");
                Ok(handle)
            }
            Err(e) => {
                self.transition(&mut slot, ControllerState::Idle, None);
                error!(caller, error = %e, "worker spawn failed");
                Err(ControllerError::SpawnFailed(e.to_string()))
            }
        }
    }

    /// Signals the running worker to stop and returns without waiting.
    ///
    /// The controller stays in `Stopping` until the supervisor reports the
    /// exit. If the worker outlives the stop timeout it is force-killed.
    ///
    /// If the signal cannot be delivered the worker is still alive, so the
    /// controller moves back to `Running` and returns `SignalFailed`. That
    /// is the only way out of `Stopping` other than an exit notification.
    pub async fn request_stop(&self, caller: &str) -> Result<(), ControllerError> {
        let mut slot = self.inner.slot.lock().await;
        if slot.state != ControllerState::Running {
            warn!(caller, state = %slot.state, "stop rejected: no running worker");
            return Err(ControllerError::NotActive(slot.state));
        }
        let Some(worker) = slot.worker_id() else {
            return Err(ControllerError::NotActive(slot.state));
        };

        self.transition(&mut slot, ControllerState::Stopping, Some(worker));
        if let Err(e) = self.inner.supervisor.signal_stop(worker).await {
            self.transition(&mut slot, ControllerState::Running, Some(worker));
            error!(caller, %worker, error = %e, "stop signal failed");
            return Err(ControllerError::SignalFailed(e.to_string()));
        }
        info!(caller, %worker, "stop signaled");
        drop(slot);

        self.arm_escalation(worker);
        Ok(())
    }

    /// Applies a worker exit reported by the supervisor.
    ///
    /// This is the only path that releases a worker handle. Exits are
    /// authoritative whatever the current state, which covers crashes while
    /// running as well as confirmations of a requested stop. Notifications
    /// for a worker other than the current one are ignored.
    pub async fn on_worker_exited(&self, exit: WorkerExit) {
        let mut slot = self.inner.slot.lock().await;
        match slot.worker_id() {
            Some(current) if current == exit.worker => {}
            Some(current) => {
                warn!(worker = %exit.worker, %current, "ignoring exit of stale worker");
                return;
            }
            None => {
                debug!(worker = %exit.worker, "ignoring exit with no active worker");
                return;
            }
        }

        let previous = slot.state;
        slot.worker = None;
        self.transition(&mut slot, ControllerState::Idle, Some(exit.worker));

        if previous == ControllerState::Stopping {
            info!(worker = %exit.worker, code = ?exit.code, "worker stopped");
        } else if exit.is_clean() {
            info!(worker = %exit.worker, "worker exited on its own");
        } else {
            warn!(worker = %exit.worker, code = ?exit.code, "worker crashed");
        }
    }

    /// Snapshot of the current state. Never waits on an in-flight transition.
    pub fn current_state(&self) -> ControllerState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ControllerState> {
        self.inner.state_tx.subscribe()
    }

    pub async fn current_worker(&self) -> Option<WorkerHandle> {
        self.inner.slot.lock().await.worker.clone()
    }

    /// Receives every transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.inner.transitions.subscribe()
    }

    /// Feeds supervisor exit notifications into [`Self::on_worker_exited`].
    pub fn watch_exits(&self, mut exits: mpsc::UnboundedReceiver<WorkerExit>) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(exit) = exits.recv().await {
                controller.on_worker_exited(exit).await;
            }
            debug!("exit notification channel closed");
        })
    }

    fn transition(&self, slot: &mut Slot, to: ControllerState, worker: Option<WorkerId>) {
        let from = slot.state;
        slot.state = to;
        slot.assert_consistent();
        self.inner.state_tx.send_replace(to);
        // No subscribers is fine.
        let _ = self
            .inner
            .transitions
            .send(StateTransition { from, to, worker });
        debug!(%from, %to, ?worker, "controller transition");
    }

    fn arm_escalation(&self, worker: WorkerId) {
        let timeout = self.inner.stop_timeout;
        if timeout.is_zero() {
            return;
        }
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            controller.escalate(worker, timeout).await;
        });
    }

    async fn escalate(&self, worker: WorkerId, waited: Duration) {
        let slot = self.inner.slot.lock().await;
        if slot.state != ControllerState::Stopping || slot.worker_id() != Some(worker) {
            return;
        }
        warn!(%worker, ?waited, "worker did not exit after stop signal, force killing");
        if let Err(e) = self.inner.supervisor.force_kill(worker).await {
            error!(%worker, error = %e, "force kill failed");
        }
    }
}
