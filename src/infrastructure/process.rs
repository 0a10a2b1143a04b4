use crate::domain::ports::WorkerSupervisor;
use crate::domain::worker::{SpawnedWorker, WorkerExit, WorkerId, WorkerSpec};
use crate::error::SupervisorError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error};

type Reply = oneshot::Sender<Result<(), SupervisorError>>;

enum Control {
    Terminate(Reply),
    Kill(Reply),
}

type Controls = Arc<Mutex<HashMap<WorkerId, mpsc::UnboundedSender<Control>>>>;

/// Runs the worker as an OS child process.
///
/// Each child is owned by a waiter task that reports its exit on the
/// channel returned by [`ProcessSupervisor::new`]. Signals are delivered by
/// that same task, so they can only reach a child that has not been reaped
/// and whose pid cannot have been reused. Stop requests are SIGTERM,
/// escalations are SIGKILL.
pub struct ProcessSupervisor {
    next_id: AtomicU64,
    controls: Controls,
    exits: mpsc::UnboundedSender<WorkerExit>,
}

impl ProcessSupervisor {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkerExit>) {
        let (exits, rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            next_id: AtomicU64::new(1),
            controls: Arc::new(Mutex::new(HashMap::new())),
            exits,
        };
        (supervisor, rx)
    }

    async fn request(
        &self,
        worker: WorkerId,
        control: impl FnOnce(Reply) -> Control,
    ) -> Result<(), SupervisorError> {
        let not_running = || SupervisorError::Signal(format!("{worker} is not running"));
        let (reply, response) = oneshot::channel();
        self.controls
            .lock()
            .await
            .get(&worker)
            .ok_or_else(not_running)?
            .send(control(reply))
            .map_err(|_| not_running())?;
        // The waiter drops the reply if the child exits first.
        response.await.map_err(|_| not_running())?
    }
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<(), SupervisorError> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    let target = Pid::from_raw(pid as i32);
    kill(target, Signal::SIGTERM)
        .map_err(|e| SupervisorError::Signal(format!("SIGTERM to pid {pid}: {e}")))
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> Result<(), SupervisorError> {
    Err(SupervisorError::Signal(
        "graceful stop is only supported on unix".to_string(),
    ))
}

/// Owns `child` until it exits, serving signal requests in the meantime.
async fn supervise(
    id: WorkerId,
    pid: u32,
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<Control>,
    controls: Controls,
    exits: mpsc::UnboundedSender<WorkerExit>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(request) = control.recv() => match request {
                Control::Terminate(reply) => {
                    let result = terminate(pid);
                    debug!(worker = %id, pid, ok = result.is_ok(), "SIGTERM requested");
                    let _ = reply.send(result);
                }
                Control::Kill(reply) => {
                    let result = child
                        .start_kill()
                        .map_err(|e| SupervisorError::Signal(format!("kill pid {pid}: {e}")));
                    debug!(worker = %id, pid, ok = result.is_ok(), "SIGKILL requested");
                    let _ = reply.send(result);
                }
            },
        }
    };

    controls.lock().await.remove(&id);
    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            error!(worker = %id, pid, error = %e, "failed to wait on worker");
            None
        }
    };
    // Receiver gone means the service is shutting down.
    let _ = exits.send(WorkerExit { worker: id, code });
}

#[async_trait]
impl WorkerSupervisor for ProcessSupervisor {
    async fn spawn(&self, spec: &WorkerSpec) -> Result<SpawnedWorker, SupervisorError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SupervisorError::Spawn(format!("{}: {e}", spec.command)))?;
        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::Spawn("failed to get process ID".to_string()))?;

        let id = WorkerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.controls.lock().await.insert(id, control_tx);

        tokio::spawn(supervise(
            id,
            pid,
            child,
            control_rx,
            Arc::clone(&self.controls),
            self.exits.clone(),
        ));

        Ok(SpawnedWorker {
            id,
            pid: Some(pid),
        })
    }

    async fn signal_stop(&self, worker: WorkerId) -> Result<(), SupervisorError> {
        self.request(worker, Control::Terminate).await
    }

    async fn force_kill(&self, worker: WorkerId) -> Result<(), SupervisorError> {
        self.request(worker, Control::Kill).await
    }
}
