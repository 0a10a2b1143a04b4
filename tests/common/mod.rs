#![allow(dead_code)]

use async_trait::async_trait;
use botgate::application::controller::GatedProcessController;
use botgate::application::service::GateService;
use botgate::domain::policy::SplitPolicy;
use botgate::domain::ports::WorkerSupervisor;
use botgate::domain::worker::{SpawnedWorker, WorkerExit, WorkerId, WorkerSpec};
use botgate::error::SupervisorError;
use botgate::infrastructure::in_memory::{InMemoryBalanceSource, InMemoryProfitLedger};
use botgate::interfaces::http::routes;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A supervisor that launches nothing and records every call.
///
/// Exits are only reported when a test calls [`FakeSupervisor::exit`], or
/// when a force kill is requested.
pub struct FakeSupervisor {
    next_id: AtomicU64,
    spawn_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    kill_calls: AtomicUsize,
    fail_spawn: AtomicBool,
    fail_signal: AtomicBool,
    exits: mpsc::UnboundedSender<WorkerExit>,
}

impl FakeSupervisor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<WorkerExit>) {
        let (exits, rx) = mpsc::unbounded_channel();
        let supervisor = Arc::new(Self {
            next_id: AtomicU64::new(1),
            spawn_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            kill_calls: AtomicUsize::new(0),
            fail_spawn: AtomicBool::new(false),
            fail_signal: AtomicBool::new(false),
            exits,
        });
        (supervisor, rx)
    }

    pub fn spawn_calls(&self) -> usize {
        self.spawn_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> usize {
        self.kill_calls.load(Ordering::SeqCst)
    }

    pub fn fail_spawn(&self, fail: bool) {
        self.fail_spawn.store(fail, Ordering::SeqCst);
    }

    pub fn fail_signal(&self, fail: bool) {
        self.fail_signal.store(fail, Ordering::SeqCst);
    }

    /// Reports that `worker` terminated with `code`.
    pub fn exit(&self, worker: WorkerId, code: Option<i32>) {
        self.exits.send(WorkerExit { worker, code }).unwrap();
    }
}

#[async_trait]
impl WorkerSupervisor for FakeSupervisor {
    async fn spawn(&self, _spec: &WorkerSpec) -> Result<SpawnedWorker, SupervisorError> {
        self.spawn_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(SupervisorError::Spawn("no such file".to_string()));
        }
        Ok(SpawnedWorker {
            id: WorkerId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            pid: None,
        })
    }

    async fn signal_stop(&self, _worker: WorkerId) -> Result<(), SupervisorError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_signal.load(Ordering::SeqCst) {
            return Err(SupervisorError::Signal("permission denied".to_string()));
        }
        Ok(())
    }

    async fn force_kill(&self, worker: WorkerId) -> Result<(), SupervisorError> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.exit(worker, None);
        Ok(())
    }
}

/// The 60/20/20 payout policy with a 5 point tolerance.
pub fn payout_policy() -> SplitPolicy {
    SplitPolicy::new(
        [
            ("U60".to_string(), dec!(0.60)),
            ("U20".to_string(), dec!(0.20)),
            ("R20".to_string(), dec!(0.20)),
        ],
        dec!(0.05),
        dec!(0.001),
    )
}

pub fn controller(
    supervisor: Arc<FakeSupervisor>,
    stop_timeout: Duration,
) -> GatedProcessController {
    GatedProcessController::new(supervisor, WorkerSpec::new("bot"), stop_timeout)
}

pub fn paid_balances() -> InMemoryBalanceSource {
    InMemoryBalanceSource::with_balances([
        ("U60".to_string(), dec!(0.0006)),
        ("U20".to_string(), dec!(0.0002)),
        ("R20".to_string(), dec!(0.0002)),
    ])
}

pub struct TestApp {
    pub base_url: String,
    pub supervisor: Arc<FakeSupervisor>,
    pub balances: InMemoryBalanceSource,
    pub controller: GatedProcessController,
}

/// Serves the full router on an ephemeral port with a fully paid split.
pub async fn spawn_app(api_key: Option<&str>) -> TestApp {
    spawn_app_with(api_key, paid_balances()).await
}

pub async fn spawn_app_with(api_key: Option<&str>, balances: InMemoryBalanceSource) -> TestApp {
    let (supervisor, exits) = FakeSupervisor::new();
    let controller = controller(Arc::clone(&supervisor), Duration::ZERO);
    controller.watch_exits(exits);

    let service = Arc::new(GateService::new(
        payout_policy(),
        Box::new(balances.clone()),
        controller.clone(),
        Box::new(InMemoryProfitLedger::new()),
    ));
    let router = routes::router(service, api_key.map(str::to_string));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{addr}"),
        supervisor,
        balances,
        controller,
    }
}
