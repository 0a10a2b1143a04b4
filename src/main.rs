use botgate::application::controller::GatedProcessController;
use botgate::application::service::{GateService, fetch_observations};
use botgate::config::Config;
use botgate::domain::balance::BalanceObservation;
use botgate::domain::ports::ProfitLedgerBox;
use botgate::domain::state::ControllerState;
use botgate::domain::verifier::PaymentVerifier;
use botgate::infrastructure::csv_ledger::CsvProfitLedger;
use botgate::infrastructure::esplora::EsploraBalanceSource;
use botgate::infrastructure::in_memory::InMemoryProfitLedger;
use botgate::infrastructure::process::ProcessSupervisor;
use botgate::interfaces::http::{self, routes};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, env = "BOTGATE_CONFIG", default_value = "botgate.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Listen port, overriding the configured one
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// API key required in the x-api-key header
        #[arg(long, env = "BOTGATE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Check the payment split once and print the result as JSON
    Verify {
        /// Use LABEL=AMOUNT (in BTC) instead of querying the block explorer.
        /// May be repeated.
        #[arg(long = "observation", value_name = "LABEL=AMOUNT", value_parser = parse_observation)]
        observations: Vec<BalanceObservation>,
    },
}

fn parse_observation(raw: &str) -> std::result::Result<BalanceObservation, String> {
    let (label, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=AMOUNT, got '{raw}'"))?;
    let amount = Decimal::from_str(amount.trim()).map_err(|e| format!("invalid amount: {e}"))?;
    if amount < Decimal::ZERO {
        return Err(format!("amount must not be negative, got {amount}"));
    }
    Ok(BalanceObservation::btc(label.trim(), amount))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load(&cli.config).into_diagnostic()?;

    match cli.command {
        Command::Serve { port, api_key } => serve(config, port, api_key).await,
        Command::Verify { observations } => verify(config, observations).await,
    }
}

async fn serve(config: Config, port: Option<u16>, api_key: Option<String>) -> Result<()> {
    let balances = EsploraBalanceSource::new(
        config.balances.esplora_url.clone(),
        config.policy.addresses(),
        config.request_timeout(),
    )
    .into_diagnostic()?;

    let (supervisor, exits) = ProcessSupervisor::new();
    let controller = GatedProcessController::new(
        Arc::new(supervisor),
        config.worker.clone(),
        config.stop_timeout(),
    );
    controller.watch_exits(exits);

    let ledger: ProfitLedgerBox = match &config.ledger.path {
        Some(path) => {
            info!(path = %path.display(), "recording profit reports to CSV");
            Box::new(CsvProfitLedger::open(path))
        }
        None => Box::new(InMemoryProfitLedger::new()),
    };

    let service = Arc::new(GateService::new(
        config.policy.split_policy(),
        Box::new(balances),
        controller.clone(),
        ledger,
    ));

    let api_key = api_key.or(config.api_key);
    if api_key.is_none() {
        warn!("no api_key configured, every route is unauthenticated");
    }

    let mut listen = config.listen;
    if let Some(port) = port {
        listen.set_port(port);
    }
    let listener = TcpListener::bind(listen).await.into_diagnostic()?;
    http::serve(listener, routes::router(service, api_key))
        .await
        .into_diagnostic()?;

    shutdown_worker(&controller, config.stop_timeout_secs).await;
    Ok(())
}

/// Stops a still-running worker so it does not outlive the service.
async fn shutdown_worker(controller: &GatedProcessController, stop_timeout_secs: u64) {
    match controller.current_state() {
        ControllerState::Idle => return,
        ControllerState::Running => {
            if let Err(e) = controller.request_stop("shutdown").await {
                warn!(error = %e, "could not stop worker at shutdown");
            }
        }
        // In-flight requests have drained; wait for a pending stop to land.
        ControllerState::Starting | ControllerState::Stopping => {}
    }
    // Leave room for the force-kill escalation to land.
    let grace = std::time::Duration::from_secs(stop_timeout_secs + 5);
    let mut state = controller.watch_state();
    let idle = tokio::time::timeout(grace, state.wait_for(|s| *s == ControllerState::Idle)).await;
    if idle.is_err() {
        warn!("worker still running at shutdown");
    }
}

async fn verify(config: Config, observations: Vec<BalanceObservation>) -> Result<()> {
    let policy = config.policy.split_policy();
    let observations = if observations.is_empty() {
        let source = EsploraBalanceSource::new(
            config.balances.esplora_url.clone(),
            config.policy.addresses(),
            config.request_timeout(),
        )
        .into_diagnostic()?;
        fetch_observations(&source, &policy).await.into_diagnostic()?
    } else {
        observations
    };

    let result = PaymentVerifier::verify(&observations, &policy);
    println!(
        "{}",
        serde_json::to_string_pretty(&result).into_diagnostic()?
    );

    if result.valid {
        Ok(())
    } else {
        Err(miette!(
            "payment not verified: {}",
            result.reason.unwrap_or_default()
        ))
    }
}
