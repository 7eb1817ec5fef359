#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

use std::{path::PathBuf, time::Duration};

use rama::{
    error::{BoxError, ErrorContext},
    graceful::{self, ShutdownGuard},
    net::socket::Interface,
    telemetry::tracing::{self, Instrument as _},
};

use clap::Parser;

use vecro_node_lib::{
    config::{CallList, IoFailurePolicy, LoadParameters, NodeIdentity},
    metrics::NodeMetrics,
    stress::MemorySlab,
    utils,
};

pub mod server;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(test)]
pub mod test;

/// CLI arguments for configuring the node, each with an environment fallback.
#[derive(Debug, Clone, Parser)]
#[command(name = "vecro-node")]
#[command(bin_name = "vecro-node")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// name of this node, answered as body and used as metric label
    #[arg(long, env = "VECRO_NAME", default_value = "name")]
    pub name: String,

    /// subsystem of this node, used as metric subsystem
    #[arg(long, env = "VECRO_SUBSYSTEM", default_value = "subsystem")]
    pub subsystem: String,

    /// network interface to bind the node to (`:<port>` binds all interfaces)
    #[arg(
        long,
        short = 'b',
        env = "VECRO_LISTEN_ADDRESS",
        value_name = "INTERFACE",
        default_value = ":8080",
        value_parser = parse_listen_address,
    )]
    pub bind: Interface,

    /// whitespace separated downstream node URLs, called in order for every request
    #[arg(long, env = "VECRO_CALLS", value_name = "URL ...")]
    pub calls: Option<CallList>,

    /// timeout of a single downstream call (0s = no timeout)
    #[arg(
        long,
        env = "VECRO_CALL_TIMEOUT",
        value_name = "DURATION",
        default_value = "30s",
        value_parser = humantime::parse_duration,
    )]
    pub call_timeout: Duration,

    #[command(flatten)]
    pub workload: WorkloadArgs,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// directory in which the bound address is written (`node.addr.txt`)
    #[arg(long, short = 'D')]
    pub data: Option<PathBuf>,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    /// the graceful shutdown timeout (<= 0.0 = no timeout)
    pub graceful: f64,

    #[cfg(target_family = "unix")]
    /// Set the limit of max open file descriptors for this process and its children.
    #[arg(long, value_name = "N", default_value_t = 262_144)]
    pub ulimit: utils::os::rlim_t,
}

/// Simulated load applied by the node.
#[derive(Debug, Clone, clap::Args)]
pub struct WorkloadArgs {
    /// base delay of every request, in milliseconds
    #[arg(long = "delay-time", env = "VECRO_WORKLOAD_DELAY_TIME", default_value_t = 0)]
    pub delay_time_ms: u64,

    /// max deviation of the delay, in milliseconds (default: a tenth of the delay)
    #[arg(long = "delay-jitter", env = "VECRO_WORKLOAD_DELAY_JITTER")]
    pub delay_jitter_ms: Option<u64>,

    /// cpu stress units per request
    #[arg(long = "cpu", env = "VECRO_WORKLOAD_CPU", default_value_t = 0)]
    pub cpu_units: u64,

    /// io stress units per request
    #[arg(long = "io", env = "VECRO_WORKLOAD_IO", default_value_t = 0)]
    pub io_units: u64,

    /// network units (accepted, no stress is applied)
    #[arg(long = "net", env = "VECRO_WORKLOAD_NET", default_value_t = 0)]
    pub net_units: u64,

    /// memory units (MiB) allocated once at startup
    #[arg(long = "memory", env = "VECRO_WORKLOAD_MEMORY", default_value_t = 0)]
    pub memory_units: u64,

    /// directory in which io stress files are written (default: OS temp dir)
    #[arg(long = "io-dir", env = "VECRO_WORKLOAD_IO_DIR")]
    pub io_dir: Option<PathBuf>,

    /// what to do when io stress fails
    #[arg(
        long = "io-failure",
        env = "VECRO_WORKLOAD_IO_FAILURE",
        value_name = "abort | fail-request",
        default_value = "abort"
    )]
    pub io_failure: IoFailurePolicy,
}

impl WorkloadArgs {
    pub fn load_parameters(&self) -> LoadParameters {
        LoadParameters {
            delay_time_ms: self.delay_time_ms,
            delay_jitter_ms: self
                .delay_jitter_ms
                .unwrap_or_else(|| LoadParameters::default_delay_jitter_ms(self.delay_time_ms)),
            cpu_units: self.cpu_units,
            io_units: self.io_units,
            net_units: self.net_units,
            memory_units: self.memory_units,
        }
    }

    pub fn io_dir(&self) -> PathBuf {
        self.io_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Parse a listen address, where a bare `:<port>` binds all interfaces.
fn parse_listen_address(s: &str) -> Result<Interface, BoxError> {
    let s = s.trim();
    let normalized = match s.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => s.to_owned(),
    };
    let interface = normalized
        .parse::<Interface>()
        .context("parse listen address")
        .with_context_field("address", || s.to_owned())?;
    Ok(interface)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    utils::telemetry::init_tracing(utils::telemetry::TelemetryConfig {
        verbose: args.verbose,
        pretty: args.pretty,
        output: args.output.as_deref(),
    })?;

    #[cfg(target_family = "unix")]
    utils::os::raise_nofile(args.ulimit).context("set file descriptor limit")?;

    let base_shutdown_signal = graceful::default_signal();
    if let Err(err) = run_with_args(base_shutdown_signal, args).await {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }

    Ok(())
}

/// Runs the node and blocks until a critical error occurs
/// or the (graceful) shutdown has been initiated.
///
/// This entry point is used by both the (binary) `main` function as well as
/// for the e2e test suite found in the test module.
async fn run_with_args<F>(base_shutdown_signal: F, args: Args) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    if let Some(data) = args.data.as_deref() {
        tokio::fs::create_dir_all(data)
            .await
            .context("create data directory")
            .with_context_debug_field("path", || data.to_owned())?;
    }

    let identity = NodeIdentity::new(args.name.as_str(), args.subsystem.as_str());
    let params = args.workload.load_parameters();
    log_resolved_config(&args, &params);

    let metrics = NodeMetrics::try_new(&identity).context("create node metrics")?;

    // held (and never touched) until the node shut down
    let memory_slab =
        MemorySlab::try_allocate(params.memory_units).context("allocate memory slab")?;

    let graceful_timeout = (args.graceful > 0.).then(|| Duration::from_secs_f64(args.graceful));

    let (error_tx, error_rx) = tokio::sync::mpsc::channel::<BoxError>(1);
    let graceful = graceful::Shutdown::new(new_shutdown_signal(error_rx, base_shutdown_signal));

    graceful.spawn_task_fn(move |guard| run_node_server(args, guard, error_tx, identity, metrics));

    let delay = match graceful_timeout {
        Some(duration) => graceful.shutdown_with_limit(duration).await?,
        None => graceful.shutdown().await,
    };

    tracing::info!(
        slab_bytes = memory_slab.size_bytes(),
        "gracefully shutdown with a delay of: {delay:?}"
    );
    drop(memory_slab);
    Ok(())
}

fn log_resolved_config(args: &Args, params: &LoadParameters) {
    let calls = args.calls.clone().unwrap_or_default();
    tracing::info!(
        name = %args.name,
        subsystem = %args.subsystem,
        bind = %args.bind,
        "node configuration resolved"
    );
    tracing::info!(
        delay_time_ms = params.delay_time_ms,
        delay_jitter_ms = params.delay_jitter_ms,
        cpu_units = params.cpu_units,
        io_units = params.io_units,
        net_units = params.net_units,
        memory_units = params.memory_units,
        io_dir = %args.workload.io_dir().display(),
        io_failure = %args.workload.io_failure,
        "workload configuration resolved"
    );
    tracing::info!(
        call_timeout = ?args.call_timeout,
        "calls configured: {calls}"
    );
}

async fn run_node_server(
    args: Args,
    guard: ShutdownGuard,
    error_tx: tokio::sync::mpsc::Sender<BoxError>,
    identity: NodeIdentity,
    metrics: NodeMetrics,
) {
    tracing::info!("spawning node http server...");
    let service_name = identity.name.clone();
    if let Err(err) = server::run_node_server(args, guard, identity, metrics)
        .instrument(tracing::debug_span!(
            "node server lifetime",
            server.service.name = %service_name,
            otel.kind = "server",
            network.protocol.name = "http",
        ))
        .await
    {
        tracing::error!("node server exited with an error: {err}");
        let _ = error_tx.send(err).await;
    }
}

fn new_shutdown_signal(
    error_rx: tokio::sync::mpsc::Receiver<BoxError>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        let mut mut_error_rx = error_rx;
        let mut signal = Box::pin(base_shutdown_signal);

        tokio::select! {
            _ = signal.as_mut() => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            err = mut_error_rx.recv() => {
                if let Some(err) = err {
                    tracing::error!("fatal err received: {err}; abort");
                } else {
                    tracing::info!("wait for default signal, no error was received");
                    signal.await;
                    tracing::debug!("default signal triggered: init graceful shutdown");
                }
            }
        }
    }
}
