//! Workload stress engine.
//!
//! Consumes real wall-clock time (delay), CPU time and disk I/O proportional
//! to the configured [`LoadParameters`]. Only the delay is randomized,
//! CPU and I/O work is exact in amount (not in duration).
//!
//! Memory is not part of the per-request run: see [`MemorySlab`],
//! which is allocated once at startup.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use rama::telemetry::tracing::{self, Instrument as _};

use crate::config::{IoFailurePolicy, LoadParameters};

mod cpu;
mod delay;
mod io;
mod memory;

pub use self::{
    cpu::{CPU_OPS_BASE, CpuStressReport, cpu_stress},
    delay::{delay, realize_delay},
    io::{
        IO_CHUNK_SIZE, IO_OPS_BASE, IO_SYNC_THRESHOLD, IoStage, IoStressReport,
        ResourceStressError, io_stress,
    },
    memory::{MEMORY_COUNT_BASE, MemorySlab},
};


/// What one engine run actually consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StressReport {
    pub delay: Option<Duration>,
    pub cpu: Option<CpuStressReport>,
    pub io: Option<IoStressReport>,
    pub elapsed: Duration,
}

/// Runs the per-request workload: delay, then CPU, then I/O.
#[derive(Debug, Clone)]
pub struct StressEngine {
    params: LoadParameters,
    io_dir: Arc<Path>,
    io_failure_policy: IoFailurePolicy,
}

impl StressEngine {
    pub fn new(params: LoadParameters, io_dir: impl Into<PathBuf>) -> Self {
        let io_dir: PathBuf = io_dir.into();
        Self {
            params,
            io_dir: io_dir.into(),
            io_failure_policy: IoFailurePolicy::default(),
        }
    }

    /// Define what happens when the workload breaks half-way (e.g. an io failure).
    ///
    /// The policy is applied by the run itself, so it holds
    /// even when nobody awaits the outcome anymore.
    pub fn with_io_failure_policy(mut self, policy: IoFailurePolicy) -> Self {
        self.io_failure_policy = policy;
        self
    }

    pub fn io_failure_policy(&self) -> IoFailurePolicy {
        self.io_failure_policy
    }

    pub fn params(&self) -> &LoadParameters {
        &self.params
    }

    pub fn io_dir(&self) -> &Path {
        &self.io_dir
    }

    /// Run the full workload once.
    ///
    /// The run is detached from the calling future: once started it completes
    /// even when the caller is dropped (e.g. the client disconnected).
    /// CPU and I/O phases block a dedicated worker thread,
    /// the delay only suspends the run's own task.
    ///
    /// A broken workload aborts the process under [`IoFailurePolicy::Abort`],
    /// otherwise it is logged and returned.
    pub async fn run(&self) -> Result<StressReport, ResourceStressError> {
        let engine = self.clone();
        let run = async move {
            let result = engine.run_inner().await;
            if let Err(err) = &result {
                engine.handle_workload_error(err);
            }
            result
        };
        match tokio::spawn(run.in_current_span()).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(ResourceStressError::Interrupted(err)),
        }
    }

    fn handle_workload_error(&self, err: &ResourceStressError) {
        if !err.is_workload_broken() {
            return;
        }
        if self.io_failure_policy == IoFailurePolicy::Abort {
            tracing::error!("stress workload broken, abort process: {err}");
            std::process::abort();
        }
        tracing::error!("stress workload broken, fail request: {err}");
    }

    async fn run_inner(&self) -> Result<StressReport, ResourceStressError> {
        let start = Instant::now();
        let LoadParameters {
            delay_time_ms,
            delay_jitter_ms,
            cpu_units,
            io_units,
            ..
        } = self.params;

        let delay = delay(delay_time_ms, delay_jitter_ms).await;

        let (cpu, io) = if cpu_units > 0 || io_units > 0 {
            let io_dir = self.io_dir.clone();
            let blocking = tokio::task::spawn_blocking(move || {
                let cpu = (cpu_units > 0).then(|| cpu_stress(cpu_units));
                let io = if io_units > 0 {
                    Some(io_stress(io_units, &io_dir)?)
                } else {
                    None
                };
                Ok::<_, ResourceStressError>((cpu, io))
            });
            match blocking.await {
                Ok(result) => result?,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => return Err(ResourceStressError::Interrupted(err)),
            }
        } else {
            (None, None)
        };

        let elapsed = start.elapsed();
        tracing::debug!(?elapsed, "all-stress finished");

        Ok(StressReport {
            delay,
            cpu,
            io,
            elapsed,
        })
    }
}
