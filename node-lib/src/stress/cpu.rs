use std::time::{Duration, Instant};

use rama::telemetry::tracing;

/// Number of `sqrt(rand())` operations per CPU unit.
///
/// stress-ng uses 16384 as its minimal unit, one CPU unit is two of those.
pub const CPU_OPS_BASE: u64 = 16_384 * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuStressReport {
    /// Square root operations performed.
    pub ops: u64,
    pub elapsed: Duration,
}

/// Burn CPU: exactly `CPU_OPS_BASE * units` square roots of pseudo-random inputs.
///
/// Blocks the calling thread until done, it never yields.
pub fn cpu_stress(units: u64) -> CpuStressReport {
    let start = Instant::now();
    let target = CPU_OPS_BASE.saturating_mul(units);

    let mut ops = 0u64;
    let mut acc = 0f64;
    while ops < target {
        acc += std::hint::black_box(rand::random::<f64>()).sqrt();
        ops += 1;
    }
    std::hint::black_box(acc);

    let elapsed = start.elapsed();
    tracing::debug!(
        units,
        ops,
        ?elapsed,
        "cpu load amount: {units}, total sqrt(rand()): {ops}"
    );

    CpuStressReport { ops, elapsed }
}
