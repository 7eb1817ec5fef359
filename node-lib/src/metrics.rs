//! Prometheus instruments of a node.
//!
//! All instruments live in a [`Registry`] owned by [`NodeMetrics`],
//! which is created once at startup and cloned into every consumer.

use std::time::Duration;

use prometheus::{
    Counter, Encoder as _, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};
use rama::error::{BoxError, ErrorContext as _};

use crate::config::NodeIdentity;

pub const METRICS_NAMESPACE: &str = "vecro_base";
pub const SERVICE_NAME_LABEL: &str = "vecrosim_service_name";

pub const LATENCY_BUCKETS: &[f64] = &[
    0.0002, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 25.0,
];

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    request_count: IntCounter,
    latency_counter: Counter,
    latency_histogram: Histogram,
    throughput: IntCounter,
}

impl std::fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetrics")
            .field("request_count", &self.request_count.get())
            .field("latency_samples", &self.latency_histogram.get_sample_count())
            .field("throughput", &self.throughput.get())
            .finish()
    }
}

impl NodeMetrics {
    pub fn try_new(identity: &NodeIdentity) -> Result<Self, BoxError> {
        let registry = Registry::new();

        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(METRICS_NAMESPACE)
                .subsystem(&*identity.subsystem)
                .const_label(SERVICE_NAME_LABEL, &*identity.name)
        };

        let request_count =
            IntCounter::with_opts(opts("request_count", "number of requests received"))
                .context("create request_count counter")?;
        let latency_counter = Counter::with_opts(opts(
            "latency_counter",
            "total duration of requests in seconds",
        ))
        .context("create latency_counter counter")?;
        let latency_histogram = Histogram::with_opts(
            HistogramOpts::from(opts(
                "latency_histogram",
                "duration of requests in seconds",
            ))
            .buckets(LATENCY_BUCKETS.to_vec()),
        )
        .context("create latency_histogram histogram")?;
        let throughput = IntCounter::with_opts(opts(
            "throughput",
            "total bytes of encoded responses",
        ))
        .context("create throughput counter")?;

        registry
            .register(Box::new(request_count.clone()))
            .context("register request_count")?;
        registry
            .register(Box::new(latency_counter.clone()))
            .context("register latency_counter")?;
        registry
            .register(Box::new(latency_histogram.clone()))
            .context("register latency_histogram")?;
        registry
            .register(Box::new(throughput.clone()))
            .context("register throughput")?;

        Ok(Self {
            registry,
            request_count,
            latency_counter,
            latency_histogram,
            throughput,
        })
    }

    /// Record one finished request, successful or not.
    pub fn observe(&self, latency: Duration) {
        let seconds = latency.as_secs_f64();
        self.request_count.inc();
        self.latency_counter.inc_by(seconds);
        self.latency_histogram.observe(seconds);
    }

    pub fn record_response_size(&self, bytes: usize) {
        self.throughput.inc_by(bytes as u64);
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.get()
    }

    pub fn latency_sample_count(&self) -> u64 {
        self.latency_histogram.get_sample_count()
    }

    pub fn latency_sample_sum(&self) -> f64 {
        self.latency_histogram.get_sample_sum()
    }

    pub fn throughput_bytes(&self) -> u64 {
        self.throughput.get()
    }

    /// Content type of [`Self::encode_text`].
    pub fn text_content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Render all instruments in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, BoxError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("encode metric families")?;
        let text = String::from_utf8(buffer).context("metric exposition is not utf-8")?;
        Ok(text)
    }
}
