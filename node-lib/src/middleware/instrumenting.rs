use rama::{Layer, Service, telemetry::tracing};
use tokio::time::Instant;

use crate::{
    metrics::NodeMetrics,
    service::{ExecuteError, ExecuteRequest, ExecuteResponse},
};

/// Records every execute call into the [`NodeMetrics`].
///
/// Recording happens when the call is finished or dropped,
/// so errors (and abandoned calls) are counted like successes.
#[derive(Debug, Clone)]
pub struct InstrumentingService<S> {
    inner: S,
    metrics: NodeMetrics,
}

#[derive(Debug, Clone)]
pub struct InstrumentingLayer {
    metrics: NodeMetrics,
}

impl InstrumentingLayer {
    pub fn new(metrics: NodeMetrics) -> Self {
        Self { metrics }
    }
}

impl<S> Service<ExecuteRequest> for InstrumentingService<S>
where
    S: Service<ExecuteRequest, Output = ExecuteResponse, Error = ExecuteError>,
{
    type Output = ExecuteResponse;
    type Error = ExecuteError;

    async fn serve(&self, req: ExecuteRequest) -> Result<Self::Output, Self::Error> {
        let _timer = RequestTimer::start(&self.metrics);
        self.inner.serve(req).await
    }
}

impl<S> Layer<S> for InstrumentingLayer {
    type Service = InstrumentingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentingService {
            inner,
            metrics: self.metrics.clone(),
        }
    }

    fn into_layer(self, inner: S) -> Self::Service {
        InstrumentingService {
            inner,
            metrics: self.metrics,
        }
    }
}

struct RequestTimer<'a> {
    metrics: &'a NodeMetrics,
    start: Instant,
}

impl<'a> RequestTimer<'a> {
    fn start(metrics: &'a NodeMetrics) -> Self {
        Self {
            metrics,
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer<'_> {
    fn drop(&mut self) {
        let took = self.start.elapsed();
        self.metrics.observe(took);
        tracing::info!(?took, "execute instrumented");
    }
}
