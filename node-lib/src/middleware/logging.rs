use rama::{Layer, Service, telemetry::tracing};
use tokio::time::Instant;

use crate::service::{ExecuteError, ExecuteRequest, ExecuteResponse};

/// Logs every execute call, together with its outcome and duration.
///
/// Purely observational: the inner result is returned as is.
#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingLayer;

impl LoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Service<ExecuteRequest> for LoggingService<S>
where
    S: Service<ExecuteRequest, Output = ExecuteResponse, Error = ExecuteError>,
{
    type Output = ExecuteResponse;
    type Error = ExecuteError;

    async fn serve(&self, req: ExecuteRequest) -> Result<Self::Output, Self::Error> {
        let start = Instant::now();
        let result = self.inner.serve(req).await;
        let took = start.elapsed();

        match &result {
            Ok(resp) => tracing::info!(method = "execute", output = %resp.body, ?took, "execute ok"),
            Err(err) => tracing::info!(method = "execute", error = %err, ?took, "execute failed"),
        }
        result
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService { inner }
    }
}
