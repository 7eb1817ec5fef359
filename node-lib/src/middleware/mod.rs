//! Middleware wrapped around the service core.
//!
//! Each middleware is a [`rama::Layer`] producing a service with the same
//! execute contract as the one it wraps, so they compose in any order.
//! The default chain, as built by [`new_node_service`], is
//! logging → instrumenting → core: the measured latency
//! does not include the logging overhead.

use rama::{Layer as _, Service};

use crate::{
    metrics::NodeMetrics,
    service::{ExecuteError, ExecuteRequest, ExecuteResponse},
};

mod instrumenting;
mod logging;

pub use self::{
    instrumenting::{InstrumentingLayer, InstrumentingService},
    logging::{LoggingLayer, LoggingService},
};

/// Wrap the service core into the default middleware chain.
pub fn new_node_service<S>(
    core: S,
    metrics: NodeMetrics,
) -> impl Service<ExecuteRequest, Output = ExecuteResponse, Error = ExecuteError>
where
    S: Service<ExecuteRequest, Output = ExecuteResponse, Error = ExecuteError>,
{
    (LoggingLayer::new(), InstrumentingLayer::new(metrics)).into_layer(core)
}
