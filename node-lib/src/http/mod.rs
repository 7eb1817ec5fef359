//! HTTP transport boundary of a node.
//!
//! `GET /` decodes into an [`ExecuteRequest`], runs the execute pipeline
//! and encodes the outcome as a JSON [`ServiceResult`]. The same wire type
//! is decoded again by a [`crate::service::DownstreamCaller`] one hop up.

use std::{convert::Infallible, sync::Arc};

use rama::{
    Service,
    http::{
        HeaderValue, Request, Response, StatusCode,
        header::CONTENT_TYPE,
        service::web::{Router, response::IntoResponse},
    },
    telemetry::tracing,
};
use serde::{Deserialize, Serialize};

use crate::{
    metrics::NodeMetrics,
    service::{ExecuteError, ExecuteRequest, ExecuteResponse},
};


/// Wire format of a single execute outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceResult {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl ServiceResult {
    /// Encode an execute outcome, returning the status code it is served with.
    pub fn from_execute(result: &Result<ExecuteResponse, ExecuteError>) -> (StatusCode, Self) {
        match result {
            Ok(resp) => (
                StatusCode::OK,
                Self {
                    body: resp.body.clone(),
                    error: None,
                },
            ),
            Err(err) => {
                let status = match err {
                    ExecuteError::Downstream(_) => StatusCode::BAD_GATEWAY,
                    ExecuteError::Stress(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    Self {
                        body: String::new(),
                        error: Some(err.to_string()),
                    },
                )
            }
        }
    }
}

/// Create the http service of a node, serving the execute pipeline,
/// the metrics exposition and a liveness probe.
pub fn new_node_http_service<S>(
    node: S,
    metrics: NodeMetrics,
) -> impl Service<Request, Output = Response, Error = Infallible> + Clone
where
    S: Service<ExecuteRequest, Output = ExecuteResponse, Error = ExecuteError>,
{
    let node = Arc::new(node);
    let exposition_metrics = metrics.clone();

    Arc::new(
        Router::new()
            .with_get("/", move || {
                let node = node.clone();
                let metrics = metrics.clone();
                async move {
                    let result = node.serve(ExecuteRequest).await;
                    execute_result_response(&result, &metrics)
                }
            })
            .with_get("/metrics", move || {
                std::future::ready(metrics_response(&exposition_metrics))
            })
            .with_get("/ping", "pong"),
    )
}

fn execute_result_response(
    result: &Result<ExecuteResponse, ExecuteError>,
    metrics: &NodeMetrics,
) -> Response {
    let (status, service_result) = ServiceResult::from_execute(result);
    match serde_json::to_vec(&service_result) {
        Ok(payload) => {
            metrics.record_response_size(payload.len());
            tracing::info!(response_size = payload.len(), %status, "execute response encoded");
            let mut resp = (status, payload).into_response();
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            resp
        }
        Err(err) => {
            tracing::error!("failed to encode service result: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn metrics_response(metrics: &NodeMetrics) -> Response {
    match metrics.encode_text() {
        Ok(text) => {
            let mut resp = text.into_response();
            resp.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static(metrics.text_content_type()),
            );
            resp
        }
        Err(err) => {
            tracing::error!("failed to encode metrics: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
