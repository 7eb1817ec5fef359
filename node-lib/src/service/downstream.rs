use std::{fmt, time::Duration};

use rama::{
    Service,
    error::BoxError,
    http::{BodyExtractExt as _, Request, Response, StatusCode, service::client::HttpClientExt as _},
    telemetry::tracing,
};

use crate::{config::CallTarget, http::ServiceResult};

/// Invokes one configured downstream node.
#[derive(Debug, Clone)]
pub struct DownstreamCaller<C> {
    target: CallTarget,
    client: C,
    timeout: Option<Duration>,
}

impl<C> DownstreamCaller<C> {
    /// Create a caller for `target`. A `timeout` of `None` waits indefinitely.
    pub fn new(target: CallTarget, client: C, timeout: Option<Duration>) -> Self {
        Self {
            target,
            client,
            timeout,
        }
    }

    pub fn target(&self) -> &CallTarget {
        &self.target
    }
}

impl<C> DownstreamCaller<C>
where
    C: Service<Request, Output = Response, Error: Into<BoxError>>,
{
    /// Call the downstream node once and return the body it answered with.
    pub async fn call(&self) -> Result<String, DownstreamFailure> {
        tracing::debug!(downstream = %self.target, "calling downstream node");

        let result = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.call_inner()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(downstream = %self.target, ?timeout, "downstream call timed out");
                    Err(DownstreamFailure::Timeout(timeout))
                }
            },
            None => self.call_inner().await,
        };

        if let Err(failure) = &result {
            tracing::debug!(downstream = %self.target, "downstream call failed: {failure}");
        }
        result
    }

    async fn call_inner(&self) -> Result<String, DownstreamFailure> {
        let resp = self
            .client
            .get(self.target.uri().clone())
            .send()
            .await
            .map_err(|err| DownstreamFailure::Request(err.into()))?;

        let status = resp.status();
        if !status.is_success() {
            // a failing node still explains itself in the error field
            let remote_error = resp
                .try_into_json::<ServiceResult>()
                .await
                .ok()
                .and_then(|result| result.error);
            return Err(DownstreamFailure::Status {
                status,
                remote_error,
            });
        }

        let result: ServiceResult = resp
            .try_into_json()
            .await
            .map_err(|err| DownstreamFailure::Decode(err.into()))?;

        match result.error {
            Some(err) => Err(DownstreamFailure::Remote(err)),
            None => Ok(result.body),
        }
    }
}

/// Why a single downstream call failed.
#[derive(Debug)]
pub enum DownstreamFailure {
    /// The request could not be sent or no response was received.
    Request(BoxError),
    /// No response within the configured call timeout.
    Timeout(Duration),
    /// The node answered with a non-2xx status.
    Status {
        status: StatusCode,
        remote_error: Option<String>,
    },
    /// The response payload is not a valid service result.
    Decode(BoxError),
    /// A 2xx answer carrying an error.
    Remote(String),
}

impl fmt::Display for DownstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownstreamFailure::Request(err) => write!(f, "request failed: {err}"),
            DownstreamFailure::Timeout(timeout) => write!(f, "timed out after {timeout:?}"),
            DownstreamFailure::Status {
                status,
                remote_error: Some(err),
            } => write!(f, "unexpected status {status}: {err}"),
            DownstreamFailure::Status {
                status,
                remote_error: None,
            } => write!(f, "unexpected status {status}"),
            DownstreamFailure::Decode(err) => write!(f, "malformed service result: {err}"),
            DownstreamFailure::Remote(err) => write!(f, "remote error: {err}"),
        }
    }
}

impl std::error::Error for DownstreamFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DownstreamFailure::Request(err) | DownstreamFailure::Decode(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// A fan-out target failed, stopping the fan-out.
///
/// Names the failing target as well as every target that completed before it,
/// together with the body each of them answered with.
#[derive(Debug)]
pub struct DownstreamCallError {
    target: CallTarget,
    completed: Vec<(CallTarget, String)>,
    failure: DownstreamFailure,
}

impl DownstreamCallError {
    pub(crate) fn new(
        target: CallTarget,
        completed: Vec<(CallTarget, String)>,
        failure: DownstreamFailure,
    ) -> Self {
        Self {
            target,
            completed,
            failure,
        }
    }

    pub fn target(&self) -> &CallTarget {
        &self.target
    }

    pub fn completed(&self) -> &[(CallTarget, String)] {
        &self.completed
    }

    pub fn failure(&self) -> &DownstreamFailure {
        &self.failure
    }
}

impl fmt::Display for DownstreamCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "downstream call to '{}' failed: {}",
            self.target, self.failure
        )?;
        if !self.completed.is_empty() {
            f.write_str(" (completed:")?;
            for (target, body) in &self.completed {
                write!(f, " '{target}' => {body:?}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl std::error::Error for DownstreamCallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.failure)
    }
}
