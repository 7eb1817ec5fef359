//! Service core: one execute runs the stress engine,
//! then fans out to every downstream node in call list order.

use std::{fmt, sync::Arc};

use rama::{
    Service,
    error::BoxError,
    http::{Request, Response},
    telemetry::tracing,
};

use crate::{
    config::{CallList, NodeIdentity},
    stress::{ResourceStressError, StressEngine},
};

mod downstream;
pub use self::downstream::{DownstreamCallError, DownstreamCaller, DownstreamFailure};


/// Input of an execute call. Carries nothing: all load is process-wide config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResponse {
    pub body: String,
}

#[derive(Debug)]
pub enum ExecuteError {
    Downstream(DownstreamCallError),
    Stress(ResourceStressError),
}

impl fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecuteError::Downstream(err) => err.fmt(f),
            ExecuteError::Stress(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ExecuteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecuteError::Downstream(err) => err.source(),
            ExecuteError::Stress(err) => err.source(),
        }
    }
}

impl From<DownstreamCallError> for ExecuteError {
    fn from(value: DownstreamCallError) -> Self {
        Self::Downstream(value)
    }
}

impl From<ResourceStressError> for ExecuteError {
    fn from(value: ResourceStressError) -> Self {
        Self::Stress(value)
    }
}

/// The innermost execute implementation, wrapped by the middleware chain.
#[derive(Debug)]
pub struct NodeService<C> {
    identity: NodeIdentity,
    engine: StressEngine,
    callers: Arc<[DownstreamCaller<C>]>,
}

impl<C: Clone> Clone for NodeService<C> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            engine: self.engine.clone(),
            callers: self.callers.clone(),
        }
    }
}

impl<C: Clone> NodeService<C> {
    /// Create the service core, sharing `client` among one caller per call target.
    pub fn new(
        identity: NodeIdentity,
        engine: StressEngine,
        calls: &CallList,
        client: C,
        call_timeout: Option<std::time::Duration>,
    ) -> Self {
        let callers = calls
            .iter()
            .map(|target| DownstreamCaller::new(target.clone(), client.clone(), call_timeout))
            .collect();
        Self {
            identity,
            engine,
            callers,
        }
    }
}

impl<C> NodeService<C> {
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }
}

impl<C> Service<ExecuteRequest> for NodeService<C>
where
    C: Service<Request, Output = Response, Error: Into<BoxError>>,
{
    type Output = ExecuteResponse;
    type Error = ExecuteError;

    async fn serve(&self, _req: ExecuteRequest) -> Result<Self::Output, Self::Error> {
        match self.engine.run().await {
            Ok(report) => tracing::debug!(?report, "stress workload finished"),
            Err(err) => return Err(ExecuteError::Stress(err)),
        }

        let mut completed: Vec<(_, String)> = Vec::with_capacity(self.callers.len());
        for caller in self.callers.iter() {
            match caller.call().await {
                Ok(body) => completed.push((caller.target().clone(), body)),
                Err(failure) => {
                    return Err(DownstreamCallError::new(
                        caller.target().clone(),
                        completed,
                        failure,
                    )
                    .into());
                }
            }
        }

        Ok(ExecuteResponse {
            body: call_tree_body(
                &self.identity.name,
                completed.iter().map(|(_, body)| body.as_str()),
            ),
        })
    }
}

/// A leaf answers with its own name, a node with calls as `name(child child ...)`.
pub fn call_tree_body<'a>(name: &str, children: impl IntoIterator<Item = &'a str>) -> String {
    let mut children = children.into_iter().peekable();
    if children.peek().is_none() {
        return name.to_owned();
    }

    let mut body = String::with_capacity(name.len() + 2);
    body.push_str(name);
    body.push('(');
    for (idx, child) in children.enumerate() {
        if idx > 0 {
            body.push(' ');
        }
        body.push_str(child);
    }
    body.push(')');
    body
}
