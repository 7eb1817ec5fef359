//! Centralized (web) client creation.
//!
//! Every downstream caller of a node shares the single client
//! created here, including its connection pool.

use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _},
    http::{
        HeaderValue, Request, Response, client::EasyHttpWebClient,
        layer::required_header::AddRequiredRequestHeadersLayer,
    },
    rt::Executor,
};

use crate::utils::env::network_service_identifier;

/// Create a new web client that can be cloned and shared.
pub fn new_web_client(
    exec: Executor,
) -> Result<impl Service<Request, Output = Response, Error: Into<BoxError>> + Clone, BoxError> {
    let client = EasyHttpWebClient::connector_builder()
        .with_default_transport_connector()
        .without_tls_proxy_support()
        .without_proxy_support()
        .with_tls_support_using_boringssl(None)
        .with_default_http_connector(exec)
        .try_with_default_connection_pool()
        .context("create connection pool for downstream web client")?
        .build_client();

    Ok(AddRequiredRequestHeadersLayer::new()
        .with_user_agent_header_value(HeaderValue::from_static(network_service_identifier()))
        .into_layer(client))
}
