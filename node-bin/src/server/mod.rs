use std::{path::Path, sync::Arc};

use rama::{
    Layer as _,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{
        HeaderValue,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
    },
    net::address::SocketAddress,
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};

use vecro_node_lib::{
    client,
    config::NodeIdentity,
    http::new_node_http_service,
    metrics::NodeMetrics,
    middleware::new_node_service,
    service::NodeService,
    stress::StressEngine,
    utils::env::network_service_identifier,
};

use crate::Args;

/// Bind the node and serve it until the guard triggers a shutdown.
pub async fn run_node_server(
    args: Args,
    guard: ShutdownGuard,
    identity: NodeIdentity,
    metrics: NodeMetrics,
) -> Result<(), BoxError> {
    let exec = Executor::graceful(guard);

    let params = args.workload.load_parameters();
    let engine = StressEngine::new(params, args.workload.io_dir())
        .with_io_failure_policy(args.workload.io_failure);
    let call_timeout = (!args.call_timeout.is_zero()).then_some(args.call_timeout);

    let core = NodeService::new(
        identity,
        engine,
        &args.calls.clone().unwrap_or_default(),
        client::new_web_client(exec.clone()).context("create downstream web client")?,
        call_timeout,
    );

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(network_service_identifier())),
    )
        .into_layer(new_node_http_service(
            new_node_service(core, metrics.clone()),
            metrics,
        ));

    let http_server = HttpServer::auto(exec.clone()).service(Arc::new(http_svc));

    let tcp_listener = TcpListener::bind(args.bind.clone(), exec)
        .await
        .context("bind node http server")?;

    let node_addr = tcp_listener
        .local_addr()
        .context("get bound address for node http server")?;

    tracing::info!("node http server bound to: {node_addr}");
    if let Some(data) = args.data.as_deref() {
        write_server_socket_address_as_file(data, "node", node_addr.into()).await?;
    }

    tcp_listener.serve(http_server).await;

    Ok(())
}

async fn write_server_socket_address_as_file(
    dir: &Path,
    name: &str,
    addr: SocketAddress,
) -> Result<(), BoxError> {
    let path = dir.join(format!("{name}.addr.txt"));
    tokio::fs::write(&path, addr.to_string())
        .await
        .context("write server's socket address to file")
        .context_field("address", addr)
        .with_context_debug_field("path", || path.to_owned())
}
