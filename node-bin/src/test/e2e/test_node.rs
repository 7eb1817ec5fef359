use rama::http::{
    BodyExtractExt as _, StatusCode, header::SERVER, service::client::HttpClientExt as _,
};

use vecro_node_lib::http::ServiceResult;

use crate::test::e2e::runtime;

#[tokio::test]
#[tracing_test::traced_test]
async fn test_ping() {
    let node = runtime::spawn_node("pinged", &[]).await;

    let resp = node.client().get(node.url("/ping")).send().await.unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!("pong", resp.try_into_string().await.unwrap());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_leaf_answers_with_its_name() {
    let node = runtime::spawn_node("leaf", &[]).await;

    let resp = node.client().get(node.url("/")).send().await.unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    let server = resp.headers().get(SERVER).unwrap().to_str().unwrap();
    assert!(server.starts_with("vecro-node/"), "server = {server}");

    let result: ServiceResult = resp.try_into_json().await.unwrap();
    assert_eq!(
        result,
        ServiceResult {
            body: "leaf".to_owned(),
            error: None,
        }
    );
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_two_level_topology() {
    let leaf_a = runtime::spawn_node("leaf-a", &[]).await;
    let leaf_b = runtime::spawn_node("leaf-b", &["--delay-time", "20"]).await;
    let mid = runtime::spawn_node("mid", &["--calls", &leaf_b.url("/")]).await;

    let calls = format!("{} {}", leaf_a.url("/"), mid.url("/"));
    let root = runtime::spawn_node("root", &["--calls", &calls]).await;

    let resp = root.client().get(root.url("/")).send().await.unwrap();
    assert_eq!(StatusCode::OK, resp.status());

    let result: ServiceResult = resp.try_into_json().await.unwrap();
    assert_eq!(result.body, "root(leaf-a mid(leaf-b))");
    assert!(result.error.is_none());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_failing_downstream_is_named() {
    let leaf = runtime::spawn_node("healthy", &[]).await;

    // nothing listens on the discard port of the loopback interface
    let calls = format!("{} http://127.0.0.1:9/", leaf.url("/"));
    let root = runtime::spawn_node("broken-root", &["--calls", &calls, "--call-timeout", "5s"])
        .await;

    let resp = root.client().get(root.url("/")).send().await.unwrap();
    assert_eq!(StatusCode::BAD_GATEWAY, resp.status());

    let result: ServiceResult = resp.try_into_json().await.unwrap();
    assert!(result.body.is_empty());
    let error = result.error.unwrap();
    assert!(error.contains("127.0.0.1:9"), "error = {error}");
    // the completed call is named too
    assert!(error.contains(&leaf.socket_addr().to_string()), "error = {error}");
    assert!(error.contains("healthy"), "error = {error}");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_failure_propagates_through_topology() {
    let mid = runtime::spawn_node("mid-broken", &["--calls", "http://127.0.0.1:9/"]).await;
    let root = runtime::spawn_node("root-of-broken", &["--calls", &mid.url("/")]).await;

    let resp = root.client().get(root.url("/")).send().await.unwrap();
    assert_eq!(StatusCode::BAD_GATEWAY, resp.status());

    let result: ServiceResult = resp.try_into_json().await.unwrap();
    let error = result.error.unwrap();
    assert!(error.contains(&mid.socket_addr().to_string()), "error = {error}");
    assert!(error.contains("127.0.0.1:9"), "error = {error}");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_metrics_count_requests() {
    let node = runtime::spawn_node("metered", &[]).await;
    let client = node.client();

    for _ in 0..2 {
        let resp = client.get(node.url("/")).send().await.unwrap();
        assert_eq!(StatusCode::OK, resp.status());
    }

    let resp = client.get(node.url("/metrics")).send().await.unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    let payload = resp.try_into_string().await.unwrap();

    assert!(
        payload.contains(r#"vecro_base_e2e_request_count{vecrosim_service_name="metered"} 2"#),
        "{payload}"
    );
    assert!(
        payload.contains(r#"vecro_base_e2e_latency_histogram_count{vecrosim_service_name="metered"} 2"#),
        "{payload}"
    );
    // {"body":"metered","error":null} twice
    assert!(
        payload.contains(r#"vecro_base_e2e_throughput{vecrosim_service_name="metered"} 62"#),
        "{payload}"
    );
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_workload_cpu_and_io() {
    let io_dir = vecro_node_lib::utils::tmp_dir::try_new("vecro_node_e2e_io_dir").unwrap();
    let io_dir_str = io_dir.display().to_string();
    let node = runtime::spawn_node(
        "worker",
        &["--cpu", "1", "--io", "2", "--io-dir", &io_dir_str],
    )
    .await;

    let resp = node.client().get(node.url("/")).send().await.unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(std::fs::read_dir(&io_dir).unwrap().count(), 0);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_io_failure_fails_request() {
    let missing_dir = vecro_node_lib::utils::tmp_dir::try_new("vecro_node_e2e_io_missing")
        .unwrap()
        .join("missing");
    let missing_dir_str = missing_dir.display().to_string();

    let broken = runtime::spawn_node(
        "io-broken-request",
        &[
            "--io",
            "1",
            "--io-dir",
            &missing_dir_str,
            "--io-failure",
            "fail-request",
        ],
    )
    .await;

    let resp = broken.client().get(broken.url("/")).send().await.unwrap();
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());

    let result: ServiceResult = resp.try_into_json().await.unwrap();
    let error = result.error.unwrap();
    assert!(error.contains("create"), "error = {error}");
}

const IO_ABORT_CHILD_ENV: &str = "VECRO_NODE_E2E_IO_ABORT_CHILD";

#[test]
fn test_io_failure_aborts_process() {
    let output = std::process::Command::new(std::env::current_exe().unwrap())
        .args([
            "test::e2e::test_node::test_io_failure_abort_child",
            "--exact",
            "--ignored",
            "--nocapture",
            "--test-threads=1",
        ])
        .env(IO_ABORT_CHILD_ENV, "1")
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "stderr = {stderr}");
    #[cfg(target_family = "unix")]
    {
        use std::os::unix::process::ExitStatusExt as _;
        // SIGABRT: no unwinding, no exit code
        assert_eq!(output.status.signal(), Some(6), "stderr = {stderr}");
    }
    assert!(
        stderr.contains("stress workload broken, abort process"),
        "stderr = {stderr}"
    );
    assert!(stderr.contains("failed to create temp file"), "stderr = {stderr}");
}

/// Only does something as the child process of `test_io_failure_aborts_process`.
#[tokio::test]
#[ignore = "runs as child process of test_io_failure_aborts_process"]
async fn test_io_failure_abort_child() {
    if std::env::var_os(IO_ABORT_CHILD_ENV).is_none() {
        return;
    }
    vecro_node_lib::utils::telemetry::init_tracing(Default::default()).unwrap();

    let missing_dir = vecro_node_lib::utils::tmp_dir::try_new("vecro_node_e2e_io_abort")
        .unwrap()
        .join("missing");
    let missing_dir_str = missing_dir.display().to_string();

    let broken = runtime::spawn_node(
        "io-broken-abort",
        &["--io", "1", "--io-dir", &missing_dir_str],
    )
    .await;

    // the node aborts the process while serving this request
    let _ = broken.client().get(broken.url("/")).send().await;
}
