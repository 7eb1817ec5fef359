use std::{io::ErrorKind, path::PathBuf, time::Duration};

use clap::Parser;
use rama::{
    Service,
    error::BoxError,
    http::{Request, Response},
    net::address::SocketAddress,
    rt::Executor,
};

use crate::Args;

#[derive(Debug, Clone)]
pub(super) struct Runtime {
    _data_dir: PathBuf,
    addr: SocketAddress,
}

impl Runtime {
    #[inline(always)]
    pub fn socket_addr(&self) -> SocketAddress {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> impl Service<Request, Output = Response, Error: Into<BoxError>> {
        vecro_node_lib::client::new_web_client(Executor::default()).unwrap()
    }
}

/// Spawn a node named `name` on a random loopback port,
/// in its own thread and runtime, and wait until it is bound.
pub(super) async fn spawn_node(name: &str, extra_args: &[&str]) -> Runtime {
    let data_dir = spawn_node_app(name, extra_args);

    let addr = tokio::time::timeout(
        Duration::from_secs(60),
        read_file_or_wait(data_dir.join("node.addr.txt")),
    )
    .await
    .unwrap();

    let runtime = Runtime {
        _data_dir: data_dir,
        addr,
    };
    assert!(runtime.socket_addr().ip_addr.is_loopback());
    runtime
}

async fn read_file_or_wait(path: PathBuf) -> SocketAddress {
    loop {
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => {
                let s = s.trim();
                if s.is_empty() {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
                match s.parse() {
                    Ok(addr) => return addr,
                    Err(err) => {
                        eprintln!("unexpected error parsing socket addr (content={s:?}): {err}");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                }
            }
            Err(err) => {
                if err.kind() == ErrorKind::NotFound {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                } else {
                    panic!("unexpected error: {err}");
                }
            }
        }
    }
}

fn spawn_node_app(name: &str, extra_args: &[&str]) -> PathBuf {
    let data_dir =
        vecro_node_lib::utils::tmp_dir::try_new(&format!("vecro_node_e2e_{name}")).unwrap();
    eprintln!("vecro_node_e2e '{name}' data stored under: {data_dir:?}");

    let mut argv: Vec<String> = [
        "vecro-node",
        "--name",
        name,
        "--subsystem",
        "e2e",
        "--bind",
        "127.0.0.1:0",
        "--graceful",
        "0.42",
    ]
    .into_iter()
    .map(ToOwned::to_owned)
    .collect();
    argv.push("--data".to_owned());
    argv.push(data_dir.display().to_string());
    argv.extend(extra_args.iter().map(|arg| (*arg).to_owned()));

    let args = Args::try_parse_from(argv).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let server_future = crate::run_with_args(std::future::pending::<()>(), args);
        rt.block_on(server_future).expect("serve without errors");
    });

    data_dir
}
