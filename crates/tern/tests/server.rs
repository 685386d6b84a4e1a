//! The control-plane front end over a real TCP socket.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use tern::modules::build_router;
use tern::server::frame::{read_frame, write_frame};
use tern::server::{self, ServerSettings};
use tern_config::AgentConfig;
use tern_stats::StatsCore;

const TOKEN: &str = "0123456789abcdef";
const MAX_FRAME: usize = 64 * 1024;

struct Agent {
    _dir: tempfile::TempDir,
    addr: std::net::SocketAddr,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl Agent {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::default();
        config.nginx.root_config = dir.path().join("nginx/nginx.conf");
        config.apache.root_config = dir.path().join("apache2/apache2.conf");
        config.certificates.storage_dir = Some(dir.path().join("certificates"));
        config.acme.common_dir = Some(dir.path().join("acme"));
        config.acme.work_dir = Some(dir.path().join("acme-work"));

        let router = Arc::new(build_router(&config, Arc::new(StatsCore::new())));
        let settings = Arc::new(ServerSettings {
            token: TOKEN.to_string(),
            max_frame_bytes: MAX_FRAME,
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            server::start(listener, router, settings, token).await.unwrap();
        });
        Self {
            _dir: dir,
            addr,
            cancel,
            task,
        }
    }

    async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.task.await.unwrap();
    }
}

async fn call(stream: &mut TcpStream, request: Value) -> Value {
    write_frame(stream, request.to_string().as_bytes())
        .await
        .unwrap();
    let payload = read_frame(stream, MAX_FRAME).await.unwrap().unwrap();
    serde_json::from_slice(&payload).unwrap()
}

#[tokio::test]
async fn bad_token_is_refused_but_connection_stays_open() {
    let agent = Agent::start().await;
    let mut stream = agent.connect().await;

    let refused = call(&mut stream, json!({"Command": "main.refresh", "Token": "nope"})).await;
    assert_eq!(refused["Status"], "error");
    assert_eq!(refused["Code"], "unauthorized");

    let missing = call(&mut stream, json!({"Command": "main.refresh"})).await;
    assert_eq!(missing["Code"], "unauthorized");

    let ok = call(&mut stream, json!({"Command": "main.refresh", "Token": TOKEN})).await;
    assert_eq!(ok["Status"], "ok");
    assert_eq!(ok["Data"]["agent_version"], env!("CARGO_PKG_VERSION"));

    agent.stop().await;
}

#[tokio::test]
async fn bare_command_routes_to_main() {
    let agent = Agent::start().await;
    let mut stream = agent.connect().await;

    let vhosts = call(&mut stream, json!({"Command": "getVhosts", "Token": TOKEN})).await;
    assert_eq!(vhosts["Status"], "ok");
    assert_eq!(vhosts["Data"], json!([]));

    let stored = call(
        &mut stream,
        json!({"Command": "certificates.storagecertificates", "Token": TOKEN}),
    )
    .await;
    assert_eq!(stored["Data"], json!([]));

    let stats = call(
        &mut stream,
        json!({
            "Command": "servermonitor.loadStatisticsData",
            "Token": TOKEN,
            "Data": {"category": "cpu"}
        }),
    )
    .await;
    assert_eq!(stats["Status"], "ok");
    assert_eq!(stats["Data"], json!([]));

    agent.stop().await;
}

#[tokio::test]
async fn handler_errors_become_error_responses() {
    let agent = Agent::start().await;
    let mut stream = agent.connect().await;

    let unknown = call(&mut stream, json!({"Command": "main.selfDestruct", "Token": TOKEN})).await;
    assert_eq!(unknown["Status"], "error");
    assert_eq!(unknown["Code"], "unknown_command");

    let missing = call(
        &mut stream,
        json!({
            "Command": "certificates.storagecertdata",
            "Token": TOKEN,
            "Data": {"name": "absent.example.com"}
        }),
    )
    .await;
    assert_eq!(missing["Code"], "not_found");
    assert!(missing["Error"].as_str().unwrap().contains("absent.example.com"));

    // Not JSON at all: answered, and the connection is still usable.
    write_frame(&mut stream, b"{not json").await.unwrap();
    let payload = read_frame(&mut stream, MAX_FRAME).await.unwrap().unwrap();
    let garbled: Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(garbled["Code"], "parse_error");

    let ok = call(&mut stream, json!({"Command": "refresh", "Token": TOKEN})).await;
    assert_eq!(ok["Status"], "ok");

    agent.stop().await;
}

#[tokio::test]
async fn oversized_frame_closes_the_connection() {
    let agent = Agent::start().await;
    let mut stream = agent.connect().await;

    stream
        .write_all(&((MAX_FRAME as u32) + 1).to_be_bytes())
        .await
        .unwrap();
    let payload = read_frame(&mut stream, MAX_FRAME).await.unwrap().unwrap();
    let response: Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(response["Status"], "error");
    assert_eq!(response["Code"], "parse_error");

    assert!(read_frame(&mut stream, MAX_FRAME).await.unwrap().is_none());

    agent.stop().await;
}

#[tokio::test]
async fn connections_are_independent() {
    let agent = Agent::start().await;
    let mut first = agent.connect().await;
    let mut second = agent.connect().await;

    let a = call(&mut first, json!({"Command": "refresh", "Token": TOKEN}));
    let b = call(&mut second, json!({"Command": "getVhosts", "Token": TOKEN}));
    let (a, b) = tokio::join!(a, b);
    assert_eq!(a["Status"], "ok");
    assert_eq!(b["Status"], "ok");

    agent.stop().await;
}
