use std::net::SocketAddr;
use std::time::Duration;

use hookbatch::cancel::{CancelCause, CancelContext};
use hookbatch::error::AggregatorResult;
use hookbatch::{server, AppState};
use tokio::{net::TcpListener, task::JoinHandle};
use wiremock::{MockServer, Request};

/// 実ポートで起動したテスト用サーバー
#[allow(dead_code)]
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancelContext,
    handle: JoinHandle<AggregatorResult<()>>,
}

#[allow(dead_code)]
impl TestServer {
    /// サーバーがバインドしているアドレスを返す
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://addr` 形式のベースURL
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// サーバーを停止し、バックグラウンドタスクの終了を待つ
    pub async fn stop(self) {
        self.shutdown.cancel(CancelCause::Shutdown);
        let _ = self.handle.await;
    }
}

/// サーバーを `127.0.0.1:0` にバインドして起動する
pub async fn spawn_server(state: AppState) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancelContext::new();
    let handle = tokio::spawn(server::serve(listener, state, shutdown.clone()));

    TestServer {
        addr,
        shutdown,
        handle,
    }
}

/// モックが `count` 件以上受信するまで待つ
#[allow(dead_code)]
pub async fn wait_for_requests(
    mock: &MockServer,
    count: usize,
    timeout: Duration,
) -> Vec<Request> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let requests = mock.received_requests().await.unwrap_or_default();
        if requests.len() >= count || tokio::time::Instant::now() >= deadline {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
