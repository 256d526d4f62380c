//! Integration tests for the relay buzzer against an in-process relay board

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use lanegate::infra::config::BuzzerConfig;
use lanegate::infra::BuzzerMode;
use lanegate::io::{Buzzer, RelayBuzzer, RelayClient};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Relay board that records every switched path. Listed paths are
/// rejected with a 500 for their first `n` requests.
#[derive(Default)]
struct RelayBoard {
    paths: Mutex<Vec<String>>,
    failing: Mutex<Vec<(String, usize)>>,
}

impl RelayBoard {
    fn failing(path: &str, times: usize) -> Self {
        Self { paths: Mutex::default(), failing: Mutex::new(vec![(path.to_string(), times)]) }
    }

    fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    board: Arc<RelayBoard>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    board.paths.lock().push(path.clone());

    let mut status = StatusCode::OK;
    for (failing_path, remaining) in board.failing.lock().iter_mut() {
        if *failing_path == path && *remaining > 0 {
            *remaining -= 1;
            status = StatusCode::INTERNAL_SERVER_ERROR;
        }
    }

    let mut response = Response::new(Full::new(Bytes::from_static(b"ok")));
    *response.status_mut() = status;
    Ok(response)
}

async fn start_board(board: Arc<RelayBoard>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let board = board.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| handle(req, board.clone()));
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    format!("http://{}", addr)
}

async fn buzzer(board: Arc<RelayBoard>, pulses: u32) -> RelayBuzzer {
    let base = start_board(board).await;
    let config = BuzzerConfig {
        mode: BuzzerMode::Relay,
        on_url: format!("{base}/on"),
        off_url: format!("{base}/off"),
        pulses,
        pulse_ms: 1,
    };
    let relay = Arc::new(RelayClient::new(Duration::from_secs(2)).unwrap());
    RelayBuzzer::new(&config, relay)
}

#[tokio::test]
async fn test_chirp_pulses_on_and_off() {
    let board = Arc::new(RelayBoard::default());
    let buzzer = buzzer(board.clone(), 2).await;

    buzzer.chirp().await;

    assert_eq!(board.paths(), vec!["/on", "/off", "/on", "/off"]);
}

#[tokio::test]
async fn test_rejected_on_still_switches_off() {
    let board = Arc::new(RelayBoard::failing("/on", 1));
    let buzzer = buzzer(board.clone(), 2).await;

    buzzer.chirp().await;

    assert_eq!(board.paths(), vec!["/on", "/off"]);
}

#[tokio::test]
async fn test_rejected_off_is_retried_once() {
    let board = Arc::new(RelayBoard::failing("/off", 1));
    let buzzer = buzzer(board.clone(), 2).await;

    buzzer.chirp().await;

    assert_eq!(board.paths(), vec!["/on", "/off", "/off"]);
}

#[tokio::test]
async fn test_unreachable_relay_returns() {
    let config = BuzzerConfig {
        mode: BuzzerMode::Relay,
        on_url: "http://127.0.0.1:9/on".to_string(),
        off_url: "http://127.0.0.1:9/off".to_string(),
        pulses: 3,
        pulse_ms: 1,
    };
    let relay = Arc::new(RelayClient::new(Duration::from_millis(200)).unwrap());

    tokio::time::timeout(Duration::from_secs(5), RelayBuzzer::new(&config, relay).chirp())
        .await
        .unwrap();
}
