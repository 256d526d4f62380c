//! Mock parking backend
//!
//! Simulates the authorization and payment endpoints for bench testing.
//!
//! Endpoints:
//! - POST /api/esp32/uid                      {"uid", "cameraIndex"} -> verdict
//! - GET  /api/esp32/check-gate-command/<uid> -> {"shouldOpen", "reason"}
//! - POST /api/esp32/pay/<uid>                marks a pending card as paid
//!
//! Behavior:
//! 1. Cards listed in --granted are let through
//! 2. Cards listed in --pending get `pending_payment`; the gate command turns
//!    true once paid, or automatically after --pay-after-secs (0 = never)
//! 3. Everything else is denied
//!
//! Usage:
//!   cargo run --bin mock-backend -- --port 8080 --granted 04A1B2C3 --pending 0A0B0C0D

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

const API_PREFIX: &str = "/api/esp32";

#[derive(Parser, Debug)]
#[command(name = "mock-backend")]
#[command(about = "Mock parking backend for local lane testing")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Cards that are granted access (comma-separated UIDs)
    #[arg(long, value_delimiter = ',')]
    granted: Vec<String>,

    /// Cards that must pay at exit (comma-separated UIDs)
    #[arg(long, value_delimiter = ',')]
    pending: Vec<String>,

    /// Seconds after the first poll-worthy verdict until payment is confirmed
    /// automatically (0 = only via /pay)
    #[arg(long, default_value = "20")]
    pay_after_secs: u64,
}

#[derive(Debug, Deserialize)]
struct AuthRequest {
    uid: String,
    #[serde(rename = "cameraIndex")]
    camera_index: u8,
}

struct MockState {
    granted: HashSet<String>,
    pending: HashSet<String>,
    pay_after: Option<Duration>,
    /// Pending cards awaiting payment, with the time the verdict was given
    awaiting: Mutex<HashMap<String, Instant>>,
    paid: Mutex<HashSet<String>>,
}

impl MockState {
    fn new(args: &Args) -> Self {
        let normalize = |uids: &[String]| -> HashSet<String> {
            uids.iter().map(|u| u.trim().to_uppercase()).collect()
        };
        Self {
            granted: normalize(&args.granted),
            pending: normalize(&args.pending),
            pay_after: (args.pay_after_secs > 0).then(|| Duration::from_secs(args.pay_after_secs)),
            awaiting: Mutex::new(HashMap::new()),
            paid: Mutex::new(HashSet::new()),
        }
    }

    fn authorize(&self, request: &AuthRequest) -> serde_json::Value {
        let uid = request.uid.to_uppercase();
        if self.granted.contains(&uid) {
            println!("[MOCK] lane {} uid {} -> granted", request.camera_index, uid);
            json!({
                "status": "granted",
                "message": "Access granted",
                "displayText": "Welcome",
                "subText": "Drive through"
            })
        } else if self.pending.contains(&uid) {
            println!("[MOCK] lane {} uid {} -> pending_payment", request.camera_index, uid);
            self.paid.lock().remove(&uid);
            self.awaiting.lock().insert(uid, Instant::now());
            json!({
                "status": "pending_payment",
                "message": "Payment required",
                "displayText": "Payment Required",
                "subText": "Pay at kiosk"
            })
        } else {
            println!("[MOCK] lane {} uid {} -> denied", request.camera_index, uid);
            json!({
                "status": "denied",
                "message": "Unknown card",
                "displayText": "Access denied",
                "subText": "Unknown card"
            })
        }
    }

    fn check_gate_command(&self, uid: &str) -> serde_json::Value {
        let uid = uid.to_uppercase();
        let paid = self.paid.lock().contains(&uid);
        let mut awaiting = self.awaiting.lock();
        let auto_paid = match (awaiting.get(&uid), self.pay_after) {
            (Some(since), Some(after)) => since.elapsed() >= after,
            _ => false,
        };

        if awaiting.contains_key(&uid) && (paid || auto_paid) {
            awaiting.remove(&uid);
            println!("[MOCK] gate command for {} -> open", uid);
            json!({ "shouldOpen": true, "reason": "paid" })
        } else {
            json!({ "shouldOpen": false })
        }
    }

    fn pay(&self, uid: &str) -> bool {
        let uid = uid.to_uppercase();
        if !self.awaiting.lock().contains_key(&uid) {
            return false;
        }
        println!("[MOCK] payment received for {}", uid);
        self.paid.lock().insert(uid);
        true
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<MockState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let Some(route) = path.strip_prefix(API_PREFIX) else {
        return Ok(json_response(StatusCode::NOT_FOUND, json!({ "error": "not found" })));
    };

    match (method, route) {
        (Method::POST, "/uid") => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    eprintln!("[MOCK] failed to read request body: {}", e);
                    return Ok(json_response(StatusCode::BAD_REQUEST, json!({ "error": "bad body" })));
                }
            };
            match serde_json::from_slice::<AuthRequest>(&body) {
                Ok(request) => Ok(json_response(StatusCode::OK, state.authorize(&request))),
                Err(e) => {
                    eprintln!("[MOCK] invalid authorization request: {}", e);
                    Ok(json_response(StatusCode::BAD_REQUEST, json!({ "error": e.to_string() })))
                }
            }
        }
        (Method::GET, route) if route.starts_with("/check-gate-command/") => {
            let uid = &route["/check-gate-command/".len()..];
            Ok(json_response(StatusCode::OK, state.check_gate_command(uid)))
        }
        (Method::POST, route) if route.starts_with("/pay/") => {
            let uid = &route["/pay/".len()..];
            if state.pay(uid) {
                Ok(json_response(StatusCode::OK, json!({ "ok": true })))
            } else {
                Ok(json_response(StatusCode::NOT_FOUND, json!({ "ok": false, "error": "not awaiting payment" })))
            }
        }
        _ => Ok(json_response(StatusCode::NOT_FOUND, json!({ "error": "not found" }))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let state = Arc::new(MockState::new(&args));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;

    println!("[MOCK] Parking backend listening on {}", addr);
    println!("[MOCK] granted: {:?}", state.granted);
    println!("[MOCK] pending: {:?} (auto pay after {:?})", state.pending, state.pay_after);

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                eprintln!("[MOCK] connection {} error: {}", peer, e);
            }
        });
    }
}
