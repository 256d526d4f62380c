//! Authorization and payment-status client
//!
//! Protocol (JSON over HTTP):
//! - POST <url>  body {"uid": "<credential>", "cameraIndex": <lane>}
//!   -> {"status": "granted"|"pending_payment"|"denied"|..., "message": "...",
//!       "displayText"?: "...", "subText"?: "..."}
//! - GET <parent of url>/check-gate-command/<credential>
//!   -> {"shouldOpen": bool, "reason"?: "..."}
//!
//! Every failure is returned as a `BackendError`; nothing is retried here.
//! Requests from all lanes share one client and are serialized. The request
//! timeout covers the wait for the shared client as well as the exchange.

use crate::domain::types::{
    AuthorizationVerdict, BackendError, CredentialId, DisplayLines, LaneId, PollOutcome,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::network::NetworkMonitor;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Remote authorization service as seen by a lane
#[async_trait]
pub trait GateBackend: Send + Sync {
    async fn authorize(
        &self,
        lane: LaneId,
        credential: &CredentialId,
    ) -> Result<AuthorizationVerdict, BackendError>;

    /// One payment-status poll for a credential with a pending payment
    async fn check_gate_command(&self, credential: &CredentialId) -> PollOutcome;
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(rename = "displayText", default)]
    display_text: Option<String>,
    #[serde(rename = "subText", default)]
    sub_text: Option<String>,
}

impl AuthResponse {
    fn into_verdict(self) -> AuthorizationVerdict {
        let display = DisplayLines::new(
            self.display_text.unwrap_or_default(),
            self.sub_text.unwrap_or_default(),
        );
        match self.status.as_str() {
            "granted" => AuthorizationVerdict::Granted(display),
            "pending_payment" => AuthorizationVerdict::PendingPayment(display),
            "denied" => AuthorizationVerdict::Denied(display),
            _ => AuthorizationVerdict::Unrecognized { status: self.status, display },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GateCommandResponse {
    #[serde(rename = "shouldOpen")]
    should_open: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse an authorization response body
fn parse_auth_response(body: &str) -> Result<AuthResponse, BackendError> {
    serde_json::from_str(body).map_err(|e| BackendError::MalformedResponse(e.to_string()))
}

/// Parse a gate-command poll response body
fn parse_poll_response(body: &str) -> PollOutcome {
    match serde_json::from_str::<GateCommandResponse>(body) {
        Ok(response) if response.should_open => {
            PollOutcome::OpenApproved(response.reason.unwrap_or_default())
        }
        Ok(_) => PollOutcome::StillPending,
        Err(e) => PollOutcome::PollFailed(BackendError::MalformedResponse(e.to_string())),
    }
}

/// Poll URL prefix: the authorization URL with its last path segment replaced
pub fn derive_poll_base(authorize_url: &str) -> String {
    let parent = match authorize_url.rfind('/') {
        Some(idx) => &authorize_url[..idx],
        None => authorize_url,
    };
    format!("{}/check-gate-command/", parent)
}

/// HTTP client for the authorization service (the AuthorizationClient)
pub struct HttpBackend {
    client: reqwest::Client,
    authorize_url: String,
    poll_base: String,
    network: Arc<dyn NetworkMonitor>,
    metrics: Arc<Metrics>,
    request_timeout: Duration,
    /// Held for the duration of every request
    transport: Mutex<()>,
}

impl HttpBackend {
    pub fn new(
        config: &Config,
        network: Arc<dyn NetworkMonitor>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let request_timeout = Duration::from_millis(config.backend_timeout_ms());
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            authorize_url: config.backend_url().to_string(),
            poll_base: derive_poll_base(config.backend_url()),
            network,
            metrics,
            request_timeout,
            transport: Mutex::new(()),
        })
    }

    pub fn poll_url(&self, credential: &CredentialId) -> String {
        format!("{}{}", self.poll_base, credential)
    }

    /// Send a request and read its body. Any HTTP response counts as
    /// received; the status code is returned alongside the body.
    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<(u16, String), BackendError> {
        let exchange = async {
            let _guard = self.transport.lock().await;

            let response = request.send().await.map_err(|e| BackendError::TransportFailure {
                status: None,
                reason: e.to_string(),
            })?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| BackendError::TransportFailure {
                status: Some(status),
                reason: e.to_string(),
            })?;
            Ok((status, body))
        };

        match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::TransportFailure {
                status: None,
                reason: format!("no response within {} ms", self.request_timeout.as_millis()),
            }),
        }
    }
}

/// Map a body that failed to parse: on an error status the transport is to
/// blame, on a success status the service sent something unexpected
fn classify_unparsed(status: u16, err: BackendError) -> BackendError {
    if (200..300).contains(&status) {
        err
    } else {
        BackendError::TransportFailure { status: Some(status), reason: err.to_string() }
    }
}

#[async_trait]
impl GateBackend for HttpBackend {
    async fn authorize(
        &self,
        lane: LaneId,
        credential: &CredentialId,
    ) -> Result<AuthorizationVerdict, BackendError> {
        if !self.network.is_online().await {
            warn!(lane = %lane, credential = %credential, "auth_network_unavailable");
            return Err(BackendError::NetworkUnavailable);
        }

        let payload = serde_json::json!({ "uid": credential.as_str(), "cameraIndex": lane.0 });
        debug!(lane = %lane, payload = %payload, "auth_request");

        let start = Instant::now();
        let request = self
            .client
            .post(&self.authorize_url)
            .header("Content-Type", "application/json")
            .body(payload.to_string());
        let result = self.fetch(request).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_auth_latency(latency_ms);

        let (status, body) = result?;
        debug!(lane = %lane, status = %status, body = %body, "auth_response");

        let response = parse_auth_response(&body).map_err(|e| classify_unparsed(status, e))?;
        let message = response.message.clone();
        let verdict = response.into_verdict();
        info!(
            lane = %lane,
            credential = %credential,
            verdict = %verdict.as_str(),
            message = %message,
            latency_ms = %latency_ms,
            "auth_verdict"
        );
        Ok(verdict)
    }

    async fn check_gate_command(&self, credential: &CredentialId) -> PollOutcome {
        if !self.network.is_online().await {
            return PollOutcome::PollFailed(BackendError::NetworkUnavailable);
        }

        let url = self.poll_url(credential);
        debug!(url = %url, "payment_poll_request");

        let (status, body) = match self.fetch(self.client.get(&url)).await {
            Ok(response) => response,
            Err(e) => return PollOutcome::PollFailed(e),
        };
        debug!(status = %status, body = %body, "payment_poll_response");

        match parse_poll_response(&body) {
            PollOutcome::PollFailed(e) => PollOutcome::PollFailed(classify_unparsed(status, e)),
            outcome => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::io::network::AlwaysOnline;

    fn backend() -> HttpBackend {
        let config = Config::default().with_backend_url("http://127.0.0.1:9/api/esp32/uid");
        HttpBackend::new(&config, Arc::new(AlwaysOnline), Arc::new(Metrics::new())).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_busy_client_counts_against_timeout() {
        let backend = backend();
        let credential = CredentialId::parse("04A1B2C3").unwrap();
        let start = tokio::time::Instant::now();

        // Another lane holds the client for longer than one request timeout
        let other_lane = async {
            let _held = backend.transport.lock().await;
            tokio::time::sleep(Duration::from_secs(20)).await;
        };
        let this_lane = async {
            tokio::task::yield_now().await;
            let result = backend.authorize(LaneId(2), &credential).await;
            (result, start.elapsed())
        };
        let (_, (result, elapsed)) = tokio::join!(other_lane, this_lane);

        assert!(matches!(result, Err(BackendError::TransportFailure { status: None, .. })));
        assert_eq!(elapsed, Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_behind_busy_client_fails_within_timeout() {
        let backend = backend();
        let credential = CredentialId::parse("0A0B0C0D").unwrap();
        let start = tokio::time::Instant::now();

        let other_lane = async {
            let _held = backend.transport.lock().await;
            tokio::time::sleep(Duration::from_secs(20)).await;
        };
        let this_lane = async {
            tokio::task::yield_now().await;
            let outcome = backend.check_gate_command(&credential).await;
            (outcome, start.elapsed())
        };
        let (_, (outcome, elapsed)) = tokio::join!(other_lane, this_lane);

        assert!(matches!(
            outcome,
            PollOutcome::PollFailed(BackendError::TransportFailure { status: None, .. })
        ));
        assert_eq!(elapsed, Duration::from_millis(5000));
    }

    #[test]
    fn test_derive_poll_base() {
        assert_eq!(
            derive_poll_base("http://192.168.102.6:8080/api/esp32/uid"),
            "http://192.168.102.6:8080/api/esp32/check-gate-command/"
        );
    }

    #[test]
    fn test_verdict_mapping() {
        let granted = parse_auth_response(
            r#"{"status":"granted","message":"ok","displayText":"Welcome","subText":"Drive through"}"#,
        )
        .unwrap()
        .into_verdict();
        assert_eq!(
            granted,
            AuthorizationVerdict::Granted(DisplayLines::new("Welcome", "Drive through"))
        );

        let pending = parse_auth_response(r#"{"status":"pending_payment"}"#).unwrap().into_verdict();
        assert_eq!(pending, AuthorizationVerdict::PendingPayment(DisplayLines::default()));

        let denied = parse_auth_response(r#"{"status":"denied","message":"full","displayText":"Parking full"}"#)
            .unwrap()
            .into_verdict();
        assert_eq!(denied, AuthorizationVerdict::Denied(DisplayLines::new("Parking full", "")));
    }

    #[test]
    fn test_unknown_status_is_unrecognized() {
        let verdict = parse_auth_response(r#"{"status":"maintenance","message":""}"#)
            .unwrap()
            .into_verdict();
        match verdict {
            AuthorizationVerdict::Unrecognized { status, .. } => assert_eq!(status, "maintenance"),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn test_missing_status_is_malformed() {
        let err = parse_auth_response(r#"{"message":"UID received"}"#).unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
        let err = parse_auth_response("<html>oops</html>").unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[test]
    fn test_poll_response_mapping() {
        assert_eq!(
            parse_poll_response(r#"{"shouldOpen":true,"reason":"paid"}"#),
            PollOutcome::OpenApproved("paid".to_string())
        );
        assert_eq!(parse_poll_response(r#"{"shouldOpen":false}"#), PollOutcome::StillPending);
        assert!(matches!(
            parse_poll_response(r#"{"reason":"paid"}"#),
            PollOutcome::PollFailed(BackendError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_unparsed_error_status_is_transport_failure() {
        let err = classify_unparsed(502, BackendError::MalformedResponse("eof".to_string()));
        assert!(matches!(err, BackendError::TransportFailure { status: Some(502), .. }));

        let err = classify_unparsed(200, BackendError::MalformedResponse("eof".to_string()));
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }
}
