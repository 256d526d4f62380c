//! Prometheus metrics HTTP endpoint
//!
//! Exposes controller metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::domain::types::EpisodeOutcome;
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_read_metrics(&mut output, site_id, &summary);
    write_episode_metrics(&mut output, site_id, &summary);
    write_backend_metrics(&mut output, site_id, &summary);
    write_barrier_metrics(&mut output, site_id, &summary);
    write_lane_states(&mut output, site_id, &summary);

    output
}

fn write_read_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "lanegate_reads_total",
        "Credential reads received from all readers",
        MetricType::Counter,
        site,
        summary.reads_total,
    );
    write_metric(
        output,
        "lanegate_reads_debounced_total",
        "Repeat reads suppressed by the debounce window",
        MetricType::Counter,
        site,
        summary.reads_debounced,
    );
    write_metric(
        output,
        "lanegate_reads_discarded_busy_total",
        "Reads dropped because the lane was mid-episode",
        MetricType::Counter,
        site,
        summary.reads_discarded_busy,
    );
}

fn write_episode_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    let _ = writeln!(output, "# HELP lanegate_episodes_total Completed lane episodes by outcome");
    let _ = writeln!(output, "# TYPE lanegate_episodes_total counter");
    for outcome in EpisodeOutcome::ALL {
        let _ = writeln!(
            output,
            "lanegate_episodes_total{{site=\"{site}\",outcome=\"{}\"}} {}",
            outcome.as_str(),
            summary.episodes[outcome.index()]
        );
    }
}

fn write_backend_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_histogram(
        output,
        "lanegate_auth_latency_ms",
        "Authorization round-trip in milliseconds",
        site,
        &summary.auth_latency_buckets,
        summary.auth_latency_avg_ms,
    );
    write_metric(
        output,
        "lanegate_auth_latency_p99_ms",
        "99th percentile authorization round-trip",
        MetricType::Gauge,
        site,
        summary.auth_latency_p99_ms,
    );
    write_metric(
        output,
        "lanegate_auth_latency_max_ms",
        "Maximum authorization round-trip",
        MetricType::Gauge,
        site,
        summary.auth_latency_max_ms,
    );
    write_metric(
        output,
        "lanegate_payment_polls_total",
        "Payment status polls issued",
        MetricType::Counter,
        site,
        summary.poll_attempts,
    );
    write_metric(
        output,
        "lanegate_payment_poll_failures_total",
        "Payment status polls that failed",
        MetricType::Counter,
        site,
        summary.poll_failures,
    );
}

fn write_barrier_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "lanegate_barrier_opens_total",
        "Barrier open commands issued",
        MetricType::Counter,
        site,
        summary.barrier_opens,
    );
    write_metric(
        output,
        "lanegate_barrier_closes_total",
        "Barrier close commands issued",
        MetricType::Counter,
        site,
        summary.barrier_closes,
    );
    write_metric(
        output,
        "lanegate_barrier_command_failures_total",
        "Barrier relay commands that failed",
        MetricType::Counter,
        site,
        summary.barrier_command_failures,
    );
    write_metric(
        output,
        "lanegate_vehicles_detected_total",
        "Passage watches that saw a vehicle",
        MetricType::Counter,
        site,
        summary.vehicles_detected,
    );
    write_metric(
        output,
        "lanegate_display_updates_dropped_total",
        "Status updates dropped before publishing",
        MetricType::Counter,
        site,
        summary.display_updates_dropped,
    );
}

fn write_lane_states(output: &mut String, site: &str, summary: &MetricsSummary) {
    let _ = writeln!(
        output,
        "# HELP lanegate_lane_state Lane state (0=idle, 1=authorizing, 2=awaiting_payment, 3=opening, 4=monitoring_passage, 5=closing, 6=error)"
    );
    let _ = writeln!(output, "# TYPE lanegate_lane_state gauge");
    for (lane, state) in &summary.lane_states {
        let _ = writeln!(
            output,
            "lanegate_lane_state{{site=\"{site}\",lane=\"{lane}\"}} {}",
            state.code()
        );
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &site_id);
            let mut response = text_response(StatusCode::OK, body);
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            Ok(response)
        }
        (&Method::GET, "/health") => Ok(text_response(StatusCode::OK, "ok")),
        _ => Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
