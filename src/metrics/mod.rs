//! Prometheus collectors and the `/metrics` endpoint.

use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref ACTIVE_CONNECTIONS: IntGauge =
        IntGauge::new("ua_active_connections", "Open TCP connections").expect("metric can not be created");

    pub static ref ACTIVE_CHANNELS: IntGauge =
        IntGauge::new("ua_active_secure_channels", "Open secure channels").expect("metric can not be created");

    pub static ref ACTIVE_SESSIONS: IntGauge =
        IntGauge::new("ua_active_sessions", "Live sessions").expect("metric can not be created");

    pub static ref ACTIVE_SUBSCRIPTIONS: IntGauge =
        IntGauge::new("ua_active_subscriptions", "Live subscriptions").expect("metric can not be created");

    pub static ref SERVICE_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ua_service_requests_total", "Service requests by service and result status"),
        &["service", "status"]
    )
    .expect("metric can not be created");

    pub static ref PUBLISH_RESPONSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ua_publish_responses_total", "Publish responses by notification kind"),
        &["kind"]
    )
    .expect("metric can not be created");

    /// Entries dropped by drop-oldest queues
    pub static ref QUEUE_OVERFLOW_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ua_queue_overflow_total", "Notifications dropped on queue overflow"),
        &["queue"]
    )
    .expect("metric can not be created");

    pub static ref SUBSCRIPTIONS_EXPIRED_TOTAL: IntCounter = IntCounter::new(
        "ua_subscriptions_expired_total",
        "Subscriptions deleted after reaching their lifetime count"
    )
    .expect("metric can not be created");

    pub static ref SESSIONS_TIMED_OUT_TOTAL: IntCounter = IntCounter::new(
        "ua_sessions_timed_out_total",
        "Sessions closed by the inactivity sweep"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

/// Label values of [`PUBLISH_RESPONSES_TOTAL`].
pub const PUBLISH_KIND_DATA: &str = "data";
pub const PUBLISH_KIND_KEEP_ALIVE: &str = "keep_alive";
pub const PUBLISH_KIND_STATUS_CHANGE: &str = "status_change";

/// Label values of [`QUEUE_OVERFLOW_TOTAL`].
pub const QUEUE_MONITORED_ITEM: &str = "monitored_item";
pub const QUEUE_SUBSCRIPTION: &str = "subscription";
pub const QUEUE_RETRANSMISSION: &str = "retransmission";

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_CONNECTIONS.clone()),
        Box::new(ACTIVE_CHANNELS.clone()),
        Box::new(ACTIVE_SESSIONS.clone()),
        Box::new(ACTIVE_SUBSCRIPTIONS.clone()),
        Box::new(SERVICE_REQUESTS_TOTAL.clone()),
        Box::new(PUBLISH_RESPONSES_TOTAL.clone()),
        Box::new(QUEUE_OVERFLOW_TOTAL.clone()),
        Box::new(SUBSCRIPTIONS_EXPIRED_TOTAL.clone()),
        Box::new(SESSIONS_TIMED_OUT_TOTAL.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {}", e);
        }
    }
}

pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!("serving metrics on 0.0.0.0:{}/metrics", port);
    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        let _ = shutdown_signal.changed().await;
    });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    let mut body = encode_registry(&REGISTRY);
    body.push_str(&get_metrics_body());
    Ok(body)
}

pub(crate) fn encode_registry(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}

/// Autometrics series for Prometheus to scrape
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
