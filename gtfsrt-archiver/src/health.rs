//! Health check and metrics HTTP server

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use crate::scheduler::FeedScheduler;
use gtfsrt_metrics::ArchiverMetrics;

/// Shared state behind the health endpoints.
pub struct HealthState {
    start_time: Instant,
    scheduler: Arc<FeedScheduler>,
    metrics: Arc<ArchiverMetrics>,
    registry: Registry,
}

impl HealthState {
    pub fn new(
        scheduler: Arc<FeedScheduler>,
        metrics: Arc<ArchiverMetrics>,
        registry: Registry,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            scheduler,
            metrics,
            registry,
        })
    }
}

/// HTTP server exposing `/health`, `/ready`, `/health/feeds` and `/metrics`.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    local_port: Option<u16>,
}

impl HealthServer {
    pub fn new(port: u16, state: Arc<HealthState>) -> Self {
        Self {
            port,
            state,
            shutdown_tx: None,
            handle: None,
            local_port: None,
        }
    }

    /// Port actually bound (differs from the configured port when 0).
    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    pub async fn start(&mut self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(handle_health))
            .route("/health/feeds", get(handle_feeds))
            .route("/ready", get(handle_ready))
            .route("/metrics", get(handle_metrics))
            .with_state(self.state.clone());

        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        self.local_port = Some(listener.local_addr()?.port());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        self.handle = Some(tokio::spawn(async move {
            if let Err(err) = server.await {
                tracing::error!(%err, "health server terminated with error");
            }
        }));

        info!(port = self.local_port, "health server started");
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("health server stopped");
    }
}

async fn handle_health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs_f64();
    Json(json!({
        "status": "healthy",
        "uptime_seconds": (uptime * 100.0).round() / 100.0,
        "scheduler": {
            "running": state.scheduler.is_running(),
            "jobs_scheduled": state.scheduler.job_count().await,
        },
        "feeds": {
            "total": state.scheduler.active_feeds().await.len(),
        },
    }))
}

async fn handle_ready(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.scheduler.is_running() {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "reason": "scheduler_not_running",
            })),
        )
    }
}

async fn handle_feeds(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let feeds: Vec<_> = state
        .scheduler
        .active_feeds()
        .await
        .iter()
        .map(|feed| {
            let last_success = state
                .metrics
                .last_success_seconds_ago(&feed.id)
                .map(|s| (s * 10.0).round() / 10.0);
            json!({
                "feed_id": feed.id,
                "agency_id": feed.agency_id,
                "feed_type": feed.feed_type.as_str(),
                "interval_seconds": feed.interval_seconds,
                "last_success_seconds_ago": last_success,
            })
        })
        .collect();

    Json(feeds)
}

async fn handle_metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&state.registry.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        ),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain".to_string())],
            err.to_string().into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{FeedScheduler, TickExecutor};
    use async_trait::async_trait;
    use gtfsrt_config::{FeedSpec, FeedType};

    struct NoopExecutor;

    #[async_trait]
    impl TickExecutor for NoopExecutor {
        async fn execute_tick(&self, _spec: &FeedSpec, _scheduled: tokio::time::Instant) {}
    }

    fn sample_feed() -> FeedSpec {
        FeedSpec {
            id: "demo-service-alerts".into(),
            name: "Demo Service Alerts".into(),
            url: "https://example.com/alerts".parse().unwrap(),
            feed_type: FeedType::ServiceAlerts,
            agency_id: "demo".into(),
            agency_name: "Demo".into(),
            system_id: None,
            system_name: None,
            schedule_url: None,
            interval_seconds: 60,
            timeout_seconds: 30,
            retry: Default::default(),
            auth: None,
        }
    }

    async fn started_server(scheduler: Arc<FeedScheduler>) -> (HealthServer, String) {
        let registry = Registry::new();
        let metrics = Arc::new(ArchiverMetrics::new(&registry).unwrap());
        metrics.record_feed_success("demo-service-alerts");
        metrics.active_feeds.set(1);
        let state = HealthState::new(scheduler, metrics, registry);

        let mut server = HealthServer::new(0, state);
        server.start().await.unwrap();
        let base = format!("http://127.0.0.1:{}", server.local_port().unwrap());
        (server, base)
    }

    #[tokio::test]
    async fn test_health_and_ready_reflect_scheduler() {
        let scheduler = FeedScheduler::new(vec![sample_feed()], Arc::new(NoopExecutor), 0, 1);
        let (mut server, base) = started_server(scheduler.clone()).await;

        // Not started yet: ready returns 503
        let resp = reqwest::get(format!("{base}/ready")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 503);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["reason"], "scheduler_not_running");

        scheduler.start().await;

        let resp = reqwest::get(format!("{base}/ready")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["scheduler"]["running"], true);
        assert_eq!(body["scheduler"]["jobs_scheduled"], 1);
        assert_eq!(body["feeds"]["total"], 1);

        scheduler.stop(true).await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_feeds_endpoint_lists_per_feed_status() {
        let scheduler = FeedScheduler::new(vec![sample_feed()], Arc::new(NoopExecutor), 0, 1);
        scheduler.start().await;
        let (mut server, base) = started_server(scheduler.clone()).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/health/feeds"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let feeds = body.as_array().unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0]["feed_id"], "demo-service-alerts");
        assert_eq!(feeds[0]["agency_id"], "demo");
        assert_eq!(feeds[0]["feed_type"], "service_alerts");
        assert_eq!(feeds[0]["interval_seconds"], 60);
        assert!(feeds[0]["last_success_seconds_ago"].is_number());

        scheduler.stop(true).await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_metrics_endpoint_exposes_prometheus_text() {
        let scheduler = FeedScheduler::new(vec![], Arc::new(NoopExecutor), 0, 1);
        let (mut server, base) = started_server(scheduler).await;

        let resp = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let content_type = resp
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));
        let body = resp.text().await.unwrap();
        assert!(body.contains("gtfs_rt_active_feeds"));

        server.stop().await;
    }
}
