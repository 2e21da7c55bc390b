//! REST API endpoints for the dewdrop service.
//!
//! # Endpoints
//!
//! - `GET /weather/outdoor-dewpoint` - Cached outdoor dew point as a bare JSON number
//! - `POST /arduino/sensor-feed` - Ingest one sensor feed from a poller
//! - `GET /api/feeds` - Stored feeds, newest first (`?limit=N`, default 50)
//! - `GET /api/health` - Service health check
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. A malformed
//! or out-of-range feed is a 400. The dew point endpoint answers 503 until the
//! cache has been populated once and never fails after that. Storage failures
//! while handling a feed are a 500; failed notifications are listed in the
//! success response instead.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, error};

use dewdrop_core::Freshness;
use dewdrop_store::StoredFeed;
use dewdrop_types::SensorFeed;

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/feeds", get(list_feeds))
        .route("/weather/outdoor-dewpoint", get(outdoor_dewpoint))
        .route("/arduino/sensor-feed", post(sensor_feed))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub uptime_seconds: i64,
    pub outdoor: OutdoorHealth,
    /// Stored feed rows, `None` if the database could not be queried.
    pub feed_count: Option<u64>,
    /// Most recent stored feed.
    pub last_feed: Option<FeedRecord>,
}

/// A stored feed as served by the API.
#[derive(Debug, Serialize)]
pub struct FeedRecord {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    #[serde(flatten)]
    pub feed: SensorFeed,
}

impl From<StoredFeed> for FeedRecord {
    fn from(stored: StoredFeed) -> Self {
        Self {
            id: stored.id,
            received_at: stored.received_at,
            feed: stored.feed,
        }
    }
}

/// Outdoor cache state.
#[derive(Debug, Serialize)]
pub struct OutdoorHealth {
    pub populated: bool,
    pub value: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
    pub age_seconds: Option<i64>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let now = OffsetDateTime::now_utc();
    let snapshot = state.outdoor.read();
    let (feed_count, last_feed) = {
        let store = state.store.lock().await;
        let count = store
            .count_feeds()
            .inspect_err(|e| error!("Health check could not count feeds: {}", e))
            .ok();
        let latest = store
            .latest_feed()
            .inspect_err(|e| error!("Health check could not read the latest feed: {}", e))
            .ok()
            .flatten();
        (count, latest.map(FeedRecord::from))
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now,
        uptime_seconds: (now - state.started_at).whole_seconds(),
        outdoor: OutdoorHealth {
            populated: snapshot.is_some(),
            value: snapshot.map(|s| s.value),
            last_update: snapshot.map(|s| s.last_update),
            age_seconds: snapshot.map(|s| s.age(now).whole_seconds()),
        },
        feed_count,
        last_feed,
    })
}

/// Default number of feeds returned by `/api/feeds`.
pub const DEFAULT_FEED_LIMIT: u32 = 50;

/// Largest `limit` accepted by `/api/feeds`.
pub const MAX_FEED_LIMIT: u32 = 1000;

/// Query parameters for `/api/feeds`.
#[derive(Debug, Default, Deserialize)]
pub struct FeedsQuery {
    pub limit: Option<u32>,
}

impl FeedsQuery {
    fn limit(&self) -> Result<u32, AppError> {
        match self.limit {
            None => Ok(DEFAULT_FEED_LIMIT),
            Some(limit @ 1..=MAX_FEED_LIMIT) => Ok(limit),
            Some(limit) => Err(AppError::BadRequest(format!(
                "limit must be between 1 and {}, got {}",
                MAX_FEED_LIMIT, limit
            ))),
        }
    }
}

/// Stored feeds response.
#[derive(Debug, Serialize)]
pub struct FeedsResponse {
    pub count: usize,
    pub feeds: Vec<FeedRecord>,
}

async fn list_feeds(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedsQuery>,
) -> Result<Json<FeedsResponse>, AppError> {
    let limit = params.limit()?;
    let feeds: Vec<FeedRecord> = state
        .store
        .lock()
        .await
        .recent_feeds(limit)?
        .into_iter()
        .map(FeedRecord::from)
        .collect();

    Ok(Json(FeedsResponse {
        count: feeds.len(),
        feeds,
    }))
}

/// Serve the cached outdoor dew point.
///
/// A value older than the refresh interval is still served; a background
/// refresh is started for the next caller.
async fn outdoor_dewpoint(State(state): State<Arc<AppState>>) -> Result<Json<f64>, AppError> {
    let read = state.outdoor.read_or_refresh(&state.cancel).ok_or_else(|| {
        AppError::Unavailable("outdoor dew point has not been fetched yet".to_string())
    })?;

    if read.freshness == Freshness::Stale {
        debug!(
            "Serving stale outdoor dew point from {}",
            read.value.last_update
        );
    }
    Ok(Json(read.value.value))
}

/// Sensor feed response.
#[derive(Debug, Serialize)]
pub struct SensorFeedResponse {
    pub status: &'static str,
    pub message: &'static str,
    /// The row as persisted.
    pub data: SensorFeed,
    /// Channels whose notification failed.
    pub failed_notifications: Vec<String>,
}

async fn sensor_feed(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SensorFeed>, JsonRejection>,
) -> Result<Json<SensorFeedResponse>, AppError> {
    let Json(feed) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    validate_feed(&feed)?;

    let outcome = state.pipeline.process(feed).await?;
    let message = if outcome.initialized() {
        "Database initialized with first entry"
    } else {
        "Sensor feed processed"
    };

    Ok(Json(SensorFeedResponse {
        status: "success",
        message,
        failed_notifications: outcome.failed.iter().map(ToString::to_string).collect(),
        data: outcome.stored,
    }))
}

fn validate_feed(feed: &SensorFeed) -> Result<(), AppError> {
    if !(0.0..=100.0).contains(&feed.indoor_humidity) {
        return Err(AppError::BadRequest(format!(
            "indoor_humidity {} is outside 0-100",
            feed.indoor_humidity
        )));
    }
    if feed.indoor_temperature < -273.15 {
        return Err(AppError::BadRequest(format!(
            "indoor_temperature {} is below absolute zero",
            feed.indoor_temperature
        )));
    }
    Ok(())
}

/// API error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unavailable(String),
    Pipeline(dewdrop_core::Error),
    Store(dewdrop_store::Error),
}

impl From<dewdrop_core::Error> for AppError {
    fn from(e: dewdrop_core::Error) -> Self {
        AppError::Pipeline(e)
    }
}

impl From<dewdrop_store::Error> for AppError {
    fn from(e: dewdrop_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Pipeline(e) => {
                error!("Failed to process sensor feed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Store(e) => {
                error!("Storage error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use dewdrop_core::Channel;
    use dewdrop_core::mock::{MockDewPointSource, MockNotifier};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::Config;

    struct TestApp {
        state: Arc<AppState>,
        weather: Arc<MockDewPointSource>,
        notifier: Arc<MockNotifier>,
    }

    fn create_test_app() -> TestApp {
        let store = dewdrop_store::Store::open_in_memory().unwrap();
        let weather = Arc::new(MockDewPointSource::new(9.5));
        let notifier = Arc::new(MockNotifier::new());
        let state = AppState::new(
            store,
            Config::default(),
            weather.clone(),
            notifier.clone(),
        );
        TestApp {
            state,
            weather,
            notifier,
        }
    }

    fn feed(indoor_dewpoint: f64, humidity: f64) -> SensorFeed {
        SensorFeed {
            device_id: 123,
            indoor_temperature: 21.0,
            indoor_humidity: humidity,
            indoor_dewpoint,
            outdoor_dewpoint: 9.5,
            dewpoint_delta: indoor_dewpoint - 9.5,
            open_windows: indoor_dewpoint - 9.5 > -1.0,
            humidity_alert: humidity > 60.0,
        }
    }

    async fn response_body(response: axum::response::Response) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> axum::response::Response {
        router()
            .with_state(Arc::clone(state))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_json(state: &Arc<AppState>, body: String) -> axum::response::Response {
        router()
            .with_state(Arc::clone(state))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/arduino/sensor-feed")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn post_feed(state: &Arc<AppState>, feed: &SensorFeed) -> axum::response::Response {
        post_json(state, serde_json::to_string(feed).unwrap()).await
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();
        let response = get(&app.state, "/api/health").await;

        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
        assert_eq!(json["outdoor"]["populated"], false);
        assert!(json["outdoor"]["value"].is_null());
        assert_eq!(json["feed_count"], 0);
        assert!(json["last_feed"].is_null());
    }

    #[tokio::test]
    async fn test_health_reports_last_feed() {
        let app = create_test_app();
        post_feed(&app.state, &feed(12.0, 70.0)).await;

        let body = response_body(get(&app.state, "/api/health").await).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["feed_count"], 1);
        assert_eq!(json["last_feed"]["device_id"], 123);
        assert_eq!(json["last_feed"]["indoor_humidity"], 70.0);
        assert!(json["last_feed"]["received_at"].is_string());
    }

    #[tokio::test]
    async fn test_list_feeds_newest_first() {
        let app = create_test_app();
        for humidity in [40.0, 45.0, 50.0] {
            post_feed(&app.state, &feed(5.0, humidity)).await;
        }

        let response = get(&app.state, "/api/feeds?limit=2").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["feeds"][0]["indoor_humidity"], 50.0);
        assert_eq!(json["feeds"][1]["indoor_humidity"], 45.0);

        let body = response_body(get(&app.state, "/api/feeds").await).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["count"], 3);
    }

    #[tokio::test]
    async fn test_list_feeds_rejects_bad_limit() {
        let app = create_test_app();

        let response = get(&app.state, "/api/feeds?limit=0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get(&app.state, "/api/feeds?limit=5000").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_cache() {
        let app = create_test_app();
        app.state.outdoor.refresh(&app.state.cancel).await.unwrap();

        let body = response_body(get(&app.state, "/api/health").await).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["outdoor"]["populated"], true);
        assert_eq!(json["outdoor"]["value"], 9.5);
        assert!(json["outdoor"]["last_update"].is_string());
        assert_eq!(json["outdoor"]["age_seconds"], 0);
    }

    #[tokio::test]
    async fn test_outdoor_dewpoint_unavailable_before_first_refresh() {
        let app = create_test_app();
        app.weather.set_should_fail(true);

        let response = get(&app.state, "/weather/outdoor-dewpoint").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("not been fetched"));
    }

    #[tokio::test]
    async fn test_outdoor_dewpoint_returns_bare_number() {
        let app = create_test_app();
        app.state.outdoor.refresh(&app.state.cancel).await.unwrap();

        let response = get(&app.state, "/weather/outdoor-dewpoint").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_body(response).await, "9.5");
    }

    #[tokio::test]
    async fn test_outdoor_dewpoint_survives_failing_source() {
        let app = create_test_app();
        app.state.outdoor.refresh(&app.state.cancel).await.unwrap();
        app.weather.set_value(4.0);
        app.weather.set_should_fail(true);

        let response = get(&app.state, "/weather/outdoor-dewpoint").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_body(response).await, "9.5");
    }

    #[tokio::test]
    async fn test_malformed_feed_is_bad_request() {
        let app = create_test_app();

        let response = post_json(&app.state, "{not json".to_string()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = post_json(&app.state, r#"{"device_id": 1}"#.to_string()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_out_of_range_humidity_is_bad_request() {
        let app = create_test_app();
        let response = post_feed(&app.state, &feed(12.0, 140.0)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.state.store.lock().await.count_feeds().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_first_feed_initializes_database() {
        let app = create_test_app();

        let response = post_feed(&app.state, &feed(12.0, 70.0)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "Database initialized with first entry");
        assert_eq!(json["data"]["device_id"], 123);

        assert_eq!(app.state.store.lock().await.count_feeds().unwrap(), 1);
        assert!(app.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_window_transition_notifies() {
        let app = create_test_app();

        post_feed(&app.state, &feed(5.0, 50.0)).await;
        let response = post_feed(&app.state, &feed(12.0, 50.0)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["message"], "Sensor feed processed");
        assert_eq!(json["data"]["open_windows"], true);
        assert!(json["failed_notifications"].as_array().unwrap().is_empty());

        assert_eq!(
            app.notifier.channels(),
            vec![Channel::Feed, Channel::WindowAlert]
        );
        let store = app.state.store.lock().await;
        assert_eq!(store.count_feeds().unwrap(), 2);
        assert_eq!(store.last_open_windows().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_failed_notification_still_stores() {
        let app = create_test_app();
        app.notifier.fail_channel(Channel::WindowAlert);

        post_feed(&app.state, &feed(5.0, 50.0)).await;
        let response = post_feed(&app.state, &feed(12.0, 50.0)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["failed_notifications"][0], "window alert");
        assert_eq!(app.state.store.lock().await.count_feeds().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.db");
        let store = dewdrop_store::Store::open(&path).unwrap();
        let state = AppState::new(
            store,
            Config::default(),
            Arc::new(MockDewPointSource::new(9.5)),
            Arc::new(MockNotifier::new()),
        );

        let other = rusqlite::Connection::open(&path).unwrap();
        other.execute_batch("DROP TABLE feeds").unwrap();

        let response = post_feed(&state, &feed(12.0, 50.0)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].is_string());

        let response = get(&state, "/api/feeds").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_pipeline_error_is_server_error() {
        let response =
            AppError::Pipeline(dewdrop_core::Error::storage("database is locked")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("database is locked"));
    }
}
