use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::coordinator::CoordinatorStatus;
use crate::diagnostics;
use crate::entities::EntitySet;
use crate::entities::Forecast;
use crate::secret::ApiKey;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    name: String,
    location: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ForecastType {
    #[default]
    Daily,
    Hourly,
}

#[derive(Debug, Deserialize)]
struct ForecastQuery {
    #[serde(default, rename = "type")]
    kind: ForecastType,
}

#[derive(Deserialize)]
struct ApiKeyRequest {
    api_key: ApiKey,
}

/// Shared application state
pub struct AppState {
    pub version: &'static str,
    pub config: Config,
    pub coordinator: Arc<Coordinator>,
    pub entities: Arc<EntitySet>,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            name: state.config.weather.name.clone(),
            location: state.coordinator.location().to_string(),
        }),
    )
}

/// Handler for GET /v1/entities
#[tracing::instrument(skip(state))]
async fn list_entities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let entities: Vec<_> = state.entities.all().iter().map(|e| e.state_json()).collect();
    Json(entities)
}

/// Handler for GET /v1/entities/:entity_id
#[tracing::instrument(skip(state))]
async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Response {
    match state.entities.get(&entity_id) {
        Some(entity) => Json(entity.state_json()).into_response(),
        None => error(
            StatusCode::NOT_FOUND,
            format!("no entity '{}'", entity_id),
        ),
    }
}

/// Handler for GET /v1/forecast?type=daily|hourly
#[tracing::instrument(skip(state))]
async fn forecast(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForecastQuery>,
) -> Response {
    let weather = &state.entities.weather;
    let forecast: Option<Vec<Forecast>> = match query.kind {
        ForecastType::Daily => weather.forecast_daily(),
        ForecastType::Hourly => weather.forecast_hourly(),
    };
    match forecast {
        Some(forecast) => Json(forecast).into_response(),
        None => error(StatusCode::SERVICE_UNAVAILABLE, "no forecast available yet"),
    }
}

/// Handler for GET /v1/diagnostics
#[tracing::instrument(skip(state))]
async fn get_diagnostics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(diagnostics::export(&state.config, &state.coordinator))
}

/// Handler for POST /v1/refresh
///
/// Waits for the refresh to finish and returns the resulting status.
#[tracing::instrument(skip(state))]
async fn refresh(State(state): State<Arc<AppState>>) -> Response {
    if state.coordinator.reauth_required() {
        return error(
            StatusCode::CONFLICT,
            "API key was rejected; PUT a new key to /v1/api_key before refreshing",
        );
    }

    state.coordinator.request_refresh().await;
    let status: CoordinatorStatus = state.coordinator.status();
    Json(status).into_response()
}

/// Handler for PUT /v1/api_key
///
/// Replaces the key, clears the reauthentication condition and refreshes with the
/// new key before returning the resulting status.
#[tracing::instrument(skip(state, request))]
async fn update_api_key(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApiKeyRequest>,
) -> Response {
    if request.api_key.is_blank() {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "api_key must not be blank");
    }

    tracing::info!("API key replaced over HTTP");
    state.coordinator.update_api_key(request.api_key);
    state.coordinator.request_refresh().await;
    Json(state.coordinator.status()).into_response()
}

/// Create the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/entities", get(list_entities))
        .route("/v1/entities/:entity_id", get(get_entity))
        .route("/v1/forecast", get(forecast))
        .route("/v1/diagnostics", get(get_diagnostics))
        .route("/v1/refresh", post(refresh))
        .route("/v1/api_key", put(update_api_key))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Serves until `shutdown` is cancelled, then finishes in-flight requests.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = create_router(state);

    tracing::info!("Starting HTTP API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ApiConfig;
    use crate::config::LoggingConfig;
    use crate::config::WeatherConfig;
    use crate::secret::ApiKey;
    use crate::weather::gateway::MockGateway;
    use crate::weather::FetchError;
    use crate::weather::LocationDescriptor;

    fn state(gateway: Arc<MockGateway>) -> Arc<AppState> {
        let config = Config {
            logging: LoggingConfig::default(),
            weather: WeatherConfig {
                name: "Home".to_string(),
                api_key: ApiKey::new("AKsupersecret"),
                update_interval_seconds: 900,
                location: LocationDescriptor::Coordinates {
                    latitude: 39.9,
                    longitude: 116.4,
                },
            },
            api: ApiConfig::default(),
        };
        let coordinator = Arc::new(Coordinator::new(
            gateway,
            config.weather.location.clone(),
            config.weather.api_key.clone(),
            Duration::from_secs(900),
        ));
        let entities = Arc::new(EntitySet::register(&coordinator, &config.weather.name));
        Arc::new(AppState {
            version: "test",
            config,
            coordinator,
            entities,
        })
    }

    async fn call(state: &Arc<AppState>, method: &str, uri: &str) -> (StatusCode, Value) {
        send(
            state,
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn put_key(state: &Arc<AppState>, api_key: &str) -> (StatusCode, Value) {
        send(
            state,
            Request::builder()
                .method("PUT")
                .uri("/v1/api_key")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "api_key": api_key }).to_string(),
                ))
                .unwrap(),
        )
        .await
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_ping_and_info() {
        let state = state(Arc::new(MockGateway::new()));

        let (status, body) = call(&state, "GET", "/v1/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&state, "GET", "/v1/info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], "test");
        assert_eq!(body["name"], "Home");
        assert_eq!(body["location"], "39.9000,116.4000");
    }

    #[tokio::test]
    async fn test_refresh_then_entities() {
        let state = state(Arc::new(MockGateway::new()));

        let (status, body) = call(&state, "GET", "/v1/entities/weather.home").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "unavailable");

        let (status, body) = call(&state, "POST", "/v1/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "idle");
        assert!(body["last_update"].is_string());

        let (status, body) = call(&state, "GET", "/v1/entities").await;
        assert_eq!(status, StatusCode::OK);
        let entities = body.as_array().unwrap();
        assert_eq!(entities.len(), 8);
        assert_eq!(entities[0]["entity_id"], "weather.home");
        assert_eq!(entities[0]["state"], "sunny");

        let (status, _) = call(&state, "GET", "/v1/entities/sensor.nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_forecast() {
        let state = state(Arc::new(MockGateway::new()));

        let (status, _) = call(&state, "GET", "/v1/forecast").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        call(&state, "POST", "/v1/refresh").await;
        let (status, body) = call(&state, "GET", "/v1/forecast?type=daily").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, body) = call(&state, "GET", "/v1/forecast?type=hourly").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_diagnostics_never_leak_key() {
        let state = state(Arc::new(MockGateway::new()));
        call(&state, "POST", "/v1/refresh").await;

        let (status, body) = call(&state, "GET", "/v1/diagnostics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.to_string().contains("AKsupersecret"));
        assert_eq!(body["config"]["weather"]["api_key"], "********");
        assert!(body["snapshot"].is_object());
    }

    #[tokio::test]
    async fn test_refresh_rejected_while_reauth_required() {
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_all(FetchError::Auth {
            status: 211,
            message: "APP SN校验失败".to_string(),
        });
        let state = state(gateway);

        // The first refresh discovers the bad key
        let (status, body) = call(&state, "POST", "/v1/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reauth_required"], true);

        let (status, body) = call(&state, "POST", "/v1/refresh").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("API key"));
    }

    #[tokio::test]
    async fn test_key_update_resumes_refresh() {
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_all(FetchError::Auth {
            status: 240,
            message: "APP 服务被禁用".to_string(),
        });
        let state = state(gateway.clone());

        let (_, body) = call(&state, "POST", "/v1/refresh").await;
        assert_eq!(body["reauth_required"], true);

        gateway.succeed_all();
        let (status, body) = put_key(&state, "AKrotated").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reauth_required"], false);
        assert!(body["last_update"].is_string());
        assert!(!body.to_string().contains("AKrotated"));
        assert_eq!(gateway.call_count(), 10);

        let (status, _) = call(&state, "POST", "/v1/refresh").await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&state, "GET", "/v1/entities/weather.home").await;
        assert_eq!(body["state"], "sunny");
    }

    #[tokio::test]
    async fn test_blank_key_rejected() {
        let gateway = Arc::new(MockGateway::new());
        let state = state(gateway.clone());

        let (status, body) = put_key(&state, "   ").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("blank"));
        assert_eq!(gateway.call_count(), 0);
    }
}
