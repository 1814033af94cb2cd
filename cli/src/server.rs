use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use heft_core::auth::UserId;
use heft_core::chart::ChartSeries;
use heft_core::models::{
    ExportData, ImportSummary, ProfileSettings, WeightEntry, parse_entry_date,
    validate_export_weight_entry, validate_settings,
};
use heft_core::service::{EXPORT_VERSION, LoggedWeight, WeightService};
use heft_core::stats::WeightStats;
use heft_core::units::WeightUnit;

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[derive(Clone)]
struct AppState {
    service: Arc<WeightService>,
    user: UserId,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateWeightRequest {
    value: f64,
    #[serde(default)]
    unit: WeightUnit,
    date: Option<String>,
    note: Option<String>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized,
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid or missing API key".to_string(),
            ),
            Self::Internal(err) => {
                tracing::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            tracing::warn!(path = %request.uri().path(), "rejected unauthenticated request");
            return ApiError::Unauthorized.into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Weight handlers ---

async fn list_weights(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<WeightEntry>>, ApiError> {
    let entries = state
        .service
        .history(&state.user, params.limit)
        .context("failed to load history")?;
    Ok(Json(entries))
}

async fn create_weight(
    State(state): State<AppState>,
    Json(req): Json<CreateWeightRequest>,
) -> Result<(StatusCode, Json<LoggedWeight>), ApiError> {
    if !req.value.is_finite() || req.value <= 0.0 {
        return Err(ApiError::BadRequest(
            "value must be greater than 0".to_string(),
        ));
    }
    let date = req
        .date
        .as_deref()
        .map(parse_entry_date)
        .transpose()
        .map_err(|e| bad_request(&e))?;

    let logged = state
        .service
        .log_weight(&state.user, req.value, req.unit, date, req.note)
        .context("failed to log weight")?;
    Ok((StatusCode::CREATED, Json(logged)))
}

async fn delete_weight(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .service
        .delete_weight(&state.user, id)
        .context("failed to delete weight")?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Weight entry {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Derived views ---

async fn get_stats(State(state): State<AppState>) -> Result<Json<WeightStats>, ApiError> {
    let stats = state
        .service
        .stats(&state.user)
        .context("failed to compute stats")?;
    Ok(Json(stats))
}

async fn get_chart(State(state): State<AppState>) -> Result<Json<ChartSeries>, ApiError> {
    let chart = state
        .service
        .chart(&state.user)
        .context("failed to build chart")?;
    Ok(Json(chart))
}

// --- Profile ---

async fn get_profile(State(state): State<AppState>) -> Result<Json<ProfileSettings>, ApiError> {
    let settings = state
        .service
        .settings(&state.user)
        .context("failed to load profile")?;
    Ok(Json(settings))
}

async fn put_profile(
    State(state): State<AppState>,
    Json(settings): Json<ProfileSettings>,
) -> Result<Json<ProfileSettings>, ApiError> {
    validate_settings(&settings).map_err(|e| bad_request(&e))?;
    state
        .service
        .update_settings(&state.user, &settings)
        .context("failed to save profile")?;
    Ok(Json(settings))
}

// --- Export / Import handlers ---

async fn export_data(State(state): State<AppState>) -> Result<Json<ExportData>, ApiError> {
    let data = state
        .service
        .export(&state.user)
        .context("failed to export data")?;
    Ok(Json(data))
}

async fn import_data(
    State(state): State<AppState>,
    Json(data): Json<ExportData>,
) -> Result<Json<ImportSummary>, ApiError> {
    if data.version > EXPORT_VERSION {
        return Err(ApiError::BadRequest(format!(
            "Unsupported export version {}",
            data.version
        )));
    }
    for entry in &data.entries {
        validate_export_weight_entry(entry).map_err(|e| bad_request(&e))?;
    }
    validate_settings(&data.settings).map_err(|e| bad_request(&e))?;

    let summary = state
        .service
        .import(&state.user, &data)
        .context("failed to import data")?;
    Ok(Json(summary))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/weights", get(list_weights).post(create_weight))
        .route("/api/weights/{id}", delete(delete_weight))
        .route("/api/stats", get(get_stats))
        .route("/api/chart", get(get_chart))
        .route("/api/profile", get(get_profile).put(put_profile))
        .route("/api/export", get(export_data))
        .route("/api/import", post(import_data))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of the key, or all stars when it is too short to hint at.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    service: WeightService,
    user: UserId,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    new_api_key: bool,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(service),
        user: user.clone(),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    match api_key {
        Some(ref key) if new_api_key => {
            eprintln!("Generated new API key: {key}");
            eprintln!("Include in requests: Authorization: Bearer {key}");
        }
        Some(ref key) => {
            eprintln!(
                "API key: {} (see api_key file in data directory)",
                mask_key(key)
            );
        }
        None => {
            eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
            if bind != "127.0.0.1" && bind != "localhost" {
                eprintln!(
                    "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
                );
            }
        }
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!(%user, %bind, port, "server listening");
    eprintln!("Serving data for {user} on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use heft_core::models::{ExportWeightEntry, NewWeightEntry, UserSnapshot};
    use heft_core::service::WeightStore;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(api_key: Option<String>) -> AppState {
        AppState {
            service: Arc::new(WeightService::new_in_memory().unwrap()),
            user: UserId::from_email("ana@example.com").unwrap(),
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app.oneshot(get_request("/api/stats")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/stats")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/stats")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_auth_mode_allows_requests() {
        let app = test_app(None);
        let response = app.oneshot(get_request("/api/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let app = test_app(Some("secret".to_string()));

        let response = app.oneshot(get_request("/api/weights")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app(None);

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/import")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/ana/.heft/db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn create_and_list_weights() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/weights",
                &serde_json::json!({ "value": 80.0, "date": "2025-03-01", "note": "gym" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["entry"]["weight_kg"], 80.0);
        assert_eq!(created["milestone"], "new_low");

        app.clone()
            .oneshot(json_request(
                "POST",
                "/api/weights",
                &serde_json::json!({ "value": 176.37, "unit": "lbs", "date": "2025-03-02" }),
            ))
            .await
            .unwrap();

        let response = app.oneshot(get_request("/api/weights?limit=1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let list = body_json(response).await;
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0]["date"].as_str().unwrap().starts_with("2025-03-02"));
    }

    #[tokio::test]
    async fn create_weight_rejects_invalid_input() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/weights",
                &serde_json::json!({ "value": -1.0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/weights",
                &serde_json::json!({ "value": 70.0, "date": "01/03/2025" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("Invalid date"));
    }

    #[tokio::test]
    async fn delete_weight_by_id() {
        let state = test_state(None);
        let logged = state
            .service
            .log_weight(&state.user, 80.0, WeightUnit::Kg, None, None)
            .unwrap();
        let app = build_router(state.clone());

        let uri = format!("/api/weights/{}", logged.entry.id);
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::delete(uri.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.service.snapshot(&state.user).unwrap().entries.is_empty());

        let response = app
            .oneshot(
                axum::http::Request::delete(uri.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn mask_key_never_slices_inside_a_character() {
        assert_eq!(mask_key("0123456789abcdef"), "0123...cdef");
        assert_eq!(mask_key("ab"), "****");
        assert_eq!(mask_key("ééééé"), "*****");
        assert_eq!(mask_key("éééééééééééé"), "éééé...éééé");
    }

    struct BrokenStore;

    impl WeightStore for BrokenStore {
        fn load(&self, _user: &UserId) -> anyhow::Result<UserSnapshot> {
            Ok(UserSnapshot::default())
        }
        fn insert_entry(&self, _user: &UserId, _entry: &NewWeightEntry) -> anyhow::Result<WeightEntry> {
            anyhow::bail!("disk I/O error")
        }
        fn delete_entry(&self, _user: &UserId, _id: i64) -> anyhow::Result<bool> {
            anyhow::bail!("disk I/O error")
        }
        fn save_settings(&self, _user: &UserId, _settings: &ProfileSettings) -> anyhow::Result<()> {
            anyhow::bail!("disk I/O error")
        }
        fn import_entries(&self, _user: &UserId, _entries: &[ExportWeightEntry]) -> anyhow::Result<usize> {
            anyhow::bail!("disk I/O error")
        }
    }

    #[tokio::test]
    async fn delete_store_failure_is_internal_error() {
        let state = AppState {
            service: Arc::new(WeightService::new(Box::new(BrokenStore))),
            user: UserId::from_email("ana@example.com").unwrap(),
            api_key: None,
        };
        let response = build_router(state)
            .oneshot(
                axum::http::Request::delete("/api/weights/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn stats_empty_then_populated() {
        let state = test_state(None);
        let app = build_router(state.clone());

        let response = app.clone().oneshot(get_request("/api/stats")).await.unwrap();
        let json = body_json(response).await;
        assert!(json["current"].is_null());
        assert_eq!(json["entry_count"], 0);
        assert_eq!(json["bmi_category"], "unknown");

        state.service.set_height_cm(&state.user, 175.0).unwrap();
        state
            .service
            .log_weight(&state.user, 70.0, WeightUnit::Kg, None, None)
            .unwrap();

        let response = app.oneshot(get_request("/api/stats")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["current"], 70.0);
        assert_eq!(json["bmi"], 22.9);
        assert_eq!(json["bmi_category"], "normal");
    }

    #[tokio::test]
    async fn chart_uses_display_unit() {
        let state = test_state(None);
        state.service.set_units(&state.user, WeightUnit::Lbs).unwrap();
        state
            .service
            .log_weight(&state.user, 100.0, WeightUnit::Kg, None, None)
            .unwrap();
        let app = build_router(state);

        let response = app.oneshot(get_request("/api/chart")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["unit"], "lbs");
        let value = json["points"][0]["value"].as_f64().unwrap();
        assert!((value - 220.462).abs() < 1e-6);
    }

    #[tokio::test]
    async fn profile_put_and_get() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/profile",
                &serde_json::json!({ "goal_weight_kg": 72.0, "height_m": 1.8, "units": "lbs" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get_request("/api/profile")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["goal_weight_kg"], 72.0);
        assert_eq!(json["units"], "lbs");

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/profile",
                &serde_json::json!({ "height_m": 0.0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn export_then_import_is_idempotent() {
        let source = test_state(None);
        source
            .service
            .log_weight(&source.user, 80.0, WeightUnit::Kg, None, None)
            .unwrap();
        let response = build_router(source)
            .oneshot(get_request("/api/export"))
            .await
            .unwrap();
        let exported = body_json(response).await;
        assert_eq!(exported["entries"].as_array().unwrap().len(), 1);

        let app = test_app(None);
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/import", &exported))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["entries_imported"], 1);

        let response = app
            .oneshot(json_request("POST", "/api/import", &exported))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["entries_imported"], 0);
        assert_eq!(json["entries_skipped"], 1);
    }

    #[tokio::test]
    async fn import_rejects_invalid_entries() {
        let app = test_app(None);
        let body = serde_json::json!({
            "version": 1,
            "exported_at": "2025-01-01T00:00:00Z",
            "entries": [{ "uuid": "a", "date": "2025-01-01", "weight_kg": 0.0 }],
        });
        let response = app
            .oneshot(json_request("POST", "/api/import", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
