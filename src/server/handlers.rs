use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::GatewayError;
use crate::forecast::WeatherEnvelope;
use crate::region::{Coordinate, RegionQuery, TableStatus};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

pub(super) struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Validation(msg) => api_error(StatusCode::BAD_REQUEST, msg),
            GatewayError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
            GatewayError::TableUnavailable(_) => {
                api_error(StatusCode::SERVICE_UNAVAILABLE, "region table unavailable")
            }
            // Already logged with detail at the fetch boundary.
            GatewayError::Upstream(ref u) => {
                api_error(StatusCode::INTERNAL_SERVER_ERROR, u.public_message())
            }
            GatewayError::Internal(_) => {
                error!(error = %e, "request failed");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

/// Run resolver/fetcher work off the async runtime; both block.
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T, GatewayError>
where
    F: FnOnce(&AppState) -> Result<T, GatewayError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(state.as_ref()))
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ─── GET /weather?nx=&ny= ────────────────────────────────────────

#[derive(Deserialize)]
pub struct GridQuery {
    pub nx: Option<String>,
    pub ny: Option<String>,
}

#[derive(Serialize)]
pub struct GridPoint {
    pub nx: i32,
    pub ny: i32,
}

#[derive(Serialize)]
pub struct GridWeatherResponse {
    pub coordinates: GridPoint,
    pub weather: WeatherEnvelope,
}

pub async fn weather_by_grid(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GridQuery>,
) -> Result<Json<GridWeatherResponse>, ApiError> {
    let start = Instant::now();

    let (nx, ny) = match (parse_grid(params.nx.as_deref()), parse_grid(params.ny.as_deref())) {
        (Some(nx), Some(ny)) => (nx, ny),
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Provide integer 'nx' and 'ny' parameters",
            ))
        }
    };

    let weather = blocking(&state, move |s| Ok(s.fetcher.fetch_observation(nx, ny)?)).await?;

    info!(
        nx, ny,
        items = weather.data.len(),
        base_time = %weather.request_time.base_time,
        elapsed_ms = elapsed_ms(start),
        "GET /weather"
    );

    Ok(Json(GridWeatherResponse {
        coordinates: GridPoint { nx, ny },
        weather,
    }))
}

fn parse_grid(raw: Option<&str>) -> Option<i32> {
    raw.map(str::trim).and_then(|s| s.parse().ok())
}

// ─── GET /weather/{level1}/{level2?}/{level3?} and GET /region ──

#[derive(Deserialize)]
pub struct RegionParams {
    pub level1: Option<String>,
    pub level2: Option<String>,
    pub level3: Option<String>,
}

#[derive(Serialize)]
pub struct RegionWeatherResponse {
    pub region: Coordinate,
    pub weather: WeatherEnvelope,
}

pub async fn weather_by_path(
    State(state): State<Arc<AppState>>,
    Path(segments): Path<HashMap<String, String>>,
) -> Result<Json<RegionWeatherResponse>, ApiError> {
    let query = RegionQuery::new(
        segments.get("level1").map(String::as_str),
        segments.get("level2").map(String::as_str),
        segments.get("level3").map(String::as_str),
    );
    region_weather(state, query, "GET /weather/{region}").await
}

pub async fn weather_by_region(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionParams>,
) -> Result<Json<RegionWeatherResponse>, ApiError> {
    let query = RegionQuery::new(
        params.level1.as_deref(),
        params.level2.as_deref(),
        params.level3.as_deref(),
    );
    region_weather(state, query, "GET /region").await
}

async fn region_weather(
    state: Arc<AppState>,
    query: RegionQuery,
    route: &'static str,
) -> Result<Json<RegionWeatherResponse>, ApiError> {
    let start = Instant::now();
    query.validate().map_err(GatewayError::from)?;

    let label = query.to_string();
    let result = blocking(&state, move |s| {
        let region = s
            .resolver
            .lookup(&query)?
            .ok_or_else(|| GatewayError::NotFound(query.to_string()))?;
        let weather = s.fetcher.fetch_observation(region.nx, region.ny)?;
        Ok(RegionWeatherResponse { region, weather })
    })
    .await;

    match &result {
        Ok(r) => info!(
            query = %label,
            nx = r.region.nx,
            ny = r.region.ny,
            items = r.weather.data.len(),
            elapsed_ms = elapsed_ms(start),
            "{}", route
        ),
        Err(e) => warn!(query = %label, error = %e, elapsed_ms = elapsed_ms(start), "{}", route),
    }

    Ok(Json(result?))
}

// ─── GET /regions ────────────────────────────────────────────────

pub async fn region_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Coordinate>>, ApiError> {
    let regions = blocking(&state, |s| Ok(s.resolver.try_list_all_regions()?)).await?;
    Ok(Json(regions))
}

// ─── POST /regions/refresh ───────────────────────────────────────

#[derive(Serialize)]
pub struct RefreshResponse {
    pub regions: usize,
}

pub async fn refresh_regions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let regions = blocking(&state, |s| Ok(s.resolver.refresh()?.len())).await?;
    info!(regions, "POST /regions/refresh");
    Ok(Json(RefreshResponse { regions }))
}

// ─── GET /health ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub table: TableStatus,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let table = state.resolver.status();
    if table.is_healthy() {
        (StatusCode::OK, Json(HealthResponse { status: "ok", table })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "degraded", table }),
        )
            .into_response()
    }
}
