use crate::config::AppConfig;
use crate::data::Assets;
use crate::inflation::UnsupportedYear;
use crate::lookup::PlaceIndex;
use crate::types::{Granularity, LATEST_YEAR};
use crate::views::{self, IncreasesView, KommunOption, OverviewView, PlaceCard, Specifics};
use crate::render::Figure;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

pub struct AppState {
    pub assets: Assets,
    indexes: HashMap<Granularity, PlaceIndex>,
    shapes_json: HashMap<Granularity, String>,
}

impl AppState {
    pub fn new(assets: Assets) -> Result<Self> {
        let mut indexes = HashMap::new();
        let mut shapes_json = HashMap::new();
        for granularity in [Granularity::Kommun, Granularity::County] {
            let index = PlaceIndex::new(assets.shapes(granularity).to_vec());
            if index.is_empty() {
                warn!("No {} boundaries loaded, map clicks will not resolve", granularity);
            } else {
                info!("Spatial index for {} holds {} places", granularity, index.len());
            }
            indexes.insert(granularity, index);
            if let Some(map) = assets.map(granularity) {
                shapes_json.insert(
                    granularity,
                    serde_json::to_string(map).context("Failed to serialise boundaries")?,
                );
            }
        }
        Ok(Self {
            assets,
            indexes,
            shapes_json,
        })
    }
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl From<UnsupportedYear> for ApiError {
    fn from(e: UnsupportedYear) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    #[serde(alias = "inflation_on", alias = "true")]
    On,
    #[serde(alias = "inflation_off", alias = "false")]
    Off,
}

fn default_toggle() -> Toggle {
    Toggle::On
}

fn latest_year() -> u16 {
    LATEST_YEAR
}

fn default_kommun() -> String {
    "Örnsköldsvik".to_string()
}

#[derive(Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    view: Granularity,
}

#[derive(Deserialize)]
pub struct InflationQuery {
    #[serde(default = "default_toggle")]
    inflation: Toggle,
}

#[derive(Deserialize)]
pub struct MapQuery {
    #[serde(default)]
    view: Granularity,
    #[serde(default = "latest_year")]
    year: u16,
}

#[derive(Deserialize)]
pub struct CardQuery {
    #[serde(default)]
    view: Granularity,
    relation: u64,
}

#[derive(Deserialize)]
pub struct PointQuery {
    #[serde(default)]
    view: Granularity,
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    search: Option<String>,
    selected: Option<String>,
}

#[derive(Deserialize)]
pub struct SpecificsQuery {
    #[serde(default = "default_kommun")]
    kommun: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/overview", get(overview_handler))
        .route("/api/increases", get(increases_handler))
        .route("/api/choropleth", get(choropleth_handler))
        .route("/api/card", get(card_handler))
        .route("/api/query", get(query_handler))
        .route("/api/kommuner", get(kommuner_handler))
        .route("/api/specifics", get(specifics_handler))
        .route("/api/shapes/:view", get(shapes_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, assets: Assets) -> Result<()> {
    let state = Arc::new(AppState::new(assets)?);

    let mut app = router(state);
    if let Some(dir) = &config.server.static_dir {
        info!("Serving static files from {:?}", dir);
        app = app.fallback_service(ServeDir::new(dir));
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn overview_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewQuery>,
) -> Json<OverviewView> {
    Json(views::overview(&state.assets, params.view))
}

async fn increases_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InflationQuery>,
) -> Result<Json<IncreasesView>, ApiError> {
    let view = views::increases(&state.assets, params.inflation == Toggle::On)?;
    Ok(Json(view))
}

async fn choropleth_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MapQuery>,
) -> Result<Json<Figure>, ApiError> {
    Ok(Json(views::choropleth(&state.assets, params.view, params.year)?))
}

async fn card_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CardQuery>,
) -> Result<Json<PlaceCard>, ApiError> {
    views::place_card(&state.assets, params.view, params.relation)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No {} with relation {}", params.view, params.relation)))
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PointQuery>,
) -> Json<Option<PlaceCard>> {
    let card = state
        .indexes
        .get(&params.view)
        .and_then(|index| index.locate(params.lon, params.lat))
        .and_then(|relation| views::place_card(&state.assets, params.view, relation));
    Json(card)
}

async fn kommuner_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Json<Vec<KommunOption>> {
    Json(views::search_kommuner(
        &state.assets,
        params.search.as_deref(),
        params.selected.as_deref(),
    ))
}

async fn specifics_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SpecificsQuery>,
) -> Result<Json<Specifics>, ApiError> {
    views::kommun_specifics(&state.assets, &params.kommun)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown kommun '{}'", params.kommun)))
}

async fn shapes_handler(
    State(state): State<Arc<AppState>>,
    Path(view): Path<Granularity>,
) -> Result<Response, ApiError> {
    let body = state
        .shapes_json
        .get(&view)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("No boundaries loaded for {}", view)))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
