use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use axum::{
    extract::{Json, Path, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::coords::LatLng;
use crate::geocode::{GeocodeError, Geocoder, HttpGeocoder};
use crate::ingest::{DirectorySource, ResourceSource};
use crate::session::Session;
use crate::surface::{SceneSurface, SurfaceMarker};

pub struct AppState {
    session: Mutex<Session<SceneSurface>>,
    geocoder: HttpGeocoder,
    images: DirectorySource,
    static_dir: PathBuf,
    connect_url: String,
}

impl AppState {
    pub fn new(session: Session<SceneSurface>, geocoder: HttpGeocoder, config: &Config) -> AppState {
        AppState {
            session: Mutex::new(session),
            geocoder,
            images: DirectorySource::new(&config.image_dir, &config.image_url_prefix()),
            static_dir: config.static_dir.clone(),
            connect_url: config.connect_url.clone(),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session<SceneSurface>> {
        lock(&self.session)
    }
}

// A panic mid-event leaves the session as it was after the last completed step; keep serving.
fn lock(session: &Mutex<Session<SceneSurface>>) -> MutexGuard<'_, Session<SceneSurface>> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs a search. The lookup happens before the session is locked, so zoom and scene
/// requests are not held up by a slow geocoder.
fn search_and_show<G: Geocoder + ?Sized>(
    session: &Mutex<Session<SceneSurface>>,
    query: &str,
    geocoder: &G,
) -> Result<LatLng, GeocodeError> {
    let pos = crate::session::resolve_search(query, geocoder)?;
    lock(session).show_search_result(pos);
    Ok(pos)
}

pub fn router(state: Arc<AppState>, image_url_prefix: &str) -> Router {
    Router::new()
        .route("/api/images", get(list_images))
        .route("/api/scene", get(get_scene))
        .route("/api/zoom", post(post_zoom))
        .route("/api/photos/{id}", get(get_photo))
        .route("/api/search", get(search))
        .route("/api/connect", get(connect))
        .route(&format!("{}/{{name}}", image_url_prefix), get(get_image))
        .fallback(serve_static)
        .layer(middleware::from_fn(cors))
        .layer(middleware::from_fn(log_request_response))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, config: &Config) -> std::io::Result<()> {
    let app = router(state, &config.image_url_prefix());
    let listener = TcpListener::bind(&config.bind).await?;
    info!("Serving at http://{}", config.bind);
    axum::serve(listener, app).await
}

async fn log_request_response(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    let response = next.run(req).await;
    info!("{} {} -> {}", method, path, response.status());
    response
}

async fn cors(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

// --- Handlers ---

async fn list_images(State(state): State<Arc<AppState>>) -> Response {
    let files = state.images.list().unwrap_or_default();
    Json(json!({ "files": files })).into_response()
}

async fn get_scene(State(state): State<Arc<AppState>>) -> Response {
    let mut session = state.session();
    session.surface_mut().expire_search_pin(Instant::now());
    Json(session.surface().scene().clone()).into_response()
}

#[derive(Deserialize)]
struct ZoomRequest {
    zoom: f64,
}

async fn post_zoom(State(state): State<Arc<AppState>>, Json(req): Json<ZoomRequest>) -> Response {
    if !req.zoom.is_finite() {
        return (StatusCode::BAD_REQUEST, "zoom must be a finite number").into_response();
    }
    let mut session = state.session();
    session.on_zoom_change(req.zoom);
    Json(session.surface().scene().clone()).into_response()
}

async fn get_photo(State(state): State<Arc<AppState>>, Path(id): Path<u64>) -> Response {
    match state.session().show_photo(SurfaceMarker(id)) {
        Some(details) => Json(details).into_response(),
        None => (StatusCode::NOT_FOUND, "no photo for that marker").into_response(),
    }
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

async fn search(State(state): State<Arc<AppState>>, Query(params): Query<SearchParams>) -> Response {
    let result =
        tokio::task::spawn_blocking(move || search_and_show(&state.session, &params.q, &state.geocoder))
            .await;

    match result {
        Ok(Ok(pos)) => Json(pos).into_response(),
        Ok(Err(e)) => {
            let status = match e {
                GeocodeError::EmptyQuery => StatusCode::BAD_REQUEST,
                GeocodeError::NotFound { .. } => StatusCode::NOT_FOUND,
                GeocodeError::Network(_) | GeocodeError::Config(_) => {
                    error!("Search error: {}", e);
                    StatusCode::BAD_GATEWAY
                }
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            error!("search task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn connect(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::temporary(&state.connect_url)
}

async fn get_image(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return (StatusCode::BAD_REQUEST, "Invalid filename").into_response();
    }
    send_file(&state.images.root().join(&name)).await
}

async fn serve_static(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let relative = uri.path().trim_start_matches('/');
    let relative = if relative.is_empty() { "index.html" } else { relative };
    let relative = FsPath::new(relative);
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return (StatusCode::BAD_REQUEST, "Invalid path").into_response();
    }
    send_file(&state.static_dir.join(relative)).await
}

async fn send_file(path: &FsPath) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(path))], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "File not found").into_response(),
    }
}

fn content_type(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" => "text/html; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
