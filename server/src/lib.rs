use anyhow::Result;
use axum::{extract::{Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use qsuggest::config::Settings;
use qsuggest::persist::{load_search_indexes, IndexPaths};
use qsuggest::search::strip_stop_substring;
use qsuggest::{SearchConfig, SearchHit, SearchRanker};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    /// 1 returns the gated best match; larger values return the top `k`
    /// admitted candidates without the eligibility gate.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Comma-separated ranker names; all rankers when absent.
    pub ranker: Option<String>,
}
fn default_k() -> usize { 1 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub stripped: Option<String>,
    pub took_s: f64,
    pub rankers: Vec<RankerResult>,
}

#[derive(Serialize)]
pub struct RankerResult {
    pub ranker: String,
    pub results: Vec<SearchHit>,
}

#[derive(Clone)]
pub struct AppState {
    pub index_paths_root: PathBuf,
    pub settings: Arc<Settings>,
    pub rankers: Arc<RwLock<Vec<SearchRanker>>>,
    pub admin_token: Option<String>,
}

fn load_rankers(root: &Path, settings: &Settings) -> Result<Vec<SearchRanker>> {
    let paths = IndexPaths::new(root);
    let configs = &settings.search.rankers;
    let indexes = load_search_indexes(&paths, configs.iter().map(|c| c.tokenizer))?;
    let rankers = SearchRanker::from_configs(configs, &indexes, &settings.search.eligibility())?;
    tracing::info!(rankers = rankers.len(), root = %root.display(), "rankers loaded");
    Ok(rankers)
}

pub fn build_app(index_dir: String, settings: Settings) -> Result<Router> {
    // Load every ranker's index at startup
    let root = PathBuf::from(&index_dir);
    let rankers = load_rankers(&root, &settings)?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let app_state = AppState {
        index_paths_root: root,
        settings: Arc::new(settings),
        rankers: Arc::new(RwLock::new(rankers)),
        admin_token,
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/rankers", get(rankers_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let wanted: Option<Vec<&str>> = params
        .ranker
        .as_deref()
        .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect());
    let k = params.k.clamp(1, 100);

    let rankers = state.rankers.read();
    if let Some(names) = &wanted {
        if let Some(missing) = names.iter().find(|n| !rankers.iter().any(|r| r.name() == **n)) {
            return Err((StatusCode::BAD_REQUEST, format!("unknown ranker '{missing}'")));
        }
    }

    let mut out = Vec::new();
    for ranker in rankers.iter() {
        if wanted.as_ref().is_some_and(|names| !names.contains(&ranker.name())) {
            continue;
        }
        let results = if k == 1 {
            ranker.search(&params.q).into_iter().collect()
        } else {
            ranker.rank(&params.q).into_iter().take(k).collect()
        };
        out.push(RankerResult { ranker: ranker.name().to_string(), results });
    }
    drop(rankers);

    let stripped = strip_stop_substring(&params.q, &state.settings.search.strip_substrings);
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, stripped, took_s: elapsed.as_secs_f64(), rankers: out }))
}

pub async fn rankers_handler(State(state): State<AppState>) -> Json<Vec<SearchConfig>> {
    Json(state.settings.search.rankers.clone())
}

// --- Admin endpoints ---
async fn reload_handler(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let rankers = load_rankers(&state.index_paths_root, &state.settings)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("reload failed: {e}")))?;
    let n = rankers.len();
    *state.rankers.write() = rankers;
    Ok(Json(serde_json::json!({ "rankers": n })))
}

fn authorize(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
