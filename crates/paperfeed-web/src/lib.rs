//! Read/trigger HTTP API over the stored paper sets.
//!
//! Every response carries permissive CORS headers so a static frontend on
//! any origin can read the feed; OPTIONS preflights short-circuit before
//! the handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use paperfeed_core::{ArchiveEntry, ScoredPaper, StoredLatestSet};
use paperfeed_pipeline::{
    ArchiveManager, ArchiveQuery, ArchiveStats, GroupedHits, Orchestrator, LATEST_KEY,
};
use paperfeed_storage::{read_json, KvStore};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "paperfeed-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KvStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(store: Arc<dyn KvStore>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { store, orchestrator }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/papers", get(papers_handler))
        .route("/api/archive", get(archive_handler))
        .route("/api/archive/stats", get(archive_stats_handler))
        .route("/api/refresh", post(refresh_handler))
        .layer(middleware::from_fn(cors))
        .with_state(Arc::new(state))
}

pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr, "api listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors(response.headers_mut());
        return response;
    }
    let mut response = next.run(request).await;
    apply_cors(response.headers_mut());
    response
}

#[derive(Debug, Default, Deserialize)]
struct PapersParams {
    filter: Option<String>,
    count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PapersResponse {
    papers: Vec<ScoredPaper>,
    updated: Option<DateTime<Utc>>,
    total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn papers_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PapersParams>,
) -> Json<PapersResponse> {
    let latest: Option<StoredLatestSet> = read_json(state.store.as_ref(), LATEST_KEY).await;
    let Some(latest) = latest.filter(|set| !set.papers.is_empty()) else {
        return Json(PapersResponse {
            papers: Vec::new(),
            updated: None,
            total: 0,
            error: Some("no papers stored yet; trigger /api/refresh or wait for the next run".to_string()),
        });
    };

    let mut papers = latest.papers;
    if let Some(filter) = params.filter.as_deref().filter(|f| *f != "all") {
        papers.retain(|p| p.tags.iter().any(|t| t == filter));
    }
    if let Some(count) = params.count {
        papers.truncate(count);
    }
    Json(PapersResponse {
        papers,
        updated: latest.updated,
        total: latest.count,
        error: None,
    })
}

#[derive(Debug, Default, Deserialize)]
struct ArchiveParams {
    q: Option<String>,
    tag: Option<String>,
    category: Option<String>,
    min_relevance: Option<f64>,
    #[serde(default)]
    only_golden: bool,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ArchiveResponse {
    papers: Vec<ArchiveEntry>,
    grouped: GroupedHits,
    total: usize,
    filtered: usize,
    updated: Option<DateTime<Utc>>,
}

async fn archive_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArchiveParams>,
) -> Json<ArchiveResponse> {
    let manager = ArchiveManager::new(state.store.clone());
    let archive = manager.load().await;
    let query = ArchiveQuery {
        q: params.q,
        tag: params.tag,
        category: params.category,
        min_relevance: params.min_relevance,
        only_golden: params.only_golden,
        limit: params.limit,
    };
    let hits = ArchiveManager::search(&archive, &query);
    Json(ArchiveResponse {
        total: archive.papers.len(),
        filtered: hits.len(),
        grouped: ArchiveManager::group(&hits),
        papers: hits,
        updated: archive.updated,
    })
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum StatsResponse {
    Empty { message: String },
    Stats(ArchiveStats),
}

async fn archive_stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let manager = ArchiveManager::new(state.store.clone());
    let archive = manager.load().await;
    if archive.papers.is_empty() {
        return Json(StatsResponse::Empty {
            message: "archive is empty".to_string(),
        });
    }
    Json(StatsResponse::Stats(ArchiveManager::stats(&archive)))
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    status: String,
    timestamp: DateTime<Utc>,
    papers_stored: usize,
}

async fn refresh_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.run_once().await {
        Ok(summary) => Json(RefreshResponse {
            status: "success".to_string(),
            timestamp: summary.timestamp,
            papers_stored: summary.papers_stored,
        })
        .into_response(),
        Err(err) => {
            error!(%err, "manual refresh failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "error", "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use paperfeed_core::{RawPaper, ShownPaper};
    use paperfeed_pipeline::{NoEnrichment, ScoringConfig};
    use paperfeed_storage::{write_json, HttpClientConfig, HttpFetcher, MemoryKv};
    use serde_json::Value;
    use tower::ServiceExt;

    fn scored(title: &str, url: &str, score: f64, tags: &[&str], golden: bool) -> ScoredPaper {
        ScoredPaper {
            paper: RawPaper {
                title: title.to_string(),
                abstract_text: "persistent homology of gene regulatory networks".to_string(),
                authors: vec!["A. Researcher".to_string()],
                published: Utc::now(),
                url: url.to_string(),
                pdf_url: format!("{url}.pdf"),
                source: "arxiv".to_string(),
                topics: tags.iter().map(|t| t.to_string()).collect(),
                categories: Vec::new(),
                primary_category: None,
                citations: None,
            },
            score,
            base_score: score,
            multiplier: 1.0,
            matched_categories: vec!["math".to_string()],
            category_count: 1,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            matched_keywords: Default::default(),
            is_golden: golden,
            quality_score: Some(0.0),
        }
    }

    async fn state_with_store(store: Arc<MemoryKv>) -> AppState {
        let kv: Arc<dyn KvStore> = store;
        let http = Arc::new(HttpFetcher::new(HttpClientConfig::default()).expect("client"));
        let orchestrator = Arc::new(Orchestrator::new(
            kv.clone(),
            http,
            Vec::new(),
            &ScoringConfig::builtin().expect("builtin table"),
            Arc::new(NoEnrichment),
            7,
            std::time::Duration::ZERO,
        ));
        AppState::new(kv, orchestrator)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn papers_endpoint_reports_empty_state_without_failing() {
        let state = state_with_store(Arc::new(MemoryKv::new())).await;
        let (status, body) = get_json(app(state), "/api/papers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["papers"].as_array().unwrap().len(), 0);
        assert!(body["updated"].is_null());
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn papers_endpoint_filters_by_tag_and_caps_count() {
        let store = Arc::new(MemoryKv::new());
        let latest = StoredLatestSet {
            papers: vec![
                scored("A", "https://p/a", 9.0, &["tda"], true),
                scored("B", "https://p/b", 7.0, &["genomics"], false),
                scored("C", "https://p/c", 5.0, &["tda"], false),
            ],
            updated: Some(Utc::now()),
            count: 3,
        };
        write_json(store.as_ref(), LATEST_KEY, &latest, None)
            .await
            .expect("seed");
        let state = state_with_store(store).await;
        let router = app(state);

        let (status, body) = get_json(router.clone(), "/api/papers?filter=tda").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["papers"].as_array().unwrap().len(), 2);
        assert_eq!(body["total"], 3);

        let (_, body) = get_json(router.clone(), "/api/papers?filter=all&count=1").await;
        assert_eq!(body["papers"].as_array().unwrap().len(), 1);
        assert_eq!(body["papers"][0]["title"], "A");

        // The flattened paper shape keeps the raw fields at the top level.
        assert_eq!(body["papers"][0]["url"], "https://p/a");
        assert!(body["papers"][0]["is_golden"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn archive_endpoint_applies_only_golden() {
        let store = Arc::new(MemoryKv::new());
        let kv: Arc<dyn KvStore> = store.clone();
        let manager = ArchiveManager::new(kv);
        manager
            .record(
                &[
                    scored("gold", "https://p/a", 9.0, &["tda"], true),
                    scored("plain", "https://p/b", 7.0, &["tda"], false),
                ],
                Utc::now(),
            )
            .await
            .expect("seed archive");

        let state = state_with_store(store).await;
        let (status, body) = get_json(app(state), "/api/archive?only_golden=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["filtered"], 1);
        assert_eq!(body["papers"][0]["title"], "gold");
        assert_eq!(body["grouped"]["golden"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["grouped"]["by_category"]["math"].as_array().unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn archive_stats_reports_counts_or_empty_message() {
        let empty_state = state_with_store(Arc::new(MemoryKv::new())).await;
        let (_, body) = get_json(app(empty_state), "/api/archive/stats").await;
        assert!(body["message"].is_string());

        let store = Arc::new(MemoryKv::new());
        let kv: Arc<dyn KvStore> = store.clone();
        ArchiveManager::new(kv)
            .record(&[scored("gold", "https://p/a", 9.0, &["tda"], true)], Utc::now())
            .await
            .expect("seed archive");
        let state = state_with_store(store).await;
        let (_, body) = get_json(app(state), "/api/archive/stats").await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["golden_count"], 1);
        assert_eq!(body["by_source"]["arxiv"], 1);
    }

    #[tokio::test]
    async fn refresh_runs_a_cycle_and_reports_zero_for_no_sources() {
        let store = Arc::new(MemoryKv::new());
        let ledger = paperfeed_core::RecentlyShownLedger {
            papers: vec![ShownPaper {
                url: "https://p/old".to_string(),
                title: "Old".to_string(),
            }],
            updated: Some(Utc::now()),
        };
        write_json(store.as_ref(), paperfeed_pipeline::LEDGER_KEY, &ledger, None)
            .await
            .expect("seed ledger");

        let state = state_with_store(store).await;
        let resp = app(state)
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["papers_stored"], 0);
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn cors_headers_are_present_and_options_short_circuits() {
        let state = state_with_store(Arc::new(MemoryKv::new())).await;
        let router = app(state);

        let preflight = router
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("OPTIONS")
                    .uri("/api/papers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            preflight.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );

        let get_resp = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/papers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(get_resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
