//! # HTTP Server Module
//!
//! REST API, WebSocket event stream and a static dashboard over the
//! document store. All handlers share one `Scraper` through an
//! `Extension`.
//!
//! ## Routes
//!
//! - `GET /` dashboard
//! - `GET /health` database probe
//! - `GET /api/documents`, `GET|DELETE /api/documents/:id`
//! - `GET /api/search?q=...`
//! - `POST /api/scrape`
//! - `GET /api/stats`, `GET /api/sources`, `GET /api/proxies`
//! - `POST /api/cache/prune`
//! - `GET /ws` live `ScrapeEvent`s

mod error;
mod routes;
mod ws;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::Extension;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;
pub use routes::DocumentSummary;

use crate::pipeline::Scraper;

/// Longest a request may run; a large scrape batch is the slow case
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scraper: Scraper,
}

/// Build the application router
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::dashboard))
        .route("/health", get(routes::health))
        .route("/api/documents", get(routes::list_documents))
        .route(
            "/api/documents/:id",
            get(routes::get_document).delete(routes::delete_document),
        )
        .route("/api/search", get(routes::search))
        .route("/api/scrape", post(routes::scrape))
        .route("/api/stats", get(routes::stats))
        .route("/api/sources", get(routes::sources))
        .route("/api/proxies", get(routes::proxies))
        .route("/api/cache/prune", post(routes::prune_cache))
        .route("/ws", get(ws::ws_handler))
        .layer(Extension(state))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, ResponseCache};
    use crate::classifier::{Classifier, Grade, QualityScore};
    use crate::crawler::{CrawlerConfig, Fetcher, PageMetadata, ProxyRotator};
    use crate::index::{Database, Document};
    use crate::registry::{DocumentCategory, SourceRegistry};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::{SinkExt, StreamExt};
    use serde_json::Value;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
    use tower::ServiceExt;

    type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn state() -> AppState {
        let db = Database::new_in_memory().await.unwrap();
        let config = CrawlerConfig::builder()
            .direct_only()
            .delay_ms(0)
            .retry_backoff_ms(0)
            .max_retries(1)
            .request_timeout(Duration::from_secs(5))
            .min_content_length(100)
            .build();
        let fetcher = Fetcher::new(config, ProxyRotator::new()).unwrap();
        let cache = ResponseCache::new(db.clone(), CacheConfig::default());
        AppState {
            scraper: Scraper::new(
                fetcher,
                cache,
                Classifier::default(),
                db,
                SourceRegistry::default(),
            ),
        }
    }

    async fn insert_document(state: &AppState) -> i64 {
        let document = Document {
            id: 0,
            url: "https://rc.majlis.ir/fa/law/show/94202".to_string(),
            domain: "rc.majlis.ir".to_string(),
            title: "قانون مدنی".to_string(),
            content: "ماده ۱ - مصوبات مجلس شورای اسلامی".to_string(),
            content_hash: "abc".to_string(),
            category: DocumentCategory::Law,
            confidence: 0.9,
            matched_terms: vec!["قانون".to_string()],
            quality: QualityScore {
                legal_density: 80.0,
                structure: 70.0,
                reliability: 95.0,
                readability: 60.0,
                total: 78.5,
                grade: Grade::B,
            },
            metadata: PageMetadata::default(),
            fetch_method: "direct".to_string(),
            extraction_method: "heuristic".to_string(),
            created_at: 1,
            updated_at: 1,
        };
        state
            .scraper
            .database()
            .upsert_document(&document)
            .await
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_app(state().await);
        let (status, body) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_dashboard_is_html() {
        let app = build_app(state().await);
        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_documents_endpoints() {
        let state = state().await;
        let id = insert_document(&state).await;
        let app = build_app(state);

        let (status, body) = send(app.clone(), get("/api/documents?category=law")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["grade"], "B");
        assert!(body[0].get("content").is_none());

        let (status, _) = send(app.clone(), get("/api/documents?category=treaty")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(app.clone(), get(&format!("/api/documents/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "قانون مدنی");

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/documents/{}", id))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app.clone(), delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(app, get(&format!("/api/documents/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_search_endpoint() {
        let state = state().await;
        insert_document(&state).await;
        let app = build_app(state);

        let (status, body) = send(app.clone(), get("/api/search?q=%D9%85%D8%AF%D9%86%DB%8C")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(app, get("/api/search?q=")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_scrape_rejects_empty_batch() {
        let app = build_app(state().await);
        let request = Request::builder()
            .method("POST")
            .uri("/api/scrape")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"urls": []}"#))
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_scrape_rejects_invalid_url() {
        let state = state().await;
        let mut events = state.scraper.subscribe();
        let app = build_app(state);
        let request = Request::builder()
            .method("POST")
            .uri("/api/scrape")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"urls": ["https://rc.majlis.ir/fa/law/show/1", "not a url"]}"#))
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not a url"));
        // Nothing was started
        assert!(events.try_recv().is_err());
    }

    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_app(state().await);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn next_json(socket: &mut Socket) -> Value {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(10), socket.next())
                .await
                .expect("no message within 10s")
                .expect("socket closed")
                .unwrap();
            if let WsMessage::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_websocket_ping_scrape_and_bad_message() {
        let mut upstream = mockito::Server::new_async().await;
        upstream
            .mock("GET", "/law/7")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(format!(
                "<html><head><title>قانون</title></head><body><h1>قانون بیمه اجباری</h1>\
                 <div class=\"content\">{}</div></body></html>",
                "ماده ۱ - این قانون از تاریخ تصویب لازم‌الاجرا است و آیین‌نامه اجرایی آن ظرف سه ماه تهیه می‌شود. "
                    .repeat(10)
            ))
            .create_async()
            .await;

        let addr = spawn_server().await;
        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        socket
            .send(WsMessage::Text(r#"{"action":"ping"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(next_json(&mut socket).await["type"], "pong");

        socket
            .send(WsMessage::Text("{not json".to_string()))
            .await
            .unwrap();
        let reply = next_json(&mut socket).await;
        assert_eq!(reply["type"], "error");
        assert!(reply["error"].is_string());

        socket
            .send(WsMessage::Text(r#"{"action":"teleport"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(next_json(&mut socket).await["type"], "error");

        let url = format!("{}/law/7", upstream.url());
        socket
            .send(WsMessage::Text(
                serde_json::json!({ "action": "scrape", "url": &url }).to_string(),
            ))
            .await
            .unwrap();

        let started = next_json(&mut socket).await;
        assert_eq!(started["type"], "started");
        assert_eq!(started["url"], url.as_str());

        let fetched = next_json(&mut socket).await;
        assert_eq!(fetched["type"], "fetched");
        assert_eq!(fetched["method"], "direct");
        assert_eq!(fetched["from_cache"], false);

        let completed = next_json(&mut socket).await;
        assert_eq!(completed["type"], "completed");
        assert_eq!(completed["category"], "law");
        assert_eq!(completed["title"], "قانون بیمه اجباری");
        assert!(completed["id"].as_i64().unwrap() > 0);

        socket.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_sources_proxies_prune() {
        let state = state().await;
        insert_document(&state).await;
        let app = build_app(state);

        let (status, body) = send(app.clone(), get("/api/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents"]["total_documents"], 1);
        assert_eq!(body["cache"]["hits"], 0);

        let (_, body) = send(app.clone(), get("/api/sources")).await;
        assert!(
            body.as_array()
                .unwrap()
                .iter()
                .any(|s| s["domain"] == "rc.majlis.ir")
        );

        let (status, body) = send(app.clone(), get("/api/proxies")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let prune = Request::builder()
            .method("POST")
            .uri("/api/cache/prune")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, prune).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 0);
    }
}
