use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use include_dir::{Dir, include_dir};
use metrics_exporter_prometheus::PrometheusHandle;
use mime_guess::from_path;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::actions;
use crate::auth::AdminConfig;
use crate::consultation_service::ConsultationService;
use crate::consultations_repo::ConsultationsRepository;
use crate::email::EmailService;
use crate::stripe_client::StripeConfig;

// Embed web assets into the binary
static ASSETS: Dir<'_> = include_dir!("web/build");

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

// App state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub consultations: ConsultationService,
    pub stripe: StripeConfig,
    pub admin: AdminConfig,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        stripe: StripeConfig,
        admin: AdminConfig,
        email: EmailService,
        metrics: PrometheusHandle,
    ) -> Self {
        let consultations = ConsultationService::new(
            Arc::new(ConsultationsRepository::new(pool)),
            Arc::new(stripe.clone()),
            Arc::new(email),
        );

        Self {
            consultations,
            stripe,
            admin,
            metrics,
        }
    }
}

/// Serve one embedded HTML page by name
pub fn serve_embedded_page(path: &str) -> Response {
    match ASSETS.get_file(path) {
        Some(file) => {
            let mut headers = HeaderMap::new();
            headers.insert("content-type", "text/html; charset=utf-8".parse().unwrap());
            headers.insert("cache-control", "no-cache".parse().unwrap());
            (StatusCode::OK, headers, file.contents()).into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

async fn handle_static_file(uri: Uri) -> impl IntoResponse {
    let path = uri.path().trim_start_matches('/');

    // Handle root path
    if (path.is_empty() || path == "index.html")
        && let Some(index_file) = ASSETS.get_file("index.html")
    {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/html; charset=utf-8".parse().unwrap());
        headers.insert("cache-control", "public, max-age=3600".parse().unwrap());
        return (StatusCode::OK, headers, index_file.contents()).into_response();
    }

    if let Some(file) = ASSETS.get_file(path) {
        let mut headers = HeaderMap::new();

        let content_type = from_path(path).first_or_octet_stream();
        headers.insert("content-type", content_type.as_ref().parse().unwrap());

        // Service worker script is revalidated on every fetch
        if path == "sw.js" {
            headers.insert("cache-control", "no-cache".parse().unwrap());
        } else if path.starts_with("assets/") {
            headers.insert(
                "cache-control",
                "public, max-age=31536000, immutable".parse().unwrap(),
            );
        } else {
            headers.insert("cache-control", "public, max-age=3600".parse().unwrap());
        }

        return (StatusCode::OK, headers, file.contents()).into_response();
    }

    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state.metrics.render()
}

// Middleware for request logging with correlation ID
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4().to_string()[..8].to_string();
    let start_time = Instant::now();

    info!("Started {} {} [{}]", method, path, request_id);

    let response = next.run(request).await;
    let duration = start_time.elapsed();
    let status = response.status();

    info!(
        "Completed {} {} [{}] {} in {:.2}ms",
        method,
        path,
        request_id,
        status.as_u16(),
        duration.as_secs_f64() * 1000.0
    );

    response
}

// Middleware to capture HTTP errors to Sentry
async fn sentry_error_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    if response.status().is_server_error() {
        let status = response.status();
        error!("HTTP {} error on {} {}", status.as_u16(), method, uri);

        sentry::configure_scope(|scope| {
            scope.set_tag("http.method", method.as_str());
            scope.set_tag("http.url", uri.to_string());
            scope.set_tag("http.status_code", status.as_u16().to_string());
        });

        sentry::capture_message(
            &format!("HTTP {} error on {} {}", status.as_u16(), method, uri),
            sentry::Level::Error,
        );
    }

    response
}

pub async fn start_web_server(interface: String, port: u16, state: AppState) -> Result<()> {
    sentry::configure_scope(|scope| {
        scope.set_tag("operation", "web-server");
    });
    info!("Starting web server on {}:{}", interface, port);

    let cors_layer = CorsLayer::permissive();

    let app = Router::new()
        // Payment provider callback
        .route("/api/webhook", post(actions::handle_stripe_webhook))
        // Customer flow
        .route("/form", get(actions::form_gate))
        .route("/api/submit", post(actions::submit_question))
        // Admin flow
        .route("/api/admin/login", post(actions::login))
        .route("/api/admin/logout", post(actions::logout))
        .route("/api/admin/stats", get(actions::admin_stats))
        .route("/api/admin/consultations", get(actions::list_consultations))
        .route("/api/admin/respond", post(actions::respond))
        .route(
            "/api/admin/consultations/{id}",
            delete(actions::delete_consultation),
        )
        // Operational endpoints
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .fallback(handle_static_file)
        .with_state(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(middleware::from_fn(sentry_error_middleware))
        .layer(cors_layer);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", interface, port)).await?;
    info!("Web server listening on http://{}:{}", interface, port);

    axum::serve(listener, app).await?;

    Ok(())
}
