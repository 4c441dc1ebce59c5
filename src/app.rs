use std::net::SocketAddr;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::HttpConfig;
use crate::state::AppState;
use crate::users;

fn cors_layer(cfg: &HttpConfig) -> anyhow::Result<CorsLayer> {
    let Some(origin) = &cfg.cors_origin else {
        return Ok(CorsLayer::permissive());
    };
    // cookies only flow cross-origin to an explicit origin with credentials on
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let http = &state.config.http;
    let cors = cors_layer(http)?;
    let static_files = ServeDir::new(&http.static_dir);

    let app = Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .nest("/users", users::router(http.max_upload_bytes))
                .route("/health", get(|| async { "ok" })),
        )
        .fallback_service(static_files)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        );
    Ok(app)
}

pub async fn serve(app: Router, cfg: &HttpConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
