//! Reverse proxy server assembling responses on request.

use crate::upstream::{is_hop_by_hop, UpstreamPipeline};
use anyhow::{Context, Result};
use assemblage_core::{Config, ContentSource, Engine, Headers, Request, Response};
use axum::{
    body::{self, Body},
    extract::State,
    http::{self, request::Parts, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Command-line overrides of the `server` and `assembler` sections
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub listen: Option<String>,
    pub upstream: Option<String>,
    pub max_content_length: Option<usize>,
    pub max_request_body: Option<usize>,
}

impl ServeOptions {
    fn apply(self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.server.listen_addr = listen;
        }
        if let Some(upstream) = self.upstream {
            config.server.upstream = Some(upstream);
        }
        if let Some(max_content_length) = self.max_content_length {
            config.assembler.max_content_length = max_content_length;
        }
        if let Some(max_request_body) = self.max_request_body {
            config.server.max_request_body = max_request_body;
        }
    }
}

#[derive(Clone)]
struct AppState {
    engine: Engine,
    max_request_body: usize,
}

/// Start the proxy and serve until interrupted
pub async fn serve(config_path: &Path, options: ServeOptions) -> Result<()> {
    let mut config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    options.apply(&mut config);

    let upstream = config
        .server
        .upstream
        .clone()
        .context("No upstream configured (set server.upstream or --upstream)")?;
    let repository = config
        .repository()
        .context("Invalid assemblage configuration")?;
    if repository.is_empty() {
        tracing::warn!("No assemblages configured; responses pass through unchanged");
    }

    let pipeline = UpstreamPipeline::new(&upstream)?;
    let upstream_base = pipeline.base().clone();
    let engine = Engine::new(
        Arc::new(repository),
        Arc::new(pipeline),
        config.assembler.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;
    tracing::info!(
        listen = %config.server.listen_addr,
        upstream = %upstream_base,
        "Assemblage proxy ready"
    );

    axum::serve(listener, router(engine, config.server.max_request_body))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

pub fn router(engine: Engine, max_request_body: usize) -> Router {
    Router::new()
        .route("/_assemblage/health", get(health))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            engine,
            max_request_body,
        })
}

async fn health() -> &'static str {
    "ok"
}

async fn proxy(State(state): State<AppState>, request: http::Request<Body>) -> http::Response<Body> {
    let (parts, body) = request.into_parts();
    let declared = parts
        .headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|length| length > state.max_request_body) {
        return payload_too_large(state.max_request_body);
    }
    // Undeclared bodies stop reading at the limit.
    let body = match body::to_bytes(body, state.max_request_body).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read request body");
            return payload_too_large(state.max_request_body);
        }
    };

    let request = to_engine_request(&parts, body);
    let response = state.engine.process(request).await;
    into_http_response(response)
}

fn payload_too_large(maximum: usize) -> http::Response<Body> {
    tracing::debug!(maximum, "Rejecting oversized request body");
    (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
}

fn to_engine_request(parts: &Parts, body: body::Bytes) -> Request {
    let mut headers = Headers::new();
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => headers.append(name.as_str(), value),
            Err(_) => tracing::debug!(header = %name, "Dropping non-text request header"),
        }
    }
    let parameters = parts
        .uri
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let mut request = Request::new(parts.method.as_str(), parts.uri.path())
        .with_scheme(parts.uri.scheme_str().unwrap_or("http"))
        .with_parameters(parameters)
        .with_headers(headers);
    if !body.is_empty() {
        request = request.with_body(body);
    }
    request
}

fn into_http_response(response: Response) -> http::Response<Body> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = http::Response::builder().status(status);
    for (name, value) in response.headers.iter() {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        builder = builder.header(name, value);
    }
    if let Some(length) = response.length {
        builder = builder.header(http::header::CONTENT_LENGTH, length);
    }

    let body = match response.source {
        Some(ContentSource::Buffered(bytes)) => Body::from(bytes),
        Some(ContentSource::Stream(stream)) => Body::from_stream(stream),
        None => match response.text {
            Some(text) if !status.is_success() => Body::from(text),
            _ => Body::empty(),
        },
    };

    builder.body(body).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Invalid response from pipeline");
        (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
