//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, timeout, request deadline, governor)
//! - Forward admitted requests to the upstream
//! - Record request metrics
//!
//! # Data Flow
//! ```text
//! TraceLayer → TimeoutLayer → deadline → GovernorLayer → proxy_handler → upstream
//! ```
//!
//! The upstream body is streamed through unbuffered; the governor keeps the
//! request's permits until that body has been written out.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::cost::{CostEstimator, PatternCostEstimator};
use crate::governor::{GovernorLayer, Params, RequestDeadline};
use crate::lifecycle::shutdown;
use crate::observability::metrics;

/// Error type for server setup and serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream address {0:?}")]
    InvalidUpstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
}

/// Governed reverse proxy server.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Create a server for `config`, pricing requests with `estimator`.
    ///
    /// The estimator is shared so cost rules can change while serving.
    pub fn new(config: AppConfig, estimator: Arc<PatternCostEstimator>) -> Result<Self, ServerError> {
        let upstream = Authority::from_str(&config.upstream.address)
            .map_err(|_| ServerError::InvalidUpstream(config.upstream.address.clone()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState { client, upstream };

        let params = metrics::governor_sinks().apply(Params {
            cost_estimator: Some(estimator as Arc<dyn CostEstimator>),
            ..config.limits.to_params()
        });

        let router = Self::build_router(&config, params, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, params: Params, state: AppState) -> Router {
        let request_timeout = Duration::from_secs(config.timeouts.request_secs);

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(GovernorLayer::new(params))
            .layer(middleware::map_request(move |mut req: Request<Body>| async move {
                let deadline = tokio::time::Instant::now() + request_timeout;
                req.extensions_mut().insert(RequestDeadline(deadline));
                req
            }))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            max_concurrency = self.config.limits.max_concurrency,
            max_burst = self.config.limits.max_burst,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Forward an admitted request to the upstream.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    let (parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(uri = %parts.uri, error = %e, "Cannot build upstream URI");
            metrics::record_request(&method, 400, start_time);
            return (StatusCode::BAD_REQUEST, "Invalid request target").into_response();
        }
    };

    tracing::debug!(method = %method, uri = %uri, "Proxying request");

    let mut upstream_req = Request::from_parts(parts, body);
    *upstream_req.uri_mut() = uri;

    match state.client.request(upstream_req).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), start_time);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(upstream = %state.upstream, error = %e, "Upstream error");
            metrics::record_request(&method, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_upstream() {
        let mut config = AppConfig::default();
        config.upstream.address = "not an address".into();

        let err = HttpServer::new(config, Arc::new(PatternCostEstimator::new())).err();
        assert!(matches!(err, Some(ServerError::InvalidUpstream(_))));
    }
}
