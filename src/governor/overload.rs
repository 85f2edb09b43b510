//! Responses for requests the governor refuses.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};

/// Produces the response for a request dropped because the server is
/// overloaded.
pub trait OverloadHandler: Send + Sync {
    fn handle(&self, req: Request<Body>) -> Response;
}

impl<F> OverloadHandler for F
where
    F: Fn(Request<Body>) -> Response + Send + Sync,
{
    fn handle(&self, req: Request<Body>) -> Response {
        self(req)
    }
}

/// Responds with `503 Service Unavailable` and the body `Overloaded`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOverloadHandler;

impl OverloadHandler for DefaultOverloadHandler {
    fn handle(&self, _req: Request<Body>) -> Response {
        (StatusCode::SERVICE_UNAVAILABLE, "Overloaded").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_overload_response() {
        let res = DefaultOverloadHandler.handle(Request::new(Body::empty()));
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Overloaded");
    }

    #[test]
    fn test_closure_overload_handler() {
        let handler = |_req: Request<Body>| StatusCode::TOO_MANY_REQUESTS.into_response();
        let res = handler.handle(Request::new(Body::empty()));
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
