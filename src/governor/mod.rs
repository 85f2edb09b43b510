//! Admission control for a request handler.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → CostEstimator (cost)
//!     → cost 0: forward, no limits apply
//!     → burst pool (try): full → overload
//!     → concurrent pool (try): free → forward
//!     → queue: wait on concurrent pool until free or deadline
//!         → granted → forward
//!         → deadline → overload
//! ```
//!
//! # Design Decisions
//! - The governor shape is fixed at construction: disabled, single pool, or
//!   burst pool in front of a concurrency pool
//! - Permits are RAII guards, released exactly once however the request ends
//! - Permits ride in the response body, so work is counted until the body
//!   has been fully produced
//! - Rejections never fail the service; they become the overload response
//! - A queued request whose future is dropped counts as overloaded

mod body;
pub mod overload;
pub mod permit;
pub mod sinks;

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{body::Body, http::Request, response::Response};
use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tower::{Layer, Service};

use crate::cost::{ConstantCost, CostEstimator};

pub use overload::{DefaultOverloadHandler, OverloadHandler};
pub use permit::{Permit, PermitPool};
pub use sinks::{Counter, Gauge, Observer};

/// Queue duration used when none is configured.
pub const DEFAULT_MAX_QUEUE_DURATION: Duration = Duration::from_secs(10);

/// Settings for a governor.
#[derive(Clone, Default)]
pub struct Params {
    /// Maximum level of concurrency allowed. 0 disables governing.
    pub max_concurrency: u64,

    /// Maximum concurrency, queued requests included, before requests are
    /// failed without queueing. Values up to `max_concurrency` disable the
    /// queue. The queue holds roughly `max_burst - max_concurrency` units.
    pub max_burst: u64,

    /// Maximum time a request may wait in the queue. Zero means
    /// [`DEFAULT_MAX_QUEUE_DURATION`].
    pub max_queue_duration: Duration,

    /// Handles requests dropped because the server is overloaded. Defaults
    /// to [`DefaultOverloadHandler`].
    pub overload_handler: Option<Arc<dyn OverloadHandler>>,

    /// Determines the cost of requests. Defaults to a cost of 1 for all.
    pub cost_estimator: Option<Arc<dyn CostEstimator>>,

    /// Incremented for every request dropped because of overload.
    pub request_overload_counter: Option<Arc<dyn Counter>>,

    /// Tracks the number of queued requests.
    pub queue_length_gauge: Option<Arc<dyn Gauge>>,

    /// Receives the time successful requests spent queued.
    pub queue_duration_observer: Option<Arc<dyn Observer>>,
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Params")
            .field("max_concurrency", &self.max_concurrency)
            .field("max_burst", &self.max_burst)
            .field("max_queue_duration", &self.max_queue_duration)
            .field("overload_handler", &self.overload_handler.is_some())
            .field("cost_estimator", &self.cost_estimator.is_some())
            .field("request_overload_counter", &self.request_overload_counter.is_some())
            .field("queue_length_gauge", &self.queue_length_gauge.is_some())
            .field("queue_duration_observer", &self.queue_duration_observer.is_some())
            .finish()
    }
}

/// Deadline attached to a request as an extension.
///
/// A queued request gives up at this instant if it comes before the
/// configured maximum queue duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDeadline(pub Instant);

/// Which limits are enforced.
#[derive(Debug)]
enum Mode {
    Disabled,
    Single {
        concurrent: PermitPool,
    },
    Queued {
        burst: PermitPool,
        concurrent: PermitPool,
    },
}

/// Params with defaults filled in, shared by every service of a layer.
struct Shared {
    mode: Mode,
    max_queue_duration: Duration,
    overload_handler: Arc<dyn OverloadHandler>,
    cost_estimator: Arc<dyn CostEstimator>,
    overload_counter: Option<Arc<dyn Counter>>,
    queue_length_gauge: Option<Arc<dyn Gauge>>,
    queue_duration_observer: Option<Arc<dyn Observer>>,
}

impl Shared {
    fn new(params: Params) -> Self {
        let mode = if params.max_concurrency == 0 {
            Mode::Disabled
        } else if params.max_burst <= params.max_concurrency {
            Mode::Single {
                concurrent: PermitPool::new(params.max_concurrency),
            }
        } else {
            Mode::Queued {
                burst: PermitPool::new(params.max_burst),
                concurrent: PermitPool::new(params.max_concurrency),
            }
        };

        let max_queue_duration = if params.max_queue_duration.is_zero() {
            DEFAULT_MAX_QUEUE_DURATION
        } else {
            params.max_queue_duration
        };

        tracing::debug!(
            mode = ?mode,
            max_concurrency = params.max_concurrency,
            max_burst = params.max_burst,
            max_queue_duration_ms = max_queue_duration.as_millis() as u64,
            "Governor configured"
        );

        Self {
            mode,
            max_queue_duration,
            overload_handler: params
                .overload_handler
                .unwrap_or_else(|| Arc::new(DefaultOverloadHandler) as Arc<dyn OverloadHandler>),
            cost_estimator: params
                .cost_estimator
                .unwrap_or_else(|| Arc::new(ConstantCost::default()) as Arc<dyn CostEstimator>),
            overload_counter: params.request_overload_counter,
            queue_length_gauge: params.queue_length_gauge,
            queue_duration_observer: params.queue_duration_observer,
        }
    }

    /// Reject a request: count it and hand it to the overload handler.
    fn overload(&self, req: Request<Body>, cost: u64, reason: &'static str) -> Response {
        tracing::warn!(
            method = %req.method(),
            path = %req.uri().path(),
            cost,
            reason,
            "Request rejected, server overloaded"
        );
        if let Some(counter) = &self.overload_counter {
            counter.inc();
        }
        self.overload_handler.handle(req)
    }

    /// Wait for `cost` units of the concurrency pool.
    ///
    /// Returns `None` once the deadline passes.
    async fn queue(
        &self,
        concurrent: &PermitPool,
        cost: u64,
        requested: Option<Instant>,
    ) -> Option<Permit> {
        let slot = QueueSlot::enter(self);
        let start = Instant::now();
        let mut deadline = start
            .checked_add(self.max_queue_duration)
            .unwrap_or_else(far_future);
        if let Some(requested) = requested {
            deadline = deadline.min(requested);
        }

        tracing::debug!(cost, "Request queued");
        let permit = tokio::time::timeout_at(deadline, concurrent.acquire(cost))
            .await
            .ok();
        slot.leave();

        if permit.is_some() {
            let waited = start.elapsed().as_secs_f64();
            tracing::debug!(cost, waited_secs = waited, "Request dequeued");
            if let Some(observer) = &self.queue_duration_observer {
                observer.observe(waited);
            }
        }
        permit
    }
}

/// An instant far enough away to never be reached.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

/// Queue membership of one request.
///
/// Keeps the queue length gauge in step and counts requests abandoned
/// while still waiting.
struct QueueSlot<'a> {
    shared: &'a Shared,
    settled: bool,
}

impl<'a> QueueSlot<'a> {
    fn enter(shared: &'a Shared) -> Self {
        if let Some(gauge) = &shared.queue_length_gauge {
            gauge.inc();
        }
        Self {
            shared,
            settled: false,
        }
    }

    fn leave(mut self) {
        self.settled = true;
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        if let Some(gauge) = &self.shared.queue_length_gauge {
            gauge.dec();
        }
        if !self.settled {
            tracing::warn!(reason = "queue_abandoned", "Request abandoned while queued");
            if let Some(counter) = &self.shared.overload_counter {
                counter.inc();
            }
        }
    }
}

/// Layer that wraps services in a [`Governor`].
///
/// Every service produced by one layer shares the same limits.
#[derive(Clone)]
pub struct GovernorLayer {
    shared: Arc<Shared>,
}

impl GovernorLayer {
    pub fn new(params: Params) -> Self {
        Self {
            shared: Arc::new(Shared::new(params)),
        }
    }
}

impl<S> Layer<S> for GovernorLayer {
    type Service = Governor<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Governor {
            inner,
            shared: self.shared.clone(),
        }
    }
}

/// Service limiting the amount of concurrent work done by `S`.
#[derive(Clone)]
pub struct Governor<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S> Governor<S> {
    pub fn new(params: Params, inner: S) -> Self {
        GovernorLayer::new(params).layer(inner)
    }
}

impl<S> Service<Request<Body>> for Governor<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Use the service that was polled ready, leave a fresh clone behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        match &self.shared.mode {
            Mode::Disabled => Box::pin(call(inner, req)),
            Mode::Single { .. } => Box::pin(serve_single(self.shared.clone(), inner, req)),
            Mode::Queued { .. } => Box::pin(serve_queued(self.shared.clone(), inner, req)),
        }
    }
}

async fn call<S>(mut inner: S, req: Request<Body>) -> Result<Response, S::Error>
where
    S: Service<Request<Body>, Response = Response>,
{
    inner.call(req).await
}

async fn serve_single<S>(
    shared: Arc<Shared>,
    inner: S,
    req: Request<Body>,
) -> Result<Response, S::Error>
where
    S: Service<Request<Body>, Response = Response>,
{
    let Mode::Single { concurrent } = &shared.mode else {
        return call(inner, req).await;
    };

    let cost = shared.cost_estimator.estimate_cost(&req);
    if cost == 0 {
        return call(inner, req).await;
    }

    match concurrent.try_acquire(cost) {
        Some(permit) => call(inner, req)
            .await
            .map(|res| body::hold_until_complete(res, vec![permit])),
        None => Ok(shared.overload(req, cost, "concurrency_exhausted")),
    }
}

async fn serve_queued<S>(
    shared: Arc<Shared>,
    inner: S,
    req: Request<Body>,
) -> Result<Response, S::Error>
where
    S: Service<Request<Body>, Response = Response>,
{
    let Mode::Queued { burst, concurrent } = &shared.mode else {
        return call(inner, req).await;
    };

    let cost = shared.cost_estimator.estimate_cost(&req);
    if cost == 0 {
        return call(inner, req).await;
    }

    let Some(burst_permit) = burst.try_acquire(cost) else {
        return Ok(shared.overload(req, cost, "burst_exhausted"));
    };

    let permit = match concurrent.try_acquire(cost) {
        Some(permit) => permit,
        None => {
            let requested = req.extensions().get::<RequestDeadline>().map(|d| d.0);
            match shared.queue(concurrent, cost, requested).await {
                Some(permit) => permit,
                None => {
                    drop(burst_permit);
                    return Ok(shared.overload(req, cost, "queue_timeout"));
                }
            }
        }
    };

    call(inner, req)
        .await
        .map(|res| body::hold_until_complete(res, vec![permit, burst_permit]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
    use std::sync::Mutex;
    use tower::{service_fn, ServiceExt};

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<f64>>);

    impl Observer for Recorder {
        fn observe(&self, seconds: f64) {
            self.0.lock().unwrap().push(seconds);
        }
    }

    #[tokio::test]
    async fn test_disabled_passes_everything() {
        let handler = service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(Response::new(Body::from("OK")))
        });
        let svc = Governor::new(Params::default(), handler);
        assert!(matches!(svc.shared.mode, Mode::Disabled));

        let res = svc.oneshot(request()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn test_mode_selection() {
        let single = Shared::new(Params {
            max_concurrency: 2,
            max_burst: 2,
            ..Default::default()
        });
        assert!(matches!(single.mode, Mode::Single { .. }));

        let collapsed = Shared::new(Params {
            max_concurrency: 4,
            max_burst: 1,
            ..Default::default()
        });
        assert!(matches!(collapsed.mode, Mode::Single { .. }));

        let queued = Shared::new(Params {
            max_concurrency: 1,
            max_burst: 3,
            ..Default::default()
        });
        match &queued.mode {
            Mode::Queued { burst, concurrent } => {
                assert_eq!(burst.capacity(), 3);
                assert_eq!(concurrent.capacity(), 1);
            }
            mode => panic!("unexpected mode {mode:?}"),
        }
        assert_eq!(queued.max_queue_duration, DEFAULT_MAX_QUEUE_DURATION);
    }

    #[tokio::test]
    async fn test_queue_deadline_from_request() {
        let shared = Shared::new(Params {
            max_concurrency: 1,
            max_burst: 2,
            max_queue_duration: Duration::from_secs(60),
            ..Default::default()
        });
        let Mode::Queued { concurrent, .. } = &shared.mode else {
            panic!("expected queued mode");
        };
        let _held = concurrent.try_acquire(1).unwrap();

        let started = Instant::now();
        let requested = started + Duration::from_millis(20);
        assert!(shared.queue(concurrent, 1, Some(requested)).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_abandoned_queue_slot_counts_overload() {
        let counter = Arc::new(AtomicU64::new(0));
        let gauge = Arc::new(AtomicI64::new(0));
        let shared = Shared::new(Params {
            max_concurrency: 1,
            max_burst: 2,
            request_overload_counter: Some(counter.clone()),
            queue_length_gauge: Some(gauge.clone()),
            ..Default::default()
        });
        let Mode::Queued { concurrent, .. } = &shared.mode else {
            panic!("expected queued mode");
        };
        let _held = concurrent.try_acquire(1).unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), shared.queue(concurrent, 1, None)).await;
        assert!(abandoned.is_err());
        assert_eq!(gauge.load(Ordering::SeqCst), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dequeue_records_wait() {
        let recorder = Arc::new(Recorder::default());
        let shared = Shared::new(Params {
            max_concurrency: 1,
            max_burst: 2,
            queue_duration_observer: Some(recorder.clone()),
            ..Default::default()
        });
        let Mode::Queued { concurrent, .. } = &shared.mode else {
            panic!("expected queued mode");
        };
        let held = concurrent.try_acquire(1).unwrap();

        let release = async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(held);
        };
        let (permit, ()) = tokio::join!(shared.queue(concurrent, 1, None), release);

        assert!(permit.is_some());
        let observed = recorder.0.lock().unwrap().clone();
        assert_eq!(observed.len(), 1);
        assert!(observed[0] >= 0.01, "waited {}", observed[0]);
    }
}
