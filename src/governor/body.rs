//! Response bodies that keep their request's permits.
//!
//! A request holds its weight until the response body has been fully
//! produced, not just until the response head is ready. The permits travel
//! inside the body and are returned when the last frame has been read or the
//! body is dropped, whichever comes first.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::body::{Body, Bytes};
use axum::response::Response;
use hyper::body::{Body as HttpBody, Frame, SizeHint};

use crate::governor::permit::Permit;

/// Move `permits` into the body of `res`.
pub(crate) fn hold_until_complete(res: Response, permits: Vec<Permit>) -> Response {
    res.map(|inner| Body::new(PermitBody { inner, permits }))
}

/// Body wrapper owning the permits of the request that produced it.
struct PermitBody {
    inner: Body,
    /// Concurrency permit first, so it is released before the burst permit.
    permits: Vec<Permit>,
}

impl HttpBody for PermitBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let frame = ready!(Pin::new(&mut self.inner).poll_frame(cx));
        if !matches!(frame, Some(Ok(_))) {
            self.permits.clear();
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
