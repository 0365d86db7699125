//! Tower layer adapter for tonic servers.
//!
//! ```rust,ignore
//! Server::builder()
//!     .layer(GrpcGuardLayer::new(guard))
//!     .add_service(MyServiceServer::new(service))
//!     .serve(addr)
//!     .await?;
//! ```
//!
//! Rejected calls end with `PERMISSION_DENIED` and a generic message.

use super::{CallContext, RequestGuard};
use axum::http;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::Status;
use tower::{Layer, Service};

/// Tower layer guarding every gRPC call.
#[derive(Clone)]
pub struct GrpcGuardLayer {
    guard: Arc<RequestGuard>,
}

impl GrpcGuardLayer {
    pub fn new(guard: Arc<RequestGuard>) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for GrpcGuardLayer {
    type Service = GrpcGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcGuardService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

/// Service produced by [`GrpcGuardLayer`].
#[derive(Clone)]
pub struct GrpcGuardService<S> {
    inner: S,
    guard: Arc<RequestGuard>,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for GrpcGuardService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        let guard = self.guard.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            let decision = guard
                .check(CallContext::Rpc {
                    uri: &parts.uri,
                    metadata: &parts.headers,
                })
                .await;

            match decision {
                Ok(admission) => {
                    admission.attach(&mut parts.extensions);
                    inner.call(http::Request::from_parts(parts, body)).await
                }
                Err(_) => {
                    tracing::debug!(target: "guard.grpc", path = %parts.uri.path(), "Rejecting gRPC call");
                    Ok(permission_denied_response())
                }
            }
        })
    }
}

fn permission_denied_response() -> http::Response<BoxBody> {
    Status::permission_denied("Access denied").into_http()
}
