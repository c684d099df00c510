use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use wirerpc_packet::Codec;

use crate::error_like::ErrorEnvelope;
use crate::payload::Payload;

/// Boxed future returned by request handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a request handler.
pub type HandlerResult = std::result::Result<Payload, ErrorEnvelope>;

/// Serves one request method.
///
/// Implemented for any `Fn(Payload, RequestContext) -> impl Future<Output =
/// HandlerResult>`.
pub trait RequestHandler: Send + Sync + 'static {
    fn call(&self, payload: Payload, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Payload, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, payload: Payload, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(payload, ctx))
    }
}

/// Handles one notification method, inline and in arrival order.
pub trait NotificationHandler: Send + Sync + 'static {
    fn call(&self, payload: Payload) -> std::result::Result<(), ErrorEnvelope>;
}

impl<F> NotificationHandler for F
where
    F: Fn(Payload) -> std::result::Result<(), ErrorEnvelope> + Send + Sync + 'static,
{
    fn call(&self, payload: Payload) -> std::result::Result<(), ErrorEnvelope> {
        self(payload)
    }
}

/// Serves requests for methods with no dedicated handler.
pub trait RequestFallback: Send + Sync + 'static {
    fn call(
        &self,
        method: String,
        payload: Payload,
        ctx: RequestContext,
    ) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> RequestFallback for F
where
    F: Fn(String, Payload, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(
        &self,
        method: String,
        payload: Payload,
        ctx: RequestContext,
    ) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(method, payload, ctx))
    }
}

/// Handles notifications for methods with no dedicated handler.
pub trait NotificationFallback: Send + Sync + 'static {
    fn call(&self, method: &str, payload: Payload) -> std::result::Result<(), ErrorEnvelope>;
}

impl<F> NotificationFallback for F
where
    F: Fn(&str, Payload) -> std::result::Result<(), ErrorEnvelope> + Send + Sync + 'static,
{
    fn call(&self, method: &str, payload: Payload) -> std::result::Result<(), ErrorEnvelope> {
        self(method, payload)
    }
}

/// What a request handler knows about the request it serves.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: u32,
    method: String,
    codec: Codec,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(
        request_id: u32,
        method: impl Into<String>,
        codec: Codec,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            request_id,
            method: method.into(),
            codec,
            cancellation,
        }
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Codec the request arrived in.
    #[inline]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// True once the caller has canceled the request or the connection closed.
    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the request is canceled.
    pub async fn canceled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}
