use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, warn};
use wirerpc_packet::{
    decode_packet, encode_cancel, encode_error, encode_notification, encode_request,
    encode_response, BinaryReader, Codec, Packet, EXEC_ERROR, METHOD_NOT_FOUND, STATUS_OK,
};
use wirerpc_transport::{MessageChannel, MessageSink};

use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, Result};
use crate::error_like::{revive_error, ErrorEnvelope};
use crate::handler::{
    HandlerResult, NotificationFallback, NotificationHandler, RequestContext, RequestFallback,
    RequestHandler,
};
use crate::locks::{lock, read, write};
use crate::payload::Payload;
use crate::registry::ServiceRegistry;

type Responder = oneshot::Sender<Result<Payload>>;

struct Pending {
    method: String,
    responder: Responder,
}

#[derive(Clone)]
enum Route {
    Method(Arc<dyn RequestHandler>),
    Fallback(Arc<dyn RequestFallback>),
}

/// Outgoing ids abandoned by timeout or cancellation whose response may
/// still arrive, oldest first.
#[derive(Default)]
struct AbandonedIds {
    ids: HashSet<u32>,
    order: VecDeque<u32>,
}

impl AbandonedIds {
    /// Remember `id`, forgetting the oldest ids beyond `max`. Returns how
    /// many were forgotten.
    fn insert(&mut self, id: u32, max: usize) -> usize {
        if self.ids.insert(id) {
            self.order.push_back(id);
        }
        let mut forgotten = 0;
        while self.order.len() > max {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.ids.remove(&oldest);
            forgotten += 1;
        }
        forgotten
    }

    fn remove(&mut self, id: u32) -> bool {
        if !self.ids.remove(&id) {
            return false;
        }
        if let Some(position) = self.order.iter().position(|&other| other == id) {
            self.order.remove(position);
        }
        true
    }

    fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

/// One end of a multiplexed RPC channel.
///
/// Cloning is cheap; clones share the pending table and handler maps.
/// Nothing is received until [`Connection::listen`] starts the inbound loop.
/// The connection closes on [`Connection::close`], when the peer goes away,
/// or when the last clone is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
    _close_on_drop: Arc<DropGuard>,
}

struct Inner {
    /// Taken on shutdown so the peer sees the end of its inbound stream.
    sink: RwLock<Option<Arc<dyn MessageSink>>>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    config: ConnectionConfig,
    next_id: AtomicU32,
    closed: AtomicBool,
    closing: CancellationToken,
    pending: Mutex<HashMap<u32, Pending>>,
    abandoned: Mutex<AbandonedIds>,
    /// Inbound requests currently being served.
    serving: Mutex<HashMap<u32, CancellationToken>>,
    request_handlers: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    notification_handlers: RwLock<HashMap<String, Arc<dyn NotificationHandler>>>,
    request_fallback: RwLock<Option<Arc<dyn RequestFallback>>>,
    notification_fallback: RwLock<Option<Arc<dyn NotificationFallback>>>,
}

impl Connection {
    pub fn new(channel: MessageChannel) -> Self {
        Self::with_config(channel, ConnectionConfig::default())
    }

    pub fn with_config(channel: MessageChannel, config: ConnectionConfig) -> Self {
        let (sink, inbound) = channel.into_parts();
        let closing = CancellationToken::new();
        Self {
            _close_on_drop: Arc::new(closing.clone().drop_guard()),
            inner: Arc::new(Inner {
                sink: RwLock::new(Some(sink)),
                inbound: Mutex::new(Some(inbound)),
                config,
                next_id: AtomicU32::new(0),
                closed: AtomicBool::new(false),
                closing,
                pending: Mutex::new(HashMap::new()),
                abandoned: Mutex::new(AbandonedIds::default()),
                serving: Mutex::new(HashMap::new()),
                request_handlers: RwLock::new(HashMap::new()),
                notification_handlers: RwLock::new(HashMap::new()),
                request_fallback: RwLock::new(None),
                notification_fallback: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Start the inbound loop on the current tokio runtime.
    ///
    /// Frames are processed in arrival order. When the channel ends or the
    /// connection is closed, every outstanding request fails with
    /// [`ConnectionError::Disconnected`] and the task finishes.
    pub fn listen(&self) -> Result<JoinHandle<()>> {
        if self.is_closed() {
            return Err(ConnectionError::Disconnected);
        }
        let mut inbound = lock(&self.inner.inbound)
            .take()
            .ok_or(ConnectionError::AlreadyListening)?;
        let inner = Arc::clone(&self.inner);

        Ok(tokio::spawn(async move {
            let mut reader = BinaryReader::new();
            loop {
                let message = tokio::select! {
                    biased;
                    _ = inner.closing.cancelled() => break,
                    message = inbound.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };
                if let Err(e) = inner.handle_message(&mut reader, message) {
                    error!(error = %e, "failed to process inbound message");
                }
            }
            drop(inbound);
            inner.shutdown();
            debug!("connection closed");
        }))
    }

    /// Close this side of the connection.
    ///
    /// Stops the inbound loop, ends the peer's inbound stream and fails
    /// outstanding requests with [`ConnectionError::Disconnected`]. Closing
    /// twice is a no-op.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    /// True once the connection is closed or the inbound channel has ended.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Wait until the connection is closed from either side.
    pub async fn closed(&self) {
        self.inner.closing.cancelled().await
    }

    /// Send a request and wait for its response.
    pub async fn send_request(&self, method: &str, payload: Payload) -> Result<Payload> {
        self.call(method, payload, None).await
    }

    /// Send a request that the caller may cancel.
    ///
    /// When `cancel` fires first, a Cancel frame is sent, the call fails with
    /// [`ConnectionError::Canceled`] and any late response is dropped.
    pub async fn send_request_with_cancel(
        &self,
        method: &str,
        payload: Payload,
        cancel: CancellationToken,
    ) -> Result<Payload> {
        if cancel.is_cancelled() {
            return Err(ConnectionError::Canceled(method.to_string()));
        }
        self.call(method, payload, Some(cancel)).await
    }

    /// Send a one-way notification.
    pub fn send_notification(&self, method: &str, payload: Payload) -> Result<()> {
        let request_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut buf = BytesMut::new();
        encode_notification(
            request_id,
            payload.codec,
            method,
            &payload.content,
            &mut buf,
        )?;
        self.inner.send(buf.freeze())?;
        debug!(request_id, method, "notification sent");
        Ok(())
    }

    /// Serve `method` with `handler`. Returns true if a previous handler was
    /// replaced.
    pub fn on_request<H: RequestHandler>(&self, method: impl Into<String>, handler: H) -> bool {
        let method = method.into();
        let replaced = write(&self.inner.request_handlers)
            .insert(method.clone(), Arc::new(handler))
            .is_some();
        if replaced {
            debug!(method = %method, "replaced request handler");
        }
        replaced
    }

    /// Handle notifications for `method`. Returns true if a previous handler
    /// was replaced.
    ///
    /// Notification handlers run inline in the inbound loop. Their failures
    /// and panics are logged and never reach the sender.
    pub fn on_notification<H: NotificationHandler>(
        &self,
        method: impl Into<String>,
        handler: H,
    ) -> bool {
        let method = method.into();
        let replaced = write(&self.inner.notification_handlers)
            .insert(method.clone(), Arc::new(handler))
            .is_some();
        if replaced {
            debug!(method = %method, "replaced notification handler");
        }
        replaced
    }

    pub fn remove_request_handler(&self, method: &str) -> bool {
        write(&self.inner.request_handlers).remove(method).is_some()
    }

    pub fn remove_notification_handler(&self, method: &str) -> bool {
        write(&self.inner.notification_handlers)
            .remove(method)
            .is_some()
    }

    /// Serve requests whose method has no handler of its own.
    pub fn on_request_not_found<H: RequestFallback>(&self, handler: H) {
        *write(&self.inner.request_fallback) = Some(Arc::new(handler));
    }

    /// Handle notifications whose method has no handler of its own.
    pub fn on_notification_not_found<H: NotificationFallback>(&self, handler: H) {
        *write(&self.inner.notification_fallback) = Some(Arc::new(handler));
    }

    /// Serve every function in `registry` to the peer.
    ///
    /// Unhandled requests and notifications are looked up in the registry by
    /// method name, with the JSON argument array as positional arguments.
    /// Dedicated handlers registered with [`Connection::on_request`] still
    /// take precedence.
    pub fn serve_registry(&self, registry: Arc<ServiceRegistry>) {
        let requests = Arc::clone(&registry);
        self.on_request_not_found(
            move |method: String, payload: Payload, _ctx: RequestContext| {
                let registry = Arc::clone(&requests);
                async move {
                    let args = payload.json_args()?;
                    let value = registry.invoke(&method, args)?;
                    Ok::<_, ErrorEnvelope>(Payload::json(&value)?)
                }
            },
        );
        self.on_notification_not_found(move |method: &str, payload: Payload| {
            let args = payload.json_args()?;
            registry.invoke(method, args)?;
            Ok::<_, ErrorEnvelope>(())
        });
    }

    async fn call(
        &self,
        method: &str,
        payload: Payload,
        cancel: Option<CancellationToken>,
    ) -> Result<Payload> {
        let (responder, response) = oneshot::channel();
        let request_id = self.inner.add_pending(method, responder)?;
        // Dropping the caller's future abandons the request.
        let guard = PendingGuard {
            inner: &self.inner,
            request_id,
        };

        let mut buf = BytesMut::new();
        encode_request(
            request_id,
            payload.codec,
            method,
            &payload.content,
            &mut buf,
        )?;
        self.inner.send(buf.freeze())?;
        debug!(request_id, method, codec = payload.codec.name(), "request sent");

        let timeout = self.inner.config.request_timeout;
        let result = tokio::select! {
            biased;
            result = response => result.unwrap_or(Err(ConnectionError::Disconnected)),
            _ = canceled(cancel.as_ref()) => {
                self.inner.abandon(request_id);
                debug!(request_id, method, "request canceled");
                Err(ConnectionError::Canceled(method.to_string()))
            }
            after = expired(timeout) => {
                self.inner.abandon(request_id);
                warn!(request_id, method, ?after, "request timed out");
                Err(ConnectionError::Timeout {
                    method: method.to_string(),
                    after,
                })
            }
        };
        drop(guard);
        result
    }
}

async fn canceled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn expired(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(after) => {
            tokio::time::sleep(after).await;
            after
        }
        None => std::future::pending().await,
    }
}

struct PendingGuard<'a> {
    inner: &'a Inner,
    request_id: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.abandon(self.request_id);
    }
}

impl Inner {
    fn send(&self, message: Bytes) -> Result<()> {
        let sink = read(&self.sink)
            .clone()
            .ok_or(ConnectionError::Disconnected)?;
        sink.send(message)?;
        Ok(())
    }

    fn add_pending(&self, method: &str, responder: Responder) -> Result<u32> {
        let mut pending = lock(&self.pending);
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Disconnected);
        }
        let abandoned = lock(&self.abandoned);
        // The counter wraps; skip ids that could still see a response.
        let request_id = loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if !pending.contains_key(&id) && !abandoned.contains(id) {
                break id;
            }
        };
        pending.insert(
            request_id,
            Pending {
                method: method.to_string(),
                responder,
            },
        );
        Ok(request_id)
    }

    /// Drop a pending request and tell the peer to stop working on it.
    fn abandon(&self, request_id: u32) {
        if lock(&self.pending).remove(&request_id).is_none() {
            return;
        }
        let forgotten = lock(&self.abandoned).insert(request_id, self.config.max_abandoned);
        if forgotten > 0 {
            debug!(forgotten, "forgot oldest abandoned requests");
        }

        let mut buf = BytesMut::new();
        encode_cancel(request_id, &mut buf);
        if let Err(e) = self.send(buf.freeze()) {
            debug!(request_id, error = %e, "could not send cancel");
        }
    }

    fn handle_message(self: &Arc<Self>, reader: &mut BinaryReader, message: Bytes) -> Result<()> {
        reader.reset(message);
        match decode_packet(reader)? {
            Packet::Request {
                request_id,
                codec,
                method,
                content,
            } => self.dispatch_request(request_id, method, Payload::new(codec, content)),
            Packet::Notification {
                method,
                codec,
                content,
                ..
            } => self.dispatch_notification(&method, Payload::new(codec, content)),
            Packet::Response {
                request_id,
                codec,
                status,
                content,
            } => return self.resolve(request_id, codec, status, content),
            Packet::Cancel { request_id } => self.cancel_serving(request_id),
        }
        Ok(())
    }

    fn resolve(&self, request_id: u32, codec: Codec, status: u16, content: Bytes) -> Result<()> {
        let Some(pending) = lock(&self.pending).remove(&request_id) else {
            if lock(&self.abandoned).remove(request_id) {
                debug!(request_id, "dropping response for abandoned request");
                return Ok(());
            }
            return Err(ConnectionError::UnknownRequest(request_id));
        };

        let outcome = match status {
            STATUS_OK => Ok(Payload::new(codec, content)),
            METHOD_NOT_FOUND => Err(ConnectionError::MethodNotFound(pending.method)),
            _ => Err(ConnectionError::Remote(revive_error(&content))),
        };
        debug!(request_id, status, "response received");
        // The caller may have gone away in the meantime.
        let _ = pending.responder.send(outcome);
        Ok(())
    }

    fn dispatch_request(self: &Arc<Self>, request_id: u32, method: String, payload: Payload) {
        let route = read(&self.request_handlers)
            .get(&method)
            .cloned()
            .map(Route::Method)
            .or_else(|| read(&self.request_fallback).clone().map(Route::Fallback));

        let Some(route) = route else {
            debug!(request_id, method = %method, "no handler for request");
            self.respond(
                request_id,
                &method,
                Err(ErrorEnvelope::method_not_found(&method)),
            );
            return;
        };

        let token = CancellationToken::new();
        lock(&self.serving).insert(request_id, token.clone());
        let ctx = RequestContext::new(request_id, method.clone(), payload.codec, token);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let handler_method = method.clone();
            // Run the handler in its own task so a panic surfaces as a JoinError.
            let task = tokio::spawn(async move {
                match route {
                    Route::Method(handler) => handler.call(payload, ctx).await,
                    Route::Fallback(handler) => handler.call(handler_method, payload, ctx).await,
                }
            });
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(ErrorEnvelope::from_panic(&*e.into_panic())),
                Err(e) => Err(ErrorEnvelope::new("Error", e.to_string())),
            };
            lock(&inner.serving).remove(&request_id);
            inner.respond(request_id, &method, outcome);
        });
    }

    fn respond(&self, request_id: u32, method: &str, outcome: HandlerResult) {
        let mut buf = BytesMut::new();
        let encoded = match &outcome {
            Ok(payload) => encode_response(request_id, payload.codec, &payload.content, &mut buf),
            Err(envelope) => {
                let status = if envelope.is_method_not_found() {
                    METHOD_NOT_FOUND
                } else {
                    EXEC_ERROR
                };
                debug!(request_id, method, error = %envelope, "request failed");
                encode_error(request_id, status, &envelope.to_json(), &mut buf)
            }
        };

        if let Err(e) = encoded {
            warn!(request_id, method, error = %e, "could not encode response");
            buf.clear();
            let envelope = ErrorEnvelope::from(e);
            if encode_error(request_id, EXEC_ERROR, &envelope.to_json(), &mut buf).is_err() {
                return;
            }
        }

        if let Err(e) = self.send(buf.freeze()) {
            debug!(request_id, method, error = %e, "could not send response");
        }
    }

    fn dispatch_notification(&self, method: &str, payload: Payload) {
        let handler = read(&self.notification_handlers).get(method).cloned();
        let result = match handler {
            Some(handler) => catch_unwind(AssertUnwindSafe(|| handler.call(payload))),
            None => {
                let fallback = read(&self.notification_fallback).clone();
                match fallback {
                    Some(fallback) => catch_unwind(AssertUnwindSafe(|| fallback.call(method, payload))),
                    None => {
                        debug!(method, "no handler for notification");
                        return;
                    }
                }
            }
        };

        match result {
            Ok(Ok(())) => {}
            Ok(Err(envelope)) => {
                warn!(method, error = %envelope, "notification handler failed");
            }
            Err(panic) => {
                let envelope = ErrorEnvelope::from_panic(&*panic);
                warn!(method, error = %envelope, "notification handler panicked");
            }
        }
    }

    fn cancel_serving(&self, request_id: u32) {
        match lock(&self.serving).get(&request_id) {
            Some(token) => {
                debug!(request_id, "peer canceled request");
                token.cancel();
            }
            None => debug!(request_id, "cancel for request not being served"),
        }
    }

    /// Close both directions and release everything the connection holds.
    /// Safe to call more than once.
    fn shutdown(&self) {
        let drained: Vec<Pending> = {
            let mut pending = lock(&self.pending);
            self.closed.store(true, Ordering::Release);
            pending.drain().map(|(_, p)| p).collect()
        };
        self.closing.cancel();
        write(&self.sink).take();
        lock(&self.inbound).take();

        for pending in drained {
            debug!(method = %pending.method, "failing request on disconnect");
            let _ = pending.responder.send(Err(ConnectionError::Disconnected));
        }
        lock(&self.abandoned).clear();
        for (_, token) in lock(&self.serving).drain() {
            token.cancel();
        }

        // Handlers may hold clones of this connection; release them outside
        // the locks.
        let requests = std::mem::take(&mut *write(&self.request_handlers));
        let notifications = std::mem::take(&mut *write(&self.notification_handlers));
        let request_fallback = write(&self.request_fallback).take();
        let notification_fallback = write(&self.notification_fallback).take();
        drop((requests, notifications, request_fallback, notification_fallback));
    }
}
