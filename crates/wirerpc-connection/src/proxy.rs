use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wirerpc_fury::{FuryError, ProtocolMethod, ProtocolRepository};
use wirerpc_packet::Codec;

use crate::connection::Connection;
use crate::error::Result;
use crate::error_like::ErrorEnvelope;
use crate::handler::{BoxFuture, HandlerResult, RequestContext};
use crate::locks::{read, write};
use crate::payload::Payload;

/// Implementation of one served method: positional arguments in, one value out.
pub type MethodImpl = Arc<
    dyn Fn(Vec<Value>, RequestContext) -> BoxFuture<'static, std::result::Result<Value, ErrorEnvelope>>
        + Send
        + Sync,
>;

/// One entry of an [`RpcServiceMap`]: what the method looks like on the wire
/// and the code that serves it.
#[derive(Clone)]
pub struct RpcService {
    protocol: ProtocolMethod,
    implementation: MethodImpl,
}

impl RpcService {
    pub fn protocol(&self) -> &ProtocolMethod {
        &self.protocol
    }

    /// Decode the request in its own codec, run the implementation and encode
    /// the result in the same codec.
    async fn serve(&self, payload: Payload, ctx: RequestContext) -> HandlerResult {
        let codec = payload.codec;
        let args = match codec {
            Codec::Fury => self.protocol.decode_request(payload.content)?,
            Codec::Json | Codec::Raw => payload.json_args()?,
        };

        let value = (self.implementation)(args, ctx).await?;

        match (codec, value) {
            (Codec::Fury, value) => Ok(Payload::fury(self.protocol.encode_response(&value)?)),
            (Codec::Raw, Value::String(text)) => Ok(Payload::raw(text)),
            (_, value) => Ok(Payload::json(&value)?),
        }
    }
}

impl fmt::Debug for RpcService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcService")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

/// Declarative method table, keyed by method name.
///
/// The same map describes what a side serves (see [`FuryRpc::listen`]) and,
/// through [`RpcServiceMap::protocols`], what the other side can load to call it.
#[derive(Clone, Default, Debug)]
pub struct RpcServiceMap {
    services: BTreeMap<String, RpcService>,
}

impl RpcServiceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method, replacing and returning any previous entry of the same name.
    pub fn insert<F, Fut>(&mut self, protocol: ProtocolMethod, implementation: F) -> Option<RpcService>
    where
        F: Fn(Vec<Value>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ErrorEnvelope>> + Send + 'static,
    {
        let implementation: MethodImpl = Arc::new(
            move |args: Vec<Value>,
                  ctx: RequestContext|
                  -> BoxFuture<'static, std::result::Result<Value, ErrorEnvelope>> {
                Box::pin(implementation(args, ctx))
            },
        );
        self.services.insert(
            protocol.method.clone(),
            RpcService {
                protocol,
                implementation,
            },
        )
    }

    /// Builder form of [`RpcServiceMap::insert`].
    pub fn with<F, Fut>(mut self, protocol: ProtocolMethod, implementation: F) -> Self
    where
        F: Fn(Vec<Value>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ErrorEnvelope>> + Send + 'static,
    {
        self.insert(protocol, implementation);
        self
    }

    pub fn get(&self, method: &str) -> Option<&RpcService> {
        self.services.get(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RpcService)> {
        self.services.iter().map(|(name, service)| (name.as_str(), service))
    }

    /// Wire descriptors of every method, in name order.
    pub fn protocols(&self) -> impl Iterator<Item = &ProtocolMethod> {
        self.services.values().map(RpcService::protocol)
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Serves a local [`RpcServiceMap`] and calls the peer's methods, using the
/// Fury codec for every remote method whose descriptor has been loaded.
#[derive(Clone, Debug)]
pub struct FuryRpc {
    services: Arc<RpcServiceMap>,
    remote: Arc<RwLock<ProtocolRepository>>,
}

impl FuryRpc {
    pub fn new(services: RpcServiceMap) -> Self {
        Self {
            services: Arc::new(services),
            remote: Arc::new(RwLock::new(ProtocolRepository::new())),
        }
    }

    pub fn services(&self) -> &RpcServiceMap {
        &self.services
    }

    /// Register descriptors of the peer's methods. Returns how many were loaded.
    ///
    /// Calls to loaded methods switch to the Fury codec, including calls made
    /// through proxies created earlier.
    pub fn load_protocol(&self, methods: impl IntoIterator<Item = ProtocolMethod>) -> usize {
        let mut remote = write(&self.remote);
        let mut loaded = 0;
        for method in methods {
            debug!(method = %method.method, "loaded remote protocol");
            remote.register(method);
            loaded += 1;
        }
        debug!(loaded, total = remote.len(), "protocol loaded");
        loaded
    }

    /// Descriptor loaded for a remote method.
    pub fn remote_protocol(&self, method: &str) -> Option<ProtocolMethod> {
        read(&self.remote).get(method).cloned()
    }

    /// Register every local method on `connection`.
    ///
    /// Requests are answered in the codec they arrived in. Notifications run
    /// the same implementation one at a time, in arrival order, on a queue
    /// owned by the connection; failures are logged.
    pub fn listen(&self, connection: &Connection) {
        let (queue, mut queued) = mpsc::unbounded_channel::<QueuedNotification>();

        for (name, service) in self.services.iter() {
            let request_service = service.clone();
            connection.on_request(name, move |payload: Payload, ctx: RequestContext| {
                let service = request_service.clone();
                async move { service.serve(payload, ctx).await }
            });

            let notify_service = service.clone();
            let method = name.to_string();
            let queue = queue.clone();
            connection.on_notification(name, move |payload: Payload| {
                queue
                    .send(QueuedNotification {
                        service: notify_service.clone(),
                        method: method.clone(),
                        payload,
                    })
                    .map_err(|_| ErrorEnvelope::new("Error", "notification queue is closed"))
            });
        }
        drop(queue);

        // Ends once the connection releases its handlers.
        tokio::spawn(async move {
            while let Some(QueuedNotification {
                service,
                method,
                payload,
            }) = queued.recv().await
            {
                let ctx = RequestContext::new(0, method.clone(), payload.codec, Default::default());
                // A panic surfaces as a JoinError and the queue keeps going.
                match tokio::spawn(async move { service.serve(payload, ctx).await }).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(method = %method, error = %e, "notification failed"),
                    Err(e) => warn!(method = %method, error = %e, "notification panicked"),
                }
            }
        });
        debug!(methods = ?self.services.names(), "serving rpc services");
    }

    /// A caller for the peer's methods over `connection`.
    pub fn invoke_proxy(&self, connection: &Connection) -> RpcInvokeProxy {
        RpcInvokeProxy {
            connection: connection.clone(),
            remote: Arc::clone(&self.remote),
        }
    }
}

struct QueuedNotification {
    service: RpcService,
    method: String,
    payload: Payload,
}

/// Calls remote methods by name.
#[derive(Clone)]
pub struct RpcInvokeProxy {
    connection: Connection,
    remote: Arc<RwLock<ProtocolRepository>>,
}

impl RpcInvokeProxy {
    /// Call `method` with positional arguments.
    ///
    /// With a loaded descriptor the arguments and the result go through Fury;
    /// otherwise the arguments are sent as a JSON array.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let protocol = read(&self.remote).get(method).cloned();
        let payload = encode_args(protocol.as_ref(), &args)?;
        let response = self.connection.send_request(method, payload).await?;
        decode_result(method, protocol.as_ref(), response)
    }

    /// Send `method` as a notification.
    pub fn notify(&self, method: &str, args: Vec<Value>) -> Result<()> {
        let protocol = read(&self.remote).get(method).cloned();
        let payload = encode_args(protocol.as_ref(), &args)?;
        self.connection.send_notification(method, payload)
    }

    /// A callable bound to one method name.
    pub fn stub(&self, method: impl Into<String>) -> MethodStub {
        MethodStub {
            proxy: self.clone(),
            method: method.into(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl fmt::Debug for RpcInvokeProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcInvokeProxy")
            .field("remote", &read(&self.remote).names())
            .finish_non_exhaustive()
    }
}

/// One remote method, ready to call.
#[derive(Clone, Debug)]
pub struct MethodStub {
    proxy: RpcInvokeProxy,
    method: String,
}

impl MethodStub {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.proxy.call(&self.method, args).await
    }

    pub fn notify(&self, args: Vec<Value>) -> Result<()> {
        self.proxy.notify(&self.method, args)
    }
}

fn encode_args(protocol: Option<&ProtocolMethod>, args: &[Value]) -> Result<Payload> {
    match protocol {
        Some(protocol) => Ok(Payload::fury(protocol.encode_request(args)?)),
        None => Ok(Payload::json(args)?),
    }
}

fn decode_result(method: &str, protocol: Option<&ProtocolMethod>, response: Payload) -> Result<Value> {
    match (response.codec, protocol) {
        (Codec::Fury, Some(protocol)) => Ok(protocol.decode_response(response.content)?),
        (Codec::Fury, None) => Err(FuryError::InvalidData(format!(
            "fury response for '{method}' without a loaded protocol"
        ))
        .into()),
        (Codec::Json | Codec::Raw, _) => response.to_json(),
    }
}
