use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error_like::ErrorEnvelope;
use crate::locks::{read, write};

const EVENT_CAPACITY: usize = 64;

/// A registered function: positional JSON arguments in, JSON value out.
pub type ServiceFn = Arc<dyn Fn(Vec<Value>) -> Result<Value, ErrorEnvelope> + Send + Sync>;

/// Errors returned by [`ServiceRegistry::invoke`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    /// No function is registered under the name.
    #[error("service method '{0}' not found")]
    MethodNotFound(String),

    /// The function ran and failed.
    #[error("service method '{method}' failed: {error}")]
    Failed {
        method: String,
        error: ErrorEnvelope,
    },
}

impl ServiceError {
    /// The envelope sent to a remote caller for this failure.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            ServiceError::MethodNotFound(method) => ErrorEnvelope::method_not_found(method),
            ServiceError::Failed { error, .. } => error.clone(),
        }
    }
}

/// An object exposing a fixed list of methods.
///
/// Only the methods named by [`Service::methods`] are registered; nothing is
/// discovered implicitly.
pub trait Service: Send + Sync + 'static {
    /// Method names, in registration order.
    fn methods(&self) -> Vec<&'static str>;

    /// Run `method` with positional arguments.
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, ErrorEnvelope>;
}

type NameConverter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Options for [`ServiceRegistry::register_service`].
#[derive(Clone, Default)]
pub struct RegisterOptions {
    name_converter: Option<NameConverter>,
}

impl RegisterOptions {
    /// Rename every method before it is registered.
    pub fn with_name_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.name_converter = Some(Arc::new(converter));
        self
    }

    fn convert(&self, name: &str) -> String {
        match &self.name_converter {
            Some(convert) => convert(name),
            None => name.to_string(),
        }
    }
}

impl fmt::Debug for RegisterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterOptions")
            .field("name_converter", &self.name_converter.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Entries {
    order: Vec<String>,
    functions: HashMap<String, ServiceFn>,
}

impl Entries {
    fn insert(&mut self, name: String, function: ServiceFn) {
        if self.functions.insert(name.clone(), function).is_none() {
            self.order.push(name);
        }
    }
}

/// Dynamic name → function table.
///
/// Every mutating call publishes one event carrying a list of names; see
/// [`ServiceRegistry::subscribe`].
pub struct ServiceRegistry {
    entries: RwLock<Entries>,
    events: broadcast::Sender<Vec<String>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(Entries::default()),
            events,
        }
    }

    /// Register or replace one function.
    ///
    /// Publishes the full list of registered names. A replaced name keeps its
    /// original position.
    pub fn register<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, ErrorEnvelope> + Send + Sync + 'static,
    {
        let name = name.into();
        let names = {
            let mut entries = write(&self.entries);
            entries.insert(name.clone(), Arc::new(function));
            entries.order.clone()
        };
        debug!(method = %name, "registered service method");
        self.publish(names);
    }

    /// Register every method of `service`.
    ///
    /// Publishes only the names registered by this call, after conversion.
    pub fn register_service<S: Service>(&self, service: Arc<S>, options: RegisterOptions) {
        let methods = service.methods();
        let mut registered = Vec::with_capacity(methods.len());
        {
            let mut entries = write(&self.entries);
            for method in methods {
                let name = options.convert(method);
                let service = Arc::clone(&service);
                entries.insert(
                    name.clone(),
                    Arc::new(move |args: Vec<Value>| service.call(method, args)),
                );
                registered.push(name);
            }
        }
        debug!(methods = ?registered, "registered service");
        self.publish(registered);
    }

    /// Remove one function. Publishes the remaining names if it existed.
    pub fn unregister(&self, name: &str) -> bool {
        let names = {
            let mut entries = write(&self.entries);
            if entries.functions.remove(name).is_none() {
                return false;
            }
            entries.order.retain(|n| n != name);
            entries.order.clone()
        };
        self.publish(names);
        true
    }

    /// Call the function registered under exactly `name`.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value, ServiceError> {
        let function = read(&self.entries)
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::MethodNotFound(name.to_string()))?;
        function(args).map_err(|error| ServiceError::Failed {
            method: name.to_string(),
            error,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        read(&self.entries).functions.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        read(&self.entries).order.clone()
    }

    pub fn len(&self) -> usize {
        read(&self.entries).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive one event per mutating call from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<String>> {
        self.events.subscribe()
    }

    fn publish(&self, names: Vec<String>) {
        // No subscribers is fine.
        let _ = self.events.send(names);
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("names", &self.names())
            .finish()
    }
}
