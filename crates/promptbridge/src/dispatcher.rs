use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use crate::error::{log_error, NameResolvingError};
use crate::interface::{AsyncResponseSink, ExposedInterface, Responder};
use crate::invocation::{IncomingInvocation, Response};
use crate::method::Method;

type InterfaceMap = HashMap<String, Arc<dyn ExposedInterface>>;

/// Routes incoming invocations to the interface registered for their namespace.
///
/// Cloning yields another handle onto the same registry.
#[derive(Clone)]
pub struct InvocationDispatcher {
    interfaces: Arc<RwLock<InterfaceMap>>,
    async_response_sink: AsyncResponseSink,
}

impl InvocationDispatcher {
    /// Results of asynchronous calls are handed to `async_response_sink` on
    /// the thread that publishes them.
    pub fn new(async_response_sink: AsyncResponseSink) -> Self {
        Self {
            interfaces: Arc::new(RwLock::new(HashMap::new())),
            async_response_sink,
        }
    }

    /// Register `interface` under `namespace`, replacing any previous one.
    pub fn add_interface(
        &self,
        interface: Arc<dyn ExposedInterface>,
        namespace: impl Into<String>,
    ) {
        let namespace = namespace.into();
        debug!(target: "bridge", "Adding interface for namespace {:?}", namespace);
        self.write_interfaces().insert(namespace, interface);
    }

    pub fn remove_interface(&self, namespace: &str) {
        debug!(target: "bridge", "Removing interface for namespace {:?}", namespace);
        self.write_interfaces().remove(namespace);
    }

    /// Whether `method` would be routed, optionally for one calling convention.
    pub fn has_method(&self, method: &Method, is_synchronous: Option<bool>) -> bool {
        self.route(method, is_synchronous).is_some()
    }

    /// Route and run an invocation.
    ///
    /// Synchronous calls return their result. Asynchronous calls return the
    /// empty response at once; their results are published later.
    pub fn dispatch(&self, invocation: IncomingInvocation) -> Response {
        let IncomingInvocation { method, signature } = invocation;
        let Some(interface) = self.route(&method, None) else {
            return Response::empty();
        };

        if signature.indicates_synchronous_call() {
            let data = interface.handle(&method.name, signature.parameter);
            Response::success(data)
        } else {
            let responder = Responder::new(
                signature.callback_function_name,
                self.async_response_sink.clone(),
            );
            interface.handle_async(&method.name, signature.parameter, responder);
            Response::empty()
        }
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.read_interfaces().keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    /// A handle that does not keep the registry alive.
    pub(crate) fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            interfaces: Arc::downgrade(&self.interfaces),
        }
    }

    // The interface is cloned out so the lock is released before any handler
    // runs; handlers may re-enter the registry.
    fn route(
        &self,
        method: &Method,
        is_synchronous: Option<bool>,
    ) -> Option<Arc<dyn ExposedInterface>> {
        let interface = self.read_interfaces().get(&method.namespace).cloned();
        route_in(interface, method, is_synchronous)
    }

    fn read_interfaces(&self) -> std::sync::RwLockReadGuard<'_, InterfaceMap> {
        self.interfaces.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_interfaces(&self) -> std::sync::RwLockWriteGuard<'_, InterfaceMap> {
        self.interfaces.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Non-owning view of a dispatcher's registry, held by interfaces that are
/// themselves registered in it.
#[derive(Clone)]
pub(crate) struct WeakDispatcher {
    interfaces: Weak<RwLock<InterfaceMap>>,
}

impl WeakDispatcher {
    pub(crate) fn has_method(&self, method: &Method, is_synchronous: Option<bool>) -> bool {
        let Some(interfaces) = self.interfaces.upgrade() else {
            return false;
        };
        let interface = interfaces
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&method.namespace)
            .cloned();
        route_in(interface, method, is_synchronous).is_some()
    }
}

fn route_in(
    interface: Option<Arc<dyn ExposedInterface>>,
    method: &Method,
    is_synchronous: Option<bool>,
) -> Option<Arc<dyn ExposedInterface>> {
    let Some(interface) = interface else {
        log_error(&NameResolvingError::NamespaceNotFound(method.namespace.clone()));
        return None;
    };
    if !interface.has_method(&method.name, is_synchronous) {
        log_error(&NameResolvingError::MethodNotFound(method.to_string()));
        return None;
    }
    Some(interface)
}
