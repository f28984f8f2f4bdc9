//! Handler objects exposed to the scripted side.
//!
//! An [`ExposedInterface`] is registered under a namespace and answers for
//! every method in it. [`MethodTable`] builds one from plain closures.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, warn};

use crate::invocation::AsyncResponse;

/// Capability contract of a namespace's handler object.
pub trait ExposedInterface: Send + Sync {
    /// Whether `name` exists, optionally restricted to one calling convention.
    fn has_method(&self, name: &str, is_synchronous: Option<bool>) -> bool;

    /// Run `name` to completion and return its result.
    fn handle(&self, name: &str, parameter: Option<Value>) -> Option<Value>;

    /// Start `name`; results are delivered through `responder`, zero or more
    /// times, possibly from another thread.
    fn handle_async(&self, name: &str, parameter: Option<Value>, responder: Responder);
}

/// Receives the results of asynchronous calls, in the order handlers
/// publish them.
pub type AsyncResponseSink = Arc<dyn Fn(AsyncResponse) + Send + Sync + 'static>;

/// Delivers the results of one asynchronous call back to its callback stub.
#[derive(Clone)]
pub struct Responder {
    function_name: Option<String>,
    sink: AsyncResponseSink,
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("function_name", &self.function_name)
            .finish_non_exhaustive()
    }
}

impl Responder {
    pub(crate) fn new(function_name: Option<String>, sink: AsyncResponseSink) -> Self {
        Self {
            function_name,
            sink,
        }
    }

    /// Publish a result. `completed == false` announces that more results
    /// for the same stub will follow.
    pub fn respond(&self, data: Option<Value>, completed: bool) {
        let Some(function_name) = &self.function_name else {
            error!(target: "bridge", "Method marked non-synchronous has no callback");
            return;
        };
        (self.sink)(AsyncResponse::new(function_name.clone(), data, completed));
    }

    /// Publish the final result.
    pub fn complete(&self, data: Option<Value>) {
        self.respond(data, true);
    }

    /// Publish an intermediate result.
    pub fn progress(&self, data: Option<Value>) {
        self.respond(data, false);
    }
}

type SyncHandler = Box<dyn Fn(Option<Value>) -> Option<Value> + Send + Sync>;
type AsyncHandler = Box<dyn Fn(Option<Value>, Responder) + Send + Sync>;

enum Entry {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

/// Name → handler table built by explicit registration.
///
/// A synchronous entry called with a callback stub completes once with its
/// return value. An asynchronous entry called without one returns nothing.
pub struct MethodTable {
    entries: HashMap<String, Entry>,
}

impl MethodTable {
    pub fn builder() -> MethodTableBuilder {
        MethodTableBuilder::default()
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ExposedInterface for MethodTable {
    fn has_method(&self, name: &str, is_synchronous: Option<bool>) -> bool {
        match (self.entries.get(name), is_synchronous) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(Entry::Sync(_)), Some(wanted)) => wanted,
            (Some(Entry::Async(_)), Some(wanted)) => !wanted,
        }
    }

    fn handle(&self, name: &str, parameter: Option<Value>) -> Option<Value> {
        match self.entries.get(name)? {
            Entry::Sync(handler) => handler(parameter),
            Entry::Async(_) => {
                warn!(target: "bridge", "Asynchronous method {} called without a callback", name);
                None
            }
        }
    }

    fn handle_async(&self, name: &str, parameter: Option<Value>, responder: Responder) {
        match self.entries.get(name) {
            Some(Entry::Async(handler)) => handler(parameter, responder),
            Some(Entry::Sync(handler)) => responder.complete(handler(parameter)),
            None => {}
        }
    }
}

#[derive(Default)]
pub struct MethodTableBuilder {
    entries: HashMap<String, Entry>,
}

impl MethodTableBuilder {
    /// Register a method that returns its result directly.
    pub fn sync<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Entry::Sync(Box::new(handler)));
        self
    }

    /// Register a synchronous method without a return value.
    pub fn sync_unit<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        self.sync(name, move |parameter| {
            handler(parameter);
            None
        })
    }

    /// Register a method that reports through a [`Responder`].
    pub fn asynchronous<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>, Responder) + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Entry::Async(Box::new(handler)));
        self
    }

    pub fn build(self) -> MethodTable {
        MethodTable {
            entries: self.entries,
        }
    }
}
