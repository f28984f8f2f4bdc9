//! The reserved namespace the scripted shim uses to talk to the bridge itself.
//!
//! Method names and argument shapes here are fixed by the shim:
//! `returnValue({id, data, complete})`, `dsinit()`,
//! `hasNativeMethod({name, type})` and `closePage()`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::dispatcher::WeakDispatcher;
use crate::evaluator::ScriptEvaluator;
use crate::interface::{ExposedInterface, Responder};
use crate::invocation::Callback;
use crate::method::{MethodQuery, ResolveMethod};

pub const RETURN_VALUE: &str = "returnValue";
pub const INITIALIZE: &str = "dsinit";
pub const HAS_NATIVE_METHOD: &str = "hasNativeMethod";
pub const CLOSE_PAGE: &str = "closePage";

const METHODS: [&str; 4] = [RETURN_VALUE, INITIALIZE, HAS_NATIVE_METHOD, CLOSE_PAGE];

/// Called when the scripted surface asks to be closed.
pub type DismissalHandler = Arc<dyn Fn() + Send + Sync + 'static>;

/// A call into the reserved namespace, once its arguments are understood.
#[derive(Debug, Clone, PartialEq)]
pub enum PredefinedInvocation {
    HasMethod(MethodQuery),
    Close,
    HandleResponseFromScript(Callback),
    Initialize,
}

impl PredefinedInvocation {
    /// Interpret a reserved-namespace call. Malformed arguments are logged
    /// and yield `None`.
    pub fn parse(name: &str, parameter: Option<Value>) -> Option<Self> {
        match name {
            RETURN_VALUE => {
                let callback = parameter
                    .and_then(|info| serde_json::from_value::<Callback>(info).ok());
                if callback.is_none() {
                    error!(target: "bridge", "_dsb.returnValue called with wrong parameters.");
                }
                callback.map(Self::HandleResponseFromScript)
            }
            INITIALIZE => Some(Self::Initialize),
            HAS_NATIVE_METHOD => {
                let query = parameter.as_ref().and_then(|info| {
                    let raw_name = info.get("name")?.as_str()?;
                    let raw_kind = info.get("type")?.as_str()?;
                    Some(MethodQuery::new(raw_name, raw_kind))
                });
                if query.is_none() {
                    error!(target: "bridge", "hasNativeMethod called with wrong parameters.");
                }
                query.map(Self::HasMethod)
            }
            CLOSE_PAGE => Some(Self::Close),
            _ => None,
        }
    }
}

pub(crate) struct PredefinedInterface {
    evaluator: ScriptEvaluator,
    dismissal: DismissalHandler,
    resolver: Arc<dyn ResolveMethod>,
    dispatcher: WeakDispatcher,
}

impl PredefinedInterface {
    pub(crate) fn new(
        evaluator: ScriptEvaluator,
        dismissal: DismissalHandler,
        resolver: Arc<dyn ResolveMethod>,
        dispatcher: WeakDispatcher,
    ) -> Self {
        Self {
            evaluator,
            dismissal,
            resolver,
            dispatcher,
        }
    }

    fn perform(&self, invocation: PredefinedInvocation) -> Option<Value> {
        match invocation {
            PredefinedInvocation::HandleResponseFromScript(callback) => {
                self.evaluator.handle_response(callback);
                None
            }
            PredefinedInvocation::Initialize => {
                self.evaluator.initialize();
                None
            }
            PredefinedInvocation::Close => {
                (self.dismissal)();
                None
            }
            PredefinedInvocation::HasMethod(query) => {
                Some(Value::Bool(self.has_method_for(&query)))
            }
        }
    }

    fn has_method_for(&self, query: &MethodQuery) -> bool {
        match self.resolver.resolve(&query.raw_name) {
            Ok(method) => self.dispatcher.has_method(&method, query.kind.is_synchronous()),
            Err(e) => {
                debug!(target: "bridge", "Failed to resolve method from text: {:?}: {}", query, e);
                false
            }
        }
    }
}

impl ExposedInterface for PredefinedInterface {
    fn has_method(&self, name: &str, is_synchronous: Option<bool>) -> bool {
        METHODS.contains(&name) && is_synchronous != Some(false)
    }

    fn handle(&self, name: &str, parameter: Option<Value>) -> Option<Value> {
        match PredefinedInvocation::parse(name, parameter) {
            Some(invocation) => self.perform(invocation),
            // hasNativeMethod answers false rather than nothing
            None if name == HAS_NATIVE_METHOD => Some(Value::Bool(false)),
            None => None,
        }
    }

    fn handle_async(&self, name: &str, parameter: Option<Value>, responder: Responder) {
        responder.complete(self.handle(name, parameter));
    }
}
