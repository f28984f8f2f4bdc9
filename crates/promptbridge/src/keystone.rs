//! The bridge facade.
//!
//! A [`Keystone`] owns the handler registry, the outgoing script scheduler
//! and the reserved namespace, and is the single entry point for both
//! directions of traffic.

use std::future::Future;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::dispatcher::InvocationDispatcher;
use crate::error::{log_error, CallingScriptError, NameResolvingError, Result};
use crate::evaluator::{Completion, EvaluateScript, ScriptEvaluator};
use crate::interface::{AsyncResponseSink, ExposedInterface};
use crate::invocation::{AsyncResponse, IncomingInvocation};
use crate::json::{JsonSerializer, JsonSerializing};
use crate::method::{MethodResolver, ResolveMethod};
use crate::predefined::{DismissalHandler, PredefinedInterface};

/// Receives every result of a host-initiated call.
pub type CallCompletion = Box<dyn FnMut(Result<Value>) + Send + 'static>;

/// Characters left as-is when a payload is embedded in a
/// `decodeURIComponent('...')` literal. The single quote is escaped too.
const PAYLOAD_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

pub struct Keystone {
    config: BridgeConfig,
    serializer: JsonSerializer,
    resolver: Arc<dyn ResolveMethod>,
    dispatcher: InvocationDispatcher,
    evaluator: ScriptEvaluator,
}

impl Keystone {
    /// Bridge with default settings.
    ///
    /// `evaluator` runs script text on the scripted side; `dismissal` is
    /// called when the scripted side asks to be closed. Must be called from
    /// within a Tokio runtime.
    pub fn new<E, D>(evaluator: E, dismissal: D) -> Self
    where
        E: EvaluateScript,
        D: Fn() + Send + Sync + 'static,
    {
        Self::with_config(BridgeConfig::default(), evaluator, dismissal)
    }

    pub fn with_config<E, D>(config: BridgeConfig, evaluator: E, dismissal: D) -> Self
    where
        E: EvaluateScript,
        D: Fn() + Send + Sync + 'static,
    {
        Self::with_resolver(config, Arc::new(MethodResolver), evaluator, dismissal)
    }

    pub fn with_resolver<E, D>(
        config: BridgeConfig,
        resolver: Arc<dyn ResolveMethod>,
        evaluator: E,
        dismissal: D,
    ) -> Self
    where
        E: EvaluateScript,
        D: Fn() + Send + Sync + 'static,
    {
        let evaluator = ScriptEvaluator::spawn(Arc::new(evaluator), config.evaluator_settings());
        let serializer = JsonSerializer;

        // Callback fragments join the same queue as calls, in publish order
        let async_response_sink: AsyncResponseSink = {
            let evaluator = evaluator.clone();
            Arc::new(move |response: AsyncResponse| deliver(&serializer, &evaluator, &response))
        };

        let dispatcher = InvocationDispatcher::new(async_response_sink);
        let dismissal: DismissalHandler = Arc::new(dismissal);
        let predefined = PredefinedInterface::new(
            evaluator.clone(),
            dismissal,
            resolver.clone(),
            dispatcher.downgrade(),
        );
        dispatcher.add_interface(Arc::new(predefined), config.reserved_namespace.clone());

        Self {
            config,
            serializer,
            resolver,
            dispatcher,
            evaluator,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn invocation_prefix(&self) -> &str {
        &self.config.invocation_prefix
    }

    /// Call a scripted-side function.
    ///
    /// The parameter is the argument list of the scripted function; `None`
    /// calls it without arguments. An encoding failure is reported through
    /// `completion` right away.
    pub fn call(
        &self,
        method_name: &str,
        parameter: Option<Value>,
        completion: Option<CallCompletion>,
    ) {
        let encoded = match self.encode_parameter(parameter) {
            Ok(encoded) => encoded,
            Err(e) => {
                log_error(&e);
                if let Some(mut completion) = completion {
                    completion(Err(e.into()));
                }
                return;
            }
        };

        let completion = completion.map(|mut completion| -> Completion {
            Box::new(move |data: Value| completion(Ok(data)))
        });
        self.evaluator.call(method_name, encoded, completion);
    }

    /// Like [`Keystone::call`], decoding every result into `T`.
    pub fn call_typed<T, F>(&self, method_name: &str, parameter: Option<Value>, mut completion: F)
    where
        T: DeserializeOwned,
        F: FnMut(Result<T>) + Send + 'static,
    {
        self.call(
            method_name,
            parameter,
            Some(Box::new(move |result: Result<Value>| {
                completion(result.and_then(|value| {
                    serde_json::from_value(value.clone())
                        .map_err(|_| CallingScriptError::ReturnTypeMismatch(value).into())
                }))
            })),
        );
    }

    /// Call a scripted-side function and wait for its first result.
    ///
    /// The call is enqueued before this returns. Resolves to
    /// [`CallingScriptError::BridgeClosed`] if the bridge shuts down first.
    pub fn call_async(
        &self,
        method_name: &str,
        parameter: Option<Value>,
    ) -> impl Future<Output = Result<Value>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        self.call(
            method_name,
            parameter,
            Some(Box::new(move |result: Result<Value>| {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(result);
                }
            })),
        );
        async move { rx.await.unwrap_or_else(|_| Err(CallingScriptError::BridgeClosed.into())) }
    }

    /// Ask the scripted side whether it registered `name`.
    ///
    /// Anything but a boolean answer counts as `false`.
    pub fn has_script_method<F>(&self, name: &str, completion: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let mut completion = Some(completion);
        self.call(
            &self.config.method_query_function,
            Some(json!([name])),
            Some(Box::new(move |result: Result<Value>| {
                let has = matches!(result, Ok(Value::Bool(true)));
                if let Some(completion) = completion.take() {
                    completion(has);
                }
            })),
        );
    }

    /// Expose `interface` under `namespace`, replacing any previous one.
    pub fn add_interface(
        &self,
        interface: Arc<dyn ExposedInterface>,
        namespace: impl Into<String>,
    ) {
        let namespace = namespace.into();
        if namespace == self.config.reserved_namespace {
            warn!(target: "bridge", "Replacing the reserved interface under {:?}", namespace);
        }
        self.dispatcher.add_interface(interface, namespace);
    }

    pub fn remove_interface(&self, namespace: &str) {
        self.dispatcher.remove_interface(namespace);
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.dispatcher.namespaces()
    }

    /// Enqueue raw script text for the scripted side.
    pub fn evaluate(&self, script: impl Into<String>) {
        self.evaluator.evaluate(script);
    }

    /// Answer a prompt raised by the scripted side.
    ///
    /// Returns the response envelope as JSON text, or `None` after logging
    /// if anything went wrong. Never panics on malformed input.
    pub fn handle_raw_invocation(
        &self,
        prompt: &str,
        default_text: Option<&str>,
    ) -> Option<String> {
        match self.try_handle_raw_invocation(prompt, default_text) {
            Ok(text) => Some(text),
            Err(e) => {
                log_error(&e);
                None
            }
        }
    }

    fn try_handle_raw_invocation(
        &self,
        prompt: &str,
        default_text: Option<&str>,
    ) -> Result<String> {
        let signature = self.serializer.decode_signature(default_text)?;
        let raw_name = prompt
            .strip_prefix(self.invocation_prefix())
            .ok_or_else(|| NameResolvingError::InvalidFormat(prompt.to_string()))?;
        let method = self.resolver.resolve(raw_name)?;
        debug!(target: "bridge", "Incoming call to {}", method);

        let response = self
            .dispatcher
            .dispatch(IncomingInvocation::new(method, signature));
        Ok(self.serializer.encode(&response.to_value())?)
    }

    /// Deliver an asynchronous result to its callback stub.
    pub fn deliver_async_response(&self, response: &AsyncResponse) {
        deliver(&self.serializer, &self.evaluator, response);
    }

    fn encode_parameter(
        &self,
        parameter: Option<Value>,
    ) -> std::result::Result<String, CallingScriptError> {
        match parameter {
            Some(parameter) => Ok(self.serializer.encode(&parameter)?),
            None => Ok("[]".to_string()),
        }
    }
}

/// Script invoking callback stub `function_name` with the JSON text
/// `encoded`, deleting the stub afterwards when `completed`.
pub fn callback_script(function_name: &str, encoded: &str, completed: bool) -> String {
    let payload = utf8_percent_encode(encoded, PAYLOAD_ESCAPES);
    let deleting = if completed {
        format!(" delete window.{};", function_name)
    } else {
        String::new()
    };
    format!(
        "try {{ {}(JSON.parse(decodeURIComponent('{}')));{} }} catch(e) {{}}",
        function_name, payload, deleting
    )
}

fn deliver(serializer: &JsonSerializer, evaluator: &ScriptEvaluator, response: &AsyncResponse) {
    match serializer.encode(&response.data) {
        Ok(encoded) => evaluator.evaluate(callback_script(
            &response.function_name,
            &encoded,
            response.completed,
        )),
        Err(e) => log_error(&e),
    }
}
