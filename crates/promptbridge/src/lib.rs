//! Two-way call bridge between a host and a scripted environment
//!
//! The scripted side calls the host by raising prompts; the host calls the
//! scripted side by evaluating batched script text. Embedders construct a
//! [`Keystone`], register handler objects under namespaces, and route prompt
//! callbacks through a [`PromptInterceptor`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod interface;
pub mod invocation;
pub mod json;
pub mod keystone;
pub mod method;
pub mod predefined;
pub mod prompt;
pub mod timer;

// Re-export commonly used types for embedders
pub use config::{BridgeConfig, ConfigLoadError};
pub use dispatcher::InvocationDispatcher;
pub use error::{
    BridgeError, CallingScriptError, LoggableError, NameResolvingError, ReadingError, Result,
    WritingError,
};
pub use evaluator::{Completion, EvaluateScript, EvaluatorSettings, ScriptEvaluator};
pub use interface::{
    AsyncResponseSink, ExposedInterface, MethodTable, MethodTableBuilder, Responder,
};
pub use invocation::{
    AsyncResponse, Callback, IncomingInvocation, Response, ResponseCode, Signature,
};
pub use json::{JsonSerializer, JsonSerializing};
pub use keystone::{CallCompletion, Keystone};
pub use method::{
    Method, MethodKind, MethodQuery, MethodResolver, ResolveMethod, SegmentMethodResolver,
};
pub use predefined::PredefinedInvocation;
pub use prompt::{PromptDelegate, PromptInterceptor};
pub use timer::Debounce;
