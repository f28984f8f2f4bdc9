//! Outgoing script evaluation.
//!
//! All scheduler state lives in one task. [`ScriptEvaluator`] handles only
//! send commands to it, so correlation IDs are issued and fragments are
//! flushed in the order the commands arrive, whichever thread sent them.
//!
//! Fragments enqueued before [`ScriptEvaluator::initialize`] are held back.
//! Afterwards they are coalesced: the first fragment arms a [`Debounce`]
//! timer and everything enqueued until it fires goes to the host in a single
//! evaluation, joined by newlines.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::error::{log_error, WritingError};
use crate::invocation::Callback;
use crate::timer::Debounce;

/// Default batching window.
pub const DEFAULT_DEBOUNCE_INTERVAL: Duration = Duration::from_millis(50);

/// Default scripted-side function receiving host-initiated calls.
pub const DEFAULT_ENTRY_POINT: &str = "window._handleMessageFromNative";

/// The host's ability to run script text in the scripted environment.
pub trait EvaluateScript: Send + Sync + 'static {
    fn evaluate_script(&self, script: &str);
}

impl<F> EvaluateScript for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn evaluate_script(&self, script: &str) {
        self(script)
    }
}

/// Receives every response the scripted side posts for one call.
///
/// Absent or `null` data arrives as an empty string.
pub type Completion = Box<dyn FnMut(Value) + Send + 'static>;

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub debounce_interval: Duration,
    pub entry_point: String,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            debounce_interval: DEFAULT_DEBOUNCE_INTERVAL,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }
}

enum Command {
    Evaluate(String),
    Call {
        function_name: String,
        parameter: String,
        completion: Option<Completion>,
    },
    HandleResponse(Callback),
    Initialize,
    PendingCount(oneshot::Sender<usize>),
}

/// Handle onto the scheduler task. Cheap to clone; the task stops once every
/// handle is dropped.
#[derive(Clone)]
pub struct ScriptEvaluator {
    tx: mpsc::UnboundedSender<Command>,
}

impl ScriptEvaluator {
    /// Start the scheduler task. Must be called from within a Tokio runtime.
    pub fn spawn(evaluator: Arc<dyn EvaluateScript>, settings: EvaluatorSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = SchedulerState::new(evaluator, settings);
        tokio::spawn(state.run(rx));
        Self { tx }
    }

    /// Enqueue a script fragment.
    pub fn evaluate(&self, script: impl Into<String>) {
        self.send(Command::Evaluate(script.into()));
    }

    /// Call a scripted-side function with an already encoded parameter.
    ///
    /// `completion` runs on the scheduler task for every response carrying
    /// the call's ID, until one is marked completed.
    pub fn call(
        &self,
        function_name: impl Into<String>,
        parameter: impl Into<String>,
        completion: Option<Completion>,
    ) {
        self.send(Command::Call {
            function_name: function_name.into(),
            parameter: parameter.into(),
            completion,
        });
    }

    pub fn handle_response(&self, callback: Callback) {
        self.send(Command::HandleResponse(callback));
    }

    /// Mark the scripted side ready and flush what was held back.
    pub fn initialize(&self) {
        self.send(Command::Initialize);
    }

    /// Number of calls still waiting for a completed response.
    pub async fn pending_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        self.send(Command::PendingCount(tx));
        rx.await.unwrap_or(0)
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!(target: "bridge", "Script evaluator has shut down, command dropped");
        }
    }
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    method: &'a str,
    #[serde(rename = "callbackId")]
    callback_id: u64,
    data: &'a str,
}

struct SchedulerState {
    evaluator: Arc<dyn EvaluateScript>,
    entry_point: String,
    next_id: u64,
    pending: HashMap<u64, Completion>,
    buffer: Vec<String>,
    initialized: bool,
    timer: Debounce,
}

impl SchedulerState {
    fn new(evaluator: Arc<dyn EvaluateScript>, settings: EvaluatorSettings) -> Self {
        Self {
            evaluator,
            entry_point: settings.entry_point,
            next_id: 0,
            pending: HashMap::new(),
            buffer: Vec::new(),
            initialized: false,
            timer: Debounce::new(settings.debounce_interval),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.timer.deadline();
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.timer.tick(Instant::now()) {
                        self.flush();
                    }
                }
            }
        }
        if !self.pending.is_empty() {
            debug!(
                target: "bridge",
                "Script evaluator stopped with {} call(s) still pending",
                self.pending.len()
            );
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Evaluate(script) => self.enqueue(script),
            Command::Call {
                function_name,
                parameter,
                completion,
            } => self.call(&function_name, &parameter, completion),
            Command::HandleResponse(callback) => self.handle_response(callback),
            Command::Initialize => {
                debug!(target: "bridge", "Scripted side initialized");
                self.initialized = true;
                self.timer.cancel();
                self.flush();
            }
            Command::PendingCount(reply) => {
                let _ = reply.send(self.pending.len());
            }
        }
    }

    fn call(&mut self, function_name: &str, parameter: &str, completion: Option<Completion>) {
        let id = self.next_id;
        self.next_id += 1;

        let message = OutgoingMessage {
            method: function_name,
            callback_id: id,
            data: parameter,
        };
        let message = match serde_json::to_string(&message) {
            Ok(message) => message,
            Err(e) => {
                log_error(&WritingError::UnderlyingCodec(e));
                return;
            }
        };

        if let Some(completion) = completion {
            self.pending.insert(id, completion);
        }
        self.enqueue(format!("{}({})", self.entry_point, message));
    }

    fn handle_response(&mut self, callback: Callback) {
        let Callback {
            id,
            data,
            completed,
        } = callback;
        if completed {
            if let Some(mut completion) = self.pending.remove(&id) {
                completion(data);
            }
        } else if let Some(completion) = self.pending.get_mut(&id) {
            completion(data);
        } else {
            trace!(target: "bridge", "No pending call with id {}", id);
        }
    }

    fn enqueue(&mut self, script: String) {
        self.buffer.push(script);
        if self.initialized {
            self.timer.arm(Instant::now());
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let script = self.buffer.join("\n");
        trace!(target: "bridge", "Flushing {} script fragment(s)", self.buffer.len());
        self.buffer.clear();
        self.evaluator.evaluate_script(&script);
    }
}
