// Integration tests driving the bridge through raw prompts, the way the
// scripted shim does.

use promptbridge::{
    BridgeConfig, BridgeError, CallingScriptError, Keystone, MethodTable, Response,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

const ENTRY_POINT: &str = "window._handleMessageFromNative(";

/// Stands in for the host component and the scripted shim.
struct Harness {
    keystone: Keystone,
    evaluations: Arc<Mutex<Vec<String>>>,
    dismissals: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    fn with_config(config: BridgeConfig) -> Self {
        let evaluations = Arc::new(Mutex::new(Vec::new()));
        let dismissals = Arc::new(AtomicUsize::new(0));
        let keystone = {
            let evaluations = evaluations.clone();
            let dismissals = dismissals.clone();
            Keystone::with_config(
                config,
                move |script: &str| evaluations.lock().unwrap().push(script.to_string()),
                move || {
                    dismissals.fetch_add(1, Ordering::SeqCst);
                },
            )
        };
        Self {
            keystone,
            evaluations,
            dismissals,
        }
    }

    /// Synchronous call from the scripted side.
    fn prompt(&self, method: &str, data: Value) -> Value {
        let default_text = json!({ "data": data }).to_string();
        self.raw_prompt(method, Some(&default_text))
    }

    /// Asynchronous call from the scripted side, answered through `stub`.
    fn prompt_async(&self, method: &str, data: Value, stub: &str) -> Value {
        let default_text = json!({ "data": data, "_dscbstub": stub }).to_string();
        self.raw_prompt(method, Some(&default_text))
    }

    fn raw_prompt(&self, method: &str, default_text: Option<&str>) -> Value {
        let prompt = format!("{}{}", self.keystone.invocation_prefix(), method);
        let answer = self
            .keystone
            .handle_raw_invocation(&prompt, default_text)
            .unwrap_or_else(|| Response::EMPTY_JSON.to_string());
        serde_json::from_str(&answer).unwrap()
    }

    fn initialize(&self) {
        self.prompt("_dsb.dsinit", Value::Null);
    }

    fn return_value(&self, id: u64, data: Value, complete: bool) {
        self.prompt(
            "_dsb.returnValue",
            json!({ "id": id, "data": data, "complete": complete }),
        );
    }

    fn evaluations(&self) -> Vec<String> {
        self.evaluations.lock().unwrap().clone()
    }

    /// Messages addressed to the scripted dispatch entry point, in order.
    fn outgoing_calls(&self) -> Vec<Value> {
        self.evaluations()
            .iter()
            .flat_map(|batch| batch.lines().map(str::to_string).collect::<Vec<_>>())
            .filter_map(|line| {
                let message = line.strip_prefix(ENTRY_POINT)?.strip_suffix(')')?;
                Some(serde_json::from_str(message).unwrap())
            })
            .collect()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

fn arithmetic() -> Arc<MethodTable> {
    Arc::new(
        MethodTable::builder()
            .sync("double", |p| {
                p.and_then(|v| v.as_i64())
                    .and_then(|n| n.checked_mul(2))
                    .map(|n| json!(n))
            })
            .asynchronous("countdown", |p, responder| {
                let from = p.and_then(|v| v.as_u64()).unwrap_or(0);
                for n in (1..=from).rev() {
                    responder.progress(Some(json!(n)));
                }
                responder.complete(Some(json!(0)));
            })
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_synchronous_call_round_trip() {
    let harness = Harness::new();
    harness.keystone.add_interface(arithmetic(), "");
    assert_eq!(harness.prompt("double", json!(21)), json!({"code": 0, "data": 42}));

    harness.keystone.add_interface(arithmetic(), "math");
    assert_eq!(harness.prompt("math.double", json!(4)), json!({"code": 0, "data": 8}));
}

#[tokio::test(start_paused = true)]
async fn test_unroutable_calls_answer_empty() {
    let harness = Harness::new();
    harness.keystone.add_interface(arithmetic(), "math");
    let empty = json!({"code": -1, "data": ""});
    assert_eq!(harness.prompt("math.triple", json!(1)), empty);
    assert_eq!(harness.prompt("physics.double", json!(1)), empty);
    assert_eq!(harness.prompt("a.b.c", json!(1)), empty);
    assert_eq!(harness.raw_prompt("math.double", Some("[1, 2]")), empty);
    assert_eq!(harness.raw_prompt("math.double", Some("{data:")), empty);
    assert_eq!(
        harness
            .keystone
            .handle_raw_invocation("no prefix", None),
        None
    );
}

#[tokio::test(start_paused = true)]
async fn test_async_results_wait_for_initialization() {
    let harness = Harness::new();
    harness.keystone.add_interface(arithmetic(), "");

    let answer = harness.prompt_async("countdown", json!(2), "dscb0");
    assert_eq!(answer, json!({"code": -1, "data": ""}));
    settle().await;
    assert!(harness.evaluations().is_empty());

    harness.initialize();
    settle().await;
    let evaluations = harness.evaluations();
    assert_eq!(evaluations.len(), 1);
    let lines: Vec<&str> = evaluations[0].lines().collect();
    assert_eq!(
        lines,
        vec![
            "try { dscb0(JSON.parse(decodeURIComponent('2'))); } catch(e) {}",
            "try { dscb0(JSON.parse(decodeURIComponent('1'))); } catch(e) {}",
            "try { dscb0(JSON.parse(decodeURIComponent('0'))); delete window.dscb0; } catch(e) {}",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_sync_method_called_with_callback_completes_once() {
    let harness = Harness::new();
    harness.initialize();
    harness.keystone.add_interface(arithmetic(), "");
    harness.prompt_async("double", json!(5), "dscb3");
    settle().await;
    assert_eq!(
        harness.evaluations(),
        vec![concat!(
            "try { dscb3(JSON.parse(decodeURIComponent('10'))); ",
            "delete window.dscb3; } catch(e) {}"
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn test_async_results_precede_later_calls() {
    let harness = Harness::new();
    harness.initialize();
    harness.keystone.add_interface(arithmetic(), "");

    harness.prompt_async("countdown", json!(1), "dscb4");
    harness.keystone.call("later", None, None);
    settle().await;

    let evaluations = harness.evaluations();
    assert_eq!(evaluations.len(), 1);
    let lines: Vec<&str> = evaluations[0].lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "try { dscb4(JSON.parse(decodeURIComponent('1'))); } catch(e) {}"
    );
    assert_eq!(
        lines[1],
        "try { dscb4(JSON.parse(decodeURIComponent('0'))); delete window.dscb4; } catch(e) {}"
    );
    assert!(lines[2].starts_with(ENTRY_POINT), "{}", lines[2]);
    assert_eq!(harness.outgoing_calls()[0]["method"], json!("later"));
}

#[tokio::test(start_paused = true)]
async fn test_doubling_past_integer_range_answers_empty() {
    let harness = Harness::new();
    harness.keystone.add_interface(arithmetic(), "");
    assert_eq!(
        harness.prompt("double", json!(i64::MAX)),
        json!({"code": 0, "data": ""})
    );
    assert_eq!(
        harness.prompt("double", json!(i64::MAX / 2)),
        json!({"code": 0, "data": i64::MAX / 2 * 2})
    );
}

#[tokio::test(start_paused = true)]
async fn test_host_calls_are_batched_and_correlated() {
    let harness = Harness::new();
    let results = Arc::new(Mutex::new(Vec::new()));
    for (n, name) in ["first", "second", "ns.third"].into_iter().enumerate() {
        let results = results.clone();
        harness.keystone.call(
            name,
            Some(json!([n])),
            Some(Box::new(move |result: promptbridge::Result<Value>| {
                results.lock().unwrap().push((n, result.unwrap()));
            })),
        );
    }
    settle().await;
    assert!(harness.evaluations().is_empty());

    harness.initialize();
    settle().await;
    assert_eq!(harness.evaluations().len(), 1);
    assert_eq!(
        harness.outgoing_calls(),
        vec![
            json!({"method": "first", "callbackId": 0, "data": "[0]"}),
            json!({"method": "second", "callbackId": 1, "data": "[1]"}),
            json!({"method": "ns.third", "callbackId": 2, "data": "[2]"}),
        ]
    );

    harness.return_value(2, json!("c"), true);
    harness.return_value(0, json!("a"), true);
    settle().await;
    assert_eq!(
        *results.lock().unwrap(),
        vec![(2, json!("c")), (0, json!("a"))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_progressive_results_until_complete() {
    let harness = Harness::new();
    harness.initialize();
    let deliveries = Arc::new(Mutex::new(Vec::new()));
    {
        let deliveries = deliveries.clone();
        harness.keystone.call(
            "watch",
            None,
            Some(Box::new(move |result: promptbridge::Result<Value>| {
                deliveries.lock().unwrap().push(result.unwrap());
            })),
        );
    }
    settle().await;
    assert_eq!(
        harness.outgoing_calls(),
        vec![json!({"method": "watch", "callbackId": 0, "data": "[]"})]
    );

    harness.return_value(0, json!(1), false);
    harness.return_value(0, json!(2), false);
    harness.return_value(0, json!(3), true);
    harness.return_value(0, json!(4), true);
    settle().await;
    assert_eq!(*deliveries.lock().unwrap(), vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_result_data_arrives_empty() {
    let harness = Harness::new();
    harness.initialize();
    let first = harness.keystone.call_async("noop", None);
    let second = harness.keystone.call_async("nothing", None);
    settle().await;
    harness.prompt("_dsb.returnValue", json!({ "id": 0, "complete": true }));
    harness.return_value(1, Value::Null, true);
    assert_eq!(first.await.unwrap(), json!(""));
    assert_eq!(second.await.unwrap(), json!(""));
}

#[tokio::test(start_paused = true)]
async fn test_call_async_resolves_first_result() {
    let harness = Harness::new();
    harness.initialize();
    let pending = harness.keystone.call_async("add", Some(json!([1, 2])));
    settle().await;
    assert_eq!(
        harness.outgoing_calls(),
        vec![json!({"method": "add", "callbackId": 0, "data": "[1,2]"})]
    );
    harness.return_value(0, json!(3), true);
    assert_eq!(pending.await.unwrap(), json!(3));
}

#[tokio::test(start_paused = true)]
async fn test_call_async_after_shutdown() {
    let harness = Harness::new();
    let pending = harness.keystone.call_async("never", None);
    drop(harness);
    assert!(matches!(
        pending.await,
        Err(BridgeError::CallingScript(CallingScriptError::BridgeClosed))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_typed_call_reports_mismatch() {
    let harness = Harness::new();
    harness.initialize();
    let (tx, rx) = oneshot::channel();
    let mut tx = Some(tx);
    harness
        .keystone
        .call_typed::<u32, _>("count", None, move |result| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(result);
            }
        });
    settle().await;
    harness.return_value(0, json!("many"), true);
    assert!(matches!(
        rx.await.unwrap(),
        Err(BridgeError::CallingScript(CallingScriptError::ReturnTypeMismatch(v)))
            if v == json!("many")
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unencodable_parameter_fails_immediately() {
    let harness = Harness::new();
    let failed = Arc::new(AtomicUsize::new(0));
    {
        let failed = failed.clone();
        harness.keystone.call(
            "f",
            Some(Value::Null),
            Some(Box::new(move |result: promptbridge::Result<Value>| {
                assert!(matches!(
                    result,
                    Err(BridgeError::CallingScript(CallingScriptError::Underlying(_)))
                ));
                failed.fetch_add(1, Ordering::SeqCst);
            })),
        );
    }
    assert_eq!(failed.load(Ordering::SeqCst), 1);
    harness.initialize();
    settle().await;
    assert!(harness.evaluations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_script_method_query() {
    let harness = Harness::new();
    harness.initialize();
    let (tx, rx) = oneshot::channel();
    harness.keystone.has_script_method("ns.handler", move |has| {
        let _ = tx.send(has);
    });
    settle().await;
    assert_eq!(
        harness.outgoing_calls(),
        vec![json!({"method": "_hasJavascriptMethod", "callbackId": 0, "data": "[\"ns.handler\"]"})]
    );
    harness.return_value(0, json!(true), true);
    assert!(rx.await.unwrap());

    let (tx, rx) = oneshot::channel();
    harness.keystone.has_script_method("other", move |has| {
        let _ = tx.send(has);
    });
    settle().await;
    harness.return_value(1, json!("yes"), true);
    assert!(!rx.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_native_method_query() {
    let harness = Harness::new();
    harness.keystone.add_interface(arithmetic(), "math");
    let has_native = |name: &str, kind: &str| {
        harness.prompt("_dsb.hasNativeMethod", json!({"name": name, "type": kind}))["data"].clone()
    };
    assert_eq!(has_native("math.double", "all"), json!(true));
    assert_eq!(has_native("math.double", "syn"), json!(true));
    assert_eq!(has_native("math.double", "asyn"), json!(false));
    assert_eq!(has_native("math.countdown", "asyn"), json!(true));
    assert_eq!(has_native("math.missing", "all"), json!(false));
    assert_eq!(has_native("a.b.c", "all"), json!(false));
    assert_eq!(has_native("_dsb.dsinit", "syn"), json!(true));
    assert_eq!(
        harness.prompt("_dsb.hasNativeMethod", json!({"name": "math.double"})),
        json!({"code": 0, "data": false})
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_page_dismisses() {
    let harness = Harness::new();
    assert_eq!(harness.prompt("_dsb.closePage", Value::Null), json!({"code": 0, "data": ""}));
    assert_eq!(harness.dismissals.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_interface() {
    let harness = Harness::new();
    harness.keystone.add_interface(arithmetic(), "math");
    assert_eq!(harness.keystone.namespaces(), vec!["_dsb", "math"]);
    harness.keystone.remove_interface("math");
    assert_eq!(harness.prompt("math.double", json!(1)), json!({"code": -1, "data": ""}));
}

#[tokio::test(start_paused = true)]
async fn test_custom_config() {
    let config = BridgeConfig {
        invocation_prefix: "bridge:".to_string(),
        reserved_namespace: "_sys".to_string(),
        dispatch_entry_point: "window.bridgeReceive".to_string(),
        debounce_interval_ms: 10,
        ..BridgeConfig::default()
    };
    let harness = Harness::with_config(config);
    harness.prompt("_sys.dsinit", Value::Null);
    harness.keystone.call("f", None, None);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        harness.evaluations(),
        vec![r#"window.bridgeReceive({"method":"f","callbackId":0,"data":"[]"})"#]
    );
    assert_eq!(
        harness.keystone.handle_raw_invocation("_dsbridge=_sys.dsinit", None),
        None
    );
}
