//! Line-oriented host for the bridge.
//!
//! Each stdin line is one of:
//!
//! - `<prompt>[TAB<default text>]`: a prompt raised by the scripted side;
//!   the answer is printed as `< <answer>`
//! - `!call <function> [<json arguments>]`: call a scripted-side function;
//!   every result is printed as `= <function> <result>`
//! - `!has <function>`: ask whether the scripted side registered a function
//!
//! Every script the bridge evaluates is printed line by line as `> <script>`.

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use promptbridge::{
    BridgeConfig, ConfigLoadError, Keystone, MethodTable, PromptDelegate, PromptInterceptor,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version = env!("VERSION_STRING"), about, long_about = None)]
pub struct Cli {
    /// Enables debug mode
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file (default: the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write logs to the data directory
    #[arg(long)]
    log_file: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<BridgeConfig> {
    let loaded = match path {
        Some(path) => BridgeConfig::load_from(path),
        None => BridgeConfig::load(),
    };
    match loaded {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound(path)) => {
            info!("No config at {}, using defaults", path.display());
            Ok(BridgeConfig::default())
        }
        Err(err) => Err(err).context("Failed to load config"),
    }
}

fn demo_interface() -> MethodTable {
    MethodTable::builder()
        .sync("echo", |parameter| parameter)
        .sync("double", |parameter| {
            let value = parameter?;
            // Integers past i64 range fall back to floating point
            value
                .as_i64()
                .and_then(|n| n.checked_mul(2))
                .map(|n| json!(n))
                .or_else(|| value.as_f64().map(|n| json!(n * 2.0)))
        })
        .asynchronous("ticker", |parameter, responder| {
            let ticks = parameter.and_then(|value| value.as_u64()).unwrap_or(3);
            tokio::spawn(async move {
                for tick in 1..ticks {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    responder.progress(Some(json!(tick)));
                }
                responder.complete(Some(json!(ticks)));
            });
        })
        .build()
}

fn print_script(script: &str) {
    for line in script.lines() {
        println!("> {}", line);
    }
}

fn handle_command(keystone: &Keystone, command: &str) {
    let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
    let (function, arguments) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
    if function.is_empty() {
        warn!("Missing function name in {:?}", command);
        return;
    }

    match verb {
        "call" => {
            let parameter = if arguments.trim().is_empty() {
                None
            } else {
                match serde_json::from_str::<Value>(arguments) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("Arguments are not JSON: {}", e);
                        return;
                    }
                }
            };
            let name = function.to_string();
            keystone.call(
                function,
                parameter,
                Some(Box::new(move |result: promptbridge::Result<Value>| match result {
                    Ok(value) => println!("= {} {}", name, value),
                    Err(e) => println!("! {} {}", name, e),
                })),
            );
        }
        "has" => {
            let name = function.to_string();
            keystone.has_script_method(function, move |has| println!("= {} {}", name, has));
        }
        _ => warn!("Unknown command {:?}", verb),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = logging::init_logging(cli.log_file, cli.debug)?;

    let config = load_config(cli.config.as_ref())?;

    let closed = Arc::new(Notify::new());
    let keystone = {
        let closed = closed.clone();
        Arc::new(Keystone::with_config(config, print_script, move || {
            closed.notify_one()
        }))
    };
    let demo = Arc::new(demo_interface());
    keystone.add_interface(demo.clone(), "");
    keystone.add_interface(demo, "demo");

    let unanswered = |prompt: &str, _: Option<&str>| -> Option<String> {
        warn!("Prompt {:?} is not a bridge call", prompt);
        None
    };
    let interceptor = PromptInterceptor::new(keystone.clone()).with_fallback(Arc::new(unanswered));

    info!(
        "Bridge ready, namespaces: {}",
        keystone.namespaces().join(", ")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(command) = line.strip_prefix('!') {
                    handle_command(&keystone, command);
                    continue;
                }
                let (prompt, default_text) = match line.split_once('\t') {
                    Some((prompt, default_text)) => (prompt, Some(default_text)),
                    None => (line.as_str(), None),
                };
                if let Some(answer) = interceptor.answer_prompt(prompt, default_text) {
                    println!("< {}", answer);
                }
            }
            _ = closed.notified() => {
                info!("Scripted side asked to close");
                break;
            }
        }
    }

    // Let the last batch flush
    tokio::time::sleep(keystone.config().debounce_interval() * 2).await;
    Ok(())
}
