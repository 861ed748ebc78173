//! `hookwise dispatch`: run one hook event end to end.

use std::io::{self, Read};
use std::path::Path;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use hookwise::config;
use hookwise::dispatch::Dispatcher;
use hookwise::{FileStateStore, HookEvent};

pub fn run(event: HookEvent, rules_path: Option<&Path>) -> Result<()> {
    let data = read_payload();
    let rules = config::load_rules(rules_path);
    debug!("Dispatching {} with {} rules", event, rules.len());

    let store = FileStateStore::open_default();
    let dispatcher = Dispatcher::new(&rules, &store);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    dispatcher.dispatch(event, &data, &mut out)
}

/// Read the JSON payload from stdin. Unreadable or invalid input degrades to
/// an empty payload so the host still gets a well-formed reply.
fn read_payload() -> Value {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        warn!("Failed to read stdin: {}", e);
        return Value::Null;
    }

    if input.trim().is_empty() {
        return Value::Null;
    }

    serde_json::from_str(&input).unwrap_or_else(|e| {
        warn!("Invalid JSON payload: {}", e);
        Value::Null
    })
}
