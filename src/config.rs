//! Rule configuration loading.
//!
//! Rules live in a JSON file shaped `{"rules": {"<name>": {...}}}`, found via
//! the resolution chain in [`crate::paths`]. Loading fails open: a missing or
//! unparseable file degrades to an empty rule set, and a single malformed
//! rule is excluded while the rest of the file loads. The dispatcher runs
//! inside a larger host pipeline that must never hang on bad configuration.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::dispatch::types::{Action, HookEvent, Priority, Rule, RuleSet, TriggerSpec};
use crate::paths;

/// Wire form of the rules file. Rule bodies stay raw so one malformed rule
/// cannot poison the whole file.
#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RuleBody {
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    action: Value,
    #[serde(default)]
    triggers: HashMap<HookEvent, TriggerSpec>,
}

/// Load rules from an explicit path, or via the resolution chain.
pub fn load_rules(path_override: Option<&Path>) -> RuleSet {
    let path = match path_override {
        Some(path) => path.to_path_buf(),
        None => match paths::find_rules_file() {
            Some(path) => path,
            None => {
                warn!("No rules file found");
                return Vec::new();
            }
        },
    };
    load_rules_from_file(&path)
}

/// Load rules from one file, excluding malformed rules individually.
pub fn load_rules_from_file(path: &Path) -> RuleSet {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to read rules file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let file: RulesFile = match serde_json::from_str(&content) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to parse rules file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut rules: RuleSet = Vec::new();
    for (name, body) in file.rules {
        match parse_rule(&name, body) {
            Ok(rule) => rules.push(rule),
            Err(e) => error!("Failed to parse rule '{}': {:#}", name, e),
        }
    }

    debug!("Loaded {} rules from {}", rules.len(), path.display());
    rules
}

fn parse_rule(name: &str, body: Value) -> Result<Rule> {
    ensure!(!name.is_empty(), "rule name must be non-empty");

    let body: RuleBody = serde_json::from_value(body).context("invalid rule body")?;
    let action = parse_action(body.action).context("invalid action")?;

    Ok(Rule {
        name: name.to_string(),
        priority: body.priority,
        action,
        triggers: body.triggers,
    })
}

/// Parse the tagged action object. A missing `type` defaults to
/// `suggest_skill` for terse rule files.
fn parse_action(mut value: Value) -> Result<Action> {
    if value.is_null() {
        value = Value::Object(serde_json::Map::new());
    }
    if let Some(object) = value.as_object_mut()
        && !object.contains_key("type")
    {
        object.insert("type".to_string(), Value::String("suggest_skill".to_string()));
    }
    Ok(serde_json::from_value(value)?)
}
