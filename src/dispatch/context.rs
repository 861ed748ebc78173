//! Context extraction for the rule dispatch engine.
//!
//! Transforms the raw per-event JSON payload delivered by the host into a
//! fixed [`HookContext`] struct. Extraction is lenient: missing or malformed
//! fields become empty values, never errors, so a sparse payload degrades to
//! rules simply not matching.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use super::types::{HookEvent, PatternField};

/// Tool name whose parameters carry the todo list.
const TODO_WRITE_TOOL: &str = "TodoWrite";
/// Tool name whose parameters carry an invoked skill.
const SKILL_TOOL: &str = "Skill";

/// One tool-use record from the host payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    /// File touched by the tool call, when the host reports one.
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Todo completion facts derived from TodoWrite calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodoState {
    /// At least one todo item across all TodoWrite calls is completed.
    pub any_completed: bool,
    /// Some TodoWrite call's full, non-empty todo list is 100% completed.
    pub all_completed: bool,
}

/// Normalized facts for one dispatch invocation.
///
/// Built once per event, read-only during evaluation, discarded after the
/// dispatch call returns.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub hook_event: HookEvent,
    /// Empty when the host payload omitted it; state triggers and actions
    /// are skipped in that case.
    pub session_id: String,
    pub prompt: String,
    pub description: String,
    pub agent_type: String,
    pub last_response: String,
    pub tool_results: Vec<ToolResult>,
    pub changed_files: Vec<String>,
    pub todo_state: TodoState,
    pub invoked_skills: BTreeSet<String>,
}

impl HookContext {
    pub fn new(hook_event: HookEvent) -> Self {
        HookContext {
            hook_event,
            session_id: String::new(),
            prompt: String::new(),
            description: String::new(),
            agent_type: String::new(),
            last_response: String::new(),
            tool_results: Vec::new(),
            changed_files: Vec::new(),
            todo_state: TodoState::default(),
            invoked_skills: BTreeSet::new(),
        }
    }

    /// The context value a text-pattern field reads.
    pub fn text_field(&self, field: PatternField) -> &str {
        match field {
            PatternField::Keywords | PatternField::Prompt | PatternField::IntentPatterns => {
                &self.prompt
            }
            PatternField::DescriptionPatterns => &self.description,
            PatternField::AgentTypes | PatternField::SubagentType => &self.agent_type,
            PatternField::OutputPatterns => &self.last_response,
        }
    }
}

/// Build the normalized context for one hook event.
pub fn extract_context(hook_event: HookEvent, data: &Value) -> HookContext {
    let mut ctx = match hook_event {
        HookEvent::UserPromptSubmit => extract_user_prompt_context(data),
        HookEvent::Stop => extract_stop_context(data),
        HookEvent::SubagentStop => extract_subagent_stop_context(data),
    };
    ctx.session_id = string_field(data, "session_id");
    ctx
}

fn extract_user_prompt_context(data: &Value) -> HookContext {
    let mut ctx = HookContext::new(HookEvent::UserPromptSubmit);
    ctx.prompt = string_field(data, "prompt");
    ctx
}

fn extract_stop_context(data: &Value) -> HookContext {
    let mut ctx = HookContext::new(HookEvent::Stop);
    ctx.tool_results = extract_tool_results(data);
    ctx.changed_files = extract_changed_files(data, &ctx.tool_results);
    ctx.todo_state = derive_todo_state(&ctx.tool_results);
    ctx.invoked_skills = derive_invoked_skills(&ctx.tool_results);
    ctx
}

fn extract_subagent_stop_context(data: &Value) -> HookContext {
    let mut ctx = HookContext::new(HookEvent::SubagentStop);
    ctx.description = string_field(data, "description");
    ctx.agent_type = string_field(data, "agent_type");
    ctx.last_response = string_field(data, "last_response");
    ctx
}

fn string_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parse tool-use records, dropping entries that are not objects.
fn extract_tool_results(data: &Value) -> Vec<ToolResult> {
    data.get("tool_results")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Changed file paths: tool-result `file_path` values plus the payload's
/// `files` array, in payload order.
fn extract_changed_files(data: &Value, tool_results: &[ToolResult]) -> Vec<String> {
    let mut files: Vec<String> = tool_results
        .iter()
        .filter_map(|result| result.file_path.clone())
        .collect();

    if let Some(entries) = data.get("files").and_then(Value::as_array) {
        files.extend(
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string),
        );
    }

    files
}

fn derive_todo_state(tool_results: &[ToolResult]) -> TodoState {
    let mut state = TodoState::default();

    for result in tool_results {
        if result.tool_name != TODO_WRITE_TOOL {
            continue;
        }

        let Some(todos) = result.parameters.get("todos").and_then(Value::as_array) else {
            continue;
        };
        if todos.is_empty() {
            continue;
        }

        let completed = todos
            .iter()
            .filter(|todo| todo.get("status").and_then(Value::as_str) == Some("completed"))
            .count();

        if completed > 0 {
            state.any_completed = true;
        }
        if completed == todos.len() {
            state.all_completed = true;
        }
    }

    state
}

fn derive_invoked_skills(tool_results: &[ToolResult]) -> BTreeSet<String> {
    tool_results
        .iter()
        .filter(|result| result.tool_name == SKILL_TOOL)
        .filter_map(|result| result.parameters.get("skill").and_then(Value::as_str))
        .filter(|skill| !skill.is_empty())
        .map(str::to_string)
        .collect()
}
