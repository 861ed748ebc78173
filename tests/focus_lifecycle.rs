//! End-to-end integration test for focus state dispatch.
//!
//! Exercises the complete workflow through the public API:
//! 1. Set focus via the Stop hook (TodoWrite on a spec tasks file)
//! 2. Inject context via UserPromptSubmit while focus exists
//! 3. Clear focus when the archive skill is invoked
//! 4. Verify no injection after clearing

use std::io::Write;

use serde_json::{json, Value};
use tempfile::{NamedTempFile, TempDir};

use hookwise::config;
use hookwise::dispatch::Dispatcher;
use hookwise::{FileStateStore, HookEvent, StateStore};

const SESSION: &str = "focus-session";

fn focus_rules_file() -> NamedTempFile {
    let rules = json!({
        "rules": {
            "focus-set": {
                "priority": "high",
                "action": {
                    "type": "set_state",
                    "key": "focus",
                    "value_from": "captured.spec_id",
                },
                "triggers": {
                    "Stop": {
                        "groups": [{
                            "tool_result": {"tool_name": ["TodoWrite", "Edit"]},
                            "files_changed": {
                                "path_patterns": [r"specs/active/(?P<spec_id>[^/]+)/tasks\.md"],
                            },
                        }],
                    },
                },
            },
            "focus-clear": {
                "priority": "high",
                "action": {"type": "clear_state", "key": "focus"},
                "triggers": {
                    "Stop": {"skill_invoked": {"skill": "spec-archive"}},
                },
            },
            "focus-inject": {
                "action": {
                    "type": "inject_context",
                    "context": "Current focus: {state.focus}",
                },
                "triggers": {
                    "UserPromptSubmit": {"state_exists": {"key": "focus"}},
                },
            },
        },
    });

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(rules.to_string().as_bytes()).unwrap();
    file
}

fn dispatch(
    dispatcher: &Dispatcher<'_>,
    event: HookEvent,
    data: Value,
) -> String {
    let mut out = Vec::new();
    dispatcher.dispatch(event, &data, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_full_focus_lifecycle() {
    let state_dir = TempDir::new().unwrap();
    let store = FileStateStore::new(state_dir.path());
    let rules_file = focus_rules_file();
    let rules = config::load_rules_from_file(rules_file.path());
    assert_eq!(rules.len(), 3);

    let dispatcher = Dispatcher::new(&rules, &store);

    // Step 1: TodoWrite on a spec tasks file sets focus from the captured id.
    dispatch(
        &dispatcher,
        HookEvent::Stop,
        json!({
            "session_id": SESSION,
            "tool_results": [{"tool_name": "TodoWrite"}],
            "files": ["specs/active/lifecycle-test/tasks.md"],
        }),
    );
    assert_eq!(
        store.get(SESSION, "focus").unwrap().as_deref(),
        Some("lifecycle-test")
    );

    // Step 2: focus is injected on the next prompt.
    let output = dispatch(
        &dispatcher,
        HookEvent::UserPromptSubmit,
        json!({"session_id": SESSION, "prompt": "continue"}),
    );
    let envelope: Value = serde_json::from_str(&output).unwrap();
    let context = envelope["hookSpecificOutput"]["additionalContext"]
        .as_str()
        .unwrap();
    assert!(context.contains("Current focus: lifecycle-test"));

    // Step 3: a later match cannot clobber the active focus.
    dispatch(
        &dispatcher,
        HookEvent::Stop,
        json!({
            "session_id": SESSION,
            "tool_results": [{"tool_name": "Edit"}],
            "files": ["specs/active/other-spec/tasks.md"],
        }),
    );
    assert_eq!(
        store.get(SESSION, "focus").unwrap().as_deref(),
        Some("lifecycle-test")
    );

    // Step 4: invoking the archive skill clears focus.
    dispatch(
        &dispatcher,
        HookEvent::Stop,
        json!({
            "session_id": SESSION,
            "tool_results": [{"tool_name": "Skill", "parameters": {"skill": "spec-archive"}}],
        }),
    );
    assert_eq!(store.get(SESSION, "focus").unwrap(), None);

    // Step 5: no injection once focus is gone, but the envelope stays
    // well-formed.
    let output = dispatch(
        &dispatcher,
        HookEvent::UserPromptSubmit,
        json!({"session_id": SESSION, "prompt": "continue"}),
    );
    assert_eq!(output, "{}");
}

#[test]
fn test_focus_requires_both_group_members() {
    let state_dir = TempDir::new().unwrap();
    let store = FileStateStore::new(state_dir.path());
    let rules_file = focus_rules_file();
    let rules = config::load_rules_from_file(rules_file.path());
    let dispatcher = Dispatcher::new(&rules, &store);

    // Tool matched but no spec file changed.
    dispatch(
        &dispatcher,
        HookEvent::Stop,
        json!({
            "session_id": SESSION,
            "tool_results": [{"tool_name": "TodoWrite"}],
        }),
    );
    assert_eq!(store.get(SESSION, "focus").unwrap(), None);

    // Spec file changed but by a non-matching tool.
    dispatch(
        &dispatcher,
        HookEvent::Stop,
        json!({
            "session_id": SESSION,
            "tool_results": [{"tool_name": "Read"}],
            "files": ["specs/active/test/tasks.md"],
        }),
    );
    assert_eq!(store.get(SESSION, "focus").unwrap(), None);
}
