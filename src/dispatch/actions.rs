//! Response formatting and state side effects for matched rules.
//!
//! Formatters are pure over the match list (plus state reads for `{state.KEY}`
//! placeholders) and produce the hook-specific output shape. The action
//! executor runs strictly after formatting within a dispatch pass, so output
//! never observes a same-pass state write.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::context::HookContext;
use super::types::{Action, HookEvent, Match, Priority};
use crate::state::{StateError, StateStore};

/// `{state.KEY}` placeholder in inject-context templates.
static STATE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{state\.([A-Za-z0-9_.-]+)\}").expect("valid placeholder regex"));

/// Hook-specific context block in the structured response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: HookEvent,
    pub additional_context: String,
}

/// Structured response for UserPromptSubmit. Always serializes to a
/// well-formed JSON object, `{}` when there is nothing to say.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PromptEnvelope {
    #[serde(rename = "hookSpecificOutput", skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

/// Structured response for SubagentStop: either a blocking decision or an
/// additional-context envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SubagentEnvelope {
    Block {
        decision: String,
        reason: String,
    },
    Context {
        #[serde(rename = "hookSpecificOutput")]
        hook_specific_output: HookSpecificOutput,
    },
}

impl SubagentEnvelope {
    pub fn block(reason: impl Into<String>) -> Self {
        SubagentEnvelope::Block {
            decision: "block".to_string(),
            reason: reason.into(),
        }
    }
}

/// Format skill suggestions grouped by priority tier.
pub fn format_skill_suggestions(matches: &[Match]) -> String {
    let mut high: Vec<(&str, &str)> = Vec::new();
    let mut medium: Vec<(&str, &str)> = Vec::new();
    let mut low: Vec<(&str, &str)> = Vec::new();

    for m in matches {
        if let Action::SuggestSkill { skill, reason } = &m.action {
            match m.priority {
                Priority::High => high.push((skill, reason)),
                Priority::Medium => medium.push((skill, reason)),
                Priority::Low => low.push((skill, reason)),
            }
        }
    }

    if high.is_empty() && medium.is_empty() && low.is_empty() {
        return String::new();
    }

    let mut lines = vec!["SKILL ACTIVATION SUGGESTION".to_string(), String::new()];

    if !high.is_empty() {
        lines.push("HIGH PRIORITY:".to_string());
        for (skill, reason) in &high {
            lines.push(format!("  - {skill}"));
            if !reason.is_empty() {
                lines.push(format!("    Reason: {reason}"));
            }
        }
    }

    if !medium.is_empty() {
        if !high.is_empty() {
            lines.push(String::new());
        }
        lines.push("MEDIUM PRIORITY:".to_string());
        for (skill, reason) in &medium {
            lines.push(format!("  - {skill}"));
            if !reason.is_empty() {
                lines.push(format!("    Reason: {reason}"));
            }
        }
    }

    if !low.is_empty() {
        if !high.is_empty() || !medium.is_empty() {
            lines.push(String::new());
        }
        lines.push("LOW PRIORITY:".to_string());
        for (skill, _) in &low {
            lines.push(format!("  - {skill}"));
        }
    }

    lines.push(String::new());
    lines.push("Consider invoking relevant skills with the Skill tool.".to_string());

    lines.join("\n")
}

/// Format a consolidated plain-text reminder for the Stop hook.
///
/// High-priority suggestion and reminder matches are listed with their
/// effective reason; otherwise the first two lower-tier matches are listed
/// without reasons.
pub fn format_reminder(matches: &[Match]) -> String {
    let mut high: Vec<String> = Vec::new();
    let mut others: Vec<String> = Vec::new();

    for m in matches {
        match (&m.action, m.priority) {
            (Action::SuggestSkill { skill, reason }, Priority::High) => {
                let display_reason = if reason.is_empty() {
                    format!("Use {skill}")
                } else {
                    reason.clone()
                };
                high.push(format!("  - {skill}: {display_reason}"));
            }
            (Action::Remind { message }, Priority::High) => {
                high.push(format!("  - {message}"));
            }
            (Action::SuggestSkill { skill, .. }, _) => {
                others.push(format!("  - {skill}"));
            }
            (Action::Remind { message }, _) => {
                others.push(format!("  - {message}"));
            }
            _ => {}
        }
    }

    if high.is_empty() && others.is_empty() {
        return String::new();
    }

    let mut lines = vec!["Skill Reminder".to_string(), String::new(), "Consider:".to_string()];
    if !high.is_empty() {
        lines.extend(high);
    } else {
        lines.extend(others.into_iter().take(2));
    }

    lines.join("\n")
}

/// Format the UserPromptSubmit response envelope.
///
/// Skill suggestions are grouped by tier; every inject-context match is
/// appended as a separate block with `{state.KEY}` placeholders resolved.
pub fn format_user_prompt_output(
    matches: &[Match],
    context: &HookContext,
    store: &dyn StateStore,
) -> PromptEnvelope {
    let mut parts: Vec<String> = Vec::new();

    let skill_text = format_skill_suggestions(matches);
    if !skill_text.is_empty() {
        parts.push(skill_text);
    }

    for m in matches {
        if let Action::InjectContext { context: template } = &m.action {
            parts.push(resolve_state_placeholders(
                template,
                &context.session_id,
                store,
            ));
        }
    }

    if parts.is_empty() {
        return PromptEnvelope::default();
    }

    PromptEnvelope {
        hook_specific_output: Some(HookSpecificOutput {
            hook_event_name: HookEvent::UserPromptSubmit,
            additional_context: parts.join("\n\n"),
        }),
    }
}

/// Format the Stop hook reminder line, if any.
pub fn format_stop_output(matches: &[Match]) -> Option<String> {
    let text = format_reminder(matches);
    if text.is_empty() { None } else { Some(text) }
}

/// Format the SubagentStop response.
///
/// A Block match takes absolute precedence: the first one (matches arrive
/// priority-sorted) short-circuits to a blocking decision and every other
/// match is discarded. Otherwise skill suggestions go out as an envelope;
/// otherwise nothing.
pub fn format_subagent_stop_output(matches: &[Match]) -> Option<SubagentEnvelope> {
    for m in matches {
        if let Action::Block { reason } = &m.action {
            return Some(SubagentEnvelope::block(reason.clone()));
        }
    }

    let skill_text = format_skill_suggestions(matches);
    if !skill_text.is_empty() {
        return Some(SubagentEnvelope::Context {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: HookEvent::SubagentStop,
                additional_context: skill_text,
            },
        });
    }

    None
}

/// Resolve `{state.KEY}` placeholders against the state store.
///
/// An unresolvable placeholder (missing session, unset key, or read error)
/// is left verbatim, never an error.
fn resolve_state_placeholders(template: &str, session_id: &str, store: &dyn StateStore) -> String {
    if session_id.is_empty() {
        return template.to_string();
    }

    STATE_PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            match store.get(session_id, key) {
                Ok(Some(value)) => value,
                Ok(None) => caps[0].to_string(),
                Err(e) => {
                    warn!("Failed to read state '{}': {}", key, e);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Apply SetState/ClearState side effects from the match list.
///
/// Requires `session_id` in context; its absence skips all state actions.
/// SetState refuses to overwrite an existing value (log-and-skip) and
/// resolves its value from a `captured.<name>` reference against the winning
/// group's captures. ClearState is unconditionally idempotent. Store write
/// failures propagate.
pub fn execute_actions(
    matches: &[Match],
    context: &HookContext,
    store: &dyn StateStore,
) -> Result<(), StateError> {
    if context.session_id.is_empty() {
        if matches
            .iter()
            .any(|m| matches!(m.action, Action::SetState { .. } | Action::ClearState { .. }))
        {
            debug!("No session_id in context; skipping state actions");
        }
        return Ok(());
    }

    for m in matches {
        match &m.action {
            Action::SetState { key, value_from } => {
                if store.exists(&context.session_id, key)? {
                    debug!(
                        "State '{}' already set; rule '{}' skipped (clear first to re-set)",
                        key, m.rule_name
                    );
                    continue;
                }

                let Some(capture_name) = value_from.strip_prefix("captured.") else {
                    warn!(
                        "Rule '{}': unsupported value_from reference '{}'",
                        m.rule_name, value_from
                    );
                    continue;
                };
                let Some(value) = m.captures.get(capture_name) else {
                    warn!(
                        "Rule '{}': capture '{}' not found; state write skipped",
                        m.rule_name, capture_name
                    );
                    continue;
                };

                store.set(&context.session_id, key, value)?;
            }
            Action::ClearState { key } => {
                store.clear(&context.session_id, key)?;
            }
            _ => {}
        }
    }

    Ok(())
}

/// Evidence strings across all matches, useful for logging.
pub fn matched_evidence(matches: &[Match]) -> BTreeSet<String> {
    matches
        .iter()
        .flat_map(|m| m.matched_patterns.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FileStateStore;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    fn suggest(name: &str, skill: &str, reason: &str, priority: Priority) -> Match {
        Match {
            rule_name: name.to_string(),
            priority,
            action: Action::SuggestSkill {
                skill: skill.to_string(),
                reason: reason.to_string(),
            },
            matched_patterns: BTreeSet::new(),
            captures: BTreeMap::new(),
        }
    }

    fn with_action(name: &str, action: Action, priority: Priority) -> Match {
        Match {
            rule_name: name.to_string(),
            priority,
            action,
            matched_patterns: BTreeSet::new(),
            captures: BTreeMap::new(),
        }
    }

    fn empty_store() -> (TempDir, FileStateStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        (dir, store)
    }

    fn session_context(session_id: &str) -> HookContext {
        let mut ctx = HookContext::new(HookEvent::Stop);
        ctx.session_id = session_id.to_string();
        ctx
    }

    #[test]
    fn test_skill_suggestions_grouped_by_tier() {
        let matches = vec![
            suggest("r1", "code-review", "review before merge", Priority::High),
            suggest("r2", "code-test", "", Priority::Medium),
            suggest("r3", "cleanup", "", Priority::Low),
        ];

        let text = format_skill_suggestions(&matches);
        assert!(text.starts_with("SKILL ACTIVATION SUGGESTION"));
        assert!(text.contains("HIGH PRIORITY:\n  - code-review\n    Reason: review before merge"));
        assert!(text.contains("MEDIUM PRIORITY:\n  - code-test"));
        assert!(text.contains("LOW PRIORITY:\n  - cleanup"));
        assert!(text.ends_with("Consider invoking relevant skills with the Skill tool."));
    }

    #[test]
    fn test_skill_suggestions_empty_without_suggest_matches() {
        let matches = vec![with_action(
            "r1",
            Action::Remind {
                message: "hi".to_string(),
            },
            Priority::High,
        )];
        assert!(format_skill_suggestions(&matches).is_empty());
    }

    #[test]
    fn test_reminder_lists_high_with_effective_reason() {
        let matches = vec![
            suggest("r1", "code-test", "", Priority::High),
            suggest("r2", "cleanup", "", Priority::Medium),
        ];

        let text = format_reminder(&matches);
        assert_eq!(text, "Skill Reminder\n\nConsider:\n  - code-test: Use code-test");
    }

    #[test]
    fn test_reminder_includes_high_remind_messages() {
        let matches = vec![with_action(
            "r1",
            Action::Remind {
                message: "Nice progress on todos!".to_string(),
            },
            Priority::High,
        )];

        let text = format_reminder(&matches);
        assert!(text.contains("  - Nice progress on todos!"));
    }

    #[test]
    fn test_reminder_caps_lower_tier_at_two() {
        let matches = vec![
            suggest("r1", "one", "", Priority::Medium),
            suggest("r2", "two", "", Priority::Medium),
            suggest("r3", "three", "", Priority::Low),
        ];

        let text = format_reminder(&matches);
        assert!(text.contains("  - one"));
        assert!(text.contains("  - two"));
        assert!(!text.contains("  - three"));
    }

    #[test]
    fn test_stop_output_empty_without_matches() {
        assert_eq!(format_stop_output(&[]), None);
    }

    #[test]
    fn test_user_prompt_envelope_empty_is_well_formed() {
        let (_dir, store) = empty_store();
        let ctx = HookContext::new(HookEvent::UserPromptSubmit);

        let envelope = format_user_prompt_output(&[], &ctx, &store);
        assert_eq!(serde_json::to_string(&envelope).unwrap(), "{}");
    }

    #[test]
    fn test_user_prompt_envelope_resolves_state_placeholders() {
        let (_dir, store) = empty_store();
        store.set("s1", "focus", "my-feature").unwrap();

        let matches = vec![with_action(
            "inject",
            Action::InjectContext {
                context: "Current focus: {state.focus} ({state.unset})".to_string(),
            },
            Priority::Medium,
        )];
        let mut ctx = HookContext::new(HookEvent::UserPromptSubmit);
        ctx.session_id = "s1".to_string();

        let envelope = format_user_prompt_output(&matches, &ctx, &store);
        let output = envelope.hook_specific_output.unwrap();
        assert_eq!(output.hook_event_name, HookEvent::UserPromptSubmit);
        // Resolved placeholder substituted, unresolvable one left verbatim.
        assert_eq!(
            output.additional_context,
            "Current focus: my-feature ({state.unset})"
        );
    }

    #[test]
    fn test_user_prompt_envelope_joins_blocks() {
        let (_dir, store) = empty_store();
        let matches = vec![
            suggest("r1", "code-review", "", Priority::High),
            with_action(
                "r2",
                Action::InjectContext {
                    context: "extra".to_string(),
                },
                Priority::Medium,
            ),
        ];
        let ctx = HookContext::new(HookEvent::UserPromptSubmit);

        let envelope = format_user_prompt_output(&matches, &ctx, &store);
        let context = envelope.hook_specific_output.unwrap().additional_context;
        assert!(context.contains("\n\nextra"));
    }

    #[test]
    fn test_subagent_block_takes_precedence() {
        let matches = vec![
            with_action(
                "blocker",
                Action::Block {
                    reason: "missing tests".to_string(),
                },
                Priority::High,
            ),
            suggest("r2", "code-test", "", Priority::High),
        ];

        let envelope = format_subagent_stop_output(&matches).unwrap();
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            serde_json::json!({"decision": "block", "reason": "missing tests"})
        );
    }

    #[test]
    fn test_subagent_suggestions_without_block() {
        let matches = vec![suggest("r1", "code-test", "", Priority::High)];

        let Some(SubagentEnvelope::Context {
            hook_specific_output,
        }) = format_subagent_stop_output(&matches)
        else {
            panic!("expected context envelope");
        };
        assert_eq!(hook_specific_output.hook_event_name, HookEvent::SubagentStop);
    }

    #[test]
    fn test_subagent_nothing_without_relevant_matches() {
        assert_eq!(format_subagent_stop_output(&[]), None);

        let matches = vec![with_action(
            "r1",
            Action::ClearState {
                key: "focus".to_string(),
            },
            Priority::High,
        )];
        assert_eq!(format_subagent_stop_output(&matches), None);
    }

    #[test]
    fn test_set_state_from_capture() {
        let (_dir, store) = empty_store();
        let mut m = with_action(
            "focus-set",
            Action::SetState {
                key: "focus".to_string(),
                value_from: "captured.spec_id".to_string(),
            },
            Priority::High,
        );
        m.captures.insert("spec_id".to_string(), "my-feature".to_string());

        execute_actions(&[m], &session_context("s1"), &store).unwrap();
        assert_eq!(store.get("s1", "focus").unwrap().as_deref(), Some("my-feature"));
    }

    #[test]
    fn test_set_state_refuses_overwrite() {
        let (_dir, store) = empty_store();
        store.set("s1", "focus", "original").unwrap();

        let mut m = with_action(
            "focus-set",
            Action::SetState {
                key: "focus".to_string(),
                value_from: "captured.spec_id".to_string(),
            },
            Priority::High,
        );
        m.captures.insert("spec_id".to_string(), "new".to_string());

        execute_actions(&[m], &session_context("s1"), &store).unwrap();
        assert_eq!(store.get("s1", "focus").unwrap().as_deref(), Some("original"));
    }

    #[test]
    fn test_set_state_skips_unresolved_capture() {
        let (_dir, store) = empty_store();
        let m = with_action(
            "focus-set",
            Action::SetState {
                key: "focus".to_string(),
                value_from: "captured.missing".to_string(),
            },
            Priority::High,
        );

        execute_actions(&[m], &session_context("s1"), &store).unwrap();
        assert!(!store.exists("s1", "focus").unwrap());
    }

    #[test]
    fn test_clear_state_idempotent() {
        let (_dir, store) = empty_store();
        store.set("s1", "focus", "value").unwrap();

        let m = with_action(
            "focus-clear",
            Action::ClearState {
                key: "focus".to_string(),
            },
            Priority::High,
        );

        execute_actions(&[m.clone()], &session_context("s1"), &store).unwrap();
        assert!(!store.exists("s1", "focus").unwrap());
        // Repeating against an unset key never errors.
        execute_actions(&[m], &session_context("s1"), &store).unwrap();
    }

    #[test]
    fn test_state_actions_skipped_without_session() {
        let (_dir, store) = empty_store();
        let mut m = with_action(
            "focus-set",
            Action::SetState {
                key: "focus".to_string(),
                value_from: "captured.spec_id".to_string(),
            },
            Priority::High,
        );
        m.captures.insert("spec_id".to_string(), "v".to_string());

        let ctx = HookContext::new(HookEvent::Stop);
        execute_actions(&[m], &ctx, &store).unwrap();
        assert!(!store.exists("s1", "focus").unwrap());
    }
}
