//! Pattern matching primitives and trigger evaluation.
//!
//! The four text matchers are pure functions from `(value, patterns)` to the
//! matched subset of patterns. Trigger groups compose them with the
//! specialized sub-triggers: within a group every active member must match
//! (AND); across a spec's groups the first matching group wins (OR).
//!
//! Matching fails open throughout: an invalid regex pattern is skipped, a
//! missing context value is treated as empty, an unreadable file contributes
//! nothing. Only state-store probes surface errors, which callers isolate
//! per rule.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use regex::{Regex, RegexBuilder};

use super::context::HookContext;
use super::types::{
    FilesChangedTrigger, OutputMissingTrigger, PatternField, PatternSet, SkillInvokedTrigger,
    StateExistsTrigger, TodoStateTrigger, ToolResultTrigger, TriggerGroup, TriggerSpec,
};
use crate::state::{StateError, StateStore};

/// Cap on file content inspected by [`match_file_content`].
pub const CONTENT_MATCH_MAX_BYTES: usize = 10_000;

/// A text matcher: returns the subset of `patterns` that matched `value`.
pub type Matcher = fn(&str, &PatternSet) -> BTreeSet<String>;

/// Match patterns as whole words (case-insensitive). Pattern text is escaped,
/// never compiled as a regex.
pub fn match_word_boundaries(value: &str, patterns: &PatternSet) -> BTreeSet<String> {
    if value.is_empty() || patterns.is_empty() {
        return BTreeSet::new();
    }

    patterns
        .iter()
        .filter(|keyword| {
            RegexBuilder::new(&format!(r"\b{}\b", regex::escape(keyword)))
                .case_insensitive(true)
                .build()
                .is_ok_and(|re| re.is_match(value))
        })
        .cloned()
        .collect()
}

/// Match regex patterns (case-insensitive). Invalid patterns are skipped.
pub fn match_regex(value: &str, patterns: &PatternSet) -> BTreeSet<String> {
    if value.is_empty() || patterns.is_empty() {
        return BTreeSet::new();
    }

    patterns
        .iter()
        .filter(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .is_ok_and(|re| re.is_match(value))
        })
        .cloned()
        .collect()
}

/// Match exact strings (case-insensitive).
pub fn match_exact(value: &str, patterns: &PatternSet) -> BTreeSet<String> {
    if value.is_empty() || patterns.is_empty() {
        return BTreeSet::new();
    }

    let value_lower = value.to_lowercase();
    patterns
        .iter()
        .filter(|pattern| pattern.to_lowercase() == value_lower)
        .cloned()
        .collect()
}

/// Match substrings (case-insensitive).
pub fn match_substring(value: &str, patterns: &PatternSet) -> BTreeSet<String> {
    if value.is_empty() || patterns.is_empty() {
        return BTreeSet::new();
    }

    let value_lower = value.to_lowercase();
    patterns
        .iter()
        .filter(|pattern| value_lower.contains(&pattern.to_lowercase()))
        .cloned()
        .collect()
}

/// The matcher a text-pattern field dispatches to.
fn field_matcher(field: PatternField) -> Matcher {
    match field {
        PatternField::Keywords | PatternField::Prompt => match_word_boundaries,
        PatternField::IntentPatterns
        | PatternField::DescriptionPatterns
        | PatternField::OutputPatterns => match_regex,
        PatternField::AgentTypes | PatternField::SubagentType => match_exact,
    }
}

/// Match a group's text-pattern map against the context.
///
/// Fields are OR'd with each other: the result is the union of matched
/// patterns from every field.
pub fn match_patterns(
    patterns: &BTreeMap<PatternField, PatternSet>,
    context: &HookContext,
) -> BTreeSet<String> {
    let mut all_matched = BTreeSet::new();

    for (field, field_patterns) in patterns {
        if field_patterns.is_empty() {
            continue;
        }

        let value = context.text_field(*field);
        if value.is_empty() {
            continue;
        }

        all_matched.extend(field_matcher(*field)(value, field_patterns));
    }

    all_matched
}

/// Match tool execution results.
///
/// `tool_name` is required; `parameter_patterns` is an optional refinement.
pub fn match_tool_result(trigger: &ToolResultTrigger, context: &HookContext) -> BTreeSet<String> {
    let mut matched = BTreeSet::new();
    if !trigger.is_active() {
        return matched;
    }

    for result in &context.tool_results {
        if result.tool_name.is_empty() || !trigger.tool_name.contains(&result.tool_name) {
            continue;
        }

        if trigger.parameter_patterns.is_empty() {
            matched.insert(result.tool_name.clone());
            continue;
        }

        let mut param_matched = BTreeSet::new();
        for (param_name, patterns) in &trigger.parameter_patterns {
            let Some(value) = result.parameters.get(param_name) else {
                continue;
            };
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            if !text.is_empty() {
                param_matched.extend(match_regex(&text, patterns));
            }
        }

        if !param_matched.is_empty() {
            matched.insert(result.tool_name.clone());
            matched.extend(param_matched);
        }
    }

    matched
}

/// Match todo completion state.
pub fn match_todo_state(trigger: &TodoStateTrigger, context: &HookContext) -> BTreeSet<String> {
    let mut matched = BTreeSet::new();

    if trigger.any_completed && context.todo_state.any_completed {
        matched.insert("any_completed".to_string());
    }
    if trigger.all_completed && context.todo_state.all_completed {
        matched.insert("all_completed".to_string());
    }

    matched
}

/// Match skill invocation.
pub fn match_skill_invoked(
    trigger: &SkillInvokedTrigger,
    context: &HookContext,
) -> BTreeSet<String> {
    if trigger.is_active() && context.invoked_skills.contains(&trigger.skill) {
        BTreeSet::from([trigger.skill.clone()])
    } else {
        BTreeSet::new()
    }
}

/// Match when required patterns are missing from the last response.
///
/// Fires only when EVERY required literal substring is absent; a single
/// present pattern suppresses the trigger entirely.
pub fn match_output_missing(
    trigger: &OutputMissingTrigger,
    context: &HookContext,
) -> BTreeSet<String> {
    if !trigger.is_active() {
        return BTreeSet::new();
    }

    let missing: BTreeSet<String> = trigger
        .required_patterns
        .iter()
        .filter(|pattern| !context.last_response.contains(pattern.as_str()))
        .cloned()
        .collect();

    if missing.len() == trigger.required_patterns.len() {
        missing
    } else {
        BTreeSet::new()
    }
}

/// Match changed files with named-capture support.
///
/// Path patterns are tried as regexes first; on compile failure the pattern
/// falls back to glob matching, which contributes evidence but no captures.
/// When content patterns are set, at least one path-matching file must also
/// content-match or the entire result is discarded. Same-named captures:
/// the last match wins.
pub fn match_files_changed(
    trigger: &FilesChangedTrigger,
    context: &HookContext,
) -> (BTreeSet<String>, BTreeMap<String, String>) {
    let mut matched = BTreeSet::new();
    let mut captures = BTreeMap::new();

    if !trigger.is_active() || context.changed_files.is_empty() {
        return (matched, captures);
    }

    let mut path_matched_files: Vec<&str> = Vec::new();

    for path in &context.changed_files {
        let mut file_hit = false;

        for pattern in trigger.path_patterns.iter() {
            match Regex::new(pattern) {
                Ok(re) => {
                    if let Some(found) = re.captures(path) {
                        matched.insert(pattern.clone());
                        file_hit = true;
                        for name in re.capture_names().flatten() {
                            if let Some(group) = found.name(name) {
                                captures.insert(name.to_string(), group.as_str().to_string());
                            }
                        }
                    }
                }
                Err(_) => {
                    if glob_match(pattern, path) {
                        matched.insert(pattern.clone());
                        file_hit = true;
                    }
                }
            }
        }

        if file_hit {
            path_matched_files.push(path);
        }
    }

    if !matched.is_empty() && !trigger.content_patterns.is_empty() {
        let mut content_matched = false;
        for path in &path_matched_files {
            let hits = match_file_content(
                Path::new(path),
                &trigger.content_patterns,
                CONTENT_MATCH_MAX_BYTES,
            );
            if !hits.is_empty() {
                matched.extend(hits);
                content_matched = true;
            }
        }
        // All-or-nothing when content patterns are present.
        if !content_matched {
            matched.clear();
            captures.clear();
        }
    }

    (matched, captures)
}

/// Glob fallback for path patterns that are not valid regexes. Patterns
/// containing `/` match the whole path; bare patterns match the file name.
fn glob_match(pattern: &str, path: &str) -> bool {
    let Ok(glob) = glob::Pattern::new(pattern) else {
        return false;
    };

    if pattern.contains('/') {
        glob.matches(path)
    } else {
        Path::new(path)
            .file_name()
            .is_some_and(|name| glob.matches(&name.to_string_lossy()))
    }
}

/// Match regex patterns against at most the first `max_bytes` of a file.
pub fn match_file_content(path: &Path, patterns: &PatternSet, max_bytes: usize) -> BTreeSet<String> {
    if patterns.is_empty() || !path.is_file() {
        return BTreeSet::new();
    }

    let Ok(file) = File::open(path) else {
        return BTreeSet::new();
    };

    let mut head = Vec::with_capacity(max_bytes.min(4096));
    if file.take(max_bytes as u64).read_to_end(&mut head).is_err() {
        return BTreeSet::new();
    }

    match_regex(&String::from_utf8_lossy(&head), patterns)
}

/// Match when a session state key exists. Requires `session_id` in context.
pub fn match_state_exists(
    trigger: &StateExistsTrigger,
    context: &HookContext,
    store: &dyn StateStore,
) -> Result<BTreeSet<String>, StateError> {
    if !trigger.is_active() || context.session_id.is_empty() {
        return Ok(BTreeSet::new());
    }

    if store.exists(&context.session_id, &trigger.key)? {
        Ok(BTreeSet::from([trigger.key.clone()]))
    } else {
        Ok(BTreeSet::new())
    }
}

/// Result of a matching trigger group: evidence plus named captures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupMatch {
    pub matched_patterns: BTreeSet<String>,
    pub captures: BTreeMap<String, String>,
}

/// Match one trigger group with AND semantics.
///
/// Returns evidence and captures if every active member matched, `None`
/// otherwise. A group with zero active members never matches.
pub fn match_group(
    group: &TriggerGroup,
    context: &HookContext,
    store: &dyn StateStore,
) -> Result<Option<GroupMatch>, StateError> {
    let mut result = GroupMatch::default();
    let mut active_count = 0;
    let mut matched_count = 0;

    if !group.patterns.is_empty() {
        active_count += 1;
        let matches = match_patterns(&group.patterns, context);
        if !matches.is_empty() {
            matched_count += 1;
            result.matched_patterns.extend(matches);
        }
    }

    if group.tool_result.is_active() {
        active_count += 1;
        let matches = match_tool_result(&group.tool_result, context);
        if !matches.is_empty() {
            matched_count += 1;
            result.matched_patterns.extend(matches);
        }
    }

    if group.todo_state.is_active() {
        active_count += 1;
        let matches = match_todo_state(&group.todo_state, context);
        if !matches.is_empty() {
            matched_count += 1;
            result.matched_patterns.extend(matches);
        }
    }

    if group.skill_invoked.is_active() {
        active_count += 1;
        let matches = match_skill_invoked(&group.skill_invoked, context);
        if !matches.is_empty() {
            matched_count += 1;
            result.matched_patterns.extend(matches);
        }
    }

    if group.output_missing.is_active() {
        active_count += 1;
        let matches = match_output_missing(&group.output_missing, context);
        if !matches.is_empty() {
            matched_count += 1;
            result.matched_patterns.extend(matches);
        }
    }

    if group.files_changed.is_active() {
        active_count += 1;
        let (matches, captures) = match_files_changed(&group.files_changed, context);
        if !matches.is_empty() {
            matched_count += 1;
            result.matched_patterns.extend(matches);
            result.captures.extend(captures);
        }
    }

    if group.state_exists.is_active() {
        active_count += 1;
        let matches = match_state_exists(&group.state_exists, context, store)?;
        if !matches.is_empty() {
            matched_count += 1;
            result.matched_patterns.extend(matches);
        }
    }

    // Zero active members never matches; otherwise all of them must.
    if active_count > 0 && matched_count == active_count {
        Ok(Some(result))
    } else {
        Ok(None)
    }
}

/// Match a trigger spec: the first matching group wins (OR, short-circuit).
/// A spec with zero groups never matches.
pub fn match_spec(
    spec: &TriggerSpec,
    context: &HookContext,
    store: &dyn StateStore,
) -> Result<Option<GroupMatch>, StateError> {
    for group in &spec.groups {
        if let Some(result) = match_group(group, context, store)? {
            return Ok(Some(result));
        }
    }
    Ok(None)
}
