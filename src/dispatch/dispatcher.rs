//! End-to-end dispatch for one hook event.
//!
//! The dispatcher holds an injected rule set and state store, evaluates every
//! rule independently against the extracted context, and writes the
//! event-specific output. One misbehaving rule is logged and dropped without
//! affecting the rest; the host must never be left hanging on a bad rule.

use std::io::Write;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use super::actions::{
    execute_actions, format_stop_output, format_subagent_stop_output, format_user_prompt_output,
    matched_evidence, PromptEnvelope, SubagentEnvelope,
};
use super::context::{extract_context, HookContext};
use super::matchers::match_spec;
use super::types::{HookEvent, Match, Rule};
use crate::state::{StateError, StateStore};

/// What a dispatch pass hands back to the host: a structured envelope, an
/// optional text line, or nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum HookResponse {
    UserPrompt(PromptEnvelope),
    Stop(Option<String>),
    Subagent(Option<SubagentEnvelope>),
}

impl HookResponse {
    /// Serialize per the host contract: a JSON object for UserPromptSubmit
    /// (always, even when empty), an optional line for Stop, an optional
    /// JSON line for SubagentStop.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        match self {
            HookResponse::UserPrompt(envelope) => {
                serde_json::to_writer(&mut *out, envelope)?;
            }
            HookResponse::Stop(Some(text)) => {
                writeln!(out, "{text}")?;
            }
            HookResponse::Subagent(Some(envelope)) => {
                serde_json::to_writer(&mut *out, envelope)?;
                writeln!(out)?;
            }
            HookResponse::Stop(None) | HookResponse::Subagent(None) => {}
        }
        Ok(())
    }
}

/// Rule dispatch engine for one event at a time.
pub struct Dispatcher<'a> {
    rules: &'a [Rule],
    store: &'a dyn StateStore,
}

impl<'a> Dispatcher<'a> {
    pub fn new(rules: &'a [Rule], store: &'a dyn StateStore) -> Self {
        Dispatcher { rules, store }
    }

    /// Evaluate every configured rule against the context and return the
    /// matches sorted by priority (high first, stable among equals).
    pub fn analyze(&self, hook_event: HookEvent, context: &HookContext) -> Vec<Match> {
        let mut matches: Vec<Match> = Vec::new();

        for rule in self.rules {
            match self.match_rule(rule, hook_event, context) {
                Ok(Some(m)) => matches.push(m),
                Ok(None) => {}
                Err(e) => warn!("Error matching rule '{}': {}", rule.name, e),
            }
        }

        matches.sort_by_key(|m| m.priority);
        matches
    }

    fn match_rule(
        &self,
        rule: &Rule,
        hook_event: HookEvent,
        context: &HookContext,
    ) -> Result<Option<Match>, StateError> {
        let Some(spec) = rule.triggers.get(&hook_event) else {
            return Ok(None);
        };

        let Some(group_match) = match_spec(spec, context, self.store)? else {
            return Ok(None);
        };

        Ok(Some(Match {
            rule_name: rule.name.clone(),
            priority: rule.priority,
            action: rule.action.clone(),
            matched_patterns: group_match.matched_patterns,
            captures: group_match.captures,
        }))
    }

    /// Build the event-specific response for an already-analyzed match list.
    pub fn respond(
        &self,
        hook_event: HookEvent,
        matches: &[Match],
        context: &HookContext,
    ) -> HookResponse {
        match hook_event {
            HookEvent::UserPromptSubmit => {
                HookResponse::UserPrompt(format_user_prompt_output(matches, context, self.store))
            }
            HookEvent::Stop => HookResponse::Stop(format_stop_output(matches)),
            HookEvent::SubagentStop => {
                HookResponse::Subagent(format_subagent_stop_output(matches))
            }
        }
    }

    /// Dispatch one event end to end: extract context, match rules, write the
    /// response, then apply state side effects.
    ///
    /// The response is written and flushed before any state action runs, so
    /// output never depends on a write from the same pass. State write
    /// failures are the one error class that propagates.
    pub fn dispatch(&self, hook_event: HookEvent, data: &Value, out: &mut dyn Write) -> Result<()> {
        let context = extract_context(hook_event, data);
        let matches = self.analyze(hook_event, &context);
        debug!(
            "Found {} matches for {} (evidence: {:?})",
            matches.len(),
            hook_event,
            matched_evidence(&matches)
        );

        let response = self.respond(hook_event, &matches, &context);
        response.write_to(out)?;
        out.flush()?;

        execute_actions(&matches, &context, self.store)?;
        Ok(())
    }
}
