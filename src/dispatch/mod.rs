//! Declarative rule dispatch for agent lifecycle hooks.
//!
//! Given a hook event and its raw JSON payload, this module normalizes the
//! payload into a fact context, evaluates the configured rules with
//! AND-within-group / OR-across-groups trigger logic, and produces the
//! event-specific response plus optional session-state side effects.

pub mod actions;
pub mod context;
pub mod dispatcher;
pub mod matchers;
pub mod types;

pub use context::{extract_context, HookContext, TodoState, ToolResult};
pub use dispatcher::{Dispatcher, HookResponse};
pub use types::{
    Action, HookEvent, Match, Priority, Rule, RuleSet, TriggerGroup, TriggerSpec,
};
