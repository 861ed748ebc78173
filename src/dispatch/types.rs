//! Domain types for the declarative rule dispatch engine.
//!
//! Rules are loaded from external configuration, immutable once built, and
//! evaluated against a per-event context. All trigger and action variants are
//! closed enums so every consumer handles every case at compile time.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

/// Lifecycle events that can dispatch rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    UserPromptSubmit,
    Stop,
    SubagentStop,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::UserPromptSubmit => "UserPromptSubmit",
            HookEvent::Stop => "Stop",
            HookEvent::SubagentStop => "SubagentStop",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UserPromptSubmit" => Ok(HookEvent::UserPromptSubmit),
            "Stop" => Ok(HookEvent::Stop),
            "SubagentStop" => Ok(HookEvent::SubagentStop),
            other => Err(format!("unknown hook event: {other}")),
        }
    }
}

/// Rule priority. The derived ordering (`High < Medium < Low`) is the sort
/// order for match lists: high-priority matches come first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// Text-pattern fields a trigger group may configure.
///
/// Each field names both the context value it reads and the matching strategy
/// applied to it (see `matchers::field_matcher`). Unknown field names fail
/// rule parsing, which excludes only that rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternField {
    /// Whole-word match against the submitted prompt.
    Keywords,
    /// Whole-word match against the submitted prompt.
    Prompt,
    /// Regex match against the submitted prompt.
    IntentPatterns,
    /// Regex match against the subagent task description.
    DescriptionPatterns,
    /// Exact match against the subagent type.
    AgentTypes,
    /// Exact match against the subagent type.
    SubagentType,
    /// Regex match against the last response text.
    OutputPatterns,
}

/// A set of pattern strings.
///
/// Deserializes from either a single string or a list of strings, since rule
/// files commonly write one-element triggers without the brackets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternSet(pub BTreeSet<String>);

impl PatternSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.0.contains(pattern)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for PatternSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        PatternSet(iter.into_iter().map(Into::into).collect())
    }
}

impl<'de> Deserialize<'de> for PatternSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PatternSetVisitor;

        impl<'de> Visitor<'de> for PatternSetVisitor {
            type Value = PatternSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or a list of strings")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<PatternSet, E> {
                Ok(PatternSet(BTreeSet::from([value.to_string()])))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PatternSet, A::Error> {
                let mut set = BTreeSet::new();
                while let Some(value) = seq.next_element::<String>()? {
                    set.insert(value);
                }
                Ok(PatternSet(set))
            }
        }

        deserializer.deserialize_any(PatternSetVisitor)
    }
}

/// Trigger matching tool execution results.
///
/// Fires when any tool-use record names one of the configured tools. If
/// `parameter_patterns` is also set, a tool-name hit only counts when at least
/// one configured parameter regex-matches (a refinement, not a separate OR).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResultTrigger {
    #[serde(default)]
    pub tool_name: PatternSet,
    #[serde(default)]
    pub parameter_patterns: BTreeMap<String, PatternSet>,
}

impl ToolResultTrigger {
    pub fn is_active(&self) -> bool {
        !self.tool_name.is_empty()
    }
}

/// Trigger matching todo completion state across TodoWrite calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoStateTrigger {
    #[serde(default)]
    pub any_completed: bool,
    #[serde(default)]
    pub all_completed: bool,
}

impl TodoStateTrigger {
    pub fn is_active(&self) -> bool {
        self.any_completed || self.all_completed
    }
}

/// Trigger matching an invoked skill by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillInvokedTrigger {
    #[serde(default)]
    pub skill: String,
}

impl SkillInvokedTrigger {
    pub fn is_active(&self) -> bool {
        !self.skill.is_empty()
    }
}

/// Trigger that fires when required patterns are missing from output.
///
/// Inverted semantics for output validation: fires only when EVERY required
/// literal substring is absent from the last response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputMissingTrigger {
    #[serde(default)]
    pub required_patterns: PatternSet,
}

impl OutputMissingTrigger {
    pub fn is_active(&self) -> bool {
        !self.required_patterns.is_empty()
    }
}

/// Trigger matching changed file paths, optionally gated on file content.
///
/// Path patterns are tried as regexes first (named capture groups feed rule
/// captures); a pattern that fails to compile falls back to glob matching,
/// which never produces captures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilesChangedTrigger {
    #[serde(default)]
    pub path_patterns: PatternSet,
    #[serde(default)]
    pub content_patterns: PatternSet,
}

impl FilesChangedTrigger {
    pub fn is_active(&self) -> bool {
        !self.path_patterns.is_empty() || !self.content_patterns.is_empty()
    }
}

/// Trigger that fires when a session state key exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateExistsTrigger {
    #[serde(default)]
    pub key: String,
}

impl StateExistsTrigger {
    pub fn is_active(&self) -> bool {
        !self.key.is_empty()
    }
}

/// A bundle of triggers that must ALL match (AND semantics).
///
/// A group with zero active members never matches, which guards against
/// accidental always-true rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerGroup {
    /// Text-pattern fields; the whole map counts as one group member.
    #[serde(flatten)]
    pub patterns: BTreeMap<PatternField, PatternSet>,
    #[serde(default)]
    pub tool_result: ToolResultTrigger,
    #[serde(default)]
    pub todo_state: TodoStateTrigger,
    #[serde(default)]
    pub skill_invoked: SkillInvokedTrigger,
    #[serde(default)]
    pub output_missing: OutputMissingTrigger,
    #[serde(default)]
    pub files_changed: FilesChangedTrigger,
    #[serde(default)]
    pub state_exists: StateExistsTrigger,
}

impl TriggerGroup {
    /// Whether any member of this group holds configuration.
    pub fn is_configured(&self) -> bool {
        !self.patterns.is_empty()
            || self.tool_result.is_active()
            || self.todo_state.is_active()
            || self.skill_invoked.is_active()
            || self.output_missing.is_active()
            || self.files_changed.is_active()
            || self.state_exists.is_active()
    }
}

/// Ordered list of trigger groups with OR-across-groups semantics.
///
/// Groups are evaluated in declared order with short-circuit on the first
/// match; an empty list never matches. Rule files may also declare trigger
/// fields directly on the spec ("flat" form); any non-empty flat
/// configuration is wrapped into exactly one implicit group at construction
/// time, so evaluation only ever sees groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "TriggerSpecConfig")]
pub struct TriggerSpec {
    pub groups: Vec<TriggerGroup>,
}

impl TriggerSpec {
    pub fn new(groups: Vec<TriggerGroup>) -> Self {
        TriggerSpec { groups }
    }
}

impl From<TriggerGroup> for TriggerSpec {
    fn from(group: TriggerGroup) -> Self {
        TriggerSpec {
            groups: if group.is_configured() {
                vec![group]
            } else {
                Vec::new()
            },
        }
    }
}

/// Wire form of [`TriggerSpec`]: explicit `groups` plus flat compatibility
/// fields collected into the implicit group.
#[derive(Deserialize)]
struct TriggerSpecConfig {
    #[serde(default)]
    groups: Vec<TriggerGroup>,
    #[serde(flatten)]
    flat: TriggerGroup,
}

impl From<TriggerSpecConfig> for TriggerSpec {
    fn from(config: TriggerSpecConfig) -> Self {
        if !config.groups.is_empty() {
            TriggerSpec {
                groups: config.groups,
            }
        } else {
            TriggerSpec::from(config.flat)
        }
    }
}

/// The effect a matching rule produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Suggest invoking a skill, optionally with a reason.
    SuggestSkill {
        skill: String,
        #[serde(default)]
        reason: String,
    },
    /// Surface a gentle reminder.
    Remind { message: String },
    /// Block subagent completion with an error reason.
    Block { reason: String },
    /// Inject context text into the prompt. `{state.KEY}` placeholders are
    /// resolved against the session state store at format time.
    InjectContext { context: String },
    /// Set a state key from a captured value (`value_from` is a
    /// `captured.<name>` reference). Refuses to overwrite an existing value.
    SetState { key: String, value_from: String },
    /// Clear a state key. Idempotent.
    ClearState { key: String },
}

impl Action {
    /// The action's wire tag, for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SuggestSkill { .. } => "suggest_skill",
            Action::Remind { .. } => "remind",
            Action::Block { .. } => "block",
            Action::InjectContext { .. } => "inject_context",
            Action::SetState { .. } => "set_state",
            Action::ClearState { .. } => "clear_state",
        }
    }
}

/// Complete configuration for one dispatch rule.
///
/// Rules are keyed by hook event, so the same action can be triggered by
/// different hooks with different criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub priority: Priority,
    pub action: Action,
    pub triggers: HashMap<HookEvent, TriggerSpec>,
}

/// Loaded rules in deterministic (name) order.
pub type RuleSet = Vec<Rule>;

/// Result of matching: which rule fired, with evidence and captures.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub rule_name: String,
    pub priority: Priority,
    pub action: Action,
    /// The configured pattern strings that matched.
    pub matched_patterns: BTreeSet<String>,
    /// Named regex captures from the winning group.
    pub captures: BTreeMap<String, String>,
}
