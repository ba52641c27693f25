// checkgraph-core/src/model/event.rs
// ============================================================================
// Module: Event Triggers
// Description: Enumerated inbound event kinds used for dependency pruning,
//              `on` filtering, and routing overrides (`goto_event`).
// Purpose: Give the planner and routing engine a closed, matchable event set.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

/// The inbound event a run is evaluating against.
///
/// Config authors reference these by their serialized name (e.g. `pr_opened`)
/// in `CheckConfig::on` and `goto_event`. An unrecognized name in a config
/// document is a parse-time error in `checkgraph-config`, not a core concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventTrigger {
    /// A pull request was opened.
    PrOpened,
    /// A pull request was updated (new commits pushed).
    PrUpdated,
    /// An issue was opened.
    IssueOpened,
    /// A comment was left on an issue or pull request.
    IssueComment,
    /// Manually invoked (CLI, API call with no inbound webhook). The default
    /// when a run carries no inbound webhook (spec §4.4 `goto_event`'s "no
    /// override" case; also used by test scaffolding that doesn't care about
    /// event-based pruning).
    #[default]
    Manual,
    /// Invoked on a schedule (cron-style trigger).
    Schedule,
}

impl EventTrigger {
    /// Returns the event's canonical snake_case name, matching the serde form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrOpened => "pr_opened",
            Self::PrUpdated => "pr_updated",
            Self::IssueOpened => "issue_opened",
            Self::IssueComment => "issue_comment",
            Self::Manual => "manual",
            Self::Schedule => "schedule",
        }
    }

    /// Returns `true` for events belonging to the "PR-class" family, used by
    /// the `goto_event` context-elevation rule in spec §4.4 (issue → PR diff
    /// elevation only applies when routing *into* a PR-class event).
    #[must_use]
    pub const fn is_pr_class(self) -> bool {
        matches!(self, Self::PrOpened | Self::PrUpdated)
    }
}

impl std::fmt::Display for EventTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
