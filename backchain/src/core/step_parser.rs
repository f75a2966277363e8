//! Forgiving parser for backward-planning oracle responses.
//!
//! The oracle is asked for three numbered lines per step:
//!
//! ```text
//! 1. Immediate prerequisite: <what must be true before the goal>
//! 2. Tools needed: <tool>, <tool>
//! 3. Prerequisites: <condition>, <condition>
//! ```
//!
//! Each line is classified on its own into a [`LineToken`]; a small state machine
//! then folds the token stream into steps. Anything that does not fit (prose,
//! headings, other numbered items) is ignored.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Step;

static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(.*)$").expect("numbered line regex"));

const PREREQUISITE: &str = "prerequisite";
const TOOL: &str = "tool";

/// Classification of one trimmed response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineToken {
    /// Item `1.` mentioning a prerequisite: starts a step with this description.
    NewStep(String),
    /// Item `1.` without the keyword; starts a step only right after a marker.
    FirstItem(String),
    /// Un-numbered line mentioning a prerequisite (e.g. a heading).
    Marker,
    /// Numbered item listing tools.
    Tools(Vec<String>),
    /// Numbered item listing prerequisites.
    Prerequisites(Vec<String>),
    Other,
}

pub fn classify_line(line: &str) -> LineToken {
    let line = line.trim();
    if line.is_empty() {
        return LineToken::Other;
    }
    let lower = line.to_lowercase();

    let Some(caps) = NUMBERED_RE.captures(line) else {
        if lower.contains(PREREQUISITE) {
            return LineToken::Marker;
        }
        return LineToken::Other;
    };
    let first_item = caps[1].parse::<u64>().is_ok_and(|n| n == 1);
    let rest = caps[2].trim();

    if first_item {
        if lower.contains(PREREQUISITE) {
            LineToken::NewStep(rest.to_string())
        } else {
            LineToken::FirstItem(rest.to_string())
        }
    } else {
        // The label before `:` wins over keywords that appear in the list itself.
        let label = lower.split_once(':').map_or(lower.as_str(), |(label, _)| label);
        match list_kind(label).or_else(|| list_kind(&lower)) {
            Some(ListKind::Tools) => LineToken::Tools(split_list(line)),
            Some(ListKind::Prerequisites) => LineToken::Prerequisites(split_list(line)),
            None => LineToken::Other,
        }
    }
}

enum ListKind {
    Tools,
    Prerequisites,
}

fn list_kind(text: &str) -> Option<ListKind> {
    if text.contains(TOOL) {
        Some(ListKind::Tools)
    } else if text.contains(PREREQUISITE) {
        Some(ListKind::Prerequisites)
    } else {
        None
    }
}

/// Text after the first `:` (or the first `.`), split on `,` and trimmed.
fn split_list(line: &str) -> Vec<String> {
    let tail = match line.split_once(':') {
        Some((_, tail)) => tail,
        None => line.split_once('.').map_or("", |(_, tail)| tail),
    };
    tail.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse every well-formed step out of `text`, in order of appearance.
///
/// Never fails: unparsable input yields an empty list.
pub fn parse_backward_steps(text: &str) -> Vec<Step> {
    let mut steps = Vec::new();
    let mut current: Option<Step> = None;
    let mut marker_armed = false;

    for token in text.lines().map(classify_line) {
        match token {
            LineToken::NewStep(description) => {
                flush(&mut steps, current.replace(Step::new(description)));
                marker_armed = false;
            }
            LineToken::FirstItem(description) if marker_armed => {
                flush(&mut steps, current.replace(Step::new(description)));
                marker_armed = false;
            }
            LineToken::Marker => marker_armed = true,
            LineToken::Tools(tools) => {
                if let Some(step) = current.as_mut() {
                    step.tools_needed.extend(tools);
                }
            }
            LineToken::Prerequisites(prerequisites) => {
                if let Some(step) = current.as_mut() {
                    step.prerequisites.extend(prerequisites);
                }
            }
            LineToken::FirstItem(_) | LineToken::Other => {}
        }
    }
    flush(&mut steps, current);

    steps
}

fn flush(steps: &mut Vec<Step>, step: Option<Step>) {
    if let Some(step) = step.filter(|s| !s.description.trim().is_empty()) {
        steps.push(step);
    }
}

/// True when the last step's prerequisites point back at the starting point.
pub fn has_reached_initial_state(chain: &[Step]) -> bool {
    chain.last().is_some_and(|step| {
        step.prerequisites.iter().any(|prerequisite| {
            let lower = prerequisite.to_lowercase();
            lower.contains("initial state") || lower.contains("current state")
        })
    })
}
