//! Cognitive phases and the textual predicates that drive transitions
//! between them (§4.T phase table, §9 open question).
//!
//! §9 flags that the exact predicates are underspecified by the source and
//! left to the implementer; these are the fixed regex/keyword rules,
//! documented as an Open Question decision in DESIGN.md rather than guessed
//! silently.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Exploration,
    Decomposition,
    Planning,
    Implementation,
    Debugging,
    Validation,
    Reflection,
}

impl Phase {
    fn previous(self) -> Phase {
        match self {
            Phase::Exploration => Phase::Exploration,
            Phase::Decomposition => Phase::Exploration,
            Phase::Planning => Phase::Decomposition,
            Phase::Implementation => Phase::Planning,
            Phase::Debugging => Phase::Implementation,
            Phase::Validation => Phase::Implementation,
            Phase::Reflection => Phase::Validation,
        }
    }
}

/// Signals the caller attaches to a `send` call that the textual predicates
/// alone cannot observe (whether tests were run, whether they passed).
#[derive(Debug, Clone, Default)]
pub struct TransitionSignals {
    pub ran_tests: bool,
    pub tests_passed: bool,
    pub requested_go_back: bool,
}

/// Evaluates the phase table in §4.T against the student's message, the
/// current code (if any), the error context (if any), and the signals.
/// Ties resolve toward the later phase in the table, per §4.T.
pub fn next_phase(
    current: Phase,
    message: &str,
    has_new_code: bool,
    error_context: Option<&str>,
    signals: &TransitionSignals,
) -> Phase {
    if signals.requested_go_back {
        return current.previous();
    }

    let lower = message.to_lowercase();

    match current {
        Phase::Exploration => {
            if restates_problem(&lower) || lists_subgoals(&lower) {
                Phase::Decomposition
            } else {
                current
            }
        }
        Phase::Decomposition => {
            if proposes_ordering(&lower) {
                Phase::Planning
            } else {
                current
            }
        }
        Phase::Planning => {
            if has_new_code {
                Phase::Implementation
            } else {
                current
            }
        }
        Phase::Implementation => {
            if error_context.is_some() {
                Phase::Debugging
            } else if signals.ran_tests && signals.tests_passed {
                Phase::Validation
            } else {
                current
            }
        }
        Phase::Debugging => {
            if has_new_code && error_context.is_none() {
                Phase::Implementation
            } else if signals.ran_tests && signals.tests_passed {
                Phase::Validation
            } else {
                current
            }
        }
        Phase::Validation => {
            if signals.ran_tests && signals.tests_passed {
                Phase::Reflection
            } else {
                current
            }
        }
        Phase::Reflection => current,
    }
}

fn restates_problem(lower: &str) -> bool {
    const MARKERS: &[&str] = &[
        "so basically",
        "in other words",
        "if i understand",
        "what i need to do is",
        "let me restate",
        "so the problem is",
    ];
    MARKERS.iter().any(|m| lower.contains(m))
}

fn lists_subgoals(lower: &str) -> bool {
    let numbered = lower.lines().filter(|l| {
        let trimmed = l.trim_start();
        trimmed.starts_with(|c: char| c.is_ascii_digit()) && trimmed.contains('.')
    }).count();
    let bulleted = lower.lines().filter(|l| {
        let trimmed = l.trim_start();
        trimmed.starts_with('-') || trimmed.starts_with('*')
    }).count();
    numbered >= 2 || bulleted >= 2
}

fn proposes_ordering(lower: &str) -> bool {
    const MARKERS: &[&str] = &["first", "then", "after that", "next", "finally", "before that"];
    MARKERS.iter().filter(|m| lower.contains(**m)).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exploration_to_decomposition_on_restate() {
        let signals = TransitionSignals::default();
        let p = next_phase(
            Phase::Exploration,
            "So basically I need to iterate the list and sum values.",
            false,
            None,
            &signals,
        );
        assert_eq!(p, Phase::Decomposition);
    }

    #[test]
    fn planning_to_implementation_on_code() {
        let signals = TransitionSignals::default();
        let p = next_phase(Phase::Planning, "here's my attempt", true, None, &signals);
        assert_eq!(p, Phase::Implementation);
    }

    #[test]
    fn implementation_to_debugging_on_error() {
        let signals = TransitionSignals::default();
        let p = next_phase(
            Phase::Implementation,
            "it crashed",
            true,
            Some("IndentationError"),
            &signals,
        );
        assert_eq!(p, Phase::Debugging);
    }

    #[test]
    fn debugging_back_to_implementation_without_new_error() {
        let signals = TransitionSignals::default();
        let p = next_phase(Phase::Debugging, "fixed the indentation", true, None, &signals);
        assert_eq!(p, Phase::Implementation);
    }

    #[test]
    fn validation_requires_passing_tests() {
        let mut signals = TransitionSignals::default();
        signals.ran_tests = true;
        signals.tests_passed = false;
        let p = next_phase(Phase::Implementation, "ran the suite", false, None, &signals);
        assert_eq!(p, Phase::Implementation);

        signals.tests_passed = true;
        let p = next_phase(Phase::Implementation, "ran the suite", false, None, &signals);
        assert_eq!(p, Phase::Validation);
    }

    #[test]
    fn explicit_go_back_wins_over_everything() {
        let mut signals = TransitionSignals::default();
        signals.requested_go_back = true;
        let p = next_phase(Phase::Debugging, "go back please", true, Some("err"), &signals);
        assert_eq!(p, Phase::Implementation);
    }
}
