//! The answer-leakage guard (§4.T step 7, invariant in §4.T / §8).
//!
//! Enforced after the model call, independent of whether the model obeyed
//! its system prompt — per §9's "the guard is enforced by the core after
//! the fact; it does not depend on the model complying with instructions."

use regex::Regex;

const FENCE_MARKER: &str = "[a longer code example was withheld to keep you working through it]";

/// Strips any fenced code block over `single_fence_hard_cap` lines outright,
/// then tracks `budget_remaining` (the session's cumulative code-fence line
/// budget) and strips any further fence once it is exhausted. Returns the
/// processed text and the number of fence lines actually emitted this call
/// (to be subtracted from the caller's running budget).
pub fn apply_leakage_guard(
    text: &str,
    single_fence_hard_cap: usize,
    budget_remaining: usize,
) -> (String, usize) {
    let fence_re = Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap();

    let mut output = String::new();
    let mut last_end = 0;
    let mut emitted_lines = 0usize;
    let mut remaining = budget_remaining;

    for cap in fence_re.captures_iter(text) {
        let whole = cap.get(0).unwrap();
        let body = cap.get(1).unwrap().as_str();
        let line_count = body.lines().filter(|l| !l.trim().is_empty()).count();

        output.push_str(&text[last_end..whole.start()]);

        if line_count > single_fence_hard_cap || remaining == 0 {
            output.push_str(FENCE_MARKER);
        } else if line_count > remaining {
            output.push_str(FENCE_MARKER);
            remaining = 0;
        } else {
            output.push_str(whole.as_str());
            remaining -= line_count;
            emitted_lines += line_count;
        }

        last_end = whole.end();
    }
    output.push_str(&text[last_end..]);

    (output, emitted_lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_fence_within_budget_passes_through() {
        let text = "Try this:\n```python\nx = 1\ny = 2\n```\nDoes that help?";
        let (out, used) = apply_leakage_guard(text, 3, 10);
        assert!(out.contains("```python"));
        assert_eq!(used, 2);
    }

    #[test]
    fn fence_over_hard_cap_is_stripped() {
        let body = (0..20).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let text = format!("Here:\n```python\n{body}\n```\ndone");
        let (out, used) = apply_leakage_guard(&text, 3, 10);
        assert!(!out.contains("line0"));
        assert!(out.contains("withheld"));
        assert_eq!(used, 0);
    }

    #[test]
    fn exhausted_budget_strips_all_further_fences() {
        let text = "```python\nx = 1\n```";
        let (out, used) = apply_leakage_guard(text, 3, 0);
        assert!(out.contains("withheld"));
        assert_eq!(used, 0);
    }

    #[test]
    fn cumulative_budget_is_enforced_across_calls() {
        let mut remaining = 4usize;
        let (_, used1) = apply_leakage_guard("```py\na\nb\nc\n```", 10, remaining);
        remaining -= used1;
        assert_eq!(remaining, 1);

        let (out2, used2) = apply_leakage_guard("```py\nd\ne\n```", 10, remaining);
        assert!(out2.contains("withheld"));
        assert_eq!(used2, 0);
    }
}
