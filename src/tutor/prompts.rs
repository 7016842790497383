//! Prompt construction and the canned degraded-reply table (§4.T steps 5–6).

use crate::tutor::phase::Phase;
use crate::tutor::Message;

pub fn system_prompt(expected_concepts: &[String]) -> String {
    format!(
        "You are a Socratic programming tutor. You never output a complete \
         solution. You answer primarily with guiding questions that help the \
         student discover the answer themselves. You anchor every answer in \
         the provided course material context below; you do not invent \
         facts not supported by it. You adapt your tone to the student's \
         frustration and understanding levels given to you. The student's \
         expected concepts for this activity are: {}.",
        if expected_concepts.is_empty() {
            "none specified".to_string()
        } else {
            expected_concepts.join(", ")
        }
    )
}

pub struct UserPromptInput<'a> {
    pub phase: Phase,
    pub frustration: f32,
    pub understanding: f32,
    pub hint_count_in_phase: u32,
    pub recent_history: &'a [Message],
    pub current_code: Option<&'a str>,
    pub rag_context: &'a [String],
    pub student_message: &'a str,
}

pub fn user_prompt(input: &UserPromptInput) -> String {
    let mut out = String::new();
    out.push_str(&format!("Current phase: {:?}\n", input.phase));
    out.push_str(&format!(
        "Affect: frustration={:.2}, understanding={:.2}, hints_this_phase={}\n",
        input.frustration, input.understanding, input.hint_count_in_phase
    ));

    out.push_str("Recent conversation:\n");
    for message in input.recent_history {
        out.push_str(&format!("- {:?}: {}\n", message.sender, truncate(&message.content, 400)));
    }

    if let Some(code) = input.current_code {
        out.push_str("Current code:\n");
        out.push_str(&truncate(code, 1200));
        out.push('\n');
    }

    if !input.rag_context.is_empty() {
        out.push_str("Relevant course material:\n");
        for (i, chunk) in input.rag_context.iter().enumerate() {
            out.push_str(&format!("[{i}] {}\n", truncate(chunk, 600)));
        }
    }

    out.push_str(&format!("Student says: {}\n", input.student_message));
    out.push_str("Ask a guiding question. Do not give the answer.\n");
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}

/// Static per-phase fallback used when the gateway exhausts retries or the
/// model output fails JSON/contract checks for a structured variant; the
/// tutor never surfaces the upstream failure to the student (§4.T step 6).
pub fn canned_fallback(phase: Phase) -> &'static str {
    match phase {
        Phase::Exploration => "Before we dive in, can you describe the problem in your own words?",
        Phase::Decomposition => "What are the smaller pieces this problem breaks down into?",
        Phase::Planning => "Which of those pieces would you tackle first, and why?",
        Phase::Implementation => "What's the next small piece of code you'd write to move this forward?",
        Phase::Debugging => "What does the error message tell you about where things went wrong?",
        Phase::Validation => "How would you check that this handles the edge cases?",
        Phase::Reflection => "Looking back, what was the key idea that unlocked this for you?",
    }
}

const HINT_VERBS: &[&str] = &["try", "consider", "think about", "look at", "check", "recall"];

/// Classifies a reply as a "hint" when it contains an imperative opening
/// with one of a small configured set of hinting verbs (§4.T step 8).
pub fn is_hint(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    HINT_VERBS.iter().any(|verb| lower.contains(verb))
}

pub const ESCALATION_SUFFIX: &str =
    "It might help to bring this question to a human tutor for a closer look.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_table_has_an_entry_per_phase() {
        for phase in [
            Phase::Exploration,
            Phase::Decomposition,
            Phase::Planning,
            Phase::Implementation,
            Phase::Debugging,
            Phase::Validation,
            Phase::Reflection,
        ] {
            assert!(!canned_fallback(phase).is_empty());
        }
    }

    #[test]
    fn hint_detection_matches_configured_verbs() {
        assert!(is_hint("Try thinking about the base case."));
        assert!(!is_hint("What do you think happens when n is zero?"));
    }
}
