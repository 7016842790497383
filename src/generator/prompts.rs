//! Generation prompt construction (§4.J "Generation contract").

use crate::generator::job::GenerationRequirements;

pub const SYSTEM_PROMPT: &str = "You are a domain professor designing programming \
exercises strictly from the course material you are given. You never invent \
facts, APIs, or concepts absent from that material. You output strict JSON \
and nothing else.";

const EXERCISE_SCHEMA: &str = r#"{
  "exercises": [
    {
      "title": "string",
      "description": "string",
      "difficulty": "EASY|MEDIUM|HARD",
      "mission": "markdown string",
      "starter_code": "string",
      "solution_code": "string",
      "concepts": ["string"],
      "learning_objectives": ["string"],
      "test_cases": [
        {"ordinal": 0, "description": "string", "input": "string", "expected_output": "string", "is_hidden": false, "timeout_ms": 2000}
      ],
      "estimated_minutes": 10
    }
  ]
}"#;

/// Builds the user prompt bundling requirements, RAG excerpts (already
/// deduplicated by chunk ordinal and concatenated by the caller), the
/// schema, and a strict-JSON instruction. `excerpt_block` may be halved by
/// the caller on retry after `ErrContract` (§4.J).
pub fn user_prompt(requirements: &GenerationRequirements, excerpt_block: &str, emphatic_json_only: bool) -> String {
    let (easy, medium, hard) = requirements.difficulty_mix;
    let mut out = format!(
        "Topic: {}\nLanguage: {}\nTarget concepts: {}\nRequired exercise count: {} (EASY={}, MEDIUM={}, HARD={})\nEstimated total time: {} minutes\n\n",
        requirements.topic,
        requirements.language,
        requirements.concepts.join(", "),
        requirements.target_count,
        easy,
        medium,
        hard,
        requirements.time_estimate_minutes,
    );

    out.push_str("Course material excerpts:\n");
    out.push_str(excerpt_block);
    out.push_str("\n\nEach exercise must match this JSON schema exactly:\n");
    out.push_str(EXERCISE_SCHEMA);
    out.push_str(&format!(
        "\n\nProduce exactly {} exercises with the difficulty mix above, built only from the excerpts. Output strict JSON, no prose.",
        requirements.target_count
    ));

    if emphatic_json_only {
        out.push_str("\n\nJSON ONLY. No markdown fences, no commentary, no prose before or after the object.");
    }

    out
}

/// Deduplicates retrieved chunks by global ordinal and concatenates them,
/// in retrieval order, into one excerpt block. `max_chunks` truncates for
/// the halved-context retry.
pub fn build_excerpt_block(chunks: &[(u32, String)], max_chunks: usize) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut out = String::new();
    let mut count = 0;

    for (ordinal, text) in chunks {
        if count >= max_chunks {
            break;
        }
        if !seen.insert(*ordinal) {
            continue;
        }
        out.push_str(&format!("[chunk {ordinal}] {text}\n"));
        count += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_block_dedups_by_ordinal() {
        let chunks = vec![
            (1, "a".to_string()),
            (1, "a-dup".to_string()),
            (2, "b".to_string()),
        ];
        let block = build_excerpt_block(&chunks, 10);
        assert_eq!(block.matches("[chunk").count(), 2);
    }

    #[test]
    fn excerpt_block_respects_max_chunks() {
        let chunks = vec![(1, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())];
        let block = build_excerpt_block(&chunks, 1);
        assert_eq!(block.matches("[chunk").count(), 1);
    }
}
