//! Affect tracking: frustration and understanding updates (§4.T step 3).
//!
//! The frustration-marker set is configuration, not a contract (§9); these
//! are the fixed defaults, documented as an Open Question decision in
//! DESIGN.md.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectConfig {
    pub frustration_markers: Vec<String>,
    pub progress_markers: Vec<String>,
    pub frustration_step_up: f32,
    pub frustration_decay: f32,
    pub understanding_step_up: f32,
    pub understanding_decay: f32,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            frustration_markers: vec![
                "i don't get it".into(),
                "i dont get it".into(),
                "this makes no sense".into(),
                "i give up".into(),
                "still broken".into(),
                "still doesn't work".into(),
                "still wrong".into(),
                "ugh".into(),
                "damn".into(),
                "wtf".into(),
                "stupid".into(),
            ],
            progress_markers: vec![
                "i think i understand".into(),
                "that makes sense".into(),
                "let me try".into(),
                "why does".into(),
                "what if".into(),
                "how does".into(),
            ],
            frustration_step_up: 0.1,
            frustration_decay: 0.05,
            understanding_step_up: 0.1,
            understanding_decay: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AffectInput<'a> {
    pub message: &'a str,
    pub has_new_code_lines: bool,
    pub is_clarifying_question: bool,
    pub is_reflection: bool,
    pub repeats_prior_error: bool,
    pub first_mention_of_expected_concept: bool,
    pub restates_resolved_confusion: bool,
}

/// Applies the affect-update rules for one `send` call, clipping both
/// values to `[0, 1]` (§3's CognitiveState invariant).
pub fn update_affect(
    config: &AffectConfig,
    frustration: f32,
    understanding: f32,
    input: AffectInput,
) -> (f32, f32) {
    let mut frustration = frustration;
    let mut understanding = understanding;

    let lower = input.message.to_lowercase();
    let matches_frustration_marker = config.frustration_markers.iter().any(|m| lower.contains(m.as_str()))
        || input.repeats_prior_error;
    if matches_frustration_marker {
        frustration += config.frustration_step_up;
    }

    let shows_progress =
        input.has_new_code_lines || input.is_clarifying_question || input.is_reflection;
    if shows_progress {
        frustration -= config.frustration_decay;
    }

    if input.first_mention_of_expected_concept {
        understanding += config.understanding_step_up;
    }
    if input.restates_resolved_confusion {
        understanding -= config.understanding_decay;
    }

    (frustration.clamp(0.0, 1.0), understanding.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input(message: &str) -> AffectInput {
        AffectInput {
            message,
            has_new_code_lines: false,
            is_clarifying_question: false,
            is_reflection: false,
            repeats_prior_error: false,
            first_mention_of_expected_concept: false,
            restates_resolved_confusion: false,
        }
    }

    #[test]
    fn frustration_marker_increases_frustration() {
        let config = AffectConfig::default();
        let (f, _) = update_affect(&config, 0.0, 0.5, base_input("i give up on this"));
        assert!((f - 0.1).abs() < 1e-6);
    }

    #[test]
    fn progress_decays_frustration() {
        let config = AffectConfig::default();
        let mut input = base_input("here's a new attempt");
        input.has_new_code_lines = true;
        let (f, _) = update_affect(&config, 0.5, 0.5, input);
        assert!((f - 0.45).abs() < 1e-6);
    }

    #[test]
    fn values_never_escape_zero_one() {
        let config = AffectConfig::default();
        let (f, u) = update_affect(&config, 0.0, 1.0, base_input("whatever"));
        assert!(f >= 0.0 && f <= 1.0);
        assert!(u >= 0.0 && u <= 1.0);

        let (f, _) = update_affect(&config, 1.0, 0.0, base_input("i give up, ugh"));
        assert_eq!(f, 1.0);
    }

    #[test]
    fn first_concept_mention_raises_understanding() {
        let config = AffectConfig::default();
        let mut input = base_input("recursion calls itself");
        input.first_mention_of_expected_concept = true;
        let (_, u) = update_affect(&config, 0.0, 0.5, input);
        assert!((u - 0.6).abs() < 1e-6);
    }
}
