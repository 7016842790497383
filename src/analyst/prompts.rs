//! Auditor prompt construction (§4.A step 3-4).

use crate::tutor::{Message, Sender};

pub const SYSTEM_PROMPT: &str = "You are an educational auditor. You read a \
student's interaction trace with a tutoring system and produce a grounded \
diagnosis of why they are struggling. You quote the trace verbatim as \
evidence; you never invent a quote. You output strict JSON and nothing else.";

pub const AUDIT_SCHEMA: &str = r#"{
  "diagnosis_category": "SYNTAX|LOGIC|CONCEPTUAL|COGNITIVE_OVERLOAD|BEHAVIORAL",
  "diagnosis_detail": "string",
  "evidence": ["short quote copied verbatim from the trace", "..."],
  "intervention": "string",
  "confidence": 0.0
}"#;

/// Light derived metrics over the pulled window (§4.A step 2).
#[derive(Debug, Clone)]
pub struct DerivedMetrics {
    pub total_interactions: usize,
    pub error_count: usize,
    pub hint_bearing_count: usize,
    pub phase_counts: Vec<(String, usize)>,
    pub frustration_curve: Vec<f32>,
    pub understanding_curve: Vec<f32>,
}

pub fn compute_metrics(messages: &[Message]) -> DerivedMetrics {
    let total_interactions = messages.len();
    let error_count = messages.iter().filter(|m| m.error_context.is_some()).count();
    let hint_bearing_count = messages
        .iter()
        .filter(|m| m.sender == Sender::Tutor && crate::tutor::prompts::is_hint(&m.content))
        .count();

    let mut phase_counts: Vec<(String, usize)> = Vec::new();
    for m in messages {
        let tag = format!("{:?}", m.phase).to_uppercase();
        match phase_counts.iter_mut().find(|(p, _)| p == &tag) {
            Some((_, count)) => *count += 1,
            None => phase_counts.push((tag, 1)),
        }
    }

    let downsample = |values: Vec<f32>, buckets: usize| -> Vec<f32> {
        if values.is_empty() || buckets == 0 {
            return Vec::new();
        }
        let chunk_size = (values.len() + buckets - 1) / buckets;
        values
            .chunks(chunk_size.max(1))
            .map(|c| c.iter().sum::<f32>() / c.len() as f32)
            .collect()
    };

    let frustration_curve = downsample(messages.iter().map(|m| m.frustration).collect(), 10);
    let understanding_curve = downsample(messages.iter().map(|m| m.understanding).collect(), 10);

    DerivedMetrics {
        total_interactions,
        error_count,
        hint_bearing_count,
        phase_counts,
        frustration_curve,
        understanding_curve,
    }
}

/// Builds the compact trace summary block: timestamped lines for the last
/// `summary_messages`, plus the metrics block (§4.A step 3).
pub fn summarize_trace(messages: &[Message], metrics: &DerivedMetrics, summary_messages: usize) -> String {
    let mut out = String::new();

    out.push_str("Recent messages:\n");
    let start = messages.len().saturating_sub(summary_messages);
    for m in &messages[start..] {
        let who = match m.sender {
            Sender::Student => "STUDENT",
            Sender::Tutor => "TUTOR",
        };
        let excerpt = truncate(&m.content, 200);
        out.push_str(&format!("[{}] {who}: {excerpt}\n", m.timestamp.to_rfc3339()));
        if let Some(err) = &m.error_context {
            out.push_str(&format!("    error: {} — {}\n", err.error_type, err.detail));
        }
    }

    out.push_str("\nMetrics:\n");
    out.push_str(&format!(
        "total_interactions={} error_count={} hint_bearing_replies={}\n",
        metrics.total_interactions, metrics.error_count, metrics.hint_bearing_count
    ));
    out.push_str("phase_counts: ");
    out.push_str(
        &metrics
            .phase_counts
            .iter()
            .map(|(p, c)| format!("{p}={c}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    out.push('\n');
    out.push_str(&format!(
        "frustration_curve={:?}\nunderstanding_curve={:?}\n",
        metrics.frustration_curve, metrics.understanding_curve
    ));

    out
}

pub fn user_prompt(trace_summary: &str) -> String {
    format!(
        "Here is a student's interaction trace summary:\n\n{trace_summary}\n\n\
         Diagnose why this student is struggling, grounded strictly in the \
         trace above. Every evidence quote must be copied verbatim from the \
         trace. Produce at least 3 evidence quotes. Respond with strict JSON \
         matching this schema:\n{AUDIT_SCHEMA}"
    )
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{now, ActivityId, MessageId, SessionId, StudentId};
    use crate::tutor::phase::Phase;

    fn msg(sender: Sender, content: &str) -> Message {
        Message {
            message_id: MessageId::new(),
            session_id: SessionId::new(),
            student_id: StudentId::new(),
            activity_id: ActivityId::new(),
            sender,
            content: content.to_string(),
            code_snapshot: None,
            error_context: None,
            phase: Phase::Exploration,
            frustration: 0.2,
            understanding: 0.5,
            timestamp: now(),
        }
    }

    #[test]
    fn metrics_count_errors_and_hints() {
        let mut m1 = msg(Sender::Student, "it fails");
        m1.error_context = Some(crate::tutor::ErrorContext {
            error_type: "IndentationError".to_string(),
            detail: "line 4".to_string(),
        });
        let m2 = msg(Sender::Tutor, "Try thinking about the indentation.");
        let messages = vec![m1, m2];

        let metrics = compute_metrics(&messages);
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.hint_bearing_count, 1);
        assert_eq!(metrics.total_interactions, 2);
    }

    #[test]
    fn summary_includes_metrics_block() {
        let messages = vec![msg(Sender::Student, "hello")];
        let metrics = compute_metrics(&messages);
        let summary = summarize_trace(&messages, &metrics, 10);
        assert!(summary.contains("Metrics:"));
        assert!(summary.contains("hello"));
    }
}
