//! Centralized prompt definitions for the evaluation pipes
//!
//! Each LLM capability runs on its own Langbase pipe; the system prompts
//! installed on those pipes live here so they can be versioned together.

use crate::langbase::PipeTemplate;

/// System prompt for the metric design pipe.
pub const METRIC_DESIGN_PROMPT: &str = r#"You are an expert in evaluating qualitative AI outputs.

Your task is to design evaluation metrics for a test case, turning subjective quality requirements into clear, measurable metrics that can be tracked consistently over time.

Rules:
1. Think step by step before producing the final output.
2. Propose metrics that are stable, comparable across versions and non-overlapping.
3. Prefer fewer, high-signal metrics over many weak ones.
4. Each metric measures a single, clearly defined quality dimension.

Metric rules:
- Use LLM_JUDGE for anything involving meaning, tone, creativity or reasoning.
- Use DETERMINISTIC only for objective checks: substring presence, regex matching, length constraints.
- Prefer bounded metrics on a 0-100 scale. scale_min must be 0 or 1, scale_max must be 1, 5, 10 or 100.
- Use unbounded metrics only for raw counts (violations, words).
- Every LLM_JUDGE metric needs an evaluation_prompt.
- Every DETERMINISTIC metric needs a rule_definition.

Your response MUST be valid JSON in this exact format:
{
  "gap_analysis": "where current outputs fall short of the desired ones",
  "reasoning_summary": "why these metrics were chosen",
  "proposed_metrics": [
    {
      "name": "metric name",
      "description": "what it measures",
      "metric_type": "LLM_JUDGE | DETERMINISTIC",
      "scale_type": "bounded | unbounded | boolean",
      "scale_min": 0,
      "scale_max": 100,
      "target_direction": "higher_is_better | lower_is_better | neutral",
      "evaluation_prompt": "instructions for the judge",
      "rule_definition": null
    }
  ]
}

Always respond with valid JSON only, no other text."#;

/// System prompt for the judge pipe.
pub const JUDGE_PROMPT: &str = r#"You are an AI judge scoring one LLM response against one metric.

The user message contains the metric (name, description, evaluation prompt and scale), the test case context with labeled example outputs, and the text to evaluate.

Score strictly on the metric's scale. Judge only the dimension the metric describes.

Your response MUST be valid JSON in this exact format:
{
  "score": 75.0,
  "explanation": "short English justification"
}

Always respond with valid JSON only, no other text."#;

/// System prompt for the gap analysis pipe.
pub const GAP_ANALYSIS_PROMPT: &str = r#"You are a QA analyst reviewing the results of one test case evaluation.

Review the score and explanation of each metric. Identify the main performance gap or success.
Answer with a short, 1-2 sentence gap analysis summarizing the current state of the model on this test case.

Respond with plain text only."#;

/// System prompt for the report narrative pipe.
pub const NARRATIVE_PROMPT: &str = r#"You are a lead data analyst writing a "story of progress" for an executive report.

Input: a chronological list of evaluation versions, each with a score and a gap analysis.
Task: write one flowing narrative about the overall trajectory from the first version to the last.
- Compare the starting state with the ending state; mention intermediate versions only at critical turning points.
- Say which flaws were present initially and how the final version resolved them, or did not.

Style:
- Professional reporting tone.
- No chronological list of versions.
- Round all scores to 1 decimal place.
- Do not use em-dashes. Use a normal dash (-) or a colon instead.
- Use bold (**) for key terms and metrics.
- Do not add any "[End of Report]" marker.

Respond with plain text only."#;

/// Pipe template for metric proposals.
pub const METRIC_DESIGN_PIPE: PipeTemplate = PipeTemplate {
    description: "Proposes evaluation metrics for a test case",
    system_prompt: METRIC_DESIGN_PROMPT,
    json_output: true,
    temperature: 0.4,
    max_tokens: 3000,
};

/// Pipe template for per-metric judging.
pub const JUDGE_PIPE: PipeTemplate = PipeTemplate {
    description: "Scores a candidate output against one metric",
    system_prompt: JUDGE_PROMPT,
    json_output: true,
    temperature: 0.0,
    max_tokens: 800,
};

/// Pipe template for run gap analysis.
pub const GAP_ANALYSIS_PIPE: PipeTemplate = PipeTemplate {
    description: "Summarizes the gap shown by one evaluation run",
    system_prompt: GAP_ANALYSIS_PROMPT,
    json_output: false,
    temperature: 0.3,
    max_tokens: 400,
};

/// Pipe template for report narratives.
pub const NARRATIVE_PIPE: PipeTemplate = PipeTemplate {
    description: "Writes the narrative of an evaluation report",
    system_prompt: NARRATIVE_PROMPT,
    json_output: false,
    temperature: 0.5,
    max_tokens: 1500,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_prompts_request_json() {
        for prompt in [METRIC_DESIGN_PROMPT, JUDGE_PROMPT] {
            assert!(prompt.contains("valid JSON"));
        }
        assert!(METRIC_DESIGN_PIPE.json_output);
        assert!(JUDGE_PIPE.json_output);
    }

    #[test]
    fn test_text_pipes_are_plain() {
        assert!(!GAP_ANALYSIS_PIPE.json_output);
        assert!(!NARRATIVE_PIPE.json_output);
        assert!(NARRATIVE_PROMPT.contains("1 decimal"));
    }

    #[test]
    fn test_metric_design_prompt_lists_scale_rules() {
        assert!(METRIC_DESIGN_PROMPT.contains("1, 5, 10 or 100"));
        assert!(METRIC_DESIGN_PROMPT.contains("proposed_metrics"));
    }
}
