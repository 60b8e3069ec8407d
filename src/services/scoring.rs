//! Per-metric scoring policies and aggregation.
//!
//! Everything here is pure: the evaluation service feeds in the candidate,
//! the metric and (for judge metrics) the verdict, and gets back a
//! [`ScoredMetric`] describing the score and whether it counts toward the
//! aggregate.

use serde_json::{json, Value};

use crate::schema::{JudgeVerdict, MetricType, ScaleType, TargetDirection};
use crate::storage::MetricDefinition;

/// Widening applied to the desired-example length range.
const LENGTH_SLACK_LOW: f64 = 0.9;
const LENGTH_SLACK_HIGH: f64 = 1.1;

/// Score of one metric before it is attached to a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMetric {
    /// Metric score.
    pub score: f64,
    /// Human readable reason for the score.
    pub explanation: String,
    /// Scoring inputs, persisted as the result's raw JSON.
    pub raw: Value,
    /// Whether the score enters the aggregate.
    pub contributes: bool,
    /// Set when the metric is left out of the aggregate.
    pub warning: Option<String>,
}

impl ScoredMetric {
    fn new(score: f64, explanation: String, raw: Value, contributes: bool) -> Self {
        Self {
            score,
            explanation,
            raw,
            contributes,
            warning: None,
        }
    }

    fn excluded(mut self, metric: &MetricDefinition) -> Self {
        self.contributes = false;
        self.warning = Some(unbounded_warning(&metric.name));
        self
    }
}

/// Warning emitted for scores left out of the aggregate.
pub fn unbounded_warning(metric_name: &str) -> String {
    format!("Metric '{}' excluded from aggregate (unbounded).", metric_name)
}

/// Case-insensitive occurrence count of each blocked phrase.
pub fn count_violations(text: &str, blocklist: &[String]) -> Vec<(String, usize)> {
    let lowered = text.to_lowercase();
    blocklist
        .iter()
        .map(|phrase| phrase.to_lowercase())
        .filter(|phrase| !phrase.is_empty())
        .map(|phrase| {
            let hits = lowered.matches(phrase.as_str()).count();
            (phrase, hits)
        })
        .filter(|(_, hits)| *hits > 0)
        .collect()
}

/// Score a judge verdict, or the judge failure reason.
pub fn score_judged(metric: &MetricDefinition, verdict: Result<JudgeVerdict, String>) -> ScoredMetric {
    let scored = match verdict {
        Ok(v) => ScoredMetric::new(
            v.score,
            v.explanation,
            json!({"judge": "llm", "score": v.score}),
            true,
        ),
        Err(reason) => ScoredMetric::new(
            0.0,
            format!("Error during LLM judgment: {}", reason),
            json!({"judge": "llm", "error": reason}),
            true,
        ),
    };

    match metric.scale_type {
        ScaleType::Unbounded => scored.excluded(metric),
        ScaleType::Bounded | ScaleType::Boolean => scored,
    }
}

/// Score a DETERMINISTIC metric by its scale type.
pub fn score_rule(
    metric: &MetricDefinition,
    candidate: &str,
    desired: &[&str],
    blocklist: &[String],
) -> ScoredMetric {
    match metric.scale_type {
        ScaleType::Unbounded => score_blocklist_count(metric, candidate, blocklist),
        ScaleType::Boolean => score_blocklist_pass(candidate, blocklist),
        ScaleType::Bounded => score_length(metric, candidate, desired),
    }
}

fn violation_summary(candidate: &str, blocklist: &[String]) -> (usize, Value) {
    let hits = count_violations(candidate, blocklist);
    let total = hits.iter().map(|(_, n)| n).sum();
    let matched: Vec<&str> = hits.iter().map(|(p, _)| p.as_str()).collect();
    (total, json!({"violations": total, "matched": matched}))
}

fn score_blocklist_count(metric: &MetricDefinition, candidate: &str, blocklist: &[String]) -> ScoredMetric {
    let (violations, raw) = violation_summary(candidate, blocklist);

    if metric.target_direction == TargetDirection::LowerIsBetter {
        let score = if violations == 0 { 100.0 } else { 0.0 };
        return ScoredMetric::new(
            score,
            format!("Found {} policy violation(s); scored as pass/fail.", violations),
            raw,
            true,
        );
    }

    ScoredMetric::new(
        violations as f64,
        format!("Found {} policy violation(s).", violations),
        raw,
        true,
    )
    .excluded(metric)
}

fn score_blocklist_pass(candidate: &str, blocklist: &[String]) -> ScoredMetric {
    let (violations, raw) = violation_summary(candidate, blocklist);
    let passed = violations == 0;
    ScoredMetric::new(
        if passed { 1.0 } else { 0.0 },
        if passed {
            "No policy violations found.".to_string()
        } else {
            format!("Found {} policy violation(s).", violations)
        },
        raw,
        true,
    )
}

fn score_length(metric: &MetricDefinition, candidate: &str, desired: &[&str]) -> ScoredMetric {
    let length = candidate.chars().count();
    let desired_lengths: Vec<usize> = desired.iter().map(|d| d.chars().count()).collect();

    let (min, max, source) = match (desired_lengths.iter().min(), desired_lengths.iter().max()) {
        (Some(&lo), Some(&hi)) => (
            lo as f64 * LENGTH_SLACK_LOW,
            hi as f64 * LENGTH_SLACK_HIGH,
            format!("derived from {} desired examples", desired_lengths.len()),
        ),
        _ => (
            metric.scale_min.unwrap_or(0.0),
            metric.scale_max.unwrap_or(f64::INFINITY),
            "from metric definition".to_string(),
        ),
    };

    let in_range = (min..=max).contains(&(length as f64));
    let explanation = format!(
        "Length {} is {} range [{:.1}, {:.1}] {}.",
        length,
        if in_range { "within" } else { "outside" },
        min,
        max,
        source
    );

    ScoredMetric::new(
        if in_range { 100.0 } else { 0.0 },
        explanation,
        json!({
            "length": length,
            "target_min": min,
            "target_max": max.is_finite().then_some(max),
            "source": source,
        }),
        true,
    )
}

/// Which scoring path a metric takes.
pub fn needs_judge(metric: &MetricDefinition) -> bool {
    metric.metric_type == MetricType::LlmJudge
}

/// Arithmetic mean of the contributing scores.
pub fn aggregate<'a>(scored: impl IntoIterator<Item = &'a ScoredMetric>) -> Option<f64> {
    let (sum, count) = scored
        .into_iter()
        .filter(|s| s.contributes)
        .fold((0.0, 0usize), |(sum, n), s| (sum + s.score, n + 1));

    (count > 0).then(|| sum / count as f64)
}
