//! Metric schema: enums shared across the crate and the validated
//! [`MetricSpec`] used both for LLM proposals and for confirmed definitions.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Allowed lower bounds for bounded scales.
pub const ALLOWED_SCALE_MINS: [f64; 2] = [0.0, 1.0];
/// Allowed upper bounds for bounded scales.
pub const ALLOWED_SCALE_MAXS: [f64; 4] = [1.0, 5.0, 10.0, 100.0];

/// How a metric is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    /// Scored by the judge capability.
    #[serde(rename = "LLM_JUDGE")]
    LlmJudge,
    /// Scored by a fixed rule.
    #[serde(rename = "DETERMINISTIC")]
    Deterministic,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricType::LlmJudge => write!(f, "LLM_JUDGE"),
            MetricType::Deterministic => write!(f, "DETERMINISTIC"),
        }
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LLM_JUDGE" => Ok(MetricType::LlmJudge),
            "DETERMINISTIC" => Ok(MetricType::Deterministic),
            _ => Err(format!("Unknown metric type: {}", s)),
        }
    }
}

/// Shape of a metric's score range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    /// Fixed numeric range.
    Bounded,
    /// Open-ended count.
    Unbounded,
    /// Pass/fail.
    Boolean,
}

impl std::fmt::Display for ScaleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleType::Bounded => write!(f, "bounded"),
            ScaleType::Unbounded => write!(f, "unbounded"),
            ScaleType::Boolean => write!(f, "boolean"),
        }
    }
}

impl std::str::FromStr for ScaleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bounded" => Ok(ScaleType::Bounded),
            "unbounded" => Ok(ScaleType::Unbounded),
            "boolean" => Ok(ScaleType::Boolean),
            _ => Err(format!("Unknown scale type: {}", s)),
        }
    }
}

/// Which way a score should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDirection {
    /// Larger scores are improvements.
    HigherIsBetter,
    /// Smaller scores are improvements.
    LowerIsBetter,
    /// No preferred direction.
    Neutral,
}

impl std::fmt::Display for TargetDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetDirection::HigherIsBetter => write!(f, "higher_is_better"),
            TargetDirection::LowerIsBetter => write!(f, "lower_is_better"),
            TargetDirection::Neutral => write!(f, "neutral"),
        }
    }
}

impl std::str::FromStr for TargetDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "higher_is_better" => Ok(TargetDirection::HigherIsBetter),
            "lower_is_better" => Ok(TargetDirection::LowerIsBetter),
            "neutral" => Ok(TargetDirection::Neutral),
            _ => Err(format!("Unknown target direction: {}", s)),
        }
    }
}

/// A metric definition before it is persisted.
///
/// This is the element type of the serialized proposal document stored on a
/// design iteration, and the input from which confirmed definitions are
/// built. Call [`MetricSpec::validated`] before trusting any field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Short metric name.
    pub name: String,
    /// What the metric measures.
    pub description: String,
    /// Judge or rule based.
    pub metric_type: MetricType,
    /// Score range shape.
    pub scale_type: ScaleType,
    /// Lower bound for bounded scales.
    #[serde(default)]
    pub scale_min: Option<f64>,
    /// Upper bound for bounded scales.
    #[serde(default)]
    pub scale_max: Option<f64>,
    /// Improvement direction.
    pub target_direction: TargetDirection,
    /// Judge instructions, required for LLM_JUDGE.
    #[serde(default)]
    pub evaluation_prompt: Option<String>,
    /// Rule text, required for DETERMINISTIC.
    #[serde(default)]
    pub rule_definition: Option<String>,
}

impl MetricSpec {
    /// Create a bounded 0-100 judge metric.
    pub fn judge(
        name: impl Into<String>,
        description: impl Into<String>,
        evaluation_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            metric_type: MetricType::LlmJudge,
            scale_type: ScaleType::Bounded,
            scale_min: Some(0.0),
            scale_max: Some(100.0),
            target_direction: TargetDirection::HigherIsBetter,
            evaluation_prompt: Some(evaluation_prompt.into()),
            rule_definition: None,
        }
    }

    /// Create an unbounded, lower-is-better rule metric.
    pub fn rule(
        name: impl Into<String>,
        description: impl Into<String>,
        rule_definition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            metric_type: MetricType::Deterministic,
            scale_type: ScaleType::Unbounded,
            scale_min: None,
            scale_max: None,
            target_direction: TargetDirection::LowerIsBetter,
            evaluation_prompt: None,
            rule_definition: Some(rule_definition.into()),
        }
    }

    /// Set the scale.
    pub fn with_scale(mut self, scale_type: ScaleType, min: Option<f64>, max: Option<f64>) -> Self {
        self.scale_type = scale_type;
        self.scale_min = min;
        self.scale_max = max;
        self
    }

    /// Set the target direction.
    pub fn with_direction(mut self, direction: TargetDirection) -> Self {
        self.target_direction = direction;
        self
    }

    /// Check every construction invariant and return the normalized spec.
    ///
    /// Unbounded scales have any supplied bounds cleared rather than being
    /// rejected.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::field("name", "must not be empty"));
        }

        match self.scale_type {
            ScaleType::Bounded => {
                let (min, max) = match (self.scale_min, self.scale_max) {
                    (Some(min), Some(max)) => (min, max),
                    _ => {
                        return Err(ValidationError::field(
                            "scale_min",
                            "bounded metrics must have scale_min and scale_max",
                        ))
                    }
                };
                if !ALLOWED_SCALE_MINS.contains(&min) {
                    return Err(ValidationError::field(
                        "scale_min",
                        format!("must be one of 0, 1 (got {})", min),
                    ));
                }
                if !ALLOWED_SCALE_MAXS.contains(&max) {
                    return Err(ValidationError::field(
                        "scale_max",
                        format!("must be one of 1, 5, 10, 100 (got {})", max),
                    ));
                }
                if min >= max {
                    return Err(ValidationError::field(
                        "scale_max",
                        "scale_max must be greater than scale_min",
                    ));
                }
            }
            ScaleType::Unbounded => {
                self.scale_min = None;
                self.scale_max = None;
            }
            ScaleType::Boolean => {}
        }

        match self.metric_type {
            MetricType::LlmJudge if is_blank(&self.evaluation_prompt) => {
                return Err(ValidationError::field(
                    "evaluation_prompt",
                    "LLM_JUDGE metrics must have an evaluation_prompt",
                ));
            }
            MetricType::Deterministic if is_blank(&self.rule_definition) => {
                return Err(ValidationError::field(
                    "rule_definition",
                    "DETERMINISTIC metrics must have a rule_definition",
                ));
            }
            _ => {}
        }

        Ok(self)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Validate a whole proposal set, stopping at the first invalid spec.
///
/// The returned error names the offending metric by position.
pub fn validate_all(specs: Vec<MetricSpec>) -> Result<Vec<MetricSpec>, ValidationError> {
    specs
        .into_iter()
        .enumerate()
        .map(|(index, spec)| {
            spec.validated().map_err(|err| match err {
                ValidationError::Field { field, reason } => {
                    ValidationError::field(format!("proposed_metrics[{}].{}", index, field), reason)
                }
            })
        })
        .collect()
}

/// Output of the metric proposal capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricProposal {
    /// Where current outputs fall short of the intent.
    pub gap_analysis: String,
    /// Proposed metric set.
    pub proposed_metrics: Vec<MetricSpec>,
    /// Short account of why these metrics were chosen.
    #[serde(default)]
    pub reasoning_summary: String,
}

/// Output of the judge capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Numeric score on the metric's scale.
    pub score: f64,
    /// Short justification.
    pub explanation: String,
}
