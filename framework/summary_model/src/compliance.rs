use serde::{Deserialize, Serialize};

use crate::ScenarioRun;

/// Which objective a scenario is certified against.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ComplianceMetric {
    /// Recovery Time Objective, the longest acceptable time to restore service.
    #[default]
    #[serde(rename = "RTO", alias = "rto")]
    Rto,
    /// Recovery Point Objective, measured here as the time to restore from backup.
    #[serde(rename = "RPO", alias = "rpo")]
    Rpo,
}

impl std::fmt::Display for ComplianceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplianceMetric::Rto => write!(f, "RTO"),
            ComplianceMetric::Rpo => write!(f, "RPO"),
        }
    }
}

/// A configured objective. Immutable for the duration of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceTarget {
    pub metric: ComplianceMetric,
    #[serde(alias = "threshold_seconds")]
    pub threshold_seconds: u64,
}

impl ComplianceTarget {
    pub fn rto(threshold_seconds: u64) -> Self {
        Self {
            metric: ComplianceMetric::Rto,
            threshold_seconds,
        }
    }

    pub fn rpo(threshold_seconds: u64) -> Self {
        Self {
            metric: ComplianceMetric::Rpo,
            threshold_seconds,
        }
    }

    pub fn threshold_ms(&self) -> u64 {
        self.threshold_seconds.saturating_mul(1000)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Compliant,
    NonCompliant,
    /// Nothing was certified, e.g. the drill was cancelled or no scenarios ran.
    #[default]
    Unknown,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Compliant => write!(f, "compliant"),
            Verdict::NonCompliant => write!(f, "non-compliant"),
            Verdict::Unknown => write!(f, "unknown"),
        }
    }
}

/// The verdict for a measurement together with the margin to the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub verdict: Verdict,
    /// `(threshold - actual) / threshold` as a signed percentage, negative when over threshold.
    ///
    /// Only used for trend reporting, the verdict never depends on it.
    pub margin_pct: Option<f64>,
}

/// Compare a measured duration against a target.
///
/// The comparison is strict: a run that takes exactly the threshold is non-compliant, the
/// objective is to stay under the ceiling.
pub fn validate_duration(total_duration_ms: u64, target: &ComplianceTarget) -> Assessment {
    let threshold_ms = target.threshold_ms();

    let verdict = if total_duration_ms < threshold_ms {
        Verdict::Compliant
    } else {
        Verdict::NonCompliant
    };

    Assessment {
        verdict,
        margin_pct: margin_pct(total_duration_ms, threshold_ms),
    }
}

/// Validate a sealed run against a target.
pub fn validate(scenario_run: &ScenarioRun, target: &ComplianceTarget) -> Assessment {
    validate_duration(scenario_run.total_duration_ms(), target)
}

/// Fold scenario verdicts into a suite verdict.
///
/// Compliant only if every scenario is compliant. Any non-compliant scenario makes the suite
/// non-compliant. A suite with no scenarios, or one with scenarios that could not be certified, is
/// unknown rather than compliant.
pub fn suite_verdict<'a>(verdicts: impl IntoIterator<Item = &'a Verdict>) -> Verdict {
    verdicts
        .into_iter()
        .fold(None, |acc, verdict| match (acc, verdict) {
            (Some(Verdict::NonCompliant), _) | (_, Verdict::NonCompliant) => {
                Some(Verdict::NonCompliant)
            }
            (Some(Verdict::Unknown), _) | (_, Verdict::Unknown) => Some(Verdict::Unknown),
            _ => Some(Verdict::Compliant),
        })
        .unwrap_or(Verdict::Unknown)
}

fn margin_pct(actual_ms: u64, threshold_ms: u64) -> Option<f64> {
    if threshold_ms == 0 {
        return None;
    }

    let threshold = threshold_ms as f64;
    Some((threshold - actual_ms as f64) / threshold * 100.0)
}
