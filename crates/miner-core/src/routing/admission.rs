//! Admission gate - decides whether a task is worth answering
//!
//! Checks run in a fixed order and the first failing check wins:
//! 1. Aggregate budget utilization above the ceiling
//! 2. Classification confidence below the subnet threshold
//! 3. Participation sampling: a uniform draw in [0, 1) above the subnet rate
//!
//! The random source is injectable so the stochastic check can be tested
//! deterministically.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SubnetPolicy;

/// Default utilization ceiling in percent
pub const DEFAULT_UTILIZATION_CEILING: f64 = 90.0;

/// Why a task was not answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Aggregate budget utilization is above the ceiling
    BudgetExhausted { utilization_percent: f64 },
    /// Classifier confidence is below the subnet threshold
    LowConfidence { confidence: f64, threshold: f64 },
    /// The task was not sampled for participation
    NotSampled { draw: f64, rate: f64 },
    /// The routed provider cannot cover the allocation
    InsufficientBudget {
        provider: String,
        needed: u64,
        remaining: u64,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted { utilization_percent } => {
                write!(f, "budget utilization {:.1}% above ceiling", utilization_percent)
            }
            Self::LowConfidence {
                confidence,
                threshold,
            } => write!(f, "confidence {:.2} below threshold {:.2}", confidence, threshold),
            Self::NotSampled { draw, rate } => {
                write!(f, "not sampled (draw {:.3} > rate {:.3})", draw, rate)
            }
            Self::InsufficientBudget {
                provider,
                needed,
                remaining,
            } => write!(
                f,
                "insufficient {} budget (need {}, {} remaining)",
                provider, needed, remaining
            ),
        }
    }
}

/// Result of evaluating a task at the gate
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    Admitted,
    Rejected(RejectReason),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Admission gate with an injectable random source
pub struct AdmissionGate {
    rng: Box<dyn RngCore + Send + Sync>,
    utilization_ceiling_percent: f64,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("utilization_ceiling_percent", &self.utilization_ceiling_percent)
            .finish_non_exhaustive()
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionGate {
    /// Create a gate seeded from system entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a gate with a fixed seed (for reproducibility in tests)
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Create a gate drawing from the given random source
    pub fn with_rng(rng: impl RngCore + Send + Sync + 'static) -> Self {
        Self {
            rng: Box::new(rng),
            utilization_ceiling_percent: DEFAULT_UTILIZATION_CEILING,
        }
    }

    /// Set the utilization ceiling in percent
    pub fn with_ceiling(mut self, ceiling_percent: f64) -> Self {
        self.utilization_ceiling_percent = ceiling_percent;
        self
    }

    pub fn utilization_ceiling_percent(&self) -> f64 {
        self.utilization_ceiling_percent
    }

    /// Evaluate a task against the gate's checks
    ///
    /// The confidence boundary is inclusive: a confidence equal to the
    /// threshold is admitted. The random draw happens only when the earlier
    /// checks pass.
    pub fn evaluate(
        &mut self,
        confidence: f64,
        policy: &SubnetPolicy,
        budget_utilization_percent: f64,
    ) -> AdmissionDecision {
        if budget_utilization_percent > self.utilization_ceiling_percent {
            debug!(
                utilization = budget_utilization_percent,
                ceiling = self.utilization_ceiling_percent,
                "Budget too low, skipping task"
            );
            return AdmissionDecision::Rejected(RejectReason::BudgetExhausted {
                utilization_percent: budget_utilization_percent,
            });
        }

        let threshold = policy.min_confidence_threshold;
        if confidence < threshold {
            debug!(confidence, threshold, "Confidence below threshold");
            return AdmissionDecision::Rejected(RejectReason::LowConfidence {
                confidence,
                threshold,
            });
        }

        let rate = policy.participation_rate;
        let draw: f64 = self.rng.gen_range(0.0..1.0);
        if draw > rate {
            debug!(draw, rate, "Participation sampling skipped task");
            return AdmissionDecision::Rejected(RejectReason::NotSampled { draw, rate });
        }

        AdmissionDecision::Admitted
    }

    /// Whether a task should be answered
    pub fn admit(
        &mut self,
        confidence: f64,
        policy: &SubnetPolicy,
        budget_utilization_percent: f64,
    ) -> bool {
        self.evaluate(confidence, policy, budget_utilization_percent)
            .is_admitted()
    }
}
