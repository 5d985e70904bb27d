//! Per-subnet participation policy
//!
//! Loaded once at startup from `subnet-profiles.json`:
//!
//! ```json
//! { "subnets": { "1": { "preferred_llm": "openai-gpt4", "max_tokens_per_task": 1000,
//!                       "min_confidence_threshold": 0.5, "participation_rate": 1.0 } } }
//! ```
//!
//! A missing or malformed file yields an empty set, and every lookup for an
//! unknown subnet falls back to the default policy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Identifier of a subnet (policy domain)
pub type SubnetId = u16;

/// Subnet assumed when a task or result record names none
pub const DEFAULT_SUBNET: SubnetId = 1;

pub(crate) fn default_subnet() -> SubnetId {
    DEFAULT_SUBNET
}

/// Policy governing how the miner participates in one subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubnetPolicy {
    pub preferred_llm: String,
    pub max_tokens_per_task: u32,
    pub min_confidence_threshold: f64,
    pub participation_rate: f64,
}

impl Default for SubnetPolicy {
    fn default() -> Self {
        Self {
            preferred_llm: "openai-gpt4".to_string(),
            max_tokens_per_task: 1000,
            min_confidence_threshold: 0.5,
            participation_rate: 1.0,
        }
    }
}

impl SubnetPolicy {
    pub fn with_preferred_llm(mut self, model: impl Into<String>) -> Self {
        self.preferred_llm = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens_per_task = max_tokens;
        self
    }

    pub fn with_min_confidence(mut self, threshold: f64) -> Self {
        self.min_confidence_threshold = threshold;
        self
    }

    pub fn with_participation_rate(mut self, rate: f64) -> Self {
        self.participation_rate = rate;
        self
    }

    /// Clamp probability fields into [0, 1]
    fn normalized(mut self, subnet_id: SubnetId) -> Self {
        let threshold = self.min_confidence_threshold.clamp(0.0, 1.0);
        let rate = self.participation_rate.clamp(0.0, 1.0);
        if threshold != self.min_confidence_threshold || rate != self.participation_rate {
            warn!(
                subnet_id,
                min_confidence_threshold = self.min_confidence_threshold,
                participation_rate = self.participation_rate,
                "Subnet policy values outside [0, 1] were clamped"
            );
        }
        self.min_confidence_threshold = threshold;
        self.participation_rate = rate;
        self
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct PolicyFile {
    #[serde(default)]
    subnets: BTreeMap<SubnetId, SubnetPolicy>,
}

/// Read-only set of subnet policies with a default for unknown subnets
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    subnets: BTreeMap<SubnetId, SubnetPolicy>,
    default_policy: SubnetPolicy,
}

impl PolicySet {
    /// Create an empty policy set
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the policy returned for unknown subnets
    pub fn with_default(mut self, policy: SubnetPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Add or replace a subnet's policy
    pub fn with_subnet(mut self, subnet_id: SubnetId, policy: SubnetPolicy) -> Self {
        self.subnets.insert(subnet_id, policy.normalized(subnet_id));
        self
    }

    /// Load policies, degrading to an empty set on any error
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(set) => set,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Falling back to default subnet policies");
                Self::new()
            }
        }
    }

    /// Load policies, reporting malformed files as errors
    ///
    /// A missing file is not an error: it yields an empty set.
    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Subnet profiles not found, using defaults");
            return Ok(Self::new());
        }

        let contents = fs::read_to_string(path)?;
        let file: PolicyFile = serde_json::from_str(&contents)
            .map_err(|e| Error::InvalidPolicy(path.display().to_string(), e.to_string()))?;

        let subnets: BTreeMap<SubnetId, SubnetPolicy> = file
            .subnets
            .into_iter()
            .map(|(id, policy)| (id, policy.normalized(id)))
            .collect();

        info!(count = subnets.len(), "Loaded subnet policies");
        Ok(Self {
            subnets,
            default_policy: SubnetPolicy::default(),
        })
    }

    /// Policy for a subnet, or the default policy when unknown
    pub fn policy_for(&self, subnet_id: SubnetId) -> &SubnetPolicy {
        match self.subnets.get(&subnet_id) {
            Some(policy) => policy,
            None => {
                debug!(subnet_id, "No policy for subnet, using default");
                &self.default_policy
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subnets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_set() {
        let dir = TempDir::new().unwrap();
        let set = PolicySet::load(&dir.path().join("subnet-profiles.json"));
        assert!(set.is_empty());
        assert_eq!(set.policy_for(7), &SubnetPolicy::default());
    }

    #[test]
    fn test_malformed_file_degrades_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subnet-profiles.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            PolicySet::try_load(&path),
            Err(Error::InvalidPolicy(..))
        ));
        let set = PolicySet::load(&path);
        assert!(set.is_empty());
    }

    #[test]
    fn test_load_with_string_keys_and_partial_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subnet-profiles.json");
        fs::write(
            &path,
            r#"{
                "subnets": {
                    "1": { "preferred_llm": "claude-haiku", "max_tokens_per_task": 1500,
                           "min_confidence_threshold": 0.6, "participation_rate": 0.8 },
                    "18": { "participation_rate": 0.25 }
                }
            }"#,
        )
        .unwrap();

        let set = PolicySet::load(&path);
        assert_eq!(set.len(), 2);

        let one = set.policy_for(1);
        assert_eq!(one.preferred_llm, "claude-haiku");
        assert_eq!(one.max_tokens_per_task, 1500);

        let eighteen = set.policy_for(18);
        assert_eq!(eighteen.preferred_llm, "openai-gpt4");
        assert!((eighteen.participation_rate - 0.25).abs() < f64::EPSILON);
        assert!((eighteen.min_confidence_threshold - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let set = PolicySet::new().with_subnet(
            3,
            SubnetPolicy::default()
                .with_min_confidence(1.4)
                .with_participation_rate(-0.2),
        );
        let policy = set.policy_for(3);
        assert_eq!(policy.min_confidence_threshold, 1.0);
        assert_eq!(policy.participation_rate, 0.0);
    }

    #[test]
    fn test_custom_default_policy() {
        let set = PolicySet::new().with_default(SubnetPolicy::default().with_max_tokens(64));
        assert_eq!(set.policy_for(99).max_tokens_per_task, 64);
        assert!(set.is_empty());
    }
}
