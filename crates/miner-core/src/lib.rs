//! Subnet Miner Core Library
//!
//! This crate provides the decision pipeline for a budget-constrained
//! network miner, including:
//! - Budget ledger (per-provider token allowances with a safety reserve)
//! - Task classification and admission control
//! - Model routing and token allocation
//! - Prompt strategy catalog
//! - Inference backends (echo, OpenRouter)
//! - Network collaborators (task source, submission, validator feedback)
//! - Performance tracking (JSONL result log, snapshots, reports)

pub mod budget;
pub mod config;
pub mod error;
pub mod inference;
pub mod network;
pub mod performance;
pub mod pipeline;
pub mod routing;
pub mod strategy;
pub mod task;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::budget::{BudgetAccount, BudgetLedger};
    pub use crate::config::{Config, PolicySet, SubnetPolicy};
    pub use crate::error::{Error, Result};
    pub use crate::inference::{InferenceBackend, backend_from_config};
    pub use crate::network::{SubmissionSink, TaskSource, ValidatorFeedback};
    pub use crate::performance::{PerformanceTracker, TaskResult};
    pub use crate::pipeline::{TaskOutcome, TaskPipeline};
    pub use crate::task::Task;
}
