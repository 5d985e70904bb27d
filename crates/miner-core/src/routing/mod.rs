//! Budget-aware routing and admission
//!
//! This module decides, for each classified task, whether to answer it and
//! how. The key components are:
//!
//! - **Admission Gate**: rejects tasks when the budget is nearly spent, when
//!   the classifier is not confident enough, or when participation sampling
//!   skips them.
//!
//! - **Router**: picks the model, provider, prompt strategy and token
//!   allocation from the classification, the subnet policy and the ledger.
//!
//! ## Example
//!
//! ```rust,ignore
//! use miner_core::routing::{AdmissionGate, Router};
//!
//! let mut gate = AdmissionGate::new();
//! if gate.admit(classification.confidence, policy, ledger.aggregate_utilization_percent()) {
//!     let decision = Router::default().route(&classification, policy, &ledger);
//!     // build the prompt with decision.strategy, call decision.model ...
//! }
//! ```

mod admission;
mod router;
mod types;

pub use admission::{AdmissionDecision, AdmissionGate, DEFAULT_UTILIZATION_CEILING, RejectReason};
pub use router::Router;
pub use types::{
    Classification, ModelSelection, Provider, ReasoningDepth, RoutingDecision, TaskType,
    TimeSensitivity,
};
