//! Network collaborators
//!
//! The miner consumes the network through four narrow capabilities: a task
//! source, a submission sink, validator feedback and a wallet signer. The
//! pipeline holds them as trait objects so a real client can replace the
//! mocks without touching decision logic.

mod mock;

pub use mock::{MockNetwork, MockWallet};

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::task::Task;

/// Acknowledgement of a submitted response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionAck {
    pub task_id: String,
    pub accepted: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Supplies inbound tasks
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Next pending task, or `None` when the source is drained
    async fn next_task(&self) -> Result<Option<Task>>;
}

/// Accepts formatted responses
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, task_id: &str, formatted_response: &str) -> Result<SubmissionAck>;
}

/// Reports the validator's quality score for a submitted response
#[async_trait]
pub trait ValidatorFeedback: Send + Sync {
    /// Score in [0, 1]
    async fn validator_score(&self, task_id: &str, response: &str) -> Result<f64>;
}

/// Opaque signing capability; not used by decision logic
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign(&self, data: &[u8]) -> Result<String>;
}

/// Task source reading one JSON task per line
///
/// Malformed lines are skipped with a warning.
#[derive(Debug, Default)]
pub struct JsonlTaskSource {
    pending: Mutex<VecDeque<Task>>,
}

impl JsonlTaskSource {
    /// Load every task from a JSONL file
    pub fn open(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut pending = VecDeque::new();

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Task>(line) {
                Ok(task) => pending.push_back(task),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed task line"),
            }
        }

        info!(path = %path.display(), count = pending.len(), "Loaded tasks");
        Ok(Self::from_tasks(pending))
    }

    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            pending: Mutex::new(tasks.into_iter().collect()),
        }
    }

    pub async fn remaining(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl TaskSource for JsonlTaskSource {
    async fn next_task(&self) -> Result<Option<Task>> {
        Ok(self.pending.lock().await.pop_front())
    }
}
