//! In-process network and wallet stand-ins
//!
//! `MockNetwork` queues tasks, records submissions and returns configured
//! validator scores. `MockWallet` produces deterministic, non-cryptographic
//! signatures.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{SubmissionAck, SubmissionSink, TaskSource, ValidatorFeedback, WalletSigner};
use crate::error::{Error, Result};
use crate::task::Task;

/// Score returned for tasks without an explicit score
const DEFAULT_MOCK_SCORE: f64 = 0.75;

/// Mock network client
#[derive(Debug)]
pub struct MockNetwork {
    tasks: Mutex<VecDeque<Task>>,
    submissions: Mutex<Vec<(String, String)>>,
    scores: HashMap<String, f64>,
    default_score: Option<f64>,
    reject_submissions: bool,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            scores: HashMap::new(),
            default_score: Some(DEFAULT_MOCK_SCORE),
            reject_submissions: false,
        }
    }

    /// Queue tasks to be handed out in order
    pub fn with_tasks(self, tasks: impl IntoIterator<Item = Task>) -> Self {
        let queued = tasks.into_iter().collect();
        Self {
            tasks: Mutex::new(queued),
            ..self
        }
    }

    /// Fix the validator score for one task
    pub fn with_score(mut self, task_id: impl Into<String>, score: f64) -> Self {
        self.scores.insert(task_id.into(), score);
        self
    }

    /// Score for tasks without a fixed score; `None` makes feedback unavailable
    pub fn with_default_score(mut self, score: Option<f64>) -> Self {
        self.default_score = score;
        self
    }

    /// Make every submission fail
    pub fn with_rejected_submissions(mut self) -> Self {
        self.reject_submissions = true;
        self
    }

    /// Submissions received so far, in order
    pub async fn submissions(&self) -> Vec<(String, String)> {
        self.submissions.lock().await.clone()
    }
}

#[async_trait]
impl TaskSource for MockNetwork {
    async fn next_task(&self) -> Result<Option<Task>> {
        Ok(self.tasks.lock().await.pop_front())
    }
}

#[async_trait]
impl SubmissionSink for MockNetwork {
    async fn submit(&self, task_id: &str, formatted_response: &str) -> Result<SubmissionAck> {
        if self.reject_submissions {
            return Err(Error::SubmissionFailed(
                task_id.to_string(),
                "mock network rejects submissions".to_string(),
            ));
        }

        self.submissions
            .lock()
            .await
            .push((task_id.to_string(), formatted_response.to_string()));
        info!(task_id, "Response submitted (mock mode)");

        Ok(SubmissionAck {
            task_id: task_id.to_string(),
            accepted: true,
            submitted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl ValidatorFeedback for MockNetwork {
    async fn validator_score(&self, task_id: &str, _response: &str) -> Result<f64> {
        self.scores
            .get(task_id)
            .copied()
            .or(self.default_score)
            .ok_or_else(|| Error::FeedbackUnavailable(task_id.to_string()))
    }
}

/// Mock wallet signer
#[derive(Debug, Clone)]
pub struct MockWallet {
    hotkey: String,
}

impl MockWallet {
    pub fn new(hotkey: impl Into<String>) -> Self {
        Self {
            hotkey: hotkey.into(),
        }
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    async fn sign(&self, data: &[u8]) -> Result<String> {
        if self.hotkey.trim().is_empty() {
            return Err(Error::SigningFailed("no hotkey configured".to_string()));
        }

        let mut hasher = DefaultHasher::new();
        self.hotkey.hash(&mut hasher);
        data.hash(&mut hasher);
        let signature = format!("mock:{}:{:016x}", self.hotkey, hasher.finish());
        debug!(hotkey = %self.hotkey, bytes = data.len(), "Signed payload (mock mode)");
        Ok(signature)
    }
}
