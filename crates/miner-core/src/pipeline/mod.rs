//! Task pipeline - classify, admit, route, execute, record
//!
//! One task is processed to completion before the next begins:
//! [`TaskPipeline::process`] takes `&mut self`, so the budget check and the
//! spend it guards can never interleave with another task.
//!
//! ```text
//! received -> classified -> rejected
//!                        -> admitted -> routed -> executed -> recorded
//!                                                           -> failed
//! ```
//!
//! No per-task error escapes `process`; every path ends in a [`TaskOutcome`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::budget::BudgetLedger;
use crate::config::{Config, PolicySet, SubnetPolicy};
use crate::error::{Error, Result};
use crate::inference::{EchoBackend, GenerationConfig, InferenceBackend, estimate_tokens};
use crate::network::{SubmissionAck, SubmissionSink, TaskSource, ValidatorFeedback};
use crate::performance::{PerformanceTracker, TaskResult};
use crate::routing::{AdmissionDecision, AdmissionGate, RejectReason, Router, RoutingDecision};
use crate::strategy::StrategyCatalog;
use crate::task::{Task, TaskClassifier};

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Received,
    Classified,
    Rejected,
    Admitted,
    Routed,
    Executed,
    Recorded,
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Rejected => "rejected",
            Self::Admitted => "admitted",
            Self::Routed => "routed",
            Self::Executed => "executed",
            Self::Recorded => "recorded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A task that was answered
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedTask {
    pub task_id: String,
    pub response: String,
    pub decision: RoutingDecision,
    pub tokens_spent: u64,
    pub submission: SubmissionAck,
    /// Result written to the log; absent when feedback or the write failed
    pub result: Option<TaskResult>,
}

/// Terminal outcome of processing one task
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Rejected { task_id: String, reason: RejectReason },
    Failed { task_id: String, error: String },
    Recorded(ProcessedTask),
}

impl TaskOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Rejected { task_id, .. } | Self::Failed { task_id, .. } => task_id,
            Self::Recorded(processed) => &processed.task_id,
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            Self::Rejected { .. } => TaskState::Rejected,
            Self::Failed { .. } => TaskState::Failed,
            Self::Recorded(_) => TaskState::Recorded,
        }
    }
}

/// Running totals of terminal outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub processed: u64,
    pub recorded: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl PipelineStats {
    fn count(&mut self, outcome: &TaskOutcome) {
        self.processed += 1;
        match outcome {
            TaskOutcome::Rejected { .. } => self.rejected += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
            TaskOutcome::Recorded(_) => self.recorded += 1,
        }
    }
}

/// Tunables for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub reserve_fraction: f64,
    pub inference_timeout: Duration,
    pub max_response_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            reserve_fraction: crate::budget::DEFAULT_RESERVE_FRACTION,
            inference_timeout: Duration::from_secs(120),
            max_response_chars: 8000,
        }
    }
}

/// Trim and truncate a raw response on a character boundary
///
/// Fails when nothing is left to submit.
pub fn format_response(raw: &str, max_chars: usize) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("formatted response is empty".to_string()));
    }
    if trimmed.chars().count() > max_chars {
        debug!(max_chars, "Truncating response");
        return Ok(trimmed.chars().take(max_chars).collect());
    }
    Ok(trimmed.to_string())
}

/// The task decision pipeline
pub struct TaskPipeline {
    classifier: TaskClassifier,
    gate: AdmissionGate,
    router: Router,
    catalog: StrategyCatalog,
    policies: PolicySet,
    ledger: BudgetLedger,
    tracker: PerformanceTracker,
    backend: Arc<dyn InferenceBackend>,
    sink: Arc<dyn SubmissionSink>,
    feedback: Arc<dyn ValidatorFeedback>,
    settings: PipelineSettings,
    stats: PipelineStats,
}

impl std::fmt::Debug for TaskPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPipeline")
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Builder for creating a TaskPipeline
pub struct TaskPipelineBuilder {
    classifier: TaskClassifier,
    gate: Option<AdmissionGate>,
    router: Router,
    catalog: StrategyCatalog,
    policies: PolicySet,
    ledger: BudgetLedger,
    tracker: Option<PerformanceTracker>,
    backend: Arc<dyn InferenceBackend>,
    sink: Option<Arc<dyn SubmissionSink>>,
    feedback: Option<Arc<dyn ValidatorFeedback>>,
    settings: PipelineSettings,
    ceiling: Option<f64>,
}

impl Default for TaskPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskPipelineBuilder {
    pub fn new() -> Self {
        Self {
            classifier: TaskClassifier::default(),
            gate: None,
            router: Router::default(),
            catalog: StrategyCatalog::default(),
            policies: PolicySet::default(),
            ledger: BudgetLedger::in_memory(),
            tracker: None,
            backend: Arc::new(EchoBackend),
            sink: None,
            feedback: None,
            settings: PipelineSettings::default(),
            ceiling: None,
        }
    }

    /// Take ledger, policies, tracker, router, templates and tunables from configuration
    pub fn config(mut self, config: &Config) -> Self {
        let paths = &config.paths;
        let default_policy = SubnetPolicy::default()
            .with_preferred_llm(config.routing.default_model.clone())
            .with_max_tokens(config.routing.default_max_tokens);

        self.ledger = BudgetLedger::open(paths.ledger_path());
        self.policies = PolicySet::load(&paths.policy_path()).with_default(default_policy);
        self.tracker = Some(
            PerformanceTracker::new(paths.result_log_path()).with_metrics_path(paths.metrics_path()),
        );
        self.router = Router::new(config.routing.clone());
        self.catalog = StrategyCatalog::from_templates(&config.strategies.templates);
        self.ceiling = Some(config.budget.utilization_ceiling_percent);
        self.settings = PipelineSettings {
            reserve_fraction: config.budget.reserve_fraction,
            inference_timeout: Duration::from_secs(config.inference.timeout_secs),
            max_response_chars: config.inference.max_response_chars,
        };
        self
    }

    pub fn classifier(mut self, classifier: TaskClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn catalog(mut self, catalog: StrategyCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn policies(mut self, policies: PolicySet) -> Self {
        self.policies = policies;
        self
    }

    pub fn ledger(mut self, ledger: BudgetLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn tracker(mut self, tracker: PerformanceTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn submission_sink(mut self, sink: Arc<dyn SubmissionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn validator_feedback(mut self, feedback: Arc<dyn ValidatorFeedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Result<TaskPipeline> {
        let tracker = self
            .tracker
            .ok_or_else(|| Error::ConfigError("Pipeline requires a performance tracker".to_string()))?;
        let sink = self
            .sink
            .ok_or_else(|| Error::ConfigError("Pipeline requires a submission sink".to_string()))?;
        let feedback = self.feedback.ok_or_else(|| {
            Error::ConfigError("Pipeline requires a validator feedback source".to_string())
        })?;

        let mut gate = self.gate.unwrap_or_default();
        if let Some(ceiling) = self.ceiling {
            gate = gate.with_ceiling(ceiling);
        }

        Ok(TaskPipeline {
            classifier: self.classifier,
            gate,
            router: self.router,
            catalog: self.catalog,
            policies: self.policies,
            ledger: self.ledger,
            tracker,
            backend: self.backend,
            sink,
            feedback,
            settings: self.settings,
            stats: PipelineStats::default(),
        })
    }
}

fn transition(task: &Task, state: TaskState) {
    debug!(task_id = %task.id, subnet_id = task.subnet_id, state = %state, "Task state changed");
}

impl TaskPipeline {
    pub fn builder() -> TaskPipelineBuilder {
        TaskPipelineBuilder::new()
    }

    pub fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut BudgetLedger {
        &mut self.ledger
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Process one task to a terminal outcome
    pub async fn process(&mut self, task: Task) -> TaskOutcome {
        let outcome = self.run_task(task).await;
        self.stats.count(&outcome);

        match &outcome {
            TaskOutcome::Rejected { task_id, reason } => {
                info!(task_id = %task_id, state = %TaskState::Rejected, reason = %reason, "Task rejected");
            }
            TaskOutcome::Failed { task_id, error } => {
                warn!(task_id = %task_id, state = %TaskState::Failed, error = %error, "Task failed");
            }
            TaskOutcome::Recorded(processed) => {
                info!(
                    task_id = %processed.task_id,
                    state = %TaskState::Recorded,
                    model = %processed.decision.model,
                    tokens = processed.tokens_spent,
                    "Task processed"
                );
            }
        }
        outcome
    }

    /// Process tasks until the source is drained or `limit` is reached
    ///
    /// Returns the totals for this run. A source error ends the run.
    pub async fn run(&mut self, source: &dyn TaskSource, limit: Option<usize>) -> PipelineStats {
        let before = self.stats;
        let mut handled = 0usize;

        while limit.is_none_or(|max| handled < max) {
            let task = match source.next_task().await {
                Ok(Some(task)) => task,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Task source failed, stopping run");
                    break;
                }
            };
            self.process(task).await;
            handled += 1;
        }

        PipelineStats {
            processed: self.stats.processed - before.processed,
            recorded: self.stats.recorded - before.recorded,
            rejected: self.stats.rejected - before.rejected,
            failed: self.stats.failed - before.failed,
        }
    }

    async fn run_task(&mut self, mut task: Task) -> TaskOutcome {
        transition(&task, TaskState::Received);

        let classification = match task.classification {
            Some(classification) => classification,
            None => {
                let classification = self.classifier.classify(&task.content);
                task.classification = Some(classification);
                classification
            }
        };
        transition(&task, TaskState::Classified);

        self.ledger.roll_period(Utc::now());

        let policy = self.policies.policy_for(task.subnet_id).clone();
        let utilization = self.ledger.aggregate_utilization_percent();
        if let AdmissionDecision::Rejected(reason) =
            self.gate.evaluate(classification.confidence, &policy, utilization)
        {
            return TaskOutcome::Rejected {
                task_id: task.id,
                reason,
            };
        }
        transition(&task, TaskState::Admitted);

        let decision = self.router.route(&classification, &policy, &self.ledger);
        let provider = decision.provider.as_str();
        let prompt = self.catalog.apply(decision.strategy, &task.content);

        // Providers bill the prompt as well as the completion, so the
        // reserve must hold for both before anything is sent.
        let needed = estimate_tokens(&prompt, "") + decision.allocated_tokens;
        if decision.allocated_tokens == 0
            || !self
                .ledger
                .can_spend(provider, needed, self.settings.reserve_fraction)
        {
            return TaskOutcome::Rejected {
                reason: RejectReason::InsufficientBudget {
                    provider: provider.to_string(),
                    needed,
                    remaining: self.ledger.remaining(provider),
                },
                task_id: task.id,
            };
        }
        transition(&task, TaskState::Routed);

        let completion = match self.execute(&prompt, &decision).await {
            Ok(completion) => completion,
            Err(e) => {
                return TaskOutcome::Failed {
                    task_id: task.id,
                    error: e.to_string(),
                };
            }
        };
        transition(&task, TaskState::Executed);

        let tokens_spent = completion
            .usage
            .map(|u| u.total())
            .unwrap_or_else(|| estimate_tokens(&prompt, &completion.text));
        if tokens_spent > needed {
            warn!(
                task_id = %task.id,
                provider,
                needed,
                tokens_spent,
                "Spend exceeded the pre-flight estimate"
            );
        }
        if let Err(e) = self.ledger.record_spend(provider, tokens_spent) {
            error!(task_id = %task.id, error = %e, "Failed to record spend");
        }

        let response = format_response(&completion.text, self.settings.max_response_chars)
            .unwrap_or_else(|e| {
                warn!(task_id = %task.id, error = %e, "Formatting failed, submitting raw response");
                completion.text.clone()
            });

        let submission = match self.sink.submit(&task.id, &response).await {
            Ok(ack) => ack,
            Err(e) => {
                return TaskOutcome::Failed {
                    task_id: task.id,
                    error: e.to_string(),
                };
            }
        };

        let result = self.record_result(&task, &decision, &response, tokens_spent).await;

        TaskOutcome::Recorded(ProcessedTask {
            task_id: task.id,
            response,
            decision,
            tokens_spent,
            submission,
            result,
        })
    }

    async fn execute(
        &self,
        prompt: &str,
        decision: &RoutingDecision,
    ) -> Result<crate::inference::Completion> {
        let config = GenerationConfig::new(
            decision.model.clone(),
            u32::try_from(decision.allocated_tokens).unwrap_or(u32::MAX),
            decision.temperature,
        );

        let timeout = self.settings.inference_timeout;
        let completion = tokio::time::timeout(timeout, self.backend.generate(prompt, &config))
            .await
            .map_err(|_| Error::InferenceTimeout(timeout.as_secs()))??;

        if completion.text.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }
        Ok(completion)
    }

    /// Fetch the validator score and append the result; failures are logged
    async fn record_result(
        &self,
        task: &Task,
        decision: &RoutingDecision,
        response: &str,
        tokens_spent: u64,
    ) -> Option<TaskResult> {
        let score = match self.feedback.validator_score(&task.id, response).await {
            Ok(score) => score,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "No validator score, result not logged");
                return None;
            }
        };

        let result = TaskResult::new(
            task.id.clone(),
            score,
            tokens_spent,
            decision.model.clone(),
            decision.strategy.as_str(),
            task.subnet_id,
        );
        match self.tracker.record(result) {
            Ok(stored) => Some(stored),
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to record task result");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetAccount;
    use crate::inference::{Completion, TokenUsage};
    use crate::network::MockNetwork;
    use crate::routing::{Classification, ReasoningDepth, TaskType};
    use async_trait::async_trait;
    use rand::rngs::mock::StepRng;
    use tempfile::TempDir;

    struct FixedBackend(Result<Completion>);

    #[async_trait]
    impl InferenceBackend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &str, _config: &GenerationConfig) -> Result<Completion> {
            match &self.0 {
                Ok(c) => Ok(c.clone()),
                Err(e) => Err(Error::InferenceFailed(e.to_string())),
            }
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl InferenceBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &str, _config: &GenerationConfig) -> Result<Completion> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(Completion::new("too late"))
        }
    }

    fn ledger() -> BudgetLedger {
        BudgetLedger::in_memory()
            .with_account("openai", BudgetAccount::new(100_000, 0))
            .with_account("anthropic", BudgetAccount::new(100_000, 0))
            .with_account("google", BudgetAccount::new(100_000, 0))
    }

    fn pipeline(
        dir: &TempDir,
        backend: Arc<dyn InferenceBackend>,
        network: Arc<MockNetwork>,
    ) -> TaskPipeline {
        TaskPipeline::builder()
            .ledger(ledger())
            .tracker(PerformanceTracker::new(dir.path().join("task-history.jsonl")))
            .gate(AdmissionGate::with_rng(StepRng::new(0, 0)))
            .backend(backend)
            .submission_sink(network.clone())
            .validator_feedback(network)
            .build()
            .unwrap()
    }

    fn used(pipeline: &TaskPipeline, provider: &str) -> u64 {
        pipeline.ledger().account(provider).unwrap().used_this_month
    }

    #[test]
    fn test_format_response() {
        assert_eq!(format_response("  hi \n", 10).unwrap(), "hi");
        assert_eq!(format_response("héllo wörld", 5).unwrap(), "héllo");
        assert!(format_response(" \n ", 10).is_err());
    }

    #[test]
    fn test_build_requires_collaborators() {
        let err = TaskPipeline::builder().build().unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_successful_task_spends_once_and_records() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new().with_score("t-1", 0.9));
        let backend = Arc::new(FixedBackend(Ok(
            Completion::new("  The answer is 4.  ").with_usage(TokenUsage::new(30, 12)),
        )));
        let mut pipeline = pipeline(&dir, backend, network.clone());

        let outcome = pipeline
            .process(Task::new("What is 2+2?", 1).with_id("t-1"))
            .await;

        let TaskOutcome::Recorded(processed) = outcome else {
            panic!("expected recorded outcome, got {:?}", outcome);
        };
        assert_eq!(processed.response, "The answer is 4.");
        assert_eq!(processed.decision.model, "gemini-pro");
        assert_eq!(processed.tokens_spent, 42);
        assert_eq!(processed.result.as_ref().unwrap().validator_score, 0.9);

        assert_eq!(used(&pipeline, "google"), 42);
        assert_eq!(used(&pipeline, "openai"), 0);
        assert_eq!(network.submissions().await.len(), 1);
        assert_eq!(pipeline.tracker().history(10).unwrap().len(), 1);
        assert_eq!(pipeline.stats().recorded, 1);
    }

    #[tokio::test]
    async fn test_spend_estimated_without_usage() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new());
        let mut pipeline = pipeline(&dir, Arc::new(EchoBackend), network);

        let outcome = pipeline.process(Task::new("What is 2+2?", 1)).await;
        let TaskOutcome::Recorded(processed) = outcome else {
            panic!("expected recorded outcome");
        };
        assert!(processed.tokens_spent > 0);
        assert_eq!(used(&pipeline, "google"), processed.tokens_spent);
    }

    #[tokio::test]
    async fn test_rejected_task_spends_nothing() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new());
        let mut pipeline = pipeline(&dir, Arc::new(EchoBackend), network.clone());

        let task = Task::new("rank these", 1).with_classification(
            Classification::new(TaskType::Ranking, ReasoningDepth::Medium).with_confidence(0.49),
        );
        let outcome = pipeline.process(task).await;

        assert!(matches!(
            outcome,
            TaskOutcome::Rejected {
                reason: RejectReason::LowConfidence { .. },
                ..
            }
        ));
        assert_eq!(used(&pipeline, "openai"), 0);
        assert!(network.submissions().await.is_empty());
        assert!(pipeline.tracker().history(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_provider_budget_rejects() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new());
        let mut pipeline = pipeline(&dir, Arc::new(EchoBackend), network);
        let mut nearly_spent = BudgetAccount::new(100, 0);
        nearly_spent.used_this_month = 90;
        pipeline.ledger_mut().set_account("google", nearly_spent);

        let outcome = pipeline.process(Task::new("What is 2+2?", 1)).await;
        assert!(matches!(
            outcome,
            TaskOutcome::Rejected {
                reason: RejectReason::InsufficientBudget { ref provider, .. },
                ..
            } if provider == "google"
        ));
        assert_eq!(used(&pipeline, "google"), 0);
    }

    /// Bills the whole prompt plus every allocated output token
    struct FullCapBackend;

    #[async_trait]
    impl InferenceBackend for FullCapBackend {
        fn name(&self) -> &str {
            "full-cap"
        }

        async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<Completion> {
            let usage = TokenUsage::new(estimate_tokens(prompt, ""), u64::from(config.max_tokens));
            Ok(Completion::new("4").with_usage(usage))
        }
    }

    #[tokio::test]
    async fn test_full_cap_spend_stays_within_reserve() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new());
        let mut pipeline = pipeline(&dir, Arc::new(FullCapBackend), network);
        pipeline
            .ledger_mut()
            .set_account("google", BudgetAccount::new(1_000, 0));

        let outcome = pipeline.process(Task::new("What is 2+2?", 1)).await;
        let TaskOutcome::Recorded(processed) = outcome else {
            panic!("expected recorded outcome, got {:?}", outcome);
        };
        assert_eq!(processed.decision.allocated_tokens, 800);
        assert!(processed.tokens_spent > 800);
        assert!(used(&pipeline, "google") <= 900);
    }

    #[tokio::test]
    async fn test_prompt_tokens_count_against_reserve() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new());
        let mut pipeline = pipeline(&dir, Arc::new(FullCapBackend), network.clone());
        let mut account = BudgetAccount::new(1_000, 0);
        account.used_this_month = 100;
        pipeline.ledger_mut().set_account("google", account);

        // 100 used + 800 output lands exactly on the 900 ceiling, the prompt tips it over
        let outcome = pipeline.process(Task::new("What is 2+2?", 1)).await;
        let TaskOutcome::Rejected {
            reason: RejectReason::InsufficientBudget { needed, .. },
            ..
        } = outcome
        else {
            panic!("expected insufficient budget, got {:?}", outcome);
        };
        assert!(needed > 800);
        assert_eq!(used(&pipeline, "google"), 100);
        assert!(network.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_inference_spends_nothing_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new());
        let backend = Arc::new(FixedBackend(Err(Error::Other("provider down".to_string()))));
        let mut pipeline = pipeline(&dir, backend, network.clone());

        let outcome = pipeline.process(Task::new("What is 2+2?", 1)).await;
        assert!(matches!(outcome, TaskOutcome::Failed { .. }));
        assert_eq!(used(&pipeline, "google"), 0);
        assert!(network.submissions().await.is_empty());
        assert!(pipeline.tracker().history(10).unwrap().is_empty());
        assert_eq!(pipeline.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_empty_inference_text_fails() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new());
        let backend = Arc::new(FixedBackend(Ok(Completion::new("   "))));
        let mut pipeline = pipeline(&dir, backend, network);

        let outcome = pipeline.process(Task::new("What is 2+2?", 1)).await;
        let TaskOutcome::Failed { error, .. } = outcome else {
            panic!("expected failure");
        };
        assert!(error.contains("empty"));
    }

    #[tokio::test]
    async fn test_inference_timeout_fails() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new());
        let mut pipeline = TaskPipeline::builder()
            .ledger(ledger())
            .tracker(PerformanceTracker::new(dir.path().join("task-history.jsonl")))
            .gate(AdmissionGate::with_rng(StepRng::new(0, 0)))
            .backend(Arc::new(SlowBackend))
            .submission_sink(network.clone())
            .validator_feedback(network)
            .settings(PipelineSettings {
                inference_timeout: Duration::from_millis(50),
                ..Default::default()
            })
            .build()
            .unwrap();

        let outcome = pipeline.process(Task::new("What is 2+2?", 1)).await;
        let TaskOutcome::Failed { error, .. } = outcome else {
            panic!("expected timeout failure");
        };
        assert!(error.contains("timed out"));
        assert_eq!(used(&pipeline, "google"), 0);
    }

    #[tokio::test]
    async fn test_missing_feedback_still_recorded() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new().with_default_score(None));
        let mut pipeline = pipeline(&dir, Arc::new(EchoBackend), network);

        let outcome = pipeline.process(Task::new("What is 2+2?", 1)).await;
        let TaskOutcome::Recorded(processed) = outcome else {
            panic!("expected recorded outcome");
        };
        assert!(processed.result.is_none());
        assert!(used(&pipeline, "google") > 0);
        assert!(pipeline.tracker().history(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission_fails_after_spend() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockNetwork::new().with_rejected_submissions());
        let mut pipeline = pipeline(&dir, Arc::new(EchoBackend), network);

        let outcome = pipeline.process(Task::new("What is 2+2?", 1)).await;
        assert!(matches!(outcome, TaskOutcome::Failed { .. }));
        assert!(used(&pipeline, "google") > 0);
        assert!(pipeline.tracker().history(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_source_with_limit() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(
            MockNetwork::new().with_tasks((0..5).map(|i| Task::new(format!("Question {}?", i), 1))),
        );
        let mut pipeline = pipeline(&dir, Arc::new(EchoBackend), network.clone());

        let first = pipeline.run(network.as_ref(), Some(3)).await;
        assert_eq!(first.processed, 3);
        let rest = pipeline.run(network.as_ref(), None).await;
        assert_eq!(rest.processed, 2);
        assert_eq!(pipeline.stats().processed, 5);
    }
}
