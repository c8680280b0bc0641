//! The skillgate execution kernel: the governed skill runner.
//!
//! Every skill invocation follows the same pipeline:
//!
//!   Lookup → Circuit breaker → Policy → Enqueue → [Worker: Validate → Execute → Validate] → Breaker update → Audit
//!
//! The security invariant is absolute: a `SkillExecutor` is NEVER called for
//! a request unless its breaker admitted it, the policy engine returned an
//! allow verdict (or a human approved it), and its input passed the skill's
//! input schema. The only code path that reaches an executor runs through
//! the job queue, and the only way onto the queue is through admission.
//! Retried attempts pass the breaker again on the worker before they run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use skillgate_contracts::{
    approval::{ApprovalOutcome, ApprovalWorkflow},
    breaker::CircuitBreakerSnapshot,
    context::ExecutionContext,
    error::{GovernanceError, GovernanceResult, ValidationStage},
    execution::{AuditEntry, AuditRecord, ExecutionMetadata, ExecutionResult},
    job::{Job, JobId, JobStatus},
    skill::Skill,
    stats::{HealthChecks, HealthReport, KernelStatistics},
};

use crate::breaker::CircuitBreakerRegistry;
use crate::config::KernelConfig;
use crate::lock;
use crate::queue::{JobHandler, JobOutcome, JobQueue, WorkerPool};
use crate::registry::{SagaRegistry, SkillRegistry};
use crate::saga::{SagaOrchestrator, SagaStep};
use crate::store::InMemoryJobStore;
use crate::traits::{AuditSink, JobStore, PolicyEngine, SchemaValidator, SkillExecutor};

/// State shared between the admission path and the worker pool.
struct KernelRuntime {
    skills: SkillRegistry,
    breakers: CircuitBreakerRegistry,
    validator: Arc<dyn SchemaValidator>,
}

impl KernelRuntime {
    async fn process(&self, job: &Job) -> JobOutcome {
        let entry = self
            .skills
            .get(&job.skill_id)
            .ok_or_else(|| GovernanceError::SkillNotFound { skill_id: job.skill_id.clone() })?;
        let skill = &entry.skill;

        if let Some(schema) = &skill.input_schema {
            self.validate(&skill.id, ValidationStage::Input, schema, &job.input)?;
        }

        // Run on its own task so a panicking executor fails only this attempt.
        let executor = Arc::clone(&entry.executor);
        let (input, context) = (job.input.clone(), job.context.clone());
        let output = match tokio::spawn(async move { executor.execute(&input, &context).await }).await {
            Ok(output) => output?,
            Err(e) => {
                warn!(job_id = %job.id, skill_id = %skill.id, error = %e, "skill executor aborted");
                let reason = if e.is_panic() { "executor panicked" } else { "executor cancelled" };
                return Err(GovernanceError::execution(&skill.id, reason));
            }
        };

        if let Some(schema) = &skill.output_schema {
            self.validate(&skill.id, ValidationStage::Output, schema, &output)?;
        }

        Ok(output)
    }

    fn validate(
        &self,
        skill_id: &str,
        stage: ValidationStage,
        schema: &Value,
        instance: &Value,
    ) -> GovernanceResult<()> {
        let report = self.validator.validate(schema, instance).map_err(|e| {
            GovernanceError::Validation { skill_id: skill_id.to_string(), stage, reason: e.to_string() }
        })?;
        if !report.passed {
            return Err(GovernanceError::Validation {
                skill_id: skill_id.to_string(),
                stage,
                reason: report.summary(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler for KernelRuntime {
    async fn handle(&self, job: &Job) -> JobOutcome {
        // The first attempt passed the breaker during admission.
        if job.attempts_made > 1 {
            self.breakers.check(&job.skill_id)?;
        }
        let outcome = self.process(job).await;
        // Every failed attempt counts, validation failures included.
        match &outcome {
            Ok(_) => self.breakers.record_success(&job.skill_id),
            Err(_) => self.breakers.record_failure(&job.skill_id),
        }
        outcome
    }
}

/// The central kernel that admits, dispatches and accounts for skill executions.
///
/// Construct one kernel per process and pass it by reference. The lifecycle
/// is explicit: `new` → `start` (inside a tokio runtime) → `shutdown`.
/// A kernel that has been shut down cannot be restarted.
pub struct ExecutionKernel {
    config: KernelConfig,
    runtime: Arc<KernelRuntime>,
    policy: Arc<dyn PolicyEngine>,
    audit: Arc<dyn AuditSink>,
    sagas: SagaRegistry,
    orchestrator: SagaOrchestrator,
    queue: Arc<JobQueue>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl ExecutionKernel {
    /// Create a kernel with the given trusted components.
    pub fn new(
        config: KernelConfig,
        policy: Arc<dyn PolicyEngine>,
        validator: Arc<dyn SchemaValidator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let runtime = Arc::new(KernelRuntime {
            skills: SkillRegistry::new(),
            breakers: CircuitBreakerRegistry::new(&config.breaker),
            validator,
        });
        let queue = Arc::new(JobQueue::new(
            config.queue.retain_completed,
            config.queue.retain_failed,
            Arc::new(InMemoryJobStore::new()),
        ));
        Self {
            orchestrator: SagaOrchestrator::new(&config.saga),
            config,
            runtime,
            policy,
            audit,
            sagas: SagaRegistry::new(),
            queue,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Persist admitted jobs in `store` instead of process memory.
    ///
    /// Call before `start`. Jobs the store still holds as unfinished are
    /// queued again when the kernel starts, so register their skills first;
    /// a recovered job whose skill is missing fails with `SKILL_NOT_FOUND`.
    pub fn with_job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.queue = Arc::new(JobQueue::new(
            self.config.queue.retain_completed,
            self.config.queue.retain_failed,
            store,
        ));
        self
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Spawn the dispatcher and the maintenance timers. The dispatcher first
    /// re-queues every unfinished job from the job store.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// running does nothing.
    pub fn start(&self) {
        if self.cancel.is_cancelled()
            || self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err()
        {
            return;
        }

        let handler: Arc<dyn JobHandler> = self.runtime.clone();
        let dispatcher = WorkerPool::spawn(
            Arc::clone(&self.queue),
            handler,
            self.config.worker.concurrency,
            self.cancel.clone(),
        );

        let policy = Arc::clone(&self.policy);
        let sweep = spawn_periodic(
            Duration::from_secs(self.config.approvals.sweep_interval_secs),
            self.cancel.clone(),
            move || {
                let expired = policy.cleanup_expired_workflows(Utc::now());
                if expired > 0 {
                    info!(expired, "expired approval workflows");
                }
            },
        );

        let runtime = Arc::clone(&self.runtime);
        let decay = spawn_periodic(
            Duration::from_secs(self.config.breaker.decay_interval_secs),
            self.cancel.clone(),
            move || {
                let decayed = runtime.breakers.decay();
                debug!(decayed, "circuit breaker failure counts decayed");
            },
        );

        lock(&self.tasks).extend([dispatcher, sweep, decay]);
        info!(concurrency = self.config.worker.concurrency, "execution kernel started");
    }

    /// Graceful drain: stop accepting work, let queued and in-flight jobs
    /// finish, stop the maintenance timers.
    pub async fn shutdown(&self) {
        info!("shutting down execution kernel");
        self.queue.close();
        self.cancel.cancel();

        let handles = std::mem::take(&mut *lock(&self.tasks));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "kernel task ended abnormally");
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("execution kernel shutdown complete");
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Register a skill and create its circuit breaker.
    pub fn register_skill(&self, skill: Skill, executor: Arc<dyn SkillExecutor>) -> Arc<Skill> {
        let skill = self.runtime.skills.insert(skill, executor);
        self.runtime.breakers.register(&skill.id);
        info!(skill_id = %skill.id, name = %skill.name, "registered skill");
        skill
    }

    pub fn register_saga(&self, saga_id: impl Into<String>, steps: Vec<SagaStep>) {
        let saga_id = saga_id.into();
        info!(saga_id = %saga_id, steps = steps.len(), "registered saga");
        self.sagas.insert(saga_id, steps);
    }

    // ── Execution ────────────────────────────────────────────────────────────

    /// Run a skill through the full governance pipeline.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for an unregistered skill or a failing audit sink.
    /// Denials, pending approvals, open breakers, execution failures and
    /// timeouts are all `Ok` results with `success = false`.
    pub async fn execute_skill(
        &self,
        skill_id: &str,
        input: Value,
        context: ExecutionContext,
    ) -> GovernanceResult<ExecutionResult> {
        let entry = self
            .runtime
            .skills
            .get(skill_id)
            .ok_or_else(|| GovernanceError::SkillNotFound { skill_id: skill_id.to_string() })?;
        let skill = entry.skill;

        let started = Instant::now();
        let context = with_transaction(context);
        let transaction_id = context.transaction_id.clone().unwrap_or_default();

        debug!(skill_id = %skill.id, transaction_id = %transaction_id, "execute skill");

        let outcome = match self.admit(&skill, &context, &input) {
            Ok(()) => self.dispatch(&skill, input, context, started).await,
            Err(err) => Err(err),
        };

        self.settle(&skill.id, &transaction_id, started, outcome, None)
    }

    /// Execute an approved request exactly once, bypassing policy evaluation.
    ///
    /// The circuit breaker is still consulted. If the request cannot be
    /// queued (open breaker, closed queue, store failure) the claim is
    /// released and the workflow may be resumed again later.
    ///
    /// # Errors
    ///
    /// `WorkflowNotFound` or `WorkflowNotApproved` when the workflow cannot be
    /// resumed, `SkillNotFound` if the skill was unregistered meanwhile.
    pub async fn resume_approved(&self, workflow_id: &str) -> GovernanceResult<ExecutionResult> {
        let workflow = self.policy.claim_approved(workflow_id)?;
        let Some(entry) = self.runtime.skills.get(&workflow.skill_id) else {
            self.policy.release_claim(workflow_id);
            return Err(GovernanceError::SkillNotFound { skill_id: workflow.skill_id.clone() });
        };
        let skill = entry.skill;

        let started = Instant::now();
        let details = workflow.request_details;
        let context = with_transaction(details.context);
        let transaction_id = context.transaction_id.clone().unwrap_or_default();

        info!(workflow_id = %workflow_id, skill_id = %skill.id, "resuming approved request");

        let submitted = match self.runtime.breakers.check(&skill.id) {
            Ok(()) => self.submit(&skill, details.input, context).await,
            Err(err) => Err(err),
        };
        let outcome = match submitted {
            Ok(submitted) => self.collect(&skill, submitted, started).await,
            Err(err) => {
                self.policy.release_claim(workflow_id);
                info!(workflow_id = %workflow_id, error = %err, "approved request not queued, claim released");
                Err(err)
            }
        };

        let resumed = AuditEntry::new(
            "approval_resumed",
            json!({ "workflowId": workflow_id, "policyId": workflow.policy_id }),
        );
        self.settle(&skill.id, &transaction_id, started, outcome, Some(resumed))
    }

    /// Run a registered saga.
    ///
    /// # Errors
    ///
    /// `SagaNotFound` for an unregistered saga. Step failures are reported
    /// as an `Ok` result carrying `SAGA_EXECUTION_FAILED`.
    pub async fn execute_saga(
        &self,
        saga_id: &str,
        initial: Map<String, Value>,
        context: ExecutionContext,
    ) -> GovernanceResult<ExecutionResult> {
        let steps = self
            .sagas
            .get(saga_id)
            .ok_or_else(|| GovernanceError::SagaNotFound { saga_id: saga_id.to_string() })?;

        let started = Instant::now();
        let context = with_transaction(context);
        let transaction_id = context.transaction_id.clone().unwrap_or_default();

        let report = self.orchestrator.run(saga_id, &steps, initial, &transaction_id).await;
        let metadata = ExecutionMetadata {
            execution_time_ms: elapsed_ms(started),
            rollback_id: Some(transaction_id.clone()),
            audit_trail: report.audit_trail,
        };

        let result = match report.outcome {
            Ok(context) => {
                info!(saga_id = %saga_id, transaction_id = %transaction_id, "saga completed");
                ExecutionResult::succeeded(Value::Object(context), metadata)
            }
            Err(err) => {
                warn!(saga_id = %saga_id, transaction_id = %transaction_id, error = %err, "saga failed");
                ExecutionResult::failed(&err, metadata)
            }
        };

        self.record_audit(&transaction_id, saga_id, &result.metadata.audit_trail)?;
        Ok(result)
    }

    // ── Approvals ────────────────────────────────────────────────────────────

    pub fn process_approval(
        &self,
        workflow_id: &str,
        step_id: &str,
        approved: bool,
        approver: &str,
        rationale: Option<&str>,
    ) -> GovernanceResult<ApprovalOutcome> {
        self.policy.process_approval(workflow_id, step_id, approved, approver, rationale)
    }

    pub fn approval_status(&self, workflow_id: &str) -> Option<ApprovalWorkflow> {
        self.policy.approval_status(workflow_id)
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// One approval sweep, as run by the periodic timer.
    pub fn sweep_expired_workflows(&self) -> usize {
        self.policy.cleanup_expired_workflows(Utc::now())
    }

    /// One breaker decay tick, as run by the periodic timer.
    pub fn decay_circuit_breakers(&self) -> usize {
        self.runtime.breakers.decay()
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn circuit_breakers(&self) -> &CircuitBreakerRegistry {
        &self.runtime.breakers
    }

    pub fn circuit_breaker(&self, skill_id: &str) -> Option<CircuitBreakerSnapshot> {
        self.runtime.breakers.snapshot(skill_id)
    }

    pub fn job_status(&self, job_id: &JobId) -> JobStatus {
        self.queue.status(job_id)
    }

    pub fn statistics(&self) -> KernelStatistics {
        KernelStatistics {
            registered_skills: self.runtime.skills.len(),
            registered_sagas: self.sagas.len(),
            pending_jobs: self.queue.pending(),
            running_jobs: self.queue.running(),
            worker_concurrency: self.config.worker.concurrency,
            circuit_breakers: self.runtime.breakers.snapshots(),
            policies: self.policy.statistics(),
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport::from_checks(HealthChecks {
            running: self.running.load(Ordering::SeqCst) && self.queue.is_accepting(),
            skills_registered: !self.runtime.skills.is_empty(),
            policies_loaded: self.policy.statistics().total_policies > 0,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ── Pipeline internals ───────────────────────────────────────────────────

    /// Breaker then policy. Runs on the caller's path and never waits on workers.
    fn admit(&self, skill: &Skill, context: &ExecutionContext, input: &Value) -> GovernanceResult<()> {
        self.runtime.breakers.check(&skill.id)?;

        let decision = self.policy.evaluate(skill, context, input)?;

        if decision.requires_approval {
            let workflow_id = decision.workflow_id.unwrap_or_default();
            info!(skill_id = %skill.id, workflow_id = %workflow_id, "execution awaiting approval");
            return Err(GovernanceError::ApprovalRequired {
                workflow_id,
                reason: decision.reason.unwrap_or_else(|| "approval required".to_string()),
            });
        }

        if !decision.allowed {
            let policy_id =
                decision.violated_policies.first().cloned().unwrap_or_else(|| "unknown".to_string());
            warn!(skill_id = %skill.id, policy_id = %policy_id, "policy denied execution");
            return Err(GovernanceError::PolicyViolation {
                policy_id,
                action: skill.id.clone(),
                reason: decision.reason.unwrap_or_else(|| "policy violation".to_string()),
            });
        }

        Ok(())
    }

    /// Enqueue, then either wait for the outcome or return the job reference.
    async fn dispatch(
        &self,
        skill: &Skill,
        input: Value,
        context: ExecutionContext,
        started: Instant,
    ) -> GovernanceResult<ExecutionResult> {
        let submitted = self.submit(skill, input, context).await?;
        self.collect(skill, submitted, started).await
    }

    /// Build the job and put it on the queue. An `Err` means it was never queued.
    async fn submit(&self, skill: &Skill, input: Value, context: ExecutionContext) -> GovernanceResult<Submitted> {
        let sync = context.sync;
        let transaction_id = context.transaction_id.clone().unwrap_or_default();
        let priority = if skill.is_admin() { self.config.queue.admin_priority } else { 0 };

        let job = Job {
            id: JobId::new(),
            skill_id: skill.id.clone(),
            skill_name: skill.name.clone(),
            input,
            context,
            priority,
            attempts: self.config.queue.default_attempts,
            attempts_made: 0,
            backoff: self.config.queue.backoff_policy(),
            created_at: Utc::now(),
        };
        let job_id = job.id.clone();

        let waiter = sync.then(|| self.queue.subscribe(&job_id));
        if let Err(err) = self.queue.enqueue(job).await {
            self.queue.unsubscribe(&job_id);
            return Err(err);
        }
        info!(skill_id = %skill.id, job_id = %job_id, priority, "queued skill execution");
        Ok(Submitted { job_id, transaction_id, waiter })
    }

    /// Wait for a synchronous job, or describe the queued one.
    async fn collect(&self, skill: &Skill, submitted: Submitted, started: Instant) -> GovernanceResult<ExecutionResult> {
        let Submitted { job_id, transaction_id, waiter } = submitted;

        let Some(waiter) = waiter else {
            return Ok(ExecutionResult::succeeded(
                json!({ "jobId": job_id.to_string(), "transactionId": transaction_id }),
                ExecutionMetadata {
                    execution_time_ms: elapsed_ms(started),
                    rollback_id: None,
                    audit_trail: vec![AuditEntry::new(
                        "job_queued",
                        json!({ "jobId": job_id.to_string(), "skillId": skill.id }),
                    )],
                },
            ));
        };

        let timeout = self.config.sync_timeout();
        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(Ok(output))) => Ok(ExecutionResult::succeeded(
                output,
                ExecutionMetadata {
                    execution_time_ms: elapsed_ms(started),
                    rollback_id: None,
                    audit_trail: vec![AuditEntry::new(
                        "job_completed",
                        json!({ "jobId": job_id.to_string() }),
                    )],
                },
            )),
            // The worker already charged the breaker for this failure.
            Ok(Ok(Err(err))) => Ok(ExecutionResult::failed(
                &err,
                ExecutionMetadata {
                    execution_time_ms: elapsed_ms(started),
                    rollback_id: None,
                    audit_trail: vec![AuditEntry::new(
                        "job_failed",
                        json!({ "jobId": job_id.to_string(), "error": err.to_string(), "code": err.code() }),
                    )],
                },
            )),
            Ok(Err(_)) => Err(GovernanceError::QueueClosed),
            Err(_) => {
                self.queue.unsubscribe(&job_id);
                warn!(job_id = %job_id, timeout_ms = self.config.sync_timeout_ms, "synchronous wait timed out");
                Err(GovernanceError::ExecutionTimeout {
                    job_id: job_id.to_string(),
                    timeout_ms: self.config.sync_timeout_ms,
                })
            }
        }
    }

    /// Turn an admission/dispatch outcome into the caller-facing result and
    /// hand every audit entry to the sink. Errors are charged to the breaker.
    fn settle(
        &self,
        skill_id: &str,
        transaction_id: &str,
        started: Instant,
        outcome: GovernanceResult<ExecutionResult>,
        lead: Option<AuditEntry>,
    ) -> GovernanceResult<ExecutionResult> {
        let mut result = match outcome {
            Ok(result) => result,
            Err(err) => {
                self.runtime.breakers.record_failure(skill_id);
                ExecutionResult::failed(
                    &err,
                    ExecutionMetadata {
                        execution_time_ms: elapsed_ms(started),
                        rollback_id: None,
                        audit_trail: vec![AuditEntry::new(
                            "execution_failed",
                            json!({ "error": err.to_string(), "code": err.code() }),
                        )],
                    },
                )
            }
        };

        if let Some(entry) = lead {
            result.metadata.audit_trail.insert(0, entry);
        }
        self.record_audit(transaction_id, skill_id, &result.metadata.audit_trail)?;
        Ok(result)
    }

    fn record_audit(&self, transaction_id: &str, subject: &str, entries: &[AuditEntry]) -> GovernanceResult<()> {
        for entry in entries {
            self.audit.record(&AuditRecord {
                transaction_id: transaction_id.to_string(),
                subject: subject.to_string(),
                entry: entry.clone(),
            })?;
        }
        Ok(())
    }
}

/// A job that made it onto the queue.
struct Submitted {
    job_id: JobId,
    transaction_id: String,
    /// Present for synchronous callers.
    waiter: Option<oneshot::Receiver<JobOutcome>>,
}

fn with_transaction(context: ExecutionContext) -> ExecutionContext {
    if context.transaction_id.is_some() {
        context
    } else {
        context.with_transaction_id(Uuid::new_v4().to_string())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn spawn_periodic<F>(period: Duration, cancel: CancellationToken, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    let period = period.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => tick(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use skillgate_contracts::{
        approval::{ApprovalStep, RequestDetails, StepStatus, WorkflowStatus, WorkflowTimeline},
        breaker::CircuitState,
        context::UserRole,
        job::BackoffKind,
        policy::PolicyDecision,
        skill::SkillCategory,
        stats::HealthStatus,
        validation::{ValidationFailure, ValidationReport},
    };

    use super::*;
    use crate::traits::{FnExecutor, SagaAction};

    // ── Mock components ──────────────────────────────────────────────────────

    /// Returns a fixed decision and counts evaluations.
    struct MockPolicy {
        decision: PolicyDecision,
        evaluations: AtomicU32,
        approved: Mutex<Option<ApprovalWorkflow>>,
        claimed: Mutex<Option<ApprovalWorkflow>>,
        rules: usize,
    }

    impl MockPolicy {
        fn returning(decision: PolicyDecision) -> Arc<Self> {
            Arc::new(Self {
                decision,
                evaluations: AtomicU32::new(0),
                approved: Mutex::new(None),
                claimed: Mutex::new(None),
                rules: 1,
            })
        }
    }

    impl PolicyEngine for MockPolicy {
        fn evaluate(&self, _: &Skill, _: &ExecutionContext, _: &Value) -> GovernanceResult<PolicyDecision> {
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            Ok(self.decision.clone())
        }

        fn claim_approved(&self, workflow_id: &str) -> GovernanceResult<ApprovalWorkflow> {
            let workflow = self.approved.lock().unwrap().take().ok_or_else(|| {
                GovernanceError::WorkflowNotApproved {
                    workflow_id: workflow_id.to_string(),
                    reason: "already resumed".to_string(),
                }
            })?;
            *self.claimed.lock().unwrap() = Some(workflow.clone());
            Ok(workflow)
        }

        fn release_claim(&self, _workflow_id: &str) {
            if let Some(workflow) = self.claimed.lock().unwrap().take() {
                *self.approved.lock().unwrap() = Some(workflow);
            }
        }

        fn statistics(&self) -> skillgate_contracts::policy::PolicyStatistics {
            skillgate_contracts::policy::PolicyStatistics {
                total_policies: self.rules,
                ..Default::default()
            }
        }
    }

    /// Fails any object instance missing a key listed in the schema's `required`.
    struct MockValidator;

    impl SchemaValidator for MockValidator {
        fn validate(&self, schema: &Value, instance: &Value) -> GovernanceResult<ValidationReport> {
            let failures: Vec<_> = schema["required"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|key| key.as_str())
                .filter(|key| instance.get(key).is_none())
                .map(|key| ValidationFailure { path: "/".into(), message: format!("missing {key}") })
                .collect();
            Ok(ValidationReport::from_failures(failures))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<AuditRecord>>,
    }

    impl AuditSink for RecordingSink {
        fn record(&self, record: &AuditRecord) -> GovernanceResult<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn test_config() -> KernelConfig {
        let mut config = KernelConfig::default();
        config.queue.backoff = BackoffKind::Fixed;
        config.queue.backoff_delay_ms = 1;
        config.sync_timeout_ms = 2_000;
        config
    }

    fn kernel_with(config: KernelConfig, policy: Arc<MockPolicy>) -> (ExecutionKernel, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let kernel = ExecutionKernel::new(config, policy, Arc::new(MockValidator), sink.clone());
        (kernel, sink)
    }

    /// An executor echoing its input; counts calls.
    fn counting_executor(calls: &Arc<AtomicU32>) -> Arc<dyn SkillExecutor> {
        let calls = Arc::clone(calls);
        Arc::new(FnExecutor::new(move |input: Value, _ctx| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "echo": input }))
            }
        }))
    }

    fn failing_executor(calls: &Arc<AtomicU32>) -> Arc<dyn SkillExecutor> {
        let calls = Arc::clone(calls);
        Arc::new(FnExecutor::new(move |_input, _ctx| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GovernanceError::execution("flaky", "backend down"))
            }
        }))
    }

    struct PanickingExecutor;

    #[async_trait]
    impl SkillExecutor for PanickingExecutor {
        async fn execute(&self, _input: &Value, _context: &ExecutionContext) -> GovernanceResult<Value> {
            panic!("executor bug")
        }
    }

    fn customer() -> ExecutionContext {
        ExecutionContext::new("user-1", UserRole::Customer)
    }

    // ── Admission ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_skill_propagates() {
        let (kernel, _) = kernel_with(test_config(), MockPolicy::returning(PolicyDecision::allow()));
        let err = kernel.execute_skill("ghost", json!({}), customer()).await.unwrap_err();
        assert_eq!(err.code(), "SKILL_NOT_FOUND");
    }

    #[tokio::test]
    async fn async_execution_returns_job_reference() {
        let calls = Arc::new(AtomicU32::new(0));
        let (kernel, sink) = kernel_with(test_config(), MockPolicy::returning(PolicyDecision::allow()));
        kernel.register_skill(Skill::builder("Echo").id("echo").build(), counting_executor(&calls));
        kernel.start();

        let result = kernel
            .execute_skill("echo", json!({ "m": 1 }), customer().with_transaction_id("tx-1"))
            .await
            .unwrap();

        assert!(result.success);
        let payload = result.result.unwrap();
        assert_eq!(payload["transactionId"], json!("tx-1"));
        assert_eq!(result.metadata.audit_trail[0].event, "job_queued");

        kernel.shutdown().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let job_id = JobId(payload["jobId"].as_str().unwrap().parse().unwrap());
        assert!(matches!(kernel.job_status(&job_id), JobStatus::Completed { .. }));

        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].transaction_id, "tx-1");
        assert_eq!(records[0].subject, "echo");
    }

    #[tokio::test]
    async fn sync_execution_returns_output() {
        let calls = Arc::new(AtomicU32::new(0));
        let (kernel, _) = kernel_with(test_config(), MockPolicy::returning(PolicyDecision::allow()));
        kernel.register_skill(Skill::builder("Echo").id("echo").build(), counting_executor(&calls));
        kernel.start();

        let result = kernel.execute_skill("echo", json!("hi"), customer().synchronous()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.result, Some(json!({ "echo": "hi" })));
        assert_eq!(result.metadata.audit_trail[0].event, "job_completed");
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn deny_fails_without_executing_and_charges_breaker() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = MockPolicy::returning(PolicyDecision::deny("geo-restriction", "outside Nepal"));
        let (kernel, _) = kernel_with(test_config(), policy);
        kernel.register_skill(Skill::builder("Book").id("book").build(), counting_executor(&calls));
        kernel.start();

        let result = kernel.execute_skill("book", json!({}), customer().synchronous()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error_code(), Some("POLICY_VIOLATION"));
        assert_eq!(result.error.as_ref().unwrap().policy_id.as_deref(), Some("geo-restriction"));
        assert_eq!(result.metadata.audit_trail[0].event, "execution_failed");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(kernel.circuit_breaker("book").unwrap().failures, 1);
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn approval_required_carries_workflow_id() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = MockPolicy::returning(PolicyDecision::approval("wf-42", "high value"));
        let (kernel, _) = kernel_with(test_config(), policy);
        kernel.register_skill(Skill::builder("Pay").id("pay").build(), counting_executor(&calls));

        let result = kernel.execute_skill("pay", json!({}), customer()).await.unwrap();

        assert_eq!(result.error_code(), Some("APPROVAL_REQUIRED"));
        assert_eq!(result.error.unwrap().workflow_id.as_deref(), Some("wf-42"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn open_breaker_fails_fast_for_concurrent_callers() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = MockPolicy::returning(PolicyDecision::allow());
        let mut config = test_config();
        config.breaker.failure_threshold = 1;
        let (kernel, _) = kernel_with(config, Arc::clone(&policy));
        kernel.register_skill(Skill::builder("Flaky").id("flaky").build(), counting_executor(&calls));
        kernel.circuit_breakers().record_failure("flaky");
        let kernel = Arc::new(kernel);

        let a = tokio::spawn({
            let kernel = Arc::clone(&kernel);
            async move { kernel.execute_skill("flaky", json!({}), customer().synchronous()).await }
        });
        let b = tokio::spawn({
            let kernel = Arc::clone(&kernel);
            async move { kernel.execute_skill("flaky", json!({}), customer().synchronous()).await }
        });

        for handle in [a, b] {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.error_code(), Some("CIRCUIT_BREAKER_OPEN"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(policy.evaluations.load(Ordering::SeqCst), 0);
    }

    // ── Worker execution ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_input_never_reaches_executor() {
        let calls = Arc::new(AtomicU32::new(0));
        let (kernel, _) = kernel_with(test_config(), MockPolicy::returning(PolicyDecision::allow()));
        let skill = Skill::builder("Chat")
            .id("chat")
            .input_schema(json!({ "required": ["message"] }))
            .build();
        kernel.register_skill(skill, counting_executor(&calls));
        kernel.start();

        let result = kernel.execute_skill("chat", json!({}), customer().synchronous()).await.unwrap();

        assert_eq!(result.error_code(), Some("VALIDATION_ERROR"));
        assert!(result.error_message().unwrap().contains("input validation failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // Not retried, charged once.
        assert_eq!(kernel.circuit_breaker("chat").unwrap().failures, 1);
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn valid_input_and_output_pass() {
        let calls = Arc::new(AtomicU32::new(0));
        let (kernel, _) = kernel_with(test_config(), MockPolicy::returning(PolicyDecision::allow()));
        let skill = Skill::builder("Chat")
            .id("chat")
            .input_schema(json!({ "required": ["message"] }))
            .output_schema(json!({ "required": ["echo"] }))
            .build();
        kernel.register_skill(skill, counting_executor(&calls));
        kernel.start();

        let result = kernel
            .execute_skill("chat", json!({ "message": "hi" }), customer().synchronous())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn output_violation_is_validation_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let (kernel, _) = kernel_with(test_config(), MockPolicy::returning(PolicyDecision::allow()));
        let skill = Skill::builder("Chat").id("chat").output_schema(json!({ "required": ["reply"] })).build();
        kernel.register_skill(skill, counting_executor(&calls));
        kernel.start();

        let result = kernel.execute_skill("chat", json!({}), customer().synchronous()).await.unwrap();

        assert_eq!(result.error_code(), Some("VALIDATION_ERROR"));
        assert!(result.error_message().unwrap().contains("output validation failed"));
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn executor_failure_retried_then_reported() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut config = test_config();
        config.queue.default_attempts = 2;
        let (kernel, _) = kernel_with(config, MockPolicy::returning(PolicyDecision::allow()));
        kernel.register_skill(Skill::builder("Flaky").id("flaky").build(), failing_executor(&calls));
        kernel.start();

        let result = kernel.execute_skill("flaky", json!({}), customer().synchronous()).await.unwrap();

        assert_eq!(result.error_code(), Some("EXECUTION_FAILED"));
        assert_eq!(result.metadata.audit_trail[0].event, "job_failed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(kernel.circuit_breaker("flaky").unwrap().failures, 2);
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn retry_waits_on_open_breaker() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut config = test_config();
        config.queue.default_attempts = 3;
        config.breaker.failure_threshold = 1;
        let (kernel, _) = kernel_with(config, MockPolicy::returning(PolicyDecision::allow()));
        kernel.register_skill(Skill::builder("Flaky").id("flaky").build(), failing_executor(&calls));
        kernel.start();

        let result = kernel.execute_skill("flaky", json!({}), customer().synchronous()).await.unwrap();

        // The first failure opened the breaker; later attempts never reached the executor.
        assert_eq!(result.error_code(), Some("CIRCUIT_BREAKER_OPEN"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snapshot = kernel.circuit_breaker("flaky").unwrap();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.failures, 1);
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_executor_fails_the_job() {
        let mut config = test_config();
        config.queue.default_attempts = 1;
        let (kernel, _) = kernel_with(config, MockPolicy::returning(PolicyDecision::allow()));
        kernel.register_skill(Skill::builder("Buggy").id("buggy").build(), Arc::new(PanickingExecutor));
        kernel.start();

        let result = kernel.execute_skill("buggy", json!({}), customer().synchronous()).await.unwrap();

        assert_eq!(result.error_code(), Some("EXECUTION_FAILED"));
        assert!(result.error_message().unwrap().contains("executor panicked"));
        assert_eq!(kernel.statistics().running_jobs, 0);
        assert_eq!(kernel.circuit_breaker("buggy").unwrap().failures, 1);
        assert!(tokio::time::timeout(Duration::from_secs(3), kernel.shutdown()).await.is_ok());
    }

    #[tokio::test]
    async fn half_open_success_closes_breaker() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut config = test_config();
        config.breaker.failure_threshold = 1;
        config.breaker.recovery_timeout_ms = 0;
        let (kernel, _) = kernel_with(config, MockPolicy::returning(PolicyDecision::allow()));
        kernel.register_skill(Skill::builder("Echo").id("echo").build(), counting_executor(&calls));
        kernel.circuit_breakers().record_failure("echo");
        assert_eq!(kernel.circuit_breaker("echo").unwrap().state, CircuitState::Open);
        kernel.start();

        let result = kernel.execute_skill("echo", json!({}), customer().synchronous()).await.unwrap();

        assert!(result.success);
        let snapshot = kernel.circuit_breaker("echo").unwrap();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failures, 0);
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn sync_wait_times_out_as_failed_result() {
        let mut config = test_config();
        config.sync_timeout_ms = 20;
        let (kernel, _) = kernel_with(config, MockPolicy::returning(PolicyDecision::allow()));
        let slow = Arc::new(FnExecutor::new(|_input, _ctx| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!("late"))
        }));
        kernel.register_skill(Skill::builder("Slow").id("slow").build(), slow);
        kernel.start();

        let result = kernel.execute_skill("slow", json!({}), customer().synchronous()).await.unwrap();

        assert_eq!(result.error_code(), Some("EXECUTION_TIMEOUT"));
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn admin_skills_jump_the_queue() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut config = test_config();
        config.worker.concurrency = 1;
        let (kernel, _) = kernel_with(config, MockPolicy::returning(PolicyDecision::allow()));

        for (id, category) in [("customer-task", SkillCategory::Customer), ("admin-task", SkillCategory::Admin)] {
            let order = Arc::clone(&order);
            let executor = Arc::new(FnExecutor::new(move |_input, ctx: ExecutionContext| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(ctx.user_id.clone());
                    Ok(Value::Null)
                }
            }));
            kernel.register_skill(Skill::builder(id).id(id).category(category).build(), executor);
        }

        // Queued before the dispatcher starts, customer first.
        kernel
            .execute_skill("customer-task", json!({}), ExecutionContext::new("customer", UserRole::Customer))
            .await
            .unwrap();
        kernel
            .execute_skill("admin-task", json!({}), ExecutionContext::new("admin", UserRole::Admin))
            .await
            .unwrap();
        assert_eq!(kernel.statistics().pending_jobs, 2);

        kernel.start();
        kernel.shutdown().await;

        assert_eq!(*order.lock().unwrap(), vec!["admin".to_string(), "customer".to_string()]);
    }

    // ── Approval resume ──────────────────────────────────────────────────────

    fn approved_workflow(skill_id: &str) -> ApprovalWorkflow {
        let now = Utc::now();
        ApprovalWorkflow {
            workflow_id: "wf-1".into(),
            initiator: "user-1".into(),
            skill_id: skill_id.into(),
            request_details: RequestDetails {
                action: skill_id.into(),
                input: json!({ "amount": 60_000 }),
                context: customer().synchronous(),
                risk_score: 0.4,
            },
            steps: vec![ApprovalStep {
                step_id: "step-1".into(),
                approver_role: "admin".into(),
                approver_user: Some("ops".into()),
                timeout_minutes: 60,
                status: StepStatus::Approved,
                completed_at: Some(now),
                rationale: None,
            }],
            current_step: 0,
            status: WorkflowStatus::Approved,
            timeline: WorkflowTimeline { initiated: now, deadline: now, completed: Some(now) },
            policy_id: "high-value".into(),
            reason: "high value".into(),
            resumed_at: None,
        }
    }

    #[tokio::test]
    async fn resume_executes_approved_request_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = MockPolicy::returning(PolicyDecision::approval("wf-1", "high value"));
        *policy.approved.lock().unwrap() = Some(approved_workflow("pay"));
        let (kernel, _) = kernel_with(test_config(), Arc::clone(&policy));
        kernel.register_skill(Skill::builder("Pay").id("pay").build(), counting_executor(&calls));
        kernel.start();

        let result = kernel.resume_approved("wf-1").await.unwrap();
        assert!(result.success);
        assert_eq!(result.result, Some(json!({ "echo": { "amount": 60_000 } })));
        assert_eq!(result.metadata.audit_trail[0].event, "approval_resumed");
        assert_eq!(policy.evaluations.load(Ordering::SeqCst), 0);

        let err = kernel.resume_approved("wf-1").await.unwrap_err();
        assert_eq!(err.code(), "WORKFLOW_NOT_APPROVED");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn resume_rejected_by_open_breaker_can_be_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut config = test_config();
        config.breaker.failure_threshold = 1;
        config.breaker.recovery_timeout_ms = 50;
        let policy = MockPolicy::returning(PolicyDecision::approval("wf-1", "high value"));
        *policy.approved.lock().unwrap() = Some(approved_workflow("pay"));
        let (kernel, _) = kernel_with(config, Arc::clone(&policy));
        kernel.register_skill(Skill::builder("Pay").id("pay").build(), counting_executor(&calls));
        kernel.start();

        kernel.circuit_breakers().record_failure("pay");
        let rejected = kernel.resume_approved("wf-1").await.unwrap();
        assert_eq!(rejected.error_code(), Some("CIRCUIT_BREAKER_OPEN"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let resumed = kernel.resume_approved("wf-1").await.unwrap();
        assert!(resumed.success, "error: {:?}", resumed.error);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = kernel.resume_approved("wf-1").await.unwrap_err();
        assert_eq!(err.code(), "WORKFLOW_NOT_APPROVED");
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn resume_after_shutdown_keeps_workflow_approved() {
        let policy = MockPolicy::returning(PolicyDecision::approval("wf-1", "high value"));
        *policy.approved.lock().unwrap() = Some(approved_workflow("pay"));
        let (kernel, _) = kernel_with(test_config(), Arc::clone(&policy));
        let calls = Arc::new(AtomicU32::new(0));
        kernel.register_skill(Skill::builder("Pay").id("pay").build(), counting_executor(&calls));
        kernel.start();
        kernel.shutdown().await;

        let result = kernel.resume_approved("wf-1").await.unwrap();
        assert_eq!(result.error_code(), Some("QUEUE_CLOSED"));
        assert!(policy.approved.lock().unwrap().is_some());
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn queued_jobs_survive_kernel_restart() {
        let calls = Arc::new(AtomicU32::new(0));
        let store = Arc::new(InMemoryJobStore::new());
        let policy = MockPolicy::returning(PolicyDecision::allow());

        // Never started: the job is admitted and persisted, then the kernel goes away.
        let (first, _) = kernel_with(test_config(), Arc::clone(&policy));
        let first = first.with_job_store(store.clone());
        first.register_skill(Skill::builder("Echo").id("echo").build(), counting_executor(&calls));
        let queued = first.execute_skill("echo", json!({ "m": 1 }), customer()).await.unwrap();
        let job_id = JobId(queued.result.unwrap()["jobId"].as_str().unwrap().parse().unwrap());
        drop(first);
        assert_eq!(store.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let (second, _) = kernel_with(test_config(), policy);
        let second = second.with_job_store(store.clone());
        second.register_skill(Skill::builder("Echo").id("echo").build(), counting_executor(&calls));
        second.start();
        second.shutdown().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(second.job_status(&job_id), JobStatus::Completed { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn recovered_job_without_skill_fails() {
        let store = Arc::new(InMemoryJobStore::new());
        let policy = MockPolicy::returning(PolicyDecision::allow());
        let calls = Arc::new(AtomicU32::new(0));

        let (first, _) = kernel_with(test_config(), Arc::clone(&policy));
        let first = first.with_job_store(store.clone());
        first.register_skill(Skill::builder("Echo").id("echo").build(), counting_executor(&calls));
        let queued = first.execute_skill("echo", json!({}), customer()).await.unwrap();
        let job_id = JobId(queued.result.unwrap()["jobId"].as_str().unwrap().parse().unwrap());
        drop(first);

        let (second, _) = kernel_with(test_config(), policy);
        let second = second.with_job_store(store.clone());
        second.start();
        second.shutdown().await;

        match second.job_status(&job_id) {
            JobStatus::Failed { error, .. } => assert!(error.contains("skill not found")),
            other => panic!("unexpected status {other:?}"),
        }
        assert!(store.is_empty());
    }

    // ── Sagas ────────────────────────────────────────────────────────────────

    struct Reserve;

    #[async_trait]
    impl SagaAction for Reserve {
        async fn execute(&self, context: &Map<String, Value>) -> GovernanceResult<Value> {
            Ok(json!({ "reserved": context["amount"] }))
        }

        async fn compensate(&self, _result: &Value) -> GovernanceResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn saga_result_carries_rollback_id() {
        let (kernel, sink) = kernel_with(test_config(), MockPolicy::returning(PolicyDecision::allow()));
        kernel.register_saga("payment", vec![SagaStep::new("1", "reserve", Arc::new(Reserve))]);

        let mut initial = Map::new();
        initial.insert("amount".into(), json!(500));
        let result = kernel
            .execute_saga("payment", initial, customer().with_transaction_id("tx-saga"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.metadata.rollback_id.as_deref(), Some("tx-saga"));
        assert_eq!(result.result.unwrap()["reserve"]["reserved"], json!(500));
        assert_eq!(sink.records.lock().unwrap()[0].subject, "payment");
    }

    #[tokio::test]
    async fn unknown_saga_propagates() {
        let (kernel, _) = kernel_with(test_config(), MockPolicy::returning(PolicyDecision::allow()));
        let err = kernel.execute_saga("nope", Map::new(), customer()).await.unwrap_err();
        assert_eq!(err.code(), "SAGA_NOT_FOUND");
    }

    // ── Statistics and health ────────────────────────────────────────────────

    #[tokio::test]
    async fn statistics_and_health_reflect_lifecycle() {
        let calls = Arc::new(AtomicU32::new(0));
        let (kernel, _) = kernel_with(test_config(), MockPolicy::returning(PolicyDecision::allow()));
        assert_eq!(kernel.health().status, HealthStatus::Degraded);

        kernel.register_skill(Skill::builder("Echo").id("echo").build(), counting_executor(&calls));
        kernel.register_saga("noop", Vec::new());
        kernel.start();

        let stats = kernel.statistics();
        assert_eq!(stats.registered_skills, 1);
        assert_eq!(stats.registered_sagas, 1);
        assert_eq!(stats.worker_concurrency, 5);
        assert_eq!(stats.circuit_breakers.len(), 1);
        assert_eq!(kernel.health().status, HealthStatus::Healthy);

        kernel.shutdown().await;
        assert!(!kernel.health().checks.running);
        let result = kernel.execute_skill("echo", json!({}), customer()).await.unwrap();
        assert_eq!(result.error_code(), Some("QUEUE_CLOSED"));
    }
}
