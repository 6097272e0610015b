//! Workflow orchestration — multi-step task execution across agents.
//!
//! Three execution shapes:
//! - **Sequential with dependencies**: steps run in index order; a step waits
//!   for its `depends_on` indices to reach a terminal state and inherits
//!   failure ("Dependency failed") without shifting later indices.
//! - **Parallel**: all steps run concurrently; a failing sibling never
//!   cancels the others.
//! - **Fallback**: try agents in order, first success wins.
//!
//! Workflows are tracked in an active map for status snapshots and removed
//! on completion. Nothing here survives a restart.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard_core::{AgentCard, AgentError};
use switchyard_mesh::{AgentRegistry, ClientPool};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status of a workflow or one of its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Declared for wire compatibility; no transition currently produces it.
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// Caller-supplied step definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Agent name, or a capability to resolve through the registry.
    pub agent: String,
    pub task: String,
    /// Indices of steps that must reach a terminal state first. All entries
    /// must be strictly less than this step's own index.
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

/// Caller-supplied parallel task definition (no dependencies).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelTask {
    pub agent: String,
    pub task: String,
}

/// One step with its execution state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub agent: String,
    pub task: String,
    pub depends_on: Vec<usize>,
    pub step_id: String,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowStep {
    fn from_spec(spec: StepSpec) -> Self {
        Self {
            agent: spec.agent,
            task: spec.task,
            depends_on: spec.depends_on,
            step_id: Uuid::new_v4().to_string(),
            status: WorkflowStatus::Pending,
            result: None,
            error: None,
        }
    }

    fn fail(&mut self, error: impl Into<String>) {
        self.status = WorkflowStatus::Failed;
        self.error = Some(error.into());
    }

    fn complete(&mut self, result: String) {
        self.status = WorkflowStatus::Completed;
        self.result = Some(result);
    }
}

/// Outcome of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub steps: Vec<WorkflowStep>,
    /// Wall-clock execution time in seconds.
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    /// Results of every step that produced one.
    pub fn step_results(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| s.result.as_deref())
            .collect()
    }

    fn finalize(&mut self) {
        if self.steps.iter().all(|s| s.status == WorkflowStatus::Completed) {
            self.status = WorkflowStatus::Completed;
        } else if self.steps.iter().any(|s| s.status == WorkflowStatus::Failed) {
            self.status = WorkflowStatus::Failed;
            self.error = Some("One or more steps failed".into());
        }
    }
}

type SharedResult = Arc<RwLock<WorkflowResult>>;

/// Orchestrates workflows across the agent mesh.
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    pool: Arc<ClientPool>,
    poll_interval: Duration,
    dependency_timeout: Duration,
    active: Mutex<HashMap<String, SharedResult>>,
}

impl Orchestrator {
    pub fn new(registry: Arc<AgentRegistry>, pool: Arc<ClientPool>) -> Self {
        Self {
            registry,
            pool,
            poll_interval: Duration::from_millis(100),
            dependency_timeout: Duration::from_secs(300),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Override dependency polling cadence and bound (tests).
    pub fn with_dependency_wait(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.dependency_timeout = timeout;
        self
    }

    /// Execute steps in order, honoring dependency edges.
    pub async fn execute_workflow(
        &self,
        specs: Vec<StepSpec>,
        workflow_id: Option<String>,
    ) -> WorkflowResult {
        let started = std::time::Instant::now();
        let wf_id = workflow_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(workflow = %wf_id, steps = specs.len(), "Starting sequential workflow");

        let shared = self.track(&wf_id, specs.into_iter().map(WorkflowStep::from_spec).collect());
        let step_count = shared.read().await.steps.len();

        for index in 0..step_count {
            let depends_on = {
                let mut result = shared.write().await;
                result.steps[index].status = WorkflowStatus::Running;
                result.steps[index].depends_on.clone()
            };

            if !depends_on.is_empty() {
                if depends_on.iter().any(|d| *d >= index) {
                    shared.write().await.steps[index].fail("Invalid dependency index");
                    continue;
                }

                if let Err(timeout_error) = self.wait_for_dependencies(&shared, &depends_on).await {
                    shared.write().await.steps[index].fail(timeout_error);
                    continue;
                }

                let dependency_failed = {
                    let result = shared.read().await;
                    depends_on
                        .iter()
                        .any(|d| result.steps[*d].status == WorkflowStatus::Failed)
                };
                if dependency_failed {
                    shared.write().await.steps[index].fail("Dependency failed");
                    continue;
                }
            }

            let (agent, task) = {
                let result = shared.read().await;
                (result.steps[index].agent.clone(), result.steps[index].task.clone())
            };
            let outcome = self.run_task(&agent, &task, &wf_id).await;

            let mut result = shared.write().await;
            match outcome {
                Ok(output) => result.steps[index].complete(output),
                Err(e) => result.steps[index].fail(e.to_string()),
            }
        }

        self.untrack(&wf_id, &shared, started).await
    }

    /// Execute all tasks concurrently. A failing sibling does not cancel the
    /// others; every result is collected.
    pub async fn execute_parallel(
        &self,
        tasks: Vec<ParallelTask>,
        workflow_id: Option<String>,
    ) -> WorkflowResult {
        let started = std::time::Instant::now();
        let wf_id = workflow_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(workflow = %wf_id, tasks = tasks.len(), "Starting parallel workflow");

        let steps = tasks
            .into_iter()
            .map(|t| {
                WorkflowStep::from_spec(StepSpec {
                    agent: t.agent,
                    task: t.task,
                    depends_on: Vec::new(),
                })
            })
            .collect();
        let shared = self.track(&wf_id, steps);
        let step_count = shared.read().await.steps.len();

        let executions = (0..step_count).map(|index| {
            let shared = shared.clone();
            let wf_id = wf_id.clone();
            async move {
                let (agent, task) = {
                    let mut result = shared.write().await;
                    result.steps[index].status = WorkflowStatus::Running;
                    (result.steps[index].agent.clone(), result.steps[index].task.clone())
                };

                let outcome = self.run_task(&agent, &task, &wf_id).await;

                let mut result = shared.write().await;
                match outcome {
                    Ok(output) => result.steps[index].complete(output),
                    Err(e) => result.steps[index].fail(e.to_string()),
                }
            }
        });
        join_all(executions).await;

        self.untrack(&wf_id, &shared, started).await
    }

    /// Try agents in order, returning the first success.
    pub async fn execute_with_fallback(
        &self,
        task: &str,
        agent_names: &[String],
    ) -> Result<String, AgentError> {
        let mut last_error: Option<AgentError> = None;

        for name in agent_names {
            let Some(card) = self.find_agent(name) else {
                debug!(agent = %name, "Fallback candidate not in registry");
                continue;
            };

            match self
                .pool
                .get_client(&card.url)
                .delegate_task(task, Some(&ClientPool::fresh_task_id()))
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(agent = %name, error = %e, "Fallback candidate failed");
                    last_error = Some(e);
                }
            }
        }

        Err(AgentError::AllFailed(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no matching agents".into()),
        ))
    }

    /// Snapshot of a running workflow, if still active.
    pub async fn get_workflow_status(&self, workflow_id: &str) -> Option<WorkflowResult> {
        let shared = {
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.get(workflow_id).cloned()
        }?;
        Some(shared.read().await.clone())
    }

    /// Ids of workflows currently executing.
    pub fn list_active_workflows(&self) -> Vec<String> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn track(&self, wf_id: &str, steps: Vec<WorkflowStep>) -> SharedResult {
        let shared = Arc::new(RwLock::new(WorkflowResult {
            workflow_id: wf_id.to_string(),
            status: WorkflowStatus::Running,
            steps,
            execution_time: 0.0,
            error: None,
        }));
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(wf_id.to_string(), shared.clone());
        shared
    }

    async fn untrack(
        &self,
        wf_id: &str,
        shared: &SharedResult,
        started: std::time::Instant,
    ) -> WorkflowResult {
        let snapshot = {
            let mut result = shared.write().await;
            result.finalize();
            result.execution_time = started.elapsed().as_secs_f64();
            result.clone()
        };
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(wf_id);
        info!(workflow = %wf_id, status = ?snapshot.status, "Workflow finished");
        snapshot
    }

    async fn run_task(&self, agent: &str, task: &str, wf_id: &str) -> Result<String, AgentError> {
        let card = self
            .find_agent(agent)
            .ok_or_else(|| AgentError::NotFound(agent.to_string()))?;
        self.pool
            .get_client(&card.url)
            .delegate_task(task, Some(wf_id))
            .await
    }

    /// Resolve by name first, then by capability.
    fn find_agent(&self, identifier: &str) -> Option<AgentCard> {
        self.registry
            .get(identifier)
            .or_else(|| self.registry.find_by_capability(identifier))
    }

    /// Poll dependency statuses until all are terminal or the wait times out.
    async fn wait_for_dependencies(
        &self,
        shared: &SharedResult,
        depends_on: &[usize],
    ) -> Result<(), String> {
        let started = std::time::Instant::now();
        loop {
            let all_terminal = {
                let result = shared.read().await;
                depends_on.iter().all(|d| result.steps[*d].status.is_terminal())
            };
            if all_terminal {
                return Ok(());
            }
            if started.elapsed() > self.dependency_timeout {
                return Err(format!(
                    "Dependencies did not complete within {} seconds",
                    self.dependency_timeout.as_secs()
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use switchyard_mesh::ClientConfig;

    fn rpc_reply(text: String) -> serde_json::Value {
        serde_json::json!({
            "jsonrpc": "2.0",
            "result": {
                "role": "agent",
                "parts": [{"kind": "text", "text": text}],
                "messageId": "reply"
            },
            "id": 1
        })
    }

    /// An agent that echoes its name and the received task.
    async fn spawn_echo_agent(name: &'static str) -> String {
        let app = Router::new().route(
            "/",
            post(move |Json(req): Json<serde_json::Value>| async move {
                let task = req["params"]["message"]["parts"][0]["text"]
                    .as_str()
                    .unwrap_or("")
                    .to_string();
                Json(rpc_reply(format!("{name}:{task}")))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// An agent that always returns HTTP 500.
    async fn spawn_broken_agent() -> String {
        let app = Router::new().route(
            "/",
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fast_pool() -> Arc<ClientPool> {
        Arc::new(ClientPool::new(ClientConfig {
            timeout: Duration::from_secs(5),
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
        }))
    }

    async fn orchestrator_with(agents: &[(&str, &str, String)]) -> Orchestrator {
        let registry = Arc::new(AgentRegistry::new());
        for (name, capability, url) in agents {
            registry.register(
                AgentCard::new(*name, url.clone())
                    .with_capabilities(vec![capability.to_string()]),
            );
        }
        Orchestrator::new(registry, fast_pool())
            .with_dependency_wait(Duration::from_millis(10), Duration::from_secs(5))
    }

    fn spec(agent: &str, task: &str, depends_on: &[usize]) -> StepSpec {
        StepSpec {
            agent: agent.into(),
            task: task.into(),
            depends_on: depends_on.to_vec(),
        }
    }

    #[tokio::test]
    async fn sequential_workflow_completes_in_order() {
        let url = spawn_echo_agent("worker").await;
        let orchestrator = orchestrator_with(&[("worker", "work", url)]).await;

        let result = orchestrator
            .execute_workflow(
                vec![spec("worker", "first", &[]), spec("worker", "second", &[0])],
                Some("wf-1".into()),
            )
            .await;

        assert_eq!(result.workflow_id, "wf-1");
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[0].result.as_deref(), Some("worker:first"));
        assert_eq!(result.steps[1].result.as_deref(), Some("worker:second"));
        assert_eq!(result.step_results(), vec!["worker:first", "worker:second"]);
        assert!(result.execution_time >= 0.0);
        assert!(orchestrator.list_active_workflows().is_empty());
    }

    #[tokio::test]
    async fn failed_dependency_fails_dependent_but_preserves_indices() {
        let url = spawn_echo_agent("worker").await;
        let orchestrator = orchestrator_with(&[("worker", "work", url)]).await;

        let result = orchestrator
            .execute_workflow(
                vec![
                    spec("ghost_agent", "will fail", &[]),
                    spec("worker", "depends on ghost", &[0]),
                    spec("worker", "independent", &[]),
                ],
                None,
            )
            .await;

        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("One or more steps failed"));
        assert_eq!(result.steps[0].status, WorkflowStatus::Failed);
        assert_eq!(
            result.steps[0].error.as_deref(),
            Some("Agent not found: ghost_agent")
        );
        assert_eq!(result.steps[1].status, WorkflowStatus::Failed);
        assert_eq!(result.steps[1].error.as_deref(), Some("Dependency failed"));
        // Execution continued past the failure
        assert_eq!(result.steps[2].status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn agent_resolution_falls_back_to_capability() {
        let url = spawn_echo_agent("worker").await;
        let orchestrator = orchestrator_with(&[("worker", "analytics", url)]).await;

        let result = orchestrator
            .execute_workflow(vec![spec("analytics", "crunch", &[])], None)
            .await;
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.steps[0].result.as_deref(), Some("worker:crunch"));
    }

    #[tokio::test]
    async fn parallel_workflow_collects_all_results() {
        let analytics = spawn_echo_agent("analytics").await;
        let security = spawn_echo_agent("security").await;
        let orchestrator = orchestrator_with(&[
            ("analytics_agent", "analytics", analytics),
            ("security_agent", "security", security),
        ])
        .await;

        let result = orchestrator
            .execute_parallel(
                vec![
                    ParallelTask {
                        agent: "analytics_agent".into(),
                        task: "A".into(),
                    },
                    ParallelTask {
                        agent: "security_agent".into(),
                        task: "B".into(),
                    },
                ],
                None,
            )
            .await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps.iter().all(|s| s.status == WorkflowStatus::Completed));
        assert_eq!(result.steps[0].result.as_deref(), Some("analytics:A"));
        assert_eq!(result.steps[1].result.as_deref(), Some("security:B"));
    }

    #[tokio::test]
    async fn parallel_failure_does_not_cancel_siblings() {
        let good = spawn_echo_agent("good").await;
        let bad = spawn_broken_agent().await;
        let orchestrator =
            orchestrator_with(&[("good_agent", "good", good), ("bad_agent", "bad", bad)]).await;

        let result = orchestrator
            .execute_parallel(
                vec![
                    ParallelTask {
                        agent: "bad_agent".into(),
                        task: "explode".into(),
                    },
                    ParallelTask {
                        agent: "good_agent".into(),
                        task: "work".into(),
                    },
                ],
                None,
            )
            .await;

        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.steps[0].status, WorkflowStatus::Failed);
        assert_eq!(result.steps[1].status, WorkflowStatus::Completed);
        assert_eq!(result.steps[1].result.as_deref(), Some("good:work"));
    }

    #[tokio::test]
    async fn fallback_returns_first_success() {
        let good = spawn_echo_agent("backup").await;
        let bad = spawn_broken_agent().await;
        let orchestrator = orchestrator_with(&[
            ("primary", "p", bad),
            ("backup", "b", good),
        ])
        .await;

        let result = orchestrator
            .execute_with_fallback(
                "rescue me",
                &["missing".into(), "primary".into(), "backup".into()],
            )
            .await
            .unwrap();
        assert_eq!(result, "backup:rescue me");
    }

    #[tokio::test]
    async fn fallback_all_failed_raises() {
        let bad = spawn_broken_agent().await;
        let orchestrator = orchestrator_with(&[("only", "o", bad)]).await;

        let err = orchestrator
            .execute_with_fallback("no hope", &["only".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::AllFailed(_)));
    }

    #[tokio::test]
    async fn invalid_dependency_index_fails_step() {
        let url = spawn_echo_agent("worker").await;
        let orchestrator = orchestrator_with(&[("worker", "work", url)]).await;

        let result = orchestrator
            .execute_workflow(vec![spec("worker", "self-dep", &[0])], None)
            .await;
        assert_eq!(result.steps[0].status, WorkflowStatus::Failed);
        assert_eq!(result.steps[0].error.as_deref(), Some("Invalid dependency index"));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
    }
}
