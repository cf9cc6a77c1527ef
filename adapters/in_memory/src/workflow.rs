//! In-memory workflow state for the durable step executor.

use async_trait::async_trait;
use casefile_core::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct WorkflowState {
    workflows: HashMap<String, WorkflowRecord>,
    steps: HashMap<(String, String), serde_json::Value>,
}

#[derive(Clone, Default)]
pub struct InMemoryStepStore {
    state: Arc<Mutex<WorkflowState>>,
}

impl InMemoryStepStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, WorkflowState>, WorkflowStateError> {
        self.state
            .lock()
            .map_err(|_| WorkflowStateError::new("workflow state poisoned"))
    }

    /// Number of step outputs recorded for a workflow, for assertions.
    pub fn step_count(&self, workflow_id: &str) -> usize {
        self.state
            .lock()
            .map(|state| {
                state
                    .steps
                    .keys()
                    .filter(|(id, _)| id == workflow_id)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl StepStore for InMemoryStepStore {
    async fn create_workflow(&self, record: &WorkflowRecord) -> Result<(), WorkflowStateError> {
        let mut state = self.lock()?;
        state
            .workflows
            .insert(record.workflow_id.clone(), record.clone());
        Ok(())
    }

    async fn get_workflow(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowRecord>, WorkflowStateError> {
        let state = self.lock()?;
        Ok(state.workflows.get(workflow_id).cloned())
    }

    async fn set_workflow_state(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), WorkflowStateError> {
        let mut state = self.lock()?;
        let record = state.workflows.get_mut(workflow_id).ok_or_else(|| {
            WorkflowStateError::new(format!("workflow '{workflow_id}' not found"))
        })?;
        record.status = status;
        if result.is_some() {
            record.result = result;
        }
        if error.is_some() {
            record.error = error;
        }
        Ok(())
    }

    async fn incomplete_workflows(&self) -> Result<Vec<WorkflowRecord>, WorkflowStateError> {
        let state = self.lock()?;
        Ok(state
            .workflows
            .values()
            .filter(|record| {
                matches!(
                    record.status,
                    WorkflowStatus::Pending | WorkflowStatus::Running
                )
            })
            .cloned()
            .collect())
    }

    async fn step_output(
        &self,
        workflow_id: &str,
        step_name: &str,
    ) -> Result<Option<serde_json::Value>, WorkflowStateError> {
        let state = self.lock()?;
        Ok(state
            .steps
            .get(&(workflow_id.to_string(), step_name.to_string()))
            .cloned())
    }

    async fn save_step_output(
        &self,
        workflow_id: &str,
        step_name: &str,
        output: &serde_json::Value,
    ) -> Result<(), WorkflowStateError> {
        let mut state = self.lock()?;
        state.steps.insert(
            (workflow_id.to_string(), step_name.to_string()),
            output.clone(),
        );
        Ok(())
    }
}
