//! Mock ConvergenceEngine for unit testing
//!
//! Records every call, serves state outputs from memory and can be told to
//! fail apply, destroy or state queries. A successful apply records (empty)
//! state for its job; a successful destroy removes it. An optional shared journal lets a
//! test assert ordering against other mocks.

use crate::engine_trait::ConvergenceEngine;
use crate::error::ConvergenceError;
use crate::job::{ConvergenceConfig, ConvergenceJob, JobId};
use crate::state::{StateLookup, StateOutputs};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Apply {
        id: JobId,
        template_id: Option<String>,
        config: Option<ConvergenceConfig>,
        variable_names: Vec<String>,
    },
    Destroy {
        id: JobId,
        variable_names: Vec<String>,
    },
    HasState {
        id: JobId,
    },
    StateOutputs {
        id: JobId,
        names: Vec<String>,
    },
}

/// Mock engine for testing
#[derive(Clone, Default)]
pub struct MockConvergenceEngine {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    states: Arc<Mutex<HashMap<JobId, StateOutputs>>>,
    apply_error: Arc<Mutex<Option<String>>>,
    destroy_error: Arc<Mutex<Option<String>>>,
    state_error: Arc<Mutex<Option<String>>>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockConvergenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `engine.<op>` entries to a journal shared with other mocks
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Seed the outputs of a previous successful apply (for test setup)
    pub fn set_state_outputs(&self, id: JobId, outputs: StateOutputs) {
        lock(&self.states).insert(id, outputs);
    }

    /// Make every apply fail with the given message
    pub fn fail_apply(&self, message: impl Into<String>) {
        *lock(&self.apply_error) = Some(message.into());
    }

    /// Make every destroy fail with the given message
    pub fn fail_destroy(&self, message: impl Into<String>) {
        *lock(&self.destroy_error) = Some(message.into());
    }

    /// Make every state query, `has_state` included, fail with the given message
    pub fn fail_state_queries(&self, message: impl Into<String>) {
        *lock(&self.state_error) = Some(message.into());
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.calls).clone()
    }

    pub fn apply_calls(&self) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, EngineCall::Apply { .. }))
            .collect()
    }

    pub fn destroy_calls(&self) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, EngineCall::Destroy { .. }))
            .collect()
    }

    fn record(&self, call: EngineCall, entry: &str) {
        lock(&self.calls).push(call);
        if let Some(journal) = &self.journal {
            lock(journal).push(entry.to_string());
        }
    }
}

#[async_trait::async_trait]
impl ConvergenceEngine for MockConvergenceEngine {
    async fn apply(&self, job: &ConvergenceJob) -> Result<(), ConvergenceError> {
        self.record(
            EngineCall::Apply {
                id: job.id().clone(),
                template_id: job.binding().map(|b| b.template_id.clone()),
                config: job.binding().map(|b| b.config.clone()),
                variable_names: job.variables().names().map(str::to_string).collect(),
            },
            "engine.apply",
        );
        if job.binding().is_none() {
            return Err(ConvergenceError::NotInitialized(job.id().to_string()));
        }
        if let Some(message) = lock(&self.apply_error).clone() {
            return Err(ConvergenceError::Engine(message));
        }
        lock(&self.states).entry(job.id().clone()).or_default();
        Ok(())
    }

    async fn destroy(&self, job: &ConvergenceJob) -> Result<(), ConvergenceError> {
        self.record(
            EngineCall::Destroy {
                id: job.id().clone(),
                variable_names: job.variables().names().map(str::to_string).collect(),
            },
            "engine.destroy",
        );
        if let Some(message) = lock(&self.destroy_error).clone() {
            return Err(ConvergenceError::Engine(message));
        }
        lock(&self.states).remove(job.id());
        Ok(())
    }

    async fn has_state(&self, id: &JobId) -> Result<bool, ConvergenceError> {
        self.record(EngineCall::HasState { id: id.clone() }, "engine.has_state");
        if let Some(message) = lock(&self.state_error).clone() {
            return Err(ConvergenceError::Engine(message));
        }
        Ok(lock(&self.states).contains_key(id))
    }

    async fn state_output_variables(&self, id: &JobId, names: &[&str]) -> StateLookup<StateOutputs> {
        self.record(
            EngineCall::StateOutputs {
                id: id.clone(),
                names: names.iter().map(|n| (*n).to_string()).collect(),
            },
            "engine.state",
        );
        if let Some(message) = lock(&self.state_error).clone() {
            return StateLookup::Error(ConvergenceError::Engine(message));
        }
        let states = lock(&self.states);
        let Some(outputs) = states.get(id) else {
            return StateLookup::NotFound;
        };
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            match outputs.get(name) {
                Some(value) => selected.push(((*name).to_string(), value.to_string())),
                None => return StateLookup::NotFound,
            }
        }
        StateLookup::Found(selected.into_iter().collect())
    }
}
