// SPDX-License-Identifier: MIT

//! In-memory table of live `ProcessWrapper`s keyed by agent name, the
//! daemon's composition root for spawn/lookup/teardown. Grounded on
//! `oj-daemon`'s in-memory `MaterializedState` agent table, but holding live
//! `Arc<ProcessWrapper>` handles rather than replaying an event log, since
//! this daemon has no event-sourced state to reconstruct on restart — the
//! durable record lives entirely in `corral-storage`.

use corral_adapters::{ProcessWrapper, SpawnRequest};
use corral_core::{AgentId, Clock, PatternSet, SystemClock};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent '{0}' already exists")]
    NameConflict(String),
    #[error("agent '{0}' not found")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    Spawn(#[from] corral_adapters::ProcessError),
}

pub struct AgentRegistry {
    clock: SystemClock,
    environments_path: PathBuf,
    patterns: PatternSet,
    logs_dir: PathBuf,
    broadcaster_capacity: usize,
    recorder: Arc<dyn corral_adapters::SessionRecorder>,
    sink: Arc<dyn corral_adapters::ExtractionSink>,
    agents: RwLock<HashMap<String, Arc<ProcessWrapper<SystemClock>>>>,
}

impl AgentRegistry {
    pub fn new(
        environments_path: PathBuf,
        patterns: PatternSet,
        logs_dir: PathBuf,
        recorder: Arc<dyn corral_adapters::SessionRecorder>,
        sink: Arc<dyn corral_adapters::ExtractionSink>,
    ) -> Self {
        Self {
            clock: SystemClock,
            environments_path,
            patterns,
            logs_dir,
            broadcaster_capacity: 256,
            recorder,
            sink,
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(
        &self,
        req: crate::protocol::CreateAgentRequest,
    ) -> Result<Arc<ProcessWrapper<SystemClock>>, RegistryError> {
        if self.agents.read().contains_key(&req.name) {
            return Err(RegistryError::NameConflict(req.name));
        }

        let now = self.clock.now_ms();
        let log_path = self
            .logs_dir
            .join(&req.name)
            .join(format!("{now}-combined.log"));
        let policy = crate::config::load_policy(&self.environments_path, &req.environment);

        let spawn_req = SpawnRequest {
            agent_id: AgentId::new(req.name.clone()),
            command: req.command,
            args: req.args,
            environment: req.environment,
            working_dir: req.working_dir,
            env_vars: req.env_vars,
            patterns: self.patterns.clone(),
            log_path,
            broadcaster_capacity: self.broadcaster_capacity,
        };

        let wrapper = ProcessWrapper::start(
            self.clock,
            spawn_req,
            &policy,
            Arc::clone(&self.recorder),
            Arc::clone(&self.sink),
        )?;

        self.agents.write().insert(req.name, Arc::clone(&wrapper));
        Ok(wrapper)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProcessWrapper<SystemClock>>> {
        self.agents.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        self.agents
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
