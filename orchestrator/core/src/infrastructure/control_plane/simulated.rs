// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Simulated Control Plane
//!
//! In-process stand-in for the runtime control plane with the same eventual
//! consistency traits as the real one:
//!
//! - **Transition lag**: a resource reports its transitional status
//!   (`CREATING`, `UPDATING`, `DELETING`) for a number of describe calls
//!   before it settles.
//! - **Propagation lag**: a freshly created resource is invisible (`NotFound`)
//!   to describe calls for a number of calls.
//! - **Stuck resources**: named resources never leave their transitional status.
//! - **Fault injection**: queue an error for the next call of an operation.
//! - **Call log**: every call is recorded in order, for ordering assertions.
//!
//! Lag is counted in describe calls rather than wall-clock time so that
//! tests are deterministic.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;
use uuid::Uuid;

use crate::domain::control_plane::{
    ControlPlane, ControlPlaneError, CreateEndpointRequest, CreateMemoryRequest,
    CreateRuntimeRequest, EndpointDescription, MemoryDescription, MemoryStatus, Page,
    RuntimeDescription, RuntimeHandle, RuntimeSpec, RuntimeStatus,
};
use crate::domain::runtime::{MemoryId, RuntimeId, DEFAULT_QUALIFIER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateMemory,
    GetMemory,
    ListMemories,
    DeleteMemory,
    ListRuntimes,
    CreateRuntime,
    UpdateRuntime,
    GetRuntime,
    DeleteRuntime,
    ListEndpoints,
    CreateEndpoint,
    GetEndpoint,
    DeleteEndpoint,
    ListTags,
}

/// One recorded call: the operation and the resource it targeted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: Operation,
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Describe calls that still report a transitional status
    pub transition_polls: u32,
    /// Describe calls that return `NotFound` right after a create
    pub propagation_polls: u32,
    pub region: String,
    pub account_id: String,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            transition_polls: 1,
            propagation_polls: 0,
            region: "us-east-1".to_string(),
            account_id: "000000000000".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Lag {
    hidden_polls: u32,
    transition_polls: u32,
}

#[derive(Debug, Clone)]
struct SimMemory {
    description: MemoryDescription,
    tags: HashMap<String, String>,
    lag: Lag,
}

#[derive(Debug, Clone)]
struct SimEndpoint {
    description: EndpointDescription,
    lag: Lag,
}

#[derive(Debug, Clone)]
struct SimRuntime {
    description: RuntimeDescription,
    latest_version: u32,
    spec: RuntimeSpec,
    tags: HashMap<String, String>,
    endpoints: BTreeMap<String, SimEndpoint>,
    lag: Lag,
}

#[derive(Default)]
struct SimState {
    memories: BTreeMap<String, SimMemory>,
    runtimes: BTreeMap<String, SimRuntime>,
    stuck: HashSet<String>,
    faults: HashMap<Operation, VecDeque<ControlPlaneError>>,
    calls: Vec<RecordedCall>,
}

pub struct SimulatedControlPlane {
    settings: SimulationSettings,
    state: Mutex<SimState>,
}

enum Settled {
    Visible,
    Hidden,
    Gone,
}

impl SimulatedControlPlane {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(SimState::default()),
        }
    }

    fn fresh_lag(&self) -> Lag {
        Lag {
            hidden_polls: self.settings.propagation_polls,
            transition_polls: self.settings.transition_polls,
        }
    }

    fn arn(&self, kind: &str, id: &str) -> String {
        format!(
            "arn:aws:bedrock-agentcore:{}:{}:{}/{}",
            self.settings.region, self.settings.account_id, kind, id
        )
    }

    fn enter(&self, state: &mut SimState, operation: Operation, target: &str) -> Result<(), ControlPlaneError> {
        state.calls.push(RecordedCall {
            operation,
            target: target.to_string(),
        });
        if let Some(error) = state.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            debug!(?operation, target, "Injecting simulated control plane fault");
            return Err(error);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Test controls
    // ------------------------------------------------------------------

    /// Fail the next call of `operation` with `error`. Queued per operation.
    pub fn fail_next(&self, operation: Operation, error: ControlPlaneError) {
        self.state
            .lock()
            .faults
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Keep the named resource (memory id, runtime id or name, endpoint name)
    /// in its transitional status forever
    pub fn stick(&self, resource: impl Into<String>) {
        self.state.lock().stuck.insert(resource.into());
    }

    pub fn unstick(&self, resource: &str) {
        self.state.lock().stuck.remove(resource);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_to(&self, operation: Operation) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation == operation)
            .collect()
    }

    /// Remove a memory without going through the API
    pub fn remove_memory_out_of_band(&self, memory_id: &MemoryId) {
        self.state.lock().memories.remove(memory_id.as_str());
    }

    pub fn memory_ids(&self) -> Vec<MemoryId> {
        self.state
            .lock()
            .memories
            .values()
            .map(|memory| memory.description.id.clone())
            .collect()
    }

    pub fn runtime_by_name(&self, name: &str) -> Option<RuntimeDescription> {
        self.state
            .lock()
            .runtimes
            .values()
            .find(|runtime| runtime.description.agent_runtime_name == name)
            .map(|runtime| runtime.description.clone())
    }

    pub fn runtime_environment(&self, runtime_id: &RuntimeId) -> Option<BTreeMap<String, String>> {
        self.state
            .lock()
            .runtimes
            .get(runtime_id.as_str())
            .map(|runtime| runtime.spec.environment_variables.clone())
    }

    /// Named endpoints of a runtime, DEFAULT excluded
    pub fn endpoint_names(&self, runtime_id: &RuntimeId) -> Vec<String> {
        self.state
            .lock()
            .runtimes
            .get(runtime_id.as_str())
            .map(|runtime| {
                runtime
                    .endpoints
                    .keys()
                    .filter(|name| name.as_str() != DEFAULT_QUALIFIER)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Create a READY runtime directly, e.g. one owned by another stack
    pub fn insert_runtime(&self, name: &str, tags: HashMap<String, String>) -> RuntimeId {
        let mut state = self.state.lock();
        let id = format!("{}-{}", name, short_suffix());
        let runtime = SimRuntime {
            description: RuntimeDescription {
                agent_runtime_id: RuntimeId::new(&id),
                agent_runtime_name: name.to_string(),
                agent_runtime_arn: self.arn("runtime", &id),
                agent_runtime_version: "1".to_string(),
                status: RuntimeStatus::Ready,
                failure_reason: None,
            },
            latest_version: 1,
            spec: RuntimeSpec {
                container_uri: String::new(),
                role_arn: String::new(),
                network_mode: "PUBLIC".to_string(),
                environment_variables: BTreeMap::new(),
            },
            tags,
            endpoints: BTreeMap::from([(DEFAULT_QUALIFIER.to_string(), ready_endpoint(DEFAULT_QUALIFIER, "1"))]),
            lag: Lag {
                hidden_polls: 0,
                transition_polls: 0,
            },
        };
        state.runtimes.insert(id.clone(), runtime);
        RuntimeId::new(id)
    }

    /// Attach a READY endpoint directly
    pub fn insert_endpoint(&self, runtime_id: &RuntimeId, name: &str) {
        let mut state = self.state.lock();
        if let Some(runtime) = state.runtimes.get_mut(runtime_id.as_str()) {
            let version = runtime.latest_version.to_string();
            runtime
                .endpoints
                .insert(name.to_string(), ready_endpoint(name, &version));
        }
    }

    /// Advance a resource's lag by one describe call
    fn settle(lag: &mut Lag, stuck: bool) -> Settled {
        if lag.hidden_polls > 0 {
            lag.hidden_polls -= 1;
            return Settled::Hidden;
        }
        if stuck {
            return Settled::Visible;
        }
        if lag.transition_polls > 0 {
            lag.transition_polls -= 1;
            return Settled::Visible;
        }
        Settled::Gone
    }
}

impl Default for SimulatedControlPlane {
    fn default() -> Self {
        Self::new(SimulationSettings::default())
    }
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn ready_endpoint(name: &str, version: &str) -> SimEndpoint {
    SimEndpoint {
        description: EndpointDescription {
            name: name.to_string(),
            live_version: Some(version.to_string()),
            target_version: Some(version.to_string()),
            status: RuntimeStatus::Ready,
            failure_reason: None,
        },
        lag: Lag {
            hidden_polls: 0,
            transition_polls: 0,
        },
    }
}

fn paginate<T: Clone>(items: Vec<T>, next_token: Option<&str>, max_results: u32) -> Result<Page<T>, ControlPlaneError> {
    let start = match next_token {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| ControlPlaneError::Permanent(format!("invalid next token '{}'", token)))?,
        None => 0,
    };
    let end = (start + max_results.max(1) as usize).min(items.len());
    let page: Vec<T> = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    Ok(Page {
        items: page,
        next_token: (end < items.len()).then(|| end.to_string()),
    })
}

#[async_trait]
impl ControlPlane for SimulatedControlPlane {
    async fn create_memory(
        &self,
        request: &CreateMemoryRequest,
    ) -> Result<MemoryDescription, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::CreateMemory, &request.name)?;

        if state.memories.values().any(|memory| memory.description.name == request.name) {
            return Err(ControlPlaneError::AlreadyExists(request.name.clone()));
        }

        let id = format!("{}-{}", request.name, short_suffix());
        let description = MemoryDescription {
            id: MemoryId::new(&id),
            name: request.name.clone(),
            arn: Some(self.arn("memory", &id)),
            status: MemoryStatus::Creating,
            failure_reason: None,
        };
        state.memories.insert(
            id,
            SimMemory {
                description: description.clone(),
                tags: request.tags.clone().into_iter().collect(),
                lag: self.fresh_lag(),
            },
        );
        Ok(description)
    }

    async fn get_memory(&self, memory_id: &MemoryId) -> Result<MemoryDescription, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::GetMemory, memory_id.as_str())?;

        let stuck = state.stuck.contains(memory_id.as_str());
        let memory = state
            .memories
            .get_mut(memory_id.as_str())
            .ok_or_else(|| ControlPlaneError::NotFound(memory_id.to_string()))?;

        match Self::settle(&mut memory.lag, stuck) {
            Settled::Hidden => Err(ControlPlaneError::NotFound(memory_id.to_string())),
            Settled::Visible => Ok(memory.description.clone()),
            Settled::Gone => match memory.description.status {
                MemoryStatus::Deleting => {
                    state.memories.remove(memory_id.as_str());
                    Err(ControlPlaneError::NotFound(memory_id.to_string()))
                }
                MemoryStatus::Creating => {
                    memory.description.status = MemoryStatus::Active;
                    Ok(memory.description.clone())
                }
                _ => Ok(memory.description.clone()),
            },
        }
    }

    async fn list_memories(
        &self,
        next_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<MemoryDescription>, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::ListMemories, "")?;
        let items: Vec<MemoryDescription> = state
            .memories
            .values()
            .map(|memory| memory.description.clone())
            .collect();
        paginate(items, next_token, max_results)
    }

    async fn delete_memory(&self, memory_id: &MemoryId) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::DeleteMemory, memory_id.as_str())?;
        let lag = self.fresh_lag();
        let memory = state
            .memories
            .get_mut(memory_id.as_str())
            .ok_or_else(|| ControlPlaneError::NotFound(memory_id.to_string()))?;
        memory.description.status = MemoryStatus::Deleting;
        memory.lag = Lag {
            hidden_polls: 0,
            transition_polls: lag.transition_polls,
        };
        Ok(())
    }

    async fn list_runtimes(
        &self,
        next_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<RuntimeDescription>, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::ListRuntimes, "")?;
        let items: Vec<RuntimeDescription> = state
            .runtimes
            .values()
            .map(|runtime| runtime.description.clone())
            .collect();
        paginate(items, next_token, max_results)
    }

    async fn create_runtime(
        &self,
        request: &CreateRuntimeRequest,
    ) -> Result<RuntimeHandle, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::CreateRuntime, &request.agent_runtime_name)?;

        if state
            .runtimes
            .values()
            .any(|runtime| runtime.description.agent_runtime_name == request.agent_runtime_name)
        {
            return Err(ControlPlaneError::AlreadyExists(request.agent_runtime_name.clone()));
        }

        let id = format!("{}-{}", request.agent_runtime_name, short_suffix());
        let description = RuntimeDescription {
            agent_runtime_id: RuntimeId::new(&id),
            agent_runtime_name: request.agent_runtime_name.clone(),
            agent_runtime_arn: self.arn("runtime", &id),
            agent_runtime_version: "1".to_string(),
            status: RuntimeStatus::Creating,
            failure_reason: None,
        };
        let mut default_endpoint = ready_endpoint(DEFAULT_QUALIFIER, "1");
        default_endpoint.description.status = RuntimeStatus::Creating;
        default_endpoint.lag = self.fresh_lag();

        state.runtimes.insert(
            id,
            SimRuntime {
                description: description.clone(),
                latest_version: 1,
                spec: request.spec.clone(),
                tags: request.tags.clone().into_iter().collect(),
                endpoints: BTreeMap::from([(DEFAULT_QUALIFIER.to_string(), default_endpoint)]),
                lag: self.fresh_lag(),
            },
        );

        Ok(RuntimeHandle {
            agent_runtime_id: description.agent_runtime_id,
            agent_runtime_arn: description.agent_runtime_arn,
            agent_runtime_version: description.agent_runtime_version,
            status: description.status,
        })
    }

    async fn update_runtime(
        &self,
        runtime_id: &RuntimeId,
        spec: &RuntimeSpec,
    ) -> Result<RuntimeHandle, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::UpdateRuntime, runtime_id.as_str())?;
        let lag = self.fresh_lag();
        let runtime = state
            .runtimes
            .get_mut(runtime_id.as_str())
            .ok_or_else(|| ControlPlaneError::NotFound(runtime_id.to_string()))?;

        if runtime.description.status == RuntimeStatus::Deleting {
            return Err(ControlPlaneError::Permanent(format!(
                "runtime {} is being deleted",
                runtime_id
            )));
        }

        runtime.latest_version += 1;
        runtime.spec = spec.clone();
        runtime.description.agent_runtime_version = runtime.latest_version.to_string();
        runtime.description.status = RuntimeStatus::Updating;
        runtime.lag = Lag {
            hidden_polls: 0,
            transition_polls: lag.transition_polls,
        };
        if let Some(default_endpoint) = runtime.endpoints.get_mut(DEFAULT_QUALIFIER) {
            default_endpoint.description.live_version = Some(runtime.latest_version.to_string());
            default_endpoint.description.target_version = Some(runtime.latest_version.to_string());
        }

        Ok(RuntimeHandle {
            agent_runtime_id: runtime.description.agent_runtime_id.clone(),
            agent_runtime_arn: runtime.description.agent_runtime_arn.clone(),
            agent_runtime_version: runtime.description.agent_runtime_version.clone(),
            status: runtime.description.status,
        })
    }

    async fn get_runtime(
        &self,
        runtime_id: &RuntimeId,
        version: Option<&str>,
    ) -> Result<RuntimeDescription, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::GetRuntime, runtime_id.as_str())?;

        let stuck = state.stuck.contains(runtime_id.as_str())
            || state
                .runtimes
                .get(runtime_id.as_str())
                .is_some_and(|runtime| state.stuck.contains(&runtime.description.agent_runtime_name));
        let runtime = state
            .runtimes
            .get_mut(runtime_id.as_str())
            .ok_or_else(|| ControlPlaneError::NotFound(runtime_id.to_string()))?;

        if let Some(requested) = version {
            let known = requested
                .parse::<u32>()
                .map(|v| v >= 1 && v <= runtime.latest_version)
                .unwrap_or(false);
            if !known {
                return Err(ControlPlaneError::NotFound(format!("{}@{}", runtime_id, requested)));
            }
        }

        match Self::settle(&mut runtime.lag, stuck) {
            Settled::Hidden => Err(ControlPlaneError::NotFound(runtime_id.to_string())),
            Settled::Visible => Ok(runtime.description.clone()),
            Settled::Gone => match runtime.description.status {
                RuntimeStatus::Deleting => {
                    state.runtimes.remove(runtime_id.as_str());
                    Err(ControlPlaneError::NotFound(runtime_id.to_string()))
                }
                RuntimeStatus::Creating | RuntimeStatus::Updating => {
                    runtime.description.status = RuntimeStatus::Ready;
                    if let Some(default_endpoint) = runtime.endpoints.get_mut(DEFAULT_QUALIFIER) {
                        default_endpoint.description.status = RuntimeStatus::Ready;
                    }
                    Ok(runtime.description.clone())
                }
                _ => Ok(runtime.description.clone()),
            },
        }
    }

    async fn delete_runtime(&self, runtime_id: &RuntimeId) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::DeleteRuntime, runtime_id.as_str())?;
        let lag = self.fresh_lag();
        let runtime = state
            .runtimes
            .get_mut(runtime_id.as_str())
            .ok_or_else(|| ControlPlaneError::NotFound(runtime_id.to_string()))?;

        let named_endpoints: Vec<&String> = runtime
            .endpoints
            .keys()
            .filter(|name| name.as_str() != DEFAULT_QUALIFIER)
            .collect();
        if !named_endpoints.is_empty() {
            return Err(ControlPlaneError::Permanent(format!(
                "runtime {} still has endpoints: {:?}",
                runtime_id, named_endpoints
            )));
        }

        runtime.description.status = RuntimeStatus::Deleting;
        runtime.lag = Lag {
            hidden_polls: 0,
            transition_polls: lag.transition_polls,
        };
        Ok(())
    }

    async fn list_endpoints(
        &self,
        runtime_id: &RuntimeId,
        next_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<EndpointDescription>, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::ListEndpoints, runtime_id.as_str())?;
        let runtime = state
            .runtimes
            .get(runtime_id.as_str())
            .ok_or_else(|| ControlPlaneError::NotFound(runtime_id.to_string()))?;
        let items: Vec<EndpointDescription> = runtime
            .endpoints
            .values()
            .map(|endpoint| endpoint.description.clone())
            .collect();
        paginate(items, next_token, max_results)
    }

    async fn create_endpoint(
        &self,
        request: &CreateEndpointRequest,
    ) -> Result<EndpointDescription, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::CreateEndpoint, &request.name)?;
        let lag = self.fresh_lag();
        let runtime = state
            .runtimes
            .get_mut(request.agent_runtime_id.as_str())
            .ok_or_else(|| ControlPlaneError::NotFound(request.agent_runtime_id.to_string()))?;

        if runtime.endpoints.contains_key(&request.name) {
            return Err(ControlPlaneError::AlreadyExists(request.name.clone()));
        }
        let version_known = request
            .agent_runtime_version
            .parse::<u32>()
            .map(|v| v >= 1 && v <= runtime.latest_version)
            .unwrap_or(false);
        if !version_known {
            return Err(ControlPlaneError::Permanent(format!(
                "runtime {} has no version {}",
                request.agent_runtime_id, request.agent_runtime_version
            )));
        }

        let description = EndpointDescription {
            name: request.name.clone(),
            live_version: None,
            target_version: Some(request.agent_runtime_version.clone()),
            status: RuntimeStatus::Creating,
            failure_reason: None,
        };
        runtime.endpoints.insert(
            request.name.clone(),
            SimEndpoint {
                description: description.clone(),
                lag,
            },
        );
        Ok(description)
    }

    async fn get_endpoint(
        &self,
        runtime_id: &RuntimeId,
        name: &str,
    ) -> Result<EndpointDescription, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::GetEndpoint, name)?;

        let stuck = state.stuck.contains(name);
        let runtime = state
            .runtimes
            .get_mut(runtime_id.as_str())
            .ok_or_else(|| ControlPlaneError::NotFound(runtime_id.to_string()))?;
        let endpoint = runtime
            .endpoints
            .get_mut(name)
            .ok_or_else(|| ControlPlaneError::NotFound(name.to_string()))?;

        match Self::settle(&mut endpoint.lag, stuck) {
            Settled::Hidden => Err(ControlPlaneError::NotFound(name.to_string())),
            Settled::Visible => Ok(endpoint.description.clone()),
            Settled::Gone => match endpoint.description.status {
                RuntimeStatus::Deleting => {
                    runtime.endpoints.remove(name);
                    Err(ControlPlaneError::NotFound(name.to_string()))
                }
                RuntimeStatus::Creating | RuntimeStatus::Updating => {
                    endpoint.description.status = RuntimeStatus::Ready;
                    endpoint.description.live_version = endpoint.description.target_version.clone();
                    Ok(endpoint.description.clone())
                }
                _ => Ok(endpoint.description.clone()),
            },
        }
    }

    async fn delete_endpoint(&self, runtime_id: &RuntimeId, name: &str) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::DeleteEndpoint, name)?;
        let lag = self.fresh_lag();
        let runtime = state
            .runtimes
            .get_mut(runtime_id.as_str())
            .ok_or_else(|| ControlPlaneError::NotFound(runtime_id.to_string()))?;
        if name == DEFAULT_QUALIFIER {
            return Err(ControlPlaneError::Permanent(
                "the DEFAULT endpoint cannot be deleted".to_string(),
            ));
        }
        let endpoint = runtime
            .endpoints
            .get_mut(name)
            .ok_or_else(|| ControlPlaneError::NotFound(name.to_string()))?;
        endpoint.description.status = RuntimeStatus::Deleting;
        endpoint.lag = Lag {
            hidden_polls: 0,
            transition_polls: lag.transition_polls,
        };
        Ok(())
    }

    async fn list_tags(&self, resource_arn: &str) -> Result<HashMap<String, String>, ControlPlaneError> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::ListTags, resource_arn)?;

        if let Some(memory) = state
            .memories
            .values()
            .find(|memory| memory.description.arn.as_deref() == Some(resource_arn))
        {
            return Ok(memory.tags.clone());
        }
        if let Some(runtime) = state
            .runtimes
            .values()
            .find(|runtime| runtime.description.agent_runtime_arn == resource_arn)
        {
            return Ok(runtime.tags.clone());
        }
        Err(ControlPlaneError::NotFound(resource_arn.to_string()))
    }
}
