//! Domain types shared across the control plane.
//!
//! The backend view models (services, tasks, deploys) mirror what the
//! container orchestration backend reports; the control plane never owns
//! them, it only reads them to compute capacity demand. Job and tag records
//! are owned by the control plane and persisted via `flotilla-state`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a logical environment.
pub type EnvironmentId = String;

/// Unique identifier for a job record.
pub type JobId = String;

// ── Services ───────────────────────────────────────────────────────

/// Lightweight service listing entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSummary {
    pub service_id: String,
    pub environment_id: EnvironmentId,
}

/// Full service detail including its deployments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub service_id: String,
    pub environment_id: EnvironmentId,
    pub deployments: Vec<Deployment>,
}

/// One deployment of a deploy revision within a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub deploy_id: String,
    pub desired_count: u32,
    pub running_count: u32,
    pub pending_count: u32,
}

impl Deployment {
    /// Copies the backend has not yet scheduled anywhere.
    ///
    /// Running and pending copies both already occupy (or will occupy)
    /// provider capacity, so they are netted out of the desired count.
    pub fn unscheduled_copies(&self) -> u32 {
        self.desired_count
            .saturating_sub(self.running_count + self.pending_count)
    }
}

// ── Tasks ──────────────────────────────────────────────────────────

/// Lightweight task listing entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSummary {
    pub task_id: String,
    pub environment_id: EnvironmentId,
}

/// Full task detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub environment_id: EnvironmentId,
    pub deploy_id: String,
    pub pending_count: u32,
}

// ── Load balancers ─────────────────────────────────────────────────

/// Lightweight load balancer listing entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadBalancerSummary {
    pub load_balancer_id: String,
    pub environment_id: EnvironmentId,
}

// ── Deploys ────────────────────────────────────────────────────────

/// A deploy revision: the set of container definitions launched per copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deploy {
    pub deploy_id: String,
    pub containers: Vec<ContainerDefinition>,
}

/// Resource shape of one container within a deploy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerDefinition {
    pub name: String,
    /// Hard memory limit in bytes (0 = unset).
    pub memory: u64,
    /// Soft memory reservation in bytes (0 = unset).
    pub memory_reservation: u64,
    pub port_mappings: Vec<PortMapping>,
}

impl ContainerDefinition {
    /// Memory demand used for packing: the reservation when set, otherwise
    /// the hard limit.
    pub fn effective_memory(&self) -> u64 {
        if self.memory_reservation != 0 {
            self.memory_reservation
        } else {
            self.memory
        }
    }

    /// Host ports this container pins. Dynamic mappings (host port 0) do
    /// not constrain placement.
    pub fn host_ports(&self) -> Vec<u16> {
        self.port_mappings
            .iter()
            .map(|p| p.host_port)
            .filter(|&p| p != 0)
            .collect()
    }
}

/// A container-to-host port mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortMapping {
    /// Host port, or 0 for a dynamically assigned port.
    pub host_port: u16,
}

// ── Jobs ───────────────────────────────────────────────────────────

/// Lifecycle state of an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

/// The kind of work a job performs, which selects its step pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DeleteEnvironment,
    DeleteLoadBalancer,
    DeleteService,
    DeleteTask,
    CreateTask,
}

/// A persisted asynchronous job record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: JobId,
    pub task_id: String,
    pub job_status: JobStatus,
    pub job_type: JobType,
    /// Serialized request payload (JSON), interpreted per job type.
    pub request: String,
    /// Unix timestamp (seconds) when the job was created.
    pub time_created: u64,
    /// Unix timestamp (seconds) of the last status/meta update.
    pub last_updated: u64,
    pub meta: HashMap<String, String>,
}

impl Job {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.job_status, JobStatus::Completed | JobStatus::Error)
    }
}

// ── Tags ───────────────────────────────────────────────────────────

/// A generic metadata record attached to an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub entity_type: String,
    pub entity_id: String,
    pub key: String,
    pub value: String,
}

// ── Requests ───────────────────────────────────────────────────────

/// Payload of a `CreateTask` job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateTaskRequest {
    pub environment_id: EnvironmentId,
    pub deploy_id: String,
    pub task_name: String,
    pub copies: u32,
}
