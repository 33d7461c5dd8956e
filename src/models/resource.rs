use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use std::fmt;

use super::metadata::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Job,
    Pod,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Job => write!(f, "Job"),
            ResourceKind::Pod => write!(f, "Pod"),
        }
    }
}

/// Points at one namespaced object in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn job(namespace: &str, name: &str) -> Self {
        ResourceRef {
            kind: ResourceKind::Job,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn pod(namespace: &str, name: &str) -> Self {
        ResourceRef {
            kind: ResourceKind::Pod,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}/{}'", self.kind, self.namespace, self.name)
    }
}

/// Anything the condition waiter observes must be able to describe itself for timeouts.
pub trait Observed {
    fn summary(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            // a pod without a reported phase has not been scheduled yet
            None => PodPhase::Pending,
            Some(_) => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Coarse job phase, derived from the job's conditions and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Complete | JobPhase::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobCondition {
    pub type_: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Observed state of the submitted job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub metadata: Metadata,
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub conditions: Vec<JobCondition>,
}

impl JobState {
    pub fn from_job(job: &Job) -> Self {
        let status = job.status.clone().unwrap_or_default();

        let conditions = status
            .conditions
            .unwrap_or_default()
            .into_iter()
            .map(|c| JobCondition {
                type_: c.type_,
                status: c.status,
                reason: c.reason,
                message: c.message,
            })
            .collect();

        JobState {
            metadata: Metadata::from_object_meta(&job.metadata),
            active: status.active.unwrap_or(0),
            succeeded: status.succeeded.unwrap_or(0),
            failed: status.failed.unwrap_or(0),
            conditions,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    fn condition(&self, type_: &str) -> Option<&JobCondition> {
        self.conditions
            .iter()
            .find(|c| c.type_ == type_ && c.status == "True")
    }

    pub fn phase(&self) -> JobPhase {
        if self.condition("Failed").is_some() {
            JobPhase::Failed
        } else if self.condition("Complete").is_some() {
            JobPhase::Complete
        } else if self.active > 0 || self.succeeded > 0 || self.failed > 0 {
            JobPhase::Running
        } else {
            JobPhase::Pending
        }
    }

    /// Reason and message of the `Failed` condition, if the job has one.
    pub fn failure_reason(&self) -> Option<String> {
        self.condition("Failed").map(|c| {
            join_reason(
                c.reason.as_deref().unwrap_or("Failed"),
                c.message.as_deref(),
            )
        })
    }
}

impl Observed for JobState {
    fn summary(&self) -> String {
        format!(
            "job '{}' {:?} (active={}, succeeded={}, failed={})",
            self.metadata.name,
            self.phase(),
            self.active,
            self.succeeded,
            self.failed
        )
    }
}

/// Observed state of the pod running a job.
#[derive(Debug, Clone, PartialEq)]
pub struct PodState {
    pub metadata: Metadata,
    pub phase: PodPhase,
    pub reason: Option<String>,
    pub message: Option<String>,
    /// One line per container that terminated abnormally or is stuck waiting.
    pub container_problems: Vec<String>,
}

impl PodState {
    pub fn from_pod(pod: &Pod) -> Self {
        let status = pod.status.clone().unwrap_or_default();

        let container_problems = status
            .container_statuses
            .unwrap_or_default()
            .iter()
            .filter_map(container_problem)
            .collect();

        PodState {
            metadata: Metadata::from_object_meta(&pod.metadata),
            phase: PodPhase::parse(status.phase.as_deref()),
            reason: status.reason,
            message: status.message,
            container_problems,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Describes why the pod failed, from the pod status and each container's state.
    pub fn failure_reason(&self) -> String {
        let mut parts = Vec::new();

        if self.reason.is_some() || self.message.is_some() {
            parts.push(join_reason(
                self.reason.as_deref().unwrap_or("Failed"),
                self.message.as_deref(),
            ));
        }
        parts.extend(self.container_problems.iter().cloned());

        if parts.is_empty() {
            return format!("pod phase is {}", self.phase);
        }
        parts.join("; ")
    }
}

impl Observed for PodState {
    fn summary(&self) -> String {
        format!("pod '{}' {}", self.metadata.name, self.phase)
    }
}

fn container_problem(status: &ContainerStatus) -> Option<String> {
    let state = status.state.as_ref()?;

    if let Some(terminated) = &state.terminated {
        if terminated.exit_code == 0 {
            return None;
        }
        let reason = format!(
            "container '{}' terminated: {} (exit code {})",
            status.name,
            terminated.reason.as_deref().unwrap_or("Error"),
            terminated.exit_code
        );
        return Some(join_reason(&reason, terminated.message.as_deref()));
    }

    if let Some(waiting) = &state.waiting {
        let reason = waiting.reason.as_deref()?;
        if reason == "ContainerCreating" || reason == "PodInitializing" {
            return None;
        }
        let reason = format!("container '{}' waiting: {}", status.name, reason);
        return Some(join_reason(&reason, waiting.message.as_deref()));
    }

    None
}

fn join_reason(reason: &str, message: Option<&str>) -> String {
    match message {
        Some(message) if !message.is_empty() => format!("{}: {}", reason, message),
        _ => reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Object created or modified.
    Applied,
    Deleted,
    /// The watch was (re)listed.
    Restarted,
}

/// One lifecycle notification from a watch, already summarised for humans.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub resource: ResourceRef,
    pub summary: String,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            EventKind::Applied => "updated",
            EventKind::Deleted => "deleted",
            EventKind::Restarted => "listed",
        };
        write!(f, "{} {}: {}", self.resource, verb, self.summary)
    }
}
