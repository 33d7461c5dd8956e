use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use k8s_openapi::api::batch::v1::Job;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::controllers::cluster::{ClusterClient, EventStream, LineStream};
use crate::models::metadata::Metadata;
use crate::models::resource::{
    EventKind, JobCondition, JobState, LifecycleEvent, PodPhase, PodState, ResourceKind,
    ResourceRef,
};
use crate::utils::error::Error;

/// Calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Create,
    WatchJob,
    JobLogs,
    WatchPod,
    PodLogs,
    Delete,
}

/// How the fake cluster behaves over the course of one run.
#[derive(Debug, Clone)]
pub struct Script {
    /// Number of empty `find_pod` answers before the pod shows up. `None` means never.
    pub pod_appears_after: Option<usize>,
    /// Successive phases returned by `get_pod`; the last one repeats.
    pub pod_phases: Vec<PodPhase>,
    pub pod_reason: Option<String>,
    /// Number of non-terminal `get_job` answers before the job finishes.
    pub job_finishes_after: usize,
    /// When set the job finishes with a `Failed` condition carrying this reason.
    pub job_failure: Option<String>,
    pub pod_log_lines: usize,
    pub faults: Vec<Fault>,
}

impl Default for Script {
    fn default() -> Self {
        Script {
            pod_appears_after: Some(1),
            pod_phases: vec![PodPhase::Pending, PodPhase::Running],
            pod_reason: None,
            job_finishes_after: 3,
            job_failure: None,
            pod_log_lines: 10,
            faults: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Calls {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub watches: Vec<ResourceRef>,
    pub logs: Vec<(ResourceRef, Option<i64>)>,
    find_pod: usize,
    get_pod: usize,
    get_job: usize,
}

impl Calls {
    pub fn opened(&self) -> usize {
        self.watches.len() + self.logs.len()
    }

    pub fn attached_to(&self, kind: ResourceKind) -> usize {
        self.watches.iter().filter(|r| r.kind == kind).count()
            + self.logs.iter().filter(|(r, _)| r.kind == kind).count()
    }
}

/// Increments the shared counter when the stream holding it is dropped.
struct CloseToken(Arc<AtomicUsize>);

impl Drop for CloseToken {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockCluster {
    script: Script,
    calls: Mutex<Calls>,
    closed: Arc<AtomicUsize>,
}

pub const NAMESPACE: &str = "batch";
pub const JOB_NAME: &str = "report-x7k2p";
pub const POD_NAME: &str = "report-x7k2p-4m9vq";

impl MockCluster {
    pub fn new(script: Script) -> Self {
        MockCluster {
            script,
            calls: Mutex::new(Calls::default()),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }

    /// Streams dropped so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn fails(&self, fault: Fault) -> Result<(), Error> {
        if self.script.faults.contains(&fault) {
            return Err(Error::ConnectionError(format!("injected {:?} failure", fault)));
        }
        Ok(())
    }

    /// Yields `items` and then stays open until dropped.
    fn open<T: Send + 'static>(&self, items: Vec<T>) -> futures::stream::BoxStream<'static, T> {
        let token = CloseToken(self.closed.clone());
        stream::iter(items)
            .chain(stream::pending())
            .map(move |item| {
                let _ = &token;
                item
            })
            .boxed()
    }

    fn job_state(&self, finished: bool) -> JobState {
        let mut conditions = Vec::new();
        if finished {
            conditions.push(match &self.script.job_failure {
                Some(reason) => JobCondition {
                    type_: "Failed".to_string(),
                    status: "True".to_string(),
                    reason: Some(reason.clone()),
                    message: None,
                },
                None => JobCondition {
                    type_: "Complete".to_string(),
                    status: "True".to_string(),
                    reason: None,
                    message: None,
                },
            });
        }

        JobState {
            metadata: Metadata::named(JOB_NAME, NAMESPACE),
            active: if finished { 0 } else { 1 },
            succeeded: if finished && self.script.job_failure.is_none() { 1 } else { 0 },
            failed: if finished && self.script.job_failure.is_some() { 1 } else { 0 },
            conditions,
        }
    }

    fn pod_state(&self, phase: PodPhase) -> PodState {
        PodState {
            metadata: Metadata::named(POD_NAME, NAMESPACE),
            phase,
            reason: if phase == PodPhase::Failed {
                self.script.pod_reason.clone()
            } else {
                None
            },
            message: None,
            container_problems: Vec::new(),
        }
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn create_job(&self, _namespace: &str, job: &Job) -> Result<JobState, Error> {
        self.fails(Fault::Create)?;
        let requested = job
            .metadata
            .name
            .clone()
            .or_else(|| job.metadata.generate_name.clone())
            .unwrap_or_default();
        self.calls().created.push(requested);

        Ok(self.job_state(false))
    }

    async fn get_job(&self, _namespace: &str, _name: &str) -> Result<Option<JobState>, Error> {
        let polls = {
            let mut calls = self.calls();
            calls.get_job += 1;
            calls.get_job
        };

        Ok(Some(self.job_state(polls > self.script.job_finishes_after)))
    }

    async fn delete_job(&self, _namespace: &str, name: &str) -> Result<(), Error> {
        self.calls().deleted.push(name.to_string());
        self.fails(Fault::Delete)
    }

    async fn find_pod(&self, _namespace: &str, _job: &str) -> Result<Option<PodState>, Error> {
        let polls = {
            let mut calls = self.calls();
            calls.find_pod += 1;
            calls.find_pod
        };

        Ok(match self.script.pod_appears_after {
            Some(after) if polls > after => Some(self.pod_state(PodPhase::Pending)),
            _ => None,
        })
    }

    async fn get_pod(&self, _namespace: &str, _name: &str) -> Result<Option<PodState>, Error> {
        let index = {
            let mut calls = self.calls();
            calls.get_pod += 1;
            calls.get_pod - 1
        };
        let phases = &self.script.pod_phases;
        let phase = phases
            .get(index)
            .or_else(|| phases.last())
            .copied()
            .unwrap_or(PodPhase::Pending);

        Ok(Some(self.pod_state(phase)))
    }

    async fn watch(&self, resource: &ResourceRef) -> Result<EventStream, Error> {
        match resource.kind {
            ResourceKind::Job => self.fails(Fault::WatchJob)?,
            ResourceKind::Pod => self.fails(Fault::WatchPod)?,
        }
        self.calls().watches.push(resource.clone());

        let created = LifecycleEvent {
            kind: EventKind::Restarted,
            resource: resource.clone(),
            summary: format!("{} observed", resource.name),
        };
        Ok(self.open(vec![Ok(created)]))
    }

    async fn stream_logs(
        &self,
        resource: &ResourceRef,
        tail_lines: Option<i64>,
    ) -> Result<LineStream, Error> {
        let lines = match resource.kind {
            ResourceKind::Job => {
                self.fails(Fault::JobLogs)?;
                Vec::new()
            }
            ResourceKind::Pod => {
                self.fails(Fault::PodLogs)?;
                (1..=self.script.pod_log_lines)
                    .map(|i| Ok(i.to_string()))
                    .collect()
            }
        };
        self.calls().logs.push((resource.clone(), tail_lines));

        Ok(self.open(lines))
    }
}
