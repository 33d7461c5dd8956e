use log::{debug, warn, Level};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::controllers::cluster::ClusterClient;
use crate::models::config::RunnerConfig;
use crate::models::outcome::Outcome;
use crate::models::resource::{JobPhase, JobState, PodPhase, PodState, ResourceRef};
use crate::models::task::JobTask;
use crate::utils::error::Error;
use crate::utils::sink::ReportSink;
use crate::workflows::builder::build_job;
use crate::workflows::guard::{GuardStack, PhaseGuard};
use crate::workflows::waiter::ConditionWaiter;
use crate::workflows::{logs, watcher};

pub const JOB_LOG_PREFIX: &str = "Job Log:";

/// Where a run currently stands. Runs only move forward; `Failed` can be entered from any
/// state before `Done` and is always followed by cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Building,
    Submitted,
    UnitPending,
    UnitReady,
    Completing,
    Done,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Drives one job from submission to deletion.
///
/// The job is deleted exactly once whatever happens after it was accepted by the cluster,
/// unless the task disables deletion. Errors reach the caller as they were raised; a failed
/// deletion is only reported.
pub struct JobLifecycle {
    client: Arc<dyn ClusterClient>,
    task: JobTask,
    config: RunnerConfig,
    sink: ReportSink,
    waiter: ConditionWaiter,
    state: LifecycleState,
}

impl JobLifecycle {
    /// # Arguments
    /// - `client` - Cluster session shared by every component of the run.
    /// - `task` - The job task to run.
    /// - `config` - Poll interval and log backlog settings.
    /// - `sink` - Receives the narrative of the run along with job events and logs.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        task: JobTask,
        config: RunnerConfig,
        sink: ReportSink,
    ) -> Self {
        let waiter = ConditionWaiter::new(config.poll_interval);

        JobLifecycle {
            client,
            task,
            config,
            sink,
            waiter,
            state: LifecycleState::Building,
        }
    }

    /// Runs the job to completion. Resolving `cancel` aborts the run once the job has been
    /// submitted; the job is then cleaned up and `Error::Cancelled` returned.
    pub async fn run<C>(mut self, cancel: C) -> Result<Outcome, Error>
    where
        C: Future<Output = ()>,
    {
        let job = match self.submit().await {
            Ok(job) => job,
            Err(err) => {
                // nothing exists in the cluster yet
                self.transition(LifecycleState::Failed);
                return Err(err);
            }
        };

        let mut guards = GuardStack::default();
        let observed = tokio::select! {
            result = self.observe(&job, &mut guards) => result,
            _ = cancel => Err(Error::Cancelled),
        };
        // whatever observation left open, whether it failed or was cut short
        guards.release_all().await;

        return match observed {
            Ok((job, pod)) => {
                self.cleanup(&job).await;
                self.transition(LifecycleState::Done);
                Ok(Outcome {
                    job: job.metadata,
                    pod: pod.metadata,
                })
            }
            Err(err) => {
                self.transition(LifecycleState::Failed);
                self.sink.warn(format!("Job '{}' failed: {}", job.name(), err));
                self.cleanup(&job).await;
                Err(err)
            }
        };
    }

    fn transition(&mut self, next: LifecycleState) {
        debug!("lifecycle {} -> {}", self.state, next);
        self.sink.debug(format!("Lifecycle {} -> {}", self.state, next));
        self.state = next;
    }

    fn namespace(&self) -> &str {
        &self.task.namespace
    }

    /// Building -> Submitted
    async fn submit(&mut self) -> Result<JobState, Error> {
        let job = build_job(&self.task)?;

        let job = self
            .client
            .create_job(self.namespace(), &job)
            .await
            .map_err(|source| Error::SubmissionError {
                source: Box::new(source),
            })?;

        self.sink.info(format!(
            "Job '{}' created in namespace '{}'",
            job.name(),
            self.namespace()
        ));
        self.transition(LifecycleState::Submitted);

        Ok(job)
    }

    /// Submitted -> ... -> Completing. Listeners are held in `guards`; the job's are released
    /// at the handoff to the pod, the rest are left for the caller to release.
    async fn observe(
        &mut self,
        job: &JobState,
        guards: &mut GuardStack,
    ) -> Result<(JobState, PodState), Error> {
        let job_ref = ResourceRef::job(self.namespace(), job.name());

        let pod = self.await_pod_created(&job_ref, guards.open("job")).await?;
        self.transition(LifecycleState::UnitPending);

        let pod_ref = ResourceRef::pod(self.namespace(), pod.name());
        let ready = self.await_pod_ready(&pod_ref, guards.open("pod")).await;
        // hand over from the job's listeners to the pod's
        guards.release("job").await;
        let pod = ready?;
        self.transition(LifecycleState::UnitReady);

        self.attach_pod_logs(&pod_ref, guards.open("pod logs")).await?;
        self.transition(LifecycleState::Completing);

        let job = self.await_completion(&job_ref).await?;

        Ok((job, pod))
    }

    async fn await_pod_created(
        &self,
        job_ref: &ResourceRef,
        guard: &mut PhaseGuard,
    ) -> Result<PodState, Error> {
        let client = self.client.as_ref();

        guard.push(watcher::attach(client, job_ref, self.sink.clone(), Level::Debug).await?);
        guard.push(
            logs::attach(
                client,
                job_ref,
                self.sink.clone(),
                Level::Debug,
                Some(JOB_LOG_PREFIX),
                None,
            )
            .await?,
        );

        let condition = format!("pod of job '{}' to be created", job_ref.name);
        let pod = self
            .waiter
            .wait(
                &condition,
                self.task.wait_until_running(),
                || client.find_pod(&job_ref.namespace, &job_ref.name),
                |_| true,
            )
            .await?;

        self.sink.info(format!("Pod '{}' created", pod.name()));
        Ok(pod)
    }

    async fn await_pod_ready(
        &self,
        pod_ref: &ResourceRef,
        guard: &mut PhaseGuard,
    ) -> Result<PodState, Error> {
        let client = self.client.as_ref();

        guard.push(watcher::attach(client, pod_ref, self.sink.clone(), Level::Debug).await?);

        let condition = format!("pod '{}' to leave Pending", pod_ref.name);
        let pod = self
            .waiter
            .wait(
                &condition,
                self.task.wait_until_running(),
                || client.get_pod(&pod_ref.namespace, &pod_ref.name),
                |pod: &PodState| {
                    matches!(
                        pod.phase,
                        PodPhase::Running | PodPhase::Succeeded | PodPhase::Failed
                    )
                },
            )
            .await?;

        if pod.phase == PodPhase::Failed {
            return Err(Error::UnitFailedError {
                pod: pod.name().to_string(),
                reason: pod.failure_reason(),
            });
        }

        self.sink.info(format!("Pod '{}' is {}", pod.name(), pod.phase));
        Ok(pod)
    }

    async fn attach_pod_logs(
        &self,
        pod_ref: &ResourceRef,
        guard: &mut PhaseGuard,
    ) -> Result<(), Error> {
        let handle = logs::attach(
            self.client.as_ref(),
            pod_ref,
            self.sink.clone(),
            Level::Info,
            None,
            Some(self.config.tail_lines),
        )
        .await?;
        guard.push(handle);

        Ok(())
    }

    /// Only the job's own conditions decide the outcome from here on.
    async fn await_completion(&self, job_ref: &ResourceRef) -> Result<JobState, Error> {
        let client = self.client.as_ref();

        let condition = format!("job '{}' to finish", job_ref.name);
        let job = self
            .waiter
            .wait(
                &condition,
                self.task.wait_running(),
                || client.get_job(&job_ref.namespace, &job_ref.name),
                |job: &JobState| job.phase().is_terminal(),
            )
            .await?;

        if job.phase() == JobPhase::Failed {
            return Err(Error::WorkloadFailedError {
                job: job.name().to_string(),
                reason: job
                    .failure_reason()
                    .unwrap_or_else(|| "no reason reported".to_string()),
            });
        }

        self.sink.info(format!(
            "Job '{}' completed (succeeded={})",
            job.name(),
            job.succeeded
        ));
        Ok(job)
    }

    /// Best effort: a failed deletion is reported and never replaces the run's result.
    async fn cleanup(&self, job: &JobState) {
        if !self.task.delete {
            debug!("keeping job {} as requested", job.name());
            return;
        }

        match self.client.delete_job(self.namespace(), job.name()).await {
            Ok(()) => self.sink.info(format!("Job '{}' is deleted", job.name())),
            Err(source) => {
                let err = Error::CleanupError {
                    job: job.name().to_string(),
                    source: Box::new(source),
                };
                warn!("{}", err);
                self.sink.warn(err.to_string());
            }
        }
    }
}
