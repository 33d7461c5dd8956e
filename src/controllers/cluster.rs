use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::batch::v1::Job;

use crate::models::resource::{JobState, LifecycleEvent, PodState, ResourceRef};
use crate::utils::error::Error;

pub type EventStream = BoxStream<'static, Result<LifecycleEvent, Error>>;
pub type LineStream = BoxStream<'static, Result<String, Error>>;

/// Everything a job run needs from the cluster. One instance is shared by every component of a
/// run, so implementations must be safe to call concurrently.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Submits `job` and returns the object as accepted by the API server (with its final name).
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<JobState, Error>;

    /// `Ok(None)` when the job does not exist (yet, or any more).
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<JobState>, Error>;

    /// Deletes the job together with its pods. Deleting a missing job succeeds.
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// First pod spawned by the job, if any.
    async fn find_pod(&self, namespace: &str, job: &str) -> Result<Option<PodState>, Error>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodState>, Error>;

    /// Opens a watch on one object. Fails only if the subscription cannot be established.
    async fn watch(&self, resource: &ResourceRef) -> Result<EventStream, Error>;

    /// Follows the output of a pod, or of the pod a job spawns once it is running.
    async fn stream_logs(
        &self,
        resource: &ResourceRef,
        tail_lines: Option<i64>,
    ) -> Result<LineStream, Error>;
}
