use async_trait::async_trait;
use futures::io::AsyncBufReadExt;
use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams, PropagationPolicy};
use kube::config::KubeConfigOptions;
use kube::{Client, Config, Resource};
use kube_runtime::watcher::{watcher, Event};
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::convert::TryFrom;
use std::fmt::Debug;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::controllers::cluster::{ClusterClient, EventStream, LineStream};
use crate::models::resource::{
    EventKind, JobState, LifecycleEvent, Observed, PodPhase, PodState, ResourceKind, ResourceRef,
};
use crate::models::task::ConnectionSpec;
use crate::utils::error::Error;

/// Lines buffered between a log connection and its consumer.
const LINE_BUFFER: usize = 256;

/// `ClusterClient` backed by the Kubernetes API through `kube-rs`.
pub struct KubeCluster {
    client: Client,
    poll_interval: Duration,
}

impl KubeCluster {
    pub fn new(client: Client, poll_interval: Duration) -> Self {
        KubeCluster {
            client,
            poll_interval,
        }
    }

    /// Builds a client from the kubeconfig entries named in `connection`, or from the inferred
    /// default configuration (in-cluster or `KUBECONFIG`) when none are named.
    pub async fn connect(connection: &ConnectionSpec, poll_interval: Duration) -> Result<Self, Error> {
        let client = if connection.is_default() {
            Client::try_default()
                .await
                .map_err(|err| Error::ConnectionError(err.to_string()))?
        } else {
            let options = KubeConfigOptions {
                context: connection.context.clone(),
                cluster: connection.cluster.clone(),
                user: connection.user.clone(),
            };
            let config = Config::from_kubeconfig(&options)
                .await
                .map_err(|err| Error::ConnectionError(err.to_string()))?;
            Client::try_from(config).map_err(|err| Error::ConnectionError(err.to_string()))?
        };

        Ok(KubeCluster::new(client, poll_interval))
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Label the job controller puts on every pod it creates.
fn job_selector(job: &str) -> String {
    format!("job-name={}", job)
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

async fn get_optional<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    return match api.get(name).await {
        Ok(object) => Ok(Some(object)),
        Err(err) if is_not_found(&err) => Ok(None),
        Err(err) => Err(err.into()),
    };
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<JobState, Error> {
        let created = self.jobs(namespace).create(&PostParams::default(), job).await?;
        debug!("created job {:?}", created.metadata.name);

        Ok(JobState::from_job(&created))
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<JobState>, Error> {
        let job = get_optional(&self.jobs(namespace), name).await?;
        Ok(job.as_ref().map(JobState::from_job))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), Error> {
        // the job controller orphans pods unless told otherwise
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..DeleteParams::default()
        };

        return match self.jobs(namespace).delete(name, &params).await {
            Ok(_) => {
                info!("job {}/{} deleted", namespace, name);
                Ok(())
            }
            Err(err) if is_not_found(&err) => {
                debug!("job {}/{} already deleted", namespace, name);
                Ok(())
            }
            Err(err) => Err(err.into()),
        };
    }

    async fn find_pod(&self, namespace: &str, job: &str) -> Result<Option<PodState>, Error> {
        let params = ListParams::default().labels(&job_selector(job));
        let pods = self.pods(namespace).list(&params).await?;

        Ok(pods.items.first().map(PodState::from_pod))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodState>, Error> {
        let pod = get_optional(&self.pods(namespace), name).await?;
        Ok(pod.as_ref().map(PodState::from_pod))
    }

    async fn watch(&self, resource: &ResourceRef) -> Result<EventStream, Error> {
        let params = ListParams::default().fields(&format!("metadata.name={}", resource.name));

        return match resource.kind {
            ResourceKind::Job => {
                watch_events(self.jobs(&resource.namespace), params, resource.clone(), |job| {
                    JobState::from_job(job).summary()
                })
                .await
            }
            ResourceKind::Pod => {
                watch_events(self.pods(&resource.namespace), params, resource.clone(), |pod| {
                    PodState::from_pod(pod).summary()
                })
                .await
            }
        };
    }

    async fn stream_logs(
        &self,
        resource: &ResourceRef,
        tail_lines: Option<i64>,
    ) -> Result<LineStream, Error> {
        let pods = self.pods(&resource.namespace);
        let params = LogParams {
            follow: true,
            tail_lines,
            ..LogParams::default()
        };
        let (lines, receiver) = mpsc::channel(LINE_BUFFER);

        return match resource.kind {
            ResourceKind::Pod => {
                let (ready, attached) = oneshot::channel();
                let name = resource.name.clone();
                let task = tokio::spawn(follow(pods, name, params, lines, Some(ready)));
                let stream = TaskStream { receiver, task };

                match attached.await {
                    Ok(Ok(())) => Ok(stream.boxed()),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(Error::WatchError(format!(
                        "log stream for {} ended before attaching",
                        resource
                    ))),
                }
            }
            ResourceKind::Job => {
                // the pod is not known yet; make sure it can be looked up at all
                let selector = ListParams::default().labels(&job_selector(&resource.name));
                pods.list(&selector.clone().limit(1)).await?;

                let poll_interval = self.poll_interval;
                let job = resource.name.clone();
                let task = tokio::spawn(async move {
                    match started_pod(&pods, &selector, poll_interval).await {
                        Ok(name) => {
                            debug!("following logs of pod {} for job {}", name, job);
                            follow(pods, name, params, lines, None).await
                        }
                        Err(err) => {
                            let _ = lines.send(Err(err)).await;
                        }
                    }
                });

                Ok(TaskStream { receiver, task }.boxed())
            }
        };
    }
}

async fn watch_events<K, F>(
    api: Api<K>,
    params: ListParams,
    resource: ResourceRef,
    summarize: F,
) -> Result<EventStream, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    F: Fn(&K) -> String + Send + 'static,
{
    // the watcher only connects when polled, so check access up front
    api.list(&params.clone().limit(1)).await?;

    let events = watcher(api, params).map(move |event| {
        let (kind, summary) = match event {
            Ok(Event::Applied(object)) => (EventKind::Applied, summarize(&object)),
            Ok(Event::Deleted(object)) => (EventKind::Deleted, summarize(&object)),
            Ok(Event::Restarted(objects)) => {
                let summaries: Vec<String> = objects.iter().map(|o| summarize(o)).collect();
                (EventKind::Restarted, summaries.join(", "))
            }
            Err(err) => return Err(Error::WatchError(err.to_string())),
        };

        Ok(LifecycleEvent {
            kind,
            resource: resource.clone(),
            summary,
        })
    });

    Ok(events.boxed())
}

/// Polls the job's pods until one has left `Pending`, which is when its logs become readable.
async fn started_pod(
    pods: &Api<Pod>,
    selector: &ListParams,
    poll_interval: Duration,
) -> Result<String, Error> {
    loop {
        let list = pods.list(selector).await?;
        if let Some(name) = first_started(&list.items) {
            return Ok(name);
        }

        tokio::time::sleep(poll_interval).await;
    }
}

fn first_started(pods: &[Pod]) -> Option<String> {
    pods.iter()
        .map(PodState::from_pod)
        .find(|pod| pod.phase != PodPhase::Pending)
        .map(|pod| pod.metadata.name)
}

/// Opens the log stream of one pod and forwards it line by line. `ready`, when given, receives
/// the outcome of opening the stream instead of it being sent as a line.
async fn follow(
    pods: Api<Pod>,
    name: String,
    params: LogParams,
    lines: mpsc::Sender<Result<String, Error>>,
    ready: Option<oneshot::Sender<Result<(), Error>>>,
) {
    let chunks = match pods.log_stream(&name, &params).await {
        Ok(chunks) => chunks,
        Err(err) => {
            match ready {
                Some(ready) => {
                    let _ = ready.send(Err(err.into()));
                }
                None => {
                    let _ = lines.send(Err(err.into())).await;
                }
            }
            return;
        }
    };

    if let Some(ready) = ready {
        let _ = ready.send(Ok(()));
    }

    forward_lines(chunks, lines).await;
}

/// Splits a stream of byte chunks into lines and sends them on until either side ends. A line
/// may span several chunks.
async fn forward_lines<S, B, E>(chunks: S, lines: mpsc::Sender<Result<String, Error>>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut reader = Box::pin(chunks)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
        .into_async_read()
        .lines();

    while let Some(line) = reader.next().await {
        if lines.send(line.map_err(Error::from)).await.is_err() {
            // consumer is gone
            break;
        }
    }
}

/// Stream fed by a background task that is aborted as soon as the stream is dropped.
struct TaskStream<T> {
    receiver: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Unpin for TaskStream<T> {}

impl<T> Stream for TaskStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.poll_recv(cx)
    }
}

impl<T> Drop for TaskStream<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
