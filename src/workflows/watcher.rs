use futures::StreamExt;
use log::{debug, Level};

use crate::controllers::cluster::ClusterClient;
use crate::models::resource::ResourceRef;
use crate::utils::error::Error;
use crate::utils::sink::ReportSink;
use crate::workflows::guard::{ListenerHandle, ListenerKind};

/// Subscribes to lifecycle events of `resource` and reports one line per event at `level`.
///
/// Only fails when the subscription cannot be established. Errors reported by the stream
/// afterwards become warnings, and the end of the stream is not an error.
pub async fn attach(
    client: &dyn ClusterClient,
    resource: &ResourceRef,
    sink: ReportSink,
    level: Level,
) -> Result<ListenerHandle, Error> {
    let mut events = client
        .watch(resource)
        .await
        .map_err(|source| Error::WatchAttachError {
            target: resource.to_string(),
            source: Box::new(source),
        })?;

    let target = resource.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => sink.write(level, None, event.to_string()),
                Err(err) => sink.warn(format!("Watch on {} reported: {}", target, err)),
            }
        }
        debug!("event stream for {} ended", target);
    });

    Ok(ListenerHandle::new(
        ListenerKind::Events,
        resource.clone(),
        task,
    ))
}
