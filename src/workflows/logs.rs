use futures::StreamExt;
use log::{debug, Level};

use crate::controllers::cluster::ClusterClient;
use crate::models::resource::ResourceRef;
use crate::utils::error::Error;
use crate::utils::sink::ReportSink;
use crate::workflows::guard::{ListenerHandle, ListenerKind};

/// Follows the output of `resource` and reports each line at `level`, behind `prefix` if any.
/// `tail_lines` bounds the backlog replayed on attach.
pub async fn attach(
    client: &dyn ClusterClient,
    resource: &ResourceRef,
    sink: ReportSink,
    level: Level,
    prefix: Option<&str>,
    tail_lines: Option<i64>,
) -> Result<ListenerHandle, Error> {
    let mut lines = client
        .stream_logs(resource, tail_lines)
        .await
        .map_err(|source| Error::WatchAttachError {
            target: format!("logs of {}", resource),
            source: Box::new(source),
        })?;

    let target = resource.clone();
    let prefix = prefix.map(str::to_string);
    let task = tokio::spawn(async move {
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => sink.write(level, prefix.as_deref(), line),
                Err(err) => sink.warn(format!("Log stream of {} reported: {}", target, err)),
            }
        }
        debug!("log stream for {} ended", target);
    });

    Ok(ListenerHandle::new(ListenerKind::Logs, resource.clone(), task))
}
