use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Map, Value};

use crate::models::task::JobTask;
use crate::utils::error::Error;
use crate::utils::render::render_tree;

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "kube-job-runner";
pub const DEFAULT_GENERATE_NAME: &str = "job-runner-";

/// Renders the task's metadata and spec templates into the `Job` to submit.
pub fn build_job(task: &JobTask) -> Result<Job, Error> {
    let values = variables(task);

    let metadata = match &task.metadata {
        Some(metadata) => render_tree(metadata, &values)?,
        None => Value::Object(Map::new()),
    };
    let spec = render_tree(&task.spec, &values)?;

    let mut metadata: ObjectMeta = serde_json::from_value(metadata).map_err(|source| {
        Error::SchemaError {
            target: "metadata",
            source,
        }
    })?;
    let spec: JobSpec = serde_json::from_value(spec).map_err(|source| Error::SchemaError {
        target: "spec",
        source,
    })?;

    apply_defaults(&mut metadata, &task.namespace)?;

    Ok(Job {
        metadata,
        spec: Some(spec),
        ..Job::default()
    })
}

/// User variables plus the built-in ones. User variables win on conflict.
fn variables(task: &JobTask) -> Map<String, Value> {
    let mut values = task.variables.clone();
    values
        .entry("namespace")
        .or_insert_with(|| Value::String(task.namespace.clone()));
    values
}

fn apply_defaults(metadata: &mut ObjectMeta, namespace: &str) -> Result<(), Error> {
    match &metadata.namespace {
        Some(requested) if requested != namespace => {
            return Err(Error::UserInputError(format!(
                "metadata namespace '{}' does not match task namespace '{}'",
                requested, namespace
            )));
        }
        _ => metadata.namespace = Some(namespace.to_string()),
    }

    if metadata.name.is_none() && metadata.generate_name.is_none() {
        metadata.generate_name = Some(DEFAULT_GENERATE_NAME.to_string());
    }

    metadata
        .labels
        .get_or_insert_with(Default::default)
        .entry(MANAGED_BY_LABEL.to_string())
        .or_insert_with(|| MANAGED_BY.to_string());

    Ok(())
}
