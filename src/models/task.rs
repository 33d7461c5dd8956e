use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::utils::error::Error;

/// Declarative definition of one job run, read from the task file.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobTask {
    /// The namespace where the job will be created.
    pub namespace: String,

    /// Full metadata for the job. String values may hold handlebars expressions.
    #[serde(default)]
    pub metadata: Option<Value>,

    /// Full `JobSpec` for the job. String values may hold handlebars expressions.
    pub spec: Value,

    /// Variables made available to the metadata and spec templates.
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Whether the job is deleted once the run is over.
    #[serde(default = "default_delete")]
    pub delete: bool,

    /// Seconds to wait for the job's pod to be created and then to leave `Pending`.
    #[serde(default = "default_wait_until_running")]
    pub wait_until_running: u64,

    /// Seconds to wait for the job to finish once its pod is running.
    #[serde(default = "default_wait_running")]
    pub wait_running: u64,

    #[serde(default)]
    pub connection: ConnectionSpec,
}

/// Which kubeconfig entries to connect with. Empty means the inferred default config.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, JsonSchema)]
pub struct ConnectionSpec {
    pub context: Option<String>,
    pub cluster: Option<String>,
    pub user: Option<String>,
}

impl ConnectionSpec {
    pub fn is_default(&self) -> bool {
        self.context.is_none() && self.cluster.is_none() && self.user.is_none()
    }
}

fn default_delete() -> bool {
    true
}

fn default_wait_until_running() -> u64 {
    600
}

fn default_wait_running() -> u64 {
    3600
}

impl JobTask {
    pub fn from_json(json: &str) -> Result<JobTask, Error> {
        let task: JobTask = serde_json::from_str(json)?;
        task.validate()?;
        Ok(task)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.namespace.trim().is_empty() {
            return Err(Error::UserInputError("namespace must not be empty".to_owned()));
        }
        if !self.spec.is_object() {
            return Err(Error::UserInputError("spec must be an object".to_owned()));
        }
        if let Some(metadata) = &self.metadata {
            if !metadata.is_object() {
                return Err(Error::UserInputError("metadata must be an object".to_owned()));
            }
        }
        Ok(())
    }

    pub fn wait_until_running(&self) -> Duration {
        Duration::from_secs(self.wait_until_running)
    }

    pub fn wait_running(&self) -> Duration {
        Duration::from_secs(self.wait_running)
    }
}
