use std::time::Duration;

/// Utility enum that covers all possible errors during a job run
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },

    /// The Kubernetes client could not be configured or connected.
    #[error("Kubernetes connection error: {0}")]
    ConnectionError(String),

    /// A watch that was already established reported a failure.
    #[error("Watch error: {0}")]
    WatchError(String),

    /// Error in user input or job task definition, typically missing fields.
    #[error("Invalid job task: {0}")]
    UserInputError(String),

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    SerdeError {
        #[from]
        source: serde_json::Error,
    },

    /// A template referenced an undefined variable or could not be parsed.
    #[error("Render error: {source}")]
    RenderError {
        #[from]
        source: handlebars::RenderError,
    },

    /// The rendered tree does not map onto the Kubernetes schema.
    #[error("Rendered {target} is invalid: {source}")]
    SchemaError {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The cluster rejected the job definition.
    #[error("Job submission failed: {source}")]
    SubmissionError {
        #[source]
        source: Box<Error>,
    },

    /// An event or log subscription could not be opened.
    #[error("Unable to attach to {target}: {source}")]
    WatchAttachError {
        target: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Timed out after {timeout:?} waiting for {condition} (last observed: {})", .last_state.as_deref().unwrap_or("nothing"))]
    TimeoutError {
        condition: String,
        timeout: Duration,
        last_state: Option<String>,
    },

    /// The job's pod reached the `Failed` phase.
    #[error("Pod '{pod}' failed: {reason}")]
    UnitFailedError { pod: String, reason: String },

    /// The job itself reported a `Failed` condition.
    #[error("Job '{job}' failed: {reason}")]
    WorkloadFailedError { job: String, reason: String },

    /// Deleting the job failed. Only ever reported, never returned from a run.
    #[error("Unable to delete job '{job}': {source}")]
    CleanupError {
        job: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Job run was cancelled")]
    Cancelled,
}
