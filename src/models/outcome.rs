use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::metadata::Metadata;

/// Result of a clean run: who ran.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
pub struct Outcome {
    /// The full job metadata
    pub job: Metadata,
    /// The full pod metadata
    pub pod: Metadata,
}
