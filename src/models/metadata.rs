use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity snapshot of a Kubernetes object, as reported in the run outcome.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub generation: Option<i64>,
    pub resource_version: Option<String>,
    pub creation_timestamp: Option<String>,
}

impl Metadata {
    pub fn from_object_meta(meta: &ObjectMeta) -> Self {
        Metadata {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone(),
            uid: meta.uid.clone(),
            labels: meta.labels.clone().unwrap_or_default(),
            annotations: meta.annotations.clone().unwrap_or_default(),
            generation: meta.generation,
            resource_version: meta.resource_version.clone(),
            creation_timestamp: meta.creation_timestamp.as_ref().map(|t| t.0.to_rfc3339()),
        }
    }

    /// Shorthand used by tests and mocks.
    #[cfg(test)]
    pub fn named(name: &str, namespace: &str) -> Self {
        Metadata {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    use super::Metadata;

    #[test]
    fn copies_identity_fields() {
        let mut labels = BTreeMap::new();
        labels.insert("team".to_string(), "data".to_string());

        let meta = ObjectMeta {
            name: Some("report-abc12".to_string()),
            namespace: Some("batch".to_string()),
            uid: Some("4f1c".to_string()),
            labels: Some(labels),
            generation: Some(1),
            ..Default::default()
        };

        let metadata = Metadata::from_object_meta(&meta);

        assert_eq!(metadata.name, "report-abc12");
        assert_eq!(metadata.namespace.as_deref(), Some("batch"));
        assert_eq!(metadata.uid.as_deref(), Some("4f1c"));
        assert_eq!(metadata.labels.get("team").map(String::as_str), Some("data"));
        assert_eq!(metadata.annotations.is_empty(), true);
        assert_eq!(metadata.creation_timestamp, None);
    }
}
