use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// The authorization requirement declared for one operation.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct OperationMetadata {
    pub action: String,

    /// Subject type name. A resolved subject is tagged with it and attached
    /// under this key.
    pub subject: String,

    /// Key of the subject hook resolving the instance, if the check is made
    /// against an instance rather than the bare type.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
}

impl OperationMetadata {
    pub fn new(action: &str, subject: &str) -> Self {
        Self {
            action: action.to_string(),
            subject: subject.to_string(),
            hook: None,
        }
    }

    pub fn with_hook(mut self, key: &str) -> Self {
        self.hook = Some(key.to_string());
        self
    }
}

/// Metadata of one operation, as written in configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OperationConfig {
    pub name: String,

    #[serde(flatten)]
    pub acl: OperationMetadata,
}

/// Operation metadata keyed by operation name. Immutable once built.
#[derive(Debug, Default)]
pub struct MetadataTable {
    operations: HashMap<String, OperationMetadata>,
}

impl MetadataTable {
    pub fn builder() -> MetadataTableBuilder {
        MetadataTableBuilder::default()
    }

    pub fn get(&self, operation: &str) -> Option<&OperationMetadata> {
        self.operations.get(operation)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OperationMetadata)> {
        self.operations.iter().map(|(name, meta)| (name.as_str(), meta))
    }
}

#[derive(Debug, Default)]
pub struct MetadataTableBuilder {
    operations: HashMap<String, OperationMetadata>,
}

impl MetadataTableBuilder {
    /// Registers the metadata of an operation. Each operation is registered
    /// at most once.
    pub fn register(
        &mut self,
        operation: &str,
        metadata: OperationMetadata,
    ) -> Result<&mut Self, GuardError> {
        if self.operations.contains_key(operation) {
            return Err(GuardError::DuplicateOperation(operation.to_string()));
        }
        self.operations.insert(operation.to_string(), metadata);
        Ok(self)
    }

    pub fn build(self) -> MetadataTable {
        MetadataTable {
            operations: self.operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table() {
        let mut builder = MetadataTable::builder();
        builder
            .register(
                "getDocument",
                OperationMetadata::new("read", "Document").with_hook("docHook"),
            )
            .unwrap()
            .register("listArticles", OperationMetadata::new("read", "Article"))
            .unwrap();

        let err = builder
            .register("getDocument", OperationMetadata::new("update", "Document"))
            .unwrap_err();
        assert!(err.is_configuration());

        let table = builder.build();
        assert_eq!(table.len(), 2);
        let meta = table.get("getDocument").unwrap();
        assert_eq!(meta.action, "read");
        assert_eq!(meta.hook.as_deref(), Some("docHook"));
        assert!(table.get("listArticles").unwrap().hook.is_none());
        assert!(table.get("listAll").is_none());
    }

    #[test]
    fn test_operation_config() {
        let cfg: OperationConfig = toml::from_str(
            r#"
name = "getDocument"
action = "read"
subject = "Document"
hook = "docHook"
"#,
        )
        .unwrap();
        assert_eq!(cfg.name, "getDocument");
        assert_eq!(
            cfg.acl,
            OperationMetadata::new("read", "Document").with_hook("docHook")
        );
    }
}
