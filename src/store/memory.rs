use super::{validate_user, FeatureMapStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FeatureMapStore for MemoryStore {
    async fn load(&self, user: &str) -> Result<Option<String>, StoreError> {
        let user = validate_user(user)?;
        Ok(self
            .documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user)
            .cloned())
    }

    async fn save(&self, user: &str, document: &str) -> Result<(), StoreError> {
        let user = validate_user(user)?;
        self.documents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user.to_string(), document.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
