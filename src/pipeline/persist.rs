use crate::error::PipelineError;
use crate::features::FeatureMap;
use crate::store::FeatureMapStore;
use tracing::info;

/// Stores `map` as the user's feature map document
pub async fn persist(
    store: &dyn FeatureMapStore,
    user: &str,
    map: &FeatureMap,
) -> Result<(), PipelineError> {
    let document = map.to_document()?;
    store.save(user, &document).await?;
    info!(user, store = store.name(), features = map.len(), "Persisted feature map");
    Ok(())
}

/// Loads the user's feature map. A user without one gets an empty map.
pub async fn load_feature_map(
    store: &dyn FeatureMapStore,
    user: &str,
) -> Result<FeatureMap, PipelineError> {
    match store.load(user).await? {
        Some(document) => Ok(FeatureMap::from_document(&document)?),
        None => Ok(FeatureMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Feature, FeatureId};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_persist_then_load() {
        let store = MemoryStore::new();
        let mut map = FeatureMap::new();
        map.insert(Feature::new(
            FeatureId::new("auth"),
            "Login",
            "Sign in",
            "OAuth",
            vec!["src/auth.rs".to_string()],
        ));

        persist(&store, "alice", &map).await.unwrap();
        assert_eq!(load_feature_map(&store, "alice").await.unwrap(), map);
    }

    #[tokio::test]
    async fn test_missing_map_is_empty() {
        let store = MemoryStore::new();
        assert!(load_feature_map(&store, "nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_document_loads() {
        let store = MemoryStore::new();
        store
            .save(
                "bob",
                r#"{"f1":{"name":"Search","user_description":"Find things"}}"#,
            )
            .await
            .unwrap();

        let map = load_feature_map(&store, "bob").await.unwrap();
        assert_eq!(map.get(&FeatureId::new("f1")).unwrap().user_summary, "Find things");
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let store = MemoryStore::new();
        store.save("carol", "{oops").await.unwrap();
        let err = load_feature_map(&store, "carol").await.unwrap_err();
        assert!(matches!(err, PipelineError::Document(_)));
    }
}
