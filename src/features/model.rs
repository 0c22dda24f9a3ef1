//! Feature map data model and its stored document form

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Stable identity of a feature, immutable once assigned
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FeatureId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A named unit of functionality discovered in a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
    pub user_summary: String,
    pub technical_summary: String,
    /// Ordered, without duplicates
    pub file_references: Vec<String>,
    #[serde(default)]
    pub neighbors: BTreeSet<FeatureId>,
}

impl Feature {
    pub fn new(
        id: FeatureId,
        name: impl Into<String>,
        user_summary: impl Into<String>,
        technical_summary: impl Into<String>,
        file_references: Vec<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            user_summary: user_summary.into(),
            technical_summary: technical_summary.into(),
            file_references: dedupe_paths(file_references),
            neighbors: BTreeSet::new(),
        }
    }

    pub fn set_file_references(&mut self, paths: Vec<String>) {
        self.file_references = dedupe_paths(paths);
    }
}

/// Drops repeated paths, keeping first occurrences in order
pub(crate) fn dedupe_paths(paths: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Why a link between two features was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkRefused {
    #[error("feature {0} cannot be linked to itself")]
    SelfLoop(FeatureId),
    #[error("unknown feature {0}")]
    Unknown(FeatureId),
}

/// The stored document could not be read as a feature map
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DocumentError(String);

/// Entry of the flat list view served to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    pub id: FeatureId,
    pub feature_name: String,
    pub user_summary: String,
    pub ai_summary: String,
    pub filenames: Vec<String>,
    pub neighbors: Vec<FeatureId>,
}

/// Every feature of one repository keyed by id, with the neighbor graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMap {
    features: BTreeMap<FeatureId, Feature>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    pub fn get_mut(&mut self, id: &FeatureId) -> Option<&mut Feature> {
        self.features.get_mut(id)
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.features.contains_key(id)
    }

    /// Inserts or replaces the feature stored under `feature.id`
    pub fn insert(&mut self, feature: Feature) -> Option<Feature> {
        self.features.insert(feature.id.clone(), feature)
    }

    pub fn ids(&self) -> impl Iterator<Item = &FeatureId> {
        self.features.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    /// Adds an undirected edge. Returns whether the edge is new.
    pub fn link(&mut self, a: &FeatureId, b: &FeatureId) -> Result<bool, LinkRefused> {
        if a == b {
            return Err(LinkRefused::SelfLoop(a.clone()));
        }
        for id in [a, b] {
            if !self.contains(id) {
                return Err(LinkRefused::Unknown(id.clone()));
            }
        }

        let mut added = false;
        if let Some(feature) = self.features.get_mut(a) {
            added |= feature.neighbors.insert(b.clone());
        }
        if let Some(feature) = self.features.get_mut(b) {
            added |= feature.neighbors.insert(a.clone());
        }
        Ok(added)
    }

    /// `(feature, neighbor)` pairs whose neighbor is not in this map, or is
    /// the feature itself
    pub fn dangling_neighbors(&self) -> Vec<(FeatureId, FeatureId)> {
        self.features
            .values()
            .flat_map(|f| {
                f.neighbors
                    .iter()
                    .filter(|n| **n == f.id || !self.features.contains_key(*n))
                    .map(|n| (f.id.clone(), n.clone()))
            })
            .collect()
    }

    /// Removes every dangling neighbor reference. Returns how many were removed.
    pub fn prune_dangling(&mut self) -> usize {
        let dangling = self.dangling_neighbors();
        for (id, neighbor) in &dangling {
            if let Some(feature) = self.features.get_mut(id) {
                feature.neighbors.remove(neighbor);
            }
        }
        dangling.len()
    }

    /// Adds the reverse of every one-directional edge
    pub fn make_symmetric(&mut self) {
        let edges: Vec<(FeatureId, FeatureId)> = self
            .features
            .values()
            .flat_map(|f| f.neighbors.iter().map(|n| (f.id.clone(), n.clone())))
            .collect();
        for (a, b) in edges {
            if let Some(feature) = self.features.get_mut(&b) {
                if b != a {
                    feature.neighbors.insert(a);
                }
            }
        }
    }

    /// Flat list view, in id order
    pub fn to_array_view(&self) -> Vec<FeatureSummary> {
        self.features
            .values()
            .map(|f| FeatureSummary {
                id: f.id.clone(),
                feature_name: f.name.clone(),
                user_summary: f.user_summary.clone(),
                ai_summary: f.technical_summary.clone(),
                filenames: f.file_references.clone(),
                neighbors: f.neighbors.iter().cloned().collect(),
            })
            .collect()
    }

    /// Serializes the map as the opaque string handed to the document store
    pub fn to_document(&self) -> Result<String, DocumentError> {
        serde_json::to_string(self).map_err(|e| DocumentError(e.to_string()))
    }

    /// Reads a stored document.
    ///
    /// Besides the current shape this accepts an object keyed by id using
    /// `name`/`user_description`/`technical_description`/`file_references`, and a
    /// JSON array of features (including the list view). Array entries without
    /// an id get `feature-<n>` by position. An empty document is an empty map.
    pub fn from_document(document: &str) -> Result<Self, DocumentError> {
        if document.trim().is_empty() {
            return Ok(Self::new());
        }

        let value: serde_json::Value =
            serde_json::from_str(document).map_err(|e| DocumentError(e.to_string()))?;

        let entries: Vec<(Option<String>, serde_json::Value)> = match value {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Object(object) => object
                .into_iter()
                .map(|(key, entry)| (Some(key), entry))
                .collect(),
            serde_json::Value::Array(items) => {
                items.into_iter().map(|entry| (None, entry)).collect()
            }
            other => {
                return Err(DocumentError(format!(
                    "expected an object or array, found {}",
                    json_type_name(&other)
                )))
            }
        };

        let mut map = Self::new();
        for (index, (key, entry)) in entries.into_iter().enumerate() {
            let stored: StoredFeature = serde_json::from_value(entry)
                .map_err(|e| DocumentError(format!("feature #{}: {}", index + 1, e)))?;

            let id = key
                .or(stored.id)
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("feature-{}", index + 1));

            let mut feature = Feature::new(
                FeatureId::new(id),
                stored.name.unwrap_or_default(),
                stored.user_summary.unwrap_or_default(),
                stored.technical_summary.unwrap_or_default(),
                stored.file_references.unwrap_or_default(),
            );
            feature.neighbors = stored
                .neighbors
                .unwrap_or_default()
                .into_iter()
                .map(FeatureId::new)
                .collect();
            map.insert(feature);
        }

        Ok(map)
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Lenient reader covering every stored shape
#[derive(Debug, Deserialize)]
struct StoredFeature {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "featureName")]
    name: Option<String>,
    #[serde(default, rename = "userSummary", alias = "user_description")]
    user_summary: Option<String>,
    #[serde(
        default,
        rename = "technicalSummary",
        alias = "technical_description",
        alias = "aiSummary"
    )]
    technical_summary: Option<String>,
    #[serde(
        default,
        rename = "fileReferences",
        alias = "file_references",
        alias = "filenames"
    )]
    file_references: Option<Vec<String>>,
    #[serde(default)]
    neighbors: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(id: &str, name: &str) -> Feature {
        Feature::new(
            FeatureId::new(id),
            name,
            format!("{} for users", name),
            format!("{} internals", name),
            vec![format!("src/{}.rs", id)],
        )
    }

    fn sample() -> FeatureMap {
        let mut map = FeatureMap::new();
        map.insert(feature("auth", "Login"));
        map.insert(feature("billing", "Billing"));
        map.insert(feature("search", "Search"));
        map
    }

    #[test]
    fn test_file_references_are_an_ordered_set() {
        let f = Feature::new(
            FeatureId::new("x"),
            "X",
            "",
            "",
            vec!["b.rs".into(), "a.rs".into(), "b.rs".into()],
        );
        assert_eq!(f.file_references, vec!["b.rs", "a.rs"]);
    }

    #[test]
    fn test_link_is_undirected() {
        let mut map = sample();
        let (auth, billing) = (FeatureId::new("auth"), FeatureId::new("billing"));

        assert!(map.link(&auth, &billing).unwrap());
        assert!(!map.link(&billing, &auth).unwrap());
        assert!(map.get(&auth).unwrap().neighbors.contains(&billing));
        assert!(map.get(&billing).unwrap().neighbors.contains(&auth));
    }

    #[test]
    fn test_link_refuses_self_and_unknown() {
        let mut map = sample();
        let auth = FeatureId::new("auth");
        assert_eq!(
            map.link(&auth, &auth),
            Err(LinkRefused::SelfLoop(auth.clone()))
        );
        assert_eq!(
            map.link(&auth, &FeatureId::new("ghost")),
            Err(LinkRefused::Unknown(FeatureId::new("ghost")))
        );
        assert!(map.get(&auth).unwrap().neighbors.is_empty());
    }

    #[test]
    fn test_prune_dangling() {
        let mut map = sample();
        let auth = FeatureId::new("auth");
        {
            let f = map.get_mut(&auth).unwrap();
            f.neighbors.insert(FeatureId::new("ghost"));
            f.neighbors.insert(auth.clone());
            f.neighbors.insert(FeatureId::new("search"));
        }

        assert_eq!(map.dangling_neighbors().len(), 2);
        assert_eq!(map.prune_dangling(), 2);
        assert!(map.dangling_neighbors().is_empty());
        assert_eq!(
            map.get(&auth).unwrap().neighbors,
            BTreeSet::from([FeatureId::new("search")])
        );
    }

    #[test]
    fn test_make_symmetric() {
        let mut map = sample();
        map.get_mut(&FeatureId::new("auth"))
            .unwrap()
            .neighbors
            .insert(FeatureId::new("search"));
        map.make_symmetric();
        assert!(map
            .get(&FeatureId::new("search"))
            .unwrap()
            .neighbors
            .contains(&FeatureId::new("auth")));
    }

    #[test]
    fn test_document_round_trip_shape() {
        let mut map = sample();
        map.link(&FeatureId::new("auth"), &FeatureId::new("search"))
            .unwrap();

        let document = map.to_document().unwrap();
        let value: serde_json::Value = serde_json::from_str(&document).unwrap();
        assert_eq!(value["auth"]["userSummary"], "Login for users");
        assert_eq!(value["auth"]["neighbors"], json!(["search"]));

        assert_eq!(FeatureMap::from_document(&document).unwrap(), map);
    }

    #[test]
    fn test_from_legacy_object_document() {
        let document = json!({
            "f1": {
                "name": "Login",
                "user_description": "Sign in",
                "technical_description": "OAuth",
                "file_references": ["src/auth.ts"],
                "neighbors": ["f2"]
            },
            "f2": { "name": "Profile", "user_description": null }
        })
        .to_string();

        let map = FeatureMap::from_document(&document).unwrap();
        let f1 = map.get(&FeatureId::new("f1")).unwrap();
        assert_eq!(f1.technical_summary, "OAuth");
        assert_eq!(f1.file_references, vec!["src/auth.ts"]);
        let f2 = map.get(&FeatureId::new("f2")).unwrap();
        assert_eq!(f2.user_summary, "");
        assert!(f2.file_references.is_empty());
    }

    #[test]
    fn test_from_array_view_document() {
        let document = json!([
            { "featureName": "Login", "userSummary": "Sign in", "aiSummary": "OAuth", "filenames": ["a.ts"] },
            { "id": "search", "featureName": "Search" }
        ])
        .to_string();

        let map = FeatureMap::from_document(&document).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&FeatureId::new("feature-1")).unwrap().name, "Login");
        assert_eq!(
            map.get(&FeatureId::new("feature-1")).unwrap().technical_summary,
            "OAuth"
        );
        assert!(map.contains(&FeatureId::new("search")));
    }

    #[test]
    fn test_from_empty_and_invalid_documents() {
        assert!(FeatureMap::from_document("").unwrap().is_empty());
        assert!(FeatureMap::from_document("null").unwrap().is_empty());
        assert!(FeatureMap::from_document("42").is_err());
        assert!(FeatureMap::from_document("{not json").is_err());
    }

    #[test]
    fn test_array_view() {
        let mut map = sample();
        map.link(&FeatureId::new("auth"), &FeatureId::new("billing"))
            .unwrap();
        let view = map.to_array_view();
        assert_eq!(view.len(), 3);
        assert_eq!(view[0].feature_name, "Login");
        assert_eq!(view[0].ai_summary, "Login internals");
        assert_eq!(view[0].neighbors, vec![FeatureId::new("billing")]);

        let json = serde_json::to_value(&view[0]).unwrap();
        assert!(json.get("featureName").is_some());
        assert!(json.get("aiSummary").is_some());
    }
}
