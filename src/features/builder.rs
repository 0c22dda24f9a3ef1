//! Folds extraction and consolidation tool invocations into a feature map

use super::identity::IdentityStrategy;
use super::model::{Feature, FeatureId, FeatureMap, LinkRefused};
use crate::tools::{AddFeatureArgs, LinkFeaturesArgs, ToolInvocation, UpdateFeatureArgs};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Non-fatal problem found while applying invocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildWarning {
    /// An update or link named a feature that does not exist
    UnknownFeature { tool: String, feature_id: FeatureId },
    /// A link named a neighbor that does not exist
    UnknownNeighbor {
        feature_id: FeatureId,
        neighbor_id: FeatureId,
    },
    /// The invocation does not belong to this stage
    UnexpectedTool { tool: String },
    /// The model answered in prose instead of calling tools
    NoToolCalls { stage: String },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::UnknownFeature { tool, feature_id } => {
                write!(f, "{} references unknown feature '{}'", tool, feature_id)
            }
            BuildWarning::UnknownNeighbor {
                feature_id,
                neighbor_id,
            } => write!(
                f,
                "feature '{}' linked to unknown feature '{}'",
                feature_id, neighbor_id
            ),
            BuildWarning::UnexpectedTool { tool } => {
                write!(f, "tool '{}' is not valid here and was ignored", tool)
            }
            BuildWarning::NoToolCalls { stage } => {
                write!(f, "{} returned text instead of tool calls", stage)
            }
        }
    }
}

/// What a single invocation did to the map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Added(FeatureId),
    /// `add_feature` with an id that already existed
    Merged(FeatureId),
    Updated(FeatureId),
    Skipped(BuildWarning),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub added: usize,
    pub updated: usize,
    pub warnings: Vec<BuildWarning>,
}

/// Accumulates extraction-stage invocations into a [`FeatureMap`].
///
/// Invocations apply in the order given; for one id the last write wins.
pub struct FeatureGraphBuilder {
    map: FeatureMap,
    identity: Arc<dyn IdentityStrategy>,
}

impl FeatureGraphBuilder {
    pub fn new(identity: Arc<dyn IdentityStrategy>) -> Self {
        Self::from_map(FeatureMap::new(), identity)
    }

    /// Continues from an existing map
    pub fn from_map(map: FeatureMap, identity: Arc<dyn IdentityStrategy>) -> Self {
        Self { map, identity }
    }

    pub fn map(&self) -> &FeatureMap {
        &self.map
    }

    pub fn apply(&mut self, invocation: &ToolInvocation) -> ApplyOutcome {
        match invocation {
            ToolInvocation::AddFeature(args) => self.add(args),
            ToolInvocation::UpdateFeature(args) => self.update(args),
            other => {
                let warning = BuildWarning::UnexpectedTool {
                    tool: other.name().to_string(),
                };
                warn!(tool = other.name(), "Ignoring tool call outside feature extraction");
                ApplyOutcome::Skipped(warning)
            }
        }
    }

    pub fn apply_all<'a>(
        &mut self,
        invocations: impl IntoIterator<Item = &'a ToolInvocation>,
    ) -> BuildReport {
        let mut report = BuildReport::default();
        for invocation in invocations {
            match self.apply(invocation) {
                ApplyOutcome::Added(_) => report.added += 1,
                ApplyOutcome::Merged(_) | ApplyOutcome::Updated(_) => report.updated += 1,
                ApplyOutcome::Skipped(warning) => report.warnings.push(warning),
            }
        }
        report
    }

    pub fn finish(self) -> FeatureMap {
        self.map
    }

    fn add(&mut self, args: &AddFeatureArgs) -> ApplyOutcome {
        let supplied = args
            .feature_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(FeatureId::from);

        if let Some(existing) = supplied.as_ref().and_then(|id| self.map.get_mut(id)) {
            existing.name = args.name.clone();
            existing.user_summary = args.user_description.clone();
            existing.technical_summary = args.technical_description.clone();
            existing.set_file_references(args.file_references.clone());
            debug!(feature_id = %existing.id, "Merged repeated add_feature");
            return ApplyOutcome::Merged(existing.id.clone());
        }

        let id = supplied.unwrap_or_else(|| self.identity.assign(&args.name, &self.map));
        self.map.insert(Feature::new(
            id.clone(),
            args.name.clone(),
            args.user_description.clone(),
            args.technical_description.clone(),
            args.file_references.clone(),
        ));
        debug!(feature_id = %id, name = %args.name, "Added feature");
        ApplyOutcome::Added(id)
    }

    fn update(&mut self, args: &UpdateFeatureArgs) -> ApplyOutcome {
        let id = FeatureId::new(args.feature_id.trim());
        let Some(feature) = self.map.get_mut(&id) else {
            warn!(feature_id = %id, "update_feature references an unknown feature");
            return ApplyOutcome::Skipped(BuildWarning::UnknownFeature {
                tool: "update_feature".to_string(),
                feature_id: id,
            });
        };

        if let Some(name) = &args.name {
            feature.name = name.clone();
        }
        if let Some(summary) = &args.user_description {
            feature.user_summary = summary.clone();
        }
        if let Some(summary) = &args.technical_description {
            feature.technical_summary = summary.clone();
        }
        if let Some(paths) = &args.file_references {
            feature.set_file_references(paths.clone());
        }
        debug!(feature_id = %id, "Updated feature");
        ApplyOutcome::Updated(id)
    }
}

/// Applies consolidation-stage links to `map`.
///
/// Only neighbor sets change. Self-links are ignored, links to unknown ids
/// are reported, and any dangling neighbor left in the map is pruned.
pub fn apply_consolidation(
    mut map: FeatureMap,
    invocations: &[ToolInvocation],
) -> (FeatureMap, Vec<BuildWarning>) {
    let mut warnings = Vec::new();

    for invocation in invocations {
        match invocation {
            ToolInvocation::LinkFeatures(args) => link(&mut map, args, &mut warnings),
            other => {
                warn!(tool = other.name(), "Ignoring tool call outside consolidation");
                warnings.push(BuildWarning::UnexpectedTool {
                    tool: other.name().to_string(),
                });
            }
        }
    }

    map.make_symmetric();
    let pruned = map.prune_dangling();
    if pruned > 0 {
        debug!(pruned, "Pruned dangling neighbor references");
    }

    (map, warnings)
}

fn link(map: &mut FeatureMap, args: &LinkFeaturesArgs, warnings: &mut Vec<BuildWarning>) {
    let id = FeatureId::new(args.feature_id.trim());
    if !map.contains(&id) {
        warn!(feature_id = %id, "link_features references an unknown feature");
        warnings.push(BuildWarning::UnknownFeature {
            tool: "link_features".to_string(),
            feature_id: id,
        });
        return;
    }

    for neighbor in &args.neighbor_ids {
        let neighbor = FeatureId::new(neighbor.trim());
        match map.link(&id, &neighbor) {
            Ok(_) => {}
            Err(LinkRefused::SelfLoop(_)) => {
                debug!(feature_id = %id, "Ignoring self-link");
            }
            Err(LinkRefused::Unknown(_)) => {
                warn!(feature_id = %id, neighbor_id = %neighbor, "Link to unknown feature");
                warnings.push(BuildWarning::UnknownNeighbor {
                    feature_id: id.clone(),
                    neighbor_id: neighbor,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::identity::{SequentialIdentity, UuidIdentity};
    use crate::tools::FileArgs;

    fn add(id: Option<&str>, name: &str, files: &[&str]) -> ToolInvocation {
        ToolInvocation::AddFeature(AddFeatureArgs {
            feature_id: id.map(str::to_string),
            name: name.to_string(),
            user_description: format!("{} for users", name),
            technical_description: format!("{} internals", name),
            file_references: files.iter().map(|f| f.to_string()).collect(),
        })
    }

    fn rename(id: &str, name: &str) -> ToolInvocation {
        ToolInvocation::UpdateFeature(UpdateFeatureArgs {
            feature_id: id.to_string(),
            name: Some(name.to_string()),
            user_description: None,
            technical_description: None,
            file_references: None,
        })
    }

    fn link_call(id: &str, neighbors: &[&str]) -> ToolInvocation {
        ToolInvocation::LinkFeatures(LinkFeaturesArgs {
            feature_id: id.to_string(),
            neighbor_ids: neighbors.iter().map(|n| n.to_string()).collect(),
        })
    }

    fn builder() -> FeatureGraphBuilder {
        FeatureGraphBuilder::new(Arc::new(SequentialIdentity::default()))
    }

    #[test]
    fn test_update_after_add_merges_fields() {
        let mut builder = FeatureGraphBuilder::new(Arc::new(UuidIdentity));
        let ApplyOutcome::Added(id) = builder.apply(&add(None, "Login", &["src/auth.rs"])) else {
            panic!("expected an add");
        };

        let outcome = builder.apply(&rename(id.as_str(), "Foo"));
        assert_eq!(outcome, ApplyOutcome::Updated(id.clone()));

        let map = builder.finish();
        assert_eq!(map.len(), 1);
        let feature = map.get(&id).unwrap();
        assert_eq!(feature.name, "Foo");
        assert_eq!(feature.user_summary, "Login for users");
        assert_eq!(feature.technical_summary, "Login internals");
        assert_eq!(feature.file_references, vec!["src/auth.rs"]);
    }

    #[test]
    fn test_update_unknown_is_warning_not_entry() {
        let mut builder = builder();
        let report = builder.apply_all(&[add(None, "Login", &[]), rename("nope", "Foo")]);

        assert_eq!(report.added, 1);
        assert_eq!(
            report.warnings,
            vec![BuildWarning::UnknownFeature {
                tool: "update_feature".to_string(),
                feature_id: FeatureId::new("nope"),
            }]
        );
        let map = builder.finish();
        assert_eq!(map.len(), 1);
        assert!(!map.contains(&FeatureId::new("nope")));
    }

    #[test]
    fn test_adds_with_distinct_ids_commute() {
        let a = add(Some("a"), "Alpha", &["a.rs"]);
        let b = add(Some("b"), "Beta", &["b.rs"]);
        let c = add(Some("c"), "Gamma", &["c.rs"]);

        let mut forward = builder();
        forward.apply_all(&[a.clone(), b.clone(), c.clone()]);
        let mut backward = builder();
        backward.apply_all(&[c, a, b]);

        assert_eq!(forward.finish(), backward.finish());
    }

    #[test]
    fn test_updates_on_same_id_last_wins() {
        let base = add(Some("a"), "Alpha", &[]);
        let first = rename("a", "First");
        let second = rename("a", "Second");

        let mut one = builder();
        one.apply_all(&[base.clone(), first.clone(), second.clone()]);
        let mut two = builder();
        two.apply_all(&[base, second, first]);

        let id = FeatureId::new("a");
        assert_eq!(one.map().get(&id).unwrap().name, "Second");
        assert_eq!(two.map().get(&id).unwrap().name, "First");
    }

    #[test]
    fn test_repeated_add_with_id_merges() {
        let mut builder = builder();
        let report = builder.apply_all(&[
            add(Some("a"), "Alpha", &["a.rs"]),
            add(Some("a"), "Alpha v2", &["a2.rs"]),
        ]);
        assert_eq!(report.added, 1);
        assert_eq!(report.updated, 1);

        let map = builder.finish();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&FeatureId::new("a")).unwrap().name, "Alpha v2");
    }

    #[test]
    fn test_assigned_ids_never_collide() {
        let mut builder = builder();
        builder.apply_all(&[
            add(Some("feature-2"), "Taken", &[]),
            add(None, "One", &[]),
            add(None, "Two", &[]),
        ]);
        assert_eq!(builder.finish().len(), 3);
    }

    #[test]
    fn test_file_invocations_are_unexpected_in_extraction() {
        let mut builder = builder();
        let outcome = builder.apply(&ToolInvocation::AddFile(FileArgs {
            filename: "a.rs".to_string(),
            content: String::new(),
        }));
        assert!(matches!(
            outcome,
            ApplyOutcome::Skipped(BuildWarning::UnexpectedTool { .. })
        ));
        assert!(builder.map().is_empty());
    }

    #[test]
    fn test_consolidation_only_touches_neighbors() {
        let mut builder = builder();
        builder.apply_all(&[
            add(Some("a"), "Alpha", &["a.rs"]),
            add(Some("b"), "Beta", &["b.rs"]),
            add(Some("c"), "Gamma", &["c.rs"]),
        ]);
        let before = builder.finish();

        let (after, warnings) = apply_consolidation(
            before.clone(),
            &[
                link_call("a", &["b", "a", "ghost"]),
                link_call("missing", &["c"]),
                add(Some("a"), "Hijacked", &[]),
            ],
        );

        assert_eq!(warnings.len(), 3);
        assert!(warnings.contains(&BuildWarning::UnknownNeighbor {
            feature_id: FeatureId::new("a"),
            neighbor_id: FeatureId::new("ghost"),
        }));
        assert!(warnings.contains(&BuildWarning::UnexpectedTool {
            tool: "add_feature".to_string()
        }));

        for feature in before.iter() {
            let changed = after.get(&feature.id).unwrap();
            assert_eq!(changed.name, feature.name);
            assert_eq!(changed.user_summary, feature.user_summary);
            assert_eq!(changed.technical_summary, feature.technical_summary);
            assert_eq!(changed.file_references, feature.file_references);
        }

        let a = after.get(&FeatureId::new("a")).unwrap();
        assert_eq!(a.neighbors.len(), 1);
        assert!(after
            .get(&FeatureId::new("b"))
            .unwrap()
            .neighbors
            .contains(&FeatureId::new("a")));
        assert!(after.dangling_neighbors().is_empty());
    }

    #[test]
    fn test_consolidation_prunes_stale_neighbors() {
        let mut map = FeatureMap::new();
        let mut feature = Feature::new(FeatureId::new("a"), "A", "", "", vec![]);
        feature.neighbors.insert(FeatureId::new("deleted"));
        map.insert(feature);

        let (after, warnings) = apply_consolidation(map, &[]);
        assert!(warnings.is_empty());
        assert!(after.get(&FeatureId::new("a")).unwrap().neighbors.is_empty());
    }
}
