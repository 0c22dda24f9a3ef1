//! Identity assignment for features added without an explicit id

use super::model::{FeatureId, FeatureMap};
use uuid::Uuid;

/// Chooses the id of a newly added feature.
///
/// Must return an id not already present in `existing`.
pub trait IdentityStrategy: Send + Sync {
    fn assign(&self, name: &str, existing: &FeatureMap) -> FeatureId;

    fn name(&self) -> &str;
}

/// Random UUID v4 ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdentity;

impl IdentityStrategy for UuidIdentity {
    fn assign(&self, _name: &str, existing: &FeatureMap) -> FeatureId {
        loop {
            let id = FeatureId::new(Uuid::new_v4().to_string());
            if !existing.contains(&id) {
                return id;
            }
        }
    }

    fn name(&self) -> &str {
        "uuid"
    }
}

/// `feature-1`, `feature-2`, ... skipping numbers already taken
#[derive(Debug, Clone)]
pub struct SequentialIdentity {
    prefix: String,
}

impl SequentialIdentity {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for SequentialIdentity {
    fn default() -> Self {
        Self::new("feature")
    }
}

impl IdentityStrategy for SequentialIdentity {
    fn assign(&self, _name: &str, existing: &FeatureMap) -> FeatureId {
        let mut n = existing.len() + 1;
        loop {
            let id = FeatureId::new(format!("{}-{}", self.prefix, n));
            if !existing.contains(&id) {
                return id;
            }
            n += 1;
        }
    }

    fn name(&self) -> &str {
        "sequential"
    }
}

/// Lower-case slug of the feature name, suffixed `-2`, `-3`, ... on collision
#[derive(Debug, Clone, Copy, Default)]
pub struct SlugIdentity;

pub(crate) fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "feature".to_string()
    } else {
        slug
    }
}

impl IdentityStrategy for SlugIdentity {
    fn assign(&self, name: &str, existing: &FeatureMap) -> FeatureId {
        let base = slugify(name);
        let first = FeatureId::new(base.clone());
        if !existing.contains(&first) {
            return first;
        }
        let mut n = 2;
        loop {
            let id = FeatureId::new(format!("{}-{}", base, n));
            if !existing.contains(&id) {
                return id;
            }
            n += 1;
        }
    }

    fn name(&self) -> &str {
        "slug"
    }
}

/// Looks up a strategy by its configured name
pub fn strategy_by_name(name: &str) -> Option<Box<dyn IdentityStrategy>> {
    match name.to_lowercase().as_str() {
        "uuid" => Some(Box::new(UuidIdentity)),
        "sequential" => Some(Box::new(SequentialIdentity::default())),
        "slug" => Some(Box::new(SlugIdentity)),
        _ => None,
    }
}
