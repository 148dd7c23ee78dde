//! Patch-type registry.
//!
//! Maps patch-type identifiers (as they appear in bank files) to builder
//! functions. The registry is an explicit value handed to whatever bank
//! loader consumes it — its lifetime is tied to that loader, not the
//! process, so two loaders can carry different custom type sets without
//! interfering.

use crate::LoadError;
use crate::descriptor::DescriptorList;
use crate::patch::{Fm2Patch, Patch, Sf2Patch, SfzPatch, SinglePatch};
use crate::sample::SampleStore;

/// Builds a patch from a name and its instrument descriptors.
pub type PatchBuilder = fn(&str, &DescriptorList, &SampleStore) -> Result<Patch, LoadError>;

/// Identifier → builder table for leaf patch types.
#[derive(Clone)]
pub struct PatchRegistry {
    builders: Vec<(String, PatchBuilder)>,
}

impl Default for PatchRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for PatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchRegistry")
            .field(
                "types",
                &self.builders.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PatchRegistry {
    /// A registry with the built-in patch types registered:
    /// `single`, `fm2`, `sf2`, `sfz`.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            builders: Vec::new(),
        };
        registry.register("single", |name, descriptors, samples| {
            SinglePatch::load(name, descriptors, samples).map(Patch::Single)
        });
        registry.register("fm2", |name, descriptors, samples| {
            Fm2Patch::load(name, descriptors, samples).map(Patch::Fm2)
        });
        registry.register("sf2", |name, descriptors, samples| {
            Sf2Patch::load(name, descriptors, samples).map(Patch::Sf2)
        });
        registry.register("sfz", |name, descriptors, samples| {
            SfzPatch::load(name, descriptors, samples).map(Patch::Sfz)
        });
        registry
    }

    /// An empty registry (no built-ins).
    pub fn empty() -> Self {
        Self {
            builders: Vec::new(),
        }
    }

    /// Register a patch type, replacing any existing builder for the id.
    pub fn register(&mut self, id: impl Into<String>, builder: PatchBuilder) {
        let id = id.into();
        if let Some(existing) = self.builders.iter_mut().find(|(k, _)| *k == id) {
            existing.1 = builder;
        } else {
            self.builders.push((id, builder));
        }
    }

    /// Registered type identifiers.
    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.builders.iter().map(|(id, _)| id.as_str())
    }

    /// Build a patch of the given registered type.
    pub fn build(
        &self,
        kind: &str,
        name: &str,
        descriptors: &DescriptorList,
        samples: &SampleStore,
    ) -> Result<Patch, LoadError> {
        let builder = self
            .builders
            .iter()
            .find(|(id, _)| id == kind)
            .map(|(_, builder)| builder)
            .ok_or_else(|| LoadError::UnknownPatchType(kind.to_string()))?;
        builder(name, descriptors, samples)
    }
}
