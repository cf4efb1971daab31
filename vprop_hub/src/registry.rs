//! Property registry.
//!
//! Built once at hub init from the transport's descriptor list. Immutable
//! after construction; lookups clone an `Arc` and never lock.

use std::collections::HashMap;
use std::sync::Arc;
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::types::{ChangeMode, PropertyDescriptor, PropertyId};

/// Descriptor set indexed by property id.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    descriptors: HashMap<PropertyId, Arc<PropertyDescriptor>>,
}

impl PropertyRegistry {
    /// Registry with no properties (before init and after release).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index `descriptors` by id.
    ///
    /// # Errors
    /// - `VhalError::DuplicateProperty` if an id is reported twice
    /// - `VhalError::InvalidDescriptor` if sample rate bounds are not finite or not ordered
    pub fn initialize(descriptors: Vec<PropertyDescriptor>) -> Result<Self, VhalError> {
        let mut map = HashMap::with_capacity(descriptors.len());
        for desc in descriptors {
            let id = desc.id;
            desc.check_sample_rates()
                .map_err(|reason| VhalError::InvalidDescriptor { prop_id: id, reason })?;
            if map.insert(id, Arc::new(desc)).is_some() {
                return Err(VhalError::DuplicateProperty(id));
            }
        }
        Ok(Self { descriptors: map })
    }

    pub fn lookup(&self, prop_id: PropertyId) -> Option<Arc<PropertyDescriptor>> {
        self.descriptors.get(&prop_id).cloned()
    }

    /// Readable and not static.
    pub fn is_subscribable(desc: &PropertyDescriptor) -> bool {
        desc.access.is_readable() && desc.change_mode != ChangeMode::Static
    }

    /// All descriptors ordered by id.
    pub fn descriptors(&self) -> Vec<Arc<PropertyDescriptor>> {
        let mut all: Vec<_> = self.descriptors.values().cloned().collect();
        all.sort_by_key(|d| d.id);
        all
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vprop_common::vhal::types::{PropertyAccess, ValueShape};

    fn desc(id: PropertyId, access: PropertyAccess, mode: ChangeMode) -> PropertyDescriptor {
        PropertyDescriptor::new(id, access, mode, ValueShape::Int32)
    }

    #[test]
    fn lookup_known_and_unknown() {
        let registry = PropertyRegistry::initialize(vec![
            desc(20, PropertyAccess::Read, ChangeMode::OnChange),
            desc(10, PropertyAccess::Read, ChangeMode::OnChange),
        ])
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup(10).map(|d| d.id), Some(10));
        assert!(registry.lookup(99).is_none());
        let ids: Vec<_> = registry.descriptors().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![10, 20]);
    }

    #[test]
    fn duplicate_id_rejected() {
        let err = PropertyRegistry::initialize(vec![
            desc(10, PropertyAccess::Read, ChangeMode::OnChange),
            desc(10, PropertyAccess::Write, ChangeMode::OnSet),
        ])
        .unwrap_err();
        assert_eq!(err, VhalError::DuplicateProperty(10));
    }

    #[test]
    fn unusable_sample_rates_rejected() {
        let nan = desc(40, PropertyAccess::Read, ChangeMode::Continuous)
            .with_sample_rates(f32::NAN, 10.0);
        assert!(matches!(
            PropertyRegistry::initialize(vec![nan]),
            Err(VhalError::InvalidDescriptor { prop_id: 40, .. })
        ));

        let inverted = desc(41, PropertyAccess::Read, ChangeMode::Continuous)
            .with_sample_rates(10.0, 1.0);
        assert!(matches!(
            PropertyRegistry::initialize(vec![inverted]),
            Err(VhalError::InvalidDescriptor { prop_id: 41, .. })
        ));
    }

    #[test]
    fn subscribable_predicate() {
        assert!(PropertyRegistry::is_subscribable(&desc(
            1,
            PropertyAccess::Read,
            ChangeMode::Continuous
        )));
        assert!(PropertyRegistry::is_subscribable(&desc(
            1,
            PropertyAccess::ReadWrite,
            ChangeMode::OnSet
        )));
        assert!(!PropertyRegistry::is_subscribable(&desc(
            1,
            PropertyAccess::Read,
            ChangeMode::Static
        )));
        assert!(!PropertyRegistry::is_subscribable(&desc(
            1,
            PropertyAccess::Write,
            ChangeMode::OnChange
        )));
    }

    #[test]
    fn empty_registry() {
        let registry = PropertyRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.descriptors().is_empty());
    }
}
