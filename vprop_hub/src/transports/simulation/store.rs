//! Value store of the simulated endpoint.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use vprop_common::vhal::config::PropertyTable;
use vprop_common::vhal::transport::StatusCode;
use vprop_common::vhal::types::{
    AreaId, GLOBAL_AREA, PropertyDescriptor, PropertyId, PropertyValue, Value,
};

/// Descriptors and current values of every simulated property.
#[derive(Debug, Default)]
pub struct ValueStore {
    descriptors: BTreeMap<PropertyId, Arc<PropertyDescriptor>>,
    values: HashMap<(PropertyId, AreaId), PropertyValue>,
    /// Descriptors in table order, repeats included.
    listed: Vec<PropertyDescriptor>,
}

impl ValueStore {
    /// Build from a property table. Areas without an initial value start at
    /// the default of their shape.
    pub fn from_table(table: &PropertyTable) -> Self {
        let mut store = Self::default();
        for entry in &table.properties {
            let desc = Arc::new(entry.descriptor.clone());
            store.listed.push(entry.descriptor.clone());
            for area_id in areas_of(&desc) {
                let initial = entry
                    .initial
                    .iter()
                    .find(|i| i.area_id == area_id)
                    .map(|i| i.value.clone())
                    .unwrap_or_else(|| Value::default_for(desc.shape));
                store
                    .values
                    .insert((desc.id, area_id), PropertyValue::new(desc.id, area_id, 0, initial));
            }
            store.descriptors.insert(desc.id, desc);
        }
        store
    }

    /// Descriptors as listed in the table.
    pub fn listed(&self) -> &[PropertyDescriptor] {
        &self.listed
    }

    pub fn descriptor(&self, prop_id: PropertyId) -> Option<&Arc<PropertyDescriptor>> {
        self.descriptors.get(&prop_id)
    }

    /// Validate an address: the property exists and has the area.
    pub fn check_address(
        &self,
        prop_id: PropertyId,
        area_id: AreaId,
    ) -> Result<&Arc<PropertyDescriptor>, StatusCode> {
        let desc = self.descriptors.get(&prop_id).ok_or(StatusCode::InvalidArg)?;
        if desc.has_area(area_id) {
            Ok(desc)
        } else {
            Err(StatusCode::InvalidArg)
        }
    }

    pub fn get(&self, prop_id: PropertyId, area_id: AreaId) -> Option<&PropertyValue> {
        self.values.get(&(prop_id, area_id))
    }

    /// Store a value. Returns true when it differs from the previous one.
    pub fn put(&mut self, value: PropertyValue) -> bool {
        let key = (value.prop_id, value.area_id);
        let changed = self.values.get(&key).is_none_or(|old| old.value != value.value);
        self.values.insert(key, value);
        changed
    }

    /// Current values of every area of a property.
    pub fn values_of(&self, prop_id: PropertyId) -> Vec<PropertyValue> {
        let Some(desc) = self.descriptors.get(&prop_id) else {
            return Vec::new();
        };
        areas_of(desc)
            .into_iter()
            .filter_map(|area| self.values.get(&(prop_id, area)).cloned())
            .collect()
    }
}

fn areas_of(desc: &PropertyDescriptor) -> Vec<AreaId> {
    if desc.is_global() {
        vec![GLOBAL_AREA]
    } else {
        desc.area_configs.iter().map(|a| a.area_id).collect()
    }
}
