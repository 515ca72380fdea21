//! Lazily faulted property map shared by cached nodes, relationships and
//! the graph entity. `None` means the chain has not been paged in yet;
//! committed deltas are folded in only while the map is resident.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::model::{KeyId, PropertyValue};
use crate::store::PropertyEntry;

#[derive(Debug, Default)]
pub struct PropertySlot {
    map: RwLock<Option<HashMap<KeyId, PropertyValue>>>,
}

impl PropertySlot {
    /// A slot that is already fully loaded (new entities have no chain).
    pub fn loaded_empty() -> Self {
        Self {
            map: RwLock::new(Some(HashMap::new())),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.map.read().is_some()
    }

    /// Installs the faulted chain unless a racing loader won already.
    pub fn install(&self, entries: Vec<PropertyEntry>) {
        let mut guard = self.map.write();
        if guard.is_none() {
            *guard = Some(
                entries
                    .into_iter()
                    .map(|entry| (entry.key, entry.value))
                    .collect(),
            );
        }
    }

    /// `None`: not loaded. `Some(None)`: loaded, key absent.
    pub fn get(&self, key: KeyId) -> Option<Option<PropertyValue>> {
        self.map.read().as_ref().map(|map| map.get(&key).cloned())
    }

    /// Folds a committed delta into the resident map. A slot that was
    /// never faulted stays unloaded; the store already has the truth.
    pub fn apply_delta(
        &self,
        adds: impl IntoIterator<Item = (KeyId, PropertyValue)>,
        removes: impl IntoIterator<Item = KeyId>,
    ) {
        let mut guard = self.map.write();
        if let Some(map) = guard.as_mut() {
            for (key, value) in adds {
                map.insert(key, value);
            }
            for key in removes {
                map.remove(&key);
            }
        }
    }

    pub fn reset(&self) {
        *self.map.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: KeyId, value: i64) -> PropertyEntry {
        PropertyEntry {
            key,
            value: PropertyValue::Int(value),
        }
    }

    #[test]
    fn unloaded_slot_reports_nothing() {
        let slot = PropertySlot::default();
        assert!(!slot.is_loaded());
        assert_eq!(slot.get(1), None);
        slot.apply_delta([(1, PropertyValue::Int(5))], []);
        assert!(!slot.is_loaded(), "delta must not materialize the chain");
    }

    #[test]
    fn install_is_first_writer_wins() {
        let slot = PropertySlot::default();
        slot.install(vec![entry(1, 10)]);
        slot.install(vec![entry(1, 99)]);
        assert_eq!(slot.get(1), Some(Some(PropertyValue::Int(10))));
        assert_eq!(slot.get(2), Some(None));
    }

    #[test]
    fn delta_folds_into_resident_map() {
        let slot = PropertySlot::loaded_empty();
        slot.apply_delta([(1, PropertyValue::Int(1)), (2, PropertyValue::Int(2))], []);
        slot.apply_delta([], [1]);
        assert_eq!(slot.get(1), Some(None));
        assert_eq!(slot.get(2), Some(Some(PropertyValue::Int(2))));
    }
}
