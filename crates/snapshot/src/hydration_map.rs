use core_types::InstanceId;
use std::collections::HashMap;

/// Background id → main id, recorded during first-screen hydration.
///
/// Events and patches captured before hydration carry background ids; they
/// are resolved through this table before use.
#[derive(Clone, Debug, Default)]
pub struct HydrationMap {
    map: HashMap<InstanceId, InstanceId>,
}

impl HydrationMap {
    pub fn record(&mut self, background: InstanceId, main: InstanceId) {
        self.map.insert(background, main);
    }

    pub fn get(&self, background: InstanceId) -> Option<InstanceId> {
        self.map.get(&background).copied()
    }

    /// Maps a captured id, passing through ids that were never remapped.
    pub fn resolve(&self, id: InstanceId) -> InstanceId {
        self.get(id).unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_passes_unknown_ids_through() {
        let mut map = HydrationMap::default();
        map.record(InstanceId(3), InstanceId(-7));
        assert_eq!(map.resolve(InstanceId(3)), InstanceId(-7));
        assert_eq!(map.resolve(InstanceId(4)), InstanceId(4));
        assert_eq!(map.len(), 1);
    }
}
