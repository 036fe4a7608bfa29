//! Message number to UID map for the selected folder.

use std::collections::BTreeMap;

/// Cached message-number → UID map.
///
/// Message numbers are 1-based and assigned in ascending UID order. The map
/// is only valid for the folder that was selected when it was filled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidCache {
    enabled: bool,
    map: BTreeMap<u32, u32>,
}

impl UidCache {
    /// Creates an empty cache.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            map: BTreeMap::new(),
        }
    }

    /// Whether entries are reused between calls.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The full map.
    #[must_use]
    pub const fn map(&self) -> &BTreeMap<u32, u32> {
        &self.map
    }

    /// Looks up the UID of a message number.
    #[must_use]
    pub fn get(&self, msgno: u32) -> Option<u32> {
        self.map.get(&msgno).copied()
    }

    /// Looks up the message number of a UID.
    #[must_use]
    pub fn message_number(&self, uid: u32) -> Option<u32> {
        self.map
            .iter()
            .find_map(|(&msgno, &candidate)| (candidate == uid).then_some(msgno))
    }

    /// Rebuilds the map from a UID list, numbering from 1; `None` clears it.
    pub fn set(&mut self, uids: Option<Vec<u32>>) {
        self.map.clear();
        if let Some(mut uids) = uids {
            uids.sort_unstable();
            uids.dedup();
            self.map = (1..).zip(uids).collect();
        }
    }

    /// Empties the map.
    pub fn clear(&mut self) {
        self.set(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_numbers_from_one_in_uid_order() {
        let mut cache = UidCache::new(true);
        cache.set(Some(vec![30, 10, 20]));

        assert_eq!(cache.get(1), Some(10));
        assert_eq!(cache.get(3), Some(30));
        assert_eq!(cache.get(4), None);
        assert_eq!(cache.message_number(20), Some(2));
    }

    #[test]
    fn test_set_none_clears() {
        let mut cache = UidCache::new(true);
        cache.set(Some(vec![1]));
        cache.set(None);
        assert!(cache.is_empty());

        cache.set(Some(vec![5]));
        cache.clear();
        assert!(cache.map().is_empty());
    }
}
