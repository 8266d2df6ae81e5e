//! Singleton global-portal coordination (spec §3, §4.5).

use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalPortalEntry {
    pub map_id: i32,
    pub portal_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalPortalInfo {
    pub metadata_id: i32,
    pub entries: Vec<GlobalPortalEntry>,
}

/// At most one of these is active at a time. `room_ids` maps an entry
/// index to the room id allocated for it the first time anyone joined
/// that entry — `DashMap::entry` gives the idempotence per index spec §8
/// property 7 requires without a separate lock.
pub struct GlobalPortalManager {
    portal: GlobalPortalInfo,
    channel: i16,
    room_ids: DashMap<usize, u64>,
}

impl GlobalPortalManager {
    pub fn new(portal: GlobalPortalInfo, channel: i16) -> Self {
        Self {
            portal,
            channel,
            room_ids: DashMap::new(),
        }
    }

    pub fn info(&self) -> &GlobalPortalInfo {
        &self.portal
    }

    pub fn channel(&self) -> i16 {
        self.channel
    }

    pub fn entry(&self, index: usize) -> Option<&GlobalPortalEntry> {
        self.portal.entries.get(index)
    }

    /// Joins entry `index`, allocating its room id via `create_room` on
    /// first use and reusing it on every subsequent call. Returns `None`
    /// if `index` is out of range or the entry's `mapId` is `0` — both
    /// fold to the "empty response" case in spec §4.5's `JoinGlobalPortal`
    /// handling (spec §8 scenario S6).
    pub fn join<F>(&self, index: usize, create_room: F) -> Option<(i16, u64, GlobalPortalEntry)>
    where
        F: FnOnce() -> u64,
    {
        let entry = self.entry(index)?.clone();
        if entry.map_id == 0 {
            return None;
        }

        let room_id = *self.room_ids.entry(index).or_insert_with(create_room);
        Some((self.channel, room_id, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn portal() -> GlobalPortalInfo {
        GlobalPortalInfo {
            metadata_id: 7,
            entries: vec![
                GlobalPortalEntry {
                    map_id: 100,
                    portal_id: 1,
                    name: "east".to_owned(),
                },
                GlobalPortalEntry {
                    map_id: 0,
                    portal_id: 2,
                    name: "disabled".to_owned(),
                },
            ],
        }
    }

    #[test]
    fn join_is_idempotent_per_index() {
        let manager = GlobalPortalManager::new(portal(), 1);
        let counter = AtomicU64::new(1);

        let (_, room1, _) = manager.join(0, || counter.fetch_add(1, Ordering::SeqCst)).unwrap();
        let (_, room2, _) = manager.join(0, || counter.fetch_add(1, Ordering::SeqCst)).unwrap();

        assert_eq!(room1, room2);
    }

    #[test]
    fn zero_map_id_entry_yields_no_join() {
        let manager = GlobalPortalManager::new(portal(), 1);
        assert!(manager.join(1, || 99).is_none());
    }

    #[test]
    fn out_of_range_index_yields_no_join() {
        let manager = GlobalPortalManager::new(portal(), 1);
        assert!(manager.join(5, || 99).is_none());
    }
}
