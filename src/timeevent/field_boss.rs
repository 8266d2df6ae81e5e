//! Field-boss lookup and per-boss broadcast coordination across game
//! channels (spec §3, §4.5).

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBossMetadata {
    pub metadata_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldBossSnapshot {
    pub metadata_id: i32,
    pub event_id: i64,
    pub spawn_timestamp: i64,
    pub next_spawn_timestamp: i64,
    pub alive_channels: Vec<i16>,
}

/// A per-channel broadcast failure. `Unavailable` means the channel is
/// down, not that the broadcast itself is malformed — callers log and
/// keep going either way (spec §4.5).
#[derive(Debug)]
pub enum BroadcastError {
    Unavailable,
    Other(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum CreateError {
    Conflict,
}

/// One active field boss's broadcast state. Disposal (removing the entry
/// from the owning [`FieldBossLookup`]) happens externally, scheduled by
/// whatever closed the boss window — this type never removes itself.
pub struct FieldBossManager {
    metadata: FieldBossMetadata,
    event_id: i64,
    end_tick: i64,
    spawn_timestamp: i64,
    next_spawn_timestamp: i64,
    alive_channels: RwLock<HashSet<i16>>,
}

impl FieldBossManager {
    pub fn metadata(&self) -> &FieldBossMetadata {
        &self.metadata
    }

    pub fn event_id(&self) -> i64 {
        self.event_id
    }

    pub fn end_tick(&self) -> i64 {
        self.end_tick
    }

    pub fn alive_channels(&self) -> Vec<i16> {
        self.alive_channels.read().unwrap().iter().copied().collect()
    }

    pub fn snapshot(&self) -> FieldBossSnapshot {
        FieldBossSnapshot {
            metadata_id: self.metadata.metadata_id,
            event_id: self.event_id,
            spawn_timestamp: self.spawn_timestamp,
            next_spawn_timestamp: self.next_spawn_timestamp,
            alive_channels: self.alive_channels(),
        }
    }

    /// Broadcasts to every channel in `channels`; a channel is recorded
    /// into `aliveChannels` iff its send succeeds (spec §4.5).
    pub fn announce<F>(&self, channels: &[i16], mut send: F)
    where
        F: FnMut(i16) -> Result<(), BroadcastError>,
    {
        for &channel in channels {
            match send(channel) {
                Ok(()) => {
                    self.alive_channels.write().unwrap().insert(channel);
                }
                Err(err) => log_broadcast_failure("Announce", channel, err),
            }
        }
    }

    pub fn warn_channels<F>(&self, channels: &[i16], mut send: F)
    where
        F: FnMut(i16) -> Result<(), BroadcastError>,
    {
        for &channel in channels {
            if let Err(err) = send(channel) {
                log_broadcast_failure("WarnChannels", channel, err);
            }
        }
    }

    pub fn dispose<F>(&self, channels: &[i16], mut send: F)
    where
        F: FnMut(i16) -> Result<(), BroadcastError>,
    {
        for &channel in channels {
            if let Err(err) = send(channel) {
                log_broadcast_failure("Dispose", channel, err);
            }
        }
    }

    /// Removes one channel from `aliveChannels`. Does not dispose the
    /// manager itself (spec §4.5).
    pub fn remove_channel(&self, channel: i16) {
        self.alive_channels.write().unwrap().remove(&channel);
    }
}

fn log_broadcast_failure(op: &str, channel: i16, err: BroadcastError) {
    match err {
        BroadcastError::Unavailable => {
            warn!("{} to channel {} skipped: channel unavailable", op, channel)
        }
        BroadcastError::Other(reason) => warn!("{} to channel {} failed: {}", op, channel, reason),
    }
}

/// Concurrent `metadataId -> FieldBossManager` registry plus the shared
/// `nextEventId` counter (spec §4.5).
#[derive(Default)]
pub struct FieldBossLookup {
    managers: DashMap<i32, Arc<FieldBossManager>>,
    next_event_id: AtomicI64,
}

impl FieldBossLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new `eventId` and inserts a manager iff `metadata_id`
    /// is absent. Never replaces a live entry: per spec §9's open
    /// question, whether the scheduler is expected to `Dispose` before
    /// retrying is undocumented, so a conflict is always surfaced rather
    /// than guessed at.
    pub fn create(
        &self,
        metadata: FieldBossMetadata,
        end_tick: i64,
        next_spawn_timestamp: i64,
    ) -> Result<i64, CreateError> {
        match self.managers.entry(metadata.metadata_id) {
            Entry::Occupied(_) => Err(CreateError::Conflict),
            Entry::Vacant(slot) => {
                let event_id = self.next_event_id.fetch_add(1, Ordering::SeqCst) + 1;
                slot.insert(Arc::new(FieldBossManager {
                    metadata,
                    event_id,
                    end_tick,
                    spawn_timestamp: unix_now(),
                    next_spawn_timestamp,
                    alive_channels: RwLock::new(HashSet::new()),
                }));
                Ok(event_id)
            }
        }
    }

    pub fn get(&self, metadata_id: i32) -> Option<Arc<FieldBossManager>> {
        self.managers.get(&metadata_id).map(|entry| entry.clone())
    }

    pub fn get_all(&self) -> Vec<FieldBossSnapshot> {
        self.managers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect()
    }

    pub fn remove_channel(&self, metadata_id: i32, channel: i16) {
        if let Some(manager) = self.get(metadata_id) {
            manager.remove_channel(channel);
        }
    }

    /// Removes the manager for `metadata_id` entirely, called once the
    /// scheduler has decided the boss window is closed.
    pub fn remove(&self, metadata_id: i32) {
        self.managers.remove(&metadata_id);
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
