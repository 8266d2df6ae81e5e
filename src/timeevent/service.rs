//! The single `TimeEvent` RPC surface (spec §4.5, §6).
//!
//! Modeled as a synchronous, transport-agnostic dispatcher rather than a
//! concrete gRPC server: nothing in this retrieval pack wires up
//! `tonic`/`prost`, so the wire transport is left to whatever embeds this
//! service. `TimeEventService::handle` is the part spec §8's testable
//! properties actually exercise; a real deployment would sit a gRPC
//! server in front of it and translate wire messages into
//! [`TimeEventRequest`]/[`TimeEventResponse`] values.

use std::sync::{Arc, Mutex};

use super::field_boss::{FieldBossLookup, FieldBossSnapshot};
use super::global_portal::GlobalPortalManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeEventRequest {
    JoinGlobalPortal { event_id: i64, index: usize },
    GetGlobalPortal,
    GetActiveFieldBosses,
    FieldBossKilled { metadata_id: i32, channel: i16 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalPortalJoinInfo {
    pub channel: i16,
    pub room_id: u64,
    pub map_id: i32,
    pub portal_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeEventResponse {
    pub global_portal_join: Option<GlobalPortalJoinInfo>,
    pub global_portal: Option<(i32, i64)>,
    pub active_field_bosses: Vec<FieldBossSnapshot>,
}

impl TimeEventResponse {
    fn empty() -> Self {
        Self::default()
    }
}

struct ActivePortal {
    metadata_id: i32,
    event_id: i64,
    manager: Arc<GlobalPortalManager>,
}

/// Server-side dispatcher over the field-boss lookup and the (at most
/// one) active global portal. Holds no per-caller connection state; every
/// call is synchronous and safe to invoke from any thread.
pub struct TimeEventService {
    field_bosses: Arc<FieldBossLookup>,
    active_portal: Mutex<Option<ActivePortal>>,
    create_room: Box<dyn Fn(i16) -> u64 + Send + Sync>,
}

impl TimeEventService {
    pub fn new(
        field_bosses: Arc<FieldBossLookup>,
        create_room: impl Fn(i16) -> u64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            field_bosses,
            active_portal: Mutex::new(None),
            create_room: Box::new(create_room),
        }
    }

    pub fn set_active_portal(&self, metadata_id: i32, event_id: i64, manager: Arc<GlobalPortalManager>) {
        *self.active_portal.lock().unwrap() = Some(ActivePortal {
            metadata_id,
            event_id,
            manager,
        });
    }

    pub fn clear_active_portal(&self) {
        *self.active_portal.lock().unwrap() = None;
    }

    pub fn handle(&self, request: TimeEventRequest) -> TimeEventResponse {
        match request {
            TimeEventRequest::JoinGlobalPortal { event_id, index } => {
                self.join_global_portal(event_id, index)
            }
            TimeEventRequest::GetGlobalPortal => self.get_global_portal(),
            TimeEventRequest::GetActiveFieldBosses => TimeEventResponse {
                active_field_bosses: self.field_bosses.get_all(),
                ..TimeEventResponse::empty()
            },
            TimeEventRequest::FieldBossKilled {
                metadata_id,
                channel,
            } => {
                self.field_bosses.remove_channel(metadata_id, channel);
                TimeEventResponse::empty()
            }
        }
    }

    fn join_global_portal(&self, event_id: i64, index: usize) -> TimeEventResponse {
        let guard = self.active_portal.lock().unwrap();
        let active = match guard.as_ref() {
            Some(active) if active.event_id == event_id => active,
            _ => return TimeEventResponse::empty(),
        };

        match active
            .manager
            .join(index, || (self.create_room)(active.manager.channel()))
        {
            Some((channel, room_id, entry)) => TimeEventResponse {
                global_portal_join: Some(GlobalPortalJoinInfo {
                    channel,
                    room_id,
                    map_id: entry.map_id,
                    portal_id: entry.portal_id,
                }),
                ..TimeEventResponse::empty()
            },
            None => TimeEventResponse::empty(),
        }
    }

    fn get_global_portal(&self) -> TimeEventResponse {
        match self.active_portal.lock().unwrap().as_ref() {
            Some(active) => TimeEventResponse {
                global_portal: Some((active.metadata_id, active.event_id)),
                ..TimeEventResponse::empty()
            },
            None => TimeEventResponse::empty(),
        }
    }
}
