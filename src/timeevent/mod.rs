//! Field-boss and global-portal coordination across game channels (C5,
//! spec §4.5). This is the server-side surface the client flows in
//! [`crate::login`]/[`crate::game`] consult, specified as a standalone
//! service with its own API.

pub mod field_boss;
pub mod global_portal;
pub mod service;
pub mod spawn;

pub use field_boss::{BroadcastError, CreateError, FieldBossLookup, FieldBossManager, FieldBossMetadata, FieldBossSnapshot};
pub use global_portal::{GlobalPortalEntry, GlobalPortalInfo, GlobalPortalManager};
pub use service::{GlobalPortalJoinInfo, TimeEventRequest, TimeEventResponse, TimeEventService};
pub use spawn::compute_next_spawn_timestamp;
