//! Key auth, field entry, combat verbs, keep-alive, and field-state
//! tracking once a client has migrated to a game server (C4).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::errors::{Error, FieldResult};
use crate::login::GameServerInfo;
use crate::opcode::{RecvOp, SendOp};
use crate::packet::{Packet, PacketBuilder};
use crate::transport::Transport;
use crate::wire::{Readable, Unicode, Vec3};

const KEY_AUTH_DEADLINE: Duration = Duration::from_secs(10);
const FIELD_ENTER_DEADLINE: Duration = Duration::from_secs(30);
const SPAWN_NPC_DEADLINE: Duration = Duration::from_secs(5);
const SKILL_USE_DEADLINE: Duration = Duration::from_secs(5);
const SKILL_DAMAGE_DEADLINE: Duration = Duration::from_secs(5);

/// First `skillUid`/`targetUid` handed out is `2`; the counter starts at 1
/// and `next()` pre-increments (spec §4.4).
const SKILL_UID_START: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct NpcInfo {
    pub object_id: i32,
    pub npc_id: i32,
    pub position: Vec3,
}

/// Field state the client tracks locally: which map it's in, its own
/// object id (populated from the first `FieldAddUser`), and every NPC the
/// client has observed. `map_id`/`position` start at their defaults and
/// are filled in once by [`GameSession::connect`] after the field-enter
/// reply arrives — the persistent handlers that populate the rest of this
/// struct are installed earlier, before that reply is even sent for.
#[derive(Default)]
pub struct FieldState {
    map_id: AtomicI32,
    position: Mutex<Vec3>,
    own_object_id: Mutex<Option<i32>>,
    npcs: Mutex<HashMap<i32, NpcInfo>>,
}

impl FieldState {
    pub fn map_id(&self) -> i32 {
        self.map_id.load(Ordering::SeqCst)
    }

    pub fn position(&self) -> Vec3 {
        *self.position.lock().unwrap()
    }

    pub fn own_object_id(&self) -> Option<i32> {
        *self.own_object_id.lock().unwrap()
    }

    pub fn npc(&self, object_id: i32) -> Option<NpcInfo> {
        self.npcs.lock().unwrap().get(&object_id).cloned()
    }

    pub fn npc_count(&self) -> usize {
        self.npcs.lock().unwrap().len()
    }

    fn insert_npc(&self, info: NpcInfo) {
        self.npcs.lock().unwrap().insert(info.object_id, info);
    }

    fn remove_npc(&self, object_id: i32) {
        self.npcs.lock().unwrap().remove(&object_id);
    }

    fn set_entered(&self, map_id: i32, position: Vec3) {
        self.map_id.store(map_id, Ordering::SeqCst);
        *self.position.lock().unwrap() = position;
    }
}

/// A cooperative cancellation signal for [`GameSession::stay_alive`] (spec
/// §4.4/§5: "`StayAlive` terminates on external cancellation"). Cloning
/// shares the same underlying signal; `cancel()` from any clone wakes
/// every thread parked in `stay_alive`.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes every thread currently blocked in `stay_alive`. Idempotent.
    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        *lock.lock().unwrap() = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap()
    }
}

/// A live session on a game server: field-entry handshake completed,
/// keep-alive handlers installed, ready to issue combat verbs.
pub struct GameSession {
    transport: Arc<Transport>,
    field: Arc<FieldState>,
    skill_uid: AtomicI64,
}

impl GameSession {
    /// Connects to the game server named by `server_info`, authenticates
    /// with the migration token, and enters the field. Persistent
    /// handlers are installed *before* key auth (step 2 of spec §4.4) — the
    /// server starts emitting time-sync/heartbeat/field-broadcast traffic
    /// immediately once the field is entered.
    pub fn connect(
        server_info: &GameServerInfo,
        config: &SessionConfig,
        account_id: i64,
        machine_id: Uuid,
    ) -> FieldResult<Self> {
        let transport = Arc::new(Transport::connect(
            &server_info.address.to_string(),
            server_info.port,
            config,
        )?);

        let field = Arc::new(FieldState::default());
        install_keepalive_handlers(&transport, &field);

        let key_waiter = transport.wait_for(SendOp::RequestKey.code());
        transport.send(
            PacketBuilder::new(RecvOp::ResponseVersion.code())
                .write(&config.version)?
                .write(&config.version_constant)?
                .write(&config.locale)?,
        )?;
        key_waiter.wait(KEY_AUTH_DEADLINE)?;

        let field_enter_waiter = transport.wait_for(SendOp::RequestFieldEnter.code());
        transport.send(
            PacketBuilder::new(RecvOp::ResponseKey.code())
                .write(&account_id)?
                .write(&server_info.token)?
                .write(&machine_id)?,
        )?;
        let raw = field_enter_waiter.wait(FIELD_ENTER_DEADLINE)?;

        let mut reader = Packet::from_bytes(&raw)?.reader();
        let migration_error = u8::read_from(&mut reader)?;
        if migration_error != 0 {
            return Err(Error::MigrationFailed(migration_error));
        }

        let map_id = i32::read_from(&mut reader)?;
        let _field_type = u8::read_from(&mut reader)?;
        let _instance_type = u8::read_from(&mut reader)?;
        let _instance_id = i32::read_from(&mut reader)?;
        let _dungeon_id = i32::read_from(&mut reader)?;
        let position = Vec3::read_from(&mut reader)?;
        field.set_entered(map_id, position);

        transport.send(PacketBuilder::new(RecvOp::ResponseFieldEnter.code()).write(&config.field_key)?)?;

        info!("entered field {} at {:?}", map_id, position);

        Ok(Self {
            transport,
            field,
            skill_uid: AtomicI64::new(SKILL_UID_START),
        })
    }

    pub fn field(&self) -> &FieldState {
        &self.field
    }

    /// Blocks the calling thread until `cancel` is cancelled (spec §4.4's
    /// `StayAlive`). All the substantive keep-alive work — time-sync,
    /// heartbeat, field-state upkeep — already happens in the persistent
    /// handlers the receive loop invokes; this just parks the caller and
    /// gives it a well-defined way to stop waiting.
    pub fn stay_alive(&self, cancel: &CancellationToken) {
        let (lock, condvar) = &*cancel.inner;
        let guard = lock.lock().unwrap();
        let _ = condvar.wait_while(guard, |cancelled| !*cancelled).unwrap();
    }

    /// Requests an NPC spawn via chat command, then waits for the server
    /// to broadcast it. A one-shot `FieldAddNpc` waiter claims the packet
    /// ahead of the persistent handler (spec §4.2) — the spawned NPC is
    /// inserted into the tracked map manually here, since the handler
    /// never sees a packet a waiter has already consumed.
    pub fn spawn_npc(&self, npc_id: i32) -> FieldResult<Option<NpcInfo>> {
        let waiter = self.transport.wait_for(SendOp::FieldAddNpc.code());
        self.transport.send(
            PacketBuilder::new(RecvOp::UserChat.code())
                .write(&0u32)?
                .write(&Unicode::from(format!("/npc {}", npc_id)))?
                .write(&Unicode::from(""))?
                .write(&0i64)?,
        )?;

        let raw = match waiter.wait(SPAWN_NPC_DEADLINE) {
            Ok(raw) => raw,
            Err(Error::Timeout) => return Ok(None),
            Err(err) => return Err(err),
        };

        let mut reader = Packet::from_bytes(&raw)?.reader();
        let object_id = i32::read_from(&mut reader)?;
        let npc_id = i32::read_from(&mut reader)?;
        let position = Vec3::read_from(&mut reader)?;

        let info = NpcInfo {
            object_id,
            npc_id,
            position,
        };
        self.field.insert_npc(info.clone());

        Ok(Some(info))
    }

    /// Casts `skill_id` at `level`, returning the allocated `skillUid`
    /// regardless of whether the server ever confirms it (spec §4.4: a
    /// timeout here is logged, not fatal).
    pub fn cast_skill(&self, skill_id: i32, level: i16) -> FieldResult<i64> {
        let skill_uid = self.next_uid();
        let waiter = self.transport.wait_for(SendOp::SkillUse.code());

        self.transport.send(
            PacketBuilder::new(RecvOp::Skill.code())
                .write(&0u8)? // sub-opcode: Use
                .write(&skill_uid)?
                .write(&server_tick())?
                .write(&skill_id)?
                .write(&level)?
                .write(&0u8)? // motionPoint
                .write(&self.field.position())?
                .write(&Vec3::ZERO)? // direction
                .write(&Vec3::ZERO)? // rotation
                .write(&0f32)? // rotate2Z
                .write(&client_tick())?
                .write(&false)? // unknown
                .write(&0i64)? // itemUid
                .write(&false)?, // isHold
        )?;

        if let Err(Error::Timeout) = waiter.wait(SKILL_USE_DEADLINE) {
            warn!("no SkillUse confirmation for skillUid {}", skill_uid);
        }

        Ok(skill_uid)
    }

    /// Attacks `target_object_id` with the skill already cast as
    /// `skill_uid`. Fails with [`Error::InvalidArgument`] if fewer target
    /// ids are supplied than `target_count` claims (spec §4.4
    /// pre-condition); this client only ever issues single-target attacks.
    pub fn attack_target(&self, skill_uid: i64, target_object_id: i32) -> FieldResult<()> {
        let target_uid = self.next_uid();
        let target_object_ids = [target_object_id];
        let target_count = 1u8;

        if target_object_ids.len() < target_count as usize {
            return Err(Error::InvalidArgument(
                "fewer target ids supplied than targetCount".to_owned(),
            ));
        }

        let waiter = self.transport.wait_for(SendOp::SkillDamage.code());

        let mut builder = PacketBuilder::new(RecvOp::Skill.code())
            .write(&1u8)? // sub-opcode: Attack
            .write(&1u8)? // sub-opcode: Target
            .write(&skill_uid)?
            .write(&target_uid)?
            .write(&self.field.position())? // impactPos
            .write(&self.field.position())? // impactPos2 (== impactPos)
            .write(&Vec3::ZERO)? // direction
            .write(&0u8)? // attackPoint
            .write(&target_count)?
            .write(&0i32)?; // iterations

        for target_object_id in target_object_ids {
            builder = builder.write(&target_object_id)?.write(&0u8)?; // unknown
        }

        self.transport.send(builder)?;

        if let Err(Error::Timeout) = waiter.wait(SKILL_DAMAGE_DEADLINE) {
            warn!("no SkillDamage confirmation for targetUid {}", target_uid);
        }

        Ok(())
    }

    fn next_uid(&self) -> i64 {
        self.skill_uid.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Installs every persistent handler the server expects to be live before
/// field entry completes (spec §4.4 step 2): time-sync, heartbeat,
/// own-object-id tracking off the first `FieldAddUser`, and field-state
/// upkeep for NPCs/damage the client didn't itself trigger with a waiter
/// (an NPC another player spawned, one removed by despawn logic, damage
/// dealt by something other than `attack_target`).
///
/// The time-sync/heartbeat handlers need to send a reply, which means they
/// need a handle back to the transport — but `transport.on(...)` stores the
/// closure inside the transport's own `Inner`, so capturing `transport`'s
/// `Arc` directly would close a strong reference cycle (`Inner -> handlers
/// -> closure -> Arc<Transport> -> Arc<Inner>`) that would keep the
/// receive thread and socket alive forever even after every `GameSession`
/// handle is dropped. Captured as `Weak` instead; `upgrade()` fails once
/// the transport is actually gone, and the handler just does nothing.
fn install_keepalive_handlers(transport: &Arc<Transport>, field: &Arc<FieldState>) {
    {
        let weak = Arc::downgrade(transport);
        transport.on(SendOp::ResponseTimeSync.code(), move |raw| {
            if let Some(transport) = weak.upgrade() {
                if let Err(err) = handle_time_sync(&transport, raw) {
                    warn!("ResponseTimeSync handler failed: {}", err);
                }
            }
        });
    }

    {
        let weak = Arc::downgrade(transport);
        transport.on(SendOp::RequestHeartbeat.code(), move |raw| {
            if let Some(transport) = weak.upgrade() {
                if let Err(err) = handle_heartbeat(&transport, raw) {
                    warn!("RequestHeartbeat handler failed: {}", err);
                }
            }
        });
    }

    {
        let field = field.clone();
        transport.on(SendOp::FieldAddUser.code(), move |raw| {
            if let Err(err) = handle_field_add_user(&field, raw) {
                warn!("FieldAddUser handler failed: {}", err);
            }
        });
    }

    {
        let field = field.clone();
        transport.on(SendOp::FieldAddNpc.code(), move |raw| {
            if let Err(err) = handle_field_add_npc(&field, raw) {
                warn!("FieldAddNpc handler failed: {}", err);
            }
        });
    }

    {
        let field = field.clone();
        transport.on(SendOp::FieldRemoveNpc.code(), move |raw| {
            if let Err(err) = handle_field_remove_npc(&field, raw) {
                warn!("FieldRemoveNpc handler failed: {}", err);
            }
        });
    }

    transport.on(SendOp::SkillDamage.code(), |raw| {
        if let Err(err) = handle_skill_damage(raw) {
            warn!("SkillDamage handler failed: {}", err);
        }
    });
}

fn handle_time_sync(transport: &Transport, raw: &[u8]) -> FieldResult<()> {
    let mut reader = Packet::from_bytes(raw)?.reader();
    let command = u8::read_from(&mut reader)?;
    if command == 2 {
        transport.send(
            PacketBuilder::new(RecvOp::RequestTimeSync.code())
                .write(&0u8)?
                .write(&0i32)?,
        )?;
    }
    Ok(())
}

fn handle_heartbeat(transport: &Transport, raw: &[u8]) -> FieldResult<()> {
    let mut reader = Packet::from_bytes(raw)?.reader();
    let server_tick = i32::read_from(&mut reader)?;
    transport.send(
        PacketBuilder::new(RecvOp::ResponseHeartbeat.code())
            .write(&server_tick)?
            .write(&client_tick())?,
    )?;
    Ok(())
}

fn handle_field_add_user(field: &FieldState, raw: &[u8]) -> FieldResult<()> {
    let mut reader = Packet::from_bytes(raw)?.reader();
    let object_id = i32::read_from(&mut reader)?;

    let mut own = field.own_object_id.lock().unwrap();
    if own.is_none() {
        *own = Some(object_id);
    }
    Ok(())
}

/// Tracks NPCs spawned by something other than this client's own
/// `spawn_npc` call (e.g. another player's `/npc` command). `spawn_npc`
/// registers a one-shot waiter for the NPC it requested, which claims that
/// packet ahead of this handler (spec §4.2) and inserts it itself.
fn handle_field_add_npc(field: &FieldState, raw: &[u8]) -> FieldResult<()> {
    let mut reader = Packet::from_bytes(raw)?.reader();
    let object_id = i32::read_from(&mut reader)?;
    let npc_id = i32::read_from(&mut reader)?;
    let position = Vec3::read_from(&mut reader)?;

    field.insert_npc(NpcInfo {
        object_id,
        npc_id,
        position,
    });
    Ok(())
}

fn handle_field_remove_npc(field: &FieldState, raw: &[u8]) -> FieldResult<()> {
    let mut reader = Packet::from_bytes(raw)?.reader();
    let object_id = i32::read_from(&mut reader)?;
    field.remove_npc(object_id);
    Ok(())
}

/// No session-tracked state for damage events the client didn't request
/// itself (no structure in the data model calls for it); this exists so a
/// `SkillDamage` broadcast for another actor's attack doesn't drop on the
/// floor for lack of any registered handler, the way an unsolicited
/// `FieldAddNpc` would.
fn handle_skill_damage(raw: &[u8]) -> FieldResult<()> {
    let packet = Packet::from_bytes(raw)?;
    debug!("SkillDamage broadcast ({} body bytes)", packet.body().len());
    Ok(())
}

fn server_tick() -> i32 {
    client_tick()
}

fn client_tick() -> i32 {
    // Monotonic millisecond tick since process start, matching the
    // teacher's `localMonotonicTickMs` concept without pulling in wall
    // clock time for something that's only ever compared to itself.
    thread_local! {
        static START: Instant = Instant::now();
    }
    START.with(|start| start.elapsed().as_millis() as i32)
}
