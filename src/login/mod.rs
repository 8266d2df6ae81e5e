//! Version exchange, credential submission, character selection, and
//! migration off the login server (C3).

use std::io::Read as _;
use std::net::Ipv4Addr;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::errors::{Error, FieldResult};
use crate::opcode::{RecvOp, SendOp};
use crate::packet::{Packet, PacketBuilder};
use crate::transport::Transport;
use crate::wire::{Readable, Unicode};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);
const MIGRATION_DEADLINE: Duration = Duration::from_secs(10);
const CHARACTER_LIST_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSummary {
    pub character_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub success: bool,
    pub account_id: i64,
    pub characters: Vec<CharacterSummary>,
    pub error_code: u8,
    pub error_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameServerInfo {
    pub address: Ipv4Addr,
    pub port: u16,
    pub token: u64,
    pub map_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connected,
    VersionSent,
    CredentialsSent,
    CharacterSelected,
}

/// Drives the login server's half of the protocol. States track
/// `connected -> version-sent -> credentials-sent -> character-selected`;
/// `migrated` is represented by this value simply being dropped in favor
/// of a fresh game-server `Transport`.
pub struct LoginSession {
    transport: Transport,
    machine_id: Uuid,
    state: State,
}

#[derive(Default)]
struct CharacterListState {
    first: Option<CharacterSummary>,
    advertised_count: u8,
}

impl LoginSession {
    /// Connects and completes the version handshake: registers a waiter
    /// for `RequestLogin` before sending `ResponseVersion`, per spec §4.3
    /// (registering after the send would race the receive loop).
    pub fn connect(host: &str, port: u16, config: &SessionConfig) -> FieldResult<Self> {
        let transport = Transport::connect(host, port, config)?;

        let waiter = transport.wait_for(SendOp::RequestLogin.code());
        transport.send(
            PacketBuilder::new(RecvOp::ResponseVersion.code())
                .write(&config.version)?
                .write(&config.version_constant)?
                .write(&config.locale)?,
        )?;
        waiter.wait(DEFAULT_DEADLINE)?;

        info!("login handshake complete, version {}", config.version);

        Ok(Self {
            transport,
            machine_id: Uuid::new_v4(),
            state: State::VersionSent,
        })
    }

    pub fn machine_id(&self) -> Uuid {
        self.machine_id
    }

    /// Submits credentials and collects the character list. The
    /// persistent `CharacterList` handler parses entries as they stream
    /// in and signals completion once it observes the terminal
    /// sub-command (`cmd == 4`).
    pub fn login(&mut self, username: &str, password: &str) -> FieldResult<LoginResult> {
        let list_state = Arc::new(Mutex::new(CharacterListState::default()));
        let (done_tx, done_rx) = sync_channel::<()>(1);

        {
            let list_state = list_state.clone();
            self.transport
                .on(SendOp::CharacterList.code(), move |raw| {
                    if let Err(err) = record_character_list_entry(raw, &list_state, &done_tx) {
                        warn!("malformed CharacterList packet: {}", err);
                    }
                });
        }

        let result_waiter = self.transport.wait_for(SendOp::LoginResult.code());
        self.transport.send(
            PacketBuilder::new(RecvOp::ResponseLogin.code())
                .write(&2u8)? // cmd = CharacterList
                .write(&Unicode::from(username))?
                .write(&Unicode::from(password))?
                .write(&1i16)? // unknown magic constant, preserved per spec §9
                .write(&self.machine_id)?,
        )?;
        self.state = State::CredentialsSent;

        let raw = result_waiter.wait(DEFAULT_DEADLINE)?;
        let mut reader = Packet::from_bytes(&raw)?.reader();

        let login_state = u8::read_from(&mut reader)?;
        let _unused = i32::read_from(&mut reader)?;
        let ban_reason = Unicode::read_from(&mut reader)?;
        let account_id = i64::read_from(&mut reader)?;

        if login_state != 0 {
            return Ok(LoginResult {
                success: false,
                account_id,
                characters: Vec::new(),
                error_code: login_state,
                error_message: ban_reason.0,
            });
        }

        done_rx
            .recv_timeout(CHARACTER_LIST_DEADLINE)
            .map_err(|_| Error::Timeout)?;

        let list_state = list_state.lock().unwrap();
        if list_state.advertised_count > 1 {
            return Err(Error::InvalidArgument(format!(
                "server advertised {} characters; only single-character accounts are supported (spec §9)",
                list_state.advertised_count
            )));
        }

        Ok(LoginResult {
            success: true,
            account_id,
            characters: list_state.first.iter().cloned().collect(),
            error_code: 0,
            error_message: String::new(),
        })
    }

    /// Requests migration to a game server for `character_id`. Non-zero
    /// `migrationError` fails with [`Error::MigrationFailed`].
    pub fn select_character(&mut self, character_id: i64) -> FieldResult<GameServerInfo> {
        let waiter = self.transport.wait_for(SendOp::LoginToGame.code());
        self.transport.send(
            PacketBuilder::new(RecvOp::CharacterManagement.code())
                .write(&0u8)? // cmd = Select
                .write(&character_id)?
                .write(&1i16)?, // worldChannel, preserved per spec §9
        )?;

        let raw = waiter.wait(MIGRATION_DEADLINE)?;
        let mut reader = Packet::from_bytes(&raw)?.reader();

        let migration_error = u8::read_from(&mut reader)?;
        if migration_error != 0 {
            return Err(Error::MigrationFailed(migration_error));
        }

        let mut ip_bytes = [0u8; 4];
        reader.read_exact(&mut ip_bytes)?;
        let port = u16::read_from(&mut reader)?;
        let token = u64::read_from(&mut reader)?;
        let map_id = i32::read_from(&mut reader)?;

        self.state = State::CharacterSelected;
        info!("migrating to game server at {:?}:{}", ip_bytes, port);

        Ok(GameServerInfo {
            address: Ipv4Addr::from(ip_bytes),
            port,
            token,
            map_id,
        })
    }
}

fn record_character_list_entry(
    raw: &[u8],
    state: &Mutex<CharacterListState>,
    done: &SyncSender<()>,
) -> FieldResult<()> {
    let packet = Packet::from_bytes(raw)?;
    let mut reader = packet.reader();
    let cmd = u8::read_from(&mut reader)?;

    match cmd {
        0 => {
            let count = u8::read_from(&mut reader)?;
            let mut guard = state.lock().unwrap();
            guard.advertised_count = count;

            if guard.first.is_none() && count > 0 {
                // Only the first entry's fixed-width prefix is parsed; the
                // remainder of the entry is variable-length and not
                // parseable with the schema available (spec §9).
                let _account_id = i64::read_from(&mut reader)?;
                let character_id = i64::read_from(&mut reader)?;
                let name = Unicode::read_from(&mut reader)?;
                guard.first = Some(CharacterSummary {
                    character_id,
                    name: name.0,
                });
            }
        }
        4 => {
            let _ = done.try_send(());
        }
        other => {
            warn!("unrecognized CharacterList sub-command {}", other);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Writable;

    #[test]
    fn character_list_records_only_the_first_entry() {
        let state = Mutex::new(CharacterListState::default());
        let (tx, _rx) = sync_channel::<()>(1);

        let mut body = Vec::new();
        body.push(0u8); // cmd
        body.push(2u8); // advertised count
        body.extend_from_slice(&99i64.to_le_bytes()); // accountId (skipped)
        body.extend_from_slice(&10001i64.to_le_bytes()); // characterId
        Unicode::from("hero").write_to(&mut body).unwrap();

        let mut raw = SendOp::CharacterList.code().to_le_bytes().to_vec();
        raw.extend_from_slice(&body);

        record_character_list_entry(&raw, &state, &tx).unwrap();

        let guard = state.lock().unwrap();
        assert_eq!(guard.advertised_count, 2);
        assert_eq!(
            guard.first,
            Some(CharacterSummary {
                character_id: 10001,
                name: "hero".to_owned(),
            })
        );
    }

    #[test]
    fn terminal_subcommand_signals_done() {
        let state = Mutex::new(CharacterListState::default());
        let (tx, rx) = sync_channel::<()>(1);

        let mut raw = SendOp::CharacterList.code().to_le_bytes().to_vec();
        raw.push(4u8);

        record_character_list_entry(&raw, &state, &tx).unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
