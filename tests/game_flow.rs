//! S4: field entry (spec §8 scenario S4).

mod common;

use std::net::Ipv4Addr;

use fieldbot::config::SessionConfig;
use fieldbot::game::GameSession;
use fieldbot::login::GameServerInfo;
use fieldbot::wire::Vec3;
use uuid::Uuid;

#[test]
fn field_entry_records_map_id_and_position_and_acks_the_field_key() {
    let config = SessionConfig::default();

    let (addr, server) = common::spawn_fake_server(
        common::VERSION,
        common::RIV,
        common::SIV,
        common::BLOCK_IV,
        move |mut conn| {
            conn.recv_opcode(0x1001); // ResponseVersion
            conn.send(0x0006, &[]); // RequestKey

            let response_key = conn.recv_opcode(0x1004); // ResponseKey
            assert_eq!(response_key.len(), 8 + 8 + 16); // accountId + token + machineId

            let mut field_enter = Vec::new();
            field_enter.push(0u8); // migrationError
            field_enter.extend_from_slice(&2_000_062i32.to_le_bytes()); // mapId
            field_enter.push(0u8); // fieldType
            field_enter.push(0u8); // instanceType
            field_enter.extend_from_slice(&0i32.to_le_bytes()); // instanceId
            field_enter.extend_from_slice(&0i32.to_le_bytes()); // dungeonId
            field_enter.extend_from_slice(&100.0f32.to_le_bytes());
            field_enter.extend_from_slice(&200.0f32.to_le_bytes());
            field_enter.extend_from_slice(&300.0f32.to_le_bytes());
            conn.send(0x0007, &field_enter); // RequestFieldEnter

            let ack = conn.recv_opcode(0x1005); // ResponseFieldEnter
            assert_eq!(i32::from_le_bytes([ack[0], ack[1], ack[2], ack[3]]), 0x1234);
        },
    );

    let server_info = GameServerInfo {
        address: Ipv4Addr::new(127, 0, 0, 1),
        port: addr.port(),
        token: 0xAABB_CCDD,
        map_id: 2_000_062,
    };

    let game = GameSession::connect(&server_info, &config, 42, Uuid::new_v4()).unwrap();

    assert_eq!(game.field().map_id(), 2_000_062);
    assert_eq!(game.field().position(), Vec3::new(100.0, 200.0, 300.0));
    assert_eq!(game.field().own_object_id(), None);

    server.join().unwrap();
}
