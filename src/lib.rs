/*!
Headless client for a MapleStory2-style MMO server, plus the world-side
time-event dispatcher it talks to.

# Examples

```no_run
use fieldbot::config::SessionConfig;
use fieldbot::login::LoginSession;
use fieldbot::game::GameSession;

let config = SessionConfig::default();
let mut login = LoginSession::connect("127.0.0.1", 20001, &config).unwrap();
let result = login.login("testbot", "testbot").unwrap();
assert!(result.success);

let character = &result.characters[0];
let server_info = login.select_character(character.character_id).unwrap();

let game = GameSession::connect(
    &server_info,
    &config,
    result.account_id,
    login.machine_id(),
)
.unwrap();

game.spawn_npc(9001).unwrap();
```
*/

pub mod cipher;
pub mod config;
pub mod errors;
pub mod game;
pub mod login;
pub mod opcode;
pub mod packet;
pub mod timeevent;
pub mod transport;
pub mod wire;

pub use errors::FieldResult;
