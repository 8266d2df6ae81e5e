//! Minimal orchestrator-level CLI front end (spec §6). Logs in, migrates
//! to the game server, optionally spawns an NPC and casts a skill at it,
//! then idles answering keep-alive probes until interrupted.

use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use fieldbot::config::SessionConfig;
use fieldbot::game::{CancellationToken, GameSession};
use fieldbot::login::LoginSession;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless protocol client for the field server")]
struct Cli {
    /// Login server host.
    #[arg(default_value = "127.0.0.1")]
    host: String,

    /// Login server port.
    #[arg(default_value_t = 20001)]
    port: u16,

    /// Account username.
    #[arg(default_value = "testbot")]
    username: String,

    /// Account password.
    #[arg(default_value = "testbot")]
    password: String,

    /// Spawn this NPC id once the field is entered.
    #[arg(long = "npc")]
    npc_id: Option<i32>,

    /// Cast this skill id on the spawned NPC.
    #[arg(long = "skill")]
    skill_id: Option<i32>,

    /// Skill level to cast with `--skill`.
    #[arg(long = "skill-level", default_value_t = 1)]
    skill_level: i16,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> fieldbot::FieldResult<()> {
    let config = SessionConfig::default();

    let mut login = LoginSession::connect(&cli.host, cli.port, &config)?;
    let result = login.login(&cli.username, &cli.password)?;

    if !result.success {
        error!(
            "login rejected: code {} ({})",
            result.error_code, result.error_message
        );
        return Err(fieldbot::errors::Error::InvalidArgument(
            result.error_message,
        ));
    }

    let character = result
        .characters
        .first()
        .ok_or_else(|| fieldbot::errors::Error::InvalidArgument("no characters on account".to_owned()))?;
    info!("logged in as account {}, character {}", result.account_id, character.name);

    let server_info = login.select_character(character.character_id)?;
    let machine_id = login.machine_id();
    drop(login); // done with the login connection once migration info is in hand

    let game = GameSession::connect(&server_info, &config, result.account_id, machine_id)?;
    info!("entered field {}", game.field().map_id());

    if let Some(npc_id) = cli.npc_id {
        match game.spawn_npc(npc_id)? {
            Some(npc) => {
                info!("spawned npc {} as object {}", npc.npc_id, npc.object_id);

                if let Some(skill_id) = cli.skill_id {
                    let skill_uid = game.cast_skill(skill_id, cli.skill_level)?;
                    game.attack_target(skill_uid, npc.object_id)?;
                }
            }
            None => info!("npc {} spawn request was not acknowledged", npc_id),
        }
    }

    // Nothing in this CLI ever cancels the token; the persistent handlers
    // installed by `GameSession::connect` do all the real keep-alive work,
    // and `stay_alive` just parks this thread until told to stop (spec
    // §4.4's `StayAlive`).
    game.stay_alive(&CancellationToken::new());
    Ok(())
}
