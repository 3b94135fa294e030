use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::error::ErrorKind;
use clap::Parser;
use log::info;

use server::config::ServerConfig;
use server::network::Server;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Authoritative bomberperson game server")]
struct Args {
    /// Announced server name (at most 255 bytes on the wire)
    #[clap(short = 'n', long)]
    server_name: String,

    /// TCP port to listen on
    #[clap(short = 'p', long)]
    port: u16,

    /// Turns a bomb ticks before exploding
    #[clap(short = 'b', long)]
    bomb_timer: u16,

    /// Milliseconds between consecutive turns
    #[clap(short = 'd', long)]
    turn_duration: u64,

    /// Players needed to start a game
    #[clap(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..))]
    players_count: u8,

    /// How far explosions reach along each axis
    #[clap(short = 'e', long)]
    explosion_radius: u16,

    /// Blocks placed at random when a game starts
    #[clap(short = 'k', long)]
    initial_blocks: u16,

    /// Turns per game, including turn 0
    #[clap(short = 'l', long, value_parser = clap::value_parser!(u16).range(1..))]
    game_length: u16,

    /// Board width
    #[clap(short = 'x', long, value_parser = clap::value_parser!(u16).range(1..))]
    size_x: u16,

    /// Board height
    #[clap(short = 'y', long, value_parser = clap::value_parser!(u16).range(1..))]
    size_y: u16,

    /// Randomness seed, default is the current unix time
    #[clap(short = 's', long)]
    seed: Option<u32>,
}

fn epoch_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info");
    }

    // Help and version exit 0; any option problem exits 1.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{err}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if args.server_name.len() > 255 {
        eprintln!("server-name must be at most 255 bytes");
        return ExitCode::FAILURE;
    }

    let config = ServerConfig {
        server_name: args.server_name,
        port: args.port,
        players_count: args.players_count,
        bomb_timer: args.bomb_timer,
        turn_duration_ms: args.turn_duration,
        explosion_radius: args.explosion_radius,
        initial_blocks: args.initial_blocks,
        game_length: args.game_length,
        size_x: args.size_x,
        size_y: args.size_y,
        seed: args.seed.unwrap_or_else(epoch_seed),
    };

    info!(
        "starting server \"{}\": {} players, {}x{} board, {} turns",
        config.server_name, config.players_count, config.size_x, config.size_y, config.game_length
    );

    match Server::new(config).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("server error: {err}");
            ExitCode::FAILURE
        }
    }
}
