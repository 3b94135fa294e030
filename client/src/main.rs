use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use log::info;

use client::network::{self, ClientConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Bomberperson client: server <-> display bridge")]
struct Args {
    /// Display peer address: (IPv4):(port), [(IPv6)]:(port) or (hostname):(port)
    #[clap(short = 'd', long)]
    gui_address: String,

    /// Name sent to the server when joining (at most 255 bytes)
    #[clap(short = 'n', long)]
    player_name: String,

    /// Server address, same formats as gui-address
    #[clap(short = 's', long)]
    server_address: String,

    /// Local UDP port the display peer talks to
    #[clap(short = 'p', long)]
    port: u16,
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

    if args.player_name.len() > 255 {
        eprintln!("player-name must be at most 255 bytes");
        return ExitCode::FAILURE;
    }

    info!(
        "client \"{}\": server {}, display {}, local port {}",
        args.player_name, args.server_address, args.gui_address, args.port
    );

    let config = ClientConfig {
        player_name: args.player_name,
        port: args.port,
        server_address: args.server_address,
        gui_address: args.gui_address,
    };

    match network::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("client error: {err}");
            ExitCode::FAILURE
        }
    }
}
