//! Network bridge between the game server (TCP) and the display peer
//! (UDP).
//!
//! Two tasks share the reconciliation state. The game task owns the
//! server read half: it folds every [`ServerMessage`] into
//! [`GameState`] and forwards the refreshed projection as one datagram.
//! The input task owns the display socket's receive side: one strictly
//! decoded [`InputMessage`] per datagram, translated and written to the
//! server. A malformed datagram is dropped without touching any state;
//! a malformed server stream kills the client.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use log::{debug, error, info};
use shared::messages::{InputMessage, ServerMessage};
use shared::transport::{self, MessageStream, UDP_DATAGRAM_SIZE};
use shared::wire::{decode_exact, encode_to_vec};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;

use crate::game::GameState;

/// Everything the client needs to come up.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub player_name: String,
    /// Local UDP port the display peer talks to.
    pub port: u16,
    pub server_address: String,
    pub gui_address: String,
}

/// Resolves `host:port` in any accepted spelling: IPv4 literal,
/// bracketed IPv6 literal, or hostname.
pub fn resolve_address(addr: &str) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    // Literal addresses first; DNS only for everything else.
    if let Ok(addr) = addr.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let mut addrs = addr.to_socket_addrs()?;
    match addrs.next() {
        Some(addr) => Ok(addr),
        None => Err(format!("failed to resolve address: {addr}").into()),
    }
}

/// Connects both sockets and runs the two bridge tasks. Returns only on
/// a fatal error; a clean return does not exist in this protocol.
pub async fn run(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let gui_addr = resolve_address(&config.gui_address)?;
    let server_addr = resolve_address(&config.server_address)?;

    let stream = TcpStream::connect(server_addr).await?;
    stream.set_nodelay(true)?;
    info!("connected to server {server_addr}");

    // Bind in the display peer's address family so datagrams flow both
    // ways through one socket.
    let local: SocketAddr = match gui_addr {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, config.port).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, config.port).into(),
    };
    let gui_socket = Arc::new(UdpSocket::bind(local).await?);
    gui_socket.connect(gui_addr).await?;
    info!("bridging display peer {gui_addr} on local port {}", config.port);

    let (read_half, write_half) = stream.into_split();
    let state = Arc::new(Mutex::new(GameState::new()));
    let server_writer = Arc::new(Mutex::new(write_half));

    tokio::spawn(input_task(
        Arc::clone(&gui_socket),
        Arc::clone(&state),
        server_writer,
        config.player_name.clone(),
    ));

    game_task(gui_socket, state, read_half).await
}

/// Applies the server stream to the shared state and keeps the display
/// peer current. Any decoding or socket error here is fatal.
async fn game_task(
    gui_socket: Arc<UdpSocket>,
    state: Arc<Mutex<GameState>>,
    read_half: tokio::net::tcp::OwnedReadHalf,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut messages = MessageStream::new(read_half);
    loop {
        let msg: ServerMessage = messages.recv().await?;
        let projection = state.lock().await.apply(msg);
        if let Some(projection) = projection {
            let bytes = encode_to_vec(&projection)?;
            gui_socket.send(&bytes).await?;
        }
    }
}

/// Receives display-peer datagrams, drops the malformed ones on the
/// floor and forwards the rest to the server.
async fn input_task(
    gui_socket: Arc<UdpSocket>,
    state: Arc<Mutex<GameState>>,
    server_writer: Arc<Mutex<OwnedWriteHalf>>,
    player_name: String,
) {
    let mut buf = vec![0u8; UDP_DATAGRAM_SIZE];
    loop {
        let len = match gui_socket.recv(&mut buf).await {
            Ok(len) => len,
            Err(err) => {
                error!("display socket receive failed: {err}");
                return;
            }
        };

        // Strict framing: one whole message, nothing after it.
        let input = match decode_exact::<InputMessage>(&buf[..len]) {
            Ok(input) => input,
            Err(err) => {
                debug!("ignoring malformed display datagram: {err}");
                continue;
            }
        };

        let outgoing = state.lock().await.process_input(input, &player_name);
        if let Some(msg) = outgoing {
            let mut writer = server_writer.lock().await;
            if let Err(err) = transport::send_message(&mut *writer, &msg).await {
                // The game task sees the same dead stream and exits the
                // process; nothing more to do here.
                error!("failed to send to server: {err}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::Direction;

    #[test]
    fn resolve_address_ip() {
        let addr = resolve_address("127.0.0.1:8080").unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);

        let addr = resolve_address("[::1]:8080").unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn resolve_address_localhost() {
        let addr = resolve_address("localhost:8080").unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().to_string() == "127.0.0.1" || addr.ip().to_string() == "::1");
    }

    #[test]
    fn resolve_address_invalid() {
        assert!(resolve_address("no-port-here").is_err());
        assert!(resolve_address("nonexistent.invalid.domain:8080").is_err());
    }

    #[test]
    fn datagram_with_unknown_tag_is_rejected() {
        assert!(decode_exact::<InputMessage>(&[0x99]).is_err());
    }

    #[test]
    fn datagram_with_trailing_bytes_is_rejected() {
        // A valid PlaceBomb followed by junk must not pass.
        assert!(decode_exact::<InputMessage>(&[0x00, 0xaa]).is_err());
    }

    #[test]
    fn datagram_with_bad_direction_is_rejected() {
        assert!(decode_exact::<InputMessage>(&[0x02, 0x04]).is_err());
    }

    #[test]
    fn well_formed_datagrams_decode() {
        assert_eq!(
            decode_exact::<InputMessage>(&[0x00]).unwrap(),
            InputMessage::PlaceBomb
        );
        assert_eq!(
            decode_exact::<InputMessage>(&[0x02, 0x01]).unwrap(),
            InputMessage::Move {
                direction: Direction::Right
            }
        );
    }
}
