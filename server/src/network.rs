//! Server network layer: acceptor, per-peer receive loops, join
//! admission and the game master's turn loop.
//!
//! Task structure follows the concurrency model of the protocol: one
//! acceptor, one task per connected peer, one join-admission task fed
//! by a channel, and one game master. They share the peer table, the
//! roster, the playing-seat map and the serialised turn history.
//!
//! Lock order is deliberate. During join admission the slot mutex is
//! taken before `playing`; during move gathering `playing` is taken
//! before slot mutexes. The inversion cannot deadlock because joins are
//! only processed in lobby and moves are only gathered in game. The
//! turn-history lock is always taken before any slot mutex: the game
//! master appends and broadcasts a turn under the history write lock
//! while a late joiner replays and claims its slot under the read lock,
//! so every peer sees each turn exactly once, via replay or broadcast.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use shared::messages::{ClientMessage, Event, ServerMessage};
use shared::transport::{self, MessageStream, TransportError};
use shared::types::{Player, PlayerId};
use shared::wire::{encode_to_vec, Encode};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::time::sleep;

use crate::client_manager::{PeerSlot, PeerTable};
use crate::config::ServerConfig;
use crate::game::GameState;

/// A peer's request to join, queued for the admission task.
type JoinOffer = (usize, Player);

/// Binds the listening socket, preferring a dual-stack IPv6 socket and
/// falling back to IPv4.
pub async fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    match TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)).await {
        Ok(listener) => Ok(listener),
        Err(err) => {
            warn!("IPv6 bind failed ({err}), falling back to IPv4");
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await
        }
    }
}

fn encode_or_log<T: Encode>(msg: &T) -> Option<Vec<u8>> {
    match encode_to_vec(msg) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            error!("failed to encode outgoing message: {err}");
            None
        }
    }
}

/// Smallest non-negative id not yet in the roster.
fn lowest_free_id(players: &BTreeMap<PlayerId, Player>) -> Option<PlayerId> {
    (0..=PlayerId::MAX).find(|id| !players.contains_key(id))
}

/// The running server: shared state plus the tasks that animate it.
#[derive(Clone)]
pub struct Server {
    config: Arc<ServerConfig>,
    peers: Arc<PeerTable>,
    players: Arc<RwLock<BTreeMap<PlayerId, Player>>>,
    playing: Arc<Mutex<BTreeMap<PlayerId, usize>>>,
    /// Serialised bytes of every turn broadcast this game, in order.
    history: Arc<RwLock<Vec<u8>>>,
    lobby: Arc<AtomicBool>,
    game_start: Arc<Notify>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            peers: Arc::new(PeerTable::new()),
            players: Arc::new(RwLock::new(BTreeMap::new())),
            playing: Arc::new(Mutex::new(BTreeMap::new())),
            history: Arc::new(RwLock::new(Vec::new())),
            lobby: Arc::new(AtomicBool::new(true)),
            game_start: Arc::new(Notify::new()),
        }
    }

    /// Binds the configured port and serves forever.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = bind_listener(self.config.port).await?;
        info!(
            "server \"{}\" listening on {}",
            self.config.server_name,
            listener.local_addr()?
        );
        self.serve(listener).await;
        Ok(())
    }

    /// Spawns the join and game-master tasks, then runs the acceptor on
    /// the current task.
    pub async fn serve(self, listener: TcpListener) {
        let (join_tx, join_rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().join_handler(join_rx));
        tokio::spawn(self.clone().game_master());

        loop {
            self.peers.wait_for_room().await;
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("accepted peer {addr}");
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!("failed to set TCP_NODELAY for {addr}: {err}");
                    }
                    self.peers.add_connection();
                    tokio::spawn(self.clone().handle_peer(stream, addr, join_tx.clone()));
                }
                Err(err) => {
                    // Accept errors are transient; keep listening.
                    error!("accept failed: {err}");
                }
            }
        }
    }

    fn in_lobby(&self) -> bool {
        self.lobby.load(Ordering::SeqCst)
    }

    fn hello_message(&self) -> ServerMessage {
        ServerMessage::Hello {
            server_name: self.config.server_name.clone(),
            players_count: self.config.players_count,
            size_x: self.config.size_x,
            size_y: self.config.size_y,
            game_length: self.config.game_length,
            explosion_radius: self.config.explosion_radius,
            bomb_timer: self.config.bomb_timer,
        }
    }

    /// Welcomes a fresh connection and claims a slot for it.
    ///
    /// In lobby the peer gets `Hello` plus the roster as a series of
    /// `AcceptedPlayer`. Mid-game it gets `Hello`, `GameStarted` and the
    /// verbatim turn history; the slot is claimed while the history read
    /// lock is held so a concurrently broadcast turn is either in the
    /// replay or delivered to the slot, never both, never neither.
    async fn hail(&self, mut writer: OwnedWriteHalf, addr: &str) -> Result<usize, TransportError> {
        transport::send_message(&mut writer, &self.hello_message()).await?;

        let no_room = || TransportError::Io(std::io::Error::other("no free peer slot"));
        if self.in_lobby() {
            let roster: Vec<(PlayerId, Player)> = {
                let players = self.players.read().await;
                players.iter().map(|(id, p)| (*id, p.clone())).collect()
            };
            for (id, player) in roster {
                transport::send_message(&mut writer, &ServerMessage::AcceptedPlayer { id, player })
                    .await?;
            }
            self.peers
                .insert(PeerSlot::new(writer, addr.to_string()))
                .await
                .ok_or_else(no_room)
        } else {
            let players = self.players.read().await.clone();
            let history = self.history.read().await;
            transport::send_message(&mut writer, &ServerMessage::GameStarted { players }).await?;
            transport::send_bytes(&mut writer, &history).await?;
            debug!("replayed {} bytes of turn history to {addr}", history.len());
            self.peers
                .insert(PeerSlot::new(writer, addr.to_string()))
                .await
                .ok_or_else(no_room)
        }
    }

    /// One task per connection: hail, then decode client messages until
    /// the socket dies or sends garbage.
    async fn handle_peer(
        self,
        stream: TcpStream,
        addr: SocketAddr,
        join_tx: mpsc::UnboundedSender<JoinOffer>,
    ) {
        let addr = addr.to_string();
        let (read_half, write_half) = stream.into_split();
        let mut messages = MessageStream::new(read_half);

        let index = match self.hail(write_half, &addr).await {
            Ok(index) => index,
            Err(err) => {
                debug!("failed to hail {addr}: {err}");
                self.peers.remove_connection();
                return;
            }
        };

        loop {
            match messages.recv::<ClientMessage>().await {
                Ok(msg) => self.dispatch(index, msg, &addr, &join_tx).await,
                Err(err) => {
                    debug!("peer {addr}: {err}");
                    break;
                }
            }
        }

        self.teardown(index, &addr).await;
    }

    async fn dispatch(
        &self,
        index: usize,
        msg: ClientMessage,
        addr: &str,
        join_tx: &mpsc::UnboundedSender<JoinOffer>,
    ) {
        match msg {
            ClientMessage::Join { name } => {
                let not_in_game = {
                    let guard = self.peers.lock(index).await;
                    guard.as_ref().is_some_and(|slot| !slot.in_game)
                };
                if not_in_game && self.in_lobby() {
                    debug!("peer {addr} offers to join as \"{name}\"");
                    let player = Player {
                        name,
                        address: addr.to_string(),
                    };
                    // The admission task re-checks conditions before
                    // accepting; a send error just means shutdown.
                    let _ = join_tx.send((index, player));
                }
            }
            action => {
                // Stray moves in lobby must not leak into the first
                // turn, so they are dropped here rather than stored.
                if !self.in_lobby() {
                    let mut guard = self.peers.lock(index).await;
                    if let Some(slot) = guard.as_mut() {
                        slot.pending = Some(action);
                    }
                }
            }
        }
    }

    async fn teardown(&self, index: usize, addr: &str) {
        let player_id = self.peers.lock(index).await.as_ref().and_then(|s| s.player_id);
        if let Some(id) = player_id {
            // The seat stays in the roster and keeps scoring; only the
            // connection goes away.
            self.playing.lock().await.remove(&id);
            info!("player {id} lost their connection, seat stays in the game");
        }
        self.peers.vacate(index).await;
        self.peers.remove_connection();
        info!("peer {addr} disconnected");
    }

    /// Admission task: consumes join offers, seats players while the
    /// lobby lasts, announces each acceptance and starts the game once
    /// the roster is full.
    async fn join_handler(self, mut join_rx: mpsc::UnboundedReceiver<JoinOffer>) {
        while let Some((index, player)) = join_rx.recv().await {
            if !self.in_lobby() {
                continue;
            }

            let mut accepted = None;
            {
                let mut guard = self.peers.lock(index).await;
                if let Some(slot) = guard.as_mut() {
                    if !slot.in_game {
                        let mut players = self.players.write().await;
                        if let Some(id) = lowest_free_id(&players) {
                            players.insert(id, player.clone());
                            drop(players);
                            self.playing.lock().await.insert(id, index);
                            slot.in_game = true;
                            slot.player_id = Some(id);
                            accepted = Some(id);
                        }
                    }
                }
            }

            let Some(id) = accepted else { continue };
            info!("accepted {}@{} as player {id}", player.name, player.address);
            if let Some(bytes) = encode_or_log(&ServerMessage::AcceptedPlayer { id, player }) {
                self.peers.broadcast(&bytes).await;
            }

            let roster_full =
                self.players.read().await.len() >= usize::from(self.config.players_count);
            if roster_full {
                info!("roster complete, waking the game master");
                self.lobby.store(false, Ordering::SeqCst);
                self.game_start.notify_one();
            }
        }
    }

    /// The game master: sleeps through the lobby, then drives one game
    /// per wakeup on a fixed tick.
    async fn game_master(self) {
        let mut game = GameState::new((*self.config).clone());
        loop {
            loop {
                let started = self.game_start.notified();
                if !self.in_lobby() {
                    break;
                }
                started.await;
            }

            let roster = self.players.read().await.clone();
            info!("game on: {} players", roster.len());
            let turn0 = game.start_game(roster.keys().copied());
            {
                let mut history = self.history.write().await;
                history.clear();
                if let Some(bytes) = encode_or_log(&ServerMessage::GameStarted { players: roster })
                {
                    self.peers.broadcast(&bytes).await;
                }
                if let Some(bytes) = encode_or_log(&turn0) {
                    history.extend_from_slice(&bytes);
                    self.peers.broadcast(&bytes).await;
                }
            }

            for turn in 1..self.config.game_length {
                sleep(Duration::from_millis(self.config.turn_duration_ms)).await;

                let mut events = game.begin_turn();
                self.gather_moves(&mut game, &mut events).await;
                let msg = game.finish_turn(turn, events);
                if let ServerMessage::Turn { events, .. } = &msg {
                    debug!("turn {turn}: broadcasting {} events", events.len());
                }
                if let Some(bytes) = encode_or_log(&msg) {
                    let mut history = self.history.write().await;
                    history.extend_from_slice(&bytes);
                    self.peers.broadcast(&bytes).await;
                }
            }

            self.end_game(game.scores().clone()).await;
        }
    }

    /// Collects every playing seat's pending message in ascending id
    /// order and applies it to the simulation.
    async fn gather_moves(&self, game: &mut GameState, events: &mut Vec<Event>) {
        let playing = self.playing.lock().await;
        for (&id, &index) in playing.iter() {
            let action = {
                let mut guard = self.peers.lock(index).await;
                match guard.as_mut() {
                    Some(slot) => slot.pending.take(),
                    None => {
                        debug!("player {id} has no live peer this turn");
                        None
                    }
                }
            };
            let Some(action) = action else {
                debug!("player {id} made no move this turn");
                continue;
            };
            if let Some(event) = game.apply_player_action(id, &action) {
                events.push(event);
            }
        }
    }

    async fn end_game(&self, scores: BTreeMap<PlayerId, u32>) {
        {
            let players = self.players.read().await;
            info!("game ended");
            for (id, score) in &scores {
                if let Some(player) = players.get(id) {
                    info!(
                        "  player {id}: {}@{} got killed {score} times",
                        player.name, player.address
                    );
                }
            }
        }

        if let Some(bytes) = encode_or_log(&ServerMessage::GameEnded { scores }) {
            self.peers.broadcast(&bytes).await;
        }

        self.players.write().await.clear();
        self.playing.lock().await.clear();
        self.history.write().await.clear();
        self.peers.reset_in_game().await;
        self.lobby.store(true, Ordering::SeqCst);
    }
}
