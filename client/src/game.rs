//! Client-side reconciliation of server events into display projections.
//!
//! The client never simulates ahead: it folds the server's event stream
//! into a [`DisplayMessage`] projection (Lobby before a game, Game
//! during one) and ships a fresh snapshot to the display peer after
//! almost every server message. The interesting work is in the `Turn`
//! handler, which has to reconstruct explosion geometry locally: the
//! wire only says *which* bombs went off and *which* blocks died, the
//! burning cells are recomputed here against the previous turn's
//! blocks.
//!
//! Everything in this module is pure state; sockets live in
//! [`crate::network`].

use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};
use shared::messages::{
    ClientMessage, DisplayMessage, Event, Game, InputMessage, Lobby, ServerMessage,
};
use shared::types::{Bomb, BombId, PlayerId, Position};

/// The immutable per-server parameters captured from `Hello`.
#[derive(Debug, Clone)]
struct HelloParams {
    server_name: String,
    players_count: u8,
    size_x: u16,
    size_y: u16,
    game_length: u16,
    explosion_radius: u16,
    bomb_timer: u16,
}

impl HelloParams {
    fn empty_lobby(&self) -> Lobby {
        Lobby {
            server_name: self.server_name.clone(),
            players_count: self.players_count,
            size_x: self.size_x,
            size_y: self.size_y,
            game_length: self.game_length,
            explosion_radius: self.explosion_radius,
            bomb_timer: self.bomb_timer,
            players: BTreeMap::new(),
        }
    }

    fn fresh_game(&self, players: BTreeMap<PlayerId, shared::types::Player>) -> Game {
        let scores = players.keys().map(|&id| (id, 0)).collect();
        Game {
            server_name: self.server_name.clone(),
            size_x: self.size_x,
            size_y: self.size_y,
            game_length: self.game_length,
            turn: 0,
            players,
            player_positions: BTreeMap::new(),
            blocks: BTreeSet::new(),
            bombs: Vec::new(),
            explosions: BTreeSet::new(),
            scores,
        }
    }
}

/// Walks the four blast rays from `origin`, collecting burning cells.
/// A cell that held a block (in the *previous* turn's block set) is
/// itself included but ends its ray.
fn spread_explosion(
    origin: Position,
    old_blocks: &BTreeSet<Position>,
    radius: u16,
    size_x: u16,
    size_y: u16,
    explosions: &mut BTreeSet<Position>,
) {
    for dir in shared::types::Direction::ALL {
        let mut pos = origin;
        for _ in 0..=radius {
            explosions.insert(pos);
            if old_blocks.contains(&pos) {
                break;
            }
            match pos.step(dir, size_x, size_y) {
                Some(next) => pos = next,
                None => break,
            }
        }
    }
}

/// Aggregated client state: the projection plus the bookkeeping the
/// projection alone cannot carry.
pub struct GameState {
    params: Option<HelloParams>,
    view: Option<DisplayMessage>,
    /// Active bombs with their live timers, keyed by server id.
    pending_bombs: BTreeMap<BombId, Bomb>,
    killed_this_turn: BTreeSet<PlayerId>,
    /// True whenever the next valid input should become `Join` instead
    /// of a move. Re-armed every time we fall back to the lobby.
    join_pending: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            params: None,
            view: None,
            pending_bombs: BTreeMap::new(),
            killed_this_turn: BTreeSet::new(),
            join_pending: true,
        }
    }

    fn in_game(&self) -> bool {
        matches!(self.view, Some(DisplayMessage::Game(_)))
    }

    /// Applies one server message. Returns the projection to forward to
    /// the display peer, or `None` when nothing should be sent (only
    /// right after `GameStarted`, whose board arrives with turn 0).
    pub fn apply(&mut self, msg: ServerMessage) -> Option<DisplayMessage> {
        match msg {
            ServerMessage::Hello {
                server_name,
                players_count,
                size_x,
                size_y,
                game_length,
                explosion_radius,
                bomb_timer,
            } => {
                if self.in_game() {
                    warn!("ignoring stray Hello during a game");
                    return None;
                }
                let params = HelloParams {
                    server_name,
                    players_count,
                    size_x,
                    size_y,
                    game_length,
                    explosion_radius,
                    bomb_timer,
                };
                self.view = Some(DisplayMessage::Lobby(params.empty_lobby()));
                self.params = Some(params);
                self.pending_bombs.clear();
                self.killed_this_turn.clear();
            }

            ServerMessage::AcceptedPlayer { id, player } => match self.view.as_mut() {
                Some(DisplayMessage::Lobby(lobby)) => {
                    lobby.players.insert(id, player);
                }
                Some(DisplayMessage::Game(game)) => {
                    // The server never sends this mid-game, but the
                    // protocol does not forbid it; keep the roster and
                    // score domains in step and move on.
                    game.players.insert(id, player);
                    game.scores.entry(id).or_insert(0);
                }
                None => {
                    warn!("AcceptedPlayer before Hello, ignoring");
                    return None;
                }
            },

            ServerMessage::GameStarted { players } => {
                if self.in_game() {
                    warn!("ignoring stray GameStarted during a game");
                    return None;
                }
                let Some(params) = self.params.as_ref() else {
                    warn!("GameStarted before Hello, ignoring");
                    return None;
                };
                self.pending_bombs.clear();
                self.killed_this_turn.clear();
                self.view = Some(DisplayMessage::Game(params.fresh_game(players)));
                // The board is empty until turn 0 lands; nothing worth
                // showing yet.
                return None;
            }

            ServerMessage::Turn { turn, events } => {
                let Some(params) = self.params.clone() else {
                    warn!("Turn before Hello, ignoring");
                    return None;
                };
                self.ensure_game_view(&params);
                let Some(DisplayMessage::Game(game)) = self.view.as_mut() else {
                    return None;
                };

                game.explosions.clear();
                let old_blocks = game.blocks.clone();

                // Timers tick before the events land, matching the
                // server's pre-event decrement.
                for bomb in self.pending_bombs.values_mut() {
                    bomb.timer = bomb.timer.saturating_sub(1);
                }

                for event in events {
                    match event {
                        Event::BombPlaced { id, position } => {
                            self.pending_bombs.insert(
                                id,
                                Bomb {
                                    position,
                                    timer: params.bomb_timer,
                                },
                            );
                        }
                        Event::BombExploded {
                            id,
                            killed,
                            blocks_destroyed,
                        } => {
                            if let Some(bomb) = self.pending_bombs.remove(&id) {
                                spread_explosion(
                                    bomb.position,
                                    &old_blocks,
                                    params.explosion_radius,
                                    params.size_x,
                                    params.size_y,
                                    &mut game.explosions,
                                );
                            } else {
                                warn!("explosion of unknown bomb {id}");
                            }
                            self.killed_this_turn.extend(killed);
                            for position in blocks_destroyed {
                                game.blocks.remove(&position);
                                game.explosions.insert(position);
                            }
                        }
                        Event::PlayerMoved { id, position } => {
                            game.player_positions.insert(id, position);
                        }
                        Event::BlockPlaced { position } => {
                            game.blocks.insert(position);
                        }
                    }
                }

                // Initial placements are not explosions; turn 0 must
                // not flash.
                if turn == 0 {
                    game.explosions.clear();
                }
                game.turn = turn;
            }

            ServerMessage::GameEnded { scores } => {
                if let Some(DisplayMessage::Game(game)) = self.view.as_ref() {
                    info!("game ended, final scores:");
                    for (id, score) in &scores {
                        match game.players.get(id) {
                            Some(player) => info!(
                                "  player {id}: {}@{} got killed {score} times",
                                player.name, player.address
                            ),
                            None => info!("  player {id}: got killed {score} times"),
                        }
                    }
                }
                let Some(params) = self.params.as_ref() else {
                    warn!("GameEnded before Hello, ignoring");
                    return None;
                };
                self.view = Some(DisplayMessage::Lobby(params.empty_lobby()));
                self.pending_bombs.clear();
                self.killed_this_turn.clear();
                self.join_pending = true;
            }
        }

        self.refresh_projection();
        self.view.clone()
    }

    /// A `Turn` can arrive while the view is still a Lobby (a replayed
    /// game joined late, or a dropped `GameStarted`); convert in place,
    /// carrying the roster over with zeroed scores.
    fn ensure_game_view(&mut self, params: &HelloParams) {
        let needs_conversion = !self.in_game();
        if needs_conversion {
            let players = match self.view.take() {
                Some(DisplayMessage::Lobby(lobby)) => lobby.players,
                _ => BTreeMap::new(),
            };
            self.view = Some(DisplayMessage::Game(params.fresh_game(players)));
        }
    }

    /// Post-message bookkeeping on the Game projection: rebuild the
    /// bombs list from the pending map and turn this turn's kills into
    /// score increments.
    fn refresh_projection(&mut self) {
        if let Some(DisplayMessage::Game(game)) = self.view.as_mut() {
            game.bombs = self.pending_bombs.values().copied().collect();
            for id in std::mem::take(&mut self.killed_this_turn) {
                *game.scores.entry(id).or_insert(0) += 1;
            }
        }
    }

    /// Turns one display-peer input into the message for the server.
    ///
    /// The first valid input while unjoined becomes `Join`; further
    /// lobby inputs are swallowed; in-game inputs map one to one.
    pub fn process_input(&mut self, input: InputMessage, player_name: &str) -> Option<ClientMessage> {
        if self.join_pending {
            self.join_pending = false;
            return Some(ClientMessage::Join {
                name: player_name.to_string(),
            });
        }
        if !self.in_game() {
            return None;
        }
        Some(match input {
            InputMessage::PlaceBomb => ClientMessage::PlaceBomb,
            InputMessage::PlaceBlock => ClientMessage::PlaceBlock,
            InputMessage::Move { direction } => ClientMessage::Move { direction },
        })
    }
}
