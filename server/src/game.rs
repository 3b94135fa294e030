//! Authoritative game simulation.
//!
//! [`GameState`] owns every piece of game-scoped data: player positions,
//! live bombs, blocks, scores and the per-turn transients. It is a pure
//! state machine with no sockets; the network layer feeds it pending
//! player actions and broadcasts the [`ServerMessage::Turn`] values it
//! returns. That split keeps the whole turn pipeline testable without a
//! single connection.
//!
//! A turn is produced in three phases, mirroring the protocol order:
//! [`GameState::begin_turn`] (bomb timers and explosions),
//! [`GameState::apply_player_action`] once per playing seat in ascending
//! id order, and [`GameState::finish_turn`] (respawns, then the commit
//! of scores and destroyed blocks).

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use log::debug;
use shared::messages::{ClientMessage, Event, ServerMessage};
use shared::types::{Bomb, BombId, Direction, PlayerId, Position};

use crate::config::ServerConfig;
use crate::rng::Lcg;

/// The server's authoritative view of the board.
pub struct GameState {
    config: ServerConfig,
    rng: Lcg,
    positions: BTreeMap<PlayerId, Position>,
    bombs: BTreeMap<BombId, Bomb>,
    scores: BTreeMap<PlayerId, u32>,
    blocks: BTreeSet<Position>,
    killed_this_turn: BTreeSet<PlayerId>,
    destroyed_this_turn: BTreeSet<Position>,
    // Never reset between bombs within a game, so ids are strictly
    // increasing even after earlier bombs exploded.
    next_bomb_id: BombId,
}

impl GameState {
    pub fn new(config: ServerConfig) -> Self {
        let rng = Lcg::new(config.seed);
        Self {
            config,
            rng,
            positions: BTreeMap::new(),
            bombs: BTreeMap::new(),
            scores: BTreeMap::new(),
            blocks: BTreeSet::new(),
            killed_this_turn: BTreeSet::new(),
            destroyed_this_turn: BTreeSet::new(),
            next_bomb_id: 0,
        }
    }

    pub fn scores(&self) -> &BTreeMap<PlayerId, u32> {
        &self.scores
    }

    /// One random cell. Draw order (x before y) is observable through
    /// turn 0 and must not change.
    fn draw_position(&mut self) -> Position {
        let x = (self.rng.next_value() % u32::from(self.config.size_x)) as u16;
        let y = (self.rng.next_value() % u32::from(self.config.size_y)) as u16;
        Position::new(x, y)
    }

    /// Clears all game-scoped state and builds turn 0: one spawn per
    /// player in ascending id order, then the initial blocks.
    pub fn start_game<I>(&mut self, player_ids: I) -> ServerMessage
    where
        I: IntoIterator<Item = PlayerId>,
    {
        self.positions.clear();
        self.bombs.clear();
        self.scores.clear();
        self.blocks.clear();
        self.killed_this_turn.clear();
        self.destroyed_this_turn.clear();
        self.next_bomb_id = 0;

        let mut events = Vec::new();
        for id in player_ids {
            self.scores.insert(id, 0);
            let position = self.draw_position();
            debug!("spawning player {id} at ({}, {})", position.x, position.y);
            self.positions.insert(id, position);
            events.push(Event::PlayerMoved { id, position });
        }

        for _ in 0..self.config.initial_blocks {
            let position = self.draw_position();
            self.blocks.insert(position);
            events.push(Event::BlockPlaced { position });
        }

        ServerMessage::Turn { turn: 0, events }
    }

    /// Opens a new turn: resets the per-turn transients, ticks every
    /// bomb in ascending id order and detonates the ones that reach
    /// zero. Exploded bombs leave the map for good.
    pub fn begin_turn(&mut self) -> Vec<Event> {
        self.killed_this_turn.clear();
        self.destroyed_this_turn.clear();

        let mut events = Vec::new();
        let bomb_ids: Vec<BombId> = self.bombs.keys().copied().collect();
        for id in bomb_ids {
            let exploded_at = self.bombs.get_mut(&id).and_then(|bomb| {
                bomb.timer = bomb.timer.saturating_sub(1);
                (bomb.timer == 0).then_some(bomb.position)
            });

            if let Some(position) = exploded_at {
                let (killed, blocks_destroyed) = self.explode(position);
                self.bombs.remove(&id);
                events.push(Event::BombExploded {
                    id,
                    killed,
                    blocks_destroyed,
                });
            }
        }
        events
    }

    /// Walks the four explosion rays from `origin`, recording kills and
    /// destroyed blocks both in the event payload and in the per-turn
    /// transients.
    fn explode(&mut self, origin: Position) -> (BTreeSet<PlayerId>, BTreeSet<Position>) {
        let mut killed = BTreeSet::new();
        let mut blocks_destroyed = BTreeSet::new();

        for dir in Direction::ALL {
            let mut pos = origin;
            // Origin cell included, then up to explosion_radius steps.
            for _ in 0..=self.config.explosion_radius {
                for (&id, &player_pos) in &self.positions {
                    if player_pos == pos {
                        killed.insert(id);
                        self.killed_this_turn.insert(id);
                    }
                }

                // A block absorbs the blast: destroyed, ray ends here.
                if self.blocks.contains(&pos) {
                    blocks_destroyed.insert(pos);
                    self.destroyed_this_turn.insert(pos);
                    break;
                }

                match pos.step(dir, self.config.size_x, self.config.size_y) {
                    Some(next) => pos = next,
                    None => break,
                }
            }
        }

        (killed, blocks_destroyed)
    }

    /// Applies one seat's pending message. Players killed this turn sit
    /// the move out (their respawn comes from [`Self::finish_turn`]).
    pub fn apply_player_action(&mut self, id: PlayerId, action: &ClientMessage) -> Option<Event> {
        if self.killed_this_turn.contains(&id) {
            return None;
        }
        let position = *self.positions.get(&id)?;

        match action {
            // Join is handled by admission, never stored as a move.
            ClientMessage::Join { .. } => None,
            ClientMessage::PlaceBomb => {
                let bomb_id = self.next_bomb_id;
                self.next_bomb_id += 1;
                self.bombs.insert(
                    bomb_id,
                    Bomb {
                        position,
                        timer: self.config.bomb_timer,
                    },
                );
                Some(Event::BombPlaced {
                    id: bomb_id,
                    position,
                })
            }
            ClientMessage::PlaceBlock => {
                // Idempotent on the wire, but only a fresh insertion is
                // worth announcing.
                self.blocks
                    .insert(position)
                    .then_some(Event::BlockPlaced { position })
            }
            ClientMessage::Move { direction } => {
                let next = position
                    .step(*direction, self.config.size_x, self.config.size_y)
                    .filter(|next| !self.blocks.contains(next))?;
                self.positions.insert(id, next);
                Some(Event::PlayerMoved { id, position: next })
            }
        }
    }

    /// Closes the turn: respawns this turn's victims in ascending id
    /// order, then commits scores and block destruction before the turn
    /// is serialised.
    pub fn finish_turn(&mut self, turn: u16, mut events: Vec<Event>) -> ServerMessage {
        let killed: Vec<PlayerId> = self.killed_this_turn.iter().copied().collect();
        for id in killed {
            let position = self.draw_position();
            debug!("player {id} died, respawning at ({}, {})", position.x, position.y);
            self.positions.insert(id, position);
            events.push(Event::PlayerMoved { id, position });
        }

        for id in &self.killed_this_turn {
            *self.scores.entry(*id).or_insert(0) += 1;
        }
        for position in mem::take(&mut self.destroyed_this_turn) {
            self.blocks.remove(&position);
        }

        ServerMessage::Turn { turn, events }
    }

    #[cfg(test)]
    fn position_of(&self, id: PlayerId) -> Option<Position> {
        self.positions.get(&id).copied()
    }

    #[cfg(test)]
    fn set_board(&mut self, positions: &[(PlayerId, Position)], blocks: &[Position]) {
        self.positions = positions.iter().copied().collect();
        self.scores = positions.iter().map(|&(id, _)| (id, 0)).collect();
        self.blocks = blocks.iter().copied().collect();
    }
}
