//! # Bomberperson Server Library
//!
//! Authoritative implementation of the turn-based bomberperson game.
//! The server owns the only true copy of the board: clients send
//! intents, the simulation decides what actually happened, and every
//! connected peer receives the same ordered list of per-turn events.
//!
//! ## Module Organization
//!
//! - [`config`]: the immutable parameters of one server run.
//! - [`rng`]: the linear congruential generator behind all board
//!   placement, kept bit-compatible so turn 0 is reproducible from the
//!   seed alone.
//! - [`game`]: the pure turn simulation (bombs, moves, respawns,
//!   scores), free of any networking.
//! - [`client_manager`]: the fixed-capacity peer slot table with
//!   per-slot locking and fan-out.
//! - [`network`]: the task structure that ties it together: acceptor,
//!   per-peer receive loops, join admission and the game master.
//!
//! ## Lifecycle
//!
//! The server cycles between a lobby, where joins are admitted until
//! `players_count` seats are filled, and a game of `game_length` turns
//! broadcast on a fixed cadence. Peers may connect at any moment; a
//! peer arriving mid-game receives a full replay of the current game's
//! turns and can join once the next lobby opens.

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod rng;
