//! # Shared Protocol Library
//!
//! Everything the bomberperson server and client must agree on lives
//! here: the binary wire codec, the domain types, the four message
//! families, and the framing disciplines for the two transports.
//!
//! ## Core Components
//!
//! - [`wire`]: deterministic big-endian codec with strict decoding
//!   rules. The [`wire::Encode`]/[`wire::Decode`] traits are the single
//!   source of truth for byte layout.
//! - [`types`]: grid positions, directions, players, bombs and the id
//!   aliases used across the protocol.
//! - [`messages`]: the tagged sums exchanged on the wire:
//!   [`messages::ClientMessage`], [`messages::ServerMessage`],
//!   [`messages::DisplayMessage`] and [`messages::InputMessage`].
//! - [`transport`]: stream reassembly for TCP and the datagram rules
//!   for UDP.
//!
//! ## Design Notes
//!
//! Wire-visible maps and sets are `BTreeMap`/`BTreeSet` so a value has
//! exactly one encoding; the codec round-trip tests rely on that.
//! Message enums are closed sums, keeping dispatch exhaustive when the
//! protocol grows a variant.

pub mod messages;
pub mod transport;
pub mod types;
pub mod wire;

pub use messages::{ClientMessage, DisplayMessage, Event, Game, InputMessage, Lobby, ServerMessage};
pub use transport::{MessageStream, TransportError, UDP_DATAGRAM_SIZE};
pub use types::{Bomb, BombId, Direction, Player, PlayerId, Position, Score};
pub use wire::{decode_exact, encode_to_vec, Decode, Encode, Reader, WireError, Writer};
