//! # Bomberperson Client Library
//!
//! The client is a bridge: it speaks the binary TCP protocol with the
//! game server on one side and exchanges one-message datagrams with a
//! display/input peer on the other. It holds no authority; the
//! [`game`] module only aggregates what the server said into a view the
//! display peer can draw, and [`network`] moves bytes.

pub mod game;
pub mod network;
