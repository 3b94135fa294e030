//! Typed messages for all four protocol directions.
//!
//! Four independent tagged sums travel on the two transports:
//!
//! - [`ClientMessage`]: client -> server, on the TCP stream.
//! - [`ServerMessage`]: server -> client, on the TCP stream.
//! - [`InputMessage`]: display peer -> client, one per datagram.
//! - [`DisplayMessage`]: client -> display peer, one per datagram.
//!
//! Each sum has its own one-byte tag space, numbered in declaration
//! order. Closed enums keep dispatch exhaustive at compile time.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Bomb, BombId, Direction, Player, PlayerId, Position, Score};
use crate::wire::{Decode, Encode, Reader, WireError, WireResult, Writer};

/// What a client asks the server to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Join { name: String },
    PlaceBomb,
    PlaceBlock,
    Move { direction: Direction },
}

impl Encode for ClientMessage {
    fn encode(&self, w: &mut Writer) -> WireResult<()> {
        match self {
            ClientMessage::Join { name } => {
                w.put_u8(0);
                name.encode(w)
            }
            ClientMessage::PlaceBomb => {
                w.put_u8(1);
                Ok(())
            }
            ClientMessage::PlaceBlock => {
                w.put_u8(2);
                Ok(())
            }
            ClientMessage::Move { direction } => {
                w.put_u8(3);
                direction.encode(w)
            }
        }
    }
}

impl Decode for ClientMessage {
    fn decode(r: &mut Reader<'_>) -> WireResult<Self> {
        match r.u8()? {
            0 => Ok(ClientMessage::Join {
                name: String::decode(r)?,
            }),
            1 => Ok(ClientMessage::PlaceBomb),
            2 => Ok(ClientMessage::PlaceBlock),
            3 => Ok(ClientMessage::Move {
                direction: Direction::decode(r)?,
            }),
            tag => Err(WireError::UnknownTag {
                context: "ClientMessage",
                tag,
            }),
        }
    }
}

/// One observable change to the board within a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BombPlaced {
        id: BombId,
        position: Position,
    },
    BombExploded {
        id: BombId,
        killed: BTreeSet<PlayerId>,
        blocks_destroyed: BTreeSet<Position>,
    },
    PlayerMoved {
        id: PlayerId,
        position: Position,
    },
    BlockPlaced {
        position: Position,
    },
}

impl Encode for Event {
    fn encode(&self, w: &mut Writer) -> WireResult<()> {
        match self {
            Event::BombPlaced { id, position } => {
                w.put_u8(0);
                w.put_u32(*id);
                position.encode(w)
            }
            Event::BombExploded {
                id,
                killed,
                blocks_destroyed,
            } => {
                w.put_u8(1);
                w.put_u32(*id);
                killed.encode(w)?;
                blocks_destroyed.encode(w)
            }
            Event::PlayerMoved { id, position } => {
                w.put_u8(2);
                w.put_u8(*id);
                position.encode(w)
            }
            Event::BlockPlaced { position } => {
                w.put_u8(3);
                position.encode(w)
            }
        }
    }
}

impl Decode for Event {
    fn decode(r: &mut Reader<'_>) -> WireResult<Self> {
        match r.u8()? {
            0 => Ok(Event::BombPlaced {
                id: r.u32()?,
                position: Position::decode(r)?,
            }),
            1 => Ok(Event::BombExploded {
                id: r.u32()?,
                killed: BTreeSet::decode(r)?,
                blocks_destroyed: BTreeSet::decode(r)?,
            }),
            2 => Ok(Event::PlayerMoved {
                id: r.u8()?,
                position: Position::decode(r)?,
            }),
            3 => Ok(Event::BlockPlaced {
                position: Position::decode(r)?,
            }),
            tag => Err(WireError::UnknownTag {
                context: "Event",
                tag,
            }),
        }
    }
}

/// What the server tells every connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Hello {
        server_name: String,
        players_count: u8,
        size_x: u16,
        size_y: u16,
        game_length: u16,
        explosion_radius: u16,
        bomb_timer: u16,
    },
    AcceptedPlayer {
        id: PlayerId,
        player: Player,
    },
    GameStarted {
        players: BTreeMap<PlayerId, Player>,
    },
    Turn {
        turn: u16,
        events: Vec<Event>,
    },
    GameEnded {
        scores: BTreeMap<PlayerId, Score>,
    },
}

impl Encode for ServerMessage {
    fn encode(&self, w: &mut Writer) -> WireResult<()> {
        match self {
            ServerMessage::Hello {
                server_name,
                players_count,
                size_x,
                size_y,
                game_length,
                explosion_radius,
                bomb_timer,
            } => {
                w.put_u8(0);
                server_name.encode(w)?;
                w.put_u8(*players_count);
                w.put_u16(*size_x);
                w.put_u16(*size_y);
                w.put_u16(*game_length);
                w.put_u16(*explosion_radius);
                w.put_u16(*bomb_timer);
                Ok(())
            }
            ServerMessage::AcceptedPlayer { id, player } => {
                w.put_u8(1);
                w.put_u8(*id);
                player.encode(w)
            }
            ServerMessage::GameStarted { players } => {
                w.put_u8(2);
                players.encode(w)
            }
            ServerMessage::Turn { turn, events } => {
                w.put_u8(3);
                w.put_u16(*turn);
                events.encode(w)
            }
            ServerMessage::GameEnded { scores } => {
                w.put_u8(4);
                scores.encode(w)
            }
        }
    }
}

impl Decode for ServerMessage {
    fn decode(r: &mut Reader<'_>) -> WireResult<Self> {
        match r.u8()? {
            0 => Ok(ServerMessage::Hello {
                server_name: String::decode(r)?,
                players_count: r.u8()?,
                size_x: r.u16()?,
                size_y: r.u16()?,
                game_length: r.u16()?,
                explosion_radius: r.u16()?,
                bomb_timer: r.u16()?,
            }),
            1 => Ok(ServerMessage::AcceptedPlayer {
                id: r.u8()?,
                player: Player::decode(r)?,
            }),
            2 => Ok(ServerMessage::GameStarted {
                players: BTreeMap::decode(r)?,
            }),
            3 => Ok(ServerMessage::Turn {
                turn: r.u16()?,
                events: Vec::decode(r)?,
            }),
            4 => Ok(ServerMessage::GameEnded {
                scores: BTreeMap::decode(r)?,
            }),
            tag => Err(WireError::UnknownTag {
                context: "ServerMessage",
                tag,
            }),
        }
    }
}

/// The pre-game projection shown by the display peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lobby {
    pub server_name: String,
    pub players_count: u8,
    pub size_x: u16,
    pub size_y: u16,
    pub game_length: u16,
    pub explosion_radius: u16,
    pub bomb_timer: u16,
    pub players: BTreeMap<PlayerId, Player>,
}

/// The in-game projection shown by the display peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub server_name: String,
    pub size_x: u16,
    pub size_y: u16,
    pub game_length: u16,
    pub turn: u16,
    pub players: BTreeMap<PlayerId, Player>,
    pub player_positions: BTreeMap<PlayerId, Position>,
    pub blocks: BTreeSet<Position>,
    pub bombs: Vec<Bomb>,
    pub explosions: BTreeSet<Position>,
    pub scores: BTreeMap<PlayerId, Score>,
}

/// What the client shows its display peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayMessage {
    Lobby(Lobby),
    Game(Game),
}

impl Encode for DisplayMessage {
    fn encode(&self, w: &mut Writer) -> WireResult<()> {
        match self {
            DisplayMessage::Lobby(lobby) => {
                w.put_u8(0);
                lobby.server_name.encode(w)?;
                w.put_u8(lobby.players_count);
                w.put_u16(lobby.size_x);
                w.put_u16(lobby.size_y);
                w.put_u16(lobby.game_length);
                w.put_u16(lobby.explosion_radius);
                w.put_u16(lobby.bomb_timer);
                lobby.players.encode(w)
            }
            DisplayMessage::Game(game) => {
                w.put_u8(1);
                game.server_name.encode(w)?;
                w.put_u16(game.size_x);
                w.put_u16(game.size_y);
                w.put_u16(game.game_length);
                w.put_u16(game.turn);
                game.players.encode(w)?;
                game.player_positions.encode(w)?;
                game.blocks.encode(w)?;
                game.bombs.encode(w)?;
                game.explosions.encode(w)?;
                game.scores.encode(w)
            }
        }
    }
}

impl Decode for DisplayMessage {
    fn decode(r: &mut Reader<'_>) -> WireResult<Self> {
        match r.u8()? {
            0 => Ok(DisplayMessage::Lobby(Lobby {
                server_name: String::decode(r)?,
                players_count: r.u8()?,
                size_x: r.u16()?,
                size_y: r.u16()?,
                game_length: r.u16()?,
                explosion_radius: r.u16()?,
                bomb_timer: r.u16()?,
                players: BTreeMap::decode(r)?,
            })),
            1 => Ok(DisplayMessage::Game(Game {
                server_name: String::decode(r)?,
                size_x: r.u16()?,
                size_y: r.u16()?,
                game_length: r.u16()?,
                turn: r.u16()?,
                players: BTreeMap::decode(r)?,
                player_positions: BTreeMap::decode(r)?,
                blocks: BTreeSet::decode(r)?,
                bombs: Vec::decode(r)?,
                explosions: BTreeSet::decode(r)?,
                scores: BTreeMap::decode(r)?,
            })),
            tag => Err(WireError::UnknownTag {
                context: "DisplayMessage",
                tag,
            }),
        }
    }
}

/// What the display peer asks the client to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMessage {
    PlaceBomb,
    PlaceBlock,
    Move { direction: Direction },
}

impl Encode for InputMessage {
    fn encode(&self, w: &mut Writer) -> WireResult<()> {
        match self {
            InputMessage::PlaceBomb => {
                w.put_u8(0);
                Ok(())
            }
            InputMessage::PlaceBlock => {
                w.put_u8(1);
                Ok(())
            }
            InputMessage::Move { direction } => {
                w.put_u8(2);
                direction.encode(w)
            }
        }
    }
}

impl Decode for InputMessage {
    fn decode(r: &mut Reader<'_>) -> WireResult<Self> {
        match r.u8()? {
            0 => Ok(InputMessage::PlaceBomb),
            1 => Ok(InputMessage::PlaceBlock),
            2 => Ok(InputMessage::Move {
                direction: Direction::decode(r)?,
            }),
            tag => Err(WireError::UnknownTag {
                context: "InputMessage",
                tag,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{decode_exact, encode_to_vec};

    fn roundtrip<T: Encode + Decode + PartialEq + std::fmt::Debug>(value: T) {
        let bytes = encode_to_vec(&value).unwrap();
        let back: T = decode_exact(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn join_wire_image() {
        let msg = ClientMessage::Join {
            name: "A".to_string(),
        };
        assert_eq!(encode_to_vec(&msg).unwrap(), vec![0x00, 0x01, 0x41]);
    }

    #[test]
    fn move_wire_image() {
        let msg = ClientMessage::Move {
            direction: Direction::Left,
        };
        assert_eq!(encode_to_vec(&msg).unwrap(), vec![0x03, 0x03]);
    }

    #[test]
    fn placebomb_and_placeblock_are_bare_tags() {
        assert_eq!(encode_to_vec(&ClientMessage::PlaceBomb).unwrap(), vec![1]);
        assert_eq!(encode_to_vec(&ClientMessage::PlaceBlock).unwrap(), vec![2]);
    }

    #[test]
    fn client_message_roundtrips() {
        roundtrip(ClientMessage::Join {
            name: "bomber".to_string(),
        });
        roundtrip(ClientMessage::PlaceBomb);
        roundtrip(ClientMessage::PlaceBlock);
        roundtrip(ClientMessage::Move {
            direction: Direction::Up,
        });
    }

    #[test]
    fn client_message_rejects_unknown_tag() {
        let err = decode_exact::<ClientMessage>(&[9]).unwrap_err();
        assert!(matches!(
            err,
            WireError::UnknownTag {
                context: "ClientMessage",
                tag: 9
            }
        ));
    }

    #[test]
    fn hello_wire_image() {
        let msg = ServerMessage::Hello {
            server_name: "gx".to_string(),
            players_count: 2,
            size_x: 3,
            size_y: 4,
            game_length: 5,
            explosion_radius: 6,
            bomb_timer: 7,
        };
        assert_eq!(
            encode_to_vec(&msg).unwrap(),
            vec![0, 2, b'g', b'x', 2, 0, 3, 0, 4, 0, 5, 0, 6, 0, 7]
        );
    }

    #[test]
    fn turn_with_events_roundtrips() {
        let msg = ServerMessage::Turn {
            turn: 3,
            events: vec![
                Event::BombPlaced {
                    id: 0,
                    position: Position::new(1, 1),
                },
                Event::BombExploded {
                    id: 0,
                    killed: BTreeSet::from([1u8, 2]),
                    blocks_destroyed: BTreeSet::from([Position::new(2, 1)]),
                },
                Event::PlayerMoved {
                    id: 1,
                    position: Position::new(0, 0),
                },
                Event::BlockPlaced {
                    position: Position::new(2, 2),
                },
            ],
        };
        roundtrip(msg);
    }

    #[test]
    fn bomb_exploded_wire_image() {
        let ev = Event::BombExploded {
            id: 7,
            killed: BTreeSet::from([3u8]),
            blocks_destroyed: BTreeSet::new(),
        };
        assert_eq!(
            encode_to_vec(&ev).unwrap(),
            vec![1, 0, 0, 0, 7, 0, 0, 0, 1, 3, 0, 0, 0, 0]
        );
    }

    #[test]
    fn server_message_roundtrips() {
        let player = Player {
            name: "a".to_string(),
            address: "127.0.0.1:1".to_string(),
        };
        roundtrip(ServerMessage::AcceptedPlayer {
            id: 0,
            player: player.clone(),
        });
        roundtrip(ServerMessage::GameStarted {
            players: BTreeMap::from([(0u8, player)]),
        });
        roundtrip(ServerMessage::GameEnded {
            scores: BTreeMap::from([(0u8, 4u32), (1, 0)]),
        });
    }

    #[test]
    fn display_message_roundtrips() {
        let player = Player {
            name: "a".to_string(),
            address: "[::1]:1".to_string(),
        };
        roundtrip(DisplayMessage::Lobby(Lobby {
            server_name: "srv".to_string(),
            players_count: 2,
            size_x: 10,
            size_y: 10,
            game_length: 100,
            explosion_radius: 3,
            bomb_timer: 5,
            players: BTreeMap::from([(0u8, player.clone())]),
        }));
        roundtrip(DisplayMessage::Game(Game {
            server_name: "srv".to_string(),
            size_x: 10,
            size_y: 10,
            game_length: 100,
            turn: 17,
            players: BTreeMap::from([(0u8, player)]),
            player_positions: BTreeMap::from([(0u8, Position::new(4, 5))]),
            blocks: BTreeSet::from([Position::new(1, 1)]),
            bombs: vec![Bomb {
                position: Position::new(2, 2),
                timer: 3,
            }],
            explosions: BTreeSet::from([Position::new(2, 2)]),
            scores: BTreeMap::from([(0u8, 1u32)]),
        }));
    }

    #[test]
    fn input_message_tags() {
        assert_eq!(encode_to_vec(&InputMessage::PlaceBomb).unwrap(), vec![0]);
        assert_eq!(encode_to_vec(&InputMessage::PlaceBlock).unwrap(), vec![1]);
        assert_eq!(
            encode_to_vec(&InputMessage::Move {
                direction: Direction::Right
            })
            .unwrap(),
            vec![2, 1]
        );
    }

    #[test]
    fn input_message_rejects_bad_direction() {
        let err = decode_exact::<InputMessage>(&[2, 4]).unwrap_err();
        assert!(matches!(
            err,
            WireError::UnknownTag {
                context: "Direction",
                tag: 4
            }
        ));
    }

    #[test]
    fn decoding_consumes_exactly_one_message() {
        let msg = ClientMessage::Join {
            name: "ab".to_string(),
        };
        let mut bytes = encode_to_vec(&msg).unwrap();
        let expected = bytes.len();
        bytes.extend([0xde, 0xad]);

        let mut r = crate::wire::Reader::new(&bytes);
        let back = ClientMessage::decode(&mut r).unwrap();
        assert_eq!(back, msg);
        assert_eq!(r.consumed(), expected);
        assert_eq!(r.available(), 2);
    }

    #[test]
    fn truncated_turn_is_eof_not_panic() {
        let msg = ServerMessage::Turn {
            turn: 1,
            events: vec![Event::BlockPlaced {
                position: Position::new(9, 9),
            }],
        };
        let bytes = encode_to_vec(&msg).unwrap();
        for cut in 0..bytes.len() {
            let err = decode_exact::<ServerMessage>(&bytes[..cut]).unwrap_err();
            assert!(
                matches!(err, WireError::UnexpectedEof { .. }),
                "cut at {cut} gave {err:?}"
            );
        }
    }
}
