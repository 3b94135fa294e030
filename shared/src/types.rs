//! Domain types shared by every layer of the game.

use crate::wire::{Decode, Encode, Reader, WireError, WireResult, Writer};

/// Player identifier, assigned densely from 0 in join order.
pub type PlayerId = u8;

/// Bomb identifier, unique and strictly increasing within one game.
pub type BombId = u32;

/// Number of deaths a player has suffered this game.
pub type Score = u32;

/// A cell on the game grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub x: u16,
    pub y: u16,
}

impl Position {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step in `dir`, or `None` when that step
    /// would leave the `[0,size_x) x [0,size_y)` grid. `Up` is +y.
    pub fn step(self, dir: Direction, size_x: u16, size_y: u16) -> Option<Position> {
        let Position { x, y } = self;
        match dir {
            Direction::Up if y + 1 < size_y => Some(Position::new(x, y + 1)),
            Direction::Right if x + 1 < size_x => Some(Position::new(x + 1, y)),
            Direction::Down if y > 0 => Some(Position::new(x, y - 1)),
            Direction::Left if x > 0 => Some(Position::new(x - 1, y)),
            _ => None,
        }
    }
}

impl Encode for Position {
    fn encode(&self, w: &mut Writer) -> WireResult<()> {
        w.put_u16(self.x);
        w.put_u16(self.y);
        Ok(())
    }
}

impl Decode for Position {
    fn decode(r: &mut Reader<'_>) -> WireResult<Self> {
        let x = r.u16()?;
        let y = r.u16()?;
        Ok(Self { x, y })
    }
}

/// One of the four movement directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];
}

impl Encode for Direction {
    fn encode(&self, w: &mut Writer) -> WireResult<()> {
        w.put_u8(match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        });
        Ok(())
    }
}

impl Decode for Direction {
    fn decode(r: &mut Reader<'_>) -> WireResult<Self> {
        match r.u8()? {
            0 => Ok(Direction::Up),
            1 => Ok(Direction::Right),
            2 => Ok(Direction::Down),
            3 => Ok(Direction::Left),
            tag => Err(WireError::UnknownTag {
                context: "Direction",
                tag,
            }),
        }
    }
}

/// A participant as announced to every peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    /// Textual remote endpoint, `ip:port` with IPv6 bracketed. Display
    /// only; never parsed back.
    pub address: String,
}

impl Encode for Player {
    fn encode(&self, w: &mut Writer) -> WireResult<()> {
        self.name.encode(w)?;
        self.address.encode(w)
    }
}

impl Decode for Player {
    fn decode(r: &mut Reader<'_>) -> WireResult<Self> {
        let name = String::decode(r)?;
        let address = String::decode(r)?;
        Ok(Self { name, address })
    }
}

/// A ticking bomb. The timer counts turns until detonation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bomb {
    pub position: Position,
    pub timer: u16,
}

impl Encode for Bomb {
    fn encode(&self, w: &mut Writer) -> WireResult<()> {
        self.position.encode(w)?;
        w.put_u16(self.timer);
        Ok(())
    }
}

impl Decode for Bomb {
    fn decode(r: &mut Reader<'_>) -> WireResult<Self> {
        let position = Position::decode(r)?;
        let timer = r.u16()?;
        Ok(Self { position, timer })
    }
}
