//! Byte layout of the game-state segment.
//!
//! The segment is a fixed header, a fixed array of player records, and a
//! row-major board whose length is stored in the header:
//!
//! ```text
//! 0   magic        u32
//! 4   width        u16
//! 6   height       u16
//! 8   player_count u32
//! 12  game_over    u8   (+3 pad)
//! 16  board_len    u32  (+4 pad)
//! 24  players      MAX_PLAYERS x PLAYER_RECORD_SIZE
//! ..  board        board_len x i32
//! ```
//!
//! Every field goes through an accessor that computes its offset, so no
//! process relies on Rust struct layout to read another process's writes.
//! [`StateView`] works over any byte buffer, which lets the rules run on a
//! plain `Vec<u8>` in tests.

use serde::Serialize;

use crate::error::{ArenaError, Result};
use crate::{MAX_NAME_LENGTH, MAX_PLAYERS};

pub const STATE_MAGIC: u32 = 0x4152_4e41;

const OFF_MAGIC: usize = 0;
const OFF_WIDTH: usize = 4;
const OFF_HEIGHT: usize = 6;
const OFF_PLAYER_COUNT: usize = 8;
const OFF_GAME_OVER: usize = 12;
const OFF_BOARD_LEN: usize = 16;
const OFF_PLAYERS: usize = 24;

const REC_NAME: usize = 0;
const REC_SCORE: usize = 16;
const REC_INVALID: usize = 20;
const REC_VALID: usize = 24;
const REC_X: usize = 28;
const REC_Y: usize = 30;
const REC_PID: usize = 32;
const REC_BLOCKED: usize = 36;

pub const PLAYER_RECORD_SIZE: usize = 40;
pub const HEADER_SIZE: usize = OFF_PLAYERS + MAX_PLAYERS * PLAYER_RECORD_SIZE;
pub const CELL_SIZE: usize = 4;

/// Total segment size for a board.
pub fn state_size(width: u16, height: u16) -> usize {
    HEADER_SIZE + usize::from(width) * usize::from(height) * CELL_SIZE
}

/// The eight compass directions, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Decodes a move byte; anything above 7 is not a direction.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// `(dx, dy)` with y growing downwards.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
}

impl Position {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell in `dir`, if it lies on a `width` x `height` board.
    pub fn step(self, dir: Direction, width: u16, height: u16) -> Option<Position> {
        let (dx, dy) = dir.offset();
        let x = i32::from(self.x) + dx;
        let y = i32::from(self.y) + dy;
        if x < 0 || y < 0 || x >= i32::from(width) || y >= i32::from(height) {
            return None;
        }
        Some(Position::new(x as u16, y as u16))
    }
}

/// One board cell as stored in the segment.
///
/// A positive value is an unclaimed reward. A cell claimed by player `k` holds
/// `-(k + 1)`, so player 0's trail is distinct from any reward or from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Cell(i32);

impl Cell {
    pub fn reward(value: u32) -> Self {
        Cell(value.min(i32::MAX as u32) as i32)
    }

    pub fn claimed(player: usize) -> Self {
        Cell(-(player as i32) - 1)
    }

    pub fn from_raw(raw: i32) -> Self {
        Cell(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    /// Capturable cells hold a positive reward.
    pub fn is_free(self) -> bool {
        self.0 > 0
    }

    pub fn points(self) -> Option<u32> {
        self.is_free().then_some(self.0 as u32)
    }

    pub fn owner(self) -> Option<usize> {
        (self.0 < 0).then(|| (-(self.0 + 1)) as usize)
    }
}

/// Decoded copy of one player record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerRecord {
    pub name: String,
    pub score: u32,
    pub invalid_moves: u32,
    pub valid_moves: u32,
    pub position: Position,
    pub pid: i32,
    pub blocked: bool,
}

/// Owned copy of the whole state, taken under the reader role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameSnapshot {
    pub width: u16,
    pub height: u16,
    pub game_over: bool,
    pub players: Vec<PlayerRecord>,
    pub board: Vec<Cell>,
}

impl GameSnapshot {
    pub fn cell(&self, pos: Position) -> Cell {
        self.board[usize::from(pos.y) * usize::from(self.width) + usize::from(pos.x)]
    }
}

/// Offset accessors over a game-state byte buffer.
pub struct StateView<B> {
    bytes: B,
}

impl<B: AsRef<[u8]>> StateView<B> {
    /// Wraps an initialized buffer, checking magic and length.
    pub fn attach(bytes: B) -> Result<Self> {
        let view = Self { bytes };
        let len = view.bytes.as_ref().len();
        if len < HEADER_SIZE || view.read_u32(OFF_MAGIC) != STATE_MAGIC {
            return Err(ArenaError::NotInitialized("game state".to_string()));
        }
        let expected = state_size(view.width(), view.height());
        let board_len = view.read_u32(OFF_BOARD_LEN) as usize;
        if len < expected || board_len != usize::from(view.width()) * usize::from(view.height()) {
            return Err(ArenaError::SegmentTooSmall {
                name: "game state".to_string(),
                actual: len,
                expected,
            });
        }
        Ok(view)
    }

    pub fn width(&self) -> u16 {
        self.read_u16(OFF_WIDTH)
    }

    pub fn height(&self) -> u16 {
        self.read_u16(OFF_HEIGHT)
    }

    pub fn player_count(&self) -> usize {
        (self.read_u32(OFF_PLAYER_COUNT) as usize).min(MAX_PLAYERS)
    }

    pub fn game_over(&self) -> bool {
        self.bytes.as_ref()[OFF_GAME_OVER] != 0
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x < self.width() && pos.y < self.height()
    }

    pub fn cell(&self, pos: Position) -> Cell {
        Cell::from_raw(self.read_i32(self.cell_offset(pos)))
    }

    pub fn player(&self, index: usize) -> PlayerRecord {
        let base = record_offset(index);
        let raw_name = &self.bytes.as_ref()[base + REC_NAME..base + REC_NAME + MAX_NAME_LENGTH];
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LENGTH);
        PlayerRecord {
            name: String::from_utf8_lossy(&raw_name[..end]).into_owned(),
            score: self.read_u32(base + REC_SCORE),
            invalid_moves: self.read_u32(base + REC_INVALID),
            valid_moves: self.read_u32(base + REC_VALID),
            position: Position::new(self.read_u16(base + REC_X), self.read_u16(base + REC_Y)),
            pid: self.read_i32(base + REC_PID),
            blocked: self.bytes.as_ref()[base + REC_BLOCKED] != 0,
        }
    }

    pub fn players(&self) -> Vec<PlayerRecord> {
        (0..self.player_count()).map(|i| self.player(i)).collect()
    }

    /// Index of the record whose pid matches.
    pub fn find_player_by_pid(&self, pid: u32) -> Option<usize> {
        (0..self.player_count()).find(|&i| self.read_i32(record_offset(i) + REC_PID) == pid as i32)
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let width = self.width();
        let height = self.height();
        let mut board = Vec::with_capacity(usize::from(width) * usize::from(height));
        for y in 0..height {
            for x in 0..width {
                board.push(self.cell(Position::new(x, y)));
            }
        }
        GameSnapshot {
            width,
            height,
            game_over: self.game_over(),
            players: self.players(),
            board,
        }
    }

    fn cell_offset(&self, pos: Position) -> usize {
        let index = usize::from(pos.y) * usize::from(self.width()) + usize::from(pos.x);
        HEADER_SIZE + index * CELL_SIZE
    }

    fn read_u16(&self, off: usize) -> u16 {
        let b = self.bytes.as_ref();
        u16::from_ne_bytes([b[off], b[off + 1]])
    }

    fn read_u32(&self, off: usize) -> u32 {
        let b = self.bytes.as_ref();
        u32::from_ne_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
    }

    fn read_i32(&self, off: usize) -> i32 {
        self.read_u32(off) as i32
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> StateView<B> {
    /// Writes a fresh header into a zeroed buffer sized by [`state_size`].
    pub fn format(bytes: B, width: u16, height: u16) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ArenaError::BoardSize { width, height });
        }
        let expected = state_size(width, height);
        let actual = bytes.as_ref().len();
        if actual < expected {
            return Err(ArenaError::SegmentTooSmall {
                name: "game state".to_string(),
                actual,
                expected,
            });
        }
        let mut view = Self { bytes };
        view.bytes.as_mut()[..expected].fill(0);
        view.write_u16(OFF_WIDTH, width);
        view.write_u16(OFF_HEIGHT, height);
        view.write_u32(OFF_BOARD_LEN, u32::from(width) * u32::from(height));
        view.write_u32(OFF_MAGIC, STATE_MAGIC);
        Ok(view)
    }

    pub fn set_player_count(&mut self, count: usize) -> Result<()> {
        if count == 0 || count > MAX_PLAYERS {
            return Err(ArenaError::PlayerCount(count));
        }
        self.write_u32(OFF_PLAYER_COUNT, count as u32);
        Ok(())
    }

    /// Sets the game-over flag. The flag never goes back to false.
    pub fn set_game_over(&mut self) {
        self.bytes.as_mut()[OFF_GAME_OVER] = 1;
    }

    pub fn set_cell(&mut self, pos: Position, cell: Cell) {
        let off = self.cell_offset(pos);
        self.write_u32(off, cell.raw() as u32);
    }

    /// Writes a whole record. `blocked` is sticky: a stored `true` is kept.
    pub fn put_player(&mut self, index: usize, record: &PlayerRecord) {
        let base = record_offset(index);
        let blocked = record.blocked || self.bytes.as_ref()[base + REC_BLOCKED] != 0;

        let name = truncate_name(&record.name);
        let slot = &mut self.bytes.as_mut()[base + REC_NAME..base + REC_NAME + MAX_NAME_LENGTH];
        slot.fill(0);
        slot[..name.len()].copy_from_slice(name.as_bytes());

        self.write_u32(base + REC_SCORE, record.score);
        self.write_u32(base + REC_INVALID, record.invalid_moves);
        self.write_u32(base + REC_VALID, record.valid_moves);
        self.write_u16(base + REC_X, record.position.x);
        self.write_u16(base + REC_Y, record.position.y);
        self.write_u32(base + REC_PID, record.pid as u32);
        self.bytes.as_mut()[base + REC_BLOCKED] = u8::from(blocked);
    }

    pub fn set_pid(&mut self, index: usize, pid: u32) {
        self.write_u32(record_offset(index) + REC_PID, pid);
    }

    /// Marks a player blocked for good.
    pub fn block_player(&mut self, index: usize) {
        self.bytes.as_mut()[record_offset(index) + REC_BLOCKED] = 1;
    }

    fn write_u16(&mut self, off: usize, value: u16) {
        self.bytes.as_mut()[off..off + 2].copy_from_slice(&value.to_ne_bytes());
    }

    fn write_u32(&mut self, off: usize, value: u32) {
        self.bytes.as_mut()[off..off + 4].copy_from_slice(&value.to_ne_bytes());
    }
}

fn record_offset(index: usize) -> usize {
    debug_assert!(index < MAX_PLAYERS);
    OFF_PLAYERS + index * PLAYER_RECORD_SIZE
}

/// Cuts a name to fit the record, on a character boundary.
pub fn truncate_name(name: &str) -> &str {
    let limit = MAX_NAME_LENGTH - 1;
    if name.len() <= limit {
        return name;
    }
    let mut end = limit;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
