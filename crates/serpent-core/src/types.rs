//! Grid primitives shared by the engine, the wire protocol and test tooling.
//!
//! Coordinates follow screen convention: `x` grows to the right, `y` grows
//! downward, and a [`Board`] is indexed row-major as `board[y][x]`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// One of the four axis-aligned unit moves.
///
/// The discriminant is the wire encoding used in `ACTION` and `STATE`
/// payloads.
///
/// # Example
///
/// ```
/// use serpent_core::types::Direction;
///
/// assert_eq!(Direction::from_action(2), Direction::Left);
/// // Out-of-range actions clamp to Up.
/// assert_eq!(Direction::from_action(7), Direction::Up);
/// assert_eq!(Direction::Left.opposite(), Direction::Right);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    #[default]
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Direction {
    /// All directions in wire order.
    pub const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// Number of distinct actions.
    pub const COUNT: usize = 4;

    /// Decode a wire action. Anything outside `0..4` maps to [`Up`](Self::Up).
    #[must_use]
    pub const fn from_action(action: i64) -> Self {
        match action {
            1 => Self::Down,
            2 => Self::Left,
            3 => Self::Right,
            _ => Self::Up,
        }
    }

    /// Decode a wire action, rejecting anything outside `0..4`.
    #[must_use]
    pub const fn try_from_action(action: i64) -> Option<Self> {
        match action {
            0 => Some(Self::Up),
            1 => Some(Self::Down),
            2 => Some(Self::Left),
            3 => Some(Self::Right),
            _ => None,
        }
    }

    /// Wire encoding of this direction.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Unit offset `(dx, dy)`.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    /// The direction pointing the other way.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

// ---------------------------------------------------------------------------
// Coord
// ---------------------------------------------------------------------------

/// An integer grid coordinate. May lie outside the board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one unit along `direction`.
    #[must_use]
    pub const fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Manhattan (L1) distance to `other`.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Whether both components lie in `[0, size)`.
    #[must_use]
    pub fn in_bounds(self, size: usize) -> bool {
        let Ok(size) = i32::try_from(size) else {
            return self.x >= 0 && self.y >= 0;
        };
        (0..size).contains(&self.x) && (0..size).contains(&self.y)
    }

    /// This coordinate wrapped onto a torus of side `size`.
    #[must_use]
    pub fn wrapped(self, size: usize) -> Self {
        let n = i32::try_from(size).unwrap_or(i32::MAX).max(1);
        Self {
            x: self.x.rem_euclid(n),
            y: self.y.rem_euclid(n),
        }
    }
}

// ---------------------------------------------------------------------------
// GridCell
// ---------------------------------------------------------------------------

/// Content of a single board cell, as seen by external consumers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GridCell {
    #[default]
    Empty = 0,
    Occupant = 1,
    Target = 2,
}

impl GridCell {
    /// Wire encoding (`0` empty, `1` occupant, `2` target).
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Square matrix of [`GridCell`]s, stored row-major.
///
/// Boards are projections: the engine rebuilds one from body and target
/// after every mutation and hands out clones or shared references only.
///
/// # Example
///
/// ```
/// use serpent_core::types::{Board, Coord, GridCell};
///
/// let mut board = Board::new(4);
/// board.set(Coord::new(1, 2), GridCell::Target);
/// assert_eq!(board.get(Coord::new(1, 2)), Some(GridCell::Target));
/// assert_eq!(board.to_rows()[2][1], 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    size: usize,
    cells: Vec<GridCell>,
}

impl Board {
    /// An all-empty board of side `size`.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![GridCell::Empty; size * size],
        }
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    fn index_of(&self, at: Coord) -> Option<usize> {
        if !at.in_bounds(self.size) {
            return None;
        }
        let x = usize::try_from(at.x).ok()?;
        let y = usize::try_from(at.y).ok()?;
        Some(y * self.size + x)
    }

    /// Cell at `at`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, at: Coord) -> Option<GridCell> {
        self.index_of(at).map(|i| self.cells[i])
    }

    /// Overwrite the cell at `at`. Out-of-bounds writes are ignored.
    pub fn set(&mut self, at: Coord, cell: GridCell) {
        if let Some(i) = self.index_of(at) {
            self.cells[i] = cell;
        }
    }

    /// Reset every cell to [`GridCell::Empty`].
    pub fn clear(&mut self) {
        self.cells.fill(GridCell::Empty);
    }

    /// Number of cells holding `cell`.
    #[must_use]
    pub fn count(&self, cell: GridCell) -> usize {
        self.cells.iter().filter(|c| **c == cell).count()
    }

    /// Row-major wire codes, `rows[y][x]`.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        if self.size == 0 {
            return Vec::new();
        }
        self.cells
            .chunks(self.size)
            .map(|row| row.iter().map(|c| c.code()).collect())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
