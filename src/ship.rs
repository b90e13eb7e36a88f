//! Ship definitions, grid coordinates and placement geometry.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::config::BOARD_SIZE;
use crate::error::PlacementError;

/// Orientation of a ship on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Extends along increasing `x`.
    Horizontal,
    /// Extends along increasing `y`.
    Vertical,
}

/// A cell on the grid. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: u8,
    pub y: u8,
}

impl Coord {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Whether the coordinate lies on the 10x10 grid.
    pub fn in_bounds(&self) -> bool {
        self.x < BOARD_SIZE && self.y < BOARD_SIZE
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Type of ship: name and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipType {
    name: &'static str,
    length: usize,
}

impl ShipType {
    /// Create a new ship type.
    pub const fn new(name: &'static str, length: usize) -> Self {
        Self { name, length }
    }

    /// Ship's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ship's length.
    pub fn length(&self) -> usize {
        self.length
    }
}

/// A requested placement for one fleet ship, as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipPlacement {
    pub name: String,
    pub x: u8,
    pub y: u8,
    pub orientation: Orientation,
}

impl ShipPlacement {
    pub fn new(name: impl Into<String>, x: u8, y: u8, orientation: Orientation) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            orientation,
        }
    }
}

/// A ship placed on a board.
///
/// Sunk state is never set from outside: the board derives it by re-scanning
/// the occupied cells after each hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ship {
    id: usize,
    kind: ShipType,
    cells: Vec<Coord>,
    sunk: bool,
}

impl Ship {
    /// Lay a ship out from `origin` along `orientation`.
    pub fn new(
        id: usize,
        kind: ShipType,
        origin: Coord,
        orientation: Orientation,
    ) -> Result<Self, PlacementError> {
        let len = kind.length();
        let (x, y) = (origin.x as usize, origin.y as usize);
        let fits = match orientation {
            Orientation::Horizontal => x + len <= BOARD_SIZE as usize && y < BOARD_SIZE as usize,
            Orientation::Vertical => y + len <= BOARD_SIZE as usize && x < BOARD_SIZE as usize,
        };
        if !fits {
            return Err(PlacementError::ShipOutOfBounds(kind.name()));
        }
        let cells = (0..len)
            .map(|i| match orientation {
                Orientation::Horizontal => Coord::new((x + i) as u8, y as u8),
                Orientation::Vertical => Coord::new(x as u8, (y + i) as u8),
            })
            .collect();
        Ok(Self {
            id,
            kind,
            cells,
            sunk: false,
        })
    }

    /// Build a ship from an explicit cell list. The cells must be on the grid,
    /// their count must match the ship type's length, and they must be distinct
    /// cells of one contiguous row or column (in any order).
    pub fn from_cells(id: usize, kind: ShipType, cells: Vec<Coord>) -> Result<Self, PlacementError> {
        if cells.is_empty() || cells.len() != kind.length() || cells.iter().any(|c| !c.in_bounds()) {
            return Err(PlacementError::ShipOutOfBounds(kind.name()));
        }
        if !is_straight_run(&cells) {
            return Err(PlacementError::ShipNotInLine(kind.name()));
        }
        Ok(Self {
            id,
            kind,
            cells,
            sunk: false,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn kind(&self) -> ShipType {
        self.kind
    }

    /// Occupied cells in placement order.
    pub fn cells(&self) -> &[Coord] {
        &self.cells
    }

    pub fn occupies(&self, coord: Coord) -> bool {
        self.cells.contains(&coord)
    }

    pub fn is_sunk(&self) -> bool {
        self.sunk
    }

    pub(crate) fn mark_sunk(&mut self) {
        self.sunk = true;
    }
}

/// Distinct cells sharing a row or column with no gaps between them.
fn is_straight_run(cells: &[Coord]) -> bool {
    let first = cells[0];
    let mut along: Vec<u8> = if cells.iter().all(|c| c.y == first.y) {
        cells.iter().map(|c| c.x).collect()
    } else if cells.iter().all(|c| c.x == first.x) {
        cells.iter().map(|c| c.y).collect()
    } else {
        return false;
    };
    along.sort_unstable();
    along.windows(2).all(|w| w[1] == w[0] + 1)
}
