//! Player board: a 10x10 grid of cell states plus the ships placed on it.

use core::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::bitboard::BitBoard;
use crate::config::{fleet_ship, BOARD_SIZE, FLEET};
use crate::error::{GameError, PlacementError};
use crate::ship::{Coord, Orientation, Ship, ShipPlacement};

/// Bitboard sized for the game grid.
pub type BB = BitBoard<u128, { BOARD_SIZE as usize }>;

const GRID: usize = BOARD_SIZE as usize;

/// Random placement attempts per ship before giving up.
const PLACEMENT_ATTEMPTS: usize = 100;

/// State of a single grid cell.
///
/// Legal transitions are `Water -> Miss` and `Ship -> Hit -> Sunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    Water,
    Ship,
    Hit,
    Miss,
    Sunk,
}

impl CellState {
    /// Whether a shot has already landed here.
    pub fn is_resolved(self) -> bool {
        matches!(self, CellState::Hit | CellState::Miss | CellState::Sunk)
    }

    /// State after a shot lands on this cell, or `None` if the cell cannot be
    /// targeted again.
    pub fn struck(self) -> Option<CellState> {
        match self {
            CellState::Water => Some(CellState::Miss),
            CellState::Ship => Some(CellState::Hit),
            CellState::Hit | CellState::Miss | CellState::Sunk => None,
        }
    }
}

/// What a shot did to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    Miss,
    Hit,
    /// The shot finished off the named ship.
    Sunk(&'static str),
}

/// The opponent's board as seen by the shooter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetView {
    /// Struck cells of ships that are still afloat.
    pub open_hits: BB,
    /// Cells that can no longer hide a live ship segment: misses and sunk ships.
    pub blocked: BB,
    /// Lengths of ships not yet sunk.
    pub remaining: Vec<usize>,
}

impl TargetView {
    /// Whether the cell has already been fired upon.
    pub fn is_resolved(&self, coord: Coord) -> bool {
        self.open_hits.get(coord) || self.blocked.get(coord)
    }
}

/// A player's board.
#[derive(Clone, PartialEq, Eq)]
pub struct Board {
    cells: [[CellState; GRID]; GRID],
    ships: Vec<Ship>,
}

impl Board {
    /// An all-water board with no ships.
    pub fn empty() -> Self {
        Self {
            cells: [[CellState::Water; GRID]; GRID],
            ships: Vec::new(),
        }
    }

    /// Build a board from already laid-out ships, rejecting overlaps.
    pub fn with_ships(ships: impl IntoIterator<Item = Ship>) -> Result<Self, PlacementError> {
        let mut board = Self::empty();
        for ship in ships {
            board.add_ship(ship)?;
        }
        Ok(board)
    }

    /// Build a board from a client layout. Every fleet ship must appear exactly once.
    pub fn from_placements(placements: &[ShipPlacement]) -> Result<Self, PlacementError> {
        let mut board = Self::empty();
        for placement in placements {
            let kind = fleet_ship(&placement.name)
                .ok_or_else(|| PlacementError::UnknownShip(placement.name.clone()))?;
            if board.ships.iter().any(|s| s.name() == kind.name()) {
                return Err(PlacementError::DuplicateShip(kind.name()));
            }
            let id = FLEET
                .iter()
                .position(|def| def.name() == kind.name())
                .unwrap_or(board.ships.len());
            let ship = Ship::new(
                id,
                kind,
                Coord::new(placement.x, placement.y),
                placement.orientation,
            )?;
            board.add_ship(ship)?;
        }
        if let Some(missing) = FLEET
            .iter()
            .find(|def| !board.ships.iter().any(|s| s.name() == def.name()))
        {
            return Err(PlacementError::MissingShip(missing.name()));
        }
        board.ships.sort_by_key(Ship::id);
        Ok(board)
    }

    /// Lay out the standard fleet at random non-overlapping positions.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Result<Self, PlacementError> {
        let mut board = Self::empty();
        for (id, def) in FLEET.iter().enumerate() {
            let mut placed = false;
            for _ in 0..PLACEMENT_ATTEMPTS {
                let orientation = if rng.random() {
                    Orientation::Horizontal
                } else {
                    Orientation::Vertical
                };
                let (max_x, max_y) = match orientation {
                    Orientation::Horizontal => (GRID - def.length(), GRID - 1),
                    Orientation::Vertical => (GRID - 1, GRID - def.length()),
                };
                let origin = Coord::new(
                    rng.random_range(0..=max_x) as u8,
                    rng.random_range(0..=max_y) as u8,
                );
                let ship = Ship::new(id, *def, origin, orientation)?;
                if board.add_ship(ship).is_ok() {
                    placed = true;
                    break;
                }
            }
            if !placed {
                return Err(PlacementError::UnableToPlaceShip(def.name()));
            }
        }
        Ok(board)
    }

    fn add_ship(&mut self, ship: Ship) -> Result<(), PlacementError> {
        if ship
            .cells()
            .iter()
            .any(|c| self.cells[c.y as usize][c.x as usize] != CellState::Water)
        {
            return Err(PlacementError::ShipOverlaps(ship.name()));
        }
        for c in ship.cells() {
            self.cells[c.y as usize][c.x as usize] = CellState::Ship;
        }
        self.ships.push(ship);
        Ok(())
    }

    /// State of the cell, `None` when off the board.
    pub fn cell(&self, coord: Coord) -> Option<CellState> {
        if coord.in_bounds() {
            Some(self.cells[coord.y as usize][coord.x as usize])
        } else {
            None
        }
    }

    /// Rows of the grid, indexed `[y][x]`.
    pub fn cells(&self) -> &[[CellState; GRID]; GRID] {
        &self.cells
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    /// Ships still afloat.
    pub fn remaining_ships(&self) -> usize {
        self.ships.iter().filter(|s| !s.is_sunk()).count()
    }

    /// Returns `true` when every ship is sunk.
    pub fn all_sunk(&self) -> bool {
        self.ships.iter().all(Ship::is_sunk)
    }

    /// Number of cells a shot has landed on.
    pub fn resolved_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|state| state.is_resolved())
            .count()
    }

    /// Apply a shot at `coord`.
    ///
    /// A hit re-scans the owning ship; once every cell of it is struck the ship
    /// is marked sunk and its cells repainted `Sunk`.
    pub fn strike(&mut self, coord: Coord) -> Result<Impact, GameError> {
        let current = self.cell(coord).ok_or(GameError::OutOfBounds)?;
        let next = current.struck().ok_or(GameError::AlreadyTargeted)?;
        self.cells[coord.y as usize][coord.x as usize] = next;
        if next == CellState::Miss {
            return Ok(Impact::Miss);
        }

        let Some(ship) = self.ships.iter_mut().find(|s| s.occupies(coord)) else {
            return Ok(Impact::Hit);
        };
        let cells = &mut self.cells;
        let all_struck = ship
            .cells()
            .iter()
            .all(|c| cells[c.y as usize][c.x as usize] == CellState::Hit);
        if !all_struck {
            return Ok(Impact::Hit);
        }
        for c in ship.cells() {
            cells[c.y as usize][c.x as usize] = CellState::Sunk;
        }
        ship.mark_sunk();
        Ok(Impact::Sunk(ship.name()))
    }

    /// What an opponent is allowed to know about this board.
    pub fn target_view(&self) -> TargetView {
        let mut open_hits = BB::new();
        let mut blocked = BB::new();
        for (y, row) in self.cells.iter().enumerate() {
            for (x, state) in row.iter().enumerate() {
                let coord = Coord::new(x as u8, y as u8);
                // Coordinates come from the grid itself, so `set` cannot fail.
                let _ = match state {
                    CellState::Hit => open_hits.set(coord),
                    CellState::Miss | CellState::Sunk => blocked.set(coord),
                    CellState::Water | CellState::Ship => Ok(()),
                };
            }
        }
        let remaining = self
            .ships
            .iter()
            .filter(|s| !s.is_sunk())
            .map(Ship::size)
            .collect();
        TargetView {
            open_hits,
            blocked,
            remaining,
        }
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Board {{")?;
        for row in self.cells.iter() {
            let line: String = row
                .iter()
                .map(|state| match state {
                    CellState::Water => '~',
                    CellState::Ship => '#',
                    CellState::Hit => 'X',
                    CellState::Miss => 'o',
                    CellState::Sunk => '*',
                })
                .collect();
            writeln!(f, "  {}", line)?;
        }
        writeln!(f, "  ships: {:?}", self.ships)?;
        write!(f, "}}")
    }
}
