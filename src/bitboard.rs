//! A fixed-size bitboard using const generics.
//!
//! Boards are an `N×N` grid packed into an unsigned integer `T`, one bit per
//! cell at index `y * N + x`. Used for the compact shot masks that feed the
//! targeting AI.

use core::ops::{BitAnd, BitOr, Not};
use core::{fmt, mem};

use num_traits::{PrimInt, Unsigned, Zero};
use serde::{Deserialize, Serialize};

use crate::ship::Coord;

/// Errors returned by bitboard operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitBoardError {
    /// Requested board size N*N exceeds capacity of `T::BITS`.
    #[error("N*N={cells} exceeds the {capacity} bits available")]
    SizeTooLarge { cells: usize, capacity: usize },
    /// Coordinate is outside [0..N).
    #[error("cell ({x}, {y}) is out of bounds")]
    IndexOutOfBounds { x: usize, y: usize },
}

/// A fixed-size N×N bitboard stored in the unsigned integer `T`.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitBoard<T, const N: usize>
where
    T: PrimInt + Unsigned + Zero,
{
    bits: T,
}

impl<T, const N: usize> BitBoard<T, N>
where
    T: PrimInt + Unsigned + Zero,
{
    const BOARD_BITS: usize = N * N;

    fn mask() -> T {
        if Self::BOARD_BITS == mem::size_of::<T>() * 8 {
            !T::zero()
        } else {
            (T::one() << Self::BOARD_BITS) - T::one()
        }
    }

    /// Create an empty board without a size check.
    pub fn new() -> Self {
        BitBoard { bits: T::zero() }
    }

    /// Fallible constructor: returns `Err(SizeTooLarge)` if N*N > T::BITS.
    pub fn try_new() -> Result<Self, BitBoardError> {
        let capacity = mem::size_of::<T>() * 8;
        if Self::BOARD_BITS > capacity {
            Err(BitBoardError::SizeTooLarge {
                cells: Self::BOARD_BITS,
                capacity,
            })
        } else {
            Ok(Self::new())
        }
    }

    /// Number of set cells.
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_zero()
    }

    /// Whether the cell is set. Cells off the board read as unset.
    pub fn get(&self, coord: Coord) -> bool {
        match Self::index(coord) {
            Ok(idx) => ((self.bits >> idx) & T::one()) != T::zero(),
            Err(_) => false,
        }
    }

    pub fn set(&mut self, coord: Coord) -> Result<(), BitBoardError> {
        let idx = Self::index(coord)?;
        self.bits = self.bits | (T::one() << idx);
        Ok(())
    }

    /// Set cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..Self::BOARD_BITS)
            .filter(move |idx| ((self.bits >> *idx) & T::one()) != T::zero())
            .map(|idx| Coord::new((idx % N) as u8, (idx / N) as u8))
    }

    fn index(coord: Coord) -> Result<usize, BitBoardError> {
        let (x, y) = (coord.x as usize, coord.y as usize);
        if x >= N || y >= N {
            Err(BitBoardError::IndexOutOfBounds { x, y })
        } else {
            Ok(y * N + x)
        }
    }
}

impl<T, const N: usize> Default for BitBoard<T, N>
where
    T: PrimInt + Unsigned + Zero,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> BitOr for BitBoard<T, N>
where
    T: PrimInt + Unsigned + Zero,
{
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        BitBoard {
            bits: self.bits | rhs.bits,
        }
    }
}

impl<T, const N: usize> BitAnd for BitBoard<T, N>
where
    T: PrimInt + Unsigned + Zero,
{
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        BitBoard {
            bits: self.bits & rhs.bits,
        }
    }
}

impl<T, const N: usize> Not for BitBoard<T, N>
where
    T: PrimInt + Unsigned + Zero,
{
    type Output = Self;

    fn not(self) -> Self {
        BitBoard {
            bits: !self.bits & Self::mask(),
        }
    }
}

impl<T, const N: usize> fmt::Debug for BitBoard<T, N>
where
    T: PrimInt + Unsigned + Zero,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BitBoard<{}x{}>", N, N)?;
        for y in 0..N {
            for x in 0..N {
                let set = self.get(Coord::new(x as u8, y as u8));
                write!(f, "{}", if set { '1' } else { '.' })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
