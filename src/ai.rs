// Probability-based targeting against an opponent board.
// Works only from the public `TargetView`, never from the hidden layout.

use rand::Rng;

use crate::board::TargetView;
use crate::config::BOARD_SIZE;
use crate::ship::{Coord, Orientation};

const GRID_SIZE: usize = BOARD_SIZE as usize;

/// Placements covering more open hits get weight `HIT_BIAS^hits`, so cells
/// next to a wounded ship dominate the density.
const HIT_BIAS: f64 = 10.0;

/// Sampling temperature used by [`choose_target`]; below 1 sharpens the density.
const TEMPERATURE: f64 = 0.5;

/// Density matrix indexed `[y][x]`.
pub type Density = [[f64; GRID_SIZE]; GRID_SIZE];

/// Compute a probability density over all unresolved cells from every legal
/// placement of each remaining ship length.
pub fn calc_pdf(view: &TargetView) -> Density {
    let mut matrix = [[0.0f64; GRID_SIZE]; GRID_SIZE];

    for &len in view.remaining.iter() {
        if len == 0 || len > GRID_SIZE {
            continue;
        }
        for orient in [Orientation::Horizontal, Orientation::Vertical] {
            let (max_x, max_y) = match orient {
                Orientation::Horizontal => (GRID_SIZE - len + 1, GRID_SIZE),
                Orientation::Vertical => (GRID_SIZE, GRID_SIZE - len + 1),
            };
            for y in 0..max_y {
                for x in 0..max_x {
                    let segment = |k: usize| match orient {
                        Orientation::Horizontal => Coord::new((x + k) as u8, y as u8),
                        Orientation::Vertical => Coord::new(x as u8, (y + k) as u8),
                    };
                    if (0..len).any(|k| view.blocked.get(segment(k))) {
                        continue;
                    }
                    let n_hits = (0..len).filter(|&k| view.open_hits.get(segment(k))).count();
                    let weight = HIT_BIAS.powi(n_hits as i32);
                    for k in 0..len {
                        let cell = segment(k);
                        if !view.is_resolved(cell) {
                            matrix[cell.y as usize][cell.x as usize] += weight;
                        }
                    }
                }
            }
        }
    }

    normalize(matrix)
}

fn normalize(mut matrix: Density) -> Density {
    let total: f64 = matrix.iter().flatten().sum();
    if total == 0.0 {
        let uniform = 1.0 / (GRID_SIZE * GRID_SIZE) as f64;
        for row in matrix.iter_mut() {
            row.fill(uniform);
        }
        return matrix;
    }
    for v in matrix.iter_mut().flatten() {
        *v /= total;
    }
    matrix
}

/// Sample a cell from a density using a temperature parameter.
pub fn sample_pdf<R: Rng + ?Sized>(pdf: &Density, temperature: f64, rng: &mut R) -> Coord {
    let mut adjusted = [[0.0f64; GRID_SIZE]; GRID_SIZE];
    let mut total = 0.0;
    for y in 0..GRID_SIZE {
        for x in 0..GRID_SIZE {
            let v = pdf[y][x].powf(1.0 / temperature);
            adjusted[y][x] = v;
            total += v;
        }
    }
    if total == 0.0 {
        return Coord::new(
            rng.random_range(0..GRID_SIZE) as u8,
            rng.random_range(0..GRID_SIZE) as u8,
        );
    }
    let threshold: f64 = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    for y in 0..GRID_SIZE {
        for x in 0..GRID_SIZE {
            cumulative += adjusted[y][x];
            if threshold < cumulative {
                return Coord::new(x as u8, y as u8);
            }
        }
    }
    Coord::new((GRID_SIZE - 1) as u8, (GRID_SIZE - 1) as u8)
}

/// Densest unresolved cell, if any remain.
pub fn best_open_cell(pdf: &Density, view: &TargetView) -> Option<Coord> {
    let mut best: Option<(Coord, f64)> = None;
    for y in 0..GRID_SIZE {
        for x in 0..GRID_SIZE {
            let coord = Coord::new(x as u8, y as u8);
            if view.is_resolved(coord) {
                continue;
            }
            if best.map_or(true, |(_, v)| pdf[y][x] > v) {
                best = Some((coord, pdf[y][x]));
            }
        }
    }
    best.map(|(coord, _)| coord)
}

/// Pick the next shot against `view`. Never returns a resolved cell while an
/// unresolved one exists.
pub fn choose_target<R: Rng + ?Sized>(view: &TargetView, rng: &mut R) -> Coord {
    let pdf = calc_pdf(view);
    let pick = sample_pdf(&pdf, TEMPERATURE, rng);
    if !view.is_resolved(pick) {
        return pick;
    }
    best_open_cell(&pdf, view).unwrap_or(pick)
}
